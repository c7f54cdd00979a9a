use crate::types::{Candle, RingBuffer};

/// Rolling candle window for one instrument and timeframe.
///
/// The venue re-sends the currently open bar on every tick, so a candle with the
/// same period start as the newest bar replaces it instead of appending.
#[derive(Debug, Clone)]
pub struct CandleHistory {
    bars: RingBuffer<Candle>,
}

impl CandleHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            bars: RingBuffer::new(capacity),
        }
    }

    /// Seed from bars in ascending time order, e.g. a REST history query
    pub fn from_candles(capacity: usize, candles: impl IntoIterator<Item = Candle>) -> Self {
        let mut history = Self::new(capacity);
        history.extend(candles);
        history
    }

    /// Apply one candle. Returns false when it is older than the newest bar and was ignored.
    pub fn update(&mut self, candle: Candle) -> bool {
        match self.bars.last_mut() {
            Some(last) if last.timestamp == candle.timestamp => {
                *last = candle;
                true
            }
            Some(last) if last.timestamp > candle.timestamp => false,
            _ => {
                self.bars.push(candle);
                true
            }
        }
    }

    pub fn extend(&mut self, candles: impl IntoIterator<Item = Candle>) {
        for candle in candles {
            self.update(candle);
        }
    }

    pub fn last(&self) -> Option<&Candle> {
        self.bars.last()
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.bars.is_full()
    }

    pub fn capacity(&self) -> usize {
        self.bars.capacity()
    }

    /// Oldest to newest
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &Candle> + '_ {
        self.bars.iter()
    }

    /// Close prices, oldest to newest
    pub fn closes(&self) -> Vec<f64> {
        self.bars.iter().map(|c| c.close).collect()
    }
}
