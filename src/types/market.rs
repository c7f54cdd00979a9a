use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// OHLCV bar for one instrument and timeframe
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    /// Instrument id, e.g. `BTC-USDT-SWAP`
    pub inst_id: String,
    /// Bar size as the venue names it, e.g. `1m`, `1H`
    pub timeframe: String,
    /// Start of the period covered by this bar
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Candle {
    /// Period start in milliseconds since the Unix epoch
    pub fn timestamp_ms(&self) -> i64 {
        self.timestamp.timestamp_millis()
    }
}
