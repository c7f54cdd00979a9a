use crate::types::InstrumentType;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Equity held in a single currency
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoinBalance {
    pub ccy: String,
    /// Equity in native units
    pub equity: f64,
    /// Equity valued in the quote currency
    pub equity_usd: f64,
}

/// Account snapshot; each update replaces the previous one
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub timestamp: DateTime<Utc>,
    /// Total equity in the quote currency
    pub total_usd: f64,
    /// Equity held in coins other than the quote currency
    pub in_coins_usd: f64,
    pub coins: HashMap<String, CoinBalance>,
}

impl Account {
    /// Build a snapshot from balance rows, computing the equity totals.
    ///
    /// A repeated currency code replaces the earlier row, so `coins` keys stay unique.
    pub fn from_balances<I>(timestamp: DateTime<Utc>, balances: I, quote_ccy: &str) -> Self
    where
        I: IntoIterator<Item = CoinBalance>,
    {
        let mut coins = HashMap::new();
        for balance in balances {
            coins.insert(balance.ccy.clone(), balance);
        }

        let total_usd: f64 = coins.values().map(|c| c.equity_usd).sum();
        let quote_usd = coins.get(quote_ccy).map(|c| c.equity_usd).unwrap_or(0.0);

        Self {
            timestamp,
            total_usd,
            in_coins_usd: total_usd - quote_usd,
            coins,
        }
    }

    pub fn coin(&self, ccy: &str) -> Option<&CoinBalance> {
        self.coins.get(ccy)
    }
}

/// Position direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PositionSide {
    Long,
    Short,
    Net,
}

/// Open position on one instrument
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub inst_id: String,
    pub inst_type: InstrumentType,
    pub side: PositionSide,
    pub margin_ccy: Option<String>,
    pub size: f64,
    pub pos_ccy: Option<String>,
    pub notional_usd: Option<f64>,
    /// Unrealized P&L
    pub upl: Option<f64>,
}

/// Collapse rows into a position set with at most one entry per (instrument, side).
///
/// Later rows win; first-seen order is preserved.
pub fn position_set<I>(rows: I) -> Vec<Position>
where
    I: IntoIterator<Item = Position>,
{
    let mut set: Vec<Position> = Vec::new();
    for position in rows {
        match set
            .iter_mut()
            .find(|p| p.inst_id == position.inst_id && p.side == position.side)
        {
            Some(existing) => *existing = position,
            None => set.push(position),
        }
    }
    set
}
