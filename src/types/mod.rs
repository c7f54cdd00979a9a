pub mod account;
pub mod history;
pub mod instrument;
pub mod market;
pub mod ring_buffer;
pub mod trade;

pub use account::{position_set, Account, CoinBalance, Position, PositionSide};
pub use history::CandleHistory;
pub use instrument::{InstrumentInfo, InstrumentType};
pub use market::Candle;
pub use ring_buffer::RingBuffer;
pub use trade::{
    new_client_id, Action, FillOrder, FillStatus, Order, OrderCancel, OrderResponse, OrderStatus,
    OrderType, TargetCcy, TradingMode,
};

use chrono::{DateTime, Utc};

/// Convert a venue millisecond timestamp into a UTC datetime
pub fn datetime_from_ms(timestamp_ms: i64) -> Option<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp_millis(timestamp_ms)
}
