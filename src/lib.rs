pub mod auth;
pub mod config;
pub mod context;
pub mod core;
pub mod error;
pub mod exchanges;
pub mod logging;
pub mod monitoring;
pub mod realtime;
pub mod types;

pub use auth::{Credentials, Secret, Signer};
pub use config::{ChannelSpec, ConnectionConfig, RuntimeConfig};
pub use context::TradingContext;
pub use crate::core::{Event, EventKind, EventReceiver, EventSender};
pub use error::{ConfigError, Error, Result};
pub use exchanges::{
    ChannelKind, ChannelSocket, ConnectionManager, Connector, ConnectorError, DecodeError,
    RestClient, RestError, SocketState, Transport, WsConnector,
};
pub use monitoring::{Alert, AlertLevel, AlertManager, AlertSink};
pub use realtime::{EventHandler, RetryConfig, StrategyRuntime, StrategyRuntimeBuilder};
pub use types::{
    Account, Action, Candle, CandleHistory, CoinBalance, FillOrder, FillStatus, InstrumentInfo,
    InstrumentType, Order, OrderCancel, OrderResponse, OrderStatus, OrderType, Position,
    PositionSide, RingBuffer, TargetCcy, TradingMode,
};
