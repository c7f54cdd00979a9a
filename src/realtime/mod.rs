pub mod error_recovery;
pub mod handler;
pub mod strategy_runtime;

pub use error_recovery::{retry_with_backoff, RetryConfig};
pub use handler::{consume, dispatch, EventHandler, NoopHandler};
pub use strategy_runtime::{StrategyRuntime, StrategyRuntimeBuilder, TaskFuture};
