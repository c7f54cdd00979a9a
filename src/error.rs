use crate::exchanges::{ConnectorError, DecodeError, RestError};
use thiserror::Error;

/// Configuration, credential and process setup failure
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("secret key is missing")]
    MissingSecret,

    #[error("environment variable {0} is not set")]
    MissingEnv(String),

    #[error("{0} is empty")]
    Empty(&'static str),

    #[error("{0} must be greater than zero")]
    Zero(&'static str),

    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid config: {0}")]
    Json(#[from] serde_json::Error),

    #[error("logging setup failed: {0}")]
    Logging(String),

    #[error("failed to build http client: {0}")]
    Http(String),
}

/// Crate-wide error
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Connector(#[from] ConnectorError),

    #[error(transparent)]
    Rest(#[from] RestError),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// A runtime task failed or panicked
    #[error("task failed: {0}")]
    Task(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
