use thiserror::Error;

/// Failure decoding a single venue frame or REST payload
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("malformed json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("missing field `{0}`")]
    MissingField(&'static str),

    #[error("invalid value {value:?} for field `{field}`")]
    InvalidValue { field: &'static str, value: String },

    #[error("unknown channel `{0}`")]
    UnknownChannel(String),

    #[error("empty data array")]
    Empty,
}

/// REST client failure
#[derive(Debug, Error)]
pub enum RestError {
    /// Non-2xx HTTP status
    #[error("remote request failed with status {status}: {body}")]
    Remote { status: u16, body: String },

    /// 2xx response whose JSON `code` is not "0"
    #[error("venue rejected request: code {code}: {msg}")]
    Venue { code: String, msg: String },

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("invalid url: {0}")]
    Url(String),
}

impl RestError {
    /// Transport failures and 5xx/429 responses may succeed on retry
    pub fn is_retryable(&self) -> bool {
        match self {
            RestError::Http(e) => e.is_timeout() || e.is_connect(),
            RestError::Remote { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}

/// Channel socket and connection manager failure
#[derive(Debug, Error)]
pub enum ConnectorError {
    /// Transport-level failure; triggers reconnection
    #[error("connection error: {0}")]
    Connection(String),

    #[error("login rejected: code {code}: {msg}")]
    Auth { code: String, msg: String },

    #[error("subscribe to {channel} rejected: {msg}")]
    Subscribe { channel: String, msg: String },

    #[error("socket is not connected")]
    NotConnected,

    #[error("stream closed by venue")]
    Closed,

    #[error("timed out waiting for {0}")]
    Timeout(&'static str),

    #[error("response {got} does not match pending request {expected}")]
    RequestResponseMismatch { expected: String, got: String },

    /// Connection was torn down while the request was in flight
    #[error("order {0} indeterminate after reconnect")]
    OrderIndeterminate(String),

    #[error("invalid state: {0}")]
    InvalidState(&'static str),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Rest(#[from] RestError),

    #[error("failed to encode frame: {0}")]
    Encode(#[from] serde_json::Error),
}

impl ConnectorError {
    /// Whether the error means the underlying transport is gone
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            ConnectorError::Connection(_)
                | ConnectorError::Closed
                | ConnectorError::NotConnected
                | ConnectorError::Timeout(_)
        )
    }
}
