use crate::exchanges::ConnectorError;
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use log::debug;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

/// Bidirectional text-frame stream to the venue
#[async_trait]
pub trait Transport: Send {
    async fn send(&mut self, text: String) -> Result<(), ConnectorError>;

    /// Next text frame; `None` once the peer has closed the stream
    async fn recv(&mut self) -> Option<Result<String, ConnectorError>>;

    async fn close(&mut self) -> Result<(), ConnectorError>;
}

/// Opens transports; the seam tests replace with an in-memory venue
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, url: &str) -> Result<Box<dyn Transport>, ConnectorError>;
}

/// Websocket connector backed by tokio-tungstenite
#[derive(Debug, Clone)]
pub struct WsConnector {
    connect_timeout: Duration,
}

impl WsConnector {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

impl Default for WsConnector {
    fn default() -> Self {
        Self::new(Duration::from_secs(10))
    }
}

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, url: &str) -> Result<Box<dyn Transport>, ConnectorError> {
        let (stream, _) = tokio::time::timeout(self.connect_timeout, connect_async(url))
            .await
            .map_err(|_| ConnectorError::Timeout("websocket connect"))?
            .map_err(|e| ConnectorError::Connection(format!("{}: {}", url, e)))?;
        debug!("Connected to {}", url);
        Ok(Box::new(WsTransport { stream }))
    }
}

/// Websocket transport.
///
/// Protocol pings are answered here; venue-level text `"ping"` frames are the
/// caller's business.
pub struct WsTransport {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl Transport for WsTransport {
    async fn send(&mut self, text: String) -> Result<(), ConnectorError> {
        self.stream
            .send(Message::Text(text))
            .await
            .map_err(|e| ConnectorError::Connection(e.to_string()))
    }

    async fn recv(&mut self) -> Option<Result<String, ConnectorError>> {
        loop {
            match self.stream.next().await? {
                Ok(Message::Text(text)) => return Some(Ok(text)),
                Ok(Message::Binary(bytes)) => {
                    return Some(Ok(String::from_utf8_lossy(&bytes).into_owned()))
                }
                Ok(Message::Ping(payload)) => {
                    if let Err(e) = self.stream.send(Message::Pong(payload)).await {
                        return Some(Err(ConnectorError::Connection(e.to_string())));
                    }
                }
                Ok(Message::Pong(_)) | Ok(Message::Frame(_)) => {}
                Ok(Message::Close(frame)) => {
                    debug!("Close frame received: {:?}", frame);
                    return None;
                }
                Err(tungstenite::Error::ConnectionClosed) => return None,
                Err(e) => return Some(Err(ConnectorError::Connection(e.to_string()))),
            }
        }
    }

    async fn close(&mut self) -> Result<(), ConnectorError> {
        match self.stream.close(None).await {
            Ok(())
            | Err(tungstenite::Error::ConnectionClosed)
            | Err(tungstenite::Error::AlreadyClosed) => Ok(()),
            Err(e) => Err(ConnectorError::Connection(e.to_string())),
        }
    }
}
