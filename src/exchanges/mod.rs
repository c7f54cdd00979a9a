pub mod channel_socket;
pub mod codec;
pub mod connection_manager;
pub mod error;
pub mod rest;
pub mod transport;

pub use channel_socket::{ChannelSocket, SocketState, SubscribeReport};
pub use codec::FrameDecoder;
pub use connection_manager::{ChannelKind, ConnectionManager};
pub use error::{ConnectorError, DecodeError, RestError};
pub use rest::RestClient;
pub use transport::{Connector, Transport, WsConnector, WsTransport};
