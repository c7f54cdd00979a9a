use crate::auth::{login_timestamp, Credentials, Signer};
use crate::config::ChannelSpec;
use crate::core::EventSender;
use crate::exchanges::codec::{self, FrameDecoder};
use crate::exchanges::{Connector, ConnectorError, Transport};
use chrono::Utc;
use log::{debug, error, info, warn};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;

/// Lifecycle of one streaming connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketState {
    Disconnected,
    Connected,
    Authenticated,
    Subscribed,
    Listening,
}

/// Outcome of a subscribe handshake
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscribeReport {
    /// Labels of confirmed subscriptions
    pub confirmed: Vec<String>,
    /// Label and venue message of each rejected subscription
    pub rejected: Vec<(String, String)>,
}

/// One streaming connection to the venue
pub struct ChannelSocket {
    name: String,
    connector: Arc<dyn Connector>,
    transport: Option<Box<dyn Transport>>,
    /// Data frames read while waiting for handshake replies
    pending: VecDeque<String>,
    state: Arc<watch::Sender<SocketState>>,
    handshake_timeout: Duration,
}

impl ChannelSocket {
    pub fn new(
        name: impl Into<String>,
        connector: Arc<dyn Connector>,
        handshake_timeout: Duration,
    ) -> Self {
        let (state, _) = watch::channel(SocketState::Disconnected);
        Self::with_state(name, connector, handshake_timeout, Arc::new(state))
    }

    /// Publish state on an existing channel, so observers survive reconnects
    pub fn with_state(
        name: impl Into<String>,
        connector: Arc<dyn Connector>,
        handshake_timeout: Duration,
        state: Arc<watch::Sender<SocketState>>,
    ) -> Self {
        Self {
            name: name.into(),
            connector,
            transport: None,
            pending: VecDeque::new(),
            state,
            handshake_timeout,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> SocketState {
        *self.state.borrow()
    }

    /// Observe state transitions
    pub fn watch_state(&self) -> watch::Receiver<SocketState> {
        self.state.subscribe()
    }

    pub fn is_connected(&self) -> bool {
        self.transport.is_some()
    }

    fn set_state(&self, state: SocketState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            debug!("[{}] {:?} -> {:?}", self.name, previous, state);
        }
    }

    pub async fn connect(&mut self, url: &str) -> Result<(), ConnectorError> {
        if self.transport.is_some() {
            self.close().await;
        }
        let transport = self.connector.connect(url).await.map_err(|e| {
            error!("[{}] connect to {} failed: {}", self.name, url, e);
            e
        })?;
        self.transport = Some(transport);
        self.set_state(SocketState::Connected);
        info!("[{}] connected to {}", self.name, url);
        Ok(())
    }

    /// Authenticate the connection.
    ///
    /// On rejection the socket stays `Connected` and `ConnectorError::Auth` is returned.
    pub async fn login(
        &mut self,
        credentials: &Credentials,
        signer: &Signer,
    ) -> Result<(), ConnectorError> {
        let timestamp = login_timestamp(Utc::now());
        let sign = signer.sign_login(&timestamp);
        self.send(&codec::encode_login(credentials, &timestamp, &sign))
            .await?;

        let deadline = Instant::now() + self.handshake_timeout;
        let reply = loop {
            let frame = self.read_until(deadline, "login ack").await?;
            match codec::parse_control(&frame) {
                Some(control) => break control,
                None => self.pending.push_back(frame),
            }
        };

        if reply.is_login_ok() {
            self.set_state(SocketState::Authenticated);
            info!("[{}] logged in", self.name);
            Ok(())
        } else {
            let code = reply.code.unwrap_or_default();
            let msg = reply.msg.unwrap_or_default();
            error!("[{}] login rejected: {} {}", self.name, code, msg);
            Err(ConnectorError::Auth { code, msg })
        }
    }

    /// Subscribe to `specs` with one request and collect one ack per spec.
    ///
    /// Acks may arrive in any order. A rejected spec is logged and reported but
    /// does not undo the others.
    pub async fn subscribe(
        &mut self,
        specs: &[ChannelSpec],
    ) -> Result<SubscribeReport, ConnectorError> {
        let mut report = SubscribeReport::default();
        if specs.is_empty() {
            self.set_state(SocketState::Subscribed);
            return Ok(report);
        }

        self.send(&codec::encode_subscribe(specs)?).await?;

        let deadline = Instant::now() + self.handshake_timeout;
        while report.confirmed.len() + report.rejected.len() < specs.len() {
            let frame = self.read_until(deadline, "subscribe ack").await?;
            let Some(control) = codec::parse_control(&frame) else {
                self.pending.push_back(frame);
                continue;
            };
            match control.event.as_str() {
                "subscribe" => report.confirmed.push(control.label()),
                "error" => {
                    let err = ConnectorError::Subscribe {
                        channel: control.label(),
                        msg: format!(
                            "{} {}",
                            control.code.as_deref().unwrap_or_default(),
                            control.msg.as_deref().unwrap_or_default()
                        ),
                    };
                    error!("[{}] {}", self.name, err);
                    report.rejected.push((
                        control.label(),
                        control.msg.unwrap_or_default(),
                    ));
                }
                other => debug!("[{}] ignoring {} event during subscribe", self.name, other),
            }
        }

        self.set_state(SocketState::Subscribed);
        info!(
            "[{}] subscribed to {:?}, rejected {:?}",
            self.name, report.confirmed, report.rejected
        );
        Ok(report)
    }

    async fn read_until(
        &mut self,
        deadline: Instant,
        what: &'static str,
    ) -> Result<String, ConnectorError> {
        let transport = self.transport.as_mut().ok_or(ConnectorError::NotConnected)?;
        match tokio::time::timeout_at(deadline, transport.recv()).await {
            Err(_) => Err(ConnectorError::Timeout(what)),
            Ok(Some(Ok(frame))) => Ok(frame),
            Ok(Some(Err(e))) => {
                self.drop_transport();
                Err(e)
            }
            Ok(None) => {
                self.drop_transport();
                Err(ConnectorError::Closed)
            }
        }
    }

    /// Next raw frame; suspends until one arrives or the socket closes
    pub async fn receive(&mut self) -> Result<String, ConnectorError> {
        if let Some(frame) = self.pending.pop_front() {
            return Ok(frame);
        }
        let transport = self.transport.as_mut().ok_or(ConnectorError::NotConnected)?;
        match transport.recv().await {
            Some(Ok(frame)) => Ok(frame),
            Some(Err(e)) => {
                self.drop_transport();
                Err(e)
            }
            None => {
                self.drop_transport();
                Err(ConnectorError::Closed)
            }
        }
    }

    pub async fn send(&mut self, frame: &str) -> Result<(), ConnectorError> {
        let transport = self.transport.as_mut().ok_or(ConnectorError::NotConnected)?;
        if let Err(e) = transport.send(frame.to_string()).await {
            self.drop_transport();
            return Err(e);
        }
        Ok(())
    }

    fn drop_transport(&mut self) {
        self.transport = None;
        self.set_state(SocketState::Disconnected);
    }

    /// Close the transport; safe to call in any state
    pub async fn close(&mut self) {
        if let Some(mut transport) = self.transport.take() {
            if let Err(e) = transport.close().await {
                debug!("[{}] close: {}", self.name, e);
            }
            info!("[{}] closed", self.name);
        }
        self.pending.clear();
        self.set_state(SocketState::Disconnected);
    }

    /// Receive loop: decode every frame and push the events onto `queue`.
    ///
    /// Runs until `shutdown` flips (returns `Ok`, socket closed) or the
    /// transport fails (returns the error). A frame that fails to decode is
    /// logged and dropped.
    pub async fn listen(
        mut self,
        decoder: FrameDecoder,
        queue: EventSender,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<(), ConnectorError> {
        self.set_state(SocketState::Listening);

        loop {
            if *shutdown.borrow() {
                break;
            }
            let frame = tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
                frame = self.receive() => frame,
            };

            let frame = match frame {
                Ok(frame) => frame,
                Err(e) => {
                    warn!("[{}] listener stopped: {}", self.name, e);
                    return Err(e);
                }
            };

            match decoder.decode(&frame) {
                Ok(events) => {
                    for event in events {
                        if queue.send(event).is_err() {
                            debug!("[{}] delivery queue closed", self.name);
                            self.close().await;
                            return Ok(());
                        }
                    }
                }
                Err(e) => error!("[{}] dropping frame: {}: {}", self.name, e, frame),
            }
        }

        self.close().await;
        Ok(())
    }
}

impl std::fmt::Debug for ChannelSocket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelSocket")
            .field("name", &self.name)
            .field("state", &self.state())
            .field("pending", &self.pending.len())
            .finish()
    }
}
