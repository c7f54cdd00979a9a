use crate::auth::Signer;
use crate::config::ConnectionConfig;
use crate::core::{event_queue, signalled, Event, EventReceiver, EventSender};
use crate::error::ConfigError;
use crate::exchanges::channel_socket::{ChannelSocket, SocketState};
use crate::exchanges::codec::{self, FrameDecoder, PING, PONG};
use crate::exchanges::rest::RestClient;
use crate::exchanges::{Connector, ConnectorError, RestError, WsConnector};
use crate::monitoring::{AlertLevel, AlertManager};
use crate::realtime::retry_with_backoff;
use crate::types::{
    Candle, InstrumentInfo, InstrumentType, Order, OrderCancel, OrderResponse, OrderStatus,
    TradingMode,
};
use log::{debug, error, info, warn};
use serde_json::Value;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval};

pub const HISTORY_CANDLES_PATH: &str = "/api/v5/market/history-candles";
pub const INSTRUMENTS_PATH: &str = "/api/v5/public/instruments";
pub const SET_LEVERAGE_PATH: &str = "/api/v5/account/set-leverage";
pub const PLACE_ORDER_PATH: &str = "/api/v5/trade/order";

/// The three streaming channels owned by the manager
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelKind {
    /// Public candles, no auth
    MarketData,
    /// Account, positions and order updates
    AccountState,
    /// Order requests and keep-alive
    OrderEntry,
}

impl ChannelKind {
    pub fn name(&self) -> &'static str {
        match self {
            ChannelKind::MarketData => "market-data",
            ChannelKind::AccountState => "account-state",
            ChannelKind::OrderEntry => "order-entry",
        }
    }
}

type FailureSender = mpsc::UnboundedSender<(u64, ConnectorError)>;
type FailureReceiver = mpsc::UnboundedReceiver<(u64, ConnectorError)>;

async fn next_tick(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

fn dry_run_response(op: &str, id: &str) -> OrderResponse {
    OrderResponse {
        op: op.to_string(),
        id: id.to_string(),
        status: OrderStatus::Error,
        code: "dry-run".to_string(),
        msg: "dry run: request not sent".to_string(),
        order_id: None,
        client_order_id: Some(id.to_string()),
    }
}

/// Order-entry socket plus the bookkeeping that must change under the same lock
struct OrderEntry {
    socket: ChannelSocket,
    /// Request ids of cancels whose acks have not been read yet
    outstanding_cancels: HashSet<String>,
    /// Shutdown signal of the session the socket belongs to
    shutdown: watch::Receiver<bool>,
}

impl OrderEntry {
    /// Send `frame` and read until the reply carrying `id` arrives
    async fn request(
        &mut self,
        frame: &str,
        id: &str,
        queue: &EventSender,
        timeout: Duration,
    ) -> Result<String, ConnectorError> {
        self.socket.send(frame).await?;
        let deadline = Instant::now() + timeout;
        loop {
            let text = tokio::time::timeout_at(deadline, self.socket.receive())
                .await
                .map_err(|_| ConnectorError::Timeout("order response"))??;
            if text == PONG {
                continue;
            }
            match codec::response_id(&text) {
                Some(response_id) if response_id == id => return Ok(text),
                _ => self.handle_stray(&text, Some(id), queue),
            }
        }
    }

    async fn ping(&mut self, queue: &EventSender, timeout: Duration) -> Result<(), ConnectorError> {
        self.socket.send(PING).await?;
        let deadline = Instant::now() + timeout;
        loop {
            let text = tokio::time::timeout_at(deadline, self.socket.receive())
                .await
                .map_err(|_| ConnectorError::Timeout("pong"))??;
            if text == PONG {
                return Ok(());
            }
            self.handle_stray(&text, None, queue);
        }
    }

    /// Route a frame nobody is waiting for onto the delivery queue
    fn handle_stray(&mut self, text: &str, expected: Option<&str>, queue: &EventSender) {
        let Some(response_id) = codec::response_id(text) else {
            debug!("[order-entry] ignoring frame {}", text);
            return;
        };
        if !self.outstanding_cancels.remove(&response_id) {
            let err = ConnectorError::RequestResponseMismatch {
                expected: expected.unwrap_or("<none>").to_string(),
                got: response_id,
            };
            warn!("[order-entry] {}", err);
        }
        match codec::decode_order_response(text) {
            Ok(response) => {
                let _ = queue.send(Event::OrderResponse(response));
            }
            Err(e) => error!("[order-entry] dropping frame: {}: {}", e, text),
        }
    }
}

/// Tasks of one successful bring-up
struct Session {
    /// Value of `ConnectionManager::generation` while this session is live
    generation: u64,
    /// Flipped on teardown; listeners and keep-alive watch it
    shutdown: watch::Sender<bool>,
    /// Two listeners and the keep-alive
    tasks: Vec<JoinHandle<()>>,
}

/// Per-channel state senders, shared with every socket generation so
/// observers survive reconnects
struct ChannelStates {
    market: Arc<watch::Sender<SocketState>>,
    account: Arc<watch::Sender<SocketState>>,
    order_entry: Arc<watch::Sender<SocketState>>,
}

impl ChannelStates {
    fn new() -> Self {
        let channel = || Arc::new(watch::channel(SocketState::Disconnected).0);
        Self {
            market: channel(),
            account: channel(),
            order_entry: channel(),
        }
    }

    fn get(&self, kind: ChannelKind) -> &Arc<watch::Sender<SocketState>> {
        match kind {
            ChannelKind::MarketData => &self.market,
            ChannelKind::AccountState => &self.account,
            ChannelKind::OrderEntry => &self.order_entry,
        }
    }
}

/// Owns the market-data, account-state and order-entry channels.
///
/// Sessions are all-or-nothing: a reconnect stops every task of the previous
/// session and closes all three sockets before opening new ones.
pub struct ConnectionManager {
    config: ConnectionConfig,
    /// Opens every websocket; swapped for an in-memory venue in tests
    connector: Arc<dyn Connector>,
    signer: Signer,
    rest: RestClient,
    decoder: FrameDecoder,
    alerts: Arc<AlertManager>,
    /// Producer side of the delivery queue, cloned into each listener
    queue: EventSender,
    /// Consumer side, handed out once
    receiver: std::sync::Mutex<Option<EventReceiver>>,
    /// Order-entry socket; the lock serializes request/response pairs
    order_entry: Arc<Mutex<OrderEntry>>,
    /// Live session, `None` before start and after close
    session: Mutex<Option<Session>>,
    /// Count of successful sessions
    generation: AtomicU64,
    states: ChannelStates,
    /// Transport failures tagged with the session that saw them
    failures_tx: FailureSender,
    failures_rx: Mutex<FailureReceiver>,
    /// Set once by `close`; stops the supervisor
    closed: watch::Sender<bool>,
    supervisor: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl ConnectionManager {
    pub fn new(
        config: ConnectionConfig,
        connector: Arc<dyn Connector>,
        alerts: Arc<AlertManager>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let signer = Signer::new(config.credentials.secret_key.expose())?;
        let rest = RestClient::new(
            config.rest_url.clone(),
            config.credentials.clone(),
            config.rest_timeout(),
        )?;
        let (queue, receiver) = event_queue();
        let (failures_tx, failures_rx) = mpsc::unbounded_channel();
        let states = ChannelStates::new();
        let order_entry = OrderEntry {
            socket: ChannelSocket::with_state(
                ChannelKind::OrderEntry.name(),
                Arc::clone(&connector),
                config.response_timeout(),
                Arc::clone(&states.order_entry),
            ),
            outstanding_cancels: HashSet::new(),
            shutdown: watch::channel(false).1,
        };

        Ok(Self {
            decoder: FrameDecoder::new(config.quote_ccy.clone()),
            config,
            connector,
            signer,
            rest,
            alerts,
            queue,
            receiver: std::sync::Mutex::new(Some(receiver)),
            order_entry: Arc::new(Mutex::new(order_entry)),
            session: Mutex::new(None),
            generation: AtomicU64::new(0),
            states,
            failures_tx,
            failures_rx: Mutex::new(failures_rx),
            closed: watch::channel(false).0,
            supervisor: std::sync::Mutex::new(None),
        })
    }

    /// Manager over real websocket connections
    pub fn with_websocket(
        config: ConnectionConfig,
        alerts: Arc<AlertManager>,
    ) -> Result<Self, ConfigError> {
        let connector = Arc::new(WsConnector::new(config.connect_timeout()));
        Self::new(config, connector, alerts)
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    pub fn rest(&self) -> &RestClient {
        &self.rest
    }

    /// Take the consumer half of the delivery queue; only the first call gets it
    pub fn take_event_receiver(&self) -> Option<EventReceiver> {
        self.receiver.lock().ok().and_then(|mut receiver| receiver.take())
    }

    /// Number of sessions successfully opened so far
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    pub fn channel_state(&self, kind: ChannelKind) -> SocketState {
        *self.states.get(kind).borrow()
    }

    pub fn watch_channel_state(&self, kind: ChannelKind) -> watch::Receiver<SocketState> {
        self.states.get(kind).subscribe()
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    /// Bring up all three channels, then supervise them.
    ///
    /// Any failing step closes whatever was opened and returns the error.
    pub async fn start(self: &Arc<Self>) -> Result<(), ConnectorError> {
        if self.is_closed() {
            return Err(ConnectorError::InvalidState("connection closed"));
        }
        let already_started = self
            .supervisor
            .lock()
            .map(|supervisor| supervisor.is_some())
            .unwrap_or(true);
        if already_started {
            return Err(ConnectorError::InvalidState("already started"));
        }

        self.open_session().await?;

        let manager = Arc::clone(self);
        let handle = tokio::spawn(async move { manager.supervise().await });
        if let Ok(mut supervisor) = self.supervisor.lock() {
            *supervisor = Some(handle);
        }
        Ok(())
    }

    /// Tear down the current session and open a new one
    pub async fn reconnect(&self) -> Result<(), ConnectorError> {
        self.open_session().await
    }

    async fn open_session(&self) -> Result<(), ConnectorError> {
        let mut session = self.session.lock().await;
        if self.is_closed() {
            return Err(ConnectorError::InvalidState("connection closed"));
        }
        if let Some(old) = session.take() {
            self.teardown(old).await;
        }

        let generation = self.generation() + 1;
        info!("Opening session {}", generation);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let mut market = self.socket(ChannelKind::MarketData);
        let mut account = self.socket(ChannelKind::AccountState);

        if let Err(e) = self
            .bring_up(&mut market, &mut account, shutdown_rx.clone())
            .await
        {
            error!("Session {} failed to start: {}", generation, e);
            market.close().await;
            account.close().await;
            self.order_entry.lock().await.socket.close().await;
            return Err(e);
        }

        self.generation.store(generation, Ordering::SeqCst);
        let tasks = vec![
            self.spawn_listener(market, generation, shutdown_rx.clone()),
            self.spawn_listener(account, generation, shutdown_rx.clone()),
            self.spawn_keepalive(generation, shutdown_rx),
        ];
        *session = Some(Session {
            generation,
            shutdown: shutdown_tx,
            tasks,
        });
        info!("Session {} is up", generation);
        Ok(())
    }

    fn socket(&self, kind: ChannelKind) -> ChannelSocket {
        ChannelSocket::with_state(
            kind.name(),
            Arc::clone(&self.connector),
            self.config.response_timeout(),
            Arc::clone(self.states.get(kind)),
        )
    }

    async fn bring_up(
        &self,
        market: &mut ChannelSocket,
        account: &mut ChannelSocket,
        shutdown: watch::Receiver<bool>,
    ) -> Result<(), ConnectorError> {
        market.connect(&self.config.public_ws_url).await?;
        market.subscribe(&self.config.channels_public).await?;

        account.connect(&self.config.private_ws_url).await?;
        if self.authenticate(account).await? {
            account.subscribe(&self.config.channels_private).await?;
        }

        let mut entry = self.order_entry.lock().await;
        entry.socket.connect(&self.config.trade_ws_url).await?;
        self.authenticate(&mut entry.socket).await?;
        entry.outstanding_cancels.clear();
        entry.shutdown = shutdown;
        Ok(())
    }

    /// Log in on `socket`. A rejected login is reported and leaves the socket
    /// `Connected`; only transport errors fail.
    async fn authenticate(&self, socket: &mut ChannelSocket) -> Result<bool, ConnectorError> {
        match socket.login(&self.config.credentials, &self.signer).await {
            Ok(()) => Ok(true),
            Err(ConnectorError::Auth { code, msg }) => {
                warn!("[{}] continuing unauthenticated: {} {}", socket.name(), code, msg);
                self.alerts
                    .emit(
                        AlertLevel::Warning,
                        socket.name(),
                        format!("Login rejected on {}: {} {}", socket.name(), code, msg),
                    )
                    .await;
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    fn spawn_listener(
        &self,
        socket: ChannelSocket,
        generation: u64,
        shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        let decoder = self.decoder.clone();
        let queue = self.queue.clone();
        let failures = self.failures_tx.clone();
        tokio::spawn(async move {
            let name = socket.name().to_string();
            if let Err(e) = socket.listen(decoder, queue, shutdown).await {
                error!("[{}] transport failure in session {}: {}", name, generation, e);
                let _ = failures.send((generation, e));
            }
        })
    }

    fn spawn_keepalive(&self, generation: u64, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        let entry = Arc::clone(&self.order_entry);
        let queue = self.queue.clone();
        let failures = self.failures_tx.clone();
        let interval = self.config.keepalive_interval();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = signalled(&mut shutdown) => return,
                    _ = tokio::time::sleep(interval) => {}
                }
                let result = tokio::select! {
                    _ = signalled(&mut shutdown) => return,
                    result = async {
                        let mut entry = entry.lock().await;
                        entry.ping(&queue, interval).await
                    } => result,
                };
                if let Err(e) = result {
                    error!("[order-entry] keep-alive failed in session {}: {}", generation, e);
                    let _ = failures.send((generation, e));
                    return;
                }
            }
        })
    }

    /// Stop every task of `session`, then close the order-entry socket
    async fn teardown(&self, session: Session) {
        debug!("Tearing down session {}", session.generation);
        session.shutdown.send_replace(true);
        for task in session.tasks {
            if let Err(e) = task.await {
                if e.is_panic() {
                    error!("Session {} task panicked: {}", session.generation, e);
                }
            }
        }
        self.order_entry.lock().await.socket.close().await;
    }

    async fn supervise(self: Arc<Self>) {
        let mut failures = self.failures_rx.lock().await;
        let mut closed = self.closed.subscribe();
        let mut periodic = self
            .config
            .reconnect_interval()
            .map(|period| tokio::time::interval_at(Instant::now() + period, period));

        loop {
            let reason = tokio::select! {
                _ = signalled(&mut closed) => break,
                failure = failures.recv() => match failure {
                    Some((generation, e)) if generation == self.generation() => e.to_string(),
                    Some((generation, e)) => {
                        debug!("Ignoring failure from old session {}: {}", generation, e);
                        continue;
                    }
                    None => break,
                },
                _ = next_tick(&mut periodic) => "periodic reconnect".to_string(),
            };
            if self.is_closed() {
                break;
            }

            warn!("Reconnecting: {}", reason);
            match retry_with_backoff(&self.config.retry, "reconnect", || self.open_session()).await {
                Ok(()) => info!("Reconnected, session {}", self.generation()),
                Err(_) if self.is_closed() => break,
                Err(e) => {
                    self.alerts
                        .emit(
                            AlertLevel::Critical,
                            "connection",
                            format!(
                                "Reconnect failed after {} attempts: {}",
                                self.config.retry.max_attempts.max(1),
                                e
                            ),
                        )
                        .await
                }
            }
        }
        debug!("Supervisor stopped");
    }

    /// Stop supervising, cancel every task and close all sockets. Idempotent.
    pub async fn close(&self) {
        if self.closed.send_replace(true) {
            return;
        }
        info!("Closing connection");
        let supervisor = self.supervisor.lock().ok().and_then(|mut s| s.take());
        if let Some(handle) = supervisor {
            handle.abort();
        }
        if let Some(session) = self.session.lock().await.take() {
            self.teardown(session).await;
        }
        self.order_entry.lock().await.socket.close().await;
    }

    /// Place one order and wait for its ack.
    ///
    /// Calls are serialized: a second call waits until the first has its ack.
    /// If the session is torn down or the channel fails before the ack arrives,
    /// the result is `ConnectorError::OrderIndeterminate`: the order may or may
    /// not have reached the venue.
    pub async fn place_order(&self, order: &Order) -> Result<OrderResponse, ConnectorError> {
        if self.config.dry_run {
            info!("[dry-run] place order {:?}", order);
            return Ok(dry_run_response("order", order.id()));
        }
        let frame = codec::encode_order(order);
        let text = self.correlated(&frame, order.id()).await?;
        Ok(codec::decode_order_response(&text)?)
    }

    /// Place several orders in one `batch-orders` request
    pub async fn place_orders(&self, orders: &[Order]) -> Result<Vec<OrderResponse>, ConnectorError> {
        if orders.is_empty() {
            return Ok(Vec::new());
        }
        if self.config.dry_run {
            info!("[dry-run] place {} orders", orders.len());
            return Ok(orders
                .iter()
                .map(|o| dry_run_response("batch-orders", o.id()))
                .collect());
        }
        let (id, frame) = codec::encode_batch_orders(orders);
        let text = self.correlated(&frame, &id).await?;
        Ok(codec::decode_batch_response(&text)?)
    }

    async fn correlated(&self, frame: &str, id: &str) -> Result<String, ConnectorError> {
        let mut entry = self.order_entry.lock().await;
        let mut shutdown = entry.shutdown.clone();
        let timeout = self.config.response_timeout();
        let result = tokio::select! {
            result = entry.request(frame, id, &self.queue, timeout) => result,
            _ = signalled(&mut shutdown) => {
                warn!("[order-entry] request {} abandoned by reconnect", id);
                return Err(ConnectorError::OrderIndeterminate(id.to_string()));
            }
        };
        match result {
            Err(ConnectorError::NotConnected) => Err(ConnectorError::NotConnected),
            Err(e) if e.is_transport() => {
                error!("[order-entry] request {} lost: {}", id, e);
                let _ = self
                    .failures_tx
                    .send((self.generation(), ConnectorError::Connection(e.to_string())));
                Err(ConnectorError::OrderIndeterminate(id.to_string()))
            }
            other => other,
        }
    }

    /// Send a cancel without waiting; the ack is delivered on the event queue.
    ///
    /// Returns the request id.
    pub async fn cancel_order(&self, cancel: &OrderCancel) -> Result<String, ConnectorError> {
        let (id, frame) = codec::encode_cancel(cancel);
        if self.config.dry_run {
            info!("[dry-run] cancel {:?}", cancel);
            return Ok(id);
        }
        let mut entry = self.order_entry.lock().await;
        entry.socket.send(&frame).await?;
        entry.outstanding_cancels.insert(id.clone());
        Ok(id)
    }

    /// Most recent `count` bars in ascending time order.
    ///
    /// Pages backwards with the venue's `after` cursor until enough bars are
    /// collected or history runs out.
    pub async fn get_history_candles(
        &self,
        inst_id: &str,
        timeframe: &str,
        count: usize,
    ) -> Result<Vec<Candle>, RestError> {
        let page = self.config.history_page_size.max(1);
        let mut candles: Vec<Candle> = Vec::with_capacity(count);
        let mut after: Option<i64> = None;

        while candles.len() < count {
            let mut params = vec![
                ("instId", inst_id.to_string()),
                ("bar", timeframe.to_string()),
                ("limit", page.to_string()),
            ];
            if let Some(ts) = after {
                params.push(("after", ts.to_string()));
            }
            let body = self.rest.get(HISTORY_CANDLES_PATH, &params).await?;
            let mut batch = codec::decode_history_candles(inst_id, timeframe, body)?;
            let fetched = batch.len();
            if fetched == 0 {
                break;
            }
            after = batch.first().map(Candle::timestamp_ms);
            batch.append(&mut candles);
            candles = batch;
            if fetched < page {
                break;
            }
        }

        let skip = candles.len().saturating_sub(count);
        Ok(candles.split_off(skip))
    }

    /// Instrument metadata; `uly` narrows derivatives, `inst_id` picks one instrument
    pub async fn get_instrument_info(
        &self,
        inst_type: InstrumentType,
        uly: Option<&str>,
        inst_id: Option<&str>,
    ) -> Result<InstrumentInfo, RestError> {
        let mut params = vec![("instType", codec::inst_type_to_wire(inst_type).to_string())];
        if let Some(uly) = uly {
            params.push(("uly", uly.to_string()));
        }
        if let Some(inst_id) = inst_id {
            params.push(("instId", inst_id.to_string()));
        }
        let body = self.rest.get(INSTRUMENTS_PATH, &params).await?;
        Ok(codec::decode_instrument_info(body, inst_id)?)
    }

    pub async fn set_leverage(
        &self,
        inst_id: &str,
        leverage: u32,
        margin_mode: TradingMode,
    ) -> Result<Value, RestError> {
        let params = [
            ("instId", inst_id.to_string()),
            ("lever", leverage.to_string()),
            ("mgnMode", codec::trading_mode_to_wire(margin_mode).to_string()),
        ];
        self.rest.post(SET_LEVERAGE_PATH, &params).await
    }

    /// Place an order over REST instead of the order-entry channel
    pub async fn place_order_rest(&self, order: &Order) -> Result<OrderResponse, RestError> {
        if self.config.dry_run {
            info!("[dry-run] place order over REST {:?}", order);
            return Ok(dry_run_response("order", order.id()));
        }
        let args = codec::order_args(order);
        let params: Vec<(&str, String)> = args
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str().unwrap_or_default().to_string()))
            .collect();
        let body = self.rest.post(PLACE_ORDER_PATH, &params).await?;
        Ok(codec::decode_rest_order_response(body, order.id())?)
    }
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("generation", &self.generation())
            .field("closed", &self.is_closed())
            .finish()
    }
}
