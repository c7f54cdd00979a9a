//! In-memory venue used by the integration tests.
//!
//! `FakeVenue` implements `Connector`; every transport it hands out is a pair of
//! tokio channels. The venue answers keep-alive pings, login, subscribe, order,
//! batch and cancel requests the way the exchange does, and records what
//! happened in an ordered log so tests can assert on sequencing.

#![allow(dead_code)]

use async_trait::async_trait;
use okx_connect::config::{ChannelSpec, ConnectionConfig};
use okx_connect::exchanges::{Connector, ConnectorError, Transport};
use okx_connect::{Credentials, RetryConfig};
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

pub const PUBLIC_URL: &str = "fake://public";
pub const PRIVATE_URL: &str = "fake://private";
pub const TRADE_URL: &str = "fake://trade";

enum ServerFrame {
    Text(String),
    Reset,
}

struct Peer {
    id: usize,
    url: String,
    tx: mpsc::UnboundedSender<ServerFrame>,
}

#[derive(Default)]
struct VenueState {
    log: Vec<String>,
    peers: Vec<Peer>,
    reject_login: bool,
    rejected_channels: HashSet<String>,
    ack_delay: Duration,
    mute_pongs: bool,
    failing_connects: usize,
    next_ord_id: u64,
}

#[derive(Clone, Default)]
pub struct FakeVenue {
    state: Arc<Mutex<VenueState>>,
    next_id: Arc<AtomicUsize>,
}

impl FakeVenue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reject_login(&self, reject: bool) {
        self.state.lock().unwrap().reject_login = reject;
    }

    pub fn reject_channel(&self, channel: &str) {
        self.state
            .lock()
            .unwrap()
            .rejected_channels
            .insert(channel.to_string());
    }

    /// Delay every order ack by `delay`
    pub fn ack_delay(&self, delay: Duration) {
        self.state.lock().unwrap().ack_delay = delay;
    }

    /// Stop answering pings
    pub fn mute_pongs(&self, mute: bool) {
        self.state.lock().unwrap().mute_pongs = mute;
    }

    /// Refuse the next `count` connection attempts
    pub fn fail_connects(&self, count: usize) {
        self.state.lock().unwrap().failing_connects = count;
    }

    pub fn log(&self) -> Vec<String> {
        self.state.lock().unwrap().log.clone()
    }

    pub fn connect_count(&self) -> usize {
        self.log().iter().filter(|l| l.starts_with("connect ")).count()
    }

    /// Send `frame` to every open connection on `url`
    pub fn push(&self, url: &str, frame: impl Into<String>) {
        let frame = frame.into();
        let state = self.state.lock().unwrap();
        for peer in state.peers.iter().filter(|p| p.url == url) {
            let _ = peer.tx.send(ServerFrame::Text(frame.clone()));
        }
    }

    /// Reset every open connection
    pub fn kill_all(&self) {
        let mut state = self.state.lock().unwrap();
        state.log.push("kill".to_string());
        for peer in state.peers.drain(..) {
            let _ = peer.tx.send(ServerFrame::Reset);
        }
    }

    fn record(&self, entry: String) {
        self.state.lock().unwrap().log.push(entry);
    }

    fn handle(&self, peer_id: usize, text: &str, tx: &mpsc::UnboundedSender<ServerFrame>) {
        if text == "ping" {
            if !self.state.lock().unwrap().mute_pongs {
                let _ = tx.send(ServerFrame::Text("pong".to_string()));
            }
            return;
        }
        let Ok(request) = serde_json::from_str::<Value>(text) else {
            return;
        };
        let op = request["op"].as_str().unwrap_or_default().to_string();
        let id = request["id"].as_str().unwrap_or_default().to_string();
        let args = request["args"].as_array().cloned().unwrap_or_default();

        match op.as_str() {
            "login" => {
                let reply = if self.state.lock().unwrap().reject_login {
                    json!({"event": "error", "code": "60009", "msg": "Login failed."})
                } else {
                    json!({"event": "login", "code": "0", "msg": ""})
                };
                self.record(format!("login {}", peer_id));
                let _ = tx.send(ServerFrame::Text(reply.to_string()));
            }
            "subscribe" => {
                let rejected = self.state.lock().unwrap().rejected_channels.clone();
                for arg in args {
                    let channel = arg["channel"].as_str().unwrap_or_default();
                    let reply = if rejected.contains(channel) {
                        json!({"event": "error", "code": "60018", "msg": "channel doesn't exist", "arg": arg})
                    } else {
                        json!({"event": "subscribe", "arg": arg})
                    };
                    let _ = tx.send(ServerFrame::Text(reply.to_string()));
                }
            }
            "order" | "batch-orders" | "cancel-order" => {
                let (rows, delay) = {
                    let mut state = self.state.lock().unwrap();
                    let mut rows = Vec::new();
                    for arg in &args {
                        state.next_ord_id += 1;
                        let ord_id = match arg["ordId"].as_str() {
                            Some(ord_id) => ord_id.to_string(),
                            None => state.next_ord_id.to_string(),
                        };
                        let tag = arg["clOrdId"].as_str().unwrap_or(&ord_id).to_string();
                        state.log.push(format!("{} {}", op, tag));
                        rows.push(json!({
                            "ordId": ord_id,
                            "clOrdId": arg["clOrdId"].as_str().unwrap_or_default(),
                            "sCode": "0",
                            "sMsg": ""
                        }));
                    }
                    (rows, state.ack_delay)
                };
                let reply = json!({"id": id, "op": op, "code": "0", "msg": "", "data": rows}).to_string();
                let venue = self.clone();
                let tx = tx.clone();
                tokio::spawn(async move {
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    venue.record(format!("ack {}", id));
                    let _ = tx.send(ServerFrame::Text(reply));
                });
            }
            _ => {}
        }
    }
}

#[async_trait]
impl Connector for FakeVenue {
    async fn connect(&self, url: &str) -> Result<Box<dyn Transport>, ConnectorError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        {
            let mut state = self.state.lock().unwrap();
            if state.failing_connects > 0 {
                state.failing_connects -= 1;
                state.log.push(format!("refuse {}", url));
                return Err(ConnectorError::Connection(format!("refused {}", url)));
            }
            state.log.push(format!("connect {} {}", id, url));
            state.peers.push(Peer {
                id,
                url: url.to_string(),
                tx: tx.clone(),
            });
        }
        Ok(Box::new(FakeTransport {
            id,
            venue: self.clone(),
            tx,
            rx,
        }))
    }
}

pub struct FakeTransport {
    id: usize,
    venue: FakeVenue,
    tx: mpsc::UnboundedSender<ServerFrame>,
    rx: mpsc::UnboundedReceiver<ServerFrame>,
}

#[async_trait]
impl Transport for FakeTransport {
    async fn send(&mut self, text: String) -> Result<(), ConnectorError> {
        self.venue.handle(self.id, &text, &self.tx);
        Ok(())
    }

    async fn recv(&mut self) -> Option<Result<String, ConnectorError>> {
        match self.rx.recv().await? {
            ServerFrame::Text(text) => Some(Ok(text)),
            ServerFrame::Reset => Some(Err(ConnectorError::Connection(
                "connection reset".to_string(),
            ))),
        }
    }

    async fn close(&mut self) -> Result<(), ConnectorError> {
        self.venue.record(format!("close {}", self.id));
        Ok(())
    }
}

impl Drop for FakeTransport {
    fn drop(&mut self) {
        let mut state = self.venue.state.lock().unwrap();
        state.peers.retain(|p| p.id != self.id);
        state.log.push(format!("drop {}", self.id));
    }
}

pub fn test_config() -> ConnectionConfig {
    ConnectionConfig {
        public_ws_url: PUBLIC_URL.to_string(),
        private_ws_url: PRIVATE_URL.to_string(),
        trade_ws_url: TRADE_URL.to_string(),
        credentials: Credentials::new(
            "test-api-key",
            "22582BD0CFF14C41EDBF1AB98506286D",
            "test-passphrase",
        ),
        channels_public: vec![ChannelSpec::new("candle1m").with_inst_id("BTC-USDT-SWAP")],
        keepalive_interval_ms: 60_000,
        response_timeout_ms: 2_000,
        retry: RetryConfig {
            max_attempts: 3,
            initial_delay_ms: 10,
            max_delay_ms: 50,
            multiplier: 2.0,
            jitter: false,
        },
        ..ConnectionConfig::default()
    }
}

pub fn candle_push(ts: i64, close: f64) -> String {
    json!({
        "arg": {"channel": "candle1m", "instId": "BTC-USDT-SWAP"},
        "data": [[ts.to_string(), "1", "2", "0.5", close.to_string(), "10", "0", "0", "1"]]
    })
    .to_string()
}

pub fn order_push(cl_ord_id: &str, state: &str, fill_sz: &str) -> String {
    json!({
        "arg": {"channel": "orders", "instType": "ANY"},
        "data": [{
            "clOrdId": cl_ord_id,
            "instId": "BTC-USDT-SWAP",
            "instType": "SWAP",
            "posSide": "net",
            "side": "buy",
            "sz": "1",
            "fillSz": fill_sz,
            "fillPx": "30000",
            "fillTime": "1597026383085",
            "state": state,
            "lever": "3",
            "fee": "-0.01",
            "pnl": "0",
            "cTime": "1597026383000"
        }]
    })
    .to_string()
}

/// Poll `condition` every 10 ms until it holds or `timeout` passes
pub async fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
