use crate::auth::Credentials;
use crate::error::ConfigError;
use crate::realtime::RetryConfig;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

/// One subscription argument, e.g. `{"channel":"candle1m","instId":"BTC-USDT-SWAP"}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelSpec {
    pub channel: String,
    #[serde(rename = "instId", default, skip_serializing_if = "Option::is_none")]
    pub inst_id: Option<String>,
    #[serde(rename = "instType", default, skip_serializing_if = "Option::is_none")]
    pub inst_type: Option<String>,
    /// Any further filters the venue accepts (`ccy`, `uly`, ...)
    #[serde(flatten)]
    pub extra: BTreeMap<String, String>,
}

impl ChannelSpec {
    pub fn new(channel: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            inst_id: None,
            inst_type: None,
            extra: BTreeMap::new(),
        }
    }

    pub fn with_inst_id(mut self, inst_id: impl Into<String>) -> Self {
        self.inst_id = Some(inst_id.into());
        self
    }

    pub fn with_inst_type(mut self, inst_type: impl Into<String>) -> Self {
        self.inst_type = Some(inst_type.into());
        self
    }

    pub fn with_filter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    /// Short name for logs, e.g. `candle1m:BTC-USDT-SWAP`
    pub fn label(&self) -> String {
        match (&self.inst_id, &self.inst_type) {
            (Some(inst_id), _) => format!("{}:{}", self.channel, inst_id),
            (None, Some(inst_type)) => format!("{}:{}", self.channel, inst_type),
            (None, None) => self.channel.clone(),
        }
    }
}

/// Connection manager configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Market-data websocket (no auth)
    pub public_ws_url: String,
    /// Account-state websocket
    pub private_ws_url: String,
    /// Order-entry websocket
    pub trade_ws_url: String,
    /// REST base URL, paths are appended as-is
    pub rest_url: String,
    /// API key, secret and passphrase for login and request signing
    pub credentials: Credentials,
    /// Subscriptions on the market-data channel
    pub channels_public: Vec<ChannelSpec>,
    /// Subscriptions on the account-state channel
    pub channels_private: Vec<ChannelSpec>,
    /// Currency excluded from `Account::in_coins_usd`
    pub quote_ccy: String,
    /// Ping period on the order-entry channel; also the pong deadline
    pub keepalive_interval_ms: u64,
    /// Unconditional full reconnect period, off when unset
    pub reconnect_interval_ms: Option<u64>,
    /// Bound on waiting for handshake acks and order responses
    pub response_timeout_ms: u64,
    /// Bound on opening one websocket
    pub connect_timeout_ms: u64,
    /// Per-request REST timeout
    pub rest_timeout_ms: u64,
    /// Rows per history page
    pub history_page_size: usize,
    /// Log order operations instead of sending them
    pub dry_run: bool,
    /// Back-off for reconnect attempts
    pub retry: RetryConfig,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            public_ws_url: "wss://ws.okx.com:8443/ws/v5/public".to_string(),
            private_ws_url: "wss://ws.okx.com:8443/ws/v5/private".to_string(),
            trade_ws_url: "wss://ws.okx.com:8443/ws/v5/private".to_string(),
            rest_url: "https://www.okx.com".to_string(),
            credentials: Credentials::default(),
            channels_public: Vec::new(),
            channels_private: vec![
                ChannelSpec::new("account"),
                ChannelSpec::new("positions").with_inst_type("ANY"),
                ChannelSpec::new("orders").with_inst_type("ANY"),
            ],
            quote_ccy: "USDT".to_string(),
            keepalive_interval_ms: 20_000,
            reconnect_interval_ms: None,
            response_timeout_ms: 10_000,
            connect_timeout_ms: 10_000,
            rest_timeout_ms: 10_000,
            history_page_size: 100,
            dry_run: false,
            retry: RetryConfig::default(),
        }
    }
}

impl ConnectionConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    /// Check the settings the manager cannot run without
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.credentials.validate()?;
        for (name, url) in [
            ("public_ws_url", &self.public_ws_url),
            ("private_ws_url", &self.private_ws_url),
            ("trade_ws_url", &self.trade_ws_url),
            ("rest_url", &self.rest_url),
        ] {
            if url.is_empty() {
                return Err(ConfigError::Empty(name));
            }
        }
        if self.history_page_size == 0 {
            return Err(ConfigError::Empty("history_page_size"));
        }
        for (name, value) in [
            ("keepalive_interval_ms", Some(self.keepalive_interval_ms)),
            ("reconnect_interval_ms", self.reconnect_interval_ms),
            ("response_timeout_ms", Some(self.response_timeout_ms)),
        ] {
            if value == Some(0) {
                return Err(ConfigError::Zero(name));
            }
        }
        Ok(())
    }

    pub fn keepalive_interval(&self) -> Duration {
        Duration::from_millis(self.keepalive_interval_ms)
    }

    pub fn reconnect_interval(&self) -> Option<Duration> {
        self.reconnect_interval_ms.map(Duration::from_millis)
    }

    pub fn response_timeout(&self) -> Duration {
        Duration::from_millis(self.response_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn rest_timeout(&self) -> Duration {
        Duration::from_millis(self.rest_timeout_ms)
    }
}

/// Strategy runtime configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Strategy name used in alerts
    pub name: String,
    /// How often the watchdog checks the policy task
    pub watchdog_interval_ms: u64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            name: "strategy".to_string(),
            watchdog_interval_ms: 1_000,
        }
    }
}

impl RuntimeConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.is_empty() {
            return Err(ConfigError::Empty("runtime name"));
        }
        if self.watchdog_interval_ms == 0 {
            return Err(ConfigError::Zero("watchdog_interval_ms"));
        }
        Ok(())
    }

    pub fn watchdog_interval(&self) -> Duration {
        Duration::from_millis(self.watchdog_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ConnectionConfig::default();
        assert_eq!(config.quote_ccy, "USDT");
        assert_eq!(config.keepalive_interval(), Duration::from_secs(20));
        assert_eq!(config.history_page_size, 100);
        assert!(config.reconnect_interval().is_none());
        assert!(!config.dry_run);
    }

    #[test]
    fn test_from_json_with_partial_fields() {
        let config = ConnectionConfig::from_json_str(
            r#"{
                "public_ws_url": "ws://localhost:1/public",
                "credentials": {"api_key": "k", "secret_key": "s", "passphrase": "p"},
                "channels_public": [
                    {"channel": "candle1m", "instId": "BTC-USDT-SWAP"},
                    {"channel": "tickers", "instId": "ETH-USDT", "extra": "x"}
                ],
                "reconnect_interval_ms": 3600000,
                "dry_run": true
            }"#,
        )
        .unwrap();

        assert_eq!(config.public_ws_url, "ws://localhost:1/public");
        assert_eq!(config.trade_ws_url, ConnectionConfig::default().trade_ws_url);
        assert_eq!(config.channels_public.len(), 2);
        assert_eq!(config.channels_public[0].label(), "candle1m:BTC-USDT-SWAP");
        assert_eq!(
            config.channels_public[1].extra.get("extra").map(String::as_str),
            Some("x")
        );
        assert_eq!(config.reconnect_interval(), Some(Duration::from_secs(3600)));
        assert!(config.dry_run);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_periods() {
        let valid = ConnectionConfig {
            credentials: Credentials::new("key", "secret", "phrase"),
            ..ConnectionConfig::default()
        };
        assert!(valid.validate().is_ok());

        let config = ConnectionConfig {
            reconnect_interval_ms: Some(0),
            ..valid.clone()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Zero("reconnect_interval_ms"))
        ));

        let config = ConnectionConfig {
            keepalive_interval_ms: 0,
            ..valid.clone()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Zero("keepalive_interval_ms"))
        ));

        let config = ConnectionConfig {
            response_timeout_ms: 0,
            ..valid
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Zero("response_timeout_ms"))
        ));
    }

    #[test]
    fn test_runtime_config_validation() {
        assert!(RuntimeConfig::new("trend").validate().is_ok());
        assert!(matches!(
            RuntimeConfig::new("").validate(),
            Err(ConfigError::Empty("runtime name"))
        ));
        let config = RuntimeConfig {
            watchdog_interval_ms: 0,
            ..RuntimeConfig::new("trend")
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Zero("watchdog_interval_ms"))
        ));
    }

    #[test]
    fn test_validate_requires_credentials() {
        let config = ConnectionConfig::default();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_channel_spec_serializes_venue_names() {
        let spec = ChannelSpec::new("positions")
            .with_inst_type("SWAP")
            .with_filter("instFamily", "BTC-USD");
        let json = serde_json::to_value(&spec).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"channel": "positions", "instType": "SWAP", "instFamily": "BTC-USD"})
        );
    }
}
