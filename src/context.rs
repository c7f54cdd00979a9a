use crate::config::ConnectionConfig;
use crate::error::ConfigError;
use crate::exchanges::{ConnectionManager, Connector};
use crate::monitoring::AlertManager;
use std::sync::Arc;

/// Per-process handles shared by the runtime and the policy
#[derive(Debug, Clone)]
pub struct TradingContext {
    pub connection: Arc<ConnectionManager>,
    pub alerts: Arc<AlertManager>,
}

impl TradingContext {
    /// Context over real websocket connections
    pub fn new(config: ConnectionConfig) -> Result<Self, ConfigError> {
        let alerts = Arc::new(AlertManager::default());
        let connection = ConnectionManager::with_websocket(config, Arc::clone(&alerts))?;
        Ok(Self {
            connection: Arc::new(connection),
            alerts,
        })
    }

    pub fn with_connector(
        config: ConnectionConfig,
        connector: Arc<dyn Connector>,
        alerts: Arc<AlertManager>,
    ) -> Result<Self, ConfigError> {
        let connection = ConnectionManager::new(config, connector, Arc::clone(&alerts))?;
        Ok(Self {
            connection: Arc::new(connection),
            alerts,
        })
    }
}
