use crate::types::RingBuffer;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Alert level
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AlertLevel {
    Info,
    Warning,
    Error,
    Critical,
}

/// An operational alert
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub level: AlertLevel,
    pub component: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

/// Delivery target for alerts, e.g. a chat bot
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn deliver(&self, alert: &Alert);
}

/// Operational alert channel.
///
/// Every alert is logged at its level, kept in a bounded history and handed to
/// each registered sink.
pub struct AlertManager {
    alerts: RwLock<RingBuffer<Alert>>,
    sinks: RwLock<Vec<Arc<dyn AlertSink>>>,
}

impl AlertManager {
    /// Keep at most `max_alerts` recent alerts
    pub fn new(max_alerts: usize) -> Self {
        Self {
            alerts: RwLock::new(RingBuffer::new(max_alerts)),
            sinks: RwLock::new(Vec::new()),
        }
    }

    /// Emit an alert
    pub async fn emit(&self, level: AlertLevel, component: &str, message: impl Into<String>) {
        let alert = Alert {
            level,
            component: component.to_string(),
            message: message.into(),
            timestamp: Utc::now(),
        };

        match level {
            AlertLevel::Info => log::info!("[{}] {}", component, alert.message),
            AlertLevel::Warning => log::warn!("[{}] {}", component, alert.message),
            AlertLevel::Error => log::error!("[{}] {}", component, alert.message),
            AlertLevel::Critical => log::error!("[CRITICAL] [{}] {}", component, alert.message),
        }

        self.alerts.write().await.push(alert.clone());

        let sinks = self.sinks.read().await.clone();
        for sink in sinks {
            sink.deliver(&alert).await;
        }
    }

    pub async fn add_sink(&self, sink: Arc<dyn AlertSink>) {
        self.sinks.write().await.push(sink);
    }

    /// Most recent alerts, newest first
    pub async fn recent(&self, count: usize) -> Vec<Alert> {
        let alerts = self.alerts.read().await;
        alerts.iter().rev().take(count).cloned().collect()
    }

    pub async fn by_level(&self, level: AlertLevel) -> Vec<Alert> {
        let alerts = self.alerts.read().await;
        alerts.iter().filter(|a| a.level == level).cloned().collect()
    }

    pub async fn clear(&self) {
        self.alerts.write().await.clear();
    }
}

impl std::fmt::Debug for AlertManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlertManager").finish_non_exhaustive()
    }
}

impl Default for AlertManager {
    fn default() -> Self {
        Self::new(1000)
    }
}
