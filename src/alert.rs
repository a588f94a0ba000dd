use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::models::{AlertEntry, AlertLevel};

#[derive(Debug)]
pub enum AlertError {
    Send(String),
    Cancelled,
}

impl std::fmt::Display for AlertError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Send(e) => write!(f, "Alert delivery failed: {e}"),
            Self::Cancelled => write!(f, "Alert delivery was cancelled"),
        }
    }
}

impl std::error::Error for AlertError {}

/// Delivery seam for notification backends (mail, chat bots, ...).
///
/// `requires_network_check` is an explicit capability flag: senders that
/// talk to an external service announce it here instead of being detected
/// by inspecting their concrete type.
pub trait AlertSender: Send + Sync {
    fn name(&self) -> &str;

    fn requires_network_check(&self) -> bool;

    fn health_check(&self) -> impl std::future::Future<Output = bool> + Send;

    fn send_alert(
        &self,
        entry: &AlertEntry,
        shutdown: &watch::Receiver<bool>,
    ) -> impl std::future::Future<Output = Result<(), AlertError>> + Send;
}

/// Ships alerts to the process log. Always healthy, never touches the
/// network; stands in where no external sender is configured.
pub struct LogAlertSender;

impl AlertSender for LogAlertSender {
    fn name(&self) -> &str {
        "log"
    }

    fn requires_network_check(&self) -> bool {
        false
    }

    async fn health_check(&self) -> bool {
        true
    }

    async fn send_alert(
        &self,
        entry: &AlertEntry,
        shutdown: &watch::Receiver<bool>,
    ) -> Result<(), AlertError> {
        if *shutdown.borrow() {
            return Err(AlertError::Cancelled);
        }
        match entry.level {
            AlertLevel::Info => tracing::info!("[{}] {}", entry.drive_letter, entry.message),
            AlertLevel::Warning => tracing::warn!("[{}] {}", entry.drive_letter, entry.message),
            AlertLevel::Error => tracing::error!("[{}] {}", entry.drive_letter, entry.message),
        }
        Ok(())
    }
}

/// Last alert the loop delivered for a drive. Used to keep quiet while an
/// alert condition stays unchanged tick after tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriveAlertState {
    pub level: AlertLevel,
    pub message: String,
}

pub type AlertStateMap = HashMap<String, DriveAlertState>;

/// Injected persistence for the per-drive alert state, so the loop holds
/// plain data instead of an ambient singleton.
pub trait AlertStateStore {
    fn load(&self) -> std::io::Result<AlertStateMap>;
    fn save(&self, state: &AlertStateMap) -> std::io::Result<()>;
}

pub struct JsonFileStateStore {
    path: PathBuf,
}

impl JsonFileStateStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl AlertStateStore for JsonFileStateStore {
    fn load(&self) -> std::io::Result<AlertStateMap> {
        if !self.path.exists() {
            return Ok(AlertStateMap::new());
        }
        let raw = std::fs::read_to_string(&self.path)?;
        serde_json::from_str(&raw)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }

    fn save(&self, state: &AlertStateMap) -> std::io::Result<()> {
        let raw = serde_json::to_string_pretty(state)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(&self.path, raw)
    }
}

/// Splits the current alert set into what must actually be delivered
/// (new or changed per drive) and the state map to persist for next tick.
pub fn changed_alerts(
    previous: &AlertStateMap,
    alerts: &[AlertEntry],
) -> (Vec<AlertEntry>, AlertStateMap) {
    let mut to_send = Vec::new();
    let mut next = AlertStateMap::new();

    for alert in alerts {
        let state = DriveAlertState {
            level: alert.level,
            message: alert.message.clone(),
        };
        if previous.get(&alert.drive_letter) != Some(&state) {
            to_send.push(alert.clone());
        }
        next.insert(alert.drive_letter.clone(), state);
    }

    (to_send, next)
}
