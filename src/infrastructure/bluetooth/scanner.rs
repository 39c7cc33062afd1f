//! BLE Scanner Module
//!
//! Handles discovery of the watch by advertised name prefix.

use crate::domain::models::{AppEvent, DeviceHandle, MessageSeverity, StatusMessage};
use crate::error::LinkError;
use crate::infrastructure::bluetooth::transport::BleTransport;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// BLE Scanner for discovering the watch
pub struct BleScanner {
    transport: Arc<dyn BleTransport>,
    event_sender: mpsc::UnboundedSender<AppEvent>,
}

impl BleScanner {
    /// Create a new scanner
    pub fn new(transport: Arc<dyn BleTransport>, event_sender: mpsc::UnboundedSender<AppEvent>) -> Self {
        Self {
            transport,
            event_sender,
        }
    }

    /// Scan for a device whose name starts with `name_prefix`
    ///
    /// Platform errors are classified so the caller can tell a dismissed
    /// chooser from a real failure.
    pub async fn scan(&self, name_prefix: &str) -> Result<DeviceHandle, LinkError> {
        info!("Starting BLE scan for devices named '{}*'", name_prefix);
        self.send_log("Scanning for watch...", MessageSeverity::Info);

        match self.transport.scan(name_prefix).await {
            Ok(device) => {
                info!("Found {}", device);
                let _ = self.event_sender.send(AppEvent::DeviceFound(device.clone()));
                Ok(device)
            }
            Err(e) => {
                let error = LinkError::classify(&e);
                if error.is_cancelled() {
                    info!("Scan cancelled: {:#}", e);
                    self.send_log("Scan cancelled", MessageSeverity::Info);
                } else {
                    warn!("Scan failed: {:#}", e);
                    self.send_log(&format!("Scan failed: {:#}", e), MessageSeverity::Error);
                }
                Err(error)
            }
        }
    }

    fn send_log(&self, message: &str, severity: MessageSeverity) {
        let _ = self.event_sender.send(AppEvent::LogMessage(StatusMessage {
            message: message.to_string(),
            severity,
        }));
    }
}
