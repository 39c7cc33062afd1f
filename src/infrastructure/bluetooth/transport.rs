//! BLE Transport
//!
//! The platform BLE client the session engine drives. Implementations wrap a
//! concrete stack (Android GATT, WinRT, BlueZ) or the in-memory mock.

use crate::domain::models::DeviceHandle;
use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::mpsc;

/// Events pushed by the platform, delivered in order per characteristic
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Notification {
        characteristic: String,
        data: Vec<u8>,
    },
    Disconnected {
        device_id: String,
    },
}

pub type TransportEventSender = mpsc::UnboundedSender<TransportEvent>;

#[async_trait]
pub trait BleTransport: Send + Sync {
    /// Discover a device whose advertised name starts with `name_prefix`.
    async fn scan(&self, name_prefix: &str) -> Result<DeviceHandle>;

    /// Open the link. Unsolicited disconnects are reported on `events`.
    async fn connect(&self, device_id: &str, events: TransportEventSender) -> Result<()>;

    /// Enable notifications; payloads are reported on `events`.
    async fn subscribe(
        &self,
        device_id: &str,
        service_uuid: &str,
        char_uuid: &str,
        events: TransportEventSender,
    ) -> Result<()>;

    async fn write(
        &self,
        device_id: &str,
        service_uuid: &str,
        char_uuid: &str,
        data: &[u8],
    ) -> Result<()>;

    async fn unsubscribe(&self, device_id: &str, service_uuid: &str, char_uuid: &str)
        -> Result<()>;

    async fn disconnect(&self, device_id: &str) -> Result<()>;
}
