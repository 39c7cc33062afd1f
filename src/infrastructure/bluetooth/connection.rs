//! BLE Connection Module
//!
//! Connection state machine: scan, connect + subscribe, exponential-backoff
//! reconnection to the last known device, and user disconnect.

use crate::domain::models::{
    AppEvent, ConnectionState, DeviceHandle, MessageSeverity, StatusMessage,
};
use crate::error::LinkError;
use crate::infrastructure::bluetooth::protocol;
use crate::infrastructure::bluetooth::scanner::BleScanner;
use crate::infrastructure::bluetooth::transport::{BleTransport, TransportEventSender};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

/// Configuration for connection behavior
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Reconnect attempts before giving up on the last known device
    pub max_reconnect_attempts: u32,
    /// Delay before the first reconnect attempt, doubled on each retry
    pub reconnect_base_delay_ms: u64,
    /// Service UUID to look for
    pub service_uuid: String,
    /// Audio (notify) characteristic UUID
    pub audio_char_uuid: String,
    /// Text (write) characteristic UUID
    pub text_char_uuid: String,
    /// Advertised name prefix for scans
    pub name_prefix: String,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            max_reconnect_attempts: 5,
            reconnect_base_delay_ms: 1000,
            service_uuid: protocol::SERVICE_UUID.to_string(),
            audio_char_uuid: protocol::AUDIO_CHAR_UUID.to_string(),
            text_char_uuid: protocol::TEXT_CHAR_UUID.to_string(),
            name_prefix: protocol::DEVICE_NAME_PREFIX.to_string(),
        }
    }
}

/// Highest reconnect ceiling honoured. Past it the backoff exponent is capped
/// and delays would stop growing.
pub const MAX_RECONNECT_ATTEMPTS: u32 = 17;

/// `base * 2^(attempt - 1)` for attempts starting at 1.
pub fn backoff_delay(base_delay_ms: u64, attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(MAX_RECONNECT_ATTEMPTS - 1);
    Duration::from_millis(base_delay_ms.saturating_mul(1u64 << exponent))
}

/// Anything that can carry bytes to the watch's text characteristic
#[async_trait]
pub trait TextLink: Send + Sync {
    async fn write_text(&self, data: &[u8]) -> Result<(), LinkError>;
}

/// BLE connection state machine
pub struct BleConnection {
    transport: Arc<dyn BleTransport>,
    scanner: BleScanner,
    config: ConnectionConfig,
    state: ConnectionState,
    device: Option<DeviceHandle>,
    last_known: Option<DeviceHandle>,
    reconnect_attempts: u32,
    event_sender: mpsc::UnboundedSender<AppEvent>,
    transport_events: TransportEventSender,
}

impl BleConnection {
    /// Create a new connection handler
    pub fn new(
        transport: Arc<dyn BleTransport>,
        mut config: ConnectionConfig,
        event_sender: mpsc::UnboundedSender<AppEvent>,
        transport_events: TransportEventSender,
    ) -> Self {
        if config.max_reconnect_attempts > MAX_RECONNECT_ATTEMPTS {
            warn!(
                "Reconnect ceiling {} clamped to {}",
                config.max_reconnect_attempts, MAX_RECONNECT_ATTEMPTS
            );
            config.max_reconnect_attempts = MAX_RECONNECT_ATTEMPTS;
        }
        Self {
            scanner: BleScanner::new(transport.clone(), event_sender.clone()),
            transport,
            config,
            state: ConnectionState::Disconnected,
            device: None,
            last_known: None,
            reconnect_attempts: 0,
            event_sender,
            transport_events,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    pub fn device(&self) -> Option<&DeviceHandle> {
        self.device.as_ref()
    }

    pub fn last_known(&self) -> Option<&DeviceHandle> {
        self.last_known.as_ref()
    }

    pub fn reconnect_attempts(&self) -> u32 {
        self.reconnect_attempts
    }

    /// Seed the last known device, e.g. from persisted settings.
    pub fn remember(&mut self, device: DeviceHandle) {
        self.last_known = Some(device);
    }

    /// Scan for the watch and connect to the first match.
    pub async fn scan(&mut self) -> Result<DeviceHandle, LinkError> {
        self.ensure_idle()?;
        self.reconnect_attempts = 0;
        self.set_state(ConnectionState::Scanning);

        let device = match self.scanner.scan(&self.config.name_prefix).await {
            Ok(device) => device,
            Err(e) => {
                self.set_state(ConnectionState::Disconnected);
                return Err(e);
            }
        };

        self.connect(device.clone()).await?;
        Ok(device)
    }

    /// Connect to a specific device (user initiated).
    pub async fn connect(&mut self, device: DeviceHandle) -> Result<(), LinkError> {
        if self.state == ConnectionState::Connected || self.state == ConnectionState::Connecting {
            return Err(LinkError::Busy(self.state));
        }
        self.reconnect_attempts = 0;
        self.device = Some(device.clone());
        self.last_known = Some(device);

        if let Err(e) = self.establish().await {
            self.device = None;
            self.report_failure(&e);
            return Err(e);
        }
        Ok(())
    }

    /// Delay before the next automatic reconnect attempt, or `None` when no
    /// device is known or the ceiling has been reached.
    pub fn next_reconnect_delay(&self) -> Option<Duration> {
        if self.last_known.is_none() || self.reconnect_attempts >= self.config.max_reconnect_attempts
        {
            return None;
        }
        Some(backoff_delay(
            self.config.reconnect_base_delay_ms,
            self.reconnect_attempts + 1,
        ))
    }

    /// Unsolicited disconnect reported by the platform.
    ///
    /// Returns the delay after which a reconnect should be attempted. When the
    /// ceiling already rules out another attempt the last known device is
    /// forgotten and `None` is returned.
    pub fn handle_disconnect(&mut self) -> Option<Duration> {
        if self.state == ConnectionState::Disconnected && self.device.is_none() {
            return None;
        }
        warn!("Link to watch lost");
        self.device = None;
        self.set_state(ConnectionState::Disconnected);
        self.send_log("Connection to the watch lost", MessageSeverity::Warning);

        if self.last_known.is_some()
            && self.reconnect_attempts >= self.config.max_reconnect_attempts
        {
            self.give_up();
            return None;
        }
        self.next_reconnect_delay()
    }

    /// One automatic reconnect attempt against the last known device.
    pub async fn reconnect(&mut self) -> Result<(), LinkError> {
        if self.state != ConnectionState::Disconnected {
            return Err(LinkError::Busy(self.state));
        }
        let Some(device) = self.last_known.clone() else {
            return Err(LinkError::NotConnected);
        };
        if self.reconnect_attempts >= self.config.max_reconnect_attempts {
            return Err(self.give_up());
        }

        self.reconnect_attempts += 1;
        info!(
            "Reconnect attempt {}/{} to {}",
            self.reconnect_attempts, self.config.max_reconnect_attempts, device
        );
        self.device = Some(device);

        match self.establish().await {
            Ok(()) => Ok(()),
            Err(e) => {
                self.device = None;
                warn!("Reconnect attempt {} failed: {}", self.reconnect_attempts, e);
                if self.reconnect_attempts >= self.config.max_reconnect_attempts {
                    Err(self.give_up())
                } else {
                    Err(e)
                }
            }
        }
    }

    /// User disconnect: suppress reconnection and forget the device.
    pub async fn disconnect(&mut self) {
        self.reconnect_attempts = self.config.max_reconnect_attempts;

        if let Some(device) = self.device.take() {
            if let Err(e) = self
                .transport
                .unsubscribe(
                    &device.id,
                    &self.config.service_uuid,
                    &self.config.audio_char_uuid,
                )
                .await
            {
                warn!("Unsubscribe failed: {}", e);
            }
            if let Err(e) = self.transport.disconnect(&device.id).await {
                warn!("Disconnect failed: {}", e);
            }
            info!("Disconnected from {}", device);
            self.send_log("Disconnected from watch", MessageSeverity::Info);
        }

        self.last_known = None;
        self.set_state(ConnectionState::Disconnected);
    }

    /// Single write to the text characteristic.
    pub async fn write_text(&self, data: &[u8]) -> Result<(), LinkError> {
        let device = match (&self.device, self.state) {
            (Some(device), ConnectionState::Connected) => device,
            _ => return Err(LinkError::NotConnected),
        };

        self.transport
            .write(
                &device.id,
                &self.config.service_uuid,
                &self.config.text_char_uuid,
                data,
            )
            .await
            .map_err(|e| LinkError::Failed(format!("{:#}", e)))
    }

    /// Connect and subscribe to the audio characteristic.
    async fn establish(&mut self) -> Result<(), LinkError> {
        let Some(device) = self.device.clone() else {
            return Err(LinkError::NotConnected);
        };
        self.set_state(ConnectionState::Connecting);
        info!("Connecting to {}", device);

        let result = async {
            self.transport
                .connect(&device.id, self.transport_events.clone())
                .await?;
            self.transport
                .subscribe(
                    &device.id,
                    &self.config.service_uuid,
                    &self.config.audio_char_uuid,
                    self.transport_events.clone(),
                )
                .await
        }
        .await;

        match result {
            Ok(()) => {
                self.reconnect_attempts = 0;
                self.set_state(ConnectionState::Connected);
                self.send_log("Connected to watch", MessageSeverity::Success);
                Ok(())
            }
            Err(e) => {
                error!("Failed to connect to {}: {:#}", device, e);
                if let Err(close_err) = self.transport.disconnect(&device.id).await {
                    warn!("Cleanup after failed connect: {}", close_err);
                }
                self.set_state(ConnectionState::Disconnected);
                Err(LinkError::classify(&e))
            }
        }
    }

    fn give_up(&mut self) -> LinkError {
        let error = LinkError::ReconnectExhausted {
            attempts: self.reconnect_attempts,
        };
        error!("{}", error);
        self.device = None;
        self.last_known = None;
        self.set_state(ConnectionState::Disconnected);
        self.send_log(&error.to_string(), MessageSeverity::Error);
        error
    }

    fn ensure_idle(&self) -> Result<(), LinkError> {
        match self.state {
            ConnectionState::Disconnected => Ok(()),
            state => Err(LinkError::Busy(state)),
        }
    }

    fn report_failure(&self, e: &LinkError) {
        if e.is_cancelled() {
            self.send_log("Connection cancelled", MessageSeverity::Info);
        } else {
            self.send_log(&format!("Connection failed: {}", e), MessageSeverity::Error);
        }
    }

    fn set_state(&mut self, state: ConnectionState) {
        if self.state == state {
            return;
        }
        self.state = state;
        let _ = self.event_sender.send(AppEvent::ConnectionState(state));
    }

    /// Send a log message
    fn send_log(&self, message: &str, severity: MessageSeverity) {
        let _ = self.event_sender.send(AppEvent::LogMessage(StatusMessage {
            message: message.to_string(),
            severity,
        }));
    }
}

#[async_trait]
impl TextLink for BleConnection {
    async fn write_text(&self, data: &[u8]) -> Result<(), LinkError> {
        BleConnection::write_text(self, data).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::bluetooth::mock::MockTransport;

    fn setup(mock: Arc<MockTransport>, max_attempts: u32) -> BleConnection {
        setup_with_events(mock, max_attempts).0
    }

    fn setup_with_events(
        mock: Arc<MockTransport>,
        max_attempts: u32,
    ) -> (BleConnection, mpsc::UnboundedReceiver<AppEvent>) {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (transport_tx, _transport_rx) = mpsc::unbounded_channel();
        let config = ConnectionConfig {
            max_reconnect_attempts: max_attempts,
            reconnect_base_delay_ms: 100,
            ..Default::default()
        };
        (BleConnection::new(mock, config, event_tx, transport_tx), event_rx)
    }

    fn log_messages(events: &mut mpsc::UnboundedReceiver<AppEvent>) -> Vec<StatusMessage> {
        let mut out = Vec::new();
        while let Ok(event) = events.try_recv() {
            if let AppEvent::LogMessage(message) = event {
                out.push(message);
            }
        }
        out
    }

    #[test]
    fn test_backoff_doubles() {
        assert_eq!(backoff_delay(1000, 1), Duration::from_millis(1000));
        assert_eq!(backoff_delay(1000, 2), Duration::from_millis(2000));
        assert_eq!(backoff_delay(1000, 4), Duration::from_millis(8000));
    }

    #[tokio::test]
    async fn test_scan_connects_and_subscribes() {
        let mock = Arc::new(MockTransport::new());
        let mut connection = setup(mock.clone(), 3);

        let device = connection.scan().await.unwrap();
        assert_eq!(device.id, "00:11:22:33:44:55");
        assert_eq!(connection.state(), ConnectionState::Connected);
        assert!(mock.is_subscribed());
        assert_eq!(connection.reconnect_attempts(), 0);
    }

    #[tokio::test]
    async fn test_scan_cancel_vs_fail() {
        let mock = Arc::new(MockTransport::new());
        let mut connection = setup(mock.clone(), 3);

        mock.fail_next_scan("Operation canceled by USER");
        let err = connection.scan().await.unwrap_err();
        assert!(err.is_cancelled());
        assert_eq!(connection.state(), ConnectionState::Disconnected);

        mock.fail_next_scan("adapter powered off");
        let err = connection.scan().await.unwrap_err();
        assert!(matches!(err, LinkError::Failed(_)));
        assert_eq!(connection.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_write_requires_connection() {
        let mock = Arc::new(MockTransport::new());
        let connection = setup(mock, 3);
        assert_eq!(
            connection.write_text(b"hi").await.unwrap_err(),
            LinkError::NotConnected
        );
    }

    #[tokio::test]
    async fn test_backoff_increases_and_stops_at_ceiling() {
        let mock = Arc::new(MockTransport::new());
        let mut connection = setup(mock.clone(), 3);
        connection.scan().await.unwrap();

        mock.fail_next_connects(10);
        mock.drop_link();

        let mut delays = Vec::new();
        let mut next = connection.handle_disconnect();
        let mut last_error = None;
        while let Some(delay) = next {
            delays.push(delay);
            last_error = connection.reconnect().await.err();
            next = connection.next_reconnect_delay();
        }

        assert_eq!(
            delays,
            vec![
                Duration::from_millis(100),
                Duration::from_millis(200),
                Duration::from_millis(400)
            ]
        );
        assert!(delays.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(
            last_error,
            Some(LinkError::ReconnectExhausted { attempts: 3 })
        );
        // one initial connect plus three reconnects
        assert_eq!(mock.connect_attempts(), 4);
        assert!(connection.last_known().is_none());
        assert!(connection.device().is_none());
    }

    #[tokio::test]
    async fn test_reconnect_success_resets_counter() {
        let mock = Arc::new(MockTransport::new());
        let mut connection = setup(mock.clone(), 5);
        connection.scan().await.unwrap();

        mock.fail_next_connects(1);
        mock.drop_link();
        assert!(connection.handle_disconnect().is_some());
        assert!(connection.reconnect().await.is_err());
        assert_eq!(connection.reconnect_attempts(), 1);

        connection.reconnect().await.unwrap();
        assert_eq!(connection.state(), ConnectionState::Connected);
        assert_eq!(connection.reconnect_attempts(), 0);
    }

    #[tokio::test]
    async fn test_user_disconnect_suppresses_reconnect() {
        let mock = Arc::new(MockTransport::new());
        let mut connection = setup(mock.clone(), 5);
        connection.scan().await.unwrap();

        connection.disconnect().await;
        assert_eq!(connection.state(), ConnectionState::Disconnected);
        assert!(connection.last_known().is_none());
        assert!(connection.next_reconnect_delay().is_none());
        assert!(!mock.is_connected());
    }

    #[tokio::test]
    async fn test_failed_connect_leaves_last_known_for_reconnect() {
        let mock = Arc::new(MockTransport::new());
        let mut connection = setup(mock.clone(), 5);

        mock.fail_next_connects(1);
        let device = DeviceHandle::new("00:11:22:33:44:55", None);
        assert!(connection.connect(device).await.is_err());
        assert_eq!(connection.state(), ConnectionState::Disconnected);
        assert_eq!(
            connection.next_reconnect_delay(),
            Some(Duration::from_millis(100))
        );
    }

    #[tokio::test]
    async fn test_zero_ceiling_gives_up_on_link_loss() {
        let mock = Arc::new(MockTransport::new());
        let (mut connection, mut events) = setup_with_events(mock.clone(), 0);
        connection.scan().await.unwrap();
        log_messages(&mut events);

        mock.drop_link();
        assert_eq!(connection.handle_disconnect(), None);
        assert!(connection.last_known().is_none());
        assert!(connection.device().is_none());

        let messages = log_messages(&mut events);
        assert!(messages.iter().any(|m| m.severity == MessageSeverity::Error
            && m.message.contains("scan for the watch again")));
        assert_eq!(mock.connect_attempts(), 1);
    }

    #[test]
    fn test_ceiling_is_clamped_so_backoff_keeps_growing() {
        let mock = Arc::new(MockTransport::new());
        let mut connection = setup(mock, 40);
        connection.remember(DeviceHandle::new("00:11:22:33:44:55", None));

        let mut delays = Vec::new();
        while let Some(delay) = connection.next_reconnect_delay() {
            delays.push(delay);
            connection.reconnect_attempts += 1;
        }
        assert_eq!(delays.len(), MAX_RECONNECT_ATTEMPTS as usize);
        assert!(delays.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_cancelled_connect_is_reported_as_info() {
        let mock = Arc::new(MockTransport::new());
        let (connection, mut events) = setup_with_events(mock, 3);

        connection.report_failure(&LinkError::Cancelled("user dismissed".to_string()));
        connection.report_failure(&LinkError::Failed("gatt 133".to_string()));

        let messages = log_messages(&mut events);
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].severity, MessageSeverity::Info);
        assert_eq!(messages[0].message, "Connection cancelled");
        assert_eq!(messages[1].severity, MessageSeverity::Error);
    }
}
