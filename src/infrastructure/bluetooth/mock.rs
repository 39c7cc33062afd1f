//! Mock BLE Transport
//!
//! In-memory stand-in for the watch. Scans and connects always succeed unless
//! a failure has been scripted explicitly, writes are recorded, and the host
//! can push notifications or a whole encoded recording as if the watch sent
//! them.

use crate::audio::adpcm;
use crate::domain::models::{AudioMode, DeviceHandle};
use crate::infrastructure::bluetooth::protocol;
use crate::infrastructure::bluetooth::transport::{
    BleTransport, TransportEvent, TransportEventSender,
};
use anyhow::Result;
use async_trait::async_trait;
use std::sync::Mutex;
use tracing::{debug, info};

#[derive(Default)]
struct MockState {
    connected: Option<String>,
    link_events: Option<TransportEventSender>,
    notify_events: Option<(String, TransportEventSender)>,
    writes: Vec<(String, Vec<u8>)>,
    connect_attempts: u32,
    connect_failures: u32,
    scan_error: Option<String>,
    fail_write_number: Option<usize>,
    write_count: usize,
}

pub struct MockTransport {
    device: DeviceHandle,
    state: Mutex<MockState>,
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTransport {
    pub fn new() -> Self {
        Self::with_device(DeviceHandle::new(
            "00:11:22:33:44:55",
            Some(format!("{}-Mock", protocol::DEVICE_NAME_PREFIX)),
        ))
    }

    pub fn with_device(device: DeviceHandle) -> Self {
        Self {
            device,
            state: Mutex::new(MockState::default()),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        // A poisoned lock only means a test panicked mid-call.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Make the next `count` connect calls fail.
    pub fn fail_next_connects(&self, count: u32) {
        self.lock().connect_failures = count;
    }

    /// Make the next scan fail with `message`.
    pub fn fail_next_scan(&self, message: &str) {
        self.lock().scan_error = Some(message.to_string());
    }

    /// Make the `n`th write from now (zero-based) fail.
    pub fn fail_write_at(&self, n: usize) {
        let mut state = self.lock();
        state.fail_write_number = Some(state.write_count + n);
    }

    pub fn connect_attempts(&self) -> u32 {
        self.lock().connect_attempts
    }

    pub fn is_connected(&self) -> bool {
        self.lock().connected.is_some()
    }

    pub fn is_subscribed(&self) -> bool {
        self.lock().notify_events.is_some()
    }

    /// Payloads written to `char_uuid`, in order.
    pub fn writes_to(&self, char_uuid: &str) -> Vec<Vec<u8>> {
        self.lock()
            .writes
            .iter()
            .filter(|(uuid, _)| uuid.eq_ignore_ascii_case(char_uuid))
            .map(|(_, data)| data.clone())
            .collect()
    }

    /// Deliver a notification on the subscribed characteristic.
    pub fn inject_notification(&self, data: &[u8]) -> bool {
        let state = self.lock();
        match &state.notify_events {
            Some((characteristic, sender)) => sender
                .send(TransportEvent::Notification {
                    characteristic: characteristic.clone(),
                    data: data.to_vec(),
                })
                .is_ok(),
            None => false,
        }
    }

    /// Simulate the watch going out of range.
    pub fn drop_link(&self) {
        let mut state = self.lock();
        let Some(device_id) = state.connected.take() else {
            return;
        };
        info!("Mock link to {} dropped", device_id);
        state.notify_events = None;
        if let Some(sender) = state.link_events.take() {
            let _ = sender.send(TransportEvent::Disconnected { device_id });
        }
    }

    /// Replay PCM as the watch would send it: start token, ADPCM chunks, END.
    pub fn replay_recording(&self, samples: &[i16], mode: AudioMode, chunk_size: usize) -> bool {
        let start = match mode {
            AudioMode::Voice => protocol::TOKEN_START_VOICE,
            AudioMode::Silent => protocol::TOKEN_START_SILENT,
        };
        if !self.inject_notification(start.as_bytes()) {
            return false;
        }

        let encoded = adpcm::encode(samples);
        debug!(
            "Replaying {} samples as {} ADPCM bytes",
            samples.len(),
            encoded.len()
        );
        for chunk in encoded.chunks(chunk_size.max(1)) {
            self.inject_notification(chunk);
        }

        self.inject_notification(protocol::TOKEN_END.as_bytes())
    }
}

#[async_trait]
impl BleTransport for MockTransport {
    async fn scan(&self, name_prefix: &str) -> Result<DeviceHandle> {
        if let Some(message) = self.lock().scan_error.take() {
            anyhow::bail!(message);
        }

        let name = self.device.name.as_deref().unwrap_or_default();
        if !name.starts_with(name_prefix) {
            anyhow::bail!("No device matching '{}' found", name_prefix);
        }
        Ok(self.device.clone())
    }

    async fn connect(&self, device_id: &str, events: TransportEventSender) -> Result<()> {
        let mut state = self.lock();
        state.connect_attempts += 1;

        if state.connect_failures > 0 {
            state.connect_failures -= 1;
            anyhow::bail!("GATT error 133 connecting to {}", device_id);
        }
        if device_id != self.device.id {
            anyhow::bail!("Unknown device {}", device_id);
        }

        state.connected = Some(device_id.to_string());
        state.link_events = Some(events);
        Ok(())
    }

    async fn subscribe(
        &self,
        device_id: &str,
        _service_uuid: &str,
        char_uuid: &str,
        events: TransportEventSender,
    ) -> Result<()> {
        let mut state = self.lock();
        if state.connected.as_deref() != Some(device_id) {
            anyhow::bail!("Cannot subscribe, {} not connected", device_id);
        }
        state.notify_events = Some((char_uuid.to_string(), events));
        Ok(())
    }

    async fn write(
        &self,
        device_id: &str,
        _service_uuid: &str,
        char_uuid: &str,
        data: &[u8],
    ) -> Result<()> {
        let mut state = self.lock();
        if state.connected.as_deref() != Some(device_id) {
            anyhow::bail!("Cannot write, {} not connected", device_id);
        }

        let number = state.write_count;
        state.write_count += 1;
        if state.fail_write_number == Some(number) {
            state.fail_write_number = None;
            anyhow::bail!("Write rejected by GATT stack");
        }

        state.writes.push((char_uuid.to_string(), data.to_vec()));
        Ok(())
    }

    async fn unsubscribe(
        &self,
        _device_id: &str,
        _service_uuid: &str,
        _char_uuid: &str,
    ) -> Result<()> {
        self.lock().notify_events = None;
        Ok(())
    }

    async fn disconnect(&self, _device_id: &str) -> Result<()> {
        let mut state = self.lock();
        state.connected = None;
        state.link_events = None;
        state.notify_events = None;
        Ok(())
    }
}
