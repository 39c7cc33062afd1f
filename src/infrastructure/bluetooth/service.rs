//! Bluetooth Service Module
//!
//! Main service that coordinates the link, the frame reassembler, session
//! coordination and reply delivery for the watch. Everything mutable is
//! owned by the service loop; platform callbacks, host commands, pipeline
//! results and backoff timers all arrive as messages on that loop.

use crate::domain::assistant::{AssistantBackend, ConversationLog};
use crate::domain::models::{
    AppEvent, BluetoothCommand, CompletedAudio, DeviceHandle, MessageSeverity, Role,
    StatusMessage, VoiceState,
};
use crate::domain::session::SessionCoordinator;
use crate::domain::settings::SettingsService;
use crate::error::LinkError;
use crate::infrastructure::bluetooth::{
    connection::{BleConnection, ConnectionConfig},
    fragmenter::OutboundFragmenter,
    reassembler::{FrameEvent, FrameReassembler},
    transport::{BleTransport, TransportEvent},
};
use crate::infrastructure::pipeline::{self, PipelineOptions, PipelineOutcome};
use anyhow::Result;
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

/// External collaborators the service calls out to
#[derive(Clone)]
pub struct Collaborators {
    pub transport: Arc<dyn BleTransport>,
    pub backend: Arc<dyn AssistantBackend>,
    pub history: Arc<dyn ConversationLog>,
}

/// Main Bluetooth service coordinating all BLE operations
pub struct BluetoothService {
    connection: BleConnection,
    reassembler: FrameReassembler,
    sessions: SessionCoordinator,
    fragmenter: OutboundFragmenter,
    backend: Arc<dyn AssistantBackend>,
    history: Arc<dyn ConversationLog>,
    settings: Arc<Mutex<SettingsService>>,
    event_sender: mpsc::UnboundedSender<AppEvent>,
    transport_rx: mpsc::UnboundedReceiver<TransportEvent>,
    outcome_tx: mpsc::UnboundedSender<PipelineOutcome>,
    outcome_rx: mpsc::UnboundedReceiver<PipelineOutcome>,
    audio_char_uuid: String,
    reconnect_at: Option<Instant>,
}

impl BluetoothService {
    /// Create a new Bluetooth service
    pub fn new(
        collaborators: Collaborators,
        event_sender: mpsc::UnboundedSender<AppEvent>,
        settings: Arc<Mutex<SettingsService>>,
    ) -> Result<Self> {
        // Get configuration from settings
        let (config, fragmenter, last_device) = {
            let settings = settings
                .lock()
                .map_err(|_| anyhow::anyhow!("Lock error"))?;
            let s = settings.get();
            (
                ConnectionConfig {
                    max_reconnect_attempts: s.reconnect_max_attempts,
                    reconnect_base_delay_ms: s.reconnect_base_delay_ms,
                    service_uuid: s.ble_service_uuid.clone(),
                    audio_char_uuid: s.ble_audio_char_uuid.clone(),
                    text_char_uuid: s.ble_text_char_uuid.clone(),
                    name_prefix: s.device_name_prefix.clone(),
                },
                OutboundFragmenter::new(
                    s.text_chunk_size,
                    Duration::from_millis(s.text_chunk_delay_ms),
                ),
                s.last_connected_device.clone(),
            )
        };

        let (transport_tx, transport_rx) = mpsc::unbounded_channel();
        let (outcome_tx, outcome_rx) = mpsc::unbounded_channel();
        let audio_char_uuid = config.audio_char_uuid.clone();

        let mut connection = BleConnection::new(
            collaborators.transport,
            config,
            event_sender.clone(),
            transport_tx,
        );
        if let Some(id) = last_device {
            debug!("Remembering last connected device {}", id);
            connection.remember(DeviceHandle::new(id, None));
        }

        Ok(Self {
            connection,
            reassembler: FrameReassembler::new(),
            sessions: SessionCoordinator::new(event_sender.clone()),
            fragmenter,
            backend: collaborators.backend,
            history: collaborators.history,
            settings,
            event_sender,
            transport_rx,
            outcome_tx,
            outcome_rx,
            audio_char_uuid,
            reconnect_at: None,
        })
    }

    pub fn connection(&self) -> &BleConnection {
        &self.connection
    }

    pub fn voice_state(&self) -> VoiceState {
        self.sessions.voice_state()
    }

    /// Run until `Shutdown` is received or the command channel closes.
    pub async fn run(mut self, mut commands: mpsc::UnboundedReceiver<BluetoothCommand>) {
        info!("Bluetooth service started");

        loop {
            let reconnect_at = self.reconnect_at;
            tokio::select! {
                command = commands.recv() => match command {
                    None | Some(BluetoothCommand::Shutdown) => break,
                    Some(command) => self.handle_command(command).await,
                },
                Some(event) = self.transport_rx.recv() => self.handle_transport_event(event).await,
                Some(outcome) = self.outcome_rx.recv() => self.handle_outcome(outcome).await,
                _ = tokio::time::sleep_until(reconnect_at.unwrap_or_else(Instant::now)),
                    if reconnect_at.is_some() =>
                {
                    self.reconnect_at = None;
                    self.attempt_reconnect().await;
                }
            }
        }

        if self.connection.device().is_some() {
            self.connection.disconnect().await;
        }
        info!("Bluetooth service stopped");
    }

    pub(crate) async fn handle_command(&mut self, command: BluetoothCommand) {
        debug!("Command: {:?}", command);
        match command {
            BluetoothCommand::StartScan => {
                self.reconnect_at = None;
                let result = self.connection.scan().await.map(|_| ());
                self.after_connect(result);
            }
            BluetoothCommand::Connect(id) => {
                self.reconnect_at = None;
                let result = self.connection.connect(DeviceHandle::new(id, None)).await;
                self.after_connect(result);
            }
            BluetoothCommand::Disconnect => {
                self.reconnect_at = None;
                self.connection.disconnect().await;
                self.reassembler.reset();
                self.sessions.reset();
                self.with_settings(|s| s.set_last_connected(None));
            }
            BluetoothCommand::SyncTime => self.sync_time().await,
            BluetoothCommand::SendText(text) => {
                if let Err(e) = self.fragmenter.send_text(&self.connection, &text).await {
                    warn!("Failed to send text: {}", e);
                    self.send_log(&format!("Send failed: {}", e), MessageSeverity::Error);
                }
            }
            BluetoothCommand::Shutdown => {}
        }
    }

    pub(crate) async fn handle_transport_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Notification {
                characteristic,
                data,
            } => {
                if characteristic.eq_ignore_ascii_case(&self.audio_char_uuid) {
                    self.handle_notification(&data).await;
                } else {
                    trace!("Ignoring notification on {}", characteristic);
                }
            }
            TransportEvent::Disconnected { device_id } => {
                info!("Platform reported disconnect of {}", device_id);
                self.on_link_lost();
            }
        }
    }

    async fn handle_notification(&mut self, data: &[u8]) {
        match self.reassembler.push(data) {
            Ok(None) => {}
            Ok(Some(FrameEvent::TimeRequested)) => self.sync_time().await,
            Ok(Some(FrameEvent::PersonaUpdated(payload))) => {
                self.with_settings(|s| s.apply_persona(&payload));
                let _ = self.event_sender.send(AppEvent::PersonaUpdated(payload));
            }
            Ok(Some(FrameEvent::SessionStarted(mode))) => {
                debug!("Watch started a {} session", mode);
                self.sessions.start_listening();
            }
            Ok(Some(FrameEvent::AudioComplete(audio))) => self.start_processing(audio),
            Err(e) => {
                self.sessions.abandon_listening();
                self.send_log(&e.to_string(), MessageSeverity::Warning);
            }
        }
    }

    fn start_processing(&mut self, audio: CompletedAudio) {
        let Some(token) = self.sessions.begin() else {
            self.send_log(
                "Still processing the previous request, audio ignored",
                MessageSeverity::Warning,
            );
            return;
        };

        let _ = self.event_sender.send(AppEvent::AudioReceived {
            bytes: audio.bytes.len(),
            mode: audio.mode,
        });

        let options = self
            .with_settings(|s| {
                let settings = s.get();
                Ok(PipelineOptions {
                    sample_rate: settings.audio_sample_rate,
                    timeout: settings.processing_timeout(),
                    persona: s.active_persona(),
                    rules: s.active_rules(),
                    context: None,
                })
            })
            .unwrap_or_else(|| PipelineOptions {
                sample_rate: 16_000,
                timeout: Duration::from_secs(120),
                ..Default::default()
            });

        pipeline::spawn(
            self.backend.clone(),
            token,
            audio,
            options,
            self.outcome_tx.clone(),
        );
    }

    pub(crate) async fn handle_outcome(&mut self, outcome: PipelineOutcome) {
        let token = outcome.token;
        if !self.sessions.is_current(token) {
            debug!("Discarding stale result of {}", token);
            return;
        }

        let reply = match outcome.result {
            Ok(reply) => reply,
            Err(e) => {
                warn!("{} failed: {}", token, e);
                self.send_log(&format!("Processing error: {}", e), MessageSeverity::Error);
                self.sessions.finish(token);
                return;
            }
        };

        let now = unix_millis();
        if let Some(transcription) = &reply.transcription {
            let _ = self
                .event_sender
                .send(AppEvent::Transcription(transcription.clone()));
            if let Err(e) = self.history.append(Role::User, transcription, now).await {
                warn!("Failed to record user turn: {:#}", e);
            }
        }
        if let Err(e) = self.history.append(Role::Assistant, &reply.text, now).await {
            warn!("Failed to record assistant turn: {:#}", e);
        }
        let _ = self
            .event_sender
            .send(AppEvent::AssistantReply(reply.text.clone()));

        if self.sessions.responding(token) {
            match self.fragmenter.send_text(&self.connection, &reply.text).await {
                Ok(chunks) => info!("{} reply delivered in {} writes", token, chunks),
                Err(e) => {
                    warn!("{} reply not delivered: {}", token, e);
                    self.send_log(
                        &format!("Could not send reply to watch: {}", e),
                        MessageSeverity::Error,
                    );
                }
            }
        }
        self.sessions.finish(token);
    }

    fn after_connect(&mut self, result: Result<(), LinkError>) {
        match result {
            Ok(()) => self.on_connected(),
            Err(e) if e.is_cancelled() => info!("Connection cancelled by user"),
            Err(LinkError::Busy(state)) => {
                self.send_log(&format!("Link is busy ({:?})", state), MessageSeverity::Warning);
            }
            Err(e) => {
                warn!("Connection failed: {}", e);
                self.schedule_reconnect();
            }
        }
    }

    fn on_connected(&mut self) {
        if let Some(device) = self.connection.device() {
            let id = device.id.clone();
            self.with_settings(|s| s.set_last_connected(Some(id)));
        }
    }

    fn on_link_lost(&mut self) {
        self.reassembler.reset();
        self.sessions.reset();
        if self.connection.handle_disconnect().is_some() {
            self.schedule_reconnect();
        } else if self.connection.last_known().is_none() {
            self.with_settings(|s| s.set_last_connected(None));
        }
    }

    fn schedule_reconnect(&mut self) {
        if let Some(delay) = self.connection.next_reconnect_delay() {
            info!(
                "Reconnecting in {:?} (attempt {})",
                delay,
                self.connection.reconnect_attempts() + 1
            );
            self.reconnect_at = Some(Instant::now() + delay);
        }
    }

    async fn attempt_reconnect(&mut self) {
        match self.connection.reconnect().await {
            Ok(()) => self.on_connected(),
            Err(LinkError::ReconnectExhausted { .. }) => {
                self.with_settings(|s| s.set_last_connected(None));
            }
            Err(_) => self.schedule_reconnect(),
        }
    }

    async fn sync_time(&mut self) {
        let seconds = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();
        if let Err(e) = self.fragmenter.send_time(&self.connection, seconds).await {
            warn!("Time sync failed: {}", e);
        }
    }

    /// Run `f` against the settings store, logging lock or store failures.
    fn with_settings<T>(
        &self,
        f: impl FnOnce(&mut SettingsService) -> Result<T>,
    ) -> Option<T> {
        let mut settings = match self.settings.lock() {
            Ok(settings) => settings,
            Err(_) => {
                warn!("Settings lock poisoned");
                return None;
            }
        };
        match f(&mut settings) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!("Settings update failed: {:#}", e);
                None
            }
        }
    }

    /// Send a log message
    fn send_log(&self, message: &str, severity: MessageSeverity) {
        let _ = self.event_sender.send(AppEvent::LogMessage(StatusMessage {
            message: message.to_string(),
            severity,
        }));
    }
}

fn unix_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}
