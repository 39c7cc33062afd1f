//! Offline demo: drives the service loop against the mock watch.
//!
//! Connects, replays a short synthetic recording as the watch would stream
//! it, and prints the reply that would be written back.

use anyhow::Result;
use async_trait::async_trait;
use hollow_link::audio::wav;
use hollow_link::domain::assistant::{AssistantBackend, AssistantReply, AssistantRequest};
use hollow_link::domain::models::{AudioMode, MessageSeverity};
use hollow_link::infrastructure::bluetooth::protocol;
use hollow_link::infrastructure::history::JsonlConversationLog;
use hollow_link::infrastructure::logging::init_logger;
use hollow_link::{
    AppEvent, BluetoothCommand, BluetoothService, Collaborators, ConnectionState, MockTransport,
    SettingsService,
};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

/// Answers with a description of the audio it was sent.
struct LocalBackend;

#[async_trait]
impl AssistantBackend for LocalBackend {
    async fn chat(&self, request: AssistantRequest) -> Result<AssistantReply> {
        let audio_len = request
            .audio_base64
            .as_deref()
            .map(|b64| b64.len() * 3 / 4)
            .unwrap_or_default();
        let samples = audio_len.saturating_sub(wav::HEADER_SIZE) / 2;
        Ok(AssistantReply {
            transcription: Some(format!("<{} samples>", samples)),
            text: format!(
                "Heard {} samples in {} mode.",
                samples,
                request.mode.unwrap_or(AudioMode::Voice)
            ),
            error: None,
        })
    }
}

fn tone(samples: usize) -> Vec<i16> {
    (0..samples)
        .map(|i| ((i as f32 * 0.05).sin() * 8000.0) as i16)
        .collect()
}

#[tokio::main]
async fn main() -> Result<()> {
    let settings_service = SettingsService::new()?;
    let _logging_guard = init_logger(&settings_service.get().log_settings)
        .map_err(|e| eprintln!("Failed to initialize logging: {}", e))
        .ok();

    info!("Starting Hollow Link demo");

    let settings = Arc::new(Mutex::new(settings_service));
    let mock = Arc::new(MockTransport::new());
    let history = Arc::new(JsonlConversationLog::default_location()?);
    info!("Conversation history at {}", history.path().display());

    let (event_tx, mut event_rx) = mpsc::unbounded_channel();
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();

    let service = BluetoothService::new(
        Collaborators {
            transport: mock.clone(),
            backend: Arc::new(LocalBackend),
            history,
        },
        event_tx,
        settings,
    )?;
    let handle = tokio::spawn(service.run(cmd_rx));

    cmd_tx.send(BluetoothCommand::StartScan)?;

    let deadline = tokio::time::sleep(Duration::from_secs(10));
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            Some(event) = event_rx.recv() => match event {
                AppEvent::ConnectionState(ConnectionState::Connected) => {
                    mock.replay_recording(&tone(1600), AudioMode::Voice, 180);
                }
                AppEvent::AssistantReply(text) => {
                    info!("Reply: {}", text);
                }
                AppEvent::VoiceState(state) => info!("Voice state: {:?}", state),
                AppEvent::LogMessage(message) => match message.severity {
                    MessageSeverity::Error => error!("{}", message.message),
                    MessageSeverity::Warning => warn!("{}", message.message),
                    _ => info!("{}", message.message),
                },
                _ => {}
            },
            _ = &mut deadline => {
                warn!("Demo timed out");
                break;
            }
        }

        let written = mock.writes_to(protocol::TEXT_CHAR_UUID);
        if !written.is_empty() {
            let reply: Vec<u8> = written.concat();
            info!("Watch received: {}", String::from_utf8_lossy(&reply));
            break;
        }
    }

    cmd_tx.send(BluetoothCommand::Shutdown)?;
    handle.await?;
    Ok(())
}
