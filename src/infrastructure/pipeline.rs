//! Audio processing pipeline
//!
//! decode ADPCM -> package as WAV/base64 -> assistant backend -> validated
//! reply. Runs off the service loop; the result travels back tagged with the
//! session token it was started under.

use crate::audio::{adpcm, wav};
use crate::domain::assistant::{AssistantBackend, AssistantRequest};
use crate::domain::models::{AudioMode, CompletedAudio};
use crate::domain::session::SessionToken;
use crate::error::PipelineError;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineReply {
    pub transcription: Option<String>,
    pub text: String,
}

#[derive(Debug)]
pub struct PipelineOutcome {
    pub token: SessionToken,
    pub mode: AudioMode,
    pub result: Result<PipelineReply, PipelineError>,
}

/// Per-run inputs snapshotted from settings when the session starts
#[derive(Debug, Clone, Default)]
pub struct PipelineOptions {
    pub sample_rate: u32,
    pub timeout: Duration,
    pub persona: Option<String>,
    pub rules: Option<String>,
    pub context: Option<String>,
}

/// Build the backend request for a completed audio session.
pub fn build_request(
    audio: &CompletedAudio,
    options: &PipelineOptions,
) -> Result<AssistantRequest, PipelineError> {
    let samples = adpcm::decode(&audio.bytes);
    debug!(
        "Decoded {} ADPCM bytes into {} samples",
        audio.bytes.len(),
        samples.len()
    );

    let audio_base64 = wav::encode_wav_base64(&samples, options.sample_rate)
        .map_err(|e| PipelineError::Encoding(e.to_string()))?;

    Ok(AssistantRequest {
        audio_base64: Some(audio_base64),
        text: None,
        context: options.context.clone(),
        persona: options.persona.clone().filter(|p| !p.is_empty()),
        rules: options.rules.clone().filter(|r| !r.is_empty()),
        mode: Some(audio.mode),
    })
}

/// Run one session to completion, without a deadline.
pub async fn process(
    backend: &dyn AssistantBackend,
    audio: &CompletedAudio,
    options: &PipelineOptions,
) -> Result<PipelineReply, PipelineError> {
    let request = build_request(audio, options)?;

    let started = Instant::now();
    let reply = backend
        .chat(request)
        .await
        .map_err(|e| PipelineError::Collaborator(format!("{:#}", e)))?;
    info!("Backend answered in {:?}", started.elapsed());

    if let Some(error) = reply.error.filter(|e| !e.is_empty()) {
        warn!("Backend error: {}", error);
        return Err(PipelineError::Backend(error));
    }

    let transcription = reply.transcription.map(|t| t.trim().to_string());
    let text = reply.text.trim().to_string();
    if text.is_empty() {
        return Err(match transcription.as_deref() {
            Some("") => PipelineError::EmptyTranscription,
            _ => PipelineError::EmptyReply,
        });
    }

    Ok(PipelineReply {
        transcription: transcription.filter(|t| !t.is_empty()),
        text,
    })
}

/// Spawn a session; the outcome (including timeouts) is sent on `outcomes`.
pub fn spawn(
    backend: Arc<dyn AssistantBackend>,
    token: SessionToken,
    audio: CompletedAudio,
    options: PipelineOptions,
    outcomes: mpsc::UnboundedSender<PipelineOutcome>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let result =
            match tokio::time::timeout(options.timeout, process(backend.as_ref(), &audio, &options))
                .await
            {
                Ok(result) => result,
                Err(_) => {
                    warn!("{} timed out after {:?}", token, options.timeout);
                    Err(PipelineError::Timeout(options.timeout))
                }
            };

        let outcome = PipelineOutcome {
            token,
            mode: audio.mode,
            result,
        };
        if outcomes.send(outcome).is_err() {
            debug!("Service gone, dropping outcome of {}", token);
        }
    })
}
