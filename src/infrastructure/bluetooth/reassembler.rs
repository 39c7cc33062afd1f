//! Frame Reassembler
//!
//! Turns the ordered notification stream of the audio characteristic into
//! control events and completed audio buffers.

use crate::domain::models::{AudioMode, CompletedAudio};
use crate::error::ProtocolError;
use crate::infrastructure::bluetooth::protocol::{self, Frame};
use tracing::{debug, trace, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameEvent {
    TimeRequested,
    PersonaUpdated(String),
    SessionStarted(AudioMode),
    AudioComplete(CompletedAudio),
}

/// Audio accumulation buffer plus the mode of the open session.
#[derive(Debug, Default)]
pub struct FrameReassembler {
    chunks: Vec<Vec<u8>>,
    mode: Option<AudioMode>,
}

impl FrameReassembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_open(&self) -> bool {
        self.mode.is_some()
    }

    pub fn buffered_len(&self) -> usize {
        self.chunks.iter().map(Vec::len).sum()
    }

    /// Feed one notification, in arrival order.
    pub fn push(&mut self, data: &[u8]) -> Result<Option<FrameEvent>, ProtocolError> {
        match protocol::classify(data) {
            Frame::RequestTime => Ok(Some(FrameEvent::TimeRequested)),
            Frame::SetPersona(payload) => Ok(Some(FrameEvent::PersonaUpdated(payload.to_string()))),
            Frame::Start(mode) => {
                if self.is_open() {
                    debug!("START while a session is open, discarding {} bytes", self.buffered_len());
                }
                self.chunks.clear();
                self.mode = Some(mode);
                Ok(Some(FrameEvent::SessionStarted(mode)))
            }
            Frame::End => self.close(),
            Frame::Audio(chunk) => {
                if self.is_open() {
                    trace!("Audio chunk: {} bytes", chunk.len());
                    self.chunks.push(chunk.to_vec());
                } else {
                    debug!("Ignoring {} bytes outside of an audio session", chunk.len());
                }
                Ok(None)
            }
        }
    }

    /// Drop any partial session (disconnect or explicit reset).
    pub fn reset(&mut self) {
        self.chunks.clear();
        self.mode = None;
    }

    fn close(&mut self) -> Result<Option<FrameEvent>, ProtocolError> {
        let Some(mode) = self.mode.take() else {
            warn!("END received outside of an audio session");
            return Err(ProtocolError::EndWithoutStart);
        };

        if self.chunks.is_empty() {
            warn!("END received but no audio buffered");
            return Err(ProtocolError::EmptySession);
        }

        let bytes = std::mem::take(&mut self.chunks).concat();
        debug!("Audio session closed: {} bytes ({})", bytes.len(), mode);
        Ok(Some(FrameEvent::AudioComplete(CompletedAudio { bytes, mode })))
    }
}
