use crate::domain::models::ConnectionState;
use std::time::Duration;
use thiserror::Error;

/// Scan, connect, subscribe and write failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LinkError {
    #[error("operation cancelled: {0}")]
    Cancelled(String),

    #[error("link failure: {0}")]
    Failed(String),

    #[error("not connected")]
    NotConnected,

    #[error("link busy ({0:?})")]
    Busy(ConnectionState),

    #[error("unable to reconnect after {attempts} attempts, scan for the watch again")]
    ReconnectExhausted { attempts: u32 },

    #[error("write failed at chunk {index} of {total}: {reason}")]
    ChunkWriteFailed {
        index: usize,
        total: usize,
        reason: String,
    },
}

impl LinkError {
    /// Classify a platform error as a user cancellation or a plain failure.
    pub fn classify(err: &anyhow::Error) -> Self {
        let message = format!("{:#}", err);
        let lower = message.to_lowercase();
        if ["cancel", "abort", "user"]
            .iter()
            .any(|token| lower.contains(token))
        {
            Self::Cancelled(message)
        } else {
            Self::Failed(message)
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled(_))
    }
}

/// Unexpected token sequences on the audio characteristic. Never fatal.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("END received but no audio was buffered")]
    EmptySession,

    #[error("END received outside of an audio session")]
    EndWithoutStart,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PipelineError {
    #[error("backend error: {0}")]
    Backend(String),

    #[error("backend returned an empty reply")]
    EmptyReply,

    #[error("transcription was empty")]
    EmptyTranscription,

    #[error("no response within {0:?}")]
    Timeout(Duration),

    #[error("collaborator failure: {0}")]
    Collaborator(String),

    #[error("could not package audio: {0}")]
    Encoding(String),
}
