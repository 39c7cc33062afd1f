//! Contracts for the collaborators the session engine calls out to.
//!
//! The remote transcription/LLM service and the conversation history are
//! owned by the host application; the core only sees these traits.

use crate::domain::models::{AudioMode, Role};
use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssistantRequest {
    /// Base64 WAV, for audio requests
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_base64: Option<String>,
    /// Plain text, for typed requests
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub persona: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rules: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<AudioMode>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssistantReply {
    #[serde(default)]
    pub transcription: Option<String>,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub error: Option<String>,
}

/// Remote transcription + chat backend.
#[async_trait]
pub trait AssistantBackend: Send + Sync {
    async fn chat(&self, request: AssistantRequest) -> Result<AssistantReply>;
}

/// Append-only conversation history.
#[async_trait]
pub trait ConversationLog: Send + Sync {
    async fn append(&self, role: Role, text: &str, timestamp: i64) -> Result<()>;
}
