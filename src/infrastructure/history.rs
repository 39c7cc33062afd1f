//! Conversation history as JSON lines, one record per turn.

use crate::domain::assistant::ConversationLog;
use crate::domain::models::Role;
use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub text: String,
    /// Unix milliseconds
    pub timestamp: i64,
}

pub struct JsonlConversationLog {
    path: PathBuf,
    // serializes appends from concurrent callers
    write_lock: Mutex<()>,
}

impl JsonlConversationLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// `<data_dir>/HollowLink/history.jsonl`
    pub fn default_location() -> Result<Self> {
        let mut path = dirs::data_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not determine data directory"))?;
        path.push("HollowLink");
        path.push("history.jsonl");
        Ok(Self::new(path))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read every turn back, skipping lines that fail to parse.
    pub async fn load(&self) -> Result<Vec<Turn>> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        Ok(contents
            .lines()
            .filter_map(|line| serde_json::from_str(line).ok())
            .collect())
    }
}

#[async_trait]
impl ConversationLog for JsonlConversationLog {
    async fn append(&self, role: Role, text: &str, timestamp: i64) -> Result<()> {
        let turn = Turn {
            role,
            text: text.to_string(),
            timestamp,
        };
        let mut line = serde_json::to_string(&turn)?;
        line.push('\n');

        let _guard = self.write_lock.lock().await;
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}
