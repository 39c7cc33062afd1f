//! Outbound Fragmenter
//!
//! Writes text to the watch in chunks below the BLE write limit, pacing
//! consecutive writes so the link stack is not flooded.

use crate::error::LinkError;
use crate::infrastructure::bluetooth::connection::TextLink;
use crate::infrastructure::bluetooth::protocol;
use std::time::Duration;
use tracing::{debug, error, info};

pub struct OutboundFragmenter {
    chunk_size: usize,
    chunk_delay: Duration,
}

impl OutboundFragmenter {
    pub fn new(chunk_size: usize, chunk_delay: Duration) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
            chunk_delay,
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Number of writes needed for `len` bytes.
    pub fn chunk_count(&self, len: usize) -> usize {
        len.div_ceil(self.chunk_size).max(1)
    }

    /// Send an assistant reply. Returns the number of chunks written.
    ///
    /// A failed chunk aborts the rest; the caller resends the whole message.
    pub async fn send_text(&self, link: &dyn TextLink, text: &str) -> Result<usize, LinkError> {
        let bytes = text.as_bytes();
        let total = self.chunk_count(bytes.len());

        if total == 1 {
            link.write_text(bytes).await.map_err(|e| chunk_error(0, 1, e))?;
            debug!("Sent {} bytes in a single write", bytes.len());
            return Ok(1);
        }

        info!("Sending {} bytes in {} chunks", bytes.len(), total);
        let mut offset = 0;
        for (index, chunk) in bytes.chunks(self.chunk_size).enumerate() {
            if index > 0 {
                tokio::time::sleep(self.chunk_delay).await;
            }
            link.write_text(chunk).await.map_err(|e| {
                error!("Chunk {}/{} at offset {} failed: {}", index, total, offset, e);
                chunk_error(index, total, e)
            })?;
            offset += chunk.len();
        }

        Ok(total)
    }

    /// Single-shot `TIME:<epoch>` write.
    pub async fn send_time(&self, link: &dyn TextLink, unix_seconds: u64) -> Result<(), LinkError> {
        let message = protocol::time_message(unix_seconds);
        debug!("Sending time sync: {}", message);
        link.write_text(message.as_bytes()).await
    }
}

fn chunk_error(index: usize, total: usize, source: LinkError) -> LinkError {
    match source {
        LinkError::NotConnected => LinkError::NotConnected,
        other => LinkError::ChunkWriteFailed {
            index,
            total,
            reason: other.to_string(),
        },
    }
}
