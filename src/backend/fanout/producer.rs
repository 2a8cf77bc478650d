//! Fan-out producer
//!
//! Serializes chat events and appends them to the durable log keyed by
//! room. One producer is shared by every socket of the process.

use std::sync::Arc;

use super::{DurableLog, LogError};
use crate::shared::chat::ChatMessage;

/// Appends chat events to the durable log
#[derive(Clone)]
pub struct FanoutProducer {
    log: Arc<dyn DurableLog>,
}

impl FanoutProducer {
    pub fn new(log: Arc<dyn DurableLog>) -> Self {
        Self { log }
    }

    /// Append one event; resolves once the log acknowledged it
    ///
    /// Failures are returned to the caller and never retried here.
    pub async fn publish(&self, message: &ChatMessage) -> Result<i64, LogError> {
        let payload = serde_json::to_vec(message)?;

        match self.log.append(message.room_id, payload).await {
            Ok(offset) => {
                tracing::debug!(
                    "[Fanout] Appended message {} for room {} at offset {}",
                    message.id,
                    message.room_id,
                    offset
                );
                Ok(offset)
            }
            Err(e) => {
                tracing::error!(
                    "[Fanout] Append failed for message {} in room {}: {}",
                    message.id,
                    message.room_id,
                    e
                );
                Err(e)
            }
        }
    }
}
