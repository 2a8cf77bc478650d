//! Chat publisher
//!
//! Persists a message to the message log, then appends it to the durable
//! fan-out log. A message whose append fails stays persisted and the caller
//! receives `DeliveryUnavailable`.

use std::sync::Arc;

use crate::backend::error::BackendResult;
use crate::backend::fanout::FanoutProducer;
use crate::backend::store::MessageLog;
use crate::shared::chat::ChatMessage;

#[derive(Clone)]
pub struct ChatPublisher {
    messages: Arc<dyn MessageLog>,
    producer: FanoutProducer,
}

impl ChatPublisher {
    pub fn new(messages: Arc<dyn MessageLog>, producer: FanoutProducer) -> Self {
        Self { messages, producer }
    }

    pub async fn publish(&self, message: &ChatMessage) -> BackendResult<()> {
        self.messages.append_message(message).await?;
        self.producer.publish(message).await?;
        Ok(())
    }

    /// Persist every message, then append each of them in order
    ///
    /// A failed append does not stop the remaining ones; the first failure
    /// is returned once all appends were attempted.
    pub async fn publish_all(&self, messages: &[ChatMessage]) -> BackendResult<()> {
        for message in messages {
            self.messages.append_message(message).await?;
        }

        let mut first_failure = None;
        for message in messages {
            if let Err(e) = self.producer.publish(message).await {
                first_failure.get_or_insert(e);
            }
        }

        match first_failure {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }
}
