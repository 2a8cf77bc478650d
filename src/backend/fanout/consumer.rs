//! Fan-out consumer
//!
//! Runs one worker per partition. Each worker fetches entries from its
//! committed position, decodes them and hands them to the local registry,
//! then commits the position after the last delivered entry.
//!
//! A committed offset the log no longer holds (after retention or a
//! recreated topic) restarts the worker at the earliest retained entry.
//!
//! Cancellation interrupts an in-flight fetch; entries of a batch that were
//! not yet delivered are left for the next start.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use super::{DurableLog, LogError, LogRecord, OffsetStore};
use crate::backend::realtime::ConnectionRegistry;
use crate::shared::chat::ChatMessage;

/// Delay before retrying after a failed fetch or offset lookup
const RETRY_BACKOFF: Duration = Duration::from_secs(1);

/// Where a worker starts when its group has no committed offset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StartPosition {
    /// Only entries appended after startup
    #[default]
    Latest,
    /// Everything still in the log
    Earliest,
}

/// Reads the durable log and delivers to this replica's sockets
pub struct FanoutConsumer {
    log: Arc<dyn DurableLog>,
    offsets: Arc<dyn OffsetStore>,
    registry: Arc<ConnectionRegistry>,
    group: String,
    max_wait: Duration,
    start: StartPosition,
}

impl FanoutConsumer {
    pub fn new(
        log: Arc<dyn DurableLog>,
        offsets: Arc<dyn OffsetStore>,
        registry: Arc<ConnectionRegistry>,
        group: impl Into<String>,
    ) -> Self {
        Self {
            log,
            offsets,
            registry,
            group: group.into(),
            max_wait: Duration::from_millis(500),
            start: StartPosition::default(),
        }
    }

    pub fn with_max_wait(mut self, max_wait: Duration) -> Self {
        self.max_wait = max_wait;
        self
    }

    pub fn with_start_position(mut self, start: StartPosition) -> Self {
        self.start = start;
        self
    }

    /// Start one worker per partition
    pub fn spawn(self, cancel: CancellationToken) -> ConsumerHandle {
        let consumer = Arc::new(self);
        let mut workers = JoinSet::new();

        for partition in 0..consumer.log.partitions() {
            let consumer = consumer.clone();
            let cancel = cancel.clone();
            workers.spawn(async move { consumer.run_partition(partition, cancel).await });
        }

        tracing::info!(
            "[Fanout] Consumer group '{}' started on topic '{}' ({} partitions)",
            consumer.group,
            consumer.log.topic(),
            consumer.log.partitions()
        );

        ConsumerHandle { cancel, workers }
    }

    async fn start_offset(&self, partition: i32) -> Result<i64, String> {
        let committed = self
            .offsets
            .load(&self.group, self.log.topic(), partition)
            .await
            .map_err(|e| e.to_string())?;

        match (committed, self.start) {
            (Some(offset), _) => Ok(offset),
            (None, StartPosition::Earliest) => Ok(0),
            (None, StartPosition::Latest) => self
                .log
                .latest_offset(partition)
                .await
                .map_err(|e| e.to_string()),
        }
    }

    async fn run_partition(&self, partition: i32, cancel: CancellationToken) {
        let mut next = loop {
            match self.start_offset(partition).await {
                Ok(offset) => break offset,
                Err(e) => {
                    tracing::warn!("[Fanout] Partition {} start offset unavailable: {}", partition, e);
                    tokio::select! {
                        _ = cancel.cancelled() => return,
                        _ = tokio::time::sleep(RETRY_BACKOFF) => {}
                    }
                }
            }
        };

        tracing::debug!("[Fanout] Partition {} consuming from offset {}", partition, next);

        loop {
            let fetched = tokio::select! {
                _ = cancel.cancelled() => break,
                fetched = self.log.fetch(partition, next, self.max_wait) => fetched,
            };

            let records = match fetched {
                Ok(records) => records,
                Err(LogError::OffsetOutOfRange { offset, .. }) => {
                    match self.log.earliest_offset(partition).await {
                        Ok(earliest) => {
                            // Rewind rather than skip: entries may be redelivered
                            tracing::warn!(
                                "[Fanout] Offset {} out of range on partition {}; resuming at earliest offset {}",
                                offset,
                                partition,
                                earliest
                            );
                            next = earliest;
                            continue;
                        }
                        Err(e) => {
                            tracing::warn!(
                                "[Fanout] Earliest offset of partition {} unavailable: {}",
                                partition,
                                e
                            );
                            tokio::select! {
                                _ = cancel.cancelled() => break,
                                _ = tokio::time::sleep(RETRY_BACKOFF) => continue,
                            }
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!("[Fanout] Fetch failed on partition {}: {}", partition, e);
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(RETRY_BACKOFF) => continue,
                    }
                }
            };

            let mut processed = next;
            for record in &records {
                if cancel.is_cancelled() {
                    break;
                }
                self.handle_record(record);
                processed = record.offset + 1;
            }

            if processed != next {
                next = processed;
                if let Err(e) = self
                    .offsets
                    .commit(&self.group, self.log.topic(), partition, next)
                    .await
                {
                    // Retried with the next batch; a crash before then redelivers
                    tracing::error!("[Fanout] Offset commit failed on partition {}: {}", partition, e);
                }
            }

            if cancel.is_cancelled() {
                break;
            }
        }

        tracing::info!("[Fanout] Partition {} stopped at offset {}", partition, next);
    }

    fn handle_record(&self, record: &LogRecord) {
        let message: ChatMessage = match serde_json::from_slice(&record.payload) {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!(
                    "[Fanout] Skipping undecodable entry at {}:{}: {}",
                    record.partition,
                    record.offset,
                    e
                );
                return;
            }
        };

        let delivered = self.registry.deliver(message.room_id, &message);
        tracing::debug!(
            "[Fanout] Delivered message {} to {} local sessions in room {}",
            message.id,
            delivered,
            message.room_id
        );
    }
}

/// Running consumer; dropping it aborts the workers
pub struct ConsumerHandle {
    cancel: CancellationToken,
    workers: JoinSet<()>,
}

impl ConsumerHandle {
    /// Cancel every worker and wait for them to stop
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        while let Some(result) = self.workers.join_next().await {
            if let Err(e) = result {
                tracing::error!("[Fanout] Consumer worker ended abnormally: {}", e);
            }
        }
        tracing::info!("[Fanout] Consumer stopped");
    }
}
