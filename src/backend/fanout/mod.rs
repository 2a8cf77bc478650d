//! Durable Fan-out Module
//!
//! Every chat event is appended to a partitioned durable log and read back
//! by a consumer loop on every replica, which hands it to the local
//! [`ConnectionRegistry`](crate::backend::realtime::ConnectionRegistry).
//!
//! # Module Structure
//!
//! ```text
//! fanout/
//! ├── mod.rs      - DurableLog trait, LogRecord, LogError
//! ├── kafka.rs    - rskafka-backed log
//! ├── memory.rs   - in-process log
//! ├── offsets.rs  - committed consumer offsets
//! ├── producer.rs - serialize + append, keyed by room
//! └── consumer.rs - fetch loop feeding the registry
//! ```
//!
//! # Guarantees
//!
//! - All events of one room land in one partition, so they are read back in
//!   the order they were appended.
//! - Offsets are committed only after an entry was delivered locally. A
//!   restart resumes from the last commit, so entries may be redelivered but
//!   are never skipped.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::shared::chat::RoomId;

pub mod consumer;
pub mod kafka;
pub mod memory;
pub mod offsets;
pub mod producer;

pub use consumer::{ConsumerHandle, FanoutConsumer, StartPosition};
pub use kafka::KafkaLog;
pub use memory::MemoryLog;
pub use offsets::{MemoryOffsetStore, OffsetStore};
pub use producer::FanoutProducer;

/// Errors raised by the durable log
#[derive(Debug, Error)]
pub enum LogError {
    #[error("Durable log unavailable: {0}")]
    Unavailable(String),

    /// The requested offset is no longer (or not yet) held by the partition
    #[error("Offset {offset} is out of range for partition {partition}")]
    OffsetOutOfRange { partition: i32, offset: i64 },

    #[error("Failed to encode event: {0}")]
    Encode(#[from] serde_json::Error),
}

impl LogError {
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable(message.into())
    }
}

/// One entry read back from the log
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    pub partition: i32,
    pub offset: i64,
    pub key: Option<String>,
    pub payload: Vec<u8>,
}

/// A partitioned, append-only log
#[async_trait]
pub trait DurableLog: Send + Sync {
    /// Topic or stream name, used to scope committed offsets
    fn topic(&self) -> &str;

    fn partitions(&self) -> i32;

    /// Partition that holds every event of `room_id`
    fn partition_for(&self, room_id: RoomId) -> i32 {
        room_id.rem_euclid(i64::from(self.partitions().max(1))) as i32
    }

    /// Append an event keyed by room; returns its offset
    async fn append(&self, room_id: RoomId, payload: Vec<u8>) -> Result<i64, LogError>;

    /// Entries at or after `offset`, waiting up to `max_wait` when none exist
    async fn fetch(
        &self,
        partition: i32,
        offset: i64,
        max_wait: Duration,
    ) -> Result<Vec<LogRecord>, LogError>;

    /// Offset the next appended entry of `partition` will receive
    async fn latest_offset(&self, partition: i32) -> Result<i64, LogError>;

    /// Oldest offset `partition` still holds
    async fn earliest_offset(&self, partition: i32) -> Result<i64, LogError>;
}
