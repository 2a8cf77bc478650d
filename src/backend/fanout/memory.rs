//! In-process durable log
//!
//! Used in tests and when no Kafka brokers are configured; it only fans out
//! within one replica. Each partition keeps at most `retention` entries;
//! older ones are dropped and their offsets become out of range, as they do
//! on a Kafka topic after retention.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;
use tokio::time::Instant;

use super::{DurableLog, LogError, LogRecord};
use crate::shared::chat::RoomId;

/// Entries kept per partition unless configured otherwise
pub const DEFAULT_RETENTION: usize = 10_000;

/// Most entries returned by one fetch
pub const MAX_FETCH_RECORDS: usize = 500;

#[derive(Debug, Clone, Default)]
struct Partition {
    /// Offset of `entries[0]`
    base: i64,
    entries: Vec<LogRecord>,
}

impl Partition {
    fn end(&self) -> i64 {
        self.base + self.entries.len() as i64
    }

    /// Drop entries below `offset`; returns how many were dropped
    fn truncate_before(&mut self, offset: i64) -> usize {
        let drop = (offset - self.base).clamp(0, self.entries.len() as i64) as usize;
        self.entries.drain(..drop);
        self.base += drop as i64;
        drop
    }
}

/// Vec-per-partition log with blocking fetch
pub struct MemoryLog {
    topic: String,
    partitions: Mutex<Vec<Partition>>,
    retention: usize,
    appended: Notify,
    unavailable: AtomicBool,
}

impl MemoryLog {
    pub fn new(topic: impl Into<String>, partitions: i32) -> Self {
        let count = partitions.max(1) as usize;
        Self {
            topic: topic.into(),
            partitions: Mutex::new(vec![Partition::default(); count]),
            retention: DEFAULT_RETENTION,
            appended: Notify::new(),
            unavailable: AtomicBool::new(false),
        }
    }

    /// Keep at most `max_entries` per partition
    pub fn with_retention(mut self, max_entries: usize) -> Self {
        self.retention = max_entries.max(1);
        self
    }

    /// Make subsequent appends fail with [`LogError::Unavailable`]
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Drop the entries of `partition` below `offset`
    pub fn truncate_before(&self, partition: i32, offset: i64) -> usize {
        self.lock()
            .get_mut(partition as usize)
            .map(|p| p.truncate_before(offset))
            .unwrap_or(0)
    }

    /// Number of entries `partition` currently holds
    pub fn len(&self, partition: i32) -> usize {
        self.lock()
            .get(partition as usize)
            .map(|p| p.entries.len())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.lock().iter().all(|p| p.entries.is_empty())
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Partition>> {
        self.partitions.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn with_partition<T>(
        &self,
        partition: i32,
        f: impl FnOnce(&Partition) -> Result<T, LogError>,
    ) -> Result<T, LogError> {
        let partitions = self.lock();
        let p = partitions
            .get(partition as usize)
            .ok_or_else(|| LogError::unavailable(format!("unknown partition {partition}")))?;
        f(p)
    }

    fn read_from(&self, partition: i32, offset: i64) -> Result<Vec<LogRecord>, LogError> {
        self.with_partition(partition, |p| {
            if offset < p.base || offset > p.end() {
                return Err(LogError::OffsetOutOfRange { partition, offset });
            }
            let start = (offset - p.base) as usize;
            Ok(p.entries[start..]
                .iter()
                .take(MAX_FETCH_RECORDS)
                .cloned()
                .collect())
        })
    }
}

#[async_trait]
impl DurableLog for MemoryLog {
    fn topic(&self) -> &str {
        &self.topic
    }

    fn partitions(&self) -> i32 {
        self.lock().len() as i32
    }

    async fn append(&self, room_id: RoomId, payload: Vec<u8>) -> Result<i64, LogError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(LogError::unavailable("memory log marked unavailable"));
        }

        let partition = self.partition_for(room_id);
        let offset = {
            let mut partitions = self.lock();
            let p = partitions
                .get_mut(partition as usize)
                .ok_or_else(|| LogError::unavailable(format!("unknown partition {partition}")))?;
            let offset = p.end();
            p.entries.push(LogRecord {
                partition,
                offset,
                key: Some(room_id.to_string()),
                payload,
            });
            if p.entries.len() > self.retention {
                let keep_from = p.end() - self.retention as i64;
                p.truncate_before(keep_from);
            }
            offset
        };

        self.appended.notify_waiters();
        Ok(offset)
    }

    async fn fetch(
        &self,
        partition: i32,
        offset: i64,
        max_wait: Duration,
    ) -> Result<Vec<LogRecord>, LogError> {
        let deadline = Instant::now() + max_wait;
        loop {
            // Register interest before reading so an append in between is not missed
            let notified = self.appended.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let records = self.read_from(partition, offset)?;
            if !records.is_empty() {
                return Ok(records);
            }

            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Ok(Vec::new());
            }
        }
    }

    async fn latest_offset(&self, partition: i32) -> Result<i64, LogError> {
        self.with_partition(partition, |p| Ok(p.end()))
    }

    async fn earliest_offset(&self, partition: i32) -> Result<i64, LogError> {
        self.with_partition(partition, |p| Ok(p.base))
    }
}
