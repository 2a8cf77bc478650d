//! Kafka-backed durable log
//!
//! Uses `rskafka` partition clients, one per partition of the chat topic.
//! The topic is created at startup if the controller does not know it.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use rskafka::client::partition::{Compression, OffsetAt, PartitionClient, UnknownTopicHandling};
use rskafka::client::error::{Error as ClientError, ProtocolError};
use rskafka::client::ClientBuilder;
use rskafka::record::Record;

use super::{DurableLog, LogError, LogRecord};
use crate::shared::chat::RoomId;

const CREATE_TOPIC_TIMEOUT_MS: i32 = 5_000;
const REPLICATION_FACTOR: i16 = 1;
const MAX_FETCH_BYTES: i32 = 1_000_000;

fn unavailable(context: &str, err: impl std::fmt::Display) -> LogError {
    LogError::unavailable(format!("{context}: {err}"))
}

fn fetch_error(partition: i32, offset: i64, err: ClientError) -> LogError {
    match err {
        ClientError::ServerError {
            protocol_error: ProtocolError::OffsetOutOfRange,
            ..
        } => LogError::OffsetOutOfRange { partition, offset },
        other => unavailable("fetch", other),
    }
}

/// Durable log on a Kafka topic
pub struct KafkaLog {
    topic: String,
    clients: Vec<Arc<PartitionClient>>,
}

impl KafkaLog {
    /// Connect to the brokers and open one client per partition
    pub async fn connect(
        brokers: Vec<String>,
        topic: &str,
        partitions: i32,
    ) -> Result<Self, LogError> {
        tracing::info!("[Fanout] Connecting to Kafka brokers {:?}", brokers);

        let client = ClientBuilder::new(brokers)
            .build()
            .await
            .map_err(|e| unavailable("connect", e))?;

        let controller = client
            .controller_client()
            .map_err(|e| unavailable("controller", e))?;
        match controller
            .create_topic(topic, partitions, REPLICATION_FACTOR, CREATE_TOPIC_TIMEOUT_MS)
            .await
        {
            Ok(()) => tracing::info!("[Fanout] Created topic '{}' with {} partitions", topic, partitions),
            Err(e) => tracing::debug!("[Fanout] Topic '{}' not created (likely exists): {}", topic, e),
        }

        let mut clients = Vec::with_capacity(partitions.max(1) as usize);
        for partition in 0..partitions.max(1) {
            let partition_client = client
                .partition_client(topic.to_string(), partition, UnknownTopicHandling::Retry)
                .await
                .map_err(|e| unavailable("partition client", e))?;
            clients.push(Arc::new(partition_client));
        }

        Ok(Self {
            topic: topic.to_string(),
            clients,
        })
    }

    fn client(&self, partition: i32) -> Result<&Arc<PartitionClient>, LogError> {
        self.clients
            .get(partition as usize)
            .ok_or_else(|| LogError::unavailable(format!("unknown partition {partition}")))
    }
}

#[async_trait]
impl DurableLog for KafkaLog {
    fn topic(&self) -> &str {
        &self.topic
    }

    fn partitions(&self) -> i32 {
        self.clients.len() as i32
    }

    async fn append(&self, room_id: RoomId, payload: Vec<u8>) -> Result<i64, LogError> {
        let partition = self.partition_for(room_id);
        let record = Record {
            key: Some(room_id.to_string().into_bytes()),
            value: Some(payload),
            headers: BTreeMap::new(),
            timestamp: Utc::now(),
        };

        let offsets = self
            .client(partition)?
            .produce(vec![record], Compression::NoCompression)
            .await
            .map_err(|e| unavailable("produce", e))?;

        offsets
            .first()
            .copied()
            .ok_or_else(|| LogError::unavailable("produce returned no offset"))
    }

    async fn fetch(
        &self,
        partition: i32,
        offset: i64,
        max_wait: Duration,
    ) -> Result<Vec<LogRecord>, LogError> {
        let max_wait_ms = i32::try_from(max_wait.as_millis()).unwrap_or(i32::MAX);
        let (records, _high_watermark) = self
            .client(partition)?
            .fetch_records(offset, 1..MAX_FETCH_BYTES, max_wait_ms)
            .await
            .map_err(|e| fetch_error(partition, offset, e))?;

        Ok(records
            .into_iter()
            .filter(|r| r.offset >= offset)
            .map(|r| LogRecord {
                partition,
                offset: r.offset,
                key: r.record.key.map(|k| String::from_utf8_lossy(&k).into_owned()),
                payload: r.record.value.unwrap_or_default(),
            })
            .collect())
    }

    async fn latest_offset(&self, partition: i32) -> Result<i64, LogError> {
        self.client(partition)?
            .get_offset(OffsetAt::Latest)
            .await
            .map_err(|e| unavailable("offset", e))
    }

    async fn earliest_offset(&self, partition: i32) -> Result<i64, LogError> {
        self.client(partition)?
            .get_offset(OffsetAt::Earliest)
            .await
            .map_err(|e| unavailable("offset", e))
    }
}
