//! Committed consumer offsets
//!
//! An offset is the position of the next entry a consumer group still has
//! to process. Committing happens after delivery, which is what makes the
//! pipeline at-least-once.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::backend::store::{PgStore, StoreError};

/// Storage for per-group, per-partition consumer positions
#[async_trait]
pub trait OffsetStore: Send + Sync {
    async fn load(&self, group: &str, topic: &str, partition: i32)
        -> Result<Option<i64>, StoreError>;

    async fn commit(
        &self,
        group: &str,
        topic: &str,
        partition: i32,
        next_offset: i64,
    ) -> Result<(), StoreError>;
}

/// Offsets kept in process memory
#[derive(Default)]
pub struct MemoryOffsetStore {
    offsets: Mutex<HashMap<(String, String, i32), i64>>,
}

impl MemoryOffsetStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OffsetStore for MemoryOffsetStore {
    async fn load(
        &self,
        group: &str,
        topic: &str,
        partition: i32,
    ) -> Result<Option<i64>, StoreError> {
        let offsets = self.offsets.lock().unwrap_or_else(|p| p.into_inner());
        Ok(offsets
            .get(&(group.to_string(), topic.to_string(), partition))
            .copied())
    }

    async fn commit(
        &self,
        group: &str,
        topic: &str,
        partition: i32,
        next_offset: i64,
    ) -> Result<(), StoreError> {
        let mut offsets = self.offsets.lock().unwrap_or_else(|p| p.into_inner());
        offsets.insert((group.to_string(), topic.to_string(), partition), next_offset);
        Ok(())
    }
}

#[async_trait]
impl OffsetStore for PgStore {
    async fn load(
        &self,
        group: &str,
        topic: &str,
        partition: i32,
    ) -> Result<Option<i64>, StoreError> {
        let offset: Option<i64> = sqlx::query_scalar(
            r#"
            SELECT next_offset
            FROM fanout_offsets
            WHERE consumer_group = $1 AND topic = $2 AND partition_id = $3
            "#,
        )
        .bind(group)
        .bind(topic)
        .bind(partition)
        .fetch_optional(self.pool())
        .await?;
        Ok(offset)
    }

    async fn commit(
        &self,
        group: &str,
        topic: &str,
        partition: i32,
        next_offset: i64,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO fanout_offsets (consumer_group, topic, partition_id, next_offset, updated_at)
            VALUES ($1, $2, $3, $4, NOW())
            ON CONFLICT (consumer_group, topic, partition_id)
            DO UPDATE SET next_offset = EXCLUDED.next_offset, updated_at = NOW()
            "#,
        )
        .bind(group)
        .bind(topic)
        .bind(partition)
        .bind(next_offset)
        .execute(self.pool())
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_offsets_are_scoped_by_group() {
        let store = MemoryOffsetStore::new();
        assert_eq!(store.load("a", "t", 0).await.unwrap(), None);

        store.commit("a", "t", 0, 5).await.unwrap();
        store.commit("a", "t", 0, 7).await.unwrap();

        assert_eq!(store.load("a", "t", 0).await.unwrap(), Some(7));
        assert_eq!(store.load("b", "t", 0).await.unwrap(), None);
        assert_eq!(store.load("a", "t", 1).await.unwrap(), None);
    }
}
