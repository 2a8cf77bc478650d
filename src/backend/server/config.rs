/**
 * Backend Service Loading
 *
 * Connects the optional external services named in [`ChatConfig`]: the
 * PostgreSQL database and the Kafka brokers.
 *
 * # Fallbacks
 *
 * - No `DATABASE_URL`: rooms, messages, users and offsets live in memory.
 * - No `KAFKA_BROKERS`: the durable log is an in-process log; fan-out only
 *   reaches sockets of this replica.
 *
 * A configured service that cannot be reached is a startup error, not a
 * silent fallback.
 */

use std::sync::Arc;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use thiserror::Error;

use crate::backend::fanout::{DurableLog, KafkaLog, LogError, MemoryLog};
use crate::shared::ChatConfig;

/// Failure to reach a configured service
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("Database connection failed: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Database migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Durable log unavailable: {0}")]
    Log(#[from] LogError),
}

/// Connect to PostgreSQL and run migrations
///
/// Returns `None` when no database is configured.
pub async fn load_database(config: &ChatConfig) -> Result<Option<PgPool>, StartupError> {
    let Some(database_url) = config.database_url.as_deref() else {
        tracing::warn!("[Server] DATABASE_URL not set. Using in-memory stores.");
        return Ok(None);
    };

    tracing::info!("[Server] Connecting to database...");
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await?;
    tracing::info!("[Server] Database connection pool created successfully");

    tracing::info!("[Server] Running database migrations...");
    sqlx::migrate!().run(&pool).await?;
    tracing::info!("[Server] Database migrations completed successfully");

    Ok(Some(pool))
}

/// Open the durable log named by the configuration
pub async fn load_durable_log(config: &ChatConfig) -> Result<Arc<dyn DurableLog>, StartupError> {
    if config.kafka_brokers.is_empty() {
        tracing::warn!("[Server] KAFKA_BROKERS not set. Fan-out is limited to this process.");
        return Ok(Arc::new(MemoryLog::new(
            config.chat_topic.clone(),
            config.partitions,
        )));
    }

    let log = KafkaLog::connect(
        config.kafka_brokers.clone(),
        &config.chat_topic,
        config.partitions,
    )
    .await?;
    Ok(Arc::new(log))
}
