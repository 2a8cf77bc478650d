/**
 * Server Initialization
 *
 * Builds the chat core's service graph and owns its lifecycle.
 *
 * # Initialization Process
 *
 * 1. Connect the configured backends (database, durable log) or fall back
 *    to in-memory implementations
 * 2. Wire producer, publisher, AI bridge and routing service
 * 3. Start the fan-out consumer with a cancellation token
 * 4. Hand out the router
 *
 * # Shutdown
 *
 * [`ChatRuntime::shutdown`] cancels the consumer and waits for every
 * partition worker to stop. It is called after the HTTP server has drained.
 */

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use tokio_util::sync::CancellationToken;

use crate::backend::auth::Authenticator;
use crate::backend::chat::ai_bridge::{AiBridge, GenaiTextGenerator, TextGenerator};
use crate::backend::chat::publisher::ChatPublisher;
use crate::backend::chat::routing::ChatService;
use crate::backend::fanout::{
    ConsumerHandle, DurableLog, FanoutConsumer, FanoutProducer, MemoryOffsetStore, OffsetStore,
    StartPosition,
};
use crate::backend::realtime::ConnectionRegistry;
use crate::backend::routes::create_router;
use crate::backend::server::config::{load_database, load_durable_log, StartupError};
use crate::backend::server::state::AppState;
use crate::backend::store::{MemoryStore, MessageLog, PgStore, RoomStore, UserDirectory};
use crate::shared::ChatConfig;

/// Store and log implementations the chat core runs on
#[derive(Clone)]
pub struct Backends {
    pub rooms: Arc<dyn RoomStore>,
    pub messages: Arc<dyn MessageLog>,
    pub users: Arc<dyn UserDirectory>,
    pub offsets: Arc<dyn OffsetStore>,
    pub log: Arc<dyn DurableLog>,
}

impl Backends {
    /// All stores backed by one [`MemoryStore`]
    pub fn in_memory(store: Arc<MemoryStore>, log: Arc<dyn DurableLog>) -> Self {
        Self {
            rooms: store.clone(),
            messages: store.clone(),
            users: store,
            offsets: Arc::new(MemoryOffsetStore::new()),
            log,
        }
    }

    /// All stores backed by one [`PgStore`]
    pub fn postgres(store: PgStore, log: Arc<dyn DurableLog>) -> Self {
        let store = Arc::new(store);
        Self {
            rooms: store.clone(),
            messages: store.clone(),
            users: store.clone(),
            offsets: store,
            log,
        }
    }

    /// Connect whatever the configuration names
    pub async fn connect(config: &ChatConfig) -> Result<Self, StartupError> {
        let log = load_durable_log(config).await?;
        Ok(match load_database(config).await? {
            Some(pool) => Self::postgres(PgStore::new(pool), log),
            None => Self::in_memory(Arc::new(MemoryStore::new()), log),
        })
    }
}

/// A running chat core: handler state plus the background consumer
pub struct ChatRuntime {
    state: AppState,
    consumer: ConsumerHandle,
}

impl ChatRuntime {
    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub fn router(&self) -> Router<()> {
        create_router(self.state.clone())
    }

    /// Stop the consumer and wait for it
    pub async fn shutdown(self) {
        tracing::info!("[Server] Shutting down chat runtime");
        self.consumer.shutdown().await;
    }
}

/// Connect the configured backends and start the runtime
pub async fn init(config: &ChatConfig) -> Result<ChatRuntime, StartupError> {
    tracing::info!("[Server] Initializing chat core");
    let backends = Backends::connect(config).await?;
    let generator = Arc::new(GenaiTextGenerator::new(config.ai_model.clone()));
    Ok(start(config, backends, generator, StartPosition::Latest))
}

/// Wire the service graph on explicit backends and start the consumer
///
/// Must be called inside a Tokio runtime.
pub fn start(
    config: &ChatConfig,
    backends: Backends,
    generator: Arc<dyn TextGenerator>,
    consumer_start: StartPosition,
) -> ChatRuntime {
    let registry = Arc::new(ConnectionRegistry::new());
    let producer = FanoutProducer::new(backends.log.clone());
    let publisher = ChatPublisher::new(backends.messages.clone(), producer);

    let ai = Arc::new(AiBridge::new(
        generator,
        backends.messages.clone(),
        publisher.clone(),
        config.ai_system_prompt.clone(),
        config.ai_history_window,
        config.ai_chunk_threshold,
    ));

    let chat = Arc::new(ChatService::new(
        backends.rooms.clone(),
        backends.users.clone(),
        publisher,
        ai,
        config.max_content_len,
    ));

    let consumer = FanoutConsumer::new(
        backends.log.clone(),
        backends.offsets.clone(),
        registry.clone(),
        config.consumer_group.clone(),
    )
    .with_max_wait(Duration::from_millis(config.fetch_max_wait_ms.max(1) as u64))
    .with_start_position(consumer_start)
    .spawn(CancellationToken::new());

    let state = AppState {
        chat,
        registry,
        rooms: backends.rooms,
        messages: backends.messages,
        auth: Authenticator::new(config.jwt_secret.clone()),
    };

    tracing::info!(
        "[Server] Chat core ready (topic '{}', group '{}')",
        config.chat_topic,
        config.consumer_group
    );

    ChatRuntime { state, consumer }
}
