//! Common test utilities and helpers
//!
//! - `TestApp`: a chat runtime on in-memory stores and an in-memory log
//! - `ScriptedGenerator`: text generator replaying canned streams
//! - `Probe`: a fake socket registered in the connection registry (`listen`)
//! - assertion macros

#![allow(dead_code)]

pub mod assertions;

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream;
use tokio::sync::mpsc;

use tutorchat::backend::chat::ai_bridge::{Prompt, TextGenerator, TextStream};
use tutorchat::backend::error::{BackendError, BackendResult};
use tutorchat::backend::fanout::{MemoryLog, StartPosition};
use tutorchat::backend::realtime::{ConnectionRegistry, OutboundFrame, SessionTicket};
use tutorchat::backend::server::{self, Backends, ChatRuntime};
use tutorchat::backend::store::{MemoryStore, NewRoom, RoomStore};
use tutorchat::shared::chat::{ChatMessage, Role, Room, RoomId, UserId};
use tutorchat::shared::ChatConfig;

pub const STUDENT: UserId = 100;
pub const TEACHER: UserId = 200;
pub const OUTSIDER: UserId = 300;

/// How long a probe waits for a frame before failing
pub const RECV_TIMEOUT: Duration = Duration::from_secs(3);

/// One canned completion
#[derive(Debug, Clone)]
pub enum Script {
    Chunks(Vec<String>),
    /// The request itself fails
    FailBeforeStream,
    /// Yields the chunks, then errors
    FailAfter(Vec<String>),
}

impl Script {
    pub fn chunks(chunks: &[&str]) -> Self {
        Script::Chunks(chunks.iter().map(|c| c.to_string()).collect())
    }
}

/// Text generator replaying scripts in order; records every prompt
#[derive(Default)]
pub struct ScriptedGenerator {
    scripts: Mutex<VecDeque<Script>>,
    prompts: Mutex<Vec<Prompt>>,
}

impl ScriptedGenerator {
    pub fn push(&self, script: Script) {
        self.scripts.lock().unwrap().push_back(script);
    }

    pub fn prompts(&self) -> Vec<Prompt> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn stream_completion(&self, prompt: Prompt) -> BackendResult<TextStream> {
        self.prompts.lock().unwrap().push(prompt);
        let script = self
            .scripts
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Script::chunks(&["Okay."]));

        let items: Vec<BackendResult<String>> = match script {
            Script::FailBeforeStream => return Err(BackendError::upstream_ai("scripted failure")),
            Script::Chunks(chunks) => chunks.into_iter().map(Ok).collect(),
            Script::FailAfter(chunks) => chunks
                .into_iter()
                .map(Ok)
                .chain(std::iter::once(Err(BackendError::upstream_ai("stream cut"))))
                .collect(),
        };
        Ok(Box::pin(stream::iter(items)))
    }
}

/// Fake socket: receives whatever the registry delivers to it
pub struct Probe {
    pub ticket: SessionTicket,
    rx: mpsc::Receiver<OutboundFrame>,
}

impl Probe {
    pub fn connect(registry: &ConnectionRegistry, room_id: RoomId, user_id: UserId) -> Self {
        let (tx, rx) = mpsc::channel(64);
        let ticket = registry.connect(room_id, user_id, tx);
        Self { ticket, rx }
    }

    pub async fn next_frame(&mut self) -> String {
        match tokio::time::timeout(RECV_TIMEOUT, self.rx.recv()).await {
            Ok(Some(frame)) => frame.to_string(),
            Ok(None) => panic!("probe channel closed"),
            Err(_) => panic!("timed out waiting for a frame"),
        }
    }

    pub async fn next_message(&mut self) -> ChatMessage {
        let frame = self.next_frame().await;
        serde_json::from_str(&frame).unwrap_or_else(|e| panic!("bad frame {frame}: {e}"))
    }

    pub async fn next_messages(&mut self, count: usize) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(count);
        for _ in 0..count {
            messages.push(self.next_message().await);
        }
        messages
    }

    /// Assert nothing arrives within `wait`
    pub async fn assert_silent(&mut self, wait: Duration) {
        if let Ok(Some(frame)) = tokio::time::timeout(wait, self.rx.recv()).await {
            panic!("expected silence, got {frame}");
        }
    }
}

/// Chat runtime on in-memory backends
pub struct TestApp {
    pub runtime: ChatRuntime,
    pub store: Arc<MemoryStore>,
    pub log: Arc<MemoryLog>,
    pub generator: Arc<ScriptedGenerator>,
}

pub fn test_config() -> ChatConfig {
    ChatConfig {
        partitions: 2,
        fetch_max_wait_ms: 100,
        consumer_group: "test-group".to_string(),
        ..ChatConfig::default()
    }
}

impl TestApp {
    pub fn start() -> Self {
        Self::start_with(test_config())
    }

    pub fn start_with(config: ChatConfig) -> Self {
        let store = Arc::new(
            MemoryStore::new()
                .with_user(STUDENT, Role::Student)
                .with_user(TEACHER, Role::Teacher)
                .with_user(OUTSIDER, Role::Student),
        );
        let log = Arc::new(MemoryLog::new(config.chat_topic.clone(), config.partitions));
        let generator = Arc::new(ScriptedGenerator::default());

        let backends = Backends::in_memory(store.clone(), log.clone());
        let runtime = server::start(&config, backends, generator.clone(), StartPosition::Earliest);

        Self {
            runtime,
            store,
            log,
            generator,
        }
    }

    /// Open the default student/teacher room
    pub async fn room(&self) -> Room {
        self.store
            .open_room(NewRoom {
                title: Some("Algebra".to_string()),
                student_id: STUDENT,
                teacher_id: TEACHER,
            })
            .await
            .unwrap()
            .room
    }

    /// Register a fake socket for `user_id` in `room_id`
    pub fn probe(&self, room_id: RoomId, user_id: UserId) -> Probe {
        Probe::connect(&self.runtime.state().registry, room_id, user_id)
    }

    /// Same fake socket, for suites that read it as a listener
    pub fn listen(&self, room_id: RoomId, user_id: UserId) -> Probe {
        listen(&self.runtime.state().registry, room_id, user_id)
    }

    pub async fn shutdown(self) {
        self.runtime.shutdown().await;
    }
}

/// A room value that exists only in memory
/// Fake socket on a bare registry
pub fn listen(registry: &ConnectionRegistry, room_id: RoomId, user_id: UserId) -> Probe {
    Probe::connect(registry, room_id, user_id)
}

pub fn sample_room(id: RoomId) -> Room {
    let now = chrono::Utc::now();
    Room {
        id,
        title: "Geometry".to_string(),
        help_checked: false,
        created_at: now,
        updated_at: now,
    }
}
