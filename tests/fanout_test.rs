//! Durable fan-out: committed offsets, restarts and cross-replica delivery

mod common;

use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use tokio_util::sync::CancellationToken;

use common::{listen, sample_room, Probe, STUDENT, TEACHER};
use tutorchat::backend::fanout::{
    DurableLog, FanoutConsumer, FanoutProducer, MemoryLog, MemoryOffsetStore, OffsetStore,
    StartPosition,
};
use tutorchat::backend::realtime::ConnectionRegistry;
use tutorchat::shared::chat::{ChatMessage, Role, RoomId};
use tutorchat::shared::MessageBody;

const TOPIC: &str = "chat-events";
const GROUP: &str = "replica-a";
const ROOM: RoomId = 7;

struct Replica {
    log: Arc<MemoryLog>,
    offsets: Arc<MemoryOffsetStore>,
    registry: Arc<ConnectionRegistry>,
}

impl Replica {
    fn new() -> Self {
        Self {
            log: Arc::new(MemoryLog::new(TOPIC, 1)),
            offsets: Arc::new(MemoryOffsetStore::new()),
            registry: Arc::new(ConnectionRegistry::new()),
        }
    }

    fn consumer(&self, group: &str, start: StartPosition) -> FanoutConsumer {
        FanoutConsumer::new(
            self.log.clone(),
            self.offsets.clone(),
            self.registry.clone(),
            group,
        )
        .with_max_wait(Duration::from_millis(50))
        .with_start_position(start)
    }

    fn producer(&self) -> FanoutProducer {
        FanoutProducer::new(self.log.clone())
    }
}

fn student_says(content: &str) -> ChatMessage {
    ChatMessage::from_participant(
        &sample_room(ROOM),
        STUDENT,
        Role::Student,
        MessageBody::Text(content.to_string()),
    )
}

async fn publish_all(producer: &FanoutProducer, contents: &[&str]) {
    for content in contents {
        producer.publish(&student_says(content)).await.unwrap();
    }
}

#[tokio::test]
async fn test_restart_resumes_after_committed_offset() {
    let replica = Replica::new();
    let mut probe = Probe::connect(&replica.registry, ROOM, TEACHER);
    let producer = replica.producer();

    let handle = replica
        .consumer(GROUP, StartPosition::Earliest)
        .spawn(CancellationToken::new());
    publish_all(&producer, &["one", "two", "three"]).await;
    let first = probe.next_messages(3).await;
    assert_contents!(first, ["one", "two", "three"]);
    handle.shutdown().await;

    assert_eq!(replica.offsets.load(GROUP, TOPIC, 0).await.unwrap(), Some(3));

    // Appended while no consumer runs
    publish_all(&producer, &["four", "five"]).await;

    let handle = replica
        .consumer(GROUP, StartPosition::Earliest)
        .spawn(CancellationToken::new());
    let resumed = probe.next_messages(2).await;
    assert_contents!(resumed, ["four", "five"]);
    probe.assert_silent(Duration::from_millis(200)).await;
    handle.shutdown().await;

    assert_eq!(replica.offsets.load(GROUP, TOPIC, 0).await.unwrap(), Some(5));
}

#[tokio::test]
async fn test_rewound_offset_redelivers() {
    let replica = Replica::new();
    publish_all(&replica.producer(), &["a", "b", "c"]).await;
    replica.offsets.commit(GROUP, TOPIC, 0, 1).await.unwrap();

    let mut probe = Probe::connect(&replica.registry, ROOM, STUDENT);
    let handle = replica
        .consumer(GROUP, StartPosition::Latest)
        .spawn(CancellationToken::new());

    let messages = probe.next_messages(2).await;
    assert_contents!(messages, ["b", "c"]);
    probe.assert_silent(Duration::from_millis(200)).await;
    handle.shutdown().await;
}

#[tokio::test]
async fn test_latest_start_skips_backlog() {
    let replica = Replica::new();
    let producer = replica.producer();
    publish_all(&producer, &["old", "older"]).await;

    let mut probe = Probe::connect(&replica.registry, ROOM, STUDENT);
    let handle = replica
        .consumer(GROUP, StartPosition::Latest)
        .spawn(CancellationToken::new());
    // Let the worker resolve its start offset
    tokio::time::sleep(Duration::from_millis(100)).await;

    publish_all(&producer, &["fresh"]).await;
    assert_eq!(probe.next_message().await.content(), "fresh");
    probe.assert_silent(Duration::from_millis(200)).await;
    handle.shutdown().await;
}

#[tokio::test]
async fn test_committed_offset_behind_retention_resumes_at_earliest() {
    let replica = Replica::new();
    let producer = replica.producer();
    publish_all(&producer, &["gone-1", "gone-2", "kept-1", "kept-2"]).await;
    replica.offsets.commit(GROUP, TOPIC, 0, 1).await.unwrap();
    // Retention removed everything below offset 2
    assert_eq!(replica.log.truncate_before(0, 2), 2);

    let mut student = listen(&replica.registry, ROOM, STUDENT);
    let handle = replica
        .consumer(GROUP, StartPosition::Latest)
        .spawn(CancellationToken::new());

    let messages = student.next_messages(2).await;
    assert_contents!(messages, ["kept-1", "kept-2"]);

    publish_all(&producer, &["live"]).await;
    assert_eq!(student.next_message().await.content(), "live");
    handle.shutdown().await;

    assert_eq!(replica.offsets.load(GROUP, TOPIC, 0).await.unwrap(), Some(5));
}

#[tokio::test]
async fn test_committed_offset_past_a_recreated_log_resumes_at_earliest() {
    let replica = Replica::new();
    publish_all(&replica.producer(), &["first on new topic"]).await;
    replica.offsets.commit(GROUP, TOPIC, 0, 40).await.unwrap();

    let mut student = listen(&replica.registry, ROOM, STUDENT);
    let handle = replica
        .consumer(GROUP, StartPosition::Latest)
        .spawn(CancellationToken::new());

    assert_eq!(student.next_message().await.content(), "first on new topic");
    handle.shutdown().await;
    assert_eq!(replica.offsets.load(GROUP, TOPIC, 0).await.unwrap(), Some(1));
}

#[tokio::test]
async fn test_undecodable_entry_is_skipped_and_committed() {
    let replica = Replica::new();
    replica.log.append(ROOM, b"not a chat event".to_vec()).await.unwrap();
    publish_all(&replica.producer(), &["after garbage"]).await;

    let mut probe = Probe::connect(&replica.registry, ROOM, STUDENT);
    let handle = replica
        .consumer(GROUP, StartPosition::Earliest)
        .spawn(CancellationToken::new());

    assert_eq!(probe.next_message().await.content(), "after garbage");
    handle.shutdown().await;
    assert_eq!(replica.offsets.load(GROUP, TOPIC, 0).await.unwrap(), Some(2));
}

#[tokio::test]
async fn test_each_replica_group_sees_every_event() {
    let shared_log = Arc::new(MemoryLog::new(TOPIC, 1));
    let replica_a = Replica {
        log: shared_log.clone(),
        ..Replica::new()
    };
    let replica_b = Replica {
        log: shared_log.clone(),
        ..Replica::new()
    };

    // Student on replica A, teacher on replica B
    let mut student = Probe::connect(&replica_a.registry, ROOM, STUDENT);
    let mut teacher = Probe::connect(&replica_b.registry, ROOM, TEACHER);

    let handle_a = replica_a
        .consumer("replica-a", StartPosition::Earliest)
        .spawn(CancellationToken::new());
    let handle_b = replica_b
        .consumer("replica-b", StartPosition::Earliest)
        .spawn(CancellationToken::new());

    publish_all(&replica_a.producer(), &["hello from A"]).await;

    assert_eq!(student.next_message().await.content(), "hello from A");
    assert_eq!(teacher.next_message().await.content(), "hello from A");

    handle_a.shutdown().await;
    handle_b.shutdown().await;
}

#[tokio::test]
async fn test_events_of_other_rooms_are_not_delivered() {
    let replica = Replica::new();
    let mut probe = Probe::connect(&replica.registry, ROOM, STUDENT);
    let handle = replica
        .consumer(GROUP, StartPosition::Earliest)
        .spawn(CancellationToken::new());

    let elsewhere = ChatMessage::from_participant(
        &sample_room(ROOM + 1),
        STUDENT,
        Role::Student,
        MessageBody::Text("wrong room".to_string()),
    );
    replica.producer().publish(&elsewhere).await.unwrap();
    publish_all(&replica.producer(), &["right room"]).await;

    assert_eq!(probe.next_message().await.content(), "right room");
    probe.assert_silent(Duration::from_millis(100)).await;
    handle.shutdown().await;
}
