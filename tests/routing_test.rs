//! Help-mode routing through the full pipeline
//!
//! Messages go through `ChatService`, the memory store, the memory log and
//! the fan-out consumer before reaching the probes.

mod common;

use std::time::Duration;

use assert_matches::assert_matches;
use pretty_assertions::assert_eq;

use common::{Script, TestApp, OUTSIDER, STUDENT, TEACHER};
use tutorchat::backend::chat::ai_bridge::{Speaker, AI_APOLOGY};
use tutorchat::backend::error::BackendError;
use tutorchat::backend::store::{MessageLog, RoomStore};
use tutorchat::backend::Admission;
use tutorchat::shared::chat::{
    MessageBody, Role, SystemBanner, UserType, AI_SENDER_ID, SYSTEM_SENDER_ID,
};

fn text(content: &str) -> MessageBody {
    MessageBody::Text(content.to_string())
}

#[tokio::test]
async fn test_student_in_fresh_room_gets_broadcast_and_ai_stream() {
    let app = TestApp::start();
    let room = app.room().await;
    let mut student = app.probe(room.id, STUDENT);
    let mut teacher = app.probe(room.id, TEACHER);
    app.generator.push(Script::chunks(&["Hi", " there.", " How can", " I help?"]));

    let chat = &app.runtime.state().chat;
    let admission = chat
        .handle_incoming(room.id, STUDENT, Role::Student, text("What is 2+2?"))
        .await
        .unwrap();
    assert_matches!(admission, Admission::Published { ai_triggered: true, .. });

    for probe in [&mut student, &mut teacher] {
        let first = probe.next_message().await;
        assert_eq!(first.content(), "What is 2+2?");
        assert_eq!(first.user_type, UserType::Student);
        assert_eq!(first.sender_id, STUDENT);
        assert_eq!(first.title, "Algebra");

        let fragments = probe.next_messages(2).await;
        assert_contents!(fragments, ["Hi there.", " How can I help?"]);
        assert!(fragments
            .iter()
            .all(|m| m.user_type == UserType::Ai && m.sender_id == AI_SENDER_ID));
    }

    let prompts = app.generator.prompts();
    assert_eq!(prompts.len(), 1);
    let last_turn = prompts[0].turns.last().unwrap();
    assert_eq!(last_turn.speaker, Speaker::Student);
    assert_eq!(last_turn.content, "What is 2+2?");

    assert_eq!(app.store.count_messages(room.id).await.unwrap(), 3);
    app.shutdown().await;
}

#[tokio::test]
async fn test_teacher_is_dropped_in_ai_mode() {
    let app = TestApp::start();
    let room = app.room().await;
    let mut student = app.probe(room.id, STUDENT);

    let chat = &app.runtime.state().chat;
    let admission = chat
        .handle_incoming(room.id, TEACHER, Role::Teacher, text("Let me answer"))
        .await
        .unwrap();

    assert_eq!(admission, Admission::Dropped);
    student.assert_silent(Duration::from_millis(200)).await;
    assert_eq!(app.store.count_messages(room.id).await.unwrap(), 0);
    assert!(app.generator.prompts().is_empty());
    app.shutdown().await;
}

#[tokio::test]
async fn test_toggle_emits_banners_and_admits_teacher() {
    let app = TestApp::start();
    let room = app.room().await;
    let mut student = app.probe(room.id, STUDENT);
    let chat = &app.runtime.state().chat;

    let toggled = chat.toggle_help(room.id, STUDENT).await.unwrap();
    assert!(toggled.help_checked);

    let banners = student.next_messages(2).await;
    assert_contents!(
        banners,
        [SystemBanner::AiGoodbye.text(), SystemBanner::TeacherWelcome.text()]
    );
    assert!(banners
        .iter()
        .all(|m| m.user_type == UserType::System && m.sender_id == SYSTEM_SENDER_ID));

    let admission = chat
        .handle_incoming(room.id, TEACHER, Role::Teacher, text("I'm here"))
        .await
        .unwrap();
    assert_matches!(admission, Admission::Published { ai_triggered: false, .. });
    assert_eq!(student.next_message().await.content(), "I'm here");

    // Human mode: the student's message does not reach the AI
    let admission = chat
        .handle_incoming(room.id, STUDENT, Role::Student, text("Thanks"))
        .await
        .unwrap();
    assert_matches!(admission, Admission::Published { ai_triggered: false, .. });
    assert_eq!(student.next_message().await.content(), "Thanks");
    student.assert_silent(Duration::from_millis(200)).await;
    assert!(app.generator.prompts().is_empty());

    app.shutdown().await;
}

#[tokio::test]
async fn test_double_toggle_restores_mode_with_four_banners() {
    let app = TestApp::start();
    let room = app.room().await;
    let mut teacher = app.probe(room.id, TEACHER);
    let chat = &app.runtime.state().chat;

    chat.toggle_help(room.id, STUDENT).await.unwrap();
    let back = chat.toggle_help(room.id, TEACHER).await.unwrap();
    assert!(!back.help_checked);
    assert!(!app.store.get_room(room.id).await.unwrap().help_checked);

    let banners = teacher.next_messages(4).await;
    assert_contents!(
        banners,
        [
            SystemBanner::AiGoodbye.text(),
            SystemBanner::TeacherWelcome.text(),
            SystemBanner::TeacherGoodbye.text(),
            SystemBanner::AiWelcome.text(),
        ]
    );

    // Back in AI mode the teacher is dropped again
    let admission = chat
        .handle_incoming(room.id, TEACHER, Role::Teacher, text("still here?"))
        .await
        .unwrap();
    assert_eq!(admission, Admission::Dropped);
    app.shutdown().await;
}

#[tokio::test]
async fn test_human_mode_preserves_send_order() {
    let app = TestApp::start();
    let room = app.room().await;
    let mut student = app.listen(room.id, STUDENT);
    let mut teacher = app.listen(room.id, TEACHER);
    let chat = &app.runtime.state().chat;
    chat.toggle_help(room.id, STUDENT).await.unwrap();
    student.next_messages(2).await;
    teacher.next_messages(2).await;

    let script = [
        (STUDENT, Role::Student, "1"),
        (TEACHER, Role::Teacher, "2"),
        (STUDENT, Role::Student, "3"),
        (STUDENT, Role::Student, "4"),
        (TEACHER, Role::Teacher, "5"),
    ];
    for (sender, role, content) in script {
        chat.handle_incoming(room.id, sender, role, text(content)).await.unwrap();
    }

    for client in [&mut student, &mut teacher] {
        let received = client.next_messages(5).await;
        assert_contents!(received, ["1", "2", "3", "4", "5"]);
    }
    app.shutdown().await;
}

#[tokio::test]
async fn test_toggle_by_non_member_is_forbidden() {
    let app = TestApp::start();
    let room = app.room().await;

    let result = app.runtime.state().chat.toggle_help(room.id, OUTSIDER).await;

    assert_matches!(result, Err(BackendError::PermissionDenied { .. }));
    assert!(!app.store.get_room(room.id).await.unwrap().help_checked);
    app.shutdown().await;
}

#[tokio::test]
async fn test_unknown_room_is_rejected_with_4004() {
    let app = TestApp::start();
    let state = app.runtime.state();

    let err = state.chat.admit_connection(9_999, STUDENT).await.unwrap_err();
    assert_matches!(err, BackendError::RoomNotFound { room_id: 9_999 });
    assert_eq!(err.close_code(), Some(4004));
    assert_eq!(state.registry.connection_count(), 0);
    app.shutdown().await;
}

#[tokio::test]
async fn test_unknown_user_is_rejected_with_4004() {
    let app = TestApp::start();
    let room = app.room().await;

    let err = app
        .runtime
        .state()
        .chat
        .admit_connection(room.id, 12_345)
        .await
        .unwrap_err();
    assert_matches!(err, BackendError::UserRoleNotFound { user_id: 12_345 });
    assert_eq!(err.close_code(), Some(4004));

    let role = app.runtime.state().chat.admit_connection(room.id, TEACHER).await.unwrap();
    assert_eq!(role, Role::Teacher);
    app.shutdown().await;
}

#[tokio::test]
async fn test_registered_user_outside_the_room_is_rejected_with_4004() {
    let app = TestApp::start();
    let room = app.room().await;

    let err = app
        .runtime
        .state()
        .chat
        .admit_connection(room.id, OUTSIDER)
        .await
        .unwrap_err();

    assert_matches!(err, BackendError::NotRoomMember { user_id: OUTSIDER, .. });
    assert_eq!(err.close_code(), Some(4004));
    assert_eq!(app.runtime.state().registry.connection_count(), 0);
    app.shutdown().await;
}

#[tokio::test]
async fn test_toggle_with_log_down_still_records_flip_and_both_banners() {
    let app = TestApp::start();
    let room = app.room().await;
    app.log.set_unavailable(true);

    let result = app.runtime.state().chat.toggle_help(room.id, STUDENT).await;

    assert_matches!(result, Err(BackendError::DeliveryUnavailable(_)));
    assert!(app.store.get_room(room.id).await.unwrap().help_checked);
    let history = app.store.find_messages(room.id, 1, 10).await.unwrap();
    // Newest first
    assert_contents!(
        history,
        [SystemBanner::TeacherWelcome.text(), SystemBanner::AiGoodbye.text()]
    );

    // Once the log is back, the next toggle is paired with its banners again
    app.log.set_unavailable(false);
    let mut student = app.listen(room.id, STUDENT);
    let back = app.runtime.state().chat.toggle_help(room.id, STUDENT).await.unwrap();
    assert!(!back.help_checked);
    let banners = student.next_messages(2).await;
    assert_contents!(
        banners,
        [SystemBanner::TeacherGoodbye.text(), SystemBanner::AiWelcome.text()]
    );
    assert_eq!(app.store.count_messages(room.id).await.unwrap(), 4);
    app.shutdown().await;
}

#[tokio::test]
async fn test_ai_failure_publishes_apology() {
    let app = TestApp::start();
    let room = app.room().await;
    let mut student = app.probe(room.id, STUDENT);
    app.generator.push(Script::FailBeforeStream);

    app.runtime
        .state()
        .chat
        .handle_incoming(room.id, STUDENT, Role::Student, text("help"))
        .await
        .unwrap();

    let messages = student.next_messages(2).await;
    assert_contents!(messages, ["help", AI_APOLOGY]);
    assert_eq!(messages[1].user_type, UserType::Ai);
    app.shutdown().await;
}

#[tokio::test]
async fn test_ai_failure_mid_stream_keeps_flushed_fragments() {
    let app = TestApp::start();
    let room = app.room().await;
    let mut student = app.probe(room.id, STUDENT);
    app.generator.push(Script::FailAfter(vec![
        "First sentence.".to_string(),
        " partial".to_string(),
    ]));

    app.runtime
        .state()
        .chat
        .handle_incoming(room.id, STUDENT, Role::Student, text("explain"))
        .await
        .unwrap();

    let messages = student.next_messages(3).await;
    assert_contents!(messages, ["explain", "First sentence.", AI_APOLOGY]);
    student.assert_silent(Duration::from_millis(200)).await;
    app.shutdown().await;
}

#[tokio::test]
async fn test_append_failure_surfaces_delivery_unavailable() {
    let app = TestApp::start();
    let room = app.room().await;
    app.log.set_unavailable(true);

    let result = app
        .runtime
        .state()
        .chat
        .handle_incoming(room.id, STUDENT, Role::Student, text("lost?"))
        .await;

    assert_matches!(result, Err(BackendError::DeliveryUnavailable(_)));
    // Persisted even though fan-out failed
    assert_eq!(app.store.count_messages(room.id).await.unwrap(), 1);
    assert!(app.generator.prompts().is_empty());
    app.shutdown().await;
}

#[tokio::test]
async fn test_invalid_frames_are_rejected_before_publishing() {
    let app = TestApp::start();
    let room = app.room().await;
    let chat = &app.runtime.state().chat;

    let empty = chat.handle_frame(room.id, STUDENT, Role::Student, "   ").await;
    assert_matches!(empty, Err(BackendError::SharedError(_)));

    let image = chat
        .handle_frame(
            room.id,
            STUDENT,
            Role::Student,
            r#"{"message_type":"image","content":"https://cdn/x.png"}"#,
        )
        .await;
    assert_matches!(image, Err(BackendError::SharedError(_)));

    assert_eq!(app.store.count_messages(room.id).await.unwrap(), 0);
    app.shutdown().await;
}
