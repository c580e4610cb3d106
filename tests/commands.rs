//! Command handling integration tests

use courier_gateway::chat::{ChatEvent, EventPayload, ReplyRef};
use courier_gateway::db::{ConversationRepo, MessageRepo, MessageRole};

mod common;
use common::{MockModel, MockPort, make_controller, ok_script, text_event};

#[tokio::test]
async fn test_new_starts_a_distinct_conversation() {
    let db = common::setup_test_db();
    let port = MockPort::new();
    let model = MockModel::new(vec![ok_script(&["one"]), ok_script(&["two"])]);
    let controller = make_controller(port.clone(), model, db.clone());

    controller.handle_event(text_event(1, "hi")).await.unwrap();
    let conversations = ConversationRepo::new(db);
    let first = conversations.active(1).unwrap().unwrap();

    controller.handle_event(text_event(1, "/new")).await.unwrap();
    assert!(conversations.active(1).unwrap().is_none());

    controller.handle_event(text_event(1, "hi again")).await.unwrap();
    let second = conversations.active(1).unwrap().unwrap();

    assert_ne!(first, second);
    let sent = port.sent_texts().await;
    assert!(sent.iter().any(|t| t == "Started a new conversation."));
}

#[tokio::test]
async fn test_resume_switches_the_active_conversation() {
    let db = common::setup_test_db();
    let port = MockPort::new();
    let model = MockModel::new(vec![ok_script(&["one"]), ok_script(&["two"])]);
    let controller = make_controller(port.clone(), model, db.clone());

    controller.handle_event(text_event(1, "hi")).await.unwrap();
    let conversations = ConversationRepo::new(db);
    let first = conversations.active(1).unwrap().unwrap();

    controller.handle_event(text_event(1, "/new")).await.unwrap();
    controller.handle_event(text_event(1, "other topic")).await.unwrap();
    assert_ne!(conversations.active(1).unwrap().unwrap(), first);

    controller
        .handle_event(text_event(1, &format!("/resume_{first}")))
        .await
        .unwrap();
    assert_eq!(conversations.active(1).unwrap().unwrap(), first);

    let sent = port.sent_texts().await;
    assert!(sent.iter().any(|t| t.starts_with("Resumed conversation")));
}

#[tokio::test]
async fn test_resume_rejects_another_chats_conversation() {
    let db = common::setup_test_db();
    let port = MockPort::new();
    let model = MockModel::with_fragments(&["one"]);
    let controller = make_controller(port.clone(), model, db.clone());

    controller.handle_event(text_event(1, "hi")).await.unwrap();
    let conversations = ConversationRepo::new(db);
    let owned_by_one = conversations.active(1).unwrap().unwrap();

    controller
        .handle_event(text_event(2, &format!("/resume_{owned_by_one}")))
        .await
        .unwrap();

    // Chat 2 gets a not-found message and no active pointer
    let sent = port.sent_texts().await;
    assert!(sent.iter().any(|t| t.contains("was not found")));
    assert!(conversations.active(2).unwrap().is_none());
}

#[tokio::test]
async fn test_retry_without_active_conversation() {
    let db = common::setup_test_db();
    let port = MockPort::new();
    let model = MockModel::new(vec![]);
    let controller = make_controller(port.clone(), model, db);

    controller.handle_event(text_event(1, "/retry")).await.unwrap();

    let sent = port.sent_texts().await;
    assert!(
        sent.iter()
            .any(|t| t == "There is no active conversation to retry.")
    );
}

#[tokio::test]
async fn test_retry_replaces_the_last_reply() {
    let db = common::setup_test_db();
    let port = MockPort::new();
    let model = MockModel::new(vec![ok_script(&["first reply"]), ok_script(&["second reply"])]);
    let controller = make_controller(port, model, db.clone());

    controller.handle_event(text_event(1, "hi")).await.unwrap();
    controller.handle_event(text_event(1, "/retry")).await.unwrap();

    let conversations = ConversationRepo::new(db.clone());
    let messages = MessageRepo::new(db);
    let active = conversations.active(1).unwrap().unwrap();
    let stored = messages.list(active, None).unwrap();

    // Still one user message and one reply; the reply is the regenerated one
    assert_eq!(stored.len(), 2);
    assert_eq!(stored[0].role, MessageRole::User);
    assert_eq!(stored[1].role, MessageRole::Assistant);
    assert_eq!(stored[1].content, "second reply");
}

#[tokio::test]
async fn test_history_lists_conversations_with_resume_commands() {
    let db = common::setup_test_db();
    let port = MockPort::new();
    let model = MockModel::new(vec![ok_script(&["one"]), ok_script(&["two"])]);
    let controller = make_controller(port.clone(), model, db);

    controller.handle_event(text_event(1, "hi")).await.unwrap();
    controller.handle_event(text_event(1, "/new")).await.unwrap();
    controller.handle_event(text_event(1, "hello")).await.unwrap();

    controller.handle_event(text_event(1, "/history")).await.unwrap();

    let sent = port.sent_texts().await;
    let listing = sent.last().unwrap();
    assert_eq!(listing.lines().count(), 2);
    assert!(listing.lines().all(|l| l.starts_with("/resume_")));
}

#[tokio::test]
async fn test_history_empty() {
    let db = common::setup_test_db();
    let port = MockPort::new();
    let model = MockModel::new(vec![]);
    let controller = make_controller(port.clone(), model, db);

    controller.handle_event(text_event(1, "/history")).await.unwrap();

    let sent = port.sent_texts().await;
    assert_eq!(sent.last().unwrap(), "No conversations yet.");
}

#[tokio::test]
async fn test_say_requires_voice_pipeline() {
    let db = common::setup_test_db();
    let port = MockPort::new();
    let model = MockModel::new(vec![]);
    let controller = make_controller(port.clone(), model, db);

    let event = ChatEvent {
        chat_id: 1,
        message_id: 10,
        payload: EventPayload::Text("/say".to_string()),
        reply_to: Some(ReplyRef {
            message_id: 9,
            from_bot: true,
            text: Some("speak this".to_string()),
        }),
    };
    controller.handle_event(event).await.unwrap();

    let sent = port.sent_texts().await;
    assert_eq!(sent.last().unwrap(), "Voice is not enabled.");
}

#[tokio::test]
async fn test_voice_message_requires_voice_pipeline() {
    let db = common::setup_test_db();
    let port = MockPort::new();
    let model = MockModel::new(vec![]);
    let controller = make_controller(port.clone(), model, db);

    let event = ChatEvent {
        chat_id: 1,
        message_id: 10,
        payload: EventPayload::Voice {
            file_id: "abc".to_string(),
        },
        reply_to: None,
    };
    controller.handle_event(event).await.unwrap();

    let sent = port.sent_texts().await;
    assert_eq!(sent.last().unwrap(), "Voice messages are not enabled.");
}
