//! Streaming exchange integration tests
//!
//! Exercises the controller end to end with a mock channel port and a
//! scripted model gateway.

use std::sync::atomic::Ordering;
use std::time::Duration;

use courier_gateway::Error;
use courier_gateway::chat::ControllerOptions;
use courier_gateway::db::{ConversationRepo, MessageRepo, MessageRole};

mod common;
use common::{MockModel, MockPort, make_controller, make_controller_with, ok_script, text_event};

#[tokio::test]
async fn test_exchange_streams_and_persists() {
    let db = common::setup_test_db();
    let port = MockPort::new();
    let model = MockModel::with_fragments(&["Hello", " there!"]);
    let controller = make_controller(port.clone(), model, db.clone());

    controller
        .handle_event(text_event(7, "hi"))
        .await
        .unwrap();

    // First fragment opens the message, completion lands the exact final edit
    let sent = port.sent_texts().await;
    assert_eq!(sent, vec!["Hello".to_string()]);
    let edits = port.edit_texts().await;
    assert_eq!(edits.last().unwrap(), "Hello there!");

    // Both halves of the exchange are stored, in order
    let conversations = ConversationRepo::new(db.clone());
    let messages = MessageRepo::new(db);
    let active = conversations.active(7).unwrap().expect("active pointer");
    let stored = messages.list(active, None).unwrap();
    assert_eq!(stored.len(), 2);
    assert_eq!(stored[0].role, MessageRole::User);
    assert_eq!(stored[0].content, "hi");
    assert_eq!(stored[1].role, MessageRole::Assistant);
    assert_eq!(stored[1].content, "Hello there!");
}

#[tokio::test]
async fn test_throttle_coalesces_streaming_edits() {
    let db = common::setup_test_db();
    let port = MockPort::new();
    let model = MockModel::with_fragments(&["a", "b", "c", "d", "e"]);
    let controller = make_controller_with(
        port.clone(),
        model,
        db,
        ControllerOptions {
            edit_throttle: Duration::from_secs(60),
            ..ControllerOptions::default()
        },
    );

    controller.handle_event(text_event(1, "go")).await.unwrap();

    // One mid-stream edit passes the throttle, then the final exact edit
    let edits = port.edit_texts().await;
    assert_eq!(edits.len(), 2);
    assert_eq!(edits.last().unwrap(), "abcde");
}

#[tokio::test]
async fn test_title_generated_once() {
    let db = common::setup_test_db();
    let port = MockPort::new();
    let model = MockModel::new(vec![ok_script(&["one"]), ok_script(&["two"])]);
    let controller = make_controller(port, model.clone(), db.clone());

    controller
        .handle_event(text_event(3, "first message"))
        .await
        .unwrap();
    controller
        .handle_event(text_event(3, "second message"))
        .await
        .unwrap();

    assert_eq!(model.generate_calls.load(Ordering::SeqCst), 1);

    let conversations = ConversationRepo::new(db);
    let active = conversations.active(3).unwrap().unwrap();
    let conversation = conversations.get(active, 3).unwrap().unwrap();
    assert_eq!(conversation.title.as_deref(), Some("Test title"));
}

#[tokio::test]
async fn test_failed_stream_persists_nothing() {
    let db = common::setup_test_db();
    let port = MockPort::new();
    let model = MockModel::new(vec![vec![Err(Error::Model("upstream down".to_string()))]]);
    let controller = make_controller(port.clone(), model, db.clone());

    let result = controller.handle_event(text_event(5, "hi")).await;
    assert!(result.is_err());

    // User sees a notice, nothing written to the conversation
    let sent = port.sent_texts().await;
    assert!(sent.iter().any(|t| t.contains("something went wrong")));

    let conversations = ConversationRepo::new(db.clone());
    let messages = MessageRepo::new(db);
    let active = conversations.active(5).unwrap().unwrap();
    assert_eq!(messages.count(active).unwrap(), 0);
}

#[tokio::test]
async fn test_interrupted_stream_keeps_partial_text_visible() {
    let db = common::setup_test_db();
    let port = MockPort::new();
    let model = MockModel::new(vec![vec![
        Ok("partial ".to_string()),
        Ok("reply".to_string()),
        Err(Error::Model("connection reset".to_string())),
    ]]);
    let controller = make_controller(port.clone(), model, db.clone());

    let result = controller.handle_event(text_event(9, "hi")).await;
    assert!(result.is_err());

    let edits = port.edit_texts().await;
    let last = edits.last().unwrap();
    assert!(last.starts_with("partial reply"));
    assert!(last.contains("interrupted"));

    let conversations = ConversationRepo::new(db.clone());
    let messages = MessageRepo::new(db);
    let active = conversations.active(9).unwrap().unwrap();
    assert_eq!(messages.count(active).unwrap(), 0);
}

#[tokio::test]
async fn test_idle_timeout_rolls_to_fresh_conversation() {
    let db = common::setup_test_db();
    let port = MockPort::new();
    let model = MockModel::new(vec![ok_script(&["one"]), ok_script(&["two"])]);
    let controller = make_controller_with(
        port,
        model,
        db.clone(),
        ControllerOptions {
            edit_throttle: Duration::ZERO,
            conversation_timeout: Some(Duration::from_millis(500)),
            ..ControllerOptions::default()
        },
    );

    controller.handle_event(text_event(4, "hi")).await.unwrap();
    let conversations = ConversationRepo::new(db);
    let first = conversations.active(4).unwrap().unwrap();

    // Wait past the idle timeout
    tokio::time::sleep(Duration::from_millis(1600)).await;

    controller
        .handle_event(text_event(4, "hi again"))
        .await
        .unwrap();
    let second = conversations.active(4).unwrap().unwrap();

    assert_ne!(first, second);
    assert_eq!(conversations.list_by_chat(4).unwrap().len(), 2);
}

#[tokio::test]
async fn test_long_reply_is_clipped_for_delivery_but_persisted_whole() {
    let db = common::setup_test_db();
    let port = MockPort::new();
    let long = "x".repeat(6000);
    let model = MockModel::with_fragments(&[long.as_str()]);
    let controller = make_controller(port.clone(), model, db.clone());

    controller
        .handle_event(text_event(6, "tell me everything"))
        .await
        .unwrap();

    // Outbound text never exceeds Telegram's message limit
    let sent = port.sent_texts().await;
    let edits = port.edit_texts().await;
    assert!(
        sent.iter()
            .chain(edits.iter())
            .all(|t| t.chars().count() <= 4096)
    );
    let last = edits.last().unwrap();
    assert_eq!(last.chars().count(), 4096);
    assert!(last.ends_with("(Reply clipped to fit the message limit.)"));

    // The stored reply keeps the full text
    let conversations = ConversationRepo::new(db.clone());
    let messages = MessageRepo::new(db);
    let active = conversations.active(6).unwrap().unwrap();
    let stored = messages.list(active, None).unwrap();
    assert_eq!(stored[1].content.chars().count(), 6000);
}

#[tokio::test]
async fn test_history_capped_for_model_prompt() {
    let db = common::setup_test_db();
    let port = MockPort::new();
    let scripts = (0..4).map(|i| vec![Ok(format!("r{i}"))]).collect();
    let model = MockModel::new(scripts);
    let controller = make_controller_with(
        port,
        model,
        db.clone(),
        ControllerOptions {
            edit_throttle: Duration::ZERO,
            max_history: Some(2),
            ..ControllerOptions::default()
        },
    );

    for i in 0..4 {
        controller
            .handle_event(text_event(2, &format!("m{i}")))
            .await
            .unwrap();
    }

    // Everything is still persisted; the cap only bounds the prompt
    let conversations = ConversationRepo::new(db.clone());
    let messages = MessageRepo::new(db);
    let active = conversations.active(2).unwrap().unwrap();
    assert_eq!(messages.count(active).unwrap(), 8);
}
