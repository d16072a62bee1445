//! End-to-end runs of the reference conversation: submit, stream, execute,
//! undo and a failed stream.

use serde_json::json;

use kiln_engine::{
    ContentBlock, ExecutionResult, GenerationEvent, Message, Phase, PreviewTab, SecretString,
};

use crate::common::{StubSandbox, fragment, scripted_app, settle, snake_game_events};

fn sandbox_ok() -> StubSandbox {
    StubSandbox::returning(Ok(ExecutionResult::new(
        json!({ "url": "https://x", "ok": true }),
    )))
}

#[tokio::test]
async fn submit_on_empty_log_appends_user_text_and_generates() {
    let mut s = scripted_app(sandbox_ok());
    s.generator.push(vec![]);

    s.app.submit("Build a snake game", &[]).unwrap();

    assert_eq!(
        s.app.messages(),
        &[Message::user(vec![ContentBlock::text("Build a snake game")])]
    );
    assert_eq!(s.app.phase(), Phase::Generating);
}

#[tokio::test]
async fn three_snapshots_fold_into_one_assistant_message() {
    let mut s = scripted_app(sandbox_ok());
    s.generator.push(snake_game_events());

    s.app.submit("Build a snake game", &[]).unwrap();
    settle(&mut s.app).await;

    let assistants: Vec<_> = s
        .app
        .messages()
        .iter()
        .filter(|m| m.is_assistant())
        .collect();
    assert_eq!(assistants.len(), 1);
    assert_eq!(
        assistants[0].content(),
        &[
            ContentBlock::text("Done"),
            ContentBlock::code("print(1)\nprint(2)")
        ]
    );
}

#[tokio::test]
async fn sandbox_result_reaches_preview_and_message() {
    let mut s = scripted_app(sandbox_ok());
    s.generator.push(snake_game_events());

    s.app.submit("Build a snake game", &[]).unwrap();
    settle(&mut s.app).await;

    let expected = ExecutionResult::new(json!({ "url": "https://x", "ok": true }));
    assert_eq!(s.app.preview().result.as_ref(), Some(&expected));
    assert_eq!(s.app.messages()[1].result(), Some(&expected));
    assert_eq!(s.app.current_tab(), PreviewTab::Fragment);
    assert!(!s.app.is_preview_loading());

    let requests = s.sandbox.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].user_id, "user-123");
    assert_eq!(
        requests[0].api_key.as_ref().map(SecretString::expose),
        Some("e2b-test-key")
    );
}

#[tokio::test]
async fn undo_after_full_run_empties_log_and_preview() {
    let mut s = scripted_app(sandbox_ok());
    s.generator.push(snake_game_events());
    s.app.submit("Build a snake game", &[]).unwrap();
    settle(&mut s.app).await;

    s.app.undo().unwrap();

    assert!(s.app.messages().is_empty());
    assert!(s.app.preview().is_empty());
}

#[tokio::test]
async fn stream_error_after_first_snapshot_keeps_partial_message() {
    let mut s = scripted_app(sandbox_ok());
    s.generator.push(vec![
        GenerationEvent::Snapshot(fragment("Thinking", None)),
        GenerationEvent::Error("connection reset".to_string()),
    ]);

    s.app.submit("Build a snake game", &[]).unwrap();
    settle(&mut s.app).await;

    assert_eq!(s.app.phase(), Phase::Error);
    assert_eq!(s.app.messages().len(), 2);
    assert_eq!(
        s.app.messages()[1].content(),
        &[ContentBlock::text("Thinking"), ContentBlock::code("")]
    );
    assert!(s.sandbox.requests().is_empty());
    assert!(
        s.app
            .last_error()
            .is_some_and(|e| e.contains("connection reset"))
    );
}

#[tokio::test]
async fn retry_reissues_the_unmodified_log() {
    let mut s = scripted_app(sandbox_ok());
    s.generator.push(vec![GenerationEvent::Error("boom".to_string())]);
    s.app.submit("Build a snake game", &[]).unwrap();
    settle(&mut s.app).await;
    assert_eq!(s.app.phase(), Phase::Error);

    s.generator.push(snake_game_events());
    s.app.retry().unwrap();
    settle(&mut s.app).await;

    let requests = s.generator.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].messages, requests[1].messages);
    assert_eq!(s.app.phase(), Phase::Idle);
    assert_eq!(s.app.messages().len(), 2);
}
