//! File-backed persistence across app restarts.

use serde_json::json;

use kiln_engine::{
    App, AppOptions, Collaborators, ContentBlock, ConversationStore, ExecutionResult, FileBackend,
    ImageRef, Message, MessagePosition, PersistenceAdapter, Phase,
};
use kiln_store::{DRAFT_KEY, MESSAGES_KEY, MODEL_CONFIG_KEY};

use crate::common::{ScriptedGenerator, StubSandbox, fragment, session, settle, snake_game_events};

fn file_adapter(dir: &tempfile::TempDir) -> PersistenceAdapter {
    PersistenceAdapter::new(FileBackend::new(dir.path()))
}

fn reopen(dir: &tempfile::TempDir) -> ConversationStore {
    ConversationStore::load(file_adapter(dir), MESSAGES_KEY)
}

#[test]
fn empty_log_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    let store = ConversationStore::new(file_adapter(&dir), MESSAGES_KEY);
    assert!(store.persist());

    assert!(dir.path().join("messages.json").exists());
    assert!(reopen(&dir).is_empty());
}

#[test]
fn full_turn_with_image_and_result_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = ConversationStore::new(file_adapter(&dir), MESSAGES_KEY);
    store.append(Message::user(vec![
        ContentBlock::text("Make this"),
        ContentBlock::image(ImageRef::new("data:image/png;base64,iVBORw0KGgo=")),
    ]));
    store.append(Message::assistant(
        vec![ContentBlock::text("Done"), ContentBlock::code("print(1)")],
        Some(fragment("Done", Some("print(1)"))),
    ));
    store
        .update_at(
            MessagePosition::Last,
            kiln_types::MessagePatch::result(ExecutionResult::new(json!({ "url": "https://x" }))),
        )
        .unwrap();

    let restored = reopen(&dir);

    assert_eq!(restored.messages(), store.messages());
    assert_eq!(
        restored.messages()[1].result().and_then(ExecutionResult::url),
        Some("https://x")
    );
}

#[test]
fn malformed_log_loads_empty() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("messages.json"), b"{ not json").unwrap();

    assert!(reopen(&dir).is_empty());
}

#[test]
fn log_with_one_bad_entry_loads_empty() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("messages.json"),
        br#"[{"role":"user","content":[{"type":"text","text":"ok"}]},{"role":"robot"}]"#,
    )
    .unwrap();

    assert!(reopen(&dir).is_empty());
}

#[tokio::test]
async fn app_restores_log_draft_and_model_after_restart() {
    let dir = tempfile::tempdir().unwrap();
    let generator = ScriptedGenerator::default();
    generator.push(snake_game_events());
    let sandbox = StubSandbox::returning(Ok(ExecutionResult::new(json!({ "ok": true }))));

    {
        let mut app = App::new(
            file_adapter(&dir),
            AppOptions::default().with_session(session()),
            Collaborators::new(generator.clone(), sandbox.clone()),
        );
        assert!(app.set_model("gpt-4o"));
        app.submit("Build a snake game", &[]).unwrap();
        settle(&mut app).await;
        assert_eq!(app.phase(), Phase::Idle);
        app.set_draft("half-typed".to_string());
    }

    assert!(dir.path().join(format!("{DRAFT_KEY}.json")).exists());
    assert!(dir.path().join(format!("{MODEL_CONFIG_KEY}.json")).exists());

    let app = App::new(
        file_adapter(&dir),
        AppOptions::default().with_session(session()),
        Collaborators::new(generator, sandbox),
    );

    assert_eq!(app.messages().len(), 2);
    assert_eq!(
        app.messages()[1].content(),
        &[
            ContentBlock::text("Done"),
            ContentBlock::code("print(1)\nprint(2)")
        ]
    );
    assert!(app.messages()[1].result().is_some());
    assert_eq!(app.draft(), "half-typed");
    assert_eq!(app.model_config().model.as_deref(), Some("gpt-4o"));
    assert_eq!(app.phase(), Phase::Idle);
}
