//! Log invariants that hold across runs.

use serde_json::json;

use kiln_engine::{ContentBlock, ExecutionResult, GenerationEvent, Message, Phase};
use kiln_store::MESSAGES_KEY;

use crate::common::{StubSandbox, fragment, pump_until, scripted_app, settle, snake_game_events};

fn sandbox_ok() -> StubSandbox {
    StubSandbox::returning(Ok(ExecutionResult::new(json!({ "ok": true }))))
}

#[tokio::test]
async fn each_submission_adds_exactly_one_user_message_first() {
    let mut s = scripted_app(sandbox_ok());
    for turn in 0..3 {
        let before = s.app.messages().len();
        s.generator.push(snake_game_events());

        s.app.submit(&format!("turn {turn}"), &[]).unwrap();

        assert_eq!(s.app.messages().len(), before + 1);
        assert!(matches!(s.app.messages().last(), Some(Message::User(_))));
        settle(&mut s.app).await;
        assert_eq!(s.app.messages().len(), before + 2);
    }
}

#[tokio::test]
async fn last_content_derives_only_from_final_snapshot() {
    let mut s = scripted_app(sandbox_ok());
    s.generator.push(vec![
        GenerationEvent::Snapshot(fragment("alpha", Some("a = 1"))),
        GenerationEvent::Snapshot(fragment("beta", None)),
        GenerationEvent::Done,
    ]);

    s.app.submit("go", &[]).unwrap();
    settle(&mut s.app).await;

    assert_eq!(
        s.app.messages()[1].content(),
        &[ContentBlock::text("beta"), ContentBlock::code("")]
    );
    assert_eq!(s.app.messages()[1].object(), Some(&fragment("beta", None)));
}

#[tokio::test]
async fn empty_snapshots_do_not_open_a_message() {
    let mut s = scripted_app(sandbox_ok());
    s.generator.push(vec![
        GenerationEvent::Snapshot(kiln_engine::Fragment::default()),
        GenerationEvent::Snapshot(fragment("real", None)),
        GenerationEvent::Done,
    ]);

    s.app.submit("go", &[]).unwrap();
    settle(&mut s.app).await;

    assert_eq!(s.app.messages().len(), 2);
    assert_eq!(
        s.app.messages()[1].content(),
        &[ContentBlock::text("real"), ContentBlock::code("")]
    );
}

#[tokio::test]
async fn undo_removes_two_or_nothing() {
    let mut s = scripted_app(sandbox_ok());
    assert_eq!(s.app.undo(), Ok(None));

    s.generator.push(vec![GenerationEvent::Done]);
    s.app.submit("lonely", &[]).unwrap();
    settle(&mut s.app).await;
    assert_eq!(s.app.messages().len(), 1);
    assert_eq!(s.app.undo(), Ok(None));
    assert_eq!(s.app.messages().len(), 1);

    s.generator.push(snake_game_events());
    s.app.submit("second", &[]).unwrap();
    settle(&mut s.app).await;
    assert_eq!(s.app.messages().len(), 3);

    assert!(s.app.undo().unwrap().is_some());
    assert_eq!(s.app.messages().len(), 1);
    assert!(s.app.preview().is_empty());
}

#[tokio::test]
async fn clear_leaves_nothing_behind() {
    let mut s = scripted_app(sandbox_ok());
    s.generator.push(snake_game_events());
    s.app.submit("go", &[]).unwrap();
    settle(&mut s.app).await;

    s.app.clear();

    assert!(s.app.messages().is_empty());
    assert!(s.app.preview().is_empty());
    assert_eq!(s.backend.raw(MESSAGES_KEY), Some(b"[]".to_vec()));
}

#[tokio::test]
async fn stopped_run_keeps_partial_message_and_accepts_new_input() {
    let mut s = scripted_app(sandbox_ok());
    s.generator
        .push(vec![GenerationEvent::Snapshot(fragment("half", Some("x =")))]);
    s.app.submit("first", &[]).unwrap();
    pump_until(&mut s.app, |app| app.messages().len() == 2).await;

    assert!(s.app.stop());
    assert_eq!(s.app.phase(), Phase::Idle);
    assert_eq!(
        s.app.messages()[1].content(),
        &[ContentBlock::text("half"), ContentBlock::code("x =")]
    );

    s.generator.push(snake_game_events());
    s.app.submit("second", &[]).unwrap();
    settle(&mut s.app).await;
    assert_eq!(s.app.messages().len(), 4);
}
