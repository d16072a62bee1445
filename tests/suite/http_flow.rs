//! The app driven through the HTTP collaborators against a mock service.

use std::collections::BTreeMap;

use serde_json::{Value, json};
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use kiln_engine::{
    AppOptions, ContentBlock, ExecutionResult, PersistenceAdapter, Phase, SandboxError,
    TemplateSelection, TemplateSet,
};

use crate::common::{http_app, mount_fragment_stream, mount_sandbox_result, session, settle};

const FRAGMENT_BODY: &str = r#"{"commentary":"Here is a snake game","template":"code-interpreter-v1","title":"Snake","code":"print(1)\nprint(2)"}"#;

fn options() -> AppOptions {
    AppOptions::default().with_session(session())
}

async fn request_body(server: &MockServer, route: &str) -> Value {
    let requests = server.received_requests().await.unwrap_or_default();
    let request = requests
        .iter()
        .find(|r| r.url.path() == route)
        .expect("request was sent");
    serde_json::from_slice(&request.body).unwrap()
}

#[tokio::test]
async fn generation_then_execution_over_http() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .and(body_partial_json(json!({
            "userID": "user-123",
            "messages": [
                { "role": "user", "content": [{ "type": "text", "text": "Build a snake game" }] }
            ],
            "model": { "id": "claude-3-5-sonnet-20240620" },
            "config": { "model": "claude-3-5-sonnet-20240620" }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_string(FRAGMENT_BODY))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/sandbox"))
        .and(body_partial_json(json!({
            "userID": "user-123",
            "apiKey": "e2b-test-key",
            "fragment": { "title": "Snake" }
        })))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "url": "https://x", "ok": true })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let mut app = http_app(&server, PersistenceAdapter::in_memory(), options());
    app.submit("Build a snake game", &[]).unwrap();
    settle(&mut app).await;

    assert_eq!(app.phase(), Phase::Idle);
    assert_eq!(app.messages().len(), 2);
    assert_eq!(
        app.messages()[1].content(),
        &[
            ContentBlock::text("Here is a snake game"),
            ContentBlock::code("print(1)\nprint(2)")
        ]
    );
    let expected = ExecutionResult::new(json!({ "url": "https://x", "ok": true }));
    assert_eq!(app.messages()[1].result(), Some(&expected));
    assert_eq!(app.preview().result.as_ref(), Some(&expected));
}

#[tokio::test]
async fn o1_models_use_the_alternate_endpoint() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat-o1"))
        .respond_with(ResponseTemplate::new(200).set_body_string(FRAGMENT_BODY))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;
    mount_sandbox_result(&server, json!({ "ok": true })).await;

    let mut app = http_app(&server, PersistenceAdapter::in_memory(), options());
    assert!(app.set_model("o1-mini"));
    app.submit("hi", &[]).unwrap();
    settle(&mut app).await;

    assert_eq!(app.phase(), Phase::Idle);
    assert_eq!(app.messages().len(), 2);
}

#[tokio::test]
async fn http_error_enters_error_state_with_message() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(
            ResponseTemplate::new(503)
                .set_body_json(json!({ "error": { "message": "model overloaded" } })),
        )
        .mount(&server)
        .await;

    let mut app = http_app(&server, PersistenceAdapter::in_memory(), options());
    app.submit("hi", &[]).unwrap();
    settle(&mut app).await;

    assert_eq!(app.phase(), Phase::Error);
    let message = app.last_error().unwrap();
    assert!(message.starts_with("[Generation error]"));
    assert!(message.contains("503"));
    assert!(message.contains("model overloaded"));
    assert_eq!(app.messages().len(), 1);
}

#[tokio::test]
async fn truncated_document_is_an_error_but_keeps_partial_content() {
    let server = MockServer::start().await;
    mount_fragment_stream(&server, "/api/chat", r#"{"commentary":"Thinking","code":"pri"#).await;

    let mut app = http_app(&server, PersistenceAdapter::in_memory(), options());
    app.submit("hi", &[]).unwrap();
    settle(&mut app).await;

    assert_eq!(app.phase(), Phase::Error);
    assert_eq!(app.messages().len(), 2);
    assert_eq!(
        app.messages()[1].content(),
        &[ContentBlock::text("Thinking"), ContentBlock::code("pri")]
    );
}

#[tokio::test]
async fn sandbox_error_payload_is_a_failed_preview() {
    let server = MockServer::start().await;
    mount_fragment_stream(&server, "/api/chat", FRAGMENT_BODY).await;
    mount_sandbox_result(&server, json!({ "error": "template not found" })).await;

    let mut app = http_app(&server, PersistenceAdapter::in_memory(), options());
    app.submit("hi", &[]).unwrap();
    settle(&mut app).await;

    assert_eq!(app.phase(), Phase::Idle);
    assert_eq!(
        app.last_sandbox_error(),
        Some(&SandboxError::Reported("template not found".to_string()))
    );
    assert!(app.preview().fragment.is_some());
    assert!(app.preview().result.is_none());
    assert!(app.messages()[1].result().is_none());
}

#[tokio::test]
async fn selected_template_is_the_only_one_sent() {
    let server = MockServer::start().await;
    mount_fragment_stream(&server, "/api/chat", FRAGMENT_BODY).await;
    mount_sandbox_result(&server, json!({ "ok": true })).await;

    let mut templates = BTreeMap::new();
    templates.insert("nextjs-developer".to_string(), json!({ "name": "Next.js" }));
    templates.insert("code-interpreter-v1".to_string(), json!({ "name": "Python" }));
    let options = AppOptions {
        templates: TemplateSet::new(templates),
        template: TemplateSelection::Template("nextjs-developer".to_string()),
        ..options()
    };

    let mut app = http_app(&server, PersistenceAdapter::in_memory(), options);
    app.submit("hi", &[]).unwrap();
    settle(&mut app).await;

    let body = request_body(&server, "/api/chat").await;
    assert_eq!(
        body["template"],
        json!({ "nextjs-developer": { "name": "Next.js" } })
    );

    app.set_template(TemplateSelection::Auto);
    app.submit("again", &[]).unwrap();
    settle(&mut app).await;

    let requests = server.received_requests().await.unwrap_or_default();
    let last_chat = requests
        .iter()
        .rev()
        .find(|r| r.url.path() == "/api/chat")
        .unwrap();
    let body: Value = serde_json::from_slice(&last_chat.body).unwrap();
    assert_eq!(body["template"].as_object().map(serde_json::Map::len), Some(2));
}
