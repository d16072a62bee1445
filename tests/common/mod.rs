//! Shared test utilities and fixtures
//!
//! Scripted collaborators for driving `App` without a network, wiremock
//! helpers for the HTTP collaborators, and a settle loop.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use kiln_engine::{
    App, AppOptions, BoxFuture, Collaborators, ExecutionResult, Fragment, GenerationEvent,
    GenerationRequest, Generator, MemoryBackend, PersistenceAdapter, Sandbox, SandboxError,
    SandboxRequest, SecretString, Session,
};

pub fn session() -> Session {
    Session::new("user-123", Some(SecretString::new("e2b-test-key")))
}

pub fn fragment(commentary: &str, code: Option<&str>) -> Fragment {
    Fragment {
        commentary: Some(commentary.to_string()),
        code: code.map(str::to_string),
        ..Fragment::default()
    }
}

/// The three snapshots of the reference streaming run, then `Done`.
pub fn snake_game_events() -> Vec<GenerationEvent> {
    vec![
        GenerationEvent::Snapshot(fragment("Thinking", None)),
        GenerationEvent::Snapshot(fragment("Thinking", Some("print(1)"))),
        GenerationEvent::Snapshot(fragment("Done", Some("print(1)\nprint(2)"))),
        GenerationEvent::Done,
    ]
}

/// Generator that replays one queued script per run.
///
/// A script without a terminal event leaves the run open until it is stopped.
#[derive(Clone, Default)]
pub struct ScriptedGenerator {
    scripts: Arc<Mutex<VecDeque<Vec<GenerationEvent>>>>,
    requests: Arc<Mutex<Vec<GenerationRequest>>>,
}

impl ScriptedGenerator {
    pub fn push(&self, script: Vec<GenerationEvent>) {
        self.scripts.lock().unwrap().push_back(script);
    }

    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl Generator for ScriptedGenerator {
    fn generate(
        &self,
        request: GenerationRequest,
        tx: mpsc::Sender<GenerationEvent>,
    ) -> BoxFuture<()> {
        self.requests.lock().unwrap().push(request);
        let script = self.scripts.lock().unwrap().pop_front().unwrap_or_default();
        Box::pin(async move {
            let terminal = script
                .last()
                .is_some_and(|e| matches!(e, GenerationEvent::Done | GenerationEvent::Error(_)));
            for event in script {
                if tx.send(event).await.is_err() {
                    return;
                }
            }
            if !terminal {
                std::future::pending::<()>().await;
            }
        })
    }
}

#[derive(Clone)]
pub struct StubSandbox {
    outcome: Result<ExecutionResult, SandboxError>,
    requests: Arc<Mutex<Vec<SandboxRequest>>>,
}

impl StubSandbox {
    pub fn returning(outcome: Result<ExecutionResult, SandboxError>) -> Self {
        Self {
            outcome,
            requests: Arc::default(),
        }
    }

    pub fn requests(&self) -> Vec<SandboxRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl Sandbox for StubSandbox {
    fn execute(&self, request: SandboxRequest) -> BoxFuture<Result<ExecutionResult, SandboxError>> {
        self.requests.lock().unwrap().push(request);
        let outcome = self.outcome.clone();
        Box::pin(async move { outcome })
    }
}

pub struct Scripted {
    pub app: App,
    pub backend: MemoryBackend,
    pub generator: ScriptedGenerator,
    pub sandbox: StubSandbox,
}

pub fn scripted_app(sandbox: StubSandbox) -> Scripted {
    scripted_app_with(AppOptions::default().with_session(session()), sandbox, MemoryBackend::new())
}

pub fn scripted_app_with(
    options: AppOptions,
    sandbox: StubSandbox,
    backend: MemoryBackend,
) -> Scripted {
    let generator = ScriptedGenerator::default();
    let app = App::new(
        PersistenceAdapter::new(backend.clone()),
        options,
        Collaborators::new(generator.clone(), sandbox.clone()),
    );
    Scripted {
        app,
        backend,
        generator,
        sandbox,
    }
}

/// App wired to HTTP collaborators pointed at `server`.
pub fn http_app(server: &MockServer, adapter: PersistenceAdapter, options: AppOptions) -> App {
    App::new(adapter, options, Collaborators::http(&server.uri()))
}

/// Drive the app until `done` holds or two seconds have passed.
pub async fn pump_until(app: &mut App, done: impl Fn(&App) -> bool) {
    for _ in 0..400 {
        app.process_events();
        if done(app) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Drive the app until nothing is in flight.
pub async fn settle(app: &mut App) {
    pump_until(app, |app| !app.phase().is_busy()).await;
}

/// Serve `body` as the streamed fragment document on `route`.
pub async fn mount_fragment_stream(server: &MockServer, route: &str, body: &str) {
    Mock::given(method("POST"))
        .and(path(route))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(body)
                .insert_header("content-type", "text/plain; charset=utf-8"),
        )
        .mount(server)
        .await;
}

pub async fn mount_sandbox_result(server: &MockServer, result: serde_json::Value) {
    Mock::given(method("POST"))
        .and(path("/api/sandbox"))
        .respond_with(ResponseTemplate::new(200).set_body_json(result))
        .mount(server)
        .await;
}
