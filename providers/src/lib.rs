//! HTTP collaborators for the Kiln core.
//!
//! - [`generation`] - streams a fragment document from `/api/chat` (or the
//!   model-specific alternate endpoint) and emits [`GenerationEvent`]s
//! - [`sandbox`] - single request/response execution of a finished fragment
//! - [`partial_json`] - repair of incomplete JSON prefixes
//!
//! # Error Handling
//!
//! Generation failures are delivered as `GenerationEvent::Error` rather than
//! `Result::Err`, so snapshots received before the failure stay usable. A run
//! always ends with exactly one `Done` or `Error`, unless the receiver went
//! away first.

pub mod generation;
pub mod partial_json;
pub mod sandbox;

use std::sync::OnceLock;
use std::time::Duration;

use futures_util::StreamExt;
use kiln_types::{GenerationEvent, SecretString};
use kiln_utils::{redact_known_secrets, sanitize_stream_error};
use tokio::sync::mpsc;

pub use generation::{GenerationRequest, chat_endpoint, stream_fragment};
pub use sandbox::{SandboxError, SandboxRequest, execute, sandbox_endpoint};

const CONNECT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_STREAM_IDLE_TIMEOUT_SECS: u64 = 60;
const TCP_KEEPALIVE_SECS: u64 = 60;
const POOL_MAX_IDLE_PER_HOST: usize = 16;
const POOL_IDLE_TIMEOUT_SECS: u64 = 90;

/// Upper bound on the streamed document held in memory.
pub(crate) const MAX_STREAM_BUFFER_BYTES: usize = 4 * 1024 * 1024;

const MAX_ERROR_BODY_BYTES: usize = 32 * 1024;

/// Shared client for all collaborator requests.
pub fn http_client() -> &'static reqwest::Client {
    static CLIENT: OnceLock<reqwest::Client> = OnceLock::new();
    CLIENT.get_or_init(|| {
        base_client_builder().build().unwrap_or_else(|e| {
            tracing::error!("Failed to build tuned HTTP client: {e}. Falling back to defaults.");
            reqwest::Client::new()
        })
    })
}

// The service usually runs on localhost, so plain http is allowed.
fn base_client_builder() -> reqwest::ClientBuilder {
    reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
        .redirect(reqwest::redirect::Policy::none())
        .tcp_keepalive(Some(Duration::from_secs(TCP_KEEPALIVE_SECS)))
        .pool_max_idle_per_host(POOL_MAX_IDLE_PER_HOST)
        .pool_idle_timeout(Some(Duration::from_secs(POOL_IDLE_TIMEOUT_SECS)))
}

/// Longest gap allowed between two body chunks of a generation stream.
///
/// Overridable through `KILN_STREAM_IDLE_TIMEOUT_SECS`.
pub fn stream_idle_timeout() -> Duration {
    static TIMEOUT: OnceLock<Duration> = OnceLock::new();
    *TIMEOUT.get_or_init(|| {
        let timeout = std::env::var("KILN_STREAM_IDLE_TIMEOUT_SECS")
            .ok()
            .and_then(|value| value.parse::<u64>().ok())
            .filter(|value| *value > 0)
            .unwrap_or(DEFAULT_STREAM_IDLE_TIMEOUT_SECS);
        Duration::from_secs(timeout)
    })
}

/// False once the receiving side has gone away.
pub(crate) async fn send_event(tx: &mpsc::Sender<GenerationEvent>, event: GenerationEvent) -> bool {
    tx.send(event).await.is_ok()
}

/// Sanitize error text and redact the credential sent with the request.
pub(crate) fn scrub_error(raw: &str, api_key: Option<&SecretString>) -> String {
    let sanitized = sanitize_stream_error(raw);
    match api_key {
        Some(key) => redact_known_secrets(&sanitized, &[key.expose()]).into_owned(),
        None => sanitized,
    }
}

/// Read at most `MAX_ERROR_BODY_BYTES` of an error response.
pub async fn read_capped_error_body(response: reqwest::Response) -> String {
    let mut body = Vec::new();
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let Ok(chunk) = chunk else { break };
        body.extend_from_slice(&chunk);
        if body.len() > MAX_ERROR_BODY_BYTES {
            body.truncate(MAX_ERROR_BODY_BYTES);
            let text = String::from_utf8_lossy(&body);
            return format!("{text}...(truncated)");
        }
    }
    String::from_utf8_lossy(&body).into_owned()
}
