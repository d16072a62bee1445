//! Streamed fragment generation.
//!
//! The service answers with a plain text body that is one JSON object written
//! incrementally. After every chunk the accumulated text is repaired and
//! parsed; a snapshot is emitted whenever the parsed fragment changed. At end
//! of body the text must parse strictly, otherwise the run is an error.

use std::time::Duration;

use futures_util::StreamExt;
use serde::Serialize;
use tokio::sync::mpsc;

use kiln_types::{ExchangeMessage, Fragment, GenerationEvent, LlmModel, ModelConfig, TemplateSet};
use crate::{
    MAX_STREAM_BUFFER_BYTES, partial_json, read_capped_error_body, scrub_error, send_event,
};

pub const CHAT_PATH: &str = "/api/chat";
pub const CHAT_O1_PATH: &str = "/api/chat-o1";

/// Models served by the alternate endpoint.
const O1_MODEL_IDS: &[&str] = &["o1-preview", "o1-mini"];

/// Endpoint for a given model id.
#[must_use]
pub fn chat_endpoint(base_url: &str, model_id: &str) -> String {
    let path = if O1_MODEL_IDS.contains(&model_id) {
        CHAT_O1_PATH
    } else {
        CHAT_PATH
    };
    format!("{}{path}", base_url.trim_end_matches('/'))
}

/// Body of a generation request.
#[derive(Debug, Clone, Serialize)]
pub struct GenerationRequest {
    #[serde(rename = "userID")]
    pub user_id: String,
    pub messages: Vec<ExchangeMessage>,
    pub template: TemplateSet,
    pub model: LlmModel,
    pub config: ModelConfig,
}

/// Incremental decoder from body bytes to fragment snapshots.
#[derive(Debug, Default)]
pub struct FragmentDecoder {
    text: String,
    /// Trailing bytes of an incomplete UTF-8 sequence.
    pending: Vec<u8>,
    last: Option<Fragment>,
}

impl FragmentDecoder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Feed one chunk. Returns the new snapshot if the fragment changed.
    pub fn push(&mut self, chunk: &[u8]) -> Result<Option<Fragment>, String> {
        self.pending.extend_from_slice(chunk);
        match std::str::from_utf8(&self.pending) {
            Ok(valid) => {
                self.text.push_str(valid);
                self.pending.clear();
            }
            Err(e) if e.error_len().is_some() => {
                return Err("Received invalid UTF-8 from generation stream".to_string());
            }
            Err(e) => {
                let valid_up_to = e.valid_up_to();
                let rest = self.pending.split_off(valid_up_to);
                // The prefix was just validated.
                self.text.push_str(&String::from_utf8_lossy(&self.pending));
                self.pending = rest;
            }
        }

        if self.text.len() > MAX_STREAM_BUFFER_BYTES {
            return Err("Generation stream exceeded maximum size (4 MiB)".to_string());
        }

        let Some(value) = partial_json::parse_partial(&self.text) else {
            return Ok(None);
        };
        let fragment: Fragment = match serde_json::from_value(value) {
            Ok(fragment) => fragment,
            Err(e) => {
                tracing::debug!(%e, "Partial document is not a fragment yet");
                return Ok(None);
            }
        };
        Ok(self.record(fragment))
    }

    /// End of body. The document must be complete; returns the final snapshot
    /// if it differs from the last one emitted.
    pub fn finish(mut self) -> Result<Option<Fragment>, String> {
        if !self.pending.is_empty() {
            return Err("Generation stream ended inside a UTF-8 sequence".to_string());
        }
        if self.text.trim().is_empty() {
            return Err("Generation service returned an empty response".to_string());
        }
        let fragment: Fragment = serde_json::from_str(&self.text)
            .map_err(|e| format!("Generation stream ended with an incomplete document: {e}"))?;
        Ok(self.record(fragment))
    }

    fn record(&mut self, fragment: Fragment) -> Option<Fragment> {
        if fragment.is_empty() || self.last.as_ref() == Some(&fragment) {
            return None;
        }
        self.last = Some(fragment.clone());
        Some(fragment)
    }
}

/// Run one generation request, sending events to `tx` until a terminal event.
pub async fn stream_fragment(
    client: &reqwest::Client,
    url: &str,
    request: &GenerationRequest,
    tx: mpsc::Sender<GenerationEvent>,
    idle_timeout: Duration,
) {
    let api_key = request.config.api_key.as_ref();
    let response = match client.post(url).json(request).send().await {
        Ok(response) => response,
        Err(e) => {
            let msg = scrub_error(&format!("Request failed: {e}"), api_key);
            let _ = send_event(&tx, GenerationEvent::Error(msg)).await;
            return;
        }
    };

    if !response.status().is_success() {
        let status = response.status();
        let body = read_capped_error_body(response).await;
        let msg = scrub_error(&format!("API error {status}: {body}"), api_key);
        let _ = send_event(&tx, GenerationEvent::Error(msg)).await;
        return;
    }

    let mut stream = response.bytes_stream();
    let mut decoder = FragmentDecoder::new();
    let mut snapshots = 0usize;

    loop {
        let Ok(next) = tokio::time::timeout(idle_timeout, stream.next()).await else {
            let _ = send_event(
                &tx,
                GenerationEvent::Error("Stream idle timeout".to_string()),
            )
            .await;
            return;
        };

        let Some(chunk) = next else { break };
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(e) => {
                let msg = scrub_error(&format!("Stream read failed: {e}"), api_key);
                let _ = send_event(&tx, GenerationEvent::Error(msg)).await;
                return;
            }
        };

        match decoder.push(&chunk) {
            Ok(Some(fragment)) => {
                snapshots += 1;
                if !send_event(&tx, GenerationEvent::Snapshot(fragment)).await {
                    return;
                }
            }
            Ok(None) => {}
            Err(msg) => {
                let _ = send_event(&tx, GenerationEvent::Error(msg)).await;
                return;
            }
        }
    }

    match decoder.finish() {
        Ok(last) => {
            if let Some(fragment) = last {
                snapshots += 1;
                if !send_event(&tx, GenerationEvent::Snapshot(fragment)).await {
                    return;
                }
            }
            tracing::debug!(snapshots, "Generation stream completed");
            let _ = send_event(&tx, GenerationEvent::Done).await;
        }
        Err(msg) => {
            let _ = send_event(&tx, GenerationEvent::Error(msg)).await;
        }
    }
}
