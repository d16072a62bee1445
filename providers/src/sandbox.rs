//! Sandbox execution client.

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use kiln_types::{ExecutionResult, Fragment, SecretString};
use crate::{read_capped_error_body, scrub_error};

pub const SANDBOX_PATH: &str = "/api/sandbox";

#[must_use]
pub fn sandbox_endpoint(base_url: &str) -> String {
    format!("{}{SANDBOX_PATH}", base_url.trim_end_matches('/'))
}

/// Body of a sandbox request.
#[derive(Debug, Clone, Serialize)]
pub struct SandboxRequest {
    pub fragment: Fragment,
    #[serde(rename = "userID")]
    pub user_id: String,
    #[serde(rename = "apiKey", skip_serializing_if = "Option::is_none")]
    pub api_key: Option<SecretString>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SandboxError {
    #[error("sandbox request failed: {0}")]
    Transport(String),
    #[error("sandbox returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("sandbox reported an error: {0}")]
    Reported(String),
    #[error("sandbox response was not JSON: {0}")]
    InvalidResponse(String),
}

/// Execute `request` and return the sandbox's result verbatim.
pub async fn execute(
    client: &reqwest::Client,
    url: &str,
    request: &SandboxRequest,
) -> Result<ExecutionResult, SandboxError> {
    let api_key = request.api_key.as_ref();
    let response = client
        .post(url)
        .json(request)
        .send()
        .await
        .map_err(|e| SandboxError::Transport(scrub_error(&e.to_string(), api_key)))?;

    let status = response.status();
    if !status.is_success() {
        let body = read_capped_error_body(response).await;
        return Err(SandboxError::Status {
            status: status.as_u16(),
            body: scrub_error(&body, api_key),
        });
    }

    let value: Value = response
        .json()
        .await
        .map_err(|e| SandboxError::InvalidResponse(scrub_error(&e.to_string(), api_key)))?;

    if let Some(error) = value.get("error").filter(|e| !e.is_null()) {
        return Err(SandboxError::Reported(scrub_error(&describe_error(error), api_key)));
    }

    Ok(ExecutionResult::new(value))
}

fn describe_error(error: &Value) -> String {
    match error {
        Value::String(s) => s.clone(),
        Value::Object(map) => map
            .get("message")
            .and_then(Value::as_str)
            .map_or_else(|| error.to_string(), str::to_string),
        other => other.to_string(),
    }
}
