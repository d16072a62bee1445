//! User-facing formatting of generation failures.

use serde_json::Value;

use kiln_types::truncate_with_ellipsis;

pub const GENERATION_ERROR_BADGE: &str = "[Generation error]";

const MAX_DETAIL_CHARS: usize = 200;

fn split_api_error(raw: &str) -> Option<(String, String)> {
    let rest = raw.strip_prefix("API error ")?;
    let (status, body) = rest.split_once(": ")?;
    Some((status.trim().to_string(), body.trim().to_string()))
}

fn extract_error_message(body: &str) -> Option<String> {
    let payload: Value = serde_json::from_str(body).ok()?;
    payload
        .pointer("/error/message")
        .and_then(Value::as_str)
        .or_else(|| payload.pointer("/error").and_then(Value::as_str))
        .or_else(|| payload.pointer("/message").and_then(Value::as_str))
        .or_else(|| payload.as_str())
        .map(str::to_string)
}

/// Render a raw generation error as a bounded, multi-line message.
///
/// `API error <status>: <body>` errors keep the status; a JSON body is reduced to
/// its `error.message`.
#[must_use]
pub fn format_generation_error(raw: &str) -> String {
    let trimmed = raw.trim();
    let (status, body) =
        split_api_error(trimmed).unwrap_or_else(|| (String::new(), trimmed.to_string()));
    let extracted = extract_error_message(&body).unwrap_or(body);

    let detail = if extracted.trim().is_empty() {
        "unknown error".to_string()
    } else {
        truncate_with_ellipsis(extracted.trim(), MAX_DETAIL_CHARS)
    };

    let mut content = String::new();
    content.push_str(GENERATION_ERROR_BADGE);
    content.push_str("\n\n");
    if status.is_empty() {
        content.push_str("Request failed.");
    } else {
        content.push_str("Request failed (");
        content.push_str(&status);
        content.push_str(").");
    }
    content.push_str("\n\nDetails: ");
    content.push_str(&detail);
    content
}
