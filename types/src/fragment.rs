//! Streamed fragment schema and the opaque sandbox result.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A partially populated fragment document.
///
/// Every field is optional because snapshots arrive incomplete; an absent
/// `commentary` or `code` reads as the empty string. Fields the producer adds
/// beyond the known schema are carried verbatim in `extra`.
///
/// A known field sent as `null` reads as absent and is not written back, so
/// the stored form of a snapshot is its normalized form.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Fragment {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commentary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additional_dependencies: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub has_additional_dependencies: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub install_dependencies_command: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Fragment {
    #[must_use]
    pub fn commentary_or_empty(&self) -> &str {
        self.commentary.as_deref().unwrap_or_default()
    }

    #[must_use]
    pub fn code_or_empty(&self) -> &str {
        self.code.as_deref().unwrap_or_default()
    }

    /// True when the producer has not emitted a single field yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.commentary.is_none()
            && self.template.is_none()
            && self.title.is_none()
            && self.description.is_none()
            && self.additional_dependencies.is_none()
            && self.has_additional_dependencies.is_none()
            && self.install_dependencies_command.is_none()
            && self.port.is_none()
            && self.file_path.is_none()
            && self.code.is_none()
            && self.extra.is_empty()
    }
}

/// Sandbox execution result, stored verbatim and never interpreted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExecutionResult(Value);

impl ExecutionResult {
    #[must_use]
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    #[must_use]
    pub fn as_value(&self) -> &Value {
        &self.0
    }

    #[must_use]
    pub fn into_inner(self) -> Value {
        self.0
    }

    /// Top-level `url`, if the sandbox reported one. Used for logging only.
    #[must_use]
    pub fn url(&self) -> Option<&str> {
        self.0.get("url").and_then(Value::as_str)
    }
}
