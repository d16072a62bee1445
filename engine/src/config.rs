use std::collections::BTreeMap;
use std::env;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use kiln_types::{LlmModel, SecretString, TemplateSelection, TemplateSet};

use crate::collaborators::Session;
use crate::preview::UndoPreviewPolicy;

pub const DEFAULT_BASE_URL: &str = "http://localhost:3000";
pub const DEFAULT_MODEL_ID: &str = "claude-3-5-sonnet-20240620";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config at {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config at {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

impl ConfigError {
    #[must_use]
    pub fn path(&self) -> &Path {
        match self {
            ConfigError::Read { path, .. } | ConfigError::Parse { path, .. } => path,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct KilnConfig {
    pub app: Option<AppSection>,
    pub session: Option<SessionSection>,
    pub preview: Option<PreviewSection>,
    #[serde(default)]
    pub models: Vec<ModelEntry>,
    #[serde(default)]
    pub templates: BTreeMap<String, toml::Value>,
}

#[derive(Debug, Default, Deserialize)]
pub struct AppSection {
    pub base_url: Option<String>,
    pub model: Option<String>,
    pub template: Option<String>,
    pub data_dir: Option<String>,
}

#[derive(Default, Deserialize)]
pub struct SessionSection {
    pub user_id: Option<String>,
    pub api_key: Option<String>,
}

impl fmt::Debug for SessionSection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionSection")
            .field("user_id", &self.user_id)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct PreviewSection {
    pub after_undo: Option<UndoPreviewPolicy>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModelEntry {
    pub id: String,
    pub provider: String,
    pub provider_id: String,
    pub name: String,
    #[serde(default)]
    pub multi_modal: bool,
}

impl From<ModelEntry> for LlmModel {
    fn from(entry: ModelEntry) -> Self {
        LlmModel {
            id: entry.id,
            provider: entry.provider,
            provider_id: entry.provider_id,
            name: entry.name,
            multi_modal: entry.multi_modal,
        }
    }
}

/// Model catalogue used when the config lists none.
#[must_use]
pub fn default_models() -> Vec<LlmModel> {
    let model = |id: &str, provider: &str, provider_id: &str, name: &str, multi_modal| LlmModel {
        id: id.to_string(),
        provider: provider.to_string(),
        provider_id: provider_id.to_string(),
        name: name.to_string(),
        multi_modal,
    };
    vec![
        model(
            DEFAULT_MODEL_ID,
            "Anthropic",
            "anthropic",
            "Claude 3.5 Sonnet",
            true,
        ),
        model("gpt-4o", "OpenAI", "openai", "GPT-4o", true),
        model("o1-preview", "OpenAI", "openai", "o1 (Preview)", false),
        model("o1-mini", "OpenAI", "openai", "o1 mini", false),
    ]
}

/// Convert a TOML value to a JSON value.
fn toml_to_json(value: &toml::Value) -> Result<serde_json::Value, String> {
    match value {
        toml::Value::String(s) => Ok(serde_json::Value::String(s.clone())),
        toml::Value::Integer(i) => Ok(serde_json::Value::Number((*i).into())),
        toml::Value::Float(f) => {
            let n =
                serde_json::Number::from_f64(*f).ok_or_else(|| format!("Invalid float: {f}"))?;
            Ok(serde_json::Value::Number(n))
        }
        toml::Value::Boolean(b) => Ok(serde_json::Value::Bool(*b)),
        toml::Value::Array(arr) => {
            let json_arr: Result<Vec<_>, _> = arr.iter().map(toml_to_json).collect();
            Ok(serde_json::Value::Array(json_arr?))
        }
        toml::Value::Table(table) => {
            let mut map = serde_json::Map::new();
            for (k, v) in table {
                map.insert(k.clone(), toml_to_json(v)?);
            }
            Ok(serde_json::Value::Object(map))
        }
        toml::Value::Datetime(dt) => Ok(serde_json::Value::String(dt.to_string())),
    }
}

/// Replace `${VAR}` references with the environment value (missing is empty).
pub fn expand_env_vars(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut rest = value;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            out.push_str(&rest[start..]);
            return out;
        };
        let var = &after[..end];
        if !var.is_empty() {
            out.push_str(&env::var(var).unwrap_or_default());
        }
        rest = &after[end + 1..];
    }

    out.push_str(rest);
    out
}

fn expand_home(raw: &str) -> PathBuf {
    match raw.strip_prefix("~/") {
        Some(rest) => dirs::home_dir().map_or_else(|| PathBuf::from(raw), |home| home.join(rest)),
        None => PathBuf::from(raw),
    }
}

fn non_empty(value: String) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

impl KilnConfig {
    pub fn load() -> Result<Option<Self>, ConfigError> {
        let Some(path) = config_path() else {
            return Ok(None);
        };
        if !path.exists() {
            return Ok(None);
        }
        Self::load_from(&path).map(Some)
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(err) => {
                tracing::warn!("Failed to read config at {:?}: {}", path, err);
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source: err,
                });
            }
        };

        match toml::from_str(&content) {
            Ok(config) => Ok(config),
            Err(err) => {
                tracing::warn!("Failed to parse config at {:?}: {}", path, err);
                Err(ConfigError::Parse {
                    path: path.to_path_buf(),
                    source: err,
                })
            }
        }
    }

    #[must_use]
    pub fn path() -> Option<PathBuf> {
        config_path()
    }

    #[must_use]
    pub fn base_url(&self) -> String {
        self.app
            .as_ref()
            .and_then(|app| app.base_url.clone())
            .and_then(non_empty)
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
    }

    #[must_use]
    pub fn default_model_id(&self) -> String {
        self.app
            .as_ref()
            .and_then(|app| app.model.clone())
            .and_then(non_empty)
            .unwrap_or_else(|| DEFAULT_MODEL_ID.to_string())
    }

    #[must_use]
    pub fn template_selection(&self) -> TemplateSelection {
        self.app
            .as_ref()
            .and_then(|app| app.template.as_deref())
            .and_then(|raw| raw.parse().ok())
            .unwrap_or_default()
    }

    /// Persistence directory, defaulting to `~/.kiln/data`.
    #[must_use]
    pub fn data_dir(&self) -> Option<PathBuf> {
        match self.app.as_ref().and_then(|app| app.data_dir.as_deref()) {
            Some(raw) if !raw.trim().is_empty() => Some(expand_home(raw.trim())),
            _ => dirs::home_dir().map(|home| home.join(".kiln").join("data")),
        }
    }

    /// The configured identity, or `None` when no user id is set.
    #[must_use]
    pub fn session(&self) -> Option<Session> {
        let section = self.session.as_ref()?;
        let user_id = section
            .user_id
            .as_deref()
            .map(expand_env_vars)
            .and_then(non_empty)?;
        let api_key = section
            .api_key
            .as_deref()
            .map(expand_env_vars)
            .and_then(non_empty)
            .map(SecretString::new);
        Some(Session::new(user_id, api_key))
    }

    #[must_use]
    pub fn undo_policy(&self) -> UndoPreviewPolicy {
        self.preview
            .as_ref()
            .and_then(|preview| preview.after_undo)
            .unwrap_or_default()
    }

    #[must_use]
    pub fn models(&self) -> Vec<LlmModel> {
        if self.models.is_empty() {
            return default_models();
        }
        self.models.iter().cloned().map(LlmModel::from).collect()
    }

    /// Configured templates as JSON. Entries that cannot be represented are skipped.
    #[must_use]
    pub fn templates(&self) -> TemplateSet {
        let mut templates = BTreeMap::new();
        for (id, value) in &self.templates {
            match toml_to_json(value) {
                Ok(json) => {
                    templates.insert(id.clone(), json);
                }
                Err(e) => tracing::warn!("Skipping template {id}: {e}"),
            }
        }
        TemplateSet::new(templates)
    }
}

pub fn config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".kiln").join("config.toml"))
}
