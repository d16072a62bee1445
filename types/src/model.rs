//! Model, model configuration, and template selection types.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

/// A credential string.
///
/// Note: `Debug` is manually implemented to redact the value, preventing accidental
/// credential disclosure in logs or error messages.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SecretString(String);

impl SecretString {
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretString(<redacted>)")
    }
}

/// An entry of the model catalogue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LlmModel {
    pub id: String,
    pub provider: String,
    #[serde(alias = "provider_id")]
    pub provider_id: String,
    pub name: String,
    #[serde(default, alias = "multi_modal")]
    pub multi_modal: bool,
}

/// User-adjustable request settings for the active model.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelConfig {
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<SecretString>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_k: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frequency_penalty: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub presence_penalty: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

impl ModelConfig {
    #[must_use]
    pub fn for_model(model: impl Into<String>) -> Self {
        Self {
            model: Some(model.into()),
            ..Self::default()
        }
    }

    /// Overlay the fields set in `other` onto `self`.
    pub fn merge(&mut self, other: ModelConfig) {
        let ModelConfig {
            model,
            api_key,
            base_url,
            temperature,
            top_p,
            top_k,
            frequency_penalty,
            presence_penalty,
            max_tokens,
        } = other;
        self.model = model.or(self.model.take());
        self.api_key = api_key.or(self.api_key.take());
        self.base_url = base_url.or(self.base_url.take());
        self.temperature = temperature.or(self.temperature);
        self.top_p = top_p.or(self.top_p);
        self.top_k = top_k.or(self.top_k);
        self.frequency_penalty = frequency_penalty.or(self.frequency_penalty);
        self.presence_penalty = presence_penalty.or(self.presence_penalty);
        self.max_tokens = max_tokens.or(self.max_tokens);
    }
}

/// Which templates the producer may choose from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TemplateSelection {
    /// Let the producer pick among every known template.
    #[default]
    Auto,
    Template(String),
}

impl TemplateSelection {
    pub const AUTO: &'static str = "auto";

    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            TemplateSelection::Auto => Self::AUTO,
            TemplateSelection::Template(id) => id,
        }
    }
}

impl FromStr for TemplateSelection {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() || trimmed == Self::AUTO {
            Ok(TemplateSelection::Auto)
        } else {
            Ok(TemplateSelection::Template(trimmed.to_string()))
        }
    }
}

impl fmt::Display for TemplateSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for TemplateSelection {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for TemplateSelection {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(raw.parse().unwrap_or_default())
    }
}

/// Template definitions keyed by template id. Definitions are opaque to the core.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TemplateSet(BTreeMap<String, Value>);

impl TemplateSet {
    #[must_use]
    pub fn new(templates: BTreeMap<String, Value>) -> Self {
        Self(templates)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.0.contains_key(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// The subset sent with a request: everything for `Auto`, otherwise only the
    /// selected template. An unknown id yields an empty set.
    #[must_use]
    pub fn select(&self, selection: &TemplateSelection) -> TemplateSet {
        match selection {
            TemplateSelection::Auto => self.clone(),
            TemplateSelection::Template(id) => TemplateSet(
                self.0
                    .get_key_value(id)
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .into_iter()
                    .collect(),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn templates() -> TemplateSet {
        let mut map = BTreeMap::new();
        map.insert("nextjs-developer".to_string(), json!({ "name": "Next.js" }));
        map.insert("code-interpreter-v1".to_string(), json!({ "name": "Python" }));
        TemplateSet::new(map)
    }

    #[test]
    fn secret_debug_is_redacted() {
        let secret = SecretString::new("sk-live-123");
        assert!(!format!("{secret:?}").contains("sk-live"));
        assert_eq!(secret.expose(), "sk-live-123");
    }

    #[test]
    fn auto_selection_sends_all_templates() {
        assert_eq!(templates().select(&TemplateSelection::Auto).len(), 2);
    }

    #[test]
    fn specific_selection_sends_one_template() {
        let selected = templates().select(&TemplateSelection::Template(
            "nextjs-developer".to_string(),
        ));
        assert_eq!(selected.len(), 1);
        assert!(selected.contains("nextjs-developer"));
    }

    #[test]
    fn selection_parses_auto_and_ids() {
        assert_eq!("auto".parse::<TemplateSelection>().unwrap(), TemplateSelection::Auto);
        assert_eq!(
            " streamlit-developer ".parse::<TemplateSelection>().unwrap(),
            TemplateSelection::Template("streamlit-developer".to_string())
        );
    }

    #[test]
    fn model_config_serializes_camel_case() {
        let config = ModelConfig {
            model: Some("gpt-4o".to_string()),
            max_tokens: Some(1024),
            ..ModelConfig::default()
        };
        let value = serde_json::to_value(&config).unwrap();
        assert_eq!(value, json!({ "model": "gpt-4o", "maxTokens": 1024 }));
    }

    #[test]
    fn model_config_merge_prefers_overlay() {
        let mut base = ModelConfig::for_model("a");
        base.temperature = Some(0.2);
        base.merge(ModelConfig {
            model: Some("b".to_string()),
            ..ModelConfig::default()
        });
        assert_eq!(base.model.as_deref(), Some("b"));
        assert_eq!(base.temperature, Some(0.2));
    }

    #[test]
    fn llm_model_accepts_snake_case_aliases() {
        let model: LlmModel = serde_json::from_value(json!({
            "id": "o1-mini",
            "provider": "OpenAI",
            "provider_id": "openai",
            "name": "o1 mini",
            "multi_modal": false
        }))
        .unwrap();
        assert_eq!(model.provider_id, "openai");
        assert!(!model.multi_modal);
    }
}
