//! Draft input and model configuration persistence for the App.
//!
//! Both live next to the message log in the same adapter and follow the same
//! rule: the in-memory value is authoritative and a failed write is only logged.

use kiln_store::{DRAFT_KEY, MODEL_CONFIG_KEY};
use kiln_types::ModelConfig;

use super::{App, resolve_model};

impl App {
    #[must_use]
    pub fn draft(&self) -> &str {
        &self.draft
    }

    pub fn set_draft(&mut self, draft: impl Into<String>) {
        self.draft = draft.into();
        self.autosave_draft();
    }

    #[must_use]
    pub fn model_config(&self) -> &ModelConfig {
        &self.model_config
    }

    /// Switch the active model. Unknown ids are refused.
    pub fn set_model(&mut self, id: &str) -> bool {
        if !self.models.iter().any(|m| m.id == id) {
            return false;
        }
        self.model_config.model = Some(id.to_string());
        self.model = resolve_model(&self.models, id);
        tracing::info!(model = id, "Model changed");
        self.autosave_model_config();
        true
    }

    /// Overlay the fields set in `update` onto the active configuration.
    pub fn update_model_config(&mut self, update: ModelConfig) {
        self.model_config.merge(update);
        if let Some(id) = self.model_config.model.clone()
            && id != self.model.id
        {
            self.model = resolve_model(&self.models, &id);
        }
        self.autosave_model_config();
    }

    pub(crate) fn autosave_draft(&self) -> bool {
        match self.store.adapter().store(DRAFT_KEY, &self.draft) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("Draft autosave failed: {e}");
                false
            }
        }
    }

    pub(crate) fn autosave_model_config(&self) -> bool {
        match self
            .store
            .adapter()
            .store(MODEL_CONFIG_KEY, &self.model_config)
        {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("Model config autosave failed: {e}");
                false
            }
        }
    }
}
