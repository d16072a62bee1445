//! The [`App`] state machine.
//!
//! `App` owns the conversation store, the preview and the operation state.
//! Every mutation of the log goes through here or through the merge engine,
//! and every one of them is mirrored to the persistence adapter before the
//! call returns.

mod commands;
mod persistence;
mod streaming;

use std::mem;

use thiserror::Error;

use kiln_providers::SandboxError;
use kiln_store::{ConversationStore, DRAFT_KEY, MESSAGES_KEY, MODEL_CONFIG_KEY, PersistenceAdapter};
use kiln_types::{
    ContentBlock, LlmModel, Message, ModelConfig, Preview, PreviewTab, TemplateSelection,
    TemplateSet,
};

use crate::collaborators::{Attachment, Collaborators, Session};
use crate::config::{DEFAULT_MODEL_ID, KilnConfig, default_models};
use crate::preview::{PreviewSynchronizer, UndoPreviewPolicy};
use crate::state::{OperationState, Phase};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubmitError {
    #[error("sign in to submit")]
    AuthRequired,
    #[error("nothing to submit")]
    EmptyInput,
    #[error("model {model} does not accept attachments")]
    AttachmentsNotSupported { model: String },
    #[error("attachment conversion failed: {0}")]
    AttachmentConversion(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum UndoError {
    #[error("cannot undo while generating")]
    Generating,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RetryError {
    #[error("nothing to retry")]
    NotInErrorState,
    #[error("sign in to retry")]
    AuthRequired,
}

/// Start-up settings for an [`App`].
#[derive(Debug, Clone)]
pub struct AppOptions {
    pub session: Option<Session>,
    /// Model catalogue; empty means the built-in list.
    pub models: Vec<LlmModel>,
    /// Model used when no model configuration was persisted.
    pub default_model: String,
    pub templates: TemplateSet,
    pub template: TemplateSelection,
    pub undo_policy: UndoPreviewPolicy,
}

impl Default for AppOptions {
    fn default() -> Self {
        Self {
            session: None,
            models: default_models(),
            default_model: DEFAULT_MODEL_ID.to_string(),
            templates: TemplateSet::default(),
            template: TemplateSelection::Auto,
            undo_policy: UndoPreviewPolicy::Clear,
        }
    }
}

impl AppOptions {
    #[must_use]
    pub fn from_config(config: &KilnConfig) -> Self {
        Self {
            session: config.session(),
            models: config.models(),
            default_model: config.default_model_id(),
            templates: config.templates(),
            template: config.template_selection(),
            undo_policy: config.undo_policy(),
        }
    }

    #[must_use]
    pub fn with_session(mut self, session: Session) -> Self {
        self.session = Some(session);
        self
    }
}

pub struct App {
    store: ConversationStore,
    preview: PreviewSynchronizer,
    state: OperationState,
    session: Option<Session>,
    models: Vec<LlmModel>,
    model: LlmModel,
    model_config: ModelConfig,
    templates: TemplateSet,
    template: TemplateSelection,
    undo_policy: UndoPreviewPolicy,
    current_tab: PreviewTab,
    draft: String,
    last_sandbox_error: Option<SandboxError>,
    collaborators: Collaborators,
}

impl std::fmt::Debug for App {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("App")
            .field("phase", &self.phase())
            .field("messages", &self.store.len())
            .field("model", &self.model.id)
            .finish_non_exhaustive()
    }
}

fn resolve_model(models: &[LlmModel], id: &str) -> LlmModel {
    if let Some(model) = models.iter().find(|m| m.id == id) {
        return model.clone();
    }
    tracing::warn!(model = id, "Unknown model id; using the first catalogue entry");
    models.first().cloned().unwrap_or_else(|| LlmModel {
        id: id.to_string(),
        provider: String::new(),
        provider_id: String::new(),
        name: id.to_string(),
        multi_modal: false,
    })
}

impl App {
    /// Build an app, restoring the log, draft and model configuration from
    /// `adapter`.
    pub fn new(adapter: PersistenceAdapter, options: AppOptions, collaborators: Collaborators) -> Self {
        let AppOptions {
            session,
            models,
            default_model,
            templates,
            template,
            undo_policy,
        } = options;
        let models = if models.is_empty() {
            default_models()
        } else {
            models
        };

        let store = ConversationStore::load(adapter.clone(), MESSAGES_KEY);
        let draft: String = adapter.retrieve(DRAFT_KEY).unwrap_or_default();
        let mut model_config: ModelConfig = adapter
            .retrieve(MODEL_CONFIG_KEY)
            .unwrap_or_else(|| ModelConfig::for_model(default_model.clone()));
        let model_id = model_config
            .model
            .get_or_insert_with(|| default_model.clone())
            .clone();
        let model = resolve_model(&models, &model_id);

        tracing::info!(
            messages = store.len(),
            model = %model.id,
            authenticated = session.is_some(),
            "App initialised"
        );

        Self {
            store,
            preview: PreviewSynchronizer::new(),
            state: OperationState::Idle,
            session,
            models,
            model,
            model_config,
            templates,
            template,
            undo_policy,
            current_tab: PreviewTab::Code,
            draft,
            last_sandbox_error: None,
            collaborators,
        }
    }

    pub(crate) fn replace_with_idle(&mut self) -> OperationState {
        mem::replace(&mut self.state, OperationState::Idle)
    }

    /// Append a user turn and start a generation run.
    ///
    /// Validation failures leave every piece of state untouched. A run or
    /// execution in flight is stopped first; an error state is discarded.
    pub fn submit(&mut self, text: &str, attachments: &[Attachment]) -> Result<(), SubmitError> {
        let Some(session) = self.session.clone() else {
            tracing::info!("Submission refused: not signed in");
            return Err(SubmitError::AuthRequired);
        };

        if text.trim().is_empty() && attachments.is_empty() {
            return Err(SubmitError::EmptyInput);
        }
        if !attachments.is_empty() && !self.model.multi_modal {
            return Err(SubmitError::AttachmentsNotSupported {
                model: self.model.id.clone(),
            });
        }

        let images = self
            .collaborators
            .converter
            .convert(attachments)
            .map_err(|e| SubmitError::AttachmentConversion(format!("{e:#}")))?;
        if text.trim().is_empty() && images.is_empty() {
            return Err(SubmitError::EmptyInput);
        }

        match self.phase() {
            Phase::Generating | Phase::Executing => {
                self.stop();
            }
            Phase::Error => {
                self.replace_with_idle();
            }
            Phase::Idle => {}
        }

        let mut content = Vec::with_capacity(1 + images.len());
        content.push(ContentBlock::text(text));
        content.extend(images.into_iter().map(ContentBlock::image));
        self.store.append(Message::user(content));

        self.set_draft(String::new());
        self.current_tab = PreviewTab::Code;
        self.last_sandbox_error = None;

        self.start_generation(&session);
        Ok(())
    }

    #[must_use]
    pub fn messages(&self) -> &[Message] {
        self.store.messages()
    }

    #[must_use]
    pub fn store(&self) -> &ConversationStore {
        &self.store
    }

    #[must_use]
    pub fn preview(&self) -> &Preview {
        self.preview.current()
    }

    #[must_use]
    pub fn phase(&self) -> Phase {
        self.state.phase()
    }

    #[must_use]
    pub fn is_generating(&self) -> bool {
        matches!(self.state, OperationState::Generating(_))
    }

    /// True while the sandbox is executing a fragment.
    #[must_use]
    pub fn is_preview_loading(&self) -> bool {
        matches!(self.state, OperationState::Executing(_))
    }

    #[must_use]
    pub fn current_tab(&self) -> PreviewTab {
        self.current_tab
    }

    pub fn set_current_tab(&mut self, tab: PreviewTab) {
        self.current_tab = tab;
    }

    #[must_use]
    pub fn can_undo(&self) -> bool {
        self.store.len() > 1 && !self.is_generating()
    }

    #[must_use]
    pub fn can_clear(&self) -> bool {
        self.store.can_clear()
    }

    /// Formatted message of the failed run, while in the error state.
    #[must_use]
    pub fn last_error(&self) -> Option<&str> {
        match &self.state {
            OperationState::Error(message) => Some(message),
            _ => None,
        }
    }

    #[must_use]
    pub fn last_sandbox_error(&self) -> Option<&SandboxError> {
        self.last_sandbox_error.as_ref()
    }

    #[must_use]
    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    #[must_use]
    pub fn model(&self) -> &LlmModel {
        &self.model
    }

    #[must_use]
    pub fn models(&self) -> &[LlmModel] {
        &self.models
    }

    #[must_use]
    pub fn template(&self) -> &TemplateSelection {
        &self.template
    }

    pub fn set_template(&mut self, template: TemplateSelection) {
        self.template = template;
    }

    #[must_use]
    pub fn templates(&self) -> &TemplateSet {
        &self.templates
    }
}
