//! Core engine for Kiln - submission state machine and orchestration.
//!
//! This crate contains the [`App`] state machine without any rendering, providing:
//!
//! - **Submission**: building the user turn and starting a generation run
//! - **Streaming merge**: folding fragment snapshots into the conversation log
//! - **Preview sync**: the fragment and execution result currently on display
//! - **Execution**: handing the finished fragment to the sandbox
//!
//! # Architecture
//!
//! Collaborators (generation, sandbox) run as spawned tasks and talk back over
//! channels. The driver calls [`App::process_events`] once per tick; nothing in
//! this crate blocks or awaits.
//!
//! ```text
//! Idle --submit--> Generating --Done--> Executing --result--> Idle
//!                      |
//!                      +--Error--> Error --retry--> Generating
//! ```

mod app;
mod collaborators;
mod config;
mod errors;
mod merge;
mod preview;
mod state;

pub use app::{App, AppOptions, RetryError, SubmitError, UndoError};
pub use collaborators::{
    Attachment, AttachmentConverter, BoxFuture, Collaborators, DataUrlConverter, Generator,
    HttpGenerator, HttpSandbox, Sandbox, Session,
};
pub use config::{
    AppSection, ConfigError, KilnConfig, ModelEntry, PreviewSection, SessionSection,
    config_path, default_models, expand_env_vars,
};
pub use errors::{GENERATION_ERROR_BADGE, format_generation_error};
pub use merge::{MergeOutcome, fold_snapshot, fragment_content};
pub use preview::{PreviewSynchronizer, UndoPreviewPolicy};
pub use state::Phase;

pub use kiln_providers::{GenerationRequest, SandboxError, SandboxRequest};
pub use kiln_store::{
    ConversationStore, FileBackend, MemoryBackend, MessagePosition, PersistenceAdapter,
    RemovedTurn, StoreError,
};
pub use kiln_types::{
    ContentBlock, ExecutionResult, Fragment, GenerationEvent, ImageRef, LlmModel, Message,
    ModelConfig, Preview, PreviewTab, Role, SecretString, StreamFinishReason, TemplateSelection,
    TemplateSet, one_line, truncate_with_ellipsis,
};

/// Upper bound on events handled by one [`App::process_events`] call.
pub const DEFAULT_STREAM_EVENT_BUDGET: usize = 512;

/// Capacity of the channel between a generation task and the app.
pub(crate) const STREAM_EVENT_CHANNEL_CAPACITY: usize = 1024;
