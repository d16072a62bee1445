//! Core domain types for Kiln.
//!
//! This crate contains pure domain types with no IO, no async, and minimal dependencies.
//! Everything here can be used from any layer of the application.

// Pedantic lint configuration - these are intentional design choices
#![allow(clippy::missing_errors_doc)] // Result-returning functions are self-explanatory

mod exchange;
mod fragment;
mod message;
mod model;
mod preview;
mod text;
mod turn;

pub use exchange::{ExchangeMessage, ExchangePart, to_exchange};
pub use fragment::{ExecutionResult, Fragment};
pub use message::{
    AssistantMessage, ContentBlock, ImageRef, Message, MessagePatch, PatchError, Role, UserMessage,
};
pub use model::{LlmModel, ModelConfig, SecretString, TemplateSelection, TemplateSet};
pub use preview::{Preview, PreviewTab};
pub use text::{one_line, truncate_with_ellipsis};
pub use turn::{TURN_LEN, Turn, turns};

// ============================================================================
// Streaming Events
// ============================================================================

/// Event emitted by a generation run.
///
/// A run is a sequence of zero or more `Snapshot`s terminated by exactly one
/// `Done` or `Error`.
#[derive(Debug, Clone, PartialEq)]
pub enum GenerationEvent {
    /// The latest, monotonically more complete view of the fragment.
    Snapshot(Fragment),
    /// Stream completed.
    Done,
    /// Stream terminated with an error.
    Error(String),
}

/// Reason a generation run finished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamFinishReason {
    Done,
    Error(String),
}
