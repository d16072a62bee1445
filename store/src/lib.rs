//! Durable local state for Kiln.
//!
//! - [`PersistenceAdapter`]: best-effort key/value storage of serializable values
//! - [`ConversationStore`]: the ordered message log, mirrored to the adapter after
//!   every mutation

mod conversation;
mod persistence;

pub use conversation::{ConversationStore, MessagePosition, RemovedTurn, StoreError};
pub use persistence::{
    FileBackend, MemoryBackend, PersistError, PersistenceAdapter, StorageBackend, StorageKey,
};

/// Key holding the whole message log.
pub const MESSAGES_KEY: &str = "messages";
/// Key holding the unsent draft input.
pub const DRAFT_KEY: &str = "chat";
/// Key holding the active model configuration.
pub const MODEL_CONFIG_KEY: &str = "languageModel";
