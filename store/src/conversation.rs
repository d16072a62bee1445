//! The ordered message log.
//!
//! Every mutation applies to memory first and is then mirrored to the
//! persistence adapter. A failed write is logged and never rolls the
//! in-memory log back: memory is authoritative, disk is a best-effort copy.

use std::fmt;

use thiserror::Error;

use kiln_types::{
    AssistantMessage, Message, MessagePatch, PatchError, TURN_LEN, Turn, turns,
};

use crate::persistence::PersistenceAdapter;

/// Target of an index-addressed update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MessagePosition {
    Index(usize),
    #[default]
    Last,
}

impl fmt::Display for MessagePosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessagePosition::Index(i) => write!(f, "index {i}"),
            MessagePosition::Last => f.write_str("the last position"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("no message at {position} (log holds {len})")]
    OutOfRange { position: MessagePosition, len: usize },
    #[error(transparent)]
    Patch(#[from] PatchError),
}

/// The two messages removed by [`ConversationStore::undo`], oldest first.
#[derive(Debug, Clone, PartialEq)]
pub struct RemovedTurn {
    pub first: Message,
    pub second: Message,
}

#[derive(Debug)]
pub struct ConversationStore {
    messages: Vec<Message>,
    adapter: PersistenceAdapter,
    key: String,
}

impl ConversationStore {
    /// An empty store that will persist under `key`. Nothing is written until
    /// the first mutation.
    #[must_use]
    pub fn new(adapter: PersistenceAdapter, key: impl Into<String>) -> Self {
        Self {
            messages: Vec::new(),
            adapter,
            key: key.into(),
        }
    }

    /// Rebuild from persisted data. Missing or malformed data is an empty log.
    #[must_use]
    pub fn load(adapter: PersistenceAdapter, key: impl Into<String>) -> Self {
        let key = key.into();
        let messages: Vec<Message> = adapter.retrieve_array(&key);
        tracing::debug!(key = %key, count = messages.len(), "Loaded conversation");
        Self {
            messages,
            adapter,
            key,
        }
    }

    pub fn append(&mut self, message: Message) -> &[Message] {
        self.messages.push(message);
        self.persist();
        &self.messages
    }

    /// Shallow-merge `patch` into the message at `position`.
    ///
    /// On error the log is unchanged. The log is persisted either way.
    pub fn update_at(
        &mut self,
        position: MessagePosition,
        patch: MessagePatch,
    ) -> Result<&[Message], StoreError> {
        let outcome = self.apply_update(position, patch);
        self.persist();
        outcome.map(|()| self.messages.as_slice())
    }

    fn apply_update(
        &mut self,
        position: MessagePosition,
        patch: MessagePatch,
    ) -> Result<(), StoreError> {
        let len = self.messages.len();
        let index = match position {
            MessagePosition::Index(i) => i,
            MessagePosition::Last => len.checked_sub(1).ok_or(StoreError::OutOfRange {
                position,
                len,
            })?,
        };
        let message = self
            .messages
            .get_mut(index)
            .ok_or(StoreError::OutOfRange { position, len })?;
        message.apply_patch(patch)?;
        Ok(())
    }

    pub fn clear(&mut self) {
        self.messages.clear();
        self.persist();
    }

    /// Remove the last two messages. With fewer than two this is a no-op.
    pub fn undo(&mut self) -> Option<RemovedTurn> {
        let removed = if self.messages.len() >= TURN_LEN {
            let second = self.messages.pop();
            let first = self.messages.pop();
            first.zip(second).map(|(first, second)| RemovedTurn { first, second })
        } else {
            None
        };
        self.persist();
        removed
    }

    /// Write the current log. Returns false if the write failed (logged, not
    /// propagated).
    pub fn persist(&self) -> bool {
        match self.adapter.store(&self.key, &self.messages) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("Conversation autosave failed: {e}");
                false
            }
        }
    }

    #[must_use]
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Message> {
        self.messages.get(index)
    }

    #[must_use]
    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// Index of the last message, if any.
    #[must_use]
    pub fn last_index(&self) -> Option<usize> {
        self.messages.len().checked_sub(1)
    }

    /// The most recent assistant message anywhere in the log.
    #[must_use]
    pub fn last_assistant(&self) -> Option<&AssistantMessage> {
        self.messages.iter().rev().find_map(Message::as_assistant)
    }

    /// Whether the tail is an assistant message, i.e. the one message eligible
    /// for in-place streaming updates.
    #[must_use]
    pub fn tail_is_assistant(&self) -> bool {
        self.messages.last().is_some_and(Message::is_assistant)
    }

    #[must_use]
    pub fn turns(&self) -> Vec<Turn<'_>> {
        turns(&self.messages)
    }

    #[must_use]
    pub fn can_undo(&self) -> bool {
        self.messages.len() >= TURN_LEN
    }

    #[must_use]
    pub fn can_clear(&self) -> bool {
        !self.messages.is_empty()
    }

    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    #[must_use]
    pub fn adapter(&self) -> &PersistenceAdapter {
        &self.adapter
    }
}
