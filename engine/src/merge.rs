//! Folding fragment snapshots into the conversation log.
//!
//! Whether a run already owns an assistant message is read from the log tail,
//! never tracked separately.

use kiln_store::{ConversationStore, MessagePosition};
use kiln_types::{ContentBlock, Fragment, Message, MessagePatch};

/// What a fold did to the log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// The snapshot was empty.
    Ignored,
    /// A new assistant message was appended at this index.
    Opened(usize),
    /// The assistant message at this index was overwritten.
    Updated(usize),
}

impl MergeOutcome {
    #[must_use]
    pub fn index(self) -> Option<usize> {
        match self {
            MergeOutcome::Ignored => None,
            MergeOutcome::Opened(index) | MergeOutcome::Updated(index) => Some(index),
        }
    }
}

/// The two content blocks shown for a fragment: commentary, then code.
#[must_use]
pub fn fragment_content(fragment: &Fragment) -> Vec<ContentBlock> {
    vec![
        ContentBlock::text(fragment.commentary_or_empty()),
        ContentBlock::code(fragment.code_or_empty()),
    ]
}

/// Fold one snapshot into `store`.
///
/// Appends an assistant message when the tail is not one, otherwise replaces the
/// tail's content and object wholesale.
pub fn fold_snapshot(store: &mut ConversationStore, snapshot: &Fragment) -> MergeOutcome {
    if snapshot.is_empty() {
        return MergeOutcome::Ignored;
    }

    let content = fragment_content(snapshot);

    if !store.tail_is_assistant() {
        store.append(Message::assistant(content, Some(snapshot.clone())));
        let index = store.len() - 1;
        tracing::debug!(index, "Opened assistant message");
        return MergeOutcome::Opened(index);
    }

    let patch = MessagePatch::content(content).with_object(snapshot.clone());
    match store.update_at(MessagePosition::Last, patch) {
        Ok(messages) => MergeOutcome::Updated(messages.len() - 1),
        Err(e) => {
            // Unreachable while the tail is an assistant message.
            tracing::warn!("Snapshot fold rejected: {e}");
            MergeOutcome::Ignored
        }
    }
}
