//! The preview currently on display.

use serde::{Deserialize, Serialize};

use kiln_types::{ExecutionResult, Fragment, Message, Preview};

/// What the preview shows after an undo.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UndoPreviewPolicy {
    /// Empty preview.
    #[default]
    Clear,
    /// Show the new last assistant message, if any.
    Restore,
}

/// Holds the displayed fragment and result, independent of the message that
/// produced them.
#[derive(Debug, Default)]
pub struct PreviewSynchronizer {
    current: Preview,
}

impl PreviewSynchronizer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn current(&self) -> &Preview {
        &self.current
    }

    #[must_use]
    pub fn fragment(&self) -> Option<&Fragment> {
        self.current.fragment.as_ref()
    }

    #[must_use]
    pub fn result(&self) -> Option<&ExecutionResult> {
        self.current.result.as_ref()
    }

    pub fn set_preview(&mut self, fragment: Option<Fragment>, result: Option<ExecutionResult>) {
        self.current = Preview::new(fragment, result);
    }

    /// Show a newer `fragment`. The result on display is left as it was.
    pub fn set_fragment(&mut self, fragment: Fragment) {
        self.current.fragment = Some(fragment);
    }

    pub fn clear_preview(&mut self) {
        self.current = Preview::default();
    }

    /// Show `message`'s object and result. User messages yield an empty preview.
    pub fn select_preview_for(&mut self, message: &Message) {
        self.set_preview(message.object().cloned(), message.result().cloned());
    }

    /// Resolve the preview after the last turn was removed from `remaining`.
    pub fn after_undo(&mut self, policy: UndoPreviewPolicy, remaining: &[Message]) {
        match policy {
            UndoPreviewPolicy::Clear => self.clear_preview(),
            UndoPreviewPolicy::Restore => {
                match remaining.iter().rev().find(|m| m.is_assistant()) {
                    Some(message) => self.select_preview_for(message),
                    None => self.clear_preview(),
                }
            }
        }
    }
}
