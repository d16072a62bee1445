//! User commands that change the operation state.

use kiln_store::RemovedTurn;
use kiln_types::PreviewTab;

use super::{App, RetryError, UndoError};
use crate::state::OperationState;

impl App {
    /// Cancel the run or execution in flight, keeping merged content.
    ///
    /// Returns false when nothing was in flight.
    pub fn stop(&mut self) -> bool {
        match self.cancel_active_operation() {
            Some(kind) => {
                tracing::info!("Stopped {kind}");
                true
            }
            None => false,
        }
    }

    fn cancel_active_operation(&mut self) -> Option<&'static str> {
        match self.replace_with_idle() {
            OperationState::Generating(active) => {
                active.abort_handle.abort();
                Some("generation")
            }
            OperationState::Executing(active) => {
                active.abort_handle.abort();
                Some("execution")
            }
            other => {
                self.state = other;
                None
            }
        }
    }

    /// Re-issue the failed request over the unmodified log.
    pub fn retry(&mut self) -> Result<(), RetryError> {
        if !matches!(self.state, OperationState::Error(_)) {
            return Err(RetryError::NotInErrorState);
        }
        let Some(session) = self.session.clone() else {
            return Err(RetryError::AuthRequired);
        };
        self.replace_with_idle();
        tracing::info!("Retrying generation");
        self.start_generation(&session);
        Ok(())
    }

    /// Cancel everything, empty the log and the preview.
    pub fn clear(&mut self) {
        self.cancel_active_operation();
        self.state = OperationState::Idle;
        self.store.clear();
        self.preview.clear_preview();
        self.set_draft(String::new());
        self.current_tab = PreviewTab::Code;
        self.last_sandbox_error = None;
        tracing::info!("Conversation cleared");
    }

    /// Remove the last turn. A pending execution is cancelled first.
    ///
    /// With fewer than two messages the log and preview are left as they are.
    pub fn undo(&mut self) -> Result<Option<RemovedTurn>, UndoError> {
        match self.state {
            OperationState::Generating(_) => return Err(UndoError::Generating),
            OperationState::Executing(_) => {
                self.cancel_active_operation();
            }
            OperationState::Error(_) => {
                self.replace_with_idle();
            }
            OperationState::Idle => {}
        }

        let removed = self.store.undo();
        if removed.is_some() {
            self.preview
                .after_undo(self.undo_policy, self.store.messages());
            tracing::info!(remaining = self.store.len(), "Undid last turn");
        }
        Ok(removed)
    }

    /// Show the object and result of the message at `index`.
    pub fn select_message(&mut self, index: usize) -> bool {
        let Some(message) = self.store.get(index) else {
            return false;
        };
        self.preview.select_preview_for(message);
        true
    }

    pub fn close_preview(&mut self) {
        self.preview.clear_preview();
    }
}
