//! Generation and execution event handling for the App.

use futures_util::future::{AbortHandle, Abortable};
use tokio::sync::{mpsc, oneshot};

use kiln_providers::{GenerationRequest, SandboxError, SandboxRequest};
use kiln_store::MessagePosition;
use kiln_types::{
    Fragment, GenerationEvent, MessagePatch, PreviewTab, StreamFinishReason, to_exchange,
};

use crate::collaborators::Session;
use crate::errors::format_generation_error;
use crate::merge::fold_snapshot;
use crate::state::{ActiveExecution, ActiveGeneration, OperationState};
use crate::{App, DEFAULT_STREAM_EVENT_BUDGET, STREAM_EVENT_CHANNEL_CAPACITY};

impl App {
    fn build_request(&self, session: &Session) -> GenerationRequest {
        GenerationRequest {
            user_id: session.user_id.clone(),
            messages: to_exchange(self.store.messages()),
            template: self.templates.select(&self.template),
            model: self.model.clone(),
            config: self.model_config.clone(),
        }
    }

    /// Spawn a generation run over the current log.
    pub(crate) fn start_generation(&mut self, session: &Session) {
        let request = self.build_request(session);
        let (tx, rx) = mpsc::channel(STREAM_EVENT_CHANNEL_CAPACITY);
        let (abort_handle, abort_registration) = AbortHandle::new_pair();

        let task = self.collaborators.generator.generate(request, tx);
        tokio::spawn(async move {
            let _ = Abortable::new(task, abort_registration).await;
        });

        tracing::info!(
            messages = self.store.len(),
            model = %self.model.id,
            template = %self.template,
            "Generation started"
        );
        self.state = OperationState::Generating(ActiveGeneration::new(rx, abort_handle));
    }

    /// Drain pending collaborator events with the default budget.
    pub fn process_events(&mut self) -> usize {
        self.process_events_with_budget(DEFAULT_STREAM_EVENT_BUDGET)
    }

    /// Drain at most `max_events` generation events, then poll a pending
    /// execution once. Returns how many events were handled.
    pub fn process_events_with_budget(&mut self, max_events: usize) -> usize {
        let mut processed = self.process_generation_events(max_events);
        if self.poll_execution() {
            processed += 1;
        }
        processed
    }

    fn process_generation_events(&mut self, max_events: usize) -> usize {
        let mut processed = 0usize;

        while processed < max_events {
            let OperationState::Generating(active) = &mut self.state else {
                break;
            };

            let event = match active.rx.try_recv() {
                Ok(event) => event,
                Err(mpsc::error::TryRecvError::Empty) => break,
                Err(mpsc::error::TryRecvError::Disconnected) => {
                    tracing::warn!("Generation channel disconnected");
                    GenerationEvent::Error("stream disconnected".to_string())
                }
            };
            processed += 1;

            match event {
                GenerationEvent::Snapshot(fragment) => self.apply_snapshot(fragment),
                GenerationEvent::Done => self.finish_generation(StreamFinishReason::Done),
                GenerationEvent::Error(err) => {
                    self.finish_generation(StreamFinishReason::Error(err));
                }
            }
        }

        processed
    }

    fn apply_snapshot(&mut self, fragment: Fragment) {
        let outcome = fold_snapshot(&mut self.store, &fragment);
        let Some(index) = outcome.index() else {
            return;
        };
        tracing::debug!(?outcome, "Folded snapshot");

        self.preview.set_fragment(fragment.clone());
        if let OperationState::Generating(active) = &mut self.state {
            active.assistant_index.get_or_insert(index);
            active.latest = Some(fragment);
        }
    }

    pub(crate) fn finish_generation(&mut self, finish_reason: StreamFinishReason) {
        let active = match self.replace_with_idle() {
            OperationState::Generating(active) => active,
            other => {
                self.state = other;
                return;
            }
        };

        let ActiveGeneration {
            abort_handle,
            assistant_index,
            latest,
            ..
        } = active;
        abort_handle.abort();

        match finish_reason {
            StreamFinishReason::Error(err) => {
                tracing::warn!("Generation failed: {err}");
                self.state = OperationState::Error(format_generation_error(&err));
            }
            StreamFinishReason::Done => match latest.zip(assistant_index) {
                Some((fragment, index)) => self.start_execution(fragment, index),
                None => tracing::info!("Generation finished without a fragment"),
            },
        }
    }

    fn start_execution(&mut self, fragment: Fragment, assistant_index: usize) {
        let Some(session) = self.session.as_ref() else {
            tracing::warn!("Skipping execution: not signed in");
            return;
        };
        let request = SandboxRequest {
            fragment: fragment.clone(),
            user_id: session.user_id.clone(),
            api_key: session.api_key.clone(),
        };

        let (tx, rx) = oneshot::channel();
        let (abort_handle, abort_registration) = AbortHandle::new_pair();
        let task = self.collaborators.sandbox.execute(request);
        tokio::spawn(async move {
            let _ = Abortable::new(
                async move {
                    let _ = tx.send(task.await);
                },
                abort_registration,
            )
            .await;
        });

        tracing::info!(
            template = fragment.template.as_deref().unwrap_or(""),
            "Execution started"
        );
        self.last_sandbox_error = None;
        self.state = OperationState::Executing(ActiveExecution {
            fragment,
            rx,
            abort_handle,
            assistant_index,
        });
    }

    /// Returns true if the execution finished during this poll.
    fn poll_execution(&mut self) -> bool {
        let OperationState::Executing(active) = &mut self.state else {
            return false;
        };
        let outcome = match active.rx.try_recv() {
            Ok(outcome) => outcome,
            Err(oneshot::error::TryRecvError::Empty) => return false,
            Err(oneshot::error::TryRecvError::Closed) => Err(SandboxError::Transport(
                "execution ended without a result".to_string(),
            )),
        };
        let OperationState::Executing(active) = self.replace_with_idle() else {
            return false;
        };
        let ActiveExecution {
            fragment,
            assistant_index,
            ..
        } = active;

        match outcome {
            Ok(result) => {
                tracing::info!(url = result.url().unwrap_or(""), "Execution finished");
                self.preview
                    .set_preview(Some(fragment), Some(result.clone()));
                if let Err(e) = self.store.update_at(
                    MessagePosition::Index(assistant_index),
                    MessagePatch::result(result),
                ) {
                    tracing::warn!("Could not attach execution result: {e}");
                }
                self.current_tab = PreviewTab::Fragment;
            }
            Err(err) => {
                tracing::warn!("Execution failed: {err}");
                self.preview.set_preview(Some(fragment), None);
                self.last_sandbox_error = Some(err);
            }
        }
        true
    }
}
