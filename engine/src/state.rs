//! Operation state machine types.

use futures_util::future::AbortHandle;
use tokio::sync::{mpsc, oneshot};

use kiln_providers::SandboxError;
use kiln_types::{ExecutionResult, Fragment, GenerationEvent};

pub(crate) type ExecutionOutcome = Result<ExecutionResult, SandboxError>;

/// A generation run in flight.
#[derive(Debug)]
pub(crate) struct ActiveGeneration {
    pub(crate) rx: mpsc::Receiver<GenerationEvent>,
    pub(crate) abort_handle: AbortHandle,
    /// Message this run has written to, once a snapshot was folded.
    pub(crate) assistant_index: Option<usize>,
    pub(crate) latest: Option<Fragment>,
}

impl ActiveGeneration {
    pub(crate) fn new(rx: mpsc::Receiver<GenerationEvent>, abort_handle: AbortHandle) -> Self {
        Self {
            rx,
            abort_handle,
            assistant_index: None,
            latest: None,
        }
    }
}

/// A sandbox execution in flight.
#[derive(Debug)]
pub(crate) struct ActiveExecution {
    pub(crate) fragment: Fragment,
    pub(crate) rx: oneshot::Receiver<ExecutionOutcome>,
    pub(crate) abort_handle: AbortHandle,
    pub(crate) assistant_index: usize,
}

#[derive(Debug, Default)]
pub(crate) enum OperationState {
    #[default]
    Idle,
    Generating(ActiveGeneration),
    Executing(ActiveExecution),
    /// The last run failed; holds the formatted message.
    Error(String),
}

impl OperationState {
    pub(crate) fn phase(&self) -> Phase {
        match self {
            OperationState::Idle => Phase::Idle,
            OperationState::Generating(_) => Phase::Generating,
            OperationState::Executing(_) => Phase::Executing,
            OperationState::Error(_) => Phase::Error,
        }
    }
}

/// Observable summary of [`OperationState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Generating,
    Executing,
    Error,
}

impl Phase {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Phase::Idle => "idle",
            Phase::Generating => "generating",
            Phase::Executing => "executing",
            Phase::Error => "error",
        }
    }

    #[must_use]
    pub const fn is_busy(self) -> bool {
        matches!(self, Phase::Generating | Phase::Executing)
    }
}
