//! What the preview pane is showing.

use serde::{Deserialize, Serialize};

use crate::{ExecutionResult, Fragment};

/// The fragment on display and its execution result, if any.
///
/// Both halves are set and cleared together by the preview synchronizer; a
/// result is never shown without the fragment that produced it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Preview {
    pub fragment: Option<Fragment>,
    pub result: Option<ExecutionResult>,
}

impl Preview {
    #[must_use]
    pub fn new(fragment: Option<Fragment>, result: Option<ExecutionResult>) -> Self {
        Self { fragment, result }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fragment.is_none() && self.result.is_none()
    }
}

/// Which face of the preview pane is selected.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PreviewTab {
    /// Source of the fragment.
    #[default]
    Code,
    /// Rendered execution result.
    Fragment,
}

impl PreviewTab {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            PreviewTab::Code => "code",
            PreviewTab::Fragment => "fragment",
        }
    }
}
