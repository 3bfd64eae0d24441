//! Operating states of the task loop and the status updates it publishes.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Coarse loop state. Selects the backoff cadence for the next sleep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperatingState {
    Idle,
    WaitingApprover,
    ErrorAuth,
    ErrorQuota,
    ErrorNetwork,
    ErrorUnknown,
}

impl OperatingState {
    /// Stable upper-case name, as shown to operators.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "IDLE",
            Self::WaitingApprover => "WAITING_APPROVER",
            Self::ErrorAuth => "ERROR_AUTH",
            Self::ErrorQuota => "ERROR_QUOTA",
            Self::ErrorNetwork => "ERROR_NETWORK",
            Self::ErrorUnknown => "ERROR_UNKNOWN",
        }
    }

    /// True for the four error states.
    pub fn is_error(self) -> bool {
        matches!(
            self,
            Self::ErrorAuth | Self::ErrorQuota | Self::ErrorNetwork | Self::ErrorUnknown
        )
    }
}

impl fmt::Display for OperatingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Published on every state transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusUpdate {
    pub state: OperatingState,
    pub message: String,
}

impl StatusUpdate {
    pub fn new(state: OperatingState, message: impl Into<String>) -> Self {
        Self {
            state,
            message: message.into(),
        }
    }
}

/// First eight characters of a task id, for status messages.
pub(crate) fn short_id(task_id: &str) -> &str {
    match task_id.char_indices().nth(8) {
        Some((idx, _)) => &task_id[..idx],
        None => task_id,
    }
}
