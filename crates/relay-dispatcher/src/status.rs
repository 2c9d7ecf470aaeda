//! Commit states understood by the code-review host.

use relay_core::BuildStatus;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommitState {
    Pending,
    Failure,
    Error,
    Success,
}

impl CommitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommitState::Pending => "pending",
            CommitState::Failure => "failure",
            CommitState::Error => "error",
            CommitState::Success => "success",
        }
    }

    /// State to report for a finished build.
    ///
    /// Only a `success` trigger is reported as success. Every other trigger,
    /// `error` and `unhandledRejection` included, is reported as failure.
    pub fn for_build(status: &BuildStatus) -> Self {
        if status.is_success() {
            CommitState::Success
        } else {
            CommitState::Failure
        }
    }
}

impl fmt::Display for CommitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
