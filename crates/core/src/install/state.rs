//! Download job state machine.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of a [`DownloadJob`](super::DownloadJob).
///
/// `Done`, `Canceled` and `Failed` are terminal: once reached, no further
/// transition is accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DownloadState {
    Idle,
    Running,
    Paused,
    Extracting,
    Done,
    Canceled,
    Failed,
}

impl DownloadState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Extracting => "extracting",
            Self::Done => "done",
            Self::Canceled => "canceled",
            Self::Failed => "failed",
        }
    }

    /// Whether no further transition is possible.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Canceled | Self::Failed)
    }

    /// Whether `self -> next` is a legal transition.
    pub fn can_transition_to(&self, next: DownloadState) -> bool {
        use DownloadState::*;
        matches!(
            (self, next),
            (Idle, Running)
                | (Idle, Canceled)
                | (Running, Paused)
                | (Running, Extracting)
                | (Running, Canceled)
                | (Running, Failed)
                | (Paused, Running)
                | (Paused, Canceled)
                | (Paused, Failed)
                | (Extracting, Done)
                | (Extracting, Canceled)
                | (Extracting, Failed)
        )
    }
}

impl fmt::Display for DownloadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}
