//! Configuration for the process runner.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for [`ProcessRunner`](super::ProcessRunner).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunnerConfig {
    /// Upper bound for one write to the process input channel, in milliseconds.
    #[serde(default = "default_stdin_write_timeout")]
    pub stdin_write_timeout_ms: u64,

    /// How long to keep draining output after the process exited, in milliseconds.
    ///
    /// Only matters when a grandchild keeps a pipe open after the direct
    /// child is gone.
    #[serde(default = "default_drain_timeout")]
    pub drain_timeout_ms: u64,
}

fn default_stdin_write_timeout() -> u64 {
    5_000
}

fn default_drain_timeout() -> u64 {
    10_000
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            stdin_write_timeout_ms: default_stdin_write_timeout(),
            drain_timeout_ms: default_drain_timeout(),
        }
    }
}

impl RunnerConfig {
    /// Stdin write timeout as a [`Duration`].
    pub fn stdin_write_timeout(&self) -> Duration {
        Duration::from_millis(self.stdin_write_timeout_ms)
    }

    /// Drain timeout as a [`Duration`].
    pub fn drain_timeout(&self) -> Duration {
        Duration::from_millis(self.drain_timeout_ms)
    }
}
