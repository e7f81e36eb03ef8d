//! Configuration for the transcoder module.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for [`FfmpegTranscoder`](super::FfmpegTranscoder).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscoderConfig {
    /// Tool log level (quiet, panic, fatal, error, warning, info, verbose, debug, trace).
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Additional global arguments placed before the inputs.
    #[serde(default)]
    pub extra_args: Vec<String>,

    /// Timeout for a single transcode in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Error-stream lines kept for failure reports.
    #[serde(default = "default_stderr_tail")]
    pub stderr_tail_lines: usize,
}

fn default_log_level() -> String {
    "warning".to_string()
}

fn default_timeout() -> u64 {
    3600 // 1 hour
}

fn default_stderr_tail() -> usize {
    20
}

impl Default for TranscoderConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            extra_args: Vec::new(),
            timeout_secs: default_timeout(),
            stderr_tail_lines: default_stderr_tail(),
        }
    }
}

impl TranscoderConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}
