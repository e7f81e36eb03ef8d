//! Types for the transcoder module.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::command::TranscodeCommand;
use crate::progress::ProgressSample;

/// A transcode request.
#[derive(Debug, Clone)]
pub struct TranscodeJob {
    /// Caller-chosen identifier echoed in progress and results.
    pub job_id: String,
    /// Command to run; the binary and progress flags are added by the transcoder.
    pub command: TranscodeCommand,
    /// Total input duration, when the caller already knows it.
    pub total_duration: Option<Duration>,
    /// Cancelling this token terminates the running tool.
    pub cancel: Option<CancellationToken>,
}

impl TranscodeJob {
    pub fn new(job_id: impl Into<String>, command: TranscodeCommand) -> Self {
        Self {
            job_id: job_id.into(),
            command,
            total_duration: None,
            cancel: None,
        }
    }

    /// Skips probing by supplying the input duration.
    pub fn with_total_duration(mut self, duration: Duration) -> Self {
        self.total_duration = Some(duration);
        self
    }

    /// Attaches a cancellation token.
    pub fn with_cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }
}

/// Result of a successful transcode.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscodeResult {
    pub job_id: String,
    pub output_path: PathBuf,
    pub output_size_bytes: u64,
    /// Wall-clock run time in milliseconds.
    pub duration_ms: u64,
    /// Progress blocks parsed during the run.
    pub progress_samples: usize,
    /// Whether the tool closed its progress output with an end block.
    #[serde(default)]
    pub finished: bool,
}

/// Progress update during a transcode.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscodeProgress {
    pub job_id: String,
    #[serde(flatten)]
    pub sample: ProgressSample,
}

impl TranscodeProgress {
    /// Completion percentage (0.0 - 100.0), when known.
    pub fn percent(&self) -> Option<f64> {
        self.sample.percent()
    }
}
