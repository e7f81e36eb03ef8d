//! Types for the progress module.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// One structured progress report, derived from one progress block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressSample {
    /// Output time written so far.
    pub elapsed: Duration,
    /// Completion in `[0, 1]`, when the total input duration is known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fraction: Option<f64>,
    /// Frames written so far.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frame: Option<u64>,
    /// Instantaneous frame rate.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fps: Option<f64>,
    /// Instantaneous output bitrate in kbit/s.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bitrate_kbps: Option<f64>,
    /// Bytes written so far.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_size: Option<u64>,
    /// Encoding speed relative to real time (1.0 = real time).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speed: Option<f64>,
    /// Whether this is the final block of the run.
    pub finished: bool,
}

impl ProgressSample {
    /// Completion as a percentage, when known.
    pub fn percent(&self) -> Option<f64> {
        self.fraction.map(|f| f * 100.0)
    }
}
