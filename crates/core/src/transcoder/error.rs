//! Error types for the transcoder module.

use thiserror::Error;

use crate::command::CommandError;
use crate::install::InstallError;
use crate::process::ProcessError;

/// Errors that can occur while probing or transcoding.
#[derive(Debug, Error)]
pub enum TranscoderError {
    /// The job is incomplete (missing input or output).
    #[error("Invalid transcode job: {0}")]
    Configuration(#[from] CommandError),

    /// A required tool could not be resolved.
    #[error("Tool unavailable: {0}")]
    ToolUnavailable(#[from] InstallError),

    /// The tool could not be started.
    #[error("Failed to start transcoder: {0}")]
    Spawn(#[from] ProcessError),

    /// The tool ran and reported failure.
    #[error("Transcode failed ({})", describe_exit(.code))]
    Failed { code: Option<i32>, stderr: String },

    /// The job was cancelled through its token.
    #[error("Transcode cancelled")]
    Cancelled,

    /// The job exceeded the configured timeout.
    #[error("Transcode timed out after {timeout_secs} seconds")]
    Timeout { timeout_secs: u64 },

    /// Probing the input failed.
    #[error("Failed to probe media file: {reason}")]
    Probe { reason: String },

    /// I/O error around the job (output directory, output metadata).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn describe_exit(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {}", code),
        None => "terminated".to_string(),
    }
}

impl TranscoderError {
    pub fn failed(code: Option<i32>, stderr: impl Into<String>) -> Self {
        Self::Failed {
            code,
            stderr: stderr.into(),
        }
    }

    pub fn probe(reason: impl Into<String>) -> Self {
        Self::Probe {
            reason: reason.into(),
        }
    }

    /// Whether the error was detected before anything ran and needs a settings fix.
    pub fn is_configuration(&self) -> bool {
        match self {
            Self::Configuration(_) => true,
            Self::ToolUnavailable(e) => e.is_configuration(),
            Self::Spawn(e) => e.is_configuration() || e.is_not_found(),
            _ => false,
        }
    }

    /// Whether this error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::Io(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::install::Tool;

    #[test]
    fn test_failed_message() {
        assert_eq!(
            TranscoderError::failed(Some(1), "boom").to_string(),
            "Transcode failed (exit code 1)"
        );
        assert_eq!(
            TranscoderError::failed(None, "").to_string(),
            "Transcode failed (terminated)"
        );
    }

    #[test]
    fn test_classification() {
        assert!(TranscoderError::from(CommandError::MissingOutput).is_configuration());
        assert!(TranscoderError::from(InstallError::NotResolved { tool: Tool::Ffmpeg })
            .is_configuration());
        assert!(!TranscoderError::Cancelled.is_configuration());
        assert!(TranscoderError::Timeout { timeout_secs: 1 }.is_retryable());
    }
}
