//! Error types for the install module.

use std::path::PathBuf;
use thiserror::Error;

use super::state::DownloadState;
use super::types::Tool;

/// Errors from binary resolution, downloads and archive extraction.
#[derive(Debug, Error)]
pub enum InstallError {
    /// No tier produced a usable binary.
    #[error("No usable {tool} binary found (checked managed, local and PATH)")]
    NotResolved { tool: Tool },

    /// A required setting is missing.
    #[error("Install configuration error: {reason}")]
    NotConfigured { reason: String },

    /// The version cannot be used as a directory name.
    #[error("Invalid version '{version}': expected a single directory name")]
    InvalidVersion { version: String },

    /// The binary did not answer a version query.
    #[error("Version probe failed for {path}: {reason}")]
    VersionProbe { path: PathBuf, reason: String },

    /// Opening or reading the download source failed.
    #[error("Download failed: {reason}")]
    Network { reason: String },

    /// No data arrived within the configured timeout.
    #[error("Download stalled for {timeout_secs} seconds")]
    Timeout { timeout_secs: u64 },

    /// The body ended before the announced length.
    #[error("Download truncated: received {received} of {expected} bytes")]
    Truncated { received: u64, expected: u64 },

    /// The body does not match the expected digest.
    #[error("Checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    /// The archive could not be expanded.
    #[error("Extraction failed: {reason}")]
    Extraction { reason: String },

    /// A job was asked to do something its state does not allow.
    #[error("Invalid download state transition from {from} to {to}")]
    InvalidTransition {
        from: DownloadState,
        to: DownloadState,
    },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl InstallError {
    pub fn network(reason: impl Into<String>) -> Self {
        Self::Network {
            reason: reason.into(),
        }
    }

    pub fn extraction(reason: impl Into<String>) -> Self {
        Self::Extraction {
            reason: reason.into(),
        }
    }

    pub fn not_configured(reason: impl Into<String>) -> Self {
        Self::NotConfigured {
            reason: reason.into(),
        }
    }

    pub fn version_probe(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::VersionProbe {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Whether the caller should be prompted to fix settings.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::NotResolved { .. } | Self::NotConfigured { .. } | Self::InvalidVersion { .. }
        )
    }

    /// Whether retrying the same download may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Network { .. } | Self::Timeout { .. } | Self::Truncated { .. }
        )
    }
}

impl From<reqwest::Error> for InstallError {
    fn from(e: reqwest::Error) -> Self {
        Self::network(e.to_string())
    }
}

impl From<zip::result::ZipError> for InstallError {
    fn from(e: zip::result::ZipError) -> Self {
        Self::extraction(e.to_string())
    }
}
