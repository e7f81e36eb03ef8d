//! Configuration for binary resolution and downloads.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use super::types::Tool;

/// Where to look for the external tools.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Default managed version of the transcoder.
    #[serde(default)]
    pub ffmpeg_version: Option<String>,

    /// Default managed version of the prober.
    #[serde(default)]
    pub ffprobe_version: Option<String>,

    /// User-registered install directory (binaries in it or in its `bin/`).
    #[serde(default)]
    pub local_root: Option<PathBuf>,

    /// Root of downloaded installs: `<managed_root>/<tool>/<version>/`.
    #[serde(default)]
    pub managed_root: Option<PathBuf>,
}

impl ToolsConfig {
    /// Recorded default managed version for `tool`.
    pub fn default_version(&self, tool: Tool) -> Option<&str> {
        match tool {
            Tool::Ffmpeg => self.ffmpeg_version.as_deref(),
            Tool::Ffprobe => self.ffprobe_version.as_deref(),
        }
    }

    /// Directory of one managed version, if a managed root is configured.
    ///
    /// Callers check [`is_valid_version_dir`] first; `version` is joined as is.
    pub fn managed_dir(&self, tool: Tool, version: &str) -> Option<PathBuf> {
        self.managed_root
            .as_ref()
            .map(|root| root.join(tool.as_str()).join(version))
    }
}

/// Whether `version` names a single directory below `<managed_root>/<tool>/`.
///
/// Rejects empty names, names starting with `.` (hidden, `.` and `..`) and
/// anything containing a path separator.
pub fn is_valid_version_dir(version: &str) -> bool {
    !version.is_empty() && !version.starts_with('.') && !version.contains(['/', '\\'])
}

/// Download job tuning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadConfig {
    /// Largest slice written to disk between state checks, in bytes.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// How often a paused job re-checks its state, in milliseconds.
    #[serde(default = "default_pause_poll_ms")]
    pub pause_poll_ms: u64,

    /// How long the source may stay silent before the job fails, in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Lowercase hex SHA-256 the body must match.
    #[serde(default)]
    pub expected_sha256: Option<String>,
}

fn default_chunk_size() -> usize {
    64 * 1024
}

fn default_pause_poll_ms() -> u64 {
    100
}

fn default_timeout_secs() -> u64 {
    30
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            pause_poll_ms: default_pause_poll_ms(),
            timeout_secs: default_timeout_secs(),
            expected_sha256: None,
        }
    }
}

impl DownloadConfig {
    pub fn pause_poll_interval(&self) -> Duration {
        Duration::from_millis(self.pause_poll_ms.max(1))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Sets the digest the downloaded body must match.
    pub fn with_sha256(mut self, digest: impl Into<String>) -> Self {
        self.expected_sha256 = Some(digest.into().to_ascii_lowercase());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_version() {
        let config = ToolsConfig {
            ffmpeg_version: Some("6.1".to_string()),
            ..Default::default()
        };
        assert_eq!(config.default_version(Tool::Ffmpeg), Some("6.1"));
        assert_eq!(config.default_version(Tool::Ffprobe), None);
    }

    #[test]
    fn test_managed_dir() {
        let config = ToolsConfig {
            managed_root: Some(PathBuf::from("/opt/clipforge")),
            ..Default::default()
        };
        assert_eq!(
            config.managed_dir(Tool::Ffprobe, "7.0"),
            Some(PathBuf::from("/opt/clipforge/ffprobe/7.0"))
        );
        assert_eq!(ToolsConfig::default().managed_dir(Tool::Ffmpeg, "7.0"), None);
    }

    #[test]
    fn test_download_defaults() {
        let config: DownloadConfig = toml::from_str("chunk_size = 1024").unwrap();
        assert_eq!(config.chunk_size, 1024);
        assert_eq!(config.pause_poll_interval(), Duration::from_millis(100));
        assert_eq!(config.timeout(), Duration::from_secs(30));
    }
}
