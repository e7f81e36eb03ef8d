use serde::{Deserialize, Serialize};

use crate::install::{DownloadConfig, ToolsConfig};
use crate::process::RunnerConfig;
use crate::transcoder::TranscoderConfig;

/// Root configuration
///
/// Every section is optional; a missing section takes its defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub tools: ToolsConfig,
    #[serde(default)]
    pub download: DownloadConfig,
    #[serde(default)]
    pub runner: RunnerConfig,
    #[serde(default)]
    pub transcoder: TranscoderConfig,
}
