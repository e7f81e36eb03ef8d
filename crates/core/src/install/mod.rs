//! Binary resolution and managed installs.
//!
//! [`ToolResolver`] decides which binary runs for each [`Tool`]: a managed
//! install of the recorded default version, then a user-registered local
//! directory, then the system `PATH`. [`DownloadJob`] fetches and expands a
//! zip package with pause and cancel support; [`install_managed`] wires the
//! two together.

mod config;
mod download;
mod error;
mod extract;
mod managed;
mod resolver;
mod source;
mod state;
mod types;
mod version;

pub use config::{is_valid_version_dir, DownloadConfig, ToolsConfig};
pub use download::{CompletionHook, DownloadEvent, DownloadHandle, DownloadJob, DownloadPhase, DownloadStatus};
pub use error::InstallError;
pub use extract::{extract_zip, Extraction};
pub use managed::install_managed;
pub use resolver::ToolResolver;
pub use source::{DownloadSource, HttpSource, SourceStream};
pub use state::DownloadState;
pub use types::{InstallRecord, InstallSource, Tool};
pub use version::{parse_version_line, probe_version, VERSION_FLAGS};
