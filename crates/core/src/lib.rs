pub mod command;
pub mod config;
pub mod install;
pub mod process;
pub mod progress;
pub mod project;
pub mod testing;
pub mod transcoder;

pub use command::{
    AudioCodec, CommandError, Filter, MediaInfo, PresetTier, ProbeCommand, StreamType,
    TranscodeCommand, VideoCodec,
};
pub use config::{load_config, load_config_from_str, validate_config, Config, ConfigError};
pub use install::{
    install_managed, DownloadConfig, DownloadEvent, DownloadHandle, DownloadJob, DownloadSource,
    DownloadState, DownloadStatus, HttpSource, InstallError, InstallRecord, InstallSource, Tool,
    ToolResolver, ToolsConfig,
};
pub use process::{ProcessError, ProcessExit, ProcessHandle, ProcessHandlers, ProcessRunner, RunnerConfig};
pub use progress::{ProgressParser, ProgressSample};
pub use project::{ProjectError, ProjectFile};
pub use transcoder::{
    FfmpegTranscoder, TranscodeJob, TranscodeProgress, TranscodeResult, Transcoder,
    TranscoderConfig, TranscoderError,
};
