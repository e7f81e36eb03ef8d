//! Command construction for the external transcoder and probe tools.
//!
//! A command is composed from independent fragments (inputs, filters,
//! per-stream codec/bitrate selection, presets, skip flags) that may be set
//! in any order. Serialization applies the tool's ordering rules so the
//! resulting argument vector is always well formed and deterministic.
//!
//! # Example
//!
//! ```ignore
//! use clipforge_core::command::{AudioCodec, PresetTier, StreamType, TranscodeCommand, VideoCodec};
//!
//! let argv = TranscodeCommand::new()
//!     .overwrite()
//!     .with_progress()
//!     .input("/media/input.mkv")
//!     .video_codec(VideoCodec::HevcNvenc)
//!     .preset(PresetTier::Slow)
//!     .audio_codec(AudioCodec::Opus)
//!     .bitrate(StreamType::Audio, "128k")
//!     .output("/media/output.mkv")
//!     .build(&ffmpeg_path)?;
//! ```

mod builder;
mod error;
mod fragment;
mod preset;
mod probe;
mod types;

pub use builder::{StreamSettings, TranscodeCommand};
pub use error::CommandError;
pub use fragment::{render_filter_graph, CommandContext, Filter, Fragment, FILTER_GRAPH_SEPARATOR};
pub use preset::{resolve_preset, PresetTier};
pub use probe::{parse_probe_output, MediaInfo, ProbeCommand};
pub use types::{AudioCodec, CodecFamily, StreamType, VideoCodec};
