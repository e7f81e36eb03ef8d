//! End-to-end transcoding: resolve the binary, build the command, run it,
//! and turn its error stream into progress.
//!
//! Implementations sit behind the [`Transcoder`] trait so callers (and tests)
//! can swap in [`MockTranscoder`](crate::testing::MockTranscoder).

mod config;
mod error;
mod ffmpeg;
mod traits;
mod types;

pub use config::TranscoderConfig;
pub use error::TranscoderError;
pub use ffmpeg::FfmpegTranscoder;
pub use traits::Transcoder;
pub use types::{TranscodeJob, TranscodeProgress, TranscodeResult};
