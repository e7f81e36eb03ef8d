//! Trait definitions for the transcoder module.

use async_trait::async_trait;
use std::path::Path;
use tokio::sync::mpsc;

use super::error::TranscoderError;
use super::types::{TranscodeJob, TranscodeProgress, TranscodeResult};
use crate::command::MediaInfo;

/// Something that can run transcode jobs.
#[async_trait]
pub trait Transcoder: Send + Sync {
    /// Returns the name of this transcoder implementation.
    fn name(&self) -> &str;

    /// Probes a media file to get its information.
    async fn probe(&self, path: &Path) -> Result<MediaInfo, TranscoderError>;

    /// Runs a job to completion.
    async fn transcode(&self, job: TranscodeJob) -> Result<TranscodeResult, TranscoderError>;

    /// Runs a job, reporting progress.
    ///
    /// Updates are dropped rather than awaited when the receiver lags; a
    /// dropped receiver does not stop the job.
    async fn transcode_with_progress(
        &self,
        job: TranscodeJob,
        progress_tx: mpsc::Sender<TranscodeProgress>,
    ) -> Result<TranscodeResult, TranscoderError>;

    /// Validates that the required tools are available.
    async fn validate(&self) -> Result<(), TranscoderError>;
}
