//! Mock transcoder for testing.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, RwLock};

use crate::command::MediaInfo;
use crate::progress::ProgressSample;
use crate::transcoder::{
    TranscodeJob, TranscodeProgress, TranscodeResult, Transcoder, TranscoderError,
};

/// A recorded transcode job for test assertions.
#[derive(Debug, Clone)]
pub struct RecordedTranscode {
    pub job: TranscodeJob,
    pub success: bool,
}

/// Mock implementation of the [`Transcoder`] trait.
///
/// Records submitted jobs, returns configurable probe results, injects
/// one-shot errors and emits evenly spaced progress samples.
///
/// # Example
///
/// ```rust,ignore
/// use clipforge_core::testing::MockTranscoder;
///
/// let transcoder = MockTranscoder::new();
/// transcoder.set_run_duration(Duration::ZERO).await;
///
/// let result = transcoder.transcode(job).await?;
/// assert_eq!(transcoder.transcode_count().await, 1);
/// ```
#[derive(Debug)]
pub struct MockTranscoder {
    transcodes: Arc<RwLock<Vec<RecordedTranscode>>>,
    probe_results: Arc<RwLock<HashMap<PathBuf, MediaInfo>>>,
    /// If set, the next operation fails with this error.
    next_error: Arc<RwLock<Option<TranscoderError>>>,
    run_duration_ms: Arc<RwLock<u64>>,
    progress_steps: Arc<RwLock<u32>>,
}

impl Default for MockTranscoder {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTranscoder {
    pub fn new() -> Self {
        Self {
            transcodes: Arc::new(RwLock::new(Vec::new())),
            probe_results: Arc::new(RwLock::new(HashMap::new())),
            next_error: Arc::new(RwLock::new(None)),
            run_duration_ms: Arc::new(RwLock::new(100)),
            progress_steps: Arc::new(RwLock::new(5)),
        }
    }

    pub async fn recorded_transcodes(&self) -> Vec<RecordedTranscode> {
        self.transcodes.read().await.clone()
    }

    pub async fn transcode_count(&self) -> usize {
        self.transcodes.read().await.len()
    }

    pub async fn clear_recorded(&self) {
        self.transcodes.write().await.clear();
    }

    /// Set a probe result for a specific path.
    pub async fn set_probe_result(&self, path: impl AsRef<Path>, info: MediaInfo) {
        self.probe_results
            .write()
            .await
            .insert(path.as_ref().to_path_buf(), info);
    }

    /// Configure the next operation to fail with the given error.
    pub async fn set_next_error(&self, error: TranscoderError) {
        *self.next_error.write().await = Some(error);
    }

    /// Set the simulated run time.
    pub async fn set_run_duration(&self, duration: Duration) {
        *self.run_duration_ms.write().await = duration.as_millis() as u64;
    }

    /// Number of progress samples emitted per run; zero disables progress.
    pub async fn set_progress_steps(&self, steps: u32) {
        *self.progress_steps.write().await = steps;
    }

    async fn take_error(&self) -> Option<TranscoderError> {
        self.next_error.write().await.take()
    }

    fn default_info(path: &Path) -> MediaInfo {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("unknown");
        let is_video = matches!(extension, "mkv" | "mp4" | "avi" | "mov" | "webm");

        MediaInfo {
            path: path.to_path_buf(),
            size_bytes: 100 * 1024 * 1024,
            duration_secs: if is_video { 600.0 } else { 180.0 },
            format: extension.to_string(),
            video_codec: is_video.then(|| "h264".to_string()),
            video_width: is_video.then_some(1920),
            video_height: is_video.then_some(1080),
            video_fps: is_video.then_some(24.0),
            audio_codec: Some("aac".to_string()),
            audio_bitrate_kbps: Some(192),
            audio_sample_rate: Some(48000),
            audio_channels: Some(2),
        }
    }

    async fn run(
        &self,
        job: TranscodeJob,
        progress_tx: Option<mpsc::Sender<TranscodeProgress>>,
    ) -> Result<TranscodeResult, TranscoderError> {
        if let Some(err) = self.take_error().await {
            self.transcodes.write().await.push(RecordedTranscode {
                job,
                success: false,
            });
            return Err(err);
        }

        // Same up-front validation as a real run.
        job.command.fragments()?;
        let output_path = job
            .command
            .output_path()
            .map(Path::to_path_buf)
            .unwrap_or_default();

        let duration_ms = *self.run_duration_ms.read().await;
        let steps = *self.progress_steps.read().await;
        let cancel = job.cancel.clone().unwrap_or_default();
        let mut emitted = 0;

        if steps > 0 {
            let step = Duration::from_millis(duration_ms / steps as u64);
            for i in 1..=steps {
                tokio::select! {
                    _ = tokio::time::sleep(step) => {}
                    _ = cancel.cancelled() => {
                        self.transcodes.write().await.push(RecordedTranscode {
                            job,
                            success: false,
                        });
                        return Err(TranscoderError::Cancelled);
                    }
                }
                let fraction = i as f64 / steps as f64;
                if let Some(tx) = &progress_tx {
                    let update = TranscodeProgress {
                        job_id: job.job_id.clone(),
                        sample: ProgressSample {
                            elapsed: step * i,
                            fraction: Some(fraction),
                            frame: Some(i as u64 * 24),
                            fps: Some(24.0),
                            bitrate_kbps: None,
                            total_size: None,
                            speed: Some(10.0),
                            finished: i == steps,
                        },
                    };
                    // Like the real transcoder, only the end sample waits for space.
                    if i == steps {
                        let _ = tx.send(update).await;
                    } else {
                        let _ = tx.try_send(update);
                    }
                }
                emitted += 1;
            }
        } else if duration_ms > 0 {
            tokio::time::sleep(Duration::from_millis(duration_ms)).await;
        }

        self.transcodes.write().await.push(RecordedTranscode {
            job: job.clone(),
            success: true,
        });

        Ok(TranscodeResult {
            job_id: job.job_id,
            output_path,
            output_size_bytes: 50 * 1024 * 1024,
            duration_ms,
            progress_samples: emitted,
            finished: emitted > 0,
        })
    }
}

#[async_trait]
impl Transcoder for MockTranscoder {
    fn name(&self) -> &str {
        "mock"
    }

    async fn probe(&self, path: &Path) -> Result<MediaInfo, TranscoderError> {
        if let Some(err) = self.take_error().await {
            return Err(err);
        }
        if let Some(info) = self.probe_results.read().await.get(path) {
            return Ok(info.clone());
        }
        Ok(Self::default_info(path))
    }

    async fn transcode(&self, job: TranscodeJob) -> Result<TranscodeResult, TranscoderError> {
        self.run(job, None).await
    }

    async fn transcode_with_progress(
        &self,
        job: TranscodeJob,
        progress_tx: mpsc::Sender<TranscodeProgress>,
    ) -> Result<TranscodeResult, TranscoderError> {
        self.run(job, Some(progress_tx)).await
    }

    async fn validate(&self) -> Result<(), TranscoderError> {
        if let Some(err) = self.take_error().await {
            return Err(err);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::TranscodeCommand;
    use tokio_util::sync::CancellationToken;

    fn job(id: &str) -> TranscodeJob {
        TranscodeJob::new(
            id,
            TranscodeCommand::new()
                .input("/input/clip.mkv")
                .output("/output/clip.mp4"),
        )
    }

    #[tokio::test]
    async fn test_basic_transcode() {
        let transcoder = MockTranscoder::new();
        transcoder.set_run_duration(Duration::ZERO).await;

        let result = transcoder.transcode(job("test-1")).await.unwrap();
        assert_eq!(result.job_id, "test-1");
        assert_eq!(result.output_path, PathBuf::from("/output/clip.mp4"));
        assert_eq!(transcoder.transcode_count().await, 1);
    }

    #[tokio::test]
    async fn test_probe_default_and_custom() {
        let transcoder = MockTranscoder::new();
        let info = transcoder.probe(Path::new("/a/video.mkv")).await.unwrap();
        assert_eq!(info.video_width, Some(1920));

        let mut custom = info.clone();
        custom.duration_secs = 42.0;
        transcoder.set_probe_result("/a/video.mkv", custom).await;
        let info = transcoder.probe(Path::new("/a/video.mkv")).await.unwrap();
        assert_eq!(info.duration_secs, 42.0);
    }

    #[tokio::test]
    async fn test_error_injection_is_one_shot() {
        let transcoder = MockTranscoder::new();
        transcoder.set_run_duration(Duration::ZERO).await;
        transcoder
            .set_next_error(TranscoderError::failed(Some(1), "boom"))
            .await;

        assert!(transcoder.transcode(job("fail")).await.is_err());
        assert!(transcoder.transcode(job("ok")).await.is_ok());

        let recorded = transcoder.recorded_transcodes().await;
        assert!(!recorded[0].success);
        assert!(recorded[1].success);
    }

    #[tokio::test]
    async fn test_incomplete_job_rejected() {
        let transcoder = MockTranscoder::new();
        let err = transcoder
            .transcode(TranscodeJob::new("bad", TranscodeCommand::new()))
            .await
            .unwrap_err();
        assert!(err.is_configuration());
    }

    #[tokio::test]
    async fn test_progress_updates() {
        let transcoder = MockTranscoder::new();
        transcoder.set_run_duration(Duration::from_millis(20)).await;
        transcoder.set_progress_steps(4).await;
        let (tx, mut rx) = mpsc::channel(10);

        let result = transcoder
            .transcode_with_progress(job("progress"), tx)
            .await
            .unwrap();
        assert_eq!(result.progress_samples, 4);
        assert!(result.finished);

        let mut last = None;
        while let Some(update) = rx.recv().await {
            last = Some(update);
        }
        let last = last.unwrap();
        assert!(last.sample.finished);
        assert_eq!(last.percent(), Some(100.0));
    }

    #[tokio::test]
    async fn test_cancel() {
        let transcoder = MockTranscoder::new();
        transcoder.set_run_duration(Duration::from_secs(10)).await;
        let token = CancellationToken::new();
        token.cancel();

        let err = transcoder
            .transcode(job("cancel").with_cancel_token(token))
            .await
            .unwrap_err();
        assert!(matches!(err, TranscoderError::Cancelled));
    }
}
