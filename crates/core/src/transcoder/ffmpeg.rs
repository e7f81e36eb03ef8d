//! FFmpeg-based transcoder implementation.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, info, warn};

use super::config::TranscoderConfig;
use super::error::TranscoderError;
use super::traits::Transcoder;
use super::types::{TranscodeJob, TranscodeProgress, TranscodeResult};
use crate::command::{parse_probe_output, MediaInfo, ProbeCommand, TranscodeCommand};
use crate::install::{Tool, ToolResolver};
use crate::process::{ProcessExit, ProcessHandlers, ProcessRunner, RunnerConfig};
use crate::progress::ProgressParser;

/// How long the end-of-run progress update may wait for channel space.
const FINAL_PROGRESS_WAIT: Duration = Duration::from_secs(5);

/// Progress bookkeeping shared with the error-stream handler.
#[derive(Debug, Default)]
struct ProgressTally {
    samples: usize,
    finished: bool,
    /// End block that did not fit in the channel while the process ran.
    undelivered_end: Option<TranscodeProgress>,
}

/// Transcoder that drives the external ffmpeg/ffprobe tools.
#[derive(Debug, Clone)]
pub struct FfmpegTranscoder {
    resolver: Arc<ToolResolver>,
    config: TranscoderConfig,
    runner: RunnerConfig,
}

impl FfmpegTranscoder {
    /// Creates a new transcoder resolving binaries through `resolver`.
    pub fn new(resolver: Arc<ToolResolver>, config: TranscoderConfig) -> Self {
        Self {
            resolver,
            config,
            runner: RunnerConfig::default(),
        }
    }

    /// Overrides the process runner settings.
    pub fn with_runner_config(mut self, runner: RunnerConfig) -> Self {
        self.runner = runner;
        self
    }

    pub fn resolver(&self) -> &Arc<ToolResolver> {
        &self.resolver
    }

    fn runner(&self) -> ProcessRunner {
        ProcessRunner::new(self.runner.clone()).with_stdin(false)
    }

    /// Adds log level, extra arguments and progress reporting to the caller's command.
    fn prepare_command(&self, command: TranscodeCommand) -> TranscodeCommand {
        let mut command = command.global_option("-loglevel", Some(self.config.log_level.clone()));
        for arg in &self.config.extra_args {
            command = command.global_option(arg.clone(), None);
        }
        command.with_progress()
    }

    /// Input duration from the job or, failing that, from probing the first input.
    async fn total_duration(&self, job: &TranscodeJob) -> Option<Duration> {
        if job.total_duration.is_some() {
            return job.total_duration;
        }
        let input = job.command.inputs().first()?;
        match self.probe(input).await {
            Ok(info) if info.duration_secs > 0.0 => {
                Duration::try_from_secs_f64(info.duration_secs).ok()
            }
            Ok(_) => None,
            Err(e) => {
                debug!("Could not probe {} for duration: {}", input.display(), e);
                None
            }
        }
    }

    /// Runs the transcode with optional progress reporting.
    async fn run_transcode(
        &self,
        job: TranscodeJob,
        progress_tx: Option<mpsc::Sender<TranscodeProgress>>,
    ) -> Result<TranscodeResult, TranscoderError> {
        let start = Instant::now();

        // Fails before anything runs when inputs or output are missing.
        job.command.fragments()?;
        let output_path = job
            .command
            .output_path()
            .map(Path::to_path_buf)
            .ok_or(crate::command::CommandError::MissingOutput)?;

        if let Some(parent) = output_path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let ffmpeg = self.resolver.binary_path(Tool::Ffmpeg).await?;
        let total_duration = self.total_duration(&job).await;
        let argv = self.prepare_command(job.command.clone()).build(&ffmpeg)?;
        info!(
            "Starting transcode {} -> {}",
            job.job_id,
            output_path.display()
        );
        debug!("Transcode argv: {:?}", argv);

        let tail = Arc::new(Mutex::new(VecDeque::new()));
        let tally = Arc::new(Mutex::new(ProgressTally::default()));
        let final_tx = progress_tx.clone();
        let mut handlers = ProcessHandlers::new();
        {
            let mut parser = ProgressParser::new(total_duration);
            let tail = Arc::clone(&tail);
            let tally = Arc::clone(&tally);
            let tail_len = self.config.stderr_tail_lines;
            let job_id = job.job_id.clone();
            handlers.on_stderr(move |line| {
                if let Some(sample) = parser.feed_line(line) {
                    let finished = sample.finished;
                    // Intermediate samples are dropped when the consumer lags.
                    let undelivered = match &progress_tx {
                        Some(tx) => match tx.try_send(TranscodeProgress {
                            job_id: job_id.clone(),
                            sample,
                        }) {
                            Err(TrySendError::Full(update)) if finished => Some(update),
                            _ => None,
                        },
                        None => None,
                    };
                    if let Ok(mut tally) = tally.lock() {
                        tally.samples += 1;
                        tally.finished |= finished;
                        if undelivered.is_some() {
                            tally.undelivered_end = undelivered;
                        }
                    }
                } else if tail_len > 0 && !is_progress_line(line) {
                    if let Ok(mut tail) = tail.lock() {
                        if tail.len() == tail_len {
                            tail.pop_front();
                        }
                        tail.push_back(line.to_string());
                    }
                }
            });
        }

        let handle = self.runner().execute(&argv, None, handlers)?;
        let cancel = job.cancel.clone().unwrap_or_default();

        let mut timed_out = false;
        let exit = tokio::select! {
            exit = handle.wait() => exit,
            _ = cancel.cancelled() => {
                info!("Cancelling transcode {}", job.job_id);
                handle.cancel();
                handle.wait().await
            }
            _ = tokio::time::sleep(self.config.timeout()) => {
                warn!("Transcode {} timed out", job.job_id);
                timed_out = true;
                handle.cancel();
                handle.wait().await
            }
        };

        let stderr = tail
            .lock()
            .map(|lines| lines.iter().cloned().collect::<Vec<_>>().join("\n"))
            .unwrap_or_default();

        match exit {
            ProcessExit::Exited(0) => {}
            ProcessExit::Cancelled if timed_out => {
                return Err(TranscoderError::Timeout {
                    timeout_secs: self.config.timeout_secs,
                });
            }
            ProcessExit::Cancelled => return Err(TranscoderError::Cancelled),
            ProcessExit::Exited(code) => {
                warn!("Transcode {} failed with code {}", job.job_id, code);
                return Err(TranscoderError::failed(Some(code), stderr));
            }
            ProcessExit::Terminated => {
                warn!("Transcode {} was terminated", job.job_id);
                return Err(TranscoderError::failed(None, stderr));
            }
        }

        let output_size_bytes = tokio::fs::metadata(&output_path)
            .await
            .map_err(|_| TranscoderError::failed(Some(0), "Output file not created"))?
            .len();
        let (progress_samples, finished, undelivered_end) = match tally.lock() {
            Ok(mut tally) => (tally.samples, tally.finished, tally.undelivered_end.take()),
            Err(_) => (0, false, None),
        };
        if let (Some(tx), Some(update)) = (&final_tx, undelivered_end) {
            debug!("Delivering final progress for {}", job.job_id);
            if tokio::time::timeout(FINAL_PROGRESS_WAIT, tx.send(update))
                .await
                .is_err()
            {
                warn!("Progress consumer for {} stopped reading", job.job_id);
            }
        }

        info!(
            "Transcode {} finished in {:?} ({} bytes)",
            job.job_id,
            start.elapsed(),
            output_size_bytes
        );

        Ok(TranscodeResult {
            job_id: job.job_id,
            output_path,
            output_size_bytes,
            duration_ms: start.elapsed().as_millis() as u64,
            progress_samples,
            finished,
        })
    }
}

/// Whether an error-stream line belongs to a progress block rather than a log message.
fn is_progress_line(line: &str) -> bool {
    match line.split_once('=') {
        Some((key, _)) => {
            !key.is_empty()
                && key
                    .bytes()
                    .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'_')
        }
        None => false,
    }
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    fn name(&self) -> &str {
        "ffmpeg"
    }

    async fn probe(&self, path: &Path) -> Result<MediaInfo, TranscoderError> {
        if !path.exists() {
            return Err(TranscoderError::probe(format!(
                "input not found: {}",
                path.display()
            )));
        }

        let ffprobe = self.resolver.binary_path(Tool::Ffprobe).await?;
        let argv = ProbeCommand::new(path).build(&ffprobe)?;

        let mut handlers = ProcessHandlers::new();
        let mut stdout = handlers.subscribe_stdout();
        let mut stderr = handlers.subscribe_stderr();
        let exit = self.runner().execute_and_wait(&argv, None, handlers).await?;

        let mut output = String::new();
        while let Ok(line) = stdout.try_recv() {
            output.push_str(&line);
            output.push('\n');
        }

        if !exit.success() {
            let mut errors = Vec::new();
            while let Ok(line) = stderr.try_recv() {
                errors.push(line);
            }
            return Err(TranscoderError::probe(format!(
                "ffprobe {}: {}",
                exit,
                errors.join("\n")
            )));
        }

        parse_probe_output(path, &output)
            .map_err(|e| TranscoderError::probe(format!("invalid ffprobe output: {}", e)))
    }

    async fn transcode(&self, job: TranscodeJob) -> Result<TranscodeResult, TranscoderError> {
        self.run_transcode(job, None).await
    }

    async fn transcode_with_progress(
        &self,
        job: TranscodeJob,
        progress_tx: mpsc::Sender<TranscodeProgress>,
    ) -> Result<TranscodeResult, TranscoderError> {
        self.run_transcode(job, Some(progress_tx)).await
    }

    async fn validate(&self) -> Result<(), TranscoderError> {
        for tool in Tool::ALL {
            let record = self.resolver.resolve(tool).await?;
            debug!("{} {} available ({})", tool, record.version, record.source);
        }
        Ok(())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::command::{AudioCodec, StreamType, VideoCodec};
    use crate::install::ToolsConfig;
    use std::os::unix::fs::PermissionsExt;
    use std::path::PathBuf;
    use tokio_util::sync::CancellationToken;

    const FFPROBE: &str = r#"#!/bin/sh
if [ "$1" = "-version" ]; then echo "ffprobe version 9.9-test"; exit 0; fi
echo '{"format":{"format_name":"matroska,webm","duration":"10.000000","size":"1000"},"streams":[]}'
"#;

    const FFMPEG_OK: &str = r#"#!/bin/sh
if [ "$1" = "-version" ]; then echo "ffmpeg version 9.9-test"; exit 0; fi
for last; do :; done
echo "[info] starting" >&2
printf 'frame=10\nout_time_us=5000000\nprogress=continue\n' >&2
printf 'frame=20\nout_time_us=10000000\nprogress=end\n' >&2
printf 'data' > "$last"
"#;

    const FFMPEG_FAIL: &str = r#"#!/bin/sh
if [ "$1" = "-version" ]; then echo "ffmpeg version 9.9-test"; exit 0; fi
echo "input.mkv: No such file or directory" >&2
exit 1
"#;

    const FFMPEG_SLOW: &str = r#"#!/bin/sh
if [ "$1" = "-version" ]; then echo "ffmpeg version 9.9-test"; exit 0; fi
exec sleep 30
"#;

    fn write_script(path: &Path, body: &str) {
        std::fs::write(path, body).unwrap();
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).unwrap();
    }

    fn transcoder(dir: &Path, ffmpeg: &str) -> FfmpegTranscoder {
        transcoder_with_ffprobe(dir, ffmpeg, FFPROBE)
    }

    fn transcoder_with_ffprobe(dir: &Path, ffmpeg: &str, ffprobe: &str) -> FfmpegTranscoder {
        let bin = dir.join("bin");
        std::fs::create_dir_all(&bin).unwrap();
        write_script(&bin.join("ffmpeg"), ffmpeg);
        write_script(&bin.join("ffprobe"), ffprobe);

        let resolver = Arc::new(ToolResolver::new(ToolsConfig {
            local_root: Some(dir.to_path_buf()),
            ..Default::default()
        }));
        FfmpegTranscoder::new(resolver, TranscoderConfig::default())
    }

    fn job(dir: &Path) -> (TranscodeJob, PathBuf) {
        let input = dir.join("input.mkv");
        std::fs::write(&input, b"input").unwrap();
        let output = dir.join("out/output.mkv");
        let command = TranscodeCommand::new()
            .overwrite()
            .input(&input)
            .video_codec(VideoCodec::H264)
            .audio_codec(AudioCodec::Aac)
            .bitrate(StreamType::Audio, "128k")
            .output(&output);
        (TranscodeJob::new("job-1", command), output)
    }

    #[tokio::test]
    async fn test_transcode_with_progress() {
        let dir = tempfile::tempdir().unwrap();
        let transcoder = transcoder(dir.path(), FFMPEG_OK);
        let (job, output) = job(dir.path());
        let (tx, mut rx) = mpsc::channel(16);

        let result = transcoder.transcode_with_progress(job, tx).await.unwrap();

        assert_eq!(result.job_id, "job-1");
        assert_eq!(result.output_path, output);
        assert_eq!(result.output_size_bytes, 4);
        assert_eq!(result.progress_samples, 2);

        let first = rx.recv().await.unwrap();
        assert_eq!(first.sample.frame, Some(10));
        assert!((first.sample.fraction.unwrap() - 0.5).abs() < 1e-9);
        let last = rx.recv().await.unwrap();
        assert!(last.sample.finished);
        assert_eq!(last.percent(), Some(100.0));
        assert!(result.finished);
    }

    #[tokio::test]
    async fn test_end_sample_waits_for_slow_consumer() {
        let dir = tempfile::tempdir().unwrap();
        let transcoder = transcoder(dir.path(), FFMPEG_OK);
        let (job, _) = job(dir.path());
        let (tx, mut rx) = mpsc::channel(1);

        let run = tokio::spawn(async move { transcoder.transcode_with_progress(job, tx).await });

        // Nothing is read while ffmpeg runs, so the end block finds the channel full.
        tokio::time::sleep(Duration::from_millis(300)).await;
        let first = rx.recv().await.unwrap();
        assert!(!first.sample.finished);
        let last = rx.recv().await.unwrap();
        assert!(last.sample.finished);
        assert!(rx.recv().await.is_none());

        let result = run.await.unwrap().unwrap();
        assert!(result.finished);
        assert_eq!(result.progress_samples, 2);
    }

    #[tokio::test]
    async fn test_missing_end_block_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let ffmpeg = FFMPEG_OK.replace(
            "printf 'frame=20\\nout_time_us=10000000\\nprogress=end\\n' >&2\n",
            "",
        );
        assert!(!ffmpeg.contains("progress=end"));
        let transcoder = transcoder(dir.path(), &ffmpeg);
        let (job, _) = job(dir.path());

        let result = transcoder.transcode(job).await.unwrap();
        assert_eq!(result.progress_samples, 1);
        assert!(!result.finished);
    }

    #[tokio::test]
    async fn test_unrepresentable_media_duration_is_unknown() {
        let dir = tempfile::tempdir().unwrap();
        let ffprobe = FFPROBE.replace(r#""duration":"10.000000""#, r#""duration":"1e400""#);
        let transcoder = transcoder_with_ffprobe(dir.path(), FFMPEG_OK, &ffprobe);
        let (job, _) = job(dir.path());
        let (tx, mut rx) = mpsc::channel(16);

        let result = transcoder.transcode_with_progress(job, tx).await.unwrap();
        assert_eq!(result.progress_samples, 2);

        let first = rx.recv().await.unwrap();
        assert_eq!(first.sample.fraction, None);
        assert_eq!(first.sample.elapsed, Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_probe() {
        let dir = tempfile::tempdir().unwrap();
        let transcoder = transcoder(dir.path(), FFMPEG_OK);
        let input = dir.path().join("input.mkv");
        std::fs::write(&input, b"input").unwrap();

        let info = transcoder.probe(&input).await.unwrap();
        assert_eq!(info.format, "matroska");
        assert_eq!(info.duration_secs, 10.0);
        assert_eq!(info.size_bytes, 1000);
    }

    #[tokio::test]
    async fn test_failure_reports_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let transcoder = transcoder(dir.path(), FFMPEG_FAIL);
        let (job, _) = job(dir.path());

        match transcoder.transcode(job).await.unwrap_err() {
            TranscoderError::Failed { code, stderr } => {
                assert_eq!(code, Some(1));
                assert!(stderr.contains("No such file"));
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[tokio::test]
    async fn test_cancel_token() {
        let dir = tempfile::tempdir().unwrap();
        let transcoder = transcoder(dir.path(), FFMPEG_SLOW);
        let (job, _) = job(dir.path());
        let token = CancellationToken::new();
        let job = job
            .with_total_duration(Duration::from_secs(10))
            .with_cancel_token(token.clone());

        let canceller = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            token.cancel();
        });

        let err = tokio::time::timeout(Duration::from_secs(10), transcoder.transcode(job))
            .await
            .unwrap()
            .unwrap_err();
        assert!(matches!(err, TranscoderError::Cancelled));
        canceller.await.unwrap();
    }

    #[tokio::test]
    async fn test_missing_output_is_configuration_error() {
        let dir = tempfile::tempdir().unwrap();
        let transcoder = transcoder(dir.path(), FFMPEG_OK);
        let job = TranscodeJob::new("no-output", TranscodeCommand::new().input("/in.mkv"));

        let err = transcoder.transcode(job).await.unwrap_err();
        assert!(err.is_configuration());
    }

    #[tokio::test]
    async fn test_validate() {
        let dir = tempfile::tempdir().unwrap();
        let transcoder = transcoder(dir.path(), FFMPEG_OK);
        transcoder.validate().await.unwrap();
        assert_eq!(transcoder.name(), "ffmpeg");
    }

    #[test]
    fn test_is_progress_line() {
        assert!(is_progress_line("out_time_us=100"));
        assert!(is_progress_line("progress=end"));
        assert!(!is_progress_line("[h264 @ 0x1] error while decoding"));
        assert!(!is_progress_line("Error: bad=value"));
    }
}
