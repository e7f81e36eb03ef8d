//! Background download + extract job with pause and cancel.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::io::AsyncWriteExt;
use tokio::sync::{broadcast, watch, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::config::DownloadConfig;
use super::error::InstallError;
use super::extract::{extract_zip, Extraction};
use super::source::DownloadSource;
use super::state::DownloadState;

const EVENT_CAPACITY: usize = 256;

/// Runs once the extracted tree is in place, before the job reports `Done`.
pub type CompletionHook = Box<dyn FnOnce() -> BoxFuture<'static, ()> + Send + Sync>;

/// Which half of the job a progress fraction belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DownloadPhase {
    /// Fraction is bytes received over content length.
    Download,
    /// Fraction is entries processed over total entries.
    Extract,
}

/// Notification delivered to [`DownloadHandle::subscribe`] receivers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DownloadEvent {
    StateChanged {
        from: DownloadState,
        to: DownloadState,
        at: DateTime<Utc>,
    },
    Progress {
        phase: DownloadPhase,
        fraction: f64,
    },
    /// Sent exactly once, right after the transition to `Failed`.
    Failed { error: String },
}

/// Latest snapshot of a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownloadStatus {
    pub state: DownloadState,
    pub phase: DownloadPhase,
    /// Progress of the current phase in `[0, 1]`.
    pub fraction: f64,
    pub bytes_received: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_length: Option<u64>,
    pub entries_processed: usize,
    pub total_entries: usize,
    /// Captured error once the job failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl DownloadStatus {
    fn new() -> Self {
        Self {
            state: DownloadState::Idle,
            phase: DownloadPhase::Download,
            fraction: 0.0,
            bytes_received: 0,
            content_length: None,
            entries_processed: 0,
            total_entries: 0,
            error: None,
            updated_at: Utc::now(),
        }
    }
}

/// State shared between the driving task and every handle.
#[derive(Debug)]
struct Shared {
    id: Uuid,
    state: Mutex<DownloadState>,
    status_tx: watch::Sender<DownloadStatus>,
    events: broadcast::Sender<DownloadEvent>,
    wake: CancellationToken,
}

impl Shared {
    /// Applies `to` if legal. Caller holds the state lock.
    fn transition(&self, state: &mut DownloadState, to: DownloadState) -> bool {
        let from = *state;
        if !from.can_transition_to(to) {
            return false;
        }
        *state = to;
        debug!("Download {} {} -> {}", self.id, from, to);

        let at = Utc::now();
        self.status_tx.send_modify(|status| {
            status.state = to;
            status.updated_at = at;
        });
        let _ = self
            .events
            .send(DownloadEvent::StateChanged { from, to, at });
        true
    }

    async fn request(&self, to: DownloadState) -> bool {
        let mut state = self.state.lock().await;
        let changed = self.transition(&mut state, to);
        drop(state);
        if changed && to == DownloadState::Canceled {
            self.wake.cancel();
        }
        changed
    }

    fn report_download(&self, received: u64, content_length: Option<u64>) {
        let fraction = match content_length {
            Some(total) if total > 0 => (received as f64 / total as f64).min(1.0),
            _ => 0.0,
        };
        self.status_tx.send_modify(|status| {
            status.phase = DownloadPhase::Download;
            status.bytes_received = received;
            status.content_length = content_length;
            status.fraction = fraction;
            status.updated_at = Utc::now();
        });
        let _ = self.events.send(DownloadEvent::Progress {
            phase: DownloadPhase::Download,
            fraction,
        });
    }

    fn report_extract(&self, processed: usize, total: usize) {
        let fraction = if total == 0 {
            1.0
        } else {
            processed as f64 / total as f64
        };
        self.status_tx.send_modify(|status| {
            status.phase = DownloadPhase::Extract;
            status.entries_processed = processed;
            status.total_entries = total;
            status.fraction = fraction;
            status.updated_at = Utc::now();
        });
        let _ = self.events.send(DownloadEvent::Progress {
            phase: DownloadPhase::Extract,
            fraction,
        });
    }

    /// Moves to `Failed` unless the job already ended; delivers the error once.
    async fn fail(&self, err: &InstallError) {
        let mut state = self.state.lock().await;
        if !state.can_transition_to(DownloadState::Failed) {
            debug!("Download {} error after {}: {}", self.id, *state, err);
            return;
        }

        // The error is visible before the state, so waiters never see a bare FAILED.
        let message = err.to_string();
        error!("Download {} failed: {}", self.id, message);
        self.status_tx
            .send_modify(|status| status.error = Some(message.clone()));
        self.transition(&mut state, DownloadState::Failed);
        drop(state);

        let _ = self.events.send(DownloadEvent::Failed { error: message });
    }
}

/// Control surface of a [`DownloadJob`]. Cheap to clone.
#[derive(Debug, Clone)]
pub struct DownloadHandle {
    shared: Arc<Shared>,
}

impl DownloadHandle {
    /// Job identifier, also used in the temporary file name.
    pub fn id(&self) -> Uuid {
        self.shared.id
    }

    /// RUNNING -> PAUSED. Returns whether the state changed.
    pub async fn pause(&self) -> bool {
        self.shared.request(DownloadState::Paused).await
    }

    /// PAUSED -> RUNNING. Returns whether the state changed.
    pub async fn resume(&self) -> bool {
        self.shared.request(DownloadState::Running).await
    }

    /// Cancels from any non-terminal state. Returns whether the state changed.
    ///
    /// Waits for an in-flight chunk write to finish; nothing is written after
    /// this returns `true`.
    pub async fn cancel(&self) -> bool {
        self.shared.request(DownloadState::Canceled).await
    }

    /// Current state.
    pub fn state(&self) -> DownloadState {
        self.shared.status_tx.borrow().state
    }

    /// Latest snapshot.
    pub fn status(&self) -> DownloadStatus {
        self.shared.status_tx.borrow().clone()
    }

    /// Subscribes to state changes, progress and failure events.
    pub fn subscribe(&self) -> broadcast::Receiver<DownloadEvent> {
        self.shared.events.subscribe()
    }

    /// Receiver that always holds the latest snapshot.
    pub fn watch(&self) -> watch::Receiver<DownloadStatus> {
        self.shared.status_tx.subscribe()
    }

    /// Waits until the job reaches a terminal state and returns the final snapshot.
    pub async fn wait(&self) -> DownloadStatus {
        let mut rx = self.watch();
        let result = rx.wait_for(|status| status.state.is_terminal()).await;
        match result {
            Ok(status) => status.clone(),
            Err(_) => self.status(),
        }
    }
}

/// One download of an archive into `target_dir`, followed by its extraction.
///
/// The archive is expanded into a hidden staging directory next to
/// `target_dir` and renamed into place on success, so a canceled or failed
/// job never leaves a partial tree at `target_dir`.
///
/// Owned and driven by exactly one task (see [`start`](Self::start)).
pub struct DownloadJob {
    source: Arc<dyn DownloadSource>,
    target_dir: PathBuf,
    config: DownloadConfig,
    shared: Arc<Shared>,
    on_complete: Option<CompletionHook>,
}

impl DownloadJob {
    pub fn new(
        source: Arc<dyn DownloadSource>,
        target_dir: impl Into<PathBuf>,
        config: DownloadConfig,
    ) -> Self {
        let (status_tx, _) = watch::channel(DownloadStatus::new());
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            source,
            target_dir: target_dir.into(),
            config,
            shared: Arc::new(Shared {
                id: Uuid::new_v4(),
                state: Mutex::new(DownloadState::Idle),
                status_tx,
                events,
                wake: CancellationToken::new(),
            }),
            on_complete: None,
        }
    }

    /// Registers `hook` to run after the tree is in place and before the
    /// transition to `Done`, while cancel requests are held off.
    pub fn on_complete(mut self, hook: CompletionHook) -> Self {
        self.on_complete = Some(hook);
        self
    }

    /// Handle usable before and after [`start`](Self::start).
    pub fn handle(&self) -> DownloadHandle {
        DownloadHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    pub fn target_dir(&self) -> &Path {
        &self.target_dir
    }

    /// Path of the temporary body file, next to the target directory.
    pub fn temp_path(&self) -> PathBuf {
        self.parent_dir()
            .join(format!(".clipforge-{}.part", self.shared.id))
    }

    /// Directory the archive is expanded into before it is moved to the target.
    pub fn staging_dir(&self) -> PathBuf {
        self.parent_dir().join(format!(".clipforge-{}", self.shared.id))
    }

    fn parent_dir(&self) -> &Path {
        match self.target_dir.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        }
    }

    /// Spawns the driving task and returns a handle.
    pub fn start(self) -> DownloadHandle {
        let handle = self.handle();
        tokio::spawn(self.run());
        handle
    }

    /// Drives the job to a terminal state on the current task.
    pub async fn run(mut self) -> DownloadState {
        {
            let mut state = self.shared.state.lock().await;
            if !self.shared.transition(&mut state, DownloadState::Running) {
                debug!("Download {} not started: {}", self.shared.id, *state);
                return *state;
            }
        }
        info!(
            "Downloading {} into {}",
            self.source.describe(),
            self.target_dir.display()
        );

        let temp_path = self.temp_path();
        let staging = self.staging_dir();
        let hook = self.on_complete.take();
        let result = self.drive(&temp_path, &staging, hook).await;

        if let Err(e) = tokio::fs::remove_file(&temp_path).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("Failed to remove {}: {}", temp_path.display(), e);
            }
        }
        // Only present when the job did not reach DONE.
        if let Err(e) = tokio::fs::remove_dir_all(&staging).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("Failed to remove {}: {}", staging.display(), e);
            }
        }

        match result {
            Ok(()) => {}
            Err(e) => self.shared.fail(&e).await,
        }

        let final_state = *self.shared.state.lock().await;
        info!("Download {} finished: {}", self.shared.id, final_state);
        final_state
    }

    async fn drive(
        &self,
        temp_path: &Path,
        staging: &Path,
        hook: Option<CompletionHook>,
    ) -> Result<(), InstallError> {
        tokio::fs::create_dir_all(self.parent_dir()).await?;

        if !self.copy_body(temp_path).await? {
            return Ok(());
        }

        let shared = Arc::clone(&self.shared);
        let archive = temp_path.to_path_buf();
        let target = staging.to_path_buf();
        let extraction = tokio::task::spawn_blocking(move || {
            extract_zip(&archive, &target, &shared.state, |done, total| {
                shared.report_extract(done, total)
            })
        })
        .await
        .map_err(|e| InstallError::extraction(format!("extraction task failed: {}", e)))??;

        let Extraction::Completed { entries } = extraction else {
            return Ok(());
        };

        // Held until DONE: a cancel either lands before the move or not at all.
        let mut state = self.shared.state.lock().await;
        if *state != DownloadState::Extracting {
            debug!("Download {} ended during extraction: {}", self.shared.id, *state);
            return Ok(());
        }

        self.promote(staging).await?;
        if let Some(hook) = hook {
            hook().await;
        }
        if self.shared.transition(&mut state, DownloadState::Done) {
            info!(
                "Installed {} entries into {}",
                entries,
                self.target_dir.display()
            );
        }
        Ok(())
    }

    /// Replaces the target directory with the expanded staging tree.
    async fn promote(&self, staging: &Path) -> Result<(), InstallError> {
        match tokio::fs::remove_dir_all(&self.target_dir).await {
            Ok(()) => debug!("Replacing existing {}", self.target_dir.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        tokio::fs::rename(staging, &self.target_dir).await?;
        Ok(())
    }

    /// Copies the body into `temp_path`. Returns `false` when canceled.
    ///
    /// Ends in `Extracting` when it returns `true`.
    async fn copy_body(&self, temp_path: &Path) -> Result<bool, InstallError> {
        let opened = tokio::select! {
            opened = tokio::time::timeout(self.config.timeout(), self.source.open()) => opened,
            _ = self.shared.wake.cancelled() => return Ok(false),
        };
        let mut stream = opened.map_err(|_| self.stalled())??;
        let content_length = stream.content_length;
        self.shared.report_download(0, content_length);

        let mut file = tokio::fs::File::create(temp_path).await?;
        let mut hasher = Sha256::new();
        let mut received: u64 = 0;
        let mut pending: Vec<u8> = Vec::new();
        let mut offset = 0;
        let mut eof = false;
        let chunk_size = self.config.chunk_size.max(1);

        loop {
            let mut state = self.shared.state.lock().await;
            match *state {
                DownloadState::Running => {}
                DownloadState::Paused => {
                    drop(state);
                    self.pause_tick().await;
                    continue;
                }
                DownloadState::Canceled => return Ok(false),
                other => {
                    return Err(InstallError::InvalidTransition {
                        from: other,
                        to: DownloadState::Running,
                    })
                }
            }

            if offset < pending.len() {
                let end = (offset + chunk_size).min(pending.len());
                let slice = &pending[offset..end];
                // Written under the state lock: a cancel waits for this write.
                file.write_all(slice).await?;
                hasher.update(slice);
                received += slice.len() as u64;
                offset = end;
                drop(state);
                self.shared.report_download(received, content_length);
                continue;
            }

            if eof {
                file.flush().await?;
                file.sync_all().await?;
                self.verify_body(received, content_length, &mut hasher)?;
                self.shared
                    .transition(&mut state, DownloadState::Extracting);
                return Ok(true);
            }

            drop(state);
            let next = tokio::select! {
                next = tokio::time::timeout(self.config.timeout(), stream.body.next()) => next,
                _ = self.shared.wake.cancelled() => continue,
            };
            match next.map_err(|_| self.stalled())? {
                Some(chunk) => {
                    pending = chunk?;
                    offset = 0;
                }
                None => eof = true,
            }
        }
    }

    async fn pause_tick(&self) {
        tokio::select! {
            _ = tokio::time::sleep(self.config.pause_poll_interval()) => {}
            _ = self.shared.wake.cancelled() => {}
        }
    }

    fn stalled(&self) -> InstallError {
        InstallError::Timeout {
            timeout_secs: self.config.timeout_secs,
        }
    }

    fn verify_body(
        &self,
        received: u64,
        content_length: Option<u64>,
        hasher: &mut Sha256,
    ) -> Result<(), InstallError> {
        if let Some(expected) = content_length {
            if received < expected {
                return Err(InstallError::Truncated { received, expected });
            }
        }

        if let Some(expected) = &self.config.expected_sha256 {
            let actual = hex(&std::mem::take(hasher).finalize());
            if !actual.eq_ignore_ascii_case(expected) {
                return Err(InstallError::ChecksumMismatch {
                    expected: expected.clone(),
                    actual,
                });
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for DownloadJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownloadJob")
            .field("id", &self.shared.id)
            .field("source", &self.source.describe())
            .field("target_dir", &self.target_dir)
            .field("on_complete", &self.on_complete.is_some())
            .finish()
    }
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}
