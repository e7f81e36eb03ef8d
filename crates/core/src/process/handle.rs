//! Handle to a running process.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::process::ChildStdin;
use tokio::sync::{watch, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::error::ProcessError;
use super::handlers::ProcessExit;

/// Handle returned by [`ProcessRunner::execute`](super::ProcessRunner::execute).
///
/// Cloning is cheap; every clone talks to the same process.
#[derive(Debug, Clone)]
pub struct ProcessHandle {
    program: String,
    pid: Option<u32>,
    stdin: Arc<Mutex<Option<ChildStdin>>>,
    cancel: CancellationToken,
    exit_rx: watch::Receiver<Option<ProcessExit>>,
    stdin_timeout: Duration,
}

impl ProcessHandle {
    pub(super) fn new(
        program: String,
        pid: Option<u32>,
        stdin: Arc<Mutex<Option<ChildStdin>>>,
        cancel: CancellationToken,
        exit_rx: watch::Receiver<Option<ProcessExit>>,
        stdin_timeout: Duration,
    ) -> Self {
        Self {
            program,
            pid,
            stdin,
            cancel,
            exit_rx,
            stdin_timeout,
        }
    }

    /// Program name as given in the argument vector.
    pub fn program(&self) -> &str {
        &self.program
    }

    /// OS process id, if still known at spawn time.
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Token that terminates the process when cancelled.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Requests termination. Idempotent; a no-op once the process has exited.
    pub fn cancel(&self) {
        if !self.is_finished() {
            debug!("Cancelling {} (pid {:?})", self.program, self.pid);
        }
        self.cancel.cancel();
    }

    /// Whether the terminal outcome is known and exit handlers have run.
    pub fn is_finished(&self) -> bool {
        self.exit_rx.borrow().is_some()
    }

    /// Terminal outcome, if already known.
    pub fn outcome(&self) -> Option<ProcessExit> {
        *self.exit_rx.borrow()
    }

    /// Waits for the terminal outcome.
    ///
    /// Resolves after every exit handler has run.
    pub async fn wait(&self) -> ProcessExit {
        let mut rx = self.exit_rx.clone();
        let outcome = match rx.wait_for(Option::is_some).await {
            Ok(outcome) => (*outcome).unwrap_or(ProcessExit::Terminated),
            // The exit-waiter task was dropped (runtime shutdown).
            Err(_) => ProcessExit::Terminated,
        };
        outcome
    }

    /// Writes `data` to the process input channel and flushes it.
    ///
    /// Fails with [`ProcessError::StdinClosed`] after exit, after
    /// [`close_stdin`](Self::close_stdin), or when stdin was not piped.
    /// A broken pipe closes the channel for all later writes.
    pub async fn write_stdin(&self, data: &[u8]) -> Result<(), ProcessError> {
        let mut guard = self.stdin.lock().await;
        let stdin = guard.as_mut().ok_or(ProcessError::StdinClosed)?;

        let write = async {
            stdin.write_all(data).await?;
            stdin.flush().await
        };

        let result = match tokio::time::timeout(self.stdin_timeout, write).await {
            Ok(result) => result,
            Err(_) => Err(io::Error::new(
                io::ErrorKind::TimedOut,
                format!("stdin write timed out after {:?}", self.stdin_timeout),
            )),
        };

        result.map_err(|e| {
            if e.kind() == io::ErrorKind::BrokenPipe {
                guard.take();
            }
            ProcessError::StdinWrite(e)
        })
    }

    /// Writes `line` followed by a newline.
    pub async fn write_line(&self, line: &str) -> Result<(), ProcessError> {
        let mut data = Vec::with_capacity(line.len() + 1);
        data.extend_from_slice(line.as_bytes());
        data.push(b'\n');
        self.write_stdin(&data).await
    }

    /// Closes the process input channel, signalling end-of-input.
    pub async fn close_stdin(&self) {
        if let Some(mut stdin) = self.stdin.lock().await.take() {
            let _ = stdin.shutdown().await;
        }
    }
}
