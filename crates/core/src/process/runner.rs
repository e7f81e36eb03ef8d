//! Process runner implementation.

use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::config::RunnerConfig;
use super::error::ProcessError;
use super::handle::ProcessHandle;
use super::handlers::{
    ExitHandler, LineDispatcher, ProcessExit, ProcessHandlers, StreamErrorHandler, StreamKind,
};

/// Spawns external programs and drains their output on background tasks.
///
/// Every execution gets exactly three tasks on the tokio runtime: one reader
/// per output pipe and one exit-waiter. Readers call their stream's handlers
/// synchronously, so a slow handler only delays its own stream. The
/// exit-waiter fires exit handlers only after both readers reached
/// end-of-stream, so no buffered output is lost.
///
/// Must be called from within a tokio runtime.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    config: RunnerConfig,
    pipe_stdin: bool,
}

impl ProcessRunner {
    /// Creates a runner with the given configuration. Stdin is piped.
    pub fn new(config: RunnerConfig) -> Self {
        Self {
            config,
            pipe_stdin: true,
        }
    }

    /// Creates a runner with default configuration.
    pub fn with_defaults() -> Self {
        Self::new(RunnerConfig::default())
    }

    /// Whether to pipe the process input channel (otherwise it is closed).
    pub fn with_stdin(mut self, enabled: bool) -> Self {
        self.pipe_stdin = enabled;
        self
    }

    /// Spawns `argv` and starts draining its output.
    ///
    /// On spawn failure nothing is started and no handler fires.
    pub fn execute(
        &self,
        argv: &[String],
        working_dir: Option<&Path>,
        handlers: ProcessHandlers,
    ) -> Result<ProcessHandle, ProcessError> {
        let (program, args) = argv.split_first().ok_or(ProcessError::EmptyCommand)?;

        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdin(if self.pipe_stdin {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = working_dir {
            cmd.current_dir(dir);
        }

        let mut child = cmd
            .spawn()
            .map_err(|e| ProcessError::spawn(program.clone(), e))?;
        let pid = child.id();
        debug!("Spawned {} (pid {:?}) with {} args", program, pid, args.len());

        let ProcessHandlers {
            stdout,
            stderr,
            exit,
            stream_error,
        } = handlers;

        let cancel = CancellationToken::new();
        let stdin = Arc::new(Mutex::new(child.stdin.take()));
        let (exit_tx, exit_rx) = watch::channel(None);

        let stdout_task = spawn_reader(
            StreamKind::Stdout,
            child.stdout.take(),
            stdout,
            stream_error.clone(),
            cancel.child_token(),
        );
        let stderr_task = spawn_reader(
            StreamKind::Stderr,
            child.stderr.take(),
            stderr,
            stream_error,
            cancel.child_token(),
        );

        tokio::spawn(wait_for_exit(ExitWaiter {
            program: program.clone(),
            child,
            stdin: Arc::clone(&stdin),
            readers: [stdout_task, stderr_task],
            exit_handlers: exit,
            cancel: cancel.clone(),
            exit_tx,
            config: self.config.clone(),
        }));

        Ok(ProcessHandle::new(
            program.clone(),
            pid,
            stdin,
            cancel,
            exit_rx,
            self.config.stdin_write_timeout(),
        ))
    }

    /// Spawns `argv` and waits for its terminal outcome.
    ///
    /// Output is still drained on background tasks; only the caller's
    /// future waits.
    pub async fn execute_and_wait(
        &self,
        argv: &[String],
        working_dir: Option<&Path>,
        handlers: ProcessHandlers,
    ) -> Result<ProcessExit, ProcessError> {
        let handle = self.execute(argv, working_dir, handlers)?;
        Ok(handle.wait().await)
    }
}

impl Default for ProcessRunner {
    fn default() -> Self {
        Self::with_defaults()
    }
}

fn spawn_reader<R>(
    kind: StreamKind,
    pipe: Option<R>,
    dispatcher: LineDispatcher,
    error_handlers: Vec<StreamErrorHandler>,
    cancel: CancellationToken,
) -> JoinHandle<usize>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        match pipe {
            Some(pipe) => pump_lines(kind, pipe, dispatcher, error_handlers, cancel).await,
            None => 0,
        }
    })
}

/// Reads `pipe` line by line until end-of-stream, an I/O error, or cancellation.
///
/// Returns the number of lines dispatched.
async fn pump_lines<R>(
    kind: StreamKind,
    pipe: R,
    mut dispatcher: LineDispatcher,
    error_handlers: Vec<StreamErrorHandler>,
    cancel: CancellationToken,
) -> usize
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(pipe);
    let mut buf = Vec::new();
    let mut lines = 0;

    loop {
        buf.clear();
        let read = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            read = reader.read_until(b'\n', &mut buf) => read,
        };

        match read {
            Ok(0) => break,
            Ok(_) => {
                // Lines read after cancellation are dropped undelivered.
                if cancel.is_cancelled() {
                    break;
                }
                let text = String::from_utf8_lossy(&buf);
                dispatcher.dispatch(text.trim_end());
                lines += 1;
            }
            Err(e) => {
                warn!("Failed to read process {}: {}", kind.as_str(), e);
                for handler in &error_handlers {
                    handler(kind, &e);
                }
                break;
            }
        }
    }

    lines
}

struct ExitWaiter {
    program: String,
    child: Child,
    stdin: Arc<Mutex<Option<ChildStdin>>>,
    readers: [JoinHandle<usize>; 2],
    exit_handlers: Vec<ExitHandler>,
    cancel: CancellationToken,
    exit_tx: watch::Sender<Option<ProcessExit>>,
    config: RunnerConfig,
}

async fn wait_for_exit(waiter: ExitWaiter) {
    let ExitWaiter {
        program,
        mut child,
        stdin,
        readers,
        exit_handlers,
        cancel,
        exit_tx,
        config,
    } = waiter;

    let waited = tokio::select! {
        status = child.wait() => Some(status),
        _ = cancel.cancelled() => None,
    };

    let outcome = match waited {
        Some(Ok(status)) => ProcessExit::from_status(status),
        Some(Err(e)) => {
            warn!("Failed to wait for {}: {}", program, e);
            ProcessExit::Terminated
        }
        None => {
            if let Err(e) = child.start_kill() {
                debug!("Kill request for {} failed: {}", program, e);
            }
            if let Err(e) = child.wait().await {
                warn!("Failed to reap cancelled {}: {}", program, e);
            }
            ProcessExit::Cancelled
        }
    };

    // Further writes must fail fast instead of hitting a dead pipe.
    stdin.lock().await.take();

    let [stdout_task, stderr_task] = readers;
    let drain = async {
        let stdout_lines = stdout_task.await.unwrap_or(0);
        let stderr_lines = stderr_task.await.unwrap_or(0);
        (stdout_lines, stderr_lines)
    };
    tokio::pin!(drain);

    let (stdout_lines, stderr_lines) =
        match tokio::time::timeout(config.drain_timeout(), &mut drain).await {
            Ok(counts) => counts,
            Err(_) => {
                warn!(
                    "{} exited but its output pipes stayed open for {:?}; closing them",
                    program,
                    config.drain_timeout()
                );
                cancel.cancel();
                drain.await
            }
        };

    debug!(
        "{} {} ({} stdout lines, {} stderr lines)",
        program, outcome, stdout_lines, stderr_lines
    );

    for handler in exit_handlers {
        handler(outcome);
    }
    let _ = exit_tx.send(Some(outcome));
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    fn argv(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| s.to_string()).collect()
    }

    fn sh(script: &str) -> Vec<String> {
        argv(&["sh", "-c", script])
    }

    #[tokio::test]
    async fn test_echo_delivers_one_line_then_exit() {
        let events = Arc::new(StdMutex::new(Vec::new()));
        let mut handlers = ProcessHandlers::new();
        {
            let events = Arc::clone(&events);
            handlers.on_stdout(move |line| events.lock().unwrap().push(format!("out:{}", line)));
        }
        {
            let events = Arc::clone(&events);
            handlers.on_exit(move |exit| events.lock().unwrap().push(format!("exit:{}", exit)));
        }

        let exit = ProcessRunner::with_defaults()
            .execute_and_wait(&argv(&["echo", "hello world"]), None, handlers)
            .await
            .unwrap();

        assert_eq!(exit, ProcessExit::Exited(0));
        assert_eq!(
            *events.lock().unwrap(),
            vec!["out:hello world", "exit:exited with code 0"]
        );
    }

    #[tokio::test]
    async fn test_exit_handlers_run_after_all_output() {
        let mut handlers = ProcessHandlers::new();
        let lines = Arc::new(StdMutex::new(0usize));
        let seen_at_exit = Arc::new(StdMutex::new(None));
        {
            let lines = Arc::clone(&lines);
            handlers.on_stdout(move |_| *lines.lock().unwrap() += 1);
        }
        {
            let lines = Arc::clone(&lines);
            let seen_at_exit = Arc::clone(&seen_at_exit);
            handlers.on_exit(move |_| *seen_at_exit.lock().unwrap() = Some(*lines.lock().unwrap()));
        }

        ProcessRunner::with_defaults()
            .execute_and_wait(&sh("seq 1 500"), None, handlers)
            .await
            .unwrap();

        assert_eq!(*seen_at_exit.lock().unwrap(), Some(500));
    }

    #[tokio::test]
    async fn test_streams_are_separate() {
        let mut handlers = ProcessHandlers::new();
        let mut out = handlers.subscribe_stdout();
        let mut err = handlers.subscribe_stderr();

        let exit = ProcessRunner::with_defaults()
            .execute_and_wait(&sh("echo to-out; echo to-err 1>&2; exit 3"), None, handlers)
            .await
            .unwrap();

        assert_eq!(exit.code(), Some(3));
        assert_eq!(out.recv().await.as_deref(), Some("to-out"));
        assert_eq!(err.recv().await.as_deref(), Some("to-err"));
        assert!(out.recv().await.is_none());
        assert!(err.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_trailing_line_without_newline() {
        let mut handlers = ProcessHandlers::new();
        let mut out = handlers.subscribe_stdout();

        ProcessRunner::with_defaults()
            .execute_and_wait(&sh("printf 'a\\r\\nb'"), None, handlers)
            .await
            .unwrap();

        assert_eq!(out.recv().await.as_deref(), Some("a"));
        assert_eq!(out.recv().await.as_deref(), Some("b"));
    }

    #[tokio::test]
    async fn test_missing_program_fails_to_spawn() {
        let fired = Arc::new(StdMutex::new(false));
        let mut handlers = ProcessHandlers::new();
        {
            let fired = Arc::clone(&fired);
            handlers.on_exit(move |_| *fired.lock().unwrap() = true);
        }

        let err = ProcessRunner::with_defaults()
            .execute(&argv(&["/nonexistent/clipforge-missing-tool"]), None, handlers)
            .unwrap_err();

        assert!(err.is_not_found());
        assert!(!*fired.lock().unwrap());
    }

    #[tokio::test]
    async fn test_empty_argv_rejected() {
        let err = ProcessRunner::with_defaults()
            .execute(&[], None, ProcessHandlers::new())
            .unwrap_err();
        assert!(matches!(err, ProcessError::EmptyCommand));
        assert!(err.is_configuration());
    }

    #[tokio::test]
    async fn test_stdin_round_trip() {
        let mut handlers = ProcessHandlers::new();
        let mut out = handlers.subscribe_stdout();

        let handle = ProcessRunner::with_defaults()
            .execute(&argv(&["cat"]), None, handlers)
            .unwrap();
        handle.write_line("ping").await.unwrap();
        assert_eq!(out.recv().await.as_deref(), Some("ping"));

        handle.close_stdin().await;
        assert_eq!(handle.wait().await, ProcessExit::Exited(0));
        assert!(matches!(
            handle.write_line("late").await,
            Err(ProcessError::StdinClosed)
        ));
    }

    #[tokio::test]
    async fn test_stdin_write_after_exit_fails() {
        let handle = ProcessRunner::with_defaults()
            .execute(&argv(&["true"]), None, ProcessHandlers::new())
            .unwrap();
        handle.wait().await;
        assert!(handle.is_finished());
        assert!(handle.write_stdin(b"data").await.is_err());
    }

    #[tokio::test]
    async fn test_wait_from_every_clone() {
        let handle = ProcessRunner::with_defaults()
            .execute(&argv(&["sh", "-c", "exit 3"]), None, ProcessHandlers::new())
            .unwrap();
        let other = handle.clone();

        let (first, second) = tokio::join!(handle.wait(), other.wait());
        assert_eq!(first, ProcessExit::Exited(3));
        assert_eq!(second, ProcessExit::Exited(3));
        // Settled outcomes are returned again without blocking.
        assert_eq!(handle.wait().await, ProcessExit::Exited(3));
        assert_eq!(handle.outcome(), Some(ProcessExit::Exited(3)));
    }

    #[tokio::test]
    async fn test_stdin_disabled() {
        let handle = ProcessRunner::with_defaults()
            .with_stdin(false)
            .execute(&argv(&["cat"]), None, ProcessHandlers::new())
            .unwrap();
        assert!(matches!(
            handle.write_stdin(b"x").await,
            Err(ProcessError::StdinClosed)
        ));
        // cat sees end-of-input right away.
        assert_eq!(handle.wait().await, ProcessExit::Exited(0));
    }

    #[tokio::test]
    async fn test_cancel_terminates_process() {
        let outcomes = Arc::new(StdMutex::new(Vec::new()));
        let mut handlers = ProcessHandlers::new();
        {
            let outcomes = Arc::clone(&outcomes);
            handlers.on_exit(move |exit| outcomes.lock().unwrap().push(exit));
        }

        let handle = ProcessRunner::with_defaults()
            .execute(&argv(&["sleep", "30"]), None, handlers)
            .unwrap();
        assert!(handle.pid().is_some());

        handle.cancel();
        handle.cancel();
        let exit = tokio::time::timeout(Duration::from_secs(5), handle.wait())
            .await
            .unwrap();

        assert_eq!(exit, ProcessExit::Cancelled);
        assert_eq!(*outcomes.lock().unwrap(), vec![ProcessExit::Cancelled]);

        // Cancelling after exit changes nothing.
        handle.cancel();
        assert_eq!(handle.outcome(), Some(ProcessExit::Cancelled));
    }

    #[tokio::test]
    async fn test_working_directory() {
        let dir = tempfile::tempdir().unwrap();
        let mut handlers = ProcessHandlers::new();
        let mut out = handlers.subscribe_stdout();

        ProcessRunner::with_defaults()
            .execute_and_wait(&argv(&["pwd"]), Some(dir.path()), handlers)
            .await
            .unwrap();

        let printed = out.recv().await.unwrap();
        let expected = dir.path().canonicalize().unwrap();
        assert_eq!(
            std::path::Path::new(&printed).canonicalize().unwrap(),
            expected
        );
    }
}
