//! Handler registry for one process execution.

use std::fmt;
use std::io;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Which output pipe a line or error came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamKind {
    Stdout,
    Stderr,
}

impl StreamKind {
    /// Returns the string representation for logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stdout => "stdout",
            Self::Stderr => "stderr",
        }
    }
}

/// Terminal outcome of one execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "code", rename_all = "snake_case")]
pub enum ProcessExit {
    /// The process exited on its own with this code.
    Exited(i32),
    /// The process ended without an exit code (killed by a signal).
    Terminated,
    /// The process was terminated through its cancel token.
    Cancelled,
}

impl ProcessExit {
    /// Builds an outcome from an OS exit status.
    pub fn from_status(status: std::process::ExitStatus) -> Self {
        match status.code() {
            Some(code) => Self::Exited(code),
            None => Self::Terminated,
        }
    }

    /// Exit code, if the process exited on its own.
    pub fn code(&self) -> Option<i32> {
        match self {
            Self::Exited(code) => Some(*code),
            _ => None,
        }
    }

    /// Whether the process exited with code 0.
    pub fn success(&self) -> bool {
        self.code() == Some(0)
    }
}

impl fmt::Display for ProcessExit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exited(code) => write!(f, "exited with code {}", code),
            Self::Terminated => write!(f, "terminated by signal"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Callback receiving one decoded, right-trimmed line.
pub type LineHandler = Box<dyn FnMut(&str) + Send>;

/// Callback receiving the terminal outcome.
pub type ExitHandler = Box<dyn FnOnce(ProcessExit) + Send>;

/// Callback receiving an I/O error from one pipe.
pub type StreamErrorHandler = Arc<dyn Fn(StreamKind, &io::Error) + Send + Sync>;

/// Fans one decoded line stream out to every subscriber, in registration order.
#[derive(Default)]
pub struct LineDispatcher {
    handlers: Vec<LineHandler>,
}

impl LineDispatcher {
    /// Adds a subscriber.
    pub fn push(&mut self, handler: LineHandler) {
        self.handlers.push(handler);
    }

    /// Number of subscribers.
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Whether nobody is listening.
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Delivers one line to every subscriber.
    pub fn dispatch(&mut self, line: &str) {
        for handler in &mut self.handlers {
            handler(line);
        }
    }
}

impl fmt::Debug for LineDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LineDispatcher")
            .field("handlers", &self.handlers.len())
            .finish()
    }
}

/// Handlers for one execution.
///
/// The registry is filled before [`ProcessRunner::execute`](super::ProcessRunner::execute)
/// and moved into the execution, so nothing can be registered once the
/// process is running.
#[derive(Default)]
pub struct ProcessHandlers {
    pub(super) stdout: LineDispatcher,
    pub(super) stderr: LineDispatcher,
    pub(super) exit: Vec<ExitHandler>,
    pub(super) stream_error: Vec<StreamErrorHandler>,
}

impl ProcessHandlers {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler for output-stream lines.
    pub fn on_stdout(&mut self, handler: impl FnMut(&str) + Send + 'static) -> &mut Self {
        self.stdout.push(Box::new(handler));
        self
    }

    /// Registers a handler for error-stream lines.
    pub fn on_stderr(&mut self, handler: impl FnMut(&str) + Send + 'static) -> &mut Self {
        self.stderr.push(Box::new(handler));
        self
    }

    /// Registers a handler fired exactly once with the terminal outcome.
    pub fn on_exit(&mut self, handler: impl FnOnce(ProcessExit) + Send + 'static) -> &mut Self {
        self.exit.push(Box::new(handler));
        self
    }

    /// Registers a handler for pipe read failures.
    pub fn on_stream_error(
        &mut self,
        handler: impl Fn(StreamKind, &io::Error) + Send + Sync + 'static,
    ) -> &mut Self {
        self.stream_error.push(Arc::new(handler));
        self
    }

    /// Subscribes to output-stream lines through a channel.
    pub fn subscribe_stdout(&mut self) -> mpsc::UnboundedReceiver<String> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.on_stdout(move |line| {
            let _ = tx.send(line.to_string());
        });
        rx
    }

    /// Subscribes to error-stream lines through a channel.
    pub fn subscribe_stderr(&mut self) -> mpsc::UnboundedReceiver<String> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.on_stderr(move |line| {
            let _ = tx.send(line.to_string());
        });
        rx
    }
}

impl fmt::Debug for ProcessHandlers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessHandlers")
            .field("stdout", &self.stdout.len())
            .field("stderr", &self.stderr.len())
            .field("exit", &self.exit.len())
            .field("stream_error", &self.stream_error.len())
            .finish()
    }
}
