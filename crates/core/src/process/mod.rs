//! Asynchronous external-process execution.
//!
//! [`ProcessRunner`] launches a program with piped standard streams and
//! drains both output pipes concurrently, line by line, into registered
//! handlers. The returned [`ProcessHandle`] can write to the process,
//! cancel it, or wait for its [`ProcessExit`].

mod config;
mod error;
mod handle;
mod handlers;
mod runner;

pub use config::RunnerConfig;
pub use error::ProcessError;
pub use handle::ProcessHandle;
pub use handlers::{
    ExitHandler, LineDispatcher, LineHandler, ProcessExit, ProcessHandlers, StreamErrorHandler,
    StreamKind,
};
pub use runner::ProcessRunner;
