//! Error types for the process module.

use std::io;
use thiserror::Error;

/// Errors that can occur while launching or talking to a process.
#[derive(Debug, Error)]
pub enum ProcessError {
    /// The argument vector had no program.
    #[error("Empty command line")]
    EmptyCommand,

    /// The OS failed to create the process.
    #[error("Failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    /// The process input channel is closed (process exited or stdin was not piped).
    #[error("Process stdin is closed")]
    StdinClosed,

    /// Writing to the process input channel failed.
    #[error("Failed to write to process stdin: {0}")]
    StdinWrite(#[source] io::Error),
}

impl ProcessError {
    /// Creates a spawn error.
    pub fn spawn(program: impl Into<String>, source: io::Error) -> Self {
        Self::Spawn {
            program: program.into(),
            source,
        }
    }

    /// Whether the program could not be found at all.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Spawn { source, .. } if source.kind() == io::ErrorKind::NotFound)
    }

    /// Whether this error was detected before anything ran.
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::EmptyCommand)
    }
}
