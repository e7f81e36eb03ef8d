//! Error types for the command module.

use thiserror::Error;

/// Errors raised while serializing a command.
///
/// Every variant is a configuration problem: it is detected before anything
/// is spawned.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    /// No output path was set.
    #[error("No output path set")]
    MissingOutput,

    /// No input file was added.
    #[error("No input file added")]
    MissingInput,

    /// Binary path is empty.
    #[error("No binary path given")]
    MissingBinary,
}

impl CommandError {
    /// Whether this error should be presented as a configuration problem.
    pub fn is_configuration(&self) -> bool {
        true
    }
}
