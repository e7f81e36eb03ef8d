//! Version probing of external binaries.

use std::path::Path;
use std::time::Duration;

use tracing::debug;

use super::error::InstallError;
use crate::process::{ProcessError, ProcessExit, ProcessHandlers, ProcessRunner};

/// Flags tried in order until one prints a version line.
pub const VERSION_FLAGS: [&str; 2] = ["-version", "--version"];

const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Extracts the token following the word `version` on a version line.
///
/// `"ffmpeg version 6.1.1-static https://..."` yields `"6.1.1-static"`.
pub fn parse_version_line(line: &str) -> Option<String> {
    let mut tokens = line.split_whitespace();
    tokens.find(|t| t.eq_ignore_ascii_case("version"))?;
    tokens
        .next()
        .map(|t| t.trim_end_matches(',').to_string())
        .filter(|t| !t.is_empty())
}

/// Runs `<binary> -version` (then `--version`) and parses its first line.
pub async fn probe_version(path: &Path) -> Result<String, InstallError> {
    let mut last_reason = String::from("no version output");

    for flag in VERSION_FLAGS {
        match first_line(path, flag).await {
            Ok(Some(line)) => match parse_version_line(&line) {
                Some(version) => {
                    debug!("{} reports version {}", path.display(), version);
                    return Ok(version);
                }
                None => last_reason = format!("unrecognised version line: {}", line),
            },
            Ok(None) => {}
            Err(ProbeFailure::Spawn(e)) => {
                return Err(InstallError::version_probe(path, e.to_string()));
            }
            Err(ProbeFailure::Other(reason)) => last_reason = reason,
        }
    }

    Err(InstallError::version_probe(path, last_reason))
}

enum ProbeFailure {
    Spawn(ProcessError),
    Other(String),
}

/// First output line of a successful `<binary> <flag>` run.
async fn first_line(path: &Path, flag: &str) -> Result<Option<String>, ProbeFailure> {
    let argv = vec![path.to_string_lossy().into_owned(), flag.to_string()];
    let mut handlers = ProcessHandlers::new();
    let mut stdout = handlers.subscribe_stdout();

    let handle = ProcessRunner::with_defaults()
        .with_stdin(false)
        .execute(&argv, None, handlers)
        .map_err(ProbeFailure::Spawn)?;

    let exit = match tokio::time::timeout(PROBE_TIMEOUT, handle.wait()).await {
        Ok(exit) => exit,
        Err(_) => {
            handle.cancel();
            handle.wait().await;
            return Err(ProbeFailure::Other(format!(
                "{} did not answer within {:?}",
                flag, PROBE_TIMEOUT
            )));
        }
    };

    if exit != ProcessExit::Exited(0) {
        return Ok(None);
    }

    // Every line is delivered before the exit outcome is published.
    while let Ok(line) = stdout.try_recv() {
        if !line.trim().is_empty() {
            return Ok(Some(line));
        }
    }
    Ok(None)
}
