//! Scripted download source for testing.

use std::io::{Cursor, Write};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use tokio::sync::Semaphore;

use crate::install::{DownloadSource, InstallError, SourceStream};

/// A [`DownloadSource`] that replays a fixed list of chunks.
///
/// With a gate attached, every chunk waits for one semaphore permit, which
/// lets a test hold the body mid-stream while it pauses or cancels the job.
///
/// # Example
///
/// ```rust,ignore
/// use clipforge_core::testing::ScriptedSource;
///
/// let gate = Arc::new(Semaphore::new(0));
/// let source = ScriptedSource::new(vec![b"abcd".to_vec(); 4]).with_gate(gate.clone());
/// let handle = DownloadJob::new(Arc::new(source), dir, config).start();
/// gate.add_permits(1); // release one chunk
/// ```
#[derive(Debug, Default)]
pub struct ScriptedSource {
    chunks: Vec<Vec<u8>>,
    content_length: Option<u64>,
    gate: Option<Arc<Semaphore>>,
    fail_after: Option<(usize, String)>,
    open_error: Option<String>,
    opened: AtomicUsize,
}

impl ScriptedSource {
    /// Replays `chunks`; the announced length is their total size.
    pub fn new(chunks: Vec<Vec<u8>>) -> Self {
        let total = chunks.iter().map(|c| c.len() as u64).sum();
        Self {
            chunks,
            content_length: Some(total),
            ..Default::default()
        }
    }

    /// Splits `body` into pieces of `piece` bytes.
    pub fn from_bytes(body: &[u8], piece: usize) -> Self {
        Self::new(body.chunks(piece.max(1)).map(<[u8]>::to_vec).collect())
    }

    /// Overrides the announced length (`None` for unknown).
    pub fn with_content_length(mut self, length: Option<u64>) -> Self {
        self.content_length = length;
        self
    }

    /// Makes every chunk wait for one permit of `gate`.
    pub fn with_gate(mut self, gate: Arc<Semaphore>) -> Self {
        self.gate = Some(gate);
        self
    }

    /// Yields a network error instead of chunk number `index`.
    pub fn failing_at(mut self, index: usize, reason: impl Into<String>) -> Self {
        self.fail_after = Some((index, reason.into()));
        self
    }

    /// Makes `open` itself fail.
    pub fn failing_open(mut self, reason: impl Into<String>) -> Self {
        self.open_error = Some(reason.into());
        self
    }

    /// How many times the source was opened.
    pub fn open_count(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DownloadSource for ScriptedSource {
    fn describe(&self) -> String {
        format!("scripted source ({} chunks)", self.chunks.len())
    }

    async fn open(&self) -> Result<SourceStream, InstallError> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        if let Some(reason) = &self.open_error {
            return Err(InstallError::network(reason.clone()));
        }

        let chunks = self.chunks.clone();
        let gate = self.gate.clone();
        let fail_after = self.fail_after.clone();

        let body = stream::unfold(0usize, move |index| {
            let chunk = chunks.get(index).cloned();
            let gate = gate.clone();
            let failure = fail_after
                .as_ref()
                .filter(|(at, _)| *at == index)
                .map(|(_, reason)| reason.clone());
            async move {
                if failure.is_none() && chunk.is_none() {
                    return None;
                }
                if let Some(gate) = gate {
                    gate.acquire().await.ok()?.forget();
                }
                if let Some(reason) = failure {
                    // Ends the stream after the error.
                    return Some((Err(InstallError::network(reason)), usize::MAX));
                }
                chunk.map(|chunk| (Ok(chunk), index + 1))
            }
        })
        .boxed();

        Ok(SourceStream {
            content_length: self.content_length,
            body,
        })
    }
}

/// Builds an in-memory zip. Names ending in `/` become directories.
pub fn zip_archive(entries: &[(&str, &str)]) -> Result<Vec<u8>, zip::result::ZipError> {
    let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
    for (name, data) in entries {
        let options = zip::write::SimpleFileOptions::default().unix_permissions(0o755);
        if name.ends_with('/') {
            zip.add_directory(*name, options)?;
        } else {
            zip.start_file(*name, options)?;
            zip.write_all(data.as_bytes())?;
        }
    }
    Ok(zip.finish()?.into_inner())
}

/// Builds an in-memory zip whose `entries` extract cleanly, followed by one
/// more entry that fails its checksum when read.
pub fn corrupt_zip_archive(entries: &[(&str, &str)]) -> Result<Vec<u8>, zip::result::ZipError> {
    const MARKER: &[u8] = b"corrupted-entry-body";

    let options = zip::write::SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Stored)
        .unix_permissions(0o755);
    let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
    for (name, data) in entries {
        zip.start_file(*name, options)?;
        zip.write_all(data.as_bytes())?;
    }
    zip.start_file("zz-corrupt.dat", options)?;
    zip.write_all(MARKER)?;
    let mut bytes = zip.finish()?.into_inner();

    // Stored entries keep their body verbatim, so flipping it breaks the CRC.
    if let Some(at) = bytes.windows(MARKER.len()).position(|w| w == MARKER) {
        bytes[at] ^= 0xff;
    }
    Ok(bytes)
}
