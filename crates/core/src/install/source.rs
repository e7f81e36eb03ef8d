//! Download sources.

use std::time::Duration;

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use tracing::debug;

use super::error::InstallError;

/// An opened download body.
pub struct SourceStream {
    /// Announced body length, when the source knows it.
    pub content_length: Option<u64>,
    /// Body bytes, in arbitrary-sized pieces.
    pub body: BoxStream<'static, Result<Vec<u8>, InstallError>>,
}

impl std::fmt::Debug for SourceStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceStream")
            .field("content_length", &self.content_length)
            .finish_non_exhaustive()
    }
}

/// Where a [`DownloadJob`](super::DownloadJob) reads its bytes from.
#[async_trait]
pub trait DownloadSource: Send + Sync {
    /// Human-readable description for logs.
    fn describe(&self) -> String;

    /// Opens the body. Called once per job.
    async fn open(&self) -> Result<SourceStream, InstallError>;
}

/// HTTP(S) source backed by reqwest's streaming body.
#[derive(Debug, Clone)]
pub struct HttpSource {
    url: String,
    client: reqwest::Client,
}

impl HttpSource {
    /// Creates a source for `url` with a client that times out connecting
    /// after `connect_timeout`.
    pub fn new(url: impl Into<String>, connect_timeout: Duration) -> Result<Self, InstallError> {
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .build()?;
        Ok(Self::with_client(url, client))
    }

    /// Creates a source sharing an existing client.
    pub fn with_client(url: impl Into<String>, client: reqwest::Client) -> Self {
        Self {
            url: url.into(),
            client,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl DownloadSource for HttpSource {
    fn describe(&self) -> String {
        self.url.clone()
    }

    async fn open(&self) -> Result<SourceStream, InstallError> {
        debug!("GET {}", self.url);
        let response = self.client.get(&self.url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(InstallError::network(format!(
                "{} returned {}",
                self.url, status
            )));
        }

        let content_length = response.content_length();
        let body = response
            .bytes_stream()
            .map(|chunk| chunk.map(|bytes| bytes.to_vec()).map_err(InstallError::from))
            .boxed();

        Ok(SourceStream {
            content_length,
            body,
        })
    }
}
