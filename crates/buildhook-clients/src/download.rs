//! HTTP artifact downloads.

use std::path::Path;

use async_trait::async_trait;
use buildhook_core::service::ArtifactDownloader;
use buildhook_core::{Error, Result};
use futures::StreamExt;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};
use url::Url;

use crate::error::ClientError;

/// Streams artifacts over HTTP(S) straight to disk.
#[derive(Default)]
pub struct HttpDownloader {
    client: reqwest::Client,
}

impl HttpDownloader {
    pub fn new() -> Self {
        Self::default()
    }

    async fn fetch(&self, url: Url, dest: &Path) -> std::result::Result<u64, ClientError> {
        let response = self.client.get(url.clone()).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ClientError::Api(format!("{} returned {}", url, status)));
        }

        let mut file = File::create(dest).await?;
        let mut stream = response.bytes_stream();
        let mut written = 0u64;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;
        Ok(written)
    }
}

/// Parse a download URL, accepting only HTTP(S).
pub fn parse_download_url(url: &str) -> Result<Url> {
    let parsed = Url::parse(url).map_err(|e| Error::InvalidInput(format!("{}: {}", url, e)))?;
    match parsed.scheme() {
        "http" | "https" => Ok(parsed),
        scheme => Err(Error::InvalidInput(format!(
            "unsupported download scheme {}",
            scheme
        ))),
    }
}

#[async_trait]
impl ArtifactDownloader for HttpDownloader {
    async fn download(&self, url: &str, dest: &Path) -> Result<()> {
        let parsed = parse_download_url(url)?;
        debug!(url, dest = %dest.display(), "Downloading artifact");

        let written = self
            .fetch(parsed, dest)
            .await
            .map_err(|e| Error::Download(e.to_string()))?;

        info!(url, bytes = written, "Artifact downloaded");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_http_urls_are_downloaded() {
        assert!(parse_download_url("https://copr.example.org/foo.src.rpm").is_ok());
        assert!(parse_download_url("http://localhost:8080/foo.src.rpm").is_ok());
        assert!(matches!(
            parse_download_url("file:///etc/passwd"),
            Err(Error::InvalidInput(_))
        ));
        assert!(matches!(
            parse_download_url("base-srpm-url"),
            Err(Error::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_invalid_url_is_rejected_before_io() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("foo.src.rpm");

        let result = HttpDownloader::new().download("not a url", &dest).await;

        assert!(matches!(result, Err(Error::InvalidInput(_))));
        assert!(!dest.exists());
    }

    #[tokio::test]
    #[ignore = "requires network access"]
    async fn test_download() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("index.html");
        HttpDownloader::new()
            .download("https://example.org/", &dest)
            .await
            .unwrap();
        assert!(dest.metadata().unwrap().len() > 0);
    }
}
