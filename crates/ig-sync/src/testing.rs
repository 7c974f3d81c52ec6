//! In-process stand-ins for the network and extraction tools, for tests and
//! offline dry runs of the pipeline.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use ig_adapters::{text_path_for, ExtractError, Extractor, Metadata};
use ig_storage::{write_atomic, DownloadOptions, Downloader, FetchError};

#[derive(Debug, Default)]
struct DownloaderState {
    downloads: Vec<(String, bool)>,
    checked: Vec<String>,
}

/// Writes a placeholder body instead of fetching. Clones share their log.
#[derive(Debug, Clone, Default)]
pub struct FakeDownloader {
    failing: Vec<String>,
    state: Arc<Mutex<DownloaderState>>,
}

impl FakeDownloader {
    pub fn failing_on(url: impl Into<String>) -> Self {
        Self {
            failing: vec![url.into()],
            ..Self::default()
        }
    }

    /// `(url, binary)` for every successful download, in order.
    pub fn downloads(&self) -> Vec<(String, bool)> {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .downloads
            .clone()
    }

    pub fn checked(&self) -> Vec<String> {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .checked
            .clone()
    }

    fn fail(&self, url: &str) -> Result<(), FetchError> {
        if self.failing.iter().any(|u| u == url) {
            return Err(FetchError::HttpStatus {
                status: 404,
                url: url.to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl Downloader for FakeDownloader {
    async fn download(
        &self,
        url: &str,
        destination: &Path,
        options: DownloadOptions,
    ) -> Result<(), FetchError> {
        self.fail(url)?;
        write_atomic(destination, format!("fetched from {url}").as_bytes()).await?;
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .downloads
            .push((url.to_string(), options.binary));
        Ok(())
    }

    async fn check_url(&self, url: &str) -> Result<(), FetchError> {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .checked
            .push(url.to_string());
        self.fail(url)
    }
}

/// Returns canned metadata and writes a fixed text file.
#[derive(Debug, Clone, Default)]
pub struct FakeExtractor {
    metadata: Option<Metadata>,
}

impl FakeExtractor {
    pub fn with_metadata(key: &str, value: &str) -> Self {
        Self {
            metadata: Some(Metadata::from([(key.to_string(), value.to_string())])),
        }
    }

    pub fn text_only() -> Self {
        Self::default()
    }
}

impl Extractor for FakeExtractor {
    fn metadata(&self, _path: &Path) -> Result<Option<Metadata>, ExtractError> {
        Ok(self.metadata.clone())
    }

    fn text(&self, path: &Path) -> Result<Option<PathBuf>, ExtractError> {
        let text_path = text_path_for(path);
        fs::write(&text_path, "extracted text").map_err(|source| ExtractError::Io {
            context: format!("writing {}", text_path.display()),
            source,
        })?;
        Ok(Some(text_path))
    }
}
