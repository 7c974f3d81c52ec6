//! On-disk report layout, atomic writes, and the HTTP download collaborator.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use ig_core::ReportKey;
use reqwest::StatusCode;
use serde::Serialize;
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info_span, Instrument};
use uuid::Uuid;

pub const CRATE_NAME: &str = "ig-storage";

/// Roots for persisted reports and the auxiliary per-inspector cache.
#[derive(Debug, Clone)]
pub struct DataLayout {
    data_root: PathBuf,
    cache_root: PathBuf,
}

impl DataLayout {
    pub fn new(data_root: impl Into<PathBuf>, cache_root: impl Into<PathBuf>) -> Self {
        Self {
            data_root: data_root.into(),
            cache_root: cache_root.into(),
        }
    }

    pub fn data_root(&self) -> &Path {
        &self.data_root
    }

    pub fn cache_root(&self) -> &Path {
        &self.cache_root
    }

    pub fn inspector_dir(&self, inspector: &str) -> PathBuf {
        self.data_root.join(inspector)
    }

    /// `<data_root>/<inspector>/<year>/<report_id>/report.<ext>`
    pub fn report_path(&self, key: &ReportKey, extension: &str) -> PathBuf {
        self.data_root.join(key.relative_path(extension))
    }

    /// `<cache_root>/<inspector>/<path>`
    pub fn cache_path(&self, inspector: &str, path: impl AsRef<Path>) -> PathBuf {
        self.cache_root.join(inspector).join(path)
    }
}

/// Replace `path` with `bytes` via a temp file in the same directory and a rename,
/// so readers never observe a half-written report.
pub async fn write_atomic(path: &Path, bytes: &[u8]) -> anyhow::Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("{} has no parent directory", path.display()))?;
    fs::create_dir_all(parent)
        .await
        .with_context(|| format!("creating directory {}", parent.display()))?;

    let temp_path = parent.join(format!(".{}.{}.tmp", Uuid::new_v4(), bytes.len()));
    let mut file = fs::OpenOptions::new()
        .create_new(true)
        .write(true)
        .open(&temp_path)
        .await
        .with_context(|| format!("opening temp file {}", temp_path.display()))?;
    file.write_all(bytes)
        .await
        .with_context(|| format!("writing temp file {}", temp_path.display()))?;
    file.flush()
        .await
        .with_context(|| format!("flushing temp file {}", temp_path.display()))?;
    drop(file);

    if let Err(err) = fs::rename(&temp_path, path).await {
        let _ = fs::remove_file(&temp_path).await;
        return Err(err).with_context(|| {
            format!(
                "atomically renaming {} -> {}",
                temp_path.display(),
                path.display()
            )
        });
    }
    Ok(())
}

pub async fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> anyhow::Result<()> {
    let mut bytes = serde_json::to_vec_pretty(value)
        .with_context(|| format!("serializing {}", path.display()))?;
    bytes.push(b'\n');
    write_atomic(path, &bytes).await
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DownloadOptions {
    /// Keep the body as raw bytes instead of decoding it as text.
    pub binary: bool,
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("http status {status} for {url}")]
    HttpStatus { status: u16, url: String },
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

#[async_trait]
pub trait Downloader: Send + Sync {
    /// Fetch `url` into `destination`, creating parent directories as needed.
    async fn download(
        &self,
        url: &str,
        destination: &Path,
        options: DownloadOptions,
    ) -> Result<(), FetchError>;

    /// Confirm `url` answers successfully without saving the body.
    async fn check_url(&self, url: &str) -> Result<(), FetchError>;
}

#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    pub timeout: Duration,
    pub user_agent: Option<String>,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            user_agent: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct HttpDownloader {
    client: reqwest::Client,
}

impl HttpDownloader {
    pub fn new(config: HttpClientConfig) -> anyhow::Result<Self> {
        let mut builder = reqwest::Client::builder()
            .gzip(true)
            .brotli(true)
            .timeout(config.timeout);

        if let Some(user_agent) = &config.user_agent {
            builder = builder.user_agent(user_agent.clone());
        }

        let client = builder.build().context("building reqwest client")?;
        Ok(Self { client })
    }
}

fn ensure_success(status: StatusCode, url: &reqwest::Url) -> Result<(), FetchError> {
    if status.is_success() {
        Ok(())
    } else {
        Err(FetchError::HttpStatus {
            status: status.as_u16(),
            url: url.to_string(),
        })
    }
}

#[async_trait]
impl Downloader for HttpDownloader {
    async fn download(
        &self,
        url: &str,
        destination: &Path,
        options: DownloadOptions,
    ) -> Result<(), FetchError> {
        let span = info_span!("http_download", url, binary = options.binary);
        async {
            let resp = self.client.get(url).send().await?;
            ensure_success(resp.status(), resp.url())?;

            if options.binary {
                let body = resp.bytes().await?;
                write_atomic(destination, &body).await?;
            } else {
                let text = resp.text().await?;
                write_atomic(destination, text.as_bytes()).await?;
            }
            debug!(path = %destination.display(), "download stored");
            Ok::<(), FetchError>(())
        }
        .instrument(span)
        .await
    }

    async fn check_url(&self, url: &str) -> Result<(), FetchError> {
        let resp = self.client.head(url).send().await?;
        if resp.status() == StatusCode::METHOD_NOT_ALLOWED {
            let resp = self.client.get(url).send().await?;
            return ensure_success(resp.status(), resp.url());
        }
        ensure_success(resp.status(), resp.url())
    }
}
