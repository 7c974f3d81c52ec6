//! Scrape run orchestration: inspector registry, run configuration, the
//! per-report pipeline and the duplicate-id index behind it.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use ig_adapters::{source_for_inspector, ExtractorSet};
use ig_core::{current_year, year_range, NoReportsFound, ScrapeOptions};
use ig_storage::{DataLayout, Downloader, HttpClientConfig, HttpDownloader};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

mod notify;
mod pipeline;
pub mod testing;
mod uniqueness;

pub use notify::{FileNotifier, LogNotifier, MemoryNotifier, Notifier};
pub use pipeline::{ReportError, ReportPipeline};
pub use uniqueness::{IndexError, UniquenessIndex};

pub const CRATE_NAME: &str = "ig-sync";

const REGISTRY_FILE: &str = "inspectors.yaml";

#[derive(Debug, Clone, Deserialize)]
pub struct InspectorRegistry {
    pub inspectors: Vec<InspectorConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InspectorConfig {
    pub inspector: String,
    pub display_name: String,
    pub enabled: bool,
    /// Captured report bundle, relative to the workspace root.
    pub bundle: PathBuf,
    /// Earliest year for `--archive`; overrides the bundle's own value.
    #[serde(default)]
    pub archive: Option<i32>,
}

#[derive(Debug, Clone)]
pub struct ScrapeConfig {
    pub data_dir: PathBuf,
    pub cache_dir: PathBuf,
    pub user_agent: String,
    pub http_timeout_secs: u64,
    pub notify_file: Option<PathBuf>,
    pub workspace_root: PathBuf,
}

impl ScrapeConfig {
    pub fn from_env() -> Self {
        Self {
            data_dir: std::env::var("IG_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./data")),
            cache_dir: std::env::var("IG_CACHE_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./cache")),
            user_agent: std::env::var("IG_USER_AGENT")
                .unwrap_or_else(|_| "ig-archiver/0.1".to_string()),
            http_timeout_secs: std::env::var("IG_HTTP_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(30),
            notify_file: std::env::var("IG_NOTIFY_FILE")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from),
            workspace_root: PathBuf::from("."),
        }
    }
}

/// The swappable side-effecting pieces of a run.
pub struct Collaborators {
    pub downloader: Box<dyn Downloader>,
    pub extractors: ExtractorSet,
    pub notifier: Arc<dyn Notifier>,
}

impl Collaborators {
    /// reqwest downloads, the external extraction tools, and a file or log notifier.
    pub fn standard(config: &ScrapeConfig) -> Result<Self> {
        let downloader = HttpDownloader::new(HttpClientConfig {
            timeout: Duration::from_secs(config.http_timeout_secs),
            user_agent: Some(config.user_agent.clone()),
        })?;
        let notifier: Arc<dyn Notifier> = match &config.notify_file {
            Some(path) => Arc::new(FileNotifier::new(path)),
            None => Arc::new(LogNotifier),
        };
        Ok(Self {
            downloader: Box::new(downloader),
            extractors: ExtractorSet::standard(),
            notifier,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ScrapeRunSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub inspectors: usize,
    pub saved_reports: usize,
    pub failed_downloads: usize,
    pub invalid_reports: usize,
    /// Reports whose files could not be written.
    pub failed_saves: usize,
    pub empty_inspectors: Vec<String>,
    pub duplicate_messages: Vec<String>,
}

impl ScrapeRunSummary {
    pub fn found_nothing_somewhere(&self) -> bool {
        !self.empty_inspectors.is_empty()
    }
}

pub async fn load_registry(workspace_root: &Path) -> Result<InspectorRegistry> {
    let path = workspace_root.join(REGISTRY_FILE);
    let text = fs::read_to_string(&path)
        .await
        .with_context(|| format!("reading {}", path.display()))?;
    serde_yaml::from_str(&text).with_context(|| format!("parsing {}", path.display()))
}

/// Enabled inspectors, or exactly the requested ones (enabled or not), in
/// registry order.
fn select_inspectors(
    registry: InspectorRegistry,
    requested: &[String],
) -> Result<Vec<InspectorConfig>> {
    if requested.is_empty() {
        return Ok(registry.inspectors.into_iter().filter(|i| i.enabled).collect());
    }
    for name in requested {
        if !registry.inspectors.iter().any(|i| &i.inspector == name) {
            let known = registry
                .inspectors
                .iter()
                .map(|i| i.inspector.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            bail!("unknown inspector `{name}` (registered: {known})");
        }
    }
    Ok(registry
        .inspectors
        .into_iter()
        .filter(|i| requested.contains(&i.inspector))
        .collect())
}

fn describe_years(years: &[i32]) -> String {
    match (years.first(), years.last()) {
        (Some(first), Some(last)) if first != last => format!("{first}-{last}"),
        (Some(year), _) => year.to_string(),
        _ => "no years".to_string(),
    }
}

/// Scrape every selected inspector once.
///
/// Invalid reports, failed downloads and reports that could not be written are
/// counted and the run moves on. Registry, source and disk-scan failures abort it. Duplicate findings are sent through
/// the notifier before this returns, on either path.
pub async fn run_scrape(
    config: &ScrapeConfig,
    options: &ScrapeOptions,
    collaborators: Collaborators,
) -> Result<ScrapeRunSummary> {
    let started_at = Utc::now();
    let run_id = Uuid::new_v4();
    let registry = load_registry(&config.workspace_root).await?;
    let selected = select_inspectors(registry, &options.inspectors)?;
    info!(%run_id, inspectors = selected.len(), dry_run = options.dry_run, "scrape starting");

    let layout = DataLayout::new(&config.data_dir, &config.cache_dir);
    let index = UniquenessIndex::new(layout.clone(), collaborators.notifier);
    let mut pipeline = ReportPipeline::new(
        layout,
        options.clone(),
        index,
        collaborators.downloader,
        collaborators.extractors,
    );

    let mut saved_reports = 0usize;
    let mut failed_downloads = 0usize;
    let mut invalid_reports = 0usize;
    let mut failed_saves = 0usize;
    let mut empty_inspectors = Vec::new();

    for entry in &selected {
        if !entry.enabled {
            debug!(inspector = %entry.inspector, "running disabled inspector on request");
        }
        let bundle_path = config.workspace_root.join(&entry.bundle);
        let source = source_for_inspector(&entry.inspector, &bundle_path)
            .with_context(|| format!("opening source for {}", entry.inspector))?;

        let archive_year = entry.archive.or_else(|| source.archive_year());
        let years = year_range(options, archive_year, current_year())?;
        info!(inspector = %entry.inspector, name = %entry.display_name, years = %describe_years(&years), "scraping");

        let reports = source
            .reports(&years)
            .await
            .with_context(|| format!("listing reports for {}", entry.inspector))?;
        if reports.is_empty() {
            let empty = NoReportsFound::new(format!(
                "{} in {}",
                entry.inspector,
                describe_years(&years)
            ));
            warn!("{empty}");
            empty_inspectors.push(empty.to_string());
            continue;
        }

        for mut report in reports {
            let span = info_span!(
                "report",
                inspector = %entry.inspector,
                report_id = report.report_id.as_deref().unwrap_or("-")
            );
            match pipeline.save_report(&mut report).instrument(span).await {
                Ok(true) => saved_reports += 1,
                Ok(false) => failed_downloads += 1,
                Err(err @ ReportError::Invalid { .. }) => {
                    error!("{err}");
                    invalid_reports += 1;
                }
                Err(ReportError::Storage(err)) => {
                    error!(error = ?err, "could not save report");
                    failed_saves += 1;
                }
                Err(err @ ReportError::Index(_)) => return Err(err.into()),
            }
        }
    }

    let duplicate_messages = pipeline.index().messages().to_vec();
    pipeline.finalize()?;

    let summary = ScrapeRunSummary {
        run_id,
        started_at,
        finished_at: Utc::now(),
        inspectors: selected.len(),
        saved_reports,
        failed_downloads,
        invalid_reports,
        failed_saves,
        empty_inspectors,
        duplicate_messages,
    };
    info!(
        %run_id,
        saved = summary.saved_reports,
        failed = summary.failed_downloads,
        invalid = summary.invalid_reports,
        unsaved = summary.failed_saves,
        duplicates = summary.duplicate_messages.len(),
        "scrape complete"
    );
    Ok(summary)
}
