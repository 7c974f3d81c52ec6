//! Report source contracts, fixture-backed sources, and document extractors.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ig_core::Report;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

mod extract;

pub use extract::{
    text_path_for, DocExtractor, ExtractError, Extractor, ExtractorSet, HtmlExtractor, Metadata,
    PdfExtractor,
};

pub const CRATE_NAME: &str = "ig-adapters";

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("{0}")]
    Message(String),
    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

/// Something that yields already-scraped report records for one inspector.
#[async_trait]
pub trait ReportSource: Send + Sync {
    fn inspector(&self) -> &str;

    /// Earliest year this source has reports for; used by `--archive`.
    fn archive_year(&self) -> Option<i32>;

    async fn reports(&self, years: &[i32]) -> Result<Vec<Report>, SourceError>;
}

/// Captured output of a scraper run, stored as JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixtureBundle {
    pub inspector: String,
    #[serde(default)]
    pub archive_year: Option<i32>,
    #[serde(default)]
    pub captured_from_url: Option<String>,
    #[serde(default)]
    pub fetched_at: Option<DateTime<Utc>>,
    pub reports: Vec<Report>,
}

pub fn load_fixture_bundle(path: impl AsRef<Path>) -> Result<FixtureBundle> {
    read_json_file(path)
}

fn read_json_file<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<T> {
    let path = path.as_ref();
    let data = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&data).with_context(|| format!("parsing {}", path.display()))
}

/// Year a raw record claims, before normalization: explicit `year`, else the
/// `published_on` prefix.
fn claimed_year(report: &Report) -> Option<i32> {
    report.year.or_else(|| {
        report
            .published_on
            .as_deref()?
            .trim()
            .split('-')
            .next()?
            .parse()
            .ok()
    })
}

#[derive(Debug, Clone)]
pub struct FixtureReportSource {
    bundle: FixtureBundle,
}

impl FixtureReportSource {
    pub fn new(bundle: FixtureBundle) -> Self {
        Self { bundle }
    }

    pub fn bundle(&self) -> &FixtureBundle {
        &self.bundle
    }
}

#[async_trait]
impl ReportSource for FixtureReportSource {
    fn inspector(&self) -> &str {
        &self.bundle.inspector
    }

    fn archive_year(&self) -> Option<i32> {
        self.bundle.archive_year
    }

    async fn reports(&self, years: &[i32]) -> Result<Vec<Report>, SourceError> {
        debug!(
            inspector = %self.bundle.inspector,
            captured_from = self.bundle.captured_from_url.as_deref().unwrap_or("<unknown>"),
            fetched_at = ?self.bundle.fetched_at,
            "reading fixture bundle"
        );
        // Records without a readable year are kept so validation can reject them loudly.
        Ok(self
            .bundle
            .reports
            .iter()
            .filter(|r| claimed_year(r).map_or(true, |y| years.contains(&y)))
            .cloned()
            .collect())
    }
}

/// Open the report source for `inspector` from its captured bundle.
pub fn source_for_inspector(
    inspector: &str,
    bundle_path: impl AsRef<Path>,
) -> Result<Box<dyn ReportSource>, SourceError> {
    let bundle = load_fixture_bundle(bundle_path)?;
    if bundle.inspector != inspector {
        return Err(SourceError::Message(format!(
            "bundle inspector={} does not match requested inspector={}",
            bundle.inspector, inspector
        )));
    }
    Ok(Box::new(FixtureReportSource::new(bundle)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn workspace_root() -> PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("../..")
            .canonicalize()
            .expect("workspace root")
    }

    fn fixture_bundle_path(inspector: &str) -> PathBuf {
        workspace_root()
            .join("fixtures")
            .join(inspector)
            .join("sample")
            .join("bundle.json")
    }

    #[tokio::test]
    async fn fixture_source_filters_by_requested_years() {
        let source = source_for_inspector("epa", fixture_bundle_path("epa")).unwrap();
        assert_eq!(source.inspector(), "epa");
        assert_eq!(source.archive_year(), Some(2019));

        let reports = source.reports(&[2020]).await.unwrap();
        let ids = reports
            .iter()
            .map(|r| r.report_id.clone().unwrap())
            .collect::<Vec<_>>();
        assert_eq!(ids, vec!["20-P-0101", "20-P-0102", "19-p-0001"]);
    }

    #[tokio::test]
    async fn fixture_source_keeps_extra_fields() {
        let source = source_for_inspector("epa", fixture_bundle_path("epa")).unwrap();
        let reports = source.reports(&[2019]).await.unwrap();
        assert_eq!(reports.len(), 1);
        assert_eq!(
            reports[0].extra.get("topic").and_then(|v| v.as_str()),
            Some("Grants")
        );
    }

    #[tokio::test]
    async fn records_without_a_year_are_passed_through() {
        let bundle = FixtureBundle {
            inspector: "gao".into(),
            archive_year: None,
            captured_from_url: None,
            fetched_at: None,
            reports: vec![Report {
                report_id: Some("undated".into()),
                published_on: Some("sometime".into()),
                ..Report::default()
            }],
        };
        let source = FixtureReportSource::new(bundle);
        assert_eq!(source.reports(&[2024]).await.unwrap().len(), 1);
    }

    #[test]
    fn mismatched_bundle_is_rejected() {
        let err = source_for_inspector("doj", fixture_bundle_path("epa"))
            .err()
            .expect("mismatch error");
        assert!(err.to_string().contains("does not match"));
    }
}
