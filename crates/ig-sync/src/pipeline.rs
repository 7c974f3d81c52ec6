use std::path::Path;

use ig_adapters::ExtractorSet;
use ig_core::{
    is_binary_file_type, normalize_report, validate_report, FileKind, Report, ReportKey,
    ReportViolation, ScrapeOptions,
};
use ig_storage::{write_json, DataLayout, DownloadOptions, Downloader};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::uniqueness::{IndexError, UniquenessIndex};

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("[{inspector}][{report_type}][{published_on}][{report_id}] Invalid report: {violation}\n\n{record}")]
    Invalid {
        inspector: String,
        report_type: String,
        published_on: String,
        report_id: String,
        violation: ReportViolation,
        record: String,
    },
    #[error(transparent)]
    Index(#[from] IndexError),
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

impl ReportError {
    fn invalid(report: &Report, violation: ReportViolation) -> Self {
        let field = |value: &Option<String>| value.clone().unwrap_or_else(|| "-".to_string());
        ReportError::Invalid {
            inspector: field(&report.inspector),
            report_type: field(&report.report_type),
            published_on: field(&report.published_on),
            report_id: field(&report.report_id),
            violation,
            record: serde_json::to_string_pretty(report)
                .unwrap_or_else(|err| format!("<unserializable report: {err}>")),
        }
    }
}

/// Normalize -> validate -> uniqueness -> download -> extract -> persist, one
/// report at a time. Owns the run's uniqueness index.
pub struct ReportPipeline {
    layout: DataLayout,
    options: ScrapeOptions,
    index: UniquenessIndex,
    downloader: Box<dyn Downloader>,
    extractors: ExtractorSet,
}

impl ReportPipeline {
    pub fn new(
        layout: DataLayout,
        options: ScrapeOptions,
        index: UniquenessIndex,
        downloader: Box<dyn Downloader>,
        extractors: ExtractorSet,
    ) -> Self {
        Self {
            layout,
            options,
            index,
            downloader,
            extractors,
        }
    }

    pub fn index(&self) -> &UniquenessIndex {
        &self.index
    }

    pub fn finalize(&mut self) -> anyhow::Result<()> {
        self.index.finalize()
    }

    /// Run one report through the pipeline.
    ///
    /// `Ok(true)` when everything was saved, `Ok(false)` when the download failed
    /// and the report was skipped. An invalid report is an `Err` and nothing is
    /// written for it.
    pub async fn save_report(&mut self, report: &mut Report) -> Result<bool, ReportError> {
        normalize_report(report);
        let key = validate_report(report).map_err(|violation| ReportError::invalid(report, violation))?;

        self.index.check(&key.inspector, &key.report_id, key.year)?;

        info!(
            "[{}][{}][{}]",
            report.report_type.as_deref().unwrap_or_default(),
            report.published_on.as_deref().unwrap_or_default(),
            key.report_id
        );

        if self.options.dry_run {
            info!("\tdry run: skipping download and extraction");
            if !self.options.quick {
                if let Some(url) = report.url.as_deref() {
                    if let Err(err) = self.downloader.check_url(url).await {
                        warn!(url, error = %err, "\treport URL is not reachable");
                    }
                }
            }
        } else if report.is_unreleased() {
            info!("\tno download/extraction of unreleased report");
        } else {
            let Some(report_path) = self.download(report, &key).await else {
                warn!("\terror downloading report: sadly, skipping.");
                return Ok(false);
            };
            info!("\treport: {}", report_path.display());
            self.extract(report, &report_path).await;
        }

        let data_path = self.layout.report_path(&key, "json");
        write_json(&data_path, report).await?;
        info!("\tdata: {}", data_path.display());
        Ok(true)
    }

    async fn download(&self, report: &Report, key: &ReportKey) -> Option<std::path::PathBuf> {
        // validation guarantees both for released reports
        let (Some(url), Some(file_type)) = (report.url.as_deref(), report.file_type.as_deref())
        else {
            return None;
        };
        let destination = self.layout.report_path(key, file_type);
        let options = DownloadOptions {
            binary: is_binary_file_type(file_type),
        };
        match self.downloader.download(url, &destination, options).await {
            Ok(()) => Some(destination),
            Err(err) => {
                warn!(url, error = %err, "download failed");
                None
            }
        }
    }

    async fn extract(&self, report: &mut Report, report_path: &Path) {
        let kind = report.file_kind();
        let Some(extractor) = self.extractors.for_kind(kind) else {
            let file_type = report.file_type.as_deref().unwrap_or_default();
            warn!(file_type, "Unknown file type, don't know how to extract metadata!");
            warn!(file_type, "Unknown file type, don't know how to extract text!");
            return;
        };

        // extractors shell out and write files synchronously
        let wants_metadata = matches!(kind, FileKind::Pdf | FileKind::Doc);
        let path = report_path.to_path_buf();
        let extracted = tokio::task::spawn_blocking(move || {
            let metadata = if wants_metadata {
                extractor.metadata(&path)
            } else {
                Ok(None)
            };
            (metadata, extractor.text(&path))
        })
        .await;
        let (metadata, text) = match extracted {
            Ok(results) => results,
            Err(err) => {
                warn!(error = %err, "extraction task failed");
                return;
            }
        };

        match metadata {
            Ok(Some(metadata)) => {
                for (key, value) in &metadata {
                    debug!("\t{key}: {value}");
                }
                report.set_metadata(kind, metadata);
            }
            Ok(None) => {}
            Err(err) => warn!(error = %err, "metadata extraction failed"),
        }

        match text {
            Ok(Some(text_path)) => info!("\ttext: {}", text_path.display()),
            Ok(None) => {}
            Err(err) => warn!(error = %err, "text extraction failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::MemoryNotifier;
    use crate::testing::{FakeDownloader, FakeExtractor};
    use std::sync::Arc;
    use tempfile::{tempdir, TempDir};

    fn report(report_id: &str, published_on: &str, url: Option<&str>) -> Report {
        Report {
            inspector: Some("doj".into()),
            inspector_url: Some("https://oig.justice.gov".into()),
            agency: Some("fbi".into()),
            agency_name: Some("Federal Bureau of Investigation".into()),
            report_id: Some(report_id.into()),
            title: Some("Audit of Confidential Human Sources".into()),
            published_on: Some(published_on.into()),
            url: url.map(Into::into),
            ..Report::default()
        }
    }

    fn pipeline(
        options: ScrapeOptions,
        downloader: FakeDownloader,
    ) -> (TempDir, Arc<MemoryNotifier>, ReportPipeline) {
        let dir = tempdir().expect("tempdir");
        let notifier = Arc::new(MemoryNotifier::default());
        let layout = DataLayout::new(dir.path().join("data"), dir.path().join("cache"));
        let index = UniquenessIndex::new(layout.clone(), notifier.clone());
        let extractors = ExtractorSet::new(
            Box::new(FakeExtractor::with_metadata("Pages", "12")),
            Box::new(FakeExtractor::with_metadata("Author", "OIG")),
            Box::new(FakeExtractor::text_only()),
        );
        let pipeline = ReportPipeline::new(layout, options, index, Box::new(downloader), extractors);
        (dir, notifier, pipeline)
    }

    fn read_json(path: &Path) -> serde_json::Value {
        serde_json::from_str(&std::fs::read_to_string(path).expect("read")).expect("parse")
    }

    #[tokio::test]
    async fn pdf_report_is_downloaded_extracted_and_persisted() {
        let downloader = FakeDownloader::default();
        let (dir, _notifier, mut pipeline) = pipeline(ScrapeOptions::default(), downloader.clone());
        let mut report = report("21-045", "2021-04-02", Some("https://oig.justice.gov/reports/21-045.pdf"));

        assert!(pipeline.save_report(&mut report).await.unwrap());

        let report_dir = dir.path().join("data/doj/2021/21-045");
        assert!(report_dir.join("report.pdf").exists());
        assert!(report_dir.join("report.txt").exists());
        let saved = read_json(&report_dir.join("report.json"));
        assert_eq!(saved["year"], 2021);
        assert_eq!(saved["type"], "report");
        assert_eq!(saved["file_type"], "pdf");
        assert_eq!(saved["pdf"]["Pages"], "12");
        assert_eq!(downloader.downloads(), vec![("https://oig.justice.gov/reports/21-045.pdf".to_string(), true)]);
    }

    #[tokio::test]
    async fn html_report_gets_text_but_no_metadata() {
        let (dir, _notifier, mut pipeline) = pipeline(ScrapeOptions::default(), FakeDownloader::default());
        let mut report = report("21-061", "2021-07-19", Some("https://oig.justice.gov/reports/inspection.aspx"));

        assert!(pipeline.save_report(&mut report).await.unwrap());

        let report_dir = dir.path().join("data/doj/2021/21-061");
        assert!(report_dir.join("report.aspx").exists());
        assert!(report_dir.join("report.txt").exists());
        let saved = read_json(&report_dir.join("report.json"));
        assert!(saved.get("pdf").is_none());
        assert!(saved.get("doc").is_none());
    }

    #[tokio::test]
    async fn unknown_file_type_skips_extraction_but_persists() {
        let (dir, _notifier, mut pipeline) = pipeline(ScrapeOptions::default(), FakeDownloader::default());
        let mut report = report("21-070", "2021-08-01", Some("https://oig.justice.gov/reports/21-070.xlsx"));

        assert!(pipeline.save_report(&mut report).await.unwrap());

        let report_dir = dir.path().join("data/doj/2021/21-070");
        assert!(report_dir.join("report.xlsx").exists());
        assert!(!report_dir.join("report.txt").exists());
        assert!(report_dir.join("report.json").exists());
    }

    #[tokio::test]
    async fn failed_download_returns_false_and_writes_nothing() {
        let url = "https://oig.justice.gov/reports/missing.pdf";
        let downloader = FakeDownloader::failing_on(url);
        let (dir, _notifier, mut pipeline) = pipeline(ScrapeOptions::default(), downloader);
        let mut report = report("21-099", "2021-09-09", Some(url));

        assert!(!pipeline.save_report(&mut report).await.unwrap());
        assert!(!dir.path().join("data/doj/2021/21-099/report.json").exists());
    }

    #[tokio::test]
    async fn invalid_report_is_a_hard_error_with_context() {
        let downloader = FakeDownloader::default();
        let (dir, _notifier, mut pipeline) = pipeline(ScrapeOptions::default(), downloader.clone());
        let mut report = report("21-045", "2021-4-02", Some("https://oig.justice.gov/reports/21-045.pdf"));

        let err = pipeline.save_report(&mut report).await.unwrap_err();
        match &err {
            ReportError::Invalid { violation, report_id, inspector, .. } => {
                assert_eq!(violation, &ReportViolation::UnpaddedDate);
                assert_eq!(report_id, "21-045");
                assert_eq!(inspector, "doj");
            }
            other => panic!("unexpected error: {other}"),
        }
        let rendered = err.to_string();
        assert!(rendered.starts_with("[doj][report][2021-4-02][21-045] Invalid report:"));
        assert!(rendered.contains("\"agency_name\""));
        assert!(downloader.downloads().is_empty());
        assert!(!dir.path().join("data/doj").exists());
        assert!(pipeline.index().messages().is_empty());
    }

    #[tokio::test]
    async fn dry_run_checks_url_and_skips_download() {
        let downloader = FakeDownloader::default();
        let options = ScrapeOptions {
            dry_run: true,
            ..ScrapeOptions::default()
        };
        let (dir, _notifier, mut pipeline) = pipeline(options, downloader.clone());
        let mut report = report("21-045", "2021-04-02", Some("https://oig.justice.gov/reports/21-045.pdf"));

        assert!(pipeline.save_report(&mut report).await.unwrap());
        assert!(downloader.downloads().is_empty());
        assert_eq!(downloader.checked(), vec!["https://oig.justice.gov/reports/21-045.pdf".to_string()]);
        let report_dir = dir.path().join("data/doj/2021/21-045");
        assert!(!report_dir.join("report.pdf").exists());
        assert!(report_dir.join("report.json").exists());
    }

    #[tokio::test]
    async fn dry_run_with_unreachable_url_still_persists() {
        let url = "https://oig.justice.gov/reports/gone.pdf";
        let downloader = FakeDownloader::failing_on(url);
        let options = ScrapeOptions {
            dry_run: true,
            ..ScrapeOptions::default()
        };
        let (dir, _notifier, mut pipeline) = pipeline(options, downloader.clone());
        let mut report = report("21-088", "2021-03-03", Some(url));

        assert!(pipeline.save_report(&mut report).await.unwrap());
        assert_eq!(downloader.checked(), vec![url.to_string()]);
        assert!(downloader.downloads().is_empty());
        assert!(dir.path().join("data/doj/2021/21-088/report.json").exists());
    }

    #[tokio::test]
    async fn quick_dry_run_skips_the_url_check() {
        let downloader = FakeDownloader::default();
        let options = ScrapeOptions {
            dry_run: true,
            quick: true,
            ..ScrapeOptions::default()
        };
        let (_dir, _notifier, mut pipeline) = pipeline(options, downloader.clone());
        let mut report = report("21-045", "2021-04-02", Some("https://oig.justice.gov/reports/21-045.pdf"));

        assert!(pipeline.save_report(&mut report).await.unwrap());
        assert!(downloader.checked().is_empty());
    }

    #[tokio::test]
    async fn unreleased_report_is_persisted_without_download() {
        let downloader = FakeDownloader::default();
        let (dir, _notifier, mut pipeline) = pipeline(ScrapeOptions::default(), downloader.clone());
        let mut report = report("21-100", "2021-10-01", None);
        report.unreleased = Some(true);
        report.landing_url = Some("https://oig.justice.gov/reports/21-100".into());

        assert!(pipeline.save_report(&mut report).await.unwrap());
        assert!(downloader.downloads().is_empty());
        let saved = read_json(&dir.path().join("data/doj/2021/21-100/report.json"));
        assert_eq!(saved["unreleased"], true);
    }

    #[tokio::test]
    async fn repeated_report_id_is_flagged_but_still_saved() {
        let (dir, notifier, mut pipeline) = pipeline(ScrapeOptions::default(), FakeDownloader::default());
        let mut first = report("21-045", "2021-04-02", Some("https://oig.justice.gov/a/21-045.pdf"));
        let mut second = report("21-045", "2022-01-05", Some("https://oig.justice.gov/b/21-045.pdf"));

        assert!(pipeline.save_report(&mut first).await.unwrap());
        assert!(pipeline.save_report(&mut second).await.unwrap());
        assert!(dir.path().join("data/doj/2022/21-045/report.json").exists());
        assert_eq!(pipeline.index().messages().len(), 1);

        pipeline.finalize().unwrap();
        assert_eq!(
            notifier.sent(),
            vec!["[doj] Duplicate report_id: 21-045 has been used twice this session".to_string()]
        );
    }
}
