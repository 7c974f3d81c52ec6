//! Core report record, field contract, and scrape options for the IG archiver.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

mod normalize;
mod options;
mod validate;

pub use normalize::{normalize_report, sanitize};
pub use options::{current_year, year_range, NoReportsFound, OptionsError, ScrapeOptions};
pub use validate::{validate_report, ReportViolation, REQUIRED_FIELDS};

pub const CRATE_NAME: &str = "ig-core";

/// Characters that would corrupt the `<inspector>/<year>/<report_id>/` layout.
pub const INVALID_REPORT_ID_CHARS: [char; 11] =
    ['/', '\\', ':', '*', '?', '"', '<', '>', '|', '\r', '\n'];

/// Extensions served as HTML pages rather than documents.
pub const HTML_FILE_EXTENSIONS: [&str; 6] = ["htm", "html", "cfm", "php", "asp", "aspx"];

/// A single inspector-general report as handed over by a report source.
///
/// Fields outside the known contract are kept in `extra` so nothing a source
/// records is lost on the way to `report.json`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Report {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inspector: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inspector_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agency: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agency_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_on: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<i32>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub report_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub landing_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unreleased: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pdf: Option<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doc: Option<BTreeMap<String, String>>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, JsonValue>,
}

impl Report {
    pub fn is_unreleased(&self) -> bool {
        self.unreleased == Some(true)
    }

    pub fn file_kind(&self) -> FileKind {
        self.file_type
            .as_deref()
            .map(FileKind::from_file_type)
            .unwrap_or(FileKind::Unknown)
    }

    /// Merge extracted document metadata under the key matching `kind`.
    pub fn set_metadata(&mut self, kind: FileKind, metadata: BTreeMap<String, String>) {
        match kind {
            FileKind::Pdf => self.pdf = Some(metadata),
            FileKind::Doc => self.doc = Some(metadata),
            FileKind::Html | FileKind::Unknown => {}
        }
    }
}

/// Identity of a validated report: where it lives and what it is keyed by.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReportKey {
    pub inspector: String,
    pub year: i32,
    pub report_id: String,
}

impl ReportKey {
    pub fn report_dir(&self) -> PathBuf {
        PathBuf::from(&self.inspector)
            .join(self.year.to_string())
            .join(&self.report_id)
    }

    /// `<inspector>/<year>/<report_id>/report.<ext>`
    pub fn relative_path(&self, extension: &str) -> PathBuf {
        self.report_dir().join(format!("report.{extension}"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FileKind {
    Pdf,
    Doc,
    Html,
    Unknown,
}

impl FileKind {
    pub fn from_file_type(file_type: &str) -> Self {
        let lower = file_type.trim().to_ascii_lowercase();
        match lower.as_str() {
            "pdf" => FileKind::Pdf,
            "doc" => FileKind::Doc,
            ext if HTML_FILE_EXTENSIONS.contains(&ext) => FileKind::Html,
            _ => FileKind::Unknown,
        }
    }
}

/// Whether a file type must be fetched as raw bytes rather than decoded text.
pub fn is_binary_file_type(file_type: &str) -> bool {
    matches!(
        file_type.trim().to_ascii_lowercase().as_str(),
        "pdf" | "doc" | "ppt"
    )
}

/// Replace every character that is unsafe in a report directory name with `-`.
pub fn slugify(report_id: &str) -> String {
    report_id
        .chars()
        .map(|c| if INVALID_REPORT_ID_CHARS.contains(&c) { '-' } else { c })
        .collect()
}
