use std::collections::BTreeMap;
use std::ffi::OsStr;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;

use ig_core::FileKind;
use scraper::{Html, Node};
use thiserror::Error;

pub type Metadata = BTreeMap<String, String>;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("`{0}` is not installed")]
    ToolMissing(&'static str),
    #[error("`{tool}` exited with {status}: {stderr}")]
    ToolFailed {
        tool: &'static str,
        status: String,
        stderr: String,
    },
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },
}

/// Pulls document metadata and plain text out of a downloaded report.
pub trait Extractor: Send + Sync {
    fn metadata(&self, path: &Path) -> Result<Option<Metadata>, ExtractError>;

    /// Write plain text next to `path` and return where it went.
    fn text(&self, path: &Path) -> Result<Option<PathBuf>, ExtractError>;
}

/// `report.pdf` -> `report.txt`
pub fn text_path_for(path: &Path) -> PathBuf {
    path.with_extension("txt")
}

fn run_tool(tool: &'static str, args: &[&OsStr]) -> Result<Vec<u8>, ExtractError> {
    let output = Command::new(tool).args(args).output().map_err(|err| {
        if err.kind() == io::ErrorKind::NotFound {
            ExtractError::ToolMissing(tool)
        } else {
            ExtractError::Io {
                context: format!("running {tool}"),
                source: err,
            }
        }
    })?;
    if !output.status.success() {
        return Err(ExtractError::ToolFailed {
            tool,
            status: output.status.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(output.stdout)
}

fn write_text(path: &Path, text: &str) -> Result<PathBuf, ExtractError> {
    let text_path = text_path_for(path);
    fs::write(&text_path, text).map_err(|source| ExtractError::Io {
        context: format!("writing {}", text_path.display()),
        source,
    })?;
    Ok(text_path)
}

fn none_if_empty(metadata: Metadata) -> Option<Metadata> {
    if metadata.is_empty() {
        None
    } else {
        Some(metadata)
    }
}

/// `Title:          Audit of ...` lines as printed by `pdfinfo`.
fn parse_pdfinfo(output: &str) -> Metadata {
    output
        .lines()
        .filter_map(|line| line.split_once(':'))
        .filter_map(|(key, value)| {
            let key = key.trim();
            let value = value.trim();
            if key.is_empty() || value.is_empty() {
                None
            } else {
                Some((key.to_string(), value.to_string()))
            }
        })
        .collect()
}

/// `\tTitle = "Audit of ..."` lines as printed by `wvSummary`.
fn parse_wv_summary(output: &str) -> Metadata {
    output
        .lines()
        .filter_map(|line| line.split_once(" = "))
        .filter_map(|(key, value)| {
            let key = key.trim();
            let value = value.trim().trim_matches('"').trim();
            if key.is_empty() || value.is_empty() {
                None
            } else {
                Some((key.to_string(), value.to_string()))
            }
        })
        .collect()
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PdfExtractor;

impl Extractor for PdfExtractor {
    fn metadata(&self, path: &Path) -> Result<Option<Metadata>, ExtractError> {
        let stdout = run_tool("pdfinfo", &[path.as_os_str()])?;
        Ok(none_if_empty(parse_pdfinfo(&String::from_utf8_lossy(&stdout))))
    }

    fn text(&self, path: &Path) -> Result<Option<PathBuf>, ExtractError> {
        let text_path = text_path_for(path);
        run_tool(
            "pdftotext",
            &[OsStr::new("-layout"), path.as_os_str(), text_path.as_os_str()],
        )?;
        Ok(Some(text_path))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DocExtractor;

impl Extractor for DocExtractor {
    fn metadata(&self, path: &Path) -> Result<Option<Metadata>, ExtractError> {
        let stdout = run_tool("wvSummary", &[path.as_os_str()])?;
        Ok(none_if_empty(parse_wv_summary(&String::from_utf8_lossy(
            &stdout,
        ))))
    }

    fn text(&self, path: &Path) -> Result<Option<PathBuf>, ExtractError> {
        let stdout = run_tool("antiword", &[path.as_os_str()])?;
        write_text(path, &String::from_utf8_lossy(&stdout)).map(Some)
    }
}

const SKIPPED_HTML_ELEMENTS: [&str; 5] = ["head", "script", "style", "noscript", "template"];

/// Visible text of an HTML document, one non-empty fragment per line.
pub(crate) fn html_to_text(html: &str) -> String {
    let document = Html::parse_document(html);
    let mut lines = Vec::new();
    for node in document.root_element().descendants() {
        let Node::Text(text) = node.value() else {
            continue;
        };
        let hidden = node.ancestors().any(|ancestor| {
            ancestor
                .value()
                .as_element()
                .is_some_and(|el| SKIPPED_HTML_ELEMENTS.contains(&el.name()))
        });
        if hidden {
            continue;
        }
        let fragment = text.split_whitespace().collect::<Vec<_>>().join(" ");
        if !fragment.is_empty() {
            lines.push(fragment);
        }
    }
    lines.join("\n")
}

#[derive(Debug, Clone, Copy, Default)]
pub struct HtmlExtractor;

impl Extractor for HtmlExtractor {
    fn metadata(&self, _path: &Path) -> Result<Option<Metadata>, ExtractError> {
        Ok(None)
    }

    fn text(&self, path: &Path) -> Result<Option<PathBuf>, ExtractError> {
        let bytes = fs::read(path).map_err(|source| ExtractError::Io {
            context: format!("reading {}", path.display()),
            source,
        })?;
        let text = html_to_text(&String::from_utf8_lossy(&bytes));
        write_text(path, &text).map(Some)
    }
}

/// One extractor per document family; `FileKind::Unknown` has none.
pub struct ExtractorSet {
    pdf: Arc<dyn Extractor>,
    doc: Arc<dyn Extractor>,
    html: Arc<dyn Extractor>,
}

impl ExtractorSet {
    pub fn new(
        pdf: Box<dyn Extractor>,
        doc: Box<dyn Extractor>,
        html: Box<dyn Extractor>,
    ) -> Self {
        Self {
            pdf: Arc::from(pdf),
            doc: Arc::from(doc),
            html: Arc::from(html),
        }
    }

    pub fn standard() -> Self {
        Self::new(
            Box::new(PdfExtractor),
            Box::new(DocExtractor),
            Box::new(HtmlExtractor),
        )
    }

    /// Shared handle, so extraction can move onto a blocking thread.
    pub fn for_kind(&self, kind: FileKind) -> Option<Arc<dyn Extractor>> {
        match kind {
            FileKind::Pdf => Some(Arc::clone(&self.pdf)),
            FileKind::Doc => Some(Arc::clone(&self.doc)),
            FileKind::Html => Some(Arc::clone(&self.html)),
            FileKind::Unknown => None,
        }
    }
}

impl Default for ExtractorSet {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn pdfinfo_output_becomes_metadata() {
        let output = "Title:          Audit of Grants\nAuthor:         OIG\nPages:          42\nCreationDate:   Mon Mar  4 10:11:12 2019 EST\nTagged:         \n";
        let metadata = parse_pdfinfo(output);
        assert_eq!(metadata.get("Title").map(String::as_str), Some("Audit of Grants"));
        assert_eq!(metadata.get("Pages").map(String::as_str), Some("42"));
        assert_eq!(
            metadata.get("CreationDate").map(String::as_str),
            Some("Mon Mar  4 10:11:12 2019 EST")
        );
        assert!(!metadata.contains_key("Tagged"));
    }

    #[test]
    fn wv_summary_output_becomes_metadata() {
        let output = "Metadata for report.doc:\n\tTitle = \"Hotline Review\"\n\tAuthor = \"OIG Staff\"\n\tPage Count = 12\n";
        let metadata = parse_wv_summary(output);
        assert_eq!(metadata.get("Title").map(String::as_str), Some("Hotline Review"));
        assert_eq!(metadata.get("Page Count").map(String::as_str), Some("12"));
        assert_eq!(metadata.len(), 3);
    }

    #[test]
    fn html_text_skips_head_and_scripts() {
        let html = r#"<html><head><title>Ignored</title><style>p{}</style></head>
            <body><h1>Management   Alert</h1><script>var x = 1;</script>
            <p>Drinking water <b>compliance</b> findings.</p></body></html>"#;
        assert_eq!(
            html_to_text(html),
            "Management Alert\nDrinking water\ncompliance\nfindings."
        );
    }

    #[test]
    fn html_extractor_writes_sibling_text_file() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("report.htm");
        fs::write(&path, "<html><body><p>Summary of findings</p></body></html>").expect("write");

        let text_path = HtmlExtractor.text(&path).expect("extract").expect("path");
        assert_eq!(text_path, dir.path().join("report.txt"));
        assert_eq!(fs::read_to_string(text_path).expect("read"), "Summary of findings");
        assert_eq!(HtmlExtractor.metadata(&path).expect("metadata"), None);
    }

    #[test]
    fn unknown_kind_has_no_extractor() {
        let set = ExtractorSet::standard();
        assert!(set.for_kind(FileKind::Pdf).is_some());
        assert!(set.for_kind(FileKind::Doc).is_some());
        assert!(set.for_kind(FileKind::Html).is_some());
        assert!(set.for_kind(FileKind::Unknown).is_none());
    }
}
