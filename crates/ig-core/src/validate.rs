use chrono::NaiveDate;
use thiserror::Error;

use crate::{Report, ReportKey, INVALID_REPORT_ID_CHARS};

pub const REQUIRED_FIELDS: [&str; 7] = [
    "published_on",
    "report_id",
    "title",
    "inspector",
    "inspector_url",
    "agency",
    "agency_name",
];

/// First contract violation found in a report record.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReportViolation {
    #[error("Missing a required field: {0}")]
    MissingField(&'static str),
    #[error("Report URL is not valid: {0}")]
    InvalidUrl(String),
    #[error("Couldn't figure out `file_type` from URL, please set it explicitly.")]
    UndetectedFileType,
    #[error("Missing required field 'url' when field 'unreleased' is not true")]
    MissingUrl,
    #[error("Unreleased reports still need a landing_url")]
    MissingLandingUrl,
    #[error("Landing page URL is not valid: {0}")]
    InvalidLandingUrl(String),
    #[error("Summary URL is not valid: {0}")]
    InvalidSummaryUrl(String),
    #[error("Invalid {character:?} in report_id - find another way: {report_id:?}")]
    InvalidReportIdChar { character: char, report_id: String },
    #[error("Couldn't get `year` from `published_on`.")]
    MissingYear,
    #[error("Empty `type` field; normalization did not run.")]
    MissingType,
    #[error("Invalid format for `published_on`, must be YYYY-MM-DD.")]
    InvalidDateFormat,
    #[error("Invalid format for `published_on`, dates must use zero prefixing.")]
    UnpaddedDate,
}

fn is_http_url(value: &str) -> bool {
    value.starts_with("http://") || value.starts_with("https://")
}

fn required<'a>(value: &'a Option<String>, field: &'static str) -> Result<&'a str, ReportViolation> {
    match value.as_deref() {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(ReportViolation::MissingField(field)),
    }
}

/// Any month or day segment written with a single digit, e.g. `2020-5-01`.
fn has_unpadded_segment(published_on: &str) -> bool {
    published_on
        .split('-')
        .skip(1)
        .any(|segment| segment.len() == 1 && segment.chars().all(|c| c.is_ascii_digit()))
}

/// Check a normalized report against the field contract, in a fixed order,
/// stopping at the first violation. On success yields the key the rest of the
/// pipeline stores the report under.
pub fn validate_report(report: &Report) -> Result<ReportKey, ReportViolation> {
    let published_on = required(&report.published_on, REQUIRED_FIELDS[0])?;
    let report_id = required(&report.report_id, REQUIRED_FIELDS[1])?;
    required(&report.title, REQUIRED_FIELDS[2])?;
    let inspector = required(&report.inspector, REQUIRED_FIELDS[3])?;
    required(&report.inspector_url, REQUIRED_FIELDS[4])?;
    required(&report.agency, REQUIRED_FIELDS[5])?;
    required(&report.agency_name, REQUIRED_FIELDS[6])?;

    match report.url.as_deref() {
        Some(url) => {
            if !is_http_url(url) {
                return Err(ReportViolation::InvalidUrl(url.to_string()));
            }
            if report.file_type.is_none() {
                return Err(ReportViolation::UndetectedFileType);
            }
        }
        None => {
            if !report.is_unreleased() {
                return Err(ReportViolation::MissingUrl);
            }
            if report.landing_url.is_none() {
                return Err(ReportViolation::MissingLandingUrl);
            }
        }
    }

    if let Some(landing_url) = report.landing_url.as_deref().filter(|u| !u.is_empty()) {
        if !is_http_url(landing_url) {
            return Err(ReportViolation::InvalidLandingUrl(landing_url.to_string()));
        }
    }
    if let Some(summary_url) = report.summary_url.as_deref().filter(|u| !u.is_empty()) {
        if !is_http_url(summary_url) {
            return Err(ReportViolation::InvalidSummaryUrl(summary_url.to_string()));
        }
    }

    if let Some(character) = INVALID_REPORT_ID_CHARS
        .iter()
        .copied()
        .find(|c| report_id.contains(*c))
    {
        return Err(ReportViolation::InvalidReportIdChar {
            character,
            report_id: report_id.to_string(),
        });
    }

    let year = report.year.ok_or(ReportViolation::MissingYear)?;
    if report.report_type.is_none() {
        return Err(ReportViolation::MissingType);
    }

    NaiveDate::parse_from_str(published_on, "%Y-%m-%d")
        .map_err(|_| ReportViolation::InvalidDateFormat)?;
    if has_unpadded_segment(published_on) {
        return Err(ReportViolation::UnpaddedDate);
    }

    Ok(ReportKey {
        inspector: inspector.to_string(),
        year,
        report_id: report_id.to_string(),
    })
}
