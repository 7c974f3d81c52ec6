use url::Url;

use crate::Report;

/// Replace non-breaking spaces and trim.
pub fn sanitize(value: &str) -> String {
    value.replace('\u{a0}', " ").trim().to_string()
}

/// Fill in defaults and derived fields. Absent fields are skipped; nothing here
/// judges whether the record is valid.
pub fn normalize_report(report: &mut Report) {
    if report.report_type.is_none() {
        report.report_type = Some("report".to_string());
    }

    for field in [
        &mut report.published_on,
        &mut report.report_id,
        &mut report.title,
        &mut report.inspector,
        &mut report.inspector_url,
        &mut report.agency,
        &mut report.agency_name,
        &mut report.url,
        &mut report.landing_url,
        &mut report.summary,
        &mut report.file_type,
    ] {
        if let Some(value) = field.as_mut() {
            *value = sanitize(value);
        }
    }

    if report.year.is_none() {
        if let Some(published_on) = non_empty(&report.published_on) {
            report.year = year_from(published_on);
        }
    }

    if let Some(url) = report.url.as_mut().filter(|u| !u.is_empty()) {
        url.retain(|c| c != '\r' && c != '\n');
    }

    if report.file_type.is_none() {
        if let Some(url) = non_empty(&report.url) {
            report.file_type = file_type_from_url(url);
        }
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

fn year_from(published_on: &str) -> Option<i32> {
    published_on.split('-').next()?.parse().ok()
}

fn url_path(url: &str) -> String {
    match Url::parse(url) {
        Ok(parsed) => parsed.path().to_string(),
        Err(_) => {
            // relative or otherwise unparseable; drop query and fragment by hand
            let end = url.find(['?', '#']).unwrap_or(url.len());
            url[..end].to_string()
        }
    }
}

fn file_type_from_url(url: &str) -> Option<String> {
    let path = url_path(url);
    let (_, extension) = path.rsplit_once('.')?;
    Some(extension.to_string())
}
