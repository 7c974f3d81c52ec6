use chrono::{Datelike, Utc};
use thiserror::Error;

/// Flags shared by every inspector scrape.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScrapeOptions {
    /// Skip download and extraction; metadata is still written.
    pub dry_run: bool,
    /// With `dry_run`, also skip the URL reachability check.
    pub quick: bool,
    pub since: Option<String>,
    pub year: Option<String>,
    /// Start from the source's earliest archived year.
    pub archive: bool,
    /// Restrict the run to these inspectors; empty means every enabled one.
    pub inspectors: Vec<String>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum OptionsError {
    #[error("invalid year for --{option}: {value:?}")]
    InvalidYear { option: &'static str, value: String },
}

/// A source ran but produced nothing for the requested years.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("No reports were found for {context}")]
pub struct NoReportsFound {
    pub context: String,
}

impl NoReportsFound {
    pub fn new(context: impl Into<String>) -> Self {
        Self {
            context: context.into(),
        }
    }
}

pub fn current_year() -> i32 {
    Utc::now().year()
}

fn parse_year(option: &'static str, value: Option<&str>) -> Result<Option<i32>, OptionsError> {
    let Some(value) = value.map(str::trim).filter(|v| !v.is_empty()) else {
        return Ok(None);
    };
    value
        .parse::<i32>()
        .map(Some)
        .map_err(|_| OptionsError::InvalidYear {
            option,
            value: value.to_string(),
        })
}

/// Inclusive list of years to scrape.
///
/// `--archive` swaps in the source's earliest year for `--since` when the source
/// has one. `--since` runs through `this_year`, otherwise `--year` alone,
/// otherwise just `this_year`. Future years clamp to `this_year`.
pub fn year_range(
    options: &ScrapeOptions,
    archive_year: Option<i32>,
    this_year: i32,
) -> Result<Vec<i32>, OptionsError> {
    let since = match archive_year {
        Some(archive) if options.archive => Some(archive),
        _ => parse_year("since", options.since.as_deref())?,
    }
    .map(|since| since.min(this_year));

    let year = parse_year("year", options.year.as_deref())?.map(|year| year.min(this_year));

    Ok(match (since, year) {
        (Some(since), _) => (since..=this_year).collect(),
        (None, Some(year)) => vec![year],
        (None, None) => vec![this_year],
    })
}
