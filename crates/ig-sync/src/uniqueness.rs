//! Run-scoped report_id uniqueness index.
//!
//! Two tiers per inspector:
//! - disk: `report_id -> year` rebuilt once from `<data_root>/<inspector>/<year>/<report_id>/`
//! - runtime: every `report_id` checked during this run
//!
//! A repeat within the run is always a duplicate, whatever the year. A match
//! against disk is only a duplicate when the years differ. Identifiers compare
//! case-insensitively. Findings are collected and sent through the notifier once,
//! on `finalize` or when the index is dropped.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use ig_storage::DataLayout;
use thiserror::Error;
use tracing::{debug, error, warn};

use crate::notify::Notifier;

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("scanning {}: {source}", path.display())]
    Scan {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

fn scan_err(path: &Path) -> impl FnOnce(io::Error) -> IndexError + '_ {
    move |source| IndexError::Scan {
        path: path.to_path_buf(),
        source,
    }
}

/// Child directories of `dir` as `(name, path)`; plain files are ignored.
fn child_dirs(dir: &Path) -> Result<Vec<(String, PathBuf)>, IndexError> {
    let mut out = Vec::new();
    for entry in fs::read_dir(dir).map_err(scan_err(dir))? {
        let entry = entry.map_err(scan_err(dir))?;
        let path = entry.path();
        if entry.file_type().map_err(scan_err(&path))?.is_dir() {
            out.push((entry.file_name().to_string_lossy().into_owned(), path));
        }
    }
    Ok(out)
}

pub struct UniquenessIndex {
    layout: DataLayout,
    notifier: Arc<dyn Notifier>,
    disk: HashMap<String, HashMap<String, i32>>,
    runtime: HashMap<String, HashSet<String>>,
    messages: Vec<String>,
    finalized: bool,
}

impl UniquenessIndex {
    pub fn new(layout: DataLayout, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            layout,
            notifier,
            disk: HashMap::new(),
            runtime: HashMap::new(),
            messages: Vec::new(),
            finalized: false,
        }
    }

    /// Every duplicate finding so far, in the order it was detected.
    pub fn messages(&self) -> &[String] {
        &self.messages
    }

    /// Record `report_id` for `inspector` in `year`, noting any duplicate.
    ///
    /// Duplicates never fail the call. The only error is an inspector directory
    /// that exists but cannot be read.
    pub fn check(&mut self, inspector: &str, report_id: &str, year: i32) -> Result<(), IndexError> {
        let report_id = report_id.to_lowercase();

        if !self.disk.contains_key(inspector) {
            let disk = self.scan_inspector(inspector)?;
            self.disk.insert(inspector.to_string(), disk);
        }

        let runtime = self.runtime.entry(inspector.to_string()).or_default();
        let saved_year = self
            .disk
            .get(inspector)
            .and_then(|disk| disk.get(&report_id))
            .copied();

        let finding = if runtime.contains(&report_id) {
            Some(format!(
                "[{inspector}] Duplicate report_id: {report_id} has been used twice this session"
            ))
        } else {
            match saved_year {
                Some(saved) if saved != year => Some(format!(
                    "[{inspector}] Duplicate report_id: {report_id} is saved under {saved} and {year}"
                )),
                _ => None,
            }
        };
        runtime.insert(report_id);

        if let Some(message) = finding {
            self.record(message);
        }
        Ok(())
    }

    /// Send the collected findings, newline-joined, if there are any. Only the
    /// first call does anything.
    pub fn finalize(&mut self) -> anyhow::Result<()> {
        if self.finalized {
            return Ok(());
        }
        self.finalized = true;
        if self.messages.is_empty() {
            return Ok(());
        }
        self.notifier.notify(&self.messages.join("\n"))
    }

    fn record(&mut self, message: String) {
        warn!("{message}");
        self.messages.push(message);
    }

    fn scan_inspector(&mut self, inspector: &str) -> Result<HashMap<String, i32>, IndexError> {
        let mut disk = HashMap::new();
        let inspector_dir = self.layout.inspector_dir(inspector);
        if !inspector_dir.is_dir() {
            return Ok(disk);
        }

        let mut years = Vec::new();
        for (name, path) in child_dirs(&inspector_dir)? {
            match name.parse::<i32>() {
                Ok(year) => years.push((year, path)),
                Err(_) => debug!(path = %path.display(), "skipping non-year directory"),
            }
        }
        years.sort_by_key(|(year, _)| *year);

        for (year, year_path) in years {
            let mut report_ids = child_dirs(&year_path)?
                .into_iter()
                .map(|(name, _)| name)
                .collect::<Vec<_>>();
            report_ids.sort();
            for report_id in report_ids {
                let report_id = report_id.to_lowercase();
                // case variants under one year directory are the same report
                match disk.insert(report_id.clone(), year) {
                    Some(previous) if previous != year => self.record(format!(
                        "[{inspector}] Duplicate report_id: {report_id} is saved under {previous} and {year}"
                    )),
                    _ => {}
                }
            }
        }
        debug!(inspector, entries = disk.len(), "disk index built");
        Ok(disk)
    }
}

impl Drop for UniquenessIndex {
    fn drop(&mut self) {
        if self.finalized || std::thread::panicking() {
            return;
        }
        if let Err(err) = self.finalize() {
            error!(error = %err, "failed to send duplicate report summary");
        }
    }
}
