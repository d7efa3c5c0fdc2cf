//! Summary of a finished run and the process exit status derived from it.

use crate::dispatcher::{DispatchResult, Outcome};
use crate::history::HistoryError;
use crate::scanner::ScanError;
use std::path::PathBuf;

/// Every file handled, nothing failed.
pub const EXIT_SUCCESS: i32 = 0;
/// At least one file failed or a directory could not be scanned.
pub const EXIT_FAILURE: i32 = 1;
/// Invalid configuration; nothing was touched.
pub const EXIT_CONFIG_ERROR: i32 = 2;

#[derive(Debug, Default)]
pub struct RunReport {
    pub dry_run: bool,
    pub results: Vec<DispatchResult>,
    pub scan_errors: Vec<ScanError>,
    /// The run stopped early on request.
    pub cancelled: bool,
    /// Where the history of this run was written, if anything changed.
    pub history_file: Option<PathBuf>,
    pub history_error: Option<HistoryError>,
}

impl RunReport {
    pub fn new(dry_run: bool) -> Self {
        Self {
            dry_run,
            ..Default::default()
        }
    }

    pub fn push(&mut self, result: DispatchResult) {
        self.results.push(result);
    }

    pub fn count(&self, outcome: Outcome) -> usize {
        self.results.iter().filter(|r| r.outcome == outcome).count()
    }

    /// `(outcome, count)` for every outcome, in display order.
    pub fn counts(&self) -> Vec<(Outcome, usize)> {
        Outcome::ALL
            .iter()
            .map(|&outcome| (outcome, self.count(outcome)))
            .collect()
    }

    pub fn failures(&self) -> impl Iterator<Item = &DispatchResult> {
        self.results.iter().filter(|r| r.is_failure())
    }

    pub fn is_success(&self) -> bool {
        self.failures().next().is_none()
            && self.scan_errors.is_empty()
            && self.history_error.is_none()
            && !self.cancelled
    }

    pub fn exit_code(&self) -> i32 {
        if self.is_success() {
            EXIT_SUCCESS
        } else {
            EXIT_FAILURE
        }
    }
}
