//! Drives a validated [`Job`]: scan, dispatch, then persist the history.

use crate::config::ConfigError;
use crate::dispatcher::{CancelToken, DispatchOptions, DispatchResult, Dispatcher};
use crate::distribute::Distribution;
use crate::history::OperationLog;
use crate::report::RunReport;
use crate::rule::RuleSet;
use crate::scanner::{FileEntry, ScanError, ScanOptions, Scanner};
use std::path::PathBuf;

/// What to do with the scanned files.
#[derive(Debug, Clone)]
pub enum Plan {
    /// First matching rule decides.
    Rules(RuleSet),
    /// Spread over folders in scan order.
    Distribute(Distribution),
}

/// A fully validated run.
#[derive(Debug, Clone)]
pub struct Job {
    pub source: PathBuf,
    pub scan: ScanOptions,
    pub dispatch: DispatchOptions,
    pub plan: Plan,
}

impl Job {
    /// Absolute directories the job writes into, without duplicates.
    pub fn destinations(&self) -> Vec<PathBuf> {
        let configured: Vec<&PathBuf> = match &self.plan {
            Plan::Rules(rules) => rules.iter().map(|rule| &rule.destination).collect(),
            Plan::Distribute(distribution) => distribution.destinations.iter().collect(),
        };

        let mut dirs: Vec<PathBuf> = Vec::new();
        for dir in configured {
            let dir = if dir.is_absolute() {
                dir.clone()
            } else {
                self.dispatch.base_dir.join(dir)
            };
            if !dirs.contains(&dir) {
                dirs.push(dir);
            }
        }
        dirs
    }
}

/// Runs `job` to completion or until `cancel` is set.
///
/// `on_result` sees every result as soon as its file has been handled.
pub fn execute(
    job: Job,
    cancel: CancelToken,
    mut on_result: impl FnMut(&DispatchResult),
) -> Result<RunReport, ConfigError> {
    let destinations = job.destinations();
    let Job {
        source,
        mut scan,
        dispatch,
        plan,
    } = job;
    scan.pruned_dirs.extend(destinations);

    let mut report = RunReport::new(dispatch.dry_run);
    let mut scan_errors: Vec<ScanError> = Vec::new();

    tracing::info!(
        source = %source.display(),
        dry_run = dispatch.dry_run,
        "starting run"
    );

    let log: OperationLog = match plan {
        Plan::Rules(rules) => {
            scan.detect_content_type |= rules.needs_content_type();
            let scanner = Scanner::new(scan);
            let files = scanner
                .scan(&source)
                .filter_map(|entry| keep_file(entry, &mut scan_errors));
            let dispatcher = Dispatcher::new(rules, dispatch).with_cancel_token(cancel);
            let mut run = dispatcher.dispatch(files);
            for result in run.by_ref() {
                on_result(&result);
                report.push(result);
            }
            report.cancelled = run.was_cancelled();
            run.into_log()
        }
        Plan::Distribute(distribution) => {
            // The share per folder depends on the total, so scan everything first.
            let scanner = Scanner::new(scan);
            let files: Vec<FileEntry> = scanner
                .scan(&source)
                .filter_map(|entry| keep_file(entry, &mut scan_errors))
                .collect();
            let dispatcher = Dispatcher::new(RuleSet::new(distribution.rules()?), dispatch)
                .with_cancel_token(cancel);
            let mut run = dispatcher.distribute(&distribution, files);
            for result in run.by_ref() {
                on_result(&result);
                report.push(result);
            }
            report.cancelled = run.was_cancelled();
            run.into_log()
        }
    };
    report.scan_errors = scan_errors;

    if !report.dry_run && !log.is_empty() {
        match log.save(&source) {
            Ok(()) => report.history_file = Some(OperationLog::file_path(&source)),
            Err(e) => {
                tracing::warn!(error = %e, "could not save run history");
                report.history_error = Some(e);
            }
        }
    }

    tracing::info!(
        files = report.results.len(),
        failed = report.failures().count(),
        scan_errors = report.scan_errors.len(),
        cancelled = report.cancelled,
        "run finished"
    );
    Ok(report)
}

fn keep_file(entry: Result<FileEntry, ScanError>, errors: &mut Vec<ScanError>) -> Option<FileEntry> {
    match entry {
        Ok(file) => Some(file),
        Err(e) => {
            errors.push(e);
            None
        }
    }
}
