//! Output formatting and styling module.
//!
//! Everything the command-line tool prints to the user goes through
//! [`OutputFormatter`]. Diagnostics go through `tracing` instead.

use crate::dispatcher::{DispatchResult, Outcome};
use crate::report::RunReport;
use crate::undo::UndoReport;
use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use std::time::Duration;

/// Manages all CLI output with consistent styling and formatting.
///
/// This struct provides methods for:
/// - Status messages (success, error, warning, info)
/// - One line per dispatched file
/// - A spinner while files are being dispatched
/// - Summary tables for runs and undos
pub struct OutputFormatter;

impl OutputFormatter {
    /// Prints a success message in green with a checkmark.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use filedispatch::output::OutputFormatter;
    /// OutputFormatter::success("All files dispatched");
    /// ```
    pub fn success(message: &str) {
        println!("{} {}", "✓".green(), message);
    }

    /// Prints an error message in red with an X mark, to stderr.
    pub fn error(message: &str) {
        eprintln!("{} {}", "✗".red(), message);
    }

    /// Prints a warning in yellow.
    pub fn warning(message: &str) {
        println!("{} {}", "⚠".yellow(), message);
    }

    /// Prints a neutral message in cyan.
    pub fn info(message: &str) {
        println!("{}", message.cyan());
    }

    /// Bold section title preceded by a blank line.
    pub fn header(header: &str) {
        println!("\n{}", header.bold());
    }

    /// Prints `message` tagged `[DRY RUN]`.
    pub fn dry_run_notice(message: &str) {
        println!("{}", format!("[DRY RUN] {}", message).yellow());
    }

    /// Spinner counting handled files. Hidden when `enabled` is false or
    /// stderr is not a terminal.
    pub fn create_spinner(enabled: bool) -> ProgressBar {
        if !enabled {
            return ProgressBar::hidden();
        }
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.cyan} {pos} files {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        pb.enable_steady_tick(Duration::from_millis(120));
        pb
    }

    /// Prints the line for one result and advances `pb`.
    pub fn result(pb: &ProgressBar, result: &DispatchResult, root: &Path) {
        let line = Self::format_result(result, root);
        if pb.is_hidden() {
            println!("{}", line);
        } else {
            pb.println(line);
        }
        pb.set_message(result.file.name.clone());
        pb.inc(1);
    }

    pub fn format_result(result: &DispatchResult, root: &Path) -> String {
        let name = display_path(&result.file.path, root);
        let target = result
            .destination
            .as_deref()
            .map(|d| display_path(d, root))
            .unwrap_or_default();

        match result.outcome {
            Outcome::Moved | Outcome::Copied => format!(
                "{} {:<7} {} → {}",
                "✓".green(),
                result.outcome.to_string().green(),
                name,
                target
            ),
            Outcome::Skipped => {
                let reason = result
                    .skip_reason
                    .map(|r| format!(" ({})", r))
                    .unwrap_or_default();
                format!("{} {:<7} {}{}", "-".dimmed(), "SKIPPED".dimmed(), name, reason.dimmed())
            }
            Outcome::Failed => format!(
                "{} {:<7} {}: {}",
                "✗".red(),
                "FAILED".red(),
                name,
                result.error.as_deref().unwrap_or("unknown error")
            ),
        }
    }

    /// Prints outcome counts, failures with their error, and scan errors.
    pub fn summary_table(report: &RunReport) {
        Self::header(if report.dry_run {
            "SUMMARY (dry run, nothing was changed)"
        } else {
            "SUMMARY"
        });

        let counts = report.counts();
        let width = 8;
        println!("{:<width$} | {}", "Outcome".bold(), "Files".bold(), width = width);
        println!("{}", "-".repeat(width + 10));
        for (outcome, count) in &counts {
            let count = match outcome {
                Outcome::Failed if *count > 0 => count.to_string().red(),
                _ => count.to_string().green(),
            };
            println!("{:<width$} | {}", outcome.to_string(), count, width = width);
        }
        println!("{}", "-".repeat(width + 10));
        println!(
            "{:<width$} | {}",
            "Total".bold(),
            report.results.len().to_string().green().bold(),
            width = width
        );

        let failures: Vec<_> = report.failures().collect();
        if !failures.is_empty() {
            Self::header("FAILED");
            for failure in failures {
                println!(
                    "  {}: {}",
                    failure.file.path.display(),
                    failure.error.as_deref().unwrap_or("unknown error")
                );
            }
        }

        if !report.scan_errors.is_empty() {
            Self::header("NOT SCANNED");
            for error in &report.scan_errors {
                println!("  {}", error);
            }
        }

        if report.cancelled {
            Self::warning("Run cancelled before all files were handled");
        }
        if let Some(error) = &report.history_error {
            Self::warning(&format!("Undo will not be available: {}", error));
        }
    }

    /// Counts of an undo, then every skipped and failed operation.
    pub fn undo_summary(report: &UndoReport) {
        Self::header("UNDO");
        println!("  Operations: {}", report.total_processed());
        println!("  Restored: {}", report.restored_files);
        println!("  Copies removed: {}", report.removed_copies);
        for backup in &report.backups {
            println!("  Existing file kept as {}", backup.display());
        }

        if !report.skipped_files.is_empty() {
            println!("  Skipped: {}", report.skipped_files.len());
            for (path, reason) in &report.skipped_files {
                println!("    - {}: {}", path.display(), reason);
            }
        }

        if !report.failed_restores.is_empty() {
            println!("  Failed: {}", report.failed_restores.len());
            for (path, error) in &report.failed_restores {
                eprintln!("    - {}: {}", path.display(), error);
            }
        }

        if !report.history_deleted {
            Self::warning("History file was kept; fix the issues above and undo again");
        }
    }
}

fn display_path(path: &Path, root: &Path) -> String {
    path.strip_prefix(root).unwrap_or(path).display().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::SkipReason;
    use crate::scanner::FileEntry;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_format_result_is_relative_to_root() {
        colored::control::set_override(false);
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let path = temp_dir.path().join("a.txt");
        fs::write(&path, "a").unwrap();
        let result = DispatchResult::skipped(
            FileEntry::from_path(&path).unwrap(),
            None,
            SkipReason::NoMatchingRule,
            None,
        );

        let line = OutputFormatter::format_result(&result, temp_dir.path());
        assert!(line.contains("SKIPPED"));
        assert!(line.contains("a.txt"));
        assert!(!line.contains(&temp_dir.path().display().to_string()));
    }
}
