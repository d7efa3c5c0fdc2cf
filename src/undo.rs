//! Reverting the last run of a source directory.
//!
//! Operations recorded in the history file are undone newest first: moved
//! files go back to where they came from, copies are deleted.

use crate::history::{HistoryError, Operation, OperationLog};
use crate::rule::Action;
use crate::transfer::{self, TransferError};
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum UndoError {
    #[error("directory {} does not exist", .0.display())]
    MissingDirectory(PathBuf),
    #[error(transparent)]
    History(#[from] HistoryError),
}

#[derive(Debug, Default)]
pub struct UndoReport {
    /// Moved files put back at their original location.
    pub restored_files: usize,
    /// Copies deleted from their destination.
    pub removed_copies: usize,
    /// Files that existed at an original location and were renamed aside.
    pub backups: Vec<PathBuf>,
    /// Operations whose file was no longer at its destination.
    pub skipped_files: Vec<(PathBuf, String)>,
    pub failed_restores: Vec<(PathBuf, TransferError)>,
    pub history_deleted: bool,
}

impl UndoReport {
    /// Operations looked at, whatever became of them.
    pub fn total_processed(&self) -> usize {
        self.restored_files
            + self.removed_copies
            + self.skipped_files.len()
            + self.failed_restores.len()
    }

    pub fn is_complete_success(&self) -> bool {
        self.failed_restores.is_empty() && self.skipped_files.is_empty()
    }
}

/// What undoing one operation did.
enum Reverted {
    Restored { backup: Option<PathBuf> },
    Removed,
}

enum NotReverted {
    Gone(PathBuf),
    Failed(PathBuf, TransferError),
}

pub struct UndoManager;

impl UndoManager {
    /// Undoes the most recent run recorded in `source_root`.
    ///
    /// The history file is deleted only when every operation was reverted,
    /// so a partial undo can be retried.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use filedispatch::undo::UndoManager;
    /// use std::path::Path;
    ///
    /// match UndoManager::undo(Path::new("/path/to/inbox")) {
    ///     Ok(report) => println!("Restored {} files", report.restored_files),
    ///     Err(e) => eprintln!("Undo failed: {}", e),
    /// }
    /// ```
    pub fn undo(source_root: &Path) -> Result<UndoReport, UndoError> {
        if !source_root.is_dir() {
            return Err(UndoError::MissingDirectory(source_root.to_path_buf()));
        }

        let log = OperationLog::load(source_root)?.ok_or_else(|| HistoryError::Missing {
            path: OperationLog::file_path(source_root),
        })?;

        let mut report = UndoReport::default();
        for operation in log.operations.iter().rev() {
            match Self::revert(operation) {
                Ok(Reverted::Restored { backup }) => {
                    report.restored_files += 1;
                    report.backups.extend(backup);
                }
                Ok(Reverted::Removed) => report.removed_copies += 1,
                Err(NotReverted::Gone(path)) => {
                    tracing::warn!(path = %path.display(), "file no longer at its destination");
                    report
                        .skipped_files
                        .push((path, "file not found at expected location".to_string()));
                }
                Err(NotReverted::Failed(path, err)) => {
                    tracing::warn!(path = %path.display(), error = %err, "could not revert");
                    report.failed_restores.push((path, err));
                }
            }
        }

        if report.is_complete_success() {
            match OperationLog::delete(source_root) {
                Ok(()) => report.history_deleted = true,
                Err(e) => tracing::warn!(error = %e, "could not delete history file"),
            }
        }

        Ok(report)
    }

    fn revert(operation: &Operation) -> Result<Reverted, NotReverted> {
        let placed = &operation.destination;
        if !placed.is_file() {
            return Err(NotReverted::Gone(placed.clone()));
        }
        let fail = |err| NotReverted::Failed(placed.clone(), err);

        match operation.action {
            Action::Copy => {
                transfer::remove_file(placed).map_err(fail)?;
                Ok(Reverted::Removed)
            }
            Action::Move => {
                let original = &operation.source;
                if let Some(parent) = original.parent() {
                    transfer::ensure_dir(parent).map_err(fail)?;
                }

                let backup = if original.exists() {
                    let backup = backup_path(original);
                    transfer::move_file(original, &backup).map_err(fail)?;
                    Some(backup)
                } else {
                    None
                };

                transfer::move_file(placed, original).map_err(fail)?;
                Ok(Reverted::Restored { backup })
            }
        }
    }
}

/// `file.txt` becomes `file.txt.bak.20251109-143052`.
fn backup_path(original: &Path) -> PathBuf {
    let timestamp = chrono::Local::now().format("%Y%m%d-%H%M%S");
    let mut name = original
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "file".into());
    name.push(format!(".bak.{}", timestamp));
    original.with_file_name(name)
}
