//! Persistent record of the operations performed by a run.
//!
//! After a run that changed something, the log is written as JSON next to the
//! files it describes so that the run can be undone later.
use crate::rule::Action;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Name of the history file, stored directly in the source directory.
pub const HISTORY_FILE_NAME: &str = ".filedispatch_history.json";

/// A single completed copy or move.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operation {
    pub action: Action,
    pub source: PathBuf,
    pub destination: PathBuf,
}

/// All operations of one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationLog {
    /// RFC 3339 time at which the run started.
    pub timestamp: String,
    pub source_root: PathBuf,
    pub operations: Vec<Operation>,
}

#[derive(Debug, thiserror::Error)]
pub enum HistoryError {
    #[error("cannot write history file {}: {source}", path.display())]
    Write { path: PathBuf, source: io::Error },
    #[error("cannot read history file {}: {source}", path.display())]
    Read { path: PathBuf, source: io::Error },
    #[error("history file {} is malformed: {source}", path.display())]
    Malformed {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("no previous run recorded in {}", path.display())]
    Missing { path: PathBuf },
}

impl OperationLog {
    pub fn new(source_root: PathBuf) -> Self {
        Self {
            timestamp: chrono::Utc::now().to_rfc3339(),
            source_root,
            operations: Vec::new(),
        }
    }

    pub fn record(&mut self, operation: Operation) {
        self.operations.push(operation);
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    pub fn file_path(source_root: &Path) -> PathBuf {
        source_root.join(HISTORY_FILE_NAME)
    }

    /// Writes the log into `source_root`, replacing any earlier one.
    pub fn save(&self, source_root: &Path) -> Result<(), HistoryError> {
        let path = Self::file_path(source_root);
        let json = serde_json::to_string_pretty(self).map_err(|e| HistoryError::Write {
            path: path.clone(),
            source: io::Error::new(io::ErrorKind::InvalidData, e),
        })?;
        fs::write(&path, json).map_err(|source| HistoryError::Write { path, source })
    }

    /// Loads the log of the last run, or `None` if there is none.
    pub fn load(source_root: &Path) -> Result<Option<Self>, HistoryError> {
        let path = Self::file_path(source_root);
        if !path.exists() {
            return Ok(None);
        }
        let json = fs::read_to_string(&path).map_err(|source| HistoryError::Read {
            path: path.clone(),
            source,
        })?;
        serde_json::from_str(&json)
            .map(Some)
            .map_err(|source| HistoryError::Malformed { path, source })
    }

    pub fn delete(source_root: &Path) -> Result<(), HistoryError> {
        let path = Self::file_path(source_root);
        if path.exists() {
            fs::remove_file(&path).map_err(|source| HistoryError::Write { path, source })?;
        }
        Ok(())
    }
}
