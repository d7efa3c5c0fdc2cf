//! Spreads files over several destination folders, a fixed number per folder.
//!
//! Files are handed out in scan order: the first `files_per_folder` go to the
//! first folder, the next batch to the second, and so on. When every folder
//! has received its share the remaining files stay where they are. A share of
//! zero splits the files evenly instead.

use crate::config::ConfigError;
use crate::dispatcher::{DispatchResult, Dispatcher, SkipReason};
use crate::history::OperationLog;
use crate::rule::{Action, Pattern, PatternKind, Rule};
use crate::scanner::FileEntry;
use std::collections::HashSet;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Distribution {
    pub destinations: Vec<PathBuf>,
    /// Files per folder; `0` means an even split.
    pub files_per_folder: usize,
    pub action: Action,
}

impl Distribution {
    pub fn new(
        destinations: Vec<PathBuf>,
        files_per_folder: usize,
        action: Action,
    ) -> Result<Self, ConfigError> {
        if destinations.is_empty() {
            return Err(ConfigError::NoDestinations);
        }
        if destinations.iter().any(|d| d.as_os_str().is_empty()) {
            return Err(ConfigError::EmptyDestination {
                pattern: "*".to_string(),
            });
        }
        Ok(Self {
            destinations,
            files_per_folder,
            action,
        })
    }

    /// One catch-all rule per destination, in folder order.
    pub fn rules(&self) -> Result<Vec<Rule>, ConfigError> {
        self.destinations
            .iter()
            .enumerate()
            .map(|(i, dest)| {
                Ok(
                    Rule::new(Pattern::parse("*", Some(PatternKind::Glob))?, dest, self.action)
                        .with_name(format!("folder {}", i + 1)),
                )
            })
            .collect()
    }

    /// Number of files each folder receives when `total` files are distributed.
    pub fn share(&self, total: usize) -> usize {
        if self.files_per_folder > 0 {
            self.files_per_folder
        } else {
            total.div_ceil(self.destinations.len()).max(1)
        }
    }

    /// Folder index for the file at `position`, or `None` once all folders are full.
    pub fn slot(&self, position: usize, share: usize) -> Option<usize> {
        let folder = position / share;
        (folder < self.destinations.len()).then_some(folder)
    }
}

impl Dispatcher {
    /// Distributes `files` over the dispatcher's rules, which must come from
    /// [`Distribution::rules`].
    pub fn distribute<'d>(
        &'d self,
        distribution: &'d Distribution,
        files: Vec<FileEntry>,
    ) -> Distribute<'d> {
        let share = distribution.share(files.len());
        Distribute {
            dispatcher: self,
            distribution,
            rules: self.rules().iter().collect(),
            files: files.into_iter().enumerate(),
            share,
            log: OperationLog::new(self.options().base_dir.clone()),
            reserved: HashSet::new(),
            cancelled: false,
        }
    }
}

/// Lazy sequence of results returned by [`Dispatcher::distribute`].
pub struct Distribute<'d> {
    dispatcher: &'d Dispatcher,
    distribution: &'d Distribution,
    rules: Vec<&'d Rule>,
    files: std::iter::Enumerate<std::vec::IntoIter<FileEntry>>,
    share: usize,
    log: OperationLog,
    reserved: HashSet<PathBuf>,
    cancelled: bool,
}

impl Distribute<'_> {
    pub fn log(&self) -> &OperationLog {
        &self.log
    }

    pub fn into_log(self) -> OperationLog {
        self.log
    }

    pub fn was_cancelled(&self) -> bool {
        self.cancelled
    }
}

impl Iterator for Distribute<'_> {
    type Item = DispatchResult;

    fn next(&mut self) -> Option<Self::Item> {
        if self.dispatcher.cancel_token().is_cancelled() {
            self.cancelled = true;
            return None;
        }

        let (position, file) = self.files.next()?;
        let slot = self.distribution.slot(position, self.share);
        let Some(rule) = slot.and_then(|i| self.rules.get(i).copied()) else {
            return Some(DispatchResult::skipped(
                file,
                None,
                SkipReason::FolderCapacityReached,
                None,
            ));
        };

        let (result, operation) = self.dispatcher.apply(file, rule, &mut self.reserved);
        if let Some(operation) = operation {
            self.log.record(operation);
        }
        Some(result)
    }
}
