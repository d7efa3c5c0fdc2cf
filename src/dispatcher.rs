//! Applies rules to scanned files.
//!
//! [`Dispatcher::dispatch`] takes any sequence of [`FileEntry`] values and
//! returns a lazy [`Dispatch`] iterator producing one [`DispatchResult`] per
//! file. Files are handled strictly one after the other; per-file failures
//! are captured in the result and never stop the run.

use crate::history::{Operation, OperationLog};
use crate::rule::{Action, Rule, RuleSet};
use crate::scanner::{FileEntry, same_location};
use crate::transfer::{self, ConflictPolicy, ErrorKind, MoveMethod, Placement, TransferError};
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// What became of a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Outcome {
    Moved,
    Copied,
    Skipped,
    Failed,
}

impl Outcome {
    pub const ALL: [Outcome; 4] = [
        Outcome::Moved,
        Outcome::Copied,
        Outcome::Skipped,
        Outcome::Failed,
    ];

    fn done(action: Action) -> Self {
        match action {
            Action::Copy => Outcome::Copied,
            Action::Move => Outcome::Moved,
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Outcome::Moved => "MOVED",
            Outcome::Copied => "COPIED",
            Outcome::Skipped => "SKIPPED",
            Outcome::Failed => "FAILED",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    NoMatchingRule,
    /// The conflict policy is `skip` and the destination name is taken.
    DestinationExists,
    /// The file already sits where the rule would put it.
    AlreadyInPlace,
    /// Every distribution folder already holds its share.
    FolderCapacityReached,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            SkipReason::NoMatchingRule => "no matching rule",
            SkipReason::DestinationExists => "destination already exists",
            SkipReason::AlreadyInPlace => "already in place",
            SkipReason::FolderCapacityReached => "all folders are full",
        };
        f.write_str(text)
    }
}

/// Per-file record of a dispatch decision.
#[derive(Debug, Clone)]
pub struct DispatchResult {
    pub file: FileEntry,
    pub rule: Option<Rule>,
    pub outcome: Outcome,
    /// Path written to, or the path that blocked the write.
    pub destination: Option<PathBuf>,
    pub skip_reason: Option<SkipReason>,
    pub error: Option<String>,
    pub error_kind: Option<ErrorKind>,
}

impl DispatchResult {
    /// A file left where it is, for `reason`.
    pub fn skipped(
        file: FileEntry,
        rule: Option<&Rule>,
        reason: SkipReason,
        destination: Option<PathBuf>,
    ) -> Self {
        Self {
            file,
            rule: rule.cloned(),
            outcome: Outcome::Skipped,
            destination,
            skip_reason: Some(reason),
            error: None,
            error_kind: None,
        }
    }

    fn done(file: FileEntry, rule: &Rule, destination: PathBuf) -> Self {
        Self {
            file,
            rule: Some(rule.clone()),
            outcome: Outcome::done(rule.action),
            destination: Some(destination),
            skip_reason: None,
            error: None,
            error_kind: None,
        }
    }

    fn failed(file: FileEntry, rule: &Rule, destination: Option<PathBuf>, err: TransferError) -> Self {
        Self {
            file,
            rule: Some(rule.clone()),
            outcome: Outcome::Failed,
            destination,
            skip_reason: None,
            error_kind: Some(err.kind()),
            error: Some(err.to_string()),
        }
    }

    /// True when the outcome is [`Outcome::Failed`].
    pub fn is_failure(&self) -> bool {
        self.outcome == Outcome::Failed
    }
}

/// Cooperative cancellation flag, checked between files.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Asks the run to stop before its next file. Clones share the flag.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Settings shared by every file of a run.
#[derive(Debug, Clone, Default)]
pub struct DispatchOptions {
    pub conflict_policy: ConflictPolicy,
    /// Decide everything, touch nothing.
    pub dry_run: bool,
    /// Directory relative rule destinations are resolved against.
    pub base_dir: PathBuf,
}

/// Applies a [`RuleSet`] to files, one at a time.
///
/// # Examples
///
/// ```no_run
/// use filedispatch::dispatcher::{DispatchOptions, Dispatcher};
/// use filedispatch::rule::{Action, Rule, RuleSet};
/// use filedispatch::scanner::{ScanOptions, Scanner};
/// use std::path::Path;
///
/// let root = Path::new("/path/to/inbox");
/// let rules = RuleSet::new(vec![Rule::parse("*.jpg", Path::new("Images"), Action::Copy).unwrap()]);
/// let dispatcher = Dispatcher::new(
///     rules,
///     DispatchOptions { base_dir: root.to_path_buf(), ..Default::default() },
/// );
/// let scanner = Scanner::new(ScanOptions::default());
/// for result in dispatcher.dispatch(scanner.scan(root).filter_map(Result::ok)) {
///     println!("{}: {}", result.file.name, result.outcome);
/// }
/// ```
pub struct Dispatcher {
    rules: RuleSet,
    options: DispatchOptions,
    cancel: CancelToken,
}

impl Dispatcher {
    /// Creates a dispatcher with its own, unset, cancellation token.
    pub fn new(rules: RuleSet, options: DispatchOptions) -> Self {
        Self {
            rules,
            options,
            cancel: CancelToken::new(),
        }
    }

    /// Uses `cancel` instead of the dispatcher's own token.
    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// A handle that cancels this dispatcher's runs.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    pub fn options(&self) -> &DispatchOptions {
        &self.options
    }

    /// Absolute directory a rule writes into.
    pub fn resolve_destination(&self, rule: &Rule) -> PathBuf {
        if rule.destination.is_absolute() {
            rule.destination.clone()
        } else {
            self.options.base_dir.join(&rule.destination)
        }
    }

    /// Every directory the rules write into, for pruning from the scan.
    pub fn destinations(&self) -> Vec<PathBuf> {
        let mut dirs: Vec<PathBuf> = Vec::new();
        for dir in self.rules.iter().map(|rule| self.resolve_destination(rule)) {
            if !dirs.contains(&dir) {
                dirs.push(dir);
            }
        }
        dirs
    }

    /// Lazily dispatches `files`, first matching rule wins.
    pub fn dispatch<I>(&self, files: I) -> Dispatch<'_, I::IntoIter>
    where
        I: IntoIterator<Item = FileEntry>,
    {
        Dispatch {
            dispatcher: self,
            files: files.into_iter(),
            log: OperationLog::new(self.options.base_dir.clone()),
            reserved: HashSet::new(),
            cancelled: false,
        }
    }

    /// Carries out `rule` for `file`. Returns the operation performed, if any.
    ///
    /// `reserved` holds the targets a dry run has already handed out; in a
    /// dry run they are treated as existing files, so conflicts between files
    /// of the same run resolve exactly as they would for real.
    pub fn apply(
        &self,
        file: FileEntry,
        rule: &Rule,
        reserved: &mut HashSet<PathBuf>,
    ) -> (DispatchResult, Option<Operation>) {
        let dest_dir = self.resolve_destination(rule);
        let Some(file_name) = file.path.file_name().map(ToOwned::to_owned) else {
            let err = TransferError::Inspect {
                path: file.path.clone(),
                source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "no file name"),
            };
            return (DispatchResult::failed(file, rule, None, err), None);
        };

        if same_location(&dest_dir.join(&file_name), &file.path) {
            tracing::debug!(file = %file.path.display(), "already in place");
            let destination = Some(file.path.clone());
            return (
                DispatchResult::skipped(file, Some(rule), SkipReason::AlreadyInPlace, destination),
                None,
            );
        }

        let ready = if self.options.dry_run && !dest_dir.exists() {
            Ok(())
        } else {
            transfer::ensure_dir(&dest_dir)
        };
        let prepared = ready.and_then(|()| {
            transfer::place(
                &dest_dir,
                &file_name,
                self.options.conflict_policy,
                reserved,
            )
        });

        let target = match prepared {
            Ok(Placement::Blocked(existing)) => {
                tracing::debug!(file = %file.path.display(), existing = %existing.display(), "destination taken");
                return (
                    DispatchResult::skipped(
                        file,
                        Some(rule),
                        SkipReason::DestinationExists,
                        Some(existing),
                    ),
                    None,
                );
            }
            Ok(Placement::Free(target)) | Ok(Placement::Replace(target)) => target,
            Err(err) => {
                tracing::warn!(file = %file.path.display(), "{}", err);
                return (DispatchResult::failed(file, rule, None, err), None);
            }
        };

        if self.options.dry_run {
            reserved.insert(target.clone());
            return (DispatchResult::done(file, rule, target), None);
        }

        let performed = match rule.action {
            Action::Copy => transfer::copy_file(&file.path, &target),
            Action::Move => transfer::move_file(&file.path, &target).map(|method| {
                if method == MoveMethod::CopiedAcrossDevices {
                    tracing::debug!(file = %file.path.display(), "moved across filesystems");
                }
            }),
        };

        match performed {
            Ok(()) => {
                tracing::info!(
                    action = %rule.action,
                    from = %file.path.display(),
                    to = %target.display(),
                    "dispatched"
                );
                let operation = Operation {
                    action: rule.action,
                    source: file.path.clone(),
                    destination: target.clone(),
                };
                (DispatchResult::done(file, rule, target), Some(operation))
            }
            Err(err) => {
                tracing::warn!(file = %file.path.display(), "{}", err);
                (DispatchResult::failed(file, rule, Some(target), err), None)
            }
        }
    }
}

/// Lazy sequence of results returned by [`Dispatcher::dispatch`].
///
/// Successful operations are collected into an [`OperationLog`], available
/// through [`Dispatch::log`] once iteration is over.
pub struct Dispatch<'d, I> {
    dispatcher: &'d Dispatcher,
    files: I,
    log: OperationLog,
    reserved: HashSet<PathBuf>,
    cancelled: bool,
}

impl<I> Dispatch<'_, I> {
    /// Operations performed so far.
    pub fn log(&self) -> &OperationLog {
        &self.log
    }

    pub fn into_log(self) -> OperationLog {
        self.log
    }

    /// Whether iteration stopped because the cancel token was set.
    /// True when iteration ended because the run was cancelled.
    pub fn was_cancelled(&self) -> bool {
        self.cancelled
    }
}

impl<I> Iterator for Dispatch<'_, I>
where
    I: Iterator<Item = FileEntry>,
{
    type Item = DispatchResult;

    fn next(&mut self) -> Option<Self::Item> {
        if self.dispatcher.cancel.is_cancelled() {
            self.cancelled = true;
            return None;
        }

        let file = self.files.next()?;
        let Some(rule) = self.dispatcher.rules.first_match(&file) else {
            tracing::debug!(file = %file.path.display(), "no matching rule");
            return Some(DispatchResult::skipped(
                file,
                None,
                SkipReason::NoMatchingRule,
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

/// Convenience for callers that want every result at once.
pub fn dispatch(files: Vec<FileEntry>, rules: RuleSet, base_dir: &Path) -> Vec<DispatchResult> {
    let dispatcher = Dispatcher::new(
        rules,
        DispatchOptions {
            base_dir: base_dir.to_path_buf(),
            ..Default::default()
        },
    );
    dispatcher.dispatch(files).collect()
}
