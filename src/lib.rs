//! filedispatch - copy or move files into folders by rule
//!
//! Files under a source directory are scanned, matched against an ordered set
//! of rules (glob, extension, regex or content category, optionally narrowed
//! by size and modification time) and copied or moved to the destination of
//! the first rule that matches. Every run can be previewed with a dry run and
//! reverted with an undo.

pub mod category;
pub mod cli;
pub mod config;
pub mod dispatcher;
pub mod distribute;
pub mod filter;
pub mod history;
pub mod logging;
pub mod output;
pub mod report;
pub mod rule;
pub mod runner;
pub mod scanner;
pub mod transfer;
pub mod undo;

pub use category::{Category, FileMapper};
pub use config::{ConfigError, RunConfig};
pub use dispatcher::{
    CancelToken, DispatchOptions, DispatchResult, Dispatcher, Outcome, SkipReason, dispatch,
};
pub use distribute::Distribution;
pub use history::{Operation, OperationLog};
pub use report::RunReport;
pub use rule::{Action, Pattern, Rule, RuleSet, matches};
pub use runner::{Job, Plan, execute};
pub use scanner::{FileEntry, ScanError, ScanOptions, Scanner};
pub use transfer::ConflictPolicy;
pub use undo::{UndoManager, UndoReport};
