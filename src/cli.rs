//! Command-line interface for filedispatch.
//!
//! Parses arguments, merges them over the configuration file, runs the job
//! and prints the outcome. The returned code becomes the process exit status.

use crate::config::{ConfigError, DistributeSettings, RuleSettings, RunConfig};
use crate::dispatcher::CancelToken;
use crate::logging::LogFormat;
use crate::output::OutputFormatter;
use crate::report::{EXIT_CONFIG_ERROR, EXIT_FAILURE, EXIT_SUCCESS};
use crate::rule::Action;
use crate::runner::{self, Job};
use crate::transfer::ConflictPolicy;
use crate::undo::{UndoError, UndoManager};
use clap::{ArgAction, Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(
    name = "filedispatch",
    version,
    about = "Copy or move files into folders according to rules"
)]
pub struct Cli {
    /// More diagnostics on stderr (-v info, -vv debug, -vvv trace).
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[arg(long, value_enum, default_value_t = LogFormat::Pretty, global = true)]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Dispatch files by the configured rules.
    Run(RunArgs),
    /// Spread files over several folders, a fixed number per folder.
    Distribute(DistributeArgs),
    /// Revert the last run in a directory.
    Undo {
        /// Directory the run was performed in. Defaults to the current directory.
        source: Option<PathBuf>,
    },
}

/// Options shared by `run` and `distribute`.
#[derive(Debug, Args)]
pub struct JobArgs {
    /// Directory to take files from. Overrides `source` in the configuration.
    pub source: Option<PathBuf>,

    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Descend into subdirectories.
    #[arg(short, long)]
    pub recursive: bool,

    #[arg(long)]
    pub follow_symlinks: bool,

    /// What to do when the destination already holds a file of the same name.
    #[arg(long, value_enum, value_name = "POLICY")]
    pub conflict: Option<ConflictPolicy>,

    /// Show what would happen without touching any file.
    #[arg(short = 'n', long)]
    pub dry_run: bool,

    #[arg(long)]
    pub no_progress: bool,
}

#[derive(Debug, Args)]
pub struct RunArgs {
    #[command(flatten)]
    pub job: JobArgs,

    /// Extra copy rule, e.g. `--copy '*.jpg=Images'`.
    #[arg(long = "copy", value_name = "PATTERN=DEST")]
    pub copy_rules: Vec<String>,

    /// Extra move rule, e.g. `--move 'pdf=Documents'`.
    #[arg(long = "move", value_name = "PATTERN=DEST")]
    pub move_rules: Vec<String>,
}

#[derive(Debug, Args)]
pub struct DistributeArgs {
    #[command(flatten)]
    pub job: JobArgs,

    /// Destination folders, filled in the given order.
    #[arg(long = "to", value_name = "DIR", num_args = 1..)]
    pub destinations: Vec<PathBuf>,

    /// Files per folder; 0 splits the files evenly.
    #[arg(long, value_name = "N")]
    pub per_folder: Option<usize>,

    /// Copy instead of moving.
    #[arg(long)]
    pub copy: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Undo(#[from] UndoError),
}

impl AppError {
    /// Both kinds abort before any file is touched.
    pub fn exit_code(&self) -> i32 {
        EXIT_CONFIG_ERROR
    }
}

/// Runs the parsed command and returns the process exit code.
///
/// # Examples
///
/// ```no_run
/// use clap::Parser;
/// use filedispatch::cli::{Cli, run_cli};
///
/// let cli = Cli::parse_from(["filedispatch", "run", "/path/to/inbox", "--copy", "*.jpg=Images"]);
/// let code = run_cli(cli).unwrap_or_else(|e| e.exit_code());
/// std::process::exit(code);
/// ```
pub fn run_cli(cli: Cli) -> Result<i32, AppError> {
    match cli.command {
        Command::Run(args) => {
            let job = run_job(&args)?;
            Ok(execute(job, args.job.no_progress)?)
        }
        Command::Distribute(args) => {
            let job = distribute_job(&args)?;
            Ok(execute(job, args.job.no_progress)?)
        }
        Command::Undo { source } => undo(source.unwrap_or_else(|| PathBuf::from("."))),
    }
}

fn load_config(args: &JobArgs) -> Result<RunConfig, ConfigError> {
    let mut config = RunConfig::load(args.config.as_deref())?;
    if let Some(source) = &args.source {
        config.source = Some(source.clone());
    }
    config.recursive |= args.recursive;
    config.follow_symlinks |= args.follow_symlinks;
    config.dry_run |= args.dry_run;
    if let Some(policy) = args.conflict {
        config.conflict_policy = policy;
    }
    Ok(config)
}

fn run_job(args: &RunArgs) -> Result<Job, ConfigError> {
    let mut config = load_config(&args.job)?;
    for spec in &args.copy_rules {
        config.rules.push(RuleSettings::from_spec(spec, Action::Copy)?);
    }
    for spec in &args.move_rules {
        config.rules.push(RuleSettings::from_spec(spec, Action::Move)?);
    }
    config.compile()
}

fn distribute_job(args: &DistributeArgs) -> Result<Job, ConfigError> {
    let mut config = load_config(&args.job)?;
    let settings = config.distribute.get_or_insert_with(|| DistributeSettings {
        destinations: Vec::new(),
        files_per_folder: 1,
        action: Action::Move,
    });
    if !args.destinations.is_empty() {
        settings.destinations = args.destinations.clone();
    }
    if let Some(n) = args.per_folder {
        settings.files_per_folder = n;
    }
    if args.copy {
        settings.action = Action::Copy;
    }
    config.compile_distribution()
}

fn execute(job: Job, no_progress: bool) -> Result<i32, ConfigError> {
    let root = job.source.clone();
    if job.dispatch.dry_run {
        OutputFormatter::dry_run_notice("No files will be changed");
    }
    OutputFormatter::info(&format!("Dispatching files in {}", root.display()));

    let pb = OutputFormatter::create_spinner(!no_progress);
    let report = runner::execute(job, CancelToken::new(), |result| {
        OutputFormatter::result(&pb, result, &root)
    })?;
    pb.finish_and_clear();

    OutputFormatter::summary_table(&report);
    if report.history_file.is_some() {
        OutputFormatter::info(&format!(
            "Run 'filedispatch undo {}' to revert these changes.",
            root.display()
        ));
    }
    if report.is_success() {
        OutputFormatter::success("Done");
    } else {
        OutputFormatter::error("Finished with problems, see above");
    }
    Ok(report.exit_code())
}

fn undo(source: PathBuf) -> Result<i32, AppError> {
    OutputFormatter::info(&format!("Undoing last run in {}", source.display()));
    let report = UndoManager::undo(&source)?;
    OutputFormatter::undo_summary(&report);
    Ok(if report.is_complete_success() {
        EXIT_SUCCESS
    } else {
        EXIT_FAILURE
    })
}
