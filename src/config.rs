//! Run configuration.
//!
//! Configuration is read from a TOML file and validated into a [`Job`]
//! before any file is touched:
//!
//! ```toml
//! source = "/home/me/Downloads"
//! recursive = false
//! conflict_policy = "rename"   # overwrite | skip | rename
//!
//! [[rules]]
//! pattern = "*.jpg"
//! destination = "Images"
//! action = "copy"
//! priority = 1
//!
//! [[rules]]
//! pattern = "invoices?-\\d+"
//! kind = "regex"
//! destination = "/home/me/Invoices"
//! action = "move"
//! modified_after = "2024-01-01"
//!
//! [distribute]
//! destinations = ["Batch A", "Batch B"]
//! files_per_folder = 50
//! action = "move"
//! ```
//!
//! File filters live in a `[filters]` section, see [`crate::filter`].

use crate::dispatcher::DispatchOptions;
use crate::distribute::Distribution;
use crate::filter::{FilterSettings, ScanFilter};
use crate::rule::{Action, Conditions, Pattern, PatternKind, Rule, RuleSet};
use crate::runner::{Job, Plan};
use crate::scanner::ScanOptions;
use crate::transfer::ConflictPolicy;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Name of the per-directory configuration file.
pub const LOCAL_CONFIG_FILE: &str = ".filedispatch.toml";

/// Invalid user input. Raised before the run starts.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("configuration file not found: {}", .0.display())]
    NotFound(PathBuf),
    #[error("cannot read configuration file {}: {source}", path.display())]
    Io { path: PathBuf, source: io::Error },
    #[error("invalid configuration in {}: {reason}", path.display())]
    Invalid { path: PathBuf, reason: String },
    #[error("rule pattern must not be empty")]
    EmptyPattern,
    #[error("invalid glob pattern '{pattern}': {reason}")]
    InvalidGlob { pattern: String, reason: String },
    #[error("invalid regex pattern '{pattern}': {reason}")]
    InvalidRegex { pattern: String, reason: String },
    #[error("unknown category '{0}'")]
    UnknownCategory(String),
    #[error("rule '{pattern}' has an empty destination")]
    EmptyDestination { pattern: String },
    #[error("destination {} exists and is not a directory", .0.display())]
    DestinationIsFile(PathBuf),
    #[error("invalid date '{value}': expected YYYY-MM-DD or an RFC 3339 timestamp")]
    InvalidDate { value: String },
    #[error("rule '{pattern}' has min_size greater than max_size")]
    InvalidSizeRange { pattern: String },
    #[error("invalid rule '{0}': expected PATTERN=DESTINATION")]
    InvalidRuleSpec(String),
    #[error("no source directory given")]
    MissingSource,
    #[error("source {} is not a directory", .0.display())]
    SourceNotADirectory(PathBuf),
    #[error("no distribution configured")]
    MissingDistribution,
    #[error("distribution needs at least one destination folder")]
    NoDestinations,
}

/// Top-level configuration file contents.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    #[serde(default)]
    pub source: Option<PathBuf>,
    #[serde(default)]
    pub recursive: bool,
    #[serde(default)]
    pub follow_symlinks: bool,
    #[serde(default)]
    pub conflict_policy: ConflictPolicy,
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default)]
    pub filters: FilterSettings,
    #[serde(default)]
    pub rules: Vec<RuleSettings>,
    #[serde(default)]
    pub distribute: Option<DistributeSettings>,
}

/// One `[[rules]]` entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleSettings {
    #[serde(default)]
    pub name: Option<String>,
    pub pattern: String,
    /// Inferred from `pattern` when absent.
    #[serde(default)]
    pub kind: Option<PatternKind>,
    pub destination: PathBuf,
    #[serde(default)]
    pub action: Action,
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub min_size: Option<u64>,
    #[serde(default)]
    pub max_size: Option<u64>,
    #[serde(default)]
    pub modified_after: Option<String>,
    #[serde(default)]
    pub modified_before: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistributeSettings {
    pub destinations: Vec<PathBuf>,
    #[serde(default = "default_files_per_folder")]
    pub files_per_folder: usize,
    #[serde(default = "default_distribute_action")]
    pub action: Action,
}

fn default_files_per_folder() -> usize {
    1
}

fn default_distribute_action() -> Action {
    Action::Move
}

impl RuleSettings {
    /// Parses a command-line rule of the form `PATTERN=DESTINATION`.
    pub fn from_spec(spec: &str, action: Action) -> Result<Self, ConfigError> {
        let (pattern, destination) = spec
            .split_once('=')
            .ok_or_else(|| ConfigError::InvalidRuleSpec(spec.to_string()))?;
        Ok(Self {
            pattern: pattern.to_string(),
            destination: PathBuf::from(destination),
            action,
            ..Default::default()
        })
    }

    pub fn compile(&self) -> Result<Rule, ConfigError> {
        if self.destination.as_os_str().is_empty() {
            return Err(ConfigError::EmptyDestination {
                pattern: self.pattern.clone(),
            });
        }
        if let (Some(min), Some(max)) = (self.min_size, self.max_size)
            && min > max
        {
            return Err(ConfigError::InvalidSizeRange {
                pattern: self.pattern.clone(),
            });
        }

        let conditions = Conditions {
            min_size: self.min_size,
            max_size: self.max_size,
            modified_after: self.modified_after.as_deref().map(parse_date).transpose()?,
            modified_before: self.modified_before.as_deref().map(parse_date).transpose()?,
        };
        let mut rule = Rule::new(
            Pattern::parse(&self.pattern, self.kind)?,
            &self.destination,
            self.action,
        )
        .with_priority(self.priority)
        .with_conditions(conditions);
        rule.name = self.name.clone();
        Ok(rule)
    }
}

/// Accepts `YYYY-MM-DD` (midnight UTC) or a full RFC 3339 timestamp.
pub fn parse_date(value: &str) -> Result<DateTime<Utc>, ConfigError> {
    let value = value.trim();
    if let Ok(timestamp) = DateTime::parse_from_rfc3339(value) {
        return Ok(timestamp.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|midnight| midnight.and_utc())
        .ok_or_else(|| ConfigError::InvalidDate {
            value: value.to_string(),
        })
}

impl RunConfig {
    /// Loads configuration, trying in order:
    /// 1. `config_path`, when given
    /// 2. `.filedispatch.toml` in the current directory
    /// 3. `~/.config/filedispatch/config.toml`
    /// 4. built-in defaults (no rules)
    pub fn load(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = config_path {
            return Self::load_from_file(path);
        }

        let local = PathBuf::from(LOCAL_CONFIG_FILE);
        if local.is_file() {
            return Self::load_from_file(&local);
        }

        if let Some(home) = std::env::var_os("HOME") {
            let user = PathBuf::from(home)
                .join(".config")
                .join("filedispatch")
                .join("config.toml");
            if user.is_file() {
                return Self::load_from_file(&user);
            }
        }

        Ok(Self::default())
    }

    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content).map_err(|e| match e {
            ConfigError::Invalid { reason, .. } => ConfigError::Invalid {
                path: path.to_path_buf(),
                reason,
            },
            other => other,
        })
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::Invalid {
            path: PathBuf::from("<inline>"),
            reason: e.message().to_string(),
        })
    }

    /// Validates the configuration into a rule-based job.
    pub fn compile(self) -> Result<Job, ConfigError> {
        let rules = self
            .rules
            .iter()
            .map(RuleSettings::compile)
            .collect::<Result<Vec<_>, _>>()?;
        self.into_job(Plan::Rules(RuleSet::new(rules)))
    }

    /// Validates the configuration into a distribution job.
    pub fn compile_distribution(mut self) -> Result<Job, ConfigError> {
        let settings = self
            .distribute
            .take()
            .ok_or(ConfigError::MissingDistribution)?;
        let distribution = Distribution::new(
            settings.destinations,
            settings.files_per_folder,
            settings.action,
        )?;
        self.into_job(Plan::Distribute(distribution))
    }

    fn into_job(self, plan: Plan) -> Result<Job, ConfigError> {
        let source = self.source.ok_or(ConfigError::MissingSource)?;
        if !source.is_dir() {
            return Err(ConfigError::SourceNotADirectory(source));
        }

        let job = Job {
            scan: ScanOptions {
                recursive: self.recursive,
                follow_symlinks: self.follow_symlinks,
                detect_content_type: false,
                filter: ScanFilter::compile(&self.filters)?,
                pruned_dirs: Vec::new(),
            },
            dispatch: DispatchOptions {
                conflict_policy: self.conflict_policy,
                dry_run: self.dry_run,
                base_dir: source.clone(),
            },
            source,
            plan,
        };

        if let Some(blocked) = job.destinations().into_iter().find(|dir| dir.is_file()) {
            return Err(ConfigError::DestinationIsFile(blocked));
        }
        Ok(job)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn config_for(source: &Path, rules: Vec<RuleSettings>) -> RunConfig {
        RunConfig {
            source: Some(source.to_path_buf()),
            rules,
            ..Default::default()
        }
    }

    #[test]
    fn test_parse_full_file() {
        let config = RunConfig::from_toml(
            r#"
            source = "/data/inbox"
            recursive = true
            conflict_policy = "skip"

            [filters]
            enable_hidden_files = true

            [filters.exclude]
            extensions = ["tmp"]

            [[rules]]
            name = "photos"
            pattern = "*.jpg"
            destination = "Images"
            action = "copy"
            priority = 2

            [[rules]]
            pattern = "pdf"
            destination = "/archive/docs"
            action = "move"
            min_size = 1024
            modified_before = "2024-01-01"

            [distribute]
            destinations = ["A", "B"]
            files_per_folder = 25
            "#,
        )
        .unwrap();

        assert_eq!(config.source, Some(PathBuf::from("/data/inbox")));
        assert!(config.recursive);
        assert_eq!(config.conflict_policy, ConflictPolicy::Skip);
        assert!(config.filters.enable_hidden_files);
        assert_eq!(config.filters.exclude.extensions, vec!["tmp"]);
        assert_eq!(config.rules.len(), 2);
        assert_eq!(config.rules[0].name.as_deref(), Some("photos"));
        assert_eq!(config.rules[0].priority, 2);
        assert_eq!(config.rules[1].action, Action::Move);
        assert_eq!(config.rules[1].min_size, Some(1024));
        let distribute = config.distribute.unwrap();
        assert_eq!(distribute.files_per_folder, 25);
        assert_eq!(distribute.action, Action::Move);
    }

    #[test]
    fn test_defaults() {
        let config = RunConfig::from_toml("").unwrap();
        assert_eq!(config, RunConfig::default());
        assert_eq!(config.conflict_policy, ConflictPolicy::Rename);
        assert!(!config.recursive);

        let config = RunConfig::from_toml(
            "[[rules]]\npattern = \"*\"\ndestination = \"x\"\n[distribute]\ndestinations = [\"a\"]",
        )
        .unwrap();
        assert_eq!(config.rules[0].action, Action::Copy);
        assert_eq!(config.rules[0].priority, 0);
        assert_eq!(config.distribute.unwrap().files_per_folder, 1);
    }

    #[test]
    fn test_invalid_toml() {
        assert!(matches!(
            RunConfig::from_toml("recursive = \"yes\""),
            Err(ConfigError::Invalid { .. })
        ));
        assert!(matches!(
            RunConfig::from_toml("conflict_policy = \"merge\""),
            Err(ConfigError::Invalid { .. })
        ));
    }

    #[test]
    fn test_load_explicit_file() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let path = temp_dir.path().join("rules.toml");
        fs::write(&path, "recursive = true").unwrap();
        assert!(RunConfig::load(Some(&path)).unwrap().recursive);

        let missing = temp_dir.path().join("missing.toml");
        assert!(matches!(
            RunConfig::load(Some(&missing)),
            Err(ConfigError::NotFound(_))
        ));

        fs::write(&path, "[[rules]]\npattern = 3").unwrap();
        match RunConfig::load(Some(&path)) {
            Err(ConfigError::Invalid { path: reported, .. }) => assert_eq!(reported, path),
            other => panic!("expected invalid configuration, got {:?}", other),
        }
    }

    #[test]
    fn test_rule_spec() {
        let rule = RuleSettings::from_spec("*.jpg=Images/2024", Action::Move).unwrap();
        assert_eq!(rule.pattern, "*.jpg");
        assert_eq!(rule.destination, PathBuf::from("Images/2024"));
        assert_eq!(rule.action, Action::Move);
        assert!(matches!(
            RuleSettings::from_spec("*.jpg", Action::Copy),
            Err(ConfigError::InvalidRuleSpec(_))
        ));
    }

    #[test]
    fn test_parse_date() {
        assert_eq!(
            parse_date("2024-03-01").unwrap(),
            Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap()
        );
        assert_eq!(
            parse_date("2024-03-01T10:30:00+02:00").unwrap(),
            Utc.with_ymd_and_hms(2024, 3, 1, 8, 30, 0).unwrap()
        );
        assert!(matches!(
            parse_date("March 1st"),
            Err(ConfigError::InvalidDate { .. })
        ));
    }

    #[test]
    fn test_compile_rules() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let config = config_for(
            temp_dir.path(),
            vec![
                RuleSettings {
                    pattern: "*.jpg".to_string(),
                    destination: PathBuf::from("Images"),
                    ..Default::default()
                },
                RuleSettings {
                    name: Some("invoices".to_string()),
                    pattern: "^inv".to_string(),
                    kind: Some(PatternKind::Regex),
                    destination: PathBuf::from("Invoices"),
                    priority: 3,
                    modified_after: Some("2023-12-31".to_string()),
                    ..Default::default()
                },
            ],
        );

        let job = config.compile().unwrap();
        let Plan::Rules(rules) = &job.plan else {
            panic!("expected a rule plan");
        };
        let first = rules.iter().next().unwrap();
        assert_eq!(first.name.as_deref(), Some("invoices"));
        assert!(first.conditions.modified_after.is_some());
        assert_eq!(job.dispatch.base_dir, temp_dir.path());
        assert_eq!(
            job.destinations(),
            vec![temp_dir.path().join("Invoices"), temp_dir.path().join("Images")]
        );
    }

    #[test]
    fn test_compile_rejects_bad_input_before_touching_anything() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let root = temp_dir.path();

        let empty = config_for(
            root,
            vec![RuleSettings {
                pattern: "".to_string(),
                destination: PathBuf::from("x"),
                ..Default::default()
            }],
        );
        assert!(matches!(empty.compile(), Err(ConfigError::EmptyPattern)));

        let sizes = config_for(
            root,
            vec![RuleSettings {
                pattern: "*".to_string(),
                destination: PathBuf::from("x"),
                min_size: Some(10),
                max_size: Some(1),
                ..Default::default()
            }],
        );
        assert!(matches!(
            sizes.compile(),
            Err(ConfigError::InvalidSizeRange { .. })
        ));

        fs::write(root.join("taken"), "file").unwrap();
        let file_dest = config_for(
            root,
            vec![RuleSettings {
                pattern: "*".to_string(),
                destination: PathBuf::from("taken"),
                ..Default::default()
            }],
        );
        assert!(matches!(
            file_dest.compile(),
            Err(ConfigError::DestinationIsFile(_))
        ));

        assert!(matches!(
            RunConfig::default().compile(),
            Err(ConfigError::MissingSource)
        ));
        assert!(matches!(
            config_for(&root.join("taken"), Vec::new()).compile(),
            Err(ConfigError::SourceNotADirectory(_))
        ));

        let entries: Vec<_> = fs::read_dir(root).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn test_compile_distribution() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let mut config = config_for(temp_dir.path(), Vec::new());
        assert!(matches!(
            config.clone().compile_distribution(),
            Err(ConfigError::MissingDistribution)
        ));

        config.distribute = Some(DistributeSettings {
            destinations: vec![PathBuf::from("A"), PathBuf::from("B")],
            files_per_folder: 3,
            action: Action::Move,
        });
        let job = config.compile_distribution().unwrap();
        let Plan::Distribute(distribution) = &job.plan else {
            panic!("expected a distribution plan");
        };
        assert_eq!(distribution.files_per_folder, 3);
        assert_eq!(job.destinations().len(), 2);
    }
}
