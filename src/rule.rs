//! Dispatch rules and the matcher that evaluates them.
//!
//! A [`Rule`] pairs a [`Pattern`] (plus optional size and date
//! [`Conditions`]) with a destination directory and an [`Action`]. A
//! [`RuleSet`] keeps rules ordered by priority so that the first match is
//! the one that wins.

use crate::category::{Category, FileMapper};
use crate::config::ConfigError;
use crate::scanner::FileEntry;
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

static MAPPER: LazyLock<FileMapper> = LazyLock::new(FileMapper::new);

/// What happens to a file once a rule matches it.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    #[default]
    Copy,
    Move,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Copy => f.write_str("copy"),
            Action::Move => f.write_str("move"),
        }
    }
}

/// The kind of a pattern as written in a configuration file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatternKind {
    Glob,
    Extension,
    Regex,
    Category,
}

impl PatternKind {
    /// Guesses the kind of an untagged pattern.
    ///
    /// A bare token of ASCII alphanumerics (optionally with a leading dot,
    /// e.g. `jpg` or `.jpg`) is an extension; anything else is a glob.
    pub fn infer(raw: &str) -> Self {
        let token = raw.strip_prefix('.').unwrap_or(raw);
        if !token.is_empty() && token.chars().all(|c| c.is_ascii_alphanumeric()) {
            PatternKind::Extension
        } else {
            PatternKind::Glob
        }
    }
}

/// A compiled file-name predicate.
#[derive(Debug, Clone)]
pub enum Pattern {
    /// Shell glob (`*`, `?`, `[...]`) matched against the whole file name.
    Glob(glob::Pattern),
    /// Lowercased extension without the leading dot.
    Extension(String),
    /// Regex searched in the file name.
    Regex(Regex),
    /// Content/extension based category.
    Category(Category),
}

impl Pattern {
    /// Compiles `raw` as the given kind, inferring the kind when `None`.
    pub fn parse(raw: &str, kind: Option<PatternKind>) -> Result<Self, ConfigError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(ConfigError::EmptyPattern);
        }

        match kind.unwrap_or_else(|| PatternKind::infer(raw)) {
            PatternKind::Glob => glob::Pattern::new(raw).map(Pattern::Glob).map_err(|e| {
                ConfigError::InvalidGlob {
                    pattern: raw.to_string(),
                    reason: e.msg.to_string(),
                }
            }),
            PatternKind::Extension => {
                let ext = raw.trim_start_matches('.');
                if ext.is_empty() {
                    return Err(ConfigError::EmptyPattern);
                }
                Ok(Pattern::Extension(ext.to_ascii_lowercase()))
            }
            PatternKind::Regex => {
                Regex::new(raw)
                    .map(Pattern::Regex)
                    .map_err(|e| ConfigError::InvalidRegex {
                        pattern: raw.to_string(),
                        reason: e.to_string(),
                    })
            }
            PatternKind::Category => raw
                .parse::<Category>()
                .map(Pattern::Category)
                .map_err(|e| ConfigError::UnknownCategory(e.0)),
        }
    }

    pub fn is_match(&self, file: &FileEntry) -> bool {
        match self {
            Pattern::Glob(glob) => glob.matches(&file.name),
            Pattern::Extension(ext) => file
                .extension
                .as_deref()
                .is_some_and(|own| own.eq_ignore_ascii_case(ext)),
            Pattern::Regex(regex) => regex.is_match(&file.name),
            Pattern::Category(category) => {
                MAPPER.categorize(file.mime.as_deref(), file.extension.as_deref()) == *category
            }
        }
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Pattern::Glob(glob) => f.write_str(glob.as_str()),
            Pattern::Extension(ext) => write!(f, ".{}", ext),
            Pattern::Regex(regex) => write!(f, "/{}/", regex.as_str()),
            Pattern::Category(category) => write!(f, "category:{}", category),
        }
    }
}

/// Extra predicates a file must satisfy besides the pattern.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Conditions {
    /// Inclusive lower size bound in bytes.
    pub min_size: Option<u64>,
    /// Inclusive upper size bound in bytes.
    pub max_size: Option<u64>,
    /// Inclusive lower bound on the modification time.
    pub modified_after: Option<DateTime<Utc>>,
    /// Exclusive upper bound on the modification time.
    pub modified_before: Option<DateTime<Utc>>,
}

impl Conditions {
    /// True when `file` satisfies every bound that is set.
    pub fn hold_for(&self, file: &FileEntry) -> bool {
        self.min_size.is_none_or(|min| file.size >= min)
            && self.max_size.is_none_or(|max| file.size <= max)
            && self.modified_after.is_none_or(|after| file.modified >= after)
            && self.modified_before.is_none_or(|before| file.modified < before)
    }
}

/// A predicate-action pair.
#[derive(Debug, Clone)]
pub struct Rule {
    pub name: Option<String>,
    pub pattern: Pattern,
    pub destination: PathBuf,
    pub action: Action,
    pub priority: i32,
    pub conditions: Conditions,
}

impl Rule {
    pub fn new(pattern: Pattern, destination: impl Into<PathBuf>, action: Action) -> Self {
        Self {
            name: None,
            pattern,
            destination: destination.into(),
            action,
            priority: 0,
            conditions: Conditions::default(),
        }
    }

    /// Builds a rule from an untagged pattern string, validating both parts.
    ///
    /// # Errors
    ///
    /// [`ConfigError::EmptyDestination`] for an empty destination, or the
    /// pattern's own parse error.
    pub fn parse(pattern: &str, destination: &Path, action: Action) -> Result<Self, ConfigError> {
        if destination.as_os_str().is_empty() {
            return Err(ConfigError::EmptyDestination {
                pattern: pattern.to_string(),
            });
        }
        Ok(Self::new(Pattern::parse(pattern, None)?, destination, action))
    }

    /// Higher priorities are tried first. Defaults to 0.
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Narrows the rule to files meeting `conditions`.
    pub fn with_conditions(mut self, conditions: Conditions) -> Self {
        self.conditions = conditions;
        self
    }

    /// The rule name if it has one, otherwise its pattern.
    pub fn label(&self) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| self.pattern.to_string())
    }

    pub(crate) fn needs_content_type(&self) -> bool {
        matches!(self.pattern, Pattern::Category(_))
    }
}

/// Returns whether `rule` applies to `file`. Never touches the filesystem.
pub fn matches(rule: &Rule, file: &FileEntry) -> bool {
    rule.pattern.is_match(file) && rule.conditions.hold_for(file)
}

/// Rules in evaluation order: highest priority first, declaration order on ties.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    rules: Vec<Rule>,
}

impl RuleSet {
    /// Orders `rules` for evaluation.
    pub fn new(mut rules: Vec<Rule>) -> Self {
        // sort_by_key is stable
        rules.sort_by_key(|rule| Reverse(rule.priority));
        Self { rules }
    }

    /// The rule that decides `file`, if any.
    pub fn first_match(&self, file: &FileEntry) -> Option<&Rule> {
        self.rules.iter().find(|rule| matches(rule, file))
    }

    /// Rules in evaluation order.
    pub fn iter(&self) -> std::slice::Iter<'_, Rule> {
        self.rules.iter()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Whether any rule inspects file content, so the scanner must sniff MIME types.
    pub fn needs_content_type(&self) -> bool {
        self.rules.iter().any(Rule::needs_content_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn entry(name: &str, size: u64) -> FileEntry {
        let path = PathBuf::from("/src").join(name);
        FileEntry {
            extension: Path::new(name)
                .extension()
                .map(|e| e.to_string_lossy().into_owned()),
            name: name.to_string(),
            relative_path: PathBuf::from(name),
            path,
            size,
            modified: Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap(),
            mime: None,
        }
    }

    fn rule(pattern: &str) -> Rule {
        Rule::parse(pattern, Path::new("out"), Action::Copy).unwrap()
    }

    #[test]
    fn test_kind_inference() {
        assert_eq!(PatternKind::infer("jpg"), PatternKind::Extension);
        assert_eq!(PatternKind::infer(".JPG"), PatternKind::Extension);
        assert_eq!(PatternKind::infer("*.jpg"), PatternKind::Glob);
        assert_eq!(PatternKind::infer("photo.jpg"), PatternKind::Glob);
        assert_eq!(PatternKind::infer("."), PatternKind::Glob);
    }

    #[test]
    fn test_glob_matches_name() {
        let r = rule("*.jpg");
        assert!(matches(&r, &entry("b.jpg", 1)));
        assert!(!matches(&r, &entry("b.jpeg", 1)));
        assert!(!matches(&r, &entry("b.JPG", 1)));

        let r = rule("IMG_????.png");
        assert!(matches(&r, &entry("IMG_0042.png", 1)));
        assert!(!matches(&r, &entry("IMG_42.png", 1)));

        let r = rule("[abc]*.txt");
        assert!(matches(&r, &entry("a.txt", 1)));
        assert!(!matches(&r, &entry("d.txt", 1)));
    }

    #[test]
    fn test_extension_is_exact_and_case_insensitive() {
        let r = rule(".jpg");
        assert!(matches(&r, &entry("holiday.JPG", 1)));
        assert!(!matches(&r, &entry("holiday.jpeg", 1)));
        assert!(!matches(&r, &entry("jpg", 1)));
        assert!(!matches(&r, &entry("archive.jpg.zip", 1)));
    }

    #[test]
    fn test_regex_pattern() {
        let r = Rule::new(
            Pattern::parse(r"^invoice-\d{4}", Some(PatternKind::Regex)).unwrap(),
            "invoices",
            Action::Move,
        );
        assert!(matches(&r, &entry("invoice-2024-03.pdf", 1)));
        assert!(!matches(&r, &entry("my-invoice-2024.pdf", 1)));
    }

    #[test]
    fn test_category_pattern_uses_mime_then_extension() {
        let r = Rule::new(
            Pattern::parse("images", Some(PatternKind::Category)).unwrap(),
            "pics",
            Action::Copy,
        );
        assert!(matches(&r, &entry("cat.png", 1)));

        let mut sniffed = entry("cat.dat", 1);
        assert!(!matches(&r, &sniffed));
        sniffed.mime = Some("image/jpeg".to_string());
        assert!(matches(&r, &sniffed));
    }

    #[test]
    fn test_invalid_patterns() {
        assert!(matches!(
            Pattern::parse("   ", None),
            Err(ConfigError::EmptyPattern)
        ));
        assert!(matches!(
            Pattern::parse("[oops", None),
            Err(ConfigError::InvalidGlob { .. })
        ));
        assert!(matches!(
            Pattern::parse("(", Some(PatternKind::Regex)),
            Err(ConfigError::InvalidRegex { .. })
        ));
        assert!(matches!(
            Pattern::parse("pictures", Some(PatternKind::Category)),
            Err(ConfigError::UnknownCategory(_))
        ));
        assert!(matches!(
            Rule::parse("*.jpg", Path::new(""), Action::Copy),
            Err(ConfigError::EmptyDestination { .. })
        ));
    }

    #[test]
    fn test_size_and_date_conditions() {
        let r = rule("*").with_conditions(Conditions {
            min_size: Some(10),
            max_size: Some(100),
            modified_after: Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()),
            modified_before: Some(Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()),
        });
        // modified_before is exclusive and the fixture is modified exactly at the bound
        assert!(!matches(&r, &entry("a.bin", 50)));

        let r = rule("*").with_conditions(Conditions {
            min_size: Some(10),
            max_size: Some(100),
            modified_after: Some(Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()),
            modified_before: None,
        });
        assert!(matches(&r, &entry("a.bin", 10)));
        assert!(matches(&r, &entry("a.bin", 100)));
        assert!(!matches(&r, &entry("a.bin", 9)));
        assert!(!matches(&r, &entry("a.bin", 101)));
    }

    #[test]
    fn test_higher_priority_wins() {
        let low = rule("*.jpg").with_name("low").with_priority(1);
        let high = rule("*.jpg").with_name("high").with_priority(2);
        let set = RuleSet::new(vec![low, high]);
        let hit = set.first_match(&entry("f.jpg", 1)).unwrap();
        assert_eq!(hit.name.as_deref(), Some("high"));
    }

    #[test]
    fn test_equal_priority_keeps_declaration_order() {
        let set = RuleSet::new(vec![
            rule("*.txt").with_name("unrelated").with_priority(5),
            rule("*").with_name("first"),
            rule("*.jpg").with_name("second"),
        ]);
        let hit = set.first_match(&entry("f.jpg", 1)).unwrap();
        assert_eq!(hit.name.as_deref(), Some("first"));
    }

    #[test]
    fn test_no_match_and_empty_set() {
        let set = RuleSet::new(vec![rule("*.jpg")]);
        assert!(set.first_match(&entry("a.txt", 1)).is_none());
        assert!(RuleSet::default().first_match(&entry("a.txt", 1)).is_none());
    }

    #[test]
    fn test_needs_content_type() {
        let plain = RuleSet::new(vec![rule("*.jpg")]);
        assert!(!plain.needs_content_type());
        let sniffing = RuleSet::new(vec![Rule::new(
            Pattern::Category(Category::Video),
            "videos",
            Action::Move,
        )]);
        assert!(sniffing.needs_content_type());
    }
}
