//! Scan-time exclusion filters.
//!
//! Filters decide which files the scanner hands to the dispatcher at all,
//! independently of the dispatch rules. They are configured in the
//! `[filters]` section of the configuration file:
//!
//! ```toml
//! [filters]
//! enable_hidden_files = false
//!
//! [filters.exclude]
//! filenames = [".DS_Store", "Thumbs.db"]
//! patterns = ["*.part", "build/**"]
//! extensions = ["tmp", "crdownload"]
//! regex = []
//!
//! [filters.include]
//! patterns = []
//! ```

use crate::config::ConfigError;
use glob::Pattern;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterSettings {
    /// Whether files and directories whose name starts with `.` are scanned.
    #[serde(default)]
    pub enable_hidden_files: bool,

    #[serde(default)]
    pub exclude: ExcludeSettings,

    /// Whitelist, overrides every exclusion.
    #[serde(default)]
    pub include: IncludeSettings,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExcludeSettings {
    /// Exact file names.
    #[serde(default)]
    pub filenames: Vec<String>,

    /// Globs matched against the path relative to the scan root.
    #[serde(default)]
    pub patterns: Vec<String>,

    /// Extensions, compared case-insensitively.
    #[serde(default)]
    pub extensions: Vec<String>,

    /// Regexes searched in the file name.
    #[serde(default)]
    pub regex: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IncludeSettings {
    #[serde(default)]
    pub patterns: Vec<String>,
}

/// Filter settings with every pattern compiled.
#[derive(Debug, Clone, Default)]
pub struct ScanFilter {
    hidden_allowed: bool,
    names: HashSet<String>,
    extensions: HashSet<String>,
    globs: Vec<Pattern>,
    regexes: Vec<Regex>,
    overrides: Vec<Pattern>,
}

fn compile_globs(patterns: &[String]) -> Result<Vec<Pattern>, ConfigError> {
    patterns
        .iter()
        .map(|raw| {
            Pattern::new(raw).map_err(|e| ConfigError::InvalidGlob {
                pattern: raw.clone(),
                reason: e.msg.to_string(),
            })
        })
        .collect()
}

impl ScanFilter {
    pub fn compile(settings: &FilterSettings) -> Result<Self, ConfigError> {
        let regexes = settings
            .exclude
            .regex
            .iter()
            .map(|raw| {
                Regex::new(raw).map_err(|e| ConfigError::InvalidRegex {
                    pattern: raw.clone(),
                    reason: e.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            hidden_allowed: settings.enable_hidden_files,
            names: settings.exclude.filenames.iter().cloned().collect(),
            extensions: settings
                .exclude
                .extensions
                .iter()
                .map(|ext| ext.trim_start_matches('.').to_ascii_lowercase())
                .collect(),
            globs: compile_globs(&settings.exclude.patterns)?,
            regexes,
            overrides: compile_globs(&settings.include.patterns)?,
        })
    }

    /// Whether the scanner should descend into a directory.
    ///
    /// Only the hidden-file switch applies to directories; exclusion globs
    /// such as `build/**` are evaluated on the files below them.
    pub fn admits_dir(&self, name: &str) -> bool {
        self.hidden_allowed || !name.starts_with('.')
    }

    /// Whether a file, given by its path relative to the scan root, is scanned.
    pub fn admits_file(&self, relative: &Path) -> bool {
        if self.overrides.iter().any(|p| p.matches_path(relative)) {
            return true;
        }

        let name = relative
            .file_name()
            .map(|n| n.to_string_lossy())
            .unwrap_or_default();

        if !self.hidden_allowed && name.starts_with('.') {
            return false;
        }
        if self.names.contains(name.as_ref()) {
            return false;
        }
        let excluded_ext = relative
            .extension()
            .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
            .is_some_and(|ext| self.extensions.contains(&ext));
        if excluded_ext {
            return false;
        }
        if self.globs.iter().any(|p| p.matches_path(relative)) {
            return false;
        }
        !self.regexes.iter().any(|r| r.is_match(&name))
    }
}
