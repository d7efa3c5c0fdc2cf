//! Enumerates candidate files under a source directory.
//!
//! [`Scanner::scan`] returns a lazy iterator over [`FileEntry`] snapshots.
//! Traversal problems are yielded as [`ScanError`]s in place of the entries
//! that could not be read; the walk then carries on with the rest of the
//! tree.

use crate::category::sniff_mime;
use crate::filter::ScanFilter;
use crate::history::HISTORY_FILE_NAME;
use chrono::{DateTime, Utc};
use std::io;
use std::path::{Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

/// Read-only snapshot of a file taken at scan time.
#[derive(Debug, Clone, PartialEq)]
pub struct FileEntry {
    pub path: PathBuf,
    /// Path relative to the scan root.
    pub relative_path: PathBuf,
    pub name: String,
    /// Extension without the dot, as written on disk.
    pub extension: Option<String>,
    pub size: u64,
    pub modified: DateTime<Utc>,
    /// Sniffed content type, only filled in when some rule needs it.
    pub mime: Option<String>,
}

impl FileEntry {
    /// Snapshots a single file. `relative_path` is set to the file name.
    pub fn from_path(path: &Path) -> io::Result<Self> {
        let name = path
            .file_name()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "path has no file name"))?;
        Self::snapshot(path, Path::new(name), &std::fs::metadata(path)?)
    }

    fn snapshot(path: &Path, relative: &Path, metadata: &std::fs::Metadata) -> io::Result<Self> {
        let name = relative
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(Self {
            path: path.to_path_buf(),
            relative_path: relative.to_path_buf(),
            extension: path
                .extension()
                .map(|ext| ext.to_string_lossy().into_owned()),
            name,
            size: metadata.len(),
            modified: DateTime::<Utc>::from(metadata.modified()?),
            mime: None,
        })
    }
}

/// Problems met while walking the source tree. The affected subtree is skipped.
#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    /// The directory or file could not be read for lack of permission.
    #[error("permission denied reading {}", path.display())]
    Permission { path: PathBuf, source: io::Error },
    /// A symbolic link points back at one of its own ancestors.
    #[error("symbolic link cycle at {} (points back to {})", path.display(), ancestor.display())]
    Cycle { path: PathBuf, ancestor: PathBuf },
    /// Any other traversal failure.
    #[error("cannot traverse {}: {source}", path.display())]
    Traversal { path: PathBuf, source: io::Error },
}

impl ScanError {
    pub fn path(&self) -> &Path {
        match self {
            ScanError::Permission { path, .. }
            | ScanError::Cycle { path, .. }
            | ScanError::Traversal { path, .. } => path,
        }
    }

    fn from_walk(root: &Path, err: walkdir::Error) -> Self {
        let path = err.path().unwrap_or(root).to_path_buf();
        if let Some(ancestor) = err.loop_ancestor() {
            return ScanError::Cycle {
                ancestor: ancestor.to_path_buf(),
                path,
            };
        }
        let io_err = err
            .into_io_error()
            .unwrap_or_else(|| io::Error::other("directory traversal failed"));
        Self::from_io(path, io_err)
    }

    fn from_io(path: PathBuf, source: io::Error) -> Self {
        if source.kind() == io::ErrorKind::PermissionDenied {
            ScanError::Permission { path, source }
        } else {
            ScanError::Traversal { path, source }
        }
    }
}

/// What a [`Scanner`] visits and yields.
#[derive(Debug, Clone, Default)]
pub struct ScanOptions {
    /// Descend into subdirectories. Otherwise only the root's own files.
    pub recursive: bool,
    /// Follow symbolic links; links back to an ancestor become [`ScanError::Cycle`].
    pub follow_symlinks: bool,
    /// Sniff each file's content type (see [`FileEntry::mime`]).
    pub detect_content_type: bool,
    /// Name, glob and extension filters applied to every candidate file.
    pub filter: ScanFilter,
    /// Directories never descended into, typically the run's destinations.
    pub pruned_dirs: Vec<PathBuf>,
}

/// Scanner for one run. Holds no state between scans.
#[derive(Debug, Clone, Default)]
pub struct Scanner {
    options: ScanOptions,
}

impl Scanner {
    pub fn new(options: ScanOptions) -> Self {
        Self { options }
    }

    /// Walks `root`, yielding files in file-name order within each directory.
    pub fn scan(&self, root: &Path) -> Scan<'_> {
        let max_depth = if self.options.recursive { usize::MAX } else { 1 };
        let walker = WalkDir::new(root)
            .min_depth(1)
            .max_depth(max_depth)
            .follow_links(self.options.follow_symlinks)
            .sort_by_file_name();

        Scan {
            root: root.to_path_buf(),
            walker: walker.into_iter(),
            options: &self.options,
        }
    }
}

/// Lazy traversal produced by [`Scanner::scan`].
pub struct Scan<'s> {
    root: PathBuf,
    walker: walkdir::IntoIter,
    options: &'s ScanOptions,
}

impl Scan<'_> {
    fn is_pruned(&self, entry: &DirEntry) -> bool {
        let name = entry.file_name().to_string_lossy();
        !self.options.filter.admits_dir(&name)
            || self
                .options
                .pruned_dirs
                .iter()
                .any(|dir| same_location(dir, entry.path()))
    }

    fn relative<'p>(&self, path: &'p Path) -> &'p Path {
        path.strip_prefix(&self.root).unwrap_or(path)
    }
}

impl Iterator for Scan<'_> {
    type Item = Result<FileEntry, ScanError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let entry = match self.walker.next()? {
                Ok(entry) => entry,
                Err(err) => {
                    let err = ScanError::from_walk(&self.root, err);
                    tracing::warn!(path = %err.path().display(), "{}", err);
                    return Some(Err(err));
                }
            };

            let file_type = entry.file_type();
            if file_type.is_dir() {
                if self.is_pruned(&entry) {
                    tracing::debug!(path = %entry.path().display(), "skipping directory");
                    self.walker.skip_current_dir();
                }
                continue;
            }
            // Only reachable when links are not followed.
            if file_type.is_symlink() {
                tracing::debug!(path = %entry.path().display(), "not following symbolic link");
                continue;
            }

            let relative = self.relative(entry.path());
            if entry.depth() == 1 && entry.file_name() == HISTORY_FILE_NAME {
                continue;
            }
            if !self.options.filter.admits_file(relative) {
                tracing::debug!(path = %relative.display(), "excluded by filters");
                continue;
            }

            let snapshot = entry
                .metadata()
                .map_err(|e| ScanError::from_walk(&self.root, e))
                .and_then(|metadata| {
                    FileEntry::snapshot(entry.path(), relative, &metadata)
                        .map_err(|e| ScanError::from_io(entry.path().to_path_buf(), e))
                });

            return Some(snapshot.map(|mut file| {
                if self.options.detect_content_type {
                    file.mime = sniff_mime(&file.path);
                }
                file
            }));
        }
    }
}

/// Compares two paths by their canonical form when both exist, lexically otherwise.
pub(crate) fn same_location(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}
