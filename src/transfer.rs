//! Filesystem primitives used by the dispatcher and by undo.
//!
//! Everything here works on one file at a time and reports failures as
//! [`TransferError`]s carrying the paths involved.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::ffi::OsStr;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

/// Behavior when the destination already holds a file with the same name.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum ConflictPolicy {
    /// Replace the existing file.
    Overwrite,
    /// Leave both files alone and report the source as skipped.
    Skip,
    /// Write under the first free `name (N).ext`.
    #[default]
    Rename,
}

/// Broad classification of a failure, for reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorKind {
    /// Access was denied by the filesystem.
    Permission,
    /// Anything else: missing files, full disks, bad paths.
    Io,
}

/// Failure of a single filesystem step. Each variant names the paths involved.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("cannot create directory {}: {source}", path.display())]
    CreateDir { path: PathBuf, source: io::Error },
    #[error("{} exists and is not a directory", path.display())]
    NotADirectory { path: PathBuf },
    #[error("{} is a directory", path.display())]
    TargetIsDirectory { path: PathBuf },
    #[error("cannot inspect {}: {source}", path.display())]
    Inspect { path: PathBuf, source: io::Error },
    #[error("cannot copy {} to {}: {source}", from.display(), to.display())]
    Copy {
        from: PathBuf,
        to: PathBuf,
        source: io::Error,
    },
    #[error("cannot move {} to {}: {source}", from.display(), to.display())]
    Move {
        from: PathBuf,
        to: PathBuf,
        source: io::Error,
    },
    #[error("copied {} to {} but cannot remove the original: {source}", from.display(), to.display())]
    RemoveSource {
        from: PathBuf,
        to: PathBuf,
        source: io::Error,
    },
    #[error("cannot remove {}: {source}", path.display())]
    Remove { path: PathBuf, source: io::Error },
}

impl TransferError {
    /// Classifies the error as a permission problem or a general I/O problem.
    pub fn kind(&self) -> ErrorKind {
        let io_kind = match self {
            TransferError::CreateDir { source, .. }
            | TransferError::Inspect { source, .. }
            | TransferError::Copy { source, .. }
            | TransferError::Move { source, .. }
            | TransferError::RemoveSource { source, .. }
            | TransferError::Remove { source, .. } => source.kind(),
            TransferError::NotADirectory { .. } | TransferError::TargetIsDirectory { .. } => {
                return ErrorKind::Io;
            }
        };
        if io_kind == io::ErrorKind::PermissionDenied {
            ErrorKind::Permission
        } else {
            ErrorKind::Io
        }
    }
}

/// Where a file would be written inside a destination directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Placement {
    /// Nothing exists at the path yet.
    Free(PathBuf),
    /// A file exists at the path and will be replaced.
    Replace(PathBuf),
    /// A file exists at the path and the policy says to leave it.
    Blocked(PathBuf),
}

/// Picks the path `file_name` would take inside `dir` under `policy`.
///
/// Paths in `reserved` count as taken even though nothing exists there yet.
/// A dry run passes the targets it has already handed out.
///
/// # Arguments
///
/// * `dir` - Destination directory, which need not exist yet
/// * `file_name` - Name of the file being placed
/// * `policy` - What to do when the name is taken
/// * `reserved` - Paths to treat as occupied
///
/// # Errors
///
/// Returns [`TransferError::TargetIsDirectory`] when a directory holds the
/// name, and [`TransferError::Inspect`] when a candidate cannot be checked.
pub fn place(
    dir: &Path,
    file_name: &OsStr,
    policy: ConflictPolicy,
    reserved: &HashSet<PathBuf>,
) -> Result<Placement, TransferError> {
    let target = dir.join(file_name);
    if !taken(&target, reserved)? {
        return Ok(Placement::Free(target));
    }
    if target.is_dir() {
        return Err(TransferError::TargetIsDirectory { path: target });
    }

    match policy {
        ConflictPolicy::Overwrite => Ok(Placement::Replace(target)),
        ConflictPolicy::Skip => Ok(Placement::Blocked(target)),
        ConflictPolicy::Rename => {
            let name = Path::new(file_name);
            let mut n = 1;
            loop {
                let candidate = dir.join(numbered_name(name, n));
                if !taken(&candidate, reserved)? {
                    return Ok(Placement::Free(candidate));
                }
                n += 1;
            }
        }
    }
}

fn taken(path: &Path, reserved: &HashSet<PathBuf>) -> Result<bool, TransferError> {
    if reserved.contains(path) {
        return Ok(true);
    }
    occupied(path)
}

fn occupied(path: &Path) -> Result<bool, TransferError> {
    path.try_exists().map_err(|source| TransferError::Inspect {
        path: path.to_path_buf(),
        source,
    })
}

/// `photo.jpg` -> `photo (n).jpg`, `README` -> `README (n)`.
pub fn numbered_name(name: &Path, n: usize) -> String {
    let stem = name
        .file_stem()
        .map(|s| s.to_string_lossy())
        .unwrap_or_default();
    match name.extension() {
        Some(ext) => format!("{} ({}).{}", stem, n, ext.to_string_lossy()),
        None => format!("{} ({})", stem, n),
    }
}

/// Creates `dir` and its parents if they do not exist yet.
///
/// # Errors
///
/// Fails with [`TransferError::NotADirectory`] when `dir` is an existing file.
pub fn ensure_dir(dir: &Path) -> Result<(), TransferError> {
    if dir.is_dir() {
        return Ok(());
    }
    if dir.exists() {
        return Err(TransferError::NotADirectory {
            path: dir.to_path_buf(),
        });
    }
    fs::create_dir_all(dir).map_err(|source| TransferError::CreateDir {
        path: dir.to_path_buf(),
        source,
    })
}

/// Copies `from` to `to`, keeping the source's modification time.
pub fn copy_file(from: &Path, to: &Path) -> Result<(), TransferError> {
    fs::copy(from, to).map_err(|source| TransferError::Copy {
        from: from.to_path_buf(),
        to: to.to_path_buf(),
        source,
    })?;
    if let Err(e) = preserve_mtime(from, to) {
        tracing::warn!(path = %to.display(), "could not preserve modification time: {}", e);
    }
    Ok(())
}

fn preserve_mtime(from: &Path, to: &Path) -> io::Result<()> {
    let modified = fs::metadata(from)?.modified()?;
    File::options().write(true).open(to)?.set_modified(modified)
}

/// How a move was carried out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveMethod {
    /// A single rename on the same filesystem.
    Renamed,
    /// The destination is on another filesystem.
    CopiedAcrossDevices,
}

/// Moves `from` to `to`, replacing any file already at `to`.
///
/// Falls back to copy-then-delete when a rename cannot cross filesystems.
/// An existing file at `to` is only replaced once the new content is complete.
///
/// # Errors
///
/// [`TransferError::Move`] when the rename fails for any other reason, the
/// copy errors of [`copy_file`], or [`TransferError::RemoveSource`] when the
/// copy landed but the original could not be deleted.
pub fn move_file(from: &Path, to: &Path) -> Result<MoveMethod, TransferError> {
    move_with(from, to, |from, to| fs::rename(from, to))
}

fn move_with(
    from: &Path,
    to: &Path,
    rename: impl Fn(&Path, &Path) -> io::Result<()>,
) -> Result<MoveMethod, TransferError> {
    match rename(from, to) {
        Ok(()) => Ok(MoveMethod::Renamed),
        Err(e) if e.kind() == io::ErrorKind::CrossesDevices => {
            tracing::debug!(
                from = %from.display(),
                to = %to.display(),
                "rename crosses filesystems, copying instead"
            );
            move_by_copy(from, to)?;
            Ok(MoveMethod::CopiedAcrossDevices)
        }
        Err(source) => Err(TransferError::Move {
            from: from.to_path_buf(),
            to: to.to_path_buf(),
            source,
        }),
    }
}

/// Copy-then-delete.
///
/// The copy is written under a temporary name next to `to` and renamed over
/// it once complete, so a failed copy leaves any existing `to` untouched. A
/// failed delete leaves both files in place.
pub(crate) fn move_by_copy(from: &Path, to: &Path) -> Result<(), TransferError> {
    let partial = partial_path(to)?;
    let installed = copy_file(from, &partial)
        .map_err(|e| match e {
            TransferError::Copy { from, source, .. } => TransferError::Copy {
                from,
                to: to.to_path_buf(),
                source,
            },
            other => other,
        })
        .and_then(|()| {
            fs::rename(&partial, to).map_err(|source| TransferError::Copy {
                from: from.to_path_buf(),
                to: to.to_path_buf(),
                source,
            })
        });
    if let Err(e) = installed {
        if partial.is_file() {
            let _ = fs::remove_file(&partial);
        }
        return Err(e);
    }

    fs::remove_file(from).map_err(|source| TransferError::RemoveSource {
        from: from.to_path_buf(),
        to: to.to_path_buf(),
        source,
    })
}

/// `dir/name` -> `dir/.name.partN` for the first unused N.
fn partial_path(to: &Path) -> Result<PathBuf, TransferError> {
    let name = to
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let mut n = 0;
    loop {
        let candidate = to.with_file_name(format!(".{}.part{}", name, n));
        if !occupied(&candidate)? {
            return Ok(candidate);
        }
        n += 1;
    }
}

/// Deletes a single file, as undo does for copies.
pub fn remove_file(path: &Path) -> Result<(), TransferError> {
    fs::remove_file(path).map_err(|source| TransferError::Remove {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn none() -> HashSet<PathBuf> {
        HashSet::new()
    }

    fn crosses_devices(_: &Path, _: &Path) -> io::Result<()> {
        Err(io::Error::from(io::ErrorKind::CrossesDevices))
    }

    /// Read-only directories stay writable for privileged users.
    #[cfg(unix)]
    fn permissions_enforced(dir: &Path) -> bool {
        use std::os::unix::fs::PermissionsExt;
        let sample = dir.join("sample");
        fs::create_dir(&sample).unwrap();
        fs::set_permissions(&sample, fs::Permissions::from_mode(0o555)).unwrap();
        let enforced = File::create(sample.join("x")).is_err();
        fs::set_permissions(&sample, fs::Permissions::from_mode(0o755)).unwrap();
        fs::remove_dir_all(&sample).unwrap();
        enforced
    }

    #[test]
    fn test_numbered_names() {
        assert_eq!(numbered_name(Path::new("photo.jpg"), 1), "photo (1).jpg");
        assert_eq!(numbered_name(Path::new("README"), 2), "README (2)");
        assert_eq!(
            numbered_name(Path::new("backup.tar.gz"), 3),
            "backup.tar (3).gz"
        );
    }

    #[test]
    fn test_place_free_target() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let placement = place(temp_dir.path(), OsStr::new("a.txt"), ConflictPolicy::Skip, &none()).unwrap();
        assert_eq!(placement, Placement::Free(temp_dir.path().join("a.txt")));
    }

    #[test]
    fn test_place_per_policy() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let dir = temp_dir.path();
        fs::write(dir.join("photo.jpg"), "old").unwrap();
        fs::write(dir.join("photo (1).jpg"), "older").unwrap();
        let name = OsStr::new("photo.jpg");

        assert_eq!(
            place(dir, name, ConflictPolicy::Overwrite, &none()).unwrap(),
            Placement::Replace(dir.join("photo.jpg"))
        );
        assert_eq!(
            place(dir, name, ConflictPolicy::Skip, &none()).unwrap(),
            Placement::Blocked(dir.join("photo.jpg"))
        );
        assert_eq!(
            place(dir, name, ConflictPolicy::Rename, &none()).unwrap(),
            Placement::Free(dir.join("photo (2).jpg"))
        );
    }

    #[test]
    fn test_place_treats_reserved_paths_as_taken() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let dir = temp_dir.path().join("not-yet-created");
        let name = OsStr::new("x.jpg");
        let reserved: HashSet<PathBuf> = [dir.join("x.jpg")].into_iter().collect();

        assert_eq!(
            place(&dir, name, ConflictPolicy::Skip, &reserved).unwrap(),
            Placement::Blocked(dir.join("x.jpg"))
        );
        assert_eq!(
            place(&dir, name, ConflictPolicy::Rename, &reserved).unwrap(),
            Placement::Free(dir.join("x (1).jpg"))
        );
        assert_eq!(
            place(&dir, name, ConflictPolicy::Overwrite, &reserved).unwrap(),
            Placement::Replace(dir.join("x.jpg"))
        );
    }

    #[test]
    fn test_place_onto_directory_fails() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        fs::create_dir(temp_dir.path().join("clash")).unwrap();
        let result = place(temp_dir.path(), OsStr::new("clash"), ConflictPolicy::Overwrite, &none());
        assert!(matches!(result, Err(TransferError::TargetIsDirectory { .. })));
    }

    #[test]
    fn test_ensure_dir_creates_parents() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let nested = temp_dir.path().join("a").join("b");
        ensure_dir(&nested).unwrap();
        assert!(nested.is_dir());
        ensure_dir(&nested).unwrap();

        let file = temp_dir.path().join("file");
        fs::write(&file, "x").unwrap();
        assert!(matches!(
            ensure_dir(&file),
            Err(TransferError::NotADirectory { .. })
        ));
    }

    #[test]
    fn test_copy_keeps_source_and_mtime() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let from = temp_dir.path().join("a.txt");
        let to = temp_dir.path().join("b.txt");
        fs::write(&from, "content").unwrap();
        let old = std::time::SystemTime::UNIX_EPOCH + std::time::Duration::from_secs(1_000_000);
        File::options()
            .write(true)
            .open(&from)
            .unwrap()
            .set_modified(old)
            .unwrap();

        copy_file(&from, &to).unwrap();

        assert!(from.exists());
        assert_eq!(fs::read_to_string(&to).unwrap(), "content");
        assert_eq!(fs::metadata(&to).unwrap().modified().unwrap(), old);
    }

    #[test]
    fn test_move_renames() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let from = temp_dir.path().join("a.txt");
        let to = temp_dir.path().join("b.txt");
        fs::write(&from, "content").unwrap();

        assert_eq!(move_file(&from, &to).unwrap(), MoveMethod::Renamed);
        assert!(!from.exists());
        assert_eq!(fs::read_to_string(&to).unwrap(), "content");
    }

    #[test]
    fn test_move_replaces_existing_target() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let from = temp_dir.path().join("a.txt");
        let to = temp_dir.path().join("b.txt");
        fs::write(&from, "new").unwrap();
        fs::write(&to, "old").unwrap();

        move_file(&from, &to).unwrap();
        assert_eq!(fs::read_to_string(&to).unwrap(), "new");
    }

    #[test]
    fn test_move_by_copy_removes_source() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let from = temp_dir.path().join("a.txt");
        let to = temp_dir.path().join("b.txt");
        fs::write(&from, "content").unwrap();

        move_by_copy(&from, &to).unwrap();
        assert!(!from.exists());
        assert_eq!(fs::read_to_string(&to).unwrap(), "content");
    }

    #[test]
    fn test_move_by_copy_failure_leaves_source() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let from = temp_dir.path().join("a.txt");
        let to = temp_dir.path().join("missing_dir").join("b.txt");
        fs::write(&from, "content").unwrap();

        let err = move_by_copy(&from, &to).unwrap_err();
        assert!(matches!(err, TransferError::Copy { .. }));
        assert_eq!(err.kind(), ErrorKind::Io);
        assert!(from.exists());
        assert!(!to.exists());
    }

    #[test]
    fn test_move_missing_source_fails() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let result = move_file(
            &temp_dir.path().join("ghost.txt"),
            &temp_dir.path().join("b.txt"),
        );
        assert!(matches!(result, Err(TransferError::Move { .. })));
    }

    #[test]
    fn test_failed_move_keeps_existing_target() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let to = temp_dir.path().join("b.txt");
        fs::write(&to, "precious").unwrap();

        let result = move_file(&temp_dir.path().join("ghost.txt"), &to);

        assert!(matches!(result, Err(TransferError::Move { .. })));
        assert_eq!(fs::read_to_string(&to).unwrap(), "precious");
    }

    #[test]
    fn test_move_by_copy_failed_copy_keeps_existing_target() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let from = temp_dir.path().join("ghost.txt");
        let to = temp_dir.path().join("b.txt");
        fs::write(&to, "precious").unwrap();

        let err = move_by_copy(&from, &to).unwrap_err();

        assert!(matches!(err, TransferError::Copy { to: ref reported, .. } if *reported == to));
        assert_eq!(fs::read_to_string(&to).unwrap(), "precious");
        assert_eq!(fs::read_dir(temp_dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_move_by_copy_replaces_existing_target() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let from = temp_dir.path().join("a.txt");
        let to = temp_dir.path().join("b.txt");
        fs::write(&from, "new").unwrap();
        fs::write(&to, "old").unwrap();

        move_by_copy(&from, &to).unwrap();

        assert!(!from.exists());
        assert_eq!(fs::read_to_string(&to).unwrap(), "new");
        assert_eq!(fs::read_dir(temp_dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_cross_device_move_falls_back_to_copy() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let from = temp_dir.path().join("a.txt");
        let to = temp_dir.path().join("b.txt");
        fs::write(&from, "content").unwrap();

        let method = move_with(&from, &to, crosses_devices).unwrap();

        assert_eq!(method, MoveMethod::CopiedAcrossDevices);
        assert!(!from.exists());
        assert_eq!(fs::read_to_string(&to).unwrap(), "content");
    }

    #[cfg(unix)]
    #[test]
    fn test_cross_device_move_keeps_both_files_when_delete_fails() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        if !permissions_enforced(temp_dir.path()) {
            return;
        }
        let locked = temp_dir.path().join("locked");
        fs::create_dir(&locked).unwrap();
        let from = locked.join("a.txt");
        let to = temp_dir.path().join("b.txt");
        fs::write(&from, "content").unwrap();
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o555)).unwrap();

        let result = move_with(&from, &to, crosses_devices);
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();

        let err = result.unwrap_err();
        assert!(matches!(err, TransferError::RemoveSource { .. }));
        assert_eq!(err.kind(), ErrorKind::Permission);
        assert_eq!(fs::read_to_string(&from).unwrap(), "content");
        assert_eq!(fs::read_to_string(&to).unwrap(), "content");
    }
}
