//! Single-generation directory snapshots.
//!
//! `backup` replaces any previous snapshot of the same directory; `restore` puts the
//! directory back exactly as the snapshot holds it.

use chrono::{DateTime, Utc};
use rayon::prelude::*;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use walkdir::WalkDir;

use crate::error::{ClerkError, Result};

const BACKUP_SUFFIX: &str = "_backup";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SnapshotFile {
    /// Path relative to the snapshot root.
    pub path: PathBuf,
    pub size: u64,
    pub hash: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct BackupSnapshot {
    pub source: PathBuf,
    pub location: PathBuf,
    pub created: DateTime<Utc>,
    pub files: Vec<SnapshotFile>,
}

/// Sibling directory holding the snapshot of `dir`: `/data/inbox` -> `/data/inbox_backup`.
///
/// `dir` is taken as given; callers with relative or `..`-bearing paths go through
/// [`BackupManager`], which resolves them first.
pub fn backup_location(dir: &Path) -> PathBuf {
    let name = dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    dir.with_file_name(format!("{name}{BACKUP_SUFFIX}"))
}

/// Absolute, symlink-free form of `dir` and its snapshot location. Fails when `dir`
/// has no name of its own (the filesystem root) or the location would nest inside it.
fn resolve(dir: &Path) -> Result<(PathBuf, PathBuf)> {
    let dir = fs::canonicalize(dir)
        .or_else(|_| std::path::absolute(dir))
        .map_err(|e| ClerkError::io(dir, e))?;
    let invalid = |reason: &str| {
        ClerkError::io(
            &dir,
            std::io::Error::new(std::io::ErrorKind::InvalidInput, reason.to_string()),
        )
    };

    if dir.file_name().is_none() {
        return Err(invalid("directory has no name to derive a backup location from"));
    }
    let location = backup_location(&dir);
    if location.starts_with(&dir) {
        return Err(invalid("backup location would sit inside the directory"));
    }
    Ok((dir, location))
}

pub fn is_backup_location(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.ends_with(BACKUP_SUFFIX))
}

/// Every regular file under `dir` with its relative path, size and digest, sorted by path.
pub fn snapshot_files(dir: &Path) -> Result<Vec<SnapshotFile>> {
    let paths: Vec<PathBuf> = WalkDir::new(dir)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .collect();

    let mut files = paths
        .par_iter()
        .map(|path| {
            let digest = clerk_core::digest_file(path).map_err(|e| ClerkError::io(path, e))?;
            Ok(SnapshotFile {
                path: path.strip_prefix(dir).unwrap_or(path).to_path_buf(),
                size: digest.size,
                hash: digest.hash,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    files.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(files)
}

#[derive(Debug, Default, Clone, Copy)]
pub struct BackupManager;

impl BackupManager {
    pub fn new() -> Self {
        Self
    }

    pub fn location(&self, dir: &Path) -> PathBuf {
        resolve(dir).map_or_else(|_| backup_location(dir), |(_, location)| location)
    }

    pub fn has_backup(&self, dir: &Path) -> bool {
        resolve(dir).is_ok_and(|(_, location)| location.is_dir())
    }

    /// Drop the previous snapshot of `dir`, then deep-copy `dir` next to itself.
    pub fn backup(&self, dir: &Path) -> Result<BackupSnapshot> {
        if !dir.is_dir() {
            return Err(ClerkError::io(
                dir,
                std::io::Error::new(std::io::ErrorKind::NotFound, "source directory missing"),
            ));
        }

        let (dir, location) = resolve(dir)?;
        if location.exists() {
            fs::remove_dir_all(&location).map_err(|e| ClerkError::io(&location, e))?;
        }

        copy_tree(&dir, &location)?;
        let files = snapshot_files(&location)?;

        info!(
            source = %dir.display(),
            backup = %location.display(),
            files = files.len(),
            "backup created"
        );

        Ok(BackupSnapshot {
            source: dir,
            location,
            created: Utc::now(),
            files,
        })
    }

    /// Replace the contents of `dir` with its snapshot. Returns `None` when no snapshot
    /// exists. `dir` itself is kept, so a process sitting in it stays valid.
    pub fn restore(&self, dir: &Path) -> Result<Option<Vec<SnapshotFile>>> {
        let (dir, location) = resolve(dir)?;
        if !location.is_dir() {
            warn!(dir = %dir.display(), "no backup found, nothing restored");
            return Ok(None);
        }

        if dir.is_dir() {
            clear_dir(&dir)?;
        }
        copy_tree(&location, &dir)?;

        let files = snapshot_files(&dir)?;
        info!(dir = %dir.display(), files = files.len(), "directory restored from backup");
        Ok(Some(files))
    }
}

fn clear_dir(dir: &Path) -> Result<()> {
    let entries = fs::read_dir(dir).map_err(|e| ClerkError::io(dir, e))?;
    for entry in entries {
        let path = entry.map_err(|e| ClerkError::io(dir, e))?.path();
        let removed = match path.is_dir() && !path.is_symlink() {
            true => fs::remove_dir_all(&path),
            false => fs::remove_file(&path),
        };
        removed.map_err(|e| ClerkError::io(&path, e))?;
    }
    Ok(())
}

fn copy_tree(from: &Path, to: &Path) -> Result<()> {
    for entry in WalkDir::new(from) {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(from).to_path_buf();
            ClerkError::io(path, e.into())
        })?;
        let relative = entry.path().strip_prefix(from).unwrap_or(entry.path());
        let target = to.join(relative);

        if entry.file_type().is_dir() {
            fs::create_dir_all(&target).map_err(|e| ClerkError::io(&target, e))?;
        } else if entry.file_type().is_file() {
            fs::copy(entry.path(), &target).map_err(|e| ClerkError::io(entry.path(), e))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn inbox(root: &Path) -> PathBuf {
        let dir = root.join("inbox");
        fs::create_dir_all(dir.join("nested")).unwrap();
        fs::write(dir.join("a.txt"), b"alpha").unwrap();
        fs::write(dir.join("nested/b.txt"), b"beta").unwrap();
        dir
    }

    #[test]
    fn location_is_a_sibling() {
        assert_eq!(
            backup_location(Path::new("/data/inbox")),
            PathBuf::from("/data/inbox_backup")
        );
        assert!(is_backup_location(Path::new("/data/inbox_backup")));
        assert!(!is_backup_location(Path::new("/data/inbox")));
    }

    #[test]
    fn backup_copies_every_file() {
        let root = TempDir::new().unwrap();
        let dir = inbox(root.path());

        let snapshot = BackupManager::new().backup(&dir).unwrap();

        assert_eq!(snapshot.location, root.path().join("inbox_backup"));
        assert_eq!(snapshot.files.len(), 2);
        assert_eq!(
            fs::read(snapshot.location.join("nested/b.txt")).unwrap(),
            b"beta"
        );
        assert_eq!(snapshot.files, snapshot_files(&dir).unwrap());
    }

    #[test]
    fn new_backup_supersedes_old_one() {
        let root = TempDir::new().unwrap();
        let dir = inbox(root.path());
        let manager = BackupManager::new();

        manager.backup(&dir).unwrap();
        fs::remove_file(dir.join("a.txt")).unwrap();
        let snapshot = manager.backup(&dir).unwrap();

        assert!(!snapshot.location.join("a.txt").exists());
        assert_eq!(snapshot.files.len(), 1);
    }

    #[test]
    fn restore_round_trip() {
        let root = TempDir::new().unwrap();
        let dir = inbox(root.path());
        let manager = BackupManager::new();
        let before = snapshot_files(&dir).unwrap();

        manager.backup(&dir).unwrap();
        fs::remove_file(dir.join("a.txt")).unwrap();
        fs::write(dir.join("nested/b.txt"), b"changed").unwrap();
        fs::write(dir.join("c.txt"), b"new").unwrap();

        let restored = manager.restore(&dir).unwrap().unwrap();

        assert_eq!(restored, before);
        assert_eq!(snapshot_files(&dir).unwrap(), before);
    }

    #[test]
    fn restore_without_backup_is_a_noop() {
        let root = TempDir::new().unwrap();
        let dir = inbox(root.path());

        assert!(BackupManager::new().restore(&dir).unwrap().is_none());
        assert!(dir.join("a.txt").exists());
    }

    #[test]
    fn unnamed_path_resolves_to_a_real_sibling() {
        let root = TempDir::new().unwrap();
        let dir = inbox(root.path());
        let unnamed = dir.join("nested/..");
        assert!(unnamed.file_name().is_none());
        let manager = BackupManager::new();

        let snapshot = manager.backup(&unnamed).unwrap();

        let sibling = fs::canonicalize(root.path()).unwrap().join("inbox_backup");
        assert_eq!(snapshot.location, sibling);
        assert_eq!(snapshot.files.len(), 2);
        assert!(!dir.join("_backup").exists());
        assert_eq!(manager.location(&unnamed), sibling);

        fs::remove_file(dir.join("a.txt")).unwrap();
        let restored = manager.restore(&unnamed).unwrap().unwrap();

        assert_eq!(restored.len(), 2);
        assert_eq!(fs::read(dir.join("a.txt")).unwrap(), b"alpha");
        assert_eq!(fs::read(dir.join("nested/b.txt")).unwrap(), b"beta");
    }

    #[test]
    fn filesystem_root_is_refused() {
        let manager = BackupManager::new();
        assert!(manager.restore(Path::new("/")).is_err());
        assert!(!manager.has_backup(Path::new("/")));
    }

    #[test]
    fn backup_of_missing_dir_fails() {
        let root = TempDir::new().unwrap();
        assert!(BackupManager::new()
            .backup(&root.path().join("missing"))
            .is_err());
    }
}
