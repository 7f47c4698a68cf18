use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::error::{ClerkError, Result};

/// Regular files directly under `dir`, sorted by name. Subdirectories and symlinks
/// are skipped.
pub fn list_files(dir: &Path) -> Result<Vec<PathBuf>> {
    WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
        .into_iter()
        .map(|entry| {
            entry.map_err(|e| {
                let path = e.path().unwrap_or(dir).to_path_buf();
                ClerkError::io(path, e.into())
            })
        })
        .filter(|entry| entry.as_ref().map_or(true, |e| e.file_type().is_file()))
        .map(|entry| entry.map(walkdir::DirEntry::into_path))
        .collect()
}

pub fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.starts_with('.'))
        .unwrap_or(false)
}

pub fn format_size(bytes: u64) -> String {
    const UNITS: &[(u64, &str)] = &[
        (1024 * 1024 * 1024, "GB"),
        (1024 * 1024, "MB"),
        (1024, "KB"),
    ];

    UNITS
        .iter()
        .find(|(threshold, _)| bytes >= *threshold)
        .map(|(threshold, unit)| format!("{:.2} {}", bytes as f64 / *threshold as f64, unit))
        .unwrap_or_else(|| format!("{} B", bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn lists_only_immediate_files() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("b.txt"), b"b").unwrap();
        fs::write(dir.path().join("a.pdf"), b"a").unwrap();
        fs::create_dir(dir.path().join("Reports")).unwrap();
        fs::write(dir.path().join("Reports/old.txt"), b"old").unwrap();

        let files = list_files(dir.path()).unwrap();

        assert_eq!(
            files,
            vec![dir.path().join("a.pdf"), dir.path().join("b.txt")]
        );
    }

    #[test]
    fn missing_dir_is_an_error() {
        let dir = TempDir::new().unwrap();
        assert!(list_files(&dir.path().join("nope")).is_err());
    }

    #[test]
    fn hidden_detection() {
        assert!(is_hidden(Path::new("/in/.partial")));
        assert!(!is_hidden(Path::new("/in/report.txt")));
    }

    #[test]
    fn format_size_display() {
        assert_eq!(format_size(500), "500 B");
        assert_eq!(format_size(1024), "1.00 KB");
        assert_eq!(format_size(1024 * 1024), "1.00 MB");
        assert_eq!(format_size(1024 * 1024 * 1024), "1.00 GB");
    }
}
