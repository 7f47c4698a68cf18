//! Collision-free destination names.
//!
//! A name that is free in the target directory is returned unchanged; otherwise
//! `_1`, `_2`, ... is inserted before the extension until a free name is found.

use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ResolveError {
    #[error("no free name for {name} after {cap} attempts")]
    Exhausted { name: String, cap: u64 },
}

/// Split a file name into stem and extension (extension keeps its leading dot).
///
/// Leading dots belong to the stem, so `.bashrc` has no extension.
pub fn split_name(filename: &str) -> (&str, &str) {
    match filename.rfind('.') {
        Some(dot) if filename[..dot].chars().any(|c| c != '.') => filename.split_at(dot),
        _ => (filename, ""),
    }
}

/// The `n`th candidate name; `0` is the name itself.
pub fn candidate(stem: &str, ext: &str, n: u64) -> String {
    match n {
        0 => format!("{stem}{ext}"),
        _ => format!("{stem}_{n}{ext}"),
    }
}

/// Search candidates in order until `taken` reports one as free.
///
/// `cap` bounds the number of suffixes tried; `None` searches without limit.
pub fn first_free<F>(stem: &str, ext: &str, cap: Option<u64>, taken: F) -> Result<String, ResolveError>
where
    F: Fn(&str) -> bool,
{
    let limit = cap.unwrap_or(u64::MAX);

    (0..=limit)
        .map(|n| candidate(stem, ext, n))
        .find(|name| !taken(name))
        .ok_or_else(|| ResolveError::Exhausted {
            name: candidate(stem, ext, 0),
            cap: limit,
        })
}

/// Resolve `filename` against the entries currently present in `target_dir`.
pub fn resolve(target_dir: &Path, filename: &str, cap: Option<u64>) -> Result<String, ResolveError> {
    let (stem, ext) = split_name(filename);
    first_free(stem, ext, cap, |name| target_dir.join(name).exists())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn split_name_cases() {
        assert_eq!(split_name("report.txt"), ("report", ".txt"));
        assert_eq!(split_name("archive.tar.gz"), ("archive.tar", ".gz"));
        assert_eq!(split_name("Makefile"), ("Makefile", ""));
        assert_eq!(split_name(".bashrc"), (".bashrc", ""));
        assert_eq!(split_name("..hidden"), ("..hidden", ""));
        assert_eq!(split_name(".env.local"), (".env", ".local"));
    }

    #[test]
    fn free_name_is_unchanged() {
        let dir = TempDir::new().unwrap();
        assert_eq!(resolve(dir.path(), "report.txt", None).unwrap(), "report.txt");
    }

    #[test]
    fn suffix_increments_monotonically() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("report.txt"), b"a").unwrap();
        assert_eq!(resolve(dir.path(), "report.txt", None).unwrap(), "report_1.txt");

        fs::write(dir.path().join("report_1.txt"), b"b").unwrap();
        assert_eq!(resolve(dir.path(), "report.txt", None).unwrap(), "report_2.txt");
    }

    #[test]
    fn resolves_against_existing_category_dir() {
        let inbox = crate::testutils::create_test_inbox();
        let reports = inbox.path().join("Reports");

        assert_eq!(resolve(&reports, "report.txt", None).unwrap(), "report_1.txt");
        assert_eq!(resolve(&reports, "photo.png", None).unwrap(), "photo.png");
    }

    #[test]
    fn name_without_extension_gets_plain_suffix() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("notes"), b"a").unwrap();
        assert_eq!(resolve(dir.path(), "notes", None).unwrap(), "notes_1");
    }

    #[test]
    fn gaps_are_filled_first() {
        let taken: HashSet<&str> = ["a.pdf", "a_2.pdf"].into_iter().collect();
        let name = first_free("a", ".pdf", None, |n| taken.contains(n)).unwrap();
        assert_eq!(name, "a_1.pdf");
    }

    #[test]
    fn cap_reports_exhaustion() {
        let err = first_free("a", ".pdf", Some(3), |_| true).unwrap_err();
        assert_eq!(
            err,
            ResolveError::Exhausted {
                name: "a.pdf".to_string(),
                cap: 3
            }
        );
    }
}
