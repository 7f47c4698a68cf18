//! Turns classification decisions into filesystem moves with an audit trail.
//!
//! Batch runs snapshot the source directory, classify every immediate file in
//! parallel, then move them one at a time and archive the category directories.
//! Event runs handle a single file and write a `create` record instead of `move`.
//! Both hold the per-directory lock for their whole sequence.

use parking_lot::Mutex;
use rayon::prelude::*;
use serde::Serialize;
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::archive::{archive_directory, is_archive};
use crate::audit::AuditLog;
use crate::backup::{BackupManager, BackupSnapshot, SnapshotFile};
use crate::classifier::Pipeline;
use crate::config::Settings;
use crate::error::{ClerkError, Result};
use crate::notify::Notifier;
use crate::scanner::{is_hidden, list_files};
use crate::types::{ActionKind, ActionRecord, ClassificationResult, FileTask};

/// One mutex per source directory, created on first use.
#[derive(Default)]
pub struct DirLocks {
    locks: Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>,
}

impl DirLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lock_for(&self, dir: &Path) -> Arc<Mutex<()>> {
        let key = fs::canonicalize(dir).unwrap_or_else(|_| dir.to_path_buf());
        Arc::clone(self.locks.lock().entry(key).or_default())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MoveOutcome {
    pub source: PathBuf,
    pub destination: PathBuf,
    pub record: ActionRecord,
    pub classification: ClassificationResult,
}

#[derive(Debug, Clone, Serialize)]
pub struct FailedFile {
    pub path: PathBuf,
    pub error: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub source: PathBuf,
    pub backup: Option<BackupSnapshot>,
    pub moved: Vec<MoveOutcome>,
    pub failed: Vec<FailedFile>,
    pub archived: Vec<PathBuf>,
}

impl BatchReport {
    fn new(source: &Path) -> Self {
        Self {
            source: source.to_path_buf(),
            backup: None,
            moved: Vec::new(),
            failed: Vec::new(),
            archived: Vec::new(),
        }
    }

    pub fn summary(&self) -> String {
        format!(
            "Organized {}: {} moved, {} failed, {} archived, backup {}",
            self.source.display(),
            self.moved.len(),
            self.failed.len(),
            self.archived.len(),
            if self.backup.is_some() { "taken" } else { "skipped" },
        )
    }
}

pub struct Orchestrator {
    settings: Arc<Settings>,
    pipeline: Pipeline,
    audit: Arc<AuditLog>,
    notifier: Arc<dyn Notifier>,
    backups: BackupManager,
    locks: DirLocks,
}

impl Orchestrator {
    pub fn new(
        settings: Arc<Settings>,
        pipeline: Pipeline,
        audit: Arc<AuditLog>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            settings,
            pipeline,
            audit,
            notifier,
            backups: BackupManager::new(),
            locks: DirLocks::new(),
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn audit(&self) -> &AuditLog {
        &self.audit
    }

    pub fn classify(&self, path: &Path) -> ClassificationResult {
        self.pipeline.classify(&FileTask::new(path))
    }

    /// Backup, classify everything, move everything, archive, notify.
    pub fn run_batch(&self, source: &Path) -> Result<BatchReport> {
        let lock = self.locks.lock_for(source);
        let _guard = lock.lock();

        let mut report = BatchReport::new(source);
        report.backup = match self.backups.backup(source) {
            Ok(snapshot) => Some(snapshot),
            Err(e) => {
                warn!(dir = %source.display(), error = %e, "backup failed, continuing without one");
                None
            }
        };

        let files: Vec<PathBuf> = list_files(source)?
            .into_iter()
            .filter(|path| !self.is_protected(path))
            .collect();
        info!(dir = %source.display(), files = files.len(), "batch started");

        let classified: Vec<(PathBuf, ClassificationResult)> = files
            .into_par_iter()
            .map(|path| {
                let result = self.pipeline.classify(&FileTask::new(&path));
                (path, result)
            })
            .collect();

        for (path, classification) in classified {
            match self.place(source, &path, classification, ActionKind::Move) {
                Ok(outcome) => report.moved.push(outcome),
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "file skipped");
                    report.failed.push(FailedFile {
                        path,
                        error: e.to_string(),
                    });
                }
            }
        }

        if self.settings.archive.enabled {
            report.archived = self.archive_categories(source);
        }

        info!(
            dir = %source.display(),
            moved = report.moved.len(),
            failed = report.failed.len(),
            "batch finished"
        );
        self.notifier
            .notify("File organization complete", &report.summary());

        Ok(report)
    }

    /// Classify and move one file into `root`'s category directories.
    pub fn run_one(&self, root: &Path, path: &Path) -> Result<MoveOutcome> {
        let lock = self.locks.lock_for(root);
        let _guard = lock.lock();

        if !path.is_file() {
            return Err(ClerkError::NotAFile(path.to_path_buf()));
        }
        let classification = self.pipeline.classify(&FileTask::new(path));
        self.place(root, path, classification, ActionKind::Create)
    }

    pub fn restore(&self, dir: &Path) -> Result<Option<Vec<SnapshotFile>>> {
        let lock = self.locks.lock_for(dir);
        let _guard = lock.lock();
        self.backups.restore(dir)
    }

    /// Files the engine itself writes and must never pick up: category archives,
    /// hidden names and the audit database.
    pub fn is_protected(&self, path: &Path) -> bool {
        if is_hidden(path) || is_archive(path) {
            return true;
        }
        let Some(db) = self.audit.path() else {
            return false;
        };
        let same_dir = match (path.parent(), db.parent()) {
            (Some(a), Some(b)) => same_location(a, b),
            _ => false,
        };
        let (Some(name), Some(db_name)) = (
            path.file_name().and_then(|n| n.to_str()),
            db.file_name().and_then(|n| n.to_str()),
        ) else {
            return false;
        };
        same_dir && name.starts_with(db_name)
    }

    /// Resolve a free name in the category directory, move, then record.
    /// Callers hold the directory lock, which makes resolve-and-move one critical section.
    fn place(
        &self,
        root: &Path,
        path: &Path,
        classification: ClassificationResult,
        action: ActionKind,
    ) -> Result<MoveOutcome> {
        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| ClerkError::NotAFile(path.to_path_buf()))?;

        let target_dir = self.settings.category_dir(root, &classification.category);
        fs::create_dir_all(&target_dir).map_err(|e| ClerkError::io(&target_dir, e))?;

        let new_name = clerk_core::resolve(&target_dir, filename, self.settings.resolver_cap)?;
        let destination = target_dir.join(&new_name);

        move_path(path, &destination).map_err(|source| ClerkError::Move {
            file: path.to_path_buf(),
            source,
        })?;

        info!(
            from = %path.display(),
            to = %destination.display(),
            category = %classification.category,
            decided_by = %classification.decided_by,
            "moved"
        );

        let record = ActionRecord::new(
            action,
            filename,
            classification.category.clone(),
            new_name,
            classification.recipient.clone(),
        );
        self.audit.append(&record).map_err(|e| {
            error!(
                file = %destination.display(),
                error = %e,
                "audit write failed, move is not recorded"
            );
            ClerkError::Audit(e)
        })?;

        Ok(MoveOutcome {
            source: path.to_path_buf(),
            destination,
            record,
            classification,
        })
    }

    fn archive_categories(&self, root: &Path) -> Vec<PathBuf> {
        self.settings
            .archivable_dirs()
            .map(|name| root.join(name))
            .filter(|dir| dir.is_dir())
            .filter_map(|dir| match archive_directory(&dir, self.settings.archive.level) {
                Ok(archive) => {
                    info!(dir = %dir.display(), archive = %archive.display(), "archived");
                    Some(archive)
                }
                Err(e) => {
                    warn!(dir = %dir.display(), error = %e, "archival failed");
                    None
                }
            })
            .collect()
    }
}

fn same_location(a: &Path, b: &Path) -> bool {
    let canon = |p: &Path| {
        let p = if p.as_os_str().is_empty() { Path::new(".") } else { p };
        fs::canonicalize(p).unwrap_or_else(|_| p.to_path_buf())
    };
    canon(a) == canon(b)
}

/// Rename, falling back to copy-and-delete when the rename cannot cross filesystems.
fn move_path(from: &Path, to: &Path) -> io::Result<()> {
    match fs::rename(from, to) {
        Ok(()) => Ok(()),
        Err(rename_err) => {
            if fs::copy(from, to).is_err() {
                return Err(rename_err);
            }
            fs::remove_file(from).inspect_err(|_| {
                let _ = fs::remove_file(to);
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::notify::tests::RecordingNotifier;
    use crate::types::Category;
    use tempfile::TempDir;

    struct Fixture {
        _root: TempDir,
        inbox: PathBuf,
        orchestrator: Orchestrator,
        notifier: Arc<RecordingNotifier>,
    }

    fn fixture(archive: bool) -> Fixture {
        let root = TempDir::new().unwrap();
        let inbox = root.path().join("inbox");
        fs::create_dir(&inbox).unwrap();

        let mut config = Config::default();
        config.archive.enabled = archive;
        let settings = Arc::new(config.validate().unwrap());
        let pipeline = Pipeline::new(Arc::clone(&settings), None);
        let audit = Arc::new(AuditLog::open_in_memory().unwrap());
        let notifier = Arc::new(RecordingNotifier::default());

        let orchestrator = Orchestrator::new(
            settings,
            pipeline,
            audit,
            Arc::clone(&notifier) as Arc<dyn Notifier>,
        );
        Fixture {
            _root: root,
            inbox,
            orchestrator,
            notifier,
        }
    }

    #[test]
    fn batch_moves_and_records_each_file() {
        let f = fixture(false);
        fs::write(f.inbox.join("weekly_report.txt"), b"numbers").unwrap();
        fs::write(f.inbox.join("notes.txt"), b"nothing in particular").unwrap();

        let report = f.orchestrator.run_batch(&f.inbox).unwrap();

        assert_eq!(report.moved.len(), 2);
        assert!(report.failed.is_empty());
        assert!(f.inbox.join("Reports/weekly_report.txt").exists());
        assert!(f.inbox.join("Others/notes.txt").exists());

        let records = f.orchestrator.audit().records().unwrap();
        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| r.action == ActionKind::Move));
        assert_eq!(records[0].filename, "notes.txt");
        assert_eq!(records[1].filename, "weekly_report.txt");
    }

    #[test]
    fn batch_takes_backup_first() {
        let f = fixture(false);
        fs::write(f.inbox.join("notes.txt"), b"keep me").unwrap();

        let report = f.orchestrator.run_batch(&f.inbox).unwrap();

        let backup = report.backup.unwrap();
        assert_eq!(
            fs::read(backup.location.join("notes.txt")).unwrap(),
            b"keep me"
        );
    }

    #[test]
    fn batch_archives_all_but_others() {
        let f = fixture(true);
        fs::write(f.inbox.join("homework_3.txt"), b"due friday").unwrap();
        fs::write(f.inbox.join("misc.txt"), b"plain").unwrap();

        let report = f.orchestrator.run_batch(&f.inbox).unwrap();

        assert_eq!(report.archived, vec![f.inbox.join("Assignments.tar.zst")]);
        assert!(!f.inbox.join("Assignments").exists());
        assert!(f.inbox.join("Others/misc.txt").exists());
    }

    #[test]
    fn batch_notifies_once() {
        let f = fixture(false);
        fs::write(f.inbox.join("misc.txt"), b"plain").unwrap();

        f.orchestrator.run_batch(&f.inbox).unwrap();

        let sent = f.notifier.sent.lock();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].1.contains("1 moved"));
    }

    #[test]
    fn existing_names_get_suffixes() {
        let f = fixture(false);
        fs::create_dir(f.inbox.join("Others")).unwrap();
        fs::write(f.inbox.join("Others/misc.txt"), b"older").unwrap();
        fs::write(f.inbox.join("misc.txt"), b"newer").unwrap();

        let report = f.orchestrator.run_batch(&f.inbox).unwrap();

        assert_eq!(report.moved[0].record.new_filename, "misc_1.txt");
        assert_eq!(fs::read(f.inbox.join("Others/misc.txt")).unwrap(), b"older");
        assert_eq!(fs::read(f.inbox.join("Others/misc_1.txt")).unwrap(), b"newer");
    }

    #[test]
    fn failed_move_leaves_file_and_batch_continues() {
        let f = fixture(false);
        // A regular file where the Reports directory should be.
        fs::write(f.inbox.join("Reports"), b"not a directory").unwrap();
        fs::write(f.inbox.join("q3_report.txt"), b"numbers").unwrap();
        fs::write(f.inbox.join("homework_2.txt"), b"due monday").unwrap();
        fs::write(f.inbox.join("notes.txt"), b"plain").unwrap();

        let report = f.orchestrator.run_batch(&f.inbox).unwrap();

        let failed: Vec<PathBuf> = report.failed.iter().map(|x| x.path.clone()).collect();
        assert_eq!(
            failed,
            vec![f.inbox.join("Reports"), f.inbox.join("q3_report.txt")]
        );
        assert_eq!(fs::read(f.inbox.join("q3_report.txt")).unwrap(), b"numbers");
        assert!(f.inbox.join("Assignments/homework_2.txt").exists());
        assert!(f.inbox.join("Others/notes.txt").exists());

        let records = f.orchestrator.audit().records().unwrap();
        let logged: Vec<&str> = records.iter().map(|r| r.filename.as_str()).collect();
        assert_eq!(logged, vec!["homework_2.txt", "notes.txt"]);
        assert_eq!(report.moved.len(), records.len());
    }

    #[test]
    fn previous_archives_are_left_alone() {
        let f = fixture(true);
        fs::write(f.inbox.join("weekly_report.txt"), b"numbers").unwrap();
        f.orchestrator.run_batch(&f.inbox).unwrap();
        assert!(f.inbox.join("Reports.tar.zst").exists());

        fs::write(f.inbox.join(".partial_report.txt"), b"in flight").unwrap();
        let report = f.orchestrator.run_batch(&f.inbox).unwrap();

        assert!(report.moved.is_empty());
        assert!(report.failed.is_empty());
        assert!(f.inbox.join("Reports.tar.zst").exists());
        assert!(f.inbox.join(".partial_report.txt").exists());
        assert_eq!(f.orchestrator.audit().count().unwrap(), 1);
    }

    #[test]
    fn run_one_records_create() {
        let f = fixture(false);
        let path = f.inbox.join("assignment_kim.txt");
        fs::write(&path, b"Name: Kim Lee\nHomework").unwrap();

        let outcome = f.orchestrator.run_one(&f.inbox, &path).unwrap();

        assert_eq!(outcome.destination, f.inbox.join("Assignments/assignment_kim.txt"));
        assert_eq!(outcome.record.action, ActionKind::Create);
        assert_eq!(outcome.record.recipient, "Kim Lee");
        assert_eq!(outcome.record.category, Category::new("Assignments"));
        assert!(!f.inbox.join("inbox_backup").exists());
    }

    #[test]
    fn run_one_rejects_missing_file() {
        let f = fixture(false);
        let err = f
            .orchestrator
            .run_one(&f.inbox, &f.inbox.join("gone.txt"))
            .unwrap_err();
        assert!(matches!(err, ClerkError::NotAFile(_)));
        assert_eq!(f.orchestrator.audit().count().unwrap(), 0);
    }

    #[test]
    fn restore_through_orchestrator() {
        let f = fixture(false);
        fs::write(f.inbox.join("misc.txt"), b"plain").unwrap();

        f.orchestrator.run_batch(&f.inbox).unwrap();
        assert!(!f.inbox.join("misc.txt").exists());

        f.orchestrator.restore(&f.inbox).unwrap().unwrap();
        assert!(f.inbox.join("misc.txt").exists());
        assert!(!f.inbox.join("Others").exists());
    }

    #[test]
    fn dir_locks_are_shared_per_directory() {
        let dir = TempDir::new().unwrap();
        let locks = DirLocks::new();

        let a = locks.lock_for(dir.path());
        let b = locks.lock_for(&dir.path().join("."));
        let other = locks.lock_for(&dir.path().join("elsewhere"));

        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &other));
    }

    #[test]
    fn audit_database_is_not_organized() {
        let root = TempDir::new().unwrap();
        let inbox = root.path().join("inbox");
        fs::create_dir(&inbox).unwrap();
        let settings = Arc::new(Config::default().validate().unwrap());
        let audit = Arc::new(AuditLog::open(&inbox.join("file_organizer.db")).unwrap());
        let orchestrator = Orchestrator::new(
            Arc::clone(&settings),
            Pipeline::new(settings, None),
            audit,
            Arc::new(crate::notify::LogNotifier),
        );
        fs::write(inbox.join("misc.txt"), b"plain").unwrap();

        let report = orchestrator.run_batch(&inbox).unwrap();

        assert_eq!(report.moved.len(), 1);
        assert!(inbox.join("file_organizer.db").exists());
    }
}
