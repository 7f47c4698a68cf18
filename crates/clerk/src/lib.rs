pub mod archive;
pub mod audit;
pub mod backup;
pub mod batch;
pub mod classifier;
pub mod config;
pub mod error;
pub mod logging;
pub mod model;
pub mod notify;
pub mod orchestrator;
pub mod sampler;
pub mod scanner;
pub mod types;
pub mod watch;

pub use archive::{archive_directory, pack_directory, unpack_archive, ArchiveError};
pub use audit::{AuditError, AuditLog};
pub use backup::{backup_location, snapshot_files, BackupManager, BackupSnapshot, SnapshotFile};
pub use batch::{BatchRunner, Ticker};
pub use classifier::{Pipeline, Strategy, TaskContext};
pub use config::{Config, ConfigError, Settings};
pub use error::{ClerkError, Result};
pub use model::{NaiveBayesModel, TextModel};
pub use notify::{LogNotifier, Notifier};
pub use orchestrator::{BatchReport, DirLocks, FailedFile, MoveOutcome, Orchestrator};
pub use sampler::{ContentSampler, ExtractError, Sampler};
pub use scanner::{format_size, list_files};
pub use types::{
    ActionKind, ActionRecord, Category, ClassificationResult, DecidedBy, FileKind, FileTask,
};
pub use watch::{WatchEvent, WatchHandle, WatchService, WatchState, WatchStats};
