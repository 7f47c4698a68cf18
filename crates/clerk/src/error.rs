use std::path::PathBuf;
use thiserror::Error;

use crate::archive::ArchiveError;
use crate::audit::AuditError;
use crate::config::ConfigError;

#[derive(Debug, Error)]
pub enum ClerkError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("audit log error: {0}")]
    Audit(#[from] AuditError),

    #[error("archive error: {0}")]
    Archive(#[from] ArchiveError),

    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to move {}: {source}", file.display())]
    Move {
        file: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("not a regular file: {}", .0.display())]
    NotAFile(PathBuf),

    #[error(transparent)]
    ResolverExhausted(#[from] clerk_core::ResolveError),
}

impl ClerkError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Errors that threaten the audit trail and must stop the caller.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Audit(_) | Self::Config(_))
    }
}

pub type Result<T, E = ClerkError> = std::result::Result<T, E>;
