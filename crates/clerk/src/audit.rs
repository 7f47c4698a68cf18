//! Durable, append-only action log.
//!
//! Every successful move gets exactly one row. Rows are never updated or deleted;
//! readers get them back oldest first.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use crate::types::{ActionKind, ActionRecord, Category};

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("corrupt record {id}: {reason}")]
    Corrupt { id: i64, reason: String },
}

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS actions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp TEXT NOT NULL,
    action TEXT NOT NULL,
    filename TEXT NOT NULL,
    category TEXT NOT NULL,
    new_filename TEXT NOT NULL,
    recipient TEXT NOT NULL
);";

pub struct AuditLog {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
}

impl AuditLog {
    pub fn open(path: &Path) -> Result<Self, AuditError> {
        let conn = Connection::open(path)?;
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |_| Ok(()))?;
        conn.pragma_update(None, "synchronous", "FULL")?;
        conn.busy_timeout(Duration::from_secs(5))?;
        Self::init(conn, Some(path.to_path_buf()))
    }

    pub fn open_in_memory() -> Result<Self, AuditError> {
        Self::init(Connection::open_in_memory()?, None)
    }

    fn init(conn: Connection, path: Option<PathBuf>) -> Result<Self, AuditError> {
        conn.execute_batch(SCHEMA)?;
        debug!("audit log schema ready");
        Ok(Self {
            conn: Mutex::new(conn),
            path,
        })
    }

    /// Database file backing this log; `None` for in-memory logs.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Append one record atomically; returns its sequence number.
    pub fn append(&self, record: &ActionRecord) -> Result<i64, AuditError> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO actions (timestamp, action, filename, category, new_filename, recipient)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                record.timestamp.to_rfc3339(),
                record.action.as_str(),
                record.filename,
                record.category.as_str(),
                record.new_filename,
                record.recipient,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// All records in append order.
    pub fn records(&self) -> Result<Vec<ActionRecord>, AuditError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, timestamp, action, filename, category, new_filename, recipient
             FROM actions ORDER BY id ASC",
        )?;

        let rows = stmt.query_map([], |row| {
            Ok(RawRecord {
                id: row.get(0)?,
                timestamp: row.get(1)?,
                action: row.get(2)?,
                filename: row.get(3)?,
                category: row.get(4)?,
                new_filename: row.get(5)?,
                recipient: row.get(6)?,
            })
        })?;

        let records = rows
            .map(|row| row?.into_record())
            .collect::<Result<Vec<_>, _>>();
        records
    }

    pub fn count(&self) -> Result<usize, AuditError> {
        let conn = self.conn.lock();
        let n: i64 = conn.query_row("SELECT COUNT(*) FROM actions", [], |row| row.get(0))?;
        Ok(n as usize)
    }
}

struct RawRecord {
    id: i64,
    timestamp: String,
    action: String,
    filename: String,
    category: String,
    new_filename: String,
    recipient: String,
}

impl RawRecord {
    fn into_record(self) -> Result<ActionRecord, AuditError> {
        let id = self.id;
        let timestamp = DateTime::parse_from_rfc3339(&self.timestamp)
            .map(|t| t.with_timezone(&Utc))
            .map_err(|e| AuditError::Corrupt {
                id,
                reason: e.to_string(),
            })?;
        let action = ActionKind::parse(&self.action).ok_or_else(|| AuditError::Corrupt {
            id,
            reason: format!("unknown action '{}'", self.action),
        })?;

        Ok(ActionRecord {
            timestamp,
            action,
            filename: self.filename,
            category: Category::new(self.category),
            new_filename: self.new_filename,
            recipient: self.recipient,
        })
    }
}
