//! Bounded SQLite log of recent text messages, searchable by platform message id.
//!
//! The log is a FIFO ring: every append assigns the next `seq`, inserts the
//! row, then trims the oldest rows until at most `capacity` real entries
//! remain. All three steps run inside one IMMEDIATE transaction, so two
//! concurrent appends (even from separate processes sharing the file) never
//! observe the same `MAX(seq)`.
//!
//! An empty store is seeded with a sentinel row at `seq = 0`. It anchors the
//! sequence, is never counted, never evicted and never returned by lookups.

use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, TransactionBehavior, params};
use std::fmt;
use std::path::Path;
use std::sync::Mutex;
use tracing::{debug, info};

/// Reserved message id of the seed row. Platform ids are numeric strings.
pub const SENTINEL_MESSAGE_ID: &str = "__sentinel__";

/// Capacity used when the config doesn't set one.
pub const DEFAULT_CAPACITY: usize = 500;

/// Errors from the backing store.
#[derive(Debug)]
pub enum LogError {
    /// SQLite rejected the operation.
    StorageUnavailable(rusqlite::Error),
    /// A previous holder of the connection panicked.
    Poisoned,
}

impl fmt::Display for LogError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StorageUnavailable(e) => write!(f, "message log storage unavailable: {e}"),
            Self::Poisoned => write!(f, "message log storage unavailable: connection lock poisoned"),
        }
    }
}

impl std::error::Error for LogError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::StorageUnavailable(e) => Some(e),
            Self::Poisoned => None,
        }
    }
}

impl From<rusqlite::Error> for LogError {
    fn from(e: rusqlite::Error) -> Self {
        Self::StorageUnavailable(e)
    }
}

/// One retained message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub seq: i64,
    pub sender_id: String,
    pub message_id: String,
    pub text: String,
    /// UTC, "%Y-%m-%d %H:%M:%S".
    pub recorded_at: String,
}

pub struct MessageLog {
    conn: Mutex<Connection>,
    capacity: usize,
}

impl MessageLog {
    /// Open (or create) the log at `path`.
    pub fn open(path: &Path, capacity: usize) -> Result<Self, LogError> {
        let conn = Connection::open(path)?;
        // Concurrent writers from other processes wait instead of failing.
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        let log = Self::from_connection(conn, capacity)?;
        info!(
            "Opened message log at {:?} ({} of {} entries)",
            path,
            log.size()?,
            log.capacity
        );
        Ok(log)
    }

    /// Create a log that lives only as long as this value.
    pub fn in_memory(capacity: usize) -> Result<Self, LogError> {
        Self::from_connection(Connection::open_in_memory()?, capacity)
    }

    fn from_connection(conn: Connection, capacity: usize) -> Result<Self, LogError> {
        let log = Self {
            conn: Mutex::new(conn),
            capacity: capacity.max(1),
        };
        log.init_schema()?;
        log.seed_if_empty()?;
        Ok(log)
    }

    fn init_schema(&self) -> Result<(), LogError> {
        let conn = self.conn.lock().map_err(|_| LogError::Poisoned)?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS message_log (
                seq INTEGER PRIMARY KEY,
                user_id TEXT NOT NULL,
                message_id TEXT NOT NULL,
                message_text TEXT NOT NULL,
                recorded_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_message_log_message_id ON message_log(message_id);
        "#,
        )?;
        Ok(())
    }

    fn seed_if_empty(&self) -> Result<(), LogError> {
        let conn = self.conn.lock().map_err(|_| LogError::Poisoned)?;
        let inserted = conn.execute(
            "INSERT INTO message_log (seq, user_id, message_id, message_text, recorded_at)
             SELECT 0, '', ?1, '', ?2
             WHERE NOT EXISTS (SELECT 1 FROM message_log)",
            params![SENTINEL_MESSAGE_ID, now()],
        )?;
        if inserted > 0 {
            debug!("Seeded empty message log with sentinel");
        }
        Ok(())
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Record a message and return its sequence number.
    ///
    /// Evicts the oldest entries until the log is back within capacity.
    pub fn append(&self, sender_id: &str, message_id: &str, text: &str) -> Result<i64, LogError> {
        let mut conn = self.conn.lock().map_err(|_| LogError::Poisoned)?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let last: i64 = tx.query_row("SELECT COALESCE(MAX(seq), 0) FROM message_log", [], |row| {
            row.get(0)
        })?;
        let seq = last + 1;

        tx.execute(
            "INSERT INTO message_log (seq, user_id, message_id, message_text, recorded_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![seq, sender_id, message_id, text, now()],
        )?;

        let count: i64 = tx.query_row(
            "SELECT COUNT(*) FROM message_log WHERE message_id != ?1",
            params![SENTINEL_MESSAGE_ID],
            |row| row.get(0),
        )?;
        let excess = count - self.capacity as i64;
        if excess > 0 {
            let evicted = tx.execute(
                "DELETE FROM message_log WHERE seq IN (
                    SELECT seq FROM message_log WHERE message_id != ?1 ORDER BY seq ASC LIMIT ?2
                 )",
                params![SENTINEL_MESSAGE_ID, excess],
            )?;
            debug!("Evicted {} message(s) from log", evicted);
        }

        tx.commit()?;
        Ok(seq)
    }

    /// Most recent retained entry with this platform message id.
    pub fn find_by_message_id(&self, message_id: &str) -> Result<Option<LogEntry>, LogError> {
        if message_id == SENTINEL_MESSAGE_ID {
            return Ok(None);
        }
        let conn = self.conn.lock().map_err(|_| LogError::Poisoned)?;
        let entry = conn
            .query_row(
                "SELECT seq, user_id, message_id, message_text, recorded_at
                 FROM message_log WHERE message_id = ?1 ORDER BY seq DESC LIMIT 1",
                params![message_id],
                row_to_entry,
            )
            .optional()?;
        Ok(entry)
    }

    /// Number of real entries (the sentinel is not counted).
    pub fn size(&self) -> Result<usize, LogError> {
        let conn = self.conn.lock().map_err(|_| LogError::Poisoned)?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM message_log WHERE message_id != ?1",
            params![SENTINEL_MESSAGE_ID],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    pub fn is_empty(&self) -> Result<bool, LogError> {
        Ok(self.size()? == 0)
    }

    /// All real entries, oldest first.
    #[cfg(test)]
    pub fn entries(&self) -> Result<Vec<LogEntry>, LogError> {
        let conn = self.conn.lock().map_err(|_| LogError::Poisoned)?;
        let mut stmt = conn.prepare(
            "SELECT seq, user_id, message_id, message_text, recorded_at
             FROM message_log WHERE message_id != ?1 ORDER BY seq ASC",
        )?;
        let rows = stmt.query_map(params![SENTINEL_MESSAGE_ID], row_to_entry)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }
}

fn row_to_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<LogEntry> {
    Ok(LogEntry {
        seq: row.get(0)?,
        sender_id: row.get(1)?,
        message_id: row.get(2)?,
        text: row.get(3)?,
        recorded_at: row.get(4)?,
    })
}

fn now() -> String {
    Utc::now().format("%Y-%m-%d %H:%M:%S").to_string()
}
