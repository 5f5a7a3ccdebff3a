//! SQLite transcript store.
//!
//! One row per session in `debates`, one row per message in `messages`.
//! Saving a session replaces its whole transcript.

use std::path::Path;

use chrono::{DateTime, SecondsFormat, TimeZone, Utc};
use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, params};
use serde::{Deserialize, Serialize};

use crate::debate::DebateKind;
use crate::dialogue::{Message, Role, Stance};
use crate::error::StoreError;

/// Session metadata as listed by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    #[serde(rename = "debate_id")]
    pub session_id: String,
    pub motion: String,
    pub mode: DebateKind,
    pub created_at: DateTime<Utc>,
}

/// Database handle wrapping a SQLite connection.
pub struct TranscriptStore {
    conn: Mutex<Connection>,
}

impl TranscriptStore {
    /// Open (or create) the database at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        if let Some(parent) = path.as_ref().parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        Self::init(Connection::open(path)?)
    }

    /// Open an in-memory database (for testing).
    pub fn open_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS debates (
                debate_id   TEXT PRIMARY KEY,
                motion      TEXT NOT NULL,
                mode        TEXT NOT NULL,
                created_at  INTEGER NOT NULL,
                error       TEXT
            );

            CREATE TABLE IF NOT EXISTS messages (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                debate_id   TEXT NOT NULL,
                timestamp   TEXT NOT NULL,
                name        TEXT NOT NULL,
                role        TEXT NOT NULL,
                stance      TEXT,
                judgement   REAL,
                message     TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_messages_debate ON messages(debate_id, id);
            ",
        )?;

        // Databases created before run errors were recorded lack the column.
        let migrations = ["ALTER TABLE debates ADD COLUMN error TEXT"];
        for sql in &migrations {
            // "duplicate column name" means it already exists
            let _ = conn.execute(sql, []);
        }
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Replace the stored transcript of a session, with the error that ended
    /// its run if it failed.
    pub fn save(
        &self,
        summary: &SessionSummary,
        messages: &[Message],
        error: Option<&str>,
    ) -> Result<(), StoreError> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT OR REPLACE INTO debates (debate_id, motion, mode, created_at, error)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                summary.session_id,
                summary.motion,
                summary.mode.as_str(),
                summary.created_at.timestamp_millis(),
                error,
            ],
        )?;
        tx.execute(
            "DELETE FROM messages WHERE debate_id = ?1",
            params![summary.session_id],
        )?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO messages (debate_id, timestamp, name, role, stance, judgement, message)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            )?;
            for msg in messages {
                stmt.execute(params![
                    summary.session_id,
                    msg.timestamp.to_rfc3339_opts(SecondsFormat::AutoSi, true),
                    msg.name,
                    msg.role.as_str(),
                    msg.stance.as_str(),
                    msg.judgement,
                    msg.text,
                ])?;
            }
        }
        tx.commit()?;
        tracing::debug!(session_id = %summary.session_id, messages = messages.len(), "transcript saved");
        Ok(())
    }

    /// Messages of a session in append order; empty when unknown.
    pub fn load(&self, session_id: &str) -> Result<Vec<Message>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT timestamp, name, role, stance, judgement, message
             FROM messages WHERE debate_id = ?1 ORDER BY id",
        )?;
        let rows = stmt.query_map(params![session_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, Option<String>>(3)?,
                row.get::<_, Option<f64>>(4)?,
                row.get::<_, String>(5)?,
            ))
        })?;

        let mut messages = Vec::new();
        for row in rows {
            let (ts, name, role, stance, judgement, text) = row?;
            let decode = |detail: String| StoreError::Decode {
                session_id: session_id.to_string(),
                detail,
            };
            let role = Role::parse(&role).ok_or_else(|| decode(format!("unknown role {role:?}")))?;
            let timestamp = DateTime::parse_from_rfc3339(&ts)
                .map_err(|e| decode(format!("bad timestamp {ts:?}: {e}")))?
                .with_timezone(&Utc);
            messages.push(Message {
                name,
                role,
                stance: stance.as_deref().map(Stance::parse).unwrap_or_default(),
                text,
                judgement,
                session_id: session_id.to_string(),
                timestamp,
            });
        }
        Ok(messages)
    }

    /// Metadata for one stored session.
    pub fn summary(&self, session_id: &str) -> Result<Option<SessionSummary>, StoreError> {
        let conn = self.conn.lock();
        let row = conn
            .query_row(
                "SELECT debate_id, motion, mode, created_at FROM debates WHERE debate_id = ?1",
                params![session_id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, i64>(3)?,
                    ))
                },
            )
            .optional()?;
        row.map(decode_summary).transpose()
    }

    /// The error that ended a stored session's run, if any.
    pub fn run_error(&self, session_id: &str) -> Result<Option<String>, StoreError> {
        let conn = self.conn.lock();
        let error = conn
            .query_row(
                "SELECT error FROM debates WHERE debate_id = ?1",
                params![session_id],
                |row| row.get::<_, Option<String>>(0),
            )
            .optional()?;
        Ok(error.flatten())
    }

    /// Every stored session, newest first.
    pub fn list(&self) -> Result<Vec<SessionSummary>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT debate_id, motion, mode, created_at FROM debates ORDER BY created_at DESC",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, i64>(3)?,
            ))
        })?;
        let mut summaries = Vec::new();
        for row in rows {
            summaries.push(decode_summary(row?)?);
        }
        Ok(summaries)
    }
}

fn decode_summary(
    (session_id, motion, mode, created_at): (String, String, String, i64),
) -> Result<SessionSummary, StoreError> {
    let Some(mode) = DebateKind::parse(&mode) else {
        return Err(StoreError::Decode {
            session_id,
            detail: format!("unknown mode {mode:?}"),
        });
    };
    let Some(created_at) = Utc.timestamp_millis_opt(created_at).single() else {
        return Err(StoreError::Decode {
            session_id,
            detail: format!("bad creation time {created_at}"),
        });
    };
    Ok(SessionSummary {
        session_id,
        motion,
        mode,
        created_at,
    })
}
