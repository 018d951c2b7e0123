//! `SQLite` storage implementation.
//!
//! This module provides the `SqliteSessionStore` implementation of the
//! `SessionStore` trait. The store holds only a path: each operation opens its
//! own connection, runs one statement and closes it, so lock hold times stay
//! short and no handle is shared between calls.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};
use threadgate_core::{ChannelId, SessionRecordId};

use crate::error::{Result, StoreError};
use crate::schema::{self, MigrationReport};
use crate::types::{NewSession, ReservedContext, SessionBinding, SessionRecord, SessionState};
use crate::SessionStore;

/// SQLite-backed session store.
#[derive(Debug, Clone)]
pub struct SqliteSessionStore {
    path: PathBuf,
}

impl SqliteSessionStore {
    /// Ensure the schema at `path` and return a store over it.
    ///
    /// # Errors
    ///
    /// Returns an error if the schema cannot be bootstrapped or migrated.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with_report(path).map(|(store, _)| store)
    }

    /// Like [`open`](Self::open), also returning what the migration changed.
    ///
    /// # Errors
    ///
    /// Returns an error if the schema cannot be bootstrapped or migrated.
    pub fn open_with_report<P: AsRef<Path>>(path: P) -> Result<(Self, MigrationReport)> {
        let path = path.as_ref().to_path_buf();
        let report = schema::ensure_schema(&path)?;
        Ok((Self { path }, report))
    }

    /// Path of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

const SELECT_RECORD: &str = "
    SELECT id, discord_thread_id, discord_channel_id, user_id, state, agent_type,
           created_at, updated_at, opencode_session_id, project_path, project_name,
           context_encrypted, context_iv, context_tag, remote_allowed
    FROM sessions
    WHERE opencode_session_id = ?1
    ORDER BY rowid
    LIMIT 1";

impl SessionStore for SqliteSessionStore {
    fn lookup_by_session_key(&self, key: &str) -> Result<Option<SessionBinding>> {
        if key.is_empty() {
            return Ok(None);
        }

        let conn = schema::connect(&self.path)?;
        let row = conn
            .query_row(
                "SELECT discord_thread_id, remote_allowed FROM sessions
                 WHERE opencode_session_id = ?1
                 ORDER BY rowid
                 LIMIT 1",
                [key],
                |row| Ok((row.get::<_, Option<String>>(0)?, row.get::<_, i64>(1)?)),
            )
            .optional()?;

        row.map(|(thread, allowed)| -> Result<SessionBinding> {
            Ok(SessionBinding {
                thread_id: decode_optional_channel(thread)?,
                remote_allowed: allowed != 0,
            })
        })
        .transpose()
    }

    fn get_by_session_key(&self, key: &str) -> Result<Option<SessionRecord>> {
        if key.is_empty() {
            return Ok(None);
        }

        let conn = schema::connect(&self.path)?;
        let raw = conn
            .query_row(SELECT_RECORD, [key], RawRecord::from_row)
            .optional()?;

        raw.map(RawRecord::decode).transpose()
    }

    fn register(&self, session: &NewSession) -> Result<SessionRecordId> {
        let id = SessionRecordId::generate();
        let now = Utc::now().timestamp_millis();

        let conn = schema::connect(&self.path)?;
        conn.execute(
            "INSERT INTO sessions (
                id, discord_thread_id, discord_channel_id, user_id, state, agent_type,
                created_at, updated_at, opencode_session_id, remote_allowed
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7, ?8, 0)",
            params![
                id.to_string(),
                session.thread_id.as_ref().map(ChannelId::as_str),
                session.channel_id.as_str(),
                session.owner_id,
                SessionState::IDLE,
                session.agent_type.as_str(),
                now,
                session.session_key,
            ],
        )?;

        tracing::debug!(
            record_id = %id,
            channel_id = %session.channel_id,
            agent_type = %session.agent_type,
            "Registered session"
        );

        Ok(id)
    }

    fn approve(&self, key: &str) -> Result<usize> {
        let now = Utc::now().timestamp_millis();

        let conn = schema::connect(&self.path)?;
        let rows = conn.execute(
            "UPDATE sessions SET remote_allowed = 1, updated_at = ?2
             WHERE opencode_session_id = ?1",
            params![key, now],
        )?;

        Ok(rows)
    }
}

/// A row as stored, before identifier and enum decoding.
struct RawRecord {
    id: String,
    thread_id: Option<String>,
    channel_id: String,
    user_id: String,
    state: String,
    agent_type: String,
    created_at: i64,
    updated_at: i64,
    session_key: Option<String>,
    project_path: Option<String>,
    project_name: Option<String>,
    context_encrypted: Option<String>,
    context_iv: Option<String>,
    context_tag: Option<String>,
    remote_allowed: i64,
}

impl RawRecord {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            thread_id: row.get(1)?,
            channel_id: row.get(2)?,
            user_id: row.get(3)?,
            state: row.get(4)?,
            agent_type: row.get(5)?,
            created_at: row.get(6)?,
            updated_at: row.get(7)?,
            session_key: row.get(8)?,
            project_path: row.get(9)?,
            project_name: row.get(10)?,
            context_encrypted: row.get(11)?,
            context_iv: row.get(12)?,
            context_tag: row.get(13)?,
            remote_allowed: row.get(14)?,
        })
    }

    fn decode(self) -> Result<SessionRecord> {
        Ok(SessionRecord {
            id: self
                .id
                .parse()
                .map_err(|e| StoreError::Corrupt(format!("id {:?}: {e}", self.id)))?,
            thread_id: decode_optional_channel(self.thread_id)?,
            channel_id: ChannelId::parse(self.channel_id)
                .map_err(|e| StoreError::Corrupt(format!("discord_channel_id: {e}")))?,
            user_id: self.user_id,
            state: SessionState::new(self.state),
            agent_type: self
                .agent_type
                .parse()
                .map_err(|e| StoreError::Corrupt(format!("agent_type: {e}")))?,
            created_at: decode_millis(self.created_at)?,
            updated_at: decode_millis(self.updated_at)?,
            session_key: self.session_key,
            project_path: self.project_path,
            project_name: self.project_name,
            context: ReservedContext {
                encrypted: self.context_encrypted,
                iv: self.context_iv,
                tag: self.context_tag,
            },
            remote_allowed: self.remote_allowed != 0,
        })
    }
}

/// Empty thread columns are treated as "no thread recorded".
fn decode_optional_channel(value: Option<String>) -> Result<Option<ChannelId>> {
    match value {
        None => Ok(None),
        Some(v) if v.is_empty() => Ok(None),
        Some(v) => ChannelId::parse(v)
            .map(Some)
            .map_err(|e| StoreError::Corrupt(format!("discord_thread_id: {e}"))),
    }
}

fn decode_millis(millis: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(millis)
        .ok_or_else(|| StoreError::Corrupt(format!("timestamp out of range: {millis}")))
}
