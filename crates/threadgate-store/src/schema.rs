//! Database schema definitions and lifecycle.
//!
//! [`ensure_schema`] is the single entry point: it bootstraps the `sessions`
//! table and its lookup indexes, then applies additive migrations for stores
//! created by older builds. It is idempotent and runs once at startup, before
//! any session operation.

use std::path::Path;
use std::time::Duration;

use rusqlite::{Connection, OpenFlags};

use crate::error::{Result, StoreError};

/// Name of the session table.
pub const SESSIONS_TABLE: &str = "sessions";

/// Column names of the session table.
pub mod column {
    /// Primary key.
    pub const ID: &str = "id";
    /// Chat-platform thread identifier.
    pub const DISCORD_THREAD_ID: &str = "discord_thread_id";
    /// Parent channel identifier.
    pub const DISCORD_CHANNEL_ID: &str = "discord_channel_id";
    /// Owning user.
    pub const USER_ID: &str = "user_id";
    /// Lifecycle tag.
    pub const STATE: &str = "state";
    /// Conversation category.
    pub const AGENT_TYPE: &str = "agent_type";
    /// Registration timestamp (epoch ms).
    pub const CREATED_AT: &str = "created_at";
    /// Last modification timestamp (epoch ms).
    pub const UPDATED_AT: &str = "updated_at";
    /// Correlation key.
    pub const OPENCODE_SESSION_ID: &str = "opencode_session_id";
    /// Reserved.
    pub const PROJECT_PATH: &str = "project_path";
    /// Reserved.
    pub const PROJECT_NAME: &str = "project_name";
    /// Reserved opaque payload.
    pub const CONTEXT_ENCRYPTED: &str = "context_encrypted";
    /// Reserved opaque payload.
    pub const CONTEXT_IV: &str = "context_iv";
    /// Reserved opaque payload.
    pub const CONTEXT_TAG: &str = "context_tag";
    /// Approval gate flag.
    pub const REMOTE_ALLOWED: &str = "remote_allowed";
}

/// Index names on the session table.
pub mod index {
    /// Lookup by correlation key.
    pub const BY_SESSION_KEY: &str = "idx_sessions_opencode_session_id";
    /// Lookup by thread.
    pub const BY_THREAD: &str = "idx_sessions_discord_thread_id";
}

/// Every column the current schema defines, in table order.
pub const ALL_COLUMNS: [&str; 15] = [
    column::ID,
    column::DISCORD_THREAD_ID,
    column::DISCORD_CHANNEL_ID,
    column::USER_ID,
    column::STATE,
    column::AGENT_TYPE,
    column::CREATED_AT,
    column::UPDATED_AT,
    column::OPENCODE_SESSION_ID,
    column::PROJECT_PATH,
    column::PROJECT_NAME,
    column::CONTEXT_ENCRYPTED,
    column::CONTEXT_IV,
    column::CONTEXT_TAG,
    column::REMOTE_ALLOWED,
];

const CREATE_SESSIONS_TABLE: &str = "
    CREATE TABLE IF NOT EXISTS sessions (
        id TEXT PRIMARY KEY NOT NULL,
        discord_thread_id TEXT,
        discord_channel_id TEXT NOT NULL,
        user_id TEXT NOT NULL,
        state TEXT NOT NULL DEFAULT 'idle',
        agent_type TEXT NOT NULL,
        created_at INTEGER NOT NULL,
        updated_at INTEGER NOT NULL,
        opencode_session_id TEXT,
        project_path TEXT,
        project_name TEXT,
        context_encrypted TEXT,
        context_iv TEXT,
        context_tag TEXT,
        remote_allowed INTEGER NOT NULL DEFAULT 0
    )";

const CREATE_INDEXES: &str = "
    CREATE INDEX IF NOT EXISTS idx_sessions_opencode_session_id
        ON sessions (opencode_session_id);
    CREATE INDEX IF NOT EXISTS idx_sessions_discord_thread_id
        ON sessions (discord_thread_id);";

/// Additive migrations: a column and the DDL that adds it to older tables.
const ADDITIVE_COLUMNS: &[(&str, &str)] = &[(
    column::REMOTE_ALLOWED,
    "ALTER TABLE sessions ADD COLUMN remote_allowed INTEGER NOT NULL DEFAULT 0",
)];

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Outcome of [`migrate`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationReport {
    /// Columns added by this run. Empty when the table was already current.
    pub added_columns: Vec<&'static str>,
}

impl MigrationReport {
    /// Returns true if the run changed nothing.
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.added_columns.is_empty()
    }
}

/// Observed shape of an on-disk store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaInfo {
    /// Columns of the session table, in table order.
    pub columns: Vec<String>,
    /// Non-automatic indexes on the session table, sorted by name.
    pub indexes: Vec<String>,
    /// Journal mode reported by `SQLite` (lowercase).
    pub journal_mode: String,
}

impl SchemaInfo {
    /// Returns true if the session table has the given column.
    #[must_use]
    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c == name)
    }

    /// Returns true if the session table has the given index.
    #[must_use]
    pub fn has_index(&self, name: &str) -> bool {
        self.indexes.iter().any(|i| i == name)
    }
}

/// Create the store's parent directory, open or create the store, enable
/// write-ahead logging, and create the session table and its indexes if absent.
///
/// # Errors
///
/// Returns `StoreError::CreateDir` or `StoreError::Open` if the store cannot be
/// reached, and `StoreError::Schema` if the file is not a usable `SQLite`
/// store. All three are fatal.
pub fn bootstrap(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|source| StoreError::CreateDir {
            path: parent.to_path_buf(),
            source,
        })?;
    }

    let conn = Connection::open(path).map_err(|source| StoreError::Open {
        path: path.to_path_buf(),
        source,
    })?;

    let prepare = |source: rusqlite::Error| StoreError::Schema {
        path: path.to_path_buf(),
        source,
    };

    let mode: String = conn
        .pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))
        .map_err(prepare)?;
    if !mode.eq_ignore_ascii_case("wal") {
        tracing::warn!(
            path = %path.display(),
            journal_mode = %mode,
            "Store did not enter WAL mode"
        );
    }

    conn.execute_batch(CREATE_SESSIONS_TABLE).map_err(prepare)?;
    conn.execute_batch(CREATE_INDEXES).map_err(prepare)?;

    tracing::debug!(path = %path.display(), "Session store bootstrapped");
    Ok(())
}

/// Bring an existing session table up to the current column set.
///
/// Only additive changes are made; columns are added with their defaults so
/// existing rows stay valid.
///
/// # Errors
///
/// Returns an error if the store cannot be opened or the table inspected.
pub fn migrate(path: &Path) -> Result<MigrationReport> {
    let conn = connect(path)?;
    let columns = table_columns(&conn)?;

    let mut report = MigrationReport::default();
    for (name, ddl) in ADDITIVE_COLUMNS {
        if columns.iter().any(|c| c == name) {
            continue;
        }
        conn.execute(ddl, [])?;
        tracing::info!(path = %path.display(), column = *name, "Added missing session column");
        report.added_columns.push(*name);
    }

    Ok(report)
}

/// Bootstrap then migrate the store at `path`.
///
/// # Errors
///
/// Returns an error if either step fails. Callers must treat this as fatal for
/// every session-dependent feature.
pub fn ensure_schema(path: &Path) -> Result<MigrationReport> {
    bootstrap(path)?;
    migrate(path)
}

/// Report the columns, indexes and journal mode of the store at `path`.
///
/// # Errors
///
/// Returns an error if the store cannot be opened or queried.
pub fn inspect(path: &Path) -> Result<SchemaInfo> {
    let conn = connect(path)?;
    let columns = table_columns(&conn)?;

    let mut stmt = conn.prepare(
        "SELECT name FROM sqlite_master
         WHERE type = 'index' AND tbl_name = ?1 AND name NOT LIKE 'sqlite_autoindex%'
         ORDER BY name",
    )?;
    let indexes = stmt
        .query_map([SESSIONS_TABLE], |row| row.get::<_, String>(0))?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let journal_mode: String = conn.query_row("PRAGMA journal_mode", [], |row| row.get(0))?;

    Ok(SchemaInfo {
        columns,
        indexes,
        journal_mode: journal_mode.to_ascii_lowercase(),
    })
}

/// Open an existing store for a single operation.
///
/// The file is never created here: a store that vanished after startup is an
/// error, not a fresh empty database.
pub(crate) fn connect(path: &Path) -> Result<Connection> {
    let conn = Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
    .map_err(|source| StoreError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    conn.busy_timeout(BUSY_TIMEOUT)?;
    Ok(conn)
}

fn table_columns(conn: &Connection) -> Result<Vec<String>> {
    // PRAGMA arguments cannot be bound; the table name is a constant.
    let mut stmt = conn.prepare("PRAGMA table_info(sessions)")?;
    let columns = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(columns)
}
