//! `SQLite` session registry for threadgate.
//!
//! This crate persists the binding between chat-platform threads and external
//! conversational sessions, together with the one-way approval flag that lets
//! a session post without an explicit per-call target.
//!
//! # Architecture
//!
//! The store is a single `sessions` table with two lookup indexes:
//!
//! - `idx_sessions_opencode_session_id`: lookup by correlation key
//! - `idx_sessions_discord_thread_id`: lookup by thread
//!
//! [`schema::ensure_schema`] creates and migrates the table; it runs once at
//! startup and [`SqliteSessionStore::open`] is the only way to obtain a store.
//!
//! # Example
//!
//! ```no_run
//! use threadgate_core::{AgentType, ChannelId};
//! use threadgate_store::{NewSession, SessionStore, SqliteSessionStore};
//!
//! let store = SqliteSessionStore::open("/tmp/threadgate/sessions.db").unwrap();
//!
//! store.register(&NewSession {
//!     thread_id: Some(ChannelId::parse("200").unwrap()),
//!     channel_id: ChannelId::parse("100").unwrap(),
//!     owner_id: "42".to_string(),
//!     agent_type: AgentType::Ask,
//!     session_key: Some("ses_abc".to_string()),
//! }).unwrap();
//!
//! let binding = store.lookup_by_session_key("ses_abc").unwrap();
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod schema;
pub mod sqlite;
pub mod types;

pub use error::{Result, StoreError};
pub use schema::{ensure_schema, MigrationReport, SchemaInfo};
pub use sqlite::SqliteSessionStore;
pub use types::{NewSession, ReservedContext, SessionBinding, SessionRecord, SessionState};

use threadgate_core::SessionRecordId;

/// The storage trait defining all session operations.
///
/// Every operation is a self-contained unit; implementations must not hold a
/// transaction open across calls.
pub trait SessionStore: Send + Sync {
    /// Look up the binding for a correlation key.
    ///
    /// Returns `Ok(None)` for an empty key or when no row matches. Keys are not
    /// unique; the earliest registration wins.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn lookup_by_session_key(&self, key: &str) -> Result<Option<SessionBinding>>;

    /// Fetch the full record for a correlation key, first match wins.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails or the row is corrupt.
    fn get_by_session_key(&self, key: &str) -> Result<Option<SessionRecord>>;

    /// Register a newly created thread as an unapproved, idle session.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails.
    fn register(&self, session: &NewSession) -> Result<SessionRecordId>;

    /// Mark every session with this correlation key as approved.
    ///
    /// Returns the number of rows updated, which is zero for an unknown key.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    fn approve(&self, key: &str) -> Result<usize>;
}
