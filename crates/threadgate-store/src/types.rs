//! Domain types stored in the database.
//!
//! These types represent the persisted state of tracked conversation threads.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use threadgate_core::{AgentType, ChannelId, SessionRecordId, ThreadId};

/// A session record stored in the database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    /// Unique identifier for the record.
    pub id: SessionRecordId,
    /// Chat-platform thread this session is bound to, if any.
    pub thread_id: Option<ThreadId>,
    /// Parent channel of the thread.
    pub channel_id: ChannelId,
    /// Owning user, `"unknown"` if the caller gave none.
    pub user_id: String,
    /// Free-form lifecycle tag.
    pub state: SessionState,
    /// Conversation category.
    pub agent_type: AgentType,
    /// Registration timestamp.
    pub created_at: DateTime<Utc>,
    /// Last modification timestamp.
    pub updated_at: DateTime<Utc>,
    /// External correlation key.
    pub session_key: Option<String>,
    /// Reserved project location.
    pub project_path: Option<String>,
    /// Reserved project name.
    pub project_name: Option<String>,
    /// Reserved opaque context payload, never decoded here.
    pub context: ReservedContext,
    /// Whether a human approved this session to post without an explicit target.
    pub remote_allowed: bool,
}

/// Opaque encrypted-context columns, carried through untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservedContext {
    /// Ciphertext.
    pub encrypted: Option<String>,
    /// Initialization vector.
    pub iv: Option<String>,
    /// Authentication tag.
    pub tag: Option<String>,
}

/// Lifecycle tag of a session.
///
/// The column is free-form; `idle` is the only value this crate writes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionState(String);

impl SessionState {
    /// The state every session is registered in.
    pub const IDLE: &'static str = "idle";

    /// The default `idle` state.
    #[must_use]
    pub fn idle() -> Self {
        Self(Self::IDLE.to_string())
    }

    /// Wrap a stored state value.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// The stored value.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::idle()
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The part of a session record the channel resolver needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionBinding {
    /// Thread bound to the session, if one was recorded.
    pub thread_id: Option<ThreadId>,
    /// Whether the session has been approved.
    pub remote_allowed: bool,
}

/// Input for registering a newly created thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSession {
    /// The thread that was just created.
    pub thread_id: Option<ThreadId>,
    /// Parent channel of the thread.
    pub channel_id: ChannelId,
    /// Owning user.
    pub owner_id: String,
    /// Conversation category.
    pub agent_type: AgentType,
    /// External correlation key later used for lookups.
    pub session_key: Option<String>,
}
