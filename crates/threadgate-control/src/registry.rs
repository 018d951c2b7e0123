//! Session registry with degrading semantics.
//!
//! The store reports every failure; the registry decides which ones a caller
//! may ignore. Lookups and registrations never fail the caller's larger
//! operation: a store error is logged and treated as "no information".
//! Approvals return a structured [`ApprovalOutcome`] so the caller chooses
//! whether to propagate.

use std::sync::Arc;

use threadgate_core::{AgentType, ChannelId, SessionRecordId, ThreadId};
use threadgate_store::{NewSession, SessionBinding, SessionRecord, SessionStore};

/// Result of an approval attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApprovalOutcome {
    /// The update ran. `rows` is zero when no session has the key; that case is
    /// still reported as success, so "approved" and "unknown key" look alike
    /// through [`succeeded`](Self::succeeded).
    Applied {
        /// Number of session rows updated.
        rows: usize,
    },
    /// The update could not run.
    Failed {
        /// Why the store rejected it.
        reason: String,
    },
}

impl ApprovalOutcome {
    /// True whenever the update executed, regardless of matched rows.
    #[must_use]
    pub const fn succeeded(&self) -> bool {
        matches!(self, Self::Applied { .. })
    }
}

/// Session registry over a [`SessionStore`], gated by the session feature flag.
pub struct SessionRegistry<S: SessionStore> {
    store: Arc<S>,
    enabled: bool,
}

impl<S: SessionStore> Clone for SessionRegistry<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            enabled: self.enabled,
        }
    }
}

impl<S: SessionStore> SessionRegistry<S> {
    /// Create a registry. When `enabled` is false every lookup returns `None`.
    #[must_use]
    pub fn new(store: Arc<S>, enabled: bool) -> Self {
        Self { store, enabled }
    }

    /// Whether the session feature is enabled.
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Get a reference to the store.
    #[must_use]
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Look up the binding for a correlation key.
    ///
    /// Returns `None` for an absent or empty key, a disabled feature, an
    /// unknown key, or an unreachable store.
    #[must_use]
    pub fn lookup(&self, key: Option<&str>) -> Option<SessionBinding> {
        let key = key.filter(|k| !k.is_empty())?;
        if !self.enabled {
            return None;
        }

        match self.store.lookup_by_session_key(key) {
            Ok(binding) => binding,
            Err(err) => {
                tracing::warn!(
                    session_key = %key,
                    error = %err,
                    "Session lookup failed; continuing without binding"
                );
                None
            }
        }
    }

    /// Fetch the full record for a correlation key, degrading like [`lookup`](Self::lookup).
    #[must_use]
    pub fn record(&self, key: &str) -> Option<SessionRecord> {
        if key.is_empty() || !self.enabled {
            return None;
        }

        match self.store.get_by_session_key(key) {
            Ok(record) => record,
            Err(err) => {
                tracing::warn!(session_key = %key, error = %err, "Session record read failed");
                None
            }
        }
    }

    /// Register a newly created thread.
    ///
    /// Returns `None` (and logs) on failure: creating the thread must not fail
    /// because its bookkeeping did.
    pub fn register(
        &self,
        thread_id: Option<ThreadId>,
        channel_id: ChannelId,
        owner_id: &str,
        agent_type: AgentType,
        session_key: Option<&str>,
    ) -> Option<SessionRecordId> {
        let session = NewSession {
            thread_id,
            channel_id,
            owner_id: owner_id.to_string(),
            agent_type,
            session_key: session_key.map(str::to_string),
        };

        match self.store.register(&session) {
            Ok(id) => {
                tracing::info!(
                    record_id = %id,
                    thread_id = ?session.thread_id,
                    session_key = ?session.session_key,
                    "Session registered"
                );
                Some(id)
            }
            Err(err) => {
                tracing::error!(
                    channel_id = %session.channel_id,
                    error = %err,
                    "Failed to register session"
                );
                None
            }
        }
    }

    /// Approve every session carrying this correlation key.
    pub fn approve(&self, key: &str) -> ApprovalOutcome {
        match self.store.approve(key) {
            Ok(rows) => {
                if rows == 0 {
                    tracing::warn!(session_key = %key, "Approval matched no session");
                } else {
                    tracing::info!(session_key = %key, rows, "Session approved for remote use");
                }
                ApprovalOutcome::Applied { rows }
            }
            Err(err) => {
                tracing::error!(session_key = %key, error = %err, "Failed to approve session");
                ApprovalOutcome::Failed {
                    reason: err.to_string(),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use threadgate_store::{SqliteSessionStore, StoreError};

    /// A store whose every operation fails, standing in for an unreachable file.
    struct UnreachableStore;

    impl SessionStore for UnreachableStore {
        fn lookup_by_session_key(
            &self,
            _key: &str,
        ) -> threadgate_store::Result<Option<SessionBinding>> {
            Err(StoreError::Database("disk I/O error".into()))
        }

        fn get_by_session_key(
            &self,
            _key: &str,
        ) -> threadgate_store::Result<Option<SessionRecord>> {
            Err(StoreError::Database("disk I/O error".into()))
        }

        fn register(&self, _session: &NewSession) -> threadgate_store::Result<SessionRecordId> {
            Err(StoreError::Database("disk I/O error".into()))
        }

        fn approve(&self, _key: &str) -> threadgate_store::Result<usize> {
            Err(StoreError::Database("disk I/O error".into()))
        }
    }

    fn setup(enabled: bool) -> (SessionRegistry<SqliteSessionStore>, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = SqliteSessionStore::open(dir.path().join("sessions.db")).unwrap();
        (SessionRegistry::new(Arc::new(store), enabled), dir)
    }

    fn channel(id: &str) -> ChannelId {
        ChannelId::parse(id).unwrap()
    }

    #[test]
    fn register_lookup_approve() {
        let (registry, _dir) = setup(true);
        let id = registry.register(
            Some(channel("200")),
            channel("100"),
            "user-1",
            AgentType::Project,
            Some("ses_a"),
        );
        assert!(id.is_some());

        let binding = registry.lookup(Some("ses_a")).unwrap();
        assert!(!binding.remote_allowed);

        let outcome = registry.approve("ses_a");
        assert_eq!(outcome, ApprovalOutcome::Applied { rows: 1 });
        assert!(registry.lookup(Some("ses_a")).unwrap().remote_allowed);
    }

    #[test]
    fn approving_unknown_key_still_succeeds() {
        let (registry, _dir) = setup(true);
        let outcome = registry.approve("nobody");
        assert!(outcome.succeeded());
        assert_eq!(outcome, ApprovalOutcome::Applied { rows: 0 });
    }

    #[test]
    fn lookup_absent_or_empty_key() {
        let (registry, _dir) = setup(true);
        assert!(registry.lookup(None).is_none());
        assert!(registry.lookup(Some("")).is_none());
    }

    #[test]
    fn disabled_registry_hides_bindings() {
        let (registry, _dir) = setup(false);
        registry.register(Some(channel("200")), channel("100"), "u", AgentType::Ask, Some("ses_a"));

        assert!(!registry.is_enabled());
        assert!(registry.lookup(Some("ses_a")).is_none());
        assert!(registry.record("ses_a").is_none());
        assert!(registry.store().lookup_by_session_key("ses_a").unwrap().is_some());
    }

    #[test]
    fn unreachable_store_degrades() {
        let registry = SessionRegistry::new(Arc::new(UnreachableStore), true);

        assert!(registry.lookup(Some("ses_a")).is_none());
        assert!(registry.record("ses_a").is_none());
        assert!(registry
            .register(None, channel("100"), "u", AgentType::Ask, Some("ses_a"))
            .is_none());

        let outcome = registry.approve("ses_a");
        assert!(!outcome.succeeded());
        assert!(matches!(
            outcome,
            ApprovalOutcome::Failed { reason } if reason.contains("disk I/O")
        ));
    }
}
