//! Channel resolution and approval gating.
//!
//! Picks the channel or thread a tool call acts on. The order is a trust
//! hierarchy: a binding a human established when the session's thread was
//! created outranks any channel id the agent passes at call time, so output
//! cannot be redirected by a manipulated or hallucinated argument.
//!
//! 1. Explicit override, when the call site prefers it.
//! 2. Session binding, subject to the approval gate.
//! 3. Explicit id.
//! 4. Configured default channel.
//! 5. Failure.

use thiserror::Error;
use threadgate_core::{CallContext, ChannelId};
use threadgate_store::SessionStore;

use crate::config::ThreadgateConfig;
use crate::registry::SessionRegistry;

/// Where a resolved channel came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionSource {
    /// Supplied by the caller.
    Explicit,
    /// Bound to the caller's session.
    Session,
    /// The configured default channel.
    ExplicitDefault,
}

/// A resolved target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    /// Channel or thread to act on.
    pub resolved_id: ChannelId,
    /// Provenance of `resolved_id`.
    pub source: ResolutionSource,
}

impl Resolution {
    /// True only when the target came from a session binding.
    #[must_use]
    pub fn from_session(&self) -> bool {
        self.source == ResolutionSource::Session
    }

    fn explicit(id: &ChannelId) -> Self {
        Self {
            resolved_id: id.clone(),
            source: ResolutionSource::Explicit,
        }
    }
}

/// Per-call-site policy knobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolveOptions {
    /// Whether this operation needs an approved session to use its binding.
    /// Only takes effect when the global policy also requires approval.
    pub require_approval: bool,
    /// Whether an explicit id beats the session binding.
    pub prefer_explicit: bool,
}

impl ResolveOptions {
    /// Posting operations: approval required, session binding preferred.
    pub const POST: Self = Self {
        require_approval: true,
        prefer_explicit: false,
    };

    /// Operations where the caller's explicit target is authoritative
    /// (renaming, reading history).
    pub const EXPLICIT_FIRST: Self = Self {
        require_approval: false,
        prefer_explicit: true,
    };

    /// Session binding preferred, approval not checked.
    pub const UNGATED: Self = Self {
        require_approval: false,
        prefer_explicit: false,
    };
}

/// Policy rejections.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    /// The session has a thread but has not been approved, and the caller gave
    /// no explicit target.
    #[error(
        "session {session_key} is not approved to post remotely; ask the user to approve it \
         or pass an explicit channel id"
    )]
    NotApproved {
        /// The session that needs approval.
        session_key: String,
    },

    /// Nothing named a channel.
    #[error("cannot resolve channel: no explicit id, session binding, or default channel")]
    Unresolvable,
}

/// Resolve the target channel for a tool call.
///
/// Store failures during the session lookup are logged by the registry and
/// treated as "no binding".
///
/// # Errors
///
/// Returns `ResolveError::NotApproved` when an unapproved session would be
/// used without an explicit target, and `ResolveError::Unresolvable` when no
/// source names a channel.
pub fn resolve_channel<S: SessionStore>(
    config: &ThreadgateConfig,
    registry: &SessionRegistry<S>,
    explicit: Option<&ChannelId>,
    context: &CallContext,
    options: ResolveOptions,
) -> Result<Resolution, ResolveError> {
    if options.prefer_explicit {
        if let Some(id) = explicit {
            tracing::debug!(channel_id = %id, "Resolved explicit channel (preferred)");
            return Ok(Resolution::explicit(id));
        }
    }

    if let Some(key) = context.session_key() {
        let bound = registry
            .lookup(Some(key))
            .and_then(|binding| binding.thread_id.map(|t| (t, binding.remote_allowed)));

        if let Some((thread_id, remote_allowed)) = bound {
            let gated = options.require_approval && config.require_approval;
            if gated && !remote_allowed {
                if let Some(id) = explicit {
                    tracing::debug!(
                        session_key = %key,
                        channel_id = %id,
                        "Session not approved; using explicit channel"
                    );
                    return Ok(Resolution::explicit(id));
                }
                return Err(ResolveError::NotApproved {
                    session_key: key.to_string(),
                });
            }

            if let Some(id) = explicit.filter(|id| **id != thread_id) {
                tracing::warn!(
                    session_key = %key,
                    requested = %id,
                    bound = %thread_id,
                    "Ignoring explicit channel that differs from the session thread"
                );
            }
            tracing::debug!(session_key = %key, thread_id = %thread_id, "Resolved session thread");
            return Ok(Resolution {
                resolved_id: thread_id,
                source: ResolutionSource::Session,
            });
        }
    }

    if let Some(id) = explicit {
        tracing::debug!(channel_id = %id, "Resolved explicit channel");
        return Ok(Resolution::explicit(id));
    }

    if let Some(id) = &config.default_channel {
        tracing::debug!(channel_id = %id, "Resolved default channel");
        return Ok(Resolution {
            resolved_id: id.clone(),
            source: ResolutionSource::ExplicitDefault,
        });
    }

    Err(ResolveError::Unresolvable)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::TempDir;
    use threadgate_core::AgentType;
    use threadgate_store::SqliteSessionStore;

    struct Fixture {
        config: ThreadgateConfig,
        registry: SessionRegistry<SqliteSessionStore>,
        _dir: TempDir,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = TempDir::new().unwrap();
            let store = SqliteSessionStore::open(dir.path().join("sessions.db")).unwrap();
            Self {
                config: ThreadgateConfig::default(),
                registry: SessionRegistry::new(Arc::new(store), true),
                _dir: dir,
            }
        }

        fn bind(&self, key: &str, thread: &str, approved: bool) {
            self.registry
                .register(Some(ch(thread)), ch("100"), "u", AgentType::Ask, Some(key))
                .unwrap();
            if approved {
                assert!(self.registry.approve(key).succeeded());
            }
        }

        fn resolve(
            &self,
            explicit: Option<&ChannelId>,
            ctx: &CallContext,
            options: ResolveOptions,
        ) -> Result<Resolution, ResolveError> {
            resolve_channel(&self.config, &self.registry, explicit, ctx, options)
        }
    }

    fn ch(id: &str) -> ChannelId {
        ChannelId::parse(id).unwrap()
    }

    #[test]
    fn prefer_explicit_ignores_session_state() {
        let fx = Fixture::new();
        fx.bind("ses_a", "200", true);
        let ctx = CallContext::for_session("ses_a");

        let res = fx
            .resolve(Some(&ch("999")), &ctx, ResolveOptions::EXPLICIT_FIRST)
            .unwrap();
        assert_eq!(res.resolved_id, ch("999"));
        assert_eq!(res.source, ResolutionSource::Explicit);
        assert!(!res.from_session());

        // Same answer with an unapproved session and approval demanded.
        fx.bind("ses_b", "300", false);
        let options = ResolveOptions {
            require_approval: true,
            prefer_explicit: true,
        };
        let res = fx
            .resolve(Some(&ch("999")), &CallContext::for_session("ses_b"), options)
            .unwrap();
        assert_eq!(res.resolved_id, ch("999"));
    }

    #[test]
    fn prefer_explicit_without_explicit_uses_session() {
        let fx = Fixture::new();
        fx.bind("ses_a", "200", false);

        let res = fx
            .resolve(None, &CallContext::for_session("ses_a"), ResolveOptions::EXPLICIT_FIRST)
            .unwrap();
        assert_eq!(res.resolved_id, ch("200"));
        assert!(res.from_session());
    }

    #[test]
    fn unapproved_session_without_explicit_is_rejected() {
        let fx = Fixture::new();
        fx.bind("ses_a", "200", false);

        let err = fx
            .resolve(None, &CallContext::for_session("ses_a"), ResolveOptions::POST)
            .unwrap_err();
        assert_eq!(
            err,
            ResolveError::NotApproved {
                session_key: "ses_a".into()
            }
        );
        assert!(err.to_string().contains("approve"));
    }

    #[test]
    fn unapproved_session_with_explicit_uses_explicit() {
        let fx = Fixture::new();
        fx.bind("ses_a", "200", false);

        let res = fx
            .resolve(Some(&ch("555")), &CallContext::for_session("ses_a"), ResolveOptions::POST)
            .unwrap();
        assert_eq!(res.resolved_id, ch("555"));
        assert_eq!(res.source, ResolutionSource::Explicit);
    }

    #[test]
    fn approved_session_outranks_explicit() {
        let fx = Fixture::new();
        fx.bind("ses_a", "200", true);

        let res = fx
            .resolve(Some(&ch("555")), &CallContext::for_session("ses_a"), ResolveOptions::POST)
            .unwrap();
        assert_eq!(res.resolved_id, ch("200"));
        assert!(res.from_session());
    }

    #[test]
    fn global_policy_off_skips_gate() {
        let mut fx = Fixture::new();
        fx.config.require_approval = false;
        fx.bind("ses_a", "200", false);

        let res = fx
            .resolve(None, &CallContext::for_session("ses_a"), ResolveOptions::POST)
            .unwrap();
        assert_eq!(res.resolved_id, ch("200"));
        assert!(res.from_session());
    }

    #[test]
    fn call_site_without_gate_uses_unapproved_session() {
        let fx = Fixture::new();
        fx.bind("ses_a", "200", false);

        let res = fx
            .resolve(Some(&ch("555")), &CallContext::for_session("ses_a"), ResolveOptions::UNGATED)
            .unwrap();
        assert_eq!(res.resolved_id, ch("200"));
    }

    #[test]
    fn session_without_thread_falls_through() {
        let fx = Fixture::new();
        fx.registry
            .register(None, ch("100"), "u", AgentType::Ask, Some("ses_a"))
            .unwrap();

        let res = fx
            .resolve(Some(&ch("555")), &CallContext::for_session("ses_a"), ResolveOptions::POST)
            .unwrap();
        assert_eq!(res.resolved_id, ch("555"));
        assert_eq!(res.source, ResolutionSource::Explicit);
    }

    #[test]
    fn unknown_session_falls_back_to_explicit_then_default() {
        let mut fx = Fixture::new();
        let ctx = CallContext::for_session("ses_unknown");

        let res = fx.resolve(Some(&ch("555")), &ctx, ResolveOptions::POST).unwrap();
        assert_eq!(res.source, ResolutionSource::Explicit);

        assert_eq!(
            fx.resolve(None, &ctx, ResolveOptions::POST).unwrap_err(),
            ResolveError::Unresolvable
        );

        fx.config.default_channel = Some(ch("777"));
        let res = fx.resolve(None, &ctx, ResolveOptions::POST).unwrap();
        assert_eq!(res.resolved_id, ch("777"));
        assert_eq!(res.source, ResolutionSource::ExplicitDefault);
    }

    #[test]
    fn disabled_sessions_ignore_bindings() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(SqliteSessionStore::open(dir.path().join("s.db")).unwrap());
        let enabled = SessionRegistry::new(Arc::clone(&store), true);
        enabled
            .register(Some(ch("200")), ch("100"), "u", AgentType::Ask, Some("ses_a"))
            .unwrap();
        enabled.approve("ses_a");

        let disabled = SessionRegistry::new(store, false);
        let config = ThreadgateConfig::default();
        let res = resolve_channel(
            &config,
            &disabled,
            Some(&ch("555")),
            &CallContext::for_session("ses_a"),
            ResolveOptions::POST,
        )
        .unwrap();
        assert_eq!(res.resolved_id, ch("555"));
    }

    #[test]
    fn context_without_key_skips_sessions() {
        let fx = Fixture::new();
        fx.bind("ses_a", "200", true);

        let res = fx
            .resolve(Some(&ch("555")), &CallContext::default(), ResolveOptions::POST)
            .unwrap();
        assert_eq!(res.resolved_id, ch("555"));
    }
}
