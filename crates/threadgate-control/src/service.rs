//! Bridge service implementation.
//!
//! This module provides the `Bridge` trait and the `BridgeService`
//! implementation that puts channel resolution, approval gating and the file
//! sandbox in front of every chat operation a tool call can trigger.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use threadgate_core::{AgentType, CallContext, ChannelId, SessionRecordId, ThreadId};
use threadgate_store::{SessionStore, SqliteSessionStore};

use crate::chat::{ApprovalReply, ChatClient, ChatMessage, MessageRef};
use crate::config::ThreadgateConfig;
use crate::error::{ControlError, Result};
use crate::file_guard::FileAccessGuard;
use crate::registry::{ApprovalOutcome, SessionRegistry};
use crate::resolver::{resolve_channel, Resolution, ResolveOptions};

/// Upper bound on messages returned by [`Bridge::read_history`].
pub const MAX_HISTORY: u32 = 100;

/// A thread created through the bridge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedThread {
    /// The new thread.
    pub thread_id: ThreadId,
    /// Channel the thread was created under.
    pub parent_id: ChannelId,
    /// Session record, or `None` if registration failed.
    pub record_id: Option<SessionRecordId>,
}

/// Outcome of an interactive approval request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApprovalPromptResult {
    /// A human approved; carries the result of persisting the approval.
    Approved(ApprovalOutcome),
    /// A human refused.
    Denied,
    /// Nobody answered before the timeout.
    TimedOut,
}

/// Trait defining the bridge operations exposed to tool handlers.
#[async_trait]
pub trait Bridge: Send + Sync {
    /// Post a message. Approval is required to use the session's thread.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::Resolve` if no target is allowed, or
    /// `ControlError::Chat` if posting fails.
    async fn send_message(
        &self,
        explicit: Option<&ChannelId>,
        ctx: &CallContext,
        content: &str,
    ) -> Result<MessageRef>;

    /// Create a thread and bind it to the caller's session.
    ///
    /// The parent channel comes from `explicit_channel` or the default
    /// channel; the session is not consulted since the new thread becomes
    /// its binding.
    ///
    /// # Errors
    ///
    /// Returns an error if no parent resolves or the platform call fails. A
    /// failed registration is logged and does not fail the call.
    async fn create_thread(
        &self,
        explicit_channel: Option<&ChannelId>,
        ctx: &CallContext,
        name: &str,
        agent_type: AgentType,
    ) -> Result<CreatedThread>;

    /// Rename a thread. An explicit id takes precedence over the session.
    ///
    /// # Errors
    ///
    /// Returns an error if no target resolves or the platform call fails.
    async fn rename_thread(
        &self,
        explicit: Option<&ThreadId>,
        ctx: &CallContext,
        name: &str,
    ) -> Result<ThreadId>;

    /// Read recent history. `limit` is clamped to `1..=100`.
    ///
    /// # Errors
    ///
    /// Returns an error if no target resolves or the platform call fails.
    async fn read_history(
        &self,
        explicit: Option<&ChannelId>,
        ctx: &CallContext,
        limit: u32,
    ) -> Result<Vec<ChatMessage>>;

    /// Upload a sandboxed file.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::FileAccess` if the file is refused; in that case
    /// nothing is sent.
    async fn send_file(
        &self,
        explicit: Option<&ChannelId>,
        ctx: &CallContext,
        path: &Path,
        caption: Option<&str>,
    ) -> Result<MessageRef>;

    /// Ask a human in the session's thread to approve remote posting.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::NoSessionBinding` if the caller's session has no
    /// thread, or `ControlError::Chat` if the prompt cannot be posted.
    async fn request_approval(&self, ctx: &CallContext) -> Result<ApprovalPromptResult>;

    /// Approve a session directly.
    async fn approve_session(&self, session_key: &str) -> ApprovalOutcome;
}

/// The main bridge service implementation.
pub struct BridgeService<S: SessionStore, C: ChatClient> {
    config: ThreadgateConfig,
    registry: SessionRegistry<S>,
    chat: Arc<C>,
    guard: FileAccessGuard,
}

impl<S: SessionStore, C: ChatClient> BridgeService<S, C> {
    /// Create a new bridge service.
    #[must_use]
    pub fn new(config: ThreadgateConfig, store: Arc<S>, chat: Arc<C>) -> Self {
        let registry = SessionRegistry::new(store, config.sessions_enabled);
        let guard = FileAccessGuard::from_config(&config);
        Self {
            config,
            registry,
            chat,
            guard,
        }
    }

    /// Get the configuration.
    #[must_use]
    pub const fn config(&self) -> &ThreadgateConfig {
        &self.config
    }

    /// Get the session registry.
    #[must_use]
    pub const fn registry(&self) -> &SessionRegistry<S> {
        &self.registry
    }

    /// Get the chat client.
    #[must_use]
    pub fn chat(&self) -> &C {
        &self.chat
    }

    fn resolve(
        &self,
        explicit: Option<&ChannelId>,
        ctx: &CallContext,
        options: ResolveOptions,
    ) -> Result<Resolution> {
        Ok(resolve_channel(&self.config, &self.registry, explicit, ctx, options)?)
    }
}

impl<C: ChatClient> BridgeService<SqliteSessionStore, C> {
    /// Open the configured `SQLite` store, creating or migrating it, and build
    /// a service on top of it.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::Store` if the store cannot be prepared. Such an
    /// error is fatal and never retriable.
    pub fn open(config: ThreadgateConfig, chat: Arc<C>) -> Result<Self> {
        let store = SqliteSessionStore::open(&config.db_path).map_err(|err| {
            tracing::error!(
                db_path = %config.db_path.display(),
                error = %err,
                fatal = err.is_fatal(),
                "Failed to open session store"
            );
            ControlError::from(err)
        })?;
        Ok(Self::new(config, Arc::new(store), chat))
    }
}

fn approval_prompt(session_key: &str) -> String {
    format!(
        "Session `{session_key}` wants to post to this thread without naming a channel \
         on every call. Approve?"
    )
}

#[async_trait]
impl<S, C> Bridge for BridgeService<S, C>
where
    S: SessionStore + 'static,
    C: ChatClient + 'static,
{
    async fn send_message(
        &self,
        explicit: Option<&ChannelId>,
        ctx: &CallContext,
        content: &str,
    ) -> Result<MessageRef> {
        let target = self.resolve(explicit, ctx, ResolveOptions::POST)?;
        let sent = self.chat.send_message(&target.resolved_id, content).await?;

        tracing::info!(
            channel_id = %target.resolved_id,
            from_session = target.from_session(),
            message_id = %sent.message_id,
            "Message sent"
        );
        Ok(sent)
    }

    async fn create_thread(
        &self,
        explicit_channel: Option<&ChannelId>,
        ctx: &CallContext,
        name: &str,
        agent_type: AgentType,
    ) -> Result<CreatedThread> {
        let parent_ctx = CallContext {
            session_key: None,
            user_id: ctx.user_id.clone(),
        };
        let parent = self.resolve(explicit_channel, &parent_ctx, ResolveOptions::EXPLICIT_FIRST)?;

        let thread_id = self.chat.create_thread(&parent.resolved_id, name).await?;
        let record_id = self.registry.register(
            Some(thread_id.clone()),
            parent.resolved_id.clone(),
            ctx.owner(),
            agent_type,
            ctx.session_key(),
        );

        tracing::info!(
            thread_id = %thread_id,
            parent_id = %parent.resolved_id,
            agent_type = %agent_type,
            registered = record_id.is_some(),
            "Thread created"
        );

        Ok(CreatedThread {
            thread_id,
            parent_id: parent.resolved_id,
            record_id,
        })
    }

    async fn rename_thread(
        &self,
        explicit: Option<&ThreadId>,
        ctx: &CallContext,
        name: &str,
    ) -> Result<ThreadId> {
        let target = self.resolve(explicit, ctx, ResolveOptions::EXPLICIT_FIRST)?;
        self.chat.rename_thread(&target.resolved_id, name).await?;

        tracing::info!(thread_id = %target.resolved_id, name, "Thread renamed");
        Ok(target.resolved_id)
    }

    async fn read_history(
        &self,
        explicit: Option<&ChannelId>,
        ctx: &CallContext,
        limit: u32,
    ) -> Result<Vec<ChatMessage>> {
        let target = self.resolve(explicit, ctx, ResolveOptions::EXPLICIT_FIRST)?;
        let limit = u8::try_from(limit.clamp(1, MAX_HISTORY)).unwrap_or(u8::MAX);

        let messages = self.chat.fetch_messages(&target.resolved_id, limit).await?;
        tracing::debug!(channel_id = %target.resolved_id, count = messages.len(), "History read");
        Ok(messages)
    }

    async fn send_file(
        &self,
        explicit: Option<&ChannelId>,
        ctx: &CallContext,
        path: &Path,
        caption: Option<&str>,
    ) -> Result<MessageRef> {
        let target = self.resolve(explicit, ctx, ResolveOptions::POST)?;
        let file = self.guard.validate(path)?;
        let file_name = file.file_name();
        let bytes = file.buffer.len();

        let sent = self
            .chat
            .send_file(&target.resolved_id, &file_name, file.buffer, caption)
            .await?;

        tracing::info!(
            channel_id = %target.resolved_id,
            real_path = %file.real_path.display(),
            bytes,
            "File sent"
        );
        Ok(sent)
    }

    async fn request_approval(&self, ctx: &CallContext) -> Result<ApprovalPromptResult> {
        let key = ctx.session_key().unwrap_or_default();
        let thread_id = self
            .registry
            .lookup(Some(key))
            .and_then(|binding| binding.thread_id)
            .ok_or_else(|| ControlError::NoSessionBinding(key.to_string()))?;

        tracing::info!(session_key = %key, thread_id = %thread_id, "Requesting remote approval");

        let prompt = approval_prompt(key);
        let timeout = self.config.approval_timeout();
        let wait = self.chat.await_approval(&thread_id, &prompt);
        let reply = match tokio::time::timeout(timeout, wait).await {
            Ok(reply) => reply?,
            Err(_) => {
                tracing::warn!(
                    session_key = %key,
                    timeout_secs = timeout.as_secs(),
                    "Approval request timed out"
                );
                return Ok(ApprovalPromptResult::TimedOut);
            }
        };

        match reply {
            ApprovalReply::Approved => {
                Ok(ApprovalPromptResult::Approved(self.registry.approve(key)))
            }
            ApprovalReply::Denied => {
                tracing::info!(session_key = %key, "Remote approval denied");
                Ok(ApprovalPromptResult::Denied)
            }
        }
    }

    async fn approve_session(&self, session_key: &str) -> ApprovalOutcome {
        self.registry.approve(session_key)
    }
}
