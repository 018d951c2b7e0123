//! Chat platform client abstraction.
//!
//! The service talks to the chat platform only through [`ChatClient`], so
//! tests and local runs can substitute their own implementation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use threadgate_core::{ChannelId, ThreadId};

/// Errors reported by a chat client.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChatError {
    /// The platform could not be reached or returned a transient failure.
    #[error("chat transport error: {0}")]
    Transport(String),

    /// The channel or thread does not exist or is not visible.
    #[error("channel not found: {0}")]
    NotFound(ChannelId),

    /// The platform refused the request.
    #[error("chat platform rejected the request: {0}")]
    Rejected(String),
}

impl ChatError {
    /// Returns true if retrying the request might succeed.
    #[must_use]
    pub const fn is_retriable(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

/// Reference to a posted message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRef {
    /// Channel the message was posted to.
    pub channel_id: ChannelId,
    /// Platform message id.
    pub message_id: String,
}

/// A message read back from channel history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Platform message id.
    pub id: String,
    /// Display name of the author.
    pub author: String,
    /// Message text.
    pub content: String,
    /// When the message was posted.
    pub timestamp: DateTime<Utc>,
}

/// A human's answer to an approval prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalReply {
    /// The session may post remotely.
    Approved,
    /// The request was refused.
    Denied,
}

/// Trait for chat platform communication.
#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Post a text message.
    ///
    /// # Errors
    ///
    /// Returns an error if the platform rejects or cannot receive the message.
    async fn send_message(
        &self,
        channel: &ChannelId,
        content: &str,
    ) -> Result<MessageRef, ChatError>;

    /// Create a thread under `parent` and return its id.
    ///
    /// # Errors
    ///
    /// Returns an error if the thread cannot be created.
    async fn create_thread(&self, parent: &ChannelId, name: &str) -> Result<ThreadId, ChatError>;

    /// Rename a thread.
    ///
    /// # Errors
    ///
    /// Returns an error if the thread cannot be renamed.
    async fn rename_thread(&self, thread: &ThreadId, name: &str) -> Result<(), ChatError>;

    /// Fetch up to `limit` recent messages, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if history cannot be read.
    async fn fetch_messages(
        &self,
        channel: &ChannelId,
        limit: u8,
    ) -> Result<Vec<ChatMessage>, ChatError>;

    /// Upload a file with an optional caption.
    ///
    /// # Errors
    ///
    /// Returns an error if the upload fails.
    async fn send_file(
        &self,
        channel: &ChannelId,
        file_name: &str,
        data: Vec<u8>,
        caption: Option<&str>,
    ) -> Result<MessageRef, ChatError>;

    /// Post an interactive approval prompt and wait for a human to answer.
    ///
    /// Implementations may wait indefinitely; callers bound the wait.
    ///
    /// # Errors
    ///
    /// Returns an error if the prompt cannot be posted.
    async fn await_approval(
        &self,
        channel: &ChannelId,
        prompt: &str,
    ) -> Result<ApprovalReply, ChatError>;
}

/// A no-op chat client for running without a chat platform.
///
/// Every call logs a warning and returns a placeholder. Approval prompts are
/// always denied.
#[derive(Debug, Clone, Default)]
pub struct NoopChatClient;

#[async_trait]
impl ChatClient for NoopChatClient {
    async fn send_message(
        &self,
        channel: &ChannelId,
        content: &str,
    ) -> Result<MessageRef, ChatError> {
        tracing::warn!(
            channel_id = %channel,
            len = content.len(),
            "NoopChatClient: send_message called"
        );
        Ok(MessageRef {
            channel_id: channel.clone(),
            message_id: "noop".to_string(),
        })
    }

    async fn create_thread(&self, parent: &ChannelId, name: &str) -> Result<ThreadId, ChatError> {
        tracing::warn!(parent_id = %parent, name, "NoopChatClient: create_thread called");
        Ok(parent.clone())
    }

    async fn rename_thread(&self, thread: &ThreadId, name: &str) -> Result<(), ChatError> {
        tracing::warn!(thread_id = %thread, name, "NoopChatClient: rename_thread called");
        Ok(())
    }

    async fn fetch_messages(
        &self,
        channel: &ChannelId,
        limit: u8,
    ) -> Result<Vec<ChatMessage>, ChatError> {
        tracing::warn!(channel_id = %channel, limit, "NoopChatClient: fetch_messages called");
        Ok(Vec::new())
    }

    async fn send_file(
        &self,
        channel: &ChannelId,
        file_name: &str,
        data: Vec<u8>,
        _caption: Option<&str>,
    ) -> Result<MessageRef, ChatError> {
        tracing::warn!(
            channel_id = %channel,
            file_name,
            bytes = data.len(),
            "NoopChatClient: send_file called"
        );
        Ok(MessageRef {
            channel_id: channel.clone(),
            message_id: "noop".to_string(),
        })
    }

    async fn await_approval(
        &self,
        channel: &ChannelId,
        _prompt: &str,
    ) -> Result<ApprovalReply, ChatError> {
        tracing::warn!(channel_id = %channel, "NoopChatClient: await_approval called, denying");
        Ok(ApprovalReply::Denied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_transport_errors_retry() {
        assert!(ChatError::Transport("timeout".into()).is_retriable());
        assert!(!ChatError::Rejected("missing permissions".into()).is_retriable());
        assert!(!ChatError::NotFound(ChannelId::parse("1").unwrap()).is_retriable());
    }

    #[test]
    fn approval_reply_serialization() {
        assert_eq!(serde_json::to_string(&ApprovalReply::Approved).unwrap(), "\"approved\"");
        let reply: ApprovalReply = serde_json::from_str("\"denied\"").unwrap();
        assert_eq!(reply, ApprovalReply::Denied);
    }

    #[tokio::test]
    async fn noop_client_returns_placeholders() {
        let client = NoopChatClient;
        let channel = ChannelId::parse("100").unwrap();

        let sent = client.send_message(&channel, "hi").await.unwrap();
        assert_eq!(sent.channel_id, channel);
        assert!(client.fetch_messages(&channel, 10).await.unwrap().is_empty());
        assert_eq!(
            client.await_approval(&channel, "ok?").await.unwrap(),
            ApprovalReply::Denied
        );
    }
}
