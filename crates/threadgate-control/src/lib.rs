//! Trust and resolution layer for threadgate.
//!
//! This crate decides where an agent's chat output may go and which local
//! files it may publish. Every tool call passes through the [`BridgeService`],
//! which resolves the target channel against the caller's session binding,
//! enforces remote approval, and sandboxes file reads before anything reaches
//! the chat platform.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Tool handlers (agent)                    │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       BridgeService                         │
//! │  ┌─────────────┐ ┌─────────────┐ ┌─────────────────────┐    │
//! │  │  Channel    │ │  Session    │ │    File access      │    │
//! │  │  resolver   │ │  registry   │ │    guard            │    │
//! │  └─────────────┘ └─────────────┘ └─────────────────────┘    │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!               ┌──────────────┴──────────────┐
//!               ▼                             ▼
//!        ┌──────────────┐              ┌──────────────┐
//!        │    Store     │              │  ChatClient  │
//!        │   (SQLite)   │              │  (platform)  │
//!        └──────────────┘              └──────────────┘
//! ```
//!
//! # Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use threadgate_control::{Bridge, BridgeService, NoopChatClient, ThreadgateConfig};
//! use threadgate_core::CallContext;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ThreadgateConfig::from_env()?;
//! let bridge = BridgeService::open(config, Arc::new(NoopChatClient))?;
//!
//! let ctx = CallContext::for_session("ses_abc").with_user("42");
//! bridge.send_message(None, &ctx, "build finished").await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Resolution order
//!
//! See the [`resolver`] module. In short: an explicit id the call site
//! prefers, then the session's bound thread (if approved, when approval is
//! required), then an explicit id, then the configured default channel.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod chat;
pub mod config;
pub mod error;
pub mod file_guard;
pub mod registry;
pub mod resolver;
pub mod service;

pub use chat::{ApprovalReply, ChatClient, ChatError, ChatMessage, MessageRef, NoopChatClient};
pub use config::{ConfigError, ThreadgateConfig};
pub use error::{ControlError, ErrorKind, Result};
pub use file_guard::{FileAccessError, FileAccessGuard, ValidatedFile};
pub use registry::{ApprovalOutcome, SessionRegistry};
pub use resolver::{resolve_channel, Resolution, ResolutionSource, ResolveError, ResolveOptions};
pub use service::{ApprovalPromptResult, Bridge, BridgeService, CreatedThread};

// Re-export commonly used types from dependencies for convenience
pub use threadgate_core::{AgentType, CallContext, ChannelId, ThreadId};
pub use threadgate_store::{SessionBinding, SessionRecord, SessionStore, SqliteSessionStore};
