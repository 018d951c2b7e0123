//! Core types and utilities for threadgate.
//!
//! This crate provides the foundational types shared by the session store and
//! the policy layer:
//!
//! - **Identifiers**: session record IDs and chat-platform channel IDs
//! - **Call context**: the untrusted, optional context attached to a tool call
//! - **Error types**: common error definitions shared across crates
//!
//! # Example
//!
//! ```
//! use threadgate_core::{CallContext, ChannelId, SessionRecordId};
//!
//! let channel = ChannelId::parse("1180553207781130300").unwrap();
//! let record = SessionRecordId::generate();
//! let ctx = CallContext::for_session("ses_abc").with_user("42");
//!
//! assert_eq!(ctx.session_key(), Some("ses_abc"));
//! # let _ = (channel, record);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod context;
pub mod error;
pub mod ids;

pub use context::{AgentType, CallContext, UNKNOWN_USER};
pub use error::CoreError;
pub use ids::{ChannelId, IdError, SessionRecordId, ThreadId};
