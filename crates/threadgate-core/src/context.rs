//! Caller-supplied invocation context and conversation categories.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Owner recorded for sessions whose caller did not identify a user.
pub const UNKNOWN_USER: &str = "unknown";

/// Context attached to a tool invocation.
///
/// Every field is optional and untrusted: the correlation key is only used to
/// look up a binding a human established earlier, never as a target itself.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallContext {
    /// External conversational session identifier (the correlation key).
    #[serde(default)]
    pub session_key: Option<String>,
    /// Identifier of the user driving the conversation.
    #[serde(default)]
    pub user_id: Option<String>,
}

impl CallContext {
    /// Create a context carrying only a correlation key.
    #[must_use]
    pub fn for_session(session_key: impl Into<String>) -> Self {
        Self {
            session_key: Some(session_key.into()),
            user_id: None,
        }
    }

    /// Attach a user identifier.
    #[must_use]
    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// The correlation key, if present and non-empty.
    #[must_use]
    pub fn session_key(&self) -> Option<&str> {
        self.session_key.as_deref().filter(|key| !key.is_empty())
    }

    /// The owning user, or [`UNKNOWN_USER`] when none was supplied.
    #[must_use]
    pub fn owner(&self) -> &str {
        self.user_id
            .as_deref()
            .filter(|user| !user.is_empty())
            .unwrap_or(UNKNOWN_USER)
    }
}

/// Purpose of a tracked conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentType {
    /// A free-form question thread.
    Ask,
    /// A thread bound to project work.
    Project,
}

impl AgentType {
    /// The persisted string form.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ask => "ask",
            Self::Project => "project",
        }
    }
}

impl fmt::Display for AgentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AgentType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ask" => Ok(Self::Ask),
            "project" => Ok(Self::Project),
            other => Err(CoreError::UnknownAgentType(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_session_key_is_absent() {
        let ctx = CallContext::for_session("");
        assert_eq!(ctx.session_key(), None);

        let ctx = CallContext::for_session("ses_123");
        assert_eq!(ctx.session_key(), Some("ses_123"));
    }

    #[test]
    fn owner_defaults_to_unknown() {
        assert_eq!(CallContext::default().owner(), UNKNOWN_USER);
        assert_eq!(
            CallContext::default().with_user("").owner(),
            UNKNOWN_USER
        );
        assert_eq!(CallContext::default().with_user("u-1").owner(), "u-1");
    }

    #[test]
    fn agent_type_parse() {
        assert_eq!("ask".parse::<AgentType>().unwrap(), AgentType::Ask);
        assert_eq!("project".parse::<AgentType>().unwrap(), AgentType::Project);
        assert!(matches!(
            "chat".parse::<AgentType>(),
            Err(CoreError::UnknownAgentType(_))
        ));
    }

    #[test]
    fn context_deserializes_with_missing_fields() {
        let ctx: CallContext = serde_json::from_str("{}").unwrap();
        assert_eq!(ctx, CallContext::default());

        let ctx: CallContext = serde_json::from_str(r#"{"session_key":"abc"}"#).unwrap();
        assert_eq!(ctx.session_key(), Some("abc"));
    }
}
