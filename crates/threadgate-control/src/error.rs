//! Error types for the service layer.
//!
//! [`ControlError`] wraps every lower-level error a bridge operation can
//! surface, so tool handlers can match on one type.

use thiserror::Error;
use threadgate_store::StoreError;

use crate::chat::ChatError;
use crate::file_guard::FileAccessError;
use crate::resolver::ResolveError;

/// A result type using `ControlError`.
pub type Result<T> = std::result::Result<T, ControlError>;

/// Coarse classification of a [`ControlError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Blocked by approval policy or missing target.
    Policy,
    /// Blocked by the file sandbox.
    Security,
    /// Storage or platform failure.
    Infrastructure,
}

/// Errors that can occur in bridge operations.
#[derive(Debug, Error)]
pub enum ControlError {
    /// Channel resolution was refused.
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    /// A file read was refused.
    #[error(transparent)]
    FileAccess(#[from] FileAccessError),

    /// Storage layer error.
    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    /// Chat platform error.
    #[error(transparent)]
    Chat(#[from] ChatError),

    /// The operation needs a session bound to a thread and none was found.
    #[error("no thread is bound to session {0}")]
    NoSessionBinding(String),
}

impl ControlError {
    /// Classify the error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Resolve(_) | Self::NoSessionBinding(_) => ErrorKind::Policy,
            Self::FileAccess(_) => ErrorKind::Security,
            Self::Store(_) | Self::Chat(_) => ErrorKind::Infrastructure,
        }
    }

    /// Returns true if this error might be resolved by retrying.
    ///
    /// Store errors retry only when transient: an unusable store or a corrupt
    /// row fails the same way every time.
    #[must_use]
    pub const fn is_retriable(&self) -> bool {
        match self {
            Self::Store(err) => !err.is_fatal() && !matches!(err, StoreError::Corrupt(_)),
            Self::Chat(err) => err.is_retriable(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use threadgate_core::ChannelId;

    #[test]
    fn error_kinds() {
        let not_approved: ControlError = ResolveError::NotApproved {
            session_key: "ses_a".into(),
        }
        .into();
        assert_eq!(not_approved.kind(), ErrorKind::Policy);

        let outside: ControlError = FileAccessError::OutsideSandbox {
            real_path: PathBuf::from("/etc/passwd"),
        }
        .into();
        assert_eq!(outside.kind(), ErrorKind::Security);

        let chat: ControlError = ChatError::NotFound(ChannelId::parse("1").unwrap()).into();
        assert_eq!(chat.kind(), ErrorKind::Infrastructure);
    }

    #[test]
    fn retriable_errors() {
        assert!(ControlError::from(StoreError::Database("locked".into())).is_retriable());
        assert!(ControlError::from(ChatError::Transport("reset".into())).is_retriable());
        assert!(!ControlError::from(ChatError::Rejected("no".into())).is_retriable());
        assert!(!ControlError::from(ResolveError::Unresolvable).is_retriable());
        assert!(!ControlError::NoSessionBinding("ses_a".into()).is_retriable());
    }

    #[test]
    fn fatal_and_corrupt_store_errors_do_not_retry() {
        let open = StoreError::CreateDir {
            path: PathBuf::from("/nope"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        let err = ControlError::from(open);
        assert_eq!(err.kind(), ErrorKind::Infrastructure);
        assert!(!err.is_retriable());

        assert!(!ControlError::from(StoreError::Corrupt("bad agent_type".into())).is_retriable());
    }

    #[test]
    fn policy_messages_pass_through() {
        let err = ControlError::from(ResolveError::NotApproved {
            session_key: "ses_a".into(),
        });
        assert!(err.to_string().starts_with("session ses_a is not approved"));
    }
}
