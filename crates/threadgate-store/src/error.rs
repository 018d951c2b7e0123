//! Error types for the storage layer.

use std::path::PathBuf;

use thiserror::Error;

/// A result type using `StoreError`.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The directory holding the store could not be created.
    #[error("failed to create store directory {}: {source}", path.display())]
    CreateDir {
        /// Directory that could not be created.
        path: PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },

    /// The store file could not be opened or created.
    #[error("failed to open session store {}: {source}", path.display())]
    Open {
        /// Path of the store file.
        path: PathBuf,
        /// Underlying `SQLite` failure.
        #[source]
        source: rusqlite::Error,
    },

    /// The store opened but could not be prepared: not a `SQLite` file, or the
    /// journal mode or table definitions could not be applied.
    #[error("failed to prepare session store {}: {source}", path.display())]
    Schema {
        /// Path of the store file.
        path: PathBuf,
        /// Underlying `SQLite` failure.
        #[source]
        source: rusqlite::Error,
    },

    /// A database error occurred.
    #[error("database error: {0}")]
    Database(String),

    /// A persisted row could not be decoded.
    #[error("corrupt session row: {0}")]
    Corrupt(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Database(err.to_string())
    }
}

impl StoreError {
    /// Returns true if this error means the store itself is unusable and
    /// session-dependent features must not start.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::CreateDir { .. } | Self::Open { .. } | Self::Schema { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_error_names_path_and_cause() {
        let err = StoreError::CreateDir {
            path: PathBuf::from("/nope/data"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        let message = err.to_string();
        assert!(message.contains("/nope/data"));
        assert!(message.contains("denied"));
        assert!(err.is_fatal());
        assert!(!StoreError::Database("locked".into()).is_fatal());
        assert!(!StoreError::Corrupt("agent_type".into()).is_fatal());
    }
}
