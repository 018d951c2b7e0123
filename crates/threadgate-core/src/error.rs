//! Common error types for threadgate.
//!
//! This module provides shared error types that are used across multiple crates.

use thiserror::Error;

/// Core errors that can occur throughout the threadgate system.
#[derive(Debug, Error)]
pub enum CoreError {
    /// An agent type string did not match a known category.
    #[error("unknown agent type: {0:?}")]
    UnknownAgentType(String),
}
