//! Error types for value parsing

use thiserror::Error;

/// Errors produced while parsing names and durations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("name must not be empty")]
    EmptyName,

    #[error("name too long (max {max} characters): {name}")]
    NameTooLong { name: String, max: usize },

    #[error(
        "invalid name '{0}': must start and end with alphanumeric, contain only lowercase letters, numbers, and hyphens"
    )]
    InvalidName(String),

    #[error("invalid duration '{input}': {reason} (examples: 5m, 1h, 90s)")]
    InvalidDuration { input: String, reason: String },
}

impl ParseError {
    pub fn duration(input: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidDuration {
            input: input.into(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ParseError>;
