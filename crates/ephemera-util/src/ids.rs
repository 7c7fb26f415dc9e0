//! Strongly-typed identifiers for ephemera

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::ParseError;

/// Maximum length of a DNS label
pub const MAX_NAME_LEN: usize = 63;

/// A DNS-label-compatible cluster name
///
/// Lowercase ASCII letters, digits and hyphens, at most 63 characters,
/// starting and ending with an alphanumeric character.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ClusterName(String);

impl ClusterName {
    pub fn parse(name: &str) -> Result<Self, ParseError> {
        if name.is_empty() {
            return Err(ParseError::EmptyName);
        }
        if name.len() > MAX_NAME_LEN {
            return Err(ParseError::NameTooLong {
                name: name.to_string(),
                max: MAX_NAME_LEN,
            });
        }

        let bytes = name.as_bytes();
        let alnum = |b: u8| b.is_ascii_lowercase() || b.is_ascii_digit();
        let first_last_ok = alnum(bytes[0]) && alnum(bytes[bytes.len() - 1]);
        let body_ok = bytes.iter().all(|&b| alnum(b) || b == b'-');

        if !first_last_ok || !body_ok {
            return Err(ParseError::InvalidName(name.to_string()));
        }

        Ok(Self(name.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClusterName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for ClusterName {
    type Error = ParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<ClusterName> for String {
    fn from(name: ClusterName) -> Self {
        name.0
    }
}

/// Opaque handle of an OS-level scheduled job
///
/// `at` job numbers on POSIX, task names on Windows. Never interpreted
/// outside the scheduler backend that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for JobId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for JobId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}
