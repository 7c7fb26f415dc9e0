//! Validation of user settings and loaded state

use ephemera_util::{ClusterName, ParseError, format_duration, parse_duration};
use std::time::Duration;
use thiserror::Error;

use crate::record::{EnvironmentStatus, Provider};
use crate::schema::RawRecord;

/// Shortest TTL accepted by `new`.
///
/// The TTL starts once setup finishes, and the backstop job scheduled right
/// after needs an expiry more than a minute out.
pub const MIN_TTL: Duration = Duration::from_secs(61);

/// Validation error
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Invalid TTL: {0}")]
    InvalidTtl(ParseError),

    #[error("TTL '{value}' is shorter than the minimum of {min}")]
    TtlTooShort { value: String, min: String },

    #[error("Invalid name: {0}")]
    InvalidName(ParseError),

    #[error("Unsupported provider '{0}' (supported: {supported})", supported = Provider::SUPPORTED.join(", "))]
    UnsupportedProvider(String),

    #[error("Unknown status '{0}' (expected active or destroyed)")]
    UnknownStatus(String),

    #[error("Active environment is missing '{0}'")]
    MissingTimestamp(&'static str),

    #[error("expires_at precedes created_at")]
    ExpiresBeforeCreated,
}

/// Settings for a new environment, all checked
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSettings {
    pub provider: Provider,
    pub ttl: Duration,
    pub name: ClusterName,
}

pub fn validate_ttl(ttl: &str) -> Result<Duration, ValidationError> {
    let duration = parse_duration(ttl).map_err(ValidationError::InvalidTtl)?;
    if duration < MIN_TTL {
        return Err(ValidationError::TtlTooShort {
            value: ttl.to_string(),
            min: format_duration(MIN_TTL),
        });
    }
    Ok(duration)
}

pub fn validate_name(name: &str) -> Result<ClusterName, ValidationError> {
    ClusterName::parse(name).map_err(ValidationError::InvalidName)
}

pub fn validate_provider(provider: &str) -> Result<Provider, ValidationError> {
    provider
        .parse()
        .map_err(|_| ValidationError::UnsupportedProvider(provider.to_string()))
}

/// Check everything `new` needs at once, reporting every problem.
pub fn validate_new(
    provider: &str,
    ttl: &str,
    name: &str,
) -> Result<NewSettings, Vec<ValidationError>> {
    let provider = validate_provider(provider);
    let ttl = validate_ttl(ttl);
    let name = validate_name(name);

    match (provider, ttl, name) {
        (Ok(provider), Ok(ttl), Ok(name)) => Ok(NewSettings {
            provider,
            ttl,
            name,
        }),
        (provider, ttl, name) => Err([provider.err(), ttl.err(), name.err()]
            .into_iter()
            .flatten()
            .collect()),
    }
}

/// Validate a loaded record's state.
///
/// TTL, name and provider are checked by `new`, not on load.
pub fn validate_record(raw: &RawRecord) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    let status = match raw.state.status.parse::<EnvironmentStatus>() {
        Ok(status) => status,
        Err(_) => {
            errors.push(ValidationError::UnknownStatus(raw.state.status.clone()));
            return errors;
        }
    };

    if status == EnvironmentStatus::Active {
        match (&raw.state.created_at, &raw.state.expires_at) {
            (None, _) => errors.push(ValidationError::MissingTimestamp("created_at")),
            (_, None) => errors.push(ValidationError::MissingTimestamp("expires_at")),
            (Some(created), Some(expires)) if expires < created => {
                errors.push(ValidationError::ExpiresBeforeCreated)
            }
            _ => {}
        }
    }

    errors
}
