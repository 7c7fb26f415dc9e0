//! State file parsing and validation for ephemera
//!
//! The per-project `.ephemera.toml` holds both the user's settings for
//! `new` and the environment's persisted state:
//! - Versioned schema, with legacy files migrated on load
//! - `EnvironmentRecord` and its lifecycle transitions
//! - Validation with clear error messages

mod migrate;
mod record;
mod schema;
mod validation;

pub use record::*;
pub use schema::*;
pub use validation::*;

use std::path::Path;
use thiserror::Error;
use toml::{Table, Value};

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read state file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Failed to render TOML: {0}")]
    RenderError(#[from] toml::ser::Error),

    #[error("Validation failed: {errors:?}")]
    ValidationFailed { errors: Vec<ValidationError> },

    #[error("Unsupported config version: {0}")]
    UnsupportedVersion(i64),

    #[error("config_version must be an integer")]
    MalformedVersion,
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Current supported config version
pub const CURRENT_CONFIG_VERSION: u32 = 1;

/// Load and validate a record from a TOML file
pub fn load_record(path: impl AsRef<Path>) -> ConfigResult<EnvironmentRecord> {
    let content = std::fs::read_to_string(path)?;
    parse_record(&content)
}

/// Parse and validate a record from a TOML string
pub fn parse_record(content: &str) -> ConfigResult<EnvironmentRecord> {
    let table: Table = toml::from_str(content)?;

    let table = match config_version(&table)? {
        0 => migrate::from_v0(table),
        v if v == i64::from(CURRENT_CONFIG_VERSION) => table,
        v => return Err(ConfigError::UnsupportedVersion(v)),
    };

    let raw: RawRecord = Value::Table(table).try_into()?;

    let errors = validate_record(&raw);
    if !errors.is_empty() {
        return Err(ConfigError::ValidationFailed { errors });
    }

    Ok(EnvironmentRecord::from_raw(raw))
}

/// Render a record as a current-version TOML document
pub fn render_record(record: &EnvironmentRecord) -> ConfigResult<String> {
    Ok(toml::to_string_pretty(&record.to_raw())?)
}

fn config_version(table: &Table) -> ConfigResult<i64> {
    match table.get("config_version") {
        None => Ok(0),
        Some(Value::Integer(v)) => Ok(*v),
        Some(_) => Err(ConfigError::MalformedVersion),
    }
}
