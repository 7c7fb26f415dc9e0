//! Raw state file schema (as parsed from TOML)

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub const DEFAULT_PROVIDER: &str = "kind";
pub const DEFAULT_TTL: &str = "5m";
pub const DEFAULT_NAME: &str = "dev-cluster";

/// Raw state file as parsed from TOML, after migration to the current version
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawRecord {
    /// Schema version
    pub config_version: u32,

    /// Provisioning backend
    #[serde(default = "default_provider")]
    pub provider: String,

    /// Time-to-live, e.g. `5m` or `1h30m`
    #[serde(default = "default_ttl")]
    pub ttl: String,

    /// Cluster name (DNS label)
    #[serde(default = "default_name")]
    pub name: String,

    /// Destroy on expiry without asking
    #[serde(default)]
    pub force: bool,

    /// Environment state, written by ephemera itself
    #[serde(default)]
    pub state: RawState,
}

/// `[state]` table
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawState {
    /// `active`, `destroyed`, or empty
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub status: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Local>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Local>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_path: Option<PathBuf>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduled_job_id: Option<String>,

    #[serde(default)]
    pub cleanup_attempted: bool,

    #[serde(default)]
    pub cleanup_attempts: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_cleanup_attempt: Option<DateTime<Local>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_cleanup_error: Option<String>,
}

fn default_provider() -> String {
    DEFAULT_PROVIDER.into()
}

fn default_ttl() -> String {
    DEFAULT_TTL.into()
}

fn default_name() -> String {
    DEFAULT_NAME.into()
}
