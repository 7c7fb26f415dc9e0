//! The persisted environment record and its lifecycle

use chrono::{DateTime, Local};
use ephemera_util::{
    JobId, ParseError, checked_add, format_datetime_full, parse_duration, saturating_since,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::schema::{DEFAULT_NAME, DEFAULT_PROVIDER, DEFAULT_TTL, RawRecord, RawState};
use crate::CURRENT_CONFIG_VERSION;

/// Lifecycle status of the project's environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvironmentStatus {
    /// No environment was ever created in this project
    #[default]
    Unset,
    Active,
    Destroyed,
}

impl EnvironmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unset => "unset",
            Self::Active => "active",
            Self::Destroyed => "destroyed",
        }
    }
}

impl fmt::Display for EnvironmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EnvironmentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "" | "unset" => Ok(Self::Unset),
            "active" => Ok(Self::Active),
            "destroyed" => Ok(Self::Destroyed),
            other => Err(other.to_string()),
        }
    }
}

/// Provisioning backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    /// Kubernetes-in-Docker
    Kind,
}

impl Provider {
    pub const SUPPORTED: &'static [&'static str] = &["kind"];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Kind => "kind",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "kind" => Ok(Self::Kind),
            other => Err(other.to_string()),
        }
    }
}

/// State of one project's environment, persisted as the single source of truth
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnvironmentRecord {
    /// Provisioning backend (validated by `new`)
    pub provider: String,

    /// TTL as written by the user, parsed on demand
    pub ttl: String,

    /// Cluster name (validated by `new`)
    pub name: String,

    /// Destroy on expiry without asking
    pub force: bool,

    pub status: EnvironmentStatus,
    pub created_at: Option<DateTime<Local>>,
    pub expires_at: Option<DateTime<Local>>,

    /// Directory holding `tasks/` and the state file
    pub project_path: Option<PathBuf>,

    /// Backstop job handle; `None` when no OS-level job is scheduled
    pub scheduled_job_id: Option<JobId>,

    pub cleanup_attempted: bool,
    pub cleanup_attempts: u32,
    pub last_cleanup_attempt: Option<DateTime<Local>>,

    /// Error text of the last failed attempt; `None` after a success
    pub last_cleanup_error: Option<String>,
}

impl Default for EnvironmentRecord {
    fn default() -> Self {
        Self {
            provider: DEFAULT_PROVIDER.into(),
            ttl: DEFAULT_TTL.into(),
            name: DEFAULT_NAME.into(),
            force: false,
            status: EnvironmentStatus::Unset,
            created_at: None,
            expires_at: None,
            project_path: None,
            scheduled_job_id: None,
            cleanup_attempted: false,
            cleanup_attempts: 0,
            last_cleanup_attempt: None,
            last_cleanup_error: None,
        }
    }
}

impl EnvironmentRecord {
    /// Convert from a raw record (after validation)
    pub fn from_raw(raw: RawRecord) -> Self {
        let or_default = |value: String, default: &str| {
            if value.trim().is_empty() {
                default.to_string()
            } else {
                value
            }
        };
        let state = raw.state;

        Self {
            provider: or_default(raw.provider, DEFAULT_PROVIDER),
            ttl: or_default(raw.ttl, DEFAULT_TTL),
            name: or_default(raw.name, DEFAULT_NAME),
            force: raw.force,
            status: state.status.parse().unwrap_or_default(),
            created_at: state.created_at,
            expires_at: state.expires_at,
            project_path: state.project_path,
            scheduled_job_id: state
                .scheduled_job_id
                .map(JobId::new)
                .filter(|id| !id.is_empty()),
            cleanup_attempted: state.cleanup_attempted,
            cleanup_attempts: state.cleanup_attempts,
            last_cleanup_attempt: state.last_cleanup_attempt,
            last_cleanup_error: state.last_cleanup_error.filter(|e| !e.is_empty()),
        }
    }

    pub fn to_raw(&self) -> RawRecord {
        let status = match self.status {
            EnvironmentStatus::Unset => String::new(),
            other => other.as_str().to_string(),
        };

        RawRecord {
            config_version: CURRENT_CONFIG_VERSION,
            provider: self.provider.clone(),
            ttl: self.ttl.clone(),
            name: self.name.clone(),
            force: self.force,
            state: RawState {
                status,
                created_at: self.created_at,
                expires_at: self.expires_at,
                project_path: self.project_path.clone(),
                scheduled_job_id: self.scheduled_job_id.as_ref().map(|id| id.to_string()),
                cleanup_attempted: self.cleanup_attempted,
                cleanup_attempts: self.cleanup_attempts,
                last_cleanup_attempt: self.last_cleanup_attempt,
                last_cleanup_error: self.last_cleanup_error.clone(),
            },
        }
    }

    pub fn parse_ttl(&self) -> Result<Duration, ParseError> {
        parse_duration(&self.ttl)
    }

    pub fn is_active(&self) -> bool {
        self.status == EnvironmentStatus::Active
    }

    /// Mark the environment active from `now` for one TTL.
    ///
    /// Resets all cleanup bookkeeping. Fails without touching the record if
    /// the TTL does not parse.
    pub fn set_active(&mut self, now: DateTime<Local>) -> Result<(), ParseError> {
        let ttl = self.parse_ttl()?;
        let expires_at = checked_add(&now, ttl)
            .ok_or_else(|| ParseError::duration(&self.ttl, "expiry out of range"))?;

        self.status = EnvironmentStatus::Active;
        self.created_at = Some(now);
        self.expires_at = Some(expires_at);
        self.cleanup_attempted = false;
        self.cleanup_attempts = 0;
        self.last_cleanup_attempt = None;
        self.last_cleanup_error = None;
        Ok(())
    }

    pub fn set_destroyed(&mut self) {
        self.status = EnvironmentStatus::Destroyed;
        self.cleanup_attempted = true;
        self.clear_scheduled_job();
    }

    /// How long the environment has been expired, or `None` if it is not
    /// active or not yet past its expiry.
    pub fn check_expiration(&self, now: DateTime<Local>) -> Option<Duration> {
        if !self.is_active() {
            return None;
        }
        let expires_at = self.expires_at?;
        if now > expires_at {
            Some(saturating_since(&now, &expires_at))
        } else {
            None
        }
    }

    pub fn is_expired(&self, now: DateTime<Local>) -> bool {
        self.check_expiration(now).is_some()
    }

    /// Time until expiry; zero when inactive or already expired.
    pub fn time_remaining(&self, now: DateTime<Local>) -> Duration {
        match (self.is_active(), self.expires_at) {
            (true, Some(expires_at)) => saturating_since(&expires_at, &now),
            _ => Duration::ZERO,
        }
    }

    pub fn mark_cleanup_attempted(&mut self, now: DateTime<Local>) {
        self.cleanup_attempted = true;
        self.last_cleanup_attempt = Some(now);
        self.cleanup_attempts = self.cleanup_attempts.saturating_add(1);
    }

    pub fn mark_cleanup_failed(&mut self, now: DateTime<Local>, error: impl fmt::Display) {
        self.mark_cleanup_attempted(now);
        self.last_cleanup_error = Some(error.to_string());
    }

    pub fn mark_cleanup_successful(&mut self, now: DateTime<Local>) {
        self.mark_cleanup_attempted(now);
        self.last_cleanup_error = None;
    }

    /// Human-readable cleanup summary for status output.
    pub fn cleanup_status(&self) -> String {
        if self.cleanup_attempts == 0 {
            return "No cleanup attempts".into();
        }

        let mut status = format!("{} attempt(s)", self.cleanup_attempts);
        if let Some(last) = &self.last_cleanup_attempt {
            status.push_str(&format!(", last: {}", format_datetime_full(last)));
        }
        if let Some(error) = &self.last_cleanup_error {
            status.push_str(&format!(", error: {}", error));
        }
        status
    }

    pub fn set_scheduled_job(&mut self, job_id: JobId) {
        self.scheduled_job_id = Some(job_id);
    }

    pub fn clear_scheduled_job(&mut self) {
        self.scheduled_job_id = None;
    }
}
