//! Host collaborator traits

use async_trait::async_trait;
use ephemera_util::JobId;
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

use crate::ScheduleRequest;

/// Errors from host collaborators
#[derive(Debug, Error)]
pub enum HostError {
    #[error("Task '{task}' failed ({status}): {output}")]
    TaskFailed {
        task: String,
        status: String,
        output: String,
    },

    #[error("No taskfile found under {0}")]
    TaskfileMissing(PathBuf),

    #[error("Task '{task}' timed out after {after}")]
    Timeout { task: String, after: String },

    #[error("Command not found: {0}")]
    CommandNotFound(String),

    #[error("Invalid schedule: {0}")]
    InvalidSchedule(String),

    #[error("Scheduling failed: {0}")]
    ScheduleFailed(String),

    #[error("Could not find a job id in scheduler output: {0}")]
    JobIdUnparseable(String),

    #[error("Scheduled job {0} not found")]
    JobNotFound(JobId),

    #[error("Cancel failed: {0}")]
    CancelFailed(String),

    #[error("Scheduler query failed: {0}")]
    QueryFailed(String),

    #[error("Unsupported operating system: {0}")]
    UnsupportedPlatform(String),

    #[error("No interactive terminal available for confirmation")]
    NoTerminal,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type HostResult<T> = Result<T, HostError>;

/// Lifecycle hooks of the external task runner
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Hook {
    /// Provision the environment
    Setup,
    /// Destroy the environment
    Teardown,
}

impl Hook {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Setup => "setup",
            Self::Teardown => "teardown",
        }
    }
}

impl fmt::Display for Hook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parameters passed to a hook, e.g. `CLUSTER_NAME`
pub type TaskParams = BTreeMap<String, String>;

/// Parameter carrying the cluster name to every hook
pub const CLUSTER_NAME_PARAM: &str = "CLUSTER_NAME";

/// Build the standard parameter set for a cluster
pub fn cluster_params(name: &str) -> TaskParams {
    TaskParams::from([(CLUSTER_NAME_PARAM.to_string(), name.to_string())])
}

/// Runs provisioning and destruction hooks
///
/// Blocks (asynchronously) until the external process completes. Returns
/// the captured output on success.
#[async_trait]
pub trait TaskRunner: Send + Sync {
    async fn run(&self, hook: Hook, params: &TaskParams, silent: bool) -> HostResult<String>;
}

/// Fire-once OS-level job that re-invokes `destroy --force` at a given time
///
/// Job identifiers are opaque and must round-trip through
/// `schedule → exists → cancel` untouched.
#[async_trait]
pub trait SchedulerBackend: Send + Sync {
    /// Short name for logs and status output
    fn name(&self) -> &'static str;

    /// Schedule the job. Checks the request's preconditions and schedules
    /// nothing if any fails.
    async fn schedule(&self, request: &ScheduleRequest) -> HostResult<JobId>;

    /// Remove the job. A job that already ran or was removed yields
    /// `HostError::JobNotFound`.
    async fn cancel(&self, job_id: &JobId) -> HostResult<()>;

    /// Whether the job is still pending
    async fn exists(&self, job_id: &JobId) -> HostResult<bool>;
}

/// Interactive yes/no confirmation
#[async_trait]
pub trait Confirm: Send + Sync {
    async fn ask(&self, title: &str, message: &str) -> HostResult<bool>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hook_names() {
        assert_eq!(Hook::Setup.to_string(), "setup");
        assert_eq!(Hook::Teardown.as_str(), "teardown");
    }

    #[test]
    fn cluster_params_carry_name() {
        let params = cluster_params("dev-cluster");
        assert_eq!(params.get(CLUSTER_NAME_PARAM).map(String::as_str), Some("dev-cluster"));
        assert_eq!(params.len(), 1);
    }
}
