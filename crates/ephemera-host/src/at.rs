//! POSIX backstop scheduling via `at`

use async_trait::async_trait;
use chrono::{DateTime, Local, Timelike};
use ephemera_host_api::{HostError, HostResult, ScheduleRequest, SchedulerBackend};
use ephemera_util::{JobId, format_datetime_full};
use std::borrow::Cow;
use tracing::{debug, info};

use crate::{HostCommand, command_exists};

/// Syslog tag of the backstop job's output
pub const LOGGER_TAG: &str = "ephemera-cleanup";

/// Schedules the backstop as a one-shot `at` job
#[derive(Debug, Clone)]
pub struct AtScheduler {
    at: String,
    atq: String,
    atrm: String,
}

impl AtScheduler {
    pub fn new() -> Self {
        Self {
            at: "at".into(),
            atq: "atq".into(),
            atrm: "atrm".into(),
        }
    }

    /// Use different `at`, `atq` and `atrm` binaries
    pub fn with_programs(
        at: impl Into<String>,
        atq: impl Into<String>,
        atrm: impl Into<String>,
    ) -> Self {
        Self {
            at: at.into(),
            atq: atq.into(),
            atrm: atrm.into(),
        }
    }
}

impl Default for AtScheduler {
    fn default() -> Self {
        Self::new()
    }
}

/// `at` time spec (`HH:MM MM/DD/YY`), rounded up to the next whole minute
/// so the job never fires before `expire_at`.
pub fn at_time_spec(expire_at: &DateTime<Local>) -> String {
    round_up_to_minute(expire_at)
        .format("%H:%M %m/%d/%y")
        .to_string()
}

pub(crate) fn round_up_to_minute(dt: &DateTime<Local>) -> DateTime<Local> {
    if dt.second() == 0 && dt.nanosecond() == 0 {
        return *dt;
    }
    let past_minute = chrono::Duration::seconds(i64::from(dt.second()))
        + chrono::Duration::nanoseconds(i64::from(dt.nanosecond()));
    *dt - past_minute + chrono::Duration::minutes(1)
}

/// Shell script fed to `at` on stdin
pub fn at_job_script(request: &ScheduleRequest) -> String {
    let quote = |s: Cow<'_, str>| shell_escape::unix::escape(s).into_owned();
    format!(
        "cd {} && {} --config {} destroy --force 2>&1 | logger -t {}",
        quote(request.project_dir.to_string_lossy()),
        quote(request.executable.to_string_lossy()),
        quote(request.config_path.to_string_lossy()),
        LOGGER_TAG
    )
}

/// Job number from `at`'s confirmation, e.g. `job 42 at Thu Dec 25 14:05:00 2025`
pub fn parse_at_job_id(output: &str) -> Option<JobId> {
    output.lines().find_map(|line| {
        let rest = line.trim().strip_prefix("job ")?;
        let token = rest.split_whitespace().next()?;
        token.parse::<u64>().ok().map(|_| JobId::new(token))
    })
}

/// Whether `atq` output lists `job_id` (first column, exact match)
pub fn atq_lists(output: &str, job_id: &JobId) -> bool {
    output
        .lines()
        .filter_map(|line| line.split_whitespace().next())
        .any(|id| id == job_id.as_str())
}

#[async_trait]
impl SchedulerBackend for AtScheduler {
    fn name(&self) -> &'static str {
        "at"
    }

    async fn schedule(&self, request: &ScheduleRequest) -> HostResult<JobId> {
        request.validate(ephemera_util::now())?;

        if !command_exists(&self.at) {
            return Err(HostError::CommandNotFound(format!(
                "'{}' (required for background cleanup)",
                self.at
            )));
        }

        let time_spec = at_time_spec(&request.expire_at);
        let output = HostCommand::new(&self.at)
            .arg(&time_spec)
            .stdin(at_job_script(request))
            .output()
            .await?;

        if !output.success() {
            return Err(HostError::ScheduleFailed(format!(
                "'{}' at time {}: {}",
                self.at,
                time_spec,
                output.combined()
            )));
        }

        // `at` reports the job on stderr
        let combined = output.combined();
        let job_id =
            parse_at_job_id(&combined).ok_or_else(|| HostError::JobIdUnparseable(combined.clone()))?;

        info!(
            job_id = %job_id,
            fires_at = %format_datetime_full(&request.expire_at),
            "Scheduled backstop job"
        );
        Ok(job_id)
    }

    async fn cancel(&self, job_id: &JobId) -> HostResult<()> {
        let output = HostCommand::new(&self.atrm)
            .arg(job_id.as_str())
            .output()
            .await?;

        if output.success() {
            debug!(job_id = %job_id, "Cancelled backstop job");
            return Ok(());
        }

        let text = output.combined();
        let lower = text.to_lowercase();
        if lower.contains("cannot find") || lower.contains("does not exist") {
            return Err(HostError::JobNotFound(job_id.clone()));
        }
        Err(HostError::CancelFailed(format!("job {}: {}", job_id, text)))
    }

    async fn exists(&self, job_id: &JobId) -> HostResult<bool> {
        let output = HostCommand::new(&self.atq).output().await?;
        if !output.success() {
            return Err(HostError::QueryFailed(format!(
                "'{}': {}",
                self.atq,
                output.combined()
            )));
        }
        Ok(atq_lists(&output.stdout, job_id))
    }
}
