//! Windows backstop scheduling via `schtasks`

use async_trait::async_trait;
use chrono::{DateTime, Local};
use ephemera_host_api::{HostError, HostResult, ScheduleRequest, SchedulerBackend};
use ephemera_util::JobId;
use tracing::{debug, info};

use crate::at::round_up_to_minute;
use crate::{HostCommand, command_exists};

/// Prefix of every backstop task name
pub const TASK_NAME_PREFIX: &str = "ephemera-cleanup-";

/// Log file, in the project directory, receiving the job's output
pub const CLEANUP_LOG: &str = ".ephemera-cleanup.log";

/// Schedules the backstop as a named one-time scheduled task.
///
/// The task name doubles as the job id.
#[derive(Debug, Clone)]
pub struct SchtasksScheduler {
    program: String,
}

impl SchtasksScheduler {
    pub fn new() -> Self {
        Self {
            program: "schtasks".into(),
        }
    }

    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for SchtasksScheduler {
    fn default() -> Self {
        Self::new()
    }
}

/// `ephemera-cleanup-<unix seconds>`
pub fn task_name(now: &DateTime<Local>) -> String {
    format!("{}{}", TASK_NAME_PREFIX, now.timestamp())
}

/// `/tr` argument: run destroy in the project dir and append output to the log
pub fn task_command(request: &ScheduleRequest) -> String {
    let project = request.project_dir.display();
    format!(
        "cmd /c \"cd /d \"{project}\" && \"{exe}\" --config \"{config}\" destroy --force >> \"{project}\\{log}\" 2>&1\"",
        project = project,
        exe = request.executable.display(),
        config = request.config_path.display(),
        log = CLEANUP_LOG,
    )
}

/// Arguments for `schtasks /create`
pub fn create_args(name: &str, request: &ScheduleRequest) -> Vec<String> {
    let fire_at = round_up_to_minute(&request.expire_at);
    vec![
        "/create".into(),
        "/tn".into(),
        name.into(),
        "/tr".into(),
        task_command(request),
        "/sc".into(),
        "once".into(),
        "/st".into(),
        fire_at.format("%H:%M").to_string(),
        "/sd".into(),
        fire_at.format("%m/%d/%Y").to_string(),
        "/f".into(),
    ]
}

#[async_trait]
impl SchedulerBackend for SchtasksScheduler {
    fn name(&self) -> &'static str {
        "schtasks"
    }

    async fn schedule(&self, request: &ScheduleRequest) -> HostResult<JobId> {
        let now = ephemera_util::now();
        request.validate(now)?;

        if !command_exists(&self.program) {
            return Err(HostError::CommandNotFound(format!("'{}'", self.program)));
        }

        let name = task_name(&now);
        let output = HostCommand::new(&self.program)
            .args(create_args(&name, request))
            .output()
            .await?;

        if !output.success() {
            return Err(HostError::ScheduleFailed(format!(
                "'{}': {}",
                self.program,
                output.combined()
            )));
        }

        info!(job_id = %name, "Scheduled backstop task");
        Ok(JobId::new(name))
    }

    async fn cancel(&self, job_id: &JobId) -> HostResult<()> {
        let output = HostCommand::new(&self.program)
            .args(["/delete", "/tn", job_id.as_str(), "/f"])
            .output()
            .await?;

        if output.success() {
            debug!(job_id = %job_id, "Deleted backstop task");
            return Ok(());
        }

        let text = output.combined();
        if text.to_lowercase().contains("cannot find") {
            return Err(HostError::JobNotFound(job_id.clone()));
        }
        Err(HostError::CancelFailed(format!("task {}: {}", job_id, text)))
    }

    async fn exists(&self, job_id: &JobId) -> HostResult<bool> {
        let output = HostCommand::new(&self.program)
            .args(["/query", "/tn", job_id.as_str()])
            .output()
            .await?;
        Ok(output.success())
    }
}
