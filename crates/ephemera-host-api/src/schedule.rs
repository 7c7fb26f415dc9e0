//! Backstop job requests

use chrono::{DateTime, Local};
use ephemera_util::{CONFIG_FILENAME, format_datetime_full};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::{HostError, HostResult};

/// Earliest a backstop job may fire, relative to now
pub const MIN_SCHEDULE_LEAD: Duration = Duration::from_secs(60);

/// A request to run `<executable> --config <config_path> destroy --force`
/// in `project_dir` at `expire_at`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleRequest {
    pub executable: PathBuf,
    pub project_dir: PathBuf,
    pub config_path: PathBuf,
    pub expire_at: DateTime<Local>,
}

impl ScheduleRequest {
    pub fn new(
        executable: impl Into<PathBuf>,
        project_dir: impl Into<PathBuf>,
        expire_at: DateTime<Local>,
    ) -> Self {
        let project_dir = project_dir.into();
        Self {
            executable: executable.into(),
            config_path: project_dir.join(CONFIG_FILENAME),
            project_dir,
            expire_at,
        }
    }

    /// State file the job destroys, when it is not `.ephemera.toml` in the
    /// project directory
    pub fn with_config_path(mut self, config_path: impl Into<PathBuf>) -> Self {
        self.config_path = config_path.into();
        self
    }

    /// Check the scheduling preconditions, in order: the one-minute floor,
    /// the executable, then the project directory.
    pub fn validate(&self, now: DateTime<Local>) -> HostResult<()> {
        let lead = self.expire_at.signed_duration_since(now);
        if lead.num_milliseconds() < MIN_SCHEDULE_LEAD.as_millis() as i64 {
            return Err(HostError::InvalidSchedule(format!(
                "expiration time {} is less than one minute in the future",
                format_datetime_full(&self.expire_at)
            )));
        }

        check_executable(&self.executable)?;

        if !self.project_dir.is_dir() {
            return Err(HostError::InvalidSchedule(format!(
                "project directory does not exist: {}",
                self.project_dir.display()
            )));
        }

        Ok(())
    }
}

fn check_executable(path: &Path) -> HostResult<()> {
    let metadata = std::fs::metadata(path).map_err(|_| {
        HostError::InvalidSchedule(format!("executable not found: {}", path.display()))
    })?;

    if !metadata.is_file() {
        return Err(HostError::InvalidSchedule(format!(
            "executable is not a file: {}",
            path.display()
        )));
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if metadata.permissions().mode() & 0o111 == 0 {
            return Err(HostError::InvalidSchedule(format!(
                "file is not executable: {}",
                path.display()
            )));
        }
    }

    Ok(())
}
