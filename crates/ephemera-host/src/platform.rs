//! Host platform selection

use async_trait::async_trait;
use ephemera_host_api::{HostError, HostResult, ScheduleRequest, SchedulerBackend};
use ephemera_util::JobId;
use std::path::PathBuf;
use std::sync::Arc;

use crate::{AtScheduler, SchtasksScheduler};

/// Scheduler for hosts with neither `at` nor `schtasks`
#[derive(Debug, Clone)]
pub struct UnsupportedScheduler {
    os: String,
}

impl UnsupportedScheduler {
    pub fn new(os: impl Into<String>) -> Self {
        Self { os: os.into() }
    }

    fn error(&self) -> HostError {
        HostError::UnsupportedPlatform(self.os.clone())
    }
}

#[async_trait]
impl SchedulerBackend for UnsupportedScheduler {
    fn name(&self) -> &'static str {
        "unsupported"
    }

    async fn schedule(&self, _request: &ScheduleRequest) -> HostResult<JobId> {
        Err(self.error())
    }

    async fn cancel(&self, _job_id: &JobId) -> HostResult<()> {
        Err(self.error())
    }

    async fn exists(&self, _job_id: &JobId) -> HostResult<bool> {
        Err(self.error())
    }
}

/// The backstop scheduler for the current host
pub fn host_scheduler() -> Arc<dyn SchedulerBackend> {
    if cfg!(windows) {
        Arc::new(SchtasksScheduler::new())
    } else if cfg!(unix) {
        Arc::new(AtScheduler::new())
    } else {
        Arc::new(UnsupportedScheduler::new(std::env::consts::OS))
    }
}

/// Absolute path of the running executable, which the backstop re-invokes
pub fn self_executable() -> HostResult<PathBuf> {
    let exe = std::env::current_exe()?;
    Ok(exe.canonicalize().unwrap_or(exe))
}
