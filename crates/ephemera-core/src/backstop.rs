//! Record-level bridge to the OS backstop job

use chrono::{DateTime, Local};
use ephemera_config::EnvironmentRecord;
use ephemera_host_api::{HostError, ScheduleRequest, SchedulerBackend};
use ephemera_util::JobId;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::{CoreError, CoreResult};

/// Arms and disarms the OS-level job that re-runs `destroy --force` at expiry
#[derive(Clone)]
pub struct Backstop {
    scheduler: Arc<dyn SchedulerBackend>,
    executable: PathBuf,
    config_path: Option<PathBuf>,
}

impl Backstop {
    pub fn new(scheduler: Arc<dyn SchedulerBackend>, executable: impl Into<PathBuf>) -> Self {
        Self {
            scheduler,
            executable: executable.into(),
            config_path: None,
        }
    }

    /// State file the job is pointed at. Without one, the job uses
    /// `.ephemera.toml` in the record's project directory.
    pub fn with_config_path(mut self, config_path: impl Into<PathBuf>) -> Self {
        self.config_path = Some(config_path.into());
        self
    }

    pub fn scheduler(&self) -> &Arc<dyn SchedulerBackend> {
        &self.scheduler
    }

    /// Schedule a backstop job for the record's expiry and verify it exists.
    ///
    /// Any job already on the record is cancelled first. On error the record
    /// is left without a job id, and precondition failures leave it untouched.
    pub async fn arm(
        &self,
        record: &mut EnvironmentRecord,
        now: DateTime<Local>,
    ) -> CoreResult<JobId> {
        if !record.is_active() {
            return Err(CoreError::NotActive);
        }
        let request = self.request_for(record)?;
        request.validate(now).map_err(CoreError::Scheduling)?;

        self.disarm(record).await;

        let job_id = self
            .scheduler
            .schedule(&request)
            .await
            .map_err(CoreError::Scheduling)?;

        match self.scheduler.exists(&job_id).await {
            Ok(true) => {
                info!(
                    job_id = %job_id,
                    scheduler = self.scheduler.name(),
                    expire_at = %request.expire_at,
                    "Backstop cleanup job scheduled"
                );
                record.set_scheduled_job(job_id.clone());
                Ok(job_id)
            }
            Ok(false) => {
                warn!(job_id = %job_id, "Backstop job vanished right after scheduling");
                Err(CoreError::BackstopMissing(job_id))
            }
            Err(e) => {
                cancel_quietly(self.scheduler.as_ref(), &job_id).await;
                Err(CoreError::Scheduling(e))
            }
        }
    }

    /// Cancel the record's job, if any. Never fails.
    pub async fn disarm(&self, record: &mut EnvironmentRecord) {
        if let Some(job_id) = record.scheduled_job_id.take() {
            cancel_quietly(self.scheduler.as_ref(), &job_id).await;
        }
    }

    /// Whether the record's job is still queued
    pub async fn is_armed(&self, record: &EnvironmentRecord) -> CoreResult<bool> {
        match &record.scheduled_job_id {
            Some(job_id) => self
                .scheduler
                .exists(job_id)
                .await
                .map_err(CoreError::Scheduling),
            None => Ok(false),
        }
    }

    fn request_for(&self, record: &EnvironmentRecord) -> CoreResult<ScheduleRequest> {
        let expire_at = record.expires_at.ok_or_else(|| {
            CoreError::Scheduling(HostError::InvalidSchedule("record has no expiry".into()))
        })?;
        let project_dir = record.project_path.clone().ok_or_else(|| {
            CoreError::Scheduling(HostError::InvalidSchedule(
                "record has no project directory".into(),
            ))
        })?;
        let request = ScheduleRequest::new(&self.executable, project_dir, expire_at);
        Ok(match &self.config_path {
            Some(path) => request.with_config_path(path),
            None => request,
        })
    }
}

/// Cancel a job, treating "already gone" as success and logging anything else.
pub async fn cancel_quietly(scheduler: &dyn SchedulerBackend, job_id: &JobId) {
    if job_id.is_empty() {
        return;
    }
    match scheduler.cancel(job_id).await {
        Ok(()) => debug!(job_id = %job_id, "Cancelled backstop job"),
        Err(HostError::JobNotFound(_)) => {
            debug!(job_id = %job_id, "Backstop job already gone");
        }
        Err(e) => warn!(job_id = %job_id, error = %e, "Failed to cancel backstop job"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ephemera_host_api::MockScheduler;
    use tempfile::TempDir;

    fn setup(ttl: &str, now: DateTime<Local>) -> (TempDir, EnvironmentRecord) {
        let dir = TempDir::new().unwrap();
        let mut record = EnvironmentRecord {
            ttl: ttl.into(),
            project_path: Some(dir.path().to_path_buf()),
            ..Default::default()
        };
        record.set_active(now).unwrap();
        (dir, record)
    }

    fn backstop(scheduler: &MockScheduler) -> Backstop {
        Backstop::new(Arc::new(scheduler.clone()), std::env::current_exe().unwrap())
    }

    #[tokio::test]
    async fn test_arm_records_job() {
        let scheduler = MockScheduler::new();
        let now = ephemera_util::now();
        let (_dir, mut record) = setup("5m", now);

        let job_id = backstop(&scheduler).arm(&mut record, now).await.unwrap();

        assert_eq!(record.scheduled_job_id, Some(job_id));
        assert!(backstop(&scheduler).is_armed(&record).await.unwrap());
    }

    #[tokio::test]
    async fn test_arm_below_floor_leaves_record_untouched() {
        let scheduler = MockScheduler::new();
        let now = ephemera_util::now();
        let (_dir, mut record) = setup("30s", now);
        record.set_scheduled_job(JobId::new("old"));

        let err = backstop(&scheduler).arm(&mut record, now).await.unwrap_err();

        assert!(matches!(err, CoreError::Scheduling(HostError::InvalidSchedule(_))));
        assert_eq!(record.scheduled_job_id, Some(JobId::new("old")));
        assert!(scheduler.pending().is_empty());
    }

    #[tokio::test]
    async fn test_rearm_cancels_previous_job() {
        let scheduler = MockScheduler::new();
        let now = ephemera_util::now();
        let (_dir, mut record) = setup("5m", now);
        let backstop = backstop(&scheduler);

        let first = backstop.arm(&mut record, now).await.unwrap();
        let second = backstop.arm(&mut record, now).await.unwrap();

        assert_ne!(first, second);
        assert_eq!(scheduler.cancelled(), vec![first]);
        assert_eq!(scheduler.pending().len(), 1);
    }

    #[tokio::test]
    async fn test_lost_job_is_hard_failure() {
        let scheduler = MockScheduler::new();
        scheduler.set_lose_jobs(true);
        let now = ephemera_util::now();
        let (_dir, mut record) = setup("5m", now);

        let err = backstop(&scheduler).arm(&mut record, now).await.unwrap_err();

        assert!(matches!(err, CoreError::BackstopMissing(_)));
        assert_eq!(record.scheduled_job_id, None);
    }

    #[tokio::test]
    async fn test_job_targets_configured_state_file() {
        let scheduler = MockScheduler::new();
        let now = ephemera_util::now();
        let (dir, mut record) = setup("5m", now);
        let staging = dir.path().join("staging.toml");

        let job_id = backstop(&scheduler)
            .with_config_path(&staging)
            .arm(&mut record, now)
            .await
            .unwrap();

        let request = scheduler.fire(&job_id).unwrap();
        assert_eq!(request.config_path, staging);
        assert_eq!(request.project_dir, dir.path());
    }

    #[tokio::test]
    async fn test_job_defaults_to_project_state_file() {
        let scheduler = MockScheduler::new();
        let now = ephemera_util::now();
        let (dir, mut record) = setup("5m", now);

        let job_id = backstop(&scheduler).arm(&mut record, now).await.unwrap();

        let request = scheduler.fire(&job_id).unwrap();
        assert_eq!(request.config_path, dir.path().join(ephemera_util::CONFIG_FILENAME));
    }

    #[tokio::test]
    async fn test_disarm_tolerates_consumed_job() {
        let scheduler = MockScheduler::new();
        let now = ephemera_util::now();
        let (_dir, mut record) = setup("5m", now);
        let backstop = backstop(&scheduler);

        let job_id = backstop.arm(&mut record, now).await.unwrap();
        scheduler.fire(&job_id);
        backstop.disarm(&mut record).await;

        assert_eq!(record.scheduled_job_id, None);
        assert!(!backstop.is_armed(&record).await.unwrap());
    }
}
