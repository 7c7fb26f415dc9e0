//! Guarded environment teardown

use chrono::{DateTime, Local};
use ephemera_config::EnvironmentRecord;
use ephemera_host_api::{Hook, SchedulerBackend, TaskRunner, cluster_params};
use ephemera_store::ConfigStore;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::{CoreError, CoreResult, cancel_quietly};

/// Result of a teardown request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TeardownOutcome {
    /// The teardown hook succeeded; `persisted` is false if the record
    /// could not be written afterwards.
    Destroyed { persisted: bool },

    /// Nothing to do: the record was not active
    AlreadyInactive,
}

/// Runs the teardown hook and applies the `active -> destroyed` transition.
///
/// Shared by the expiration check, the in-process timer and `destroy`.
/// A record that is not active is never torn down twice.
#[derive(Clone)]
pub struct Teardown {
    store: Arc<dyn ConfigStore>,
    runner: Arc<dyn TaskRunner>,
    scheduler: Option<Arc<dyn SchedulerBackend>>,
    silent: bool,
}

impl Teardown {
    pub fn new(store: Arc<dyn ConfigStore>, runner: Arc<dyn TaskRunner>) -> Self {
        Self {
            store,
            runner,
            scheduler: None,
            silent: true,
        }
    }

    /// Cancel the record's backstop job after a successful teardown
    pub fn with_scheduler(mut self, scheduler: Arc<dyn SchedulerBackend>) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    pub fn with_silent(mut self, silent: bool) -> Self {
        self.silent = silent;
        self
    }

    pub fn store(&self) -> &Arc<dyn ConfigStore> {
        &self.store
    }

    pub async fn run(
        &self,
        record: &mut EnvironmentRecord,
        now: DateTime<Local>,
    ) -> CoreResult<TeardownOutcome> {
        if !record.is_active() {
            debug!(name = %record.name, status = %record.status, "Teardown skipped, not active");
            return Ok(TeardownOutcome::AlreadyInactive);
        }

        info!(name = %record.name, "Tearing down cluster");
        let params = cluster_params(&record.name);

        match self.runner.run(Hook::Teardown, &params, self.silent).await {
            Ok(_) => {
                let job_id = record.scheduled_job_id.clone();
                record.mark_cleanup_successful(now);
                record.set_destroyed();
                let persisted = self.persist(record);

                if let (Some(scheduler), Some(job_id)) = (&self.scheduler, job_id) {
                    cancel_quietly(scheduler.as_ref(), &job_id).await;
                }

                info!(name = %record.name, persisted, "Cluster destroyed");
                Ok(TeardownOutcome::Destroyed { persisted })
            }
            Err(e) => {
                record.mark_cleanup_failed(now, &e);
                self.persist(record);
                error!(
                    name = %record.name,
                    attempts = record.cleanup_attempts,
                    error = %e,
                    "Teardown failed"
                );
                Err(CoreError::Teardown(e))
            }
        }
    }

    /// Tear down whatever the store currently holds, but only if it is still
    /// the environment created at `generation`.
    ///
    /// Used by the TTL timer, which may fire long after its copy of the record
    /// was taken.
    pub async fn run_if_current(
        &self,
        generation: Option<DateTime<Local>>,
        now: DateTime<Local>,
    ) -> CoreResult<TeardownOutcome> {
        let mut record = self.store.load()?;
        if !record.is_active() || record.created_at != generation {
            debug!(
                name = %record.name,
                status = %record.status,
                "Stored record superseded, nothing to tear down"
            );
            return Ok(TeardownOutcome::AlreadyInactive);
        }
        self.run(&mut record, now).await
    }

    /// Save the record; failures are logged and reported as `false`
    pub fn persist(&self, record: &EnvironmentRecord) -> bool {
        match self.store.save(record) {
            Ok(()) => true,
            Err(e) => {
                warn!(
                    store = %self.store.describe(),
                    error = %e,
                    "Failed to persist cluster state"
                );
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ephemera_config::EnvironmentStatus;
    use ephemera_host_api::{MockScheduler, MockTaskRunner};
    use ephemera_store::MemoryStore;
    use ephemera_util::JobId;

    fn active_record(now: DateTime<Local>) -> EnvironmentRecord {
        let mut record = EnvironmentRecord::default();
        record.set_active(now).unwrap();
        record
    }

    #[tokio::test]
    async fn test_teardown_success() {
        let now = ephemera_util::now();
        let store = Arc::new(MemoryStore::default());
        let runner = MockTaskRunner::new();
        let teardown = Teardown::new(store.clone(), Arc::new(runner.clone()));

        let mut record = active_record(now);
        let outcome = teardown.run(&mut record, now).await.unwrap();

        assert_eq!(outcome, TeardownOutcome::Destroyed { persisted: true });
        assert_eq!(record.status, EnvironmentStatus::Destroyed);
        assert_eq!(record.cleanup_attempts, 1);
        assert_eq!(record.last_cleanup_error, None);
        assert_eq!(store.snapshot(), record);

        let calls = runner.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].hook, Hook::Teardown);
        assert_eq!(calls[0].params, cluster_params("dev-cluster"));
    }

    #[tokio::test]
    async fn test_teardown_is_idempotent() {
        let now = ephemera_util::now();
        let store = Arc::new(MemoryStore::default());
        let runner = MockTaskRunner::new();
        let teardown = Teardown::new(store, Arc::new(runner.clone()));

        let mut record = active_record(now);
        teardown.run(&mut record, now).await.unwrap();
        let outcome = teardown.run(&mut record, now).await.unwrap();

        assert_eq!(outcome, TeardownOutcome::AlreadyInactive);
        assert_eq!(runner.call_count(Hook::Teardown), 1);
        assert_eq!(record.cleanup_attempts, 1);
    }

    #[tokio::test]
    async fn test_teardown_failure_is_recorded() {
        let now = ephemera_util::now();
        let store = Arc::new(MemoryStore::default());
        let runner = MockTaskRunner::new();
        runner.set_fail_teardown(true);
        let teardown = Teardown::new(store.clone(), Arc::new(runner));

        let mut record = active_record(now);
        let err = teardown.run(&mut record, now).await.unwrap_err();

        assert!(matches!(err, CoreError::Teardown(_)));
        assert!(record.is_active());
        assert_eq!(record.cleanup_attempts, 1);
        let error = record.last_cleanup_error.as_deref().unwrap();
        assert!(error.contains("Mock task failure"));
        assert_eq!(store.snapshot(), record);
    }

    #[tokio::test]
    async fn test_persist_failure_is_degraded_success() {
        let now = ephemera_util::now();
        let store = Arc::new(MemoryStore::default());
        store.set_fail_saves(true);
        let teardown = Teardown::new(store, Arc::new(MockTaskRunner::new()));

        let mut record = active_record(now);
        let outcome = teardown.run(&mut record, now).await.unwrap();

        assert_eq!(outcome, TeardownOutcome::Destroyed { persisted: false });
        assert_eq!(record.status, EnvironmentStatus::Destroyed);
    }

    #[tokio::test]
    async fn test_success_cancels_backstop_job() {
        let now = ephemera_util::now();
        let scheduler = MockScheduler::new();
        let dir = tempfile::TempDir::new().unwrap();
        let request = ephemera_host_api::ScheduleRequest::new(
            std::env::current_exe().unwrap(),
            dir.path(),
            now + chrono::Duration::minutes(5),
        );
        let job_id = scheduler.schedule(&request).await.unwrap();

        let teardown = Teardown::new(
            Arc::new(MemoryStore::default()),
            Arc::new(MockTaskRunner::new()),
        )
        .with_scheduler(Arc::new(scheduler.clone()));

        let mut record = active_record(now);
        record.set_scheduled_job(job_id.clone());
        teardown.run(&mut record, now).await.unwrap();

        assert_eq!(record.scheduled_job_id, None);
        assert_eq!(scheduler.cancelled(), vec![job_id]);
    }

    #[tokio::test]
    async fn test_missing_backstop_job_is_not_an_error() {
        let now = ephemera_util::now();
        let teardown = Teardown::new(
            Arc::new(MemoryStore::default()),
            Arc::new(MockTaskRunner::new()),
        )
        .with_scheduler(Arc::new(MockScheduler::new()));

        let mut record = active_record(now);
        record.set_scheduled_job(JobId::new("42"));
        let outcome = teardown.run(&mut record, now).await.unwrap();

        assert_eq!(outcome, TeardownOutcome::Destroyed { persisted: true });
    }

    #[tokio::test]
    async fn test_run_if_current_skips_superseded_record() {
        let now = ephemera_util::now();
        let stale = active_record(now - chrono::Duration::minutes(10));
        let current = active_record(now);
        let store = Arc::new(MemoryStore::new(current.clone()));
        let runner = MockTaskRunner::new();
        let teardown = Teardown::new(store.clone(), Arc::new(runner.clone()));

        let outcome = teardown.run_if_current(stale.created_at, now).await.unwrap();
        assert_eq!(outcome, TeardownOutcome::AlreadyInactive);
        assert_eq!(runner.call_count(Hook::Teardown), 0);

        let outcome = teardown.run_if_current(current.created_at, now).await.unwrap();
        assert_eq!(outcome, TeardownOutcome::Destroyed { persisted: true });
        assert_eq!(store.snapshot().status, EnvironmentStatus::Destroyed);
    }
}
