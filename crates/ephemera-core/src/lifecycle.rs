//! `new` and `destroy` flows

use chrono::{DateTime, Local};
use ephemera_config::{EnvironmentRecord, ValidationError, validate_new};
use ephemera_host_api::{Hook, TaskRunner, cluster_params};
use ephemera_store::ConfigStore;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

use crate::{Backstop, CoreError, CoreResult, Teardown, TeardownOutcome, TtlTimer};

/// Settings for a new environment, after CLI and file values are merged
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewEnvironment {
    pub provider: String,
    pub ttl: String,
    pub name: String,
    pub force: bool,
    pub project_dir: PathBuf,
}

/// Creates environments with both cleanup mechanisms armed, and destroys them
/// on request
pub struct Provisioner {
    store: Arc<dyn ConfigStore>,
    runner: Arc<dyn TaskRunner>,
    backstop: Backstop,
    teardown: Teardown,
    silent: bool,
}

impl Provisioner {
    pub fn new(
        store: Arc<dyn ConfigStore>,
        runner: Arc<dyn TaskRunner>,
        backstop: Backstop,
        silent: bool,
    ) -> Self {
        let teardown = Teardown::new(store.clone(), runner.clone())
            .with_scheduler(backstop.scheduler().clone())
            .with_silent(silent);
        Self {
            store,
            runner,
            backstop,
            teardown,
            silent,
        }
    }

    pub fn teardown(&self) -> &Teardown {
        &self.teardown
    }

    pub fn backstop(&self) -> &Backstop {
        &self.backstop
    }

    /// Provision a new environment and arm its cleanup.
    ///
    /// Settings are validated before anything runs. Once the setup hook has
    /// succeeded the environment only stays up if the backstop job is
    /// scheduled and verified and the record is saved; otherwise it is torn
    /// down again and the error returned.
    pub async fn create(
        &self,
        record: &mut EnvironmentRecord,
        request: NewEnvironment,
    ) -> CoreResult<TtlTimer> {
        let settings = validate_new(&request.provider, &request.ttl, &request.name)
            .map_err(CoreError::Validation)?;

        if record.is_active() {
            return Err(CoreError::AlreadyActive {
                name: record.name.clone(),
                expires_at: record.expires_at.unwrap_or_else(ephemera_util::now),
            });
        }

        record.provider = settings.provider.as_str().to_string();
        record.ttl = request.ttl.trim().to_string();
        record.name = settings.name.as_str().to_string();
        record.force = request.force;
        record.project_path = Some(request.project_dir);

        info!(
            name = %record.name,
            provider = %record.provider,
            ttl = %record.ttl,
            "Provisioning cluster"
        );
        self.runner
            .run(Hook::Setup, &cluster_params(&record.name), self.silent)
            .await
            .map_err(CoreError::Setup)?;

        // The TTL runs from the moment the cluster is up
        let now = ephemera_util::now();
        record
            .set_active(now)
            .map_err(|e| CoreError::Validation(vec![ValidationError::InvalidTtl(e)]))?;

        if let Err(e) = self.backstop.arm(record, now).await {
            error!(name = %record.name, error = %e, "No cleanup backstop, rolling back");
            self.roll_back(record, now).await;
            return Err(e);
        }

        if let Err(e) = self.store.save(record) {
            error!(name = %record.name, error = %e, "Failed to save state, rolling back");
            self.roll_back(record, now).await;
            return Err(CoreError::Store(e));
        }

        let timer = TtlTimer::start(self.teardown.clone(), record, ephemera_util::now())?;
        info!(
            name = %record.name,
            expires_at = %timer.fires_at(),
            "Cluster created"
        );
        Ok(timer)
    }

    /// Destroy an active environment immediately, bypassing its TTL.
    ///
    /// The backstop job is cancelled once the teardown has succeeded, so a
    /// failed teardown keeps its backstop.
    pub async fn destroy_now(
        &self,
        record: &mut EnvironmentRecord,
        now: DateTime<Local>,
    ) -> CoreResult<TeardownOutcome> {
        if !record.is_active() {
            return Err(CoreError::NotActive);
        }
        self.teardown.run(record, now).await
    }

    async fn roll_back(&self, record: &mut EnvironmentRecord, now: DateTime<Local>) {
        self.backstop.disarm(record).await;
        if let Err(e) = self.teardown.run(record, now).await {
            error!(
                name = %record.name,
                error = %e,
                "Rollback teardown failed, cluster may still be running"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ephemera_config::EnvironmentStatus;
    use ephemera_host_api::{HostError, MockScheduler, MockTaskRunner};
    use ephemera_store::MemoryStore;
    use std::time::Duration;
    use tempfile::TempDir;

    struct Harness {
        dir: TempDir,
        store: Arc<MemoryStore>,
        runner: MockTaskRunner,
        scheduler: MockScheduler,
        provisioner: Provisioner,
    }

    fn harness() -> Harness {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(MemoryStore::default());
        let runner = MockTaskRunner::new();
        let scheduler = MockScheduler::new();
        let backstop = Backstop::new(
            Arc::new(scheduler.clone()),
            std::env::current_exe().unwrap(),
        );
        let provisioner =
            Provisioner::new(store.clone(), Arc::new(runner.clone()), backstop, true);
        Harness {
            dir,
            store,
            runner,
            scheduler,
            provisioner,
        }
    }

    fn request(h: &Harness, ttl: &str) -> NewEnvironment {
        NewEnvironment {
            provider: "kind".into(),
            ttl: ttl.into(),
            name: "test-cluster".into(),
            force: true,
            project_dir: h.dir.path().to_path_buf(),
        }
    }

    #[tokio::test]
    async fn test_create_arms_both_mechanisms() {
        let h = harness();
        let mut record = EnvironmentRecord::default();

        let timer = h
            .provisioner
            .create(&mut record, request(&h, "10m"))
            .await
            .unwrap();

        assert!(record.is_active());
        assert_eq!(record.name, "test-cluster");
        assert!(record.force);
        assert_eq!(timer.fires_at(), record.expires_at.unwrap());

        let pending = h.scheduler.pending();
        assert_eq!(pending.len(), 1);
        assert_eq!(record.scheduled_job_id, Some(pending[0].0.clone()));
        assert_eq!(pending[0].1.expire_at, record.expires_at.unwrap());
        assert_eq!(pending[0].1.project_dir, h.dir.path());

        assert_eq!(h.store.snapshot(), record);
        assert_eq!(h.runner.call_count(Hook::Setup), 1);
    }

    #[tokio::test]
    async fn test_timer_counts_from_activation() {
        let h = harness();
        h.scheduler.set_delay(Some(Duration::from_millis(300)));
        let mut record = EnvironmentRecord::default();
        let started = tokio::time::Instant::now();

        let timer = h
            .provisioner
            .create(&mut record, request(&h, "10m"))
            .await
            .unwrap();

        // Arming took ~600ms; none of it is added on top of the TTL.
        assert!(started.elapsed() >= Duration::from_millis(600));
        let ttl = Duration::from_secs(600);
        assert!(timer.deadline() < started + ttl + Duration::from_millis(300));
    }

    #[tokio::test]
    async fn test_invalid_settings_run_nothing() {
        let h = harness();
        let mut record = EnvironmentRecord::default();
        let before = record.clone();

        let mut bad = request(&h, "1m");
        bad.name = "BAD".into();
        let err = h.provisioner.create(&mut record, bad).await.unwrap_err();

        match err {
            CoreError::Validation(errors) => assert_eq!(errors.len(), 2),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(record, before);
        assert!(h.runner.calls().is_empty());
        assert_eq!(h.store.save_count(), 0);
    }

    #[tokio::test]
    async fn test_refuses_to_overwrite_live_cluster() {
        let h = harness();
        let mut record = EnvironmentRecord::default();
        h.provisioner
            .create(&mut record, request(&h, "10m"))
            .await
            .unwrap();

        let err = h
            .provisioner
            .create(&mut record, request(&h, "10m"))
            .await
            .unwrap_err();

        assert!(matches!(err, CoreError::AlreadyActive { .. }));
        assert_eq!(h.runner.call_count(Hook::Setup), 1);
    }

    #[tokio::test]
    async fn test_setup_failure_leaves_nothing_active() {
        let h = harness();
        h.runner.set_fail_setup(true);
        let mut record = EnvironmentRecord::default();

        let err = h
            .provisioner
            .create(&mut record, request(&h, "10m"))
            .await
            .unwrap_err();

        assert!(matches!(err, CoreError::Setup(_)));
        assert!(!record.is_active());
        assert!(h.scheduler.pending().is_empty());
        assert_eq!(h.store.save_count(), 0);
    }

    #[tokio::test]
    async fn test_schedule_failure_rolls_back() {
        let h = harness();
        h.scheduler.set_fail_schedule(true);
        let mut record = EnvironmentRecord::default();

        let err = h
            .provisioner
            .create(&mut record, request(&h, "10m"))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            CoreError::Scheduling(HostError::ScheduleFailed(_))
        ));
        assert_eq!(h.runner.call_count(Hook::Teardown), 1);
        assert_eq!(record.status, EnvironmentStatus::Destroyed);
        assert_eq!(record.cleanup_attempts, 1);
        assert_eq!(h.store.snapshot().status, EnvironmentStatus::Destroyed);
    }

    #[tokio::test]
    async fn test_unverified_backstop_rolls_back() {
        let h = harness();
        h.scheduler.set_lose_jobs(true);
        let mut record = EnvironmentRecord::default();

        let err = h
            .provisioner
            .create(&mut record, request(&h, "10m"))
            .await
            .unwrap_err();

        assert!(matches!(err, CoreError::BackstopMissing(_)));
        assert_eq!(record.status, EnvironmentStatus::Destroyed);
        assert_eq!(record.scheduled_job_id, None);
    }

    #[tokio::test]
    async fn test_save_failure_rolls_back() {
        let h = harness();
        h.store.set_fail_saves(true);
        let mut record = EnvironmentRecord::default();

        let err = h
            .provisioner
            .create(&mut record, request(&h, "10m"))
            .await
            .unwrap_err();

        assert!(matches!(err, CoreError::Store(_)));
        assert_eq!(h.runner.call_count(Hook::Teardown), 1);
        assert!(h.scheduler.pending().is_empty());
    }

    #[tokio::test]
    async fn test_destroy_now_cancels_backstop() {
        let h = harness();
        let mut record = EnvironmentRecord::default();
        h.provisioner
            .create(&mut record, request(&h, "10m"))
            .await
            .unwrap();
        let job_id = record.scheduled_job_id.clone().unwrap();

        let outcome = h
            .provisioner
            .destroy_now(&mut record, ephemera_util::now())
            .await
            .unwrap();

        assert_eq!(outcome, TeardownOutcome::Destroyed { persisted: true });
        assert_eq!(h.scheduler.cancelled(), vec![job_id]);
        assert_eq!(record.scheduled_job_id, None);
        assert_eq!(h.store.snapshot().status, EnvironmentStatus::Destroyed);
    }

    #[tokio::test]
    async fn test_failed_destroy_keeps_backstop() {
        let h = harness();
        let mut record = EnvironmentRecord::default();
        h.provisioner
            .create(&mut record, request(&h, "10m"))
            .await
            .unwrap();
        h.runner.set_fail_teardown(true);

        let err = h
            .provisioner
            .destroy_now(&mut record, ephemera_util::now())
            .await
            .unwrap_err();

        assert!(matches!(err, CoreError::Teardown(_)));
        assert!(record.scheduled_job_id.is_some());
        assert_eq!(h.scheduler.pending().len(), 1);
    }

    #[tokio::test]
    async fn test_destroy_now_requires_active() {
        let h = harness();
        let mut record = EnvironmentRecord::default();

        let err = h
            .provisioner
            .destroy_now(&mut record, ephemera_util::now())
            .await
            .unwrap_err();

        assert!(matches!(err, CoreError::NotActive));
        assert!(h.runner.calls().is_empty());
    }
}
