//! Mock collaborators for testing

use async_trait::async_trait;
use ephemera_util::JobId;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::{
    Confirm, HostError, HostResult, Hook, ScheduleRequest, SchedulerBackend, TaskParams,
    TaskRunner,
};

/// One recorded hook invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskCall {
    pub hook: Hook,
    pub params: TaskParams,
    pub silent: bool,
}

/// Mock task runner that records every call
#[derive(Clone, Default)]
pub struct MockTaskRunner {
    calls: Arc<Mutex<Vec<TaskCall>>>,

    /// Configure the setup hook to fail
    pub fail_setup: Arc<Mutex<bool>>,

    /// Configure the teardown hook to fail
    pub fail_teardown: Arc<Mutex<bool>>,

    /// Simulated task duration
    pub delay: Arc<Mutex<Option<Duration>>>,
}

impl MockTaskRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<TaskCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self, hook: Hook) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.hook == hook)
            .count()
    }

    pub fn set_fail_setup(&self, fail: bool) {
        *self.fail_setup.lock().unwrap() = fail;
    }

    pub fn set_fail_teardown(&self, fail: bool) {
        *self.fail_teardown.lock().unwrap() = fail;
    }

    pub fn set_delay(&self, delay: Option<Duration>) {
        *self.delay.lock().unwrap() = delay;
    }
}

#[async_trait]
impl TaskRunner for MockTaskRunner {
    async fn run(&self, hook: Hook, params: &TaskParams, silent: bool) -> HostResult<String> {
        self.calls.lock().unwrap().push(TaskCall {
            hook,
            params: params.clone(),
            silent,
        });

        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let fail = match hook {
            Hook::Setup => *self.fail_setup.lock().unwrap(),
            Hook::Teardown => *self.fail_teardown.lock().unwrap(),
        };
        if fail {
            return Err(HostError::TaskFailed {
                task: format!("hook:{}", hook),
                status: "exit status: 1".into(),
                output: "Mock task failure".into(),
            });
        }

        Ok(format!("hook:{} ok", hook))
    }
}

/// Mock OS scheduler keeping jobs in memory
#[derive(Clone)]
pub struct MockScheduler {
    next_id: Arc<AtomicU64>,
    jobs: Arc<Mutex<HashMap<JobId, ScheduleRequest>>>,
    cancelled: Arc<Mutex<Vec<JobId>>>,

    /// Configure schedule to fail
    pub fail_schedule: Arc<Mutex<bool>>,

    /// Configure cancel to fail (other than "not found")
    pub fail_cancel: Arc<Mutex<bool>>,

    /// Accept jobs but drop them immediately, so `exists` reports false
    pub lose_jobs: Arc<Mutex<bool>>,

    /// Simulated time spent talking to the OS scheduler per call
    pub delay: Arc<Mutex<Option<Duration>>>,
}

impl MockScheduler {
    pub fn new() -> Self {
        Self {
            next_id: Arc::new(AtomicU64::new(1)),
            jobs: Arc::new(Mutex::new(HashMap::new())),
            cancelled: Arc::new(Mutex::new(Vec::new())),
            fail_schedule: Arc::new(Mutex::new(false)),
            fail_cancel: Arc::new(Mutex::new(false)),
            lose_jobs: Arc::new(Mutex::new(false)),
            delay: Arc::new(Mutex::new(None)),
        }
    }

    /// Pending jobs
    pub fn pending(&self) -> Vec<(JobId, ScheduleRequest)> {
        self.jobs
            .lock()
            .unwrap()
            .iter()
            .map(|(id, req)| (id.clone(), req.clone()))
            .collect()
    }

    pub fn cancelled(&self) -> Vec<JobId> {
        self.cancelled.lock().unwrap().clone()
    }

    /// Simulate the OS running (and consuming) a job
    pub fn fire(&self, job_id: &JobId) -> Option<ScheduleRequest> {
        self.jobs.lock().unwrap().remove(job_id)
    }

    pub fn set_fail_schedule(&self, fail: bool) {
        *self.fail_schedule.lock().unwrap() = fail;
    }

    pub fn set_fail_cancel(&self, fail: bool) {
        *self.fail_cancel.lock().unwrap() = fail;
    }

    pub fn set_lose_jobs(&self, lose: bool) {
        *self.lose_jobs.lock().unwrap() = lose;
    }

    pub fn set_delay(&self, delay: Option<Duration>) {
        *self.delay.lock().unwrap() = delay;
    }

    async fn simulate_latency(&self) {
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }
}

impl Default for MockScheduler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SchedulerBackend for MockScheduler {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn schedule(&self, request: &ScheduleRequest) -> HostResult<JobId> {
        request.validate(ephemera_util::now())?;
        self.simulate_latency().await;

        if *self.fail_schedule.lock().unwrap() {
            return Err(HostError::ScheduleFailed("Mock schedule failure".into()));
        }

        let job_id = JobId::new(self.next_id.fetch_add(1, Ordering::SeqCst).to_string());
        if !*self.lose_jobs.lock().unwrap() {
            self.jobs
                .lock()
                .unwrap()
                .insert(job_id.clone(), request.clone());
        }
        Ok(job_id)
    }

    async fn cancel(&self, job_id: &JobId) -> HostResult<()> {
        if *self.fail_cancel.lock().unwrap() {
            return Err(HostError::CancelFailed("Mock cancel failure".into()));
        }

        match self.jobs.lock().unwrap().remove(job_id) {
            Some(_) => {
                self.cancelled.lock().unwrap().push(job_id.clone());
                Ok(())
            }
            None => Err(HostError::JobNotFound(job_id.clone())),
        }
    }

    async fn exists(&self, job_id: &JobId) -> HostResult<bool> {
        self.simulate_latency().await;
        Ok(self.jobs.lock().unwrap().contains_key(job_id))
    }
}

/// Confirmation prompt with scripted answers
///
/// Answers are consumed in order. `None` simulates a missing terminal.
/// Once the script runs out every question is declined.
#[derive(Clone, Default)]
pub struct ScriptedConfirm {
    answers: Arc<Mutex<VecDeque<Option<bool>>>>,
    asked: Arc<Mutex<Vec<(String, String)>>>,
}

impl ScriptedConfirm {
    pub fn new(answers: impl IntoIterator<Item = Option<bool>>) -> Self {
        Self {
            answers: Arc::new(Mutex::new(answers.into_iter().collect())),
            asked: Arc::default(),
        }
    }

    /// Always answer `answer`
    pub fn always(answer: bool) -> Self {
        Self::new(std::iter::repeat_n(Some(answer), 64))
    }

    /// Questions asked so far, as `(title, message)`
    pub fn asked(&self) -> Vec<(String, String)> {
        self.asked.lock().unwrap().clone()
    }
}

#[async_trait]
impl Confirm for ScriptedConfirm {
    async fn ask(&self, title: &str, message: &str) -> HostResult<bool> {
        self.asked
            .lock()
            .unwrap()
            .push((title.to_string(), message.to_string()));

        match self.answers.lock().unwrap().pop_front() {
            Some(Some(answer)) => Ok(answer),
            Some(None) => Err(HostError::NoTerminal),
            None => Ok(false),
        }
    }
}
