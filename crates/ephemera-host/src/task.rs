//! Taskfile-based task runner

use async_trait::async_trait;
use ephemera_config::Provider;
use ephemera_host_api::{HostError, HostResult, Hook, TaskParams, TaskRunner};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

use crate::{HostCommand, command_exists};

/// Default program used to run hooks
pub const TASK_PROGRAM: &str = "task";

/// Default limit for a single hook invocation
pub const DEFAULT_TASK_TIMEOUT: Duration = Duration::from_secs(30 * 60);

const TASKS_DIR: &str = "tasks";
const K8S_TASKFILE: &str = "Taskfile.k8s.yaml";
const LEGACY_TASKFILE: &str = "Taskfile.new.yaml";

/// Which taskfile a project uses
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Taskfile {
    /// Provider taskfile exposing `hook:setup` / `hook:teardown`
    Hooks(PathBuf),
    /// Older shared taskfile with provider-prefixed teardown tasks
    Legacy(PathBuf),
}

impl Taskfile {
    /// Locate the taskfile for `provider` under `project_dir/tasks`
    pub fn resolve(project_dir: &Path, provider: Provider) -> HostResult<Self> {
        let tasks = project_dir.join(TASKS_DIR);
        let primary = match provider {
            Provider::Kind => tasks.join(K8S_TASKFILE),
        };
        if primary.is_file() {
            return Ok(Self::Hooks(primary));
        }

        let legacy = tasks.join(LEGACY_TASKFILE);
        if legacy.is_file() {
            debug!(path = %legacy.display(), "Using legacy taskfile");
            return Ok(Self::Legacy(legacy));
        }

        Err(HostError::TaskfileMissing(tasks))
    }

    pub fn path(&self) -> &Path {
        match self {
            Self::Hooks(p) | Self::Legacy(p) => p,
        }
    }

    /// Task name implementing `hook`
    pub fn task_name(&self, hook: Hook, provider: Provider) -> String {
        match (self, hook, provider) {
            (Self::Legacy(_), Hook::Teardown, Provider::Kind) => "kind:destroy".into(),
            (_, hook, _) => format!("hook:{}", hook),
        }
    }
}

/// Runs hooks through the `task` binary in a project directory
#[derive(Debug, Clone)]
pub struct TaskfileRunner {
    project_dir: PathBuf,
    provider: Provider,
    timeout: Option<Duration>,
    program: String,
}

impl TaskfileRunner {
    pub fn new(project_dir: impl Into<PathBuf>, provider: Provider) -> Self {
        Self {
            project_dir: project_dir.into(),
            provider,
            timeout: Some(DEFAULT_TASK_TIMEOUT),
            program: TASK_PROGRAM.into(),
        }
    }

    /// `None` disables the timeout
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Use a different task binary
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    pub fn project_dir(&self) -> &Path {
        &self.project_dir
    }

    /// The command that would run `hook`
    pub fn command(&self, hook: Hook, params: &TaskParams, silent: bool) -> HostResult<HostCommand> {
        let taskfile = Taskfile::resolve(&self.project_dir, self.provider)?;
        let task_name = taskfile.task_name(hook, self.provider);

        let mut cmd = HostCommand::new(&self.program)
            .arg("-t")
            .arg(taskfile.path().to_string_lossy());
        if silent {
            cmd = cmd.arg("--silent");
        }
        cmd = cmd
            .arg(task_name)
            .args(params.iter().map(|(k, v)| format!("{}={}", k, v)));

        Ok(cmd
            .current_dir(&self.project_dir)
            .timeout(self.timeout)
            .inherit_output(!silent))
    }
}

#[async_trait]
impl TaskRunner for TaskfileRunner {
    async fn run(&self, hook: Hook, params: &TaskParams, silent: bool) -> HostResult<String> {
        if !command_exists(&self.program) {
            return Err(HostError::CommandNotFound(format!(
                "{} (install: https://taskfile.dev/installation/)",
                self.program
            )));
        }

        let cmd = self.command(hook, params, silent)?;
        info!(hook = %hook, command = %cmd.display(), "Running task");

        let output = cmd.output().await?;
        if !output.success() {
            return Err(HostError::TaskFailed {
                task: cmd.display(),
                status: output.status.to_string(),
                output: output.combined(),
            });
        }

        Ok(output.combined())
    }
}
