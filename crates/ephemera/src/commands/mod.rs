//! Command implementations and the shared context they run in

pub mod destroy;
pub mod new;
pub mod status;

use anyhow::{Context, Result, anyhow};
use ephemera_config::{EnvironmentRecord, Provider};
use ephemera_core::{Backstop, ExpirationOrchestrator, ExpirationOutcome, Provisioner, Teardown};
use ephemera_host::{TaskfileRunner, TerminalConfirm, host_scheduler, self_executable};
use ephemera_host_api::{Confirm, SchedulerBackend, TaskRunner};
use ephemera_store::{ConfigStore, TomlFileStore};
use ephemera_util::{format_clock_time, format_duration};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// Environment kinds accepted as the optional positional argument
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Noun {
    K8s,
}

pub fn parse_noun(input: &str) -> Result<Noun, String> {
    match input {
        "k8s" | "kubernetes" => Ok(Noun::K8s),
        other => Err(format!(
            "unsupported environment type: {} (only k8s is currently supported)",
            other
        )),
    }
}

/// Everything a command needs: the state file and the host collaborators
pub struct App {
    store: Arc<TomlFileStore>,
    scheduler: Arc<dyn SchedulerBackend>,
    confirm: Arc<dyn Confirm>,
    task_timeout: Option<Duration>,
    silent: bool,
    verbose: bool,
}

impl App {
    pub fn new(
        config: PathBuf,
        task_timeout: Option<Duration>,
        silent: bool,
        verbose: bool,
    ) -> Self {
        Self {
            store: Arc::new(TomlFileStore::new(config)),
            scheduler: host_scheduler(),
            confirm: Arc::new(TerminalConfirm::new()),
            task_timeout,
            silent,
            verbose,
        }
    }

    pub fn store(&self) -> &Arc<TomlFileStore> {
        &self.store
    }

    pub fn verbose(&self) -> bool {
        self.verbose
    }

    pub fn confirm(&self) -> &Arc<dyn Confirm> {
        &self.confirm
    }

    pub fn project_dir(&self) -> PathBuf {
        self.store.project_dir()
    }

    pub fn load(&self) -> Result<EnvironmentRecord> {
        self.store
            .load()
            .with_context(|| format!("Failed to load {}", self.store.path().display()))
    }

    fn runner(&self, record: &EnvironmentRecord, provider: Provider) -> Arc<dyn TaskRunner> {
        let project_dir = record
            .project_path
            .clone()
            .unwrap_or_else(|| self.project_dir());
        Arc::new(TaskfileRunner::new(project_dir, provider).with_timeout(self.task_timeout))
    }

    pub fn provider_of(record: &EnvironmentRecord) -> Result<Provider> {
        record
            .provider
            .parse()
            .map_err(|p| anyhow!("Unsupported provider '{}' in state file", p))
    }

    pub fn backstop(&self) -> Result<Backstop> {
        let executable = self_executable().context("Cannot locate the ephemera executable")?;
        Ok(Backstop::new(self.scheduler.clone(), executable)
            .with_config_path(self.store.absolute_path()))
    }

    pub fn teardown(&self, record: &EnvironmentRecord) -> Result<Teardown> {
        let runner = self.runner(record, Self::provider_of(record)?);
        Ok(Teardown::new(self.store.clone(), runner)
            .with_scheduler(self.scheduler.clone())
            .with_silent(self.silent))
    }

    pub fn provisioner(
        &self,
        record: &EnvironmentRecord,
        provider: Provider,
    ) -> Result<Provisioner> {
        Ok(Provisioner::new(
            self.store.clone(),
            self.runner(record, provider),
            self.backstop()?,
            self.silent,
        ))
    }

    /// Run the expiration check and report what it did.
    ///
    /// Failures are printed as warnings; the calling command carries on.
    pub async fn check_expiration(&self, record: &mut EnvironmentRecord, assume_force: bool) {
        if !record.is_active() {
            return;
        }
        let teardown = match self.teardown(record) {
            Ok(teardown) => teardown,
            Err(e) => {
                eprintln!("Warning: expiration check failed: {:#}", e);
                return;
            }
        };
        let orchestrator = ExpirationOrchestrator::new(teardown, self.confirm.clone())
            .with_assume_force(assume_force);

        match orchestrator.check_and_handle(record, ephemera_util::now()).await {
            Ok(ExpirationOutcome::NotDue) => {}
            Ok(ExpirationOutcome::Destroyed {
                expired_for,
                persisted,
            }) => {
                println!(
                    "Cluster '{}' expired {} ago and has been destroyed.",
                    record.name,
                    format_duration(expired_for)
                );
                if !persisted {
                    println!("Warning: destroyed, but failed to update the local state file.");
                }
            }
            Ok(ExpirationOutcome::Declined { persisted, .. }) => {
                println!("Cleanup cancelled. Cluster remains active.");
                if !persisted {
                    println!("Warning: failed to record the declined cleanup.");
                }
            }
            Ok(ExpirationOutcome::Exhausted {
                expired_for,
                next_retry_at,
                ..
            }) => match next_retry_at {
                Some(at) => println!(
                    "Cluster '{}' expired {} ago. Next cleanup attempt after {}.",
                    record.name,
                    format_duration(expired_for),
                    format_clock_time(&at)
                ),
                None => println!(
                    "Cluster '{}' expired {} ago and automatic cleanup has given up ({}). \
                     Run `ephemera destroy` to remove it.",
                    record.name,
                    format_duration(expired_for),
                    record.cleanup_status()
                ),
            },
            Err(e) => {
                warn!(error = %e, "Expiration check failed");
                eprintln!("Warning: expiration check failed: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_noun() {
        assert_eq!(parse_noun("k8s"), Ok(Noun::K8s));
        assert_eq!(parse_noun("kubernetes"), Ok(Noun::K8s));
        assert!(parse_noun("nomad").unwrap_err().contains("only k8s"));
    }
}
