//! `ephemera new`

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Local};
use clap::Args;
use ephemera_config::{EnvironmentRecord, validate_new};
use ephemera_core::{CoreError, NewEnvironment, TeardownOutcome, TtlTimer};
use ephemera_store::ConfigStore;
use ephemera_util::{format_clock_time, format_duration};
use std::io::{IsTerminal, Write};
use std::time::Duration;
use tracing::warn;

use super::{App, Noun, parse_noun};
use crate::render;

const WATCH_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Args, Debug)]
pub struct NewArgs {
    /// Environment type
    #[arg(value_parser = parse_noun)]
    pub noun: Option<Noun>,

    /// Time to live (e.g. 5m, 1h30m)
    #[arg(short, long, env = "EPHEMERA_NEW_TTL")]
    pub ttl: Option<String>,

    /// Cluster name
    #[arg(short, long, env = "EPHEMERA_NEW_NAME")]
    pub name: Option<String>,

    /// Infrastructure provider
    #[arg(short, long, env = "EPHEMERA_NEW_PROVIDER")]
    pub provider: Option<String>,

    /// Destroy on expiry without asking (saved in the state file)
    #[arg(short, long, env = "EPHEMERA_NEW_FORCE")]
    pub force: bool,

    /// Start from default settings instead of the state file's
    #[arg(long)]
    pub reset: bool,

    /// Return once the cluster is up and leave cleanup to the backstop job
    #[arg(long)]
    pub detach: bool,
}

/// Merge flags over the state file's settings (or the defaults with `--reset`)
pub fn resolve_request(
    app: &App,
    record: &EnvironmentRecord,
    args: &NewArgs,
) -> NewEnvironment {
    let base = if args.reset {
        EnvironmentRecord::default()
    } else {
        record.clone()
    };
    NewEnvironment {
        provider: args.provider.clone().unwrap_or(base.provider),
        ttl: args.ttl.clone().unwrap_or(base.ttl),
        name: args.name.clone().unwrap_or(base.name),
        force: args.force || base.force,
        project_dir: app.project_dir(),
    }
}

pub async fn run(app: &App, args: NewArgs) -> Result<()> {
    let mut record = app.load()?;
    app.check_expiration(&mut record, false).await;

    let request = resolve_request(app, &record, &args);
    let settings = validate_new(&request.provider, &request.ttl, &request.name)
        .map_err(CoreError::Validation)?;

    println!(
        "Creating cluster '{}' (provider: {}, TTL: {})",
        settings.name,
        settings.provider,
        format_duration(settings.ttl)
    );

    let provisioner = app.provisioner(&record, settings.provider)?;
    let timer = provisioner
        .create(&mut record, request)
        .await
        .context("Failed to create cluster")?;

    println!();
    println!("Cluster '{}' created.", record.name);
    println!("{:<15} {}", "EXPIRES AT:", format_clock_time(&timer.fires_at()));
    if let Some(project) = &record.project_path {
        println!("{:<15} {}", "PROJECT PATH:", project.display());
    }
    if let Some(job_id) = &record.scheduled_job_id {
        println!("{:<15} {}", "BACKSTOP JOB:", job_id);
    }

    if args.detach {
        println!(
            "\nDetached. The backstop job will destroy the cluster at {}.",
            format_clock_time(&timer.fires_at())
        );
        return Ok(());
    }

    println!("\nWatching until the TTL runs out. Press Ctrl+C to detach.");
    watch(app, timer).await
}

async fn watch(app: &App, timer: TtlTimer) -> Result<()> {
    let fires_at = timer.fires_at();
    let interactive = std::io::stdout().is_terminal();
    let mut ticker = tokio::time::interval(WATCH_INTERVAL);
    let finished = timer.wait();
    tokio::pin!(finished);

    loop {
        tokio::select! {
            result = &mut finished => {
                if interactive {
                    println!();
                }
                return match result {
                    Some(Ok(TeardownOutcome::Destroyed { persisted })) => {
                        println!("TTL reached. Cluster destroyed.");
                        if !persisted {
                            println!("Warning: destroyed, but failed to update the local state file.");
                        }
                        Ok(())
                    }
                    Some(Ok(TeardownOutcome::AlreadyInactive)) => {
                        println!("TTL reached. Cluster was already cleaned up.");
                        Ok(())
                    }
                    Some(Err(e)) => Err(e).context(
                        "TTL cleanup failed; the backstop job will retry",
                    ),
                    None => bail!("TTL timer stopped unexpectedly"),
                };
            }
            _ = tokio::signal::ctrl_c() => {
                println!(
                    "\nDetached. The backstop job will destroy the cluster at {}.",
                    format_clock_time(&fires_at)
                );
                return Ok(());
            }
            _ = ticker.tick() => {
                if interactive
                    && let Some(line) = watch_line(app.store().as_ref(), ephemera_util::now())
                {
                    print!("\r\x1b[2K{}", line);
                    let _ = std::io::stdout().flush();
                }
            }
        }
    }
}

/// Countdown line for one watch tick, `None` when the state file can't be read
fn watch_line(store: &dyn ConfigStore, now: DateTime<Local>) -> Option<String> {
    match store.load() {
        Ok(record) => Some(render::status_line(&record, now)),
        Err(e) => {
            warn!(store = %store.describe(), error = %e, "Failed to read state, skipping update");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ephemera_store::TomlFileStore;

    #[test]
    fn watch_line_skips_unreadable_state() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".ephemera.toml");
        let store = TomlFileStore::new(&path);
        let now = ephemera_util::now();

        assert_eq!(watch_line(&store, now).as_deref(), Some("No active cluster"));

        std::fs::write(&path, "status = = broken").unwrap();
        assert_eq!(watch_line(&store, now), None);
    }
}
