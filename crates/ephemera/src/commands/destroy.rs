//! `ephemera destroy`

use anyhow::{Context, Result, bail};
use clap::Args;
use ephemera_core::TeardownOutcome;
use ephemera_host_api::HostError;

use super::{App, Noun, parse_noun};

#[derive(Args, Debug)]
pub struct DestroyArgs {
    /// Environment type
    #[arg(value_parser = parse_noun)]
    pub noun: Option<Noun>,

    /// Skip the confirmation prompt
    #[arg(short, long, env = "EPHEMERA_DESTROY_FORCE")]
    pub force: bool,
}

pub async fn run(app: &App, args: DestroyArgs) -> Result<()> {
    let mut record = app.load()?;
    app.check_expiration(&mut record, args.force).await;

    if !record.is_active() {
        println!("Cluster '{}' is not active ({}).", record.name, record.status);
        return Ok(());
    }

    if !args.force {
        let message = format!(
            "Are you sure you want to destroy cluster '{}'?\n\n\
             This will permanently delete the cluster and all its data.",
            record.name
        );
        match app.confirm().ask("Destroy Cluster", &message).await {
            Ok(true) => {}
            Ok(false) => {
                println!("Destroy cancelled.");
                return Ok(());
            }
            Err(HostError::NoTerminal) => {
                bail!("No terminal to confirm on; use --force to destroy without asking")
            }
            Err(e) => return Err(e).context("Confirmation failed"),
        }
    }

    let provider = App::provider_of(&record)?;
    let provisioner = app.provisioner(&record, provider)?;

    match provisioner
        .destroy_now(&mut record, ephemera_util::now())
        .await
        .context("Failed to destroy cluster")?
    {
        TeardownOutcome::Destroyed { persisted } => {
            println!("Cluster '{}' destroyed.", record.name);
            if !persisted {
                println!("Warning: destroyed, but failed to update the local state file.");
            }
        }
        TeardownOutcome::AlreadyInactive => {
            println!("Cluster '{}' was already destroyed.", record.name);
        }
    }
    Ok(())
}
