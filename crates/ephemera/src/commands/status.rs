//! `ephemera status`

use anyhow::{Context, Result};
use clap::Args;
use ephemera_core::RetryPolicy;
use ephemera_store::ConfigStore;
use std::time::Duration;

use super::{App, Noun, parse_noun};
use crate::render;

const WATCH_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Environment type
    #[arg(value_parser = parse_noun)]
    pub noun: Option<Noun>,

    /// Keep printing status until the cluster is gone
    #[arg(short, long, env = "EPHEMERA_STATUS_WATCH")]
    pub watch: bool,

    /// Print the state record as JSON
    #[arg(long, conflicts_with = "watch")]
    pub json: bool,
}

pub async fn run(app: &App, args: StatusArgs) -> Result<()> {
    let mut record = app.load()?;
    app.check_expiration(&mut record, false).await;

    if args.json {
        let json = serde_json::to_string_pretty(&record).context("Failed to encode state")?;
        println!("{}", json);
        return Ok(());
    }

    if args.watch {
        return watch(app).await;
    }

    let now = ephemera_util::now();
    if app.verbose() {
        let next_retry_at = RetryPolicy::default().next_retry_at(&record);
        let backstop = match app.backstop() {
            Ok(backstop) => backstop.is_armed(&record).await.ok(),
            Err(_) => None,
        };
        println!("{}", render::details(&record, next_retry_at, backstop, now));
        #[cfg(debug_assertions)]
        if ephemera_util::is_mock_time_active() {
            println!("{:<15} {} (MOCK)", "NOW:", ephemera_util::format_datetime_full(&now));
        }
    } else {
        println!("{}", render::status_line(&record, now));
    }
    Ok(())
}

async fn watch(app: &App) -> Result<()> {
    let mut ticker = tokio::time::interval(WATCH_INTERVAL);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let record = app.store().load().context("Failed to reload state")?;
                println!("{}", render::status_line(&record, ephemera_util::now()));
                if !record.is_active() {
                    return Ok(());
                }
            }
            _ = tokio::signal::ctrl_c() => return Ok(()),
        }
    }
}
