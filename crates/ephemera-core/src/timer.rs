//! In-process TTL timer

use chrono::{DateTime, Local};
use ephemera_config::EnvironmentRecord;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{error, info};

use crate::{CoreError, CoreResult, Teardown, TeardownOutcome};

/// A one-shot background teardown at the record's expiry.
///
/// There is no cancel: the OS backstop job covers the case where this process
/// exits first, and whichever fires second finds the record already destroyed.
#[derive(Debug)]
pub struct TtlTimer {
    fires_at: DateTime<Local>,
    deadline: Instant,
    handle: JoinHandle<CoreResult<TeardownOutcome>>,
}

impl TtlTimer {
    /// Start the timer for an active record with time remaining.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(
        teardown: Teardown,
        record: &EnvironmentRecord,
        now: DateTime<Local>,
    ) -> CoreResult<Self> {
        if !record.is_active() {
            return Err(CoreError::NotActive);
        }
        let fires_at = record.expires_at.ok_or(CoreError::NotActive)?;
        let remaining = record.time_remaining(now);
        if remaining.is_zero() {
            return Err(CoreError::AlreadyExpired);
        }

        let deadline = Instant::now() + remaining;
        let name = record.name.clone();
        let generation = record.created_at;
        let handle = tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            info!(name = %name, "TTL reached, cleaning up");

            let result = teardown.run_if_current(generation, ephemera_util::now()).await;
            match &result {
                Ok(outcome) => info!(name = %name, ?outcome, "TTL cleanup finished"),
                Err(e) => error!(name = %name, error = %e, "TTL cleanup failed"),
            }
            result
        });

        info!(name = %record.name, fires_at = %fires_at, "TTL timer started");
        Ok(Self {
            fires_at,
            deadline,
            handle,
        })
    }

    pub fn fires_at(&self) -> DateTime<Local> {
        self.fires_at
    }

    /// Runtime instant the teardown is due
    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the timer to fire and its teardown to finish.
    ///
    /// `None` if the background task was lost (panicked or the runtime is
    /// shutting down).
    pub async fn wait(self) -> Option<CoreResult<TeardownOutcome>> {
        match self.handle.await {
            Ok(result) => Some(result),
            Err(e) => {
                error!(error = %e, "TTL timer task failed");
                None
            }
        }
    }
}
