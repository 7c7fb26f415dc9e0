//! Expiration detection and handling
//!
//! Every command runs the orchestrator before its own work, so an environment
//! that outlived its TTL is cleaned up by whichever command the user runs next.

use chrono::{DateTime, Local};
use ephemera_config::EnvironmentRecord;
use ephemera_host_api::Confirm;
use ephemera_util::format_duration;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::{CoreError, CoreResult, RetryPolicy, Teardown, TeardownOutcome};

const PROMPT_TITLE: &str = "Cluster Expired";

/// What the orchestrator should do with a record right now
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpirationAction {
    Nothing,
    AutoDestroy,
    Prompt,
    /// Expired and already attempted, with no retry due yet (or ever)
    Exhausted,
}

/// Pick the action for `record` at `now`.
pub fn decide(
    record: &EnvironmentRecord,
    policy: &RetryPolicy,
    now: DateTime<Local>,
) -> ExpirationAction {
    if !record.is_active() {
        return ExpirationAction::Nothing;
    }

    let expired = record.is_expired(now);
    let retry_due = policy.should_retry(record, now);
    if !expired && !retry_due {
        return ExpirationAction::Nothing;
    }

    let first_attempt = expired && !record.cleanup_attempted;
    match (first_attempt || retry_due, record.force) {
        (true, true) => ExpirationAction::AutoDestroy,
        (true, false) => ExpirationAction::Prompt,
        (false, _) => ExpirationAction::Exhausted,
    }
}

/// Result of one expiration check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExpirationOutcome {
    /// Not active, or not expired yet
    NotDue,

    Destroyed {
        expired_for: Duration,
        persisted: bool,
    },

    /// The user kept the cluster; the refusal counts as an attempt
    Declined {
        expired_for: Duration,
        persisted: bool,
    },

    /// Expired, but no cleanup is due. `next_retry_at` is `None` once the
    /// retry budget is spent.
    Exhausted {
        expired_for: Duration,
        attempts: u32,
        next_retry_at: Option<DateTime<Local>>,
    },
}

impl ExpirationOutcome {
    /// True when the environment was destroyed by this check
    pub fn handled(&self) -> bool {
        matches!(self, ExpirationOutcome::Destroyed { .. })
    }
}

/// Detects expired environments and drives their cleanup
pub struct ExpirationOrchestrator {
    teardown: Teardown,
    confirm: Arc<dyn Confirm>,
    policy: RetryPolicy,
    assume_force: bool,
}

impl ExpirationOrchestrator {
    pub fn new(teardown: Teardown, confirm: Arc<dyn Confirm>) -> Self {
        Self {
            teardown,
            confirm,
            policy: RetryPolicy::default(),
            assume_force: false,
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Treat every record as `force = true` (used by `destroy --force`)
    pub fn with_assume_force(mut self, assume_force: bool) -> Self {
        self.assume_force = assume_force;
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub async fn check_and_handle(
        &self,
        record: &mut EnvironmentRecord,
        now: DateTime<Local>,
    ) -> CoreResult<ExpirationOutcome> {
        let mut action = decide(record, &self.policy, now);
        if action == ExpirationAction::Prompt && self.assume_force {
            action = ExpirationAction::AutoDestroy;
        }
        let expired_for = record.check_expiration(now).unwrap_or_default();

        debug!(name = %record.name, ?action, "Expiration check");

        match action {
            ExpirationAction::Nothing => Ok(ExpirationOutcome::NotDue),
            ExpirationAction::Exhausted => {
                let next_retry_at = self.policy.next_retry_at(record);
                warn!(
                    name = %record.name,
                    expired_for = %format_duration(expired_for),
                    cleanup = %record.cleanup_status(),
                    "Cluster expired, no cleanup due"
                );
                Ok(ExpirationOutcome::Exhausted {
                    expired_for,
                    attempts: record.cleanup_attempts,
                    next_retry_at,
                })
            }
            ExpirationAction::AutoDestroy => {
                info!(
                    name = %record.name,
                    expired_for = %format_duration(expired_for),
                    "Auto-destroying expired cluster"
                );
                self.destroy(record, expired_for, now).await
            }
            ExpirationAction::Prompt => {
                let message = prompt_message(record, expired_for);
                let confirmed = self
                    .confirm
                    .ask(PROMPT_TITLE, &message)
                    .await
                    .map_err(CoreError::Confirmation)?;

                if confirmed {
                    self.destroy(record, expired_for, now).await
                } else {
                    record.mark_cleanup_attempted(now);
                    let persisted = self.teardown.persist(record);
                    info!(
                        name = %record.name,
                        attempts = record.cleanup_attempts,
                        "Cleanup declined, cluster remains active"
                    );
                    Ok(ExpirationOutcome::Declined {
                        expired_for,
                        persisted,
                    })
                }
            }
        }
    }

    async fn destroy(
        &self,
        record: &mut EnvironmentRecord,
        expired_for: Duration,
        now: DateTime<Local>,
    ) -> CoreResult<ExpirationOutcome> {
        match self.teardown.run(record, now).await? {
            TeardownOutcome::Destroyed { persisted } => Ok(ExpirationOutcome::Destroyed {
                expired_for,
                persisted,
            }),
            TeardownOutcome::AlreadyInactive => Ok(ExpirationOutcome::NotDue),
        }
    }
}

fn prompt_message(record: &EnvironmentRecord, expired_for: Duration) -> String {
    let mut message = format!(
        "Cluster '{}' expired {} ago.\n\n\
         Would you like to destroy it now?\n\n\
         Yes: destroy the cluster immediately\n\
         No: keep it running (you can run `destroy` later)\n\n\
         Set `force = true` in the state file to destroy expired clusters without asking.",
        record.name,
        format_duration(expired_for)
    );
    if record.cleanup_attempts > 0 {
        message.push_str(&format!(
            "\n\nPrevious cleanup attempts: {}",
            record.cleanup_status()
        ));
    }
    message
}
