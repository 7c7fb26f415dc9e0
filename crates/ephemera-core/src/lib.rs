//! Expiration core for ephemera
//!
//! This crate decides when an environment dies and makes sure it does:
//! - Retry/backoff policy over the record's cleanup history
//! - The expiration check every command runs first
//! - Guarded teardown (`active -> destroyed` only)
//! - The OS backstop job and the in-process TTL timer
//! - `new` and `destroy` flows tying them together

mod backstop;
mod expiration;
mod lifecycle;
mod retry;
mod teardown;
mod timer;

pub use backstop::*;
pub use expiration::*;
pub use lifecycle::*;
pub use retry::*;
pub use teardown::*;
pub use timer::*;

use chrono::{DateTime, Local};
use ephemera_config::ValidationError;
use ephemera_host_api::HostError;
use ephemera_store::StoreError;
use ephemera_util::JobId;
use thiserror::Error;

/// Core errors
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Invalid settings: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),

    #[error("Failed to schedule cleanup job: {0}")]
    Scheduling(HostError),

    #[error("Cleanup job {0} was scheduled but cannot be found")]
    BackstopMissing(JobId),

    #[error("Setup failed: {0}")]
    Setup(HostError),

    #[error("Teardown failed: {0}")]
    Teardown(HostError),

    #[error("Confirmation failed: {0}")]
    Confirmation(HostError),

    #[error("No active cluster")]
    NotActive,

    #[error("Cluster has no time remaining")]
    AlreadyExpired,

    #[error(
        "Cluster '{name}' is already active until {}",
        ephemera_util::format_datetime_full(.expires_at)
    )]
    AlreadyActive {
        name: String,
        expires_at: DateTime<Local>,
    },

    #[error("State store error: {0}")]
    Store(#[from] StoreError),
}

pub type CoreResult<T> = Result<T, CoreError>;

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}
