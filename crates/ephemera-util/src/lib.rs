//! Shared utilities for ephemera
//!
//! This crate provides:
//! - Identifier types (ClusterName, JobId)
//! - Time utilities (mockable wall clock, Go-style duration parsing and formatting)
//! - Parse errors shared by the identifier and duration parsers
//! - Default paths for the per-project state file

mod error;
mod ids;
mod paths;
mod time;

pub use error::*;
pub use ids::*;
pub use paths::*;
pub use time::*;
