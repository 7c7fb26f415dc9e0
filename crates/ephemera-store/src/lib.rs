//! Persistence layer for ephemera
//!
//! Provides:
//! - `ConfigStore`, the load/save seam every component goes through
//! - `TomlFileStore`, backed by the project's `.ephemera.toml`
//! - `MemoryStore`, for tests

mod file;
mod memory;
mod traits;

pub use file::*;
pub use memory::*;
pub use traits::*;

use ephemera_config::ConfigError;
use thiserror::Error;

/// Store errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("State file error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

pub type StoreResult<T> = Result<T, StoreError>;
