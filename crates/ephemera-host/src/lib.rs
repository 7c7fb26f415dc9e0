//! Host integrations for ephemera
//!
//! Provides:
//! - Command execution with process group isolation and timeouts
//! - `TaskfileRunner`, driving the external `task` binary
//! - Backstop scheduling via `at` (POSIX) and `schtasks` (Windows)
//! - Interactive y/N confirmation on the controlling terminal

mod at;
mod confirm;
mod platform;
mod process;
mod schtasks;
mod task;

pub use at::*;
pub use confirm::*;
pub use platform::*;
pub use process::*;
pub use schtasks::*;
pub use task::*;
