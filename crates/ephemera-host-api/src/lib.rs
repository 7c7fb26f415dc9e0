//! Host collaborator interfaces for ephemera
//!
//! This crate defines the seams between the expiration core and the outside
//! world: the external task runner, the OS-level one-shot scheduler, and the
//! interactive confirmation prompt. It contains no platform code itself.

mod mock;
mod schedule;
mod traits;

pub use mock::*;
pub use schedule::*;
pub use traits::*;
