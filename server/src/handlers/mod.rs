//! Request handlers for sync operations.

mod activities;
mod downloads;
mod sync;

pub use activities::*;
pub use downloads::*;
pub use sync::*;
