//! Database module for PostgreSQL persistence.

mod activities;
mod checkpoints;
mod content;
mod devices;
mod ledger;
mod pool;

pub use activities::*;
pub use checkpoints::*;
pub use content::*;
pub use devices::*;
pub use ledger::*;
pub use pool::*;
