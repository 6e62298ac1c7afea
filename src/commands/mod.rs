//! Command implementations behind the CLI.

pub mod config;
mod query;
pub mod services;
mod sync;

pub use config::{Config, ConfigOptions, Mirror, MirrorLayout};
pub use query::{info, query};
pub use sync::{SyncOptions, SyncSummary, sync};
