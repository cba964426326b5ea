//! CLI subcommand implementations.

pub mod account;
pub mod apps;
pub mod sessions;
pub mod status;
pub mod sync;
pub mod util;
