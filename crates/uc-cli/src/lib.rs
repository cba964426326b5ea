//! Usage calendar CLI library.
//!
//! This crate provides the CLI interface for syncing app usage sessions into
//! a calendar.

mod cli;
pub mod commands;
mod config;
mod state;

pub use cli::{AppsAction, Cli, Commands};
pub use config::Config;
pub use state::AppState;
