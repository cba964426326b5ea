//! Command-line argument definitions.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Sync app usage into your calendar.
///
/// Reconstructs foreground app sessions from the last two hours of usage
/// events and records each one as a calendar event, extending it while the
/// session continues.
#[derive(Debug, Parser)]
#[command(name = "uc", version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to config file.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Store the signed-in account.
    Login {
        /// Account email address.
        #[arg(long)]
        email: String,

        /// ID token returned by sign-in.
        #[arg(long)]
        id_token: String,

        /// OAuth access token carrying the calendar scope, if already granted.
        #[arg(long)]
        access_token: Option<String>,
    },

    /// Forget the signed-in account.
    Logout,

    /// Show account, usage access, and sync state.
    Status,

    /// Manage the installed-app registry.
    #[command(subcommand)]
    Apps(AppsAction),

    /// Print the sessions reconstructed from the lookback window.
    Sessions {
        /// Evaluate as of this time (ISO 8601 or "10 minutes ago").
        #[arg(long)]
        now: Option<String>,

        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Reconstruct recent sessions and record them in the calendar.
    Sync {
        /// Evaluate as of this time (ISO 8601 or "10 minutes ago").
        #[arg(long)]
        now: Option<String>,

        /// Decline consent prompts instead of asking on stdin.
        #[arg(long)]
        no_consent: bool,
    },

    /// Create a one-minute test event starting now.
    LogTest,
}

/// Actions on the app registry.
#[derive(Debug, Subcommand)]
pub enum AppsAction {
    /// Register an installed app.
    Add {
        /// Package identifier (e.g., com.example.reader).
        package: String,

        /// Human-readable label.
        #[arg(long)]
        name: Option<String>,

        /// Mark as a system app (never tracked).
        #[arg(long)]
        system: bool,
    },

    /// Remove an app from the registry.
    Remove {
        /// Package identifier.
        package: String,
    },

    /// List registered apps and whether each is tracked.
    List {
        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },
}
