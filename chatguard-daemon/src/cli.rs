//! CLI argument definitions for chatguard-daemon.
//!
//! Uses `clap` v4 derive macros to parse command-line arguments.

use std::path::PathBuf;

use clap::Parser;

use chatguard_core::config::ChatguardConfig;

/// Game chat moderation daemon.
///
/// Tails one or more game client logs, classifies chat messages and
/// forwards flagged ones to the moderators' chat.
#[derive(Parser, Debug)]
#[command(name = "chatguard-daemon")]
#[command(version, about, long_about = None)]
pub struct DaemonCli {
    /// Path to chatguard.toml configuration file.
    #[arg(short, long, default_value = "chatguard.toml")]
    pub config: PathBuf,

    /// Override log level (trace, debug, info, warn, error).
    ///
    /// Takes precedence over the config file and environment variables.
    #[arg(long)]
    pub log_level: Option<String>,

    /// Override log format (json, pretty).
    ///
    /// Takes precedence over the config file and environment variables.
    #[arg(long)]
    pub log_format: Option<String>,

    /// Validate configuration file and exit without starting the daemon.
    #[arg(long)]
    pub validate: bool,
}

impl DaemonCli {
    /// Apply CLI overrides on top of the file and environment configuration.
    pub fn apply_overrides(&self, config: &mut ChatguardConfig) {
        if let Some(level) = &self.log_level {
            config.general.log_level = level.clone();
        }
        if let Some(format) = &self.log_format {
            config.general.log_format = format.clone();
        }
    }
}
