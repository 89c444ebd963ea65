//! Command-line interface definition for ct-monitor
//!
//! This module defines the CLI structure using clap's derive API.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::config::DEFAULT_CONFIG_FILE;

/// ct-monitor - Certificate Transparency monitor
///
/// Polls the Cert Spotter API for certificates newly issued for the
/// configured domains and reports each one exactly once.
#[derive(Parser, Debug, Clone)]
#[command(name = "ct-monitor")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, env = "CT_MONITOR_CONFIG", default_value = DEFAULT_CONFIG_FILE)]
    pub config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Command to execute (defaults to `run`)
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available commands for ct-monitor
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Run one polling pass over every configured domain
    Run,

    /// Load and validate the configuration, mailers and templates, then exit
    Validate,
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// The selected command, `run` when none was given.
    pub fn command(&self) -> Commands {
        self.command.clone().unwrap_or(Commands::Run)
    }
}

impl Default for Cli {
    fn default() -> Self {
        Self {
            config: PathBuf::from(DEFAULT_CONFIG_FILE),
            verbose: false,
            command: None,
        }
    }
}
