//! ct-monitor - Certificate Transparency monitor
//!
#![doc = "Main entry point for the ct-monitor binary."]

use anyhow::Result;

use ct_monitor::cli::{Cli, Commands};
use ct_monitor::commands;
use ct_monitor::config::Config;
use ct_monitor::logging::init_logging;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let cli = Cli::parse_args();

    // Load configuration
    let config = Config::load(&cli.config, &cli)?;

    init_logging(&config.logging)?;
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %cli.config.display(),
        "ct-monitor starting"
    );

    match cli.command() {
        Commands::Validate => {
            commands::validate::validate_config(&config)?;
            Ok(())
        }
        Commands::Run => {
            config.validate()?;
            let summary = commands::run::run_pass(&config).await?;
            for (domain, outcome) in &summary.outcomes {
                tracing::debug!(domain = %domain, outcome = ?outcome, "Domain outcome");
            }
            Ok(())
        }
    }
}
