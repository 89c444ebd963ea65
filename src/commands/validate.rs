//! `validate` command
//!
//! Performs every startup check of `run` that does not need the network:
//! configuration rules, mailer initialization, sink resolution, and
//! template compilation.

use crate::commands::domain_targets;
use crate::config::Config;
use crate::error::Result;
use crate::mailer::Mailers;
use crate::notify::Notifier;

/// Check `config` and print a short summary to stdout.
pub fn validate_config(config: &Config) -> Result<()> {
    config.validate()?;
    let mailers = Mailers::from_config(config)?;
    let targets = domain_targets(config, &mailers)?;
    Notifier::new(&config.mail_template)?;

    println!("Configuration OK");
    for target in &targets {
        println!(
            "  {} (mailer: {})",
            target.descriptor.name,
            config.mailer_for(&target.descriptor)
        );
    }
    if !config.filter.filters.is_empty() {
        println!("  filters: {}", config.filter.filters.len());
    }
    Ok(())
}
