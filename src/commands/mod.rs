//! Command handlers for the CLI
//!
//! - `run`: one polling pass with atomic watermark persistence
//! - `validate`: configuration check without touching the network

use crate::config::Config;
use crate::error::Result;
use crate::mailer::Mailers;
use crate::monitor::DomainTarget;

pub mod run;
pub mod validate;

/// Resolve the sink of every configured domain.
///
/// # Errors
///
/// Fails when a domain or the alert default selects an unconfigured mailer.
pub fn domain_targets(config: &Config, mailers: &Mailers) -> Result<Vec<DomainTarget>> {
    config
        .domains
        .iter()
        .map(|domain| {
            Ok(DomainTarget {
                descriptor: domain.clone(),
                sink: mailers.resolve(config.mailer_for(domain))?,
            })
        })
        .collect()
}
