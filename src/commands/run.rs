//! `run` command: one polling pass
//!
//! Startup failures (mailer init, templates, watermark load) abort before
//! any domain is checked. Per-domain failures are logged and summarized.
//! The watermark file is written once after every domain has been checked;
//! a write failure is returned so the process exits non-zero.

use tracing::{info, warn};

use crate::certspotter::CertspotterClient;
use crate::commands::domain_targets;
use crate::config::Config;
use crate::error::Result;
use crate::filter::FilterChain;
use crate::mailer::Mailers;
use crate::metrics::MetricsPusher;
use crate::monitor::{Monitor, PassSummary};
use crate::notify::Notifier;
use crate::watermark::{PersistOutcome, WatermarkStore};

/// Run one polling pass with `config`.
pub async fn run_pass(config: &Config) -> Result<PassSummary> {
    let pusher = config
        .metrics
        .pushgateway_url
        .as_deref()
        .map(MetricsPusher::install);

    let mailers = Mailers::from_config(config)?;
    let targets = domain_targets(config, &mailers)?;
    let notifier = Notifier::new(&config.mail_template)?;
    let chain = FilterChain::from_paths(&config.filter.filters, config.filter_start_timeout());
    let client = CertspotterClient::new(
        &config.certspotter_endpoint,
        config.certspotter_token.clone(),
        config.http_timeout(),
    )?;

    let position_file = &config.position.filename;
    let mut store = WatermarkStore::load(position_file)?;
    info!(
        path = %position_file.display(),
        domains = targets.len(),
        filters = chain.len(),
        "Starting polling pass"
    );

    let summary = Monitor::new(&client, &chain, &notifier)
        .run_pass(&targets, &mut store)
        .await;

    let persisted = store.persist(position_file);
    match &persisted {
        Ok(PersistOutcome::Written) => {
            info!(path = %position_file.display(), "Watermark file updated");
        }
        Ok(PersistOutcome::SkippedEmpty) => {
            warn!(path = %position_file.display(), "Nothing to persist, watermark file left unchanged");
        }
        Err(_) => {}
    }

    if let Some(pusher) = pusher {
        let http = reqwest::Client::builder()
            .timeout(config.http_timeout())
            .build()?;
        pusher.push(&http).await;
    }

    persisted?;
    Ok(summary)
}
