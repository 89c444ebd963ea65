//! Per-domain polling pass
//!
//! Each domain goes through
//! `Fetching -> Detecting -> Filtering -> Notifying -> Committing`, with an
//! errored outcome reachable from `Fetching` and `Notifying`. Fetched
//! issuances at or below the watermark are dropped. The watermark candidate
//! is the highest remaining identifier, so a watermark never decreases, and
//! it is committed to the in-memory store only when every fetched issuance
//! was either filtered out or successfully reported. Filter failures are logged and the
//! domain continues with whatever the chain produced. One domain's failure
//! never stops the others; persisting the store is left to the caller.

use std::fmt;
use std::sync::Arc;

use tracing::{error, info, warn};

use crate::certspotter::{IssuanceQuery, IssuanceSource};
use crate::config::DomainConfig;
use crate::error::CtMonitorError;
use crate::filter::FilterChain;
use crate::mailer::Mailer;
use crate::notify::Notifier;
use crate::watermark::{domain_key, WatermarkStore};

/// State of a domain within a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Fetching,
    Detecting,
    Filtering,
    Notifying,
    Committing,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Fetching => "fetching",
            Stage::Detecting => "detecting",
            Stage::Filtering => "filtering",
            Stage::Notifying => "notifying",
            Stage::Committing => "committing",
        };
        f.write_str(name)
    }
}

/// A failure that stopped one domain.
#[derive(Debug)]
pub struct DomainError {
    pub domain: String,
    pub stage: Stage,
    pub source: anyhow::Error,
}

impl fmt::Display for DomainError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} failed while {}: {}", self.domain, self.stage, self.source)
    }
}

impl std::error::Error for DomainError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.source.as_ref())
    }
}

impl DomainError {
    /// Whether the upstream API throttled this domain.
    pub fn is_rate_limited(&self) -> bool {
        matches!(
            self.source.downcast_ref::<CtMonitorError>(),
            Some(CtMonitorError::RateLimited { .. })
        )
    }
}

/// Terminal state of one domain.
#[derive(Debug)]
pub enum DomainOutcome {
    /// Nothing newer than the watermark
    NoNewIssuances,
    /// A report was sent and the watermark advanced
    Notified { count: usize, watermark: u64 },
    /// Every issuance was filtered out; the watermark advanced anyway
    AllFiltered { watermark: u64 },
    /// No sink is configured, so nothing was sent; the watermark advanced
    Unreported { count: usize, watermark: u64 },
    /// The domain was skipped this pass; its watermark is unchanged
    Errored(DomainError),
}

impl DomainOutcome {
    pub fn is_error(&self) -> bool {
        matches!(self, DomainOutcome::Errored(_))
    }
}

/// Outcomes of a whole pass, in configuration order.
#[derive(Debug, Default)]
pub struct PassSummary {
    pub outcomes: Vec<(String, DomainOutcome)>,
}

impl PassSummary {
    pub fn errored(&self) -> usize {
        self.outcomes.iter().filter(|(_, o)| o.is_error()).count()
    }

    pub fn notified(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|(_, o)| matches!(o, DomainOutcome::Notified { .. }))
            .count()
    }

    pub fn unreported(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|(_, o)| matches!(o, DomainOutcome::Unreported { .. }))
            .count()
    }

    pub fn outcome(&self, domain: &str) -> Option<&DomainOutcome> {
        self.outcomes
            .iter()
            .find(|(name, _)| name == domain)
            .map(|(_, o)| o)
    }
}

/// A domain together with the sink its reports go to.
#[derive(Debug, Clone)]
pub struct DomainTarget {
    pub descriptor: DomainConfig,
    /// `None` disables reporting for the domain
    pub sink: Option<Arc<dyn Mailer>>,
}

/// Runs polling passes over a set of domains.
pub struct Monitor<'a> {
    source: &'a dyn IssuanceSource,
    chain: &'a FilterChain,
    notifier: &'a Notifier,
}

impl<'a> Monitor<'a> {
    pub fn new(
        source: &'a dyn IssuanceSource,
        chain: &'a FilterChain,
        notifier: &'a Notifier,
    ) -> Self {
        Self {
            source,
            chain,
            notifier,
        }
    }

    /// Process every domain in order, updating `store` in memory.
    pub async fn run_pass(
        &self,
        targets: &[DomainTarget],
        store: &mut WatermarkStore,
    ) -> PassSummary {
        let mut summary = PassSummary::default();

        for target in targets {
            let name = target.descriptor.name.clone();
            let outcome = self.check_domain(target, store).await;
            match &outcome {
                DomainOutcome::Errored(err) if err.is_rate_limited() => {
                    warn!(domain = %name, error = %err.source, "Rate limited, domain skipped this pass");
                }
                DomainOutcome::Errored(err) => {
                    error!(domain = %name, stage = %err.stage, error = %err.source, "Domain check failed");
                }
                _ => {}
            }
            summary.outcomes.push((name, outcome));
        }

        info!(
            domains = summary.outcomes.len(),
            notified = summary.notified(),
            unreported = summary.unreported(),
            errored = summary.errored(),
            "Polling pass complete"
        );

        summary
    }

    /// Run one domain through the state machine.
    pub async fn check_domain(
        &self,
        target: &DomainTarget,
        store: &mut WatermarkStore,
    ) -> DomainOutcome {
        let domain = target.descriptor.name.as_str();
        let key = domain_key(domain);
        let current = store.get(&key);

        let mut stage = Stage::Fetching;
        let mut candidate = current;
        let mut fetched = 0;
        let mut pending = Vec::new();
        let mut report_count = None;
        let mut unreported = 0;

        loop {
            stage = match stage {
                Stage::Fetching => {
                    let query = IssuanceQuery::new(domain)
                        .with_match_wildcards(target.descriptor.match_wildcards)
                        .with_include_subdomains(target.descriptor.include_subdomains)
                        .after(current);
                    match self.source.get_issuances(&query).await {
                        Ok(issuances) => {
                            pending = issuances;
                            Stage::Detecting
                        }
                        Err(source) => {
                            return DomainOutcome::Errored(DomainError {
                                domain: domain.to_string(),
                                stage,
                                source,
                            })
                        }
                    }
                }
                Stage::Detecting => {
                    let received = pending.len();
                    if current > 0 {
                        pending.retain(|i| i.id > current);
                    }
                    if pending.len() < received {
                        warn!(
                            domain = %domain,
                            stale = received - pending.len(),
                            watermark = current,
                            "Ignoring issuances at or below the watermark"
                        );
                    }
                    fetched = pending.len();
                    match pending.iter().map(|i| i.id).max() {
                        None => Stage::Committing,
                        Some(highest) => {
                            candidate = highest.max(current);
                            self.notifier.observe(domain, &pending);
                            Stage::Filtering
                        }
                    }
                }
                Stage::Filtering => {
                    let result = self.chain.apply(std::mem::take(&mut pending)).await;
                    if let Some(failure) = &result.failure {
                        warn!(
                            domain = %domain,
                            step = failure.step + 1,
                            filter = %failure.filter,
                            error = %failure.error,
                            kept = result.issuances.len(),
                            "Errors encountered running filters, continuing with partial results"
                        );
                    }
                    pending = result.issuances;
                    if pending.is_empty() {
                        info!(domain = %domain, "All issuances filtered out");
                        Stage::Committing
                    } else {
                        Stage::Notifying
                    }
                }
                Stage::Notifying => {
                    match self
                        .notifier
                        .report(domain, &pending, target.sink.as_deref())
                        .await
                    {
                        Ok(()) if target.sink.is_some() => {
                            report_count = Some(pending.len());
                            Stage::Committing
                        }
                        Ok(()) => {
                            unreported = pending.len();
                            Stage::Committing
                        }
                        Err(source) => {
                            return DomainOutcome::Errored(DomainError {
                                domain: domain.to_string(),
                                stage,
                                source,
                            })
                        }
                    }
                }
                Stage::Committing => {
                    store.set(key.as_str(), candidate);
                    if fetched == 0 {
                        info!(domain = %domain, "No new issuances observed");
                        return DomainOutcome::NoNewIssuances;
                    }
                    info!(domain = %domain, watermark = candidate, "Done checking");
                    return match report_count {
                        Some(count) => DomainOutcome::Notified {
                            count,
                            watermark: candidate,
                        },
                        None if unreported > 0 => DomainOutcome::Unreported {
                            count: unreported,
                            watermark: candidate,
                        },
                        None => DomainOutcome::AllFiltered {
                            watermark: candidate,
                        },
                    };
                }
            };
        }
    }
}
