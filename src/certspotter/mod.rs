//! Issuance source: the Cert Spotter log-aggregation API
//!
//! - [`types`]: issuance records as returned by the API
//! - [`client`]: HTTP client implementing [`IssuanceSource`]

use async_trait::async_trait;

use crate::error::Result;

pub mod client;
pub mod types;

pub use client::{CertspotterClient, DEFAULT_ENDPOINT};
pub use types::{Certificate, Issuance, Issuer, Operator};

/// Parameters of a single issuance query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuanceQuery {
    /// Domain to search for
    pub domain: String,
    /// Include wildcard certificates covering the domain
    pub match_wildcards: bool,
    /// Include certificates for subdomains
    pub include_subdomains: bool,
    /// Only return issuances with an identifier greater than this; 0 means
    /// from the beginning of retention
    pub after: u64,
}

impl IssuanceQuery {
    /// Query for `domain` from the beginning of retention with both toggles off.
    pub fn new(domain: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            match_wildcards: false,
            include_subdomains: false,
            after: 0,
        }
    }

    pub fn with_match_wildcards(mut self, enabled: bool) -> Self {
        self.match_wildcards = enabled;
        self
    }

    pub fn with_include_subdomains(mut self, enabled: bool) -> Self {
        self.include_subdomains = enabled;
        self
    }

    /// Set the cursor.
    pub fn after(mut self, id: u64) -> Self {
        self.after = id;
        self
    }
}

/// A source of issuances newer than a cursor.
///
/// Implementations return issuances in ascending identifier order as
/// provided upstream and must not retry on their own.
#[async_trait]
pub trait IssuanceSource: Send + Sync {
    /// Fetch issuances matching `query`.
    ///
    /// # Errors
    ///
    /// Returns `CtMonitorError::RateLimited` when throttled, and
    /// `CtMonitorError::Upstream` or `CtMonitorError::Fetch` for any other
    /// failure.
    async fn get_issuances(&self, query: &IssuanceQuery) -> Result<Vec<Issuance>>;
}
