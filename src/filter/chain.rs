//! Ordered filter chains
//!
//! Issuances flow through the filters in configured order; each filter's
//! output is the next one's input. The first failure stops the chain and the
//! output of the last successful step is returned alongside the error.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::certspotter::Issuance;
use crate::filter::{IssuanceFilter, PluginFilter};

/// Which step of a chain failed and why.
#[derive(Debug)]
pub struct ChainFailure {
    /// Zero-based position of the failing filter
    pub step: usize,
    /// Name of the failing filter
    pub filter: String,
    pub error: anyhow::Error,
}

impl std::fmt::Display for ChainFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "filter chain stopped at step {} (`{}`): {}",
            self.step + 1,
            self.filter,
            self.error
        )
    }
}

/// Output of [`FilterChain::apply`].
#[derive(Debug)]
pub struct ChainResult {
    /// Output of the last filter that succeeded, or the input when the
    /// first filter failed or the chain is empty
    pub issuances: Vec<Issuance>,
    pub failure: Option<ChainFailure>,
}

impl ChainResult {
    pub fn is_complete(&self) -> bool {
        self.failure.is_none()
    }
}

/// An ordered list of filters.
#[derive(Debug, Clone, Default)]
pub struct FilterChain {
    filters: Vec<Arc<dyn IssuanceFilter>>,
}

impl FilterChain {
    pub fn new(filters: Vec<Arc<dyn IssuanceFilter>>) -> Self {
        Self { filters }
    }

    /// Build a chain of plugin executables sharing one start timeout.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::path::PathBuf;
    /// use std::time::Duration;
    /// use ct_monitor::filter::FilterChain;
    ///
    /// let chain = FilterChain::from_paths(
    ///     &[PathBuf::from("/opt/filters/a"), PathBuf::from("/opt/filters/b")],
    ///     Duration::from_secs(10),
    /// );
    /// assert_eq!(chain.len(), 2);
    /// ```
    pub fn from_paths(paths: &[PathBuf], start_timeout: Duration) -> Self {
        let filters = paths
            .iter()
            .map(|p| Arc::new(PluginFilter::new(p.clone(), start_timeout)) as Arc<dyn IssuanceFilter>)
            .collect();
        Self { filters }
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    /// Run `issuances` through every filter in order.
    pub async fn apply(&self, issuances: Vec<Issuance>) -> ChainResult {
        let mut current = issuances;

        for (step, filter) in self.filters.iter().enumerate() {
            let input = current.len();
            // Filters consume their input, so keep a copy to fall back on.
            match filter.filter(current.clone()).await {
                Ok(kept) => {
                    debug!(
                        step = step + 1,
                        filter = filter.name(),
                        input,
                        kept = kept.len(),
                        "Filter step complete"
                    );
                    current = kept;
                }
                Err(error) => {
                    warn!(
                        step = step + 1,
                        filter = filter.name(),
                        error = %error,
                        "Filter chain stopped"
                    );
                    return ChainResult {
                        issuances: current,
                        failure: Some(ChainFailure {
                            step,
                            filter: filter.name().to_string(),
                            error,
                        }),
                    };
                }
            }
        }

        ChainResult {
            issuances: current,
            failure: None,
        }
    }
}
