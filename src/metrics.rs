//! Issuance metrics
//!
//! Every observed issuance sets the `issuances_observed` gauge to 1, labeled
//! by identifier, domain, DNS names, issuer and validity start. Recording is
//! a no-op unless a recorder is installed.
//!
//! With the `prometheus` feature, [`MetricsPusher`] installs a Prometheus
//! recorder at startup and pushes the rendered exposition to a Pushgateway
//! once at the end of the run. Without the feature the pusher does nothing.

use ::metrics::gauge;

use crate::certspotter::Issuance;

/// Gauge name for observed issuances
pub const ISSUANCES_OBSERVED: &str = "issuances_observed";

/// Pushgateway job name
pub const JOB_NAME: &str = "ct_monitor";

/// Record one observed issuance.
///
/// # Examples
///
/// ```
/// use ct_monitor::certspotter::Issuance;
/// use ct_monitor::metrics::record_issuance;
///
/// let issuance: Issuance = serde_json::from_str(r#"{"id":"1"}"#).unwrap();
/// record_issuance("example.com", &issuance);
/// ```
pub fn record_issuance(domain: &str, issuance: &Issuance) {
    gauge!(
        ISSUANCES_OBSERVED,
        1.0,
        "id" => issuance.id.to_string(),
        "domain" => domain.to_string(),
        "dns_names" => issuance.dns_names.join(","),
        "issuer" => issuance.issuer.name.clone(),
        "not_before" => issuance.not_before.clone()
    );
}

/// Push URL for a Pushgateway base URL.
pub fn push_url(base: &str) -> String {
    format!("{}/metrics/job/{}", base.trim_end_matches('/'), JOB_NAME)
}

/// Pushes collected metrics to a Pushgateway at the end of a run.
pub struct MetricsPusher {
    url: String,
    #[cfg(feature = "prometheus")]
    handle: Option<metrics_exporter_prometheus::PrometheusHandle>,
}

impl std::fmt::Debug for MetricsPusher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsPusher").field("url", &self.url).finish()
    }
}

impl MetricsPusher {
    /// Install the recorder and remember the Pushgateway URL.
    ///
    /// Failure to install the recorder is logged and disables pushing.
    pub fn install(pushgateway_url: &str) -> Self {
        #[cfg(feature = "prometheus")]
        {
            use metrics_exporter_prometheus::PrometheusBuilder;
            let handle = PrometheusBuilder::new()
                .install_recorder()
                .map_err(|e| {
                    tracing::warn!("Failed to install Prometheus recorder: {}", e);
                })
                .ok();
            Self {
                url: push_url(pushgateway_url),
                handle,
            }
        }
        #[cfg(not(feature = "prometheus"))]
        {
            tracing::debug!("Built without the prometheus feature, metrics will not be pushed");
            Self {
                url: push_url(pushgateway_url),
            }
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Push the current exposition. Failures are logged, never returned.
    pub async fn push(&self, http: &reqwest::Client) {
        #[cfg(feature = "prometheus")]
        {
            let Some(handle) = &self.handle else {
                return;
            };
            let body = handle.render();
            match http.put(&self.url).body(body).send().await {
                Ok(resp) if resp.status().is_success() => {
                    tracing::debug!(url = %self.url, "Pushed metrics");
                }
                Ok(resp) => {
                    tracing::warn!(url = %self.url, status = resp.status().as_u16(), "Pushgateway rejected metrics");
                }
                Err(e) => {
                    tracing::warn!(url = %self.url, error = %e, "Failed to push metrics");
                }
            }
        }
        #[cfg(not(feature = "prometheus"))]
        {
            let _ = http;
        }
    }
}
