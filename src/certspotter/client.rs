//! HTTP client for the Cert Spotter issuances API
//!
//! The client performs exactly one `GET` per call and never retries; retry
//! policy belongs to the caller. Results are returned in the order the API
//! sends them (ascending identifier).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use tracing::debug;

use crate::certspotter::{Issuance, IssuanceQuery, IssuanceSource};
use crate::error::{CtMonitorError, Result};

/// Default Cert Spotter issuances endpoint.
pub const DEFAULT_ENDPOINT: &str = "https://api.certspotter.com/v1/issuances";

/// Fields requested in expanded form on every query.
const EXPAND_FIELDS: [&str; 3] = ["dns_names", "issuer", "cert"];

/// Client for the Cert Spotter `issuances` endpoint.
///
/// # Examples
///
/// ```no_run
/// use std::time::Duration;
/// use ct_monitor::certspotter::{CertspotterClient, IssuanceQuery, IssuanceSource};
///
/// # #[tokio::main]
/// # async fn main() -> anyhow::Result<()> {
/// let client = CertspotterClient::new(
///     "https://api.certspotter.com/v1/issuances",
///     None,
///     Duration::from_secs(30),
/// )?;
/// let query = IssuanceQuery::new("example.com").with_include_subdomains(true);
/// let issuances = client.get_issuances(&query).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct CertspotterClient {
    endpoint: String,
    token: Option<String>,
    http: reqwest::Client,
}

impl CertspotterClient {
    /// Create a new client.
    ///
    /// # Arguments
    ///
    /// * `endpoint` - Full URL of the issuances endpoint
    /// * `token` - Optional API token sent as a bearer credential
    /// * `timeout` - Per-request timeout
    ///
    /// # Errors
    ///
    /// Returns `CtMonitorError::Config` if the endpoint is not a valid URL.
    pub fn new(endpoint: &str, token: Option<String>, timeout: Duration) -> Result<Self> {
        url::Url::parse(endpoint).map_err(|e| {
            CtMonitorError::Config(format!("invalid certspotter endpoint `{}`: {}", endpoint, e))
        })?;

        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("ct-monitor/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            endpoint: endpoint.to_string(),
            token: token.filter(|t| !t.is_empty()),
            http,
        })
    }

    /// Returns the configured endpoint.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

/// Build the query parameters for a request.
///
/// `after` is only sent when the cursor is past the beginning of retention,
/// and the toggles are only sent when enabled.
pub(crate) fn query_params(query: &IssuanceQuery) -> Vec<(&'static str, String)> {
    let mut params: Vec<(&'static str, String)> = EXPAND_FIELDS
        .iter()
        .map(|field| ("expand", field.to_string()))
        .collect();
    params.push(("domain", query.domain.clone()));
    if query.after > 0 {
        params.push(("after", query.after.to_string()));
    }
    if query.match_wildcards {
        params.push(("match_wildcards", "true".to_string()));
    }
    if query.include_subdomains {
        params.push(("include_subdomains", "true".to_string()));
    }
    params
}

#[async_trait]
impl IssuanceSource for CertspotterClient {
    async fn get_issuances(&self, query: &IssuanceQuery) -> Result<Vec<Issuance>> {
        let mut request = self.http.get(&self.endpoint).query(&query_params(query));
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        debug!(domain = %query.domain, after = query.after, "Querying issuances");

        let response = request
            .send()
            .await
            .map_err(|e| CtMonitorError::Fetch(format!("request failed: {}", e)))?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            return Err(CtMonitorError::RateLimited { retry_after }.into());
        }
        if status != StatusCode::OK {
            return Err(CtMonitorError::Upstream {
                status: status.as_u16(),
            }
            .into());
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| CtMonitorError::Fetch(format!("failed to read response body: {}", e)))?;
        let issuances: Vec<Issuance> = serde_json::from_slice(&body)
            .map_err(|e| CtMonitorError::MalformedResponse(e.to_string()))?;

        debug!(
            domain = %query.domain,
            count = issuances.len(),
            "Received issuances"
        );

        Ok(issuances)
    }
}
