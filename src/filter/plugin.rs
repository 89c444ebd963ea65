//! Client half of the filter plugin protocol
//!
//! Each [`PluginFilter::filter`] call spawns the plugin, waits for its
//! handshake within the start timeout, performs a single `Plugin.Filter`
//! call, and kills the process regardless of the outcome.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use tracing::{debug, warn};

use crate::certspotter::Issuance;
use crate::error::{CtMonitorError, Result};
use crate::filter::handshake::Handshake;
use crate::filter::rpc::{JsonRpcRequest, JsonRpcResponse};
use crate::filter::transport::StdioTransport;
use crate::filter::{IssuanceFilter, FILTER_METHOD};

/// Default time a plugin has to print its handshake.
pub const DEFAULT_START_TIMEOUT: Duration = Duration::from_secs(10);

const REQUEST_ID: u64 = 1;

/// A filter backed by an external plugin executable.
///
/// # Examples
///
/// ```no_run
/// use std::time::Duration;
/// use ct_monitor::filter::{IssuanceFilter, PluginFilter};
///
/// # #[tokio::main]
/// # async fn main() -> anyhow::Result<()> {
/// let filter = PluginFilter::new("/usr/lib/ct-monitor/drop-internal", Duration::from_secs(10));
/// let kept = filter.filter(Vec::new()).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct PluginFilter {
    path: PathBuf,
    name: String,
    start_timeout: Duration,
}

impl PluginFilter {
    pub fn new(path: impl Into<PathBuf>, start_timeout: Duration) -> Self {
        let path = path.into();
        let name = path.display().to_string();
        Self {
            path,
            name,
            start_timeout,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn invoke(
        &self,
        transport: &StdioTransport,
        issuances: Vec<Issuance>,
    ) -> Result<Vec<Issuance>> {
        let mut stream = transport.receive();

        let first = match tokio::time::timeout(self.start_timeout, stream.next()).await {
            Err(_) => {
                return Err(CtMonitorError::FilterTimeout {
                    filter: self.name.clone(),
                    timeout: self.start_timeout,
                }
                .into())
            }
            Ok(None) => {
                return Err(CtMonitorError::FilterHandshake(format!(
                    "`{}` exited before completing its handshake",
                    self.name
                ))
                .into())
            }
            Ok(Some(line)) => line,
        };
        Handshake::parse(&first)?.verify()?;
        debug!(filter = %self.name, "Filter handshake complete");

        let params = serde_json::to_value(&issuances)?;
        let request = JsonRpcRequest::new(REQUEST_ID, FILTER_METHOD, params);
        transport.send(serde_json::to_string(&request)?)?;

        while let Some(line) = stream.next().await {
            let response: JsonRpcResponse = match serde_json::from_str(&line) {
                Ok(r) => r,
                Err(e) => {
                    warn!(filter = %self.name, error = %e, "Ignoring non-JSON-RPC line from filter");
                    continue;
                }
            };
            if response.id != Some(serde_json::json!(REQUEST_ID)) {
                debug!(filter = %self.name, "Ignoring response with unexpected id");
                continue;
            }
            if let Some(err) = response.error {
                return Err(CtMonitorError::FilterRpc(format!("`{}`: {}", self.name, err)).into());
            }
            let result = response.result.ok_or_else(|| {
                CtMonitorError::FilterRpc(format!("`{}` returned neither result nor error", self.name))
            })?;
            let kept: Vec<Issuance> = serde_json::from_value(result).map_err(|e| {
                CtMonitorError::FilterRpc(format!("`{}` returned malformed issuances: {}", self.name, e))
            })?;
            return Ok(kept);
        }

        Err(CtMonitorError::FilterRpc(format!("`{}` exited before responding", self.name)).into())
    }
}

#[async_trait]
impl IssuanceFilter for PluginFilter {
    fn name(&self) -> &str {
        &self.name
    }

    async fn filter(&self, issuances: Vec<Issuance>) -> Result<Vec<Issuance>> {
        let transport = StdioTransport::spawn(&self.path)?;
        let input = issuances.len();
        let result = self.invoke(&transport, issuances).await;
        transport.shutdown().await;

        if let Ok(kept) = &result {
            debug!(filter = %self.name, input, kept = kept.len(), "Filter call complete");
        }
        result
    }
}
