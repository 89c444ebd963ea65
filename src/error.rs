//! Error types for ct-monitor
//!
//! This module defines all error types used throughout the application,
//! using `thiserror` for ergonomic error handling.

use thiserror::Error;

/// Main error type for ct-monitor operations
///
/// Variants follow the failure domains of a polling pass: fetching from the
/// upstream log API, running filter plugins, notifying a mail sink, and
/// loading or persisting the watermark file.
#[derive(Error, Debug)]
pub enum CtMonitorError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Network or decoding failure while fetching issuances
    #[error("Fetch error: {0}")]
    Fetch(String),

    /// The upstream API throttled the request
    #[error("Rate limited by upstream API (Retry-After: {})", retry_after.as_deref().unwrap_or("unspecified"))]
    RateLimited {
        /// Raw value of the `Retry-After` response header, if present
        retry_after: Option<String>,
    },

    /// The upstream API answered with an undocumented status code
    #[error("Undocumented status code returned by the upstream API: {status}")]
    Upstream {
        /// HTTP status code returned by the API
        status: u16,
    },

    /// The upstream API answered 200 with a body that is not an issuance list
    #[error("Malformed response from the upstream API: {0}")]
    MalformedResponse(String),

    /// A filter plugin could not be started
    #[error("Filter spawn error: {0}")]
    FilterSpawn(String),

    /// A filter plugin answered with an unexpected handshake
    #[error("Filter handshake error: {0}")]
    FilterHandshake(String),

    /// A filter plugin did not complete its handshake in time
    #[error("Filter `{filter}` did not complete its handshake within {timeout:?}")]
    FilterTimeout {
        /// Path of the plugin executable
        filter: String,
        /// Configured start timeout
        timeout: std::time::Duration,
    },

    /// Transport or logic failure during the `Filter` call
    #[error("Filter RPC error: {0}")]
    FilterRpc(String),

    /// Rendering a report template failed
    #[error("Template error: {0}")]
    Template(String),

    /// Mailer misconfiguration detected by `init`
    #[error("Mailer error: {0}")]
    Mailer(String),

    /// Sending a report through a mail sink failed
    #[error("Notify error: {0}")]
    Notify(String),

    /// Watermark file could not be read or written
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// HTTP request errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl CtMonitorError {
    /// Returns `true` for errors raised while fetching from the upstream API.
    ///
    /// Rate limiting is a fetch failure that additionally carries a retry hint.
    pub fn is_fetch_error(&self) -> bool {
        matches!(
            self,
            CtMonitorError::Fetch(_)
                | CtMonitorError::RateLimited { .. }
                | CtMonitorError::Upstream { .. }
                | CtMonitorError::MalformedResponse(_)
                | CtMonitorError::Http(_)
        )
    }

    /// Returns `true` when the upstream API answered but the answer was
    /// unusable: an undocumented status or an undecodable body.
    pub fn is_upstream_error(&self) -> bool {
        matches!(
            self,
            CtMonitorError::Upstream { .. } | CtMonitorError::MalformedResponse(_)
        )
    }

    /// Returns `true` for failures of a filter plugin invocation.
    pub fn is_filter_error(&self) -> bool {
        matches!(
            self,
            CtMonitorError::FilterSpawn(_)
                | CtMonitorError::FilterHandshake(_)
                | CtMonitorError::FilterTimeout { .. }
                | CtMonitorError::FilterRpc(_)
        )
    }
}

/// Result type alias for ct-monitor operations
///
/// This is a convenience alias that uses `anyhow::Error` as the error type,
/// allowing for rich error context and easy error propagation.
pub type Result<T> = anyhow::Result<T>;
