//! Configuration management for ct-monitor
//!
//! This module handles loading, parsing, validating, and managing
//! configuration from a YAML file, environment variables, and CLI overrides.

use crate::certspotter::DEFAULT_ENDPOINT;
use crate::error::{CtMonitorError, Result};
use crate::mailer::MailerKind;
use crate::notify::{DEFAULT_BODY_TEMPLATE, DEFAULT_SUBJECT_TEMPLATE};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default location of the configuration file
pub const DEFAULT_CONFIG_FILE: &str = "/etc/ct-monitor/config.yaml";

/// Main configuration structure for ct-monitor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Cert Spotter issuances endpoint
    #[serde(default = "default_certspotter_endpoint")]
    pub certspotter_endpoint: String,
    /// Optional API token; also read from `CERTSPOTTER_TOKEN`
    #[serde(default)]
    pub certspotter_token: Option<String>,
    /// Monitored domains
    #[serde(default)]
    pub domains: Vec<DomainConfig>,
    /// Default alert settings
    #[serde(default)]
    pub alert: AlertConfig,
    /// Watermark file settings
    #[serde(default)]
    pub position: PositionConfig,
    /// Filter plugin chain
    #[serde(default)]
    pub filter: FilterConfig,
    /// Report templates
    #[serde(default)]
    pub mail_template: MailTemplateConfig,
    #[serde(default)]
    pub smtp: Option<SmtpConfig>,
    #[serde(default)]
    pub sendgrid: Option<SendgridConfig>,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub http: HttpConfig,
}

fn default_certspotter_endpoint() -> String {
    DEFAULT_ENDPOINT.to_string()
}

/// A monitored domain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainConfig {
    /// Domain name to query for
    pub name: String,
    /// Include wildcard certificates covering the domain
    #[serde(default)]
    pub match_wildcards: bool,
    /// Include certificates for subdomains
    #[serde(default)]
    pub include_subdomains: bool,
    /// Sink override; falls back to `alert.mailer` when unset
    #[serde(default)]
    pub mailer: Option<MailerKind>,
}

impl DomainConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            match_wildcards: false,
            include_subdomains: false,
            mailer: None,
        }
    }
}

/// Default alert settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AlertConfig {
    /// Sink used by domains without an override
    #[serde(default)]
    pub mailer: MailerKind,
}

/// Watermark file settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionConfig {
    #[serde(default = "default_position_file")]
    pub filename: PathBuf,
}

fn default_position_file() -> PathBuf {
    PathBuf::from("/var/lib/ct-monitor/positions.yaml")
}

impl Default for PositionConfig {
    fn default() -> Self {
        Self {
            filename: default_position_file(),
        }
    }
}

/// Filter plugin chain settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterConfig {
    /// Plugin executables, applied in order
    #[serde(default)]
    pub filters: Vec<PathBuf>,
    /// Seconds a plugin has to complete its handshake
    #[serde(default = "default_start_timeout_secs")]
    pub start_timeout_secs: u64,
}

fn default_start_timeout_secs() -> u64 {
    10
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            filters: Vec::new(),
            start_timeout_secs: default_start_timeout_secs(),
        }
    }
}

/// Handlebars templates for report subject and body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailTemplateConfig {
    #[serde(default = "default_subject_template")]
    pub subject: String,
    #[serde(default = "default_body_template")]
    pub body: String,
}

fn default_subject_template() -> String {
    DEFAULT_SUBJECT_TEMPLATE.to_string()
}

fn default_body_template() -> String {
    DEFAULT_BODY_TEMPLATE.to_string()
}

impl Default for MailTemplateConfig {
    fn default() -> Self {
        Self {
            subject: default_subject_template(),
            body: default_body_template(),
        }
    }
}

/// Plain SMTP sink settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmtpConfig {
    pub from: String,
    pub to: String,
    pub server: String,
    #[serde(default = "default_smtp_port")]
    pub port: u16,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    /// PEM file with an additional trusted CA
    #[serde(default)]
    pub ca_cert_file: Option<PathBuf>,
    /// Fail instead of falling back to plaintext when STARTTLS is unavailable
    #[serde(default)]
    pub require_encryption: bool,
}

fn default_smtp_port() -> u16 {
    25
}

/// Sendgrid sink settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendgridConfig {
    pub from: String,
    pub to: String,
    pub api_key: String,
    #[serde(default = "default_sendgrid_endpoint")]
    pub endpoint: String,
}

pub fn default_sendgrid_endpoint() -> String {
    "https://api.sendgrid.com/v3/mail/send".to_string()
}

/// Logging settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter used when `RUST_LOG` is not set
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Emit JSON lines instead of human-readable output
    #[serde(default)]
    pub json_format: bool,
    /// Also append logs to this file
    #[serde(default)]
    pub file_path: Option<PathBuf>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json_format: false,
            file_path: None,
        }
    }
}

/// Metrics settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Prometheus Pushgateway base URL; metrics are not pushed when unset
    #[serde(default)]
    pub pushgateway_url: Option<String>,
}

/// Outbound HTTP settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_http_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_http_timeout_secs() -> u64 {
    30
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_http_timeout_secs(),
        }
    }
}

impl Config {
    /// Load configuration from file with environment and CLI overrides
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the YAML configuration file
    /// * `cli` - CLI arguments for overrides
    ///
    /// # Errors
    ///
    /// Returns `CtMonitorError::Config` if the file cannot be read or parsed.
    pub fn load(path: &Path, cli: &crate::cli::Cli) -> Result<Self> {
        let mut config = Self::from_file(path)?;
        config.apply_env_vars();
        config.apply_cli_overrides(cli);
        Ok(config)
    }

    /// Parse configuration from a YAML file without applying overrides.
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            CtMonitorError::Config(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_yaml(&contents)
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(contents: &str) -> Result<Self> {
        serde_yaml::from_str(contents)
            .map_err(|e| CtMonitorError::Config(format!("Failed to parse config: {}", e)).into())
    }

    fn apply_env_vars(&mut self) {
        if self.certspotter_token.as_deref().map_or(true, str::is_empty) {
            if let Ok(token) = std::env::var("CERTSPOTTER_TOKEN") {
                if !token.is_empty() {
                    self.certspotter_token = Some(token);
                }
            }
        }

        if let Ok(level) = std::env::var("CT_MONITOR_LOG_LEVEL") {
            if tracing_subscriber::EnvFilter::try_new(&level).is_ok() {
                self.logging.level = level;
            } else {
                tracing::warn!("Invalid CT_MONITOR_LOG_LEVEL: {}", level);
            }
        }

        if let Ok(json) = std::env::var("CT_MONITOR_JSON_LOGS") {
            if let Ok(value) = json.parse() {
                self.logging.json_format = value;
            } else {
                tracing::warn!("Invalid CT_MONITOR_JSON_LOGS: {}", json);
            }
        }

        if let Ok(path) = std::env::var("CT_MONITOR_POSITION_FILE") {
            if path.is_empty() {
                tracing::warn!("Ignoring empty CT_MONITOR_POSITION_FILE");
            } else {
                self.position.filename = PathBuf::from(path);
            }
        }

        if let Ok(url) = std::env::var("CT_MONITOR_PUSHGATEWAY_URL") {
            if url::Url::parse(&url).is_ok() {
                self.metrics.pushgateway_url = Some(url);
            } else {
                tracing::warn!("Invalid CT_MONITOR_PUSHGATEWAY_URL: {}", url);
            }
        }
    }

    fn apply_cli_overrides(&mut self, cli: &crate::cli::Cli) {
        if cli.verbose {
            self.logging.level = "debug".to_string();
        }
    }

    /// Handshake window granted to each filter plugin.
    pub fn filter_start_timeout(&self) -> Duration {
        Duration::from_secs(self.filter.start_timeout_secs)
    }

    /// Timeout for outbound HTTP requests.
    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http.timeout_secs)
    }

    /// Sink kind selected for `domain`.
    pub fn mailer_for(&self, domain: &DomainConfig) -> MailerKind {
        domain.mailer.unwrap_or(self.alert.mailer)
    }

    /// Validate configuration
    ///
    /// # Errors
    ///
    /// Returns error if any validation check fails
    pub fn validate(&self) -> Result<()> {
        if self.certspotter_endpoint.trim().is_empty() {
            return Err(
                CtMonitorError::Config("certspotter_endpoint cannot be empty".to_string()).into(),
            );
        }

        if self.domains.is_empty() {
            return Err(CtMonitorError::Config("no domains configured".to_string()).into());
        }

        let mut seen = HashSet::new();
        for domain in &self.domains {
            let name = domain.name.trim();
            if name.is_empty() {
                return Err(
                    CtMonitorError::Config("domain name cannot be empty".to_string()).into(),
                );
            }
            if !seen.insert(name.to_ascii_lowercase()) {
                return Err(CtMonitorError::Config(format!(
                    "domain `{}` is configured more than once",
                    name
                ))
                .into());
            }
            self.check_mailer_configured(self.mailer_for(domain), &format!("domain `{}`", name))?;
        }

        self.check_mailer_configured(self.alert.mailer, "alert")?;

        if self.filter.start_timeout_secs == 0 {
            return Err(CtMonitorError::Config(
                "filter.start_timeout_secs must be greater than 0".to_string(),
            )
            .into());
        }

        if self.http.timeout_secs == 0 {
            return Err(
                CtMonitorError::Config("http.timeout_secs must be greater than 0".to_string())
                    .into(),
            );
        }

        if self.position.filename.as_os_str().is_empty() {
            return Err(
                CtMonitorError::Config("position.filename cannot be empty".to_string()).into(),
            );
        }

        Ok(())
    }

    fn check_mailer_configured(&self, kind: MailerKind, owner: &str) -> Result<()> {
        let configured = match kind {
            MailerKind::None => true,
            MailerKind::Smtp => self.smtp.is_some(),
            MailerKind::Sendgrid => self.sendgrid.is_some(),
        };
        if configured {
            Ok(())
        } else {
            Err(CtMonitorError::Config(format!(
                "{} selects mailer `{}` but no `{}` section is configured",
                owner, kind, kind
            ))
            .into())
        }
    }
}
