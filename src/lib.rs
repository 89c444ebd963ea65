//! ct-monitor - Certificate Transparency monitor library
//!
//! This library watches Certificate Transparency logs through the Cert Spotter
//! API and reports each newly observed certificate issuance for the configured
//! domains exactly once.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//!
//! - `certspotter`: Issuance records and the upstream API client
//! - `watermark`: Per-domain cursor store with atomic persistence
//! - `filter`: Filter plugin protocol, process adapter, and chain runner
//! - `notify`: Observation logging and report rendering
//! - `mailer`: Mail sinks and the kind-keyed sink table
//! - `monitor`: Per-domain state machine and polling pass
//! - `metrics`: Issuance gauge and optional Pushgateway push
//! - `config`: Configuration management and validation
//! - `logging`: Tracing subscriber setup
//! - `error`: Error types and result aliases
//! - `cli`: Command-line interface definition
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//! use ct_monitor::cli::Cli;
//! use ct_monitor::Config;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load(Path::new("config.yaml"), &Cli::default())?;
//!     config.validate()?;
//!     let summary = ct_monitor::commands::run::run_pass(&config).await?;
//!     println!("{} domains errored", summary.errored());
//!     Ok(())
//! }
//! ```

pub mod certspotter;
pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod filter;
pub mod logging;
pub mod mailer;
pub mod metrics;
pub mod monitor;
pub mod notify;
pub mod watermark;

// Re-export commonly used types
pub use certspotter::{CertspotterClient, Issuance, IssuanceQuery, IssuanceSource};
pub use config::Config;
pub use error::{CtMonitorError, Result};
pub use filter::{FilterChain, IssuanceFilter, PluginFilter};
pub use mailer::{Mailer, MailerKind, Mailers};
pub use monitor::{DomainOutcome, Monitor, PassSummary};
pub use watermark::WatermarkStore;
