//! Mail sinks for issuance reports
//!
//! A sink is anything implementing [`Mailer`]. Sinks are selected by
//! [`MailerKind`] through an explicit [`Mailers`] table built from
//! configuration; selecting `none` yields no sink at all, and selecting a
//! kind whose section is not configured is an error.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::error::{CtMonitorError, Result};

pub mod sendgrid;
pub mod smtp;

pub use sendgrid::SendgridMailer;
pub use smtp::SmtpMailer;

/// A capability that delivers a rendered report.
#[async_trait]
pub trait Mailer: Send + Sync + fmt::Debug {
    /// Validate sender and recipient configuration.
    fn init(&self) -> Result<()>;

    /// Deliver one message.
    async fn send(&self, subject: &str, body: &str) -> Result<()>;
}

/// Configured name of a mail sink.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MailerKind {
    Smtp,
    Sendgrid,
    /// Reports are not sent
    #[default]
    None,
}

impl fmt::Display for MailerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MailerKind::Smtp => "smtp",
            MailerKind::Sendgrid => "sendgrid",
            MailerKind::None => "none",
        };
        f.write_str(name)
    }
}

/// Mail sinks keyed by kind.
#[derive(Debug, Clone, Default)]
pub struct Mailers {
    sinks: HashMap<MailerKind, Arc<dyn Mailer>>,
}

impl Mailers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build and initialize every sink that has a configuration section.
    ///
    /// # Errors
    ///
    /// Returns the first `init` failure.
    pub fn from_config(config: &Config) -> Result<Self> {
        let mut mailers = Self::new();
        if let Some(smtp) = &config.smtp {
            mailers.insert(MailerKind::Smtp, Arc::new(SmtpMailer::new(smtp.clone())))?;
        }
        if let Some(sendgrid) = &config.sendgrid {
            mailers.insert(
                MailerKind::Sendgrid,
                Arc::new(SendgridMailer::new(
                    sendgrid.clone(),
                    config.http_timeout(),
                )?),
            )?;
        }
        Ok(mailers)
    }

    /// Initialize `mailer` and register it under `kind`.
    pub fn insert(&mut self, kind: MailerKind, mailer: Arc<dyn Mailer>) -> Result<()> {
        if kind == MailerKind::None {
            return Err(CtMonitorError::Config(
                "cannot register a sink for mailer kind `none`".to_string(),
            )
            .into());
        }
        mailer
            .init()
            .with_context(|| format!("failed to initialize {} mailer", kind))?;
        self.sinks.insert(kind, mailer);
        Ok(())
    }

    /// Whether a sink is registered for `kind`. `none` always counts as
    /// available.
    pub fn is_available(&self, kind: MailerKind) -> bool {
        kind == MailerKind::None || self.sinks.contains_key(&kind)
    }

    /// Look up the sink for `kind`.
    ///
    /// # Errors
    ///
    /// Returns `CtMonitorError::Config` when `kind` is not `none` and no sink
    /// was registered for it.
    pub fn resolve(&self, kind: MailerKind) -> Result<Option<Arc<dyn Mailer>>> {
        if kind == MailerKind::None {
            return Ok(None);
        }
        self.sinks.get(&kind).cloned().map(Some).ok_or_else(|| {
            CtMonitorError::Config(format!(
                "mailer `{}` selected but no `{}` section is configured",
                kind, kind
            ))
            .into()
        })
    }
}
