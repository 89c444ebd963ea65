//! Plain SMTP sink
//!
//! Uses STARTTLS when the server offers it; with `require_encryption` the
//! upgrade is mandatory. Credentials are only sent when both username and
//! password are configured.

use async_trait::async_trait;
use lettre::message::{header, Mailbox};
use lettre::transport::smtp::authentication::Credentials;
use lettre::transport::smtp::client::{Certificate, Tls, TlsParameters};
use lettre::{Message, SmtpTransport, Transport};
use tracing::{debug, info};

use crate::config::SmtpConfig;
use crate::error::{CtMonitorError, Result};
use crate::mailer::Mailer;

#[derive(Debug, Clone)]
pub struct SmtpMailer {
    config: SmtpConfig,
}

impl SmtpMailer {
    pub fn new(config: SmtpConfig) -> Self {
        Self { config }
    }

    fn build_message(&self, subject: &str, body: &str) -> Result<Message> {
        let from: Mailbox = self
            .config
            .from
            .parse()
            .map_err(|e| CtMonitorError::Mailer(format!("invalid sender address: {}", e)))?;
        let to: Mailbox = self
            .config
            .to
            .parse()
            .map_err(|e| CtMonitorError::Mailer(format!("invalid recipient address: {}", e)))?;

        Message::builder()
            .from(from)
            .to(to)
            .subject(subject)
            .header(header::ContentType::TEXT_PLAIN)
            .body(body.to_string())
            .map_err(|e| CtMonitorError::Notify(format!("failed to build message: {}", e)).into())
    }

    fn build_transport(&self) -> Result<SmtpTransport> {
        let mut tls = TlsParameters::builder(self.config.server.clone());
        if let Some(ca_file) = &self.config.ca_cert_file {
            let pem = std::fs::read(ca_file).map_err(|e| {
                CtMonitorError::Mailer(format!(
                    "failed to read CA certificate {}: {}",
                    ca_file.display(),
                    e
                ))
            })?;
            let cert = Certificate::from_pem(&pem)
                .map_err(|e| CtMonitorError::Mailer(format!("invalid CA certificate: {}", e)))?;
            tls = tls.add_root_certificate(cert);
        }
        let tls = tls
            .build_rustls()
            .map_err(|e| CtMonitorError::Mailer(format!("invalid TLS parameters: {}", e)))?;

        let tls = if self.config.require_encryption {
            Tls::Required(tls)
        } else {
            Tls::Opportunistic(tls)
        };

        let mut builder = SmtpTransport::builder_dangerous(&self.config.server)
            .port(self.config.port)
            .tls(tls);

        if let (Some(username), Some(password)) = (&self.config.username, &self.config.password) {
            if !username.is_empty() && !password.is_empty() {
                builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
            }
        }

        Ok(builder.build())
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    fn init(&self) -> Result<()> {
        if self.config.from.trim().is_empty() {
            return Err(CtMonitorError::Mailer("missing sender".to_string()).into());
        }
        if self.config.to.trim().is_empty() {
            return Err(CtMonitorError::Mailer("missing recipient".to_string()).into());
        }
        if self.config.server.trim().is_empty() {
            return Err(CtMonitorError::Mailer("missing server".to_string()).into());
        }
        self.config
            .from
            .parse::<Mailbox>()
            .map_err(|e| CtMonitorError::Mailer(format!("invalid sender address: {}", e)))?;
        self.config
            .to
            .parse::<Mailbox>()
            .map_err(|e| CtMonitorError::Mailer(format!("invalid recipient address: {}", e)))?;
        Ok(())
    }

    async fn send(&self, subject: &str, body: &str) -> Result<()> {
        let message = self.build_message(subject, body)?;
        let transport = self.build_transport()?;

        debug!(
            server = %self.config.server,
            port = self.config.port,
            "Sending report over SMTP"
        );

        // lettre's SmtpTransport is blocking.
        tokio::task::spawn_blocking(move || transport.send(&message))
            .await
            .map_err(|e| CtMonitorError::Notify(format!("SMTP task failed: {}", e)))?
            .map_err(|e| CtMonitorError::Notify(format!("SMTP delivery failed: {}", e)))?;

        info!(to = %self.config.to, "Report sent over SMTP");
        Ok(())
    }
}
