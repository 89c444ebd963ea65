//! Sendgrid v3 `mail/send` sink

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tracing::info;

use crate::config::SendgridConfig;
use crate::error::{CtMonitorError, Result};
use crate::mailer::Mailer;

#[derive(Debug, Serialize)]
struct SendRequest<'a> {
    personalizations: Vec<Personalization<'a>>,
    from: Address<'a>,
    subject: &'a str,
    content: Vec<Content<'a>>,
}

#[derive(Debug, Serialize)]
struct Personalization<'a> {
    to: Vec<Address<'a>>,
}

#[derive(Debug, Serialize)]
struct Address<'a> {
    email: &'a str,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    #[serde(rename = "type")]
    content_type: &'a str,
    value: &'a str,
}

#[derive(Debug, Clone)]
pub struct SendgridMailer {
    config: SendgridConfig,
    http: reqwest::Client,
}

impl SendgridMailer {
    pub fn new(config: SendgridConfig, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("ct-monitor/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { config, http })
    }
}

#[async_trait]
impl Mailer for SendgridMailer {
    fn init(&self) -> Result<()> {
        if self.config.from.trim().is_empty() {
            return Err(CtMonitorError::Mailer("missing sender".to_string()).into());
        }
        if self.config.to.trim().is_empty() {
            return Err(CtMonitorError::Mailer("missing recipient".to_string()).into());
        }
        if self.config.api_key.trim().is_empty() {
            return Err(CtMonitorError::Mailer("missing api_key".to_string()).into());
        }
        url::Url::parse(&self.config.endpoint).map_err(|e| {
            CtMonitorError::Mailer(format!(
                "invalid sendgrid endpoint `{}`: {}",
                self.config.endpoint, e
            ))
        })?;
        Ok(())
    }

    async fn send(&self, subject: &str, body: &str) -> Result<()> {
        let request = SendRequest {
            personalizations: vec![Personalization {
                to: vec![Address {
                    email: &self.config.to,
                }],
            }],
            from: Address {
                email: &self.config.from,
            },
            subject,
            content: vec![Content {
                content_type: "text/plain",
                value: body,
            }],
        };

        let response = self
            .http
            .post(&self.config.endpoint)
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| CtMonitorError::Notify(format!("sendgrid request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(CtMonitorError::Notify(format!(
                "sendgrid returned {}: {}",
                status.as_u16(),
                text
            ))
            .into());
        }

        info!(to = %self.config.to, status = status.as_u16(), "Report sent via Sendgrid");
        Ok(())
    }
}
