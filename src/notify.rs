//! Issuance reporting
//!
//! [`Notifier`] records every observed issuance (log line and gauge) and
//! renders the report subject and body with Handlebars before handing them
//! to a mail sink. Templates see two variables: `domain`, the configured
//! domain name, and `issuances`, the issuance records being reported.

use anyhow::Context;
use handlebars::Handlebars;
use serde::Serialize;
use tracing::info;

use crate::certspotter::Issuance;
use crate::config::MailTemplateConfig;
use crate::error::{CtMonitorError, Result};
use crate::mailer::Mailer;

/// Default report subject
pub const DEFAULT_SUBJECT_TEMPLATE: &str = "Certificate Transparency Notification for {{domain}}";

/// Default report body
pub const DEFAULT_BODY_TEMPLATE: &str = "ct-monitor has observed the issuance of the following certificate{{#if (gt (len issuances) 1)}}s{{/if}} for the {{domain}} domain:
{{#each issuances}}

Issuer Friendly Name: {{issuer.friendly_name}}
Issuer Distinguished Name: {{issuer.name}}
DNS Names: {{#each dns_names}}{{#unless @first}}, {{/unless}}{{this}}{{/each}}
Validity: {{not_before}} - {{not_after}}
SHA256: {{cert_sha256}}
TBS SHA256: {{tbs_sha256}}

{{problem_reporting}}
{{/each}}
";

const SUBJECT: &str = "subject";
const BODY: &str = "body";

#[derive(Serialize)]
struct ReportVars<'a> {
    domain: &'a str,
    issuances: &'a [Issuance],
}

/// Records observations and sends reports.
pub struct Notifier {
    registry: Handlebars<'static>,
}

impl std::fmt::Debug for Notifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Notifier")
            .field("templates", &self.registry.get_templates().keys())
            .finish()
    }
}

impl Notifier {
    /// Compile the subject and body templates.
    ///
    /// # Errors
    ///
    /// Returns `CtMonitorError::Template` if either template fails to parse.
    pub fn new(templates: &MailTemplateConfig) -> Result<Self> {
        let mut registry = Handlebars::new();
        registry.register_escape_fn(handlebars::no_escape);
        registry.set_strict_mode(true);
        registry
            .register_template_string(SUBJECT, &templates.subject)
            .map_err(|e| CtMonitorError::Template(format!("subject: {}", e)))?;
        registry
            .register_template_string(BODY, &templates.body)
            .map_err(|e| CtMonitorError::Template(format!("body: {}", e)))?;
        Ok(Self { registry })
    }

    /// Log and count every issuance fetched for `domain`, whether or not it
    /// will be reported.
    pub fn observe(&self, domain: &str, issuances: &[Issuance]) {
        for issuance in issuances {
            info!(
                domain = %domain,
                id = issuance.id,
                names = ?issuance.dns_names,
                sha256 = %issuance.fingerprint(),
                "Observed issuance"
            );
            crate::metrics::record_issuance(domain, issuance);
        }
    }

    /// Render the subject and body for a report.
    pub fn render(&self, domain: &str, issuances: &[Issuance]) -> Result<(String, String)> {
        let vars = ReportVars { domain, issuances };
        let subject = self
            .registry
            .render(SUBJECT, &vars)
            .map_err(|e| CtMonitorError::Template(format!("subject: {}", e)))?;
        let body = self
            .registry
            .render(BODY, &vars)
            .map_err(|e| CtMonitorError::Template(format!("body: {}", e)))?;
        // Mail subjects are single-line.
        let subject = subject.lines().next().unwrap_or_default().trim().to_string();
        Ok((subject, body))
    }

    /// Send a report for `issuances` through `sink`.
    ///
    /// Does nothing when no sink is configured.
    pub async fn report(
        &self,
        domain: &str,
        issuances: &[Issuance],
        sink: Option<&dyn Mailer>,
    ) -> Result<()> {
        let Some(sink) = sink else {
            info!(domain = %domain, count = issuances.len(), "No mailer configured, skipping report");
            return Ok(());
        };

        let (subject, body) = self.render(domain, issuances)?;
        info!(domain = %domain, count = issuances.len(), "Sending report");
        sink.send(&subject, &body)
            .await
            .with_context(|| format!("failed to send report for {}", domain))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Debug, Default)]
    struct Recorder {
        sent: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl Mailer for Recorder {
        fn init(&self) -> Result<()> {
            Ok(())
        }
        async fn send(&self, subject: &str, body: &str) -> Result<()> {
            self.sent
                .lock()
                .unwrap()
                .push((subject.to_string(), body.to_string()));
            Ok(())
        }
    }

    fn issuance(id: u64, names: &[&str]) -> Issuance {
        serde_json::from_value(serde_json::json!({
            "id": id.to_string(),
            "dns_names": names,
            "cert_sha256": format!("sha-{}", id),
            "tbs_sha256": format!("tbs-{}", id),
            "not_before": "2024-01-01T00:00:00Z",
            "not_after": "2024-04-01T00:00:00Z",
            "issuer": {"name": "C=US, O=Let's Encrypt, CN=R3", "friendly_name": "Let's Encrypt"}
        }))
        .unwrap()
    }

    fn notifier() -> Notifier {
        Notifier::new(&MailTemplateConfig::default()).unwrap()
    }

    #[test]
    fn test_default_subject() {
        let (subject, _) = notifier()
            .render("example.com", &[issuance(1, &["example.com"])])
            .unwrap();
        assert_eq!(subject, "Certificate Transparency Notification for example.com");
    }

    #[test]
    fn test_default_body_single_issuance() {
        let (_, body) = notifier()
            .render("example.com", &[issuance(1, &["example.com", "www.example.com"])])
            .unwrap();
        assert!(body.starts_with(
            "ct-monitor has observed the issuance of the following certificate for the example.com domain:"
        ));
        assert!(body.contains("DNS Names: example.com, www.example.com"));
        assert!(body.contains("Issuer Friendly Name: Let's Encrypt"));
        assert!(body.contains("SHA256: sha-1"));
        assert!(body.contains("Validity: 2024-01-01T00:00:00Z - 2024-04-01T00:00:00Z"));
    }

    #[test]
    fn test_default_body_pluralizes() {
        let (_, body) = notifier()
            .render(
                "example.com",
                &[issuance(1, &["a.example.com"]), issuance(2, &["b.example.com"])],
            )
            .unwrap();
        assert!(body.contains("following certificates for"));
        assert!(body.contains("TBS SHA256: tbs-2"));
    }

    #[test]
    fn test_invalid_template_rejected() {
        let templates = MailTemplateConfig {
            subject: "{{#if}}".to_string(),
            body: String::new(),
        };
        let err = Notifier::new(&templates).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CtMonitorError>(),
            Some(CtMonitorError::Template(_))
        ));
    }

    #[test]
    fn test_unknown_variable_fails_render() {
        let templates = MailTemplateConfig {
            subject: "{{domian}}".to_string(),
            body: String::new(),
        };
        let notifier = Notifier::new(&templates).unwrap();
        assert!(notifier.render("example.com", &[]).is_err());
    }

    #[tokio::test]
    async fn test_report_without_sink_is_noop() {
        notifier()
            .report("example.com", &[issuance(1, &["example.com"])], None)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_report_sends_rendered_message() {
        let sink = Recorder::default();
        notifier()
            .report("example.com", &[issuance(1, &["example.com"])], Some(&sink))
            .await
            .unwrap();
        let sent = sink.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].0.contains("example.com"));
        assert!(sent[0].1.contains("SHA256: sha-1"));
    }
}
