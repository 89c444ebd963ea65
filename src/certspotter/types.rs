//! Issuance records returned by the Cert Spotter issuances API
//!
//! Field names mirror the JSON wire format so that records can be passed
//! unchanged to filter plugins and report templates.

use serde::{Deserialize, Serialize};

/// One certificate issuance observed in Certificate Transparency logs.
///
/// The `id` is assigned by the upstream API and increases monotonically; it
/// is the cursor used for watermarking. On the wire it is encoded as a JSON
/// string.
///
/// # Examples
///
/// ```
/// use ct_monitor::certspotter::Issuance;
///
/// let json = r#"{"id":"42","tbs_sha256":"abc","dns_names":["example.com"]}"#;
/// let issuance: Issuance = serde_json::from_str(json).unwrap();
/// assert_eq!(issuance.id, 42);
/// assert_eq!(issuance.dns_names, vec!["example.com".to_string()]);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issuance {
    /// Upstream identifier, string-encoded 64-bit integer on the wire
    #[serde(with = "string_id")]
    pub id: u64,
    /// SHA-256 of the TBSCertificate
    #[serde(default)]
    pub tbs_sha256: String,
    /// SHA-256 of the full certificate
    #[serde(default)]
    pub cert_sha256: String,
    /// DNS names covered by the certificate
    #[serde(default)]
    pub dns_names: Vec<String>,
    /// SHA-256 of the subject public key info
    #[serde(default)]
    pub pubkey_sha256: String,
    /// Issuing certificate authority
    #[serde(default)]
    pub issuer: Issuer,
    /// Start of the validity window (RFC 3339)
    #[serde(default)]
    pub not_before: String,
    /// End of the validity window (RFC 3339)
    #[serde(default)]
    pub not_after: String,
    /// Revocation status, when known
    #[serde(default)]
    pub revoked: Option<bool>,
    /// Issuer instructions for reporting certificate problems
    #[serde(default)]
    pub problem_reporting: Option<String>,
    /// Raw certificate metadata and bytes
    #[serde(default)]
    pub cert: Certificate,
}

impl Issuance {
    /// Returns the certificate fingerprint.
    ///
    /// Prefers the top-level `cert_sha256` and falls back to the expanded
    /// certificate object.
    pub fn fingerprint(&self) -> &str {
        if self.cert_sha256.is_empty() {
            &self.cert.sha256
        } else {
            &self.cert_sha256
        }
    }
}

/// Issuer of a certificate.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issuer {
    /// Distinguished name of the issuer
    #[serde(default)]
    pub name: String,
    /// Human-friendly CA name
    #[serde(default)]
    pub friendly_name: Option<String>,
    /// SHA-256 of the issuer public key
    #[serde(default)]
    pub pubkey_sha256: String,
    /// CA website
    #[serde(default)]
    pub website: Option<String>,
    /// CAA identifiers recognized by the CA
    #[serde(default)]
    pub caa_domains: Vec<String>,
    /// Organization operating the CA
    #[serde(default)]
    pub operator: Option<Operator>,
}

/// Organization operating a certificate authority.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operator {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub website: Option<String>,
}

/// Expanded certificate object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Certificate {
    /// `cert` or `precert`
    #[serde(rename = "type", default)]
    pub cert_type: String,
    #[serde(default)]
    pub sha256: String,
    /// Base64 DER bytes
    #[serde(default)]
    pub data: String,
}

/// Serde adapter for identifiers encoded as JSON strings.
///
/// Plain JSON numbers are accepted on input for leniency.
mod string_id {
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(id: &u64, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&id.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Str(String),
            Num(u64),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Str(s) => s.parse().map_err(de::Error::custom),
            Raw::Num(n) => Ok(n),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "id": "8135020985",
        "tbs_sha256": "db7c55f74732269c45fda91264003b2a25adc7ff2df687252f60772850449926",
        "cert_sha256": "20cbc0d1e87ed1d71d3b84533667ef60f22fffee634108711376dec87a38d4e2",
        "dns_names": ["sslmate.com", "www.sslmate.com"],
        "pubkey_sha256": "1b1cebcd061ba39746a477db7b90d6871d648bd293ef50e053a6c54c5c3ac112",
        "issuer": {
            "friendly_name": "Sectigo",
            "website": "https://sectigo.com/",
            "caa_domains": ["sectigo.com", "comodoca.com"],
            "operator": {"name": "Sectigo", "website": "https://sectigo.com/"},
            "name": "C=GB, O=Sectigo Limited, CN=Sectigo RSA Domain Validation Secure Server CA",
            "pubkey_sha256": "e1ae9c3de848ece1ba72e0d991ae4d0d9ec547c6bad1dddab9d6beb0a7e0e0d8"
        },
        "not_before": "2022-10-22T00:00:00Z",
        "not_after": "2023-11-21T23:59:59Z",
        "revoked": false,
        "problem_reporting": "sslabuse[at]sectigo[dot]com",
        "cert": {"type": "cert", "sha256": "20cbc0d1e87ed1d71d3b84533667ef60f22fffee634108711376dec87a38d4e2", "data": "MIIB"}
    }"#;

    #[test]
    fn test_deserialize_full_issuance() {
        let issuance: Issuance = serde_json::from_str(SAMPLE).unwrap();
        assert_eq!(issuance.id, 8_135_020_985);
        assert_eq!(issuance.dns_names.len(), 2);
        assert_eq!(issuance.issuer.friendly_name.as_deref(), Some("Sectigo"));
        assert_eq!(
            issuance.issuer.operator.as_ref().map(|o| o.name.as_str()),
            Some("Sectigo")
        );
        assert_eq!(issuance.cert.cert_type, "cert");
        assert_eq!(issuance.revoked, Some(false));
    }

    #[test]
    fn test_id_serializes_as_string() {
        let issuance: Issuance = serde_json::from_str(SAMPLE).unwrap();
        let value = serde_json::to_value(&issuance).unwrap();
        assert_eq!(value["id"], serde_json::json!("8135020985"));
        assert_eq!(value["cert"]["type"], serde_json::json!("cert"));
    }

    #[test]
    fn test_numeric_id_accepted() {
        let issuance: Issuance = serde_json::from_str(r#"{"id": 7}"#).unwrap();
        assert_eq!(issuance.id, 7);
    }

    #[test]
    fn test_non_numeric_id_rejected() {
        let result = serde_json::from_str::<Issuance>(r#"{"id": "seven"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_fingerprint_falls_back_to_cert_object() {
        let mut issuance: Issuance = serde_json::from_str(SAMPLE).unwrap();
        issuance.cert_sha256.clear();
        issuance.cert.sha256 = "fallback".to_string();
        assert_eq!(issuance.fingerprint(), "fallback");
    }
}
