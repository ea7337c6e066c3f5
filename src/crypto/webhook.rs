//! Billing webhook signatures
//!
//! Header format: `t=<unix seconds>,v1=<hex>[,v1=<hex>...]`. The signed
//! message is `"<t>.<raw body>"`. Several `v1` entries may be present while
//! the provider rotates its secret.

use chrono::{DateTime, Duration, Utc};
use tracing::debug;

use super::signing::{SecretRing, verify_timestamped};

/// Tolerance used by the billing provider
pub const DEFAULT_WEBHOOK_TOLERANCE_SECS: i64 = 300;

/// Parsed signature header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookSignatureHeader<'a> {
    pub timestamp: &'a str,
    pub signatures: Vec<&'a str>,
}

/// Split a signature header into its timestamp and `v1` entries.
/// Unknown keys are ignored. None when either part is missing.
pub fn parse_signature_header(header: &str) -> Option<WebhookSignatureHeader<'_>> {
    let mut timestamp = None;
    let mut signatures = Vec::new();

    for part in header.split(',') {
        let Some((key, value)) = part.trim().split_once('=') else {
            continue;
        };
        match key.trim() {
            "t" => timestamp = Some(value.trim()),
            "v1" => signatures.push(value.trim()),
            _ => {}
        }
    }

    match timestamp {
        Some(timestamp) if !timestamp.is_empty() && !signatures.is_empty() => {
            Some(WebhookSignatureHeader {
                timestamp,
                signatures,
            })
        }
        _ => None,
    }
}

/// Verify a raw webhook body against its signature header
pub fn verify_webhook_signature(
    payload: &str,
    header: &str,
    ring: &SecretRing,
    now: DateTime<Utc>,
    tolerance: Duration,
) -> bool {
    let Some(parsed) = parse_signature_header(header) else {
        debug!("Webhook rejected: malformed signature header");
        return false;
    };

    verify_timestamped(
        ring,
        parsed.timestamp,
        payload,
        &parsed.signatures,
        now,
        tolerance,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::signing::{SigningSecret, sign_timestamped};

    const BODY: &str = r#"{"id":"evt_1","type":"invoice.paid"}"#;

    fn ring() -> SecretRing {
        SecretRing::new(SigningSecret::from("whsec_test_0123456789"))
    }

    fn now() -> DateTime<Utc> {
        DateTime::from_timestamp(1_760_000_000, 0).unwrap()
    }

    fn tolerance() -> Duration {
        Duration::seconds(DEFAULT_WEBHOOK_TOLERANCE_SECS)
    }

    #[test]
    fn test_parse_header() {
        let parsed = parse_signature_header("t=123, v1=aa ,v0=zz,v1=bb").unwrap();
        assert_eq!(parsed.timestamp, "123");
        assert_eq!(parsed.signatures, vec!["aa", "bb"]);

        assert!(parse_signature_header("v1=aa").is_none());
        assert!(parse_signature_header("t=123").is_none());
        assert!(parse_signature_header("").is_none());
    }

    #[test]
    fn test_valid_signature() {
        let ring = ring();
        let sig = sign_timestamped(ring.active(), now().timestamp(), BODY);
        let header = format!("t={},v1={}", now().timestamp(), sig);
        assert!(verify_webhook_signature(BODY, &header, &ring, now(), tolerance()));
    }

    #[test]
    fn test_modified_body_rejected() {
        let ring = ring();
        let sig = sign_timestamped(ring.active(), now().timestamp(), BODY);
        let header = format!("t={},v1={}", now().timestamp(), sig);
        let tampered = BODY.replace("invoice.paid", "invoice.void");
        assert!(!verify_webhook_signature(&tampered, &header, &ring, now(), tolerance()));
    }

    #[test]
    fn test_stale_timestamp_rejected() {
        let ring = ring();
        let ts = now().timestamp() - 301;
        let sig = sign_timestamped(ring.active(), ts, BODY);
        let header = format!("t={},v1={}", ts, sig);
        assert!(!verify_webhook_signature(BODY, &header, &ring, now(), tolerance()));
    }

    #[test]
    fn test_one_of_several_signatures_matches() {
        let ring = ring();
        let sig = sign_timestamped(ring.active(), now().timestamp(), BODY);
        let header = format!("t={},v1={},v1={}", now().timestamp(), "0".repeat(64), sig);
        assert!(verify_webhook_signature(BODY, &header, &ring, now(), tolerance()));
    }

    #[test]
    fn test_garbage_header_rejected() {
        assert!(!verify_webhook_signature(BODY, "nonsense", &ring(), now(), tolerance()));
        assert!(!verify_webhook_signature(BODY, "t=abc,v1=00", &ring(), now(), tolerance()));
    }
}
