//! Timestamped HMAC-SHA256 signing shared by attribution links and webhooks.
//!
//! The signed message is always `"{timestamp}.{payload}"`, so neither the
//! timestamp nor the payload can be altered without invalidating the MAC.

use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::fmt;
use subtle::ConstantTimeEq;
use tracing::debug;

type HmacSha256 = Hmac<Sha256>;

/// A shared secret. Never printed.
#[derive(Clone)]
pub struct SigningSecret(Vec<u8>);

impl SigningSecret {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&str> for SigningSecret {
    fn from(value: &str) -> Self {
        Self::new(value.as_bytes())
    }
}

impl From<String> for SigningSecret {
    fn from(value: String) -> Self {
        Self::new(value.into_bytes())
    }
}

impl fmt::Debug for SigningSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SigningSecret(<{} bytes>)", self.0.len())
    }
}

/// Currently accepted secrets. The first one signs; all of them verify.
#[derive(Debug, Clone)]
pub struct SecretRing {
    secrets: Vec<SigningSecret>,
}

impl SecretRing {
    pub fn new(active: SigningSecret) -> Self {
        Self {
            secrets: vec![active],
        }
    }

    /// Ring with an active secret plus previous secrets still honoured
    pub fn with_previous(
        active: SigningSecret,
        previous: impl IntoIterator<Item = SigningSecret>,
    ) -> Self {
        let mut secrets = vec![active];
        secrets.extend(previous.into_iter().filter(|s| !s.is_empty()));
        Self { secrets }
    }

    /// Ring from a list where every entry is equally accepted; None if empty
    pub fn from_secrets(secrets: impl IntoIterator<Item = SigningSecret>) -> Option<Self> {
        let secrets: Vec<SigningSecret> = secrets.into_iter().filter(|s| !s.is_empty()).collect();
        if secrets.is_empty() {
            None
        } else {
            Some(Self { secrets })
        }
    }

    pub fn active(&self) -> &SigningSecret {
        &self.secrets[0]
    }

    pub fn iter(&self) -> impl Iterator<Item = &SigningSecret> {
        self.secrets.iter()
    }

    pub fn len(&self) -> usize {
        self.secrets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.secrets.is_empty()
    }
}

/// Canonical signed message
pub fn signed_message(timestamp: &str, payload: &str) -> String {
    format!("{}.{}", timestamp, payload)
}

/// Raw HMAC-SHA256 of `data`
pub fn hmac_sha256(secret: &SigningSecret, data: &[u8]) -> [u8; 32] {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(data);
    mac.finalize().into_bytes().into()
}

/// Hex HMAC over `"{timestamp}.{payload}"`
pub fn sign_timestamped(secret: &SigningSecret, timestamp: i64, payload: &str) -> String {
    let message = signed_message(&timestamp.to_string(), payload);
    hex::encode(hmac_sha256(secret, message.as_bytes()))
}

/// Constant-time byte comparison. Lengths are not secret.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.ct_eq(b).into()
}

/// Verify a timestamped signature.
///
/// `raw_timestamp` is the timestamp exactly as it travelled, so the MAC is
/// recomputed over the same bytes that were signed. Rejects unparsable
/// timestamps and any timestamp more than `tolerance` away from `now` in
/// either direction, then accepts if any candidate matches the MAC under any
/// secret of the ring.
pub fn verify_timestamped(
    ring: &SecretRing,
    raw_timestamp: &str,
    payload: &str,
    candidates: &[&str],
    now: DateTime<Utc>,
    tolerance: Duration,
) -> bool {
    let Ok(timestamp) = raw_timestamp.parse::<i64>() else {
        debug!("Signature rejected: unparsable timestamp");
        return false;
    };

    let age = now.timestamp().saturating_sub(timestamp).saturating_abs();
    if age > tolerance.num_seconds() {
        debug!("Signature rejected: timestamp outside tolerance");
        return false;
    }

    if candidates.is_empty() {
        return false;
    }

    let message = signed_message(raw_timestamp, payload);
    let mut matched = false;
    for secret in ring.iter() {
        let expected = hex::encode(hmac_sha256(secret, message.as_bytes()));
        for candidate in candidates {
            // Evaluate every pair so timing does not reveal which one matched
            matched |= constant_time_eq(candidate.as_bytes(), expected.as_bytes());
        }
    }

    if !matched {
        debug!("Signature rejected: no candidate matched");
    }
    matched
}
