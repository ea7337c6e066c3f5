//! Signed Attribution Links
//!
//! Tokens bind a campaign, a creator and a destination to an issue time so
//! a tracked link cannot be forged, edited or replayed outside its window.
//!
//! ## Wire Format
//!
//! ```text
//! <issuedAtUnixSeconds>.<base64url(JSON body)>.<hex HMAC-SHA256>
//!
//! signed message = "<issuedAtUnixSeconds>.<base64url(JSON body)>"
//! ```
//!
//! Every character is URL-path safe, so the token is used verbatim in
//! `/a/<token>`.

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;
use url::Url;

use super::signing::{SecretRing, SigningSecret, sign_timestamped, verify_timestamped};
use crate::error::{TrustError, TrustResult};

/// What a link is for. Bound into the signature, so it selects the TTL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkPurpose {
    /// Ephemeral share link
    Share,
    /// Creator referral invite
    Referral,
}

/// Validity windows per purpose
#[derive(Debug, Clone, Copy)]
pub struct LinkTtls {
    pub share: Duration,
    pub referral: Duration,
}

impl Default for LinkTtls {
    fn default() -> Self {
        Self {
            share: Duration::hours(24),
            referral: Duration::days(14),
        }
    }
}

impl LinkTtls {
    pub fn for_purpose(&self, purpose: LinkPurpose) -> Duration {
        match purpose {
            LinkPurpose::Share => self.share,
            LinkPurpose::Referral => self.referral,
        }
    }
}

/// Fields a link attributes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttributionPayload {
    pub campaign_id: String,
    pub creator_id: String,
    pub destination: String,
}

impl AttributionPayload {
    pub fn new(
        campaign_id: impl Into<String>,
        creator_id: impl Into<String>,
        destination: impl Into<String>,
    ) -> Self {
        Self {
            campaign_id: campaign_id.into(),
            creator_id: creator_id.into(),
            destination: destination.into(),
        }
    }

    /// All fields present and the destination is an absolute http(s) URL
    pub fn validate(&self) -> TrustResult<()> {
        if self.campaign_id.trim().is_empty() {
            return Err(TrustError::validation("campaignId is required."));
        }
        if self.creator_id.trim().is_empty() {
            return Err(TrustError::validation("creatorId is required."));
        }
        validate_destination(&self.destination)?;
        Ok(())
    }
}

/// Parse a redirect target, accepting only absolute http(s) URLs
pub fn validate_destination(destination: &str) -> TrustResult<Url> {
    let url = Url::parse(destination.trim())
        .map_err(|_| TrustError::validation("destination must be an absolute URL."))?;
    match url.scheme() {
        "http" | "https" if url.has_host() => Ok(url),
        _ => Err(TrustError::validation(
            "destination must be an http(s) URL.",
        )),
    }
}

/// Body carried inside the token
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenBody {
    campaign_id: String,
    creator_id: String,
    destination: String,
    purpose: LinkPurpose,
}

/// Verified contents of a token
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttributionClaims {
    pub payload: AttributionPayload,
    pub purpose: LinkPurpose,
    pub issued_at: DateTime<Utc>,
}

/// A freshly minted token
#[derive(Debug, Clone)]
pub struct AttributionToken {
    token: String,
    pub claims: AttributionClaims,
    pub expires_at: DateTime<Utc>,
}

impl AttributionToken {
    pub fn as_str(&self) -> &str {
        &self.token
    }

    pub fn into_string(self) -> String {
        self.token
    }
}

impl fmt::Display for AttributionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.token)
    }
}

/// Outcome of verifying a token; failures carry no detail
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenCheck {
    Valid(AttributionClaims),
    Invalid,
}

impl TokenCheck {
    pub fn is_valid(&self) -> bool {
        matches!(self, TokenCheck::Valid(_))
    }

    pub fn claims(&self) -> Option<&AttributionClaims> {
        match self {
            TokenCheck::Valid(claims) => Some(claims),
            TokenCheck::Invalid => None,
        }
    }

    pub fn into_result(self) -> TrustResult<AttributionClaims> {
        match self {
            TokenCheck::Valid(claims) => Ok(claims),
            TokenCheck::Invalid => Err(TrustError::InvalidToken),
        }
    }
}

/// Sign a payload with a single secret
pub fn sign_attribution(
    payload: &AttributionPayload,
    purpose: LinkPurpose,
    secret: &SigningSecret,
    issued_at: DateTime<Utc>,
) -> TrustResult<String> {
    payload.validate()?;

    let body = TokenBody {
        campaign_id: payload.campaign_id.clone(),
        creator_id: payload.creator_id.clone(),
        destination: payload.destination.clone(),
        purpose,
    };
    let json = serde_json::to_vec(&body).map_err(anyhow::Error::from)?;
    let encoded = URL_SAFE_NO_PAD.encode(json);
    let timestamp = issued_at.timestamp();
    let signature = sign_timestamped(secret, timestamp, &encoded);

    Ok(format!("{}.{}.{}", timestamp, encoded, signature))
}

/// Verify a token against every secret of the ring.
///
/// With `ttl` set, that window applies; otherwise the window of the purpose
/// bound inside the token is used.
pub fn verify_attribution(
    token: &str,
    ring: &SecretRing,
    now: DateTime<Utc>,
    ttl: Option<Duration>,
    ttls: &LinkTtls,
) -> TokenCheck {
    let mut parts = token.split('.');
    let (Some(raw_timestamp), Some(encoded), Some(signature), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        debug!("Token rejected: malformed");
        return TokenCheck::Invalid;
    };

    if raw_timestamp.is_empty() || !raw_timestamp.bytes().all(|b| b.is_ascii_digit()) {
        debug!("Token rejected: malformed timestamp");
        return TokenCheck::Invalid;
    }

    // The body is read before the MAC check only to pick the window; the
    // purpose is covered by the signature, so a forged purpose fails below.
    let Some(body) = decode_body(encoded) else {
        debug!("Token rejected: undecodable body");
        return TokenCheck::Invalid;
    };
    let window = ttl.unwrap_or_else(|| ttls.for_purpose(body.purpose));

    if !verify_timestamped(ring, raw_timestamp, encoded, &[signature], now, window) {
        return TokenCheck::Invalid;
    }

    let Some(issued_at) = raw_timestamp
        .parse::<i64>()
        .ok()
        .and_then(|ts| DateTime::from_timestamp(ts, 0))
    else {
        return TokenCheck::Invalid;
    };

    let payload = AttributionPayload {
        campaign_id: body.campaign_id,
        creator_id: body.creator_id,
        destination: body.destination,
    };
    if payload.validate().is_err() {
        debug!("Token rejected: incomplete payload");
        return TokenCheck::Invalid;
    }

    TokenCheck::Valid(AttributionClaims {
        payload,
        purpose: body.purpose,
        issued_at,
    })
}

fn decode_body(encoded: &str) -> Option<TokenBody> {
    let bytes = URL_SAFE_NO_PAD.decode(encoded).ok()?;
    serde_json::from_slice(&bytes).ok()
}

/// Mints and verifies attribution tokens with a rotating secret ring
#[derive(Debug, Clone)]
pub struct AttributionSigner {
    ring: SecretRing,
    ttls: LinkTtls,
}

impl AttributionSigner {
    pub fn new(ring: SecretRing, ttls: LinkTtls) -> Self {
        Self { ring, ttls }
    }

    pub fn ttls(&self) -> &LinkTtls {
        &self.ttls
    }

    /// Sign with the active secret
    pub fn mint(
        &self,
        payload: &AttributionPayload,
        purpose: LinkPurpose,
        issued_at: DateTime<Utc>,
    ) -> TrustResult<AttributionToken> {
        let token = sign_attribution(payload, purpose, self.ring.active(), issued_at)?;
        // Claims carry whole seconds, matching what verification will see
        let issued_at = DateTime::from_timestamp(issued_at.timestamp(), 0).unwrap_or(issued_at);
        let expires_at = issued_at
            .checked_add_signed(self.ttls.for_purpose(purpose))
            .ok_or_else(|| anyhow::anyhow!("Link expiry out of range"))?;

        Ok(AttributionToken {
            token,
            claims: AttributionClaims {
                payload: payload.clone(),
                purpose,
                issued_at,
            },
            expires_at,
        })
    }

    /// Verify using the window of the token's own purpose
    pub fn verify(&self, token: &str, now: DateTime<Utc>) -> TokenCheck {
        verify_attribution(token, &self.ring, now, None, &self.ttls)
    }

    /// Verify with an explicit window
    pub fn verify_with_ttl(&self, token: &str, now: DateTime<Utc>, ttl: Duration) -> TokenCheck {
        verify_attribution(token, &self.ring, now, Some(ttl), &self.ttls)
    }
}
