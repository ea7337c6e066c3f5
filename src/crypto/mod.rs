//! Cryptographic primitives
//!
//! - `signing`: timestamped HMAC-SHA256 and the rotating secret ring
//! - `attribution`: signed share and referral link tokens
//! - `webhook`: billing webhook signature headers

pub mod attribution;
pub mod signing;
pub mod webhook;

pub use attribution::{
    AttributionClaims, AttributionPayload, AttributionSigner, AttributionToken, LinkPurpose,
    LinkTtls, TokenCheck, sign_attribution, validate_destination, verify_attribution,
};
pub use signing::{
    SecretRing, SigningSecret, constant_time_eq, hmac_sha256, sign_timestamped, verify_timestamped,
};
pub use webhook::{
    DEFAULT_WEBHOOK_TOLERANCE_SECS, WebhookSignatureHeader, parse_signature_header,
    verify_webhook_signature,
};
