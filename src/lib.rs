//! Mashups Trust Core
//!
//! Rights-risk policy, signed attribution links, billing webhook
//! verification and issuance rate limiting for a creator-content platform.
//!
//! ## Module Structure
//!
//! ```text
//! src/
//! ├── lib.rs         - Crate root with re-exports
//! ├── main.rs        - Server entrypoint
//! ├── config.rs      - Environment configuration and validation
//! ├── clock.rs       - Injectable time source
//! ├── error.rs       - Boundary errors and HTTP mapping
//! ├── audit.rs       - Non-blocking audit sink and in-memory audit log
//! ├── ratelimit.rs   - Fixed-window limiter over a pluggable store
//! ├── rights/        - Rights risk policy
//! │   ├── profile.rs - Rights metadata and deterministic fallback
//! │   ├── scorer.rs  - Score, route and reasons
//! │   └── catalog.rs - Known profiles by content id
//! ├── crypto/        - Signing
//! │   ├── signing.rs     - Timestamped HMAC-SHA256, secret ring
//! │   ├── attribution.rs - Share and referral link tokens
//! │   └── webhook.rs     - Billing signature headers
//! ├── growth/        - Referral program
//! │   ├── invite.rs   - Invite creation
//! │   ├── revshare.rs - Revenue-share clamp and accounting
//! │   └── ledger.rs   - Invite/conversion records and summary
//! └── api/           - HTTP endpoints and middleware
//! ```
//!
//! ## Request Flow
//!
//! ```text
//! request ─► RateLimiter ─► RiskScorer and/or AttributionSigner ─► AuditSink
//!                │                        │
//!                ▼                        ▼
//!            429 + Retry-After       decision / signed URL
//! ```

pub mod api;
pub mod audit;
pub mod clock;
pub mod config;
pub mod crypto;
pub mod error;
pub mod growth;
pub mod ratelimit;
pub mod rights;

// Re-export main types for convenience
pub use audit::{AuditDispatcher, AuditEvent, AuditLogger, AuditSink, AuditStatus, NoopAuditSink};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::TrustConfig;
pub use crypto::{
    AttributionClaims, AttributionPayload, AttributionSigner, AttributionToken, LinkPurpose,
    LinkTtls, SecretRing, SigningSecret, TokenCheck, verify_webhook_signature,
};
pub use error::{TrustError, TrustResult};
pub use growth::{
    CreatorTier, InMemoryInviteLedger, InviteLedger, ReferralInvite, ReferralSummary,
    RevShareBounds, referral_revenue_share_cents, should_count_referral_conversion,
};
pub use ratelimit::{
    InMemoryRateLimitStore, RateDecision, RateLimitStore, RateLimiter, resolve_rate_limit_key,
};
pub use rights::{
    DeclarationMode, DeclarationStatus, InMemoryRightsCatalog, RightsCatalog, RightsInput,
    RightsProfile, RiskAssessment, RiskRoute, RiskScorer, RiskThresholds, ScoreWeights,
};

// Re-export API types
pub use api::{SecurityMiddlewareConfig, SecurityState, TrustApiState, create_app, create_router};
