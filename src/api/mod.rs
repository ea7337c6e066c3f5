//! HTTP boundary of the trust core
//!
//! Endpoints:
//!   POST /rights/risk-route          -> Preview a rights assessment
//!   POST /rights/clearance           -> Distribution gate (403 on block)
//!   POST /links/share                -> Sign an ephemeral share link (rate-limited)
//!   GET  /a/{token}                  -> Redeem a signed link (307 / 401)
//!   POST /growth/referrals           -> Create a referral invite (rate-limited)
//!   GET  /growth/referrals/summary   -> Referral revenue summary
//!   POST /webhooks/billing           -> Verify and record a billing webhook
//!   GET  /health                     -> Liveness

pub mod links;
pub mod middleware;
pub mod referrals;
pub mod rights;
pub mod webhooks;

use axum::{
    Extension, Json, Router,
    extract::{ConnectInfo, DefaultBodyLimit, State, rejection::JsonRejection},
    http::HeaderMap,
    middleware as axum_middleware,
    routing::get,
};
use chrono::Duration;
use serde::Serialize;
use serde_json::{Value, json};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::audit::{AuditEvent, AuditSink};
use crate::clock::Clock;
use crate::config::{RateLimitConfig, RateLimitRule, TrustConfig};
use crate::crypto::{AttributionSigner, SecretRing};
use crate::error::{TrustError, TrustResult};
use crate::growth::{InviteLedger, RevShareBounds};
use crate::ratelimit::{RateDecision, RateLimiter, resolve_rate_limit_key};
use crate::rights::{RightsCatalog, RiskScorer};

pub use middleware::{
    SecurityMiddlewareConfig, SecurityState, body_size_middleware, get_client_ip,
    logging_middleware, sanitize_for_log, security_headers_middleware,
};

/// Header carrying the authenticated user id set by the upstream gateway
pub const USER_ID_HEADER: &str = "x-user-id";

/// Peer address, present when served with connect info
pub type PeerAddr = Option<Extension<ConnectInfo<SocketAddr>>>;

// ============================================================================
// State
// ============================================================================

/// Shared state of every handler
#[derive(Clone)]
pub struct TrustApiState {
    pub app_url: String,
    pub scorer: Arc<RiskScorer>,
    pub catalog: Arc<dyn RightsCatalog>,
    pub signer: Arc<AttributionSigner>,
    pub webhook_ring: Option<SecretRing>,
    pub webhook_tolerance: Duration,
    pub rate_limiter: RateLimiter,
    pub rate_limits: RateLimitConfig,
    pub rev_share: RevShareBounds,
    pub ledger: Arc<dyn InviteLedger>,
    pub audit: Arc<dyn AuditSink>,
    pub clock: Arc<dyn Clock>,
}

impl TrustApiState {
    /// Wire the core components from validated configuration
    pub fn from_config(
        config: &TrustConfig,
        catalog: Arc<dyn RightsCatalog>,
        rate_limiter: RateLimiter,
        ledger: Arc<dyn InviteLedger>,
        audit: Arc<dyn AuditSink>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            app_url: config.server.app_url.clone(),
            scorer: Arc::new(RiskScorer::new(
                config.score_weights(),
                config.risk_thresholds(),
            )),
            catalog,
            signer: Arc::new(AttributionSigner::new(
                config.attribution_ring(),
                config.link_ttls(),
            )),
            webhook_ring: config.webhook_ring(),
            webhook_tolerance: config.webhook_tolerance(),
            rate_limiter,
            rate_limits: config.rate_limits.clone(),
            rev_share: config.rev_share,
            ledger,
            audit,
            clock,
        }
    }

    /// Audit event stamped by the injected clock
    pub(crate) fn audit_event(&self, action: &str, resource_type: &str) -> AuditEvent {
        AuditEvent::new(action, resource_type).with_timestamp(self.clock.now())
    }

    /// Consume one unit of `rule` for the caller, or fail with 429.
    /// Anonymous callers are told apart by proxy headers, then by peer address.
    pub(crate) fn enforce_rate_limit(
        &self,
        namespace: &str,
        rule: RateLimitRule,
        headers: &HeaderMap,
        peer: &PeerAddr,
    ) -> TrustResult<RateDecision> {
        let addr = peer.as_ref().map(|Extension(ConnectInfo(addr))| *addr);
        let origin = get_client_ip(headers, addr.as_ref());
        let key = resolve_rate_limit_key(namespace, actor_id(headers).as_deref(), &origin);
        let decision = self.rate_limiter.consume(&key, rule.limit, rule.window());
        if decision.allowed {
            Ok(decision)
        } else {
            Err(TrustError::RateLimited {
                retry_after_secs: decision.retry_after_secs(),
            })
        }
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Caller identity forwarded by the gateway, if any
pub(crate) fn actor_id(headers: &HeaderMap) -> Option<String> {
    headers
        .get(USER_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Unwrap a JSON body, mapping any rejection to a 400 with `message`
pub(crate) fn json_body<T>(
    body: Result<Json<T>, JsonRejection>,
    message: &'static str,
) -> TrustResult<T> {
    body.map(|Json(value)| value).map_err(|rejection| {
        tracing::debug!("Rejected request body: {}", rejection.body_text());
        TrustError::validation(message)
    })
}

/// Rate-limit headers echoed on accepted requests
pub(crate) fn rate_limit_headers(rule: RateLimitRule, decision: &RateDecision) -> [(&'static str, String); 2] {
    [
        ("x-ratelimit-limit", rule.limit.to_string()),
        ("x-ratelimit-remaining", decision.remaining.to_string()),
    ]
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    timestamp: String,
}

async fn health(State(state): State<TrustApiState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        timestamp: state.clock.now().to_rfc3339(),
    })
}

// ============================================================================
// Routers
// ============================================================================

/// Routes only, without middleware
pub fn create_router(state: TrustApiState) -> Router {
    Router::new()
        .merge(rights::routes())
        .merge(links::routes())
        .merge(referrals::routes())
        .merge(webhooks::routes())
        .route("/health", get(health))
        .fallback(|| async {
            (
                axum::http::StatusCode::NOT_FOUND,
                Json::<Value>(json!({ "error": "Not found." })),
            )
        })
        .with_state(state)
}

/// Routes wrapped in the security, logging and tracing layers
pub fn create_app(state: TrustApiState, security: SecurityState) -> Router {
    let max_request_size = security.config.max_request_size;

    create_router(state)
        .layer(DefaultBodyLimit::max(max_request_size))
        .layer(axum_middleware::from_fn_with_state(
            security.clone(),
            body_size_middleware,
        ))
        .layer(axum_middleware::from_fn_with_state(
            security,
            logging_middleware,
        ))
        .layer(axum_middleware::from_fn(security_headers_middleware))
        .layer(TraceLayer::new_for_http())
}
