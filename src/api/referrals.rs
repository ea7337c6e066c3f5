//! Creator referral invites
//!
//!   POST /growth/referrals         -> Create a referral invite
//!   GET  /growth/referrals/summary -> Referral revenue summary

use axum::{
    Json, Router,
    extract::{State, rejection::JsonRejection},
    http::HeaderMap,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use super::{PeerAddr, TrustApiState, actor_id, json_body, rate_limit_headers};
use crate::audit::AuditStatus;
use crate::error::{TrustError, TrustResult};
use crate::growth::{CreatorTier, ReferralRequest, ReferralSummary, create_invite};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateReferralRequest {
    pub campaign_id: Option<String>,
    pub creator_tier: Option<CreatorTier>,
    pub destination: Option<String>,
    pub max_uses: Option<u32>,
    /// Raw value; non-numbers fall back to the default share
    pub rev_share_bps: Option<Value>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateReferralResponse {
    pub code: String,
    pub invite_url: String,
    pub expires_at: DateTime<Utc>,
    pub max_uses: u32,
    pub tier: CreatorTier,
    pub rev_share_bps: u32,
    pub rev_share_percent: f64,
}

// ============================================================================
// Handlers
// ============================================================================

pub async fn create_referral(
    State(state): State<TrustApiState>,
    peer: PeerAddr,
    headers: HeaderMap,
    body: Result<Json<CreateReferralRequest>, JsonRejection>,
) -> TrustResult<Response> {
    let rule = state.rate_limits.referral;
    let decision = state.enforce_rate_limit("referral", rule, &headers, &peer)?;

    let request = json_body(body, "Invalid referral payload.")?;
    let (Some(campaign_id), Some(tier), Some(destination)) = (
        request.campaign_id.filter(|c| !c.trim().is_empty()),
        request.creator_tier,
        request.destination.filter(|d| !d.trim().is_empty()),
    ) else {
        return Err(TrustError::validation(
            "campaignId, creatorTier, and destination are required.",
        ));
    };

    let referral = ReferralRequest {
        campaign_id,
        tier,
        destination,
        max_uses: request.max_uses,
        rev_share_bps: request.rev_share_bps.as_ref().and_then(Value::as_f64),
    };
    let invite = create_invite(
        &referral,
        &state.signer,
        &state.rev_share,
        &state.app_url,
        state.clock.now(),
    )?;

    let actor = actor_id(&headers);
    let event = state.audit_event("referral.invite.create", "referral_invite")
        .with_actor(actor.as_deref())
        .with_resource_id(invite.code.clone())
        .with_metadata("tier", invite.tier.as_str())
        .with_metadata("campaignId", invite.campaign_id.clone())
        .with_metadata("maxUses", invite.max_uses)
        .with_metadata("revShareBps", invite.rev_share_bps)
        .with_metadata("projectedRecurringCents", invite.projected_recurring_cents);

    // The token is already valid; a failed write only loses accounting
    match state.ledger.record_invite(&invite) {
        Ok(()) => state.audit.emit(event),
        Err(e) => {
            warn!(code = %invite.code, "Failed to record referral invite: {:#}", e);
            state.audit.emit(
                event
                    .with_status(AuditStatus::Error)
                    .with_metadata("error", e.to_string()),
            );
        }
    }
    info!(code = %invite.code, tier = %invite.tier, "Referral invite created");

    let response = CreateReferralResponse {
        rev_share_percent: invite.rev_share_percent(),
        code: invite.code,
        invite_url: invite.invite_url,
        expires_at: invite.expires_at,
        max_uses: invite.max_uses,
        tier: invite.tier,
        rev_share_bps: invite.rev_share_bps,
    };
    Ok((rate_limit_headers(rule, &decision), Json(response)).into_response())
}

pub async fn referral_summary(
    State(state): State<TrustApiState>,
) -> TrustResult<Json<ReferralSummary>> {
    let summary = state.ledger.summary()?;
    Ok(Json(summary))
}

pub fn routes() -> Router<TrustApiState> {
    Router::new()
        .route("/growth/referrals", post(create_referral))
        .route("/growth/referrals/summary", get(referral_summary))
}
