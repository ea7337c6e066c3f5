//! Signed share links
//!
//!   POST /links/share -> Sign an ephemeral share link
//!   GET  /a/{token}   -> Redeem a signed link

use axum::{
    Json, Router,
    extract::{Path, State, rejection::JsonRejection},
    http::HeaderMap,
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::rights::check_distribution;
use super::{PeerAddr, TrustApiState, actor_id, json_body, rate_limit_headers};
use crate::audit::AuditStatus;
use crate::crypto::{AttributionPayload, LinkPurpose};
use crate::error::{TrustError, TrustResult};
use crate::growth::{decorate_destination, invite_url};

/// `utm_source` when the caller names none
const DEFAULT_SHARE_SOURCE: &str = "mashups_signature";

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShareLinkRequest {
    #[serde(default)]
    pub campaign_id: String,
    #[serde(default)]
    pub creator_id: String,
    #[serde(default)]
    pub destination: String,
    pub source: Option<String>,
    /// When set, the mashup must clear the rights gate first
    pub mashup_id: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShareLinkResponse {
    pub token: String,
    pub url: String,
    pub expires_at: DateTime<Utc>,
}

// ============================================================================
// Handlers
// ============================================================================

pub async fn create_share_link(
    State(state): State<TrustApiState>,
    peer: PeerAddr,
    headers: HeaderMap,
    body: Result<Json<ShareLinkRequest>, JsonRejection>,
) -> TrustResult<Response> {
    let rule = state.rate_limits.share;
    let decision = state.enforce_rate_limit("share", rule, &headers, &peer)?;

    let request = json_body(body, "Invalid request.")?;
    let campaign_id = request.campaign_id.trim();
    let creator_id = request.creator_id.trim();
    if campaign_id.is_empty() || creator_id.is_empty() || request.destination.trim().is_empty() {
        return Err(TrustError::validation(
            "campaignId, creatorId, and destination are required.",
        ));
    }

    let source = request
        .source
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(DEFAULT_SHARE_SOURCE);
    let destination = decorate_destination(
        &request.destination,
        &[
            ("utm_source", source),
            ("utm_medium", "creator_campaign"),
            ("utm_campaign", campaign_id),
        ],
    )?;

    // Only well-formed requests reach the rights gate
    if let Some(mashup_id) = request
        .mashup_id
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty())
    {
        check_distribution(&state, &headers, mashup_id)?;
    }

    let payload = AttributionPayload::new(campaign_id, creator_id, destination);
    let token = state
        .signer
        .mint(&payload, LinkPurpose::Share, state.clock.now())?;

    state.audit.emit(
        state.audit_event("share_link.create", "attribution_link")
            .with_actor(actor_id(&headers).as_deref())
            .with_resource_id(campaign_id)
            .with_metadata("creatorId", creator_id)
            .with_metadata("expiresAt", token.expires_at.to_rfc3339()),
    );
    info!(campaign_id = %campaign_id, "Share link signed");

    let response = ShareLinkResponse {
        url: invite_url(&state.app_url, token.as_str()),
        expires_at: token.expires_at,
        token: token.into_string(),
    };
    Ok((rate_limit_headers(rule, &decision), Json(response)).into_response())
}

/// Verify a token and send the visitor on to its destination
pub async fn redeem_link(
    State(state): State<TrustApiState>,
    Path(token): Path<String>,
) -> TrustResult<Redirect> {
    let claims = match state.signer.verify(&token, state.clock.now()).into_result() {
        Ok(claims) => claims,
        Err(e) => {
            debug!("Attribution link rejected");
            state.audit.emit(
                state.audit_event("attribution.open", "attribution_link")
                    .with_status(AuditStatus::Error),
            );
            return Err(e);
        }
    };

    state.audit.emit(
        state.audit_event("attribution.open", "attribution_link")
            .with_resource_id(claims.payload.campaign_id.clone())
            .with_metadata("creatorId", claims.payload.creator_id.clone())
            .with_metadata(
                "purpose",
                serde_json::to_value(claims.purpose).unwrap_or_default(),
            ),
    );

    Ok(Redirect::temporary(&claims.payload.destination))
}

pub fn routes() -> Router<TrustApiState> {
    Router::new()
        .route("/links/share", post(create_share_link))
        .route("/a/{token}", get(redeem_link))
}
