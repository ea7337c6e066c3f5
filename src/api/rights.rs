//! Rights risk endpoints
//!
//!   POST /rights/risk-route -> Preview an assessment from an id and/or explicit inputs
//!   POST /rights/clearance  -> Gate distribution of a catalogued mashup

use axum::{
    Json, Router,
    extract::{State, rejection::JsonRejection},
    http::HeaderMap,
    routing::post,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::{TrustApiState, actor_id, json_body};
use crate::audit::AuditStatus;
use crate::error::{TrustError, TrustResult};
use crate::rights::{
    DeclarationMode, DeclarationStatus, RightsInput, RiskAssessment, RiskRoute, profile_for,
};

/// Content id used when a preview names no mashup
const ADHOC_PREVIEW_ID: &str = "adhoc-preview";

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskRouteRequest {
    pub mashup_id: Option<String>,
    pub declaration_status: Option<DeclarationStatus>,
    pub declaration_mode: Option<DeclarationMode>,
    pub fingerprint_confidence: Option<f64>,
    pub has_active_license: Option<bool>,
    pub license_ends_at: Option<DateTime<Utc>>,
}

impl RiskRouteRequest {
    fn mashup_id(&self) -> Option<&str> {
        self.mashup_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
    }

    fn to_input(&self) -> RightsInput {
        RightsInput {
            content_id: self.mashup_id().unwrap_or(ADHOC_PREVIEW_ID).to_string(),
            declaration_status: self.declaration_status,
            declaration_mode: self.declaration_mode,
            fingerprint_confidence: self.fingerprint_confidence,
            has_active_license: self.has_active_license,
            license_ends_at: self.license_ends_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RiskRouteResponse {
    pub assessment: RiskAssessment,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClearanceRequest {
    pub mashup_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClearanceResponse {
    pub cleared: bool,
    pub requires_review: bool,
    pub assessment: RiskAssessment,
}

// ============================================================================
// Handlers
// ============================================================================

/// Preview assessment. Explicit inputs are resolved field by field against
/// the fallback profile; an id alone uses the catalog.
pub async fn risk_route(
    State(state): State<TrustApiState>,
    headers: HeaderMap,
    body: Result<Json<RiskRouteRequest>, JsonRejection>,
) -> TrustResult<Json<RiskRouteResponse>> {
    let request = json_body(body, "Invalid risk route payload.")?;
    let input = request.to_input();

    let now = state.clock.now();
    let assessment = match (request.mashup_id(), input.has_explicit_fields()) {
        (None, false) => {
            return Err(TrustError::validation(
                "Provide mashupId or explicit risk inputs.",
            ));
        }
        (Some(id), false) => state.scorer.assess(&profile_for(state.catalog.as_ref(), id), now),
        (_, true) => state.scorer.assess_input(&input, now),
    };

    state.audit.emit(
        state
            .audit_event("rights.risk_route", "mashup")
            .with_actor(actor_id(&headers).as_deref())
            .with_resource_id(assessment.content_id.clone())
            .with_metadata("route", assessment.route.as_str())
            .with_metadata("score", assessment.score),
    );
    debug!(
        content_id = %assessment.content_id,
        score = assessment.score,
        route = assessment.route.as_str(),
        "Risk route previewed"
    );

    Ok(Json(RiskRouteResponse { assessment }))
}

/// Distribution gate. Only recorded (or fallback) metadata is considered;
/// callers cannot supply their own rights claims here.
pub async fn clearance(
    State(state): State<TrustApiState>,
    headers: HeaderMap,
    body: Result<Json<ClearanceRequest>, JsonRejection>,
) -> TrustResult<Json<ClearanceResponse>> {
    let request = json_body(body, "Invalid clearance payload.")?;
    let mashup_id = request.mashup_id.trim();
    if mashup_id.is_empty() {
        return Err(TrustError::validation("mashupId is required."));
    }

    let assessment = check_distribution(&state, &headers, mashup_id)?;

    Ok(Json(ClearanceResponse {
        cleared: true,
        requires_review: assessment.route == RiskRoute::Review,
        assessment,
    }))
}

/// Assess `mashup_id` for distribution, auditing the decision.
/// Fails with `RightsBlocked` when the route is block.
pub(crate) fn check_distribution(
    state: &TrustApiState,
    headers: &HeaderMap,
    mashup_id: &str,
) -> TrustResult<RiskAssessment> {
    let profile = profile_for(state.catalog.as_ref(), mashup_id);
    let assessment = state.scorer.assess(&profile, state.clock.now());
    let actor = actor_id(headers);

    let status = if assessment.is_blocked() {
        AuditStatus::Error
    } else {
        AuditStatus::Success
    };
    state.audit.emit(
        state.audit_event("rights.clearance", "mashup")
            .with_actor(actor.as_deref())
            .with_resource_id(mashup_id)
            .with_status(status)
            .with_metadata("route", assessment.route.as_str())
            .with_metadata("score", assessment.score),
    );

    if assessment.is_blocked() {
        warn!(
            mashup_id = %mashup_id,
            score = assessment.score,
            "Distribution blocked by rights policy"
        );
        return Err(TrustError::RightsBlocked {
            assessment: Box::new(assessment),
        });
    }

    info!(
        mashup_id = %mashup_id,
        score = assessment.score,
        route = assessment.route.as_str(),
        "Distribution cleared"
    );
    Ok(assessment)
}

pub fn routes() -> Router<TrustApiState> {
    Router::new()
        .route("/rights/risk-route", post(risk_route))
        .route("/rights/clearance", post(clearance))
}
