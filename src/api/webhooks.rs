//! Billing webhooks
//!
//!   POST /webhooks/billing -> Verify the `stripe-signature` header, then
//!                             credit referral conversions

use axum::{Json, Router, body::Bytes, extract::State, http::HeaderMap, routing::post};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{info, warn};

use super::TrustApiState;
use crate::audit::AuditStatus;
use crate::crypto::verify_webhook_signature;
use crate::error::{TrustError, TrustResult};
use crate::growth::{ReferralRevenueEvent, RevenueStatus, should_count_referral_conversion};

pub const SIGNATURE_HEADER: &str = "stripe-signature";

/// Amount fields, in the order they are consulted
const AMOUNT_FIELDS: &[&str] = &["amount_total", "amount_paid", "amount_received"];

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct BillingEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub data: BillingEventData,
}

#[derive(Debug, Default, Deserialize)]
pub struct BillingEventData {
    #[serde(default)]
    pub object: Map<String, Value>,
}

impl BillingEvent {
    fn metadata(&self, key: &str) -> Option<&Value> {
        self.data.object.get("metadata")?.get(key)
    }

    fn referral_code(&self) -> Option<String> {
        self.metadata("referral_code")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_string)
    }

    /// Metadata values arrive as strings; numbers are accepted too
    fn rev_share_bps(&self) -> Option<f64> {
        self.metadata("rev_share_bps").and_then(number_like)
    }

    fn amount_cents(&self) -> f64 {
        AMOUNT_FIELDS
            .iter()
            .find_map(|field| self.data.object.get(*field).and_then(Value::as_f64))
            .unwrap_or(0.0)
    }
}

fn number_like(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookResponse {
    pub received: bool,
    pub counted: bool,
}

// ============================================================================
// Handlers
// ============================================================================

pub async fn billing_webhook(
    State(state): State<TrustApiState>,
    headers: HeaderMap,
    body: Bytes,
) -> TrustResult<Json<WebhookResponse>> {
    let Some(signature) = headers.get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok()) else {
        return Err(TrustError::validation("Missing stripe-signature header."));
    };
    let Some(ring) = state.webhook_ring.as_ref() else {
        warn!("Billing webhook received but no webhook secret is configured");
        return Err(TrustError::InvalidSignature);
    };
    let Ok(payload) = std::str::from_utf8(&body) else {
        return Err(TrustError::InvalidSignature);
    };

    if !verify_webhook_signature(
        payload,
        signature,
        ring,
        state.clock.now(),
        state.webhook_tolerance,
    ) {
        warn!("Billing webhook signature rejected");
        state.audit.emit(
            state.audit_event("billing.webhook", "billing_event").with_status(AuditStatus::Error),
        );
        return Err(TrustError::InvalidSignature);
    }

    let event: BillingEvent = serde_json::from_str(payload)
        .map_err(|_| TrustError::validation("Invalid webhook payload."))?;

    let counted = record_conversion(&state, &event);

    state.audit.emit(
        state.audit_event("billing.webhook", "billing_event")
            .with_resource_id(event.id.clone())
            .with_metadata("type", event.event_type.clone())
            .with_metadata("counted", counted),
    );

    Ok(Json(WebhookResponse {
        received: true,
        counted,
    }))
}

/// Credit the referrer named in the event metadata. Returns whether a new
/// conversion was recorded.
fn record_conversion(state: &TrustApiState, event: &BillingEvent) -> bool {
    if !should_count_referral_conversion(Some(&event.event_type)) {
        return false;
    }
    let Some(referral_code) = event.referral_code() else {
        return false;
    };

    let bps = state.rev_share.clamp(event.rev_share_bps());
    let amount = event.amount_cents();
    let revenue = ReferralRevenueEvent {
        event_id: event.id.clone(),
        event_type: event.event_type.clone(),
        referral_code: Some(referral_code.clone()),
        amount_cents: amount.round().max(0.0) as u64,
        rev_share_bps: bps,
        revenue_share_cents: state.rev_share.revenue_share_cents(amount, bps as f64),
        status: RevenueStatus::Recorded,
        recorded_at: state.clock.now(),
    };
    let share = revenue.revenue_share_cents;

    match state.ledger.record_revenue(revenue) {
        Ok(true) => {
            info!(
                code = %referral_code,
                revenue_share_cents = share,
                "Referral conversion recorded"
            );
            true
        }
        Ok(false) => false,
        Err(e) => {
            warn!(code = %referral_code, "Failed to record referral conversion: {:#}", e);
            state.audit.emit(
                state.audit_event("referral.conversion", "billing_event")
                    .with_resource_id(event.id.clone())
                    .with_status(AuditStatus::Error)
                    .with_metadata("error", e.to_string()),
            );
            false
        }
    }
}

pub fn routes() -> Router<TrustApiState> {
    Router::new().route("/webhooks/billing", post(billing_webhook))
}
