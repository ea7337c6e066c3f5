//! Boundary errors and their HTTP mapping
//!
//! Token failures are deliberately one variant: callers never learn whether
//! the timestamp, the signature or the payload was at fault.

use axum::{
    Json,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::rights::RiskAssessment;

pub type TrustResult<T> = std::result::Result<T, TrustError>;

#[derive(Debug, Error)]
pub enum TrustError {
    /// Malformed request; nothing was scored or signed
    #[error("{0}")]
    Validation(String),

    #[error("Rate limit exceeded. Try again shortly.")]
    RateLimited { retry_after_secs: u64 },

    #[error("Invalid token.")]
    InvalidToken,

    #[error("Invalid signature.")]
    InvalidSignature,

    #[error("Distribution blocked by rights policy.")]
    RightsBlocked { assessment: Box<RiskAssessment> },

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl TrustError {
    pub fn validation(message: impl Into<String>) -> Self {
        TrustError::Validation(message.into())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            TrustError::Validation(_) => StatusCode::BAD_REQUEST,
            TrustError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            TrustError::InvalidToken | TrustError::InvalidSignature => StatusCode::UNAUTHORIZED,
            TrustError::RightsBlocked { .. } => StatusCode::FORBIDDEN,
            TrustError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for TrustError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        match self {
            TrustError::RateLimited { retry_after_secs } => {
                let mut response =
                    (status, Json(json!({ "error": self.to_string() }))).into_response();
                response
                    .headers_mut()
                    .insert(header::RETRY_AFTER, HeaderValue::from(retry_after_secs));
                response
            }
            TrustError::RightsBlocked { assessment } => (
                status,
                Json(json!({
                    "error": "Distribution blocked by rights policy.",
                    "route": assessment.route,
                    "score": assessment.score,
                    "reasons": assessment.reasons,
                })),
            )
                .into_response(),
            TrustError::Internal(e) => {
                error!("Internal error: {:#}", e);
                (status, Json(json!({ "error": "Internal error." }))).into_response()
            }
            other => (status, Json(json!({ "error": other.to_string() }))).into_response(),
        }
    }
}
