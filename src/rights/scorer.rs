//! Rights Risk Scoring
//!
//! Maps a rights profile to a 0-100 score and a distribution route.
//! Scoring is pure: the same profile and `now` always produce the same
//! assessment, so every decision can be replayed from the audit trail.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::profile::{DeclarationMode, DeclarationStatus, RightsInput, RightsProfile};

/// Distribution decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskRoute {
    Allow,
    Review,
    Block,
}

impl RiskRoute {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskRoute::Allow => "allow",
            RiskRoute::Review => "review",
            RiskRoute::Block => "block",
        }
    }
}

/// Point contributions of each profile field
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreWeights {
    pub verified: i32,
    pub pending: i32,
    pub rejected: i32,
    pub owned: i32,
    pub precleared: i32,
    pub licensed: i32,
    /// Points at fingerprint confidence 1.0
    pub confidence_scale: f64,
    pub active_license_bonus: i32,
    /// Deducted when a licensed claim has no active license
    pub missing_license_penalty: i32,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            verified: 54,
            pending: 26,
            rejected: 0,
            owned: 20,
            precleared: 15,
            licensed: 10,
            confidence_scale: 18.0,
            active_license_bonus: 12,
            missing_license_penalty: 24,
        }
    }
}

impl ScoreWeights {
    fn status(&self, status: DeclarationStatus) -> i32 {
        match status {
            DeclarationStatus::Verified => self.verified,
            DeclarationStatus::Pending => self.pending,
            DeclarationStatus::Rejected => self.rejected,
        }
    }

    fn mode(&self, mode: DeclarationMode) -> i32 {
        match mode {
            DeclarationMode::Owned => self.owned,
            DeclarationMode::Precleared => self.precleared,
            DeclarationMode::Licensed => self.licensed,
        }
    }
}

/// Configurable route boundaries
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskThresholds {
    /// Scores strictly below this block
    pub block_below: i32,
    /// Scores at or above this are allowed without review
    pub allow_at: i32,
    /// Hard ceiling applied to rejected claims
    pub rejected_ceiling: i32,
}

impl Default for RiskThresholds {
    fn default() -> Self {
        Self {
            block_below: 42,
            allow_at: 76,
            rejected_ceiling: 24,
        }
    }
}

/// Result of a rights risk assessment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskAssessment {
    pub content_id: String,
    pub declaration_status: DeclarationStatus,
    pub declaration_mode: DeclarationMode,
    pub fingerprint_confidence: f64,
    pub has_active_license: bool,
    pub license_ends_at: Option<DateTime<Utc>>,
    pub score: u8,
    pub route: RiskRoute,
    /// Ordered: status, confidence, licensing
    pub reasons: Vec<String>,
    pub assessed_at: DateTime<Utc>,
}

impl RiskAssessment {
    /// Content may be distributed without human review
    pub fn is_rights_safe(&self) -> bool {
        self.route == RiskRoute::Allow
    }

    pub fn is_blocked(&self) -> bool {
        self.route == RiskRoute::Block
    }
}

/// Deterministic rights risk policy
#[derive(Debug, Clone, Default)]
pub struct RiskScorer {
    weights: ScoreWeights,
    thresholds: RiskThresholds,
}

impl RiskScorer {
    pub fn new(weights: ScoreWeights, thresholds: RiskThresholds) -> Self {
        Self {
            weights,
            thresholds,
        }
    }

    /// Resolve a partial input against its fallback and assess it
    pub fn assess_input(&self, input: &RightsInput, now: DateTime<Utc>) -> RiskAssessment {
        self.assess(&input.resolve(now), now)
    }

    /// Assess a resolved profile. Total: never fails.
    pub fn assess(&self, profile: &RightsProfile, now: DateTime<Utc>) -> RiskAssessment {
        let status = profile.declaration_status;
        let mode = profile.declaration_mode;
        let confidence = sanitize_confidence(profile.fingerprint_confidence);
        let licensed = profile.has_active_license;

        let score = self.score(status, mode, confidence, licensed);
        let route = self.route(status, score);

        RiskAssessment {
            content_id: profile.content_id.clone(),
            declaration_status: status,
            declaration_mode: mode,
            fingerprint_confidence: confidence,
            has_active_license: licensed,
            license_ends_at: profile.license_ends_at,
            score,
            route,
            reasons: reasons(status, mode, confidence, licensed),
            assessed_at: now,
        }
    }

    fn score(
        &self,
        status: DeclarationStatus,
        mode: DeclarationMode,
        confidence: f64,
        has_active_license: bool,
    ) -> u8 {
        let w = &self.weights;
        let mut score = w.status(status)
            + w.mode(mode)
            + (confidence * w.confidence_scale).round() as i32;

        if has_active_license {
            score += w.active_license_bonus;
        }
        if mode == DeclarationMode::Licensed && !has_active_license {
            score -= w.missing_license_penalty;
        }
        if status == DeclarationStatus::Rejected {
            score = score.min(self.thresholds.rejected_ceiling);
        }

        score.clamp(0, 100) as u8
    }

    fn route(&self, status: DeclarationStatus, score: u8) -> RiskRoute {
        let score = i32::from(score);
        if status == DeclarationStatus::Rejected || score < self.thresholds.block_below {
            RiskRoute::Block
        } else if score >= self.thresholds.allow_at {
            RiskRoute::Allow
        } else {
            RiskRoute::Review
        }
    }
}

fn sanitize_confidence(confidence: f64) -> f64 {
    if confidence.is_finite() {
        confidence.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

fn reasons(
    status: DeclarationStatus,
    mode: DeclarationMode,
    confidence: f64,
    has_active_license: bool,
) -> Vec<String> {
    let status_reason = match status {
        DeclarationStatus::Verified => "Rights declaration is verified.",
        DeclarationStatus::Pending => "Rights declaration is pending review.",
        DeclarationStatus::Rejected => "Rights declaration is rejected.",
    };

    let licensing_reason = match mode {
        DeclarationMode::Licensed if has_active_license => "Active license window detected.",
        DeclarationMode::Licensed => "No active license window.",
        DeclarationMode::Owned => "Creator claims full ownership.",
        DeclarationMode::Precleared => "Usage is precleared by rights workflow.",
    };

    vec![
        status_reason.to_string(),
        format!(
            "Fingerprint confidence {}%.",
            (confidence * 100.0).round() as i64
        ),
        licensing_reason.to_string(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    fn profile(
        status: DeclarationStatus,
        mode: DeclarationMode,
        confidence: f64,
        licensed: bool,
    ) -> RightsProfile {
        RightsProfile {
            content_id: "mash-test".to_string(),
            declaration_status: status,
            declaration_mode: mode,
            fingerprint_confidence: confidence,
            has_active_license: licensed,
            license_ends_at: None,
        }
    }

    #[test]
    fn test_verified_owned_clamps_to_100() {
        let scorer = RiskScorer::default();
        let a = scorer.assess(
            &profile(DeclarationStatus::Verified, DeclarationMode::Owned, 0.96, true),
            now(),
        );
        // 54 + 20 + 17 + 12 = 103
        assert_eq!(a.score, 100);
        assert_eq!(a.route, RiskRoute::Allow);
        assert!(a.is_rights_safe());
    }

    #[test]
    fn test_pending_licensed_without_license_blocks() {
        let scorer = RiskScorer::default();
        let a = scorer.assess(
            &profile(DeclarationStatus::Pending, DeclarationMode::Licensed, 0.62, false),
            now(),
        );
        // 26 + 10 + 11 - 24
        assert_eq!(a.score, 23);
        assert_eq!(a.route, RiskRoute::Block);
    }

    #[test]
    fn test_rejected_licensed_floors_at_zero() {
        let scorer = RiskScorer::default();
        let a = scorer.assess(
            &profile(DeclarationStatus::Rejected, DeclarationMode::Licensed, 0.44, false),
            now(),
        );
        assert_eq!(a.score, 0);
        assert_eq!(a.route, RiskRoute::Block);
    }

    #[test]
    fn test_rejected_ceiling_applies() {
        let scorer = RiskScorer::default();
        let a = scorer.assess(
            &profile(DeclarationStatus::Rejected, DeclarationMode::Owned, 1.0, true),
            now(),
        );
        // 0 + 20 + 18 + 12 = 50 -> 24
        assert_eq!(a.score, 24);
        assert_eq!(a.route, RiskRoute::Block);
    }

    #[test]
    fn test_rejected_blocks_even_with_permissive_thresholds() {
        let scorer = RiskScorer::new(
            ScoreWeights::default(),
            RiskThresholds {
                block_below: 0,
                allow_at: 10,
                rejected_ceiling: 100,
            },
        );
        let a = scorer.assess(
            &profile(DeclarationStatus::Rejected, DeclarationMode::Owned, 1.0, true),
            now(),
        );
        assert_eq!(a.score, 50);
        assert_eq!(a.route, RiskRoute::Block);
    }

    #[test]
    fn test_license_weights_are_configurable() {
        let scorer = RiskScorer::new(
            ScoreWeights {
                active_license_bonus: 0,
                missing_license_penalty: 40,
                ..ScoreWeights::default()
            },
            RiskThresholds::default(),
        );
        let licensed = scorer.assess(
            &profile(DeclarationStatus::Verified, DeclarationMode::Licensed, 0.5, true),
            now(),
        );
        assert_eq!(licensed.score, 54 + 10 + 9);

        let unlicensed = scorer.assess(
            &profile(DeclarationStatus::Verified, DeclarationMode::Licensed, 0.5, false),
            now(),
        );
        assert_eq!(unlicensed.score, 54 + 10 + 9 - 40);
        assert_eq!(unlicensed.route, RiskRoute::Block);
    }

    #[test]
    fn test_review_band() {
        let scorer = RiskScorer::default();
        // 26 + 15 + 10 + 12 = 63
        let a = scorer.assess(
            &profile(DeclarationStatus::Pending, DeclarationMode::Precleared, 0.58, true),
            now(),
        );
        assert_eq!(a.score, 63);
        assert_eq!(a.route, RiskRoute::Review);
    }

    #[test]
    fn test_route_boundaries() {
        let scorer = RiskScorer::default();
        assert_eq!(scorer.route(DeclarationStatus::Pending, 41), RiskRoute::Block);
        assert_eq!(scorer.route(DeclarationStatus::Pending, 42), RiskRoute::Review);
        assert_eq!(scorer.route(DeclarationStatus::Pending, 75), RiskRoute::Review);
        assert_eq!(scorer.route(DeclarationStatus::Pending, 76), RiskRoute::Allow);
    }

    #[test]
    fn test_no_penalty_outside_licensed_mode() {
        let scorer = RiskScorer::default();
        for mode in [DeclarationMode::Owned, DeclarationMode::Precleared] {
            let a = scorer.assess(
                &profile(DeclarationStatus::Pending, mode, 0.0, false),
                now(),
            );
            assert_eq!(i32::from(a.score), 26 + scorer.weights.mode(mode));
        }
    }

    #[test]
    fn test_confidence_rounding() {
        let scorer = RiskScorer::default();
        // 0.25 * 18 = 4.5 rounds up to 5
        let a = scorer.assess(
            &profile(DeclarationStatus::Pending, DeclarationMode::Precleared, 0.25, false),
            now(),
        );
        assert_eq!(a.score, 26 + 15 + 5);
    }

    #[test]
    fn test_out_of_range_confidence_clamped() {
        let scorer = RiskScorer::default();
        let high = scorer.assess(
            &profile(DeclarationStatus::Pending, DeclarationMode::Precleared, 7.0, false),
            now(),
        );
        assert_eq!(high.fingerprint_confidence, 1.0);
        assert_eq!(high.score, 26 + 15 + 18);

        let negative = scorer.assess(
            &profile(DeclarationStatus::Pending, DeclarationMode::Precleared, -2.0, false),
            now(),
        );
        assert_eq!(negative.score, 26 + 15);
    }

    #[test]
    fn test_reason_order_and_text() {
        let scorer = RiskScorer::default();
        let a = scorer.assess(
            &profile(DeclarationStatus::Pending, DeclarationMode::Licensed, 0.62, false),
            now(),
        );
        assert_eq!(
            a.reasons,
            vec![
                "Rights declaration is pending review.".to_string(),
                "Fingerprint confidence 62%.".to_string(),
                "No active license window.".to_string(),
            ]
        );
    }

    #[test]
    fn test_assessment_is_deterministic() {
        let scorer = RiskScorer::default();
        let input = RightsInput::for_content("unseen-content-77");
        assert_eq!(scorer.assess_input(&input, now()), scorer.assess_input(&input, now()));
    }

    #[test]
    fn test_exhaustive_score_range_and_route_precedence() {
        let scorer = RiskScorer::default();
        let statuses = [
            DeclarationStatus::Verified,
            DeclarationStatus::Pending,
            DeclarationStatus::Rejected,
        ];
        let modes = [
            DeclarationMode::Owned,
            DeclarationMode::Precleared,
            DeclarationMode::Licensed,
        ];

        for status in statuses {
            for mode in modes {
                for licensed in [true, false] {
                    for step in 0..=20 {
                        let confidence = step as f64 / 20.0;
                        let a = scorer.assess(&profile(status, mode, confidence, licensed), now());
                        assert!(a.score <= 100);
                        if status == DeclarationStatus::Rejected {
                            assert!(a.score <= 24);
                            assert_eq!(a.route, RiskRoute::Block);
                        } else if a.score < 42 {
                            assert_eq!(a.route, RiskRoute::Block);
                        } else if a.score >= 76 {
                            assert_eq!(a.route, RiskRoute::Allow);
                        } else {
                            assert_eq!(a.route, RiskRoute::Review);
                        }
                    }
                }
            }
        }
    }
}
