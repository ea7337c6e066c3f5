//! Rights Profile Types and Deterministic Fallback
//!
//! A [`RightsProfile`] is the fully-resolved rights metadata of one content
//! item. Requests usually arrive as a partial [`RightsInput`]; missing fields
//! are filled from a fallback profile derived from the content id alone, so
//! the same unseen content always resolves to the same profile.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// State of the creator's rights claim
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeclarationStatus {
    Verified,
    Pending,
    /// Absolute veto: a rejected claim always blocks distribution
    Rejected,
}

impl DeclarationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeclarationStatus::Verified => "verified",
            DeclarationStatus::Pending => "pending",
            DeclarationStatus::Rejected => "rejected",
        }
    }
}

impl fmt::Display for DeclarationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Nature of the creator's rights claim
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeclarationMode {
    Owned,
    Precleared,
    Licensed,
}

impl DeclarationMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeclarationMode::Owned => "owned",
            DeclarationMode::Precleared => "precleared",
            DeclarationMode::Licensed => "licensed",
        }
    }
}

impl fmt::Display for DeclarationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fully-resolved rights metadata for one content item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RightsProfile {
    pub content_id: String,
    pub declaration_status: DeclarationStatus,
    pub declaration_mode: DeclarationMode,
    /// Automated content-matching confidence in [0, 1]
    pub fingerprint_confidence: f64,
    pub has_active_license: bool,
    pub license_ends_at: Option<DateTime<Utc>>,
}

impl RightsProfile {
    /// Deterministic stand-in profile for content with no recorded metadata.
    ///
    /// The seed is the sum of the UTF-16 lead unit of every character in the
    /// id, which keeps the mapping identical to the values legacy clients
    /// have already displayed.
    pub fn fallback(content_id: &str) -> Self {
        let seed = char_code_seed(content_id);

        let declaration_status = if seed % 3 == 0 {
            DeclarationStatus::Verified
        } else {
            DeclarationStatus::Pending
        };

        let declaration_mode = if seed % 2 == 0 {
            DeclarationMode::Precleared
        } else if seed % 5 == 0 {
            DeclarationMode::Owned
        } else {
            DeclarationMode::Licensed
        };

        let fingerprint_confidence = (0.55 + (seed % 30) as f64 / 100.0).clamp(0.4, 0.92);
        let has_active_license = declaration_mode != DeclarationMode::Licensed || seed % 4 != 0;

        Self {
            content_id: content_id.to_string(),
            declaration_status,
            declaration_mode,
            fingerprint_confidence,
            has_active_license,
            license_ends_at: None,
        }
    }
}

fn char_code_seed(content_id: &str) -> u64 {
    let mut units = [0u16; 2];
    content_id
        .chars()
        .map(|c| u64::from(c.encode_utf16(&mut units)[0]))
        .sum()
}

/// Partially-specified rights metadata as submitted by callers
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RightsInput {
    pub content_id: String,
    pub declaration_status: Option<DeclarationStatus>,
    pub declaration_mode: Option<DeclarationMode>,
    pub fingerprint_confidence: Option<f64>,
    pub has_active_license: Option<bool>,
    pub license_ends_at: Option<DateTime<Utc>>,
}

impl RightsInput {
    pub fn for_content(content_id: impl Into<String>) -> Self {
        Self {
            content_id: content_id.into(),
            ..Self::default()
        }
    }

    /// True when at least one rights field was supplied explicitly
    pub fn has_explicit_fields(&self) -> bool {
        self.declaration_status.is_some()
            || self.declaration_mode.is_some()
            || self.fingerprint_confidence.is_some()
            || self.has_active_license.is_some()
            || self.license_ends_at.is_some()
    }

    /// Resolve into a full profile, field by field, against the fallback.
    ///
    /// Confidence is clamped into [0, 1]; a non-finite confidence counts as
    /// missing. When the license flag is absent it is derived from the end
    /// date, or from the mode when there is no end date.
    pub fn resolve(&self, now: DateTime<Utc>) -> RightsProfile {
        let fallback = RightsProfile::fallback(&self.content_id);

        let declaration_status = self
            .declaration_status
            .unwrap_or(fallback.declaration_status);
        let declaration_mode = self.declaration_mode.unwrap_or(fallback.declaration_mode);
        let fingerprint_confidence = self
            .fingerprint_confidence
            .filter(|c| c.is_finite())
            .unwrap_or(fallback.fingerprint_confidence)
            .clamp(0.0, 1.0);

        let has_active_license = self.has_active_license.unwrap_or_else(|| {
            match self.license_ends_at {
                Some(ends_at) => ends_at > now,
                None => declaration_mode != DeclarationMode::Licensed,
            }
        });

        RightsProfile {
            content_id: self.content_id.clone(),
            declaration_status,
            declaration_mode,
            fingerprint_confidence,
            has_active_license,
            license_ends_at: self.license_ends_at,
        }
    }
}

impl From<RightsProfile> for RightsInput {
    fn from(profile: RightsProfile) -> Self {
        Self {
            content_id: profile.content_id,
            declaration_status: Some(profile.declaration_status),
            declaration_mode: Some(profile.declaration_mode),
            fingerprint_confidence: Some(profile.fingerprint_confidence),
            has_active_license: Some(profile.has_active_license),
            license_ends_at: profile.license_ends_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_fallback_matches_char_code_sum() {
        // "mash-999": 109+97+115+104+45+57+57+57 = 641
        let profile = RightsProfile::fallback("mash-999");
        assert_eq!(profile.declaration_status, DeclarationStatus::Pending); // 641 % 3 == 2
        assert_eq!(profile.declaration_mode, DeclarationMode::Licensed); // odd, not % 5
        assert!((profile.fingerprint_confidence - 0.66).abs() < 1e-9); // 641 % 30 == 11
        assert!(profile.has_active_license); // 641 % 4 == 1
    }

    #[test]
    fn test_fallback_is_stable() {
        let a = RightsProfile::fallback("remix-abc");
        let b = RightsProfile::fallback("remix-abc");
        assert_eq!(a, b);
    }

    #[test]
    fn test_fallback_empty_id() {
        let profile = RightsProfile::fallback("");
        assert_eq!(profile.declaration_status, DeclarationStatus::Verified);
        assert_eq!(profile.declaration_mode, DeclarationMode::Precleared);
        assert!((profile.fingerprint_confidence - 0.55).abs() < 1e-9);
    }

    #[test]
    fn test_fallback_confidence_ceiling() {
        // seed % 30 == 29 would give 0.84, never above 0.92
        for id in ["a", "zz", "mash-001", "\u{1F3B5}track"] {
            let c = RightsProfile::fallback(id).fingerprint_confidence;
            assert!((0.4..=0.92).contains(&c), "{id} -> {c}");
        }
    }

    #[test]
    fn test_resolve_clamps_confidence() {
        let mut input = RightsInput::for_content("x");
        input.fingerprint_confidence = Some(1.7);
        assert_eq!(input.resolve(now()).fingerprint_confidence, 1.0);

        input.fingerprint_confidence = Some(-0.3);
        assert_eq!(input.resolve(now()).fingerprint_confidence, 0.0);
    }

    #[test]
    fn test_resolve_nan_confidence_uses_fallback() {
        let mut input = RightsInput::for_content("mash-999");
        input.fingerprint_confidence = Some(f64::NAN);
        let resolved = input.resolve(now());
        assert!((resolved.fingerprint_confidence - 0.66).abs() < 1e-9);
    }

    #[test]
    fn test_license_derived_from_end_date() {
        let mut input = RightsInput::for_content("x");
        input.declaration_mode = Some(DeclarationMode::Licensed);

        input.license_ends_at = Some(now() + chrono::Duration::days(1));
        assert!(input.resolve(now()).has_active_license);

        input.license_ends_at = Some(now() - chrono::Duration::days(1));
        assert!(!input.resolve(now()).has_active_license);

        input.license_ends_at = None;
        assert!(!input.resolve(now()).has_active_license);

        input.declaration_mode = Some(DeclarationMode::Owned);
        assert!(input.resolve(now()).has_active_license);
    }

    #[test]
    fn test_status_serializes_lowercase() {
        let json = serde_json::to_string(&DeclarationStatus::Rejected).unwrap();
        assert_eq!(json, "\"rejected\"");
        let mode: DeclarationMode = serde_json::from_str("\"precleared\"").unwrap();
        assert_eq!(mode, DeclarationMode::Precleared);
    }
}
