//! Creator referral invites

use chrono::{DateTime, Utc};
use rand::RngCore;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::revshare::RevShareBounds;
use crate::crypto::{AttributionPayload, AttributionSigner, LinkPurpose, validate_destination};
use crate::error::{TrustError, TrustResult};

/// Projected recurring revenue per invite use, in cents
pub const PROJECTED_CENTS_PER_USE: u64 = 240;

/// Size of the invited creator's audience
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CreatorTier {
    Large,
    Medium,
    Emerging,
}

impl CreatorTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            CreatorTier::Large => "large",
            CreatorTier::Medium => "medium",
            CreatorTier::Emerging => "emerging",
        }
    }

    pub fn default_max_uses(&self) -> u32 {
        match self {
            CreatorTier::Large => 50,
            CreatorTier::Medium => 25,
            CreatorTier::Emerging => 10,
        }
    }

    fn code_prefix(&self) -> &'static str {
        &self.as_str()[..3]
    }
}

impl fmt::Display for CreatorTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Validated request for a new invite
#[derive(Debug, Clone)]
pub struct ReferralRequest {
    pub campaign_id: String,
    pub tier: CreatorTier,
    pub destination: String,
    pub max_uses: Option<u32>,
    pub rev_share_bps: Option<f64>,
}

/// A minted invite
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferralInvite {
    pub code: String,
    pub campaign_id: String,
    pub tier: CreatorTier,
    pub creator_id: String,
    pub token: String,
    pub invite_url: String,
    pub destination: String,
    pub max_uses: u32,
    pub rev_share_bps: u32,
    pub projected_recurring_cents: u64,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl ReferralInvite {
    pub fn rev_share_percent(&self) -> f64 {
        self.rev_share_bps as f64 / 100.0
    }
}

/// `<tier prefix>_<10 hex chars>`
pub fn generate_referral_code(tier: CreatorTier) -> String {
    let mut bytes = [0u8; 5];
    OsRng.fill_bytes(&mut bytes);
    format!("{}_{}", tier.code_prefix(), hex::encode(bytes))
}

/// Set query parameters on an http(s) destination, replacing existing
/// values of the same keys.
pub fn decorate_destination(destination: &str, params: &[(&str, &str)]) -> TrustResult<String> {
    let mut url = validate_destination(destination)?;

    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| !params.iter().any(|(key, _)| *key == &**k))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    {
        let mut query = url.query_pairs_mut();
        query.clear();
        for (k, v) in &kept {
            query.append_pair(k, v);
        }
        for (k, v) in params {
            query.append_pair(k, v);
        }
    }

    Ok(url.to_string())
}

/// Public link for a token
pub fn invite_url(base_url: &str, token: &str) -> String {
    format!("{}/a/{}", base_url.trim_end_matches('/'), token)
}

/// Mint an invite with a referral-purpose attribution token
pub fn create_invite(
    request: &ReferralRequest,
    signer: &AttributionSigner,
    bounds: &RevShareBounds,
    base_url: &str,
    now: DateTime<Utc>,
) -> TrustResult<ReferralInvite> {
    let campaign_id = request.campaign_id.trim();
    if campaign_id.is_empty() {
        return Err(TrustError::validation(
            "campaignId, creatorTier, and destination are required.",
        ));
    }
    if request.max_uses == Some(0) {
        return Err(TrustError::validation("maxUses must be at least 1."));
    }

    let code = generate_referral_code(request.tier);
    let destination = decorate_destination(
        &request.destination,
        &[
            ("ref", code.as_str()),
            ("tier", request.tier.as_str()),
            ("utm_source", "mashups_referral"),
            ("utm_medium", "creator_invite"),
            ("utm_campaign", campaign_id),
        ],
    )?;
    let creator_id = format!("cohort_{}_{}", request.tier, code);

    let payload = AttributionPayload::new(campaign_id, creator_id.clone(), destination.clone());
    let token = signer.mint(&payload, LinkPurpose::Referral, now)?;

    let max_uses = request
        .max_uses
        .unwrap_or_else(|| request.tier.default_max_uses());

    Ok(ReferralInvite {
        invite_url: invite_url(base_url, token.as_str()),
        expires_at: token.expires_at,
        created_at: token.claims.issued_at,
        token: token.into_string(),
        code,
        campaign_id: campaign_id.to_string(),
        tier: request.tier,
        creator_id,
        destination,
        max_uses,
        rev_share_bps: bounds.clamp(request.rev_share_bps),
        projected_recurring_cents: max_uses as u64 * PROJECTED_CENTS_PER_USE,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{LinkTtls, SecretRing, SigningSecret};
    use chrono::Duration;
    use url::Url;

    fn signer() -> AttributionSigner {
        AttributionSigner::new(
            SecretRing::new(SigningSecret::from("referral-secret-0123456789")),
            LinkTtls::default(),
        )
    }

    fn now() -> DateTime<Utc> {
        DateTime::from_timestamp(1_760_000_000, 0).unwrap()
    }

    fn request(tier: CreatorTier) -> ReferralRequest {
        ReferralRequest {
            campaign_id: "spring-drop".to_string(),
            tier,
            destination: "https://mashups.example/join?ref=stale&x=1".to_string(),
            max_uses: None,
            rev_share_bps: None,
        }
    }

    #[test]
    fn test_code_format() {
        let code = generate_referral_code(CreatorTier::Emerging);
        assert!(code.starts_with("eme_"));
        assert_eq!(code.len(), 14);
        assert!(code[4..].chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(code, generate_referral_code(CreatorTier::Emerging));
    }

    #[test]
    fn test_decorate_destination_replaces_keys() {
        let decorated =
            decorate_destination("https://x.test/p?ref=old&keep=1", &[("ref", "new")]).unwrap();
        let url = Url::parse(&decorated).unwrap();
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert_eq!(
            pairs,
            vec![
                ("keep".to_string(), "1".to_string()),
                ("ref".to_string(), "new".to_string())
            ]
        );
        assert!(decorate_destination("ftp://x.test", &[]).is_err());
    }

    #[test]
    fn test_create_invite() {
        let signer = signer();
        let invite = create_invite(
            &request(CreatorTier::Large),
            &signer,
            &RevShareBounds::default(),
            "https://app.mashups.example/",
            now(),
        )
        .unwrap();

        assert!(invite.code.starts_with("lar_"));
        assert_eq!(invite.max_uses, 50);
        assert_eq!(invite.rev_share_bps, 1200);
        assert_eq!(invite.rev_share_percent(), 12.0);
        assert_eq!(invite.projected_recurring_cents, 12_000);
        assert_eq!(invite.expires_at, now() + Duration::days(14));
        assert_eq!(
            invite.invite_url,
            format!("https://app.mashups.example/a/{}", invite.token)
        );
        assert_eq!(invite.creator_id, format!("cohort_large_{}", invite.code));

        let url = Url::parse(&invite.destination).unwrap();
        let ref_value = url.query_pairs().find(|(k, _)| k == "ref").unwrap().1;
        assert_eq!(ref_value, invite.code.as_str());
        assert!(invite.destination.contains("utm_source=mashups_referral"));
        assert!(invite.destination.contains("utm_campaign=spring-drop"));

        let claims = signer.verify(&invite.token, now() + Duration::days(13)).into_result().unwrap();
        assert_eq!(claims.purpose, LinkPurpose::Referral);
        assert_eq!(claims.payload.destination, invite.destination);
    }

    #[test]
    fn test_invite_overrides() {
        let mut req = request(CreatorTier::Medium);
        req.max_uses = Some(3);
        req.rev_share_bps = Some(99_999.0);
        let invite = create_invite(&req, &signer(), &RevShareBounds::default(), "http://localhost:3000", now())
            .unwrap();
        assert_eq!(invite.max_uses, 3);
        assert_eq!(invite.rev_share_bps, 3000);
        assert_eq!(invite.projected_recurring_cents, 720);
    }

    #[test]
    fn test_invite_validation() {
        let mut req = request(CreatorTier::Emerging);
        req.campaign_id = " ".to_string();
        assert!(matches!(
            create_invite(&req, &signer(), &RevShareBounds::default(), "http://a", now()),
            Err(TrustError::Validation(_))
        ));

        let mut req = request(CreatorTier::Emerging);
        req.max_uses = Some(0);
        assert!(create_invite(&req, &signer(), &RevShareBounds::default(), "http://a", now()).is_err());

        let mut req = request(CreatorTier::Emerging);
        req.destination = "not a url".to_string();
        assert!(create_invite(&req, &signer(), &RevShareBounds::default(), "http://a", now()).is_err());
    }
}
