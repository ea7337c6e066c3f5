use anyhow::{Context, Result, anyhow};
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use tracing::warn;

use crate::crypto::{LinkTtls, SecretRing, SigningSecret};
use crate::growth::RevShareBounds;
use crate::rights::{RiskThresholds, ScoreWeights};

/// Used only when no signing secret is configured
const DEV_SIGNING_SECRET: &str = "mashups-dev-attribution-secret-change-me";

/// Minimum accepted length of any secret, in bytes
const MIN_SECRET_LEN: usize = 16;

/// Upper bound for link TTLs, webhook tolerance and rate-limit windows
const MAX_WINDOW_SECS: u64 = 365 * 24 * 60 * 60;

/// Configuration for the trust service
#[derive(Debug, Clone)]
pub struct TrustConfig {
    /// Server configuration
    pub server: ServerConfig,
    /// Signing and verification secrets
    pub secrets: SecretsConfig,
    /// Link lifetimes and webhook tolerance
    pub links: LinkConfig,
    /// Issuance rate limits
    pub rate_limits: RateLimitConfig,
    /// Rights risk thresholds
    pub risk: RiskConfig,
    /// Referral revenue-share bounds
    pub rev_share: RevShareBounds,
    /// Request hardening
    pub security: SecurityConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,
    /// Port to bind to
    pub port: u16,
    /// Public app URL used to build `/a/<token>` links
    pub app_url: String,
    /// Optional JSON file of known rights profiles
    pub rights_catalog_path: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct SecretsConfig {
    /// Active attribution signing secret
    pub attribution: SigningSecret,
    /// Previous attribution secrets still accepted for verification
    pub attribution_previous: Vec<SigningSecret>,
    /// Billing webhook secrets; empty rejects every webhook
    pub webhook: Vec<SigningSecret>,
    /// Whether the development default is in use
    pub using_dev_default: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkConfig {
    pub share_ttl_secs: u64,
    pub referral_ttl_days: u64,
    pub webhook_tolerance_secs: u64,
}

/// Allowance per window for one endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitRule {
    pub limit: u32,
    pub window_secs: u64,
}

impl RateLimitRule {
    pub fn window(&self) -> Duration {
        seconds(self.window_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub share: RateLimitRule,
    pub referral: RateLimitRule,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskConfig {
    pub block_below: i32,
    pub allow_at: i32,
    pub rejected_ceiling: i32,
    /// Added when an active license is present
    pub active_license_bonus: i32,
    /// Deducted from licensed claims without an active license
    pub missing_license_penalty: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    /// Maximum request body size in bytes
    pub max_request_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (error, warn, info, debug, trace)
    pub level: String,
    /// Mask client addresses in request logs
    pub sanitize_logs: bool,
    /// Enable request/response logging
    pub log_requests: bool,
}

impl Default for TrustConfig {
    fn default() -> Self {
        let thresholds = RiskThresholds::default();
        let weights = ScoreWeights::default();
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8787,
                app_url: "http://localhost:3000".to_string(),
                rights_catalog_path: None,
            },
            secrets: SecretsConfig {
                attribution: SigningSecret::from(DEV_SIGNING_SECRET),
                attribution_previous: Vec::new(),
                webhook: Vec::new(),
                using_dev_default: true,
            },
            links: LinkConfig {
                share_ttl_secs: 24 * 60 * 60,
                referral_ttl_days: 14,
                webhook_tolerance_secs: 300,
            },
            rate_limits: RateLimitConfig {
                share: RateLimitRule {
                    limit: 30,
                    window_secs: 60,
                },
                referral: RateLimitRule {
                    limit: 10,
                    window_secs: 60,
                },
            },
            risk: RiskConfig {
                block_below: thresholds.block_below,
                allow_at: thresholds.allow_at,
                rejected_ceiling: thresholds.rejected_ceiling,
                active_license_bonus: weights.active_license_bonus,
                missing_license_penalty: weights.missing_license_penalty,
            },
            rev_share: RevShareBounds::default(),
            security: SecurityConfig {
                max_request_size: 64 * 1024,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                sanitize_logs: true,
                log_requests: false,
            },
        }
    }
}

impl TrustConfig {
    /// Load configuration from environment variables and validate it
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from any key lookup, then validate it
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        // Server configuration
        if let Some(host) = lookup("MASHUPS_HOST") {
            config.server.host = host;
        }
        parse_var(&lookup, "MASHUPS_PORT", &mut config.server.port)?;
        if let Some(app_url) = lookup("MASHUPS_APP_URL") {
            config.server.app_url = app_url.trim_end_matches('/').to_string();
        }
        if let Some(path) = lookup("MASHUPS_RIGHTS_CATALOG_PATH").filter(|p| !p.is_empty()) {
            config.server.rights_catalog_path = Some(PathBuf::from(path));
        }

        // Secrets
        match lookup("MASHUPS_ATTRIBUTION_SIGNING_SECRET").filter(|s| !s.is_empty()) {
            Some(secret) => {
                config.secrets.attribution = SigningSecret::from(secret);
                config.secrets.using_dev_default = false;
            }
            None => {
                warn!(
                    "MASHUPS_ATTRIBUTION_SIGNING_SECRET not set, using development default (not for production)"
                );
            }
        }
        if let Some(previous) = lookup("MASHUPS_ATTRIBUTION_PREVIOUS_SECRETS") {
            config.secrets.attribution_previous = split_secrets(&previous);
        }
        if let Some(webhook) = lookup("MASHUPS_WEBHOOK_SECRETS") {
            config.secrets.webhook = split_secrets(&webhook);
        }

        // Links
        parse_var(&lookup, "MASHUPS_SHARE_LINK_TTL_SECS", &mut config.links.share_ttl_secs)?;
        parse_var(&lookup, "MASHUPS_REFERRAL_TTL_DAYS", &mut config.links.referral_ttl_days)?;
        parse_var(
            &lookup,
            "MASHUPS_WEBHOOK_TOLERANCE_SECS",
            &mut config.links.webhook_tolerance_secs,
        )?;

        // Rate limits
        parse_var(&lookup, "MASHUPS_SHARE_RATE_LIMIT", &mut config.rate_limits.share.limit)?;
        parse_var(
            &lookup,
            "MASHUPS_SHARE_RATE_LIMIT_WINDOW_SECS",
            &mut config.rate_limits.share.window_secs,
        )?;
        parse_var(
            &lookup,
            "MASHUPS_REFERRAL_RATE_LIMIT",
            &mut config.rate_limits.referral.limit,
        )?;
        parse_var(
            &lookup,
            "MASHUPS_REFERRAL_RATE_LIMIT_WINDOW_SECS",
            &mut config.rate_limits.referral.window_secs,
        )?;

        // Risk policy
        parse_var(&lookup, "MASHUPS_RISK_BLOCK_BELOW", &mut config.risk.block_below)?;
        parse_var(&lookup, "MASHUPS_RISK_ALLOW_AT", &mut config.risk.allow_at)?;
        parse_var(
            &lookup,
            "MASHUPS_RISK_REJECTED_CEILING",
            &mut config.risk.rejected_ceiling,
        )?;
        parse_var(
            &lookup,
            "MASHUPS_RISK_LICENSE_BONUS",
            &mut config.risk.active_license_bonus,
        )?;
        parse_var(
            &lookup,
            "MASHUPS_RISK_MISSING_LICENSE_PENALTY",
            &mut config.risk.missing_license_penalty,
        )?;

        // Revenue share
        parse_var(&lookup, "MASHUPS_REV_SHARE_MIN_BPS", &mut config.rev_share.min_bps)?;
        parse_var(&lookup, "MASHUPS_REV_SHARE_MAX_BPS", &mut config.rev_share.max_bps)?;
        parse_var(
            &lookup,
            "MASHUPS_REV_SHARE_DEFAULT_BPS",
            &mut config.rev_share.default_bps,
        )?;

        // Security
        parse_var(
            &lookup,
            "MASHUPS_MAX_REQUEST_SIZE",
            &mut config.security.max_request_size,
        )?;

        // Logging
        if let Some(level) = lookup("MASHUPS_LOG_LEVEL") {
            config.logging.level = level;
        }
        parse_var(&lookup, "MASHUPS_SANITIZE_LOGS", &mut config.logging.sanitize_logs)?;
        parse_var(&lookup, "MASHUPS_LOG_REQUESTS", &mut config.logging.log_requests)?;

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration for security and consistency
    pub fn validate(&self) -> Result<()> {
        if self.server.host.is_empty() {
            return Err(anyhow!("Server host cannot be empty"));
        }

        if self.server.port == 0 {
            return Err(anyhow!("Server port must be non-zero"));
        }

        if !(self.server.app_url.starts_with("https://")
            || self.server.app_url.starts_with("http://"))
        {
            return Err(anyhow!(
                "App URL must be an http(s) URL: {}",
                self.server.app_url
            ));
        }

        if self.secrets.attribution.len() < MIN_SECRET_LEN {
            return Err(anyhow!(
                "Attribution signing secret is too short (minimum {} bytes)",
                MIN_SECRET_LEN
            ));
        }
        for (index, secret) in self.secrets.attribution_previous.iter().enumerate() {
            if secret.len() < MIN_SECRET_LEN {
                return Err(anyhow!(
                    "Previous attribution secret #{} is too short (minimum {} bytes)",
                    index + 1,
                    MIN_SECRET_LEN
                ));
            }
        }
        for (index, secret) in self.secrets.webhook.iter().enumerate() {
            if secret.len() < MIN_SECRET_LEN {
                return Err(anyhow!(
                    "Webhook secret #{} is too short (minimum {} bytes)",
                    index + 1,
                    MIN_SECRET_LEN
                ));
            }
        }

        let referral_ttl_secs = self.links.referral_ttl_days.saturating_mul(24 * 60 * 60);
        for (name, secs) in [
            ("Share link TTL", self.links.share_ttl_secs),
            ("Referral link TTL", referral_ttl_secs),
            ("Webhook tolerance", self.links.webhook_tolerance_secs),
            ("Share rate limit window", self.rate_limits.share.window_secs),
            ("Referral rate limit window", self.rate_limits.referral.window_secs),
        ] {
            if secs == 0 || secs > MAX_WINDOW_SECS {
                return Err(anyhow!(
                    "{} must be between 1 second and 365 days (got {}s)",
                    name,
                    secs
                ));
            }
        }

        let risk = &self.risk;
        if !(0 <= risk.rejected_ceiling
            && risk.rejected_ceiling < risk.block_below
            && risk.block_below <= risk.allow_at
            && risk.allow_at <= 100)
        {
            return Err(anyhow!(
                "Risk thresholds must satisfy 0 <= rejected_ceiling < block_below <= allow_at <= 100 (got {} / {} / {})",
                risk.rejected_ceiling,
                risk.block_below,
                risk.allow_at
            ));
        }
        for (name, weight) in [
            ("License bonus", risk.active_license_bonus),
            ("Missing license penalty", risk.missing_license_penalty),
        ] {
            if !(0..=100).contains(&weight) {
                return Err(anyhow!("{} must be within 0..=100 (got {})", name, weight));
            }
        }

        let bps = &self.rev_share;
        if !(bps.min_bps <= bps.default_bps
            && bps.default_bps <= bps.max_bps
            && bps.max_bps <= 10_000)
        {
            return Err(anyhow!(
                "Revenue share bounds must satisfy min <= default <= max <= 10000 (got {} / {} / {})",
                bps.min_bps,
                bps.default_bps,
                bps.max_bps
            ));
        }

        if self.security.max_request_size == 0 {
            return Err(anyhow!("Maximum request size must be non-zero"));
        }

        Ok(())
    }

    /// Active secret first, then previous ones
    pub fn attribution_ring(&self) -> SecretRing {
        SecretRing::with_previous(
            self.secrets.attribution.clone(),
            self.secrets.attribution_previous.iter().cloned(),
        )
    }

    /// None when no webhook secret is configured
    pub fn webhook_ring(&self) -> Option<SecretRing> {
        SecretRing::from_secrets(self.secrets.webhook.iter().cloned())
    }

    pub fn link_ttls(&self) -> LinkTtls {
        LinkTtls {
            share: seconds(self.links.share_ttl_secs),
            referral: seconds(self.links.referral_ttl_days.saturating_mul(24 * 60 * 60)),
        }
    }

    pub fn webhook_tolerance(&self) -> Duration {
        seconds(self.links.webhook_tolerance_secs)
    }

    pub fn risk_thresholds(&self) -> RiskThresholds {
        RiskThresholds {
            block_below: self.risk.block_below,
            allow_at: self.risk.allow_at,
            rejected_ceiling: self.risk.rejected_ceiling,
        }
    }

    /// Default weights with the configured license adjustments
    pub fn score_weights(&self) -> ScoreWeights {
        ScoreWeights {
            active_license_bonus: self.risk.active_license_bonus,
            missing_license_penalty: self.risk.missing_license_penalty,
            ..ScoreWeights::default()
        }
    }
}

/// Saturating conversion; values past the chrono range become the largest
/// representable duration
fn seconds(secs: u64) -> Duration {
    i64::try_from(secs)
        .ok()
        .and_then(Duration::try_seconds)
        .unwrap_or(Duration::MAX)
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, target: &mut T) -> Result<()>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    if let Some(raw) = lookup(key) {
        *target = raw
            .trim()
            .parse()
            .with_context(|| format!("Invalid {} value", key))?;
    }
    Ok(())
}

fn split_secrets(raw: &str) -> Vec<SigningSecret> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(SigningSecret::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_validate() {
        let config = TrustConfig::from_lookup(lookup(&[])).unwrap();
        assert!(config.secrets.using_dev_default);
        assert_eq!(config.server.port, 8787);
        assert_eq!(config.link_ttls().share, Duration::hours(24));
        assert_eq!(config.link_ttls().referral, Duration::days(14));
        assert_eq!(config.webhook_tolerance(), Duration::seconds(300));
        assert_eq!(config.rate_limits.referral.limit, 10);
        assert!(config.webhook_ring().is_none());
        assert_eq!(config.risk_thresholds(), RiskThresholds::default());
    }

    #[test]
    fn test_overrides() {
        let config = TrustConfig::from_lookup(lookup(&[
            ("MASHUPS_PORT", "9000"),
            ("MASHUPS_APP_URL", "https://mashups.example/"),
            ("MASHUPS_ATTRIBUTION_SIGNING_SECRET", "prod-secret-0123456789"),
            (
                "MASHUPS_ATTRIBUTION_PREVIOUS_SECRETS",
                "old-secret-0123456789, older-secret-0123456789",
            ),
            ("MASHUPS_WEBHOOK_SECRETS", "whsec_0123456789abcdef"),
            ("MASHUPS_REFERRAL_RATE_LIMIT", "3"),
            ("MASHUPS_REV_SHARE_DEFAULT_BPS", "1500"),
            ("MASHUPS_LOG_REQUESTS", "true"),
        ]))
        .unwrap();

        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.app_url, "https://mashups.example");
        assert!(!config.secrets.using_dev_default);
        assert_eq!(config.attribution_ring().len(), 3);
        assert_eq!(config.webhook_ring().unwrap().len(), 1);
        assert_eq!(config.rate_limits.referral.limit, 3);
        assert_eq!(config.rev_share.default_bps, 1500);
        assert!(config.logging.log_requests);
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(TrustConfig::from_lookup(lookup(&[("MASHUPS_PORT", "http")])).is_err());
        assert!(TrustConfig::from_lookup(lookup(&[("MASHUPS_PORT", "0")])).is_err());
        assert!(
            TrustConfig::from_lookup(lookup(&[("MASHUPS_ATTRIBUTION_SIGNING_SECRET", "short")]))
                .is_err()
        );
        assert!(
            TrustConfig::from_lookup(lookup(&[("MASHUPS_WEBHOOK_SECRETS", "whsec_short")]))
                .is_err()
        );
        assert!(
            TrustConfig::from_lookup(lookup(&[
                ("MASHUPS_RISK_BLOCK_BELOW", "80"),
                ("MASHUPS_RISK_ALLOW_AT", "76"),
            ]))
            .is_err()
        );
        assert!(
            TrustConfig::from_lookup(lookup(&[("MASHUPS_REV_SHARE_DEFAULT_BPS", "5000")]))
                .is_err()
        );
        assert!(TrustConfig::from_lookup(lookup(&[("MASHUPS_SHARE_LINK_TTL_SECS", "0")])).is_err());
        assert!(TrustConfig::from_lookup(lookup(&[("MASHUPS_APP_URL", "mashups.example")])).is_err());
    }

    #[test]
    fn test_windows_are_bounded() {
        for (key, value) in [
            ("MASHUPS_SHARE_LINK_TTL_SECS", "9000000000000"),
            ("MASHUPS_SHARE_LINK_TTL_SECS", "18446744073709551615"),
            ("MASHUPS_REFERRAL_TTL_DAYS", "366"),
            ("MASHUPS_WEBHOOK_TOLERANCE_SECS", "31536001"),
            ("MASHUPS_SHARE_RATE_LIMIT_WINDOW_SECS", "0"),
            ("MASHUPS_REFERRAL_RATE_LIMIT_WINDOW_SECS", "9000000000000"),
        ] {
            assert!(
                TrustConfig::from_lookup(lookup(&[(key, value)])).is_err(),
                "{}={} should be rejected",
                key,
                value
            );
        }

        let config = TrustConfig::from_lookup(lookup(&[
            ("MASHUPS_SHARE_LINK_TTL_SECS", "31536000"),
            ("MASHUPS_REFERRAL_TTL_DAYS", "365"),
        ]))
        .unwrap();
        let ttls = config.link_ttls();
        assert_eq!(ttls.share, Duration::days(365));
        assert_eq!(ttls.referral, Duration::days(365));
    }

    #[test]
    fn test_seconds_saturates() {
        assert_eq!(seconds(60), Duration::seconds(60));
        assert_eq!(seconds(u64::MAX), Duration::MAX);
    }

    #[test]
    fn test_score_weights_from_env() {
        let config = TrustConfig::from_lookup(lookup(&[
            ("MASHUPS_RISK_LICENSE_BONUS", "8"),
            ("MASHUPS_RISK_MISSING_LICENSE_PENALTY", "30"),
        ]))
        .unwrap();
        let weights = config.score_weights();
        assert_eq!(weights.active_license_bonus, 8);
        assert_eq!(weights.missing_license_penalty, 30);
        assert_eq!(weights.verified, ScoreWeights::default().verified);

        assert!(
            TrustConfig::from_lookup(lookup(&[("MASHUPS_RISK_LICENSE_BONUS", "-1")])).is_err()
        );
    }
}
