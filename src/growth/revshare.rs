//! Referral revenue-share accounting

use serde::{Deserialize, Serialize};

pub const DEFAULT_REV_SHARE_BPS: u32 = 1200;
pub const MIN_REV_SHARE_BPS: u32 = 300;
pub const MAX_REV_SHARE_BPS: u32 = 3000;

/// Billing events that count as a referral conversion
const CONVERSION_EVENTS: &[&str] = &[
    "checkout.session.completed",
    "invoice.paid",
    "payment_intent.succeeded",
];

/// Allowed revenue-share range, in basis points
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevShareBounds {
    pub min_bps: u32,
    pub max_bps: u32,
    pub default_bps: u32,
}

impl Default for RevShareBounds {
    fn default() -> Self {
        Self {
            min_bps: MIN_REV_SHARE_BPS,
            max_bps: MAX_REV_SHARE_BPS,
            default_bps: DEFAULT_REV_SHARE_BPS,
        }
    }
}

impl RevShareBounds {
    /// Absent or non-finite input yields the default; anything else is
    /// rounded, then clamped into range.
    pub fn clamp(&self, requested: Option<f64>) -> u32 {
        match requested {
            Some(value) if value.is_finite() => {
                let rounded = value.round();
                rounded.clamp(self.min_bps as f64, self.max_bps as f64) as u32
            }
            _ => self.default_bps,
        }
    }

    /// Share of `amount_cents` owed to the referrer
    pub fn revenue_share_cents(&self, amount_cents: f64, bps: f64) -> u64 {
        let amount = if amount_cents.is_finite() {
            amount_cents.round().max(0.0)
        } else {
            0.0
        };
        let bps = self.clamp(Some(bps)) as f64;
        (amount * bps / 10_000.0).round() as u64
    }
}

/// Referral share of a payment under the default bounds
pub fn referral_revenue_share_cents(amount_cents: f64, bps: f64) -> u64 {
    RevShareBounds::default().revenue_share_cents(amount_cents, bps)
}

/// Whether a billing event type credits the referrer
pub fn should_count_referral_conversion(event_type: Option<&str>) -> bool {
    event_type.is_some_and(|t| CONVERSION_EVENTS.contains(&t))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp() {
        let bounds = RevShareBounds::default();
        assert_eq!(bounds.clamp(Some(-50.0)), 300);
        assert_eq!(bounds.clamp(Some(999_999.0)), 3000);
        assert_eq!(bounds.clamp(None), 1200);
        assert_eq!(bounds.clamp(Some(f64::NAN)), 1200);
        assert_eq!(bounds.clamp(Some(f64::INFINITY)), 1200);
        assert_eq!(bounds.clamp(Some(1500.4)), 1500);
        assert_eq!(bounds.clamp(Some(1500.5)), 1501);
        assert_eq!(bounds.clamp(Some(300.0)), 300);
        assert_eq!(bounds.clamp(Some(3000.0)), 3000);
    }

    #[test]
    fn test_custom_bounds() {
        let bounds = RevShareBounds {
            min_bps: 500,
            max_bps: 800,
            default_bps: 600,
        };
        assert_eq!(bounds.clamp(Some(100.0)), 500);
        assert_eq!(bounds.clamp(None), 600);
    }

    #[test]
    fn test_revenue_share_cents() {
        assert_eq!(referral_revenue_share_cents(10_000.0, 1200.0), 1200);
        assert_eq!(referral_revenue_share_cents(999.0, 1200.0), 120);
        assert_eq!(referral_revenue_share_cents(-500.0, 1200.0), 0);
        assert_eq!(referral_revenue_share_cents(10_000.0, 10.0), 300);
        assert_eq!(referral_revenue_share_cents(f64::NAN, 1200.0), 0);
    }

    #[test]
    fn test_conversion_events() {
        assert!(should_count_referral_conversion(Some("invoice.paid")));
        assert!(should_count_referral_conversion(Some("checkout.session.completed")));
        assert!(should_count_referral_conversion(Some("payment_intent.succeeded")));
        assert!(!should_count_referral_conversion(Some("invoice.created")));
        assert!(!should_count_referral_conversion(None));
    }
}
