//! Creator growth: referral invites and revenue-share accounting

mod invite;
mod ledger;
mod revshare;

pub use invite::{
    CreatorTier, PROJECTED_CENTS_PER_USE, ReferralInvite, ReferralRequest, create_invite,
    decorate_destination, generate_referral_code, invite_url,
};
pub use ledger::{
    InMemoryInviteLedger, InviteLedger, ReferralRevenueEvent, ReferralSummary, RevenueStatus,
};
pub use revshare::{
    DEFAULT_REV_SHARE_BPS, MAX_REV_SHARE_BPS, MIN_REV_SHARE_BPS, RevShareBounds,
    referral_revenue_share_cents, should_count_referral_conversion,
};
