//! Invite and conversion records
//!
//! The ledger is the write side of referral accounting. It is a collaborator
//! of the trust core: a failed write is reported to the caller, who logs and
//! audits it, but a token already minted stays valid.

use anyhow::{Result, anyhow};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::RwLock;

use super::invite::ReferralInvite;

/// Monthly projection factor applied to recurring revenue
const MONTHLY_PROJECTION_FACTOR: f64 = 1.38;

/// Settlement state of a referral revenue event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RevenueStatus {
    Pending,
    Recorded,
    Paid,
    Failed,
}

impl RevenueStatus {
    /// Counts toward recurring revenue
    pub fn is_settled(&self) -> bool {
        matches!(self, RevenueStatus::Recorded | RevenueStatus::Paid)
    }
}

/// Revenue attributed to a referral code by a billing event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferralRevenueEvent {
    pub event_id: String,
    pub event_type: String,
    pub referral_code: Option<String>,
    pub amount_cents: u64,
    pub rev_share_bps: u32,
    pub revenue_share_cents: u64,
    pub status: RevenueStatus,
    pub recorded_at: DateTime<Utc>,
}

/// Aggregate view over recorded invites and conversions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferralSummary {
    pub invited_creators: usize,
    pub active_invited_creators: usize,
    pub recurring_revenue_cents: u64,
    pub monthly_projected_cents: u64,
    pub invite_conversion_rate: f64,
}

impl ReferralSummary {
    /// Invites count once per distinct code; a code is active once any
    /// revenue event names it; only settled events add revenue.
    pub fn from_records(invite_codes: &[String], events: &[ReferralRevenueEvent]) -> Self {
        let invited: HashSet<&str> = invite_codes
            .iter()
            .map(|c| c.trim())
            .filter(|c| !c.is_empty())
            .collect();

        let mut active: HashSet<&str> = HashSet::new();
        let mut recurring_revenue_cents = 0u64;
        for event in events {
            if let Some(code) = event
                .referral_code
                .as_deref()
                .map(str::trim)
                .filter(|c| !c.is_empty())
            {
                active.insert(code);
            }
            if event.status.is_settled() {
                recurring_revenue_cents += event.revenue_share_cents;
            }
        }

        let invited_creators = invited.len();
        let active_invited_creators = active.iter().filter(|c| invited.contains(*c)).count();
        let invite_conversion_rate = if invited_creators > 0 {
            active_invited_creators as f64 / invited_creators as f64
        } else {
            0.0
        };

        Self {
            invited_creators,
            active_invited_creators,
            recurring_revenue_cents,
            monthly_projected_cents: (recurring_revenue_cents as f64 * MONTHLY_PROJECTION_FACTOR)
                .round() as u64,
            invite_conversion_rate,
        }
    }
}

/// Persistence for invites and conversions
pub trait InviteLedger: Send + Sync {
    fn record_invite(&self, invite: &ReferralInvite) -> Result<()>;

    /// Returns false when the billing event was already recorded
    fn record_revenue(&self, event: ReferralRevenueEvent) -> Result<bool>;

    fn summary(&self) -> Result<ReferralSummary>;
}

#[derive(Debug, Default)]
struct LedgerState {
    invites: Vec<ReferralInvite>,
    events: Vec<ReferralRevenueEvent>,
}

/// Process-local ledger
#[derive(Debug, Default)]
pub struct InMemoryInviteLedger {
    state: RwLock<LedgerState>,
}

impl InMemoryInviteLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn invites(&self) -> Vec<ReferralInvite> {
        self.state
            .read()
            .map(|s| s.invites.clone())
            .unwrap_or_default()
    }

    pub fn revenue_events(&self) -> Vec<ReferralRevenueEvent> {
        self.state
            .read()
            .map(|s| s.events.clone())
            .unwrap_or_default()
    }
}

impl InviteLedger for InMemoryInviteLedger {
    fn record_invite(&self, invite: &ReferralInvite) -> Result<()> {
        let mut state = self
            .state
            .write()
            .map_err(|_| anyhow!("Invite ledger lock poisoned"))?;
        state.invites.push(invite.clone());
        Ok(())
    }

    fn record_revenue(&self, event: ReferralRevenueEvent) -> Result<bool> {
        let mut state = self
            .state
            .write()
            .map_err(|_| anyhow!("Invite ledger lock poisoned"))?;
        if state.events.iter().any(|e| e.event_id == event.event_id) {
            return Ok(false);
        }
        state.events.push(event);
        Ok(true)
    }

    fn summary(&self) -> Result<ReferralSummary> {
        let state = self
            .state
            .read()
            .map_err(|_| anyhow!("Invite ledger lock poisoned"))?;
        let codes: Vec<String> = state.invites.iter().map(|i| i.code.clone()).collect();
        Ok(ReferralSummary::from_records(&codes, &state.events))
    }
}
