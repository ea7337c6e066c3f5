//! Rights Risk Policy
//!
//! Decides whether a content item is safe to distribute.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐     ┌──────────────┐     ┌────────────────┐
//! │ RightsInput  │────►│ RightsProfile│────►│ RiskScorer     │
//! │ (partial)    │     │ (resolved)   │     │ (pure policy)  │
//! └──────────────┘     └──────────────┘     └────────────────┘
//!        ▲                                          │
//!        │ fallback / catalog                       ▼
//! ┌──────────────┐                          ┌────────────────┐
//! │ RightsCatalog│                          │ RiskAssessment │
//! └──────────────┘                          │ allow/review/  │
//!                                           │ block + reasons│
//!                                           └────────────────┘
//! ```
//!
//! ## Score Model
//!
//! - status weight + mode weight + round(confidence * 18)
//! - +12 for an active license, -24 for a licensed claim without one
//! - rejected claims are capped at 24 and always block
//! - final score clamped to [0, 100]; < 42 blocks, >= 76 allows

mod catalog;
mod profile;
mod scorer;

pub use catalog::{InMemoryRightsCatalog, RightsCatalog, profile_for};
pub use profile::{DeclarationMode, DeclarationStatus, RightsInput, RightsProfile};
pub use scorer::{RiskAssessment, RiskRoute, RiskScorer, RiskThresholds, ScoreWeights};
