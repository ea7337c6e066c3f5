//! Known rights profiles
//!
//! The catalog is the read side of the external rights datastore. Content
//! missing from it is assessed against its deterministic fallback profile.

use anyhow::{Context, Result};
use dashmap::DashMap;
use std::path::Path;
use tracing::info;

use super::profile::RightsProfile;

/// Lookup of recorded rights metadata by content id
pub trait RightsCatalog: Send + Sync {
    fn lookup(&self, content_id: &str) -> Option<RightsProfile>;
}

/// In-process catalog, seeded at start-up
#[derive(Debug, Default)]
pub struct InMemoryRightsCatalog {
    profiles: DashMap<String, RightsProfile>,
}

impl InMemoryRightsCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_profiles(profiles: impl IntoIterator<Item = RightsProfile>) -> Self {
        let catalog = Self::new();
        for profile in profiles {
            catalog.insert(profile);
        }
        catalog
    }

    /// Load a JSON array of profiles
    pub fn load_json(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read rights catalog {}", path.display()))?;
        let profiles: Vec<RightsProfile> = serde_json::from_str(&raw)
            .with_context(|| format!("Invalid rights catalog JSON in {}", path.display()))?;

        info!(
            "Loaded {} rights profile(s) from {}",
            profiles.len(),
            path.display()
        );
        Ok(Self::from_profiles(profiles))
    }

    pub fn insert(&self, profile: RightsProfile) {
        self.profiles.insert(profile.content_id.clone(), profile);
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}

impl RightsCatalog for InMemoryRightsCatalog {
    fn lookup(&self, content_id: &str) -> Option<RightsProfile> {
        self.profiles.get(content_id).map(|entry| entry.value().clone())
    }
}

/// Catalog profile for `content_id`, or its fallback
pub fn profile_for(catalog: &dyn RightsCatalog, content_id: &str) -> RightsProfile {
    catalog
        .lookup(content_id)
        .unwrap_or_else(|| RightsProfile::fallback(content_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rights::{DeclarationMode, DeclarationStatus};

    #[test]
    fn test_lookup_prefers_recorded_profile() {
        let catalog = InMemoryRightsCatalog::from_profiles([RightsProfile {
            content_id: "mash-001".to_string(),
            declaration_status: DeclarationStatus::Verified,
            declaration_mode: DeclarationMode::Owned,
            fingerprint_confidence: 0.96,
            has_active_license: true,
            license_ends_at: None,
        }]);

        let recorded = profile_for(&catalog, "mash-001");
        assert_eq!(recorded.declaration_mode, DeclarationMode::Owned);

        let unseen = profile_for(&catalog, "mash-999");
        assert_eq!(unseen, RightsProfile::fallback("mash-999"));
    }

    #[test]
    fn test_load_json_catalog() {
        let path = std::env::temp_dir().join(format!(
            "rights_catalog_{}.json",
            uuid::Uuid::new_v4().simple()
        ));
        std::fs::write(
            &path,
            r#"[{"contentId":"mash-004","declarationStatus":"pending","declarationMode":"licensed",
                "fingerprintConfidence":0.62,"hasActiveLicense":false,
                "licenseEndsAt":"2026-01-31T23:59:59Z"}]"#,
        )
        .unwrap();

        let catalog = InMemoryRightsCatalog::load_json(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(catalog.len(), 1);
        let profile = catalog.lookup("mash-004").unwrap();
        assert!(!profile.has_active_license);
        assert!(profile.license_ends_at.is_some());
    }
}
