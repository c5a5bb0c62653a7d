//! Minimal update payloads for the push side.
//!
//! An update carries only the mutable fields of a record plus its
//! `updated_at` (for server-side conflict detection) and the idempotency
//! key minted when the mutation was first staged.

use crate::dto::{ProfileDto, SettingsDto};
use crate::meta::IdempotencyKey;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Push payload for a public profile edit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileUpdate {
    /// Unique handle.
    pub username: Option<String>,
    /// Display name.
    pub display_name: String,
    /// Avatar image location.
    pub avatar_url: Option<String>,
    /// Free-form biography.
    pub bio: Option<String>,
    /// Age in whole years.
    pub age_years: Option<u32>,
    /// Self-described gender.
    pub gender: Option<String>,
    /// Verification flag.
    pub is_verified: bool,
    /// Local logical clock at the time the edit was staged.
    pub updated_at: DateTime<Utc>,
    /// Stable per-mutation token; reused verbatim on retry.
    pub idempotency_key: IdempotencyKey,
}

impl ProfileUpdate {
    /// Builds an update from a full snapshot and a previously minted key.
    pub fn from_snapshot(dto: &ProfileDto, key: IdempotencyKey) -> Self {
        Self {
            username: dto.username.clone(),
            display_name: dto.display_name.clone(),
            avatar_url: dto.avatar_url.clone(),
            bio: dto.bio.clone(),
            age_years: dto.age_years,
            gender: dto.gender.clone(),
            is_verified: dto.is_verified,
            updated_at: dto.meta.updated_at,
            idempotency_key: key,
        }
    }
}

/// Push payload for a settings edit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettingsUpdate {
    /// Appearance mode.
    pub appearance: String,
    /// Preferred measurement units.
    pub units: String,
    /// Whether push notifications are enabled.
    pub notifications_enabled: bool,
    /// Preferred map rendering style.
    pub map_style: String,
    /// Local logical clock at the time the edit was staged.
    pub updated_at: DateTime<Utc>,
    /// Stable per-mutation token; reused verbatim on retry.
    pub idempotency_key: IdempotencyKey,
}

impl SettingsUpdate {
    /// Builds an update from a full snapshot and a previously minted key.
    pub fn from_snapshot(dto: &SettingsDto, key: IdempotencyKey) -> Self {
        Self {
            appearance: dto.appearance.clone(),
            units: dto.units.clone(),
            notifications_enabled: dto.notifications_enabled,
            map_style: dto.map_style.clone(),
            updated_at: dto.meta.updated_at,
            idempotency_key: key,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dto::SnapshotMeta;
    use crate::meta::{SyncStatus, SCHEMA_VERSION};
    use chrono::TimeZone;
    use uuid::Uuid;

    fn profile_dto() -> ProfileDto {
        ProfileDto {
            meta: SnapshotMeta {
                id: Uuid::new_v4(),
                created_at: Utc.timestamp_opt(10, 0).unwrap(),
                updated_at: Utc.timestamp_opt(20, 0).unwrap(),
                deleted_at: None,
                sync_status: SyncStatus::Pending,
                last_cloud_synced_at: None,
                schema_version: SCHEMA_VERSION,
            },
            username: Some("alex".into()),
            display_name: "Alex".into(),
            avatar_url: None,
            bio: Some("hi".into()),
            age_years: None,
            gender: None,
            is_verified: false,
        }
    }

    #[test]
    fn update_carries_clock_and_key() {
        let key = IdempotencyKey::mint();
        let dto = profile_dto();
        let update = ProfileUpdate::from_snapshot(&dto, key.clone());

        assert_eq!(update.updated_at, dto.meta.updated_at);
        assert_eq!(update.idempotency_key, key);
        assert_eq!(update.display_name, "Alex");
    }

    #[test]
    fn update_excludes_reconciliation_fields() {
        let dto = profile_dto();
        let update = ProfileUpdate::from_snapshot(&dto, IdempotencyKey::mint());
        let json = serde_json::to_value(&update).unwrap();

        assert!(json.get("created_at").is_none());
        assert!(json.get("sync_status").is_none());
        assert!(json.get("last_cloud_synced_at").is_none());
        assert!(json.get("idempotency_key").is_some());
    }
}
