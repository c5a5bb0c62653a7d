//! Transport snapshots.
//!
//! A snapshot (DTO) is a flattened, serialization-stable copy of an
//! entity's externally-relevant fields plus its sync metadata. Snapshots
//! never embed live references to other local records; relationships are
//! carried as foreign identifiers. A snapshot is immutable once built.

use crate::meta::{SyncMetadata, SyncStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Sync metadata fields carried on every snapshot, flattened into the
/// wire representation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotMeta {
    /// Record identity.
    pub id: Uuid,
    /// Creation timestamp as reported by the writing side.
    pub created_at: DateTime<Utc>,
    /// Logical clock of the writing side.
    pub updated_at: DateTime<Utc>,
    /// Tombstone marker.
    pub deleted_at: Option<DateTime<Utc>>,
    /// Lifecycle state at snapshot time.
    pub sync_status: SyncStatus,
    /// Last confirmed round-trip of the writing side.
    pub last_cloud_synced_at: Option<DateTime<Utc>>,
    /// Schema tag of the payload.
    pub schema_version: u32,
}

impl From<&SyncMetadata> for SnapshotMeta {
    fn from(meta: &SyncMetadata) -> Self {
        Self {
            id: meta.id,
            created_at: meta.created_at,
            updated_at: meta.updated_at,
            deleted_at: meta.deleted_at,
            sync_status: meta.sync_status,
            last_cloud_synced_at: meta.last_cloud_synced_at,
            schema_version: meta.schema_version,
        }
    }
}

/// Snapshot of a public profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileDto {
    /// Sync metadata, flattened.
    #[serde(flatten)]
    pub meta: SnapshotMeta,
    /// Unique handle, if the user picked one.
    pub username: Option<String>,
    /// Display name shown on the profile.
    pub display_name: String,
    /// Avatar image location.
    pub avatar_url: Option<String>,
    /// Free-form biography.
    pub bio: Option<String>,
    /// Age in whole years, if disclosed.
    pub age_years: Option<u32>,
    /// Self-described gender, if disclosed.
    pub gender: Option<String>,
    /// Whether the profile passed verification.
    pub is_verified: bool,
}

/// Snapshot of per-user settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettingsDto {
    /// Sync metadata, flattened.
    #[serde(flatten)]
    pub meta: SnapshotMeta,
    /// Owning user, as a foreign identifier.
    pub owner_id: Option<Uuid>,
    /// Appearance mode (`system`, `light`, `dark`).
    pub appearance: String,
    /// Preferred measurement units (`metric`, `imperial`).
    pub units: String,
    /// Whether push notifications are enabled.
    pub notifications_enabled: bool,
    /// Preferred map rendering style.
    pub map_style: String,
}

/// Snapshot of a tag in the system-defined catalogue.
///
/// `slug` is the natural key used to match records across a
/// full-collection diff, independent of surrogate ids.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagDto {
    /// Sync metadata, flattened.
    #[serde(flatten)]
    pub meta: SnapshotMeta,
    /// Stable natural key.
    pub slug: String,
    /// Human-readable label.
    pub label: String,
    /// Optional grouping category.
    pub category: Option<String>,
    /// Whether the tag is offered for selection.
    pub is_active: bool,
    /// Whether the tag belongs to the server-authoritative catalogue.
    pub system_defined: bool,
}

/// The single owner of a media item.
///
/// Exactly one owner is guaranteed by construction; the tagged variant
/// replaces three nullable foreign keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum OwnerRef {
    /// Owned by an event.
    Event(Uuid),
    /// Owned by the device user's private profile.
    UserProfile(Uuid),
    /// Owned by a public profile.
    PublicProfile(Uuid),
}

impl OwnerRef {
    /// Returns the owning record's identifier.
    pub fn id(self) -> Uuid {
        match self {
            OwnerRef::Event(id) | OwnerRef::UserProfile(id) | OwnerRef::PublicProfile(id) => id,
        }
    }
}

/// Snapshot of a media item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaDto {
    /// Sync metadata, flattened.
    #[serde(flatten)]
    pub meta: SnapshotMeta,
    /// Remote storage location of the asset.
    pub url: String,
    /// Ordering position within the owner's gallery.
    pub position: u16,
    /// MIME type, if known.
    pub mime_type: Option<String>,
    /// Dominant color of the asset as a hex string.
    pub average_color_hex: Option<String>,
    /// The single owning record.
    pub owner: OwnerRef,
}
