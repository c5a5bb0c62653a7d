//! Bidirectional record/snapshot mapping.
//!
//! Mapping is total and side-effect free in both directions. Applying a
//! snapshot overwrites every externally-sourced field in place but never
//! touches `created_at`, `deleted_at` or `sync_status` - those are owned
//! by the reconciliation layer, not by the wire format. Relationship
//! links to live local records are resolved by the caller.

use crate::record::{MediaRecord, ProfileRecord, SettingsRecord, TagRecord};
use gather_sync_protocol::{MediaDto, ProfileDto, SettingsDto, SnapshotMeta, SyncMetadata, TagDto};

/// Pure, bidirectional transform between a local record and its snapshot.
pub trait EntityMapper {
    /// The local record type.
    type Record;
    /// The wire snapshot type.
    type Snapshot;

    /// Builds a snapshot of the record. Total; never mutates the record.
    fn to_snapshot(record: &Self::Record) -> Self::Snapshot;

    /// Overwrites the record's externally-sourced fields from a snapshot.
    ///
    /// Must never touch `created_at`, `deleted_at` or `sync_status`.
    fn apply_snapshot(snapshot: &Self::Snapshot, record: &mut Self::Record);
}

/// Copies the wire-owned metadata fields onto a record.
///
/// `created_at`, `deleted_at`, `sync_status` and `last_cloud_synced_at`
/// are deliberately left alone; the reconciliation layer stamps them.
fn apply_meta(snapshot: &SnapshotMeta, meta: &mut SyncMetadata) {
    meta.id = snapshot.id;
    meta.updated_at = snapshot.updated_at;
    meta.schema_version = snapshot.schema_version;
}

/// Mapper for public profiles.
pub struct ProfileMapper;

impl EntityMapper for ProfileMapper {
    type Record = ProfileRecord;
    type Snapshot = ProfileDto;

    fn to_snapshot(record: &ProfileRecord) -> ProfileDto {
        ProfileDto {
            meta: SnapshotMeta::from(&record.meta),
            username: record.username.clone(),
            display_name: record.display_name.clone(),
            avatar_url: record.avatar_url.clone(),
            bio: record.bio.clone(),
            age_years: record.age_years,
            gender: record.gender.clone(),
            is_verified: record.is_verified,
        }
    }

    fn apply_snapshot(snapshot: &ProfileDto, record: &mut ProfileRecord) {
        apply_meta(&snapshot.meta, &mut record.meta);
        record.username = snapshot.username.clone();
        record.display_name = snapshot.display_name.clone();
        record.avatar_url = snapshot.avatar_url.clone();
        record.bio = snapshot.bio.clone();
        record.age_years = snapshot.age_years;
        record.gender = snapshot.gender.clone();
        record.is_verified = snapshot.is_verified;
    }
}

/// Mapper for per-user settings.
///
/// The `owner_id` on the snapshot is a foreign identifier only; linking
/// the settings record to a local user is the caller's job.
pub struct SettingsMapper;

impl EntityMapper for SettingsMapper {
    type Record = SettingsRecord;
    type Snapshot = SettingsDto;

    fn to_snapshot(record: &SettingsRecord) -> SettingsDto {
        SettingsDto {
            meta: SnapshotMeta::from(&record.meta),
            owner_id: record.owner,
            appearance: record.appearance.clone(),
            units: record.units.clone(),
            notifications_enabled: record.notifications_enabled,
            map_style: record.map_style.clone(),
        }
    }

    fn apply_snapshot(snapshot: &SettingsDto, record: &mut SettingsRecord) {
        apply_meta(&snapshot.meta, &mut record.meta);
        record.appearance = snapshot.appearance.clone();
        record.units = snapshot.units.clone();
        record.notifications_enabled = snapshot.notifications_enabled;
        record.map_style = snapshot.map_style.clone();
    }
}

/// Mapper for catalogue tags.
pub struct TagMapper;

impl EntityMapper for TagMapper {
    type Record = TagRecord;
    type Snapshot = TagDto;

    fn to_snapshot(record: &TagRecord) -> TagDto {
        TagDto {
            meta: SnapshotMeta::from(&record.meta),
            slug: record.slug.clone(),
            label: record.label.clone(),
            category: record.category.clone(),
            is_active: record.is_active,
            system_defined: record.system_defined,
        }
    }

    fn apply_snapshot(snapshot: &TagDto, record: &mut TagRecord) {
        apply_meta(&snapshot.meta, &mut record.meta);
        record.slug = snapshot.slug.clone();
        record.label = snapshot.label.clone();
        record.category = snapshot.category.clone();
        record.is_active = snapshot.is_active;
        record.system_defined = snapshot.system_defined;
    }
}

/// Mapper for media items.
pub struct MediaMapper;

impl EntityMapper for MediaMapper {
    type Record = MediaRecord;
    type Snapshot = MediaDto;

    fn to_snapshot(record: &MediaRecord) -> MediaDto {
        MediaDto {
            meta: SnapshotMeta::from(&record.meta),
            url: record.url.clone(),
            position: record.position,
            mime_type: record.mime_type.clone(),
            average_color_hex: record.average_color_hex.clone(),
            owner: record.owner,
        }
    }

    fn apply_snapshot(snapshot: &MediaDto, record: &mut MediaRecord) {
        apply_meta(&snapshot.meta, &mut record.meta);
        record.url = snapshot.url.clone();
        record.position = snapshot.position;
        record.mime_type = snapshot.mime_type.clone();
        record.average_color_hex = snapshot.average_color_hex.clone();
        record.owner = snapshot.owner;
    }
}
