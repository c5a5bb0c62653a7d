//! Local replica records.
//!
//! Each record embeds [`SyncMetadata`] and mirrors the externally-relevant
//! fields of its transport snapshot. Mutators route every write to a
//! synchronizable field through [`SyncMetadata::mark_local_edit`] so the
//! lifecycle contract (any local edit resets the record to pending and
//! bumps its clock) cannot be bypassed accidentally.

use chrono::{DateTime, Utc};
use gather_sync_protocol::{OwnerRef, SyncMetadata};
use uuid::Uuid;

/// Local copy of a public profile.
///
/// `owner` links the profile to the device user; it is local bookkeeping
/// and never travels on the wire.
#[derive(Debug, Clone, PartialEq)]
pub struct ProfileRecord {
    /// Sync bookkeeping.
    pub meta: SyncMetadata,
    /// Owning device user, the relationship fallback key for reconciliation.
    pub owner: Option<Uuid>,
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
}

impl ProfileRecord {
    /// Creates a locally authored profile. Starts pending.
    pub fn new(display_name: impl Into<String>, owner: Uuid, now: DateTime<Utc>) -> Self {
        Self {
            meta: SyncMetadata::new(now),
            owner: Some(owner),
            username: None,
            display_name: display_name.into(),
            avatar_url: None,
            bio: None,
            age_years: None,
            gender: None,
            is_verified: false,
        }
    }

    /// Renames the profile.
    pub fn set_display_name(&mut self, name: impl Into<String>, now: DateTime<Utc>) {
        self.display_name = name.into();
        self.meta.mark_local_edit(now);
    }

    /// Replaces the biography.
    pub fn set_bio(&mut self, bio: Option<String>, now: DateTime<Utc>) {
        self.bio = bio;
        self.meta.mark_local_edit(now);
    }
}

/// Local copy of the per-user settings record.
#[derive(Debug, Clone, PartialEq)]
pub struct SettingsRecord {
    /// Sync bookkeeping.
    pub meta: SyncMetadata,
    /// Owning device user.
    pub owner: Option<Uuid>,
    /// Appearance mode.
    pub appearance: String,
    /// Preferred measurement units.
    pub units: String,
    /// Whether push notifications are enabled.
    pub notifications_enabled: bool,
    /// Preferred map rendering style.
    pub map_style: String,
}

impl SettingsRecord {
    /// Creates default settings for a user. Starts pending.
    pub fn new(owner: Uuid, now: DateTime<Utc>) -> Self {
        Self {
            meta: SyncMetadata::new(now),
            owner: Some(owner),
            appearance: "system".into(),
            units: "metric".into(),
            notifications_enabled: true,
            map_style: "standard".into(),
        }
    }

    /// Changes the appearance mode.
    pub fn set_appearance(&mut self, appearance: impl Into<String>, now: DateTime<Utc>) {
        self.appearance = appearance.into();
        self.meta.mark_local_edit(now);
    }

    /// Toggles push notifications.
    pub fn set_notifications_enabled(&mut self, enabled: bool, now: DateTime<Utc>) {
        self.notifications_enabled = enabled;
        self.meta.mark_local_edit(now);
    }
}

/// Local copy of a tag from the system-defined catalogue.
#[derive(Debug, Clone, PartialEq)]
pub struct TagRecord {
    /// Sync bookkeeping.
    pub meta: SyncMetadata,
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

impl TagRecord {
    /// Creates a catalogue tag. Starts pending.
    pub fn new(slug: impl Into<String>, label: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            meta: SyncMetadata::new(now),
            slug: slug.into(),
            label: label.into(),
            category: None,
            is_active: true,
            system_defined: false,
        }
    }

    /// Retires the tag after a collection diff found it absent remotely.
    ///
    /// The record is hidden, not purged, so local relationships that
    /// reference it stay intact.
    pub fn retire(&mut self, now: DateTime<Utc>) {
        self.is_active = false;
        self.meta.updated_at = self.meta.updated_at.max(now);
        self.meta.mark_synced(now);
    }
}

/// Local copy of a media item.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaRecord {
    /// Sync bookkeeping.
    pub meta: SyncMetadata,
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

impl MediaRecord {
    /// Creates a locally captured media item. Starts pending.
    pub fn new(url: impl Into<String>, owner: OwnerRef, now: DateTime<Utc>) -> Self {
        Self {
            meta: SyncMetadata::new(now),
            url: url.into(),
            position: 0,
            mime_type: None,
            average_color_hex: None,
            owner,
        }
    }

    /// Moves the item within the owner's gallery.
    pub fn set_position(&mut self, position: u16, now: DateTime<Utc>) {
        self.position = position;
        self.meta.mark_local_edit(now);
    }
}
