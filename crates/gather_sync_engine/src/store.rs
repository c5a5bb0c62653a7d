//! Local persistence boundary.
//!
//! The engine never talks to a concrete database. It consumes
//! fetch-by-identity and fetch-by-predicate capabilities plus an
//! all-or-nothing [`LocalStore::commit`] per reconciliation unit, and a
//! small per-collection key-value [`CursorStore`] for cache tokens.
//! [`MemoryStore`] backs the engine tests.

use crate::error::SyncResult;
use crate::record::{MediaRecord, ProfileRecord, SettingsRecord, TagRecord};
use crate::transport::CacheToken;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use uuid::Uuid;

/// One reconciliation unit's worth of staged upserts.
///
/// A batch is computed fully in memory and then committed as a whole;
/// an abandoned batch leaves the store exactly as it was.
#[derive(Debug, Clone, Default)]
pub struct Batch {
    /// Profiles to upsert.
    pub profiles: Vec<ProfileRecord>,
    /// Settings to upsert.
    pub settings: Vec<SettingsRecord>,
    /// Tags to upsert.
    pub tags: Vec<TagRecord>,
    /// Media items to upsert.
    pub media: Vec<MediaRecord>,
}

impl Batch {
    /// Returns true if the batch stages no writes.
    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
            && self.settings.is_empty()
            && self.tags.is_empty()
            && self.media.is_empty()
    }

    /// Returns the number of staged upserts.
    pub fn len(&self) -> usize {
        self.profiles.len() + self.settings.len() + self.tags.len() + self.media.len()
    }
}

/// The transactional local datastore the engine reconciles against.
pub trait LocalStore: Send + Sync {
    /// Fetches a profile by identity.
    fn profile_by_id(&self, id: Uuid) -> SyncResult<Option<ProfileRecord>>;

    /// Fetches the profile owned by the given user.
    fn profile_by_owner(&self, owner: Uuid) -> SyncResult<Option<ProfileRecord>>;

    /// Fetches the profile with unconfirmed local state, if any.
    fn pending_profile(&self) -> SyncResult<Option<ProfileRecord>>;

    /// Fetches a settings record by identity.
    fn settings_by_id(&self, id: Uuid) -> SyncResult<Option<SettingsRecord>>;

    /// Fetches the settings record owned by the given user.
    fn settings_by_owner(&self, owner: Uuid) -> SyncResult<Option<SettingsRecord>>;

    /// Fetches the settings record with unconfirmed local state, if any.
    fn pending_settings(&self) -> SyncResult<Option<SettingsRecord>>;

    /// Fetches all members of the system-defined tag catalogue.
    fn system_tags(&self) -> SyncResult<Vec<TagRecord>>;

    /// Fetches a media item by identity.
    fn media_by_id(&self, id: Uuid) -> SyncResult<Option<MediaRecord>>;

    /// Fetches all media items with unconfirmed local state.
    fn pending_media(&self) -> SyncResult<Vec<MediaRecord>>;

    /// Commits a batch of upserts. All-or-nothing.
    fn commit(&self, batch: Batch) -> SyncResult<()>;
}

/// An in-memory store for tests and ephemeral replicas.
#[derive(Debug, Default)]
pub struct MemoryStore {
    profiles: RwLock<HashMap<Uuid, ProfileRecord>>,
    settings: RwLock<HashMap<Uuid, SettingsRecord>>,
    tags: RwLock<HashMap<Uuid, TagRecord>>,
    media: RwLock<HashMap<Uuid, MediaRecord>>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a profile directly, bypassing the batch path.
    pub fn insert_profile(&self, record: ProfileRecord) {
        self.profiles.write().insert(record.meta.id, record);
    }

    /// Seeds a settings record directly.
    pub fn insert_settings(&self, record: SettingsRecord) {
        self.settings.write().insert(record.meta.id, record);
    }

    /// Seeds a tag directly.
    pub fn insert_tag(&self, record: TagRecord) {
        self.tags.write().insert(record.meta.id, record);
    }

    /// Seeds a media item directly.
    pub fn insert_media(&self, record: MediaRecord) {
        self.media.write().insert(record.meta.id, record);
    }

    /// Returns the number of stored tags (active or retired).
    pub fn tag_count(&self) -> usize {
        self.tags.read().len()
    }
}

impl LocalStore for MemoryStore {
    fn profile_by_id(&self, id: Uuid) -> SyncResult<Option<ProfileRecord>> {
        Ok(self.profiles.read().get(&id).cloned())
    }

    fn profile_by_owner(&self, owner: Uuid) -> SyncResult<Option<ProfileRecord>> {
        Ok(self
            .profiles
            .read()
            .values()
            .find(|p| p.owner == Some(owner))
            .cloned())
    }

    fn pending_profile(&self) -> SyncResult<Option<ProfileRecord>> {
        Ok(self
            .profiles
            .read()
            .values()
            .find(|p| p.meta.needs_sync())
            .cloned())
    }

    fn settings_by_id(&self, id: Uuid) -> SyncResult<Option<SettingsRecord>> {
        Ok(self.settings.read().get(&id).cloned())
    }

    fn settings_by_owner(&self, owner: Uuid) -> SyncResult<Option<SettingsRecord>> {
        Ok(self
            .settings
            .read()
            .values()
            .find(|s| s.owner == Some(owner))
            .cloned())
    }

    fn pending_settings(&self) -> SyncResult<Option<SettingsRecord>> {
        Ok(self
            .settings
            .read()
            .values()
            .find(|s| s.meta.needs_sync())
            .cloned())
    }

    fn system_tags(&self) -> SyncResult<Vec<TagRecord>> {
        Ok(self
            .tags
            .read()
            .values()
            .filter(|t| t.system_defined)
            .cloned()
            .collect())
    }

    fn media_by_id(&self, id: Uuid) -> SyncResult<Option<MediaRecord>> {
        Ok(self.media.read().get(&id).cloned())
    }

    fn pending_media(&self) -> SyncResult<Vec<MediaRecord>> {
        Ok(self
            .media
            .read()
            .values()
            .filter(|m| m.meta.needs_sync())
            .cloned()
            .collect())
    }

    fn commit(&self, batch: Batch) -> SyncResult<()> {
        // Take all table locks up front so the unit lands as a whole.
        let mut profiles = self.profiles.write();
        let mut settings = self.settings.write();
        let mut tags = self.tags.write();
        let mut media = self.media.write();

        for record in batch.profiles {
            profiles.insert(record.meta.id, record);
        }
        for record in batch.settings {
            settings.insert(record.meta.id, record);
        }
        for record in batch.tags {
            tags.insert(record.meta.id, record);
        }
        for record in batch.media {
            media.insert(record.meta.id, record);
        }
        Ok(())
    }
}

/// Key identifying a synchronized collection in the cursor store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    /// The public profile resource.
    Profile,
    /// The per-user settings resource.
    Settings,
    /// The system-defined tag catalogue.
    SystemTags,
}

impl Collection {
    /// Returns the stable key under which cursor state is persisted.
    pub fn key(self) -> &'static str {
        match self {
            Collection::Profile => "profile",
            Collection::Settings => "settings",
            Collection::SystemTags => "system_tags",
        }
    }
}

/// Per-collection cursor state: the opaque cache token from the last
/// changed response and the time of the last completed refresh.
///
/// Owned by whoever constructs the pull coordinator; survives process
/// restarts behind a persistent implementation.
pub trait CursorStore: Send + Sync {
    /// Returns the cache token for a collection, if one was recorded.
    fn token(&self, collection: Collection) -> Option<CacheToken>;

    /// Records a new cache token for a collection.
    fn set_token(&self, collection: Collection, token: CacheToken);

    /// Returns the time of the last completed refresh.
    fn last_refreshed(&self, collection: Collection) -> Option<DateTime<Utc>>;

    /// Records a completed refresh (including "checked, nothing changed").
    fn set_last_refreshed(&self, collection: Collection, at: DateTime<Utc>);
}

/// An in-memory cursor store.
#[derive(Debug, Default)]
pub struct MemoryCursorStore {
    tokens: RwLock<HashMap<Collection, CacheToken>>,
    refreshed: RwLock<HashMap<Collection, DateTime<Utc>>>,
}

impl MemoryCursorStore {
    /// Creates an empty cursor store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl CursorStore for MemoryCursorStore {
    fn token(&self, collection: Collection) -> Option<CacheToken> {
        self.tokens.read().get(&collection).cloned()
    }

    fn set_token(&self, collection: Collection, token: CacheToken) {
        self.tokens.write().insert(collection, token);
    }

    fn last_refreshed(&self, collection: Collection) -> Option<DateTime<Utc>> {
        self.refreshed.read().get(&collection).copied()
    }

    fn set_last_refreshed(&self, collection: Collection, at: DateTime<Utc>) {
        self.refreshed.write().insert(collection, at);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn fetch_by_identity_and_owner() {
        let store = MemoryStore::new();
        let owner = Uuid::new_v4();
        let profile = ProfileRecord::new("Alex", owner, at(10));
        let id = profile.meta.id;
        store.insert_profile(profile);

        assert!(store.profile_by_id(id).unwrap().is_some());
        assert!(store.profile_by_owner(owner).unwrap().is_some());
        assert!(store.profile_by_id(Uuid::new_v4()).unwrap().is_none());
        assert!(store.profile_by_owner(Uuid::new_v4()).unwrap().is_none());
    }

    #[test]
    fn pending_predicates_track_needs_sync() {
        let store = MemoryStore::new();
        let owner = Uuid::new_v4();
        let mut profile = ProfileRecord::new("Alex", owner, at(10));
        profile.meta.mark_synced(at(20));
        store.insert_profile(profile.clone());

        assert!(store.pending_profile().unwrap().is_none());

        profile.set_bio(Some("new bio".into()), at(30));
        store.insert_profile(profile);
        assert!(store.pending_profile().unwrap().is_some());
    }

    #[test]
    fn system_tags_filters_local_tags() {
        let store = MemoryStore::new();
        let mut system = TagRecord::new("rooftop", "Rooftop", at(10));
        system.system_defined = true;
        store.insert_tag(system);
        store.insert_tag(TagRecord::new("my-own", "My Own", at(10)));

        let tags = store.system_tags().unwrap();
        assert_eq!(tags.len(), 1);
        assert_eq!(tags[0].slug, "rooftop");
        assert_eq!(store.tag_count(), 2);
    }

    #[test]
    fn commit_applies_whole_batch() {
        let store = MemoryStore::new();
        let owner = Uuid::new_v4();
        let mut batch = Batch::default();
        assert!(batch.is_empty());

        batch.profiles.push(ProfileRecord::new("Alex", owner, at(10)));
        batch.settings.push(SettingsRecord::new(owner, at(10)));
        assert_eq!(batch.len(), 2);

        store.commit(batch).unwrap();
        assert!(store.profile_by_owner(owner).unwrap().is_some());
        assert!(store.settings_by_owner(owner).unwrap().is_some());
    }

    #[test]
    fn cursor_store_round_trip() {
        let cursors = MemoryCursorStore::new();
        assert!(cursors.token(Collection::SystemTags).is_none());

        cursors.set_token(Collection::SystemTags, CacheToken::new("W/\"abc\""));
        cursors.set_last_refreshed(Collection::SystemTags, at(100));

        assert_eq!(
            cursors.token(Collection::SystemTags).unwrap().as_str(),
            "W/\"abc\""
        );
        assert_eq!(
            cursors.last_refreshed(Collection::SystemTags),
            Some(at(100))
        );
        // Keys are per collection.
        assert!(cursors.token(Collection::Profile).is_none());
    }
}
