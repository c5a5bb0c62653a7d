//! Transport layer abstraction for sync operations.
//!
//! The trait speaks in snapshots and updates, never in HTTP. A changed
//! fetch carries an opaque [`CacheToken`] the caller echoes on the next
//! fetch of the same collection; an unchanged fetch short-circuits to
//! [`Fetched::NotModified`].

use crate::error::{SyncError, SyncResult};
use gather_sync_protocol::{
    IdempotencyKey, MediaDto, ProfileDto, ProfileUpdate, SettingsDto, SettingsUpdate, TagDto,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use uuid::Uuid;

/// Opaque per-collection freshness token (an entity tag on HTTP).
///
/// The engine never inspects its contents; it only stores it and echoes
/// it back verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheToken(String);

impl CacheToken {
    /// Wraps a token value.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Returns the raw token.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Outcome of a conditional fetch.
#[derive(Debug, Clone)]
pub enum Fetched<T> {
    /// The collection has not changed since the echoed token.
    NotModified,
    /// The collection changed; `body` is the full current snapshot.
    Changed {
        /// The fetched snapshot.
        body: T,
        /// Token to echo on the next fetch, when the server sent one.
        token: Option<CacheToken>,
    },
}

impl<T> Fetched<T> {
    /// Returns true for the unchanged outcome.
    pub fn is_not_modified(&self) -> bool {
        matches!(self, Fetched::NotModified)
    }
}

/// A sync transport handles remote communication for pull and push.
///
/// Push errors are split by finality: `Err(SyncError::Rejected)` means
/// the server refused the mutation and a retry with the same payload
/// would refuse it again; retryable transport errors mean the outcome
/// is unknown and the caller should retry with the same idempotency key.
pub trait SyncTransport: Send + Sync {
    /// Conditionally fetches the profile owned by `owner`.
    fn fetch_profile(
        &self,
        owner: Uuid,
        token: Option<&CacheToken>,
    ) -> SyncResult<Fetched<ProfileDto>>;

    /// Conditionally fetches the settings owned by `owner`.
    fn fetch_settings(
        &self,
        owner: Uuid,
        token: Option<&CacheToken>,
    ) -> SyncResult<Fetched<SettingsDto>>;

    /// Conditionally fetches the full system tag catalogue.
    fn fetch_system_tags(&self, token: Option<&CacheToken>) -> SyncResult<Fetched<Vec<TagDto>>>;

    /// Pushes a profile edit. Returns the server's post-write snapshot.
    fn push_profile(&self, id: Uuid, update: &ProfileUpdate) -> SyncResult<ProfileDto>;

    /// Pushes a settings edit. Returns the server's post-write snapshot.
    fn push_settings(&self, id: Uuid, update: &SettingsUpdate) -> SyncResult<SettingsDto>;

    /// Pushes a locally captured media item.
    fn push_media(&self, snapshot: &MediaDto, key: &IdempotencyKey) -> SyncResult<MediaDto>;

    /// Checks if the transport is connected.
    fn is_connected(&self) -> bool;
}

/// A mock transport for testing.
#[derive(Debug, Default)]
pub struct MockTransport {
    connected: AtomicBool,
    profile_response: Mutex<Option<Fetched<ProfileDto>>>,
    settings_response: Mutex<Option<Fetched<SettingsDto>>>,
    tags_response: Mutex<Option<Fetched<Vec<TagDto>>>>,
    push_profile_response: Mutex<Option<SyncResult<ProfileDto>>>,
    push_settings_response: Mutex<Option<SyncResult<SettingsDto>>>,
    push_media_response: Mutex<Option<SyncResult<MediaDto>>>,
    seen_tokens: Mutex<Vec<Option<String>>>,
    seen_keys: Mutex<Vec<String>>,
}

impl MockTransport {
    /// Creates a new mock transport, connected by default.
    pub fn new() -> Self {
        Self {
            connected: AtomicBool::new(true),
            ..Self::default()
        }
    }

    /// Sets the next profile fetch outcome.
    pub fn set_profile_response(&self, response: Fetched<ProfileDto>) {
        *self.profile_response.lock().unwrap() = Some(response);
    }

    /// Sets the next settings fetch outcome.
    pub fn set_settings_response(&self, response: Fetched<SettingsDto>) {
        *self.settings_response.lock().unwrap() = Some(response);
    }

    /// Sets the next tag catalogue fetch outcome.
    pub fn set_tags_response(&self, response: Fetched<Vec<TagDto>>) {
        *self.tags_response.lock().unwrap() = Some(response);
    }

    /// Sets the next profile push outcome.
    pub fn set_push_profile_response(&self, response: SyncResult<ProfileDto>) {
        *self.push_profile_response.lock().unwrap() = Some(response);
    }

    /// Sets the next settings push outcome.
    pub fn set_push_settings_response(&self, response: SyncResult<SettingsDto>) {
        *self.push_settings_response.lock().unwrap() = Some(response);
    }

    /// Sets the next media push outcome.
    pub fn set_push_media_response(&self, response: SyncResult<MediaDto>) {
        *self.push_media_response.lock().unwrap() = Some(response);
    }

    /// Sets the connected state.
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    /// Returns the tokens echoed on fetches, in call order.
    pub fn seen_tokens(&self) -> Vec<Option<String>> {
        self.seen_tokens.lock().unwrap().clone()
    }

    /// Returns the idempotency keys presented on media pushes, in call order.
    pub fn seen_keys(&self) -> Vec<String> {
        self.seen_keys.lock().unwrap().clone()
    }

    fn check_connected(&self) -> SyncResult<()> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(SyncError::transport_retryable("transport disconnected"))
        }
    }
}

impl SyncTransport for MockTransport {
    fn fetch_profile(
        &self,
        _owner: Uuid,
        token: Option<&CacheToken>,
    ) -> SyncResult<Fetched<ProfileDto>> {
        self.check_connected()?;
        self.seen_tokens
            .lock()
            .unwrap()
            .push(token.map(|t| t.as_str().to_owned()));
        self.profile_response
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| SyncError::transport_fatal("no mock profile response set"))
    }

    fn fetch_settings(
        &self,
        _owner: Uuid,
        token: Option<&CacheToken>,
    ) -> SyncResult<Fetched<SettingsDto>> {
        self.check_connected()?;
        self.seen_tokens
            .lock()
            .unwrap()
            .push(token.map(|t| t.as_str().to_owned()));
        self.settings_response
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| SyncError::transport_fatal("no mock settings response set"))
    }

    fn fetch_system_tags(&self, token: Option<&CacheToken>) -> SyncResult<Fetched<Vec<TagDto>>> {
        self.check_connected()?;
        self.seen_tokens
            .lock()
            .unwrap()
            .push(token.map(|t| t.as_str().to_owned()));
        self.tags_response
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| SyncError::transport_fatal("no mock tags response set"))
    }

    fn push_profile(&self, _id: Uuid, update: &ProfileUpdate) -> SyncResult<ProfileDto> {
        self.check_connected()?;
        self.seen_keys
            .lock()
            .unwrap()
            .push(update.idempotency_key.as_str().to_owned());
        self.push_profile_response
            .lock()
            .unwrap()
            .take()
            .unwrap_or_else(|| Err(SyncError::transport_fatal("no mock push response set")))
    }

    fn push_settings(&self, _id: Uuid, update: &SettingsUpdate) -> SyncResult<SettingsDto> {
        self.check_connected()?;
        self.seen_keys
            .lock()
            .unwrap()
            .push(update.idempotency_key.as_str().to_owned());
        self.push_settings_response
            .lock()
            .unwrap()
            .take()
            .unwrap_or_else(|| Err(SyncError::transport_fatal("no mock push response set")))
    }

    fn push_media(&self, _snapshot: &MediaDto, key: &IdempotencyKey) -> SyncResult<MediaDto> {
        self.check_connected()?;
        self.seen_keys.lock().unwrap().push(key.as_str().to_owned());
        self.push_media_response
            .lock()
            .unwrap()
            .take()
            .unwrap_or_else(|| Err(SyncError::transport_fatal("no mock push response set")))
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}
