//! Sync engine state machine.
//!
//! A cycle is pull-then-push: remote truth lands first, then pending
//! local edits go out. The engine is synchronous; schedule it from
//! whatever cadence the host application wants and cancel it from
//! another thread via [`SyncEngine::cancel`].

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::pull::{PullCoordinator, PullReport};
use crate::push::{PushQueue, PushReport};
use crate::store::{CursorStore, LocalStore};
use crate::transport::SyncTransport;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};
use uuid::Uuid;

/// The current state of the sync engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// Engine is idle, not syncing.
    Idle,
    /// Engine is pulling remote snapshots.
    Pulling,
    /// Engine is pushing pending local edits.
    Pushing,
    /// Engine has completed a sync cycle.
    Synced,
    /// Engine encountered an error.
    Error,
    /// Engine is waiting before retrying.
    RetryWait,
}

impl SyncState {
    /// Returns true if the engine is in an active sync state.
    pub fn is_active(&self) -> bool {
        matches!(self, SyncState::Pulling | SyncState::Pushing)
    }

    /// Returns true if the engine can start a new sync.
    pub fn can_start_sync(&self) -> bool {
        matches!(self, SyncState::Idle | SyncState::Synced | SyncState::Error)
    }
}

/// Statistics about sync operations.
#[derive(Debug, Clone, Default)]
pub struct SyncStats {
    /// Total number of sync cycles completed.
    pub cycles_completed: u64,
    /// Total number of remote snapshots applied.
    pub snapshots_applied: u64,
    /// Total number of records created from remote snapshots.
    pub records_created: u64,
    /// Total number of tags retired by collection diffs.
    pub tags_retired: u64,
    /// Total number of local edits confirmed by the server.
    pub edits_pushed: u64,
    /// Total number of definitive push rejections.
    pub pushes_rejected: u64,
    /// Total number of retries.
    pub retries: u64,
    /// Last successful sync time.
    pub last_sync_time: Option<Instant>,
    /// Last error message.
    pub last_error: Option<String>,
}

/// Result of a sync cycle.
#[derive(Debug, Clone)]
pub struct SyncCycleResult {
    /// What the pull phase did.
    pub pull: PullReport,
    /// What the push phase did.
    pub push: PushReport,
    /// Whether the cycle ran to completion.
    pub success: bool,
    /// Duration of the sync cycle.
    pub duration: Duration,
}

/// The sync engine drives pull and push cycles against a remote store.
pub struct SyncEngine<T: SyncTransport, S: LocalStore, C: CursorStore> {
    config: SyncConfig,
    owner: Uuid,
    transport: Arc<T>,
    store: Arc<S>,
    cursors: Arc<C>,
    queue: PushQueue,
    state: RwLock<SyncState>,
    stats: RwLock<SyncStats>,
    cancelled: AtomicBool,
    current_retry: AtomicU64,
}

impl<T: SyncTransport, S: LocalStore, C: CursorStore> SyncEngine<T, S, C> {
    /// Creates a new sync engine for the given device user.
    pub fn new(config: SyncConfig, owner: Uuid, transport: T, store: S, cursors: C) -> Self {
        Self {
            config,
            owner,
            transport: Arc::new(transport),
            store: Arc::new(store),
            cursors: Arc::new(cursors),
            queue: PushQueue::new(),
            state: RwLock::new(SyncState::Idle),
            stats: RwLock::new(SyncStats::default()),
            cancelled: AtomicBool::new(false),
            current_retry: AtomicU64::new(0),
        }
    }

    /// Gets the current state.
    pub fn state(&self) -> SyncState {
        *self.state.read()
    }

    /// Gets the current stats.
    pub fn stats(&self) -> SyncStats {
        self.stats.read().clone()
    }

    /// Returns the device user this engine syncs for.
    pub fn owner(&self) -> Uuid {
        self.owner
    }

    /// Returns a handle to the local store.
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Cancels any ongoing sync operation.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Resets the cancelled flag.
    pub fn reset_cancel(&self) {
        self.cancelled.store(false, Ordering::SeqCst);
    }

    /// Bails out of the current cycle if a cancel request arrived.
    ///
    /// A cancelled cycle parks the engine back at idle; the next call
    /// to [`SyncEngine::sync`] starts a fresh cycle.
    fn check_cancelled(&self) -> SyncResult<()> {
        if self.cancelled.load(Ordering::SeqCst) {
            self.set_state(SyncState::Idle);
            Err(SyncError::Cancelled)
        } else {
            Ok(())
        }
    }

    fn set_state(&self, state: SyncState) {
        *self.state.write() = state;
    }

    /// Performs a full sync cycle at the current wall-clock time.
    pub fn sync(&self) -> SyncResult<SyncCycleResult> {
        self.sync_at(Utc::now())
    }

    /// Performs a full sync cycle: pull then push.
    ///
    /// `now` stamps every `last_cloud_synced_at` and refresh timestamp
    /// written during this cycle.
    pub fn sync_at(&self, now: DateTime<Utc>) -> SyncResult<SyncCycleResult> {
        let start = Instant::now();
        self.reset_cancel();

        if !self.state().can_start_sync() {
            return Err(SyncError::InvalidStateTransition {
                from: format!("{:?}", self.state()),
                to: "sync".into(),
            });
        }

        info!(owner = %self.owner, "sync cycle starting");

        self.set_state(SyncState::Pulling);
        let coordinator = PullCoordinator::new(
            self.transport.as_ref(),
            self.store.as_ref(),
            self.cursors.as_ref(),
            self.config.policy,
        );
        let pull = match coordinator.refresh_all(self.owner, now) {
            Ok(report) => report,
            Err(e) => {
                self.handle_error(&e);
                return Err(e);
            }
        };

        self.check_cancelled()?;

        self.set_state(SyncState::Pushing);
        let push = match self
            .queue
            .push_pending(self.transport.as_ref(), self.store.as_ref(), now)
        {
            Ok(report) => report,
            Err(e) => {
                self.handle_error(&e);
                return Err(e);
            }
        };

        self.set_state(SyncState::Synced);
        self.current_retry.store(0, Ordering::SeqCst);

        {
            let mut stats = self.stats.write();
            stats.cycles_completed += 1;
            stats.snapshots_applied += pull.applied as u64;
            stats.records_created += pull.created as u64;
            stats.tags_retired += pull.retired as u64;
            stats.edits_pushed += push.pushed as u64;
            stats.pushes_rejected += push.rejected.len() as u64;
            stats.last_sync_time = Some(Instant::now());
            stats.last_error = None;
        }

        Ok(SyncCycleResult {
            pull,
            push,
            success: true,
            duration: start.elapsed(),
        })
    }

    /// Performs a sync with retry on transient errors.
    pub fn sync_with_retry(&self) -> SyncResult<SyncCycleResult> {
        let retry_config = self.config.retry.clone();
        let mut last_error = None;

        for attempt in 0..retry_config.max_attempts {
            if attempt > 0 {
                self.set_state(SyncState::RetryWait);
                let delay = retry_config.delay_for_attempt(attempt);
                std::thread::sleep(delay);

                self.stats.write().retries += 1;
            }

            self.check_cancelled()?;
            self.current_retry.store(u64::from(attempt), Ordering::SeqCst);

            match self.sync() {
                Ok(result) => return Ok(result),
                Err(e) => {
                    if e.is_retryable() && attempt + 1 < retry_config.max_attempts {
                        warn!(attempt, error = %e, "sync attempt failed, retrying");
                        last_error = Some(e);
                        continue;
                    }
                    return Err(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| SyncError::transport_fatal("no sync attempts made")))
    }

    fn handle_error(&self, error: &SyncError) {
        warn!(error = %error, "sync cycle failed");
        self.set_state(SyncState::Error);
        self.stats.write().last_error = Some(error.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetryConfig;
    use crate::record::ProfileRecord;
    use crate::store::{MemoryCursorStore, MemoryStore};
    use crate::transport::{CacheToken, Fetched, MockTransport};
    use chrono::TimeZone;
    use gather_sync_protocol::{
        IdempotencyKey, MediaDto, ProfileDto, ProfileUpdate, SettingsDto, SettingsUpdate,
        SyncStatus, TagDto,
    };

    type FetchHook = Arc<std::sync::Mutex<Option<Box<dyn Fn() + Send + Sync>>>>;

    /// Wraps the mock so a test can run code while the pull phase is
    /// still in flight.
    struct HookedTransport {
        inner: MockTransport,
        on_settings_fetch: FetchHook,
    }

    impl SyncTransport for HookedTransport {
        fn fetch_profile(
            &self,
            owner: Uuid,
            token: Option<&CacheToken>,
        ) -> SyncResult<Fetched<ProfileDto>> {
            self.inner.fetch_profile(owner, token)
        }

        fn fetch_settings(
            &self,
            owner: Uuid,
            token: Option<&CacheToken>,
        ) -> SyncResult<Fetched<SettingsDto>> {
            if let Some(hook) = self.on_settings_fetch.lock().unwrap().as_ref() {
                hook();
            }
            self.inner.fetch_settings(owner, token)
        }

        fn fetch_system_tags(
            &self,
            token: Option<&CacheToken>,
        ) -> SyncResult<Fetched<Vec<TagDto>>> {
            self.inner.fetch_system_tags(token)
        }

        fn push_profile(&self, id: Uuid, update: &ProfileUpdate) -> SyncResult<ProfileDto> {
            self.inner.push_profile(id, update)
        }

        fn push_settings(&self, id: Uuid, update: &SettingsUpdate) -> SyncResult<SettingsDto> {
            self.inner.push_settings(id, update)
        }

        fn push_media(&self, snapshot: &MediaDto, key: &IdempotencyKey) -> SyncResult<MediaDto> {
            self.inner.push_media(snapshot, key)
        }

        fn is_connected(&self) -> bool {
            self.inner.is_connected()
        }
    }

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn quiet_transport() -> MockTransport {
        let transport = MockTransport::new();
        transport.set_tags_response(Fetched::NotModified);
        transport.set_profile_response(Fetched::NotModified);
        transport.set_settings_response(Fetched::NotModified);
        transport
    }

    fn engine(
        transport: MockTransport,
        store: MemoryStore,
    ) -> SyncEngine<MockTransport, MemoryStore, MemoryCursorStore> {
        SyncEngine::new(
            SyncConfig::new("https://api.gather.example").with_retry(RetryConfig::no_retry()),
            Uuid::new_v4(),
            transport,
            store,
            MemoryCursorStore::new(),
        )
    }

    #[test]
    fn sync_state_checks() {
        assert!(SyncState::Idle.can_start_sync());
        assert!(SyncState::Synced.can_start_sync());
        assert!(SyncState::Error.can_start_sync());
        assert!(!SyncState::Pulling.can_start_sync());
        assert!(!SyncState::Pushing.can_start_sync());

        assert!(SyncState::Pulling.is_active());
        assert!(SyncState::Pushing.is_active());
        assert!(!SyncState::Idle.is_active());
        assert!(!SyncState::RetryWait.is_active());
    }

    #[test]
    fn sync_engine_initial_state() {
        let engine = engine(quiet_transport(), MemoryStore::new());
        assert_eq!(engine.state(), SyncState::Idle);
        assert_eq!(engine.stats().cycles_completed, 0);
    }

    #[test]
    fn quiet_cycle_completes() {
        let engine = engine(quiet_transport(), MemoryStore::new());

        let result = engine.sync_at(at(100)).unwrap();
        assert!(result.success);
        assert_eq!(result.pull.not_modified, 3);
        assert_eq!(result.push.pushed, 0);
        assert_eq!(engine.state(), SyncState::Synced);
        assert_eq!(engine.stats().cycles_completed, 1);
        assert!(engine.stats().last_error.is_none());
    }

    #[test]
    fn pull_failure_moves_to_error_state() {
        // No mock responses: the first fetch fails.
        let engine = engine(MockTransport::new(), MemoryStore::new());

        let result = engine.sync_at(at(100));
        assert!(result.is_err());
        assert_eq!(engine.state(), SyncState::Error);
        assert!(engine.stats().last_error.is_some());
    }

    #[test]
    fn error_state_allows_another_attempt() {
        let transport = MockTransport::new();
        let store = MemoryStore::new();
        let engine = engine(transport, store);

        assert!(engine.sync_at(at(100)).is_err());
        assert_eq!(engine.state(), SyncState::Error);
        assert!(engine.state().can_start_sync());
    }

    #[test]
    fn cycle_pushes_pending_edit() {
        let transport = quiet_transport();
        let store = MemoryStore::new();
        let record = ProfileRecord::new("Alex", Uuid::new_v4(), at(10));
        let id = record.meta.id;

        let meta = &record.meta;
        let dto = gather_sync_protocol::ProfileDto {
            meta: gather_sync_protocol::SnapshotMeta::from(meta),
            username: None,
            display_name: record.display_name.clone(),
            avatar_url: None,
            bio: None,
            age_years: None,
            gender: None,
            is_verified: false,
        };
        transport.set_push_profile_response(Ok(dto));
        store.insert_profile(record);

        let engine = engine(transport, store);
        let result = engine.sync_at(at(100)).unwrap();

        assert_eq!(result.push.pushed, 1);
        assert_eq!(engine.stats().edits_pushed, 1);
        let stored = engine.store().profile_by_id(id).unwrap().unwrap();
        assert_eq!(stored.meta.sync_status, SyncStatus::Synced);
    }

    #[test]
    fn sync_engine_cancel_flag() {
        let engine = engine(quiet_transport(), MemoryStore::new());

        assert!(!engine.cancelled.load(Ordering::SeqCst));
        engine.cancel();
        assert!(engine.cancelled.load(Ordering::SeqCst));
        engine.reset_cancel();
        assert!(!engine.cancelled.load(Ordering::SeqCst));

        // sync() resets the flag at the start; cancellation is meant for
        // interrupting an ongoing cycle from another thread.
    }

    #[test]
    fn cancelled_cycle_parks_the_engine_at_idle() {
        let hook: FetchHook = Arc::new(std::sync::Mutex::new(None));
        let transport = HookedTransport {
            inner: quiet_transport(),
            on_settings_fetch: Arc::clone(&hook),
        };
        let engine = Arc::new(SyncEngine::new(
            SyncConfig::new("https://api.gather.example").with_retry(RetryConfig::no_retry()),
            Uuid::new_v4(),
            transport,
            MemoryStore::new(),
            MemoryCursorStore::new(),
        ));

        // The cancel request lands while the pull phase is still running.
        let handle = Arc::clone(&engine);
        *hook.lock().unwrap() = Some(Box::new(move || handle.cancel()));

        let result = engine.sync_at(at(100));
        assert!(matches!(result, Err(SyncError::Cancelled)));
        assert_eq!(engine.state(), SyncState::Idle);

        // The engine is not wedged; the next cycle runs to completion.
        *hook.lock().unwrap() = None;
        let second = engine.sync_at(at(200)).unwrap();
        assert!(second.success);
        assert_eq!(engine.state(), SyncState::Synced);
    }

    #[test]
    fn retry_exhaustion_surfaces_last_error() {
        let transport = MockTransport::new();
        transport.set_connected(false); // every fetch is retryable

        let config = SyncConfig::new("https://api.gather.example").with_retry(
            RetryConfig::new(2).with_initial_delay(Duration::from_millis(1)),
        );
        let engine = SyncEngine::new(
            config,
            Uuid::new_v4(),
            transport,
            MemoryStore::new(),
            MemoryCursorStore::new(),
        );

        let result = engine.sync_with_retry();
        assert!(result.is_err());
        assert!(result.unwrap_err().is_retryable());
        assert_eq!(engine.stats().retries, 1);
        assert_eq!(engine.state(), SyncState::Error);
    }
}
