//! # Gather Sync Engine
//!
//! Offline-first sync engine for Gather's user-facing data: public
//! profile, per-user settings, the system tag catalogue and media.
//!
//! This crate provides:
//! - Sync state machine (idle → pulling → pushing → synced)
//! - Conditional delta pulls gated on per-collection cache tokens
//! - Policy-driven conflict resolution
//! - Idempotent push of pending local edits
//! - Retry with exponential backoff
//! - HTTP transport abstraction
//!
//! ## Architecture
//!
//! The engine implements a **pull-then-push** synchronization model:
//! 1. Pull remote snapshots first (conditional on the cache token)
//! 2. Reconcile them into the local store in one committed batch
//! 3. Push pending local edits with stable idempotency keys
//!
//! The local replica stays fully usable offline; every local edit is a
//! durable write that syncs whenever connectivity returns.
//!
//! ## Key Invariants
//!
//! - Pull always happens before push
//! - A pending local edit is never overwritten by a stale pull
//! - Cursor state advances only after the local commit succeeds
//! - A retried push presents the same idempotency key as the original
//! - Records removed from a remote collection are retired, not deleted

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod error;
mod http;
mod mapper;
mod pull;
mod push;
mod record;
mod resolver;
mod state;
mod store;
mod transport;

pub use config::{RetryConfig, SyncConfig};
pub use error::{SyncError, SyncResult};
pub use http::{HttpClient, HttpResponse, HttpTransport, IDEMPOTENCY_HEADER};
pub use mapper::{EntityMapper, MediaMapper, ProfileMapper, SettingsMapper, TagMapper};
pub use pull::{PullCoordinator, PullReport};
pub use push::{PushQueue, PushReport};
pub use record::{MediaRecord, ProfileRecord, SettingsRecord, TagRecord};
pub use resolver::{
    reconcile_media, reconcile_profile, reconcile_settings, reconcile_system_tags,
    ReconcileOutcome, TagReconcileSummary,
};
pub use state::{SyncCycleResult, SyncEngine, SyncState, SyncStats};
pub use store::{Batch, Collection, CursorStore, LocalStore, MemoryCursorStore, MemoryStore};
pub use transport::{CacheToken, Fetched, MockTransport, SyncTransport};
