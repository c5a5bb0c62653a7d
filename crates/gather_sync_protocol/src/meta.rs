//! Per-record sync metadata and lifecycle status.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Current schema tag stamped on every snapshot for forward-compatible
/// payload evolution.
pub const SCHEMA_VERSION: u32 = 1;

/// Lifecycle state of a synchronizable record.
///
/// A record cycles between `Pending`, `Synced` and `Failed` for its entire
/// lifetime; there is no terminal state. `Conflict` is reserved for future
/// manual-merge policies and is never produced by the built-in policies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    /// Local mutation not yet confirmed by the remote store.
    Pending,
    /// Confirmed round-trip with the remote store.
    Synced,
    /// Last push or reconciliation attempt failed; subject to retry.
    Failed,
    /// A policy refused to resolve automatically (reserved).
    Conflict,
}

impl SyncStatus {
    /// Returns the stable storage code for this status.
    pub fn to_code(self) -> i16 {
        match self {
            SyncStatus::Pending => 0,
            SyncStatus::Synced => 1,
            SyncStatus::Failed => 2,
            SyncStatus::Conflict => 3,
        }
    }

    /// Converts from a storage code.
    pub fn from_code(code: i16) -> Option<Self> {
        match code {
            0 => Some(SyncStatus::Pending),
            1 => Some(SyncStatus::Synced),
            2 => Some(SyncStatus::Failed),
            3 => Some(SyncStatus::Conflict),
            _ => None,
        }
    }

    /// Returns true if the record still has unconfirmed local state.
    pub fn needs_sync(self) -> bool {
        matches!(self, SyncStatus::Pending | SyncStatus::Failed)
    }

    /// Returns true if the given transition is part of the record lifecycle.
    ///
    /// Allowed moves: `Pending -> Synced`, `Pending -> Failed`,
    /// `Failed -> Pending` (retry), `Failed -> Synced` (retry confirmed),
    /// `Synced -> Pending` (new local edit) and `* -> Conflict`
    /// (reserved). `Conflict` never transitions out automatically.
    pub fn can_transition_to(self, next: SyncStatus) -> bool {
        matches!(
            (self, next),
            (SyncStatus::Pending, SyncStatus::Synced)
                | (SyncStatus::Pending, SyncStatus::Failed)
                | (SyncStatus::Failed, SyncStatus::Pending)
                | (SyncStatus::Failed, SyncStatus::Synced)
                | (SyncStatus::Synced, SyncStatus::Pending)
                | (_, SyncStatus::Conflict)
        ) || self == next
    }
}

/// Sync bookkeeping embedded in every synchronizable record.
///
/// `created_at` is set once at creation and never reassigned. `updated_at`
/// is a monotonically non-decreasing wall-clock timestamp bumped on every
/// local mutation. `last_cloud_synced_at` may lag behind `updated_at`;
/// that gap is exactly what [`SyncMetadata::needs_sync`] detects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncMetadata {
    /// Stable globally-unique identifier, assigned at local creation.
    pub id: Uuid,
    /// Immutable creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Logical clock, bumped on every local mutation.
    pub updated_at: DateTime<Utc>,
    /// Soft-delete tombstone; presence means the record is retired from
    /// normal reads but still participates in sync.
    pub deleted_at: Option<DateTime<Utc>>,
    /// Current lifecycle state.
    pub sync_status: SyncStatus,
    /// Set only on successful reconciliation with the remote store.
    pub last_cloud_synced_at: Option<DateTime<Utc>>,
    /// Idempotency key of the staged mutation, if one has been minted.
    /// Persisted with the record so a retry after a process restart
    /// presents the same key as the original attempt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub push_key: Option<IdempotencyKey>,
    /// Schema tag for forward-compatible payload evolution.
    pub schema_version: u32,
}

impl SyncMetadata {
    /// Creates fresh metadata for a newly created local record.
    ///
    /// New records always start `Pending`.
    pub fn new(now: DateTime<Utc>) -> Self {
        Self::with_id(Uuid::new_v4(), now)
    }

    /// Creates fresh metadata under a known identity (e.g. a record first
    /// seen in a remote snapshot).
    pub fn with_id(id: Uuid, now: DateTime<Utc>) -> Self {
        Self {
            id,
            created_at: now,
            updated_at: now,
            deleted_at: None,
            sync_status: SyncStatus::Pending,
            last_cloud_synced_at: None,
            push_key: None,
            schema_version: SCHEMA_VERSION,
        }
    }

    /// Records a local write to a synchronizable field.
    ///
    /// Any local edit resets the record to `Pending` and bumps
    /// `updated_at`. The bump never moves the clock backwards. The edit
    /// is a new logical mutation, so any staged push key is discarded.
    pub fn mark_local_edit(&mut self, now: DateTime<Utc>) {
        self.updated_at = self.updated_at.max(now);
        self.sync_status = SyncStatus::Pending;
        self.push_key = None;
    }

    /// Records a confirmed round-trip with the remote store.
    ///
    /// The staged mutation is spent; its key is cleared with it.
    pub fn mark_synced(&mut self, now: DateTime<Utc>) {
        self.sync_status = SyncStatus::Synced;
        self.last_cloud_synced_at = Some(now);
        self.push_key = None;
    }

    /// Records a retryable push or reconciliation failure.
    ///
    /// The pending mutation itself is kept; only the status changes.
    pub fn mark_failed(&mut self) {
        self.sync_status = SyncStatus::Failed;
    }

    /// Soft-deletes the record.
    ///
    /// The tombstone behaves like any other local edit: it must itself
    /// sync before the remote store acknowledges the deletion.
    pub fn mark_deleted(&mut self, now: DateTime<Utc>) {
        if self.deleted_at.is_none() {
            self.deleted_at = Some(now);
        }
        self.mark_local_edit(now);
    }

    /// Returns true if the record carries a tombstone.
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Returns true if the record has unconfirmed local state.
    pub fn needs_sync(&self) -> bool {
        self.sync_status.needs_sync()
    }
}

/// Client-generated token that makes a retried push recognizable to the
/// server as the same operation.
///
/// Minted exactly once when a mutation is first staged and reused verbatim
/// on every retry, converting at-least-once delivery into exactly-once
/// effect.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IdempotencyKey(String);

impl IdempotencyKey {
    /// Mints a new key. Call once per logical mutation, never on retry.
    pub fn mint() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Returns the wire form of the key.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
