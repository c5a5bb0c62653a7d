//! Conflict resolution and per-record reconciliation.
//!
//! Each `reconcile_*` function takes one remote snapshot, finds the
//! matching local record (identity first, relationship key second),
//! consults the collection's [`ConflictPolicy`] and stages the outcome
//! into a [`Batch`]. Nothing is written to the store here; the caller
//! commits the batch as a unit.
//!
//! Immediately before applying, every function re-checks the local
//! record's status and clock so a delayed pull response cannot overwrite
//! a newer, still-unconfirmed local edit.

use crate::mapper::{
    EntityMapper, MediaMapper, ProfileMapper, SettingsMapper, TagMapper,
};
use crate::record::{MediaRecord, ProfileRecord, SettingsRecord, TagRecord};
use crate::store::{Batch, LocalStore};
use crate::error::SyncResult;
use chrono::{DateTime, Utc};
use gather_sync_protocol::{
    ConflictPolicy, MediaDto, ProfileDto, Resolution, SettingsDto, SyncMetadata, SyncStatus, TagDto,
};
use std::collections::HashMap;
use tracing::debug;
use uuid::Uuid;

/// What reconciling one snapshot did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// The remote snapshot was applied over the local record.
    AppliedRemote,
    /// The policy kept the local record; nothing was staged.
    KeptLocal,
    /// No local match existed; a record was created from the snapshot.
    Created,
    /// A pending local edit outran the snapshot; apply was skipped.
    Skipped,
}

/// Guard against stale pulls: a record with unconfirmed local state whose
/// clock is ahead of the snapshot must not be overwritten by it.
fn outruns_snapshot(local: &SyncMetadata, remote_updated_at: DateTime<Utc>) -> bool {
    local.needs_sync() && local.updated_at > remote_updated_at
}

/// A record parked in `Conflict` is reserved for manual resolution and
/// never settles automatically.
fn awaits_manual_resolution(local: &SyncMetadata) -> bool {
    !local.sync_status.can_transition_to(SyncStatus::Synced)
}

/// Reconciles a remote profile snapshot against the local store.
///
/// Lookup order: the snapshot's identity, then the profile owned by
/// `owner`. Identity wins when both would match different records. A
/// relationship match keeps its local surrogate id and is updated in
/// place; adopting the remote id would strand the existing row under
/// its old key.
pub fn reconcile_profile(
    store: &dyn LocalStore,
    dto: &ProfileDto,
    owner: Uuid,
    policy: ConflictPolicy,
    now: DateTime<Utc>,
    batch: &mut Batch,
) -> SyncResult<ReconcileOutcome> {
    let mut matched_by_owner = false;
    let local = match store.profile_by_id(dto.meta.id)? {
        Some(record) => Some(record),
        None => {
            let fallback = store.profile_by_owner(owner)?;
            matched_by_owner = fallback.is_some();
            fallback
        }
    };

    let Some(mut record) = local else {
        let mut record = ProfileRecord::new(dto.display_name.clone(), owner, now);
        adopt_remote_meta(&mut record.meta, &dto.meta.created_at, dto.meta.deleted_at);
        ProfileMapper::apply_snapshot(dto, &mut record);
        record.meta.mark_synced(now);
        batch.profiles.push(record);
        return Ok(ReconcileOutcome::Created);
    };

    if outruns_snapshot(&record.meta, dto.meta.updated_at) {
        debug!(id = %record.meta.id, "skipping stale profile snapshot; local edit is newer");
        return Ok(ReconcileOutcome::Skipped);
    }
    if awaits_manual_resolution(&record.meta) {
        debug!(id = %record.meta.id, "skipping profile snapshot; record awaits manual resolution");
        return Ok(ReconcileOutcome::Skipped);
    }

    match policy.decide(record.meta.updated_at, dto.meta.updated_at) {
        Resolution::KeepLocal => {
            // A pending edit stays pending; a settled record just gets
            // its cloud stamp refreshed.
            if !record.meta.needs_sync() {
                record.meta.mark_synced(now);
                batch.profiles.push(record);
            }
            Ok(ReconcileOutcome::KeptLocal)
        }
        Resolution::ApplyRemote => {
            let local_id = record.meta.id;
            ProfileMapper::apply_snapshot(dto, &mut record);
            if matched_by_owner {
                record.meta.id = local_id;
            }
            record.meta.deleted_at = dto.meta.deleted_at;
            record.meta.mark_synced(now);
            batch.profiles.push(record);
            Ok(ReconcileOutcome::AppliedRemote)
        }
    }
}

/// Reconciles a remote settings snapshot against the local store.
///
/// Same lookup and in-place update rules as profiles.
pub fn reconcile_settings(
    store: &dyn LocalStore,
    dto: &SettingsDto,
    owner: Uuid,
    policy: ConflictPolicy,
    now: DateTime<Utc>,
    batch: &mut Batch,
) -> SyncResult<ReconcileOutcome> {
    let mut matched_by_owner = false;
    let local = match store.settings_by_id(dto.meta.id)? {
        Some(record) => Some(record),
        None => {
            let fallback = store.settings_by_owner(owner)?;
            matched_by_owner = fallback.is_some();
            fallback
        }
    };

    let Some(mut record) = local else {
        let mut record = SettingsRecord::new(owner, now);
        adopt_remote_meta(&mut record.meta, &dto.meta.created_at, dto.meta.deleted_at);
        SettingsMapper::apply_snapshot(dto, &mut record);
        record.meta.mark_synced(now);
        batch.settings.push(record);
        return Ok(ReconcileOutcome::Created);
    };

    if outruns_snapshot(&record.meta, dto.meta.updated_at) {
        debug!(id = %record.meta.id, "skipping stale settings snapshot; local edit is newer");
        return Ok(ReconcileOutcome::Skipped);
    }
    if awaits_manual_resolution(&record.meta) {
        debug!(id = %record.meta.id, "skipping settings snapshot; record awaits manual resolution");
        return Ok(ReconcileOutcome::Skipped);
    }

    match policy.decide(record.meta.updated_at, dto.meta.updated_at) {
        Resolution::KeepLocal => {
            if !record.meta.needs_sync() {
                record.meta.mark_synced(now);
                batch.settings.push(record);
            }
            Ok(ReconcileOutcome::KeptLocal)
        }
        Resolution::ApplyRemote => {
            let local_id = record.meta.id;
            SettingsMapper::apply_snapshot(dto, &mut record);
            if matched_by_owner {
                record.meta.id = local_id;
            }
            record.meta.deleted_at = dto.meta.deleted_at;
            record.meta.mark_synced(now);
            batch.settings.push(record);
            Ok(ReconcileOutcome::AppliedRemote)
        }
    }
}

/// Reconciles a remote media snapshot against the local store.
///
/// Media has no relationship fallback; identity is the only match key.
pub fn reconcile_media(
    store: &dyn LocalStore,
    dto: &MediaDto,
    policy: ConflictPolicy,
    now: DateTime<Utc>,
    batch: &mut Batch,
) -> SyncResult<ReconcileOutcome> {
    let Some(mut record) = store.media_by_id(dto.meta.id)? else {
        let mut record = MediaRecord::new(dto.url.clone(), dto.owner, now);
        adopt_remote_meta(&mut record.meta, &dto.meta.created_at, dto.meta.deleted_at);
        MediaMapper::apply_snapshot(dto, &mut record);
        record.meta.mark_synced(now);
        batch.media.push(record);
        return Ok(ReconcileOutcome::Created);
    };

    if outruns_snapshot(&record.meta, dto.meta.updated_at) {
        debug!(id = %record.meta.id, "skipping stale media snapshot; local edit is newer");
        return Ok(ReconcileOutcome::Skipped);
    }
    if awaits_manual_resolution(&record.meta) {
        debug!(id = %record.meta.id, "skipping media snapshot; record awaits manual resolution");
        return Ok(ReconcileOutcome::Skipped);
    }

    match policy.decide(record.meta.updated_at, dto.meta.updated_at) {
        Resolution::KeepLocal => {
            if !record.meta.needs_sync() {
                record.meta.mark_synced(now);
                batch.media.push(record);
            }
            Ok(ReconcileOutcome::KeptLocal)
        }
        Resolution::ApplyRemote => {
            MediaMapper::apply_snapshot(dto, &mut record);
            record.meta.deleted_at = dto.meta.deleted_at;
            record.meta.mark_synced(now);
            batch.media.push(record);
            Ok(ReconcileOutcome::AppliedRemote)
        }
    }
}

/// Counts from a full-catalogue tag reconciliation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TagReconcileSummary {
    /// Existing tags overwritten from remote snapshots.
    pub applied: usize,
    /// Tags created from snapshots with no local match.
    pub created: usize,
    /// Active local tags absent from the remote catalogue, now hidden.
    pub retired: usize,
}

/// Reconciles the full system tag catalogue against the local store.
///
/// The remote payload is the complete catalogue, matched to local rows by
/// `slug`. Matched rows are overwritten (the catalogue is
/// server-authoritative), unmatched snapshots become new rows, and local
/// system tags missing from the payload are retired in place so existing
/// relationships keep resolving.
pub fn reconcile_system_tags(
    store: &dyn LocalStore,
    dtos: &[TagDto],
    now: DateTime<Utc>,
    batch: &mut Batch,
) -> SyncResult<TagReconcileSummary> {
    let mut summary = TagReconcileSummary::default();
    let mut local: HashMap<String, TagRecord> = store
        .system_tags()?
        .into_iter()
        .map(|tag| (tag.slug.clone(), tag))
        .collect();

    for dto in dtos {
        match local.remove(&dto.slug) {
            Some(mut record) => {
                // The slug is the identity here; the surrogate id stays local.
                let local_id = record.meta.id;
                TagMapper::apply_snapshot(dto, &mut record);
                record.meta.id = local_id;
                record.meta.mark_synced(now);
                batch.tags.push(record);
                summary.applied += 1;
            }
            None => {
                let mut record = TagRecord::new(dto.slug.clone(), dto.label.clone(), now);
                adopt_remote_meta(&mut record.meta, &dto.meta.created_at, dto.meta.deleted_at);
                TagMapper::apply_snapshot(dto, &mut record);
                record.meta.id = dto.meta.id;
                record.meta.mark_synced(now);
                batch.tags.push(record);
                summary.created += 1;
            }
        }
    }

    // Whatever the payload did not mention no longer exists remotely.
    for (_, mut record) in local {
        if record.is_active {
            record.retire(now);
            batch.tags.push(record);
            summary.retired += 1;
        }
    }

    debug!(
        applied = summary.applied,
        created = summary.created,
        retired = summary.retired,
        "system tag catalogue reconciled"
    );
    Ok(summary)
}

/// Stamps remote-born bookkeeping onto a freshly created record.
///
/// Creation time and tombstone come from the snapshot; everything else is
/// set by the mapper and the `mark_synced` that follows.
fn adopt_remote_meta(
    meta: &mut SyncMetadata,
    remote_created_at: &DateTime<Utc>,
    remote_deleted_at: Option<DateTime<Utc>>,
) {
    meta.created_at = *remote_created_at;
    meta.deleted_at = remote_deleted_at;
}
