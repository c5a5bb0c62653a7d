//! Idempotent push of pending local edits.
//!
//! The queue walks every record with unconfirmed local state, builds a
//! minimal update payload and pushes it with a stable idempotency key.
//! A key is minted exactly once per logical mutation and persisted on
//! the record before the request goes out, so a retry always presents
//! the original key, even when the retry happens in a later process
//! after a crash. A request that died after reaching the server then
//! does not double-apply when replayed.

use crate::error::{SyncError, SyncResult};
use crate::mapper::{EntityMapper, MediaMapper, ProfileMapper, SettingsMapper};
use crate::store::{Batch, LocalStore};
use crate::transport::SyncTransport;
use chrono::{DateTime, Utc};
use gather_sync_protocol::{IdempotencyKey, ProfileUpdate, SettingsUpdate, SyncMetadata};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Counts and failures from one push cycle.
#[derive(Debug, Clone, Default)]
pub struct PushReport {
    /// Edits confirmed by the server.
    pub pushed: usize,
    /// Edits that hit a transient failure; retried next cycle.
    pub failed: usize,
    /// Definitive rejections, with the server's reason. Retrying the
    /// same payload would be rejected again; the record stays failed
    /// until the user edits it into an acceptable shape.
    pub rejected: Vec<(Uuid, String)>,
}

impl PushReport {
    /// Returns true if every pending edit was confirmed.
    pub fn is_clean(&self) -> bool {
        self.failed == 0 && self.rejected.is_empty()
    }
}

/// Pushes pending local edits with exactly-once effect.
///
/// The queue itself holds no state between cycles; every key lives on
/// the record it belongs to, inside the local store.
#[derive(Debug, Default)]
pub struct PushQueue;

impl PushQueue {
    /// Creates a queue.
    pub fn new() -> Self {
        Self
    }

    /// Pushes every record with unconfirmed local state.
    ///
    /// Transient failures mark the record failed and keep its stored key
    /// for the next cycle; rejections mark it failed, drop the key and
    /// surface the server's reason in the report. Confirmations are
    /// committed in one batch at the end of the cycle.
    pub fn push_pending(
        &self,
        transport: &dyn SyncTransport,
        store: &dyn LocalStore,
        now: DateTime<Utc>,
    ) -> SyncResult<PushReport> {
        let mut report = PushReport::default();
        let mut batch = Batch::default();

        if let Some(mut record) = store.pending_profile()? {
            let (key, minted) = ensure_key(&mut record.meta);
            if minted {
                let mut staged = Batch::default();
                staged.profiles.push(record.clone());
                store.commit(staged)?;
            }
            let snapshot = ProfileMapper::to_snapshot(&record);
            let update = ProfileUpdate::from_snapshot(&snapshot, key);

            match transport.push_profile(record.meta.id, &update) {
                Ok(response) => {
                    // Re-read in case an edit landed while the request
                    // was in flight; a newer clock stays pending.
                    if let Some(mut current) = store.profile_by_id(record.meta.id)? {
                        if current.meta.updated_at <= update.updated_at {
                            ProfileMapper::apply_snapshot(&response, &mut current);
                            current.meta.mark_synced(now);
                            batch.profiles.push(current);
                        }
                    }
                    report.pushed += 1;
                    debug!(id = %record.meta.id, "profile push confirmed");
                }
                Err(err) => note_failure(record.meta.id, err, store, &mut batch, &mut report)?,
            }
        }

        if let Some(mut record) = store.pending_settings()? {
            let (key, minted) = ensure_key(&mut record.meta);
            if minted {
                let mut staged = Batch::default();
                staged.settings.push(record.clone());
                store.commit(staged)?;
            }
            let snapshot = SettingsMapper::to_snapshot(&record);
            let update = SettingsUpdate::from_snapshot(&snapshot, key);

            match transport.push_settings(record.meta.id, &update) {
                Ok(response) => {
                    if let Some(mut current) = store.settings_by_id(record.meta.id)? {
                        if current.meta.updated_at <= update.updated_at {
                            SettingsMapper::apply_snapshot(&response, &mut current);
                            current.meta.mark_synced(now);
                            batch.settings.push(current);
                        }
                    }
                    report.pushed += 1;
                    debug!(id = %record.meta.id, "settings push confirmed");
                }
                Err(err) => note_failure(record.meta.id, err, store, &mut batch, &mut report)?,
            }
        }

        for mut record in store.pending_media()? {
            let (key, minted) = ensure_key(&mut record.meta);
            if minted {
                let mut staged = Batch::default();
                staged.media.push(record.clone());
                store.commit(staged)?;
            }
            let snapshot = MediaMapper::to_snapshot(&record);

            match transport.push_media(&snapshot, &key) {
                Ok(response) => {
                    if let Some(mut current) = store.media_by_id(record.meta.id)? {
                        if current.meta.updated_at <= snapshot.meta.updated_at {
                            MediaMapper::apply_snapshot(&response, &mut current);
                            current.meta.mark_synced(now);
                            batch.media.push(current);
                        }
                    }
                    report.pushed += 1;
                    debug!(id = %record.meta.id, "media push confirmed");
                }
                Err(err) => note_failure(record.meta.id, err, store, &mut batch, &mut report)?,
            }
        }

        if !batch.is_empty() {
            store.commit(batch)?;
        }

        info!(
            pushed = report.pushed,
            failed = report.failed,
            rejected = report.rejected.len(),
            "push cycle complete"
        );
        Ok(report)
    }
}

/// Returns the idempotency key for the staged mutation, minting one if
/// the record carries none. The second value is true when the key is
/// fresh and must be committed before the request leaves, so a crash
/// between send and response still retries with the same key.
fn ensure_key(meta: &mut SyncMetadata) -> (IdempotencyKey, bool) {
    match &meta.push_key {
        Some(key) => (key.clone(), false),
        None => {
            let key = IdempotencyKey::mint();
            meta.push_key = Some(key.clone());
            (key, true)
        }
    }
}

/// Records a push failure for one item and keeps the cycle going.
///
/// Only the failed status (and, for rejections, the spent key) is
/// staged; the pending content itself is never touched.
fn note_failure(
    record_id: Uuid,
    err: SyncError,
    store: &dyn LocalStore,
    batch: &mut Batch,
    report: &mut PushReport,
) -> SyncResult<()> {
    let drop_key = match err {
        SyncError::Rejected(reason) => {
            warn!(id = %record_id, reason = %reason, "push rejected");
            report.rejected.push((record_id, reason));
            true
        }
        err if err.is_retryable() => {
            debug!(id = %record_id, error = %err, "push failed, will retry");
            report.failed += 1;
            false
        }
        err => return Err(err),
    };
    stage_failed(record_id, drop_key, store, batch)
}

/// Stages the failed status for whichever table holds the record.
fn stage_failed(
    record_id: Uuid,
    drop_key: bool,
    store: &dyn LocalStore,
    batch: &mut Batch,
) -> SyncResult<()> {
    if let Some(mut record) = store.profile_by_id(record_id)? {
        record.meta.mark_failed();
        if drop_key {
            record.meta.push_key = None;
        }
        batch.profiles.push(record);
    } else if let Some(mut record) = store.settings_by_id(record_id)? {
        record.meta.mark_failed();
        if drop_key {
            record.meta.push_key = None;
        }
        batch.settings.push(record);
    } else if let Some(mut record) = store.media_by_id(record_id)? {
        record.meta.mark_failed();
        if drop_key {
            record.meta.push_key = None;
        }
        batch.media.push(record);
    }
    Ok(())
}
