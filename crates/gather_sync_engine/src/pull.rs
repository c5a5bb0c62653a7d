//! Delta pull coordination.
//!
//! One coordinator per sync cycle. Each refresh is a conditional fetch
//! gated on the collection's cache token, followed by reconciliation
//! into a batch and a single commit. Cursor state (token and refresh
//! timestamp) is advanced only after the commit succeeds, so a crash
//! between fetch and commit replays the same delta on the next cycle.

use crate::error::SyncResult;
use crate::resolver::{
    reconcile_profile, reconcile_settings, reconcile_system_tags, ReconcileOutcome,
};
use crate::store::{Batch, Collection, CursorStore, LocalStore};
use crate::transport::{Fetched, SyncTransport};
use chrono::{DateTime, Utc};
use gather_sync_protocol::SyncPolicy;
use tracing::{debug, info};
use uuid::Uuid;

/// Counts from one or more pull refreshes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PullReport {
    /// Remote snapshots applied over existing records.
    pub applied: usize,
    /// Records created from snapshots with no local match.
    pub created: usize,
    /// Tags retired by the collection diff.
    pub retired: usize,
    /// Snapshots skipped because a pending local edit outran them.
    pub skipped: usize,
    /// Snapshots where the policy kept local content.
    pub kept: usize,
    /// Collections that reported no change since the last token.
    pub not_modified: usize,
}

impl PullReport {
    /// Returns true if any local record changed.
    pub fn changed_anything(&self) -> bool {
        self.applied + self.created + self.retired > 0
    }

    fn absorb(&mut self, other: PullReport) {
        self.applied += other.applied;
        self.created += other.created;
        self.retired += other.retired;
        self.skipped += other.skipped;
        self.kept += other.kept;
        self.not_modified += other.not_modified;
    }

    fn record(&mut self, outcome: ReconcileOutcome) {
        match outcome {
            ReconcileOutcome::AppliedRemote => self.applied += 1,
            ReconcileOutcome::Created => self.created += 1,
            ReconcileOutcome::Skipped => self.skipped += 1,
            ReconcileOutcome::KeptLocal => self.kept += 1,
        }
    }
}

/// Coordinates conditional pulls for all synchronized collections.
///
/// Owns no cursor state of its own; everything lives in the injected
/// [`CursorStore`] so coordinators stay cheap to construct per cycle.
pub struct PullCoordinator<'a> {
    transport: &'a dyn SyncTransport,
    store: &'a dyn LocalStore,
    cursors: &'a dyn CursorStore,
    policy: SyncPolicy,
}

impl<'a> PullCoordinator<'a> {
    /// Creates a coordinator over the given transport and stores.
    pub fn new(
        transport: &'a dyn SyncTransport,
        store: &'a dyn LocalStore,
        cursors: &'a dyn CursorStore,
        policy: SyncPolicy,
    ) -> Self {
        Self {
            transport,
            store,
            cursors,
            policy,
        }
    }

    /// Refreshes the device user's public profile.
    pub fn refresh_profile(&self, owner: Uuid, now: DateTime<Utc>) -> SyncResult<PullReport> {
        let mut report = PullReport::default();
        let token = self.cursors.token(Collection::Profile);

        match self.transport.fetch_profile(owner, token.as_ref())? {
            Fetched::NotModified => {
                debug!(collection = "profile", "not modified");
                report.not_modified += 1;
            }
            Fetched::Changed { body, token } => {
                let mut batch = Batch::default();
                let outcome = reconcile_profile(
                    self.store,
                    &body,
                    owner,
                    self.policy.profile,
                    now,
                    &mut batch,
                )?;
                if !batch.is_empty() {
                    self.store.commit(batch)?;
                }
                if let Some(token) = token {
                    self.cursors.set_token(Collection::Profile, token);
                }
                report.record(outcome);
            }
        }

        self.cursors.set_last_refreshed(Collection::Profile, now);
        Ok(report)
    }

    /// Refreshes the device user's settings.
    pub fn refresh_settings(&self, owner: Uuid, now: DateTime<Utc>) -> SyncResult<PullReport> {
        let mut report = PullReport::default();
        let token = self.cursors.token(Collection::Settings);

        match self.transport.fetch_settings(owner, token.as_ref())? {
            Fetched::NotModified => {
                debug!(collection = "settings", "not modified");
                report.not_modified += 1;
            }
            Fetched::Changed { body, token } => {
                let mut batch = Batch::default();
                let outcome = reconcile_settings(
                    self.store,
                    &body,
                    owner,
                    self.policy.settings,
                    now,
                    &mut batch,
                )?;
                if !batch.is_empty() {
                    self.store.commit(batch)?;
                }
                if let Some(token) = token {
                    self.cursors.set_token(Collection::Settings, token);
                }
                report.record(outcome);
            }
        }

        self.cursors.set_last_refreshed(Collection::Settings, now);
        Ok(report)
    }

    /// Refreshes the system tag catalogue.
    pub fn refresh_system_tags(&self, now: DateTime<Utc>) -> SyncResult<PullReport> {
        let mut report = PullReport::default();
        let token = self.cursors.token(Collection::SystemTags);

        match self.transport.fetch_system_tags(token.as_ref())? {
            Fetched::NotModified => {
                debug!(collection = "system_tags", "not modified");
                report.not_modified += 1;
            }
            Fetched::Changed { body, token } => {
                let mut batch = Batch::default();
                let summary = reconcile_system_tags(self.store, &body, now, &mut batch)?;
                if !batch.is_empty() {
                    self.store.commit(batch)?;
                }
                if let Some(token) = token {
                    self.cursors.set_token(Collection::SystemTags, token);
                }
                report.applied += summary.applied;
                report.created += summary.created;
                report.retired += summary.retired;
            }
        }

        self.cursors.set_last_refreshed(Collection::SystemTags, now);
        Ok(report)
    }

    /// Refreshes every collection in dependency order: the catalogue
    /// first, then the user-owned resources.
    pub fn refresh_all(&self, owner: Uuid, now: DateTime<Utc>) -> SyncResult<PullReport> {
        let mut report = self.refresh_system_tags(now)?;
        report.absorb(self.refresh_profile(owner, now)?);
        report.absorb(self.refresh_settings(owner, now)?);

        info!(
            applied = report.applied,
            created = report.created,
            retired = report.retired,
            skipped = report.skipped,
            not_modified = report.not_modified,
            "pull cycle complete"
        );
        Ok(report)
    }
}
