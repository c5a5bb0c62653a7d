//! Conflict policy and the pure resolution decision.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Policy for reconciling an incoming remote snapshot against a local
/// record.
///
/// Selected per entity-type-and-operation by the caller; never stored on
/// the record itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictPolicy {
    /// Remote content always replaces local content.
    ServerWins,
    /// Remote content is never accepted; only the cloud-sync stamp is
    /// refreshed. Note this is not "prefer whichever side is newer" - no
    /// timestamp comparison happens for this branch.
    ClientWins,
    /// Remote content is applied only when its `updated_at` is at least
    /// as new as the local one.
    LastWriteWins,
}

impl ConflictPolicy {
    /// Returns the stable storage code for this policy.
    pub fn to_code(self) -> u8 {
        match self {
            ConflictPolicy::ServerWins => 1,
            ConflictPolicy::ClientWins => 2,
            ConflictPolicy::LastWriteWins => 3,
        }
    }

    /// Converts from a storage code.
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(ConflictPolicy::ServerWins),
            2 => Some(ConflictPolicy::ClientWins),
            3 => Some(ConflictPolicy::LastWriteWins),
            _ => None,
        }
    }

    /// Decides the outcome for one local/remote pair.
    ///
    /// All three built-in policies always resolve; in every branch the
    /// record ends up `Synced` with a refreshed cloud-sync stamp.
    pub fn decide(
        self,
        local_updated_at: DateTime<Utc>,
        remote_updated_at: DateTime<Utc>,
    ) -> Resolution {
        match self {
            ConflictPolicy::ServerWins => Resolution::ApplyRemote,
            ConflictPolicy::ClientWins => Resolution::KeepLocal,
            ConflictPolicy::LastWriteWins => {
                if remote_updated_at >= local_updated_at {
                    Resolution::ApplyRemote
                } else {
                    Resolution::KeepLocal
                }
            }
        }
    }
}

/// The decided outcome of one reconcile call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Overwrite the local record's content with the remote snapshot,
    /// preserving the local `created_at`.
    ApplyRemote,
    /// Keep local content unchanged; only mark the record synced.
    KeepLocal,
}

/// Default policy per synchronized collection.
///
/// Owned by the caller wiring up the engine, not by the records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncPolicy {
    /// Policy for the public profile resource.
    pub profile: ConflictPolicy,
    /// Policy for the per-user settings resource.
    pub settings: ConflictPolicy,
    /// Policy for the system tag catalogue.
    pub tags: ConflictPolicy,
    /// Policy for media items.
    pub media: ConflictPolicy,
}

impl Default for SyncPolicy {
    fn default() -> Self {
        Self {
            profile: ConflictPolicy::ServerWins,
            settings: ConflictPolicy::LastWriteWins,
            tags: ConflictPolicy::ServerWins,
            media: ConflictPolicy::ServerWins,
        }
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
    fn policy_codes_roundtrip() {
        for policy in [
            ConflictPolicy::ServerWins,
            ConflictPolicy::ClientWins,
            ConflictPolicy::LastWriteWins,
        ] {
            assert_eq!(ConflictPolicy::from_code(policy.to_code()), Some(policy));
        }
        assert_eq!(ConflictPolicy::from_code(0), None);
    }

    #[test]
    fn server_wins_ignores_timestamps() {
        let decision = ConflictPolicy::ServerWins.decide(at(100), at(1));
        assert_eq!(decision, Resolution::ApplyRemote);
    }

    #[test]
    fn client_wins_never_accepts_remote() {
        // Remote strictly newer; the policy still keeps local content.
        let decision = ConflictPolicy::ClientWins.decide(at(1), at(100));
        assert_eq!(decision, Resolution::KeepLocal);
    }

    #[test]
    fn last_write_wins_compares_clocks() {
        assert_eq!(
            ConflictPolicy::LastWriteWins.decide(at(10), at(20)),
            Resolution::ApplyRemote
        );
        assert_eq!(
            ConflictPolicy::LastWriteWins.decide(at(20), at(10)),
            Resolution::KeepLocal
        );
        // Ties go to the remote side.
        assert_eq!(
            ConflictPolicy::LastWriteWins.decide(at(10), at(10)),
            Resolution::ApplyRemote
        );
    }

    #[test]
    fn default_policy_table() {
        let policy = SyncPolicy::default();
        assert_eq!(policy.profile, ConflictPolicy::ServerWins);
        assert_eq!(policy.settings, ConflictPolicy::LastWriteWins);
        assert_eq!(policy.tags, ConflictPolicy::ServerWins);
    }
}
