//! # Gather Sync Protocol
//!
//! Shared vocabulary for the Gather replica sync layer.
//!
//! This crate provides:
//! - [`SyncMetadata`] and [`SyncStatus`] for per-record lifecycle tracking
//! - Transport snapshots (DTOs) for each synchronizable entity
//! - Minimal update payloads for idempotent pushes
//! - [`ConflictPolicy`] and the pure resolution decision
//!
//! This is a pure type crate with no I/O operations. Everything here is
//! serde-serializable and safe to hand across threads or put on the wire.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod conflict;
mod dto;
mod meta;
mod update;

pub use conflict::{ConflictPolicy, Resolution, SyncPolicy};
pub use dto::{MediaDto, OwnerRef, ProfileDto, SettingsDto, SnapshotMeta, TagDto};
pub use meta::{IdempotencyKey, SyncMetadata, SyncStatus, SCHEMA_VERSION};
pub use update::{ProfileUpdate, SettingsUpdate};
