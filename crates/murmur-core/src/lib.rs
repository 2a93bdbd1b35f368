//! Murmur Core - domain types for replicated alert state
//!
//! This crate holds everything the replication layer needs to talk about
//! without knowing how state travels between peers:
//!
//! - [`Silence`] records, their matchers and their tombstone lifecycle
//! - [`NotifyInfo`] bookkeeping for notification deduplication
//! - the [`Marker`] collaborator recording why an alert is silenced
//! - [`PhysicalClock`] so time can be pinned in tests
//! - [`MeshConfig`] and the unified [`MurmurError`]

#![forbid(unsafe_code)]

/// Mesh configuration
pub mod config;

/// Unified error handling
pub mod errors;

/// Label sets, fingerprints and matchers
pub mod labels;

/// Silencing marks
pub mod marker;

/// Notification bookkeeping
pub mod notify;

/// Silence records
pub mod silence;

/// Wall-clock access
pub mod time;

pub use config::MeshConfig;
pub use errors::{ErrorCode, MurmurError, Result};
pub use labels::{Fingerprint, LabelSet, Matcher, Matchers};
pub use marker::{Marker, MemMarker};
pub use notify::{NotificationEntry, NotificationKey, NotifyInfo};
pub use silence::{Lifecycle, Silence, SilenceId, SilenceStatus};
pub use time::{ManualClock, PhysicalClock, SystemClock};
