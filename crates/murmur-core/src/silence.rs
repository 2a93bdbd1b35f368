//! Silence records and their lifecycle
//!
//! A silence is immutable once stored: every change, deletion included, is a
//! new version of the record with a later `updated_at`. Deletion is a
//! tombstone transition carried in [`Lifecycle`], never a removal.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::errors::{MurmurError, Result};
use crate::labels::{matches_all, LabelSet, Matcher, Matchers};

/// Identifier of a silence, shared by all its versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SilenceId(pub Uuid);

impl SilenceId {
    /// Fresh random id
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// The unassigned id
    pub fn nil() -> Self {
        Self(Uuid::nil())
    }

    /// Whether no id has been assigned yet
    pub fn is_nil(&self) -> bool {
        self.0.is_nil()
    }

    /// Get the inner UUID
    pub fn uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for SilenceId {
    fn default() -> Self {
        Self::nil()
    }
}

impl fmt::Display for SilenceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for SilenceId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

/// Whether a silence has been explicitly deleted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Lifecycle {
    /// Normal record, governed by its time window
    #[default]
    Live,
    /// Deleted; never mutes again
    Tombstoned,
}

/// Status of a silence at a given instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SilenceStatus {
    /// Window has not started yet
    Pending,
    /// Window is open and the record is live
    Active,
    /// Window has closed or the record was deleted
    Expired,
}

/// A rule suppressing notifications for matching alerts during a window.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Silence {
    /// Identity shared across versions
    pub id: SilenceId,
    /// All must match for the silence to apply
    pub matchers: Matchers,
    /// Start of the window
    pub starts_at: DateTime<Utc>,
    /// End of the window (inclusive)
    pub ends_at: DateTime<Utc>,
    /// Version timestamp used for last-write-wins
    pub updated_at: DateTime<Utc>,
    /// Author
    pub created_by: String,
    /// Free-form reason
    pub comment: String,
    /// Live or tombstoned
    #[serde(default)]
    pub lifecycle: Lifecycle,
}

impl Silence {
    /// New, not yet stored silence. The id stays nil until the store assigns one.
    pub fn new(
        matchers: Matchers,
        starts_at: DateTime<Utc>,
        ends_at: DateTime<Utc>,
        created_by: impl Into<String>,
        comment: impl Into<String>,
    ) -> Self {
        Self {
            id: SilenceId::nil(),
            matchers,
            starts_at,
            ends_at,
            updated_at: starts_at,
            created_by: created_by.into(),
            comment: comment.into(),
            lifecycle: Lifecycle::Live,
        }
    }

    /// Check that the record is complete and self-consistent.
    pub fn validate(&self) -> Result<()> {
        if self.id.is_nil() {
            return Err(MurmurError::validation("id missing"));
        }
        if self.matchers.is_empty() {
            return Err(MurmurError::validation("at least one matcher required"));
        }
        self.matchers.iter().try_for_each(Matcher::validate)?;
        if self.ends_at < self.starts_at {
            return Err(MurmurError::validation("end time must not be before start time"));
        }
        if self.created_by.trim().is_empty() {
            return Err(MurmurError::validation("creator information missing"));
        }
        if self.comment.trim().is_empty() {
            return Err(MurmurError::validation("comment missing"));
        }
        Ok(())
    }

    /// Status at `now`.
    pub fn status(&self, now: DateTime<Utc>) -> SilenceStatus {
        if self.lifecycle == Lifecycle::Tombstoned || self.ends_at < now {
            SilenceStatus::Expired
        } else if self.starts_at > now {
            SilenceStatus::Pending
        } else {
            SilenceStatus::Active
        }
    }

    /// Whether the silence is in effect at `now`.
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.status(now) == SilenceStatus::Active
    }

    /// Whether the silence has ended, by deletion or by its window closing.
    pub fn has_ended(&self, now: DateTime<Utc>) -> bool {
        self.status(now) == SilenceStatus::Expired
    }

    /// Whether the silence suppresses `labels` at `now`.
    pub fn mutes(&self, labels: &LabelSet, now: DateTime<Utc>) -> bool {
        self.is_active(now) && matches_all(&self.matchers, labels)
    }

    /// Derive the deleted version of this silence.
    ///
    /// The window closes at `now`; a pending silence also has its start pulled
    /// in to `now` so the window stays well-formed.
    pub fn tombstone(&self, now: DateTime<Utc>) -> Silence {
        let mut ended = self.clone();
        ended.updated_at = now;
        ended.ends_at = now;
        ended.starts_at = ended.starts_at.min(now);
        ended.lifecycle = Lifecycle::Tombstoned;
        ended
    }
}
