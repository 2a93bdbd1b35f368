//! Notification bookkeeping types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::labels::Fingerprint;

/// Record that an alert was (or was not yet resolved when it was) sent to a receiver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotifyInfo {
    /// Alert fingerprint
    pub alert: Fingerprint,
    /// Receiver name
    pub receiver: String,
    /// Whether the notification was for the resolved alert
    pub resolved: bool,
    /// When the notification happened
    pub timestamp: DateTime<Utc>,
}

impl NotifyInfo {
    /// Build a notification record
    pub fn new(
        alert: Fingerprint,
        receiver: impl Into<String>,
        resolved: bool,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            alert,
            receiver: receiver.into(),
            resolved,
            timestamp,
        }
    }

    /// Split into the replicated key and value
    pub fn into_parts(self) -> (NotificationKey, NotificationEntry) {
        (
            NotificationKey::new(self.alert, self.receiver),
            NotificationEntry {
                resolved: self.resolved,
                timestamp: self.timestamp,
            },
        )
    }

    /// Reassemble from a replicated key and value
    pub fn from_parts(key: NotificationKey, entry: NotificationEntry) -> Self {
        Self {
            alert: key.fingerprint,
            receiver: key.receiver,
            resolved: entry.resolved,
            timestamp: entry.timestamp,
        }
    }
}

/// Replicated key: one entry per alert and receiver.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NotificationKey {
    /// Alert fingerprint
    pub fingerprint: Fingerprint,
    /// Receiver name
    pub receiver: String,
}

impl NotificationKey {
    /// Key for an alert and receiver
    pub fn new(fingerprint: Fingerprint, receiver: impl Into<String>) -> Self {
        Self {
            fingerprint,
            receiver: receiver.into(),
        }
    }
}

/// Replicated value. Field order matters: the derived ordering compares the
/// timestamp first, then `resolved`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NotificationEntry {
    /// When the notification happened
    pub timestamp: DateTime<Utc>,
    /// Whether the alert was resolved
    pub resolved: bool,
}

impl NotificationEntry {
    /// Build an entry
    pub fn new(resolved: bool, timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            resolved,
        }
    }
}
