//! Last-write-wins replicated set
//!
//! [`ReplicatedSet`] is the state every store in this crate is built on: a
//! key/value map behind a read/write lock whose merge is commutative,
//! associative and idempotent. Peers that have seen the same updates hold the
//! same entries, whatever order or multiplicity the updates arrived in.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

use murmur_core::{Lifecycle, NotificationEntry, Result, Silence};

use crate::wire::WireCodec;

/// Values ordered by a timestamp, with ties broken by the value itself.
///
/// The tie-break must be a total order shared by every peer; deriving `Ord`
/// on the value type is enough.
pub trait LastWriteWins: Ord {
    /// Comparable version stamp
    type Timestamp: Ord;

    /// Version stamp of this value
    fn timestamp(&self) -> Self::Timestamp;

    /// Whether `self` replaces `current` on merge.
    ///
    /// Later timestamps win; equal timestamps fall back to the value order, so
    /// an identical value never replaces itself.
    fn supersedes(&self, current: &Self) -> bool {
        match self.timestamp().cmp(&current.timestamp()) {
            Ordering::Greater => true,
            Ordering::Less => false,
            Ordering::Equal => self > current,
        }
    }
}

impl LastWriteWins for NotificationEntry {
    type Timestamp = DateTime<Utc>;

    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

/// Versions are ordered by `updated_at`; at the same instant a tombstone
/// beats a live record, so a delete issued right after a write still lands.
impl LastWriteWins for Silence {
    type Timestamp = (DateTime<Utc>, Lifecycle);

    fn timestamp(&self) -> Self::Timestamp {
        (self.updated_at, self.lifecycle)
    }
}

/// Composite bound for replicated keys
pub trait Key: Ord + Clone + Send + Sync + Serialize + DeserializeOwned + 'static {}

impl<T> Key for T where T: Ord + Clone + Send + Sync + Serialize + DeserializeOwned + 'static {}

/// Composite bound for replicated values
pub trait Value: LastWriteWins + Clone + Send + Sync + Serialize + DeserializeOwned + 'static {}

impl<T> Value for T where
    T: LastWriteWins + Clone + Send + Sync + Serialize + DeserializeOwned + 'static
{
}

/// Result of a merge that may or may not have taught us something.
#[must_use]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeOutcome<T> {
    /// Entries that were accepted and should be relayed
    HasDelta(T),
    /// Every incoming entry was already known or older
    NoNewInfo,
}

impl<T> MergeOutcome<T> {
    /// Whether anything was accepted
    pub fn is_new(&self) -> bool {
        matches!(self, MergeOutcome::HasDelta(_))
    }

    /// The accepted entries, if any
    pub fn delta(&self) -> Option<&T> {
        match self {
            MergeOutcome::HasDelta(delta) => Some(delta),
            MergeOutcome::NoNewInfo => None,
        }
    }

    /// Consume into an option
    pub fn into_delta(self) -> Option<T> {
        match self {
            MergeOutcome::HasDelta(delta) => Some(delta),
            MergeOutcome::NoNewInfo => None,
        }
    }

    /// Transform the delta, keeping `NoNewInfo` as is
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> MergeOutcome<U> {
        match self {
            MergeOutcome::HasDelta(delta) => MergeOutcome::HasDelta(f(delta)),
            MergeOutcome::NoNewInfo => MergeOutcome::NoNewInfo,
        }
    }

    /// Fallible [`MergeOutcome::map`]
    pub fn try_map<U, E>(
        self,
        f: impl FnOnce(T) -> std::result::Result<U, E>,
    ) -> std::result::Result<MergeOutcome<U>, E> {
        match self {
            MergeOutcome::HasDelta(delta) => f(delta).map(MergeOutcome::HasDelta),
            MergeOutcome::NoNewInfo => Ok(MergeOutcome::NoNewInfo),
        }
    }
}

/// Lock-protected last-write-wins map.
///
/// Updates are passed by value: they are fresh sets built locally or decoded
/// from the wire, never the live store itself.
pub struct ReplicatedSet<K, V> {
    entries: RwLock<BTreeMap<K, V>>,
}

impl<K, V> ReplicatedSet<K, V>
where
    K: Ord + Clone,
    V: LastWriteWins + Clone,
{
    /// Empty set
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(BTreeMap::new()),
        }
    }

    /// Build a set from records; duplicate keys keep the winning value.
    pub fn from_entries(records: impl IntoIterator<Item = (K, V)>) -> Self {
        let mut map = BTreeMap::new();
        for (key, value) in records {
            absorb_one(&mut map, key, value);
        }
        Self {
            entries: RwLock::new(map),
        }
    }

    /// Set holding a single entry
    pub fn singleton(key: K, value: V) -> Self {
        Self::from_entries([(key, value)])
    }

    /// Number of keys
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether the set has no keys
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Whether `key` is present
    pub fn contains_key(&self, key: &K) -> bool {
        self.entries.read().contains_key(key)
    }

    /// Clone of the current value for `key`
    pub fn get(&self, key: &K) -> Option<V> {
        self.entries.read().get(key).cloned()
    }

    /// Values for several keys under one read lock, aligned with `keys`
    pub fn get_many(&self, keys: &[K]) -> Vec<Option<V>> {
        let entries = self.entries.read();
        keys.iter().map(|key| entries.get(key).cloned()).collect()
    }

    /// Snapshot of all records in key order
    pub fn entries(&self) -> Vec<(K, V)> {
        self.entries
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Snapshot of all values in key order
    pub fn values(&self) -> Vec<V> {
        self.entries.read().values().cloned().collect()
    }

    /// Scan in key order under the read lock, stopping at the first `Some`.
    pub fn find_map<R>(&self, mut f: impl FnMut(&K, &V) -> Option<R>) -> Option<R> {
        self.entries.read().iter().find_map(|(k, v)| f(k, v))
    }

    /// Independent snapshot of the full state
    pub fn copy(&self) -> Self {
        Self {
            entries: RwLock::new(self.entries.read().clone()),
        }
    }

    /// Consume into the underlying map
    pub fn into_entries(self) -> BTreeMap<K, V> {
        self.entries.into_inner()
    }

    /// Merge `update` in place.
    pub fn merge(&self, update: Self) {
        self.absorb(update);
    }

    /// Merge `update` and return exactly the entries that changed.
    pub fn merge_delta(&self, update: Self) -> MergeOutcome<Self> {
        let incoming = update.into_entries();
        let mut delta = BTreeMap::new();
        {
            let mut entries = self.entries.write();
            for (key, value) in incoming {
                if accepts(entries.get(&key), &value) {
                    delta.insert(key.clone(), value.clone());
                    entries.insert(key, value);
                }
            }
        }
        if delta.is_empty() {
            MergeOutcome::NoNewInfo
        } else {
            MergeOutcome::HasDelta(Self {
                entries: RwLock::new(delta),
            })
        }
    }

    /// Merge a full state received point-to-point; nothing is relayed.
    ///
    /// Returns how many entries were accepted.
    pub fn merge_complete(&self, update: Self) -> usize {
        self.absorb(update)
    }

    fn absorb(&self, update: Self) -> usize {
        let incoming = update.into_entries();
        let mut entries = self.entries.write();
        let mut accepted = 0;
        for (key, value) in incoming {
            if accepts(entries.get(&key), &value) {
                entries.insert(key, value);
                accepted += 1;
            }
        }
        accepted
    }
}

impl<K, V> ReplicatedSet<K, V>
where
    K: Key,
    V: Value,
{
    /// Encode the full state with default codec limits
    pub fn encode(&self) -> Result<Vec<u8>> {
        self.encode_with(&WireCodec::default())
    }

    /// Encode the full state; the lock is released before serialization.
    pub fn encode_with(&self, codec: &WireCodec) -> Result<Vec<u8>> {
        codec.encode(&self.entries())
    }

    /// Decode a full or partial state with default codec limits
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        Self::decode_with(&WireCodec::default(), bytes)
    }

    /// Decode a full or partial state
    pub fn decode_with(codec: &WireCodec, bytes: &[u8]) -> Result<Self> {
        codec.decode(bytes).map(Self::from_entries)
    }
}

fn accepts<V: LastWriteWins>(current: Option<&V>, incoming: &V) -> bool {
    current.map_or(true, |current| incoming.supersedes(current))
}

fn absorb_one<K: Ord, V: LastWriteWins>(map: &mut BTreeMap<K, V>, key: K, value: V) {
    if accepts(map.get(&key), &value) {
        map.insert(key, value);
    }
}

impl<K, V> Default for ReplicatedSet<K, V>
where
    K: Ord + Clone,
    V: LastWriteWins + Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> Clone for ReplicatedSet<K, V>
where
    K: Ord + Clone,
    V: LastWriteWins + Clone,
{
    fn clone(&self) -> Self {
        self.copy()
    }
}

impl<K, V> PartialEq for ReplicatedSet<K, V>
where
    K: Ord + Clone,
    V: LastWriteWins + Clone,
{
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self, other) || self.entries() == other.entries()
    }
}

impl<K, V> Eq for ReplicatedSet<K, V>
where
    K: Ord + Clone,
    V: LastWriteWins + Clone,
{
}

impl<K, V> FromIterator<(K, V)> for ReplicatedSet<K, V>
where
    K: Ord + Clone,
    V: LastWriteWins + Clone,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self::from_entries(iter)
    }
}

impl<K, V> fmt::Debug for ReplicatedSet<K, V>
where
    K: fmt::Debug,
    V: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.entries.read().iter()).finish()
    }
}
