//! Replicated silences
//!
//! Silences are last-write-wins by `updated_at`. Every write stores a new
//! version of the record; deletion stores a tombstone version whose window
//! closes at the time of deletion.

use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;

use murmur_core::{
    LabelSet, Marker, MeshConfig, MurmurError, PhysicalClock, Result, Silence, SilenceId,
    SystemClock,
};

use crate::adapter::GossipAdapter;
use crate::state::ReplicatedSet;
use crate::transport::Transport;
use crate::wire::WireCodec;

/// Replicated state behind [`Silences`]
pub type SilenceStore = ReplicatedSet<SilenceId, Silence>;

/// Cluster-wide silences as seen by this node.
pub struct Silences {
    adapter: Arc<GossipAdapter<SilenceId, Silence>>,
    marker: Arc<dyn Marker>,
    clock: Arc<dyn PhysicalClock>,
}

impl Silences {
    /// Silences with default settings and the system clock
    pub fn new(marker: Arc<dyn Marker>) -> Self {
        Self::with_config(&MeshConfig::default(), marker, Arc::new(SystemClock))
    }

    /// Silences using the channel and payload limit from `config`
    pub fn with_config(
        config: &MeshConfig,
        marker: Arc<dyn Marker>,
        clock: Arc<dyn PhysicalClock>,
    ) -> Self {
        let adapter = GossipAdapter::new(
            config.silences_channel.clone(),
            Arc::new(SilenceStore::new()),
            WireCodec::from_config(config),
        );
        Self {
            adapter: Arc::new(adapter),
            marker,
            clock,
        }
    }

    /// Gossip adapter to hand to the transport
    pub fn adapter(&self) -> Arc<GossipAdapter<SilenceId, Silence>> {
        self.adapter.clone()
    }

    /// Set the transport used for broadcasts
    pub fn register(&self, transport: Arc<dyn Transport>) {
        self.adapter.register(transport);
    }

    fn store(&self) -> &SilenceStore {
        self.adapter.store()
    }

    /// Whether any silence active now matches `labels`.
    ///
    /// The deciding silence, or its absence, is recorded in the marker.
    /// Silences are scanned in id order and carry no priority, so when several
    /// overlap it is unspecified which id gets recorded.
    pub fn mutes(&self, labels: &LabelSet) -> bool {
        let now = self.clock.now();
        let fingerprint = labels.fingerprint();
        let silenced_by = self
            .store()
            .find_map(|id, silence| silence.mutes(labels, now).then_some(*id));

        self.marker.set_silenced(fingerprint, silenced_by);
        tracing::trace!(%fingerprint, silence = ?silenced_by, "evaluated silences");
        silenced_by.is_some()
    }

    /// Every stored silence, expired and deleted ones included
    pub fn all(&self) -> Vec<Silence> {
        self.store().values()
    }

    /// Store a new version of a silence and broadcast it.
    ///
    /// A nil id is replaced by a fresh one. `updated_at` is stamped with the
    /// current time, or just past the stored version when that one carries a
    /// later stamp from a peer whose clock runs ahead. Returns the silence id.
    pub fn set(&self, mut silence: Silence) -> Result<SilenceId> {
        if silence.id.is_nil() {
            silence.id = SilenceId::new();
        }
        let now = self.clock.now();
        let stored = self.store().get(&silence.id);
        silence.updated_at = next_version(stored.as_ref(), now);
        silence.validate()?;

        let id = silence.id;
        self.store_version(id, silence)?;
        tracing::debug!(%id, "silence stored");
        Ok(id)
    }

    /// End a silence now by storing its tombstone version.
    pub fn del(&self, id: &SilenceId) -> Result<()> {
        let current = self.get(id)?;
        let now = self.clock.now();
        if current.has_ended(now) {
            return Err(MurmurError::already_ended(*id, current.ends_at));
        }

        let mut ended = current.tombstone(now);
        ended.updated_at = next_version(Some(&current), now);
        ended
            .validate()
            .map_err(|e| MurmurError::validation(format!("tombstone for {id}: {e}")))?;
        self.store_version(*id, ended)?;
        tracing::debug!(%id, "silence deleted");
        Ok(())
    }

    /// Commit one version; a version that lost to a concurrent newer one is an error.
    fn store_version(&self, id: SilenceId, silence: Silence) -> Result<()> {
        match self.adapter.commit(SilenceStore::singleton(id, silence))? {
            0 => Err(MurmurError::superseded(id)),
            _ => Ok(()),
        }
    }

    /// Current version of a silence
    pub fn get(&self, id: &SilenceId) -> Result<Silence> {
        self.store().get(id).ok_or_else(|| MurmurError::not_found(*id))
    }
}

/// Stamp for a new local version: `now`, unless the stored version is already
/// at or past `now`, in which case the stamp lands just after it.
fn next_version(current: Option<&Silence>, now: DateTime<Utc>) -> DateTime<Utc> {
    match current {
        Some(current) if current.updated_at >= now => current.updated_at + Duration::nanoseconds(1),
        _ => now,
    }
}
