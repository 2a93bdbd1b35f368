//! Replicated notification log
//!
//! One entry per alert and receiver, last-write-wins by notification time.
//! Entries are never removed.

use std::sync::Arc;

use murmur_core::{
    Fingerprint, MeshConfig, NotificationEntry, NotificationKey, NotifyInfo, Result,
};

use crate::adapter::GossipAdapter;
use crate::state::ReplicatedSet;
use crate::transport::Transport;
use crate::wire::WireCodec;

/// Replicated state behind [`NotificationInfos`]
pub type NotificationStore = ReplicatedSet<NotificationKey, NotificationEntry>;

/// Which alerts were sent to which receivers, shared across the cluster.
pub struct NotificationInfos {
    adapter: Arc<GossipAdapter<NotificationKey, NotificationEntry>>,
}

impl Default for NotificationInfos {
    fn default() -> Self {
        Self::new()
    }
}

impl NotificationInfos {
    /// Store with default settings
    pub fn new() -> Self {
        Self::with_config(&MeshConfig::default())
    }

    /// Store using the channel and payload limit from `config`
    pub fn with_config(config: &MeshConfig) -> Self {
        let adapter = GossipAdapter::new(
            config.notifications_channel.clone(),
            Arc::new(NotificationStore::new()),
            WireCodec::from_config(config),
        );
        Self {
            adapter: Arc::new(adapter),
        }
    }

    /// Gossip adapter to hand to the transport
    pub fn adapter(&self) -> Arc<GossipAdapter<NotificationKey, NotificationEntry>> {
        self.adapter.clone()
    }

    /// Set the transport used for broadcasts
    pub fn register(&self, transport: Arc<dyn Transport>) {
        self.adapter.register(transport);
    }

    /// Record a batch of notifications as one update and broadcast it once.
    ///
    /// Duplicate keys within the batch keep the newest entry.
    pub fn set(&self, infos: impl IntoIterator<Item = NotifyInfo>) -> Result<()> {
        let update: NotificationStore = infos.into_iter().map(NotifyInfo::into_parts).collect();
        if update.is_empty() {
            return Ok(());
        }
        let count = update.len();
        self.adapter.commit(update)?;
        tracing::debug!(count, "notification infos stored");
        Ok(())
    }

    /// Look up `receiver`'s entries for each alert, in input order.
    pub fn get(&self, receiver: &str, alerts: &[Fingerprint]) -> Vec<Option<NotifyInfo>> {
        let keys: Vec<NotificationKey> = alerts
            .iter()
            .map(|fp| NotificationKey::new(*fp, receiver))
            .collect();
        let found = self.adapter.store().get_many(&keys);
        keys.into_iter()
            .zip(found)
            .map(|(key, entry)| entry.map(|entry| NotifyInfo::from_parts(key, entry)))
            .collect()
    }
}
