//! Bridge between a replicated store and the gossip transport.

use parking_lot::RwLock;
use std::sync::Arc;

use murmur_core::{MurmurError, Result};

use crate::state::{Key, MergeOutcome, ReplicatedSet, Value};
use crate::transport::{GossipHandler, PeerName, Transport};
use crate::wire::WireCodec;

/// Connects one [`ReplicatedSet`] to one gossip channel.
///
/// Outgoing: local writes are encoded and broadcast through the registered
/// [`Transport`]. Incoming: the adapter is the channel's [`GossipHandler`],
/// turning peer payloads into merges.
pub struct GossipAdapter<K, V> {
    channel: String,
    store: Arc<ReplicatedSet<K, V>>,
    codec: WireCodec,
    transport: RwLock<Option<Arc<dyn Transport>>>,
}

impl<K, V> GossipAdapter<K, V>
where
    K: Key,
    V: Value,
{
    /// Adapter for `store` on `channel`
    pub fn new(
        channel: impl Into<String>,
        store: Arc<ReplicatedSet<K, V>>,
        codec: WireCodec,
    ) -> Self {
        Self {
            channel: channel.into(),
            store,
            codec,
            transport: RwLock::new(None),
        }
    }

    /// Channel name
    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// The wrapped store
    pub fn store(&self) -> &Arc<ReplicatedSet<K, V>> {
        &self.store
    }

    /// Codec used for both directions
    pub fn codec(&self) -> &WireCodec {
        &self.codec
    }

    /// Set the transport used for outgoing broadcasts, replacing any earlier one.
    pub fn register(&self, transport: Arc<dyn Transport>) {
        *self.transport.write() = Some(transport);
        tracing::debug!(channel = %self.channel, "transport registered");
    }

    /// Whether a transport has been registered
    pub fn is_registered(&self) -> bool {
        self.transport.read().is_some()
    }

    fn transport(&self) -> Result<Arc<dyn Transport>> {
        self.transport
            .read()
            .clone()
            .ok_or_else(|| MurmurError::not_registered(self.channel.clone()))
    }

    /// Encode `update` and hand it to the transport without applying it.
    pub fn broadcast(&self, update: &ReplicatedSet<K, V>) -> Result<()> {
        let transport = self.transport()?;
        let payload = self.codec.encode(&update.entries())?;
        self.send(transport.as_ref(), payload, update.len());
        Ok(())
    }

    /// Apply a local write and broadcast it. Returns how many entries the
    /// local store accepted.
    ///
    /// The update is encoded before anything is applied, so a write either
    /// fails without side effects or is merged locally. Entries that lose to
    /// a newer stored version are dropped; when nothing was accepted the
    /// broadcast is skipped. Broadcast failures are logged only: delivery is
    /// best-effort and anti-entropy repairs gaps.
    pub fn commit(&self, update: ReplicatedSet<K, V>) -> Result<usize> {
        let transport = self.transport()?;
        let entries = update.len();
        let payload = self.codec.encode(&update.entries())?;

        let accepted = self.store.merge_complete(update);
        if accepted == 0 {
            tracing::debug!(
                channel = %self.channel,
                entries,
                "local update superseded by stored versions"
            );
            return Ok(0);
        }
        self.send(transport.as_ref(), payload, entries);
        Ok(accepted)
    }

    fn send(&self, transport: &dyn Transport, payload: Vec<u8>, entries: usize) {
        if let Err(err) = transport.broadcast(payload) {
            tracing::warn!(
                channel = %self.channel,
                entries,
                error = %err,
                "broadcast failed; peers will catch up via anti-entropy"
            );
        } else {
            tracing::debug!(channel = %self.channel, entries, "broadcast update");
        }
    }

    fn decode(&self, payload: &[u8]) -> Result<ReplicatedSet<K, V>> {
        ReplicatedSet::decode_with(&self.codec, payload).map_err(|err| {
            tracing::warn!(
                channel = %self.channel,
                bytes = payload.len(),
                error = %err,
                "rejecting undecodable gossip payload"
            );
            err
        })
    }

    fn merge_fragment(&self, payload: &[u8]) -> Result<MergeOutcome<Vec<u8>>> {
        let update = self.decode(payload)?;
        let received = update.len();
        let outcome = self.store.merge_delta(update);
        tracing::debug!(
            channel = %self.channel,
            received,
            accepted = outcome.delta().map_or(0, ReplicatedSet::len),
            "merged gossip fragment"
        );
        outcome.try_map(|delta| delta.encode_with(&self.codec))
    }
}

impl<K, V> GossipHandler for GossipAdapter<K, V>
where
    K: Key,
    V: Value,
{
    fn snapshot(&self) -> Result<Vec<u8>> {
        self.store.encode_with(&self.codec).map_err(|err| {
            tracing::warn!(
                channel = %self.channel,
                entries = self.store.len(),
                max_payload_bytes = self.codec.max_payload_bytes(),
                error = %err,
                "full state over payload limit; anti-entropy on this channel is stalled"
            );
            err
        })
    }

    fn on_receive_fragment(&self, payload: &[u8]) -> Result<MergeOutcome<Vec<u8>>> {
        self.merge_fragment(payload)
    }

    fn on_receive_broadcast_fragment(
        &self,
        from: &PeerName,
        payload: &[u8],
    ) -> Result<MergeOutcome<Vec<u8>>> {
        tracing::trace!(channel = %self.channel, %from, "broadcast fragment");
        self.merge_fragment(payload)
    }

    fn on_receive_direct_fragment(&self, from: &PeerName, payload: &[u8]) -> Result<()> {
        let update = self.decode(payload)?;
        let received = update.len();
        let accepted = self.store.merge_complete(update);
        tracing::debug!(
            channel = %self.channel,
            %from,
            received,
            accepted,
            "merged full state"
        );
        Ok(())
    }
}
