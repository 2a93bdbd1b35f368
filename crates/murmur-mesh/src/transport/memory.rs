//! In-process gossip network
//!
//! Deterministic stand-in for a real mesh: broadcasts are queued and only
//! delivered when the owner drains the queue, so tests decide when messages
//! arrive and can duplicate, reorder or drop them in between.

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::Arc;

use murmur_core::{MurmurError, Result};

use super::{GossipHandler, GossipRouter, PeerName, Transport, TransportError};
use crate::state::MergeOutcome;

#[derive(Debug, Clone)]
struct Envelope {
    channel: String,
    from: PeerName,
    to: PeerName,
    payload: Vec<u8>,
}

#[derive(Default)]
struct NetworkState {
    handlers: BTreeMap<(String, PeerName), Arc<dyn GossipHandler>>,
    queue: VecDeque<Envelope>,
    partitioned: BTreeSet<PeerName>,
}

impl NetworkState {
    fn handler(&self, channel: &str, peer: &PeerName) -> Option<Arc<dyn GossipHandler>> {
        self.handlers
            .get(&(channel.to_string(), peer.clone()))
            .cloned()
    }

    /// Queue `payload` for every reachable peer on `channel` except `skip`.
    fn fan_out(&mut self, channel: &str, from: &PeerName, skip: &[&PeerName], payload: &[u8]) {
        let targets: Vec<PeerName> = self
            .handlers
            .keys()
            .filter(|(c, peer)| {
                c == channel
                    && peer != from
                    && !skip.contains(&peer)
                    && !self.partitioned.contains(peer)
            })
            .map(|(_, peer)| peer.clone())
            .collect();
        for to in targets {
            self.queue.push_back(Envelope {
                channel: channel.to_string(),
                from: from.clone(),
                to,
                payload: payload.to_vec(),
            });
        }
    }
}

/// Shared in-memory network connecting any number of peers.
#[derive(Clone, Default)]
pub struct MemoryNetwork {
    state: Arc<Mutex<NetworkState>>,
}

impl MemoryNetwork {
    /// Empty network
    pub fn new() -> Self {
        Self::default()
    }

    /// Router for one peer
    pub fn router(&self, peer: impl Into<PeerName>) -> MemoryRouter {
        MemoryRouter {
            peer: peer.into(),
            network: self.clone(),
        }
    }

    /// Number of queued envelopes
    pub fn pending(&self) -> usize {
        self.state.lock().queue.len()
    }

    /// Queue a second copy of every pending envelope
    pub fn duplicate_pending(&self) {
        let mut state = self.state.lock();
        let copies: Vec<Envelope> = state.queue.iter().cloned().collect();
        state.queue.extend(copies);
    }

    /// Reorder pending envelopes deterministically from `seed`
    pub fn shuffle_pending(&self, seed: u64) {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut state = self.state.lock();
        let mut envelopes: Vec<Envelope> = state.queue.drain(..).collect();
        envelopes.shuffle(&mut rng);
        state.queue.extend(envelopes);
    }

    /// Lose every pending envelope, returning how many were dropped
    pub fn drop_pending(&self) -> usize {
        let mut state = self.state.lock();
        let dropped = state.queue.len();
        state.queue.clear();
        dropped
    }

    /// Cut `peer` off: its broadcasts fail and nothing is delivered to it.
    pub fn partition(&self, peer: &PeerName) {
        self.state.lock().partitioned.insert(peer.clone());
    }

    /// Reconnect a partitioned peer
    pub fn heal(&self, peer: &PeerName) {
        self.state.lock().partitioned.remove(peer);
    }

    /// Whether `peer` is currently partitioned
    pub fn is_partitioned(&self, peer: &PeerName) -> bool {
        self.state.lock().partitioned.contains(peer)
    }

    /// Deliver the oldest pending envelope. Returns false once the queue is empty.
    ///
    /// Deltas returned by the receiver are relayed to the rest of the channel.
    /// Fragments the receiver rejects are logged and dropped.
    pub fn deliver_next(&self) -> bool {
        let (envelope, handler) = {
            let mut state = self.state.lock();
            let Some(envelope) = state.queue.pop_front() else {
                return false;
            };
            if state.partitioned.contains(&envelope.to) {
                tracing::debug!(peer = %envelope.to, "dropping fragment for partitioned peer");
                return true;
            }
            let handler = state.handler(&envelope.channel, &envelope.to);
            (envelope, handler)
        };
        let Some(handler) = handler else {
            tracing::debug!(
                channel = %envelope.channel,
                peer = %envelope.to,
                "no handler registered, dropping fragment"
            );
            return true;
        };

        match handler.on_receive_broadcast_fragment(&envelope.from, &envelope.payload) {
            Ok(MergeOutcome::HasDelta(delta)) => {
                self.state.lock().fan_out(
                    &envelope.channel,
                    &envelope.to,
                    &[&envelope.from],
                    &delta,
                );
            }
            Ok(MergeOutcome::NoNewInfo) => {}
            Err(err) => {
                tracing::warn!(
                    channel = %envelope.channel,
                    from = %envelope.from,
                    to = %envelope.to,
                    error = %err,
                    "dropping rejected gossip fragment"
                );
            }
        }
        true
    }

    /// Deliver until the queue is empty, relays included. Returns the number
    /// of envelopes processed.
    pub fn deliver_all(&self) -> usize {
        let mut delivered = 0;
        while self.deliver_next() {
            delivered += 1;
        }
        delivered
    }

    /// Inject a raw payload as if `from` had broadcast it to `to`.
    pub fn inject(&self, channel: &str, from: &PeerName, to: &PeerName, payload: Vec<u8>) {
        self.state.lock().queue.push_back(Envelope {
            channel: channel.to_string(),
            from: from.clone(),
            to: to.clone(),
            payload,
        });
    }

    /// Anti-entropy pull: `to` merges `from`'s full state and relays whatever
    /// was new to it. Returns whether `to` learned anything.
    pub fn pull(&self, channel: &str, from: &PeerName, to: &PeerName) -> Result<bool> {
        let (source, target) = self.pair(channel, from, to)?;
        let snapshot = source.snapshot()?;
        match target.on_receive_fragment(&snapshot)? {
            MergeOutcome::HasDelta(delta) => {
                self.state.lock().fan_out(channel, to, &[from], &delta);
                Ok(true)
            }
            MergeOutcome::NoNewInfo => Ok(false),
        }
    }

    /// Point-to-point full state transfer from `from` to `to`; nothing is relayed.
    pub fn sync_direct(&self, channel: &str, from: &PeerName, to: &PeerName) -> Result<()> {
        let (source, target) = self.pair(channel, from, to)?;
        let snapshot = source.snapshot()?;
        target.on_receive_direct_fragment(from, &snapshot)
    }

    fn pair(
        &self,
        channel: &str,
        from: &PeerName,
        to: &PeerName,
    ) -> Result<(Arc<dyn GossipHandler>, Arc<dyn GossipHandler>)> {
        let state = self.state.lock();
        let lookup = |peer: &PeerName| {
            state.handler(channel, peer).ok_or_else(|| {
                MurmurError::not_registered(format!("{channel} on peer {peer}"))
            })
        };
        Ok((lookup(from)?, lookup(to)?))
    }
}

/// One peer's view of a [`MemoryNetwork`].
#[derive(Clone)]
pub struct MemoryRouter {
    peer: PeerName,
    network: MemoryNetwork,
}

impl MemoryRouter {
    /// Name of the peer this router belongs to
    pub fn peer(&self) -> &PeerName {
        &self.peer
    }
}

impl GossipRouter for MemoryRouter {
    fn register(&self, channel: &str, handler: Arc<dyn GossipHandler>) -> Arc<dyn Transport> {
        self.network
            .state
            .lock()
            .handlers
            .insert((channel.to_string(), self.peer.clone()), handler);
        tracing::debug!(peer = %self.peer, channel, "registered gossip handler");
        Arc::new(MemoryTransport {
            peer: self.peer.clone(),
            channel: channel.to_string(),
            network: self.network.clone(),
        })
    }
}

/// Broadcast handle for one peer and channel.
pub struct MemoryTransport {
    peer: PeerName,
    channel: String,
    network: MemoryNetwork,
}

impl Transport for MemoryTransport {
    fn broadcast(&self, payload: Vec<u8>) -> std::result::Result<(), TransportError> {
        let mut state = self.network.state.lock();
        if state.partitioned.contains(&self.peer) {
            return Err(TransportError::Partitioned {
                peer: self.peer.clone(),
            });
        }
        state.fan_out(&self.channel, &self.peer, &[], &payload);
        Ok(())
    }
}
