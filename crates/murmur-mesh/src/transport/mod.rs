//! Transport seams.
//!
//! The gossip transport is an external collaborator. A store hands its
//! [`GossipHandler`] to a [`GossipRouter`] and gets back a [`Transport`] used
//! for outgoing broadcasts; the router calls the handler for everything that
//! arrives from peers.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use murmur_core::{ErrorCode, Result};

use crate::state::MergeOutcome;

pub mod memory;

/// Name of a peer in the gossip mesh.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PeerName(pub String);

impl PeerName {
    /// Peer with the given name
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Name as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PeerName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PeerName {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for PeerName {
    fn from(name: String) -> Self {
        Self(name)
    }
}

/// Failure to hand a payload to the transport.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// The transport has been shut down
    #[error("Transport closed")]
    Closed,

    /// The local peer cannot reach the mesh
    #[error("Peer {peer} is partitioned from the mesh")]
    Partitioned {
        /// The isolated peer
        peer: PeerName,
    },

    /// The transport refused the payload
    #[error("Payload rejected: {reason}")]
    Rejected {
        /// Why the payload was refused
        reason: String,
    },
}

impl ErrorCode for TransportError {
    fn code(&self) -> &'static str {
        match self {
            TransportError::Closed => "transport_closed",
            TransportError::Partitioned { .. } => "transport_partitioned",
            TransportError::Rejected { .. } => "transport_rejected",
        }
    }
}

/// Outgoing side of a gossip channel.
pub trait Transport: Send + Sync {
    /// Best-effort delivery of `payload` to every reachable peer.
    fn broadcast(&self, payload: Vec<u8>) -> std::result::Result<(), TransportError>;
}

/// Incoming side of a gossip channel, implemented by each store's adapter.
pub trait GossipHandler: Send + Sync {
    /// Full local state, for peers that need the complete picture.
    fn snapshot(&self) -> Result<Vec<u8>>;

    /// Merge state pulled during anti-entropy. Returns what was new.
    fn on_receive_fragment(&self, payload: &[u8]) -> Result<MergeOutcome<Vec<u8>>>;

    /// Merge a broadcast fragment. A returned delta is relayed onward.
    fn on_receive_broadcast_fragment(
        &self,
        from: &PeerName,
        payload: &[u8],
    ) -> Result<MergeOutcome<Vec<u8>>>;

    /// Merge a full state sent point-to-point. Nothing is relayed.
    fn on_receive_direct_fragment(&self, from: &PeerName, payload: &[u8]) -> Result<()>;
}

/// Registers handlers on named channels.
pub trait GossipRouter {
    /// Attach `handler` to `channel`, returning the handle for broadcasts.
    fn register(&self, channel: &str, handler: Arc<dyn GossipHandler>) -> Arc<dyn Transport>;
}
