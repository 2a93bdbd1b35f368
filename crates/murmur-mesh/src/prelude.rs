//! Murmur mesh prelude.
//!
//! Curated re-exports for wiring a node into the mesh.

pub use crate::{
    GossipAdapter, GossipHandler, GossipRouter, MergeOutcome, MeshPeer, NotificationInfos,
    PeerName, ReplicatedSet, Silences, Transport, TransportError,
};
pub use murmur_core::{
    Fingerprint, LabelSet, Marker, Matcher, MeshConfig, MurmurError, NotifyInfo, PhysicalClock,
    Silence, SilenceId,
};
