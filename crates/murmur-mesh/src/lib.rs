#![deny(clippy::dbg_macro)]
#![deny(clippy::todo)]
#![forbid(unsafe_code)]
//! # Murmur Mesh - gossip replication of alert state
//!
//! Silences and notification infos are kept in last-write-wins replicated
//! sets and spread between peers by a gossip transport:
//! - [`ReplicatedSet`] with delta-returning merges and a versioned wire codec
//! - [`GossipAdapter`] bridging a set to a transport channel
//! - [`Silences`] and [`NotificationInfos`], the public stores
//! - [`MeshPeer`] wiring both stores to a [`GossipRouter`]
//! - an in-memory transport for tests and local simulation
//!
//! ## Design Principles
//!
//! - **Convergence**: merges are commutative, associative and idempotent
//! - **Relay only news**: the broadcast path returns just the accepted delta
//! - **Tombstones**: deleted silences stay replicated as ended versions
//! - **Explicit wiring**: stores are constructed and shared via `Arc`

pub mod adapter;
pub mod notifications;
pub mod peer;
pub mod prelude;
pub mod silences;
pub mod state;
pub mod transport;
pub mod wire;

pub use adapter::GossipAdapter;
pub use notifications::{NotificationInfos, NotificationStore};
pub use peer::MeshPeer;
pub use silences::{SilenceStore, Silences};
pub use state::{LastWriteWins, MergeOutcome, ReplicatedSet};
pub use transport::memory::{MemoryNetwork, MemoryRouter, MemoryTransport};
pub use transport::{GossipHandler, GossipRouter, PeerName, Transport, TransportError};
pub use wire::{WireCodec, WIRE_SCHEMA_VERSION};
