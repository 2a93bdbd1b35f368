//! Decoding Untrusted Payloads
//!
//! Every payload arrives from a peer, so decoding must reject garbage with an
//! error and never panic, and a rejected fragment must leave the store alone.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use murmur_core::{ManualClock, MemMarker, MeshConfig};
use murmur_mesh::{
    GossipHandler, MemoryNetwork, MeshPeer, NotificationStore, PeerName, SilenceStore,
    WIRE_SCHEMA_VERSION,
};
use proptest::prelude::*;

fn arb_bytes() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..512)
}

/// Bytes behind a valid schema header, so decoding gets past the version.
fn arb_framed() -> impl Strategy<Value = Vec<u8>> {
    arb_bytes().prop_map(|body| {
        let mut bytes = vec![WIRE_SCHEMA_VERSION as u8];
        bytes.extend(body);
        bytes
    })
}

fn peer() -> MeshPeer {
    let network = MemoryNetwork::new();
    let clock = Arc::new(ManualClock::new(
        DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap(),
    ));
    MeshPeer::join(
        &MeshConfig::default(),
        &network.router("solo"),
        Arc::new(MemMarker::new()),
        clock,
    )
    .unwrap()
}

proptest! {
    /// Property: arbitrary bytes decode to a store or an error, never a panic
    #[test]
    fn prop_random_bytes_never_panic(bytes in arb_bytes()) {
        let _ = SilenceStore::decode(&bytes);
        let _ = NotificationStore::decode(&bytes);
    }

    /// Property: a valid header followed by garbage is still handled
    #[test]
    fn prop_framed_garbage_never_panics(bytes in arb_framed()) {
        let _ = SilenceStore::decode(&bytes);
        let _ = NotificationStore::decode(&bytes);
    }

    /// Property: a fragment that fails to decode changes nothing
    #[test]
    fn prop_rejected_fragment_leaves_store_unchanged(bytes in arb_framed()) {
        let peer = peer();
        let adapter = peer.silences.adapter();
        let before = adapter.store().entries();

        let result = adapter.on_receive_broadcast_fragment(&PeerName::from("remote"), &bytes);
        if result.is_err() {
            prop_assert_eq!(adapter.store().entries(), before);
        }
    }
}

#[test]
fn empty_and_truncated_payloads_are_errors() {
    assert!(SilenceStore::decode(&[]).is_err());
    assert!(SilenceStore::decode(&[WIRE_SCHEMA_VERSION as u8]).is_err());
    assert!(NotificationStore::decode(&[WIRE_SCHEMA_VERSION as u8, 3]).is_err());
}
