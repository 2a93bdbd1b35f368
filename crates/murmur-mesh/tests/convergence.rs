//! Convergence Tests
//!
//! Several peers on one in-memory network. Messages are duplicated,
//! reordered, dropped and partitioned; anti-entropy must bring every peer
//! back to the same state.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use murmur_core::{
    Fingerprint, LabelSet, ManualClock, Matcher, MemMarker, MeshConfig, NotifyInfo, PhysicalClock, Silence,
    SilenceId,
};
use murmur_mesh::{MemoryNetwork, MeshPeer, PeerName};

const SILENCES: &str = "silences";
const NOTIFICATIONS: &str = "notifications";

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn start() -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap()
}

struct Cluster {
    network: MemoryNetwork,
    clock: Arc<ManualClock>,
    peers: Vec<(PeerName, MeshPeer)>,
}

impl Cluster {
    fn new(names: &[&str]) -> Self {
        init_tracing();
        let network = MemoryNetwork::new();
        let clock = Arc::new(ManualClock::new(start()));
        let peers = names
            .iter()
            .map(|name| {
                let peer = MeshPeer::join(
                    &MeshConfig::default(),
                    &network.router(*name),
                    Arc::new(MemMarker::new()),
                    clock.clone(),
                )
                .unwrap();
                (PeerName::from(*name), peer)
            })
            .collect();
        Self {
            network,
            clock,
            peers,
        }
    }

    fn peer(&self, index: usize) -> &MeshPeer {
        &self.peers[index].1
    }

    fn name(&self, index: usize) -> &PeerName {
        &self.peers[index].0
    }

    /// Pull every peer's state into every other peer, then drain relays.
    fn anti_entropy(&self) {
        for (from, _) in &self.peers {
            for (to, _) in &self.peers {
                if from != to {
                    self.network.pull(SILENCES, from, to).unwrap();
                    self.network.pull(NOTIFICATIONS, from, to).unwrap();
                }
            }
        }
        self.network.deliver_all();
    }

    fn assert_converged(&self) {
        let (_, first) = &self.peers[0];
        let silences = first.silences.all();
        let notifications = first.notifications.adapter().store().entries();
        for (name, peer) in &self.peers[1..] {
            assert_eq!(peer.silences.all(), silences, "silences differ on {name}");
            assert_eq!(
                peer.notifications.adapter().store().entries(),
                notifications,
                "notifications differ on {name}"
            );
        }
    }
}

fn silence(alertname: &str, comment: &str) -> Silence {
    Silence::new(
        vec![Matcher::equal("alertname", alertname)],
        start() - Duration::minutes(1),
        start() + Duration::hours(2),
        "ops",
        comment,
    )
}

#[test]
fn broadcast_reaches_every_peer() {
    let cluster = Cluster::new(&["a", "b", "c"]);
    let id = cluster.peer(0).silences.set(silence("Foo", "first")).unwrap();
    cluster
        .peer(1)
        .notifications
        .set([NotifyInfo::new(Fingerprint(1), "team-a", false, start())])
        .unwrap();

    cluster.network.deliver_all();

    for (_, peer) in &cluster.peers {
        assert_eq!(peer.silences.get(&id).unwrap().comment, "first");
        assert!(peer.notifications.get("team-a", &[Fingerprint(1)])[0].is_some());
    }
    cluster.assert_converged();
}

#[test]
fn duplicated_and_reordered_delivery_converges() {
    let cluster = Cluster::new(&["a", "b", "c", "d"]);
    for (i, (_, peer)) in cluster.peers.iter().enumerate() {
        peer.silences
            .set(silence(&format!("Alert{i}"), "maintenance"))
            .unwrap();
        cluster.clock.advance(Duration::seconds(1));
    }

    cluster.network.duplicate_pending();
    cluster.network.shuffle_pending(7);
    cluster.network.deliver_all();

    cluster.assert_converged();
    assert_eq!(cluster.peer(3).silences.all().len(), 4);
}

#[test]
fn relay_carries_only_new_information() {
    let cluster = Cluster::new(&["a", "b", "c"]);
    cluster.peer(0).silences.set(silence("Foo", "once")).unwrap();
    cluster.network.deliver_all();

    // replaying known state triggers no further traffic
    let snapshot = cluster.peer(0).silences.all();
    let payload = murmur_mesh::SilenceStore::from_entries(
        snapshot.into_iter().map(|s| (s.id, s)),
    )
    .encode()
    .unwrap();
    cluster
        .network
        .inject(SILENCES, cluster.name(0), cluster.name(1), payload);
    assert_eq!(cluster.network.deliver_all(), 1);
    assert_eq!(cluster.network.pending(), 0);
}

#[test]
fn lost_messages_are_repaired_by_pull() {
    let cluster = Cluster::new(&["a", "b", "c"]);
    let id = cluster.peer(0).silences.set(silence("Foo", "lost")).unwrap();
    assert_eq!(cluster.network.drop_pending(), 2);
    assert!(cluster.peer(1).silences.get(&id).is_err());

    // b learns from a and relays the news to c
    assert!(cluster
        .network
        .pull(SILENCES, cluster.name(0), cluster.name(1))
        .unwrap());
    cluster.network.deliver_all();
    assert!(cluster.peer(2).silences.get(&id).is_ok());

    assert!(!cluster
        .network
        .pull(SILENCES, cluster.name(0), cluster.name(1))
        .unwrap());
    cluster.assert_converged();
}

#[test]
fn garbage_fragments_are_dropped() {
    let cluster = Cluster::new(&["a", "b"]);
    cluster
        .network
        .inject(SILENCES, cluster.name(0), cluster.name(1), b"not a state".to_vec());
    assert_eq!(cluster.network.deliver_all(), 1);
    assert!(cluster.peer(1).silences.all().is_empty());
}

#[test]
fn partitioned_peer_catches_up_after_heal() {
    let cluster = Cluster::new(&["a", "b", "c"]);
    let isolated = cluster.name(2).clone();
    cluster.network.partition(&isolated);

    let from_a = cluster.peer(0).silences.set(silence("Foo", "from a")).unwrap();
    // writes on the isolated side still apply locally
    let from_c = cluster.peer(2).silences.set(silence("Bar", "from c")).unwrap();
    cluster.network.deliver_all();

    assert!(cluster.peer(2).silences.get(&from_a).is_err());
    assert!(cluster.peer(0).silences.get(&from_c).is_err());

    cluster.network.heal(&isolated);
    cluster
        .network
        .sync_direct(SILENCES, cluster.name(0), &isolated)
        .unwrap();
    cluster
        .network
        .sync_direct(SILENCES, &isolated, cluster.name(0))
        .unwrap();
    // direct sync relays nothing
    assert_eq!(cluster.network.pending(), 0);
    assert!(cluster.peer(1).silences.get(&from_c).is_err());

    cluster.anti_entropy();
    cluster.assert_converged();
    assert_eq!(cluster.peer(1).silences.all().len(), 2);
}

#[test]
fn concurrent_edits_resolve_to_latest_version() {
    let cluster = Cluster::new(&["a", "b"]);
    let id = cluster.peer(0).silences.set(silence("Foo", "v1")).unwrap();
    cluster.network.deliver_all();

    let mut edit = cluster.peer(0).silences.get(&id).unwrap();
    edit.comment = "edited on a".into();
    cluster.clock.advance(Duration::seconds(5));
    cluster.peer(0).silences.set(edit).unwrap();

    let mut stale_edit = cluster.peer(1).silences.get(&id).unwrap();
    stale_edit.comment = "edited on b".into();
    cluster.clock.advance(Duration::seconds(5));
    cluster.peer(1).silences.set(stale_edit).unwrap();

    cluster.network.shuffle_pending(3);
    cluster.network.deliver_all();

    for (_, peer) in &cluster.peers {
        assert_eq!(peer.silences.get(&id).unwrap().comment, "edited on b");
    }
}

#[test]
fn deletion_replicates_as_tombstone() {
    let cluster = Cluster::new(&["a", "b"]);
    let id = cluster.peer(0).silences.set(silence("Foo", "short")).unwrap();
    cluster.network.deliver_all();

    let foo = LabelSet::new().with("alertname", "Foo");
    assert!(cluster.peer(1).silences.mutes(&foo));

    cluster.clock.advance(Duration::minutes(1));
    cluster.peer(1).silences.del(&id).unwrap();
    cluster.network.deliver_all();

    assert!(!cluster.peer(0).silences.mutes(&foo));
    assert_eq!(cluster.peer(0).silences.get(&id).unwrap().ends_at, cluster.clock.now());
    cluster.assert_converged();
}

#[test]
fn concurrent_writers_and_delivery_converge() {
    let cluster = Cluster::new(&["a", "b", "c", "d"]);

    std::thread::scope(|scope| {
        for (index, (_, peer)) in cluster.peers.iter().enumerate() {
            scope.spawn(move || {
                let mut own: Vec<SilenceId> = Vec::new();
                for round in 0..25 {
                    let id = peer
                        .silences
                        .set(silence(&format!("Alert{index}-{round}"), "stress"))
                        .unwrap();
                    own.push(id);
                    if round % 3 == 0 {
                        peer.silences.del(&id).unwrap();
                    }
                    peer.notifications
                        .set([NotifyInfo::new(
                            Fingerprint(round),
                            format!("receiver-{index}"),
                            round % 2 == 0,
                            start() + Duration::seconds(round as i64),
                        )])
                        .unwrap();
                }
                assert_eq!(own.len(), 25);
            });
        }
        scope.spawn(|| {
            for _ in 0..500 {
                cluster.network.deliver_next();
            }
        });
    });

    cluster.network.deliver_all();
    cluster.anti_entropy();
    cluster.assert_converged();
    assert_eq!(cluster.peer(0).silences.all().len(), 100);
    assert_eq!(cluster.peer(0).notifications.adapter().store().len(), 100);
}
