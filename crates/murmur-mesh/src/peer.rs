//! One node's replicated stores, wired to a gossip router.

use std::sync::Arc;

use murmur_core::{Marker, MeshConfig, PhysicalClock, Result};

use crate::notifications::NotificationInfos;
use crate::silences::Silences;
use crate::transport::{GossipHandler, GossipRouter};

/// Silences and notification infos of a single mesh member.
#[derive(Clone)]
pub struct MeshPeer {
    /// Replicated silences
    pub silences: Arc<Silences>,
    /// Replicated notification log
    pub notifications: Arc<NotificationInfos>,
}

impl std::fmt::Debug for MeshPeer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MeshPeer").finish_non_exhaustive()
    }
}

impl MeshPeer {
    /// Build both stores from `config` and register them on `router`.
    ///
    /// Each adapter is attached to its configured channel and the transport
    /// handle the router returns is registered back into the store, so the
    /// peer can write as soon as this returns.
    pub fn join(
        config: &MeshConfig,
        router: &dyn GossipRouter,
        marker: Arc<dyn Marker>,
        clock: Arc<dyn PhysicalClock>,
    ) -> Result<Self> {
        config.validate()?;

        let silences = Arc::new(Silences::with_config(config, marker, clock));
        let handler: Arc<dyn GossipHandler> = silences.adapter();
        silences.register(router.register(&config.silences_channel, handler));

        let notifications = Arc::new(NotificationInfos::with_config(config));
        let handler: Arc<dyn GossipHandler> = notifications.adapter();
        notifications.register(router.register(&config.notifications_channel, handler));

        tracing::info!(
            silences_channel = %config.silences_channel,
            notifications_channel = %config.notifications_channel,
            "joined gossip mesh"
        );
        Ok(Self {
            silences,
            notifications,
        })
    }
}
