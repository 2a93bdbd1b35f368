//! Silencing marks consulted by the alert pipeline.
//!
//! The real marker lives outside this workspace; [`MemMarker`] is the
//! in-process implementation used by tests and single-node setups.

use parking_lot::RwLock;
use std::collections::HashMap;

use crate::labels::Fingerprint;
use crate::silence::SilenceId;

/// Records which silence currently suppresses an alert.
pub trait Marker: Send + Sync {
    /// Mark `fingerprint` as silenced by `silence`, or clear the mark with `None`.
    fn set_silenced(&self, fingerprint: Fingerprint, silence: Option<SilenceId>);

    /// Silence currently recorded for `fingerprint`.
    fn silenced_by(&self, fingerprint: Fingerprint) -> Option<SilenceId>;
}

/// In-memory [`Marker`].
#[derive(Debug, Default)]
pub struct MemMarker {
    silenced: RwLock<HashMap<Fingerprint, SilenceId>>,
}

impl MemMarker {
    /// Empty marker
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of alerts currently marked silenced
    pub fn silenced_count(&self) -> usize {
        self.silenced.read().len()
    }
}

impl Marker for MemMarker {
    fn set_silenced(&self, fingerprint: Fingerprint, silence: Option<SilenceId>) {
        let mut silenced = self.silenced.write();
        match silence {
            Some(id) => {
                silenced.insert(fingerprint, id);
            }
            None => {
                silenced.remove(&fingerprint);
            }
        }
    }

    fn silenced_by(&self, fingerprint: Fingerprint) -> Option<SilenceId> {
        self.silenced.read().get(&fingerprint).copied()
    }
}
