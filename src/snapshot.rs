//! Atomically replaceable list of routable containers.

use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::watch;

use crate::types::Container;

/// Holds the current snapshot.
///
/// A snapshot is never edited in place: [`SnapshotStore::replace`] swaps
/// in a whole new list, so a reader holding the result of
/// [`SnapshotStore::load`] always sees one complete listing.  Every
/// replacement bumps a generation number published on a `watch` channel.
#[derive(Debug)]
pub struct SnapshotStore {
    containers: RwLock<Arc<Vec<Container>>>,
    generation: watch::Sender<u64>,
}

impl SnapshotStore {
    pub fn new(containers: Vec<Container>) -> Self {
        let (generation, _) = watch::channel(0);
        Self {
            containers: RwLock::new(Arc::new(containers)),
            generation,
        }
    }

    pub fn load(&self) -> Arc<Vec<Container>> {
        Arc::clone(&self.containers.read())
    }

    /// Swap in a new snapshot and return its generation.
    pub fn replace(&self, containers: Vec<Container>) -> u64 {
        *self.containers.write() = Arc::new(containers);
        let mut next = 0;
        self.generation.send_modify(|generation| {
            *generation += 1;
            next = *generation;
        });
        next
    }

    #[cfg(test)]
    pub(crate) fn generation(&self) -> u64 {
        *self.generation.borrow()
    }

    /// Receiver notified after every replacement.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.generation.subscribe()
    }
}

impl Default for SnapshotStore {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}
