//! Thread-safe storage for the live upstream peer set.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use crate::upstream::Peer;

/// Holds the current peer set and hands out per-request snapshots.
///
/// The set is replaced wholesale (full sync) and versioned. Readers take
/// cheap `Arc` snapshots, so a replacement never shifts the ground under
/// an in-flight selection. Insertion order is preserved: it is the
/// resolver's tie-break order.
pub struct PeerStore {
    peers: RwLock<Arc<Vec<Peer>>>,
    version: AtomicU64,
}

impl PeerStore {
    /// Creates a new, empty store at version 0.
    pub fn new() -> Self {
        Self {
            peers: RwLock::new(Arc::new(Vec::new())),
            version: AtomicU64::new(0),
        }
    }

    /// Replaces the whole peer set. Returns the version applied.
    pub fn update_peers(&self, peers: Vec<Peer>, version: u64) -> u64 {
        let next = Arc::new(peers);
        *self.peers.write().unwrap_or_else(PoisonError::into_inner) = next;
        self.version.store(version, Ordering::SeqCst);
        version
    }

    /// A stable snapshot of the current peer set.
    pub fn snapshot(&self) -> Arc<Vec<Peer>> {
        Arc::clone(&self.peers.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Version of the set currently being served.
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::SeqCst)
    }

    /// Number of peers in the current set.
    pub fn peer_count(&self) -> usize {
        self.snapshot().len()
    }
}

impl Default for PeerStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_peers(addresses: &[&str]) -> Vec<Peer> {
        addresses.iter().map(|a| Peer::new(*a, 1)).collect()
    }

    // ========== Phase 1: Basic Storage ==========

    #[test]
    fn test_new_store_is_empty() {
        let store = PeerStore::new();
        assert_eq!(store.peer_count(), 0);
        assert_eq!(store.version(), 0);
        assert!(store.snapshot().is_empty());
    }

    #[test]
    fn test_update_replaces_and_versions() {
        let store = PeerStore::new();
        let applied = store.update_peers(make_peers(&["10.0.0.1:80", "10.0.0.2:80"]), 1);
        assert_eq!(applied, 1);
        assert_eq!(store.peer_count(), 2);
        assert_eq!(store.version(), 1);
    }

    #[test]
    fn test_update_is_full_sync() {
        let store = PeerStore::new();
        store.update_peers(make_peers(&["10.0.0.1:80", "10.0.0.2:80"]), 1);
        store.update_peers(make_peers(&["10.0.0.3:80"]), 2);
        let snapshot = store.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].address, "10.0.0.3:80");
        assert_eq!(store.version(), 2);
    }

    #[test]
    fn test_insertion_order_is_preserved() {
        let store = PeerStore::new();
        store.update_peers(make_peers(&["10.0.0.3:80", "10.0.0.1:80", "10.0.0.2:80"]), 1);
        let addresses: Vec<_> = store.snapshot().iter().map(|p| p.address.clone()).collect();
        assert_eq!(addresses, vec!["10.0.0.3:80", "10.0.0.1:80", "10.0.0.2:80"]);
    }

    // ========== Phase 2: Snapshot Semantics ==========

    #[test]
    fn test_snapshot_survives_replacement() {
        let store = PeerStore::new();
        store.update_peers(make_peers(&["10.0.0.1:80"]), 1);
        let snapshot = store.snapshot();
        store.update_peers(make_peers(&["10.0.0.2:80"]), 2);
        // The old snapshot is untouched; new readers see the new set.
        assert_eq!(snapshot[0].address, "10.0.0.1:80");
        assert_eq!(store.snapshot()[0].address, "10.0.0.2:80");
    }

    #[test]
    fn test_snapshots_share_storage() {
        let store = PeerStore::new();
        store.update_peers(make_peers(&["10.0.0.1:80"]), 1);
        let a = store.snapshot();
        let b = store.snapshot();
        assert!(Arc::ptr_eq(&a, &b));
    }

    // ========== Phase 3: Concurrency ==========

    #[test]
    fn test_concurrent_readers_and_writer() {
        let store = Arc::new(PeerStore::new());
        store.update_peers(make_peers(&["10.0.0.1:80"]), 1);

        let writer = {
            let store = Arc::clone(&store);
            std::thread::spawn(move || {
                for version in 2..50 {
                    store.update_peers(make_peers(&["10.0.0.1:80", "10.0.0.2:80"]), version);
                }
            })
        };

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        let snapshot = store.snapshot();
                        assert!(!snapshot.is_empty());
                    }
                })
            })
            .collect();

        writer.join().unwrap();
        for reader in readers {
            reader.join().unwrap();
        }
        assert_eq!(store.version(), 49);
    }

    #[test]
    fn test_store_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<PeerStore>();
    }
}
