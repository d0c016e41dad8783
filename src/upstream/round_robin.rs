//! Round-robin peer provision and health tracking.
//!
//! This is the plain rotation the sticky selector falls back to whenever
//! an inbound affinity token cannot be honored. The [`PeerProvider`]
//! trait is the seam between the two layers: the selector only ever asks
//! for "the next usable peer" and treats the answer as atomic.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use dashmap::DashMap;

use super::peer::Peer;

/// Hands out the next peer from a pool.
///
/// `None` means the pool is exhausted: empty, or nothing usable left.
pub trait PeerProvider: Send + Sync {
    fn next_peer<'a>(&self, peers: &'a [Peer]) -> Option<&'a Peer>;
}

#[derive(Debug, Clone, Copy, Default)]
struct PeerHealth {
    consecutive_failures: u32,
    down: bool,
}

/// Tracks connect-level peer health by address.
///
/// Thread-safe via DashMap. Unknown peers count as healthy. After
/// `failure_threshold` consecutive failures a peer is marked down; a
/// single success restores it.
pub struct HealthTracker {
    peers: DashMap<String, PeerHealth>,
    failure_threshold: u32,
}

impl HealthTracker {
    /// Creates a new tracker with the given failure threshold.
    pub fn new(failure_threshold: u32) -> Self {
        Self {
            peers: DashMap::new(),
            failure_threshold,
        }
    }

    /// Records a successful connection to a peer, restoring it fully.
    pub fn record_success(&self, address: &str) {
        self.peers.insert(address.to_string(), PeerHealth::default());
    }

    /// Records a failed connection attempt to a peer.
    pub fn record_failure(&self, address: &str) {
        let mut entry = self.peers.entry(address.to_string()).or_default();
        entry.consecutive_failures += 1;
        if entry.consecutive_failures >= self.failure_threshold {
            entry.down = true;
        }
    }

    /// Whether a peer is currently usable.
    pub fn is_healthy(&self, address: &str) -> bool {
        self.peers.get(address).map(|h| !h.down).unwrap_or(true)
    }

    /// Forgets everything recorded about a peer.
    pub fn reset(&self, address: &str) {
        self.peers.remove(address);
    }

    /// Number of peers in the given set that are currently usable.
    pub fn healthy_count(&self, peers: &[Peer]) -> usize {
        peers
            .iter()
            .filter(|p| self.is_healthy(&p.address))
            .count()
    }
}

/// Weighted round-robin rotation over the healthy subset of a pool.
///
/// Thread-safe: the atomic cursor is the single point of mutation shared
/// by in-flight requests. Down peers are skipped; when every peer is down
/// the provider returns `None` rather than guessing.
pub struct RoundRobin {
    cursor: AtomicUsize,
    health: Arc<HealthTracker>,
}

impl RoundRobin {
    /// Creates a new rotation sharing the given health tracker.
    pub fn new(health: Arc<HealthTracker>) -> Self {
        Self {
            cursor: AtomicUsize::new(0),
            health,
        }
    }

    /// Handle to the shared health tracker.
    pub fn health_tracker(&self) -> &Arc<HealthTracker> {
        &self.health
    }
}

impl PeerProvider for RoundRobin {
    /// Selects the next peer in rotation.
    ///
    /// Healthy peers are repeated by weight (zero counts as one) and the
    /// cursor walks that expansion, so a weight-2 peer takes two turns
    /// per cycle.
    fn next_peer<'a>(&self, peers: &'a [Peer]) -> Option<&'a Peer> {
        let rotation: Vec<&Peer> = peers
            .iter()
            .filter(|p| self.health.is_healthy(&p.address))
            .flat_map(|p| std::iter::repeat_n(p, p.weight.max(1) as usize))
            .collect();

        if rotation.is_empty() {
            return None;
        }

        let idx = self.cursor.fetch_add(1, Ordering::Relaxed) % rotation.len();
        Some(rotation[idx])
    }
}
