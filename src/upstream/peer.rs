//! Upstream peer model.
//!
//! A peer is one backend in the load-balancing pool, identified by its
//! `IP:PORT` address string. The address is the peer's stable identity:
//! the sticky layer derives affinity tokens from exactly these bytes, so
//! two entries with the same address count as the same backend.

use std::net::SocketAddr;

/// A backend server in the upstream pool.
///
/// Immutable for the selection layer; mutable per-peer state (health)
/// lives in [`HealthTracker`](super::HealthTracker), keyed by address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Peer {
    /// Network address in `IP:PORT` form (e.g. "10.0.0.1:8080").
    pub address: String,
    /// Round-robin weight. Zero is treated as one by the rotation.
    pub weight: u32,
}

impl Peer {
    /// Creates a new peer with the given address and weight.
    pub fn new(address: impl Into<String>, weight: u32) -> Self {
        Self {
            address: address.into(),
            weight,
        }
    }
}

/// Parses a peer address string into a SocketAddr.
///
/// Expects format "IP:PORT" (e.g., "192.168.1.1:8080" or "[::1]:8080").
/// Returns an error if the address is invalid or missing a port.
pub fn parse_peer_address(address: &str) -> Result<SocketAddr, String> {
    address
        .parse::<SocketAddr>()
        .map_err(|e| format!("invalid peer address '{}': {}", address, e))
}
