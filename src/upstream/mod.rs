//! Upstream peer pool: the round-robin collaborator the sticky layer
//! falls back to, plus connect-level health tracking.

mod peer;
mod round_robin;

pub use peer::{parse_peer_address, Peer};
pub use round_robin::{HealthTracker, PeerProvider, RoundRobin};
