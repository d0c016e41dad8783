//! The Pingora-facing proxy layer.

mod gateway;

pub use gateway::StickyGateway;
