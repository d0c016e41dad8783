//! Shared state handed to request handlers.

mod peer_store;

pub use peer_store::PeerStore;
