//! Selection orchestration: pin first, round-robin fallback, token issue.
//!
//! One selection pass runs the whole affinity algorithm for a request.
//! If the request carried a token and this is the first pass, the
//! resolver tries to pin the request to the token's peer. In every other
//! case the round-robin provider picks, and a fresh token is derived from
//! the chosen peer's address so a cookie can be issued on the response.

use std::sync::Arc;

use thiserror::Error;

use crate::config::StickyConfig;
use crate::upstream::{HealthTracker, Peer, PeerProvider};

use super::digest::peer_digest;
use super::resolver::{resolve, MatchPolicy};

/// Per-request scratch state for the affinity algorithm.
///
/// Created when the request first needs an upstream and dropped with the
/// request. `tried_route` guarantees the pin runs at most once: it starts
/// true unless a non-empty token arrived, and flips to true the moment a
/// pin is attempted, before the outcome is known, so a failed pin is
/// never retried. Later selection calls for the same request (upstream
/// retries) go straight to round-robin.
#[derive(Debug)]
pub struct SelectionContext {
    route: Option<String>,
    tried_route: bool,
}

impl SelectionContext {
    /// Builds the context from the inbound affinity token, if any.
    ///
    /// An absent or empty token means there is nothing to pin to, so the
    /// context starts with the pin already marked attempted.
    pub fn new(inbound: Option<&str>) -> Self {
        Self {
            tried_route: inbound.map_or(true, str::is_empty),
            route: inbound.map(str::to_owned),
        }
    }

    /// Whether a pin attempt has already happened (or never could).
    pub fn pin_attempted(&self) -> bool {
        self.tried_route
    }

    /// The token this request carried, if any.
    pub fn route(&self) -> Option<&str> {
        self.route.as_deref()
    }
}

/// Outcome of one selection pass.
#[derive(Debug)]
pub struct Selection<'a> {
    /// The chosen upstream peer.
    pub peer: &'a Peer,
    /// Fresh token for the response cookie. `None` after a successful pin
    /// (the client's cookie is already right) and when the fallback
    /// peer's digest could not be computed (the request proceeds without
    /// a cookie).
    pub fresh_token: Option<String>,
    /// True when the peer was reached through the inbound token.
    pub pinned: bool,
}

/// Selection failure: the pool had nothing to offer.
///
/// Unlike a failed pin, which quietly degrades to round-robin, this is
/// fatal for the request.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum SelectError {
    #[error("upstream peer set is empty")]
    NoPeers,
    #[error("no usable upstream peer")]
    Exhausted,
}

/// The sticky peer-selection strategy.
///
/// Holds only policy and a handle to shared health state; everything
/// per-request lives in the caller's [`SelectionContext`], so one
/// selector instance serves all requests concurrently.
pub struct StickySelector {
    match_policy: MatchPolicy,
    pin_requires_healthy: bool,
    health: Arc<HealthTracker>,
}

impl StickySelector {
    /// Creates a new selector with the configured policy and the given
    /// health view.
    pub fn new(config: &StickyConfig, health: Arc<HealthTracker>) -> Self {
        Self {
            match_policy: config.match_policy,
            pin_requires_healthy: config.pin_requires_healthy,
            health,
        }
    }

    /// Selects an upstream peer for the current request.
    ///
    /// The first call on a token-bearing context attempts the pin; when
    /// the resolved peer is usable it is returned with `fresh_token:
    /// None`, leaving the client's cookie untouched. Every other case
    /// (no token, no match, pinned peer down, repeat calls) falls back to
    /// the provider and derives a fresh token from the chosen peer.
    ///
    /// Work per call is bounded: at most one resolver scan, one provider
    /// call and one digest derivation.
    pub fn select<'a>(
        &self,
        ctx: &mut SelectionContext,
        peers: &'a [Peer],
        provider: &dyn PeerProvider,
    ) -> Result<Selection<'a>, SelectError> {
        if !ctx.tried_route {
            // Flipped before the outcome is known so a failed pin cannot
            // be retried on re-entry.
            ctx.tried_route = true;
            if let Some(route) = ctx.route.as_deref() {
                match resolve(route, peers, self.match_policy) {
                    Some(peer) => {
                        if !self.pin_requires_healthy || self.health.is_healthy(&peer.address) {
                            tracing::debug!(peer = %peer.address, "request pinned to peer");
                            return Ok(Selection {
                                peer,
                                fresh_token: None,
                                pinned: true,
                            });
                        }
                        tracing::debug!(peer = %peer.address, "pinned peer is down, falling back");
                    }
                    None => {
                        tracing::debug!(route = %route, "token matches no peer, falling back");
                    }
                }
            }
        }

        let peer = match provider.next_peer(peers) {
            Some(peer) => peer,
            None if peers.is_empty() => return Err(SelectError::NoPeers),
            None => return Err(SelectError::Exhausted),
        };

        let fresh_token = match peer_digest(&peer.address) {
            Ok(token) => Some(token),
            Err(e) => {
                // The request still goes through, just without a cookie.
                tracing::debug!(peer = %peer.address, error = %e, "no token for fallback peer");
                None
            }
        };

        Ok(Selection {
            peer,
            fresh_token,
            pinned: false,
        })
    }
}
