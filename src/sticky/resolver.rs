//! Affinity token resolution against the peer set.

use serde::Deserialize;

use crate::upstream::Peer;

use super::digest::peer_digest;

/// How an inbound token is compared against a peer digest.
///
/// Under `Prefix`, the default, a peer matches when its digest is a
/// leading prefix of the token, which tolerates tokens that picked up
/// trailing metadata on their way through other layers. `Exact` requires
/// the whole token to equal the digest.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchPolicy {
    #[default]
    Prefix,
    Exact,
}

/// Finds the peer an inbound token is pinned to, if any.
///
/// Scans `peers` front to back, re-deriving each candidate's digest and
/// comparing it under `policy`; the first match wins, so duplicate
/// addresses resolve to the earliest entry. Peers whose digest cannot be
/// computed are skipped. Health is deliberately not consulted here:
/// whether a matched-but-down peer is usable is the selector's call.
///
/// Returns `None` for an empty token or when the scan finds no match.
/// Cost is bounded by one digest per peer.
pub fn resolve<'a>(token: &str, peers: &'a [Peer], policy: MatchPolicy) -> Option<&'a Peer> {
    if token.is_empty() {
        return None;
    }

    for peer in peers {
        let digest = match peer_digest(&peer.address) {
            Ok(digest) => digest,
            Err(e) => {
                tracing::debug!(peer = %peer.address, error = %e, "peer has no digest, skipping");
                continue;
            }
        };

        let matched = match policy {
            MatchPolicy::Prefix => token.as_bytes().starts_with(digest.as_bytes()),
            MatchPolicy::Exact => token == digest,
        };
        if matched {
            return Some(peer);
        }
    }

    None
}
