//! Affinity token derivation.
//!
//! A token is the lowercase hex MD5 of a peer's raw address bytes: 32
//! characters, stable across calls and restarts, identical addresses
//! always yielding identical tokens. That determinism is what lets the
//! resolver re-derive and compare tokens without any lookup table. The
//! token names a backend; it is not a security boundary.

use thiserror::Error;

/// Longest peer address the digest accepts, in bytes.
pub const MAX_ADDRESS_LEN: usize = 255;

/// A peer address the digest refuses to process.
///
/// Locally recoverable: callers skip the peer (resolver) or the cookie
/// (selector) and carry on.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DigestError {
    #[error("peer address is empty")]
    EmptyAddress,
    #[error("peer address is {0} bytes, above the {MAX_ADDRESS_LEN}-byte limit")]
    AddressTooLong(usize),
}

/// Computes the affinity token for a peer address.
pub fn peer_digest(address: &str) -> Result<String, DigestError> {
    if address.is_empty() {
        return Err(DigestError::EmptyAddress);
    }
    if address.len() > MAX_ADDRESS_LEN {
        return Err(DigestError::AddressTooLong(address.len()));
    }

    let digest = md5::compute(address.as_bytes());
    Ok(hex::encode(digest.0))
}
