//! Pingora ProxyHttp implementation for sticky routing.
//!
//! Wires the sticky selection core into Pingora's proxy lifecycle: the
//! upstream is chosen in `upstream_peer`, the affinity cookie is written
//! in `response_filter`, and connect outcomes feed health tracking.

use std::sync::Arc;

use async_trait::async_trait;
use pingora_core::prelude::*;
use pingora_core::upstreams::peer::HttpPeer;
use pingora_http::ResponseHeader;
use pingora_proxy::{ProxyHttp, Session};

use crate::sticky::{SelectionContext, StickyCookie, StickySelector};
use crate::store::PeerStore;
use crate::upstream::{parse_peer_address, Peer, RoundRobin};

/// Per-request context for the sticky proxy.
///
/// Persists across upstream retries within one request. That is what
/// makes the at-most-one-pin rule hold: the embedded selection context
/// keeps its tried flag between `upstream_peer` calls.
#[derive(Default)]
pub struct StickyCtx {
    /// Selection scratch state, created on the first `upstream_peer` call.
    selection: Option<SelectionContext>,
    /// Peer-set snapshot the whole request selects against.
    peers: Option<Arc<Vec<Peer>>>,
    /// Address of the selected peer, for health tracking and logging.
    pub peer_address: Option<String>,
    /// Token waiting to be written as `Set-Cookie` on the response.
    pending_token: Option<String>,
    /// Whether the final selection honored the inbound token.
    pinned: bool,
    /// Whether a cookie was actually written to the response.
    cookie_issued: bool,
}

/// Sticky-session proxy over a round-robin upstream pool.
///
/// Implements Pingora's ProxyHttp trait. The peer store supplies the
/// pool, the selector decides pin-or-rotate, the cookie adapter carries
/// the affinity token across the HTTP boundary.
pub struct StickyGateway {
    store: Arc<PeerStore>,
    provider: RoundRobin,
    selector: StickySelector,
    cookie: StickyCookie,
}

impl StickyGateway {
    /// Creates a new gateway from its assembled collaborators.
    pub fn new(
        store: Arc<PeerStore>,
        provider: RoundRobin,
        selector: StickySelector,
        cookie: StickyCookie,
    ) -> Self {
        Self {
            store,
            provider,
            selector,
            cookie,
        }
    }

    /// Creates an HttpPeer for a selected upstream.
    fn peer_to_upstream(peer: &Peer) -> Result<HttpPeer> {
        let addr = parse_peer_address(&peer.address)
            .map_err(|e| Error::explain(ErrorType::InternalError, e))?;
        Ok(HttpPeer::new(addr, false, String::new()))
    }
}

#[async_trait]
impl ProxyHttp for StickyGateway {
    type CTX = StickyCtx;

    fn new_ctx(&self) -> Self::CTX {
        StickyCtx::default()
    }

    async fn upstream_peer(
        &self,
        session: &mut Session,
        ctx: &mut Self::CTX,
    ) -> Result<Box<HttpPeer>> {
        // First call for this request: capture the inbound token and a
        // stable view of the pool. Retries reuse both.
        let inbound = self
            .cookie
            .inbound(&session.req_header().headers)
            .map(str::to_owned);
        let selection = ctx
            .selection
            .get_or_insert_with(|| SelectionContext::new(inbound.as_deref()));
        let peers = ctx
            .peers
            .get_or_insert_with(|| self.store.snapshot())
            .clone();

        let outcome = self
            .selector
            .select(selection, &peers, &self.provider)
            .map_err(|e| Error::explain(ErrorType::HTTPStatus(503), e.to_string()))?;

        ctx.peer_address = Some(outcome.peer.address.clone());
        ctx.pinned = outcome.pinned;
        if let Some(token) = outcome.fresh_token {
            ctx.pending_token = Some(token);
        }

        let peer = Self::peer_to_upstream(outcome.peer)?;
        Ok(Box::new(peer))
    }

    async fn response_filter(
        &self,
        _session: &mut Session,
        upstream_response: &mut ResponseHeader,
        ctx: &mut Self::CTX,
    ) -> Result<()>
    where
        Self::CTX: Send + Sync,
    {
        // take() guarantees at most one affinity cookie per request. An
        // illegal rendered directive drops the cookie, never the response.
        if let Some(token) = ctx.pending_token.take() {
            if let Some(value) = self.cookie.header_value(&token) {
                upstream_response.append_header("Set-Cookie", value)?;
                ctx.cookie_issued = true;
            }
        }
        Ok(())
    }

    async fn connected_to_upstream(
        &self,
        _session: &mut Session,
        _reused: bool,
        _peer: &HttpPeer,
        _fd: std::os::unix::io::RawFd,
        _digest: Option<&pingora_core::protocols::Digest>,
        ctx: &mut Self::CTX,
    ) -> Result<()> {
        // Record successful connection for health tracking
        if let Some(ref addr) = ctx.peer_address {
            self.provider.health_tracker().record_success(addr);
        }
        Ok(())
    }

    fn fail_to_connect(
        &self,
        _session: &mut Session,
        _peer: &HttpPeer,
        ctx: &mut Self::CTX,
        e: Box<Error>,
    ) -> Box<Error> {
        // Record failed connection for health tracking
        if let Some(ref addr) = ctx.peer_address {
            self.provider.health_tracker().record_failure(addr);
        }
        e
    }

    async fn logging(&self, session: &mut Session, _e: Option<&Error>, ctx: &mut Self::CTX) {
        let status = session
            .response_written()
            .map(|r| r.status.as_u16())
            .unwrap_or(0);

        let method = session.req_header().method.as_str();
        let path = session.req_header().uri.path();
        let peer = ctx.peer_address.as_deref().unwrap_or("-");

        tracing::info!(
            method = method,
            path = path,
            status = status,
            peer = peer,
            pinned = ctx.pinned,
            cookie_issued = ctx.cookie_issued,
            "request completed"
        );
    }
}
