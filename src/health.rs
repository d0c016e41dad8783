//! HTTP probe server for liveness and readiness.
//!
//! Provides `/healthz` (liveness) and `/readyz` (readiness) endpoints.
//! Readiness for this proxy means the peer store holds at least one
//! upstream peer to balance across.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use http_body_util::Full;
use hyper::body::Bytes;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;

use crate::store::PeerStore;

/// Handles probe requests.
///
/// Returns 200 "ok" for `/healthz` always, and for `/readyz` while the
/// peer store is non-empty (503 otherwise).
/// Returns 404 for all other paths.
pub async fn probe_handler(
    req: Request<hyper::body::Incoming>,
    store: Arc<PeerStore>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let response = match req.uri().path() {
        "/healthz" => ok_response(),
        "/readyz" => {
            if store.peer_count() > 0 {
                ok_response()
            } else {
                Response::builder()
                    .status(StatusCode::SERVICE_UNAVAILABLE)
                    .body(Full::new(Bytes::from("no upstream peers")))
                    .unwrap()
            }
        }
        _ => Response::builder()
            .status(StatusCode::NOT_FOUND)
            .body(Full::new(Bytes::from("not found")))
            .unwrap(),
    };
    Ok(response)
}

fn ok_response() -> Response<Full<Bytes>> {
    Response::builder()
        .status(StatusCode::OK)
        .body(Full::new(Bytes::from("ok")))
        .unwrap()
}

/// Starts the HTTP probe server on the given address.
///
/// Runs indefinitely, accepting connections and handling probe requests.
pub async fn start_probe_server(addr: SocketAddr, store: Arc<PeerStore>) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;

    loop {
        let (stream, _) = listener.accept().await?;
        let io = TokioIo::new(stream);
        let store = Arc::clone(&store);

        tokio::spawn(async move {
            let service = service_fn(move |req| probe_handler(req, Arc::clone(&store)));
            if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                tracing::debug!(error = %e, "probe connection error");
            }
        });
    }
}
