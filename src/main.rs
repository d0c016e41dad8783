//! Cookie-affinity reverse proxy over a round-robin upstream pool.
//!
//! The pool and sticky policy come from a JSON config file. A client's
//! first response carries an affinity cookie naming the chosen backend;
//! later requests are pinned to that backend until the pin can no longer
//! be honored, at which point selection falls back to plain round-robin
//! and a fresh cookie is issued.

mod config;
mod health;
mod proxy;
mod sticky;
mod store;
mod upstream;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use pingora_core::server::Server;
use pingora_proxy::http_proxy_service;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::ProxyConfig;
use crate::proxy::StickyGateway;
use crate::sticky::{StickyCookie, StickySelector};
use crate::store::PeerStore;
use crate::upstream::{HealthTracker, RoundRobin};

fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "sticky-route.json".to_string());
    let config = ProxyConfig::load(&config_path)?;

    let store = Arc::new(PeerStore::new());
    store.update_peers(config.peers(), 1);

    let health = Arc::new(HealthTracker::new(config.failure_threshold));
    let provider = RoundRobin::new(Arc::clone(&health));
    let selector = StickySelector::new(&config.sticky, health);
    let cookie = StickyCookie::new(&config.sticky);
    let gateway = StickyGateway::new(Arc::clone(&store), provider, selector, cookie);

    let probe_addr: SocketAddr = config
        .probe_listen
        .parse()
        .with_context(|| format!("invalid probe address '{}'", config.probe_listen))?;
    let probe_store = Arc::clone(&store);
    std::thread::spawn(move || run_probe_server(probe_addr, probe_store));

    tracing::info!(
        listen = %config.listen,
        peers = config.upstreams.len(),
        cookie = %config.sticky.cookie_name,
        "sticky-route starting"
    );

    let mut server = Server::new(None).map_err(|e| anyhow!("failed to initialize server: {e}"))?;
    server.bootstrap();

    let mut service = http_proxy_service(&server.configuration, gateway);
    service.add_tcp(&config.listen);
    server.add_service(service);

    server.run_forever();
}

/// Runs the probe server on its own single-threaded runtime; Pingora
/// owns the main threads.
fn run_probe_server(addr: SocketAddr, store: Arc<PeerStore>) {
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            tracing::error!(error = %e, "failed to build probe runtime");
            return;
        }
    };
    if let Err(e) = runtime.block_on(health::start_probe_server(addr, store)) {
        tracing::error!(error = %e, "probe server exited");
    }
}
