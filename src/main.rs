//! slircd-tree - Straylight IRC spanning-tree link daemon.
//!
//! Links this server into an IRC network, keeps the tree of linked
//! servers up to date and tears down whatever is lost in a netsplit.

mod config;
mod error;
mod http;
mod metrics;
mod state;
mod sync;
mod telemetry;

use crate::config::Config;
use crate::state::{EventBus, TopologyEvent};
use crate::sync::link::{self, LinkContext};
use crate::sync::{SyncEvent, SyncHandle, SyncManager, SyncSettings, keepalive};
use slirc_tree::SystemClock;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

/// Queue depth of the sync manager.
const SYNC_QUEUE: usize = 4096;

/// Topology events buffered per subscriber.
const EVENT_BUS_CAPACITY: usize = 256;

/// Keepalive timer resolution.
const TICK: Duration = Duration::from_secs(1);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.toml".to_string());

    let config = Config::load(&config_path).map_err(|e| {
        eprintln!("Failed to load config {config_path}: {e}");
        e
    })?;

    telemetry::init_logging(&config.logging);

    if let Err(errors) = config::validate(&config) {
        for e in &errors {
            error!(error = %e, "Invalid configuration");
        }
        anyhow::bail!("{} configuration error(s) in {}", errors.len(), config_path);
    }

    info!(
        server = %config.server.name,
        network = %config.server.network,
        sid = %config.server.sid,
        "Starting slircd-tree"
    );

    let (handle, rx) = SyncHandle::channel(SYNC_QUEUE);

    // Prometheus metrics are optional.
    // Convention: metrics_port = 0 disables the HTTP endpoint (used by tests).
    let metrics_port = config.server.metrics_port.unwrap_or(9090);
    if metrics_port == 0 {
        info!("Metrics disabled");
    } else {
        metrics::init();
        info!("Metrics initialized");

        let handle = handle.clone();
        tokio::spawn(async move {
            http::run_http_server(metrics_port, handle).await;
        });
        info!(port = metrics_port, "Prometheus HTTP server started");
    }

    let bus = EventBus::new(EVENT_BUS_CAPACITY);
    spawn_event_logger(bus.subscribe());

    let manager = SyncManager::new(
        SyncSettings::from_config(&config),
        Box::new(SystemClock),
        bus,
    );
    let manager = tokio::spawn(manager.run(rx));

    tokio::spawn(keepalive::run_ticker(handle.clone(), TICK));
    info!("Keepalive timer started");

    let ctx = Arc::new(LinkContext::from_config(&config));

    if let Some(addr) = config.linking.listen {
        let handle = handle.clone();
        let ctx = Arc::clone(&ctx);
        tokio::spawn(async move {
            if let Err(e) = link::listen(handle, ctx, addr).await {
                error!(address = %addr, error = %e, "S2S listener failed");
            }
        });
    }

    // Start outgoing connections
    for block in config.links.iter().filter(|l| l.autoconnect) {
        tokio::spawn(link::autoconnect(handle.clone(), Arc::clone(&ctx), block.clone()));
    }

    tokio::signal::ctrl_c().await?;
    info!("Shutdown requested");
    handle
        .send(SyncEvent::Shutdown {
            reason: "Server shutting down".to_string(),
        })
        .await?;
    manager.await?;

    Ok(())
}

/// Log topology changes at a level operators can filter on.
fn spawn_event_logger(mut events: broadcast::Receiver<TopologyEvent>) {
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(TopologyEvent::ServerLinked { name, sid }) => {
                    info!(server = %name, %sid, "Server linked");
                }
                Ok(TopologyEvent::ServerStable { name }) => info!(server = %name, "Server synced"),
                Ok(TopologyEvent::ServerSplit { name, sid }) => {
                    info!(server = %name, %sid, "Server split");
                }
                Ok(TopologyEvent::UserQuit { uid, nick, reason }) => {
                    debug!(%uid, %nick, %reason, "User quit");
                }
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    warn!(missed, "Event logger fell behind");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });
}
