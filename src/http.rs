//! HTTP server for Prometheus metrics and the network map.
//!
//! Runs on a separate tokio task and serves `/metrics` for Prometheus
//! scraping and `/map` with the current spanning tree as JSON.

use crate::sync::{MapEntry, SyncHandle};
use axum::extract::State;
use axum::http::StatusCode;
use axum::{Json, Router, routing::get};
use std::net::SocketAddr;

/// Handler for GET /metrics - returns Prometheus metrics in text format.
async fn metrics_handler() -> String {
    crate::metrics::gather_metrics()
}

/// Handler for GET /map - every known server, parents before children.
async fn map_handler(
    State(handle): State<SyncHandle>,
) -> Result<Json<Vec<MapEntry>>, StatusCode> {
    handle
        .map()
        .await
        .map(Json)
        .ok_or(StatusCode::SERVICE_UNAVAILABLE)
}

fn router(handle: SyncHandle) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/map", get(map_handler))
        .with_state(handle)
}

/// Run the HTTP server.
///
/// Binds to `0.0.0.0:port`. This is a long-running task that should be
/// spawned in the background.
pub async fn run_http_server(port: u16, handle: SyncHandle) {
    let app = router(handle);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Prometheus HTTP server listening on {}", addr);

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!("Failed to bind HTTP server on {}: {}", addr, e);
            return;
        }
    };

    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!("HTTP server error: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::EventBus;
    use crate::sync::{SyncManager, SyncSettings};
    use slirc_tree::{LocalServer, ManualClock, ServerId, SplitPolicy};

    #[tokio::test]
    async fn map_lists_the_local_server() {
        let (handle, rx) = SyncHandle::channel(8);
        let settings = SyncSettings {
            local: LocalServer {
                name: "hub.example".to_string(),
                sid: ServerId::new("0HB"),
                description: "Hub".to_string(),
                version: "slircd-tree-test".to_string(),
            },
            ping_freq: 60,
            ping_warn_time: 15,
            policy: SplitPolicy::default(),
        };
        let manager = SyncManager::new(settings, Box::new(ManualClock::new(0)), EventBus::new(4));
        tokio::spawn(manager.run(rx));

        let Json(entries) = map_handler(State(handle)).await.unwrap();
        let json = serde_json::to_value(&entries).unwrap();
        assert_eq!(json[0]["name"], "hub.example");
        assert_eq!(json[0]["sid"], "0HB");
        assert_eq!(json[0]["hops"], 0);
        assert_eq!(json[0]["bursting"], false);
    }

    #[tokio::test]
    async fn map_is_unavailable_without_a_manager() {
        let (handle, rx) = SyncHandle::channel(8);
        drop(rx);
        assert_eq!(
            map_handler(State(handle)).await.unwrap_err(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }
}
