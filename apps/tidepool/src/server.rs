use std::future::Future;
use std::net::SocketAddr;

use anyhow::{Context, Result};
use axum::{routing::get, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::Config;
use crate::events::{Subscription, SubscriptionId};
use crate::handlers::{health_check, relay_stats, render_metrics};
use crate::relay::Relay;
use crate::websocket::websocket_handler;

/// A relay bound to its listening socket, ready to serve.
pub struct RelayServer {
    relay: Relay,
    listener: TcpListener,
    local_addr: SocketAddr,
    metrics: Option<PrometheusHandle>,
}

impl RelayServer {
    pub async fn bind(config: Config) -> Result<Self> {
        let addr = config.listen_addr();
        let listener = TcpListener::bind(&addr)
            .await
            .with_context(|| format!("failed to bind to {addr}"))?;
        let local_addr = listener
            .local_addr()
            .context("failed to read bound address")?;

        Ok(Self {
            relay: Relay::new(config),
            listener,
            local_addr,
            metrics: None,
        })
    }

    /// Serve `/metrics` from an installed Prometheus recorder.
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    /// The port actually bound, which differs from the configured one when
    /// that was 0.
    pub fn port(&self) -> u16 {
        self.local_addr.port()
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn relay(&self) -> &Relay {
        &self.relay
    }

    pub fn subscribe(&self) -> Subscription {
        self.relay.subscribe()
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.relay.unsubscribe(id)
    }

    pub fn router(&self) -> Router {
        let relay_routes = Router::new()
            .route("/health", get(health_check))
            .route("/stats", get(relay_stats))
            .route("/ws", get(websocket_handler))
            .with_state(self.relay.clone());

        let mut app = Router::new().merge(relay_routes);
        if let Some(handle) = &self.metrics {
            app = app.merge(
                Router::new()
                    .route("/metrics", get(render_metrics))
                    .with_state(handle.clone()),
            );
        }

        app.layer(CorsLayer::permissive())
            .layer(TraceLayer::new_for_http())
    }

    pub async fn serve(self) -> Result<()> {
        self.serve_with_shutdown(std::future::pending()).await
    }

    pub async fn serve_with_shutdown<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let app = self.router();
        let sweeper = self.relay.spawn_sweeper();

        info!("Tidepool listening on {}", self.local_addr);
        let result = axum::serve(
            self.listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown)
        .await
        .context("server shutdown with error");

        if let Some(sweeper) = sweeper {
            sweeper.abort();
        }
        result
    }
}
