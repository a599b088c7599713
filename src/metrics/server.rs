//! Prometheus endpoint for the loader.
//!
//! Serves the recorder's text format on `/metrics` and a liveness check on
//! `/health` for the duration of a run. The listener is bound before `init`
//! returns so a busy port fails the run up front.

use axum::{Extension, Router, routing::get};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use snafu::prelude::*;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, error};

use crate::error::{MetricsBindSnafu, MetricsError, PrometheusInitSnafu};

/// Running metrics endpoint. Dropping it without `shutdown` leaves the
/// server running until the runtime exits.
pub struct MetricsServer {
    local_addr: SocketAddr,
    stop: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl MetricsServer {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop accepting scrapes and wait for the server task.
    pub async fn shutdown(self) {
        let _ = self.stop.send(());
        if let Err(e) = self.task.await {
            error!("Metrics server task failed: {}", e);
        }
    }
}

/// Install the Prometheus recorder and serve it on `addr`.
pub async fn init(addr: SocketAddr) -> Result<MetricsServer, MetricsError> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .context(PrometheusInitSnafu)?;

    let listener = TcpListener::bind(addr)
        .await
        .context(MetricsBindSnafu { addr })?;
    let local_addr = listener.local_addr().context(MetricsBindSnafu { addr })?;

    let (stop, stopped) = oneshot::channel();
    let task = tokio::spawn(serve(listener, handle, stopped));
    debug!("Metrics endpoint listening on http://{}/metrics", local_addr);

    Ok(MetricsServer {
        local_addr,
        stop,
        task,
    })
}

async fn serve(listener: TcpListener, handle: PrometheusHandle, stopped: oneshot::Receiver<()>) {
    let app = Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/health", get(health_handler))
        .layer(Extension(handle));

    let result = axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = stopped.await;
        })
        .await;
    if let Err(e) = result {
        error!("Metrics server error: {}", e);
    }
}

async fn metrics_handler(Extension(handle): Extension<PrometheusHandle>) -> String {
    handle.render()
}

async fn health_handler() -> &'static str {
    "ok\n"
}
