//! Health Check Server - Liveness and Readiness Probes
//!
//! Exposes /live and /ready endpoints via axum 0.7 for Docker
//! health checks and monitoring. Readiness requires both scheduler
//! loops to be running and the store to be answering.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use tokio::sync::broadcast;
use tracing::{info, instrument};

/// Shared health state polled by readiness probes.
#[derive(Debug)]
pub struct HealthState {
    /// Whether the lifecycle loop is running.
    pub lifecycle_running: AtomicBool,
    /// Whether the settlement loop is running.
    pub settlement_running: AtomicBool,
    /// Whether the last store interaction succeeded.
    pub store_healthy: AtomicBool,
}

impl Default for HealthState {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthState {
    /// Loops start stopped; the store is assumed healthy until a tick fails.
    pub const fn new() -> Self {
        Self {
            lifecycle_running: AtomicBool::new(false),
            settlement_running: AtomicBool::new(false),
            store_healthy: AtomicBool::new(true),
        }
    }

    pub fn set_lifecycle_running(&self, running: bool) {
        self.lifecycle_running.store(running, Ordering::Relaxed);
    }

    pub fn set_settlement_running(&self, running: bool) {
        self.settlement_running.store(running, Ordering::Relaxed);
    }

    pub fn set_store_healthy(&self, healthy: bool) {
        self.store_healthy.store(healthy, Ordering::Relaxed);
    }

    /// Check if the exchange is ready to serve traffic.
    pub fn is_ready(&self) -> bool {
        self.lifecycle_running.load(Ordering::Relaxed)
            && self.settlement_running.load(Ordering::Relaxed)
            && self.store_healthy.load(Ordering::Relaxed)
    }
}

/// Axum-based health check HTTP server.
pub struct HealthServer {
    /// Health state shared with the scheduler.
    state: Arc<HealthState>,
    /// Bind address, e.g. `0.0.0.0:8080`.
    bind_address: String,
}

impl HealthServer {
    pub fn new(state: Arc<HealthState>, bind_address: impl Into<String>) -> Self {
        Self {
            state,
            bind_address: bind_address.into(),
        }
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/live", get(Self::liveness))
            .route("/ready", get(Self::readiness))
            .with_state(Arc::clone(&self.state))
    }

    /// Start the health check server.
    #[instrument(skip(self, shutdown_rx))]
    pub async fn run(self, mut shutdown_rx: broadcast::Receiver<()>) -> anyhow::Result<()> {
        let app = self.router();
        let listener = tokio::net::TcpListener::bind(&self.bind_address).await?;

        info!(address = %self.bind_address, "Health server started");

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
            })
            .await?;

        Ok(())
    }

    /// Liveness probe: always returns 200 if the process is running.
    async fn liveness() -> impl IntoResponse {
        (StatusCode::OK, "OK")
    }

    /// Readiness probe: 200 only while both loops run on a healthy store.
    async fn readiness(State(state): State<Arc<HealthState>>) -> impl IntoResponse {
        if state.is_ready() {
            (StatusCode::OK, "READY")
        } else {
            (StatusCode::SERVICE_UNAVAILABLE, "NOT READY")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ready_requires_both_loops_and_store() {
        let state = HealthState::new();
        assert!(!state.is_ready());

        state.set_lifecycle_running(true);
        assert!(!state.is_ready());
        state.set_settlement_running(true);
        assert!(state.is_ready());

        state.set_store_healthy(false);
        assert!(!state.is_ready());
    }
}
