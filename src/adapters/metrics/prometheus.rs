//! Prometheus Metrics Registry - Exchange Observability
//!
//! Registers and exposes Prometheus metrics for Grafana dashboards.
//! Covers race transitions, pool size, ticket settlement, payouts,
//! wallet state and loop tick latency.

use std::sync::Arc;

use axum::Router;
use axum::http::StatusCode;
use axum::routing::get;
use prometheus::{
    Counter, Encoder, Gauge, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge,
    Opts, Registry, TextEncoder,
};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use tokio::sync::broadcast;
use tracing::{info, instrument, warn};

use crate::domain::WalletStatus;

/// Centralized Prometheus metrics for the exchange.
///
/// All metrics follow the naming convention `dograce_*`.
pub struct MetricsRegistry {
    /// Prometheus registry.
    registry: Registry,
    /// Successful race transitions by stage.
    pub race_transitions: IntCounterVec,
    /// Race transitions that failed or were skipped, by stage and reason.
    pub race_transition_misses: IntCounterVec,
    /// Races created to keep the pool topped up.
    pub races_created: IntCounter,
    /// Races currently open for betting.
    pub active_races: IntGauge,
    /// Tickets settled by outcome (won, lost, failed).
    pub tickets_settled: IntCounterVec,
    /// Cumulative payouts credited to the wallet.
    pub payouts_total: Counter,
    /// Wallet available balance.
    pub wallet_balance: Gauge,
    /// Wallet reserved funds.
    pub wallet_reserved: Gauge,
    /// Loop tick duration in seconds.
    pub tick_duration_seconds: HistogramVec,
}

impl MetricsRegistry {
    /// Create and register all Prometheus metrics.
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let race_transitions = IntCounterVec::new(
            Opts::new("dograce_race_transitions_total", "Race state transitions applied"),
            &["stage"],
        )?;

        let race_transition_misses = IntCounterVec::new(
            Opts::new(
                "dograce_race_transition_misses_total",
                "Due race transitions that were skipped or failed",
            ),
            &["stage", "reason"],
        )?;

        let races_created = IntCounter::new("dograce_races_created_total", "Races scheduled")?;

        let active_races = IntGauge::new("dograce_active_races", "Races open for betting")?;

        let tickets_settled = IntCounterVec::new(
            Opts::new("dograce_tickets_settled_total", "Ticket settlement attempts by outcome"),
            &["outcome"],
        )?;

        let payouts_total =
            Counter::new("dograce_payouts_total", "Cumulative payouts credited to the wallet")?;

        let wallet_balance = Gauge::new("dograce_wallet_balance", "Wallet available balance")?;

        let wallet_reserved = Gauge::new("dograce_wallet_reserved", "Wallet reserved funds")?;

        let tick_duration_seconds = HistogramVec::new(
            HistogramOpts::new("dograce_tick_duration_seconds", "Scheduler tick duration")
                .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
            &["loop"],
        )?;

        // Register all metrics
        registry.register(Box::new(race_transitions.clone()))?;
        registry.register(Box::new(race_transition_misses.clone()))?;
        registry.register(Box::new(races_created.clone()))?;
        registry.register(Box::new(active_races.clone()))?;
        registry.register(Box::new(tickets_settled.clone()))?;
        registry.register(Box::new(payouts_total.clone()))?;
        registry.register(Box::new(wallet_balance.clone()))?;
        registry.register(Box::new(wallet_reserved.clone()))?;
        registry.register(Box::new(tick_duration_seconds.clone()))?;

        Ok(Self {
            registry,
            race_transitions,
            race_transition_misses,
            races_created,
            active_races,
            tickets_settled,
            payouts_total,
            wallet_balance,
            wallet_reserved,
            tick_duration_seconds,
        })
    }

    pub fn record_transitions(&self, stage: &str, transitioned: usize, skipped: usize, failed: usize) {
        self.race_transitions
            .with_label_values(&[stage])
            .inc_by(transitioned as u64);
        self.race_transition_misses
            .with_label_values(&[stage, "skipped"])
            .inc_by(skipped as u64);
        self.race_transition_misses
            .with_label_values(&[stage, "failed"])
            .inc_by(failed as u64);
    }

    pub fn record_pool(&self, created: usize, active: usize) {
        self.races_created.inc_by(created as u64);
        self.active_races.set(i64::try_from(active).unwrap_or(i64::MAX));
    }

    pub fn record_settlement(&self, won: usize, lost: usize, failed: usize, payouts: Decimal) {
        self.tickets_settled.with_label_values(&["won"]).inc_by(won as u64);
        self.tickets_settled.with_label_values(&["lost"]).inc_by(lost as u64);
        self.tickets_settled.with_label_values(&["failed"]).inc_by(failed as u64);
        self.payouts_total.inc_by(payouts.to_f64().unwrap_or(0.0));
    }

    pub fn record_wallet(&self, status: &WalletStatus) {
        self.wallet_balance.set(status.balance.to_f64().unwrap_or(0.0));
        self.wallet_reserved.set(status.reserved.to_f64().unwrap_or(0.0));
    }

    pub fn observe_tick(&self, loop_name: &str, seconds: f64) {
        self.tick_duration_seconds
            .with_label_values(&[loop_name])
            .observe(seconds);
    }

    /// Encode every registered metric in the text exposition format.
    pub fn render(&self) -> anyhow::Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }

    /// Serve Prometheus metrics on the configured bind address.
    #[instrument(skip(self, shutdown_rx))]
    pub async fn serve(
        self: Arc<Self>,
        bind_address: String,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) -> anyhow::Result<()> {
        let metrics_self = Arc::clone(&self);

        let app = Router::new().route(
            "/metrics",
            get(move || {
                let metrics = Arc::clone(&metrics_self);
                async move {
                    match metrics.render() {
                        Ok(body) => (StatusCode::OK, body),
                        Err(e) => {
                            warn!(error = %e, "Failed to encode metrics");
                            (StatusCode::INTERNAL_SERVER_ERROR, String::new())
                        }
                    }
                }
            }),
        );

        let listener = tokio::net::TcpListener::bind(&bind_address).await?;
        info!(address = %bind_address, "Prometheus metrics server started");

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
            })
            .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_render_contains_recorded_values() {
        let metrics = MetricsRegistry::new().unwrap();
        metrics.record_transitions("finish", 2, 1, 0);
        metrics.record_pool(3, 7);
        metrics.record_settlement(1, 2, 0, dec!(25));
        metrics.record_wallet(&WalletStatus {
            balance: dec!(125),
            reserved: dec!(0),
            total_funds: dec!(125),
        });

        let body = metrics.render().unwrap();
        assert!(body.contains("dograce_race_transitions_total{stage=\"finish\"} 2"));
        assert!(body.contains("dograce_races_created_total 3"));
        assert!(body.contains("dograce_active_races 7"));
        assert!(body.contains("dograce_tickets_settled_total{outcome=\"lost\"} 2"));
        assert!(body.contains("dograce_payouts_total 25"));
        assert!(body.contains("dograce_wallet_balance 125"));
    }
}
