//! Prometheus metrics for harvesting runs
//!
//! Tracks, per source:
//! - run attempts, recoveries and final outcomes
//! - status signals folded by the aggregator
//! - active replicas in a pool and attempt duration
//!
//! # Usage
//!
//! Call `init_metrics()` at application startup to register all metrics.
//! Until then, or if registration fails, every recording function is a no-op.

use prometheus::{
    register_counter_vec, register_gauge_vec, register_histogram_vec, CounterVec, Encoder,
    GaugeVec, HistogramVec, TextEncoder,
};
use std::sync::OnceLock;

// ============================================================================
// Metrics Storage
// ============================================================================

struct HarvestMetrics {
    attempts: CounterVec,
    recoveries: CounterVec,
    finished: CounterVec,
    signals: CounterVec,
    active_replicas: GaugeVec,
    attempt_duration: HistogramVec,
}

static HARVEST_METRICS: OnceLock<HarvestMetrics> = OnceLock::new();

static METRICS_INIT_ATTEMPTED: OnceLock<bool> = OnceLock::new();

// ============================================================================
// Initialization
// ============================================================================

/// Register all metrics with the default Prometheus registry
///
/// Safe to call more than once; only the first call registers anything.
pub fn init_metrics() -> Result<(), Box<dyn std::error::Error>> {
    if METRICS_INIT_ATTEMPTED.get().is_some() {
        return Ok(());
    }
    METRICS_INIT_ATTEMPTED.set(true).ok();

    let metrics = HarvestMetrics {
        attempts: register_counter_vec!(
            "jurisharvest_run_attempts_total",
            "Run attempts started, including the first one",
            &["source"]
        )?,
        recoveries: register_counter_vec!(
            "jurisharvest_recoveries_total",
            "Recovery attempts scheduled after a failed run",
            &["source"]
        )?,
        finished: register_counter_vec!(
            "jurisharvest_runs_finished_total",
            "Runners that finished, by outcome",
            &["source", "outcome"]
        )?,
        signals: register_counter_vec!(
            "jurisharvest_status_signals_total",
            "Status signals applied, by kind",
            &["source", "kind"]
        )?,
        active_replicas: register_gauge_vec!(
            "jurisharvest_active_replicas",
            "Replicas currently running in the pool",
            &["source"]
        )?,
        attempt_duration: register_histogram_vec!(
            "jurisharvest_attempt_duration_seconds",
            "Wall time of a single run attempt",
            &["source"],
            vec![0.1, 0.5, 1.0, 5.0, 10.0, 30.0, 60.0, 300.0, 900.0, 3600.0]
        )?,
    };

    HARVEST_METRICS
        .set(metrics)
        .map_err(|_| "Harvest metrics already initialized")?;

    tracing::info!("Prometheus metrics initialized successfully");
    Ok(())
}

pub fn metrics_initialized() -> bool {
    HARVEST_METRICS.get().is_some()
}

// ============================================================================
// Recording
// ============================================================================

/// Encode all metrics to Prometheus text format
pub fn gather_metrics() -> Result<String, Box<dyn std::error::Error>> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}

pub fn record_attempt(source: &str) {
    if let Some(m) = HARVEST_METRICS.get() {
        m.attempts.with_label_values(&[source]).inc();
    }
}

pub fn record_recovery(source: &str) {
    if let Some(m) = HARVEST_METRICS.get() {
        m.recoveries.with_label_values(&[source]).inc();
    }
}

pub fn record_finished(source: &str, success: bool) {
    let Some(m) = HARVEST_METRICS.get() else {
        return;
    };

    let outcome = if success { "success" } else { "gave_up" };
    m.finished.with_label_values(&[source, outcome]).inc();
}

pub fn record_signal(source: &str, success: bool) {
    let Some(m) = HARVEST_METRICS.get() else {
        return;
    };

    let kind = if success { "success" } else { "failure" };
    m.signals.with_label_values(&[source, kind]).inc();
}

pub fn set_active_replicas(source: &str, active: usize) {
    if let Some(m) = HARVEST_METRICS.get() {
        m.active_replicas
            .with_label_values(&[source])
            .set(active as f64);
    }
}

/// Histogram timer guard that records duration on drop
pub struct MetricsTimer {
    timer: Option<prometheus::HistogramTimer>,
}

impl MetricsTimer {
    fn noop() -> Self {
        Self { timer: None }
    }
}

impl Drop for MetricsTimer {
    fn drop(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.stop_and_record();
        }
    }
}

pub fn start_attempt_timer(source: &str) -> MetricsTimer {
    match HARVEST_METRICS.get() {
        Some(m) => MetricsTimer {
            timer: Some(m.attempt_duration.with_label_values(&[source]).start_timer()),
        },
        None => MetricsTimer::noop(),
    }
}

// ============================================================================
// Tests
// ============================================================================
