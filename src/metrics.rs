//! Prometheus metrics for the pool orchestrator.
//!
//! ## Usage
//!
//! Call [`init_metrics`] once at process startup **before** the first unit is
//! scheduled. The helper functions (`inc_unit`, `observe_schedule`, …) are
//! no-ops if `init_metrics` was never called, so the scheduler is always safe
//! to run — observability simply degrades gracefully.
//!
//! ## Metrics Exposed
//!
//! | Name | Type | Labels |
//! |------|------|--------|
//! | `orchestrator_units_total` | Counter | `pool` |
//! | `orchestrator_scale_events_total` | Counter | `pool`, `trigger` |
//! | `orchestrator_schedule_duration_seconds` | Histogram | `pool` |
//! | `orchestrator_pool_processors` | Gauge | `pool` |

use crate::OrchestratorError;
use prometheus::{
    CounterVec, Encoder, HistogramOpts, HistogramVec, IntGaugeVec, Opts, Registry, TextEncoder,
};
use std::sync::OnceLock;
use std::time::Duration;

// ── Internal metrics bundle ────────────────────────────────────────────────

/// All Prometheus metrics for the orchestrator, bundled together so they can
/// be stored in a single [`OnceLock`] and initialised atomically.
pub struct Metrics {
    /// Prometheus registry that owns all metric descriptors.
    pub registry: Registry,
    /// Total units scheduled per pool.
    pub units_total: CounterVec,
    /// Scale events by pool and trigger (`initial`, `emergency`,
    /// `imbalance`, `latency`).
    pub scale_events_total: CounterVec,
    /// Schedule-and-execute latency histogram per pool.
    pub schedule_duration: HistogramVec,
    /// Live processor count per pool.
    pub pool_processors: IntGaugeVec,
}

static METRICS: OnceLock<Metrics> = OnceLock::new();

// ── Initialisation ─────────────────────────────────────────────────────────

/// Initialise all Prometheus metrics and register them with a private
/// registry.
///
/// Must be called once at process startup before the first unit is
/// scheduled. Calling it a second time is a no-op (returns `Ok(())`).
///
/// # Errors
///
/// Returns [`OrchestratorError::ConfigError`] if metric construction or
/// registry registration fails (e.g., duplicate descriptor names).
///
/// # Panics
///
/// This function never panics.
pub fn init_metrics() -> Result<(), OrchestratorError> {
    if METRICS.get().is_some() {
        return Ok(());
    }

    let registry = Registry::new();

    let units_total = CounterVec::new(
        Opts::new("orchestrator_units_total", "Total units scheduled"),
        &["pool"],
    )
    .map_err(|e| OrchestratorError::ConfigError(format!("metrics init failed: {e}")))?;
    registry
        .register(Box::new(units_total.clone()))
        .map_err(|e| OrchestratorError::ConfigError(format!("metrics registration failed: {e}")))?;

    let scale_events_total = CounterVec::new(
        Opts::new(
            "orchestrator_scale_events_total",
            "Pool scale events by trigger",
        ),
        &["pool", "trigger"],
    )
    .map_err(|e| OrchestratorError::ConfigError(format!("metrics init failed: {e}")))?;
    registry
        .register(Box::new(scale_events_total.clone()))
        .map_err(|e| OrchestratorError::ConfigError(format!("metrics registration failed: {e}")))?;

    let schedule_duration = HistogramVec::new(
        HistogramOpts::new(
            "orchestrator_schedule_duration_seconds",
            "Schedule-and-execute duration per pool",
        ),
        &["pool"],
    )
    .map_err(|e| OrchestratorError::ConfigError(format!("metrics init failed: {e}")))?;
    registry
        .register(Box::new(schedule_duration.clone()))
        .map_err(|e| OrchestratorError::ConfigError(format!("metrics registration failed: {e}")))?;

    let pool_processors = IntGaugeVec::new(
        Opts::new("orchestrator_pool_processors", "Live processors per pool"),
        &["pool"],
    )
    .map_err(|e| OrchestratorError::ConfigError(format!("metrics init failed: {e}")))?;
    registry
        .register(Box::new(pool_processors.clone()))
        .map_err(|e| OrchestratorError::ConfigError(format!("metrics registration failed: {e}")))?;

    // If another thread raced us, the first one wins — both initializations
    // produce identical metric descriptors, so neither outcome is incorrect.
    let _ = METRICS.set(Metrics {
        registry,
        units_total,
        scale_events_total,
        schedule_duration,
        pool_processors,
    });

    Ok(())
}

/// Return a reference to the initialised [`Metrics`], or `None` if
/// [`init_metrics`] has not been called yet.
fn metrics() -> Option<&'static Metrics> {
    METRICS.get()
}

// ── Public helper functions ────────────────────────────────────────────────

/// Increment the scheduled-unit counter for a pool.
///
/// No-op if metrics have not been initialised.
///
/// # Panics
///
/// This function never panics.
pub fn inc_unit(pool: &str) {
    if let Some(m) = metrics() {
        if let Ok(c) = m.units_total.get_metric_with_label_values(&[pool]) {
            c.inc();
        }
    }
}

/// Increment the scale-event counter for a pool and trigger.
///
/// No-op if metrics have not been initialised.
///
/// # Panics
///
/// This function never panics.
pub fn inc_scale_event(pool: &str, trigger: &str) {
    if let Some(m) = metrics() {
        if let Ok(c) = m
            .scale_events_total
            .get_metric_with_label_values(&[pool, trigger])
        {
            c.inc();
        }
    }
}

/// Record the schedule-and-execute latency for a pool.
///
/// No-op if metrics have not been initialised.
///
/// # Panics
///
/// This function never panics.
pub fn observe_schedule(pool: &str, d: Duration) {
    if let Some(m) = metrics() {
        if let Ok(h) = m.schedule_duration.get_metric_with_label_values(&[pool]) {
            h.observe(d.as_secs_f64());
        }
    }
}

/// Set the live-processor gauge for a pool.
///
/// No-op if metrics have not been initialised.
///
/// # Panics
///
/// This function never panics.
pub fn set_processors(pool: &str, count: usize) {
    if let Some(m) = metrics() {
        if let Ok(g) = m.pool_processors.get_metric_with_label_values(&[pool]) {
            g.set(count as i64);
        }
    }
}

/// Gather all registered metrics as a raw list of metric families.
///
/// Returns an empty `Vec` if metrics have not been initialised.
///
/// # Panics
///
/// This function never panics.
pub fn gather() -> Vec<prometheus::proto::MetricFamily> {
    metrics().map_or_else(Vec::new, |m| m.registry.gather())
}

/// Gather and encode all metrics in the Prometheus text exposition format.
///
/// Returns an empty string if metrics have not been initialised or if
/// encoding fails. Observability degrades gracefully rather than panicking.
///
/// # Panics
///
/// This function never panics.
pub fn gather_metrics() -> String {
    let families = gather();
    if families.is_empty() {
        return String::new();
    }
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if encoder.encode(&families, &mut buffer).is_err() {
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}
