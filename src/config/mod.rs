//! # Stage: Declarative Orchestrator Configuration
//!
//! ## Responsibility
//! Parse and validate TOML orchestrator configuration files. Operators tune
//! pool sizing, autoscaling thresholds, latency windows, and stress-test
//! caps declaratively and run the demo binary with:
//! ```text
//! cargo run -- orchestrator.toml
//! ```
//!
//! ## Guarantees
//! - Deterministic: same TOML input always produces the same
//!   `OrchestratorConfig`
//! - Validated: all semantic constraints are checked before a config is
//!   accepted
//! - Type-safe: invalid field combinations are caught at parse time via serde
//! - Schema-exportable: JSON Schema output enables IDE autocomplete
//!
//! ## NOT Responsible For
//! - Building pools from config (that belongs to `orchestrator`)
//! - Scheduling decisions (that belongs to `pool`)
//! - Metrics collection (that belongs to `metrics`)

pub mod loader;
pub mod validation;

use crate::pool::PoolSettings;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::time::Duration;

// ── Default value functions ──────────────────────────────────────────────

/// Default pool name used when `process` is called without one.
fn default_pool_name() -> String {
    "default".to_string()
}

/// Default system-wide latency window: 500 samples.
fn default_system_window() -> usize {
    500
}

/// Default per-pool latency window: 300 samples.
fn default_pool_window() -> usize {
    300
}

/// Default p95 threshold above which scale hints fire: 50ms.
fn default_latency_threshold_ms() -> f64 {
    50.0
}

/// Default processor count for lazily created pools.
fn default_initial_size() -> usize {
    3
}

/// Default imbalance ratio threshold.
fn default_load_threshold() -> f64 {
    0.8
}

/// Default scale-up multiplier.
fn default_scale_factor() -> usize {
    2
}

/// Default processor ceiling per pool.
fn default_max_processors() -> usize {
    100
}

/// Default scale-hint cooldown: 500ms.
fn default_hint_cooldown_ms() -> u64 {
    500
}

/// Default pool count for `rebuild_from_foundation`.
fn default_default_pools() -> usize {
    2
}

/// Default processor count per foundation pool.
fn default_foundation_pool_size() -> usize {
    5
}

/// Default concurrent stress-test permit count.
fn default_max_concurrency() -> usize {
    64
}

// ── Top-level config ─────────────────────────────────────────────────────

/// Root configuration for an orchestrator instance.
///
/// Deserialized from a TOML file and validated before use. Every field has
/// a documented default, so an empty file is a valid configuration.
///
/// # Example
///
/// ```toml
/// [orchestrator]
/// default_pool = "primary"
/// latency_threshold_ms = 25.0
///
/// [pool]
/// initial_size = 4
/// max_processors = 200
/// ```
///
/// # Panics
///
/// This type never panics during construction or access.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Routing defaults and latency windows.
    pub orchestrator: OrchestratorSection,
    /// Per-pool scheduler and autoscaler tunables.
    pub pool: PoolSection,
    /// Layout used by `rebuild_from_foundation`.
    pub foundation: FoundationSection,
    /// Stress-test concurrency cap.
    pub stress: StressSection,
}

// ── Sections ─────────────────────────────────────────────────────────────

/// Routing defaults and latency-window sizing.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(default)]
pub struct OrchestratorSection {
    /// Pool name used when `process` is called without one.
    pub default_pool: String,
    /// System-wide latency window capacity (samples).
    pub system_window: usize,
    /// Per-pool latency window capacity (samples).
    pub pool_window: usize,
    /// System p95 above which a scale hint fires, milliseconds.
    pub latency_threshold_ms: f64,
}

impl Default for OrchestratorSection {
    fn default() -> Self {
        Self {
            default_pool: default_pool_name(),
            system_window: default_system_window(),
            pool_window: default_pool_window(),
            latency_threshold_ms: default_latency_threshold_ms(),
        }
    }
}

/// Scheduler and autoscaler tunables applied to every pool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(default)]
pub struct PoolSection {
    /// Processor count for newly (lazily) created pools.
    pub initial_size: usize,
    /// Imbalance ratio above which a pool grows. Must be in `[0, 1)`.
    pub load_threshold: f64,
    /// Multiplier applied on scale-up. Must be ≥ 2.
    pub scale_factor: usize,
    /// Hard processor ceiling per pool.
    pub max_processors: usize,
    /// Minimum interval between accepted scale hints, milliseconds.
    pub hint_cooldown_ms: u64,
}

impl Default for PoolSection {
    fn default() -> Self {
        Self {
            initial_size: default_initial_size(),
            load_threshold: default_load_threshold(),
            scale_factor: default_scale_factor(),
            max_processors: default_max_processors(),
            hint_cooldown_ms: default_hint_cooldown_ms(),
        }
    }
}

impl PoolSection {
    /// Convert to runtime [`PoolSettings`].
    pub fn to_settings(&self) -> PoolSettings {
        PoolSettings {
            load_threshold: self.load_threshold,
            scale_factor: self.scale_factor,
            max_processors: self.max_processors,
            hint_cooldown: Duration::from_millis(self.hint_cooldown_ms),
            processor_delay: None,
        }
    }
}

/// Layout created by `rebuild_from_foundation`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(default)]
pub struct FoundationSection {
    /// Number of pools to create.
    pub default_pools: usize,
    /// Processors per created pool.
    pub pool_size: usize,
}

impl Default for FoundationSection {
    fn default() -> Self {
        Self {
            default_pools: default_default_pools(),
            pool_size: default_foundation_pool_size(),
        }
    }
}

/// Stress-test fan-out limits.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(default)]
pub struct StressSection {
    /// Maximum concurrently running stress iterations, independent of the
    /// requested iteration count.
    pub max_concurrency: usize,
}

impl Default for StressSection {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_matches_documented_defaults() {
        let config = OrchestratorConfig::default();
        assert_eq!(config.orchestrator.default_pool, "default");
        assert_eq!(config.orchestrator.system_window, 500);
        assert_eq!(config.orchestrator.pool_window, 300);
        assert_eq!(config.orchestrator.latency_threshold_ms, 50.0);
        assert_eq!(config.pool.initial_size, 3);
        assert_eq!(config.pool.load_threshold, 0.8);
        assert_eq!(config.pool.scale_factor, 2);
        assert_eq!(config.pool.max_processors, 100);
        assert_eq!(config.pool.hint_cooldown_ms, 500);
        assert_eq!(config.foundation.default_pools, 2);
        assert_eq!(config.foundation.pool_size, 5);
        assert_eq!(config.stress.max_concurrency, 64);
    }

    #[test]
    fn test_empty_toml_is_a_valid_config() {
        let config: OrchestratorConfig = toml::from_str("").unwrap();
        assert_eq!(config, OrchestratorConfig::default());
    }

    #[test]
    fn test_partial_toml_overrides_only_named_fields() {
        let config: OrchestratorConfig = toml::from_str(
            r#"
            [pool]
            max_processors = 8
            "#,
        )
        .unwrap();
        assert_eq!(config.pool.max_processors, 8);
        assert_eq!(
            config.pool.initial_size, 3,
            "untouched fields keep defaults"
        );
    }

    #[test]
    fn test_to_settings_converts_cooldown_to_duration() {
        let section = PoolSection {
            hint_cooldown_ms: 1250,
            ..PoolSection::default()
        };
        let settings = section.to_settings();
        assert_eq!(settings.hint_cooldown, Duration::from_millis(1250));
        assert!(settings.processor_delay.is_none());
    }

    #[test]
    fn test_config_round_trips_through_toml() {
        let config = OrchestratorConfig::default();
        let text = toml::to_string(&config).unwrap();
        let parsed: OrchestratorConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed, config);
    }
}
