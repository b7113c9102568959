//! Configuration validation engine.
//!
//! ## Responsibility
//! Validate semantic constraints on a parsed [`OrchestratorConfig`] that
//! cannot be expressed through the type system alone (range checks,
//! cross-field invariants).
//!
//! ## Guarantees
//! - Every validation rule has at least one test that triggers it
//! - Validation collects *all* errors before returning (no short-circuit)
//! - Error messages include the field path and the invalid value
//!
//! ## NOT Responsible For
//! - Parsing TOML (that belongs to `loader`)
//! - File I/O (that belongs to `loader`)

use super::OrchestratorConfig;

/// Errors arising from configuration parsing, validation, or I/O.
///
/// # Panics
///
/// This type never panics.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// TOML parsing failed.
    #[error("Parse error in {file}: {source}")]
    Parse {
        /// Path of the file that failed to parse.
        file: String,
        /// Underlying TOML deserialization error.
        #[source]
        source: toml::de::Error,
    },

    /// One or more semantic validation rules failed.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// A specific field has an out-of-range or contradictory value.
    #[error("Field '{field}' has invalid value {value}: {reason}")]
    InvalidField {
        /// Dot-separated field path (e.g., "pool.load_threshold").
        field: String,
        /// String representation of the invalid value.
        value: String,
        /// Human-readable explanation of the constraint.
        reason: String,
    },

    /// File I/O error.
    #[error("IO error reading {file}: {source}")]
    Io {
        /// Path of the file that could not be read.
        file: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

impl From<ConfigError> for crate::OrchestratorError {
    fn from(err: ConfigError) -> Self {
        crate::OrchestratorError::ConfigError(err.to_string())
    }
}

/// Validate all semantic constraints on an [`OrchestratorConfig`].
///
/// Collects every violation before returning so the caller sees the full
/// scope of issues at once.
///
/// # Arguments
///
/// * `config` — The parsed config to validate.
///
/// # Returns
///
/// - `Ok(())` if all constraints pass.
/// - `Err(Vec<ConfigError>)` with every violation found.
///
/// # Panics
///
/// This function never panics.
pub fn validate(config: &OrchestratorConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    // ── Routing ──────────────────────────────────────────────────────
    if config.orchestrator.default_pool.trim().is_empty() {
        errors.push(ConfigError::InvalidField {
            field: "orchestrator.default_pool".into(),
            value: String::new(),
            reason: "default pool name must not be empty".into(),
        });
    }

    if config.orchestrator.system_window == 0 {
        errors.push(ConfigError::InvalidField {
            field: "orchestrator.system_window".into(),
            value: "0".into(),
            reason: "must hold at least 1 sample".into(),
        });
    }

    if config.orchestrator.pool_window == 0 {
        errors.push(ConfigError::InvalidField {
            field: "orchestrator.pool_window".into(),
            value: "0".into(),
            reason: "must hold at least 1 sample".into(),
        });
    }

    if config.orchestrator.latency_threshold_ms <= 0.0 {
        errors.push(ConfigError::InvalidField {
            field: "orchestrator.latency_threshold_ms".into(),
            value: config.orchestrator.latency_threshold_ms.to_string(),
            reason: "must be positive".into(),
        });
    }

    // ── Pool autoscaler ──────────────────────────────────────────────
    if !(0.0..1.0).contains(&config.pool.load_threshold) {
        errors.push(ConfigError::InvalidField {
            field: "pool.load_threshold".into(),
            value: config.pool.load_threshold.to_string(),
            reason: "must be in [0.0, 1.0)".into(),
        });
    }

    if config.pool.scale_factor < 2 {
        errors.push(ConfigError::InvalidField {
            field: "pool.scale_factor".into(),
            value: config.pool.scale_factor.to_string(),
            reason: "must be at least 2".into(),
        });
    }

    if config.pool.max_processors == 0 {
        errors.push(ConfigError::InvalidField {
            field: "pool.max_processors".into(),
            value: "0".into(),
            reason: "must be at least 1".into(),
        });
    }

    if config.pool.initial_size == 0 {
        errors.push(ConfigError::InvalidField {
            field: "pool.initial_size".into(),
            value: "0".into(),
            reason: "must be at least 1".into(),
        });
    }

    if config.pool.initial_size > config.pool.max_processors {
        errors.push(ConfigError::InvalidField {
            field: "pool.initial_size".into(),
            value: config.pool.initial_size.to_string(),
            reason: "must be \u{2264} pool.max_processors".into(),
        });
    }

    // ── Foundation layout ────────────────────────────────────────────
    if config.foundation.default_pools == 0 {
        errors.push(ConfigError::InvalidField {
            field: "foundation.default_pools".into(),
            value: "0".into(),
            reason: "must be at least 1".into(),
        });
    }

    if config.foundation.pool_size == 0 {
        errors.push(ConfigError::InvalidField {
            field: "foundation.pool_size".into(),
            value: "0".into(),
            reason: "must be at least 1".into(),
        });
    }

    // ── Stress fan-out ───────────────────────────────────────────────
    if config.stress.max_concurrency == 0 {
        errors.push(ConfigError::InvalidField {
            field: "stress.max_concurrency".into(),
            value: "0".into(),
            reason: "must be at least 1".into(),
        });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
