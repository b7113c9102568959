//! Configuration file loading.
//!
//! ## Responsibility
//! Read a TOML file from disk, parse it into an [`OrchestratorConfig`], and
//! run validation before returning. This is the primary entry point for
//! loading orchestrator configuration at startup.
//!
//! ## Guarantees
//! - A successfully loaded config is always validated
//! - I/O errors and parse errors are distinguished in the error type
//! - File path is included in every error message
//!
//! ## NOT Responsible For
//! - Defining the config schema (that belongs to `mod.rs`)

use std::path::Path;

use super::validation::{self, ConfigError};
use super::OrchestratorConfig;

/// Load an [`OrchestratorConfig`] from a TOML file.
///
/// Reads the file, parses it as TOML, and validates all semantic
/// constraints.
///
/// # Arguments
///
/// * `path` — Path to the TOML configuration file.
///
/// # Returns
///
/// - `Ok(OrchestratorConfig)` if the file is readable, well-formed, and
///   valid.
/// - `Err(ConfigError::Io)` if the file cannot be read.
/// - `Err(ConfigError::Parse)` if the TOML is malformed.
/// - `Err(ConfigError::Validation)` if semantic constraints are violated.
///
/// # Panics
///
/// This function never panics.
///
/// # Example
///
/// ```rust,ignore
/// use tokio_pool_orchestrator::config::loader::load_from_file;
/// use std::path::Path;
///
/// let config = load_from_file(Path::new("orchestrator.toml"))?;
/// println!("Default pool: {}", config.orchestrator.default_pool);
/// ```
pub fn load_from_file(path: &Path) -> Result<OrchestratorConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
        file: path.display().to_string(),
        source: e,
    })?;

    load_from_str(&content, &path.display().to_string())
}

/// Load an [`OrchestratorConfig`] from a TOML string.
///
/// Useful for testing or embedding configs without file I/O.
///
/// # Arguments
///
/// * `content` — TOML content as a string.
/// * `source_name` — Identifier for the source (used in error messages).
///
/// # Returns
///
/// - `Ok(OrchestratorConfig)` if the TOML is well-formed and valid.
/// - `Err(ConfigError::Parse)` if the TOML is malformed.
/// - `Err(ConfigError::Validation)` if semantic constraints are violated.
///
/// # Panics
///
/// This function never panics.
pub fn load_from_str(content: &str, source_name: &str) -> Result<OrchestratorConfig, ConfigError> {
    let config: OrchestratorConfig = toml::from_str(content).map_err(|e| ConfigError::Parse {
        file: source_name.to_string(),
        source: e,
    })?;

    validation::validate(&config).map_err(|errors| {
        ConfigError::Validation(
            errors
                .iter()
                .map(|e| e.to_string())
                .collect::<Vec<_>>()
                .join("\n"),
        )
    })?;

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const VALID_TOML: &str = r#"
[orchestrator]
default_pool = "primary"
system_window = 100
pool_window = 50
latency_threshold_ms = 25.0

[pool]
initial_size = 2
load_threshold = 0.75
scale_factor = 3
max_processors = 16
hint_cooldown_ms = 250

[foundation]
default_pools = 3
pool_size = 4

[stress]
max_concurrency = 8
"#;

    #[test]
    fn test_load_valid_toml_from_str() {
        let config = load_from_str(VALID_TOML, "inline").unwrap();
        assert_eq!(config.orchestrator.default_pool, "primary");
        assert_eq!(config.pool.scale_factor, 3);
        assert_eq!(config.foundation.default_pools, 3);
        assert_eq!(config.stress.max_concurrency, 8);
    }

    #[test]
    fn test_load_malformed_toml_is_parse_error() {
        let result = load_from_str("[orchestrator\ndefault_pool = ", "broken");
        assert!(matches!(result, Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_parse_error_names_the_source() {
        let err = load_from_str("not valid = [", "my-source").unwrap_err();
        assert!(err.to_string().contains("my-source"));
    }

    #[test]
    fn test_load_semantically_invalid_toml_is_validation_error() {
        let toml = r#"
[pool]
scale_factor = 1
"#;
        let result = load_from_str(toml, "inline");
        assert!(matches!(result, Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_validation_error_lists_every_violation() {
        let toml = r#"
[pool]
scale_factor = 1
max_processors = 0
"#;
        let err = load_from_str(toml, "inline").unwrap_err();
        let text = err.to_string();
        assert!(text.contains("pool.scale_factor"));
        assert!(text.contains("pool.max_processors"));
    }

    #[test]
    fn test_load_from_file_round_trip() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(VALID_TOML.as_bytes()).unwrap();

        let config = load_from_file(file.path()).unwrap();
        assert_eq!(config.pool.initial_size, 2);
    }

    #[test]
    fn test_load_missing_file_is_io_error() {
        let result = load_from_file(Path::new("/nonexistent/orchestrator.toml"));
        assert!(matches!(result, Err(ConfigError::Io { .. })));
    }
}
