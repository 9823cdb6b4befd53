//! Strata configuration.
//!
//! [`StrataConfig`] is a plain serde struct with per-field defaults, so a
//! partial TOML file (or none at all) yields a usable configuration:
//!
//! ```toml
//! indexes_path = "/var/lib/app/indexes"
//! writer_timeout_secs = 5.0
//! search_string_min_len = 3
//! schema_mismatch = "recreate"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Smallest writer memory budget the index engine accepts per thread.
pub const MIN_WRITER_MEMORY_BYTES: usize = 15_000_000;

/// What to do when a reopened index's schema differs from the derived one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemaMismatchPolicy {
    /// Fail registration with `Error::SchemaMismatch`.
    #[default]
    Reject,
    /// Wipe the index directory and create a fresh index.
    Recreate,
    /// Keep the on-disk schema and log a warning.
    Ignore,
}

/// Registry-wide configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrataConfig {
    /// Root directory holding one subdirectory per index.
    #[serde(default = "default_indexes_path")]
    pub indexes_path: PathBuf,

    /// Bounded wait for an index writer, in seconds.
    #[serde(default = "default_writer_timeout_secs")]
    pub writer_timeout_secs: f64,

    /// Queries whose trimmed length is below this are not executed.
    #[serde(default = "default_search_string_min_len")]
    pub search_string_min_len: usize,

    /// Edit distance used by fuzzy ("something") matching.
    #[serde(default = "default_fuzzy_distance")]
    pub fuzzy_distance: u8,

    /// Per-index hit cap when a search does not set its own limit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_limit: Option<usize>,

    /// Index writer memory budget in bytes (per thread).
    #[serde(default = "default_writer_memory_bytes")]
    pub writer_memory_bytes: usize,

    /// Index writer thread count.
    #[serde(default = "default_writer_threads")]
    pub writer_threads: usize,

    /// Reopen policy for indexes whose stored schema changed.
    #[serde(default)]
    pub schema_mismatch: SchemaMismatchPolicy,
}

fn default_indexes_path() -> PathBuf {
    PathBuf::from("indexes")
}

fn default_writer_timeout_secs() -> f64 {
    2.0
}

fn default_search_string_min_len() -> usize {
    2
}

fn default_fuzzy_distance() -> u8 {
    1
}

fn default_writer_memory_bytes() -> usize {
    MIN_WRITER_MEMORY_BYTES
}

fn default_writer_threads() -> usize {
    1
}

impl Default for StrataConfig {
    fn default() -> Self {
        Self {
            indexes_path: default_indexes_path(),
            writer_timeout_secs: default_writer_timeout_secs(),
            search_string_min_len: default_search_string_min_len(),
            fuzzy_distance: default_fuzzy_distance(),
            default_limit: None,
            writer_memory_bytes: default_writer_memory_bytes(),
            writer_threads: default_writer_threads(),
            schema_mismatch: SchemaMismatchPolicy::default(),
        }
    }
}

impl StrataConfig {
    /// Default configuration rooted at the given indexes directory.
    pub fn with_indexes_path(path: impl Into<PathBuf>) -> Self {
        Self {
            indexes_path: path.into(),
            ..Default::default()
        }
    }

    /// Parse and validate a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| Error::config(format!("Invalid configuration: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| Error::io_with_path(e, path))?;
        let config = Self::from_toml_str(&content)?;
        log::debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Check value ranges.
    pub fn validate(&self) -> Result<()> {
        if !(self.writer_timeout_secs.is_finite() && self.writer_timeout_secs > 0.0) {
            return Err(Error::config(format!(
                "writer_timeout_secs must be a positive number, got {}",
                self.writer_timeout_secs
            )));
        }
        if self.fuzzy_distance > 2 {
            return Err(Error::config(format!(
                "fuzzy_distance must be 0, 1 or 2, got {}",
                self.fuzzy_distance
            )));
        }
        if self.writer_threads == 0 {
            return Err(Error::config("writer_threads must be at least 1"));
        }
        if self.writer_memory_bytes < MIN_WRITER_MEMORY_BYTES {
            return Err(Error::config(format!(
                "writer_memory_bytes must be at least {MIN_WRITER_MEMORY_BYTES}, got {}",
                self.writer_memory_bytes
            )));
        }
        if self.default_limit == Some(0) {
            return Err(Error::config("default_limit must be at least 1"));
        }
        Ok(())
    }

    /// Writer wait as a `Duration`.
    pub fn writer_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.writer_timeout_secs)
    }

    /// Directory of the named index.
    pub fn index_path(&self, name: &str) -> PathBuf {
        self.indexes_path.join(name)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_config_default() {
        let config = StrataConfig::default();
        assert_eq!(config.indexes_path, PathBuf::from("indexes"));
        assert_eq!(config.writer_timeout(), Duration::from_secs(2));
        assert_eq!(config.search_string_min_len, 2);
        assert_eq!(config.fuzzy_distance, 1);
        assert!(config.default_limit.is_none());
        assert_eq!(config.writer_threads, 1);
        assert_eq!(config.schema_mismatch, SchemaMismatchPolicy::Reject);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_partial_toml_uses_defaults() {
        let config = StrataConfig::from_toml_str(
            r#"
            indexes_path = "/tmp/strata"
            search_string_min_len = 3
            schema_mismatch = "recreate"
            "#,
        )
        .unwrap();

        assert_eq!(config.indexes_path, PathBuf::from("/tmp/strata"));
        assert_eq!(config.search_string_min_len, 3);
        assert_eq!(config.schema_mismatch, SchemaMismatchPolicy::Recreate);
        assert_eq!(config.writer_timeout_secs, 2.0);
    }

    #[test]
    fn test_config_rejects_bad_timeout() {
        let result = StrataConfig::from_toml_str("writer_timeout_secs = 0.0");
        assert!(matches!(result, Err(Error::Config { .. })));
    }

    #[test]
    fn test_config_rejects_bad_fuzzy_distance() {
        let result = StrataConfig::from_toml_str("fuzzy_distance = 3");
        assert!(matches!(result, Err(Error::Config { .. })));
    }

    #[test]
    fn test_config_rejects_small_writer_budget() {
        let config = StrataConfig {
            writer_memory_bytes: 1_000,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_rejects_unknown_policy() {
        let result = StrataConfig::from_toml_str(r#"schema_mismatch = "migrate""#);
        assert!(result.is_err());
    }

    #[test]
    fn test_config_load_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("strata.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "writer_timeout_secs = 0.5").unwrap();
        writeln!(file, "default_limit = 25").unwrap();

        let config = StrataConfig::load(&path).unwrap();
        assert_eq!(config.writer_timeout(), Duration::from_millis(500));
        assert_eq!(config.default_limit, Some(25));
    }

    #[test]
    fn test_config_load_missing_file() {
        let result = StrataConfig::load(Path::new("/nonexistent/strata.toml"));
        assert!(matches!(result, Err(Error::Io { path: Some(_), .. })));
    }

    #[test]
    fn test_index_path() {
        let config = StrataConfig::with_indexes_path("/data");
        assert_eq!(config.index_path("User"), PathBuf::from("/data/User"));
    }

    #[test]
    fn test_policy_serialization() {
        let json = serde_json::to_string(&SchemaMismatchPolicy::Ignore).unwrap();
        assert_eq!(json, "\"ignore\"");
    }
}
