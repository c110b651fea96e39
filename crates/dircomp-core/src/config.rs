/// Tunables for a comparison session.
///
/// Every field has a sensible default, so a config file only needs to name
/// what it overrides.
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default read size for byte-for-byte file comparison.
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// Upper bound on the default worker count. More threads than this mostly
/// add contention on spinning disks and remote backends.
pub const MAX_DEFAULT_WORKERS: usize = 16;

/// Maximum rows produced by one projection.
///
/// Prevents runaway allocation when a multi-million-node tree is fully
/// expanded. Users can collapse nodes to explore deeper subtrees.
pub const DEFAULT_MAX_VISIBLE_ROWS: usize = 500_000;

/// Configuration for a [`ComparisonSession`](crate::scanner::ComparisonSession).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompareConfig {
    /// Number of background worker threads.
    pub worker_count: usize,
    /// Bytes read per side per step when comparing equal-sized files.
    pub chunk_size: usize,
    /// Cap on rows returned by the visible-row projection.
    pub max_visible_rows: usize,
    /// Initial state of the "hide identical" filter.
    pub hide_identical: bool,
}

impl Default for CompareConfig {
    fn default() -> Self {
        Self {
            worker_count: num_cpus::get().clamp(1, MAX_DEFAULT_WORKERS),
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_visible_rows: DEFAULT_MAX_VISIBLE_ROWS,
            hide_identical: false,
        }
    }
}

impl CompareConfig {
    /// Load a JSON config file and validate it.
    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the scheduler cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.worker_count == 0 {
            return Err(ConfigError::InvalidOption {
                option: "worker_count".to_owned(),
                reason: "must be at least 1".to_owned(),
            });
        }
        if self.chunk_size == 0 {
            return Err(ConfigError::InvalidOption {
                option: "chunk_size".to_owned(),
                reason: "must be at least 1 byte".to_owned(),
            });
        }
        if self.max_visible_rows == 0 {
            return Err(ConfigError::InvalidOption {
                option: "max_visible_rows".to_owned(),
                reason: "must be at least 1".to_owned(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_are_valid() {
        let config = CompareConfig::default();
        assert!(config.validate().is_ok());
        assert!(config.worker_count >= 1 && config.worker_count <= MAX_DEFAULT_WORKERS);
        assert_eq!(config.chunk_size, DEFAULT_CHUNK_SIZE);
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "worker_count": 3, "hide_identical": true }}"#).unwrap();

        let config = CompareConfig::from_json_file(file.path()).unwrap();
        assert_eq!(config.worker_count, 3);
        assert!(config.hide_identical);
        assert_eq!(config.chunk_size, DEFAULT_CHUNK_SIZE);
        assert_eq!(config.max_visible_rows, DEFAULT_MAX_VISIBLE_ROWS);
    }

    #[test]
    fn zero_workers_rejected() {
        let config = CompareConfig {
            worker_count: 0,
            ..CompareConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidOption { ref option, .. }) if option == "worker_count"
        ));
    }

    #[test]
    fn malformed_json_is_a_parse_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{ not json").unwrap();
        assert!(matches!(
            CompareConfig::from_json_file(file.path()),
            Err(ConfigError::Parse(_))
        ));
    }
}
