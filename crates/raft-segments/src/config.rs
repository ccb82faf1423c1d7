//! # config
//!
//! why: one place for the knobs of the durable log
//! relations: read by segmented.rs (directory, rotation) and pruning.rs (policy)
//! what: SegmentedLogConfig with defaults and json loading

use std::path::PathBuf;

use raft_log::{RaftLogError, Result};
use serde::{Deserialize, Serialize};

/// Configuration of a segmented raft log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentedLogConfig {
    /// Directory holding the raft.log.<version> files
    pub directory: PathBuf,
    /// Start a new segment once the current one reaches this many bytes
    pub rotate_at_size: u64,
    /// Pruning policy, e.g. "1g size", "100k txs" or "false"
    pub pruning_strategy: String,
    /// Entries kept in the in-memory suffix cache
    pub cached_suffix_entries: usize,
}

impl Default for SegmentedLogConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("raft-log"),
            rotate_at_size: 250 * 1024 * 1024,
            pruning_strategy: "1g size".to_string(),
            cached_suffix_entries: 1024,
        }
    }
}

impl SegmentedLogConfig {
    /// Defaults with a different directory
    pub fn with_directory(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            ..Self::default()
        }
    }

    /// Parse from json; missing fields fall back to defaults
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| RaftLogError::Serialization(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_values() {
        let config = SegmentedLogConfig::default();
        assert_eq!(config.rotate_at_size, 250 * 1024 * 1024);
        assert_eq!(config.pruning_strategy, "1g size");
        assert_eq!(config.cached_suffix_entries, 1024);
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config = SegmentedLogConfig::from_json(r#"{"directory": "/var/raft", "rotate_at_size": 4096}"#).unwrap();
        assert_eq!(config.directory, PathBuf::from("/var/raft"));
        assert_eq!(config.rotate_at_size, 4096);
        assert_eq!(config.pruning_strategy, "1g size");
    }

    #[test]
    fn malformed_json_is_an_error() {
        assert!(SegmentedLogConfig::from_json("{").is_err());
    }
}
