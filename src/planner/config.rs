//! Planner configuration
//!
//! Every switch defaults to the behaviour the execution engine expects;
//! a missing or empty config file yields the defaults.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors loading a planner configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid config: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Planner configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannerConfig {
    /// Allow a backward index scan after skipping equality-bound key parts
    #[serde(default = "default_true")]
    pub reverse_scan_after_equality_prefix: bool,

    /// Keep a partition-local sort only when a LIMIT makes it a top-N
    #[serde(default = "default_true")]
    pub partition_sort_requires_limit: bool,

    /// Push LIMIT (+ OFFSET) down into partition fragments
    #[serde(default = "default_true")]
    pub push_limit_to_partitions: bool,

    /// Allow streaming merge at the coordinator
    #[serde(default = "default_true")]
    pub enable_merge_receive: bool,

    /// Allow partial aggregation; when off, partial groupings hash
    #[serde(default = "default_true")]
    pub enable_partial_aggregate: bool,

    /// Emit TRACE decision events while planning
    #[serde(default)]
    pub log_decisions: bool,
}

fn default_true() -> bool {
    true
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            reverse_scan_after_equality_prefix: true,
            partition_sort_requires_limit: true,
            push_limit_to_partitions: true,
            enable_merge_receive: true,
            enable_partial_aggregate: true,
            log_decisions: false,
        }
    }
}

impl PlannerConfig {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        if json.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_json::from_str(json)?)
    }

    /// Load configuration from a JSON file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    pub fn with_reverse_scan_after_equality_prefix(mut self, enabled: bool) -> Self {
        self.reverse_scan_after_equality_prefix = enabled;
        self
    }

    pub fn with_partition_sort_requires_limit(mut self, enabled: bool) -> Self {
        self.partition_sort_requires_limit = enabled;
        self
    }

    pub fn with_push_limit_to_partitions(mut self, enabled: bool) -> Self {
        self.push_limit_to_partitions = enabled;
        self
    }

    pub fn with_merge_receive(mut self, enabled: bool) -> Self {
        self.enable_merge_receive = enabled;
        self
    }

    pub fn with_partial_aggregate(mut self, enabled: bool) -> Self {
        self.enable_partial_aggregate = enabled;
        self
    }

    pub fn with_decision_logging(mut self, enabled: bool) -> Self {
        self.log_decisions = enabled;
        self
    }
}
