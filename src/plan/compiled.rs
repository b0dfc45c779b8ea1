//! Compiled plan envelope
//!
//! What the execution engine receives: a partition (or single-node)
//! fragment, an optional coordinator fragment, and the planner verdicts
//! that shaped them.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::node::PlanNode;
use crate::expr::Expr;
use crate::planner::DeterminismVerdict;

/// Wire format version of the plan tree
pub const PLAN_FORMAT_VERSION: u32 = 1;

/// Where the plan runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Distribution {
    /// No partitioned table involved
    SingleNode,
    /// Partition columns pinned; one partition answers alone
    SinglePartition,
    /// Every partition runs the fragment, a coordinator combines
    MultiPartition,
}

impl Distribution {
    pub fn as_str(&self) -> &'static str {
        match self {
            Distribution::SingleNode => "SINGLE_NODE",
            Distribution::SinglePartition => "SINGLE_PARTITION",
            Distribution::MultiPartition => "MULTI_PARTITION",
        }
    }
}

/// How much of a GROUP BY runs at the partitions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AggregatePushdown {
    /// Partitions ship rows; the coordinator aggregates
    None,
    /// Partition input arrives grouped on every grouping expression
    Serial { group_prefix: Vec<Expr> },
    /// Leading grouping expressions arrive ordered, the rest are hashed
    Partial {
        group_prefix: Vec<Expr>,
        unordered_suffix: Vec<Expr>,
    },
    /// No useful order; hash at both tiers
    Hash,
    /// Groups never span partitions and complete there; the coordinator
    /// only merges or sorts finished groups
    Local,
}

impl AggregatePushdown {
    pub fn as_str(&self) -> &'static str {
        match self {
            AggregatePushdown::None => "NONE",
            AggregatePushdown::Serial { .. } => "SERIAL",
            AggregatePushdown::Partial { .. } => "PARTIAL",
            AggregatePushdown::Hash => "HASH",
            AggregatePushdown::Local => "LOCAL",
        }
    }
}

/// Immutable planning result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompiledPlan {
    pub format_version: u32,
    pub distribution: Distribution,
    /// Fragment run on each partition, or the whole plan for a single node
    pub partition: PlanNode,
    /// Present only for multi-partition plans
    #[serde(default)]
    pub coordinator: Option<PlanNode>,
    pub determinism: DeterminismVerdict,
    /// `None` when the query does not aggregate or runs on one node
    #[serde(default)]
    pub aggregate_pushdown: Option<AggregatePushdown>,
}

impl CompiledPlan {
    /// Fragment whose output reaches the caller
    pub fn root(&self) -> &PlanNode {
        self.coordinator.as_ref().unwrap_or(&self.partition)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// SHA-256 of the canonical JSON, hex encoded
    pub fn fingerprint(&self) -> serde_json::Result<String> {
        let bytes = serde_json::to_vec(self)?;
        let mut hasher = Sha256::new();
        hasher.update(&bytes);
        Ok(format!("{:x}", hasher.finalize()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan(table: &str) -> CompiledPlan {
        CompiledPlan {
            format_version: PLAN_FORMAT_VERSION,
            distribution: Distribution::SingleNode,
            partition: PlanNode::SeqScan {
                table: table.into(),
                scope: 0,
                predicate: None,
                limit: None,
            },
            coordinator: None,
            determinism: DeterminismVerdict::Unknown,
            aggregate_pushdown: None,
        }
    }

    #[test]
    fn test_fingerprint_stable_and_sensitive() {
        let a = plan("T").fingerprint().unwrap();
        assert_eq!(a.len(), 64);
        assert_eq!(a, plan("T").fingerprint().unwrap());
        assert_ne!(a, plan("T2").fingerprint().unwrap());
    }

    #[test]
    fn test_root_is_coordinator_when_present() {
        let mut p = plan("P");
        assert_eq!(p.root(), &p.partition);
        p.coordinator = Some(PlanNode::Receive { columns: vec!["P_D0".into()] });
        p.distribution = Distribution::MultiPartition;
        assert!(matches!(p.root(), PlanNode::Receive { .. }));
    }

    #[test]
    fn test_json_shape() {
        let json: serde_json::Value = serde_json::from_str(&plan("T").to_json().unwrap()).unwrap();
        assert_eq!(json["format_version"], 1);
        assert_eq!(json["distribution"], "single_node");
        assert_eq!(json["partition"]["type"], "seq_scan");
        assert_eq!(json["determinism"], "unknown");
    }

    #[test]
    fn test_pushdown_serialization() {
        let pushdown = AggregatePushdown::Partial {
            group_prefix: vec![Expr::int(1)],
            unordered_suffix: Vec::new(),
        };
        let json = serde_json::to_value(&pushdown).unwrap();
        assert_eq!(json["kind"], "partial");
        assert_eq!(pushdown.as_str(), "PARTIAL");
    }
}
