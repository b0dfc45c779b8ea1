//! Explain output
//!
//! Deterministic, human-readable rendering of a compiled plan: one line per
//! node, children indented below their parent, inline slots (limit, merge
//! aggregate) on indented `inline` lines.

use std::fmt;

use serde::Serialize;

use super::compiled::CompiledPlan;
use super::node::{InlineAggregateKind, PlanNode};
use crate::expr::Expr;
use crate::planner::{PlannerError, SortItem};

/// Explain plan output
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExplainPlan {
    /// Whether planning succeeded
    pub accepted: bool,
    /// Rendered plan lines (if accepted)
    pub lines: Vec<String>,
    /// Rejection error code (if rejected)
    pub rejection_code: Option<String>,
    /// Rejection reason (if rejected)
    pub rejection_reason: Option<String>,
}

impl ExplainPlan {
    pub fn from_plan(plan: &CompiledPlan) -> Self {
        let mut lines = vec![
            format!("DISTRIBUTION: {}", plan.distribution.as_str()),
            format!("DETERMINISM: {}", plan.determinism.as_str()),
        ];
        if let Some(pushdown) = &plan.aggregate_pushdown {
            lines.push(format!("AGGREGATE PUSHDOWN: {}", pushdown.as_str()));
        }

        match &plan.coordinator {
            Some(coordinator) => {
                lines.push("COORDINATOR:".to_string());
                describe(coordinator, 1, &mut lines);
                lines.push("PARTITION:".to_string());
                describe(&plan.partition, 1, &mut lines);
            }
            None => describe(&plan.partition, 0, &mut lines),
        }

        Self {
            accepted: true,
            lines,
            rejection_code: None,
            rejection_reason: None,
        }
    }

    pub fn from_error(err: &PlannerError) -> Self {
        let reason = match err.clause() {
            Some(clause) => format!("{}: {}", err.message(), clause),
            None => err.message().to_string(),
        };
        Self {
            accepted: false,
            lines: Vec::new(),
            rejection_code: Some(err.code().code().to_string()),
            rejection_reason: Some(reason),
        }
    }
}

fn join_exprs(exprs: &[Expr]) -> String {
    exprs.iter().map(|e| e.to_string()).collect::<Vec<_>>().join(", ")
}

fn join_sort(items: &[SortItem]) -> String {
    items
        .iter()
        .map(|i| format!("{} {}", i.expr, i.direction.as_str()))
        .collect::<Vec<_>>()
        .join(", ")
}

fn describe(node: &PlanNode, depth: usize, out: &mut Vec<String>) {
    let pad = "  ".repeat(depth);
    let inline = |out: &mut Vec<String>, text: String| out.push(format!("{}  inline {}", pad, text));
    let name = node.node_type().as_str();

    match node {
        PlanNode::SeqScan {
            table,
            predicate,
            limit,
            ..
        } => {
            let mut line = format!("{}{} {}", pad, name, table);
            if let Some(p) = predicate {
                line.push_str(&format!(" filter {}", p));
            }
            out.push(line);
            if let Some(l) = limit {
                inline(out, l.to_string());
            }
        }
        PlanNode::IndexScan(scan) => {
            let mut line = format!("{}{} {} USING {} {}", pad, name, scan.table, scan.index, scan.direction.as_str());
            if !scan.search_keys.is_empty() {
                line.push_str(&format!(" keys ({})", join_exprs(&scan.search_keys)));
            }
            if !scan.range.is_empty() {
                line.push_str(&format!(" range {}", join_exprs(&scan.range)));
            }
            if let Some(p) = &scan.predicate {
                line.push_str(&format!(" filter {}", p));
            }
            out.push(line);
            if let Some(l) = &scan.limit {
                inline(out, l.to_string());
            }
        }
        PlanNode::OrderBy { sort, limit, .. } => {
            out.push(format!("{}{} {}", pad, name, join_sort(sort)));
            if let Some(l) = limit {
                inline(out, l.to_string());
            }
        }
        PlanNode::HashAggregate {
            group_by, aggregates, ..
        } => {
            out.push(format!("{}{} group ({}) {}", pad, name, join_exprs(group_by), join_exprs(aggregates)));
        }
        PlanNode::SerialAggregate {
            group_by,
            aggregates,
            limit,
            ..
        } => {
            out.push(format!("{}{} group ({}) {}", pad, name, join_exprs(group_by), join_exprs(aggregates)));
            if let Some(l) = limit {
                inline(out, l.to_string());
            }
        }
        PlanNode::PartialAggregate {
            group_by,
            ordered_prefix,
            aggregates,
            limit,
            ..
        } => {
            out.push(format!(
                "{}{} group ({}) ordered ({}) {}",
                pad,
                name,
                join_exprs(group_by),
                join_exprs(ordered_prefix),
                join_exprs(aggregates)
            ));
            if let Some(l) = limit {
                inline(out, l.to_string());
            }
        }
        PlanNode::Limit { limit, .. } => out.push(format!("{}{} {}", pad, name, limit)),
        PlanNode::Receive { columns } => out.push(format!("{}{} ({})", pad, name, columns.join(", "))),
        PlanNode::MergeReceive {
            columns,
            order_by,
            aggregate,
            limit,
        } => {
            out.push(format!("{}{} ({})", pad, name, columns.join(", ")));
            inline(out, format!("ORDERBY {}", join_sort(order_by)));
            if let Some(agg) = aggregate {
                let kind = match agg.kind {
                    InlineAggregateKind::Serial => "AGGREGATE",
                    InlineAggregateKind::Partial => "PARTIALAGGREGATE",
                };
                inline(out, format!("{} group ({}) {}", kind, join_exprs(&agg.group_by), join_exprs(&agg.aggregates)));
                if let Some(l) = &agg.limit {
                    inline(out, l.to_string());
                }
            }
            if let Some(l) = limit {
                inline(out, l.to_string());
            }
        }
        PlanNode::NestedLoopJoin { predicate, .. }
        | PlanNode::NestedLoopIndexJoin { predicate, .. }
        | PlanNode::HashJoin { predicate, .. } => match predicate {
            Some(p) => out.push(format!("{}{} on {}", pad, name, p)),
            None => out.push(format!("{}{}", pad, name)),
        },
        PlanNode::Projection { columns, .. } => {
            let names: Vec<&str> = columns.iter().map(|c| c.name.as_str()).collect();
            out.push(format!("{}{} ({})", pad, name, names.join(", ")));
        }
    }

    for child in node.children() {
        describe(child, depth + 1, out);
    }
}

impl fmt::Display for ExplainPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== EXPLAIN PLAN ===")?;

        if self.accepted {
            writeln!(f, "Status: ACCEPTED")?;
            for line in &self.lines {
                writeln!(f, "{}", line)?;
            }
        } else {
            writeln!(f, "Status: REJECTED")?;
            if let Some(code) = &self.rejection_code {
                writeln!(f, "Error Code: {}", code)?;
            }
            if let Some(reason) = &self.rejection_reason {
                writeln!(f, "Reason: {}", reason)?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Catalog, IndexDescriptor, Table};
    use crate::planner::{PlannerConfig, QueryPlanner};
    use crate::query::ResolvedQuery;

    fn catalog() -> Catalog {
        Catalog::new().with_table(
            Table::new("P")
                .with_columns(&["P_D0", "P_D1"])
                .partitioned_on("P_D0")
                .with_index(IndexDescriptor::new("P_D1_IDX").asc(1, "P_D1")),
        )
    }

    #[test]
    fn test_explain_accepted_plan() {
        let catalog = catalog();
        let config = PlannerConfig::default();
        let p1 = Expr::column(0, 1, "P", "P_D1");
        let q = ResolvedQuery::from_table("P").select(p1.clone()).order_asc(p1).limit(3);
        let plan = QueryPlanner::new(&catalog, &config).plan(&q).unwrap();

        let output = ExplainPlan::from_plan(&plan).to_string();
        assert!(output.contains("ACCEPTED"));
        assert!(output.contains("DISTRIBUTION: MULTI_PARTITION"));
        assert!(output.contains("MERGERECEIVE (P_D1)"));
        assert!(output.contains("inline ORDERBY #0:P_D1 ASC"));
        assert!(output.contains("INDEXSCAN P USING P_D1_IDX FORWARD"));
        assert!(output.contains("inline LIMIT 3"));
    }

    #[test]
    fn test_explain_rejected_plan() {
        let err = PlannerError::invalid_order_by("T.T_D1");
        let explain = ExplainPlan::from_error(&err);

        assert!(!explain.accepted);
        assert_eq!(explain.rejection_code, Some("PLAN_INVALID_ORDER_BY".into()));

        let output = explain.to_string();
        assert!(output.contains("REJECTED"));
        assert!(output.contains("invalid ORDER BY expression"));
    }

    #[test]
    fn test_explain_deterministic() {
        let catalog = catalog();
        let config = PlannerConfig::default();
        let p1 = Expr::column(0, 1, "P", "P_D1");
        let q = ResolvedQuery::from_table("P").select(p1);
        let plan = QueryPlanner::new(&catalog, &config).plan(&q).unwrap();

        let first = ExplainPlan::from_plan(&plan).to_string();
        let second = ExplainPlan::from_plan(&plan).to_string();
        assert_eq!(first, second);
    }
}
