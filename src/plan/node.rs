//! Plan tree nodes
//!
//! A tagged variant per operator. Operators fused into their parent's pass
//! (inline LIMIT, MergeReceive's inline sort/aggregate) are typed optional
//! slots on the parents that support them, never separate tree nodes.
//!
//! The serialized shape (`"type"` tag, snake_case names) is what the
//! execution engine reads; treat any change to it as a format bump.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::expr::Expr;
use crate::planner::{OrderSpec, SortItem};
use crate::query::RowLimit;

/// Direction an index is walked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanDirection {
    #[default]
    Forward,
    Backward,
}

impl ScanDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanDirection::Forward => "FORWARD",
            ScanDirection::Backward => "BACKWARD",
        }
    }
}

/// LIMIT / OFFSET pair carried by a limit slot or node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimitSpec {
    #[serde(default)]
    pub limit: Option<RowLimit>,
    #[serde(default)]
    pub offset: Option<RowLimit>,
}

impl LimitSpec {
    pub fn new(limit: Option<RowLimit>, offset: Option<RowLimit>) -> Option<Self> {
        if limit.is_none() && offset.is_none() {
            None
        } else {
            Some(Self { limit, offset })
        }
    }

    pub fn fixed(count: u64) -> Self {
        Self {
            limit: Some(RowLimit::Fixed(count)),
            offset: None,
        }
    }
}

impl fmt::Display for LimitSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if let Some(limit) = self.limit {
            parts.push(format!("LIMIT {}", render_row_limit(limit)));
        }
        if let Some(offset) = self.offset {
            parts.push(format!("OFFSET {}", render_row_limit(offset)));
        }
        write!(f, "{}", parts.join(" "))
    }
}

fn render_row_limit(limit: RowLimit) -> String {
    match limit {
        RowLimit::Fixed(n) => n.to_string(),
        RowLimit::Parameter(_) => "?".to_string(),
    }
}

/// Output column of a fragment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputColumnDef {
    pub expr: Expr,
    pub name: String,
}

/// Index scan payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexScanNode {
    pub table: String,
    pub scope: usize,
    pub index: String,
    pub direction: ScanDirection,
    /// Lookup values for the leading equality-bound key parts
    #[serde(default)]
    pub search_keys: Vec<Expr>,
    /// Range conjuncts on the key part after the equality prefix
    #[serde(default)]
    pub range: Vec<Expr>,
    /// Residual filter evaluated per row
    #[serde(default)]
    pub predicate: Option<Expr>,
    /// Order the scan emits, in scan direction
    #[serde(default)]
    pub sort_order: Vec<SortItem>,
    #[serde(default)]
    pub limit: Option<LimitSpec>,
}

/// Aggregation strategies that can run inside a merge receive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InlineAggregateKind {
    Serial,
    Partial,
}

/// Aggregate fused into a merge receive
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InlineAggregate {
    pub kind: InlineAggregateKind,
    pub group_by: Vec<Expr>,
    /// Grouping expressions arriving ordered (all of them for serial)
    #[serde(default)]
    pub ordered_prefix: Vec<Expr>,
    pub aggregates: Vec<Expr>,
    #[serde(default)]
    pub limit: Option<LimitSpec>,
}

/// Plan tree node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PlanNode {
    SeqScan {
        table: String,
        scope: usize,
        #[serde(default)]
        predicate: Option<Expr>,
        #[serde(default)]
        limit: Option<LimitSpec>,
    },
    IndexScan(IndexScanNode),
    OrderBy {
        child: Box<PlanNode>,
        sort: Vec<SortItem>,
        #[serde(default)]
        limit: Option<LimitSpec>,
    },
    HashAggregate {
        child: Box<PlanNode>,
        group_by: Vec<Expr>,
        aggregates: Vec<Expr>,
    },
    SerialAggregate {
        child: Box<PlanNode>,
        group_by: Vec<Expr>,
        aggregates: Vec<Expr>,
        #[serde(default)]
        limit: Option<LimitSpec>,
    },
    PartialAggregate {
        child: Box<PlanNode>,
        group_by: Vec<Expr>,
        ordered_prefix: Vec<Expr>,
        aggregates: Vec<Expr>,
        #[serde(default)]
        limit: Option<LimitSpec>,
    },
    Limit {
        child: Box<PlanNode>,
        limit: LimitSpec,
    },
    /// Collects partition rows in arrival order
    Receive { columns: Vec<String> },
    /// Streaming k-way merge of sorted partition outputs
    MergeReceive {
        columns: Vec<String>,
        order_by: Vec<SortItem>,
        #[serde(default)]
        aggregate: Option<InlineAggregate>,
        #[serde(default)]
        limit: Option<LimitSpec>,
    },
    NestedLoopJoin {
        outer: Box<PlanNode>,
        inner: Box<PlanNode>,
        #[serde(default)]
        predicate: Option<Expr>,
    },
    /// Inner side is an index scan keyed by outer columns
    NestedLoopIndexJoin {
        outer: Box<PlanNode>,
        inner: Box<PlanNode>,
        #[serde(default)]
        predicate: Option<Expr>,
    },
    HashJoin {
        outer: Box<PlanNode>,
        inner: Box<PlanNode>,
        #[serde(default)]
        predicate: Option<Expr>,
    },
    Projection {
        child: Box<PlanNode>,
        columns: Vec<OutputColumnDef>,
    },
}

/// Node type tags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlanNodeType {
    SeqScan,
    IndexScan,
    OrderBy,
    HashAggregate,
    SerialAggregate,
    PartialAggregate,
    Limit,
    Receive,
    MergeReceive,
    NestedLoopJoin,
    NestedLoopIndexJoin,
    HashJoin,
    Projection,
}

impl PlanNodeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlanNodeType::SeqScan => "SEQSCAN",
            PlanNodeType::IndexScan => "INDEXSCAN",
            PlanNodeType::OrderBy => "ORDERBY",
            PlanNodeType::HashAggregate => "HASHAGGREGATE",
            PlanNodeType::SerialAggregate => "AGGREGATE",
            PlanNodeType::PartialAggregate => "PARTIALAGGREGATE",
            PlanNodeType::Limit => "LIMIT",
            PlanNodeType::Receive => "RECEIVE",
            PlanNodeType::MergeReceive => "MERGERECEIVE",
            PlanNodeType::NestedLoopJoin => "NESTLOOP",
            PlanNodeType::NestedLoopIndexJoin => "NESTLOOPINDEX",
            PlanNodeType::HashJoin => "HASHJOIN",
            PlanNodeType::Projection => "PROJECTION",
        }
    }
}

impl fmt::Display for PlanNodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl PlanNode {
    pub fn node_type(&self) -> PlanNodeType {
        match self {
            PlanNode::SeqScan { .. } => PlanNodeType::SeqScan,
            PlanNode::IndexScan(_) => PlanNodeType::IndexScan,
            PlanNode::OrderBy { .. } => PlanNodeType::OrderBy,
            PlanNode::HashAggregate { .. } => PlanNodeType::HashAggregate,
            PlanNode::SerialAggregate { .. } => PlanNodeType::SerialAggregate,
            PlanNode::PartialAggregate { .. } => PlanNodeType::PartialAggregate,
            PlanNode::Limit { .. } => PlanNodeType::Limit,
            PlanNode::Receive { .. } => PlanNodeType::Receive,
            PlanNode::MergeReceive { .. } => PlanNodeType::MergeReceive,
            PlanNode::NestedLoopJoin { .. } => PlanNodeType::NestedLoopJoin,
            PlanNode::NestedLoopIndexJoin { .. } => PlanNodeType::NestedLoopIndexJoin,
            PlanNode::HashJoin { .. } => PlanNodeType::HashJoin,
            PlanNode::Projection { .. } => PlanNodeType::Projection,
        }
    }

    /// Tree children; inline slots are not children
    pub fn children(&self) -> Vec<&PlanNode> {
        match self {
            PlanNode::SeqScan { .. }
            | PlanNode::IndexScan(_)
            | PlanNode::Receive { .. }
            | PlanNode::MergeReceive { .. } => Vec::new(),
            PlanNode::OrderBy { child, .. }
            | PlanNode::HashAggregate { child, .. }
            | PlanNode::SerialAggregate { child, .. }
            | PlanNode::PartialAggregate { child, .. }
            | PlanNode::Limit { child, .. }
            | PlanNode::Projection { child, .. } => vec![child.as_ref()],
            PlanNode::NestedLoopJoin { outer, inner, .. }
            | PlanNode::NestedLoopIndexJoin { outer, inner, .. }
            | PlanNode::HashJoin { outer, inner, .. } => vec![outer.as_ref(), inner.as_ref()],
        }
    }

    /// First node of the given type, pre-order
    pub fn find(&self, node_type: PlanNodeType) -> Option<&PlanNode> {
        if self.node_type() == node_type {
            return Some(self);
        }
        self.children().into_iter().find_map(|c| c.find(node_type))
    }

    pub fn has_node_of_type(&self, node_type: PlanNodeType) -> bool {
        self.find(node_type).is_some()
    }

    pub fn count_nodes_of_type(&self, node_type: PlanNodeType) -> usize {
        let own = usize::from(self.node_type() == node_type);
        own + self
            .children()
            .into_iter()
            .map(|c| c.count_nodes_of_type(node_type))
            .sum::<usize>()
    }

    /// Node types in pre-order
    pub fn node_types(&self) -> Vec<PlanNodeType> {
        let mut out = vec![self.node_type()];
        for child in self.children() {
            out.extend(child.node_types());
        }
        out
    }

    /// Order in which this subtree emits rows
    pub fn output_order(&self) -> OrderSpec {
        match self {
            PlanNode::SeqScan { .. }
            | PlanNode::Receive { .. }
            | PlanNode::HashJoin { .. }
            | PlanNode::HashAggregate { .. } => OrderSpec::empty(),
            PlanNode::IndexScan(scan) => OrderSpec::new(scan.sort_order.clone()),
            PlanNode::OrderBy { sort, .. } => OrderSpec::new(sort.clone()),
            PlanNode::NestedLoopJoin { outer, .. } | PlanNode::NestedLoopIndexJoin { outer, .. } => {
                outer.output_order()
            }
            PlanNode::Limit { child, .. } | PlanNode::Projection { child, .. } => child.output_order(),
            PlanNode::SerialAggregate { child, group_by, .. } => grouped_order(&child.output_order(), group_by),
            PlanNode::PartialAggregate {
                child, ordered_prefix, ..
            } => grouped_order(&child.output_order(), ordered_prefix),
            PlanNode::MergeReceive {
                order_by, aggregate, ..
            } => {
                let merged = OrderSpec::new(order_by.clone());
                match aggregate {
                    None => merged,
                    Some(agg) => grouped_order(&merged, &agg.ordered_prefix),
                }
            }
        }
    }

    /// Output column names of a fragment root
    pub fn output_columns(&self) -> Vec<String> {
        match self {
            PlanNode::Projection { columns, .. } => columns.iter().map(|c| c.name.clone()).collect(),
            PlanNode::Receive { columns } | PlanNode::MergeReceive { columns, .. } => columns.clone(),
            other => other
                .children()
                .first()
                .map(|c| c.output_columns())
                .unwrap_or_default(),
        }
    }

    /// Inline limit slot of this node, if it has one
    pub fn inline_limit(&self) -> Option<&LimitSpec> {
        match self {
            PlanNode::SeqScan { limit, .. }
            | PlanNode::OrderBy { limit, .. }
            | PlanNode::SerialAggregate { limit, .. }
            | PlanNode::PartialAggregate { limit, .. } => limit.as_ref(),
            PlanNode::IndexScan(scan) => scan.limit.as_ref(),
            PlanNode::MergeReceive { limit, aggregate, .. } => aggregate
                .as_ref()
                .and_then(|a| a.limit.as_ref())
                .or(limit.as_ref()),
            _ => None,
        }
    }

    pub fn as_index_scan(&self) -> Option<&IndexScanNode> {
        match self {
            PlanNode::IndexScan(scan) => Some(scan),
            _ => None,
        }
    }
}

/// Leading items of `order` whose expression is one of `keys`: what
/// survives a streaming aggregate that emits one row per group.
fn grouped_order(order: &OrderSpec, keys: &[Expr]) -> OrderSpec {
    if keys.is_empty() {
        return OrderSpec::empty();
    }
    order
        .items()
        .iter()
        .take_while(|item| keys.contains(&item.expr))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::SortDirection;

    fn col(index: usize) -> Expr {
        Expr::column(0, index, "T", &format!("T_D{}", index))
    }

    fn scan() -> PlanNode {
        PlanNode::IndexScan(IndexScanNode {
            table: "T".into(),
            scope: 0,
            index: "T_PK".into(),
            direction: ScanDirection::Forward,
            search_keys: Vec::new(),
            range: Vec::new(),
            predicate: None,
            sort_order: vec![
                SortItem::new(col(0), SortDirection::Asc),
                SortItem::new(col(1), SortDirection::Asc),
            ],
            limit: None,
        })
    }

    #[test]
    fn test_tree_queries() {
        let plan = PlanNode::Projection {
            child: Box::new(PlanNode::OrderBy {
                child: Box::new(PlanNode::SeqScan {
                    table: "T".into(),
                    scope: 0,
                    predicate: None,
                    limit: None,
                }),
                sort: vec![SortItem::new(col(1), SortDirection::Desc)],
                limit: Some(LimitSpec::fixed(3)),
            }),
            columns: vec![OutputColumnDef {
                expr: col(0),
                name: "T_D0".into(),
            }],
        };
        assert!(plan.has_node_of_type(PlanNodeType::SeqScan));
        assert!(!plan.has_node_of_type(PlanNodeType::Limit));
        assert_eq!(plan.count_nodes_of_type(PlanNodeType::OrderBy), 1);
        assert_eq!(
            plan.node_types(),
            vec![PlanNodeType::Projection, PlanNodeType::OrderBy, PlanNodeType::SeqScan]
        );
        assert_eq!(plan.output_order().len(), 1);
        assert_eq!(plan.output_columns(), vec!["T_D0"]);
        let order_by = plan.find(PlanNodeType::OrderBy).unwrap();
        assert_eq!(order_by.inline_limit(), Some(&LimitSpec::fixed(3)));
    }

    #[test]
    fn test_serial_aggregate_keeps_grouped_prefix() {
        let agg = PlanNode::SerialAggregate {
            child: Box::new(scan()),
            group_by: vec![col(0)],
            aggregates: vec![Expr::count_star()],
            limit: None,
        };
        let order = agg.output_order();
        assert_eq!(order.exprs(), vec![&col(0)]);

        let table_agg = PlanNode::SerialAggregate {
            child: Box::new(scan()),
            group_by: Vec::new(),
            aggregates: vec![Expr::count_star()],
            limit: None,
        };
        assert!(table_agg.output_order().is_empty());
    }

    #[test]
    fn test_hash_nodes_lose_order() {
        let hash = PlanNode::HashAggregate {
            child: Box::new(scan()),
            group_by: vec![col(0)],
            aggregates: Vec::new(),
        };
        assert!(hash.output_order().is_empty());

        let join = PlanNode::HashJoin {
            outer: Box::new(scan()),
            inner: Box::new(scan()),
            predicate: None,
        };
        assert!(join.output_order().is_empty());

        let nlj = PlanNode::NestedLoopJoin {
            outer: Box::new(scan()),
            inner: Box::new(scan()),
            predicate: None,
        };
        assert_eq!(nlj.output_order().len(), 2);
    }

    #[test]
    fn test_serialized_tag() {
        let json = serde_json::to_value(scan()).unwrap();
        assert_eq!(json["type"], "index_scan");
        assert_eq!(json["direction"], "forward");
        let back: PlanNode = serde_json::from_value(json).unwrap();
        assert_eq!(back, scan());
    }

    #[test]
    fn test_limit_spec() {
        assert_eq!(LimitSpec::new(None, None), None);
        let spec = LimitSpec::new(Some(RowLimit::Fixed(5)), Some(RowLimit::Parameter(0))).unwrap();
        assert_eq!(spec.to_string(), "LIMIT 5 OFFSET ?");
    }
}
