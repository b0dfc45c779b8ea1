//! Single-node plan assembler
//!
//! Builds a fragment bottom-up: access path (scan or nested-loop chain),
//! aggregation, sort, limit, projection. Each step inspects the order the
//! subtree below it actually emits (`PlanNode::output_order`), so a sort is
//! added exactly when nothing underneath supplies the required order.
//!
//! LIMIT is fused into the terminal node once ordering is established and
//! only into nodes with a limit slot; a hash aggregate or a join gets a
//! separate `Limit` above it.

use std::collections::BTreeSet;

use super::context::PlanningContext;
use super::errors::PlannerResult;
use super::matcher::MatchResult;
use super::order::{collapses_to_single_row, OrderSpec};
use crate::expr::Expr;
use crate::observability::Event;
use crate::plan::{AggregatePushdown, LimitSpec, OutputColumnDef, PlanNode};
use crate::query::JoinStrategy;

/// Grouping work of a query: GROUP BY (or DISTINCT as grouping) plus the
/// aggregate calls computed per group
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Aggregation {
    pub group_by: Vec<Expr>,
    pub aggregates: Vec<Expr>,
    /// DISTINCT over grouped output that the grouping does not already
    /// make unique: hashed on these display expressions afterwards
    pub distinct_over: Option<Vec<Expr>>,
}

impl Aggregation {
    pub fn from_context(ctx: &PlanningContext<'_>) -> Option<Self> {
        let query = ctx.query();
        let aggregates: Vec<Expr> = query.aggregate_exprs().into_iter().cloned().collect();
        let display: Vec<Expr> = query.display_exprs().into_iter().cloned().collect();

        if !query.group_by.is_empty() {
            let redundant = query.group_by.iter().all(|g| display.contains(g));
            let distinct_over = (query.distinct && !redundant).then(|| display.clone());
            return Some(Self {
                group_by: query.group_by.clone(),
                aggregates,
                distinct_over,
            });
        }
        if !aggregates.is_empty() {
            return Some(Self {
                group_by: Vec::new(),
                aggregates,
                distinct_over: None,
            });
        }
        if query.distinct {
            return Some(Self {
                group_by: display,
                aggregates: Vec::new(),
                distinct_over: None,
            });
        }
        None
    }

    /// Aggregates without grouping: one output row
    pub fn is_table_aggregate(&self) -> bool {
        self.group_by.is_empty()
    }
}

/// Grouping expressions an access path delivers in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupingOrder {
    pub ordered_prefix: Vec<Expr>,
    pub covers_all: bool,
}

/// Scan or join tree with the decisions that produced it
#[derive(Debug, Clone)]
pub struct AccessPlan {
    pub node: PlanNode,
    pub driver: usize,
    pub driver_match: MatchResult,
    pub grouping: Option<GroupingOrder>,
}

pub struct Assembler<'c, 'a> {
    ctx: &'c PlanningContext<'a>,
}

impl<'c, 'a> Assembler<'c, 'a> {
    pub fn new(ctx: &'c PlanningContext<'a>) -> Self {
        Self { ctx }
    }

    /// Complete plan for a query answered by one node or one partition
    pub fn assemble(&self) -> PlannerResult<PlanNode> {
        let ctx = self.ctx;
        let order = ctx.reduced_order();
        let aggregation = Aggregation::from_context(ctx);

        let access = self.plan_access(&order, aggregation.as_ref());
        let mut node = match &aggregation {
            Some(agg) => self.aggregate(access, agg).0,
            None => access.node,
        };

        let single_row = collapses_to_single_row(ctx.query(), ctx.tables(), ctx.bindings());
        if !single_row {
            node = self.establish_order(node, &order);
        }
        if let Some(limit) = ctx.limit_spec() {
            node = with_limit(node, limit);
        }
        Ok(project(node, ctx.display_columns()))
    }

    /// Chooses the driving input and builds the scan / join tree.
    ///
    /// The driver is the first FROM entry unless every ORDER BY expression
    /// belongs to one other table whose index fully supplies the order.
    pub fn plan_access(&self, order: &OrderSpec, aggregation: Option<&Aggregation>) -> AccessPlan {
        let ctx = self.ctx;
        let scope_count = ctx.tables().len();
        let hash_join = ctx.query().join_strategy == JoinStrategy::Hash && scope_count > 1;
        let driver = if hash_join { 0 } else { self.choose_driver(order) };

        let owns = |exprs: &[&Expr]| exprs.iter().all(|e| e.scopes().iter().all(|s| *s == driver));
        let driver_order = if !hash_join && owns(&order.exprs()) {
            order.clone()
        } else {
            OrderSpec::empty()
        };
        let group_by: Vec<Expr> = match aggregation {
            Some(agg) if !hash_join && owns(&agg.group_by.iter().collect::<Vec<_>>()) => agg.group_by.clone(),
            _ => Vec::new(),
        };
        let table_aggregate = aggregation.map_or(false, Aggregation::is_table_aggregate);

        let (driver_match, grouping) = self.match_driver(driver, &driver_order, &group_by, table_aggregate);
        let mut node = self.scan_node(driver, &driver_match);

        let mut joined: BTreeSet<usize> = [driver].into_iter().collect();
        for scope in (0..scope_count).filter(|s| *s != driver) {
            node = if hash_join {
                self.hash_join(node, scope, &joined)
            } else {
                self.nested_loop_join(node, scope, &joined)
            };
            joined.insert(scope);
        }

        AccessPlan {
            node,
            driver,
            driver_match,
            grouping,
        }
    }

    fn choose_driver(&self, order: &OrderSpec) -> usize {
        let ctx = self.ctx;
        if ctx.tables().len() < 2 || order.is_empty() {
            return 0;
        }
        let scopes: BTreeSet<usize> = order.exprs().iter().flat_map(|e| e.scopes()).collect();
        let Some(&scope) = scopes.iter().next() else {
            return 0;
        };
        if scopes.len() != 1 || scope == 0 {
            return 0;
        }
        if ctx.matcher(scope, ctx.bindings()).match_order(order).is_full() {
            scope
        } else {
            0
        }
    }

    /// Index verdict for the driving scope. With grouping, an index that
    /// both supplies the order and groups wins; otherwise the index
    /// grouping the most expressions.
    fn match_driver(
        &self,
        scope: usize,
        order: &OrderSpec,
        group_by: &[Expr],
        table_aggregate: bool,
    ) -> (MatchResult, Option<GroupingOrder>) {
        let ctx = self.ctx;
        let bindings = ctx.bindings();
        let matcher = ctx.matcher(scope, bindings);

        for name in matcher.excluded_partial_indexes() {
            ctx.trace(Event::PartialIndexExcluded, &[("index", name), ("table", ctx.table(scope).name.as_str())]);
        }

        let result = if table_aggregate {
            (matcher.match_order(&OrderSpec::empty()), None)
        } else if group_by.is_empty() {
            (matcher.match_order(order), None)
        } else if group_by.iter().all(|g| bindings.is_bound(g)) {
            let grouping = GroupingOrder {
                ordered_prefix: Vec::new(),
                covers_all: true,
            };
            (matcher.match_order(order), Some(grouping))
        } else {
            let order_groups = !order.is_empty() && order.exprs().iter().all(|e| group_by.contains(e));
            let ordered = if order_groups {
                match matcher.match_order(order) {
                    MatchResult::FullOrder(choice) => {
                        let (prefix, covers_all) = matcher.grouping_for(&choice, group_by);
                        covers_all.then(|| {
                            let grouping = GroupingOrder {
                                ordered_prefix: prefix,
                                covers_all,
                            };
                            (MatchResult::FullOrder(choice), Some(grouping))
                        })
                    }
                    _ => None,
                }
            } else {
                None
            };

            match ordered {
                Some(found) => found,
                None => match matcher.match_grouping(group_by) {
                    Some(gm) => {
                        let grouping = GroupingOrder {
                            ordered_prefix: gm.ordered_prefix,
                            covers_all: gm.covers_all,
                        };
                        (MatchResult::PartialOrder(gm.choice), Some(grouping))
                    }
                    None => (matcher.match_order(&OrderSpec::empty()), None),
                },
            }
        };

        let table = ctx.table(scope).name.as_str();
        match result.0.choice() {
            Some(choice) => {
                if let Some(metrics) = ctx.metrics() {
                    metrics.increment_index_scans();
                }
                ctx.trace(
                    Event::IndexSelected,
                    &[("index", choice.index.as_str()), ("table", table), ("verdict", result.0.as_str())],
                );
            }
            None => {
                if let Some(metrics) = ctx.metrics() {
                    metrics.increment_seq_scans();
                }
                ctx.trace(Event::NoApplicableIndex, &[("table", table)]);
            }
        }
        result
    }

    fn scan_node(&self, scope: usize, verdict: &MatchResult) -> PlanNode {
        let table = self.ctx.table(scope);
        match verdict.choice() {
            Some(choice) => PlanNode::IndexScan(choice.to_scan(table, scope)),
            None => PlanNode::SeqScan {
                table: table.name.clone(),
                scope,
                predicate: Expr::and_all(self.ctx.local_conjuncts(scope).into_iter().cloned().collect()),
                limit: None,
            },
        }
    }

    /// Joins `scope` as the inner side of a nested loop. An index whose
    /// leading key is pinned by a constant or an outer column turns the
    /// loop into an index lookup.
    fn nested_loop_join(&self, outer: PlanNode, scope: usize, joined: &BTreeSet<usize>) -> PlanNode {
        let ctx = self.ctx;
        let correlated = ctx.bindings().with_correlated(scope, joined);
        let verdict = ctx.matcher(scope, &correlated).match_order(&OrderSpec::empty());
        let join_conjuncts = ctx.join_conjuncts(scope, joined);

        match verdict.choice() {
            Some(choice) if choice.equality_prefix() > 0 => {
                let table = ctx.table(scope);
                let predicate = join_conjuncts
                    .into_iter()
                    .filter(|c| !choice.consumed.iter().any(|used| used.normalized() == c.normalized()))
                    .cloned()
                    .collect();
                PlanNode::NestedLoopIndexJoin {
                    outer: Box::new(outer),
                    inner: Box::new(PlanNode::IndexScan(choice.to_scan(table, scope))),
                    predicate: Expr::and_all(predicate),
                }
            }
            _ => PlanNode::NestedLoopJoin {
                outer: Box::new(outer),
                inner: Box::new(self.scan_node(scope, &self.inner_verdict(scope))),
                predicate: Expr::and_all(join_conjuncts.into_iter().cloned().collect()),
            },
        }
    }

    fn hash_join(&self, outer: PlanNode, scope: usize, joined: &BTreeSet<usize>) -> PlanNode {
        let join_conjuncts = self.ctx.join_conjuncts(scope, joined);
        PlanNode::HashJoin {
            outer: Box::new(outer),
            inner: Box::new(self.scan_node(scope, &self.inner_verdict(scope))),
            predicate: Expr::and_all(join_conjuncts.into_iter().cloned().collect()),
        }
    }

    /// Scan of an inner input on constant bindings only
    fn inner_verdict(&self, scope: usize) -> MatchResult {
        self.ctx
            .matcher(scope, self.ctx.bindings())
            .match_order(&OrderSpec::empty())
    }

    /// Layers the aggregate (and a distinct pass, if any) over an access
    /// path. Returns the strategy used for the grouping step.
    pub fn aggregate(&self, access: AccessPlan, agg: &Aggregation) -> (PlanNode, AggregatePushdown) {
        let (node, strategy) = self.aggregate_with(access.node, access.grouping.as_ref(), agg, agg.aggregates.clone());
        let node = match &agg.distinct_over {
            Some(display) => PlanNode::HashAggregate {
                child: Box::new(node),
                group_by: display.clone(),
                aggregates: Vec::new(),
            },
            None => node,
        };
        (node, strategy)
    }

    /// Grouping step only, computing `aggregates`
    pub fn aggregate_with(
        &self,
        input: PlanNode,
        grouping: Option<&GroupingOrder>,
        agg: &Aggregation,
        aggregates: Vec<Expr>,
    ) -> (PlanNode, AggregatePushdown) {
        let group_by = agg.group_by.clone();
        let strategy = self.aggregate_strategy(grouping, agg);
        let child = Box::new(input);
        let node = match &strategy {
            AggregatePushdown::Serial { .. } => PlanNode::SerialAggregate {
                child,
                group_by,
                aggregates,
                limit: None,
            },
            AggregatePushdown::Partial { group_prefix, .. } => PlanNode::PartialAggregate {
                child,
                group_by,
                ordered_prefix: group_prefix.clone(),
                aggregates,
                limit: None,
            },
            AggregatePushdown::Hash | AggregatePushdown::None | AggregatePushdown::Local => PlanNode::HashAggregate {
                child,
                group_by,
                aggregates,
            },
        };
        (node, strategy)
    }

    fn aggregate_strategy(&self, grouping: Option<&GroupingOrder>, agg: &Aggregation) -> AggregatePushdown {
        if agg.is_table_aggregate() {
            return AggregatePushdown::Serial {
                group_prefix: Vec::new(),
            };
        }
        let Some(grouping) = grouping else {
            return AggregatePushdown::Hash;
        };
        if grouping.covers_all {
            return AggregatePushdown::Serial {
                group_prefix: grouping.ordered_prefix.clone(),
            };
        }
        if grouping.ordered_prefix.is_empty() || !self.ctx.config().enable_partial_aggregate {
            return AggregatePushdown::Hash;
        }
        let bindings = self.ctx.bindings();
        let unordered_suffix = agg
            .group_by
            .iter()
            .filter(|g| !grouping.ordered_prefix.contains(g) && !bindings.is_bound(g))
            .cloned()
            .collect();
        AggregatePushdown::Partial {
            group_prefix: grouping.ordered_prefix.clone(),
            unordered_suffix,
        }
    }

    /// Adds an explicit sort unless `node` already emits `order`
    pub fn establish_order(&self, node: PlanNode, order: &OrderSpec) -> PlanNode {
        if self.is_ordered(&node, order) {
            return node;
        }
        let ctx = self.ctx;
        if let Some(metrics) = ctx.metrics() {
            metrics.increment_sorts_added();
        }
        let keys = order
            .items()
            .iter()
            .map(|i| format!("{} {}", i.expr, i.direction.as_str()))
            .collect::<Vec<_>>()
            .join(", ");
        ctx.trace(Event::SortAdded, &[("keys", keys.as_str())]);
        PlanNode::OrderBy {
            child: Box::new(node),
            sort: order.items().to_vec(),
            limit: None,
        }
    }

    pub fn is_ordered(&self, node: &PlanNode, order: &OrderSpec) -> bool {
        order.is_empty() || order.is_satisfied_by(&node.output_order(), self.ctx.bindings())
    }
}

/// Fuses `limit` into the terminal node when it has a free limit slot,
/// otherwise places a `Limit` node above it
pub fn with_limit(node: PlanNode, spec: LimitSpec) -> PlanNode {
    match node {
        PlanNode::OrderBy { child, sort, limit: None } => PlanNode::OrderBy {
            child,
            sort,
            limit: Some(spec),
        },
        PlanNode::SeqScan {
            table,
            scope,
            predicate,
            limit: None,
        } => PlanNode::SeqScan {
            table,
            scope,
            predicate,
            limit: Some(spec),
        },
        PlanNode::IndexScan(mut scan) if scan.limit.is_none() => {
            scan.limit = Some(spec);
            PlanNode::IndexScan(scan)
        }
        PlanNode::SerialAggregate {
            child,
            group_by,
            aggregates,
            limit: None,
        } => PlanNode::SerialAggregate {
            child,
            group_by,
            aggregates,
            limit: Some(spec),
        },
        PlanNode::PartialAggregate {
            child,
            group_by,
            ordered_prefix,
            aggregates,
            limit: None,
        } => PlanNode::PartialAggregate {
            child,
            group_by,
            ordered_prefix,
            aggregates,
            limit: Some(spec),
        },
        PlanNode::MergeReceive {
            columns,
            order_by,
            aggregate: Some(mut agg),
            limit,
        } if agg.limit.is_none() => {
            agg.limit = Some(spec);
            PlanNode::MergeReceive {
                columns,
                order_by,
                aggregate: Some(agg),
                limit,
            }
        }
        PlanNode::MergeReceive {
            columns,
            order_by,
            aggregate: None,
            limit: None,
        } => PlanNode::MergeReceive {
            columns,
            order_by,
            aggregate: None,
            limit: Some(spec),
        },
        other => PlanNode::Limit {
            child: Box::new(other),
            limit: spec,
        },
    }
}

pub fn project(node: PlanNode, columns: Vec<OutputColumnDef>) -> PlanNode {
    PlanNode::Projection {
        child: Box::new(node),
        columns,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Catalog, IndexDescriptor, Table};
    use crate::expr::AggregateFunction;
    use crate::plan::PlanNodeType;
    use crate::planner::PlannerConfig;
    use crate::query::ResolvedQuery;

    fn catalog() -> Catalog {
        Catalog::new()
            .with_table(
                Table::new("T")
                    .with_columns(&["T_D0", "T_D1", "T_D2"])
                    .with_index(IndexDescriptor::new("T_PK").asc(0, "T_D0").asc(1, "T_D1").primary_key()),
            )
            .with_table(Table::new("TNOKEY").with_columns(&["T_D0", "T_D1", "T_D2"]))
    }

    fn t(index: usize) -> Expr {
        Expr::column(0, index, "T", &format!("T_D{}", index))
    }

    fn assemble(query: &ResolvedQuery) -> PlanNode {
        let catalog = catalog();
        let config = PlannerConfig::default();
        let ctx = PlanningContext::new(query, &catalog, &config).unwrap();
        Assembler::new(&ctx).assemble().unwrap()
    }

    #[test]
    fn test_index_supplies_order() {
        let q = ResolvedQuery::from_table("T").select(t(0)).order_asc(t(0)).order_asc(t(1));
        let plan = assemble(&q);
        assert!(plan.has_node_of_type(PlanNodeType::IndexScan));
        assert!(!plan.has_node_of_type(PlanNodeType::OrderBy));
    }

    #[test]
    fn test_limit_inlined_into_sort() {
        let q = ResolvedQuery::from_table("T").select(t(0)).order_asc(t(2)).limit(4);
        let plan = assemble(&q);
        let sort = plan.find(PlanNodeType::OrderBy).unwrap();
        assert_eq!(sort.inline_limit(), Some(&LimitSpec::fixed(4)));
        assert!(!plan.has_node_of_type(PlanNodeType::Limit));
    }

    #[test]
    fn test_limit_above_hash_aggregate() {
        let q = ResolvedQuery::from_table("T")
            .select(t(2))
            .select(Expr::count_star())
            .group_by(t(2))
            .limit(2);
        let plan = assemble(&q);
        assert!(plan.has_node_of_type(PlanNodeType::HashAggregate));
        assert!(plan.has_node_of_type(PlanNodeType::Limit));
    }

    #[test]
    fn test_serial_aggregate_on_primary_key_prefix() {
        let q = ResolvedQuery::from_table("T")
            .select(t(0))
            .select(Expr::aggregate(AggregateFunction::Sum, t(2)))
            .group_by(t(0))
            .order_asc(t(0));
        let plan = assemble(&q);
        assert!(plan.has_node_of_type(PlanNodeType::SerialAggregate));
        assert!(!plan.has_node_of_type(PlanNodeType::OrderBy));
    }

    #[test]
    fn test_table_aggregate_needs_no_sort() {
        let max = Expr::aggregate(AggregateFunction::Max, t(2));
        let q = ResolvedQuery::from_table("T").select(max.clone()).order_asc(max);
        let plan = assemble(&q);
        assert!(plan.has_node_of_type(PlanNodeType::SerialAggregate));
        assert!(!plan.has_node_of_type(PlanNodeType::OrderBy));
    }

    #[test]
    fn test_distinct_is_grouping() {
        let q = ResolvedQuery::from_table("T").distinct().select(t(0)).order_asc(t(0));
        let plan = assemble(&q);
        assert!(plan.has_node_of_type(PlanNodeType::SerialAggregate));
        assert!(plan.has_node_of_type(PlanNodeType::IndexScan));
        assert!(!plan.has_node_of_type(PlanNodeType::OrderBy));
    }

    #[test]
    fn test_with_limit_slots() {
        let scan = PlanNode::SeqScan {
            table: "T".into(),
            scope: 0,
            predicate: None,
            limit: None,
        };
        let limited = with_limit(scan, LimitSpec::fixed(1));
        assert_eq!(limited.node_type(), PlanNodeType::SeqScan);
        let twice = with_limit(limited, LimitSpec::fixed(2));
        assert_eq!(twice.node_type(), PlanNodeType::Limit);
    }
}
