//! Distributed merge/aggregate planner
//!
//! A multi-partition query compiles in three steps, each consuming the
//! previous one:
//!
//! 1. `LocalPlanned`: the fragment every partition runs, including any
//!    partition-side aggregation, LIMIT pushdown and hidden order columns.
//! 2. `MergeabilityChecked`: whether the partition output order lets the
//!    coordinator stream a multi-way merge instead of buffering and sorting.
//! 3. `CoordinatorPlanBuilt`: the coordinator fragment, either a
//!    `MergeReceive` (inline order, aggregate and limit) or a `Receive`
//!    followed by aggregation, an explicit sort and a limit.
//!
//! Coordinator expressions refer to partition output positions
//! (`Expr::OutputColumn`). After a coordinator aggregate the row layout is
//! the grouping expressions followed by the aggregate values.

use super::assembler::{with_limit, Aggregation, Assembler};
use super::context::PlanningContext;
use super::equality::EqualityBindings;
use super::errors::{PlannerError, PlannerResult};
use super::order::{collapses_to_single_row, OrderSpec, SortItem};
use crate::expr::{AggregateFunction, Expr};
use crate::observability::Event;
use crate::plan::{AggregatePushdown, Distribution, InlineAggregate, InlineAggregateKind, OutputColumnDef, PlanNode};

/// Where a query runs, from the partitioning of its tables and the WHERE
/// clause. Two partitioned tables must be joined on their partition
/// columns to be planned at all.
pub fn classify(ctx: &PlanningContext<'_>) -> PlannerResult<Distribution> {
    let partitioned: Vec<(usize, usize)> = ctx
        .tables()
        .iter()
        .enumerate()
        .filter_map(|(scope, table)| table.partition_column().map(|column| (scope, column)))
        .collect();

    let Some(&(first_scope, first_column)) = partitioned.first() else {
        return Ok(Distribution::SingleNode);
    };

    for &(scope, column) in partitioned.iter().skip(1) {
        let colocated = ctx.bindings().joins_between(first_scope, scope).iter().any(|join| {
            join.side(first_scope)
                .map_or(false, |(mine, other)| mine.index == first_column && other.index == column)
        });
        if !colocated {
            return Err(PlannerError::invalid_query(format!(
                "partitioned tables {} and {} are not joined on their partition columns",
                ctx.table(first_scope).name,
                ctx.table(scope).name
            )));
        }
    }

    let pinned = partitioned
        .iter()
        .any(|&(scope, column)| ctx.bindings().is_column_bound(scope, column));
    if pinned {
        Ok(Distribution::SinglePartition)
    } else {
        Ok(Distribution::MultiPartition)
    }
}

/// Where aggregation happens for a multi-partition query
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AggregationMode {
    /// No aggregation; partitions ship projected rows
    Rows,
    /// Groups never span partitions; partitions aggregate completely
    Local,
    /// Partitions pre-aggregate, the coordinator combines partial results
    TwoPhase,
    /// Partitions ship rows, the coordinator aggregates
    Coordinator,
}

impl AggregationMode {
    fn of(ctx: &PlanningContext<'_>, aggregation: Option<&Aggregation>) -> Self {
        let Some(agg) = aggregation else {
            return AggregationMode::Rows;
        };
        let by_partition = ctx.tables().iter().enumerate().any(|(scope, table)| {
            table.partition_column().map_or(false, |column| {
                agg.group_by
                    .iter()
                    .filter_map(Expr::as_column)
                    .any(|c| c.scope == scope && c.index == column)
            })
        });
        if by_partition && agg.distinct_over.is_none() {
            return AggregationMode::Local;
        }
        if agg.aggregates.iter().all(|a| combiner_of(a).is_some()) {
            AggregationMode::TwoPhase
        } else {
            AggregationMode::Coordinator
        }
    }
}

fn combiner_of(aggregate: &Expr) -> Option<AggregateFunction> {
    match aggregate {
        Expr::Aggregate { function, distinct, .. } => function.combiner(*distinct),
        _ => None,
    }
}

/// Named expressions of a fragment's output row, by position
#[derive(Debug, Clone, PartialEq, Eq)]
struct Layout {
    columns: Vec<OutputColumnDef>,
}

impl Layout {
    fn new(ctx: &PlanningContext<'_>, exprs: Vec<Expr>) -> Self {
        let columns = exprs
            .into_iter()
            .map(|expr| OutputColumnDef {
                name: ctx.column_name(&expr),
                expr,
            })
            .collect();
        Self { columns }
    }

    fn names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    fn outputs(&self) -> Vec<Expr> {
        self.columns
            .iter()
            .enumerate()
            .map(|(i, c)| Expr::output(i, c.name.clone()))
            .collect()
    }

    fn output_of(&self, expr: &Expr) -> Option<Expr> {
        self.columns
            .iter()
            .enumerate()
            .find(|(_, c)| &c.expr == expr)
            .map(|(i, c)| Expr::output(i, c.name.clone()))
    }

    /// Rewrites `expr` over this layout's output positions
    fn substitute(&self, expr: &Expr) -> Expr {
        expr.rewrite(&|e: &Expr| self.output_of(e))
    }
}

/// Appends ORDER BY expressions missing from `exprs`
fn with_hidden_columns(mut exprs: Vec<Expr>, order: &OrderSpec) -> Vec<Expr> {
    for expr in order.exprs() {
        if !exprs.contains(expr) {
            exprs.push(expr.clone());
        }
    }
    exprs
}

/// Step 1: partition fragment
#[derive(Debug)]
pub struct LocalPlanned {
    partition: PlanNode,
    /// Partition output row
    layout: Layout,
    order: OrderSpec,
    aggregation: Option<Aggregation>,
    mode: AggregationMode,
    pushdown: Option<AggregatePushdown>,
}

impl LocalPlanned {
    pub fn plan(ctx: &PlanningContext<'_>) -> PlannerResult<Self> {
        let assembler = Assembler::new(ctx);
        let order = ctx.reduced_order();
        let aggregation = Aggregation::from_context(ctx);
        let mode = AggregationMode::of(ctx, aggregation.as_ref());

        let (partition, layout, pushdown) = match (&aggregation, mode) {
            (None, _) | (Some(_), AggregationMode::Rows) => {
                let access = assembler.plan_access(&order, None);
                let node = Self::order_and_limit(ctx, &assembler, access.node, &order);
                let layout = Layout::new(ctx, with_hidden_columns(display_exprs(ctx), &order));
                (node, layout, None)
            }
            (Some(agg), AggregationMode::Local) => {
                let access = assembler.plan_access(&order, Some(agg));
                let (node, _) = assembler.aggregate(access, agg);
                // Groups are complete; sort and LIMIT apply above the aggregate
                let node = Self::order_and_limit(ctx, &assembler, node, &order);
                let layout = Layout::new(ctx, with_hidden_columns(display_exprs(ctx), &order));
                (node, layout, Some(AggregatePushdown::Local))
            }
            (Some(agg), AggregationMode::TwoPhase) => {
                let access = assembler.plan_access(&order, Some(agg));
                let grouping = access.grouping.clone();
                let (node, strategy) =
                    assembler.aggregate_with(access.node, grouping.as_ref(), agg, agg.aggregates.clone());
                let exprs = agg.group_by.iter().chain(agg.aggregates.iter()).cloned().collect();
                (node, Layout::new(ctx, exprs), Some(strategy))
            }
            (Some(agg), AggregationMode::Coordinator) => {
                let access = assembler.plan_access(&OrderSpec::empty(), None);
                let mut exprs = agg.group_by.clone();
                for aggregate in &agg.aggregates {
                    if let Expr::Aggregate { arg: Some(arg), .. } = aggregate {
                        if !exprs.contains(&**arg) {
                            exprs.push((**arg).clone());
                        }
                    }
                }
                (access.node, Layout::new(ctx, exprs), Some(AggregatePushdown::None))
            }
        };

        if let Some(strategy) = &pushdown {
            ctx.trace(Event::AggregatePushdown, &[("strategy", strategy.as_str())]);
        }

        Ok(Self {
            partition: PlanNode::Projection {
                child: Box::new(partition),
                columns: layout.columns.clone(),
            },
            layout,
            order,
            aggregation,
            mode,
            pushdown,
        })
    }

    /// Partition-side sort and LIMIT. A sort without a LIMIT is left to the
    /// coordinator unless configured otherwise; the LIMIT is pushed only
    /// once the fragment emits the required order.
    fn order_and_limit(ctx: &PlanningContext<'_>, assembler: &Assembler<'_, '_>, node: PlanNode, order: &OrderSpec) -> PlanNode {
        let single_row = collapses_to_single_row(ctx.query(), ctx.tables(), ctx.bindings());
        let partition_limit = ctx.partition_limit();

        let wants_sort = partition_limit.is_some() || !ctx.config().partition_sort_requires_limit;
        let mut node = node;
        if !single_row && wants_sort {
            node = assembler.establish_order(node, order);
        }
        match partition_limit {
            Some(limit) if single_row || assembler.is_ordered(&node, order) => with_limit(node, limit),
            _ => node,
        }
    }

    /// Step 2
    pub fn check_mergeability(self, ctx: &PlanningContext<'_>) -> MergeabilityChecked {
        let merge = match self.merge_key(ctx) {
            Ok(key) => {
                if let Some(metrics) = ctx.metrics() {
                    metrics.increment_merge_receives();
                }
                let keys = key
                    .order_by
                    .iter()
                    .map(|i| format!("{} {}", i.expr, i.direction.as_str()))
                    .collect::<Vec<_>>()
                    .join(", ");
                ctx.trace(Event::MergeReceiveChosen, &[("keys", keys.as_str())]);
                Some(key)
            }
            Err(reason) => {
                if !self.order.is_empty() {
                    if let Some(metrics) = ctx.metrics() {
                        metrics.increment_merge_fallbacks();
                    }
                    ctx.trace(Event::MergeFallback, &[("reason", reason)]);
                }
                None
            }
        };
        MergeabilityChecked { local: self, merge }
    }

    fn merge_key(&self, ctx: &PlanningContext<'_>) -> Result<MergeKey, &'static str> {
        if !ctx.config().enable_merge_receive {
            return Err("merge receive disabled");
        }
        if self.order.is_empty() {
            return Err("no order to merge");
        }
        if !self.order.is_satisfied_by(&self.partition.output_order(), ctx.bindings()) {
            return Err("partition output not ordered");
        }

        let mut order_by = Vec::with_capacity(self.order.len());
        for item in self.order.items() {
            let expr = self.layout.output_of(&item.expr).ok_or("order expression not in partition output")?;
            order_by.push(SortItem::new(expr, item.direction));
        }

        let aggregate = match (&self.aggregation, self.mode) {
            (Some(agg), AggregationMode::TwoPhase) => {
                if agg.is_table_aggregate() {
                    return Err("table aggregate");
                }
                if agg.distinct_over.is_some() {
                    return Err("distinct over grouped output");
                }
                let bindings = ctx.bindings();
                let mut ordered_prefix = Vec::new();
                for (item, key) in self.order.items().iter().zip(&order_by) {
                    if !agg.group_by.contains(&item.expr) {
                        return Err("merge key is not a grouping prefix");
                    }
                    ordered_prefix.push(key.expr.clone());
                }
                let covers_all = agg
                    .group_by
                    .iter()
                    .all(|g| bindings.is_bound(g) || self.order.exprs().contains(&g));
                let kind = if covers_all {
                    InlineAggregateKind::Serial
                } else if ctx.config().enable_partial_aggregate {
                    InlineAggregateKind::Partial
                } else {
                    return Err("partial aggregation disabled");
                };
                Some(MergeAggregate { kind, ordered_prefix })
            }
            (Some(_), AggregationMode::Coordinator) => return Err("aggregates not decomposable"),
            _ => None,
        };

        Ok(MergeKey { order_by, aggregate })
    }
}

fn display_exprs(ctx: &PlanningContext<'_>) -> Vec<Expr> {
    ctx.query().display_exprs().into_iter().cloned().collect()
}

#[derive(Debug, Clone)]
struct MergeAggregate {
    kind: InlineAggregateKind,
    ordered_prefix: Vec<Expr>,
}

#[derive(Debug, Clone)]
struct MergeKey {
    /// Sort items over partition output positions
    order_by: Vec<SortItem>,
    aggregate: Option<MergeAggregate>,
}

/// Step 2 result
#[derive(Debug)]
pub struct MergeabilityChecked {
    local: LocalPlanned,
    merge: Option<MergeKey>,
}

impl MergeabilityChecked {
    /// Step 3
    pub fn build_coordinator(self, ctx: &PlanningContext<'_>) -> PlannerResult<CoordinatorPlanBuilt> {
        let local = self.local;
        let assembler = Assembler::new(ctx);
        let columns = local.layout.names();

        // Coordinator aggregate over the partition output, and the layout
        // of the rows it produces
        let (aggregates, post_layout) = match (&local.aggregation, local.mode) {
            (Some(agg), AggregationMode::TwoPhase) => {
                // Partial results follow the grouping columns
                let partials = local.layout.outputs().into_iter().skip(agg.group_by.len());
                let combiners = agg
                    .aggregates
                    .iter()
                    .zip(partials)
                    .map(|(a, partial)| {
                        let function = combiner_of(a)
                            .ok_or_else(|| PlannerError::internal(format!("aggregate {} has no combiner", a)))?;
                        Ok(Expr::Aggregate {
                            function,
                            arg: Some(Box::new(partial)),
                            distinct: false,
                        })
                    })
                    .collect::<PlannerResult<Vec<_>>>()?;
                (Some(combiners), local.layout.clone())
            }
            (Some(agg), AggregationMode::Coordinator) => {
                let rewritten = agg.aggregates.iter().map(|a| local.layout.substitute(a)).collect();
                let exprs = agg.group_by.iter().chain(agg.aggregates.iter()).cloned().collect();
                (Some(rewritten), Layout::new(ctx, exprs))
            }
            _ => (None, local.layout.clone()),
        };
        let group_outputs: Vec<Expr> = local
            .aggregation
            .as_ref()
            .map(|agg| agg.group_by.iter().map(|g| local.layout.substitute(g)).collect())
            .unwrap_or_default();

        let limit = ctx.limit_spec();
        let (coordinator, final_layout) = match self.merge {
            Some(key) => {
                let aggregate = match (key.aggregate, aggregates) {
                    (Some(merge_agg), Some(aggregates)) => Some(InlineAggregate {
                        kind: merge_agg.kind,
                        group_by: group_outputs,
                        ordered_prefix: merge_agg.ordered_prefix,
                        aggregates,
                        limit: None,
                    }),
                    (None, None) => None,
                    _ => return Err(PlannerError::internal("merge aggregate without coordinator aggregates")),
                };
                let node = PlanNode::MergeReceive {
                    columns,
                    order_by: key.order_by,
                    aggregate,
                    limit: None,
                };
                let node = match limit {
                    Some(limit) => with_limit(node, limit),
                    None => node,
                };
                (node, post_layout)
            }
            None => {
                let mut node = PlanNode::Receive { columns };
                let table_aggregate = local.aggregation.as_ref().map_or(false, Aggregation::is_table_aggregate);
                if let Some(aggregates) = aggregates {
                    node = if table_aggregate {
                        PlanNode::SerialAggregate {
                            child: Box::new(node),
                            group_by: Vec::new(),
                            aggregates,
                            limit: None,
                        }
                    } else {
                        PlanNode::HashAggregate {
                            child: Box::new(node),
                            group_by: group_outputs,
                            aggregates,
                        }
                    };
                }

                let mut layout = post_layout;
                if let Some(display) = local.aggregation.as_ref().and_then(|a| a.distinct_over.as_ref()) {
                    node = PlanNode::HashAggregate {
                        child: Box::new(node),
                        group_by: display.iter().map(|d| layout.substitute(d)).collect(),
                        aggregates: Vec::new(),
                    };
                    layout = Layout::new(ctx, display.clone());
                }

                let order: OrderSpec = local
                    .order
                    .items()
                    .iter()
                    .map(|item| SortItem::new(layout.substitute(&item.expr), item.direction))
                    .collect();
                if !table_aggregate {
                    node = assembler.establish_order(node, &order);
                }
                if let Some(limit) = limit {
                    node = with_limit(node, limit);
                }
                (node, layout)
            }
        };

        let display: Vec<OutputColumnDef> = ctx
            .display_columns()
            .into_iter()
            .map(|c| OutputColumnDef {
                expr: final_layout.substitute(&c.expr),
                name: c.name,
            })
            .collect();
        let identity = display.len() == final_layout.columns.len()
            && display
                .iter()
                .zip(final_layout.outputs())
                .all(|(column, output)| column.expr == output);
        let coordinator = if identity {
            coordinator
        } else {
            PlanNode::Projection {
                child: Box::new(coordinator),
                columns: display,
            }
        };

        Ok(CoordinatorPlanBuilt {
            partition: local.partition,
            coordinator,
            aggregate_pushdown: local.pushdown,
        })
    }
}

/// Step 3 result: both fragments of a multi-partition plan
#[derive(Debug)]
pub struct CoordinatorPlanBuilt {
    pub partition: PlanNode,
    pub coordinator: PlanNode,
    pub aggregate_pushdown: Option<AggregatePushdown>,
}

impl CoordinatorPlanBuilt {
    /// Verifies the merge key of a `MergeReceive` against the partition
    /// output order
    pub fn check_merge_invariant(&self, bindings: &EqualityBindings) -> PlannerResult<()> {
        check_merge_invariant(&self.partition, &self.coordinator, bindings)
    }
}

/// A `MergeReceive` is only valid when every partition already emits rows
/// in its merge order. Maps the merge key back through the partition
/// projection and checks it against the partition's output order.
pub fn check_merge_invariant(partition: &PlanNode, coordinator: &PlanNode, bindings: &EqualityBindings) -> PlannerResult<()> {
    let Some(PlanNode::MergeReceive { order_by, .. }) = coordinator.find(crate::plan::PlanNodeType::MergeReceive) else {
        return Ok(());
    };
    let PlanNode::Projection { columns, .. } = partition else {
        return Err(PlannerError::internal("partition fragment has no output projection"));
    };

    let mut required = Vec::with_capacity(order_by.len());
    for item in order_by {
        let Expr::OutputColumn { index, .. } = &item.expr else {
            return Err(PlannerError::internal(format!("merge key {} is not an output column", item.expr)));
        };
        let column = columns
            .get(*index)
            .ok_or_else(|| PlannerError::internal(format!("merge key position {} out of range", index)))?;
        required.push(SortItem::new(column.expr.clone(), item.direction));
    }

    if OrderSpec::new(required).is_satisfied_by(&partition.output_order(), bindings) {
        Ok(())
    } else {
        Err(PlannerError::internal("merge receive over unordered partition output"))
    }
}
