//! Planner Determinism Tests
//!
//! - The same query against the same catalog always yields the same plan
//! - Order reduction is idempotent and never lengthens the ORDER BY
//! - Observability never feeds back into planning

mod common;

use common::{catalog, col, p, plan, plan_with};
use shardplan::catalog::SortDirection;
use shardplan::expr::{AggregateFunction, Expr};
use shardplan::observability::PlannerMetrics;
use shardplan::plan::{CompiledPlan, ExplainPlan};
use shardplan::planner::{reduce, EqualityBindings, OrderSpec, PlannerConfig, QueryPlanner, SortItem};
use shardplan::query::ResolvedQuery;

fn t2(index: usize) -> Expr {
    col(0, "T2", index)
}

fn sample_queries() -> Vec<ResolvedQuery> {
    let max = Expr::aggregate(AggregateFunction::Max, p(2));
    vec![
        ResolvedQuery::from_table("T2").select(t2(2)).order_asc(t2(0)).order_asc(t2(1)),
        ResolvedQuery::from_table("T2")
            .select(t2(2))
            .filter(Expr::eq(t2(0), Expr::param(0)))
            .order_desc(t2(1))
            .limit(5),
        ResolvedQuery::from_table("P").select(p(1)).order_asc(p(1)).limit(3),
        ResolvedQuery::from_table("P")
            .select(p(1))
            .select(max)
            .group_by(p(1))
            .order_asc(p(1)),
    ]
}

// =============================================================================
// Plan Stability
// =============================================================================

/// Planning twice gives equal plans and equal fingerprints.
#[test]
fn test_planning_is_repeatable() {
    for q in sample_queries() {
        let first = plan(&q).unwrap();
        let second = plan(&q).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.fingerprint().unwrap(), second.fingerprint().unwrap());
    }
}

/// Serialized plans read back unchanged.
#[test]
fn test_plan_json_is_stable() {
    let q = &sample_queries()[3];
    let compiled = plan(q).unwrap();
    let json = compiled.to_json().unwrap();
    let restored: CompiledPlan = serde_json::from_str(&json).unwrap();
    assert_eq!(restored, compiled);
}

/// Different queries get different fingerprints.
#[test]
fn test_fingerprint_distinguishes_plans() {
    let queries = sample_queries();
    let a = plan(&queries[0]).unwrap().fingerprint().unwrap();
    let b = plan(&queries[1]).unwrap().fingerprint().unwrap();
    assert_ne!(a, b);
}

/// Decision logging and metrics observe planning without changing it.
#[test]
fn test_observability_does_not_change_plans() {
    let catalog = catalog();
    let quiet = PlannerConfig::default();
    let verbose = PlannerConfig::default().with_decision_logging(true);
    let metrics = PlannerMetrics::new();

    for q in sample_queries() {
        let plain = QueryPlanner::new(&catalog, &quiet).plan(&q).unwrap();
        let observed = QueryPlanner::new(&catalog, &verbose)
            .with_metrics(&metrics)
            .plan(&q)
            .unwrap();
        assert_eq!(plain, observed);
    }
    assert_eq!(metrics.snapshot().plans_compiled, sample_queries().len() as u64);
}

/// Explain output is a pure function of the plan.
#[test]
fn test_explain_is_repeatable() {
    for q in sample_queries() {
        let first = ExplainPlan::from_plan(&plan(&q).unwrap());
        let second = ExplainPlan::from_plan(&plan(&q).unwrap());
        assert_eq!(first.to_string(), second.to_string());
        assert!(first.accepted);
    }
}

// =============================================================================
// Order Reduction
// =============================================================================

fn asc(e: Expr) -> SortItem {
    SortItem::new(e, SortDirection::Asc)
}

fn desc(e: Expr) -> SortItem {
    SortItem::new(e, SortDirection::Desc)
}

/// Reducing an already reduced order changes nothing.
#[test]
fn test_reduce_is_idempotent() {
    let filter = Expr::And(vec![
        Expr::eq(t2(0), Expr::int(1)),
        Expr::eq(t2(2), Expr::param(0)),
    ]);
    let bindings = EqualityBindings::from_filter(Some(&filter));
    let orders = vec![
        OrderSpec::new(vec![asc(t2(0)), desc(t2(1)), asc(t2(2))]),
        OrderSpec::new(vec![asc(t2(2)), asc(t2(0))]),
        OrderSpec::new(vec![asc(t2(1))]),
        OrderSpec::empty(),
    ];

    for order in &orders {
        let once = reduce(order, &bindings);
        assert_eq!(reduce(&once, &bindings), once);
        assert!(once.len() <= order.len());
    }
}

/// Reduction keeps the relative order and direction of what survives.
#[test]
fn test_reduce_keeps_suffix() {
    let bindings = EqualityBindings::from_filter(Some(&Expr::eq(t2(0), Expr::int(1))));
    let order = OrderSpec::new(vec![asc(t2(0)), desc(t2(1)), asc(t2(0))]);
    assert_eq!(reduce(&order, &bindings).items(), &[desc(t2(1)), asc(t2(0))]);
}

/// Without bindings reduction is the identity.
#[test]
fn test_reduce_without_bindings() {
    let order = OrderSpec::new(vec![desc(t2(2)), asc(t2(0))]);
    assert_eq!(reduce(&order, &EqualityBindings::new()), order);
}

/// A sort is never added for an ORDER BY that reduces to nothing.
#[test]
fn test_fully_bound_order_needs_no_sort() {
    let q = ResolvedQuery::from_table("TNOKEY")
        .select(col(0, "TNOKEY", 2))
        .filter(Expr::And(vec![
            Expr::eq(col(0, "TNOKEY", 0), Expr::int(1)),
            Expr::eq(col(0, "TNOKEY", 1), Expr::int(2)),
        ]))
        .order_asc(col(0, "TNOKEY", 0))
        .order_desc(col(0, "TNOKEY", 1));
    let compiled = plan_with(&q, &PlannerConfig::default()).unwrap();
    assert!(!compiled
        .root()
        .has_node_of_type(shardplan::plan::PlanNodeType::OrderBy));
}
