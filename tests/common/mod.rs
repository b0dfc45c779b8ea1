//! Shared catalog fixture for planner integration tests
//!
//! - T: two columns, plain index on (T_D0, T_D1)
//! - T2: primary key (T_D0, T_D1)
//! - TNOKEY: no indexes
//! - T3: partial index on T_D1 WHERE T_D2 > 3
//! - P: partitioned on P_D0, indexes on P_D1 and (P_D3, P_D2)
//! - P1: partitioned on P1_D0

#![allow(dead_code)]

use shardplan::catalog::{Catalog, IndexDescriptor, Table};
use shardplan::expr::Expr;
use shardplan::plan::CompiledPlan;
use shardplan::planner::{PlannerConfig, PlannerResult, QueryPlanner};
use shardplan::query::ResolvedQuery;

pub fn catalog() -> Catalog {
    Catalog::new()
        .with_table(
            Table::new("T")
                .with_columns(&["T_D0", "T_D1"])
                .with_index(IndexDescriptor::new("T_D0_D1_IDX").asc(0, "T_D0").asc(1, "T_D1")),
        )
        .with_table(
            Table::new("T2")
                .with_columns(&["T_D0", "T_D1", "T_D2"])
                .with_index(IndexDescriptor::new("T2_PK").asc(0, "T_D0").asc(1, "T_D1").primary_key()),
        )
        .with_table(Table::new("TNOKEY").with_columns(&["T_D0", "T_D1", "T_D2"]))
        .with_table(
            Table::new("T3").with_columns(&["T_D0", "T_D1", "T_D2"]).with_index(
                IndexDescriptor::new("T3_D1_IDX")
                    .asc(1, "T_D1")
                    .with_predicate(Expr::gt(col(0, "T3", 2), Expr::int(3))),
            ),
        )
        .with_table(
            Table::new("P")
                .with_columns(&["P_D0", "P_D1", "P_D2", "P_D3", "P_D4"])
                .partitioned_on("P_D0")
                .with_index(IndexDescriptor::new("P_D1_IDX").asc(1, "P_D1"))
                .with_index(IndexDescriptor::new("P_D32_IDX").asc(3, "P_D3").asc(2, "P_D2")),
        )
        .with_table(
            Table::new("P1")
                .with_columns(&["P1_D0", "P1_D1", "P1_D2"])
                .partitioned_on("P1_D0"),
        )
}

/// `T_D{index}` of a T-family table in `scope`
pub fn col(scope: usize, table: &str, index: usize) -> Expr {
    Expr::column(scope, index, table, &format!("T_D{}", index))
}

/// `P_D{index}` of P in scope 0
pub fn p(index: usize) -> Expr {
    Expr::column(0, index, "P", &format!("P_D{}", index))
}

/// `P1_D{index}` of P1 in `scope`
pub fn p1(scope: usize, index: usize) -> Expr {
    Expr::column(scope, index, "P1", &format!("P1_D{}", index))
}

pub fn plan(query: &ResolvedQuery) -> PlannerResult<CompiledPlan> {
    plan_with(query, &PlannerConfig::default())
}

pub fn plan_with(query: &ResolvedQuery, config: &PlannerConfig) -> PlannerResult<CompiledPlan> {
    let catalog = catalog();
    QueryPlanner::new(&catalog, config).plan(query)
}
