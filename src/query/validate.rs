//! Query validation
//!
//! Two checks run before any planning decision:
//! - structural: scopes and column indices resolve, no aggregates where
//!   rows are still being filtered or grouped
//! - ORDER BY validity under DISTINCT / GROUP BY

use super::ast::ResolvedQuery;
use crate::catalog::Table;
use crate::expr::Expr;
use crate::planner::{PlannerError, PlannerResult};

/// Checks that every expression resolves against the FROM list
pub fn validate_structure(query: &ResolvedQuery, tables: &[&Table]) -> PlannerResult<()> {
    if query.tables.is_empty() {
        return Err(PlannerError::invalid_query("FROM list is empty"));
    }
    if query.display.is_empty() {
        return Err(PlannerError::invalid_query("display list is empty"));
    }
    if tables.len() != query.tables.len() {
        return Err(PlannerError::internal("resolved table count differs from FROM list"));
    }

    let exprs = query
        .filter
        .iter()
        .chain(query.display.iter().map(|d| &d.expr))
        .chain(query.group_by.iter())
        .chain(query.order_by.iter().map(|o| &o.expr));
    for expr in exprs {
        for col in expr.columns() {
            let table = tables.get(col.scope).ok_or_else(|| {
                PlannerError::invalid_query(format!("column {} refers to scope {} outside FROM", col, col.scope))
            })?;
            if col.index >= table.columns.len() {
                return Err(PlannerError::invalid_query(format!(
                    "column index {} out of range for table {}",
                    col.index, table.name
                )));
            }
        }
    }

    if let Some(filter) = &query.filter {
        if filter.contains_aggregate() {
            return Err(PlannerError::invalid_query("aggregate in WHERE clause"));
        }
    }
    if query.group_by.iter().any(Expr::contains_aggregate) {
        return Err(PlannerError::invalid_query("aggregate in GROUP BY clause"));
    }

    Ok(())
}

/// ORDER BY must be derivable from what DISTINCT / GROUP BY produce.
///
/// Plain projections and joins may order by anything.
pub fn validate_order_by(query: &ResolvedQuery) -> PlannerResult<()> {
    let display = query.display_exprs();

    if !query.group_by.is_empty() {
        let grouping: Vec<&Expr> = query.group_by.iter().collect();
        for item in &query.order_by {
            let ok = display.contains(&&item.expr) || item.expr.is_computable_from(&grouping, true);
            if !ok {
                return Err(PlannerError::invalid_order_by(item.expr.to_string()));
            }
        }
    }

    if query.distinct {
        for item in &query.order_by {
            if !item.expr.is_computable_from(&display, false) {
                return Err(PlannerError::invalid_order_by(item.expr.to_string()));
            }
        }
    }

    Ok(())
}
