//! Planning context
//!
//! Everything one compilation needs, resolved once and passed by reference
//! to every planning step: the query, the catalog tables per FROM scope,
//! the equality bindings of the WHERE clause and the planner config.
//! Nothing in here changes after construction.

use std::collections::BTreeSet;

use super::config::PlannerConfig;
use super::equality::EqualityBindings;
use super::errors::{PlannerError, PlannerResult};
use super::matcher::IndexMatcher;
use super::order::{reduce, OrderSpec};
use crate::catalog::{Catalog, Table};
use crate::expr::Expr;
use crate::observability::{log_event_with_fields, Event, PlannerMetrics};
use crate::plan::{LimitSpec, OutputColumnDef};
use crate::query::{ResolvedQuery, RowLimit};

pub struct PlanningContext<'a> {
    query: &'a ResolvedQuery,
    tables: Vec<&'a Table>,
    bindings: EqualityBindings,
    config: &'a PlannerConfig,
    metrics: Option<&'a PlannerMetrics>,
}

impl<'a> PlanningContext<'a> {
    /// Resolves every FROM entry against the catalog snapshot
    pub fn new(query: &'a ResolvedQuery, catalog: &'a Catalog, config: &'a PlannerConfig) -> PlannerResult<Self> {
        let tables = query
            .tables
            .iter()
            .map(|t| catalog.table(&t.table).ok_or_else(|| PlannerError::unknown_table(&t.table)))
            .collect::<PlannerResult<Vec<_>>>()?;

        Ok(Self {
            query,
            tables,
            bindings: EqualityBindings::from_filter(query.filter.as_ref()),
            config,
            metrics: None,
        })
    }

    pub fn with_metrics(mut self, metrics: &'a PlannerMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn query(&self) -> &'a ResolvedQuery {
        self.query
    }

    pub fn tables(&self) -> &[&'a Table] {
        &self.tables
    }

    /// Table at a FROM scope; scopes are checked by query validation
    pub fn table(&self, scope: usize) -> &'a Table {
        self.tables[scope]
    }

    pub fn bindings(&self) -> &EqualityBindings {
        &self.bindings
    }

    pub fn config(&self) -> &'a PlannerConfig {
        self.config
    }

    pub fn metrics(&self) -> Option<&'a PlannerMetrics> {
        self.metrics
    }

    /// WHERE conjuncts evaluable on `scope` alone. Column-free conjuncts
    /// ride with scope 0.
    pub fn local_conjuncts(&self, scope: usize) -> Vec<&'a Expr> {
        self.query
            .filter_conjuncts()
            .into_iter()
            .filter(|c| {
                let scopes = c.scopes();
                match scopes.len() {
                    0 => scope == 0,
                    1 => scopes.contains(&scope),
                    _ => false,
                }
            })
            .collect()
    }

    /// Multi-scope conjuncts that become evaluable once `scope` joins
    /// the inputs in `outer`
    pub fn join_conjuncts(&self, scope: usize, outer: &BTreeSet<usize>) -> Vec<&'a Expr> {
        self.query
            .filter_conjuncts()
            .into_iter()
            .filter(|c| {
                let scopes = c.scopes();
                scopes.len() > 1
                    && scopes.contains(&scope)
                    && scopes.iter().all(|s| *s == scope || outer.contains(s))
            })
            .collect()
    }

    /// Matcher for `scope` using the given bindings
    pub fn matcher<'b>(&'b self, scope: usize, bindings: &'b EqualityBindings) -> IndexMatcher<'b> {
        IndexMatcher::new(scope, self.table(scope), bindings, self.local_conjuncts(scope), self.config)
    }

    pub fn requested_order(&self) -> OrderSpec {
        OrderSpec::from_order_by(&self.query.order_by)
    }

    /// ORDER BY minus leading items pinned by an equality
    pub fn reduced_order(&self) -> OrderSpec {
        reduce(&self.requested_order(), &self.bindings)
    }

    pub fn limit_spec(&self) -> Option<LimitSpec> {
        LimitSpec::new(self.query.limit, self.query.offset)
    }

    /// LIMIT a partition may apply on its own: enough rows to serve the
    /// coordinator's OFFSET too. A parameterized OFFSET cannot be folded.
    pub fn partition_limit(&self) -> Option<LimitSpec> {
        if !self.config.push_limit_to_partitions {
            return None;
        }
        let limit = match (self.query.limit?, self.query.offset) {
            (RowLimit::Fixed(n), None) => RowLimit::Fixed(n),
            (RowLimit::Fixed(n), Some(RowLimit::Fixed(off))) => RowLimit::Fixed(n.saturating_add(off)),
            (RowLimit::Parameter(p), None) => RowLimit::Parameter(p),
            _ => return None,
        };
        Some(LimitSpec {
            limit: Some(limit),
            offset: None,
        })
    }

    /// Display list as output columns
    pub fn display_columns(&self) -> Vec<OutputColumnDef> {
        self.query
            .display
            .iter()
            .map(|d| OutputColumnDef {
                expr: d.expr.clone(),
                name: d.name(),
            })
            .collect()
    }

    /// Output name for an expression: its display name when displayed
    pub fn column_name(&self, expr: &Expr) -> String {
        self.query
            .display
            .iter()
            .find(|d| &d.expr == expr)
            .map(|d| d.name())
            .unwrap_or_else(|| expr.to_string())
    }

    /// Emits a TRACE decision event when decision logging is on
    pub fn trace(&self, event: Event, fields: &[(&str, &str)]) {
        if self.config.log_decisions {
            log_event_with_fields(event, fields);
        }
    }
}
