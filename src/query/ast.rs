//! Resolved query representation
//!
//! What the parser/binder hands over: FROM list (scope = position),
//! WHERE tree, display list, GROUP BY / ORDER BY lists and LIMIT/OFFSET.
//! Every expression is already resolved against the catalog.

use serde::{Deserialize, Serialize};

use crate::catalog::{SortDirection, Table};
use crate::expr::Expr;

/// A table in the FROM list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableRef {
    pub table: String,
    #[serde(default)]
    pub alias: Option<String>,
}

/// One entry of the SELECT list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayColumn {
    pub expr: Expr,
    #[serde(default)]
    pub alias: Option<String>,
}

impl DisplayColumn {
    /// Output column name: alias, column name, or expression text
    pub fn name(&self) -> String {
        if let Some(alias) = &self.alias {
            return alias.clone();
        }
        match self.expr.as_column() {
            Some(col) if !col.name.is_empty() => col.name.clone(),
            _ => self.expr.to_string(),
        }
    }
}

/// One ORDER BY entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub expr: Expr,
    #[serde(default)]
    pub direction: SortDirection,
}

/// LIMIT / OFFSET value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RowLimit {
    Fixed(u64),
    Parameter(usize),
}

/// Join execution strategy requested by the binder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JoinStrategy {
    /// Nested loops driven by the outer-most input; preserves its order
    #[default]
    NestedLoop,
    /// Hash joins; interleave rows, no order survives
    Hash,
}

/// Fully resolved query
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedQuery {
    pub tables: Vec<TableRef>,
    #[serde(default)]
    pub filter: Option<Expr>,
    pub display: Vec<DisplayColumn>,
    #[serde(default)]
    pub distinct: bool,
    #[serde(default)]
    pub group_by: Vec<Expr>,
    #[serde(default)]
    pub order_by: Vec<OrderItem>,
    #[serde(default)]
    pub limit: Option<RowLimit>,
    #[serde(default)]
    pub offset: Option<RowLimit>,
    #[serde(default)]
    pub join_strategy: JoinStrategy,
}

impl ResolvedQuery {
    /// Starts a query over a single table
    pub fn from_table(table: impl Into<String>) -> Self {
        Self {
            tables: vec![TableRef {
                table: table.into(),
                alias: None,
            }],
            filter: None,
            display: Vec::new(),
            distinct: false,
            group_by: Vec::new(),
            order_by: Vec::new(),
            limit: None,
            offset: None,
            join_strategy: JoinStrategy::NestedLoop,
        }
    }

    /// Adds a table to the FROM list; its scope is the new position
    pub fn join(mut self, table: impl Into<String>) -> Self {
        self.tables.push(TableRef {
            table: table.into(),
            alias: None,
        });
        self
    }

    pub fn select(mut self, expr: Expr) -> Self {
        self.display.push(DisplayColumn { expr, alias: None });
        self
    }

    pub fn select_as(mut self, expr: Expr, alias: impl Into<String>) -> Self {
        self.display.push(DisplayColumn {
            expr,
            alias: Some(alias.into()),
        });
        self
    }

    /// `SELECT *` expansion for one FROM entry
    pub fn select_star(mut self, table: &Table, scope: usize) -> Self {
        for index in 0..table.columns.len() {
            self = self.select(table.column_expr(scope, index));
        }
        self
    }

    /// ANDs a predicate into the WHERE clause
    pub fn filter(mut self, predicate: Expr) -> Self {
        self.filter = match self.filter.take() {
            None => Some(predicate),
            Some(existing) => Expr::and_all(vec![existing, predicate]),
        };
        self
    }

    pub fn distinct(mut self) -> Self {
        self.distinct = true;
        self
    }

    pub fn group_by(mut self, expr: Expr) -> Self {
        self.group_by.push(expr);
        self
    }

    pub fn order_by(mut self, expr: Expr, direction: SortDirection) -> Self {
        self.order_by.push(OrderItem { expr, direction });
        self
    }

    pub fn order_asc(self, expr: Expr) -> Self {
        self.order_by(expr, SortDirection::Asc)
    }

    pub fn order_desc(self, expr: Expr) -> Self {
        self.order_by(expr, SortDirection::Desc)
    }

    pub fn limit(mut self, count: u64) -> Self {
        self.limit = Some(RowLimit::Fixed(count));
        self
    }

    pub fn limit_param(mut self, index: usize) -> Self {
        self.limit = Some(RowLimit::Parameter(index));
        self
    }

    pub fn offset(mut self, count: u64) -> Self {
        self.offset = Some(RowLimit::Fixed(count));
        self
    }

    pub fn hash_join(mut self) -> Self {
        self.join_strategy = JoinStrategy::Hash;
        self
    }

    /// Top-level WHERE conjuncts
    pub fn filter_conjuncts(&self) -> Vec<&Expr> {
        self.filter.as_ref().map(|f| f.conjuncts()).unwrap_or_default()
    }

    pub fn display_exprs(&self) -> Vec<&Expr> {
        self.display.iter().map(|d| &d.expr).collect()
    }

    /// Aggregate calls in display and ORDER BY, de-duplicated
    pub fn aggregate_exprs(&self) -> Vec<&Expr> {
        let mut out: Vec<&Expr> = Vec::new();
        let sources = self
            .display
            .iter()
            .map(|d| &d.expr)
            .chain(self.order_by.iter().map(|o| &o.expr));
        for expr in sources {
            for agg in expr.aggregates() {
                if !out.contains(&agg) {
                    out.push(agg);
                }
            }
        }
        out
    }

    /// Query groups rows (GROUP BY or aggregate functions)
    pub fn is_aggregate(&self) -> bool {
        !self.group_by.is_empty() || !self.aggregate_exprs().is_empty()
    }

    /// Aggregates without GROUP BY: a single output row
    pub fn is_table_aggregate(&self) -> bool {
        self.group_by.is_empty() && !self.aggregate_exprs().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::AggregateFunction;

    fn t(index: usize) -> Expr {
        Expr::column(0, index, "T", &format!("T_D{}", index))
    }

    #[test]
    fn test_builder() {
        let q = ResolvedQuery::from_table("T")
            .select(t(0))
            .filter(Expr::eq(t(0), Expr::int(1)))
            .filter(Expr::gt(t(1), Expr::param(0)))
            .order_desc(t(1))
            .limit(5);
        assert_eq!(q.filter_conjuncts().len(), 2);
        assert_eq!(q.order_by[0].direction, SortDirection::Desc);
        assert_eq!(q.limit, Some(RowLimit::Fixed(5)));
        assert!(!q.is_aggregate());
    }

    #[test]
    fn test_aggregate_detection() {
        let max = Expr::aggregate(AggregateFunction::Max, t(1));
        let q = ResolvedQuery::from_table("T").select(max.clone()).order_asc(max);
        assert!(q.is_aggregate());
        assert!(q.is_table_aggregate());
        assert_eq!(q.aggregate_exprs().len(), 1);

        let grouped = ResolvedQuery::from_table("T").select(t(0)).group_by(t(0));
        assert!(grouped.is_aggregate());
        assert!(!grouped.is_table_aggregate());
    }

    #[test]
    fn test_display_names() {
        let q = ResolvedQuery::from_table("T")
            .select(t(0))
            .select_as(Expr::count_star(), "FOO")
            .select(Expr::add(t(1), Expr::int(1)));
        let names: Vec<String> = q.display.iter().map(|d| d.name()).collect();
        assert_eq!(names, vec!["T_D0", "FOO", "(T.T_D1 + 1)"]);
    }

    #[test]
    fn test_json_round_shape() {
        let json = r#"{
            "tables": [{"table": "T"}],
            "display": [{"expr": {"type": "column", "value": {"scope": 0, "index": 0, "name": "T_D0"}}}],
            "order_by": [{"expr": {"type": "column", "value": {"scope": 0, "index": 0}}, "direction": "desc"}],
            "limit": {"fixed": 3}
        }"#;
        let q: ResolvedQuery = serde_json::from_str(json).unwrap();
        assert_eq!(q.limit, Some(RowLimit::Fixed(3)));
        assert_eq!(q.join_strategy, JoinStrategy::NestedLoop);
        assert_eq!(q.order_by[0].direction, SortDirection::Desc);
    }
}
