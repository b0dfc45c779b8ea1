//! Order requirement analysis
//!
//! `reduce` strips the leading ORDER BY items pinned by an equality; the
//! determinism verdict decides whether the requested order still leaves
//! ties. Both work on structural expression equality only.
//!
//! # Invariants
//!
//! - `reduce` never reorders items
//! - `reduce` never drops a bound item once an unbound item precedes it
//! - A deterministic verdict never removes an explicit sort unless the row
//!   set collapses to at most one row

use serde::{Deserialize, Serialize};

use super::equality::EqualityBindings;
use crate::catalog::{SortDirection, Table};
use crate::expr::Expr;
use crate::query::{OrderItem, ResolvedQuery};

/// One sort key
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SortItem {
    pub expr: Expr,
    pub direction: SortDirection,
}

impl SortItem {
    pub fn new(expr: Expr, direction: SortDirection) -> Self {
        Self { expr, direction }
    }
}

/// How a provided order satisfies a required one
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderCompatibility {
    /// Provided order runs in the opposite direction on every matched item
    pub inverted: bool,
}

/// Ordered list of sort keys
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderSpec {
    items: Vec<SortItem>,
}

impl OrderSpec {
    pub fn new(items: Vec<SortItem>) -> Self {
        Self { items }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_order_by(order_by: &[OrderItem]) -> Self {
        Self::new(
            order_by
                .iter()
                .map(|o| SortItem::new(o.expr.clone(), o.direction))
                .collect(),
        )
    }

    pub fn items(&self) -> &[SortItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn exprs(&self) -> Vec<&Expr> {
        self.items.iter().map(|i| &i.expr).collect()
    }

    /// Every item sorts the same way
    pub fn is_uniform(&self) -> bool {
        self.items
            .windows(2)
            .all(|w| w[0].direction == w[1].direction)
    }

    /// Same keys, every direction flipped
    pub fn inverted(&self) -> OrderSpec {
        Self::new(
            self.items
                .iter()
                .map(|i| SortItem::new(i.expr.clone(), i.direction.inverse()))
                .collect(),
        )
    }

    /// Whether rows arriving in `provided` order already satisfy `self`.
    ///
    /// Bound items on either side are constants and match trivially. All
    /// matched items must agree on forward vs. inverted direction.
    pub fn compatibility(&self, provided: &OrderSpec, bindings: &EqualityBindings) -> Option<OrderCompatibility> {
        let mut remaining = provided
            .items
            .iter()
            .filter(|p| !bindings.is_bound(&p.expr));
        let mut inverted: Option<bool> = None;

        for required in &self.items {
            if bindings.is_bound(&required.expr) {
                continue;
            }
            let next = remaining.next()?;
            if next.expr != required.expr {
                return None;
            }
            let flip = next.direction != required.direction;
            match inverted {
                None => inverted = Some(flip),
                Some(previous) if previous != flip => return None,
                Some(_) => {}
            }
        }

        Some(OrderCompatibility {
            inverted: inverted.unwrap_or(false),
        })
    }

    /// Satisfied as-is, without running the input backwards
    pub fn is_satisfied_by(&self, provided: &OrderSpec, bindings: &EqualityBindings) -> bool {
        matches!(
            self.compatibility(provided, bindings),
            Some(OrderCompatibility { inverted: false })
        )
    }
}

impl FromIterator<SortItem> for OrderSpec {
    fn from_iter<I: IntoIterator<Item = SortItem>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

/// Drops the leading items pinned to a constant by an equality binding
pub fn reduce(order_by: &OrderSpec, bindings: &EqualityBindings) -> OrderSpec {
    order_by
        .items
        .iter()
        .skip_while(|item| bindings.is_bound(&item.expr))
        .cloned()
        .collect()
}

/// Whether the requested order leaves ties between rows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeterminismVerdict {
    Deterministic,
    NonDeterministic,
    Unknown,
}

impl DeterminismVerdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeterminismVerdict::Deterministic => "DETERMINISTIC",
            DeterminismVerdict::NonDeterministic => "NON_DETERMINISTIC",
            DeterminismVerdict::Unknown => "UNKNOWN",
        }
    }
}

/// Computes the determinism verdict for `order` (already reduced).
///
/// Only plain columns count toward key coverage; expression keys never
/// prove determinism, so such queries report `Unknown`.
pub fn analyze_determinism(
    query: &ResolvedQuery,
    tables: &[&Table],
    order: &OrderSpec,
    bindings: &EqualityBindings,
) -> DeterminismVerdict {
    if query.is_table_aggregate() {
        return DeterminismVerdict::Deterministic;
    }

    if !query.group_by.is_empty() {
        let covered = query
            .group_by
            .iter()
            .all(|g| bindings.is_bound(g) || order.exprs().contains(&g));
        return if covered {
            DeterminismVerdict::Deterministic
        } else {
            DeterminismVerdict::NonDeterministic
        };
    }

    let [table] = tables else {
        return DeterminismVerdict::Unknown;
    };

    let mut covered = bindings.bound_columns(0);
    let mut plain = true;
    for item in order.items() {
        match item.expr.as_column() {
            Some(col) if col.scope == 0 => {
                covered.insert(col.index);
            }
            _ => plain = false,
        }
    }

    let unique_covered = table
        .unique_keys()
        .iter()
        .any(|key| key.iter().all(|c| covered.contains(c)));
    let all_covered = (0..table.columns.len()).all(|c| covered.contains(&c));

    if unique_covered || all_covered {
        DeterminismVerdict::Deterministic
    } else if plain {
        DeterminismVerdict::NonDeterministic
    } else {
        DeterminismVerdict::Unknown
    }
}

/// At most one row can reach the sort: a table aggregate, or a single
/// table whose unique key is fully pinned by equalities.
pub fn collapses_to_single_row(query: &ResolvedQuery, tables: &[&Table], bindings: &EqualityBindings) -> bool {
    if query.is_table_aggregate() {
        return true;
    }
    if !query.group_by.is_empty() {
        return false;
    }
    let [table] = tables else {
        return false;
    };
    let bound = bindings.bound_columns(0);
    table
        .unique_keys()
        .iter()
        .any(|key| key.iter().all(|c| bound.contains(c)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::IndexDescriptor;
    use crate::expr::AggregateFunction;

    fn t(index: usize) -> Expr {
        Expr::column(0, index, "T", &format!("T_D{}", index))
    }

    fn asc(e: Expr) -> SortItem {
        SortItem::new(e, SortDirection::Asc)
    }

    fn desc(e: Expr) -> SortItem {
        SortItem::new(e, SortDirection::Desc)
    }

    fn table_t() -> Table {
        Table::new("T")
            .with_columns(&["T_D0", "T_D1", "T_D2"])
            .with_index(IndexDescriptor::new("T_PK").asc(0, "T_D0").asc(1, "T_D1").primary_key())
    }

    fn bind(filter: Expr) -> EqualityBindings {
        EqualityBindings::from_filter(Some(&filter))
    }

    #[test]
    fn test_reduce_drops_leading_bound_only() {
        let order = OrderSpec::new(vec![asc(t(0)), asc(t(1)), asc(t(2))]);
        let bindings = bind(Expr::And(vec![
            Expr::eq(t(0), Expr::int(1)),
            Expr::eq(t(2), Expr::int(5)),
        ]));
        let reduced = reduce(&order, &bindings);
        assert_eq!(reduced.items(), &[asc(t(1)), asc(t(2))]);
    }

    #[test]
    fn test_reduce_keeps_non_leading_bound() {
        let order = OrderSpec::new(vec![desc(t(1)), asc(t(0))]);
        let bindings = bind(Expr::eq(t(0), Expr::param(0)));
        assert_eq!(reduce(&order, &bindings), order);
    }

    #[test]
    fn test_reduce_everything_bound() {
        let order = OrderSpec::new(vec![asc(t(0))]);
        let bindings = bind(Expr::eq(t(0), Expr::param(0)));
        assert!(reduce(&order, &bindings).is_empty());
    }

    #[test]
    fn test_compatibility_inverted() {
        let required = OrderSpec::new(vec![desc(t(0)), desc(t(1))]);
        let provided = OrderSpec::new(vec![asc(t(0)), asc(t(1)), asc(t(2))]);
        let none = EqualityBindings::new();
        let compat = required.compatibility(&provided, &none).unwrap();
        assert!(compat.inverted);
        assert!(!required.is_satisfied_by(&provided, &none));
        assert!(required.inverted().is_satisfied_by(&provided, &none));
    }

    #[test]
    fn test_compatibility_mixed_direction_fails() {
        let required = OrderSpec::new(vec![asc(t(0)), desc(t(1))]);
        let provided = OrderSpec::new(vec![asc(t(0)), asc(t(1))]);
        assert!(required.compatibility(&provided, &EqualityBindings::new()).is_none());
        assert!(!required.is_uniform());
    }

    #[test]
    fn test_compatibility_skips_bound_items() {
        let required = OrderSpec::new(vec![asc(t(0)), asc(t(2))]);
        let provided = OrderSpec::new(vec![asc(t(1)), asc(t(0)), asc(t(2))]);
        let bindings = bind(Expr::eq(t(1), Expr::int(4)));
        assert!(required.is_satisfied_by(&provided, &bindings));
        assert!(required.compatibility(&provided, &EqualityBindings::new()).is_none());
    }

    #[test]
    fn test_shorter_provided_fails() {
        let required = OrderSpec::new(vec![asc(t(0)), asc(t(1))]);
        let provided = OrderSpec::new(vec![asc(t(0))]);
        assert!(required.compatibility(&provided, &EqualityBindings::new()).is_none());
    }

    #[test]
    fn test_determinism_unique_key() {
        let table = table_t();
        let query = ResolvedQuery::from_table("T").select(t(2));
        let none = EqualityBindings::new();

        let pk_order = OrderSpec::new(vec![asc(t(0)), asc(t(1))]);
        assert_eq!(
            analyze_determinism(&query, &[&table], &pk_order, &none),
            DeterminismVerdict::Deterministic
        );

        let permuted = OrderSpec::new(vec![asc(t(1)), asc(t(0))]);
        assert_eq!(
            analyze_determinism(&query, &[&table], &permuted, &none),
            DeterminismVerdict::Deterministic
        );

        let partial = OrderSpec::new(vec![asc(t(1))]);
        assert_eq!(
            analyze_determinism(&query, &[&table], &partial, &none),
            DeterminismVerdict::NonDeterministic
        );

        let bound = bind(Expr::eq(t(0), Expr::int(2)));
        assert_eq!(
            analyze_determinism(&query, &[&table], &partial, &bound),
            DeterminismVerdict::Deterministic
        );
    }

    #[test]
    fn test_determinism_all_columns() {
        let table = Table::new("TNOKEY").with_columns(&["T_D0", "T_D1"]);
        let query = ResolvedQuery::from_table("TNOKEY").select(t(0));
        let order = OrderSpec::new(vec![asc(t(1)), desc(t(0))]);
        assert_eq!(
            analyze_determinism(&query, &[&table], &order, &EqualityBindings::new()),
            DeterminismVerdict::Deterministic
        );
    }

    #[test]
    fn test_determinism_expression_unknown() {
        let table = table_t();
        let query = ResolvedQuery::from_table("T").select(t(0));
        let order = OrderSpec::new(vec![asc(Expr::function("abs", vec![t(0)]))]);
        assert_eq!(
            analyze_determinism(&query, &[&table], &order, &EqualityBindings::new()),
            DeterminismVerdict::Unknown
        );
    }

    #[test]
    fn test_determinism_aggregates() {
        let table = table_t();
        let max = Expr::aggregate(AggregateFunction::Max, t(2));
        let table_agg = ResolvedQuery::from_table("T").select(max.clone()).order_asc(max.clone());
        let order = OrderSpec::from_order_by(&table_agg.order_by);
        let none = EqualityBindings::new();
        assert_eq!(
            analyze_determinism(&table_agg, &[&table], &order, &none),
            DeterminismVerdict::Deterministic
        );
        assert!(collapses_to_single_row(&table_agg, &[&table], &none));

        let grouped = ResolvedQuery::from_table("T")
            .select(t(0))
            .select(max.clone())
            .group_by(t(0))
            .order_desc(max);
        let order = OrderSpec::from_order_by(&grouped.order_by);
        assert_eq!(
            analyze_determinism(&grouped, &[&table], &order, &none),
            DeterminismVerdict::NonDeterministic
        );
        assert!(!collapses_to_single_row(&grouped, &[&table], &none));
    }

    #[test]
    fn test_single_row_by_unique_key() {
        let table = table_t();
        let query = ResolvedQuery::from_table("T").select(t(2));
        let bindings = bind(Expr::And(vec![
            Expr::eq(t(0), Expr::int(1)),
            Expr::eq(t(1), Expr::param(0)),
        ]));
        assert!(collapses_to_single_row(&query, &[&table], &bindings));
        let half = bind(Expr::eq(t(0), Expr::int(1)));
        assert!(!collapses_to_single_row(&query, &[&table], &half));
    }
}
