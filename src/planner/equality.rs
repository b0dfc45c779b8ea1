//! Equality bindings
//!
//! Expressions proven constant within one query scope by a top-level WHERE
//! conjunct (`expr = literal`, `expr = ?`), plus the join equalities and
//! range conjuncts the matcher needs to size index search keys.
//!
//! Equalities are never chained: `A.x = B.y AND B.y = ?` binds `B.y` only.

use std::collections::BTreeSet;

use crate::expr::{ColumnRef, CompareOp, Expr};

/// Where a bound value comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingSource {
    /// Literal or parameter
    Constant,
    /// Column of an outer nested-loop input, fixed per inner lookup
    Correlated,
}

/// One expression pinned to a value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binding {
    pub expr: Expr,
    pub value: Expr,
    pub source: BindingSource,
    /// WHERE conjunct that established the binding
    pub conjunct: Expr,
}

/// `left = right` between columns of two different scopes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinEquality {
    pub left: ColumnRef,
    pub right: ColumnRef,
    pub conjunct: Expr,
}

impl JoinEquality {
    /// Side belonging to `scope`, and the opposite side
    pub fn side(&self, scope: usize) -> Option<(&ColumnRef, &ColumnRef)> {
        if self.left.scope == scope {
            Some((&self.left, &self.right))
        } else if self.right.scope == scope {
            Some((&self.right, &self.left))
        } else {
            None
        }
    }
}

/// A range conjunct over a single-scope expression, normalized so the
/// expression sits on the left
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeBound {
    pub expr: Expr,
    pub conjunct: Expr,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EqualityBindings {
    bindings: Vec<Binding>,
    joins: Vec<JoinEquality>,
    ranges: Vec<RangeBound>,
}

impl EqualityBindings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Collects bindings from the top-level conjuncts of a WHERE clause
    pub fn from_filter(filter: Option<&Expr>) -> Self {
        let mut out = Self::new();
        let conjuncts = filter.map(|f| f.conjuncts()).unwrap_or_default();
        for conjunct in conjuncts {
            out.record(conjunct);
        }
        out
    }

    fn record(&mut self, conjunct: &Expr) {
        let normalized = conjunct.normalized();
        let Expr::Compare { op, left, right } = &normalized else {
            return;
        };

        if right.is_constant_like() && !left.is_constant_like() {
            if left.scopes().len() != 1 {
                return;
            }
            match op {
                CompareOp::Eq => {
                    if !self.is_bound(left) {
                        self.bindings.push(Binding {
                            expr: left.as_ref().clone(),
                            value: right.as_ref().clone(),
                            source: BindingSource::Constant,
                            conjunct: conjunct.clone(),
                        });
                    }
                }
                op if op.is_range() => self.ranges.push(RangeBound {
                    expr: left.as_ref().clone(),
                    conjunct: normalized.clone(),
                }),
                _ => {}
            }
            return;
        }

        if *op == CompareOp::Eq {
            if let (Some(l), Some(r)) = (left.as_column(), right.as_column()) {
                if l.scope != r.scope {
                    self.joins.push(JoinEquality {
                        left: l.clone(),
                        right: r.clone(),
                        conjunct: conjunct.clone(),
                    });
                }
            }
        }
    }

    /// Adds inner-side join columns as correlated bindings for a
    /// nested-loop inner input at `scope`
    pub fn with_correlated(&self, scope: usize, outer_scopes: &BTreeSet<usize>) -> Self {
        let mut out = self.clone();
        for join in &self.joins {
            let Some((inner, outer)) = join.side(scope) else {
                continue;
            };
            if !outer_scopes.contains(&outer.scope) {
                continue;
            }
            let expr = Expr::Column(inner.clone());
            if out.is_bound(&expr) {
                continue;
            }
            out.bindings.push(Binding {
                expr,
                value: Expr::Column(outer.clone()),
                source: BindingSource::Correlated,
                conjunct: join.conjunct.clone(),
            });
        }
        out
    }

    pub fn is_bound(&self, expr: &Expr) -> bool {
        self.binding(expr).is_some()
    }

    pub fn binding(&self, expr: &Expr) -> Option<&Binding> {
        self.bindings.iter().find(|b| &b.expr == expr)
    }

    pub fn bindings(&self) -> &[Binding] {
        &self.bindings
    }

    /// Column indices of plain columns bound in `scope`
    pub fn bound_columns(&self, scope: usize) -> BTreeSet<usize> {
        self.bindings
            .iter()
            .filter_map(|b| b.expr.as_column())
            .filter(|c| c.scope == scope)
            .map(|c| c.index)
            .collect()
    }

    pub fn is_column_bound(&self, scope: usize, index: usize) -> bool {
        self.bound_columns(scope).contains(&index)
    }

    /// Range conjuncts constraining `expr`
    pub fn ranges_on(&self, expr: &Expr) -> Vec<&Expr> {
        self.ranges
            .iter()
            .filter(|r| &r.expr == expr)
            .map(|r| &r.conjunct)
            .collect()
    }

    pub fn join_equalities(&self) -> &[JoinEquality] {
        &self.joins
    }

    /// Join equalities touching both scopes
    pub fn joins_between(&self, a: usize, b: usize) -> Vec<&JoinEquality> {
        self.joins
            .iter()
            .filter(|j| {
                (j.left.scope == a && j.right.scope == b) || (j.left.scope == b && j.right.scope == a)
            })
            .collect()
    }
}
