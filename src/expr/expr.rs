//! Resolved expression trees
//!
//! Expressions arrive fully bound: every column is a `ColumnRef`. The
//! planner only ever compares expressions structurally (`PartialEq`); no
//! algebraic rewriting is attempted.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::column::ColumnRef;

/// Constant values
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Literal {
    Null,
    Bool(bool),
    Int(i64),
    Text(String),
}

/// Comparison operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompareOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
}

impl CompareOp {
    /// Operator after swapping the operands (`a < b` == `b > a`)
    pub fn flip(self) -> Self {
        match self {
            CompareOp::Eq => CompareOp::Eq,
            CompareOp::NotEq => CompareOp::NotEq,
            CompareOp::Lt => CompareOp::Gt,
            CompareOp::LtEq => CompareOp::GtEq,
            CompareOp::Gt => CompareOp::Lt,
            CompareOp::GtEq => CompareOp::LtEq,
        }
    }

    pub fn is_range(self) -> bool {
        matches!(
            self,
            CompareOp::Lt | CompareOp::LtEq | CompareOp::Gt | CompareOp::GtEq
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::NotEq => "<>",
            CompareOp::Lt => "<",
            CompareOp::LtEq => "<=",
            CompareOp::Gt => ">",
            CompareOp::GtEq => ">=",
        }
    }
}

/// Arithmetic operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArithmeticOp {
    Add,
    Subtract,
    Multiply,
    Divide,
}

impl ArithmeticOp {
    pub fn as_str(self) -> &'static str {
        match self {
            ArithmeticOp::Add => "+",
            ArithmeticOp::Subtract => "-",
            ArithmeticOp::Multiply => "*",
            ArithmeticOp::Divide => "/",
        }
    }
}

/// Aggregate functions understood by the planner
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregateFunction {
    Count,
    Sum,
    Min,
    Max,
    Avg,
}

impl AggregateFunction {
    pub fn as_str(self) -> &'static str {
        match self {
            AggregateFunction::Count => "COUNT",
            AggregateFunction::Sum => "SUM",
            AggregateFunction::Min => "MIN",
            AggregateFunction::Max => "MAX",
            AggregateFunction::Avg => "AVG",
        }
    }

    /// Function that combines per-partition partial results, if the
    /// aggregate can be split into a partition phase and a coordinator phase.
    pub fn combiner(self, distinct: bool) -> Option<AggregateFunction> {
        match (self, distinct) {
            (AggregateFunction::Min, _) => Some(AggregateFunction::Min),
            (AggregateFunction::Max, _) => Some(AggregateFunction::Max),
            (AggregateFunction::Count, false) => Some(AggregateFunction::Sum),
            (AggregateFunction::Sum, false) => Some(AggregateFunction::Sum),
            _ => None,
        }
    }
}

/// A resolved expression
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Expr {
    Column(ColumnRef),
    Literal(Literal),
    Parameter(usize),
    Compare {
        op: CompareOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    And(Vec<Expr>),
    Or(Vec<Expr>),
    Arithmetic {
        op: ArithmeticOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Function {
        name: String,
        args: Vec<Expr>,
    },
    /// `arg == None` is `COUNT(*)`
    Aggregate {
        function: AggregateFunction,
        arg: Option<Box<Expr>>,
        distinct: bool,
    },
    /// Position in the output row of a plan fragment
    OutputColumn { index: usize, name: String },
}

impl Expr {
    pub fn column(scope: usize, index: usize, table: &str, name: &str) -> Self {
        Expr::Column(ColumnRef::new(scope, index, table, name))
    }

    pub fn int(value: i64) -> Self {
        Expr::Literal(Literal::Int(value))
    }

    pub fn text(value: impl Into<String>) -> Self {
        Expr::Literal(Literal::Text(value.into()))
    }

    pub fn param(index: usize) -> Self {
        Expr::Parameter(index)
    }

    pub fn compare(op: CompareOp, left: Expr, right: Expr) -> Self {
        Expr::Compare {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn eq(left: Expr, right: Expr) -> Self {
        Self::compare(CompareOp::Eq, left, right)
    }

    pub fn lt(left: Expr, right: Expr) -> Self {
        Self::compare(CompareOp::Lt, left, right)
    }

    pub fn lte(left: Expr, right: Expr) -> Self {
        Self::compare(CompareOp::LtEq, left, right)
    }

    pub fn gt(left: Expr, right: Expr) -> Self {
        Self::compare(CompareOp::Gt, left, right)
    }

    pub fn gte(left: Expr, right: Expr) -> Self {
        Self::compare(CompareOp::GtEq, left, right)
    }

    pub fn add(left: Expr, right: Expr) -> Self {
        Expr::Arithmetic {
            op: ArithmeticOp::Add,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    /// Function call; names are stored upper-case
    pub fn function(name: &str, args: Vec<Expr>) -> Self {
        Expr::Function {
            name: name.to_ascii_uppercase(),
            args,
        }
    }

    pub fn aggregate(function: AggregateFunction, arg: Expr) -> Self {
        Expr::Aggregate {
            function,
            arg: Some(Box::new(arg)),
            distinct: false,
        }
    }

    pub fn count_star() -> Self {
        Expr::Aggregate {
            function: AggregateFunction::Count,
            arg: None,
            distinct: false,
        }
    }

    pub fn output(index: usize, name: impl Into<String>) -> Self {
        Expr::OutputColumn {
            index,
            name: name.into(),
        }
    }

    /// Conjunction of the given predicates (`None` when empty)
    pub fn and_all(mut predicates: Vec<Expr>) -> Option<Expr> {
        match predicates.len() {
            0 => None,
            1 => predicates.pop(),
            _ => Some(Expr::And(predicates)),
        }
    }

    /// Top-level AND terms, flattened
    pub fn conjuncts(&self) -> Vec<&Expr> {
        match self {
            Expr::And(terms) => terms.iter().flat_map(|t| t.conjuncts()).collect(),
            other => vec![other],
        }
    }

    pub fn as_column(&self) -> Option<&ColumnRef> {
        match self {
            Expr::Column(col) => Some(col),
            _ => None,
        }
    }

    /// Literal or parameter: a value fixed for the whole execution
    pub fn is_constant_like(&self) -> bool {
        matches!(self, Expr::Literal(_) | Expr::Parameter(_))
    }

    /// Direct sub-expressions
    pub fn children(&self) -> Vec<&Expr> {
        match self {
            Expr::Column(_) | Expr::Literal(_) | Expr::Parameter(_) | Expr::OutputColumn { .. } => {
                Vec::new()
            }
            Expr::Compare { left, right, .. } | Expr::Arithmetic { left, right, .. } => {
                vec![left.as_ref(), right.as_ref()]
            }
            Expr::And(terms) | Expr::Or(terms) => terms.iter().collect(),
            Expr::Function { args, .. } => args.iter().collect(),
            Expr::Aggregate { arg, .. } => arg.iter().map(|a| a.as_ref()).collect(),
        }
    }

    /// All column references, in tree order
    pub fn columns(&self) -> Vec<&ColumnRef> {
        let mut out = Vec::new();
        self.collect_columns(&mut out);
        out
    }

    fn collect_columns<'a>(&'a self, out: &mut Vec<&'a ColumnRef>) {
        if let Expr::Column(col) = self {
            out.push(col);
        }
        for child in self.children() {
            child.collect_columns(out);
        }
    }

    /// Scopes referenced by this expression
    pub fn scopes(&self) -> BTreeSet<usize> {
        self.columns().into_iter().map(|c| c.scope).collect()
    }

    pub fn contains_aggregate(&self) -> bool {
        matches!(self, Expr::Aggregate { .. }) || self.children().into_iter().any(Expr::contains_aggregate)
    }

    /// Outermost aggregate sub-expressions, de-duplicated, in tree order
    pub fn aggregates(&self) -> Vec<&Expr> {
        let mut out = Vec::new();
        self.collect_aggregates(&mut out);
        out
    }

    fn collect_aggregates<'a>(&'a self, out: &mut Vec<&'a Expr>) {
        if matches!(self, Expr::Aggregate { .. }) {
            if !out.contains(&self) {
                out.push(self);
            }
            return;
        }
        for child in self.children() {
            child.collect_aggregates(out);
        }
    }

    /// Rewrites columns of a catalog-side expression (written against
    /// scope 0) into the given query scope.
    pub fn bind_scope(&self, scope: usize) -> Expr {
        self.rewrite(&|e| match e {
            Expr::Column(col) => Some(Expr::Column(col.with_scope(scope))),
            _ => None,
        })
    }

    /// Comparison with the constant side moved to the right
    pub fn normalized(&self) -> Expr {
        match self {
            Expr::Compare { op, left, right } if left.is_constant_like() && !right.is_constant_like() => {
                Expr::Compare {
                    op: op.flip(),
                    left: right.clone(),
                    right: left.clone(),
                }
            }
            other => other.clone(),
        }
    }

    /// Top-down substitution. `f` returning `Some` replaces the node and
    /// stops descent into it.
    pub fn rewrite<F>(&self, f: &F) -> Expr
    where
        F: Fn(&Expr) -> Option<Expr>,
    {
        if let Some(replaced) = f(self) {
            return replaced;
        }
        match self {
            Expr::Column(_) | Expr::Literal(_) | Expr::Parameter(_) | Expr::OutputColumn { .. } => {
                self.clone()
            }
            Expr::Compare { op, left, right } => Expr::Compare {
                op: *op,
                left: Box::new(left.rewrite(f)),
                right: Box::new(right.rewrite(f)),
            },
            Expr::Arithmetic { op, left, right } => Expr::Arithmetic {
                op: *op,
                left: Box::new(left.rewrite(f)),
                right: Box::new(right.rewrite(f)),
            },
            Expr::And(terms) => Expr::And(terms.iter().map(|t| t.rewrite(f)).collect()),
            Expr::Or(terms) => Expr::Or(terms.iter().map(|t| t.rewrite(f)).collect()),
            Expr::Function { name, args } => Expr::Function {
                name: name.clone(),
                args: args.iter().map(|a| a.rewrite(f)).collect(),
            },
            Expr::Aggregate {
                function,
                arg,
                distinct,
            } => Expr::Aggregate {
                function: *function,
                arg: arg.as_ref().map(|a| Box::new(a.rewrite(f))),
                distinct: *distinct,
            },
        }
    }

    /// True when `self` can be evaluated from `available` expressions,
    /// constants and (optionally) aggregates alone.
    pub fn is_computable_from(&self, available: &[&Expr], allow_aggregates: bool) -> bool {
        if available.contains(&self) || self.is_constant_like() {
            return true;
        }
        match self {
            Expr::Column(_) | Expr::OutputColumn { .. } => false,
            Expr::Aggregate { .. } => allow_aggregates,
            other => other
                .children()
                .into_iter()
                .all(|c| c.is_computable_from(available, allow_aggregates)),
        }
    }
}
