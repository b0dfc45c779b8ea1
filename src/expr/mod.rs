//! Expression / column model
//!
//! The binder hands the planner fully resolved expression trees. This
//! module is a thin data model over them: structural equality, column
//! and scope extraction, and the few rewrites the planner needs (scope
//! binding, comparison normalization, output-column substitution).

mod column;
mod display;
mod expr;

pub use column::ColumnRef;
pub use expr::{AggregateFunction, ArithmeticOp, CompareOp, Expr, Literal};
