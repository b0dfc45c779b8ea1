//! Resolved query input
//!
//! The binder's output as the planner consumes it, plus the validity
//! checks that reject a query before any plan is built.

mod ast;
mod validate;

pub use ast::{DisplayColumn, JoinStrategy, OrderItem, ResolvedQuery, RowLimit, TableRef};
pub use validate::{validate_order_by, validate_structure};
