//! Query planner subsystem
//!
//! Turns a resolved query into an immutable plan tree for a partitioned
//! engine. The interesting decisions are about order:
//!
//! - which leading ORDER BY items are pinned by equalities (`order`)
//! - whether an index scan already emits the required order (`matcher`)
//! - where a sort, a limit and an aggregate sit in a fragment (`assembler`)
//! - whether the coordinator can merge sorted partition streams and finish
//!   a GROUP BY without re-sorting (`distributed`)
//!
//! # Determinism
//!
//! Every tie-break (index choice, driver choice, aggregate strategy) is
//! resolved by declaration order, so planning the same query against the
//! same catalog twice yields identical plans.
//!
//! # Conservative proofs
//!
//! Equality bindings, partial-index implication and determinism are all
//! proven structurally. A plan that cannot be proven order-safe keeps its
//! sort.

mod assembler;
mod config;
mod context;
mod distributed;
mod equality;
mod errors;
mod implication;
mod matcher;
mod order;
mod planner;

pub use assembler::{with_limit, AccessPlan, Aggregation, Assembler, GroupingOrder};
pub use config::{ConfigError, PlannerConfig};
pub use context::PlanningContext;
pub use distributed::{
    check_merge_invariant, classify, CoordinatorPlanBuilt, LocalPlanned, MergeabilityChecked,
};
pub use equality::{Binding, BindingSource, EqualityBindings, JoinEquality, RangeBound};
pub use errors::{PlannerError, PlannerErrorCode, PlannerResult, Severity};
pub use implication::{implies, residual};
pub use matcher::{GroupingMatch, IndexChoice, IndexMatcher, MatchResult};
pub use order::{
    analyze_determinism, collapses_to_single_row, reduce, DeterminismVerdict, OrderCompatibility, OrderSpec,
    SortItem,
};
pub use planner::QueryPlanner;
