//! Plan representation
//!
//! The planner's output: an immutable tree of plan nodes per fragment,
//! wrapped in a versioned `CompiledPlan`, plus a deterministic explain
//! rendering.

mod compiled;
mod explain;
mod node;

pub use compiled::{AggregatePushdown, CompiledPlan, Distribution, PLAN_FORMAT_VERSION};
pub use explain::ExplainPlan;
pub use node::{
    IndexScanNode, InlineAggregate, InlineAggregateKind, LimitSpec, OutputColumnDef, PlanNode, PlanNodeType,
    ScanDirection,
};
