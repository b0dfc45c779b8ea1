//! shardplan - ORDER BY, index selection and merge planning for a
//! partitioned SQL engine
//!
//! The planner turns a resolved query and an immutable catalog snapshot
//! into a plan tree. On a partitioned table the plan is split into a
//! partition fragment and a coordinator fragment that merges partition
//! output, reusing sorted order where it can instead of sorting again.

pub mod catalog;
pub mod cli;
pub mod expr;
pub mod observability;
pub mod plan;
pub mod planner;
pub mod query;
