//! Index Metadata Catalog
//!
//! Per-table index lists plus the partitioning scheme. Owned by the
//! catalog collaborator; the planner reads a snapshot and never writes.
//!
//! # Invariants
//!
//! - Indexes keep declaration order (the final, stable tie-break)
//! - Index expressions are written against scope 0
//! - Unique keys are only derived from non-partial, plain-column indexes

mod errors;
mod index;
mod snapshot;
mod table;

pub use errors::{CatalogError, CatalogResult};
pub use index::{IndexDescriptor, IndexKeyPart, SortDirection};
pub use snapshot::Catalog;
pub use table::{Partitioning, Table};
