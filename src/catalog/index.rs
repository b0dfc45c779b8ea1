//! Index metadata
//!
//! The planner only reads index *metadata*: the ordered key parts with
//! their declared direction, uniqueness, and the partial-index predicate.
//! Key expressions and predicates are written against scope 0 and bound
//! to a query scope on use.

use serde::{Deserialize, Serialize};

use crate::expr::Expr;

/// Sort direction of an index key part or an ORDER BY item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    pub fn inverse(self) -> Self {
        match self {
            SortDirection::Asc => SortDirection::Desc,
            SortDirection::Desc => SortDirection::Asc,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

/// One key part of an index
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexKeyPart {
    pub expr: Expr,
    #[serde(default)]
    pub direction: SortDirection,
}

/// Index descriptor, immutable for the duration of planning
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexDescriptor {
    pub name: String,
    pub key: Vec<IndexKeyPart>,
    #[serde(default)]
    pub unique: bool,
    #[serde(default)]
    pub primary_key: bool,
    /// Partial index predicate (rows outside it are not indexed)
    #[serde(default)]
    pub predicate: Option<Expr>,
}

impl IndexDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            key: Vec::new(),
            unique: false,
            primary_key: false,
            predicate: None,
        }
    }

    /// Appends an ascending column key part
    pub fn asc(self, column: usize, name: &str) -> Self {
        self.on(Expr::column(0, column, "", name), SortDirection::Asc)
    }

    /// Appends a descending column key part
    pub fn desc(self, column: usize, name: &str) -> Self {
        self.on(Expr::column(0, column, "", name), SortDirection::Desc)
    }

    /// Appends an arbitrary key part (expression index)
    pub fn on(mut self, expr: Expr, direction: SortDirection) -> Self {
        self.key.push(IndexKeyPart { expr, direction });
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Primary key indexes are always unique
    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self.unique = true;
        self
    }

    pub fn with_predicate(mut self, predicate: Expr) -> Self {
        self.predicate = Some(predicate);
        self
    }

    pub fn is_partial(&self) -> bool {
        self.predicate.is_some()
    }

    /// Key parts rebound to a query scope
    pub fn bound_key(&self, scope: usize) -> Vec<IndexKeyPart> {
        self.key
            .iter()
            .map(|part| IndexKeyPart {
                expr: part.expr.bind_scope(scope),
                direction: part.direction,
            })
            .collect()
    }

    /// Partial predicate rebound to a query scope
    pub fn bound_predicate(&self, scope: usize) -> Option<Expr> {
        self.predicate.as_ref().map(|p| p.bind_scope(scope))
    }

    /// Column positions of the key, if every key part is a plain column
    pub fn key_columns(&self) -> Option<Vec<usize>> {
        self.key
            .iter()
            .map(|part| part.expr.as_column().map(|c| c.index))
            .collect()
    }
}
