//! Planner error types
//!
//! Error codes:
//! - PLAN_INVALID_ORDER_BY (REJECT)
//! - PLAN_INVALID_QUERY (REJECT)
//! - PLAN_UNKNOWN_TABLE (REJECT)
//! - PLAN_INTERNAL (DEFECT)
//!
//! "No applicable index", "partial index predicate unprovable" and
//! "unsupported merge pattern" are planning verdicts, not errors.

use std::fmt;

/// Severity levels for planner errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Query rejected, surfaced to the caller verbatim
    Reject,
    /// Planner invariant broken; a bug, never a user error
    Defect,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Reject => write!(f, "REJECT"),
            Severity::Defect => write!(f, "DEFECT"),
        }
    }
}

/// Planner-specific error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlannerErrorCode {
    /// ORDER BY incompatible with DISTINCT / GROUP BY
    InvalidOrderBy,
    /// Malformed resolved query
    InvalidQuery,
    /// FROM names a table missing from the catalog snapshot
    UnknownTable,
    /// Internal invariant violation
    Internal,
}

impl PlannerErrorCode {
    /// Returns the stable string code
    pub fn code(&self) -> &'static str {
        match self {
            PlannerErrorCode::InvalidOrderBy => "PLAN_INVALID_ORDER_BY",
            PlannerErrorCode::InvalidQuery => "PLAN_INVALID_QUERY",
            PlannerErrorCode::UnknownTable => "PLAN_UNKNOWN_TABLE",
            PlannerErrorCode::Internal => "PLAN_INTERNAL",
        }
    }

    /// Returns the severity level for this error
    pub fn severity(&self) -> Severity {
        match self {
            PlannerErrorCode::Internal => Severity::Defect,
            _ => Severity::Reject,
        }
    }
}

impl fmt::Display for PlannerErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Planner error type with full context
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannerError {
    /// Error code
    code: PlannerErrorCode,
    /// Human-readable message
    message: String,
    /// Offending clause text, if applicable
    clause: Option<String>,
}

impl PlannerError {
    /// ORDER BY expression not derivable from the DISTINCT / GROUP BY output
    pub fn invalid_order_by(clause: impl Into<String>) -> Self {
        Self {
            code: PlannerErrorCode::InvalidOrderBy,
            message: "invalid ORDER BY expression".into(),
            clause: Some(clause.into()),
        }
    }

    /// Create a query invalid error
    pub fn invalid_query(reason: impl Into<String>) -> Self {
        Self {
            code: PlannerErrorCode::InvalidQuery,
            message: reason.into(),
            clause: None,
        }
    }

    /// Create an unknown table error
    pub fn unknown_table(table: impl Into<String>) -> Self {
        let t = table.into();
        Self {
            code: PlannerErrorCode::UnknownTable,
            message: format!("Table '{}' not found", t),
            clause: Some(t),
        }
    }

    /// Create an internal invariant error
    pub fn internal(reason: impl Into<String>) -> Self {
        Self {
            code: PlannerErrorCode::Internal,
            message: reason.into(),
            clause: None,
        }
    }

    /// Returns the error code
    pub fn code(&self) -> PlannerErrorCode {
        self.code
    }

    /// Returns the severity level
    pub fn severity(&self) -> Severity {
        self.code.severity()
    }

    /// Returns the error message
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns the offending clause if applicable
    pub fn clause(&self) -> Option<&str> {
        self.clause.as_deref()
    }
}

impl fmt::Display for PlannerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}: {}",
            self.code.severity(),
            self.code.code(),
            self.message
        )?;
        if let Some(clause) = &self.clause {
            write!(f, " [{}]", clause)?;
        }
        Ok(())
    }
}

impl std::error::Error for PlannerError {}

/// Result type for planner operations
pub type PlannerResult<T> = Result<T, PlannerError>;
