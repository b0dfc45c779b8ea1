//! Begin/complete logging around one unit of work
//!
//! - `{name}_BEGIN` on creation
//! - `{name}_COMPLETE` or `{name}_FAILED` when closed explicitly
//! - `{name}_INCOMPLETE` when dropped without being closed

use std::cell::Cell;

use super::logger::Logger;

/// A scope that logs its own begin and end
///
/// ```ignore
/// let scope = ObservationScope::with_fields("PLAN", &[("tables", "T")]);
/// match planner.plan(&query) {
///     Ok(_) => scope.complete(),
///     Err(e) => scope.fail(e.code().code()),
/// }
/// ```
pub struct ObservationScope<'a> {
    name: &'a str,
    closed: Cell<bool>,
    fields: Vec<(&'a str, String)>,
}

impl<'a> ObservationScope<'a> {
    pub fn new(name: &'a str) -> Self {
        Self::with_fields(name, &[])
    }

    /// Fields are repeated on the closing line
    pub fn with_fields(name: &'a str, fields: &[(&'a str, &str)]) -> Self {
        Logger::info(&format!("{}_BEGIN", name), fields);
        Self {
            name,
            closed: Cell::new(false),
            fields: fields.iter().map(|(k, v)| (*k, v.to_string())).collect(),
        }
    }

    pub fn complete(self) {
        self.complete_with_fields(&[]);
    }

    pub fn complete_with_fields(self, extra_fields: &[(&str, &str)]) {
        self.closed.set(true);
        let mut all_fields: Vec<(&str, &str)> = self.fields.iter().map(|(k, v)| (*k, v.as_str())).collect();
        all_fields.extend(extra_fields.iter().copied());
        Logger::info(&format!("{}_COMPLETE", self.name), &all_fields);
    }

    /// Logs `{name}_FAILED` at ERROR level
    pub fn fail(self, reason: &str) {
        self.closed.set(true);
        let mut all_fields: Vec<(&str, &str)> = self.fields.iter().map(|(k, v)| (*k, v.as_str())).collect();
        all_fields.push(("reason", reason));
        Logger::error(&format!("{}_FAILED", self.name), &all_fields);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.get()
    }
}

impl Drop for ObservationScope<'_> {
    fn drop(&mut self) {
        if !self.closed.get() {
            Logger::warn(
                &format!("{}_INCOMPLETE", self.name),
                &[("reason", "scope dropped without completion")],
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_starts_open() {
        let scope = ObservationScope::new("PLAN");
        assert!(!scope.is_closed());
        scope.complete();
    }

    #[test]
    fn test_scope_with_fields() {
        let scope = ObservationScope::with_fields("PLAN", &[("tables", "T,T2")]);
        scope.complete_with_fields(&[("distribution", "SINGLE_NODE")]);
    }

    #[test]
    fn test_scope_fail() {
        let scope = ObservationScope::new("PLAN");
        scope.fail("PLAN_INVALID_ORDER_BY");
    }

    #[test]
    fn test_scope_drop_without_close() {
        let scope = ObservationScope::new("PLAN");
        drop(scope);
    }
}
