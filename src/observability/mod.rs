//! Observability subsystem
//!
//! - Structured JSON logging on stderr
//! - Typed planner events
//! - Counter metrics
//!
//! Observability is read-only: nothing logged or counted feeds back into a
//! planning decision, and turning decision logging on never changes a plan.
//!
//! ```ignore
//! use shardplan::observability::{log_event_with_fields, Event, PlannerMetrics};
//!
//! log_event_with_fields(Event::SortAdded, &[("keys", "T.T_D2 ASC")]);
//!
//! let metrics = PlannerMetrics::new();
//! metrics.increment_plans_compiled();
//! ```

mod events;
mod logger;
mod metrics;
mod scope;

pub use events::Event;
pub use logger::{Logger, Severity};
pub use metrics::{MetricsSnapshot, PlannerMetrics};
pub use scope::ObservationScope;

/// Severity an event is logged at
fn severity_of(event: Event) -> Severity {
    if event.is_decision() {
        Severity::Trace
    } else {
        Severity::Info
    }
}

pub fn log_event(event: Event) {
    Logger::log(severity_of(event), event.as_str(), &[]);
}

pub fn log_event_with_fields(event: Event, fields: &[(&str, &str)]) {
    Logger::log(severity_of(event), event.as_str(), fields);
}
