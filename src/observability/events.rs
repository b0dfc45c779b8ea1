//! Observable planner events
//!
//! Plan begin/complete/failed lines come from an `ObservationScope` named
//! `PLAN`; the events here are the decisions taken in between.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    // Inputs
    /// Catalog snapshot loaded and validated
    CatalogLoaded,
    /// Planner configuration loaded
    ConfigLoaded,

    // Access path
    /// An index was chosen for a scope
    IndexSelected,
    /// No index applies; sequential scan
    NoApplicableIndex,
    /// Partial index dropped: predicate not implied by the filter
    PartialIndexExcluded,

    // Order
    /// Explicit sort added
    SortAdded,

    // Distribution
    /// Coordinator merges sorted partition streams
    MergeReceiveChosen,
    /// Coordinator buffers and sorts
    MergeFallback,
    /// Partition-side aggregation strategy
    AggregatePushdown,
}

impl Event {
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::CatalogLoaded => "CATALOG_LOADED",
            Event::ConfigLoaded => "CONFIG_LOADED",

            Event::IndexSelected => "INDEX_SELECTED",
            Event::NoApplicableIndex => "NO_APPLICABLE_INDEX",
            Event::PartialIndexExcluded => "PARTIAL_INDEX_EXCLUDED",

            Event::SortAdded => "SORT_ADDED",

            Event::MergeReceiveChosen => "MERGE_RECEIVE_CHOSEN",
            Event::MergeFallback => "MERGE_FALLBACK",
            Event::AggregatePushdown => "AGGREGATE_PUSHDOWN",
        }
    }

    /// Decisions taken while planning one query; logged at TRACE
    pub fn is_decision(&self) -> bool {
        !matches!(self, Event::CatalogLoaded | Event::ConfigLoaded)
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_events_have_string_representation() {
        let events = [
            Event::CatalogLoaded,
            Event::ConfigLoaded,
            Event::IndexSelected,
            Event::NoApplicableIndex,
            Event::PartialIndexExcluded,
            Event::SortAdded,
            Event::MergeReceiveChosen,
            Event::MergeFallback,
            Event::AggregatePushdown,
        ];

        for event in events {
            let s = event.as_str();
            assert!(!s.is_empty());
            assert!(s.chars().all(|c| c.is_uppercase() || c == '_'));
        }
    }

    #[test]
    fn test_decision_events() {
        assert!(Event::SortAdded.is_decision());
        assert!(Event::MergeFallback.is_decision());
        assert!(!Event::CatalogLoaded.is_decision());
    }

    #[test]
    fn test_event_display() {
        assert_eq!(format!("{}", Event::MergeReceiveChosen), "MERGE_RECEIVE_CHOSEN");
    }
}
