//! Index-for-order matcher
//!
//! Decides, per table scope, whether one of the table's indexes can supply
//! the required order (`FullOrder`), can at least narrow the scan
//! (`PartialOrder`), or does not apply (`NoMatch`).
//!
//! Key walk: order items are aligned with key parts in sequence. A key part
//! pinned by an equality may be skipped; an order item pinned by an equality
//! matches trivially. Every aligned pair must agree on forward vs. inverted
//! direction so a single scan direction serves them all.
//!
//! Tie-breaks:
//! - FullOrder: longer matched prefix, fewer residual conjuncts, declaration
//!   order
//! - PartialOrder: fewer residual conjuncts, longer equality prefix,
//!   declaration order

use std::cmp::Ordering;

use super::config::PlannerConfig;
use super::equality::EqualityBindings;
use super::implication::{implies, residual};
use super::order::{OrderSpec, SortItem};
use crate::catalog::{IndexDescriptor, IndexKeyPart, Table};
use crate::expr::Expr;
use crate::plan::{IndexScanNode, ScanDirection};

/// One index chosen for a scope, with everything the scan node needs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexChoice {
    pub index: String,
    /// Declaration position within the table
    pub position: usize,
    pub direction: ScanDirection,
    /// Order items aligned with key parts
    pub matched_prefix: usize,
    /// Lookup values of the leading equality-bound key parts
    pub search_keys: Vec<Expr>,
    /// Range conjuncts consumed on the key part after the equality prefix
    pub range: Vec<Expr>,
    /// Local conjuncts still evaluated per row
    pub residual: Vec<Expr>,
    /// Order the scan emits, in scan direction
    pub sort_order: OrderSpec,
    /// Key parts bound to the query scope
    pub key: Vec<IndexKeyPart>,
    /// Conjuncts the index applies itself: search keys, range, predicate
    pub consumed: Vec<Expr>,
}

impl IndexChoice {
    pub fn equality_prefix(&self) -> usize {
        self.search_keys.len()
    }

    /// Scan node for this choice over `table` at `scope`
    pub fn to_scan(&self, table: &Table, scope: usize) -> IndexScanNode {
        IndexScanNode {
            table: table.name.clone(),
            scope,
            index: self.index.clone(),
            direction: self.direction,
            search_keys: self.search_keys.clone(),
            range: self.range.clone(),
            predicate: Expr::and_all(self.residual.clone()),
            sort_order: self.sort_order.items().to_vec(),
            limit: None,
        }
    }
}

/// Matcher verdict
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchResult {
    /// Index order covers the required order; no sort needed
    FullOrder(IndexChoice),
    /// Index narrows the scan but a sort is still required
    PartialOrder(IndexChoice),
    NoMatch,
}

impl MatchResult {
    pub fn choice(&self) -> Option<&IndexChoice> {
        match self {
            MatchResult::FullOrder(c) | MatchResult::PartialOrder(c) => Some(c),
            MatchResult::NoMatch => None,
        }
    }

    pub fn is_full(&self) -> bool {
        matches!(self, MatchResult::FullOrder(_))
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MatchResult::FullOrder(_) => "FULL_ORDER",
            MatchResult::PartialOrder(_) => "PARTIAL_ORDER",
            MatchResult::NoMatch => "NO_MATCH",
        }
    }
}

/// Index ordering GROUP BY expressions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupingMatch {
    pub choice: IndexChoice,
    /// Grouping expressions the scan delivers in order, in key order
    pub ordered_prefix: Vec<Expr>,
    /// Every unbound grouping expression is in `ordered_prefix`
    pub covers_all: bool,
}

/// Candidate access path before any order is considered
struct Access {
    search_keys: Vec<Expr>,
    range: Vec<Expr>,
    residual: Vec<Expr>,
    consumed: Vec<Expr>,
    implied_partial: bool,
}

impl Access {
    fn narrows_scan(&self) -> bool {
        !self.search_keys.is_empty() || !self.range.is_empty() || self.implied_partial
    }
}

/// Index matching for a single table scope
pub struct IndexMatcher<'a> {
    scope: usize,
    table: &'a Table,
    bindings: &'a EqualityBindings,
    conjuncts: Vec<&'a Expr>,
    reverse_after_equality: bool,
}

impl<'a> IndexMatcher<'a> {
    /// `conjuncts` are the WHERE conjuncts referencing only `scope`
    pub fn new(
        scope: usize,
        table: &'a Table,
        bindings: &'a EqualityBindings,
        conjuncts: Vec<&'a Expr>,
        config: &PlannerConfig,
    ) -> Self {
        Self {
            scope,
            table,
            bindings,
            conjuncts,
            reverse_after_equality: config.reverse_scan_after_equality_prefix,
        }
    }

    /// Partial indexes whose predicate the filter does not imply
    pub fn excluded_partial_indexes(&self) -> Vec<&'a str> {
        self.table
            .indexes
            .iter()
            .filter(|idx| !self.is_eligible(idx))
            .map(|idx| idx.name.as_str())
            .collect()
    }

    fn is_eligible(&self, index: &IndexDescriptor) -> bool {
        match index.bound_predicate(self.scope) {
            None => true,
            Some(pred) => implies(&self.conjuncts, &pred),
        }
    }

    fn eligible(&self) -> impl Iterator<Item = (usize, &'a IndexDescriptor)> + '_ {
        self.table
            .indexes
            .iter()
            .enumerate()
            .filter(move |(_, idx)| self.is_eligible(idx))
    }

    fn access(&self, index: &IndexDescriptor, key: &[IndexKeyPart]) -> Access {
        let mut search_keys = Vec::new();
        let mut consumed = Vec::new();
        for part in key {
            match self.bindings.binding(&part.expr) {
                Some(binding) => {
                    search_keys.push(binding.value.clone());
                    consumed.push(binding.conjunct.clone());
                }
                None => break,
            }
        }

        let range: Vec<Expr> = key
            .get(search_keys.len())
            .map(|part| self.bindings.ranges_on(&part.expr).into_iter().cloned().collect())
            .unwrap_or_default();
        consumed.extend(range.iter().cloned());

        let predicate = index.bound_predicate(self.scope);
        if let Some(pred) = &predicate {
            consumed.extend(pred.conjuncts().into_iter().cloned());
        }

        Access {
            residual: residual(&self.conjuncts, &consumed).into_iter().cloned().collect(),
            search_keys,
            range,
            consumed,
            implied_partial: predicate.is_some(),
        }
    }

    /// Emitted order: key parts after the equality prefix, in scan direction
    fn emitted_order(key: &[IndexKeyPart], equality_prefix: usize, direction: ScanDirection) -> OrderSpec {
        key.iter()
            .skip(equality_prefix)
            .map(|part| {
                let dir = match direction {
                    ScanDirection::Forward => part.direction,
                    ScanDirection::Backward => part.direction.inverse(),
                };
                SortItem::new(part.expr.clone(), dir)
            })
            .collect()
    }

    /// Aligns `order` with `key`; returns (matched items, inverted) when the
    /// whole order is covered
    fn walk(&self, order: &OrderSpec, key: &[IndexKeyPart]) -> Option<(usize, bool)> {
        let items = order.items();
        let mut ki = 0;
        let mut oi = 0;
        let mut matched = 0;
        let mut inverted: Option<bool> = None;
        let mut skipped_bound = false;

        while oi < items.len() {
            let item = &items[oi];
            if self.bindings.is_bound(&item.expr) {
                oi += 1;
                continue;
            }
            let Some(part) = key.get(ki) else {
                return None;
            };
            if part.expr == item.expr {
                let flip = part.direction != item.direction;
                match inverted {
                    None => inverted = Some(flip),
                    Some(previous) if previous != flip => return None,
                    Some(_) => {}
                }
                matched += 1;
                ki += 1;
                oi += 1;
            } else if self.bindings.is_bound(&part.expr) {
                skipped_bound = true;
                ki += 1;
            } else {
                return None;
            }
        }

        let inverted = inverted.unwrap_or(false);
        if inverted && skipped_bound && !self.reverse_after_equality {
            return None;
        }
        Some((matched, inverted))
    }

    fn choice(
        &self,
        position: usize,
        index: &IndexDescriptor,
        key: Vec<IndexKeyPart>,
        access: Access,
        matched_prefix: usize,
        direction: ScanDirection,
    ) -> IndexChoice {
        let sort_order = Self::emitted_order(&key, access.search_keys.len(), direction);
        IndexChoice {
            index: index.name.clone(),
            position,
            direction,
            matched_prefix,
            search_keys: access.search_keys,
            range: access.range,
            residual: access.residual,
            sort_order,
            key,
            consumed: access.consumed,
        }
    }

    /// Matches a (reduced) required order against the table's indexes.
    ///
    /// An empty order is trivially covered; an index is then chosen only
    /// when it narrows the scan.
    pub fn match_order(&self, order: &OrderSpec) -> MatchResult {
        let mut full: Option<IndexChoice> = None;
        let mut partial: Option<IndexChoice> = None;

        for (position, index) in self.eligible() {
            let key = index.bound_key(self.scope);
            let access = self.access(index, &key);

            let walked = if order.is_empty() {
                if access.narrows_scan() {
                    Some((0, false))
                } else {
                    None
                }
            } else {
                self.walk(order, &key)
            };

            match walked {
                Some((matched, inverted)) => {
                    let direction = if inverted {
                        ScanDirection::Backward
                    } else {
                        ScanDirection::Forward
                    };
                    let candidate = self.choice(position, index, key, access, matched, direction);
                    if full.as_ref().map_or(true, |best| better_full(&candidate, best)) {
                        full = Some(candidate);
                    }
                }
                None if access.narrows_scan() => {
                    let candidate = self.choice(position, index, key, access, 0, ScanDirection::Forward);
                    if partial.as_ref().map_or(true, |best| better_partial(&candidate, best)) {
                        partial = Some(candidate);
                    }
                }
                None => {}
            }
        }

        match (full, partial) {
            (Some(choice), _) => MatchResult::FullOrder(choice),
            (None, Some(choice)) => MatchResult::PartialOrder(choice),
            (None, None) => MatchResult::NoMatch,
        }
    }

    /// Finds the index delivering the most grouping expressions in order
    pub fn match_grouping(&self, group_by: &[Expr]) -> Option<GroupingMatch> {
        let mut best: Option<GroupingMatch> = None;

        for (position, index) in self.eligible() {
            let key = index.bound_key(self.scope);
            let ordered_prefix = self.grouping_prefix(&key, group_by);
            if ordered_prefix.is_empty() {
                continue;
            }
            let covers_all = self.covers_grouping(&ordered_prefix, group_by);
            let access = self.access(index, &key);
            let candidate = GroupingMatch {
                choice: self.choice(position, index, key, access, 0, ScanDirection::Forward),
                ordered_prefix,
                covers_all,
            };
            let replace = match &best {
                None => true,
                Some(current) => better_grouping(&candidate, current),
            };
            if replace {
                best = Some(candidate);
            }
        }

        best
    }

    /// Grouping expressions an index scan over `choice` delivers in order
    pub fn grouping_for(&self, choice: &IndexChoice, group_by: &[Expr]) -> (Vec<Expr>, bool) {
        let prefix = self.grouping_prefix(&choice.key, group_by);
        let covers_all = self.covers_grouping(&prefix, group_by);
        (prefix, covers_all)
    }

    fn grouping_prefix(&self, key: &[IndexKeyPart], group_by: &[Expr]) -> Vec<Expr> {
        let mut prefix: Vec<Expr> = Vec::new();
        for part in key {
            if group_by.contains(&part.expr) && !self.bindings.is_bound(&part.expr) {
                if !prefix.contains(&part.expr) {
                    prefix.push(part.expr.clone());
                }
            } else if self.bindings.is_bound(&part.expr) {
                continue;
            } else {
                break;
            }
        }
        prefix
    }

    fn covers_grouping(&self, prefix: &[Expr], group_by: &[Expr]) -> bool {
        group_by
            .iter()
            .all(|g| self.bindings.is_bound(g) || prefix.contains(g))
    }
}

fn better_full(candidate: &IndexChoice, best: &IndexChoice) -> bool {
    let ord = candidate
        .matched_prefix
        .cmp(&best.matched_prefix)
        .then_with(|| best.residual.len().cmp(&candidate.residual.len()))
        .then_with(|| best.position.cmp(&candidate.position));
    ord == Ordering::Greater
}

fn better_partial(candidate: &IndexChoice, best: &IndexChoice) -> bool {
    let ord = best
        .residual
        .len()
        .cmp(&candidate.residual.len())
        .then_with(|| candidate.equality_prefix().cmp(&best.equality_prefix()))
        .then_with(|| best.position.cmp(&candidate.position));
    ord == Ordering::Greater
}

fn better_grouping(candidate: &GroupingMatch, best: &GroupingMatch) -> bool {
    let ord = candidate
        .ordered_prefix
        .len()
        .cmp(&best.ordered_prefix.len())
        .then_with(|| best.choice.residual.len().cmp(&candidate.choice.residual.len()))
        .then_with(|| best.choice.position.cmp(&candidate.choice.position));
    ord == Ordering::Greater
}
