//! Partial-index predicate implication
//!
//! A partial index is usable only when the query filter provably restricts
//! rows to the indexed subset. The proof is structural: every conjunct of
//! the index predicate must appear verbatim (modulo operand order of a
//! comparison) among the filter conjuncts.
//!
//! This is deliberately incomplete. `c > 5` does not imply `c > 3` here, so
//! an index on `WHERE c > 3` is excluded for a query filtering `c > 5`.

use crate::expr::Expr;

/// Whether `filter` conjuncts imply `predicate`
pub fn implies(filter: &[&Expr], predicate: &Expr) -> bool {
    let normalized: Vec<Expr> = filter.iter().map(|c| c.normalized()).collect();
    predicate
        .conjuncts()
        .into_iter()
        .all(|p| normalized.contains(&p.normalized()))
}

/// Filter conjuncts not covered by `consumed` (compared after normalization)
pub fn residual<'a>(filter: &[&'a Expr], consumed: &[Expr]) -> Vec<&'a Expr> {
    let consumed: Vec<Expr> = consumed.iter().map(Expr::normalized).collect();
    filter
        .iter()
        .copied()
        .filter(|c| !consumed.contains(&c.normalized()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(index: usize) -> Expr {
        Expr::column(0, index, "T3", &format!("T_D{}", index))
    }

    #[test]
    fn test_exact_conjunct_implies() {
        let pred = Expr::gt(d(2), Expr::int(3));
        let f1 = Expr::gt(d(2), Expr::int(3));
        let f2 = Expr::eq(d(0), Expr::int(1));
        assert!(implies(&[&f2, &f1], &pred));
    }

    #[test]
    fn test_flipped_comparison_implies() {
        let pred = Expr::gt(d(2), Expr::int(3));
        let flipped = Expr::lt(Expr::int(3), d(2));
        assert!(implies(&[&flipped], &pred));
    }

    #[test]
    fn test_stronger_bound_not_proven() {
        let pred = Expr::gt(d(2), Expr::int(3));
        let stronger = Expr::gt(d(2), Expr::int(5));
        assert!(!implies(&[&stronger], &pred));
        assert!(!implies(&[], &pred));
    }

    #[test]
    fn test_conjunctive_predicate_needs_every_term() {
        let pred = Expr::And(vec![Expr::gt(d(2), Expr::int(3)), Expr::lt(d(1), Expr::int(9))]);
        let only_one = Expr::gt(d(2), Expr::int(3));
        let other = Expr::lt(d(1), Expr::int(9));
        assert!(!implies(&[&only_one], &pred));
        assert!(implies(&[&only_one, &other], &pred));
    }

    #[test]
    fn test_residual() {
        let a = Expr::gt(d(2), Expr::int(3));
        let b = Expr::eq(d(0), Expr::int(1));
        let rest = residual(&[&a, &b], &[Expr::lt(Expr::int(3), d(2))]);
        assert_eq!(rest, vec![&b]);
    }
}
