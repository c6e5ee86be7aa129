use crate::ops::{OpSet, Term};
use std::collections::BTreeMap;

/// One entry of the ET space: an elementary tree as a value plus the leaf
/// values of its offspring. Arity 0 entries are bare leaves.
#[derive(Debug, Clone, PartialEq)]
pub struct EtPattern {
    pub value: Term,
    pub leaves: Vec<Term>,
}

impl EtPattern {
    pub fn leaf(value: Term) -> Self {
        EtPattern {
            value,
            leaves: Vec::new(),
        }
    }

    pub fn arity(&self) -> usize {
        self.leaves.len()
    }
}

/// One entry of the root-replacement space: the operator that becomes the
/// new root plus the extra leaves attached after the old root. An operator
/// of arity k carries k - 1 extra leaves.
#[derive(Debug, Clone, PartialEq)]
pub struct RrPattern {
    pub op: Term,
    pub leaves: Vec<Term>,
}

/// Enumerates every possible elementary tree, bucketed by arity: the leaf
/// vocabulary at key 0, and for each operator of arity k every k-tuple of
/// leaves (Cartesian product with repetition, leftmost slot slowest).
pub(crate) fn build_et_space(ops: &OpSet, leaves: &[Term]) -> BTreeMap<usize, Vec<EtPattern>> {
    let mut space: BTreeMap<usize, Vec<EtPattern>> = BTreeMap::new();
    for &order in ops.orders() {
        space.insert(order, Vec::new());
    }

    space.insert(0, leaves.iter().cloned().map(EtPattern::leaf).collect());

    for name in ops.names() {
        let arity = ops.arity(name).unwrap();
        let bucket = space.get_mut(&arity).unwrap();
        for combo in cartesian(leaves, arity) {
            bucket.push(EtPattern {
                value: Term::op(name.clone()),
                leaves: combo,
            });
        }
    }

    space
}

/// Enumerates the root-replacement space: arity-1 operators carry no extra
/// leaves, arity-k operators one entry per (k - 1)-tuple of leaves.
pub(crate) fn build_rr_space(ops: &OpSet, leaves: &[Term]) -> Vec<RrPattern> {
    let mut space = Vec::new();
    for name in ops.names() {
        let arity = ops.arity(name).unwrap();
        for combo in cartesian(leaves, arity - 1) {
            space.push(RrPattern {
                op: Term::op(name.clone()),
                leaves: combo,
            });
        }
    }
    space
}

/// All `k`-tuples over `items` with repetition, in odometer order (last
/// position varies fastest). `k == 0` yields the single empty tuple.
fn cartesian(items: &[Term], k: usize) -> Vec<Vec<Term>> {
    let mut out = Vec::new();
    let mut indices = vec![0usize; k];
    loop {
        out.push(indices.iter().map(|&i| items[i].clone()).collect());
        let mut pos = k;
        loop {
            if pos == 0 {
                return out;
            }
            pos -= 1;
            indices[pos] += 1;
            if indices[pos] < items.len() {
                break;
            }
            indices[pos] = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaves() -> Vec<Term> {
        vec![Term::var("x"), Term::param("a")]
    }

    #[test]
    fn test_et_space_cardinalities() {
        // Default catalog: 14 unary, 4 binary operators.
        let space = build_et_space(&OpSet::default(), &leaves());

        assert_eq!(space[&0].len(), 2);
        assert_eq!(space[&1].len(), 14 * 2);
        assert_eq!(space[&2].len(), 4 * 2 * 2);
    }

    #[test]
    fn test_et_space_keeps_duplicate_leaf_choices() {
        // A parameter is a distinct leaf choice from any variable; the
        // detailed-balance ratio depends on these exact cardinalities.
        let many = vec![Term::var("x"), Term::param("a"), Term::param("b")];
        let space = build_et_space(&OpSet::default(), &many);

        assert_eq!(space[&0].len(), 3);
        assert_eq!(space[&2].len(), 4 * 9);
    }

    #[test]
    fn test_rr_space_cardinality() {
        let space = build_rr_space(&OpSet::default(), &leaves());

        // One entry per unary operator, |leaves| per binary operator.
        assert_eq!(space.len(), 14 + 4 * 2);
        assert!(space.iter().any(|rr| rr.op == Term::op("sin") && rr.leaves.is_empty()));
        assert!(
            space
                .iter()
                .any(|rr| rr.op == Term::op("*") && rr.leaves == vec![Term::param("a")])
        );
    }

    #[test]
    fn test_cartesian_order() {
        let combos = cartesian(&leaves(), 2);
        assert_eq!(
            combos,
            vec![
                vec![Term::var("x"), Term::var("x")],
                vec![Term::var("x"), Term::param("a")],
                vec![Term::param("a"), Term::var("x")],
                vec![Term::param("a"), Term::param("a")],
            ]
        );
        assert_eq!(cartesian(&leaves(), 0), vec![Vec::<Term>::new()]);
    }
}
