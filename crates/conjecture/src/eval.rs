//! Direct numeric evaluation of an expression tree against named columns
//! and parameter values. Domain errors propagate as NaN/infinite values;
//! structurally unevaluable formulas (a symbol without a kernel, a variable
//! without a column) are hard errors that the energy model prices at
//! infinite SSE.

use crate::data::Frame;
use crate::ops::{Term, math};
use crate::tree::{NodeId, Tree};
use crate::ParValues;
use conjecture_error::{ConjectureResult, conjecture_err};

/// Evaluates the tree once per row of `x`. Constant formulas (no variables)
/// still produce one value per row.
pub(crate) fn eval_frame(
    tree: &Tree,
    x: &Frame,
    par_values: &ParValues,
) -> ConjectureResult<Vec<f64>> {
    (0..x.len())
        .map(|row| eval_node(tree, tree.root(), x, row, par_values))
        .collect()
}

fn eval_node(
    tree: &Tree,
    id: NodeId,
    x: &Frame,
    row: usize,
    par_values: &ParValues,
) -> ConjectureResult<f64> {
    let node = tree.node(id);
    match node.value() {
        Term::Var(name) => x
            .column(name)
            .map(|col| col[row])
            .ok_or_else(|| conjecture_err!(Evaluation: "no column for variable `{}`", name)),
        Term::Param(name) => par_values
            .get(name)
            .copied()
            .ok_or_else(|| conjecture_err!(Evaluation: "no value for parameter `{}`", name)),
        Term::Op(name) => {
            let mut args = Vec::with_capacity(node.offspring().len());
            for &child in node.offspring() {
                args.push(eval_node(tree, child, x, row, par_values)?);
            }
            math::apply(name, &args)
                .ok_or_else(|| conjecture_err!(Evaluation: "operator `{}` has no numeric kernel", name))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::OpSet;
    use crate::tree::{EtPattern, RrPattern};
    use crate::tree::tree::testing::tree_with_root;
    use std::collections::BTreeMap;

    fn pars(entries: &[(&str, f64)]) -> ParValues {
        entries
            .iter()
            .map(|(name, value)| ((*name).into(), *value))
            .collect()
    }

    #[test]
    fn test_eval_formula() {
        // (x * a) with a = 3
        let mut tree = tree_with_root("x");
        tree.replace_root(&RrPattern {
            op: Term::op("*"),
            leaves: vec![Term::param("a")],
        })
        .unwrap()
        .unwrap();

        let x = Frame::new()
            .with_column("x", vec![1.0, 2.0, 4.0])
            .unwrap();
        let y = eval_frame(&tree, &x, &pars(&[("a", 3.0)])).unwrap();
        assert_eq!(y, vec![3.0, 6.0, 12.0]);
    }

    #[test]
    fn test_eval_unary_chain() {
        // sin(x)
        let mut tree = tree_with_root("x");
        let root = tree.root();
        tree.et_replace(
            root,
            &EtPattern {
                value: Term::op("sin"),
                leaves: vec![Term::var("x")],
            },
        )
        .unwrap();

        let x = Frame::new().with_column("x", vec![0.0, 1.0]).unwrap();
        let y = eval_frame(&tree, &x, &pars(&[])).unwrap();
        assert!((y[0] - 0.0).abs() < 1e-12);
        assert!((y[1] - 1.0_f64.sin()).abs() < 1e-12);
    }

    #[test]
    fn test_missing_column_is_an_error() {
        let tree = tree_with_root("x");
        let x = Frame::new().with_column("z", vec![1.0]).unwrap();
        assert!(eval_frame(&tree, &x, &pars(&[])).is_err());
    }

    #[test]
    fn test_unknown_operator_is_an_error() {
        let ops = BTreeMap::from([("myop".to_string(), 1)]);
        let mut tree = Tree::new(
            OpSet::from_map(&ops).unwrap(),
            &["x".to_string()],
            &[],
            50,
        )
        .unwrap();
        let root = tree.root();
        tree.et_replace(
            root,
            &EtPattern {
                value: Term::op("myop"),
                leaves: vec![Term::var("x")],
            },
        )
        .unwrap();

        let x = Frame::new().with_column("x", vec![1.0]).unwrap();
        assert!(eval_frame(&tree, &x, &pars(&[])).is_err());
    }

    #[test]
    fn test_domain_error_propagates_as_nan() {
        // log(x) at x = -1
        let mut tree = tree_with_root("x");
        let root = tree.root();
        tree.et_replace(
            root,
            &EtPattern {
                value: Term::op("log"),
                leaves: vec![Term::var("x")],
            },
        )
        .unwrap();

        let x = Frame::new().with_column("x", vec![-1.0]).unwrap();
        let y = eval_frame(&tree, &x, &pars(&[])).unwrap();
        assert!(y[0].is_nan());
    }
}
