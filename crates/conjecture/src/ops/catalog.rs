use compact_str::CompactString;
use conjecture_error::{ConjectureResult, ensure};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// The default operator catalog: fourteen unary operations and four binary
/// ones. `-` is unary negation; `**` is exponentiation.
pub fn default_ops() -> BTreeMap<String, usize> {
    [
        ("sin", 1),
        ("cos", 1),
        ("tan", 1),
        ("exp", 1),
        ("log", 1),
        ("sinh", 1),
        ("cosh", 1),
        ("tanh", 1),
        ("pow2", 1),
        ("pow3", 1),
        ("abs", 1),
        ("sqrt", 1),
        ("fac", 1),
        ("-", 1),
        ("+", 2),
        ("*", 2),
        ("/", 2),
        ("**", 2),
    ]
    .into_iter()
    .map(|(name, arity)| (name.to_string(), arity))
    .collect()
}

/// The operator catalog of a tree: a fixed symbol-to-arity mapping.
///
/// The set of distinct arities (always including 0 for leaves) drives the
/// bucket keys of the ET index and the static ET/RR spaces, so the catalog
/// is immutable once a tree has been built from it. Symbols are enumerated
/// in lexicographic order, which keeps every space construction and random
/// pick deterministic under a pinned seed.
#[derive(Debug, Clone, PartialEq)]
pub struct OpSet {
    names: Vec<CompactString>,
    arities: HashMap<CompactString, usize>,
    orders: Vec<usize>,
}

impl OpSet {
    pub fn from_map(ops: &BTreeMap<String, usize>) -> ConjectureResult<Self> {
        ensure!(!ops.is_empty(), InvalidConfig: "operator catalog is empty");

        let mut names = Vec::with_capacity(ops.len());
        let mut arities = HashMap::with_capacity(ops.len());
        let mut orders = BTreeSet::from([0]);
        for (name, &arity) in ops {
            ensure!(
                arity >= 1,
                InvalidConfig: "operator `{}` has arity {}, expected at least 1",
                name,
                arity
            );
            names.push(CompactString::from(name.as_str()));
            arities.insert(CompactString::from(name.as_str()), arity);
            orders.insert(arity);
        }

        Ok(OpSet {
            names,
            arities,
            orders: orders.into_iter().collect(),
        })
    }

    pub fn arity(&self, name: &str) -> Option<usize> {
        self.arities.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.arities.contains_key(name)
    }

    /// Operator symbols in enumeration order.
    pub fn names(&self) -> &[CompactString] {
        &self.names
    }

    /// All distinct arities, ascending, including 0 for leaves.
    pub fn orders(&self) -> &[usize] {
        &self.orders
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

impl Default for OpSet {
    fn default() -> Self {
        OpSet::from_map(&default_ops()).unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_catalog() {
        let ops = OpSet::default();

        assert_eq!(ops.len(), 18);
        assert_eq!(ops.orders(), &[0, 1, 2]);
        assert_eq!(ops.arity("sin"), Some(1));
        assert_eq!(ops.arity("**"), Some(2));
        assert_eq!(ops.arity("fac"), Some(1));
        assert_eq!(ops.arity("fact"), None);
        assert!(!ops.contains("x"));
    }

    #[test]
    fn test_rejects_empty_catalog() {
        assert!(OpSet::from_map(&BTreeMap::new()).is_err());
    }

    #[test]
    fn test_rejects_zero_arity() {
        let ops = BTreeMap::from([("one".to_string(), 0)]);
        assert!(OpSet::from_map(&ops).is_err());
    }

    #[test]
    fn test_custom_catalog_orders() {
        let ops = BTreeMap::from([("+".to_string(), 2), ("ite".to_string(), 3)]);
        let ops = OpSet::from_map(&ops).unwrap();

        assert_eq!(ops.orders(), &[0, 2, 3]);
        assert_eq!(ops.names(), &[CompactString::from("+"), CompactString::from("ite")]);
    }
}
