use compact_str::CompactString;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};

/// The value carried by a single tree node: an operator symbol, a variable
/// name (resolved against a data column), or a parameter name (calibrated
/// numerically by the fitter).
///
/// Variables and parameters are the two disjoint leaf vocabularies; an
/// operator always carries as many offspring as its catalog arity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Term {
    Op(CompactString),
    Var(CompactString),
    Param(CompactString),
}

impl Term {
    pub fn op(name: impl Into<CompactString>) -> Self {
        Term::Op(name.into())
    }

    pub fn var(name: impl Into<CompactString>) -> Self {
        Term::Var(name.into())
    }

    pub fn param(name: impl Into<CompactString>) -> Self {
        Term::Param(name.into())
    }

    pub fn name(&self) -> &str {
        match self {
            Term::Op(name) => name,
            Term::Var(name) => name,
            Term::Param(name) => name,
        }
    }

    /// Leaves are the arity-zero terms: variables and parameters.
    pub fn is_leaf(&self) -> bool {
        !matches!(self, Term::Op(_))
    }

    pub fn is_op(&self) -> bool {
        matches!(self, Term::Op(_))
    }

    pub fn is_param(&self) -> bool {
        matches!(self, Term::Param(_))
    }
}

impl Display for Term {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}
