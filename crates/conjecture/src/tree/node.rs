use crate::ops::Term;
use slotmap::new_key_type;

new_key_type! {
    /// Arena key of a tree node. Stable for the node's whole lifetime; a
    /// node keeps its key through value relabeling and offspring changes.
    pub struct NodeId;
}

/// A node in the expression tree, stored in the tree's arena. Parent and
/// offspring links are arena keys, so there is no ownership cycle: the tree
/// owns every node, nodes only index each other.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub(crate) value: Term,
    pub(crate) parent: Option<NodeId>,
    pub(crate) offspring: Vec<NodeId>,
}

impl Node {
    pub(crate) fn leaf(value: Term, parent: Option<NodeId>) -> Self {
        Node {
            value,
            parent,
            offspring: Vec::new(),
        }
    }

    pub fn value(&self) -> &Term {
        &self.value
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn offspring(&self) -> &[NodeId] {
        &self.offspring
    }

    pub fn is_leaf(&self) -> bool {
        self.offspring.is_empty()
    }

    /// Arity of this node as it stands: its offspring count.
    pub fn arity(&self) -> usize {
        self.offspring.len()
    }
}
