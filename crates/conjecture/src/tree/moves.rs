//! In-place move primitives: root replacement and pruning, elementary-tree
//! insertion, deletion and replacement, and node relabeling. Every primitive
//! keeps the node list, the ET index, `size` and `nops` consistent; the
//! statistical bookkeeping (fit, BIC, energy) belongs to the chain.

use super::node::{Node, NodeId};
use super::space::{EtPattern, RrPattern};
use crate::ops::Term;
use conjecture_error::{ConjectureResult, conjecture_bail, ensure};

use super::Tree;

/// The detailed-balance bookkeeping of one elementary-tree proposal, moving
/// a target of arity `o_i` to a pattern of arity `o_f`:
///
/// - `n_if` / `n_fi`: feasible move-type counts in the current state and in
///   the hypothetical post-swap state (the proposal kernel picks a move
///   type uniformly among feasible ones, so q = 1/n).
/// - `omega_i` / `omega_f`: targets available to the forward pick now, and
///   to the reverse pick after the swap. `omega_f` starts from
///   `|ets[o_f]| + 1` (the swap adds one ET of arity `o_f`) and is
///   corrected for the target's offspring leaving `ets[0]` when `o_f == 0`,
///   and for the target's parent leaving `ets[o_f]` when a leaf target
///   becomes an operator.
/// - `s_i` / `s_f`: pattern-space sizes of the two arities (uniform pick
///   within the chosen bucket).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EtWeights {
    pub n_if: usize,
    pub n_fi: usize,
    pub omega_i: usize,
    pub omega_f: isize,
    pub s_i: usize,
    pub s_f: usize,
}

impl EtWeights {
    /// The Metropolis-Hastings acceptance probability for the proposal,
    /// given its energy change (uncapped; callers compare to a uniform
    /// draw, so values above 1 behave as certain acceptance).
    pub fn acceptance(&self, de: f64) -> f64 {
        let q_if = 1.0 / self.n_if as f64;
        let q_fi = 1.0 / self.n_fi as f64;
        (q_fi * self.omega_i as f64 * self.s_f as f64 * (-de).exp())
            / (q_if * self.omega_f as f64 * self.s_i as f64)
    }
}

impl Tree {
    /// Puts a new operator above the current root, attaching the pattern's
    /// extra leaves after it. Returns `None` without touching the tree when
    /// the result would exceed `max_size`.
    pub fn replace_root(&mut self, rr: &RrPattern) -> ConjectureResult<Option<NodeId>> {
        let Term::Op(op_name) = &rr.op else {
            conjecture_bail!(InvalidMove: "root replacement value `{}` is not an operator", rr.op);
        };
        let Some(arity) = self.ops.arity(op_name) else {
            conjecture_bail!(InvalidMove: "unknown operator `{}`", op_name);
        };
        ensure!(
            arity == rr.leaves.len() + 1,
            InvalidMove: "root replacement `{}` carries {} extra leaves, arity is {}",
            op_name,
            rr.leaves.len(),
            arity
        );

        if self.size + arity > self.max_size {
            return Ok(None);
        }

        let old_root = self.root;
        let old_root_is_leaf = self.arena[old_root].offspring.is_empty();

        let new_root = self.arena.insert(Node {
            value: rr.op.clone(),
            parent: None,
            offspring: vec![old_root],
        });
        self.arena[old_root].parent = Some(new_root);
        self.root = new_root;
        *self.nops.entry(op_name.clone()).or_insert(0) += 1;
        self.nodes.push(new_root);
        self.size += 1;

        for leaf in &rr.leaves {
            let id = self.arena.insert(Node::leaf(leaf.clone(), Some(new_root)));
            self.arena[new_root].offspring.push(id);
            self.nodes.push(id);
            self.ets.get_mut(&0).unwrap().insert(id);
            self.size += 1;
        }

        // The new root is elementary exactly when the old root was a leaf.
        if old_root_is_leaf {
            self.ets.get_mut(&arity).unwrap().insert(new_root);
        }

        Ok(Some(new_root))
    }

    /// The root can be cut when the tree has at least two nodes and every
    /// offspring after the first is a leaf.
    pub fn is_root_prunable(&self) -> bool {
        if self.size < 2 {
            return false;
        }
        self.arena[self.root].offspring[1..]
            .iter()
            .all(|&o| self.arena[o].offspring.is_empty())
    }

    /// Cuts the root and its trailing leaves, promoting the first offspring
    /// to root. Returns the removed pattern (the exact argument that
    /// [replace_root](Self::replace_root) would need to undo the cut), or
    /// `None` when the root is not prunable.
    pub fn prune_root(&mut self) -> Option<RrPattern> {
        if !self.is_root_prunable() {
            return None;
        }

        let old_root = self.root;
        let op = self.arena[old_root].value.clone();
        let arity = self.arena[old_root].offspring.len();

        let pos = self.nodes.iter().position(|&n| n == old_root)?;
        self.nodes.remove(pos);
        if let Some(bag) = self.ets.get_mut(&arity) {
            bag.remove(old_root);
        }
        if let Term::Op(name) = &op {
            if let Some(count) = self.nops.get_mut(name) {
                *count -= 1;
            }
        }
        self.size -= 1;

        let offspring = self.arena[old_root].offspring.clone();
        let mut leaves = Vec::with_capacity(offspring.len().saturating_sub(1));
        for &o in &offspring[1..] {
            leaves.push(self.arena[o].value.clone());
            if let Some(pos) = self.nodes.iter().position(|&n| n == o) {
                self.nodes.remove(pos);
            }
            self.size -= 1;
            self.ets.get_mut(&0).unwrap().remove(o);
            let _ = self.arena.remove(o);
        }

        self.root = offspring[0];
        self.arena[offspring[0]].parent = None;
        let _ = self.arena.remove(old_root);

        Some(RrPattern { op, leaves })
    }

    /// Grows an elementary tree in place of `node`, which must be a leaf:
    /// the node takes the pattern's operator value and fresh leaf offspring.
    pub(crate) fn add_et(&mut self, node: NodeId, et: &EtPattern) -> ConjectureResult<NodeId> {
        ensure!(
            self.arena[node].offspring.is_empty(),
            InvalidMove: "ET insertion target `{}` is not a leaf",
            self.arena[node].value
        );
        let order = et.arity();
        ensure!(order >= 1, InvalidMove: "elementary tree needs at least one leaf");
        let Term::Op(op_name) = &et.value else {
            conjecture_bail!(InvalidMove: "elementary tree value `{}` is not an operator", et.value);
        };
        ensure!(
            self.ops.arity(op_name) == Some(order),
            InvalidMove: "`{}` does not take {} offspring",
            op_name,
            order
        );

        self.arena[node].value = et.value.clone();
        *self.nops.entry(op_name.clone()).or_insert(0) += 1;

        let mut children = Vec::with_capacity(order);
        for leaf in &et.leaves {
            children.push(self.arena.insert(Node::leaf(leaf.clone(), Some(node))));
        }
        self.arena[node].offspring = children.clone();
        self.ets.get_mut(&order).unwrap().insert(node);

        // Growing offspring under `node` breaks the parent's ET status.
        if let Some(parent) = self.arena[node].parent {
            let parent_arity = self.arena[parent].offspring.len();
            if let Some(bag) = self.ets.get_mut(&parent_arity) {
                bag.remove(parent);
            }
        }

        for &child in &children {
            self.nodes.push(child);
        }
        self.ets.get_mut(&0).unwrap().remove(node);
        for &child in &children {
            self.ets.get_mut(&0).unwrap().insert(child);
            self.size += 1;
        }

        Ok(node)
    }

    /// Collapses the elementary tree at `node` into the given leaf value,
    /// deleting its offspring. Returns `None` when the tree is a single
    /// node (there is nothing to collapse into).
    pub(crate) fn del_et(
        &mut self,
        node: NodeId,
        leaf: &Term,
    ) -> ConjectureResult<Option<NodeId>> {
        if self.size == 1 {
            return Ok(None);
        }
        let order = self.arena[node].offspring.len();
        ensure!(
            order >= 1 && self.ets(order).contains(node),
            InvalidMove: "ET deletion target `{}` is not an elementary tree",
            self.arena[node].value
        );
        ensure!(
            leaf.is_leaf(),
            InvalidMove: "replacement value `{}` is not a leaf",
            leaf
        );

        let old_value = self.arena[node].value.clone();
        if let Term::Op(name) = &old_value {
            if let Some(count) = self.nops.get_mut(name) {
                *count -= 1;
            }
        }
        self.arena[node].value = leaf.clone();
        self.ets.get_mut(&order).unwrap().remove(node);
        self.ets.get_mut(&0).unwrap().insert(node);

        let offspring = std::mem::take(&mut self.arena[node].offspring);
        for &o in &offspring {
            self.ets.get_mut(&0).unwrap().remove(o);
            if let Some(pos) = self.nodes.iter().position(|&n| n == o) {
                self.nodes.remove(pos);
            }
            self.size -= 1;
            let _ = self.arena.remove(o);
        }

        // The parent may have just become elementary.
        if let Some(parent) = self.arena[node].parent {
            let all_leaves = self.arena[parent]
                .offspring
                .iter()
                .all(|&o| self.ets(0).contains(o));
            if all_leaves {
                let parent_arity = self.arena[parent].offspring.len();
                self.ets.get_mut(&parent_arity).unwrap().insert(parent);
            }
        }

        Ok(Some(node))
    }

    /// Swaps the elementary tree at `target` for the given pattern, in any
    /// arity combination except leaf-for-leaf (that is a long-range move,
    /// not an ET move). The target keeps its arena key.
    pub fn et_replace(&mut self, target: NodeId, new: &EtPattern) -> ConjectureResult<NodeId> {
        let o_ini = self.arena[target].offspring.len();
        let o_fin = new.arity();

        if o_ini == 0 {
            ensure!(
                o_fin >= 1,
                InvalidMove: "leaf-for-leaf replacement is not an elementary-tree move"
            );
            return self.add_et(target, new);
        }

        if o_fin == 0 {
            return match self.del_et(target, &new.value)? {
                Some(id) => Ok(id),
                None => conjecture_bail!(InvalidMove: "cannot collapse the only node"),
            };
        }

        // The intermediate leaf value is overwritten by the insertion.
        let placeholder = self.et_space(0)[0].value.clone();
        self.del_et(target, &placeholder)?;
        self.add_et(target, new)
    }

    /// Relabels a node in place, keeping `nops` in step when the node is an
    /// operator. The new value must preserve the node's arity.
    pub fn relabel(&mut self, node: NodeId, new: Term) {
        debug_assert!(
            self.arena[node].offspring.is_empty()
                || self.ops.arity(new.name()) == Some(self.arena[node].offspring.len()),
            "relabel must preserve arity"
        );
        let old = std::mem::replace(&mut self.arena[node].value, new);
        if !self.arena[node].offspring.is_empty() {
            if let Term::Op(name) = &old {
                if let Some(count) = self.nops.get_mut(name) {
                    *count -= 1;
                }
            }
            if let Term::Op(name) = &self.arena[node].value {
                *self.nops.entry(name.clone()).or_insert(0) += 1;
            }
        }
    }

    /// Sets a node's value without touching `nops`; returns the old value.
    /// The energy model uses this for its temporary apply-then-undo of
    /// long-range proposals, where the counters must not drift.
    pub(crate) fn swap_value(&mut self, node: NodeId, value: Term) -> Term {
        std::mem::replace(&mut self.arena[node].value, value)
    }

    /// Detailed-balance bookkeeping for swapping the ET at `target` (of its
    /// current arity) for a pattern of arity `o_f`.
    pub fn et_move_weights(&self, target: NodeId, o_f: usize) -> EtWeights {
        let o_i = self.arena[target].offspring.len();
        let size = self.size as isize;
        let max = self.max_size as isize;

        let n_if = self
            .move_types
            .iter()
            .filter(|&&(oi, of)| {
                !self.ets(oi).is_empty() && size + of as isize - oi as isize <= max
            })
            .count();

        // Feasible move types after the swap, from the implied bucket
        // occupancy: the target switched buckets and its leaf offspring
        // came or went, without applying anything.
        let mut n_fi = 0;
        for &(oi, of) in self.move_types.iter() {
            let post_size_ok = size + o_f as isize - o_i as isize + of as isize - oi as isize <= max;
            if !post_size_ok {
                continue;
            }
            if oi == o_i {
                if o_i == 0 || self.ets(o_i).len() > 1 {
                    n_fi += 1;
                }
            } else if oi == o_f {
                // The swap just produced an ET of arity o_f.
                n_fi += 1;
            } else if !self.ets(oi).is_empty() {
                n_fi += 1;
            }
        }

        let omega_i = self.ets(o_i).len();
        let mut omega_f = self.ets(o_f).len() as isize + 1;
        if o_f == 0 {
            // Collapsing to a leaf removes the target's offspring from ets[0].
            omega_f -= o_i as isize;
        }
        if o_i == 0 {
            if let Some(parent) = self.arena[target].parent {
                if self.ets(o_f).contains(parent) {
                    omega_f -= 1;
                }
            }
        }

        EtWeights {
            n_if,
            n_fi,
            omega_i,
            omega_f,
            s_i: self.et_space(o_i).len(),
            s_f: self.et_space(o_f).len(),
        }
    }
}
