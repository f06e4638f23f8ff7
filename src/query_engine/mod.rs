// SPDX-License-Identifier: Apache-2.0

//! Bit-level knowledge about the values of IR nodes.
//!
//! Every answer is sound but possibly incomplete: `false`, `None`, or an
//! `Unknown` bit is always a safe answer, while a definite answer must hold
//! for every input assignment.
//!
//! Queries take the function being analyzed so that engines can answer for
//! nodes created after `populate` (they report nothing beyond what the
//! node's structure implies).

pub mod stateless;
pub mod ternary;
pub mod union;

use crate::interval_set::IntervalSet;
use crate::ir::{Fn, NodeRef};
use crate::ir_value::{IrBits, IrValue};
use crate::ir_value_utils::ir_value_from_leaves;
use crate::leaf_type_tree::LeafTypeTree;
use crate::opt_error::OptError;
use crate::ternary::{TernaryValue, TernaryVector};

pub use stateless::StatelessQueryEngine;
pub use ternary::TernaryQueryEngine;
pub use union::UnionQueryEngine;

/// Result of running an engine's analysis to a fixpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReachedFixpoint {
    /// Nothing the engine knows changed.
    Unchanged,
    /// Some knowledge was added or updated.
    Changed,
    /// The engine cannot say whether anything changed.
    Unknown,
}

/// Identifies one bit of one leaf of a node's value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TreeBitLocation {
    pub node: NodeRef,
    pub bit_index: usize,
    pub leaf_index: usize,
}

impl TreeBitLocation {
    /// A bit of a bits-typed node.
    pub fn new(node: NodeRef, bit_index: usize) -> Self {
        TreeBitLocation {
            node,
            bit_index,
            leaf_index: 0,
        }
    }
}

/// Which arm of a select-family node is assumed to be taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArmId {
    Case(usize),
    /// The `sel` default, or the all-zero selector of a priority select.
    Default,
}

/// An assumption that `node` (a select-family node) takes `arm`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PredicateState {
    pub node: NodeRef,
    pub arm: ArmId,
}

pub fn all_unknown_ternary(f: &Fn, node: NodeRef) -> LeafTypeTree<TernaryVector> {
    LeafTypeTree::from_fn(f.get_node_ty(node).clone(), |leaf| {
        TernaryVector::unknown(leaf.bit_count())
    })
}

pub fn maximal_intervals(f: &Fn, node: NodeRef) -> LeafTypeTree<IntervalSet> {
    LeafTypeTree::from_fn(f.get_node_ty(node).clone(), |leaf| {
        IntervalSet::maximal(leaf.bit_count())
    })
}

pub trait QueryEngine {
    /// Runs the analysis over `f` to a fixpoint. Calling this again without
    /// mutating `f` returns `Unchanged`.
    fn populate(&mut self, f: &Fn) -> Result<ReachedFixpoint, OptError>;

    /// Whether the engine holds any knowledge about `node`.
    fn is_tracked(&self, f: &Fn, node: NodeRef) -> bool;

    /// Per-leaf ternary knowledge; all `Unknown` when untracked.
    fn get_ternary(&self, f: &Fn, node: NodeRef) -> LeafTypeTree<TernaryVector>;

    /// Per-leaf interval sets; maximal when untracked.
    fn get_intervals(&self, f: &Fn, node: NodeRef) -> LeafTypeTree<IntervalSet> {
        if !self.is_tracked(f, node) {
            return maximal_intervals(f, node);
        }
        self.get_ternary(f, node).map(IntervalSet::from_ternary)
    }

    /// Returns an engine that additionally assumes every predicate in
    /// `state`. The receiver is not modified.
    fn specialize_given_predicate(&self, f: &Fn, state: &[PredicateState]) -> Box<dyn QueryEngine>;

    fn get_bit(&self, f: &Fn, location: &TreeBitLocation) -> TernaryValue {
        let ternary = self.get_ternary(f, location.node);
        if location.leaf_index >= ternary.leaf_count() {
            return TernaryValue::Unknown;
        }
        let leaf = ternary.get_leaf(location.leaf_index);
        if location.bit_index >= leaf.width() {
            return TernaryValue::Unknown;
        }
        leaf.get(location.bit_index)
    }

    fn is_known(&self, f: &Fn, location: &TreeBitLocation) -> bool {
        self.get_bit(f, location).is_known()
    }

    fn is_one(&self, f: &Fn, location: &TreeBitLocation) -> bool {
        self.get_bit(f, location) == TernaryValue::KnownOne
    }

    fn is_zero(&self, f: &Fn, location: &TreeBitLocation) -> bool {
        self.get_bit(f, location) == TernaryValue::KnownZero
    }

    /// True only if at most one of `bits` can be set at once.
    fn at_most_one_true(&self, f: &Fn, bits: &[TreeBitLocation]) -> bool {
        let maybe_one = bits.iter().filter(|b| !self.is_zero(f, b)).count();
        maybe_one <= 1
    }

    /// True only if at least one of `bits` is always set.
    fn at_least_one_true(&self, f: &Fn, bits: &[TreeBitLocation]) -> bool {
        bits.iter().any(|b| self.is_one(f, b))
    }

    fn known_equals(&self, f: &Fn, a: &TreeBitLocation, b: &TreeBitLocation) -> bool {
        if a == b {
            return true;
        }
        let (x, y) = (self.get_bit(f, a), self.get_bit(f, b));
        x.is_known() && x == y
    }

    fn known_not_equals(&self, f: &Fn, a: &TreeBitLocation, b: &TreeBitLocation) -> bool {
        let (x, y) = (self.get_bit(f, a), self.get_bit(f, b));
        x.is_known() && y.is_known() && x != y
    }

    /// True only if `a` being set forces `b` to be set.
    fn implies(&self, f: &Fn, a: &TreeBitLocation, b: &TreeBitLocation) -> bool {
        a == b || self.is_zero(f, a) || self.is_one(f, b)
    }

    /// What would be known about bits-typed `node` if each location in
    /// `assumed` held the paired value.
    ///
    /// The default ignores the assumptions and returns the unconditional
    /// ternary of `node`, which is still sound. Engines that can reason under
    /// assumptions override it.
    fn implied_node_ternary(
        &self,
        f: &Fn,
        _assumed: &[(TreeBitLocation, bool)],
        node: NodeRef,
    ) -> Option<TernaryVector> {
        if !self.is_tracked(f, node) {
            return None;
        }
        self.get_ternary(f, node).get_bits_leaf().cloned()
    }

    fn implied_node_value(
        &self,
        f: &Fn,
        assumed: &[(TreeBitLocation, bool)],
        node: NodeRef,
    ) -> Option<IrBits> {
        self.implied_node_ternary(f, assumed, node)?.to_known_bits()
    }

    /// The value of bits-typed `node` if every bit is known.
    fn known_value_as_bits(&self, f: &Fn, node: NodeRef) -> Option<IrBits> {
        if !f.get_node_ty(node).is_bits() || !self.is_tracked(f, node) {
            return None;
        }
        self.get_ternary(f, node).get_bits_leaf()?.to_known_bits()
    }

    /// The value of `node` (of any type) if every bit is known.
    fn known_value(&self, f: &Fn, node: NodeRef) -> Option<IrValue> {
        if !self.is_tracked(f, node) {
            return None;
        }
        let ternary = self.get_ternary(f, node);
        let leaves: Option<Vec<IrBits>> = ternary.elements().iter().map(|t| t.to_known_bits()).collect();
        ir_value_from_leaves(&leaves?, ternary.ty()).ok()
    }

    fn is_fully_known(&self, f: &Fn, node: NodeRef) -> bool {
        self.is_tracked(f, node)
            && self
                .get_ternary(f, node)
                .elements()
                .iter()
                .all(|t| t.is_fully_known())
    }

    fn is_all_zeros(&self, f: &Fn, node: NodeRef) -> bool {
        self.is_tracked(f, node)
            && self
                .get_ternary(f, node)
                .elements()
                .iter()
                .all(|t| t.is_known_zero())
    }

    fn is_all_ones(&self, f: &Fn, node: NodeRef) -> bool {
        self.known_value_as_bits(f, node)
            .map(|b| b.is_all_ones())
            .unwrap_or(false)
    }

    /// At most one bit of bits-typed `node` can be set.
    fn at_most_one_bit_true(&self, f: &Fn, node: NodeRef) -> bool {
        let Some(width) = f.get_node_ty(node).bits_width() else {
            return false;
        };
        let bits: Vec<TreeBitLocation> = (0..width).map(|i| TreeBitLocation::new(node, i)).collect();
        self.at_most_one_true(f, &bits)
    }

    fn at_least_one_bit_true(&self, f: &Fn, node: NodeRef) -> bool {
        let Some(width) = f.get_node_ty(node).bits_width() else {
            return false;
        };
        let bits: Vec<TreeBitLocation> = (0..width).map(|i| TreeBitLocation::new(node, i)).collect();
        self.at_least_one_true(f, &bits)
    }

    /// Index of the only unknown bit of bits-typed `node`, if exactly one bit
    /// is unknown.
    fn exactly_one_bit_unknown(&self, f: &Fn, node: NodeRef) -> Option<usize> {
        if !f.get_node_ty(node).is_bits() {
            return None;
        }
        let ternary = self.get_ternary(f, node);
        let leaf = ternary.get_bits_leaf()?;
        let mut unknown = leaf
            .iter()
            .enumerate()
            .filter(|(_, b)| !b.is_known())
            .map(|(i, _)| i);
        let first = unknown.next()?;
        if unknown.next().is_some() {
            None
        } else {
            Some(first)
        }
    }
}
