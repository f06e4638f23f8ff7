// SPDX-License-Identifier: Apache-2.0

//! Structural facts that hold without any analysis state.
//!
//! Knowledge comes only from a node's own operation and its literal
//! operands, so answers stay valid for nodes created after `populate`.

use crate::ir::{self, NodePayload, NodeRef, Unop};
use crate::leaf_type_tree::LeafTypeTree;
use crate::opt_error::OptError;
use crate::query_engine::ternary::ternary_transfer;
use crate::query_engine::{
    all_unknown_ternary, PredicateState, QueryEngine, ReachedFixpoint, TreeBitLocation,
};
use crate::ternary::TernaryVector;

#[derive(Debug, Clone, Copy, Default)]
pub struct StatelessQueryEngine;

impl StatelessQueryEngine {
    pub fn new() -> Self {
        StatelessQueryEngine
    }

    /// The `one_hot` node all of `bits` come from, if they share one.
    fn common_one_hot(f: &ir::Fn, bits: &[TreeBitLocation]) -> Option<NodeRef> {
        let first = bits.first()?.node;
        if !matches!(f.get_node(first).payload, NodePayload::OneHot { .. }) {
            return None;
        }
        if bits.iter().all(|b| b.node == first && b.leaf_index == 0) {
            Some(first)
        } else {
            None
        }
    }

    fn is_negation_of(f: &ir::Fn, a: &TreeBitLocation, b: &TreeBitLocation) -> bool {
        match f.get_node(a.node).payload {
            NodePayload::Unop(Unop::Not, arg) => {
                arg == b.node && a.bit_index == b.bit_index && a.leaf_index == b.leaf_index
            }
            _ => false,
        }
    }
}

impl QueryEngine for StatelessQueryEngine {
    fn populate(&mut self, _f: &ir::Fn) -> Result<ReachedFixpoint, OptError> {
        Ok(ReachedFixpoint::Unchanged)
    }

    fn is_tracked(&self, f: &ir::Fn, node: NodeRef) -> bool {
        !matches!(f.get_node(node).payload, NodePayload::Nil)
    }

    fn get_ternary(&self, f: &ir::Fn, node: NodeRef) -> LeafTypeTree<TernaryVector> {
        if !self.is_tracked(f, node) {
            return all_unknown_ternary(f, node);
        }
        ternary_transfer(f, node, |op| match &f.get_node(op).payload {
            NodePayload::Literal(_) => ternary_transfer(f, op, |inner| all_unknown_ternary(f, inner)),
            _ => all_unknown_ternary(f, op),
        })
    }

    fn specialize_given_predicate(&self, _f: &ir::Fn, _state: &[PredicateState]) -> Box<dyn QueryEngine> {
        Box::new(*self)
    }

    fn at_most_one_true(&self, f: &ir::Fn, bits: &[TreeBitLocation]) -> bool {
        if Self::common_one_hot(f, bits).is_some() {
            return true;
        }
        let maybe_one = bits.iter().filter(|b| !self.is_zero(f, b)).count();
        maybe_one <= 1
    }

    fn at_least_one_true(&self, f: &ir::Fn, bits: &[TreeBitLocation]) -> bool {
        if let Some(one_hot) = Self::common_one_hot(f, bits) {
            let width = f.get_node_ty(one_hot).bit_count();
            let mut covered = vec![false; width];
            for b in bits {
                if b.bit_index < width {
                    covered[b.bit_index] = true;
                }
            }
            if covered.iter().all(|c| *c) {
                return true;
            }
        }
        bits.iter().any(|b| self.is_one(f, b))
    }

    fn known_not_equals(&self, f: &ir::Fn, a: &TreeBitLocation, b: &TreeBitLocation) -> bool {
        if Self::is_negation_of(f, a, b) || Self::is_negation_of(f, b, a) {
            return true;
        }
        let (x, y) = (self.get_bit(f, a), self.get_bit(f, b));
        x.is_known() && y.is_known() && x != y
    }
}
