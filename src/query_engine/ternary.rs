// SPDX-License-Identifier: Apache-2.0

//! Per-bit ternary abstract interpretation run to a fixpoint over a
//! function.

use std::collections::HashMap;

use crate::ir::{self, Binop, NaryOp, NodePayload, NodeRef, Type, Unop};
use crate::ir_eval::eval_payload;
use crate::ir_utils::{get_topological, operands};
use crate::ir_value::{IrBits, IrValue};
use crate::ir_value_utils::{flatten_leaves, ir_value_from_leaves};
use crate::leaf_type_tree::LeafTypeTree;
use crate::opt_error::OptError;
use crate::query_engine::{
    all_unknown_ternary, ArmId, PredicateState, QueryEngine, ReachedFixpoint, TreeBitLocation,
};
use crate::ternary::{TernaryValue, TernaryVector};

type TernaryTree = LeafTypeTree<TernaryVector>;

fn unknown_of(ty: &Type) -> TernaryTree {
    LeafTypeTree::from_fn(ty.clone(), |leaf| TernaryVector::unknown(leaf.bit_count()))
}

fn bits_tree(ty: &Type, value: TernaryVector) -> TernaryTree {
    LeafTypeTree::from_elements(ty.clone(), vec![value])
}

fn bits_leaf(tree: &TernaryTree) -> TernaryVector {
    tree.elements()
        .first()
        .cloned()
        .unwrap_or_else(|| TernaryVector::unknown(0))
}

fn single(value: TernaryValue) -> TernaryVector {
    TernaryVector::new(vec![value])
}

fn literal_tree(ty: &Type, value: &IrValue) -> TernaryTree {
    let leaves = flatten_leaves(value)
        .iter()
        .map(TernaryVector::from_bits)
        .collect();
    LeafTypeTree::from_elements(ty.clone(), leaves)
}

fn known_value_of(tree: &TernaryTree) -> Option<IrValue> {
    let leaves: Option<Vec<IrBits>> = tree.elements().iter().map(|t| t.to_known_bits()).collect();
    ir_value_from_leaves(&leaves?, tree.ty()).ok()
}

fn meet_all(ty: &Type, candidates: &[TernaryTree]) -> TernaryTree {
    let Some((first, rest)) = candidates.split_first() else {
        return unknown_of(ty);
    };
    rest.iter()
        .fold(first.clone(), |acc, c| acc.zip(c, |a, b| a.meet(b)))
}

/// Whether every leaf of `a` and `b` can be shown equal (`KnownOne`) or some
/// leaf can be shown different (`KnownZero`).
fn trees_equal(a: &TernaryTree, b: &TernaryTree) -> TernaryValue {
    let mut result = TernaryValue::KnownOne;
    for (x, y) in a.elements().iter().zip(b.elements().iter()) {
        match x.equals(y) {
            TernaryValue::KnownZero => return TernaryValue::KnownZero,
            TernaryValue::Unknown => result = TernaryValue::Unknown,
            TernaryValue::KnownOne => {}
        }
    }
    result
}

/// Unsigned `a < b` from the range each ternary vector admits.
fn ternary_ult(a: &TernaryVector, b: &TernaryVector) -> TernaryValue {
    if a.max_value().ult(&b.min_value()) {
        TernaryValue::KnownOne
    } else if a.min_value().uge(&b.max_value()) {
        TernaryValue::KnownZero
    } else {
        TernaryValue::Unknown
    }
}

fn one_hot_ternary(arg: &TernaryVector, lsb_prio: bool) -> TernaryVector {
    let w = arg.width();
    let mut out = vec![TernaryValue::KnownZero; w + 1];
    let order: Vec<usize> = if lsb_prio {
        (0..w).collect()
    } else {
        (0..w).rev().collect()
    };
    let mut prior_clear = TernaryValue::KnownOne;
    for idx in order {
        let bit = arg.get(idx);
        out[idx] = bit.and(prior_clear);
        prior_clear = prior_clear.and(bit.not());
    }
    out[w] = prior_clear;
    TernaryVector::new(out)
}

/// Computes the ternary value of `node` from its operands' ternary values.
///
/// Nodes whose operands are all fully known are folded by evaluation.
pub fn ternary_transfer<G>(f: &ir::Fn, node: NodeRef, get: G) -> TernaryTree
where
    G: Fn(NodeRef) -> TernaryTree,
{
    let n = f.get_node(node);
    let ty = &n.ty;
    let payload = &n.payload;

    if !matches!(payload, NodePayload::Nil | NodePayload::GetParam(_) | NodePayload::Literal(_)) {
        let known: Option<Vec<(NodeRef, IrValue)>> = operands(payload)
            .into_iter()
            .map(|op| known_value_of(&get(op)).map(|v| (op, v)))
            .collect();
        if let Some(known) = known {
            let lookup = |op: NodeRef| -> Result<IrValue, OptError> {
                known
                    .iter()
                    .find(|(r, _)| *r == op)
                    .map(|(_, v)| v.clone())
                    .ok_or_else(|| OptError::Eval(format!("operand {} not known", op.index)))
            };
            match eval_payload(payload, ty, lookup) {
                Ok(value) => return literal_tree(ty, &value),
                Err(e) => log::trace!("ternary_transfer: no fold for node {}: {}", node.index, e),
            }
        }
    }

    match payload {
        NodePayload::Nil | NodePayload::GetParam(_) => unknown_of(ty),
        NodePayload::Literal(value) => literal_tree(ty, value),
        NodePayload::Tuple(elems) => LeafTypeTree::from_subtrees(elems.iter().map(|e| get(*e)).collect()),
        NodePayload::TupleIndex { tuple, index } => {
            get(*tuple).tuple_element(*index).unwrap_or_else(|| unknown_of(ty))
        }
        NodePayload::Binop(op, lhs, rhs) => {
            let (a, b) = (get(*lhs), get(*rhs));
            let value = match op {
                Binop::Eq => trees_equal(&a, &b),
                Binop::Ne => trees_equal(&a, &b).not(),
                Binop::Ult => ternary_ult(&bits_leaf(&a), &bits_leaf(&b)),
                Binop::Ugt => ternary_ult(&bits_leaf(&b), &bits_leaf(&a)),
                Binop::Uge => ternary_ult(&bits_leaf(&a), &bits_leaf(&b)).not(),
                Binop::Ule => ternary_ult(&bits_leaf(&b), &bits_leaf(&a)).not(),
            };
            bits_tree(ty, single(value))
        }
        NodePayload::Unop(op, arg) => {
            let a = get(*arg);
            match op {
                Unop::Identity => a,
                Unop::Not => a.map(|t| t.not()),
                Unop::OrReduce => bits_tree(ty, single(bits_leaf(&a).or_reduce())),
                Unop::AndReduce => bits_tree(ty, single(bits_leaf(&a).and_reduce())),
                Unop::XorReduce => bits_tree(ty, single(bits_leaf(&a).xor_reduce())),
            }
        }
        NodePayload::SignExt { arg, new_bit_count } => {
            bits_tree(ty, bits_leaf(&get(*arg)).sign_ext(*new_bit_count))
        }
        NodePayload::ZeroExt { arg, new_bit_count } => {
            bits_tree(ty, bits_leaf(&get(*arg)).zero_ext(*new_bit_count))
        }
        NodePayload::BitSlice { arg, start, width } => {
            let a = bits_leaf(&get(*arg));
            if start + width > a.width() {
                return unknown_of(ty);
            }
            bits_tree(ty, a.slice(*start, *width))
        }
        NodePayload::Nary(NaryOp::Concat, elems) => {
            let parts: Vec<TernaryVector> = elems.iter().map(|e| bits_leaf(&get(*e))).collect();
            bits_tree(ty, TernaryVector::concat(&parts))
        }
        NodePayload::Nary(op, elems) => {
            let parts: Vec<TernaryVector> = elems.iter().map(|e| bits_leaf(&get(*e))).collect();
            let Some((first, rest)) = parts.split_first() else {
                return unknown_of(ty);
            };
            let acc = rest.iter().fold(first.clone(), |acc, p| match op {
                NaryOp::And | NaryOp::Nand => acc.and(p),
                NaryOp::Or | NaryOp::Nor => acc.or(p),
                NaryOp::Xor => acc.xor(p),
                NaryOp::Concat => unreachable!("concat handled above"),
            });
            let acc = match op {
                NaryOp::Nand | NaryOp::Nor => acc.not(),
                _ => acc,
            };
            bits_tree(ty, acc)
        }
        NodePayload::Sel {
            selector,
            cases,
            default,
        } => {
            let s = bits_leaf(&get(*selector));
            let w = s.width();
            let mut candidates = Vec::new();
            for (i, case) in cases.iter().enumerate() {
                let feasible = match IrBits::make_ubits(w, i as u64) {
                    Ok(index) => TernaryVector::from_bits(&index).equals(&s) != TernaryValue::KnownZero,
                    Err(_) => false,
                };
                if feasible {
                    candidates.push(get(*case));
                }
            }
            if let Some(d) = default {
                let default_feasible = match IrBits::make_ubits(w, cases.len() as u64) {
                    Ok(count) => s.max_value().uge(&count),
                    Err(_) => false,
                };
                if default_feasible {
                    candidates.push(get(*d));
                }
            }
            meet_all(ty, &candidates)
        }
        NodePayload::OneHotSel { selector, cases } => {
            let s = bits_leaf(&get(*selector));
            let mut acc = LeafTypeTree::from_fn(ty.clone(), |leaf| {
                TernaryVector::new(vec![TernaryValue::KnownZero; leaf.bit_count()])
            });
            for (i, case) in cases.iter().enumerate() {
                let bit = if i < s.width() { s.get(i) } else { TernaryValue::Unknown };
                let c = get(*case);
                acc = acc.zip(&c, |a, v| {
                    let gated = v.and(&TernaryVector::new(vec![bit; v.width()]));
                    a.or(&gated)
                });
            }
            acc
        }
        NodePayload::PrioritySel { selector, cases } => {
            let s = bits_leaf(&get(*selector));
            let mut candidates = Vec::new();
            let mut may_be_all_zero = true;
            for (i, case) in cases.iter().enumerate() {
                let bit = if i < s.width() { s.get(i) } else { TernaryValue::Unknown };
                match bit {
                    TernaryValue::KnownZero => continue,
                    TernaryValue::KnownOne => {
                        candidates.push(get(*case));
                        may_be_all_zero = false;
                        break;
                    }
                    TernaryValue::Unknown => candidates.push(get(*case)),
                }
            }
            if may_be_all_zero {
                candidates.push(LeafTypeTree::from_fn(ty.clone(), |leaf| {
                    TernaryVector::new(vec![TernaryValue::KnownZero; leaf.bit_count()])
                }));
            }
            meet_all(ty, &candidates)
        }
        NodePayload::OneHot { arg, lsb_prio } => {
            bits_tree(ty, one_hot_ternary(&bits_leaf(&get(*arg)), *lsb_prio))
        }
    }
}

/// Forces the selector bits implied by `state` taking its arm, or `None` if
/// the arm implies nothing representable as known selector bits.
fn selector_given(f: &ir::Fn, state: &PredicateState) -> Option<(NodeRef, TernaryVector)> {
    match &f.get_node(state.node).payload {
        NodePayload::Sel { selector, .. } => {
            let w = f.get_node_ty(*selector).bit_count();
            match state.arm {
                ArmId::Case(i) => {
                    let index = IrBits::make_ubits(w, i as u64).ok()?;
                    Some((*selector, TernaryVector::from_bits(&index)))
                }
                ArmId::Default => None,
            }
        }
        NodePayload::OneHotSel { selector, .. } => {
            let w = f.get_node_ty(*selector).bit_count();
            match state.arm {
                ArmId::Case(i) if i < w => {
                    let mut t = TernaryVector::unknown(w);
                    t.set(i, TernaryValue::KnownOne);
                    Some((*selector, t))
                }
                ArmId::Case(_) => None,
                ArmId::Default => Some((*selector, TernaryVector::from_bits(&IrBits::zero(w)))),
            }
        }
        NodePayload::PrioritySel { selector, .. } => {
            let w = f.get_node_ty(*selector).bit_count();
            match state.arm {
                ArmId::Case(i) if i < w => {
                    let mut t = TernaryVector::unknown(w);
                    for j in 0..i {
                        t.set(j, TernaryValue::KnownZero);
                    }
                    t.set(i, TernaryValue::KnownOne);
                    Some((*selector, t))
                }
                ArmId::Case(_) => None,
                ArmId::Default => Some((*selector, TernaryVector::from_bits(&IrBits::zero(w)))),
            }
        }
        _ => None,
    }
}

#[derive(Debug, Clone, Default)]
pub struct TernaryQueryEngine {
    values: HashMap<NodeRef, TernaryTree>,
    /// Facts assumed about bits-typed nodes, unioned into their computed
    /// values.
    givens: HashMap<NodeRef, TernaryVector>,
}

impl TernaryQueryEngine {
    pub fn new() -> Self {
        Self::default()
    }

    fn add_given(&mut self, node: NodeRef, value: TernaryVector) {
        let merged = match self.givens.get(&node) {
            Some(existing) => match existing.union(&value) {
                Ok(u) => u,
                Err(conflict) => {
                    log::debug!(
                        "TernaryQueryEngine: contradictory assumption on node {} bit {}",
                        node.index,
                        conflict.bit_index
                    );
                    return;
                }
            },
            None => value,
        };
        self.givens.insert(node, merged);
    }

    fn lookup(&self, f: &ir::Fn, node: NodeRef) -> TernaryTree {
        self.values
            .get(&node)
            .cloned()
            .unwrap_or_else(|| all_unknown_ternary(f, node))
    }

    fn compute(&self, f: &ir::Fn, node: NodeRef) -> TernaryTree {
        let mut value = ternary_transfer(f, node, |op| self.lookup(f, op));
        if let Some(given) = self.givens.get(&node) {
            if value.ty().is_bits() {
                let current = value.get_leaf(0).clone();
                if current.width() == given.width() {
                    // A conflict means the assumption is unreachable; keep the
                    // computed value.
                    if let Ok(u) = current.union(given) {
                        *value.get_leaf_mut(0) = u;
                    }
                }
            }
        }
        value
    }

    /// Recomputes every node once in topological order; returns whether any
    /// value changed.
    fn propagate(&mut self, f: &ir::Fn) -> bool {
        let mut changed = false;
        for nr in get_topological(f) {
            if matches!(f.get_node(nr).payload, NodePayload::Nil) {
                if self.values.remove(&nr).is_some() {
                    changed = true;
                }
                continue;
            }
            let value = self.compute(f, nr);
            if self.values.get(&nr) != Some(&value) {
                self.values.insert(nr, value);
                changed = true;
            }
        }
        changed
    }

    fn with_assumptions(&self, f: &ir::Fn, assumed: &[(TreeBitLocation, bool)]) -> TernaryQueryEngine {
        let mut engine = self.clone();
        for (location, value) in assumed {
            let Some(width) = f.get_node_ty(location.node).bits_width() else {
                continue;
            };
            if location.leaf_index != 0 || location.bit_index >= width {
                continue;
            }
            let mut t = TernaryVector::unknown(width);
            t.set(location.bit_index, TernaryValue::from_bool(*value));
            engine.add_given(location.node, t);
        }
        while engine.propagate(f) {}
        engine
    }
}

impl QueryEngine for TernaryQueryEngine {
    fn populate(&mut self, f: &ir::Fn) -> Result<ReachedFixpoint, OptError> {
        let mut changed = false;
        // Operands are visited before users, so the second sweep only
        // confirms the fixpoint.
        while self.propagate(f) {
            changed = true;
        }
        log::debug!(
            "TernaryQueryEngine::populate {}: {} nodes tracked, changed={}",
            f.name,
            self.values.len(),
            changed
        );
        Ok(if changed {
            ReachedFixpoint::Changed
        } else {
            ReachedFixpoint::Unchanged
        })
    }

    fn is_tracked(&self, f: &ir::Fn, node: NodeRef) -> bool {
        match self.values.get(&node) {
            Some(value) => value.ty() == f.get_node_ty(node),
            None => false,
        }
    }

    fn get_ternary(&self, f: &ir::Fn, node: NodeRef) -> TernaryTree {
        if !self.is_tracked(f, node) {
            return all_unknown_ternary(f, node);
        }
        self.lookup(f, node)
    }

    fn specialize_given_predicate(&self, f: &ir::Fn, state: &[PredicateState]) -> Box<dyn QueryEngine> {
        let mut engine = self.clone();
        for s in state {
            if let Some((selector, given)) = selector_given(f, s) {
                engine.add_given(selector, given);
            }
        }
        while engine.propagate(f) {}
        Box::new(engine)
    }

    fn implied_node_ternary(
        &self,
        f: &ir::Fn,
        assumed: &[(TreeBitLocation, bool)],
        node: NodeRef,
    ) -> Option<TernaryVector> {
        if !f.get_node_ty(node).is_bits() || !self.is_tracked(f, node) {
            return None;
        }
        let engine = self.with_assumptions(f, assumed);
        engine.get_ternary(f, node).get_bits_leaf().cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir_parser::Parser;
    use pretty_assertions::assert_eq;

    fn parse(text: &str) -> ir::Fn {
        Parser::new(text).parse_fn().unwrap()
    }

    fn node_named(f: &ir::Fn, name: &str) -> NodeRef {
        f.node_refs()
            .into_iter()
            .find(|nr| ir::node_textual_id(f, *nr) == name)
            .unwrap()
    }

    fn ternary_str(engine: &TernaryQueryEngine, f: &ir::Fn, name: &str) -> String {
        bits_leaf(&engine.get_ternary(f, node_named(f, name))).to_string()
    }

    #[test]
    fn test_populate_reaches_fixpoint_and_is_idempotent() {
        let f = parse(
            r#"fn f(x: bits[4] id=1) -> bits[8] {
  literal.2: bits[4] = literal(value=0b1010, id=2)
  ret concat.3: bits[8] = concat(literal.2, x, id=3)
}"#,
        );
        let mut engine = TernaryQueryEngine::new();
        assert_eq!(engine.populate(&f).unwrap(), ReachedFixpoint::Changed);
        assert_eq!(engine.populate(&f).unwrap(), ReachedFixpoint::Unchanged);
        assert_eq!(ternary_str(&engine, &f, "concat.3"), "0b1010XXXX");
    }

    #[test]
    fn test_select_family_transfer() {
        let f = parse(
            r#"fn f(s: bits[2] id=1, x: bits[4] id=2) -> (bits[4], bits[4], bits[4]) {
  literal.3: bits[4] = literal(value=0b1100, id=3)
  literal.4: bits[4] = literal(value=0b1001, id=4)
  or.5: bits[4] = or(x, literal.3, id=5)
  sel.6: bits[4] = sel(s, cases=[literal.3, literal.4, or.5], default=literal.3, id=6)
  one_hot_sel.7: bits[4] = one_hot_sel(s, cases=[literal.3, literal.4], id=7)
  priority_sel.8: bits[4] = priority_sel(s, cases=[or.5, literal.3], id=8)
  ret tuple.9: (bits[4], bits[4], bits[4]) = tuple(sel.6, one_hot_sel.7, priority_sel.8, id=9)
}"#,
        );
        let mut engine = TernaryQueryEngine::new();
        engine.populate(&f).unwrap();
        assert_eq!(ternary_str(&engine, &f, "or.5"), "0b11XX");
        // meet of 1100, 1001, 11XX, 1100
        assert_eq!(ternary_str(&engine, &f, "sel.6"), "0b1XXX");
        // 0 | 1100 | 1001 | 1101 meet: bits 3 and 0 may be 0 or 1
        assert_eq!(ternary_str(&engine, &f, "one_hot_sel.7"), "0bXX0X");
        // 11XX, 1100, 0000
        assert_eq!(ternary_str(&engine, &f, "priority_sel.8"), "0bXXXX");
    }

    #[test]
    fn test_specialize_given_predicate_forces_selector() {
        let f = parse(
            r#"fn f(s: bits[2] id=1, x: bits[4] id=2, y: bits[4] id=3) -> bits[4] {
  ret sel.4: bits[4] = sel(s, cases=[x, y, x, y], id=4)
}"#,
        );
        let mut engine = TernaryQueryEngine::new();
        engine.populate(&f).unwrap();
        let sel = node_named(&f, "sel.4");
        let s = node_named(&f, "s");
        let specialized = engine.specialize_given_predicate(
            &f,
            &[PredicateState {
                node: sel,
                arm: ArmId::Case(2),
            }],
        );
        assert_eq!(
            specialized.known_value_as_bits(&f, s),
            Some(IrBits::make_ubits(2, 2).unwrap())
        );
        // The receiver is unchanged.
        assert_eq!(engine.known_value_as_bits(&f, s), None);
    }

    #[test]
    fn test_implied_node_value() {
        let f = parse(
            r#"fn f(a: bits[1] id=1, b: bits[1] id=2) -> bits[1] {
  ret and.3: bits[1] = and(a, b, id=3)
}"#,
        );
        let mut engine = TernaryQueryEngine::new();
        engine.populate(&f).unwrap();
        let a = node_named(&f, "a");
        let and = node_named(&f, "and.3");
        assert_eq!(
            engine.implied_node_value(&f, &[(TreeBitLocation::new(a, 0), false)], and),
            Some(IrBits::make_ubits(1, 0).unwrap())
        );
        assert_eq!(
            engine.implied_node_ternary(&f, &[(TreeBitLocation::new(a, 0), true)], and),
            Some(TernaryVector::unknown(1))
        );
    }

    #[test]
    fn test_one_hot_and_comparisons() {
        let f = parse(
            r#"fn f(x: bits[2] id=1) -> (bits[4], bits[1]) {
  literal.2: bits[1] = literal(value=1, id=2)
  concat.3: bits[3] = concat(x, literal.2, id=3)
  one_hot.4: bits[4] = one_hot(concat.3, lsb_prio=true, id=4)
  literal.5: bits[3] = literal(value=0, id=5)
  ugt.6: bits[1] = ugt(concat.3, literal.5, id=6)
  ret tuple.7: (bits[4], bits[1]) = tuple(one_hot.4, ugt.6, id=7)
}"#,
        );
        let mut engine = TernaryQueryEngine::new();
        engine.populate(&f).unwrap();
        assert_eq!(ternary_str(&engine, &f, "one_hot.4"), "0b0001");
        assert_eq!(ternary_str(&engine, &f, "ugt.6"), "0b1");
    }
}
