// SPDX-License-Identifier: Apache-2.0

//! In-place graph editing for optimization passes.
//!
//! New nodes are appended to the function's arena with fresh text ids and a
//! type deduced from their operands. Replaced nodes are overwritten with
//! `Nil`, so emitted text and later passes skip them; the arena itself never
//! shrinks until `dce::remove_dead_nodes` compacts it.

use crate::ir::{
    node_textual_id, Binop, Fn, NaryOp, Node, NodePayload, NodeRef, PosData, Type, Unop,
};
use crate::ir_utils::{compute_users, operands, remap_payload_with};
use crate::ir_validate::deduce_payload_type;
use crate::ir_value::{IrBits, IrValue};
use crate::opt_error::OptError;
use crate::ret_check;

pub struct FnRewriter<'a> {
    f: &'a mut Fn,
    /// One entry per operand slot referring to the node.
    users: Vec<Vec<NodeRef>>,
    next_text_id: usize,
    /// Position attached to nodes created from now on.
    pos: Option<PosData>,
    created: Vec<NodeRef>,
}

impl<'a> FnRewriter<'a> {
    pub fn new(f: &'a mut Fn) -> Self {
        let users = compute_users(f);
        let next_text_id = f.max_text_id() + 1;
        FnRewriter {
            f,
            users,
            next_text_id,
            pos: None,
            created: Vec::new(),
        }
    }

    pub fn func(&self) -> &Fn {
        self.f
    }

    /// New nodes inherit the source position of `node` until the next call.
    pub fn set_pos_from(&mut self, node: NodeRef) {
        self.pos = self.f.get_node(node).pos.clone();
    }

    /// Drains the list of nodes created since the last call.
    pub fn take_created(&mut self) -> Vec<NodeRef> {
        std::mem::take(&mut self.created)
    }

    pub fn users(&self, node: NodeRef) -> &[NodeRef] {
        &self.users[node.index]
    }

    /// True if `node` feeds exactly one operand slot and is not the return
    /// value.
    pub fn has_single_use(&self, node: NodeRef) -> bool {
        self.f.ret_node_ref != Some(node) && self.users[node.index].len() == 1
    }

    pub fn is_replaced(&self, node: NodeRef) -> bool {
        matches!(self.f.get_node(node).payload, NodePayload::Nil)
    }

    /// Appends a node computing `payload`.
    pub fn add_node(&mut self, payload: NodePayload) -> Result<NodeRef, OptError> {
        let ty = deduce_payload_type(self.f, &payload).map_err(|message| {
            OptError::invariant(
                format!("{}.{}", payload.get_operator(), self.next_text_id),
                message,
            )
        })?;
        let new_ref = NodeRef {
            index: self.f.nodes.len(),
        };
        for op in operands(&payload) {
            self.users[op.index].push(new_ref);
        }
        self.f.nodes.push(Node {
            text_id: self.next_text_id,
            name: None,
            ty,
            payload,
            pos: self.pos.clone(),
        });
        self.next_text_id += 1;
        self.users.push(Vec::new());
        self.created.push(new_ref);
        Ok(new_ref)
    }

    /// Points every use of `old` (and the return value, if it is `old`) at
    /// `new`, then turns `old` into `Nil`.
    pub fn replace_uses_with(&mut self, old: NodeRef, new: NodeRef) -> Result<(), OptError> {
        let old_id = node_textual_id(self.f, old);
        ret_check!(old != new, old_id, "node replaced with itself");
        ret_check!(
            self.f.get_node_ty(old) == self.f.get_node_ty(new),
            old_id,
            "replacement {} has type {}, expected {}",
            node_textual_id(self.f, new),
            self.f.get_node_ty(new),
            self.f.get_node_ty(old)
        );
        let mut user_list = std::mem::take(&mut self.users[old.index]);
        ret_check!(
            !user_list.contains(&new),
            old_id,
            "replacement {} uses the replaced node",
            node_textual_id(self.f, new)
        );
        user_list.sort();
        user_list.dedup();
        for user in user_list {
            let mut redirected = 0;
            let payload = remap_payload_with(&self.f.get_node(user).payload, |(_, r)| {
                if r == old {
                    redirected += 1;
                    new
                } else {
                    r
                }
            });
            self.f.get_node_mut(user).payload = payload;
            for _ in 0..redirected {
                self.users[new.index].push(user);
            }
        }
        if self.f.ret_node_ref == Some(old) {
            self.f.ret_node_ref = Some(new);
        }
        log::trace!(
            "replaced {} with {}",
            old_id,
            node_textual_id(self.f, new)
        );
        self.clobber(old);
        Ok(())
    }

    fn clobber(&mut self, node: NodeRef) {
        for op in operands(&self.f.get_node(node).payload) {
            let uses = &mut self.users[op.index];
            if let Some(pos) = uses.iter().position(|u| *u == node) {
                uses.swap_remove(pos);
            }
        }
        self.f.get_node_mut(node).payload = NodePayload::Nil;
    }

    /// Replaces the operand in slot `slot` of `node` (slot 0 is a select's
    /// selector, slot `i + 1` its case `i`).
    pub fn replace_operand_number(
        &mut self,
        node: NodeRef,
        slot: usize,
        new_operand: NodeRef,
    ) -> Result<(), OptError> {
        let mut previous = None;
        let payload = remap_payload_with(&self.f.get_node(node).payload, |(s, r)| {
            if s == slot {
                previous = Some(r);
                new_operand
            } else {
                r
            }
        });
        let node_id = node_textual_id(self.f, node);
        let Some(previous) = previous else {
            return Err(OptError::invariant(
                node_id,
                format!("no operand slot {}", slot),
            ));
        };
        ret_check!(
            self.f.get_node_ty(previous) == self.f.get_node_ty(new_operand),
            node_id,
            "operand {} replacement has type {}, expected {}",
            slot,
            self.f.get_node_ty(new_operand),
            self.f.get_node_ty(previous)
        );
        self.f.get_node_mut(node).payload = payload;
        let uses = &mut self.users[previous.index];
        if let Some(pos) = uses.iter().position(|u| *u == node) {
            uses.swap_remove(pos);
        }
        self.users[new_operand.index].push(node);
        Ok(())
    }

    pub fn literal(&mut self, value: IrValue) -> Result<NodeRef, OptError> {
        self.add_node(NodePayload::Literal(value))
    }

    pub fn literal_bits(&mut self, bits: IrBits) -> Result<NodeRef, OptError> {
        self.literal(IrValue::from_bits(&bits))
    }

    pub fn bit_slice(&mut self, arg: NodeRef, start: usize, width: usize) -> Result<NodeRef, OptError> {
        self.add_node(NodePayload::BitSlice { arg, start, width })
    }

    /// `parts[0]` lands in the most significant bits.
    pub fn concat(&mut self, parts: Vec<NodeRef>) -> Result<NodeRef, OptError> {
        self.add_node(NodePayload::Nary(NaryOp::Concat, parts))
    }

    pub fn nary(&mut self, op: NaryOp, args: Vec<NodeRef>) -> Result<NodeRef, OptError> {
        self.add_node(NodePayload::Nary(op, args))
    }

    pub fn and(&mut self, a: NodeRef, b: NodeRef) -> Result<NodeRef, OptError> {
        self.nary(NaryOp::And, vec![a, b])
    }

    pub fn or(&mut self, a: NodeRef, b: NodeRef) -> Result<NodeRef, OptError> {
        self.nary(NaryOp::Or, vec![a, b])
    }

    pub fn not(&mut self, arg: NodeRef) -> Result<NodeRef, OptError> {
        self.add_node(NodePayload::Unop(Unop::Not, arg))
    }

    pub fn or_reduce(&mut self, arg: NodeRef) -> Result<NodeRef, OptError> {
        self.add_node(NodePayload::Unop(Unop::OrReduce, arg))
    }

    pub fn binop(&mut self, op: Binop, a: NodeRef, b: NodeRef) -> Result<NodeRef, OptError> {
        self.add_node(NodePayload::Binop(op, a, b))
    }

    pub fn sign_ext(&mut self, arg: NodeRef, new_bit_count: usize) -> Result<NodeRef, OptError> {
        self.add_node(NodePayload::SignExt { arg, new_bit_count })
    }

    /// `eq(arg, literal)` where the literal has `arg`'s width.
    pub fn eq_literal(&mut self, arg: NodeRef, value: IrBits) -> Result<NodeRef, OptError> {
        let lit = self.literal_bits(value)?;
        self.binop(Binop::Eq, arg, lit)
    }

    pub fn tuple(&mut self, elements: Vec<NodeRef>) -> Result<NodeRef, OptError> {
        self.add_node(NodePayload::Tuple(elements))
    }

    pub fn tuple_index(&mut self, tuple: NodeRef, index: usize) -> Result<NodeRef, OptError> {
        self.add_node(NodePayload::TupleIndex { tuple, index })
    }

    pub fn sel(
        &mut self,
        selector: NodeRef,
        cases: Vec<NodeRef>,
        default: Option<NodeRef>,
    ) -> Result<NodeRef, OptError> {
        self.add_node(NodePayload::Sel {
            selector,
            cases,
            default,
        })
    }

    pub fn one_hot_sel(&mut self, selector: NodeRef, cases: Vec<NodeRef>) -> Result<NodeRef, OptError> {
        self.add_node(NodePayload::OneHotSel { selector, cases })
    }

    pub fn priority_sel(&mut self, selector: NodeRef, cases: Vec<NodeRef>) -> Result<NodeRef, OptError> {
        self.add_node(NodePayload::PrioritySel { selector, cases })
    }

    pub fn node_ty(&self, node: NodeRef) -> &Type {
        self.f.get_node_ty(node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir_parser::Parser;
    use crate::ir_validate::validate_fn;
    use pretty_assertions::assert_eq;

    fn sample() -> Fn {
        Parser::new(
            r#"fn f(x: bits[4] id=1, y: bits[4] id=2) -> bits[4] {
  and.3: bits[4] = and(x, y, id=3)
  or.4: bits[4] = or(and.3, and.3, id=4)
  ret xor.5: bits[4] = xor(or.4, x, id=5)
}"#,
        )
        .parse_fn()
        .unwrap()
    }

    #[test]
    fn test_add_node_deduces_type_and_fresh_id() {
        let mut f = sample();
        let mut rw = FnRewriter::new(&mut f);
        let x = NodeRef { index: 1 };
        let slice = rw.bit_slice(x, 1, 2).unwrap();
        assert_eq!(rw.node_ty(slice), &Type::Bits(2));
        assert_eq!(rw.func().get_node(slice).text_id, 6);
        assert_eq!(rw.take_created(), vec![slice]);
        assert!(rw.take_created().is_empty());
        let err = rw.bit_slice(x, 3, 2).unwrap_err();
        assert!(err.is_invariant());
    }

    #[test]
    fn test_replace_uses_redirects_every_slot() {
        let mut f = sample();
        let and = NodeRef { index: 3 };
        let or = NodeRef { index: 4 };
        let x = NodeRef { index: 1 };
        {
            let mut rw = FnRewriter::new(&mut f);
            assert!(!rw.has_single_use(and));
            assert!(rw.has_single_use(or));
            rw.replace_uses_with(and, x).unwrap();
            assert!(rw.is_replaced(and));
            // or.4 now reads x twice and xor.5 once.
            assert_eq!(rw.users(x).len(), 3);
        }
        assert_eq!(
            f.get_node(or).payload,
            NodePayload::Nary(NaryOp::Or, vec![x, x])
        );
        validate_fn(&f).unwrap();
    }

    #[test]
    fn test_replace_return_value() {
        let mut f = sample();
        let ret = NodeRef { index: 5 };
        {
            let mut rw = FnRewriter::new(&mut f);
            let y = NodeRef { index: 2 };
            let not = rw.not(y).unwrap();
            rw.replace_uses_with(ret, not).unwrap();
        }
        assert_eq!(f.ret_node_ref, Some(NodeRef { index: 6 }));
        validate_fn(&f).unwrap();
        assert!(f.to_string().contains("ret not.6: bits[4] = not(y, id=6)"));
    }

    #[test]
    fn test_replace_with_different_type_is_rejected() {
        let mut f = sample();
        let mut rw = FnRewriter::new(&mut f);
        let one_bit = rw.bit_slice(NodeRef { index: 1 }, 0, 1).unwrap();
        let err = rw.replace_uses_with(NodeRef { index: 3 }, one_bit).unwrap_err();
        assert!(err.is_invariant());
        assert!(!rw.is_replaced(NodeRef { index: 3 }));
    }

    #[test]
    fn test_replace_operand_number() {
        let mut f = sample();
        let xor = NodeRef { index: 5 };
        let y = NodeRef { index: 2 };
        {
            let mut rw = FnRewriter::new(&mut f);
            rw.replace_operand_number(xor, 1, y).unwrap();
            assert!(rw.users(NodeRef { index: 1 }).iter().all(|u| *u != xor));
            assert!(rw.replace_operand_number(xor, 2, y).is_err());
        }
        assert_eq!(
            f.get_node(xor).payload,
            NodePayload::Nary(NaryOp::Xor, vec![NodeRef { index: 4 }, y])
        );
    }
}
