// SPDX-License-Identifier: Apache-2.0

//! Graph queries over a function's node arena.

use crate::ir::{Fn, NodePayload, NodeRef};

/// Returns the operands of `payload` in operand-slot order.
///
/// Select-family payloads list the selector first, then the cases, then the
/// default (if any); `remap_payload_with` numbers slots the same way.
pub fn operands(payload: &NodePayload) -> Vec<NodeRef> {
    match payload {
        NodePayload::Nil | NodePayload::GetParam(_) | NodePayload::Literal(_) => Vec::new(),
        NodePayload::Tuple(refs) | NodePayload::Nary(_, refs) => refs.clone(),
        NodePayload::TupleIndex { tuple: arg, .. }
        | NodePayload::Unop(_, arg)
        | NodePayload::SignExt { arg, .. }
        | NodePayload::ZeroExt { arg, .. }
        | NodePayload::BitSlice { arg, .. }
        | NodePayload::OneHot { arg, .. } => vec![*arg],
        NodePayload::Binop(_, lhs, rhs) => vec![*lhs, *rhs],
        NodePayload::PrioritySel { selector, cases } | NodePayload::OneHotSel { selector, cases } => {
            std::iter::once(*selector).chain(cases.iter().copied()).collect()
        }
        NodePayload::Sel {
            selector,
            cases,
            default,
        } => std::iter::once(*selector)
            .chain(cases.iter().copied())
            .chain(*default)
            .collect(),
    }
}

/// Depth-first postorder over operand edges, rooted at each arena slot in
/// index order. Also returns the first node reached again while it was still
/// on the walk stack, i.e. a node on a cycle.
fn postorder(f: &Fn) -> (Vec<NodeRef>, Option<NodeRef>) {
    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        Unvisited,
        OnStack,
        Done,
    }
    let n = f.nodes.len();
    let mut marks = vec![Mark::Unvisited; n];
    let mut order = Vec::with_capacity(n);
    let mut cycle = None;
    for root in 0..n {
        if marks[root] != Mark::Unvisited {
            continue;
        }
        marks[root] = Mark::OnStack;
        let mut stack = vec![(root, operands(&f.nodes[root].payload).into_iter())];
        while let Some((index, pending)) = stack.last_mut() {
            let index = *index;
            let Some(child) = pending.next() else {
                marks[index] = Mark::Done;
                order.push(NodeRef { index });
                stack.pop();
                continue;
            };
            // Out-of-range operands are reported by validation.
            let Some(mark) = marks.get(child.index).copied() else {
                continue;
            };
            match mark {
                Mark::Unvisited => {
                    marks[child.index] = Mark::OnStack;
                    stack.push((child.index, operands(&f.nodes[child.index].payload).into_iter()));
                }
                Mark::OnStack => {
                    cycle.get_or_insert(child);
                }
                Mark::Done => {}
            }
        }
    }
    (order, cycle)
}

/// Every arena slot, each after all of its operands. Independent nodes keep
/// arena order.
///
/// On a cyclic graph the nodes on the cycle come out in walk order; check
/// `find_cycle` first where that matters.
pub fn get_topological(f: &Fn) -> Vec<NodeRef> {
    postorder(f).0
}

/// Returns the first node found on a cycle, if the graph has one.
pub fn find_cycle(f: &Fn) -> Option<NodeRef> {
    postorder(f).1
}

/// Nodes not reachable from the return value, by ascending index.
pub fn get_dead_nodes(f: &Fn) -> Vec<NodeRef> {
    compute_liveness(f)
        .into_iter()
        .enumerate()
        .filter(|(_, live)| !live)
        .map(|(index, _)| NodeRef { index })
        .collect()
}

/// Marks every node reachable from the return value.
pub fn compute_liveness(f: &Fn) -> Vec<bool> {
    let mut live = vec![false; f.nodes.len()];
    let mut worklist: Vec<NodeRef> = f.ret_node_ref.into_iter().collect();
    while let Some(node) = worklist.pop() {
        if std::mem::replace(&mut live[node.index], true) {
            continue;
        }
        worklist.extend(operands(&f.get_node(node).payload));
    }
    live
}

/// Computes the immediate users of each node, indexed by node.
///
/// A user appears once per operand slot that refers to the node, so
/// `and(x, x)` is listed twice among the users of `x`.
pub fn compute_users(f: &Fn) -> Vec<Vec<NodeRef>> {
    let mut users = vec![Vec::new(); f.nodes.len()];
    for user in f.node_refs() {
        for operand in operands(&f.get_node(user).payload) {
            users[operand.index].push(user);
        }
    }
    users
}

/// Rebuilds `payload` with each operand replaced by `map((slot, operand))`.
pub fn remap_payload_with<FMap>(payload: &NodePayload, mut map: FMap) -> NodePayload
where
    FMap: FnMut((usize, NodeRef)) -> NodeRef,
{
    let new: Vec<NodeRef> = operands(payload).into_iter().enumerate().map(&mut map).collect();
    let mut result = payload.clone();
    match &mut result {
        NodePayload::Nil | NodePayload::GetParam(_) | NodePayload::Literal(_) => {}
        NodePayload::Tuple(refs) | NodePayload::Nary(_, refs) => refs.copy_from_slice(&new),
        NodePayload::TupleIndex { tuple: arg, .. }
        | NodePayload::Unop(_, arg)
        | NodePayload::SignExt { arg, .. }
        | NodePayload::ZeroExt { arg, .. }
        | NodePayload::BitSlice { arg, .. }
        | NodePayload::OneHot { arg, .. } => *arg = new[0],
        NodePayload::Binop(_, lhs, rhs) => {
            *lhs = new[0];
            *rhs = new[1];
        }
        NodePayload::PrioritySel { selector, cases } | NodePayload::OneHotSel { selector, cases } => {
            *selector = new[0];
            cases.copy_from_slice(&new[1..]);
        }
        NodePayload::Sel {
            selector,
            cases,
            default,
        } => {
            let count = cases.len();
            *selector = new[0];
            cases.copy_from_slice(&new[1..=count]);
            if let Some(default) = default {
                *default = new[count + 1];
            }
        }
    }
    result
}
