// SPDX-License-Identifier: Apache-2.0

//! Validation routines for IR packages and functions, including per-node
//! type deduction.

use std::collections::HashSet;

use crate::ir::{Binop, Fn, NaryOp, NodePayload, NodeRef, Package, Type, Unop};
use crate::ir_utils::{find_cycle, operands};
use crate::ir_value_utils::type_of_value;

/// Errors that can arise during validation of IR structures.
#[derive(Debug, PartialEq, Eq)]
pub enum ValidationError {
    /// Two package members share the same name.
    DuplicateMemberName(String),
    /// The `top` attribute references a missing function.
    MissingTopFunction(String),
    /// A node references an undefined operand (index out of bounds).
    OperandOutOfBounds {
        func: String,
        node_index: usize,
        operand: usize,
    },
    /// The operand graph contains a cycle through the given node.
    Cycle { func: String, node_index: usize },
    /// A function's return node is missing.
    MissingReturnNode(String),
    /// A function's declared return type doesn't match the return node type.
    ReturnTypeMismatch {
        func: String,
        expected: Type,
        actual: Type,
    },
    /// A node's text id is not unique within the function.
    DuplicateTextId { func: String, text_id: usize },
    /// A node's operands are not well typed for its operation, or its
    /// declared type differs from the deduced one.
    TypeMismatch {
        func: String,
        node_index: usize,
        message: String,
    },
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::DuplicateMemberName(name) => {
                write!(f, "duplicate member name '{}'", name)
            }
            ValidationError::MissingTopFunction(name) => {
                write!(f, "top function '{}' not found", name)
            }
            ValidationError::OperandOutOfBounds {
                func,
                node_index,
                operand,
            } => write!(
                f,
                "function '{}' node {} references operand {} out of bounds",
                func, node_index, operand
            ),
            ValidationError::Cycle { func, node_index } => write!(
                f,
                "function '{}' has a cycle through node {}",
                func, node_index
            ),
            ValidationError::MissingReturnNode(func) => {
                write!(f, "function '{}' missing return node", func)
            }
            ValidationError::ReturnTypeMismatch {
                func,
                expected,
                actual,
            } => write!(
                f,
                "function '{}' return type mismatch: expected {}, got {}",
                func, expected, actual
            ),
            ValidationError::DuplicateTextId { func, text_id } => {
                write!(f, "function '{}' has duplicate text id {}", func, text_id)
            }
            ValidationError::TypeMismatch {
                func,
                node_index,
                message,
            } => write!(
                f,
                "function '{}' node {}: {}",
                func, node_index, message
            ),
        }
    }
}

impl std::error::Error for ValidationError {}

fn expect_bits(f: &Fn, nr: NodeRef, what: &str) -> Result<usize, String> {
    match f.get_node_ty(nr) {
        Type::Bits(w) => Ok(*w),
        other => Err(format!("{} must be bits-typed, got {}", what, other)),
    }
}

fn expect_same_types(f: &Fn, nodes: &[NodeRef], what: &str) -> Result<Type, String> {
    let Some(first) = nodes.first() else {
        return Err(format!("{} must be non-empty", what));
    };
    let ty = f.get_node_ty(*first);
    for nr in nodes.iter().skip(1) {
        if f.get_node_ty(*nr) != ty {
            return Err(format!(
                "{} must all have type {}, got {}",
                what,
                ty,
                f.get_node_ty(*nr)
            ));
        }
    }
    Ok(ty.clone())
}

/// Returns true if a selector of `selector_width` bits can address at least
/// `count` distinct values.
pub fn selector_covers(selector_width: usize, count: usize) -> bool {
    selector_width >= usize::BITS as usize || (1usize << selector_width) <= count
}

/// Deduces the result type of `payload` from its operand types.
///
/// Enforces the select-family invariants: a `sel` has between 1 and 2^w
/// cases and a default exactly when the cases do not cover the selector
/// range; `one_hot_sel` and `priority_sel` have one selector bit per case.
pub fn deduce_payload_type(f: &Fn, payload: &NodePayload) -> Result<Type, String> {
    match payload {
        NodePayload::Nil => Ok(Type::nil()),
        NodePayload::GetParam(pid) => f
            .params
            .iter()
            .find(|p| p.id == *pid)
            .map(|p| p.ty.clone())
            .ok_or_else(|| format!("unknown param id {}", pid.get_wrapped_id())),
        NodePayload::Tuple(elems) => Ok(Type::Tuple(
            elems
                .iter()
                .map(|e| Box::new(f.get_node_ty(*e).clone()))
                .collect(),
        )),
        NodePayload::TupleIndex { tuple, index } => match f.get_node_ty(*tuple) {
            Type::Tuple(types) => types
                .get(*index)
                .map(|t| t.as_ref().clone())
                .ok_or_else(|| format!("tuple index {} out of range", index)),
            other => Err(format!("tuple_index operand must be a tuple, got {}", other)),
        },
        NodePayload::Binop(op, lhs, rhs) => {
            let lhs_ty = f.get_node_ty(*lhs);
            if lhs_ty != f.get_node_ty(*rhs) {
                return Err(format!(
                    "{:?} operands must have the same type: {} vs {}",
                    op,
                    lhs_ty,
                    f.get_node_ty(*rhs)
                ));
            }
            match op {
                Binop::Eq | Binop::Ne => Ok(Type::Bits(1)),
                _ => {
                    expect_bits(f, *lhs, "comparison operand")?;
                    Ok(Type::Bits(1))
                }
            }
        }
        NodePayload::Unop(op, arg) => match op {
            Unop::Identity => Ok(f.get_node_ty(*arg).clone()),
            Unop::Not => Ok(Type::Bits(expect_bits(f, *arg, "not operand")?)),
            Unop::OrReduce | Unop::AndReduce | Unop::XorReduce => {
                expect_bits(f, *arg, "reduction operand")?;
                Ok(Type::Bits(1))
            }
        },
        NodePayload::Literal(value) => Ok(type_of_value(value)),
        NodePayload::SignExt { arg, new_bit_count }
        | NodePayload::ZeroExt { arg, new_bit_count } => {
            let w = expect_bits(f, *arg, "extension operand")?;
            if *new_bit_count < w {
                return Err(format!(
                    "extension to {} bits narrows a {}-bit operand",
                    new_bit_count, w
                ));
            }
            Ok(Type::Bits(*new_bit_count))
        }
        NodePayload::BitSlice { arg, start, width } => {
            let w = expect_bits(f, *arg, "bit_slice operand")?;
            if start + width > w {
                return Err(format!(
                    "bit_slice start={} width={} exceeds operand width {}",
                    start, width, w
                ));
            }
            Ok(Type::Bits(*width))
        }
        NodePayload::Nary(NaryOp::Concat, elems) => {
            let mut total = 0;
            for e in elems.iter() {
                total += expect_bits(f, *e, "concat operand")?;
            }
            Ok(Type::Bits(total))
        }
        NodePayload::Nary(op, elems) => {
            let ty = expect_same_types(f, elems, &format!("{:?} operands", op))?;
            if !ty.is_bits() {
                return Err(format!("{:?} operands must be bits-typed, got {}", op, ty));
            }
            Ok(ty)
        }
        NodePayload::Sel {
            selector,
            cases,
            default,
        } => {
            let w = expect_bits(f, *selector, "sel selector")?;
            if cases.is_empty() {
                return Err("sel must have at least one case".to_string());
            }
            if w < usize::BITS as usize && cases.len() > (1usize << w) {
                return Err(format!(
                    "sel has {} cases but a {}-bit selector",
                    cases.len(),
                    w
                ));
            }
            let covers = selector_covers(w, cases.len());
            match default {
                Some(_) if covers => {
                    return Err("sel default is unreachable; cases cover the selector".to_string())
                }
                None if !covers => {
                    return Err("sel cases do not cover the selector and no default".to_string())
                }
                _ => {}
            }
            let mut all: Vec<NodeRef> = cases.clone();
            all.extend(default.iter().copied());
            expect_same_types(f, &all, "sel cases")
        }
        NodePayload::OneHotSel { selector, cases }
        | NodePayload::PrioritySel { selector, cases } => {
            let w = expect_bits(f, *selector, "selector")?;
            if w != cases.len() {
                return Err(format!(
                    "{} selector width {} differs from case count {}",
                    payload.get_operator(),
                    w,
                    cases.len()
                ));
            }
            expect_same_types(f, cases, "cases")
        }
        NodePayload::OneHot { arg, .. } => Ok(Type::Bits(expect_bits(f, *arg, "one_hot operand")? + 1)),
    }
}

/// Validates an entire package, ensuring all member names are unique, the top
/// function (if set) exists, and all contained functions are valid.
pub fn validate_package(p: &Package) -> Result<(), ValidationError> {
    let mut names = HashSet::new();
    for f in &p.members {
        if !names.insert(f.name.clone()) {
            return Err(ValidationError::DuplicateMemberName(f.name.clone()));
        }
    }
    if let Some(top) = &p.top_name {
        if !names.contains(top) {
            return Err(ValidationError::MissingTopFunction(top.clone()));
        }
    }
    for f in &p.members {
        validate_fn(f)?;
    }
    Ok(())
}

/// Validates a single function: operand bounds, acyclicity, unique text ids,
/// per-node types and the return type.
pub fn validate_fn(f: &Fn) -> Result<(), ValidationError> {
    let n = f.nodes.len();
    for (i, node) in f.nodes.iter().enumerate() {
        for op in operands(&node.payload) {
            if op.index >= n {
                return Err(ValidationError::OperandOutOfBounds {
                    func: f.name.clone(),
                    node_index: i,
                    operand: op.index,
                });
            }
        }
    }
    if let Some(nr) = find_cycle(f) {
        return Err(ValidationError::Cycle {
            func: f.name.clone(),
            node_index: nr.index,
        });
    }

    let mut seen_ids: HashSet<usize> = HashSet::new();
    for node in f.nodes.iter() {
        if matches!(node.payload, NodePayload::Nil) {
            continue;
        }
        if !seen_ids.insert(node.text_id) {
            return Err(ValidationError::DuplicateTextId {
                func: f.name.clone(),
                text_id: node.text_id,
            });
        }
    }

    for (i, node) in f.nodes.iter().enumerate() {
        if matches!(node.payload, NodePayload::Nil) {
            continue;
        }
        let deduced =
            deduce_payload_type(f, &node.payload).map_err(|message| ValidationError::TypeMismatch {
                func: f.name.clone(),
                node_index: i,
                message,
            })?;
        if deduced != node.ty {
            return Err(ValidationError::TypeMismatch {
                func: f.name.clone(),
                node_index: i,
                message: format!("declared type {} but deduced {}", node.ty, deduced),
            });
        }
    }

    let Some(ret) = f.ret_node_ref else {
        return Err(ValidationError::MissingReturnNode(f.name.clone()));
    };
    let actual = f.get_node_ty(ret);
    if *actual != f.ret_ty {
        return Err(ValidationError::ReturnTypeMismatch {
            func: f.name.clone(),
            expected: f.ret_ty.clone(),
            actual: actual.clone(),
        });
    }
    Ok(())
}
