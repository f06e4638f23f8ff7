// SPDX-License-Identifier: Apache-2.0

//! Arena-based data-flow graph IR.
//!
//! A function owns a vector of nodes; operands are `NodeRef` indices into that
//! vector. Index 0 is a reserved `Nil` node and parameters occupy indices
//! `1..=params.len()`. Replaced nodes are turned into `Nil` and are skipped
//! when emitting text.

use std::collections::HashMap;

use once_cell::sync::Lazy;

use crate::ir_utils::get_topological;
use crate::ir_value::IrValue;

/// Strongly-typed wrapper for parameter IDs.
///
/// Note: this is the textual `id=` of the parameter, not an index into the
/// node arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ParamId(usize);

impl ParamId {
    /// Parameter ids start at one; zero yields `None`.
    pub fn new(id: usize) -> Option<Self> {
        if id == 0 {
            None
        } else {
            Some(ParamId(id))
        }
    }

    pub fn get_wrapped_id(&self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Ord, PartialOrd)]
pub enum Type {
    Bits(usize),
    Tuple(Vec<Box<Type>>),
}

impl Type {
    /// The empty tuple, used as the type of the reserved node.
    pub fn nil() -> Self {
        Type::Tuple(vec![])
    }

    pub fn is_bits(&self) -> bool {
        matches!(self, Type::Bits(_))
    }

    /// Total number of bits across all leaves.
    pub fn bit_count(&self) -> usize {
        match self {
            Type::Bits(width) => *width,
            Type::Tuple(types) => types.iter().map(|t| t.bit_count()).sum(),
        }
    }

    pub fn bits_width(&self) -> Option<usize> {
        match self {
            Type::Bits(width) => Some(*width),
            Type::Tuple(_) => None,
        }
    }

    /// Returns the bits-typed leaves of this type in element order.
    pub fn leaf_types(&self) -> Vec<Type> {
        match self {
            Type::Bits(_) => vec![self.clone()],
            Type::Tuple(types) => types.iter().flat_map(|t| t.leaf_types()).collect(),
        }
    }
}

impl std::fmt::Display for Type {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Type::Bits(width) => write!(f, "bits[{}]", width),
            Type::Tuple(types) => {
                let elements: Vec<String> = types.iter().map(|t| t.to_string()).collect();
                write!(f, "({})", elements.join(", "))
            }
        }
    }
}

/// Two-operand comparisons; every one produces `bits[1]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Binop {
    Eq,
    Ne,
    Uge,
    Ugt,
    Ult,
    Ule,
}

impl Binop {
    pub const ALL: [Binop; 6] = [
        Binop::Eq,
        Binop::Ne,
        Binop::Uge,
        Binop::Ugt,
        Binop::Ult,
        Binop::Ule,
    ];

    pub fn keyword(self) -> &'static str {
        match self {
            Binop::Eq => "eq",
            Binop::Ne => "ne",
            Binop::Uge => "uge",
            Binop::Ugt => "ugt",
            Binop::Ult => "ult",
            Binop::Ule => "ule",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Unop {
    Not,
    Identity,
    OrReduce,
    AndReduce,
    XorReduce,
}

impl Unop {
    pub const ALL: [Unop; 5] = [
        Unop::Not,
        Unop::Identity,
        Unop::OrReduce,
        Unop::AndReduce,
        Unop::XorReduce,
    ];

    pub fn keyword(self) -> &'static str {
        match self {
            Unop::Not => "not",
            Unop::Identity => "identity",
            Unop::OrReduce => "or_reduce",
            Unop::AndReduce => "and_reduce",
            Unop::XorReduce => "xor_reduce",
        }
    }
}

#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq)]
pub enum NaryOp {
    And,
    Nor,
    Or,
    Xor,
    Nand,
    Concat,
}

impl NaryOp {
    pub const ALL: [NaryOp; 6] = [
        NaryOp::And,
        NaryOp::Nor,
        NaryOp::Or,
        NaryOp::Xor,
        NaryOp::Nand,
        NaryOp::Concat,
    ];

    pub fn keyword(self) -> &'static str {
        match self {
            NaryOp::And => "and",
            NaryOp::Nor => "nor",
            NaryOp::Or => "or",
            NaryOp::Xor => "xor",
            NaryOp::Nand => "nand",
            NaryOp::Concat => "concat",
        }
    }
}

/// Operators written as a bare keyword over plain operands, with no
/// attributes of their own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Binop(Binop),
    Unop(Unop),
    Nary(NaryOp),
}

static OPERATORS_BY_KEYWORD: Lazy<HashMap<&'static str, Operator>> = Lazy::new(|| {
    let binops = Binop::ALL.map(|op| (op.keyword(), Operator::Binop(op)));
    let unops = Unop::ALL.map(|op| (op.keyword(), Operator::Unop(op)));
    let nary = NaryOp::ALL.map(|op| (op.keyword(), Operator::Nary(op)));
    binops.into_iter().chain(unops).chain(nary).collect()
});

impl Operator {
    pub fn from_keyword(keyword: &str) -> Option<Operator> {
        OPERATORS_BY_KEYWORD.get(keyword).copied()
    }
}

#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct NodeRef {
    pub index: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodePayload {
    Nil,
    GetParam(ParamId),
    Tuple(Vec<NodeRef>),
    TupleIndex {
        tuple: NodeRef,
        index: usize,
    },
    Binop(Binop, NodeRef, NodeRef),
    Unop(Unop, NodeRef),
    Literal(IrValue),
    SignExt {
        arg: NodeRef,
        new_bit_count: usize,
    },
    ZeroExt {
        arg: NodeRef,
        new_bit_count: usize,
    },
    BitSlice {
        arg: NodeRef,
        start: usize,
        width: usize,
    },
    /// For `Concat`, operand 0 supplies the most significant bits.
    Nary(NaryOp, Vec<NodeRef>),
    /// Lowest-index asserted selector bit wins; all-zero selector yields zero.
    PrioritySel {
        selector: NodeRef,
        cases: Vec<NodeRef>,
    },
    OneHotSel {
        selector: NodeRef,
        cases: Vec<NodeRef>,
    },
    OneHot {
        arg: NodeRef,
        lsb_prio: bool,
    },
    Sel {
        selector: NodeRef,
        cases: Vec<NodeRef>,
        default: Option<NodeRef>,
    },
}

impl NodePayload {
    pub fn get_operator(&self) -> &str {
        match self {
            NodePayload::Nil => "nil",
            NodePayload::GetParam(_) => "get_param",
            NodePayload::Tuple(_) => "tuple",
            NodePayload::TupleIndex { .. } => "tuple_index",
            NodePayload::Binop(op, _, _) => op.keyword(),
            NodePayload::Unop(op, _) => op.keyword(),
            NodePayload::Literal(_) => "literal",
            NodePayload::SignExt { .. } => "sign_ext",
            NodePayload::ZeroExt { .. } => "zero_ext",
            NodePayload::BitSlice { .. } => "bit_slice",
            NodePayload::Nary(op, _) => op.keyword(),
            NodePayload::PrioritySel { .. } => "priority_sel",
            NodePayload::OneHotSel { .. } => "one_hot_sel",
            NodePayload::OneHot { .. } => "one_hot",
            NodePayload::Sel { .. } => "sel",
        }
    }

    /// True for `sel`, `one_hot_sel` and `priority_sel`.
    pub fn is_select_family(&self) -> bool {
        matches!(
            self,
            NodePayload::Sel { .. } | NodePayload::OneHotSel { .. } | NodePayload::PrioritySel { .. }
        )
    }

    /// Operands followed by operator attributes, as they appear between the
    /// parentheses. `None` for payloads that are not written as nodes.
    fn call_args(&self, f: &Fn) -> Option<Vec<String>> {
        let name = |node_ref: &NodeRef| node_textual_id(f, *node_ref);
        let names = |refs: &[NodeRef]| refs.iter().map(name).collect::<Vec<String>>();
        let case_list = |cases: &[NodeRef]| format!("cases=[{}]", names(cases).join(", "));
        let args = match self {
            NodePayload::Nil | NodePayload::GetParam(_) => return None,
            NodePayload::Tuple(elements) => names(elements),
            NodePayload::Nary(_, operands) => names(operands),
            NodePayload::Binop(_, lhs, rhs) => vec![name(lhs), name(rhs)],
            NodePayload::Unop(_, arg) => vec![name(arg)],
            NodePayload::TupleIndex { tuple, index } => {
                vec![name(tuple), format!("index={}", index)]
            }
            NodePayload::Literal(value) => {
                vec![format!("value={}", value.to_string_fmt_no_prefix())]
            }
            NodePayload::SignExt { arg, new_bit_count }
            | NodePayload::ZeroExt { arg, new_bit_count } => {
                vec![name(arg), format!("new_bit_count={}", new_bit_count)]
            }
            NodePayload::BitSlice { arg, start, width } => vec![
                name(arg),
                format!("start={}", start),
                format!("width={}", width),
            ],
            NodePayload::OneHot { arg, lsb_prio } => {
                vec![name(arg), format!("lsb_prio={}", lsb_prio)]
            }
            NodePayload::OneHotSel { selector, cases }
            | NodePayload::PrioritySel { selector, cases } => {
                vec![name(selector), case_list(cases)]
            }
            NodePayload::Sel {
                selector,
                cases,
                default,
            } => {
                let mut args = vec![name(selector), case_list(cases)];
                if let Some(default) = default {
                    args.push(format!("default={}", name(default)));
                }
                args
            }
        };
        Some(args)
    }
}

/// How operands refer to `node_ref` in text: its name when it has one
/// (always, for parameters), else `operator.id`.
pub fn node_textual_id(f: &Fn, node_ref: NodeRef) -> String {
    let node = f.get_node(node_ref);
    node.name
        .clone()
        .unwrap_or_else(|| format!("{}.{}", node.payload.get_operator(), node.text_id))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pos {
    pub fileno: usize,
    pub lineno: usize,
    pub colno: usize,
}

pub type PosData = Vec<Pos>;

/// One arena entry.
#[derive(Debug, Clone)]
pub struct Node {
    /// The `id=` attribute; unique within the function.
    pub text_id: usize,
    /// `None` for nodes written as `operator.id`.
    pub name: Option<String>,
    pub ty: Type,
    pub payload: NodePayload,
    pub pos: Option<PosData>,
}

#[derive(Debug, Clone)]
pub struct Param {
    pub name: String,
    pub ty: Type,
    pub id: ParamId,
}

/// Parameter types and return type; rewrites must preserve it.
#[derive(Debug, PartialEq)]
pub struct Signature {
    pub params: Vec<Type>,
    pub ret: Type,
}

#[derive(Debug, Clone)]
pub struct Fn {
    pub name: String,
    pub params: Vec<Param>,
    pub ret_ty: Type,
    pub nodes: Vec<Node>,
    pub ret_node_ref: Option<NodeRef>,
}

impl Fn {
    pub fn signature(&self) -> Signature {
        Signature {
            params: self.params.iter().map(|p| p.ty.clone()).collect(),
            ret: self.ret_ty.clone(),
        }
    }

    /// Every arena slot, `Nil` entries included.
    pub fn node_refs(&self) -> Vec<NodeRef> {
        (0..self.nodes.len()).map(|index| NodeRef { index }).collect()
    }

    pub fn get_node(&self, node_ref: NodeRef) -> &Node {
        &self.nodes[node_ref.index]
    }

    pub fn get_node_ty(&self, node_ref: NodeRef) -> &Type {
        &self.get_node(node_ref).ty
    }

    pub fn get_node_mut(&mut self, node_ref: NodeRef) -> &mut Node {
        &mut self.nodes[node_ref.index]
    }

    /// Node ref for the `ordinal`-th (zero-based) parameter.
    pub fn param_node_ref(&self, ordinal: usize) -> NodeRef {
        NodeRef { index: ordinal + 1 }
    }

    /// Largest textual id in use, counting parameter ids.
    pub fn max_text_id(&self) -> usize {
        let param_ids = self.params.iter().map(|p| p.id.get_wrapped_id());
        self.nodes
            .iter()
            .map(|n| n.text_id)
            .chain(param_ids)
            .max()
            .unwrap_or(0)
    }

    /// Text of one body line for `node_ref`, without indentation. `None` for
    /// nodes that do not appear in the body.
    pub(crate) fn node_line(&self, node_ref: NodeRef) -> Option<String> {
        let node = self.get_node(node_ref);
        let is_ret = self.ret_node_ref == Some(node_ref);
        let mut args = match &node.payload {
            // A returned parameter is spelled out so the body has a `ret`.
            NodePayload::GetParam(_) if is_ret => {
                vec![format!("name={}", node_textual_id(self, node_ref))]
            }
            payload => payload.call_args(self)?,
        };
        args.push(format!("id={}", node.text_id));
        if let Some(pos) = node.pos.as_ref().filter(|pos| !pos.is_empty()) {
            let entries: Vec<String> = pos
                .iter()
                .map(|p| format!("({},{},{})", p.fileno, p.lineno, p.colno))
                .collect();
            args.push(format!("pos=[{}]", entries.join(", ")));
        }
        let operator = match node.payload {
            NodePayload::GetParam(_) => "param",
            ref payload => payload.get_operator(),
        };
        Some(format!(
            "{}{}: {} = {}({})",
            if is_ret { "ret " } else { "" },
            node_textual_id(self, node_ref),
            node.ty,
            operator,
            args.join(", ")
        ))
    }

    /// Writes the function as text, optionally marked as the package top.
    ///
    /// Nodes are written in topological order; nodes appended by rewrites may
    /// therefore appear ahead of nodes with smaller arena indices.
    fn write_text(&self, out: &mut impl std::fmt::Write, is_top: bool) -> std::fmt::Result {
        let params: Vec<String> = self
            .params
            .iter()
            .map(|p| format!("{}: {} id={}", p.name, p.ty, p.id.get_wrapped_id()))
            .collect();
        writeln!(
            out,
            "{}fn {}({}) -> {} {{",
            if is_top { "top " } else { "" },
            self.name,
            params.join(", "),
            self.ret_ty
        )?;
        for line in get_topological(self)
            .into_iter()
            .filter_map(|node_ref| self.node_line(node_ref))
        {
            writeln!(out, "  {}", line)?;
        }
        write!(out, "}}")
    }
}

impl std::fmt::Display for Fn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.write_text(f, false)
    }
}

#[derive(Debug, Clone)]
pub struct Package {
    pub name: String,
    pub members: Vec<Fn>,
    pub top_name: Option<String>,
}

impl Package {
    /// The function marked `top`, or the last member when none is marked.
    pub fn get_top_fn(&self) -> Option<&Fn> {
        match &self.top_name {
            Some(name) => self.members.iter().find(|f| &f.name == name),
            None => self.members.last(),
        }
    }
}

impl std::fmt::Display for Package {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut text = format!("package {}\n", self.name);
        for func in self.members.iter() {
            let is_top = self.top_name.as_deref() == Some(func.name.as_str());
            text.push('\n');
            func.write_text(&mut text, is_top)?;
            text.push('\n');
        }
        f.write_str(&text)
    }
}
