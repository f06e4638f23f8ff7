// SPDX-License-Identifier: Apache-2.0

//! The ordered rewrite catalog applied to each visited node.
//!
//! Each rule either leaves the graph untouched and returns `Ok(false)`, or
//! rewrites `node` (usually by redirecting its uses to newly built nodes) and
//! returns `Ok(true)`. Rules never create nodes unless they fire.

use std::collections::HashSet;

use crate::ir::{node_textual_id, Binop, Fn, NaryOp, NodePayload, NodeRef, Type};
use crate::ir_eval::one_hot_bits;
use crate::ir_rewrite::FnRewriter;
use crate::ir_value::{IrBits, IrValue};
use crate::ir_value_utils::zero_ir_value_for_type;
use crate::opt_error::OptError;
use crate::query_engine::{QueryEngine, TreeBitLocation};
use crate::select_simp::config::SelectSimplificationOptions;
use crate::ternary::{TernaryValue, TernaryVector};

pub(crate) struct RuleContext<'r, 'a> {
    pub rw: &'r mut FnRewriter<'a>,
    pub engine: &'r dyn QueryEngine,
    pub options: SelectSimplificationOptions,
}

pub(crate) type Rule = fn(&mut RuleContext, NodeRef) -> Result<bool, OptError>;

/// Rules in evaluation order; the first one that fires wins.
pub(crate) const RULES: &[(&str, Rule)] = &[
    ("select with constant selector", fold_select_known_selector),
    ("priority select with known selector prefix", fold_priority_select_known_prefix),
    ("one-hot-select with constant selector", fold_one_hot_select_known_selector),
    ("select with identical cases", fold_select_identical_cases),
    ("one-hot/priority select with identical cases", fold_one_hot_priority_identical_cases),
    ("tuple-typed select distribution", distribute_tuple_select),
    ("one-hot-select equivalent cases", common_one_hot_select_cases),
    ("priority select adjacent equivalent cases", common_priority_select_adjacent_cases),
    ("single-bit select decomposition", decompose_single_bit_mux),
    ("merge consecutive selects", merge_consecutive_selects),
    ("select to mask", convert_select_to_mask),
    ("dead case elision", elide_dead_cases),
    ("squeeze select", squeeze_select),
    ("two-way select chain", fold_two_way_select_chain),
    ("shared-selector select of select", fold_shared_selector_select),
    ("single-bit one-hot-select decomposition", decompose_single_bit_one_hot_select),
    ("single-bit one-hot", replace_single_bit_one_hot),
    ("one-hot of exclusive input", replace_exclusive_one_hot),
    ("one-hot with one unknown input bit", replace_one_hot_single_unknown_bit),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SelectKind {
    OneHot,
    Priority,
}

/// Selector and cases of a `one_hot_sel` or `priority_sel`.
fn one_hot_or_priority(payload: &NodePayload) -> Option<(SelectKind, NodeRef, Vec<NodeRef>)> {
    match payload {
        NodePayload::OneHotSel { selector, cases } => {
            Some((SelectKind::OneHot, *selector, cases.clone()))
        }
        NodePayload::PrioritySel { selector, cases } => {
            Some((SelectKind::Priority, *selector, cases.clone()))
        }
        _ => None,
    }
}

/// Selector and both cases of a `sel` with a 1-bit selector and two cases.
fn two_way_select(f: &Fn, node: NodeRef) -> Option<(NodeRef, NodeRef, NodeRef)> {
    match &f.get_node(node).payload {
        NodePayload::Sel {
            selector,
            cases,
            default: None,
        } if cases.len() == 2 && f.get_node_ty(*selector).bit_count() == 1 => {
            Some((*selector, cases[0], cases[1]))
        }
        _ => None,
    }
}

impl<'r, 'a> RuleContext<'r, 'a> {
    fn f(&self) -> &Fn {
        self.rw.func()
    }

    fn payload(&self, node: NodeRef) -> NodePayload {
        self.f().get_node(node).payload.clone()
    }

    fn ty(&self, node: NodeRef) -> Type {
        self.f().get_node_ty(node).clone()
    }

    fn id(&self, node: NodeRef) -> String {
        node_textual_id(self.f(), node)
    }

    fn bits_ternary(&self, node: NodeRef) -> Option<TernaryVector> {
        self.engine
            .get_ternary(self.f(), node)
            .get_bits_leaf()
            .cloned()
    }

    fn is_all_zeros(&self, node: NodeRef) -> bool {
        self.engine.is_all_zeros(self.f(), node)
    }

    fn zero_of(&mut self, ty: &Type) -> Result<NodeRef, OptError> {
        self.rw.literal(zero_ir_value_for_type(ty))
    }

    fn replace(&mut self, node: NodeRef, replacement: NodeRef) -> Result<bool, OptError> {
        self.rw.replace_uses_with(node, replacement)?;
        Ok(true)
    }

    fn make_select(
        &mut self,
        kind: SelectKind,
        selector: NodeRef,
        cases: Vec<NodeRef>,
    ) -> Result<NodeRef, OptError> {
        match kind {
            SelectKind::OneHot => self.rw.one_hot_sel(selector, cases),
            SelectKind::Priority => self.rw.priority_sel(selector, cases),
        }
    }

    /// Concatenates `parts` given least significant first. A single part is
    /// returned as is.
    fn concat_lsb_first(&mut self, mut parts: Vec<NodeRef>) -> Result<NodeRef, OptError> {
        if parts.len() == 1 {
            return Ok(parts[0]);
        }
        parts.reverse();
        self.rw.concat(parts)
    }

    /// The bits of `value` at `indices` (ascending), packed with the first
    /// index in the least significant position. Contiguous indices become one
    /// slice.
    fn gather_bits(&mut self, value: NodeRef, indices: &[usize]) -> Result<NodeRef, OptError> {
        let width = self.ty(value).bit_count();
        let mut runs: Vec<(usize, usize)> = Vec::new();
        for &i in indices {
            match runs.last_mut() {
                Some((start, len)) if *start + *len == i => *len += 1,
                _ => runs.push((i, 1)),
            }
        }
        if runs.len() == 1 && runs[0] == (0, width) {
            return Ok(value);
        }
        let mut parts = Vec::with_capacity(runs.len());
        for (start, len) in runs {
            parts.push(self.rw.bit_slice(value, start, len)?);
        }
        self.concat_lsb_first(parts)
    }
}

fn fold_select_known_selector(cx: &mut RuleContext, node: NodeRef) -> Result<bool, OptError> {
    let NodePayload::Sel {
        selector,
        cases,
        default,
    } = cx.payload(node)
    else {
        return Ok(false);
    };
    let Some(value) = cx.engine.known_value_as_bits(cx.f(), selector) else {
        return Ok(false);
    };
    let chosen = match value.to_u64() {
        Ok(i) if i < cases.len() as u64 => cases[i as usize],
        _ => match default {
            Some(d) => d,
            None => {
                return Err(OptError::invariant(
                    cx.id(node),
                    format!(
                        "selector value {} is past the last of {} cases and there is no default",
                        value,
                        cases.len()
                    ),
                ))
            }
        },
    };
    cx.replace(node, chosen)
}

fn fold_priority_select_known_prefix(cx: &mut RuleContext, node: NodeRef) -> Result<bool, OptError> {
    let NodePayload::PrioritySel { selector, cases } = cx.payload(node) else {
        return Ok(false);
    };
    let Some(selector_bits) = cx.bits_ternary(selector) else {
        return Ok(false);
    };
    for (i, bit) in selector_bits.iter().enumerate() {
        match bit {
            TernaryValue::KnownZero => continue,
            TernaryValue::KnownOne => return cx.replace(node, cases[i]),
            // An earlier bit might win.
            TernaryValue::Unknown => return Ok(false),
        }
    }
    let ty = cx.ty(node);
    let zero = cx.zero_of(&ty)?;
    cx.replace(node, zero)
}

fn fold_one_hot_select_known_selector(cx: &mut RuleContext, node: NodeRef) -> Result<bool, OptError> {
    let NodePayload::OneHotSel { selector, cases } = cx.payload(node) else {
        return Ok(false);
    };
    let ty = cx.ty(node);
    if !ty.is_bits() {
        return Ok(false);
    }
    let Some(value) = cx.engine.known_value_as_bits(cx.f(), selector) else {
        return Ok(false);
    };
    let mut replacement: Option<NodeRef> = None;
    for (i, case) in cases.iter().enumerate() {
        if !value.bit(i) {
            continue;
        }
        replacement = Some(match replacement {
            None => *case,
            Some(acc) => cx.rw.or(acc, *case)?,
        });
    }
    let replacement = match replacement {
        Some(r) => r,
        None => cx.zero_of(&ty)?,
    };
    cx.replace(node, replacement)
}

fn fold_select_identical_cases(cx: &mut RuleContext, node: NodeRef) -> Result<bool, OptError> {
    let NodePayload::Sel { cases, default, .. } = cx.payload(node) else {
        return Ok(false);
    };
    let Some(&first) = cases.first() else {
        return Ok(false);
    };
    if !cases.iter().chain(default.iter()).all(|c| *c == first) {
        return Ok(false);
    }
    cx.replace(node, first)
}

fn fold_one_hot_priority_identical_cases(cx: &mut RuleContext, node: NodeRef) -> Result<bool, OptError> {
    let Some((_, selector, cases)) = one_hot_or_priority(&cx.payload(node)) else {
        return Ok(false);
    };
    let ty = cx.ty(node);
    if !ty.is_bits() || cases.is_empty() || !cases.iter().all(|c| *c == cases[0]) {
        return Ok(false);
    }
    let selector_ty = cx.ty(selector);
    let selector_zero = cx.zero_of(&selector_ty)?;
    let is_zero = cx.rw.binop(Binop::Eq, selector, selector_zero)?;
    let zero = cx.zero_of(&ty)?;
    let new_sel = cx.rw.sel(is_zero, vec![cases[0], zero], None)?;
    cx.replace(node, new_sel)
}

fn project_tuple_element(
    cx: &mut RuleContext,
    tuples: &[NodeRef],
    index: usize,
) -> Result<Vec<NodeRef>, OptError> {
    tuples
        .iter()
        .map(|t| cx.rw.tuple_index(*t, index))
        .collect()
}

fn distribute_tuple_select(cx: &mut RuleContext, node: NodeRef) -> Result<bool, OptError> {
    let Type::Tuple(element_types) = cx.ty(node) else {
        return Ok(false);
    };
    let payload = cx.payload(node);
    let mut elements = Vec::with_capacity(element_types.len());
    for i in 0..element_types.len() {
        let element = match &payload {
            NodePayload::Sel {
                selector,
                cases,
                default,
            } => {
                let projected = project_tuple_element(cx, cases, i)?;
                let default = match default {
                    Some(d) => Some(cx.rw.tuple_index(*d, i)?),
                    None => None,
                };
                cx.rw.sel(*selector, projected, default)?
            }
            NodePayload::OneHotSel { selector, cases } => {
                let projected = project_tuple_element(cx, cases, i)?;
                cx.rw.one_hot_sel(*selector, projected)?
            }
            NodePayload::PrioritySel { selector, cases } => {
                let projected = project_tuple_element(cx, cases, i)?;
                cx.rw.priority_sel(*selector, projected)?
            }
            _ => return Ok(false),
        };
        elements.push(element);
    }
    let tuple = cx.rw.tuple(elements)?;
    cx.replace(node, tuple)
}

fn common_one_hot_select_cases(cx: &mut RuleContext, node: NodeRef) -> Result<bool, OptError> {
    if !cx.options.narrowing_enabled() {
        return Ok(false);
    }
    let NodePayload::OneHotSel { selector, cases } = cx.payload(node) else {
        return Ok(false);
    };
    let distinct: HashSet<NodeRef> = cases.iter().copied().collect();
    if cases.is_empty() || distinct.len() == cases.len() {
        return Ok(false);
    }
    let mut new_selectors: Vec<NodeRef> = Vec::new();
    let mut new_cases: Vec<NodeRef> = Vec::new();
    for (i, case) in cases.iter().enumerate() {
        let bit = cx.rw.bit_slice(selector, i, 1)?;
        match new_cases.iter().position(|c| c == case) {
            Some(pos) => new_selectors[pos] = cx.rw.or(new_selectors[pos], bit)?,
            None => {
                new_selectors.push(bit);
                new_cases.push(*case);
            }
        }
    }
    let new_selector = cx.concat_lsb_first(new_selectors)?;
    let new_ohs = cx.rw.one_hot_sel(new_selector, new_cases)?;
    cx.replace(node, new_ohs)
}

fn common_priority_select_adjacent_cases(cx: &mut RuleContext, node: NodeRef) -> Result<bool, OptError> {
    if !cx.options.splits_enabled() {
        return Ok(false);
    }
    let NodePayload::PrioritySel { selector, cases } = cx.payload(node) else {
        return Ok(false);
    };
    if cases.is_empty() {
        return Ok(false);
    }
    // (start, width) of each run of identical adjacent cases.
    let mut ranges: Vec<(usize, usize)> = vec![(0, 1)];
    let mut new_cases = vec![cases[0]];
    for (i, case) in cases.iter().enumerate().skip(1) {
        if Some(case) == new_cases.last() {
            if let Some(last) = ranges.last_mut() {
                last.1 += 1;
            }
        } else {
            ranges.push((i, 1));
            new_cases.push(*case);
        }
    }
    if new_cases.len() == cases.len() {
        return Ok(false);
    }
    // Singleton runs pass their selector bit through unchanged, so adjacent
    // singletons share one slice.
    let mut slices: Vec<NodeRef> = Vec::new();
    let mut pending: Option<(usize, usize)> = None;
    for (start, width) in ranges {
        if width == 1 {
            match pending.as_mut() {
                Some(p) => p.1 += 1,
                None => pending = Some((start, 1)),
            }
            continue;
        }
        if let Some((s, w)) = pending.take() {
            slices.push(cx.rw.bit_slice(selector, s, w)?);
        }
        let span = cx.rw.bit_slice(selector, start, width)?;
        slices.push(cx.rw.or_reduce(span)?);
    }
    if let Some((s, w)) = pending.take() {
        slices.push(cx.rw.bit_slice(selector, s, w)?);
    }
    let new_selector = cx.concat_lsb_first(slices)?;
    let new_ps = cx.rw.priority_sel(new_selector, new_cases)?;
    cx.replace(node, new_ps)
}

fn decompose_single_bit_mux(cx: &mut RuleContext, node: NodeRef) -> Result<bool, OptError> {
    if !cx.options.narrowing_enabled() {
        return Ok(false);
    }
    let NodePayload::Sel {
        selector,
        cases,
        default,
    } = cx.payload(node)
    else {
        return Ok(false);
    };
    if cx.ty(node) != Type::Bits(1) || cx.ty(selector).bit_count() != 1 {
        return Ok(false);
    }
    // With a 1-bit selector the second arm is either case 1 or the default.
    let on_false = cases[0];
    let Some(on_true) = cases.get(1).copied().or(default) else {
        return Err(OptError::invariant(
            cx.id(node),
            "1-bit selector with a single case and no default",
        ));
    };
    let worthwhile = cx.engine.is_fully_known(cx.f(), on_true)
        || cx.engine.is_fully_known(cx.f(), on_false)
        || selector == on_true
        || selector == on_false;
    if !worthwhile {
        return Ok(false);
    }
    let lhs = cx.rw.and(selector, on_true)?;
    let not_selector = cx.rw.not(selector)?;
    let rhs = cx.rw.and(not_selector, on_false)?;
    let result = cx.rw.or(lhs, rhs)?;
    cx.replace(node, result)
}

enum MergeSegment {
    /// Cases `start..end` are kept with their selector bits.
    Keep { start: usize, end: usize },
    /// Case `index` is a single-use select of the same kind and is inlined.
    Inline { index: usize, selector: NodeRef, cases: Vec<NodeRef> },
}

fn merge_consecutive_selects(cx: &mut RuleContext, node: NodeRef) -> Result<bool, OptError> {
    if !cx.options.narrowing_enabled() {
        return Ok(false);
    }
    let Some((kind, selector, cases)) = one_hot_or_priority(&cx.payload(node)) else {
        return Ok(false);
    };
    let mut segments: Vec<MergeSegment> = Vec::new();
    let mut keep_start = 0;
    for (i, case) in cases.iter().enumerate() {
        let inner = one_hot_or_priority(&cx.f().get_node(*case).payload);
        match inner {
            Some((inner_kind, inner_selector, inner_cases))
                if inner_kind == kind && cx.rw.has_single_use(*case) =>
            {
                if keep_start < i {
                    segments.push(MergeSegment::Keep {
                        start: keep_start,
                        end: i,
                    });
                }
                segments.push(MergeSegment::Inline {
                    index: i,
                    selector: inner_selector,
                    cases: inner_cases,
                });
                keep_start = i + 1;
            }
            _ => {}
        }
    }
    if !segments.iter().any(|s| matches!(s, MergeSegment::Inline { .. })) {
        return Ok(false);
    }
    if keep_start < cases.len() {
        segments.push(MergeSegment::Keep {
            start: keep_start,
            end: cases.len(),
        });
    }

    let mut selector_parts: Vec<NodeRef> = Vec::new();
    let mut new_cases: Vec<NodeRef> = Vec::new();
    let mut zero: Option<NodeRef> = None;
    for segment in segments {
        match segment {
            MergeSegment::Keep { start, end } => {
                selector_parts.push(cx.rw.bit_slice(selector, start, end - start)?);
                new_cases.extend_from_slice(&cases[start..end]);
            }
            MergeSegment::Inline {
                index,
                selector: inner_selector,
                cases: inner_cases,
            } => {
                // sel={..., S, ...} cases=[..., ohs({A, B}, [a, b]), ...]
                // becomes sel={..., S&A, S&B, ...} cases=[..., a, b, ...].
                let outer_bit = cx.rw.bit_slice(selector, index, 1)?;
                let mask = cx.rw.sign_ext(outer_bit, inner_cases.len())?;
                selector_parts.push(cx.rw.and(mask, inner_selector)?);
                new_cases.extend_from_slice(&inner_cases);
                if kind == SelectKind::Priority {
                    // The inner select yields zero when none of its bits are
                    // set; that must still win over later outer cases.
                    let inner_is_zero = if cx.ty(inner_selector).bit_count() == 1 {
                        cx.rw.not(inner_selector)?
                    } else {
                        let inner_ty = cx.ty(inner_selector);
                        let inner_zero = cx.zero_of(&inner_ty)?;
                        cx.rw.binop(Binop::Eq, inner_selector, inner_zero)?
                    };
                    selector_parts.push(cx.rw.and(outer_bit, inner_is_zero)?);
                    let zero_case = match zero {
                        Some(z) => z,
                        None => {
                            let ty = cx.ty(cases[index]);
                            let z = cx.zero_of(&ty)?;
                            zero = Some(z);
                            z
                        }
                    };
                    new_cases.push(zero_case);
                }
            }
        }
    }
    let new_selector = cx.concat_lsb_first(selector_parts)?;
    let merged = cx.make_select(kind, new_selector, new_cases)?;
    cx.replace(node, merged)
}

fn convert_select_to_mask(cx: &mut RuleContext, node: NodeRef) -> Result<bool, OptError> {
    if !cx.options.splits_enabled() {
        return Ok(false);
    }
    let payload = cx.payload(node);
    if !payload.is_select_family() {
        return Ok(false);
    }
    // Tuple-typed selects are distributed before this rule is reached.
    let ty = cx.ty(node);
    let Some(width) = ty.bits_width() else {
        return Ok(false);
    };

    // (arm, value) pairs; arm `None` stands for the default of a `sel`.
    let (selector, arms): (NodeRef, Vec<(Option<usize>, NodeRef)>) = match &payload {
        NodePayload::Sel {
            selector,
            cases,
            default,
        } => (
            *selector,
            default
                .iter()
                .map(|d| (None, *d))
                .chain(cases.iter().enumerate().map(|(i, c)| (Some(i), *c)))
                .collect(),
        ),
        NodePayload::OneHotSel { selector, cases } | NodePayload::PrioritySel { selector, cases } => (
            *selector,
            cases.iter().enumerate().map(|(i, c)| (Some(i), *c)).collect(),
        ),
        _ => return Ok(false),
    };
    let mut nonzero: Option<(Option<usize>, NodeRef)> = None;
    for (arm, value) in arms {
        if cx.is_all_zeros(value) {
            continue;
        }
        if nonzero.is_some() {
            return Ok(false);
        }
        nonzero = Some((arm, value));
    }

    let Some((arm, value)) = nonzero else {
        let zero = cx.zero_of(&ty)?;
        return cx.replace(node, zero);
    };
    let selector_width = cx.ty(selector).bit_count();
    let condition = match (&payload, arm) {
        (NodePayload::Sel { cases, .. }, None) => {
            let case_count = IrBits::make_ubits(selector_width, cases.len() as u64)?;
            let lit = cx.rw.literal_bits(case_count)?;
            cx.rw.binop(Binop::Uge, selector, lit)?
        }
        (NodePayload::Sel { .. }, Some(i)) if selector_width == 1 => {
            if i == 0 {
                cx.rw.not(selector)?
            } else {
                selector
            }
        }
        (NodePayload::Sel { .. }, Some(i)) => {
            let arm_value = IrBits::make_ubits(selector_width, i as u64)?;
            cx.rw.eq_literal(selector, arm_value)?
        }
        (NodePayload::OneHotSel { .. }, Some(i)) => {
            if selector_width == 1 {
                selector
            } else {
                cx.rw.bit_slice(selector, i, 1)?
            }
        }
        (NodePayload::PrioritySel { .. }, Some(i)) => {
            let truncated = if selector_width == 1 {
                selector
            } else {
                cx.rw.bit_slice(selector, 0, i + 1)?
            };
            if i == 0 {
                truncated
            } else {
                cx.rw.eq_literal(truncated, IrBits::power_of_two(i, i + 1)?)?
            }
        }
        _ => {
            return Err(OptError::invariant(
                cx.id(node),
                "only a sel can select its default",
            ))
        }
    };

    let replacement = if width == 1 {
        cx.rw.and(value, condition)?
    } else {
        let mask = cx.rw.sign_ext(condition, width)?;
        cx.rw.and(value, mask)?
    };
    cx.replace(node, replacement)
}

fn elide_dead_cases(cx: &mut RuleContext, node: NodeRef) -> Result<bool, OptError> {
    if !cx.options.narrowing_enabled() {
        return Ok(false);
    }
    let Some((kind, selector, cases)) = one_hot_or_priority(&cx.payload(node)) else {
        return Ok(false);
    };
    if !cx.engine.is_tracked(cx.f(), selector) {
        return Ok(false);
    }
    let Some(selector_bits) = cx.bits_ternary(selector) else {
        return Ok(false);
    };

    // One-hot: a case is dead if its bit is zero or its value is zero.
    // Priority: a case is dead if its bit is zero or an earlier bit is one.
    let mut later_cases_dead = false;
    let mut has_removable_case = false;
    let mut live: Vec<usize> = Vec::new();
    for (i, case) in cases.iter().enumerate() {
        let removable = if later_cases_dead {
            true
        } else if kind == SelectKind::Priority && selector_bits.get(i) == TernaryValue::KnownOne {
            later_cases_dead = true;
            false
        } else if selector_bits.get(i) == TernaryValue::KnownZero {
            true
        } else {
            kind == SelectKind::OneHot && cx.is_all_zeros(*case)
        };
        if removable {
            has_removable_case = true;
        } else {
            live.push(i);
        }
    }
    if kind == SelectKind::Priority {
        // Selecting a trailing zero case gives the same zero as selecting
        // nothing.
        while let Some(&last) = live.last() {
            if !cx.is_all_zeros(cases[last]) {
                break;
            }
            live.pop();
            has_removable_case = true;
        }
    }
    if !cx.options.splits_enabled() && has_removable_case && !live.is_empty() {
        let (first, last) = (live[0], live[live.len() - 1]);
        live = (first..=last).collect();
        if live.len() == cases.len() {
            has_removable_case = false;
        }
    }
    if !has_removable_case {
        return Ok(false);
    }
    if live.is_empty() {
        let ty = cx.ty(node);
        let zero = cx.zero_of(&ty)?;
        return cx.replace(node, zero);
    }
    let new_selector = cx.gather_bits(selector, &live)?;
    let new_cases: Vec<NodeRef> = live.iter().map(|i| cases[*i]).collect();
    let narrowed = cx.make_select(kind, new_selector, new_cases)?;
    cx.replace(node, narrowed)
}

fn squeeze_select(cx: &mut RuleContext, node: NodeRef) -> Result<bool, OptError> {
    if !cx.options.splits_enabled() {
        return Ok(false);
    }
    let NodePayload::Sel {
        selector,
        cases,
        default,
    } = cx.payload(node)
    else {
        return Ok(false);
    };
    if !cx.ty(node).is_bits() {
        return Ok(false);
    }
    let Some(known) = cx.bits_ternary(node) else {
        return Ok(false);
    };
    let width = known.width();
    let leading = known.count_leading_known();
    let trailing = known.count_trailing_known();
    if leading == 0 && trailing == 0 {
        return Ok(false);
    }
    if leading == width {
        let Some(value) = known.to_known_bits() else {
            return Ok(false);
        };
        let lit = cx.rw.literal_bits(value)?;
        return cx.replace(node, lit);
    }
    let id = cx.id(node);
    let known_part = |start: usize, len: usize| {
        known
            .slice(start, len)
            .to_known_bits()
            .ok_or_else(|| OptError::invariant(id.clone(), "squeezed bits are not known"))
    };
    let msb = known_part(width - leading, leading)?;
    let lsb = known_part(0, trailing)?;
    let middle = width - leading - trailing;
    let mut sliced_cases = Vec::with_capacity(cases.len());
    for case in cases {
        sliced_cases.push(cx.rw.bit_slice(case, trailing, middle)?);
    }
    let sliced_default = match default {
        Some(d) => Some(cx.rw.bit_slice(d, trailing, middle)?),
        None => None,
    };
    let narrowed = cx.rw.sel(selector, sliced_cases, sliced_default)?;
    // Zero-width literals are left out.
    let mut parts = Vec::with_capacity(3);
    if leading > 0 {
        parts.push(cx.rw.literal_bits(msb)?);
    }
    parts.push(narrowed);
    if trailing > 0 {
        parts.push(cx.rw.literal_bits(lsb)?);
    }
    let result = cx.rw.concat(parts)?;
    cx.replace(node, result)
}

fn fold_two_way_select_chain(cx: &mut RuleContext, node: NodeRef) -> Result<bool, OptError> {
    let Some((p0, case0, case1)) = two_way_select(cx.f(), node) else {
        return Ok(false);
    };
    let (x, y, p_x) = if let Some((p1, inner0, inner1)) = two_way_select(cx.f(), case0) {
        if case1 == inner0 {
            // sel(p0, [sel(p1, [x, y]), x]): x when p0 | !p1
            let not_p1 = cx.rw.not(p1)?;
            (case1, inner1, cx.rw.or(p0, not_p1)?)
        } else if case1 == inner1 {
            // sel(p0, [sel(p1, [y, x]), x]): x when p0 | p1
            (case1, inner0, cx.rw.or(p0, p1)?)
        } else {
            return Ok(false);
        }
    } else if let Some((p1, inner0, inner1)) = two_way_select(cx.f(), case1) {
        if case0 == inner0 {
            // sel(p0, [x, sel(p1, [x, y])]): x when !(p0 & p1)
            (case0, inner1, cx.rw.nary(NaryOp::Nand, vec![p0, p1])?)
        } else if case0 == inner1 {
            // sel(p0, [x, sel(p1, [y, x])]): x when !p0 | p1
            let not_p0 = cx.rw.not(p0)?;
            (case0, inner0, cx.rw.or(not_p0, p1)?)
        } else {
            return Ok(false);
        }
    } else {
        return Ok(false);
    };
    let folded = cx.rw.sel(p_x, vec![y, x], None)?;
    cx.replace(node, folded)
}

fn fold_shared_selector_select(cx: &mut RuleContext, node: NodeRef) -> Result<bool, OptError> {
    let Some((p0, case0, case1)) = two_way_select(cx.f(), node) else {
        return Ok(false);
    };
    if let Some((p1, inner0, _)) = two_way_select(cx.f(), case0) {
        if p0 == p1 {
            cx.rw.replace_operand_number(node, 1, inner0)?;
            return Ok(true);
        }
    }
    if let Some((p1, _, inner1)) = two_way_select(cx.f(), case1) {
        if p0 == p1 {
            cx.rw.replace_operand_number(node, 2, inner1)?;
            return Ok(true);
        }
    }
    Ok(false)
}

fn decompose_single_bit_one_hot_select(cx: &mut RuleContext, node: NodeRef) -> Result<bool, OptError> {
    if !cx.options.splits_enabled() {
        return Ok(false);
    }
    let NodePayload::OneHotSel { selector, cases } = cx.payload(node) else {
        return Ok(false);
    };
    if cx.ty(node) != Type::Bits(1) || cases.len() != 2 {
        return Ok(false);
    }
    let bit0 = cx.rw.bit_slice(selector, 0, 1)?;
    let bit1 = cx.rw.bit_slice(selector, 1, 1)?;
    let and0 = cx.rw.and(bit0, cases[0])?;
    let and1 = cx.rw.and(bit1, cases[1])?;
    let result = cx.rw.or(and0, and1)?;
    cx.replace(node, result)
}

fn replace_single_bit_one_hot(cx: &mut RuleContext, node: NodeRef) -> Result<bool, OptError> {
    if !cx.options.narrowing_enabled() {
        return Ok(false);
    }
    let NodePayload::OneHot { arg, .. } = cx.payload(node) else {
        return Ok(false);
    };
    if cx.ty(node).bit_count() != 2 {
        return Ok(false);
    }
    let inverted = cx.rw.not(arg)?;
    let result = cx.rw.concat(vec![inverted, arg])?;
    cx.replace(node, result)
}

fn replace_exclusive_one_hot(cx: &mut RuleContext, node: NodeRef) -> Result<bool, OptError> {
    let NodePayload::OneHot { arg, .. } = cx.payload(node) else {
        return Ok(false);
    };
    if !cx.engine.at_most_one_bit_true(cx.f(), arg) {
        return Ok(false);
    }
    let width = cx.ty(arg).bit_count();
    let is_zero = cx.rw.eq_literal(arg, IrBits::zero(width))?;
    let result = cx.rw.concat(vec![is_zero, arg])?;
    cx.replace(node, result)
}

fn replace_one_hot_single_unknown_bit(cx: &mut RuleContext, node: NodeRef) -> Result<bool, OptError> {
    let NodePayload::OneHot { arg, lsb_prio } = cx.payload(node) else {
        return Ok(false);
    };
    let Some(unknown_index) = cx.engine.exactly_one_bit_unknown(cx.f(), arg) else {
        return Ok(false);
    };
    let width = cx.ty(arg).bit_count();
    let mut on_false = Vec::with_capacity(width);
    let mut on_true = Vec::with_capacity(width);
    for i in 0..width {
        let bit = cx.engine.get_bit(cx.f(), &TreeBitLocation::new(arg, i));
        match bit.to_bool() {
            Some(b) => {
                on_false.push(b);
                on_true.push(b);
            }
            None => {
                crate::ret_check!(
                    i == unknown_index,
                    cx.id(node),
                    "bit {} of the input is unknown but bit {} was reported as the only unknown",
                    i,
                    unknown_index
                );
                on_false.push(false);
                on_true.push(true);
            }
        }
    }
    let out_false = one_hot_bits(&IrBits::from_lsb_is_0(&on_false), lsb_prio);
    let out_true = one_hot_bits(&IrBits::from_lsb_is_0(&on_true), lsb_prio);
    let bit = cx.rw.bit_slice(arg, unknown_index, 1)?;
    let lit_false = cx.rw.literal(IrValue::from_bits(&out_false))?;
    let lit_true = cx.rw.literal(IrValue::from_bits(&out_true))?;
    let result = cx.rw.sel(bit, vec![lit_false, lit_true], None)?;
    cx.replace(node, result)
}
