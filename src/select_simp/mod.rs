// SPDX-License-Identifier: Apache-2.0

//! Simplification of `sel`, `one_hot_sel`, and `priority_sel` operations.
//!
//! The pass runs in sweeps. Each sweep populates the union of the stateless
//! and ternary query engines over the current graph, then visits every node
//! once in topological order and applies the first matching rule from
//! `rules::RULES`. Nodes created or rewritten in place during a sweep are
//! picked up by the next one, with fresh analysis. Once a sweep changes
//! nothing and splitting is enabled, wide one-hot-selects are split along
//! runs of shared case bits, and sweeping resumes if anything was split. The
//! pass returns when a sweep and the split phase both leave the graph alone,
//! so a second run on its output reports no change.

pub mod config;
mod rules;
mod split;

use std::collections::VecDeque;

use crate::ir::{Fn, NodePayload, NodeRef, Package};
use crate::ir_rewrite::FnRewriter;
use crate::ir_utils::get_topological;
use crate::opt_error::OptError;
use crate::query_engine::{
    QueryEngine, StatelessQueryEngine, TernaryQueryEngine, UnionQueryEngine,
};

pub use config::{PassConfig, SelectSimplificationOptions, DEFAULT_MAX_SPLIT_WIDTH, MAX_OPT_LEVEL};

use rules::{RuleContext, RULES};

#[derive(Debug, Clone, Default)]
pub struct SelectSimplificationPass {
    options: SelectSimplificationOptions,
}

impl SelectSimplificationPass {
    pub fn new(options: SelectSimplificationOptions) -> Self {
        SelectSimplificationPass { options }
    }

    pub fn with_opt_level(opt_level: u32) -> Self {
        Self::new(SelectSimplificationOptions::with_opt_level(opt_level))
    }

    pub fn options(&self) -> &SelectSimplificationOptions {
        &self.options
    }

    /// Runs the pass over every function of `package`; true if any changed.
    pub fn run_on_package(&self, package: &mut Package) -> Result<bool, OptError> {
        let mut changed = false;
        for f in package.members.iter_mut() {
            changed |= self.run_on_fn(f)?;
        }
        Ok(changed)
    }

    /// Simplifies `f` in place; true if anything was rewritten.
    pub fn run_on_fn(&self, f: &mut Fn) -> Result<bool, OptError> {
        let mut engine = UnionQueryEngine::new(vec![
            Box::new(StatelessQueryEngine::new()),
            Box::new(TernaryQueryEngine::new()),
        ]);
        let mut rw = FnRewriter::new(f);
        let mut changed = false;
        let mut sweeps = 0usize;
        loop {
            sweeps += 1;
            let fixpoint = engine.populate(rw.func())?;
            log::debug!(
                "sweep {} of {}: query engine populate {:?}",
                sweeps,
                rw.func().name,
                fixpoint
            );
            let mut sweep_changed = self.rewrite_sweep(&mut rw, &engine)?;
            if !sweep_changed && self.options.splits_enabled() {
                sweep_changed = self.split_one_hot_selects(&mut rw, &engine)?;
            }
            if !sweep_changed {
                break;
            }
            changed = true;
        }
        log::debug!(
            "select simplification of {} at opt level {}: changed={} after {} sweeps",
            rw.func().name,
            self.options.opt_level,
            changed,
            sweeps
        );
        Ok(changed)
    }

    /// Visits every live node once in topological order.
    fn rewrite_sweep(&self, rw: &mut FnRewriter, engine: &dyn QueryEngine) -> Result<bool, OptError> {
        let mut changed = false;
        for node in get_topological(rw.func()) {
            if rw.is_replaced(node) {
                continue;
            }
            changed |= self.simplify_node(rw, engine, node)?;
        }
        // Created nodes are visited by the next sweep.
        rw.take_created();
        Ok(changed)
    }

    fn simplify_node(
        &self,
        rw: &mut FnRewriter,
        engine: &dyn QueryEngine,
        node: NodeRef,
    ) -> Result<bool, OptError> {
        let before = if log::log_enabled!(log::Level::Debug) {
            rw.func().node_line(node)
        } else {
            None
        };
        rw.set_pos_from(node);
        let mut cx = RuleContext {
            rw,
            engine,
            options: self.options,
        };
        for (name, rule) in RULES {
            if rule(&mut cx, node)? {
                log::debug!("{}: {}", name, before.as_deref().unwrap_or(""));
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn split_one_hot_selects(
        &self,
        rw: &mut FnRewriter,
        engine: &dyn QueryEngine,
    ) -> Result<bool, OptError> {
        let mut worklist: VecDeque<NodeRef> = rw
            .func()
            .node_refs()
            .into_iter()
            .filter(|n| matches!(rw.func().get_node(*n).payload, NodePayload::OneHotSel { .. }))
            .collect();
        let mut changed = false;
        while let Some(node) = worklist.pop_front() {
            let new_selects =
                split::maybe_split_one_hot_select(rw, engine, node, self.options.max_split_width)?;
            if !new_selects.is_empty() {
                changed = true;
                worklist.extend(new_selects);
            }
        }
        Ok(changed)
    }
}

/// Runs the pass on `f` with default options at `opt_level`.
pub fn simplify_selects(f: &mut Fn, opt_level: u32) -> Result<bool, OptError> {
    SelectSimplificationPass::with_opt_level(opt_level).run_on_fn(f)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir_parser::Parser;
    use crate::ir_validate::validate_fn;
    use crate::test_utils::quickcheck_fn_equivalence_ubits_le64;
    use pretty_assertions::assert_eq;

    fn parse(text: &str) -> Fn {
        Parser::new(text).parse_fn().unwrap()
    }

    /// Runs the pass at `opt_level`, checks the result against the input by
    /// simulation, and returns the rewritten function.
    fn simplify(text: &str, opt_level: u32) -> (bool, Fn) {
        let _ = env_logger::builder().is_test(true).try_init();
        let orig = parse(text);
        let mut f = orig.clone();
        let changed = simplify_selects(&mut f, opt_level).unwrap();
        validate_fn(&f).unwrap();
        quickcheck_fn_equivalence_ubits_le64(&orig, &f, 200, 0x5e1ec7).unwrap();
        (changed, f)
    }

    fn ret_payload(f: &Fn) -> NodePayload {
        f.get_node(f.ret_node_ref.unwrap()).payload.clone()
    }

    fn ret_operator(f: &Fn) -> String {
        ret_payload(f).get_operator().to_string()
    }

    fn ret_is_param(f: &Fn, name: &str) -> bool {
        let ret = f.ret_node_ref.unwrap();
        matches!(f.get_node(ret).payload, NodePayload::GetParam(_))
            && f.get_node(ret).name.as_deref() == Some(name)
    }

    #[test]
    fn test_select_with_known_selector_picks_case() {
        let (changed, f) = simplify(
            r#"fn f(x: bits[8] id=1, y: bits[8] id=2) -> bits[8] {
  literal.3: bits[1] = literal(value=1, id=3)
  ret sel.4: bits[8] = sel(literal.3, cases=[x, y], id=4)
}"#,
            0,
        );
        assert!(changed);
        assert!(ret_is_param(&f, "y"));
    }

    #[test]
    fn test_select_with_known_selector_picks_default() {
        let (changed, f) = simplify(
            r#"fn f(x: bits[8] id=1, y: bits[8] id=2, d: bits[8] id=3) -> bits[8] {
  literal.4: bits[2] = literal(value=3, id=4)
  ret sel.5: bits[8] = sel(literal.4, cases=[x, y], default=d, id=5)
}"#,
            0,
        );
        assert!(changed);
        assert!(ret_is_param(&f, "d"));
    }

    #[test]
    fn test_select_known_selector_from_analysis() {
        // The selector is only known through the `and` with a zero mask.
        let (changed, f) = simplify(
            r#"fn f(s: bits[2] id=1, x: bits[4] id=2, y: bits[4] id=3) -> bits[4] {
  literal.4: bits[2] = literal(value=0, id=4)
  and.5: bits[2] = and(s, literal.4, id=5)
  ret sel.6: bits[4] = sel(and.5, cases=[x, y], default=y, id=6)
}"#,
            0,
        );
        assert!(changed);
        assert!(ret_is_param(&f, "x"));
    }

    #[test]
    fn test_priority_select_zero_selector_gives_zero() {
        let (changed, f) = simplify(
            r#"fn f(x: bits[4] id=1, y: bits[4] id=2) -> bits[4] {
  literal.3: bits[2] = literal(value=0, id=3)
  ret priority_sel.4: bits[4] = priority_sel(literal.3, cases=[x, y], id=4)
}"#,
            0,
        );
        assert!(changed);
        assert_eq!(ret_operator(&f), "literal");
    }

    #[test]
    fn test_priority_select_blocked_by_unknown_low_bit() {
        let (changed, _) = simplify(
            r#"fn f(s: bits[1] id=1, x: bits[4] id=2, y: bits[4] id=3) -> bits[4] {
  literal.4: bits[1] = literal(value=1, id=4)
  concat.5: bits[2] = concat(literal.4, s, id=5)
  ret priority_sel.6: bits[4] = priority_sel(concat.5, cases=[x, y], id=6)
}"#,
            0,
        );
        assert!(!changed);
    }

    #[test]
    fn test_identical_select_cases() {
        let (changed, f) = simplify(
            r#"fn f(s: bits[2] id=1, x: bits[4] id=2) -> bits[4] {
  ret sel.3: bits[4] = sel(s, cases=[x, x, x], default=x, id=3)
}"#,
            0,
        );
        assert!(changed);
        assert!(ret_is_param(&f, "x"));
    }

    #[test]
    fn test_identical_one_hot_select_cases() {
        let (changed, f) = simplify(
            r#"fn f(s: bits[3] id=1, x: bits[4] id=2) -> bits[4] {
  ret one_hot_sel.3: bits[4] = one_hot_sel(s, cases=[x, x, x], id=3)
}"#,
            0,
        );
        assert!(changed);
        assert_eq!(ret_operator(&f), "sel");
    }

    #[test]
    fn test_tuple_select_is_distributed() {
        let (changed, f) = simplify(
            r#"fn f(s: bits[1] id=1, a: (bits[4], bits[2]) id=2, b: (bits[4], bits[2]) id=3) -> (bits[4], bits[2]) {
  ret sel.4: (bits[4], bits[2]) = sel(s, cases=[a, b], id=4)
}"#,
            0,
        );
        assert!(changed);
        let NodePayload::Tuple(elements) = ret_payload(&f) else {
            panic!("expected tuple, got {}", f);
        };
        for e in elements {
            assert_eq!(f.get_node(e).payload.get_operator(), "sel");
        }
    }

    #[test]
    fn test_tuple_select_with_one_live_case_masks_each_element() {
        let (changed, f) = simplify(
            r#"fn f(p: bits[2] id=1, a: (bits[4], bits[2]) id=2) -> (bits[4], bits[2]) {
  literal.3: (bits[4], bits[2]) = literal(value=(0, 0), id=3)
  ret one_hot_sel.4: (bits[4], bits[2]) = one_hot_sel(p, cases=[a, literal.3], id=4)
}"#,
            3,
        );
        assert!(changed);
        let NodePayload::Tuple(elements) = ret_payload(&f) else {
            panic!("expected tuple, got {}", f);
        };
        for e in elements {
            assert!(!f.get_node(e).payload.is_select_family(), "{}", f);
        }
    }

    #[test]
    fn test_two_way_chain_fold() {
        let (changed, f) = simplify(
            r#"fn f(p0: bits[1] id=1, p1: bits[1] id=2, x: bits[4] id=3, y: bits[4] id=4) -> bits[4] {
  sel.5: bits[4] = sel(p1, cases=[y, x], id=5)
  ret sel.6: bits[4] = sel(p0, cases=[sel.5, x], id=6)
}"#,
            0,
        );
        assert!(changed);
        let NodePayload::Sel { selector, cases, .. } = ret_payload(&f) else {
            panic!("expected sel, got {}", f);
        };
        assert_eq!(f.get_node(selector).payload.get_operator(), "or");
        assert_eq!(cases, vec![NodeRef { index: 4 }, NodeRef { index: 3 }]);
    }

    #[test]
    fn test_shared_selector_substitutes_operand() {
        let (changed, f) = simplify(
            r#"fn f(p: bits[1] id=1, a: bits[4] id=2, b: bits[4] id=3, c: bits[4] id=4) -> bits[4] {
  sel.5: bits[4] = sel(p, cases=[a, b], id=5)
  ret sel.6: bits[4] = sel(p, cases=[sel.5, c], id=6)
}"#,
            0,
        );
        assert!(changed);
        assert_eq!(
            ret_payload(&f),
            NodePayload::Sel {
                selector: NodeRef { index: 1 },
                cases: vec![NodeRef { index: 2 }, NodeRef { index: 4 }],
                default: None,
            }
        );
    }

    #[test]
    fn test_one_hot_select_duplicate_cases_need_narrowing() {
        let text = r#"fn f(s: bits[3] id=1, x: bits[4] id=2, y: bits[4] id=3) -> bits[4] {
  ret one_hot_sel.4: bits[4] = one_hot_sel(s, cases=[x, y, x], id=4)
}"#;
        let (changed, _) = simplify(text, 1);
        assert!(!changed);
        let (changed, f) = simplify(text, 2);
        assert!(changed);
        let NodePayload::OneHotSel { cases, .. } = ret_payload(&f) else {
            panic!("expected one_hot_sel, got {}", f);
        };
        assert_eq!(cases, vec![NodeRef { index: 2 }, NodeRef { index: 3 }]);
    }

    #[test]
    fn test_priority_select_adjacent_duplicates_need_splits() {
        let text = r#"fn f(s: bits[4] id=1, x: bits[4] id=2, y: bits[4] id=3) -> bits[4] {
  ret priority_sel.4: bits[4] = priority_sel(s, cases=[x, x, y, x], id=4)
}"#;
        let (changed, _) = simplify(text, 2);
        assert!(!changed);
        let (changed, f) = simplify(text, 3);
        assert!(changed);
        let NodePayload::PrioritySel { cases, .. } = ret_payload(&f) else {
            panic!("expected priority_sel, got {}", f);
        };
        assert_eq!(
            cases,
            vec![NodeRef { index: 2 }, NodeRef { index: 3 }, NodeRef { index: 2 }]
        );
    }

    #[test]
    fn test_single_bit_mux_with_constant_case() {
        let (changed, f) = simplify(
            r#"fn f(s: bits[1] id=1, x: bits[1] id=2) -> bits[1] {
  literal.3: bits[1] = literal(value=0, id=3)
  ret sel.4: bits[1] = sel(s, cases=[literal.3, x], id=4)
}"#,
            2,
        );
        assert!(changed);
        assert_eq!(ret_operator(&f), "or");
    }

    #[test]
    fn test_merge_consecutive_priority_selects() {
        let (changed, f) = simplify(
            r#"fn f(s: bits[2] id=1, t: bits[2] id=2, a: bits[4] id=3, b: bits[4] id=4, c: bits[4] id=5) -> bits[4] {
  priority_sel.6: bits[4] = priority_sel(t, cases=[a, b], id=6)
  ret priority_sel.7: bits[4] = priority_sel(s, cases=[priority_sel.6, c], id=7)
}"#,
            2,
        );
        assert!(changed);
        let NodePayload::PrioritySel { cases, .. } = ret_payload(&f) else {
            panic!("expected priority_sel, got {}", f);
        };
        // a, b, the zero fallback for an unasserted t, then c.
        assert_eq!(cases.len(), 4);
        assert_eq!(cases[0], NodeRef { index: 3 });
        assert_eq!(cases[3], NodeRef { index: 5 });
    }

    #[test]
    fn test_merge_skips_multiply_used_inner_select() {
        let (changed, _) = simplify(
            r#"fn f(s: bits[2] id=1, t: bits[2] id=2, a: bits[4] id=3, b: bits[4] id=4, c: bits[4] id=5) -> (bits[4], bits[4]) {
  one_hot_sel.6: bits[4] = one_hot_sel(t, cases=[a, b], id=6)
  one_hot_sel.7: bits[4] = one_hot_sel(s, cases=[one_hot_sel.6, c], id=7)
  ret tuple.8: (bits[4], bits[4]) = tuple(one_hot_sel.6, one_hot_sel.7, id=8)
}"#,
            2,
        );
        assert!(!changed);
    }

    #[test]
    fn test_dead_case_elision_one_hot() {
        // Bit 1 of the selector is known zero.
        let (changed, f) = simplify(
            r#"fn f(s: bits[3] id=1, a: bits[4] id=2, b: bits[4] id=3, c: bits[4] id=4) -> bits[4] {
  literal.5: bits[3] = literal(value=0b101, id=5)
  and.6: bits[3] = and(s, literal.5, id=6)
  ret one_hot_sel.7: bits[4] = one_hot_sel(and.6, cases=[a, b, c], id=7)
}"#,
            3,
        );
        assert!(changed);
        let NodePayload::OneHotSel { cases, .. } = ret_payload(&f) else {
            panic!("expected one_hot_sel, got {}", f);
        };
        assert_eq!(cases, vec![NodeRef { index: 2 }, NodeRef { index: 4 }]);
    }

    #[test]
    fn test_dead_case_elision_without_splits_keeps_middle() {
        // Bit 1 is known zero but is neither leading nor trailing.
        let (changed, _) = simplify(
            r#"fn f(s: bits[3] id=1, a: bits[4] id=2, b: bits[4] id=3, c: bits[4] id=4) -> bits[4] {
  literal.5: bits[3] = literal(value=0b101, id=5)
  and.6: bits[3] = and(s, literal.5, id=6)
  ret one_hot_sel.7: bits[4] = one_hot_sel(and.6, cases=[a, b, c], id=7)
}"#,
            2,
        );
        assert!(!changed);
    }

    #[test]
    fn test_squeeze_known_output_bits() {
        let (changed, f) = simplify(
            r#"fn f(s: bits[1] id=1, x: bits[2] id=2, y: bits[2] id=3) -> bits[4] {
  literal.4: bits[1] = literal(value=1, id=4)
  literal.5: bits[1] = literal(value=0, id=5)
  concat.6: bits[4] = concat(literal.4, x, literal.5, id=6)
  concat.7: bits[4] = concat(literal.4, y, literal.5, id=7)
  ret sel.8: bits[4] = sel(s, cases=[concat.6, concat.7], id=8)
}"#,
            3,
        );
        assert!(changed);
        let NodePayload::Nary(crate::ir::NaryOp::Concat, parts) = ret_payload(&f) else {
            panic!("expected concat, got {}", f);
        };
        assert_eq!(parts.len(), 3);
        assert_eq!(f.get_node(parts[1]).payload.get_operator(), "sel");
        assert_eq!(f.get_node_ty(parts[1]).bit_count(), 2);
    }

    #[test]
    fn test_single_unknown_bit_one_hot() {
        let (changed, f) = simplify(
            r#"fn f(x: bits[1] id=1) -> bits[4] {
  literal.2: bits[2] = literal(value=0b10, id=2)
  concat.3: bits[3] = concat(literal.2, x, id=3)
  ret one_hot.4: bits[4] = one_hot(concat.3, lsb_prio=true, id=4)
}"#,
            0,
        );
        assert!(changed);
        assert_eq!(ret_operator(&f), "sel");
    }

    #[test]
    fn test_selector_rebuilt_by_rewrite_is_folded_in_same_run() {
        // The exclusive one_hot becomes concat(eq(literal, 0), literal); the
        // one-hot-select's new selector is only known once that concat is
        // analyzed.
        let (changed, mut f) = simplify(
            r#"fn f(a: bits[4] id=1, b: bits[4] id=2, c: bits[4] id=3) -> bits[4] {
  literal.4: bits[2] = literal(value=2, id=4)
  one_hot.5: bits[3] = one_hot(literal.4, lsb_prio=true, id=5)
  ret one_hot_sel.6: bits[4] = one_hot_sel(one_hot.5, cases=[a, b, c], id=6)
}"#,
            0,
        );
        assert!(changed);
        assert!(ret_is_param(&f, "b"), "got:\n{}", f);
        assert!(!simplify_selects(&mut f, 0).unwrap());
    }

    #[test]
    fn test_splitting_phase_runs_at_level_three() {
        let text = r#"fn f(s: bits[2] id=1, x: bits[3] id=2, a: bits[3] id=3, b: bits[3] id=4) -> bits[6] {
  concat.5: bits[6] = concat(a, x, id=5)
  concat.6: bits[6] = concat(b, x, id=6)
  ret one_hot_sel.7: bits[6] = one_hot_sel(s, cases=[concat.5, concat.6], id=7)
}"#;
        let (changed, _) = simplify(text, 2);
        assert!(!changed);
        let (changed, f) = simplify(text, 3);
        assert!(changed);
        assert_eq!(ret_operator(&f), "concat");
    }

    #[test]
    fn test_known_select_past_cases_without_default_is_invariant_error() {
        // Only reachable through a malformed graph; the parser does not
        // validate.
        let mut f = parse(
            r#"fn f(x: bits[4] id=1, y: bits[4] id=2) -> bits[4] {
  literal.3: bits[2] = literal(value=3, id=3)
  ret sel.4: bits[4] = sel(literal.3, cases=[x, y], id=4)
}"#,
        );
        let err = simplify_selects(&mut f, 0).unwrap_err();
        assert!(err.is_invariant(), "{}", err);
    }

    #[test]
    fn test_run_on_package() {
        let mut package = Parser::new(
            r#"package p

fn g(x: bits[4] id=1) -> bits[4] {
  ret not.2: bits[4] = not(x, id=2)
}

top fn f(x: bits[4] id=1, y: bits[4] id=2) -> bits[4] {
  literal.3: bits[1] = literal(value=0, id=3)
  ret sel.4: bits[4] = sel(literal.3, cases=[x, y], id=4)
}
"#,
        )
        .parse_package()
        .unwrap();
        let pass = SelectSimplificationPass::default();
        assert!(pass.run_on_package(&mut package).unwrap());
        assert!(!pass.run_on_package(&mut package).unwrap());
    }
}
