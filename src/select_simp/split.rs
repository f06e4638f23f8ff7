// SPDX-License-Identifier: Apache-2.0

//! Splits a `one_hot_sel` into narrower one-hot-selects over bit ranges in
//! which the cases either never share a bit source or keep sharing one.
//!
//! For example, if two cases agree on their low three bits, those bits and
//! the remaining bits are selected separately and concatenated; later rules
//! can then common the agreeing cases in the low slice.

use crate::bit_source::BitSourceTable;
use crate::ir::{node_textual_id, NodePayload, NodeRef};
use crate::ir_rewrite::FnRewriter;
use crate::opt_error::OptError;
use crate::query_engine::QueryEngine;
use crate::ret_check;

/// Length of the run starting at `start` in which no two cases share a bit
/// source at any position.
fn run_of_distinct_case_bits(
    table: &mut BitSourceTable,
    cases: &[NodeRef],
    start: usize,
    width: usize,
) -> Result<usize, OptError> {
    let mut i = start;
    while i < width && table.pairs_with_same_source(cases, i)?.is_empty() {
        i += 1;
    }
    log::trace!("distinct case bits from {}: run of {}", start, i - start);
    Ok(i - start)
}

/// Length of the run starting at `start` in which at least one pair of cases
/// shares a bit source at every position.
fn run_of_non_distinct_case_bits(
    table: &mut BitSourceTable,
    cases: &[NodeRef],
    start: usize,
    width: usize,
) -> Result<usize, OptError> {
    let mut matches: Vec<(usize, usize)> = Vec::new();
    let mut i = start;
    while i < width {
        let here = table.pairs_with_same_source(cases, i)?;
        if i == start {
            matches = here;
        } else {
            // Both lists are in lexicographic order.
            matches.retain(|pair| here.binary_search(pair).is_ok());
        }
        log::trace!("  bit {}: matching pairs {:?}", i, matches);
        if matches.is_empty() {
            break;
        }
        i += 1;
    }
    log::trace!("non-distinct case bits from {}: run of {}", start, i - start);
    Ok(i - start)
}

/// Splits `node` if its cases break into more than one run. Returns the new
/// one-hot-selects, or an empty list when `node` was left alone.
pub(crate) fn maybe_split_one_hot_select(
    rw: &mut FnRewriter,
    engine: &dyn QueryEngine,
    node: NodeRef,
    max_width: usize,
) -> Result<Vec<NodeRef>, OptError> {
    let NodePayload::OneHotSel { selector, cases } = rw.func().get_node(node).payload.clone() else {
        return Ok(Vec::new());
    };
    let Some(width) = rw.node_ty(node).bits_width() else {
        return Ok(Vec::new());
    };
    if width == 0 || width > max_width || cases.is_empty() {
        return Ok(Vec::new());
    }

    let mut runs: Vec<(usize, usize)> = Vec::new();
    {
        let f = rw.func();
        let node_id = node_textual_id(f, node);
        log::trace!("trying to split {}", node_id);
        let mut table = BitSourceTable::new(f, engine);
        let mut start = 0;
        while start < width {
            let mut run = run_of_distinct_case_bits(&mut table, &cases, start, width)?;
            if run == 0 {
                run = run_of_non_distinct_case_bits(&mut table, &cases, start, width)?;
            }
            ret_check!(run > 0, node_id, "empty run of case bits at bit {}", start);
            if run == width {
                return Ok(Vec::new());
            }
            runs.push((start, run));
            start += run;
        }
    }

    rw.set_pos_from(node);
    let mut slices = Vec::with_capacity(runs.len());
    for (start, run) in runs {
        let mut case_slices = Vec::with_capacity(cases.len());
        for case in cases.iter() {
            case_slices.push(rw.bit_slice(*case, start, run)?);
        }
        slices.push(rw.one_hot_sel(selector, case_slices)?);
    }
    log::debug!(
        "splitting one-hot-select {} into {} slices",
        node_textual_id(rw.func(), node),
        slices.len()
    );
    let mut high_to_low = slices.clone();
    high_to_low.reverse();
    let concat = rw.concat(high_to_low)?;
    rw.replace_uses_with(node, concat)?;
    Ok(slices)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::Fn;
    use crate::ir_parser::Parser;
    use crate::query_engine::StatelessQueryEngine;
    use pretty_assertions::assert_eq;

    fn parse(text: &str) -> Fn {
        Parser::new(text).parse_fn().unwrap()
    }

    #[test]
    fn test_runs_over_shared_low_bits() {
        // Bits 0..3 of both cases come from x; bits 3..6 are distinct.
        let f = parse(
            r#"fn f(s: bits[2] id=1, x: bits[3] id=2, a: bits[3] id=3, b: bits[3] id=4) -> bits[6] {
  concat.5: bits[6] = concat(a, x, id=5)
  concat.6: bits[6] = concat(b, x, id=6)
  ret one_hot_sel.7: bits[6] = one_hot_sel(s, cases=[concat.5, concat.6], id=7)
}"#,
        );
        let engine = StatelessQueryEngine::new();
        let mut table = BitSourceTable::new(&f, &engine);
        let cases = [NodeRef { index: 5 }, NodeRef { index: 6 }];
        assert_eq!(run_of_distinct_case_bits(&mut table, &cases, 0, 6).unwrap(), 0);
        assert_eq!(run_of_non_distinct_case_bits(&mut table, &cases, 0, 6).unwrap(), 3);
        assert_eq!(run_of_distinct_case_bits(&mut table, &cases, 3, 6).unwrap(), 3);
    }

    #[test]
    fn test_split_replaces_with_concat_of_slices() {
        let mut f = parse(
            r#"fn f(s: bits[2] id=1, x: bits[3] id=2, a: bits[3] id=3, b: bits[3] id=4) -> bits[6] {
  concat.5: bits[6] = concat(a, x, id=5)
  concat.6: bits[6] = concat(b, x, id=6)
  ret one_hot_sel.7: bits[6] = one_hot_sel(s, cases=[concat.5, concat.6], id=7)
}"#,
        );
        let engine = StatelessQueryEngine::new();
        let ohs = NodeRef { index: 7 };
        let new_ohses = {
            let mut rw = FnRewriter::new(&mut f);
            maybe_split_one_hot_select(&mut rw, &engine, ohs, 64).unwrap()
        };
        assert_eq!(new_ohses.len(), 2);
        for n in new_ohses.iter() {
            assert_eq!(f.get_node_ty(*n).bit_count(), 3);
        }
        let ret = f.ret_node_ref.unwrap();
        assert!(matches!(f.get_node(ret).payload, NodePayload::Nary(crate::ir::NaryOp::Concat, _)));
        crate::ir_validate::validate_fn(&f).unwrap();

        // Each slice is a single run now, so neither splits again.
        let mut rw = FnRewriter::new(&mut f);
        for n in new_ohses {
            assert!(maybe_split_one_hot_select(&mut rw, &engine, n, 64).unwrap().is_empty());
        }
    }

    #[test]
    fn test_no_split_when_one_run_covers_everything() {
        let mut f = parse(
            r#"fn f(s: bits[2] id=1, a: bits[4] id=2, b: bits[4] id=3) -> bits[4] {
  ret one_hot_sel.4: bits[4] = one_hot_sel(s, cases=[a, b], id=4)
}"#,
        );
        let engine = StatelessQueryEngine::new();
        let mut rw = FnRewriter::new(&mut f);
        let ohs = NodeRef { index: 4 };
        assert!(maybe_split_one_hot_select(&mut rw, &engine, ohs, 64).unwrap().is_empty());
        assert!(rw.take_created().is_empty());
    }

    #[test]
    fn test_width_bound_is_respected() {
        let mut f = parse(
            r#"fn f(s: bits[2] id=1, x: bits[3] id=2, a: bits[3] id=3, b: bits[3] id=4) -> bits[6] {
  concat.5: bits[6] = concat(a, x, id=5)
  concat.6: bits[6] = concat(b, x, id=6)
  ret one_hot_sel.7: bits[6] = one_hot_sel(s, cases=[concat.5, concat.6], id=7)
}"#,
        );
        let engine = StatelessQueryEngine::new();
        let mut rw = FnRewriter::new(&mut f);
        assert!(maybe_split_one_hot_select(&mut rw, &engine, NodeRef { index: 7 }, 4)
            .unwrap()
            .is_empty());
    }
}
