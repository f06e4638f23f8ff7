// SPDX-License-Identifier: Apache-2.0

//! Combines several engines into one, taking the most specific sound answer
//! any of them gives.

use crate::interval_set::IntervalSet;
use crate::ir::{Fn, NodeRef};
use crate::ir_value::IrBits;
use crate::leaf_type_tree::LeafTypeTree;
use crate::opt_error::OptError;
use crate::query_engine::{
    all_unknown_ternary, maximal_intervals, PredicateState, QueryEngine, ReachedFixpoint,
    TreeBitLocation,
};
use crate::ternary::TernaryVector;

/// Folds one engine's fixpoint report into the running result.
///
/// `Unchanged` is absorbed; `Changed` raises the result unless it is already
/// `Unknown`; `Unknown` only lowers a result that has already seen
/// `Changed`.
fn combine_fixpoint(result: ReachedFixpoint, next: ReachedFixpoint) -> ReachedFixpoint {
    match (result, next) {
        (ReachedFixpoint::Unknown, _) => ReachedFixpoint::Unknown,
        (_, ReachedFixpoint::Unchanged) => result,
        (_, ReachedFixpoint::Changed) => ReachedFixpoint::Changed,
        (ReachedFixpoint::Changed, ReachedFixpoint::Unknown) => ReachedFixpoint::Unknown,
        (ReachedFixpoint::Unchanged, ReachedFixpoint::Unknown) => ReachedFixpoint::Unchanged,
    }
}

fn union_into(lhs: &mut TernaryVector, rhs: &TernaryVector, node: NodeRef) {
    match lhs.union(rhs) {
        Ok(u) => *lhs = u,
        Err(conflict) => log::debug!(
            "UnionQueryEngine: engines disagree on node {} bit {}",
            node.index,
            conflict.bit_index
        ),
    }
}

pub struct UnionQueryEngine {
    engines: Vec<Box<dyn QueryEngine>>,
}

impl UnionQueryEngine {
    pub fn new(engines: Vec<Box<dyn QueryEngine>>) -> Self {
        UnionQueryEngine { engines }
    }

    pub fn engine_count(&self) -> usize {
        self.engines.len()
    }
}

impl QueryEngine for UnionQueryEngine {
    fn populate(&mut self, f: &Fn) -> Result<ReachedFixpoint, OptError> {
        let mut result = ReachedFixpoint::Unchanged;
        for engine in self.engines.iter_mut() {
            let rf = engine.populate(f)?;
            result = combine_fixpoint(result, rf);
        }
        log::debug!("UnionQueryEngine::populate {}: {:?}", f.name, result);
        Ok(result)
    }

    fn is_tracked(&self, f: &Fn, node: NodeRef) -> bool {
        self.engines.iter().any(|e| e.is_tracked(f, node))
    }

    fn get_ternary(&self, f: &Fn, node: NodeRef) -> LeafTypeTree<TernaryVector> {
        let mut result = all_unknown_ternary(f, node);
        for engine in self.engines.iter() {
            if !engine.is_tracked(f, node) {
                continue;
            }
            let theirs = engine.get_ternary(f, node);
            for i in 0..result.leaf_count() {
                union_into(result.get_leaf_mut(i), theirs.get_leaf(i), node);
            }
        }
        result
    }

    fn get_intervals(&self, f: &Fn, node: NodeRef) -> LeafTypeTree<IntervalSet> {
        let mut result = maximal_intervals(f, node);
        for engine in self.engines.iter() {
            if !engine.is_tracked(f, node) {
                continue;
            }
            result = result.zip(&engine.get_intervals(f, node), |a, b| a.intersect(b));
        }
        result
    }

    fn specialize_given_predicate(&self, f: &Fn, state: &[PredicateState]) -> Box<dyn QueryEngine> {
        Box::new(UnionQueryEngine::new(
            self.engines
                .iter()
                .map(|e| e.specialize_given_predicate(f, state))
                .collect(),
        ))
    }

    fn at_most_one_true(&self, f: &Fn, bits: &[TreeBitLocation]) -> bool {
        self.engines.iter().any(|e| e.at_most_one_true(f, bits))
    }

    fn at_least_one_true(&self, f: &Fn, bits: &[TreeBitLocation]) -> bool {
        self.engines.iter().any(|e| e.at_least_one_true(f, bits))
    }

    fn known_equals(&self, f: &Fn, a: &TreeBitLocation, b: &TreeBitLocation) -> bool {
        self.engines.iter().any(|e| e.known_equals(f, a, b))
    }

    fn known_not_equals(&self, f: &Fn, a: &TreeBitLocation, b: &TreeBitLocation) -> bool {
        self.engines.iter().any(|e| e.known_not_equals(f, a, b))
    }

    fn implies(&self, f: &Fn, a: &TreeBitLocation, b: &TreeBitLocation) -> bool {
        self.engines.iter().any(|e| e.implies(f, a, b))
    }

    fn implied_node_value(
        &self,
        f: &Fn,
        assumed: &[(TreeBitLocation, bool)],
        node: NodeRef,
    ) -> Option<IrBits> {
        self.engines
            .iter()
            .find_map(|e| e.implied_node_value(f, assumed, node))
    }

    fn implied_node_ternary(
        &self,
        f: &Fn,
        assumed: &[(TreeBitLocation, bool)],
        node: NodeRef,
    ) -> Option<TernaryVector> {
        let mut result: Option<TernaryVector> = None;
        for engine in self.engines.iter() {
            let Some(implied) = engine.implied_node_ternary(f, assumed, node) else {
                continue;
            };
            match result.as_mut() {
                Some(r) => union_into(r, &implied, node),
                None => result = Some(implied),
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir_parser::Parser;
    use crate::query_engine::{StatelessQueryEngine, TernaryQueryEngine};
    use crate::ternary::TernaryValue;
    use pretty_assertions::assert_eq;
    use test_case::test_case;

    /// Reports a fixed fixpoint result and knows nothing.
    struct FixedEngine(ReachedFixpoint);

    impl QueryEngine for FixedEngine {
        fn populate(&mut self, _f: &Fn) -> Result<ReachedFixpoint, OptError> {
            Ok(self.0)
        }
        fn is_tracked(&self, _f: &Fn, _node: NodeRef) -> bool {
            false
        }
        fn get_ternary(&self, f: &Fn, node: NodeRef) -> LeafTypeTree<TernaryVector> {
            all_unknown_ternary(f, node)
        }
        fn specialize_given_predicate(&self, _f: &Fn, _state: &[PredicateState]) -> Box<dyn QueryEngine> {
            Box::new(FixedEngine(self.0))
        }
    }

    fn trivial_fn() -> Fn {
        Parser::new(
            r#"fn f(x: bits[4] id=1) -> bits[4] {
  ret not.2: bits[4] = not(x, id=2)
}"#,
        )
        .parse_fn()
        .unwrap()
    }

    use ReachedFixpoint::{Changed, Unchanged, Unknown};

    #[test_case(&[], Unchanged; "empty")]
    #[test_case(&[Unchanged, Unchanged], Unchanged; "all unchanged")]
    #[test_case(&[Unchanged, Changed], Changed; "changed upgrades")]
    #[test_case(&[Changed, Unknown], Unknown; "unknown after changed")]
    #[test_case(&[Unknown, Changed], Changed; "unknown before changed")]
    #[test_case(&[Unknown, Unchanged], Unchanged; "unknown alone")]
    #[test_case(&[Changed, Unknown, Changed], Unknown; "unknown is sticky once reached")]
    fn test_populate_combination(results: &[ReachedFixpoint], want: ReachedFixpoint) {
        let engines: Vec<Box<dyn QueryEngine>> = results
            .iter()
            .map(|r| Box::new(FixedEngine(*r)) as Box<dyn QueryEngine>)
            .collect();
        let mut union = UnionQueryEngine::new(engines);
        assert_eq!(union.populate(&trivial_fn()).unwrap(), want);
    }

    #[test]
    fn test_ternary_union_of_sub_engines() {
        let f = Parser::new(
            r#"fn f(x: bits[4] id=1) -> bits[8] {
  literal.2: bits[2] = literal(value=0b10, id=2)
  concat.3: bits[6] = concat(literal.2, x, id=3)
  literal.4: bits[2] = literal(value=0b01, id=4)
  ret concat.5: bits[8] = concat(concat.3, literal.4, id=5)
}"#,
        )
        .parse_fn()
        .unwrap();
        let mut union = UnionQueryEngine::new(vec![
            Box::new(StatelessQueryEngine::new()),
            Box::new(TernaryQueryEngine::new()),
        ]);
        assert_eq!(union.populate(&f).unwrap(), Changed);
        assert_eq!(union.populate(&f).unwrap(), Unchanged);
        let outer = NodeRef { index: 5 };
        // The stateless engine only sees the literal low bits; the ternary
        // engine sees through the inner concat.
        assert_eq!(
            StatelessQueryEngine::new()
                .get_ternary(&f, outer)
                .get_bits_leaf()
                .unwrap()
                .to_string(),
            "0bXXXXXX01"
        );
        let t = union.get_ternary(&f, outer);
        assert_eq!(t.get_bits_leaf().unwrap().to_string(), "0b10XXXX01");
        assert_eq!(
            union.get_bit(&f, &TreeBitLocation::new(outer, 7)),
            TernaryValue::KnownOne
        );
        let intervals = union.get_intervals(&f, outer);
        assert!(!intervals.get_bits_leaf().unwrap().covers_zero());
    }

    #[test]
    fn test_predicates_or_across_engines() {
        let f = Parser::new(
            r#"fn f(x: bits[3] id=1) -> bits[4] {
  ret one_hot.2: bits[4] = one_hot(x, lsb_prio=false, id=2)
}"#,
        )
        .parse_fn()
        .unwrap();
        let mut union = UnionQueryEngine::new(vec![
            Box::new(TernaryQueryEngine::new()),
            Box::new(StatelessQueryEngine::new()),
        ]);
        union.populate(&f).unwrap();
        // Only the stateless engine knows one_hot outputs are exclusive.
        assert!(union.at_most_one_bit_true(&f, NodeRef { index: 2 }));
        let mut ternary_only = TernaryQueryEngine::new();
        ternary_only.populate(&f).unwrap();
        assert!(!ternary_only.at_most_one_bit_true(&f, NodeRef { index: 2 }));
    }
}
