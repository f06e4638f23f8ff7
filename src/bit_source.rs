// SPDX-License-Identifier: Apache-2.0

//! Traces a bit of a node back through pure routing (`bit_slice`, `concat`)
//! to where its value comes from.

use std::collections::HashMap;

use crate::ir::{node_textual_id, Fn, NaryOp, NodePayload, NodeRef};
use crate::opt_error::OptError;
use crate::query_engine::{QueryEngine, TreeBitLocation};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BitSource {
    Literal(bool),
    Node { node: NodeRef, bit_index: usize },
}

impl BitSource {
    pub fn to_string(&self, f: &Fn) -> String {
        match self {
            BitSource::Literal(b) => format!("{}", *b as u8),
            BitSource::Node { node, bit_index } => {
                format!("{}[{}]", node_textual_id(f, *node), bit_index)
            }
        }
    }
}

/// Returns the source of bit `bit_index` of bits-typed `node`.
pub fn get_bit_source(
    f: &Fn,
    node: NodeRef,
    bit_index: usize,
    engine: &dyn QueryEngine,
) -> Result<BitSource, OptError> {
    let n = f.get_node(node);
    let width = n.ty.bit_count();
    if bit_index >= width {
        return Err(OptError::invariant(
            node_textual_id(f, node),
            format!("bit index {} too large for {}-bit value", bit_index, width),
        ));
    }
    match &n.payload {
        NodePayload::BitSlice { arg, start, .. } => get_bit_source(f, *arg, bit_index + start, engine),
        NodePayload::Nary(NaryOp::Concat, elems) => {
            let mut offset = 0;
            for operand in elems.iter().rev() {
                let operand_width = f.get_node_ty(*operand).bit_count();
                if bit_index - offset < operand_width {
                    return get_bit_source(f, *operand, bit_index - offset, engine);
                }
                offset += operand_width;
            }
            Err(OptError::invariant(
                node_textual_id(f, node),
                format!("bit index {} not covered by concat operands", bit_index),
            ))
        }
        NodePayload::Literal(value) => {
            let bits = value.to_bits()?;
            Ok(BitSource::Literal(bits.get_bit(bit_index)?))
        }
        _ => {
            let location = TreeBitLocation::new(node, bit_index);
            if n.ty.is_bits() && engine.is_known(f, &location) {
                Ok(BitSource::Literal(engine.is_one(f, &location)))
            } else {
                Ok(BitSource::Node { node, bit_index })
            }
        }
    }
}

/// Memoizes bit sources for the cases of one select while they are
/// scanned bit by bit.
pub struct BitSourceTable<'a> {
    f: &'a Fn,
    engine: &'a dyn QueryEngine,
    cache: HashMap<(NodeRef, usize), BitSource>,
}

impl<'a> BitSourceTable<'a> {
    pub fn new(f: &'a Fn, engine: &'a dyn QueryEngine) -> Self {
        BitSourceTable {
            f,
            engine,
            cache: HashMap::new(),
        }
    }

    pub fn get(&mut self, node: NodeRef, bit_index: usize) -> Result<BitSource, OptError> {
        if let Some(source) = self.cache.get(&(node, bit_index)) {
            return Ok(*source);
        }
        let source = get_bit_source(self.f, node, bit_index, self.engine)?;
        self.cache.insert((node, bit_index), source);
        Ok(source)
    }

    /// Pairs `(i, j)` with `i < j` whose nodes have the same source at
    /// `bit_index`, in lexicographic order.
    pub fn pairs_with_same_source(
        &mut self,
        nodes: &[NodeRef],
        bit_index: usize,
    ) -> Result<Vec<(usize, usize)>, OptError> {
        let sources = nodes
            .iter()
            .map(|n| self.get(*n, bit_index))
            .collect::<Result<Vec<_>, _>>()?;
        let mut pairs = Vec::new();
        for i in 0..sources.len() {
            for j in (i + 1)..sources.len() {
                if sources[i] == sources[j] {
                    pairs.push((i, j));
                }
            }
        }
        Ok(pairs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir_parser::Parser;
    use crate::query_engine::{StatelessQueryEngine, TernaryQueryEngine};
    use pretty_assertions::assert_eq;

    fn routing_fn() -> Fn {
        Parser::new(
            r#"fn f(x: bits[4] id=1, y: bits[4] id=2) -> bits[6] {
  literal.3: bits[2] = literal(value=0b10, id=3)
  concat.4: bits[10] = concat(x, literal.3, y, id=4)
  bit_slice.5: bits[6] = bit_slice(concat.4, start=3, width=6, id=5)
  and.6: bits[4] = and(x, y, id=6)
  ret bit_slice.7: bits[6] = bit_slice(bit_slice.5, start=0, width=6, id=7)
}"#,
        )
        .parse_fn()
        .unwrap()
    }

    #[test]
    fn test_traces_through_slices_and_concats() {
        let f = routing_fn();
        let engine = StatelessQueryEngine::new();
        let slice = NodeRef { index: 7 };
        let x = NodeRef { index: 1 };
        let y = NodeRef { index: 2 };
        // slice bit 0 = concat bit 3 = y[3]
        assert_eq!(
            get_bit_source(&f, slice, 0, &engine).unwrap(),
            BitSource::Node { node: y, bit_index: 3 }
        );
        // slice bits 1 and 2 = concat bits 4, 5 = literal 0b10
        assert_eq!(get_bit_source(&f, slice, 1, &engine).unwrap(), BitSource::Literal(false));
        assert_eq!(get_bit_source(&f, slice, 2, &engine).unwrap(), BitSource::Literal(true));
        // slice bit 5 = concat bit 8 = x[2]
        assert_eq!(
            get_bit_source(&f, slice, 5, &engine).unwrap(),
            BitSource::Node { node: x, bit_index: 2 }
        );
        assert_eq!(
            get_bit_source(&f, slice, 5, &engine).unwrap().to_string(&f),
            "x[2]"
        );
    }

    #[test]
    fn test_known_bits_become_literals() {
        let f = Parser::new(
            r#"fn f(x: bits[4] id=1) -> bits[4] {
  literal.2: bits[4] = literal(value=0b0011, id=2)
  ret and.3: bits[4] = and(x, literal.2, id=3)
}"#,
        )
        .parse_fn()
        .unwrap();
        let mut engine = TernaryQueryEngine::new();
        engine.populate(&f).unwrap();
        let and = NodeRef { index: 3 };
        assert_eq!(get_bit_source(&f, and, 3, &engine).unwrap(), BitSource::Literal(false));
        assert_eq!(
            get_bit_source(&f, and, 0, &engine).unwrap(),
            BitSource::Node { node: and, bit_index: 0 }
        );
    }

    #[test]
    fn test_out_of_range_bit_is_invariant_error() {
        let f = routing_fn();
        let err = get_bit_source(&f, NodeRef { index: 7 }, 6, &StatelessQueryEngine::new()).unwrap_err();
        assert!(err.is_invariant());
    }

    #[test]
    fn test_pairs_with_same_source() {
        let f = routing_fn();
        let engine = StatelessQueryEngine::new();
        let mut table = BitSourceTable::new(&f, &engine);
        let x = NodeRef { index: 1 };
        let concat = NodeRef { index: 4 };
        let and = NodeRef { index: 6 };
        assert_eq!(
            table.pairs_with_same_source(&[x, and, concat], 0).unwrap(),
            Vec::<(usize, usize)>::new()
        );
        assert_eq!(
            table.pairs_with_same_source(&[concat, and, x], 3).unwrap(),
            Vec::<(usize, usize)>::new()
        );
        let slice = NodeRef { index: 5 };
        // slice bit 3 = concat bit 6 = x[0], which differs from x[3]
        assert_eq!(
            table.pairs_with_same_source(&[slice, and, x], 3).unwrap(),
            Vec::<(usize, usize)>::new()
        );
        assert_eq!(
            table.pairs_with_same_source(&[slice, and, slice], 3).unwrap(),
            vec![(0, 2)]
        );
    }
}
