// SPDX-License-Identifier: Apache-2.0

//! Dead-code elimination: compacts away nodes that the return value does not
//! depend on, including nodes abandoned by rewrites.

use crate::ir::{Fn, Node, NodePayload, NodeRef};
use crate::ir_utils::{compute_liveness, remap_payload_with};
use crate::opt_error::OptError;

/// Returns a new function with dead nodes removed and node indices
/// compacted. Operand references are remapped to the new indices.
///
/// The reserved node 0 and every `GetParam` node are kept so parameters stay
/// at indices `1..=params.len()`.
pub fn remove_dead_nodes(f: &Fn) -> Result<Fn, OptError> {
    let Some(ret) = f.ret_node_ref else {
        return Err(OptError::invariant(
            f.name.clone(),
            "remove_dead_nodes: function has no return node",
        ));
    };
    let mut live = compute_liveness(f);
    for (i, node) in f.nodes.iter().enumerate() {
        if i == 0 || matches!(node.payload, NodePayload::GetParam(_)) {
            live[i] = true;
        }
    }

    let mut mapping: Vec<Option<usize>> = vec![None; f.nodes.len()];
    let mut next: usize = 0;
    for (i, is_live) in live.iter().enumerate() {
        if *is_live {
            mapping[i] = Some(next);
            next += 1;
        }
    }

    let mut new_nodes: Vec<Node> = Vec::with_capacity(next);
    for (i, node) in f.nodes.iter().enumerate() {
        if !live[i] {
            continue;
        }
        let mut missing: Option<usize> = None;
        let payload = remap_payload_with(&node.payload, |(_, nr): (usize, NodeRef)| {
            match mapping[nr.index] {
                Some(ni) => NodeRef { index: ni },
                None => {
                    missing = Some(nr.index);
                    nr
                }
            }
        });
        if let Some(dead_operand) = missing {
            return Err(OptError::invariant(
                format!("{}:{}", f.name, node.text_id),
                format!("live node references dead operand {}", dead_operand),
            ));
        }
        new_nodes.push(Node {
            payload,
            ..node.clone()
        });
    }

    let ret_new = mapping[ret.index].ok_or_else(|| {
        OptError::invariant(f.name.clone(), "return node must be live")
    })?;
    log::debug!(
        "remove_dead_nodes: {} -> {} nodes in {}",
        f.nodes.len(),
        new_nodes.len(),
        f.name
    );
    Ok(Fn {
        name: f.name.clone(),
        params: f.params.clone(),
        ret_ty: f.ret_ty.clone(),
        nodes: new_nodes,
        ret_node_ref: Some(NodeRef { index: ret_new }),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir_parser::Parser;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_remove_dead_nodes_compacts_and_keeps_params() {
        let f = Parser::new(
            r#"fn f(x: bits[4] id=1, unused: bits[4] id=2) -> bits[4] {
  not.3: bits[4] = not(x, id=3)
  identity.4: bits[4] = identity(x, id=4)
  ret not.5: bits[4] = not(identity.4, id=5)
}"#,
        )
        .parse_fn()
        .unwrap();
        let g = remove_dead_nodes(&f).unwrap();
        assert_eq!(g.nodes.len(), 5);
        assert_eq!(g.ret_node_ref, Some(NodeRef { index: 4 }));
        assert_eq!(
            g.to_string(),
            r#"fn f(x: bits[4] id=1, unused: bits[4] id=2) -> bits[4] {
  identity.4: bits[4] = identity(x, id=4)
  ret not.5: bits[4] = not(identity.4, id=5)
}"#
        );
        crate::ir_validate::validate_fn(&g).unwrap();
    }
}
