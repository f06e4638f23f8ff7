// SPDX-License-Identifier: Apache-2.0

//! Name/id environment used while parsing function bodies.

use std::collections::HashMap;

use crate::ir::NodeRef;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NameOrId {
    Name(String),
    Id(usize),
}

impl std::fmt::Display for NameOrId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NameOrId::Name(name) => write!(f, "{}", name),
            NameOrId::Id(id) => write!(f, "id {}", id),
        }
    }
}

#[derive(Debug, Default)]
pub struct IrNodeEnv {
    name_to_node: HashMap<String, NodeRef>,
    id_to_node: HashMap<usize, NodeRef>,
}

impl IrNodeEnv {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a node under its textual `id` and, optionally, a `name`.
    ///
    /// Returns an error message if the id was already taken.
    pub fn add(&mut self, name: Option<String>, id: usize, node: NodeRef) -> Result<(), String> {
        if id == 0 {
            return Err(format!("invalid node id {}, must be greater than zero", id));
        }
        log::trace!(
            "IrNodeEnv::add; name: {:?}; id: {}; node: {:?}",
            name,
            id,
            node
        );
        if let Some(previous) = self.id_to_node.insert(id, node) {
            return Err(format!(
                "duplicate node id {} (previously node index {})",
                id, previous.index
            ));
        }
        if let Some(name) = name {
            self.name_to_node.insert(name, node);
        }
        Ok(())
    }

    /// Looks up a node by `name` or, for unnamed nodes referred to as
    /// `operator.id`, by the numeric `id`.
    pub fn name_id_to_ref(&self, key: &NameOrId) -> Option<NodeRef> {
        match key {
            NameOrId::Id(id) => self.id_to_node.get(id).copied(),
            NameOrId::Name(name) => self.name_to_node.get(name.as_str()).copied(),
        }
    }
}
