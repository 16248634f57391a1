use crate::{DynEntity, GraphNode};
use std::collections::HashMap;
use unitwork_types::KeyValue;

/// Keys assigned by a backend to nodes that arrived with unset keys.
///
/// Nodes are identified by their address within the caller's graph (plus
/// their type, since a node embedded at offset zero shares its parent's
/// address), so the graph must not move between staging and write-back.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyAssignments {
    keys: HashMap<(usize, &'static str), KeyValue>,
}

fn address(node: &dyn GraphNode) -> (usize, &'static str) {
    ((node as *const dyn GraphNode).cast::<()>() as usize, node.entity_type())
}

fn address_mut(node: &mut dyn DynEntity) -> (usize, &'static str) {
    ((node as *const dyn DynEntity).cast::<()>() as usize, node.entity_type())
}

impl KeyAssignments {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn assign(&mut self, node: &dyn GraphNode, key: KeyValue) {
        self.keys.insert(address(node), key);
    }

    pub fn get(&self, node: &dyn GraphNode) -> Option<&KeyValue> {
        self.keys.get(&address(node))
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Merges assignments from a later staging step.
    pub fn extend(&mut self, other: KeyAssignments) {
        self.keys.extend(other.keys);
    }

    /// Writes the assigned keys into `root` and every node reachable through
    /// [`GraphNode::related_mut`]. Returns how many nodes were updated.
    pub fn write_back(&self, root: &mut dyn DynEntity) -> unitwork_types::Result<usize> {
        if self.keys.is_empty() {
            return Ok(0);
        }
        let mut written = 0;
        let mut stack: Vec<&mut dyn DynEntity> = vec![root];
        while let Some(node) = stack.pop() {
            if let Some(key) = self.keys.get(&address_mut(node)) {
                node.assign_key(key)?;
                written += 1;
            }
            stack.extend(node.related_mut());
        }
        Ok(written)
    }
}
