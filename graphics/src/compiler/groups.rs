//! Pipeline group generation.
//!
//! Instances of one node type whose port types and pipeline-relevant
//! parameters match can share a pipeline object. Groups are numbered in plan
//! order of their first member, so an unchanged graph always yields the same
//! group ids and key hashes.

use std::collections::HashMap;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use crate::graph::{NodeHandle, NodeInstance, NodeType, NodeTypeId, PortType, ValueKey};

/// Index into [`ExecutionPlan::pipeline_groups`](super::ExecutionPlan::pipeline_groups).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GroupId(u32);

impl GroupId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Instances sharing one pipeline object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineGroup {
    pub id: GroupId,
    pub type_id: NodeTypeId,
    /// Hash of the grouping key; stable for an unchanged configuration.
    pub key_hash: u64,
    /// Members in plan order.
    pub members: Vec<NodeHandle>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct PipelineKey {
    type_id: NodeTypeId,
    inputs: Vec<PortType>,
    outputs: Vec<PortType>,
    params: Vec<(String, ValueKey)>,
    /// Set for types without instancing so every instance keys uniquely.
    exclusive: Option<NodeHandle>,
}

impl PipelineKey {
    fn new(node_type: &NodeType, instance: &NodeInstance) -> Self {
        let params = node_type
            .pipeline_params()
            .iter()
            .map(|name| {
                let value = instance
                    .param(name)
                    .map_or(ValueKey::Empty, |value| value.key());
                (name.clone(), value)
            })
            .collect();
        Self {
            type_id: node_type.id(),
            inputs: node_type.inputs().iter().map(|port| port.ty).collect(),
            outputs: node_type.outputs().iter().map(|port| port.ty).collect(),
            params,
            exclusive: (!node_type.supports_instancing()).then_some(instance.handle()),
        }
    }

    fn stable_hash(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.hash(&mut hasher);
        hasher.finish()
    }
}

/// Group `members` (in plan order). Returns groups and each member's group.
pub(super) fn build_groups<'a>(
    members: impl IntoIterator<Item = (&'a NodeType, &'a NodeInstance)>,
) -> (Vec<PipelineGroup>, Vec<(NodeHandle, GroupId)>) {
    let mut groups: Vec<PipelineGroup> = Vec::new();
    let mut by_key: HashMap<PipelineKey, GroupId> = HashMap::new();
    let mut assignment = Vec::new();

    for (node_type, instance) in members {
        let key = PipelineKey::new(node_type, instance);
        let id = match by_key.get(&key) {
            Some(&id) => id,
            None => {
                let id = GroupId(groups.len() as u32);
                groups.push(PipelineGroup {
                    id,
                    type_id: key.type_id,
                    key_hash: key.stable_hash(),
                    members: Vec::new(),
                });
                by_key.insert(key, id);
                id
            }
        };
        groups[id.index()].members.push(instance.handle());
        assignment.push((instance.handle(), id));
    }
    (groups, assignment)
}
