//! Node instances.

use std::collections::BTreeMap;
use std::fmt;

use crate::device::DeviceHandle;
use crate::executor::NodeBehavior;
use crate::loops::LoopId;

use super::node_type::{NodeType, NodeTypeId};
use super::value::PortValue;

/// Handle to a node instance in a [`RenderGraph`](super::RenderGraph).
///
/// Handles are never reused: a handle to a removed node stays invalid.
/// The index doubles as declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeHandle(u32);

impl NodeHandle {
    pub(crate) fn new(index: u32) -> Self {
        Self(index)
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// A concrete use of a [`NodeType`] in a graph.
pub struct NodeInstance {
    handle: NodeHandle,
    name: String,
    type_id: NodeTypeId,
    /// Explicit device. `None` lets the compiler infer it from producers.
    pub(crate) device: Option<DeviceHandle>,
    pub(crate) params: BTreeMap<String, PortValue>,
    /// Last value written to each output port.
    pub(crate) outputs: Vec<PortValue>,
    /// Loops reaching this instance through loop-input edges, in arrival order.
    pub(crate) connected_loops: Vec<LoopId>,
    pub(crate) behavior: Option<Box<dyn NodeBehavior>>,
}

impl NodeInstance {
    pub(crate) fn new(handle: NodeHandle, name: String, node_type: &NodeType) -> Self {
        Self {
            handle,
            name,
            type_id: node_type.id(),
            device: None,
            params: node_type.default_params().clone(),
            outputs: vec![PortValue::Empty; node_type.outputs().len()],
            connected_loops: Vec::new(),
            behavior: node_type.create_behavior(),
        }
    }

    pub fn handle(&self) -> NodeHandle {
        self.handle
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn type_id(&self) -> NodeTypeId {
        self.type_id
    }

    pub fn device(&self) -> Option<DeviceHandle> {
        self.device
    }

    pub fn param(&self, name: &str) -> Option<&PortValue> {
        self.params.get(name)
    }

    pub fn params(&self) -> &BTreeMap<String, PortValue> {
        &self.params
    }

    pub fn output(&self, index: usize) -> Option<&PortValue> {
        self.outputs.get(index)
    }

    pub fn outputs(&self) -> &[PortValue] {
        &self.outputs
    }

    /// Loops driving this instance, as of the last propagation.
    pub fn connected_loops(&self) -> &[LoopId] {
        &self.connected_loops
    }

    pub fn has_behavior(&self) -> bool {
        self.behavior.is_some()
    }

    /// Add a loop subscription, keeping arrival order. Returns `true` if new.
    pub(crate) fn subscribe(&mut self, loop_id: LoopId) -> bool {
        if self.connected_loops.contains(&loop_id) {
            return false;
        }
        self.connected_loops.push(loop_id);
        true
    }
}

impl fmt::Debug for NodeInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeInstance")
            .field("handle", &self.handle)
            .field("name", &self.name)
            .field("type_id", &self.type_id)
            .field("device", &self.device)
            .field("params", &self.params)
            .field("connected_loops", &self.connected_loops)
            .field("has_behavior", &self.behavior.is_some())
            .finish()
    }
}
