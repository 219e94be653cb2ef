//! Render graph infrastructure.
//!
//! The render graph is the only object application code talks to. It owns
//! the node instances, their connections, the [`LoopManager`] and the
//! currently installed [`ExecutionPlan`].
//!
//! # Architecture
//!
//! | Layer | Type | Purpose |
//! |-------|------|---------|
//! | Schema | [`NodeType`], [`NodeTypeRegistry`] | Ports and instancing limits of a kind of work |
//! | **Graph** | [`RenderGraph`] | Instances, connections, loops (this module) |
//! | Plan | [`ExecutionPlan`] | Ordered, grouped, resource-allocated schedule |
//! | Frame | [`executor`](crate::executor) | Gated walk of the plan once per frame |
//!
//! # Example
//!
//! ```ignore
//! use tempograph_graphics::{FrameContext, LoopConfig, Port, RenderGraph};
//!
//! let mut graph = RenderGraph::new();
//! let physics = graph.register_loop(LoopConfig::fixed("physics", 1.0 / 60.0))?;
//! let bridge = graph.add_loop_bridge("physics_bridge", physics)?;
//!
//! let simulate = graph.create_node(simulate_type, "simulate")?;
//! graph.connect(bridge, Port::LOOP_OUT, simulate, Port::LOOP_IN)?;
//!
//! graph.compile()?;
//! graph.execute(FrameContext::default())?;
//! ```

mod connection;
mod instance;
mod node_type;
mod value;

pub use connection::{Connection, ConnectionKind, Port};
pub use instance::{NodeHandle, NodeInstance};
pub use node_type::{
    BehaviorFactory, InputPortSchema, NodeType, NodeTypeFlags, NodeTypeId, NodeTypeRegistry,
    OutputPortSchema, ParamValidator, ResourceLifetime,
};
pub use value::{PortType, PortValue, ResourceHandle, ValueKey};

use std::collections::HashMap;

use tempograph_core::time::Timer;

use crate::compiler::{self, CompilerConfig, ExecutionPlan};
use crate::device::DeviceHandle;
use crate::error::{CompileError, ExecuteError, GraphError, LoopError};
use crate::executor::{self, FrameContext, FrameReport, NodeBehavior};
use crate::loops::{LoopConfig, LoopId, LoopManager, LoopReference};
use crate::nodes::{self, BoolOperation};

/// A graph of node instances with its loops and compiled plan.
#[derive(Debug)]
pub struct RenderGraph {
    pub(crate) registry: NodeTypeRegistry,
    /// Instance slots indexed by [`NodeHandle`]. Removed nodes leave `None`.
    pub(crate) nodes: Vec<Option<NodeInstance>>,
    names: HashMap<String, NodeHandle>,
    pub(crate) connections: Vec<Connection>,
    pub(crate) loops: LoopManager,
    pub(crate) timer: Timer,
    compiler_config: CompilerConfig,
    pub(crate) plan: Option<ExecutionPlan>,
    /// Set by structural edits made after the installed plan was compiled.
    plan_outdated: bool,
    /// Values carried by transfer steps, indexed by transfer id.
    pub(crate) transfer_values: Vec<PortValue>,
    pub(crate) frame_index: u64,
}

impl RenderGraph {
    /// Create an empty graph timed by the system clock.
    pub fn new() -> Self {
        Self::with_timer(Timer::new())
    }

    /// Create an empty graph timed by `timer`.
    pub fn with_timer(timer: Timer) -> Self {
        Self {
            registry: NodeTypeRegistry::new(),
            nodes: Vec::new(),
            names: HashMap::new(),
            connections: Vec::new(),
            loops: LoopManager::new(),
            timer,
            compiler_config: CompilerConfig::default(),
            plan: None,
            plan_outdated: false,
            transfer_values: Vec::new(),
            frame_index: 0,
        }
    }

    pub fn with_compiler_config(mut self, config: CompilerConfig) -> Self {
        self.compiler_config = config;
        self
    }

    pub fn compiler_config(&self) -> &CompilerConfig {
        &self.compiler_config
    }

    /// Replace the compiler configuration. Takes effect on the next compile.
    pub fn set_compiler_config(&mut self, config: CompilerConfig) {
        self.compiler_config = config;
        self.plan_outdated = true;
    }

    // ------------------------------------------------------------------
    // Loops
    // ------------------------------------------------------------------

    pub fn register_loop(&mut self, config: LoopConfig) -> Result<LoopId, LoopError> {
        self.loops.register_loop(config)
    }

    pub fn loop_reference(&self, id: LoopId) -> Option<&LoopReference> {
        self.loops.loop_reference(id)
    }

    pub fn loops(&self) -> &LoopManager {
        &self.loops
    }

    // ------------------------------------------------------------------
    // Node types and instances
    // ------------------------------------------------------------------

    pub fn register_node_type(&mut self, node_type: NodeType) -> Result<NodeTypeId, GraphError> {
        self.registry.register(node_type)
    }

    pub fn registry(&self) -> &NodeTypeRegistry {
        &self.registry
    }

    /// Create an instance of `type_id` named `name`.
    pub fn create_node(
        &mut self,
        type_id: NodeTypeId,
        name: impl Into<String>,
    ) -> Result<NodeHandle, GraphError> {
        let name = name.into();
        let node_type = self
            .registry
            .get(type_id)
            .ok_or(GraphError::UnknownNodeType(type_id))?;
        if self.names.contains_key(&name) {
            return Err(GraphError::DuplicateNodeName(name));
        }
        if let Some(max) = node_type.max_instances() {
            if self.instance_count(type_id) >= max as usize {
                return Err(GraphError::MaxInstancesExceeded {
                    type_name: node_type.name().to_owned(),
                    max,
                });
            }
        }

        let handle = NodeHandle::new(self.nodes.len() as u32);
        let instance = NodeInstance::new(handle, name.clone(), node_type);
        self.nodes.push(Some(instance));
        self.names.insert(name, handle);
        self.plan_outdated = true;
        Ok(handle)
    }

    /// Create a [`LoopBridge`](crate::nodes::bridge) publishing `loop_id`.
    pub fn add_loop_bridge(
        &mut self,
        name: impl Into<String>,
        loop_id: LoopId,
    ) -> Result<NodeHandle, GraphError> {
        if self.loops.loop_reference(loop_id).is_none() {
            return Err(GraphError::UnknownLoop(loop_id));
        }
        let handle = self.create_node(NodeTypeId::LOOP_BRIDGE, name)?;
        self.set_param(handle, nodes::bridge::LOOP_PARAM, loop_id)?;
        Ok(handle)
    }

    /// Create a boolean composition node.
    pub fn add_bool_op(
        &mut self,
        name: impl Into<String>,
        operation: BoolOperation,
    ) -> Result<NodeHandle, GraphError> {
        let handle = self.create_node(NodeTypeId::BOOL_OP, name)?;
        self.set_param(handle, nodes::bool_op::OPERATION_PARAM, operation.name())?;
        Ok(handle)
    }

    /// Create a boolean constant node.
    pub fn add_constant(
        &mut self,
        name: impl Into<String>,
        value: bool,
    ) -> Result<NodeHandle, GraphError> {
        let handle = self.create_node(NodeTypeId::CONSTANT, name)?;
        self.set_param(handle, nodes::constant::VALUE_PARAM, value)?;
        Ok(handle)
    }

    /// Remove an instance and every connection touching it.
    pub fn remove_node(&mut self, handle: NodeHandle) -> Result<(), GraphError> {
        let instance = self
            .nodes
            .get_mut(handle.index())
            .and_then(Option::take)
            .ok_or(GraphError::InvalidNode(handle))?;
        self.names.remove(instance.name());
        self.connections.retain(|c| !c.touches(handle));
        self.plan_outdated = true;
        Ok(())
    }

    pub fn node(&self, handle: NodeHandle) -> Option<&NodeInstance> {
        self.nodes.get(handle.index()).and_then(Option::as_ref)
    }

    /// Name of `handle`, or an empty string for invalid handles.
    pub(crate) fn node_name(&self, handle: NodeHandle) -> String {
        self.node(handle)
            .map(|n| n.name().to_owned())
            .unwrap_or_default()
    }

    pub(crate) fn node_mut(&mut self, handle: NodeHandle) -> Option<&mut NodeInstance> {
        self.nodes.get_mut(handle.index()).and_then(Option::as_mut)
    }

    /// Live instances in declaration order.
    pub fn nodes(&self) -> impl Iterator<Item = &NodeInstance> {
        self.nodes.iter().flatten()
    }

    pub fn node_count(&self) -> usize {
        self.nodes().count()
    }

    pub fn node_type_of(&self, handle: NodeHandle) -> Option<&NodeType> {
        self.node(handle)
            .and_then(|node| self.registry.get(node.type_id()))
    }

    pub fn instance_by_name(&self, name: &str) -> Option<NodeHandle> {
        self.names.get(name).copied()
    }

    pub fn instances_of_type(&self, type_id: NodeTypeId) -> Vec<NodeHandle> {
        self.nodes()
            .filter(|node| node.type_id() == type_id)
            .map(NodeInstance::handle)
            .collect()
    }

    pub fn instance_count(&self, type_id: NodeTypeId) -> usize {
        self.nodes().filter(|node| node.type_id() == type_id).count()
    }

    /// Set a parameter, after checking it with the type's validator.
    ///
    /// Loop-valued parameters must name a registered loop.
    pub fn set_param(
        &mut self,
        handle: NodeHandle,
        name: &str,
        value: impl Into<PortValue>,
    ) -> Result<(), GraphError> {
        let value = value.into();
        if let Some(loop_id) = value.as_loop() {
            if self.loops.loop_reference(loop_id).is_none() {
                return Err(GraphError::UnknownLoop(loop_id));
            }
        }
        let node = self.node(handle).ok_or(GraphError::InvalidNode(handle))?;
        let node_type = self
            .registry
            .get(node.type_id())
            .ok_or(GraphError::UnknownNodeType(node.type_id()))?;
        node_type
            .validate_param(name, &value)
            .map_err(|reason| GraphError::InvalidParam {
                node: node.name().to_owned(),
                param: name.to_owned(),
                reason,
            })?;
        let affects_plan = node_type.is_pipeline_param(name);

        if let Some(node) = self.node_mut(handle) {
            node.params.insert(name.to_owned(), value);
        }
        if affects_plan {
            self.plan_outdated = true;
        }
        Ok(())
    }

    /// Pin an instance to a device, or clear the pin with `None`.
    pub fn set_device(
        &mut self,
        handle: NodeHandle,
        device: Option<DeviceHandle>,
    ) -> Result<(), GraphError> {
        let node = self.node_mut(handle).ok_or(GraphError::InvalidNode(handle))?;
        node.device = device;
        self.plan_outdated = true;
        Ok(())
    }

    /// Install the work performed when the instance executes.
    pub fn set_behavior(
        &mut self,
        handle: NodeHandle,
        behavior: impl NodeBehavior + 'static,
    ) -> Result<(), GraphError> {
        let node = self.node_mut(handle).ok_or(GraphError::InvalidNode(handle))?;
        node.behavior = Some(Box::new(behavior));
        Ok(())
    }

    // ------------------------------------------------------------------
    // Connections
    // ------------------------------------------------------------------

    /// Connect `from_port` of `from` to `to_port` of `to`.
    ///
    /// Valid pairings are data output to data input, data output to gate, and
    /// loop-out to loop-in. Data inputs and gates accept a single producer;
    /// repeating an existing loop edge is a no-op.
    pub fn connect(
        &mut self,
        from: NodeHandle,
        from_port: Port,
        to: NodeHandle,
        to_port: Port,
    ) -> Result<(), GraphError> {
        let connection = Connection::new(from, from_port, to, to_port);
        let kind = connection.kind().ok_or(GraphError::PortKindMismatch {
            from: from_port,
            to: to_port,
        })?;
        let from_type = self.node_type_of(from).ok_or(GraphError::InvalidNode(from))?;
        let to_type = self.node_type_of(to).ok_or(GraphError::InvalidNode(to))?;
        let invalid_port = |handle: NodeHandle, port: Port| GraphError::InvalidPort {
            node: self.node_name(handle),
            port,
        };

        let (output, expected) = match kind {
            ConnectionKind::Loop => {
                if !self.connections.contains(&connection) {
                    self.connections.push(connection);
                }
                return Ok(());
            }
            ConnectionKind::Data { output, input } => {
                let expected = to_type
                    .inputs()
                    .get(input)
                    .map(|schema| schema.ty)
                    .ok_or_else(|| invalid_port(to, to_port))?;
                (output, expected)
            }
            ConnectionKind::Gate { output } => (output, PortType::Bool),
        };
        let found = from_type
            .outputs()
            .get(output)
            .map(|schema| schema.ty)
            .ok_or_else(|| invalid_port(from, from_port))?;
        if found != expected {
            return Err(GraphError::PortTypeMismatch { expected, found });
        }
        if self
            .connections
            .iter()
            .any(|c| c.to == to && c.to_port == to_port)
        {
            return Err(GraphError::InputAlreadyConnected {
                node: self.node_name(to),
                port: to_port,
            });
        }

        self.connections.push(connection);
        self.plan_outdated = true;
        Ok(())
    }

    /// Remove a connection. Returns `true` if it existed.
    pub fn disconnect(
        &mut self,
        from: NodeHandle,
        from_port: Port,
        to: NodeHandle,
        to_port: Port,
    ) -> bool {
        let target = Connection::new(from, from_port, to, to_port);
        let before = self.connections.len();
        self.connections.retain(|c| *c != target);
        let removed = self.connections.len() != before;
        if removed && target.is_dependency() {
            self.plan_outdated = true;
        }
        removed
    }

    pub fn connections(&self) -> &[Connection] {
        &self.connections
    }

    // ------------------------------------------------------------------
    // Topology queries
    // ------------------------------------------------------------------

    fn dependency_edges(&self) -> impl Iterator<Item = &Connection> {
        self.connections.iter().filter(|c| c.is_dependency())
    }

    /// Direct producers of `handle` over data and gate edges.
    pub fn dependencies(&self, handle: NodeHandle) -> Vec<NodeHandle> {
        let mut result: Vec<NodeHandle> = self
            .dependency_edges()
            .filter(|c| c.to == handle)
            .map(|c| c.from)
            .collect();
        result.sort();
        result.dedup();
        result
    }

    /// Direct consumers of `handle` over data and gate edges.
    pub fn dependents(&self, handle: NodeHandle) -> Vec<NodeHandle> {
        let mut result: Vec<NodeHandle> = self
            .dependency_edges()
            .filter(|c| c.from == handle)
            .map(|c| c.to)
            .collect();
        result.sort();
        result.dedup();
        result
    }

    /// Instances without producers.
    pub fn root_nodes(&self) -> Vec<NodeHandle> {
        self.nodes()
            .map(NodeInstance::handle)
            .filter(|&h| !self.dependency_edges().any(|c| c.to == h))
            .collect()
    }

    /// Instances without consumers.
    pub fn leaf_nodes(&self) -> Vec<NodeHandle> {
        self.nodes()
            .map(NodeInstance::handle)
            .filter(|&h| !self.dependency_edges().any(|c| c.from == h))
            .collect()
    }

    // ------------------------------------------------------------------
    // Compilation
    // ------------------------------------------------------------------

    /// Check that the graph would compile, without installing a plan.
    pub fn validate(&self) -> Result<(), CompileError> {
        compiler::compile(self, &self.compiler_config).map(|_| ())
    }

    /// Compile and install a new plan.
    ///
    /// On failure the previously installed plan (if any) stays in place.
    pub fn compile(&mut self) -> Result<(), CompileError> {
        let plan = compiler::compile(self, &self.compiler_config)?;
        self.transfer_values = vec![PortValue::Empty; plan.transfers().len()];
        self.plan = Some(plan);
        self.plan_outdated = false;
        Ok(())
    }

    pub fn plan(&self) -> Option<&ExecutionPlan> {
        self.plan.as_ref()
    }

    /// Whether a plan is installed and matches the current structure.
    pub fn is_compiled(&self) -> bool {
        self.plan.is_some() && !self.plan_outdated
    }

    /// Names of the plan steps in execution order. Empty before compiling.
    pub fn execution_order(&self) -> Vec<&str> {
        let Some(plan) = &self.plan else {
            return Vec::new();
        };
        plan.order()
            .iter()
            .filter_map(|&step| match step {
                compiler::PlanStep::Node(handle) => self.node(handle).map(NodeInstance::name),
                compiler::PlanStep::Transfer(id) => plan.transfer(id).map(|t| t.label()),
            })
            .collect()
    }

    // ------------------------------------------------------------------
    // Execution
    // ------------------------------------------------------------------

    /// Run one frame. See [`executor`](crate::executor) for the sequence.
    pub fn execute(&mut self, context: FrameContext) -> Result<FrameReport, ExecuteError> {
        if self.plan.is_none() {
            return Err(ExecuteError::NotCompiled);
        }
        if self.plan_outdated {
            return Err(ExecuteError::PlanOutdated);
        }
        executor::execute_frame(self, &context)
    }

    /// Number of frames executed so far.
    pub fn frame_index(&self) -> u64 {
        self.frame_index
    }

    /// Refresh every instance's loop subscriptions from the loop edges.
    pub fn propagate_loops(&mut self) {
        executor::propagate_loops(self);
    }

    /// Gate of `handle` with the current loop state.
    ///
    /// True when the instance has no loop subscriptions, or any subscribed
    /// loop triggered. A connected gate input overrides this with its value.
    pub fn should_execute_this_frame(&self, handle: NodeHandle) -> bool {
        executor::evaluate_gate(self, handle)
    }
}

impl Default for RenderGraph {
    fn default() -> Self {
        Self::new()
    }
}

static_assertions::assert_impl_all!(RenderGraph: Send);
