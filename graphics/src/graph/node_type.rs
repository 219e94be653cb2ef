//! Node type schemas and their registry.

use std::collections::{BTreeMap, HashMap};

use bitflags::bitflags;

use crate::error::GraphError;
use crate::executor::NodeBehavior;
use crate::nodes;

use super::value::{PortType, PortValue};

/// Identifier of a registered [`NodeType`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeTypeId(u32);

impl NodeTypeId {
    /// Built-in [`LoopBridge`](crate::nodes::bridge) type.
    pub const LOOP_BRIDGE: Self = Self(0);
    /// Built-in boolean composition type.
    pub const BOOL_OP: Self = Self(1);
    /// Built-in boolean constant type.
    pub const CONSTANT: Self = Self(2);

    pub(crate) const fn new(index: u32) -> Self {
        Self(index)
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

bitflags! {
    /// Behavioral traits of a node type.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct NodeTypeFlags: u32 {
        /// Instances with identical configuration may share one pipeline object.
        const SUPPORTS_INSTANCING = 1 << 0;
        /// Side-effect free; recomputed on every pass regardless of gating.
        const COMBINATIONAL = 1 << 1;
        /// Receives the graph's [`LoopManager`](crate::loops::LoopManager) when executed.
        const NEEDS_LOOP_ACCESS = 1 << 2;
    }
}

impl Default for NodeTypeFlags {
    fn default() -> Self {
        Self::SUPPORTS_INSTANCING
    }
}

/// Storage class of an output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ResourceLifetime {
    /// Supplied from outside the graph, never allocated by the compiler.
    Variable,
    /// Owned by the producing instance and consumed downstream.
    #[default]
    Product,
    /// Dead after its last consumer in the same frame; may alias other transients.
    Transient,
    /// Kept across frames, allocated once.
    Persistent,
}

/// Schema of one input port.
#[derive(Debug, Clone, PartialEq)]
pub struct InputPortSchema {
    pub name: String,
    pub ty: PortType,
    /// Optional inputs may stay unconnected.
    pub optional: bool,
}

impl InputPortSchema {
    /// A required input.
    pub fn new(name: impl Into<String>, ty: PortType) -> Self {
        Self {
            name: name.into(),
            ty,
            optional: false,
        }
    }

    pub fn optional(name: impl Into<String>, ty: PortType) -> Self {
        Self {
            optional: true,
            ..Self::new(name, ty)
        }
    }
}

/// Schema of one output port.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputPortSchema {
    pub name: String,
    pub ty: PortType,
    pub lifetime: ResourceLifetime,
    /// Storage footprint used for aliasing decisions.
    pub size_bytes: u64,
}

impl OutputPortSchema {
    pub fn new(name: impl Into<String>, ty: PortType) -> Self {
        Self {
            name: name.into(),
            ty,
            lifetime: ResourceLifetime::default(),
            size_bytes: 0,
        }
    }

    pub fn with_lifetime(mut self, lifetime: ResourceLifetime) -> Self {
        self.lifetime = lifetime;
        self
    }

    pub fn with_size(mut self, size_bytes: u64) -> Self {
        self.size_bytes = size_bytes;
        self
    }
}

/// Creates the default behavior of a new instance.
pub type BehaviorFactory = fn() -> Box<dyn NodeBehavior>;

/// Checks a parameter value before it is stored on an instance.
pub type ParamValidator = fn(name: &str, value: &PortValue) -> Result<(), String>;

/// Schema of a category of work.
///
/// # Example
///
/// ```ignore
/// let blur = NodeType::new("Blur")
///     .with_input(InputPortSchema::new("source", PortType::Resource))
///     .with_output(
///         OutputPortSchema::new("blurred", PortType::Resource)
///             .with_lifetime(ResourceLifetime::Transient)
///             .with_size(8 << 20),
///     )
///     .with_pipeline_param("kernel_size")
///     .with_max_instances(16);
/// let blur_id = graph.register_node_type(blur)?;
/// ```
#[derive(Debug, Clone)]
pub struct NodeType {
    id: NodeTypeId,
    name: String,
    inputs: Vec<InputPortSchema>,
    outputs: Vec<OutputPortSchema>,
    flags: NodeTypeFlags,
    max_instances: Option<u32>,
    pipeline_params: Vec<String>,
    default_params: BTreeMap<String, PortValue>,
    behavior: Option<BehaviorFactory>,
    validator: Option<ParamValidator>,
}

impl NodeType {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: NodeTypeId(0),
            name: name.into(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            flags: NodeTypeFlags::default(),
            max_instances: None,
            pipeline_params: Vec::new(),
            default_params: BTreeMap::new(),
            behavior: None,
            validator: None,
        }
    }

    pub fn with_input(mut self, port: InputPortSchema) -> Self {
        self.inputs.push(port);
        self
    }

    pub fn with_output(mut self, port: OutputPortSchema) -> Self {
        self.outputs.push(port);
        self
    }

    pub fn with_flags(mut self, flags: NodeTypeFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn with_instancing(mut self, enabled: bool) -> Self {
        self.flags.set(NodeTypeFlags::SUPPORTS_INSTANCING, enabled);
        self
    }

    pub fn with_max_instances(mut self, max: u32) -> Self {
        self.max_instances = Some(max);
        self
    }

    /// Mark a parameter as affecting the pipeline object, so instances that
    /// differ in it land in different pipeline groups.
    pub fn with_pipeline_param(mut self, name: impl Into<String>) -> Self {
        self.pipeline_params.push(name.into());
        self
    }

    pub fn with_default_param(mut self, name: impl Into<String>, value: impl Into<PortValue>) -> Self {
        self.default_params.insert(name.into(), value.into());
        self
    }

    pub fn with_behavior(mut self, factory: BehaviorFactory) -> Self {
        self.behavior = Some(factory);
        self
    }

    pub fn with_param_validator(mut self, validator: ParamValidator) -> Self {
        self.validator = Some(validator);
        self
    }

    pub fn id(&self) -> NodeTypeId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn inputs(&self) -> &[InputPortSchema] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[OutputPortSchema] {
        &self.outputs
    }

    pub fn flags(&self) -> NodeTypeFlags {
        self.flags
    }

    pub fn supports_instancing(&self) -> bool {
        self.flags.contains(NodeTypeFlags::SUPPORTS_INSTANCING)
    }

    pub fn is_combinational(&self) -> bool {
        self.flags.contains(NodeTypeFlags::COMBINATIONAL)
    }

    pub fn needs_loop_access(&self) -> bool {
        self.flags.contains(NodeTypeFlags::NEEDS_LOOP_ACCESS)
    }

    pub fn max_instances(&self) -> Option<u32> {
        self.max_instances
    }

    pub fn pipeline_params(&self) -> &[String] {
        &self.pipeline_params
    }

    pub fn is_pipeline_param(&self, name: &str) -> bool {
        self.pipeline_params.iter().any(|p| p == name)
    }

    pub fn default_params(&self) -> &BTreeMap<String, PortValue> {
        &self.default_params
    }

    pub(crate) fn create_behavior(&self) -> Option<Box<dyn NodeBehavior>> {
        self.behavior.map(|factory| factory())
    }

    pub(crate) fn validate_param(&self, name: &str, value: &PortValue) -> Result<(), String> {
        match self.validator {
            Some(validator) => validator(name, value),
            None => Ok(()),
        }
    }
}

/// Registry of node types, indexed by [`NodeTypeId`].
///
/// A new registry already holds the built-in types at their reserved ids
/// ([`NodeTypeId::LOOP_BRIDGE`], [`NodeTypeId::BOOL_OP`], [`NodeTypeId::CONSTANT`]).
#[derive(Debug, Clone)]
pub struct NodeTypeRegistry {
    types: Vec<NodeType>,
    by_name: HashMap<String, NodeTypeId>,
}

impl NodeTypeRegistry {
    pub fn new() -> Self {
        let mut registry = Self {
            types: Vec::new(),
            by_name: HashMap::new(),
        };
        for node_type in nodes::builtin_types() {
            // Built-in names are distinct, registration cannot fail.
            let _ = registry.register(node_type);
        }
        registry
    }

    /// Register a type, assigning it the next id.
    pub fn register(&mut self, mut node_type: NodeType) -> Result<NodeTypeId, GraphError> {
        if self.by_name.contains_key(&node_type.name) {
            return Err(GraphError::DuplicateTypeName(node_type.name));
        }
        let id = NodeTypeId(self.types.len() as u32);
        node_type.id = id;
        self.by_name.insert(node_type.name.clone(), id);
        self.types.push(node_type);
        Ok(id)
    }

    pub fn get(&self, id: NodeTypeId) -> Option<&NodeType> {
        self.types.get(id.index())
    }

    pub fn id_by_name(&self, name: &str) -> Option<NodeTypeId> {
        self.by_name.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &NodeType> {
        self.types.iter()
    }
}

impl Default for NodeTypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}
