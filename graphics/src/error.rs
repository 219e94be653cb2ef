//! Error types for graph construction, compilation and execution.

use thiserror::Error;

use crate::device::DeviceHandle;
use crate::executor::FrameReport;
use crate::graph::{NodeHandle, NodeTypeId, Port, PortType};
use crate::loops::LoopId;

/// Errors from loop registration.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LoopError {
    #[error("a loop named '{0}' is already registered")]
    DuplicateName(String),

    #[error("invalid configuration for loop '{name}': {reason}")]
    InvalidConfig { name: String, reason: String },
}

/// Errors from editing a [`RenderGraph`](crate::graph::RenderGraph).
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GraphError {
    #[error("unknown node type {0:?}")]
    UnknownNodeType(NodeTypeId),

    #[error("a node type named '{0}' is already registered")]
    DuplicateTypeName(String),

    #[error("a node named '{0}' already exists")]
    DuplicateNodeName(String),

    #[error("node type '{type_name}' allows at most {max} instances")]
    MaxInstancesExceeded { type_name: String, max: u32 },

    #[error("invalid node handle {0:?}")]
    InvalidNode(NodeHandle),

    #[error("node '{node}' has no port {port}")]
    InvalidPort { node: String, port: Port },

    #[error("cannot connect {from} to {to}")]
    PortKindMismatch { from: Port, to: Port },

    #[error("port type mismatch: {found} output cannot feed {expected} input")]
    PortTypeMismatch { expected: PortType, found: PortType },

    #[error("{port} of node '{node}' already has a producer")]
    InputAlreadyConnected { node: String, port: Port },

    #[error("invalid parameter '{param}' on node '{node}': {reason}")]
    InvalidParam {
        node: String,
        param: String,
        reason: String,
    },

    #[error("unknown loop {0}")]
    UnknownLoop(LoopId),
}

/// Errors from [`compile`](crate::compiler::compile). No plan is produced.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CompileError {
    #[error("render graph contains a cycle: {}", cycle.join(" -> "))]
    CyclicGraph {
        /// Instance names along the cycle, first name repeated at the end.
        cycle: Vec<String>,
    },

    #[error("unresolved connection {from} -> {to}: {reason}")]
    UnresolvedConnection {
        from: String,
        to: String,
        reason: String,
    },

    #[error("node '{node}' has an unregistered type")]
    UnknownNodeType { node: String },

    #[error("required input '{port}' of node '{node}' is not connected")]
    MissingRequiredInput { node: String, port: String },

    #[error("port type mismatch on {from} -> {to}: expected {expected}, found {found}")]
    PortTypeMismatch {
        from: String,
        to: String,
        expected: PortType,
        found: PortType,
    },

    #[error(
        "node '{node}' inherits conflicting devices {devices:?}; assign a device explicitly"
    )]
    DeviceAffinityConflict {
        node: String,
        devices: Vec<DeviceHandle>,
    },
}

/// Failure reported by a node's behavior.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum NodeError {
    #[error("missing input '{0}'")]
    MissingInput(String),

    #[error("invalid parameter '{name}': {reason}")]
    InvalidParam { name: String, reason: String },

    #[error("cannot write output {index}: {reason}")]
    InvalidOutput { index: usize, reason: String },

    #[error("{0}")]
    Failed(String),
}

/// Errors from [`RenderGraph::execute`](crate::graph::RenderGraph::execute).
#[derive(Debug, Error)]
pub enum ExecuteError {
    #[error("the graph has not been compiled")]
    NotCompiled,

    #[error("the graph changed since it was last compiled")]
    PlanOutdated,

    /// The frame stopped at `node`; remaining instances were skipped.
    #[error("node '{node}' failed: {source}")]
    NodeFailed {
        node: String,
        #[source]
        source: NodeError,
        /// What ran before the failure.
        report: Box<FrameReport>,
    },
}
