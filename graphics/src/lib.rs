//! # Tempograph Graphics
//!
//! Render graph compiler and multi-rate loop executor.
//!
//! ## Overview
//!
//! This crate provides:
//! - [`RenderGraph`] - Node instances, their connections and update loops
//! - [`compiler`] - Ordering, device affinity, transfers, resource aliasing and pipeline groups
//! - [`loops`] - Fixed-timestep and variable-rate loops with catch-up policies
//! - [`executor`] - Per-frame gated execution of the compiled plan
//! - [`nodes`] - Built-in loop bridge, boolean composition and constant nodes
//!
//! GPU work stays outside: node work is supplied as [`NodeBehavior`]
//! implementations and devices are opaque [`DeviceHandle`]s.
//!
//! ## Example
//!
//! ```ignore
//! use tempograph_graphics::{BoolOperation, FrameContext, LoopConfig, Port, RenderGraph};
//!
//! let mut graph = RenderGraph::new();
//! let physics = graph.register_loop(LoopConfig::fixed("physics", 1.0 / 60.0))?;
//! let network = graph.register_loop(LoopConfig::fixed("network", 1.0 / 20.0))?;
//!
//! let pb = graph.add_loop_bridge("physics_bridge", physics)?;
//! let nb = graph.add_loop_bridge("network_bridge", network)?;
//! let both = graph.add_bool_op("both", BoolOperation::And)?;
//! graph.connect(pb, Port::Data(0), both, Port::Data(0))?;
//! graph.connect(nb, Port::Data(0), both, Port::Data(1))?;
//! graph.connect(both, Port::Data(0), replicate, Port::Gate)?;
//!
//! graph.compile()?;
//! loop {
//!     let report = graph.execute(FrameContext::default())?;
//! }
//! ```

pub mod compiler;
pub mod device;
pub mod error;
pub mod executor;
pub mod graph;
pub mod loops;
pub mod nodes;

// Re-export main types for convenience
pub use compiler::{CompilerConfig, ExecutionPlan, PlanStep};
pub use device::DeviceHandle;
pub use error::{CompileError, ExecuteError, GraphError, LoopError, NodeError};
pub use executor::{ExecuteContext, FrameContext, FrameReport, NodeBehavior, from_fn};
pub use graph::{
    InputPortSchema, NodeHandle, NodeType, NodeTypeFlags, NodeTypeId, OutputPortSchema, Port,
    PortType, PortValue, RenderGraph, ResourceLifetime,
};
pub use loops::{CatchupMode, LoopConfig, LoopId, LoopManager, LoopReference};
pub use nodes::BoolOperation;

/// Graphics library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize the graphics subsystem.
pub fn init() {
    log::info!("Tempograph Graphics v{} initialized", VERSION);
}
