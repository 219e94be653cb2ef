//! What a node sees while it executes.

use std::collections::BTreeMap;
use std::fmt;

use crate::device::DeviceHandle;
use crate::error::NodeError;
use crate::graph::{NodeHandle, OutputPortSchema, PortValue};
use crate::loops::{LoopId, LoopManager};

/// Work performed by a node instance.
///
/// Under [`CatchupMode::MultipleSteps`](crate::loops::CatchupMode::MultipleSteps)
/// a behavior may run several times per frame. Every call is an independent
/// logical step and reads its timing from [`ExecuteContext::step`].
pub trait NodeBehavior: Send {
    fn execute(&mut self, ctx: &mut ExecuteContext<'_>) -> Result<(), NodeError>;
}

/// [`NodeBehavior`] backed by a closure. Built with [`from_fn`].
pub struct FnBehavior<F>(F);

impl<F> NodeBehavior for FnBehavior<F>
where
    F: FnMut(&mut ExecuteContext<'_>) -> Result<(), NodeError> + Send,
{
    fn execute(&mut self, ctx: &mut ExecuteContext<'_>) -> Result<(), NodeError> {
        (self.0)(ctx)
    }
}

impl<F> fmt::Debug for FnBehavior<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FnBehavior")
    }
}

/// Wrap a closure as a [`NodeBehavior`].
///
/// ```ignore
/// graph.set_behavior(simulate, from_fn(|ctx| {
///     world.step(ctx.delta_time());
///     Ok(())
/// }))?;
/// ```
pub fn from_fn<F>(f: F) -> FnBehavior<F>
where
    F: FnMut(&mut ExecuteContext<'_>) -> Result<(), NodeError> + Send,
{
    FnBehavior(f)
}

/// Timing of one invocation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepInfo {
    /// First triggered loop among the node's subscriptions, if any.
    pub loop_id: Option<LoopId>,
    /// The driving loop's delta, or the frame delta without one.
    pub delta_time: f64,
    /// The driving loop's step count, or the frame index without one.
    pub step_count: u64,
    /// Whether this invocation belongs to a catch-up pass.
    pub catchup: bool,
}

static EMPTY: PortValue = PortValue::Empty;

/// Inputs, parameters and outputs of the executing instance.
pub struct ExecuteContext<'a> {
    pub(super) node: NodeHandle,
    pub(super) name: &'a str,
    pub(super) device: DeviceHandle,
    pub(super) frame: u64,
    pub(super) step: StepInfo,
    pub(super) params: &'a BTreeMap<String, PortValue>,
    pub(super) inputs: &'a [PortValue],
    pub(super) outputs: &'a mut [PortValue],
    pub(super) output_schema: &'a [OutputPortSchema],
    pub(super) loops: Option<&'a LoopManager>,
}

impl<'a> ExecuteContext<'a> {
    pub fn node(&self) -> NodeHandle {
        self.node
    }

    pub fn name(&self) -> &str {
        self.name
    }

    /// Device the compiler assigned to this instance.
    pub fn device(&self) -> DeviceHandle {
        self.device
    }

    pub fn frame(&self) -> u64 {
        self.frame
    }

    pub fn step(&self) -> StepInfo {
        self.step
    }

    pub fn delta_time(&self) -> f64 {
        self.step.delta_time
    }

    pub fn step_count(&self) -> u64 {
        self.step.step_count
    }

    pub fn is_catchup(&self) -> bool {
        self.step.catchup
    }

    pub fn param(&self, name: &str) -> Option<&PortValue> {
        self.params.get(name)
    }

    /// Value at data input `index`; [`PortValue::Empty`] when unconnected.
    pub fn input(&self, index: usize) -> &PortValue {
        self.inputs.get(index).unwrap_or(&EMPTY)
    }

    /// Like [`input`](Self::input) but fails if nothing has been produced.
    pub fn require_input(&self, index: usize) -> Result<&PortValue, NodeError> {
        match self.inputs.get(index) {
            Some(value) if !value.is_empty() => Ok(value),
            _ => Err(NodeError::MissingInput(format!("{}[{}]", self.name, index))),
        }
    }

    pub fn output(&self, index: usize) -> Option<&PortValue> {
        self.outputs.get(index)
    }

    /// Write output `index`, checking the value against the port schema.
    pub fn set_output(&mut self, index: usize, value: impl Into<PortValue>) -> Result<(), NodeError> {
        let value = value.into();
        let schema = self
            .output_schema
            .get(index)
            .ok_or_else(|| NodeError::InvalidOutput {
                index,
                reason: "no such output".into(),
            })?;
        if !value.fits(schema.ty) {
            return Err(NodeError::InvalidOutput {
                index,
                reason: format!("'{}' expects {}, got {:?}", schema.name, schema.ty, value),
            });
        }
        if let Some(slot) = self.outputs.get_mut(index) {
            *slot = value;
        }
        Ok(())
    }

    /// The graph's loops. Only available to node types declaring
    /// [`NEEDS_LOOP_ACCESS`](crate::graph::NodeTypeFlags::NEEDS_LOOP_ACCESS).
    pub fn loops(&self) -> Option<&'a LoopManager> {
        self.loops
    }
}
