//! `LoopBridge`: exposes a loop to the graph.
//!
//! The bridge's loop output carries the loop in its `loop` parameter, so any
//! node connected to it is subscribed to that loop. Its `triggered` data output
//! carries the loop's `should_execute_this_frame`, which lets boolean nodes
//! compose loops into a custom gate.

use crate::error::NodeError;
use crate::executor::{ExecuteContext, NodeBehavior};
use crate::graph::{NodeType, NodeTypeFlags, OutputPortSchema, PortType, PortValue};

pub const TYPE_NAME: &str = "LoopBridge";
/// Parameter holding the bridged [`LoopId`](crate::loops::LoopId).
pub const LOOP_PARAM: &str = "loop";

pub(crate) fn node_type() -> NodeType {
    NodeType::new(TYPE_NAME)
        .with_output(OutputPortSchema::new("triggered", PortType::Bool))
        .with_flags(
            NodeTypeFlags::SUPPORTS_INSTANCING
                | NodeTypeFlags::COMBINATIONAL
                | NodeTypeFlags::NEEDS_LOOP_ACCESS,
        )
        .with_behavior(|| Box::new(LoopBridge))
        .with_param_validator(validate)
}

fn validate(name: &str, value: &PortValue) -> Result<(), String> {
    if name == LOOP_PARAM && value.as_loop().is_none() {
        return Err(format!("expected a loop, got {:?}", value));
    }
    Ok(())
}

struct LoopBridge;

impl NodeBehavior for LoopBridge {
    fn execute(&mut self, ctx: &mut ExecuteContext<'_>) -> Result<(), NodeError> {
        let id = ctx
            .param(LOOP_PARAM)
            .and_then(PortValue::as_loop)
            .ok_or_else(|| NodeError::InvalidParam {
                name: LOOP_PARAM.into(),
                reason: "no loop assigned".into(),
            })?;
        let triggered = ctx.loops().is_some_and(|loops| loops.is_triggered(id));
        ctx.set_output(0, triggered)
    }
}
