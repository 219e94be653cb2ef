//! `Constant`: a fixed boolean, handy for forcing gates open or shut.

use crate::error::NodeError;
use crate::executor::{ExecuteContext, NodeBehavior};
use crate::graph::{NodeType, NodeTypeFlags, OutputPortSchema, PortType, PortValue};

pub const TYPE_NAME: &str = "Constant";
pub const VALUE_PARAM: &str = "value";

pub(crate) fn node_type() -> NodeType {
    NodeType::new(TYPE_NAME)
        .with_output(OutputPortSchema::new("value", PortType::Bool))
        .with_flags(NodeTypeFlags::SUPPORTS_INSTANCING | NodeTypeFlags::COMBINATIONAL)
        .with_default_param(VALUE_PARAM, false)
        .with_behavior(|| Box::new(Constant))
        .with_param_validator(validate)
}

fn validate(name: &str, value: &PortValue) -> Result<(), String> {
    if name == VALUE_PARAM && value.as_bool().is_none() {
        return Err(format!("expected a bool, got {:?}", value));
    }
    Ok(())
}

struct Constant;

impl NodeBehavior for Constant {
    fn execute(&mut self, ctx: &mut ExecuteContext<'_>) -> Result<(), NodeError> {
        let value = ctx
            .param(VALUE_PARAM)
            .and_then(PortValue::as_bool)
            .unwrap_or(false);
        ctx.set_output(0, value)
    }
}
