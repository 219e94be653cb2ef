//! `BoolOp`: combinational boolean composition of two inputs.

use std::fmt;
use std::str::FromStr;

use crate::error::NodeError;
use crate::executor::{ExecuteContext, NodeBehavior};
use crate::graph::{InputPortSchema, NodeType, NodeTypeFlags, OutputPortSchema, PortType, PortValue};

pub const TYPE_NAME: &str = "BoolOp";
/// Parameter naming the [`BoolOperation`].
pub const OPERATION_PARAM: &str = "operation";

/// Boolean operator applied by a `BoolOp` node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BoolOperation {
    #[default]
    And,
    Or,
    Xor,
    /// Negates the first input; the second is ignored.
    Not,
    Nand,
    Nor,
}

impl BoolOperation {
    pub const ALL: [Self; 6] = [
        Self::And,
        Self::Or,
        Self::Xor,
        Self::Not,
        Self::Nand,
        Self::Nor,
    ];

    /// Parameter spelling.
    pub fn name(self) -> &'static str {
        match self {
            Self::And => "AND",
            Self::Or => "OR",
            Self::Xor => "XOR",
            Self::Not => "NOT",
            Self::Nand => "NAND",
            Self::Nor => "NOR",
        }
    }

    pub fn apply(self, a: bool, b: bool) -> bool {
        match self {
            Self::And => a && b,
            Self::Or => a || b,
            Self::Xor => a != b,
            Self::Not => !a,
            Self::Nand => !(a && b),
            Self::Nor => !(a || b),
        }
    }
}

impl fmt::Display for BoolOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for BoolOperation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|op| op.name() == s)
            .ok_or_else(|| format!("unknown operation '{s}'"))
    }
}

pub(crate) fn node_type() -> NodeType {
    NodeType::new(TYPE_NAME)
        .with_input(InputPortSchema::optional("a", PortType::Bool))
        .with_input(InputPortSchema::optional("b", PortType::Bool))
        .with_output(OutputPortSchema::new("result", PortType::Bool))
        .with_flags(NodeTypeFlags::SUPPORTS_INSTANCING | NodeTypeFlags::COMBINATIONAL)
        .with_default_param(OPERATION_PARAM, BoolOperation::default().name())
        .with_behavior(|| Box::new(BoolOpBehavior))
        .with_param_validator(validate)
}

fn validate(name: &str, value: &PortValue) -> Result<(), String> {
    if name != OPERATION_PARAM {
        return Ok(());
    }
    match value.as_text() {
        Some(text) => text.parse::<BoolOperation>().map(|_| ()),
        None => Err(format!("expected an operation name, got {:?}", value)),
    }
}

struct BoolOpBehavior;

impl NodeBehavior for BoolOpBehavior {
    fn execute(&mut self, ctx: &mut ExecuteContext<'_>) -> Result<(), NodeError> {
        let operation = ctx
            .param(OPERATION_PARAM)
            .and_then(PortValue::as_text)
            .unwrap_or_default()
            .parse::<BoolOperation>()
            .map_err(|reason| NodeError::InvalidParam {
                name: OPERATION_PARAM.into(),
                reason,
            })?;
        let a = ctx.input(0).as_bool().unwrap_or(false);
        let b = ctx.input(1).as_bool().unwrap_or(false);
        ctx.set_output(0, operation.apply(a, b))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    use crate::executor::FrameContext;
    use crate::graph::{Port, RenderGraph};

    #[rstest]
    #[case::and(BoolOperation::And, [false, false, false, true])]
    #[case::or(BoolOperation::Or, [false, true, true, true])]
    #[case::xor(BoolOperation::Xor, [false, true, true, false])]
    #[case::not(BoolOperation::Not, [true, true, false, false])]
    #[case::nand(BoolOperation::Nand, [true, true, true, false])]
    #[case::nor(BoolOperation::Nor, [true, false, false, false])]
    fn test_truth_table(#[case] op: BoolOperation, #[case] expected: [bool; 4]) {
        let inputs = [(false, false), (false, true), (true, false), (true, true)];
        for ((a, b), want) in inputs.into_iter().zip(expected) {
            assert_eq!(op.apply(a, b), want, "{op} {a} {b}");
        }
    }

    #[test]
    fn test_parse_round_trip_names() {
        for op in BoolOperation::ALL {
            assert_eq!(op.name().parse::<BoolOperation>(), Ok(op));
        }
        assert!("and".parse::<BoolOperation>().is_err());
    }

    #[test]
    fn test_validator() {
        assert!(validate(OPERATION_PARAM, &PortValue::from("NOR")).is_ok());
        assert!(validate(OPERATION_PARAM, &PortValue::from("MAYBE")).is_err());
        assert!(validate(OPERATION_PARAM, &PortValue::from(true)).is_err());
        assert!(validate("other", &PortValue::from(true)).is_ok());
    }

    #[rstest]
    #[case::both_true(true, true, true)]
    #[case::one_false(true, false, false)]
    fn test_node_in_graph(#[case] a: bool, #[case] b: bool, #[case] expected: bool) {
        let mut graph = RenderGraph::new();
        let ca = graph.add_constant("a", a).unwrap();
        let cb = graph.add_constant("b", b).unwrap();
        let and = graph.add_bool_op("and", BoolOperation::And).unwrap();
        graph.connect(ca, Port::Data(0), and, Port::Data(0)).unwrap();
        graph.connect(cb, Port::Data(0), and, Port::Data(1)).unwrap();
        graph.compile().unwrap();

        graph.execute(FrameContext::with_delta(0.016)).unwrap();
        assert_eq!(graph.node(and).unwrap().output(0), Some(&PortValue::Bool(expected)));
    }

    #[test]
    fn test_missing_inputs_read_false() {
        let mut graph = RenderGraph::new();
        let not = graph.add_bool_op("not", BoolOperation::Not).unwrap();
        let or = graph.add_bool_op("or", BoolOperation::Or).unwrap();
        graph.compile().unwrap();

        graph.execute(FrameContext::with_delta(0.016)).unwrap();
        assert_eq!(graph.node(not).unwrap().output(0), Some(&PortValue::Bool(true)));
        assert_eq!(graph.node(or).unwrap().output(0), Some(&PortValue::Bool(false)));
    }
}
