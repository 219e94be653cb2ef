//! Built-in node types.
//!
//! Every [`NodeTypeRegistry`](crate::graph::NodeTypeRegistry) starts with
//! these, at the ids reserved in [`NodeTypeId`](crate::graph::NodeTypeId):
//!
//! | Type | Id | Purpose |
//! |------|----|---------|
//! | `LoopBridge` | [`LOOP_BRIDGE`](crate::graph::NodeTypeId::LOOP_BRIDGE) | Publishes a loop on its loop output and its trigger flag as data |
//! | `BoolOp` | [`BOOL_OP`](crate::graph::NodeTypeId::BOOL_OP) | Combines two trigger flags |
//! | `Constant` | [`CONSTANT`](crate::graph::NodeTypeId::CONSTANT) | Fixed boolean |

pub mod bool_op;
pub mod bridge;
pub mod constant;

pub use bool_op::BoolOperation;

use crate::graph::NodeType;

/// Built-in types in reserved id order.
pub(crate) fn builtin_types() -> Vec<NodeType> {
    vec![bridge::node_type(), bool_op::node_type(), constant::node_type()]
}
