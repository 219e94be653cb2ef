//! Ports and directed edges between node instances.

use std::fmt;

use super::instance::NodeHandle;

/// A port on a node instance.
///
/// Every instance has the two reserved loop ports and a gate input besides the
/// data ports declared by its type. The reserved ports live outside the data
/// index space, so `Data(i)` always refers to the type's schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Port {
    /// Data port at this index of the type's input or output schema.
    Data(usize),
    /// Receives loop subscriptions. Accepts any number of producers.
    LoopInput,
    /// Publishes the loops this instance is driven by (or bridges).
    LoopOutput,
    /// Boolean override of the default loop gating. At most one producer.
    Gate,
}

impl Port {
    pub const LOOP_IN: Self = Self::LoopInput;
    pub const LOOP_OUT: Self = Self::LoopOutput;
}

impl fmt::Display for Port {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Data(index) => write!(f, "data[{index}]"),
            Self::LoopInput => f.write_str("loop-in"),
            Self::LoopOutput => f.write_str("loop-out"),
            Self::Gate => f.write_str("gate"),
        }
    }
}

/// What an edge carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionKind {
    /// Ordinary data dependency.
    Data { output: usize, input: usize },
    /// Loop subscription broadcast. Not an ordering dependency.
    Loop,
    /// Boolean output feeding the destination's gate.
    Gate { output: usize },
}

/// Directed edge from an output of one instance to an input of another.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Connection {
    pub from: NodeHandle,
    pub from_port: Port,
    pub to: NodeHandle,
    pub to_port: Port,
}

impl Connection {
    pub fn new(from: NodeHandle, from_port: Port, to: NodeHandle, to_port: Port) -> Self {
        Self {
            from,
            from_port,
            to,
            to_port,
        }
    }

    /// Classify the port pairing, `None` if the ports cannot be connected.
    pub fn kind(&self) -> Option<ConnectionKind> {
        match (self.from_port, self.to_port) {
            (Port::Data(output), Port::Data(input)) => Some(ConnectionKind::Data { output, input }),
            (Port::LoopOutput, Port::LoopInput) => Some(ConnectionKind::Loop),
            (Port::Data(output), Port::Gate) => Some(ConnectionKind::Gate { output }),
            _ => None,
        }
    }

    /// Whether this edge orders its endpoints (data and gate edges do, loop edges do not).
    pub fn is_dependency(&self) -> bool {
        matches!(
            self.kind(),
            Some(ConnectionKind::Data { .. } | ConnectionKind::Gate { .. })
        )
    }

    pub fn touches(&self, node: NodeHandle) -> bool {
        self.from == node || self.to == node
    }
}
