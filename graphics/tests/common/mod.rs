//! Shared helpers for the graph integration tests.

#![allow(dead_code)]

use tempograph_core::time::{ManualClock, Timer};
use tempograph_graphics::{
    InputPortSchema, NodeHandle, NodeType, OutputPortSchema, PortType, PortValue, RenderGraph,
    ResourceLifetime, from_fn,
};

/// Install `env_logger` once per test binary.
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// A graph timed by a clock the test advances by hand.
pub fn manual_graph() -> (RenderGraph, ManualClock) {
    init_logging();
    let clock = ManualClock::new();
    let graph = RenderGraph::with_timer(Timer::with_clock(clock.clone()));
    (graph, clock)
}

/// A node type that counts its own invocations on output 0.
pub fn counter_type(name: &str) -> NodeType {
    NodeType::new(name)
        .with_input(InputPortSchema::optional("in", PortType::Resource))
        .with_output(OutputPortSchema::new("count", PortType::Int))
        .with_behavior(|| {
            let mut count = 0i64;
            Box::new(from_fn(move |ctx| {
                count += 1;
                ctx.set_output(0, count)
            }))
        })
}

/// A render pass with one optional resource input and one resource output.
pub fn pass_type(name: &str, lifetime: ResourceLifetime, size_bytes: u64) -> NodeType {
    NodeType::new(name)
        .with_input(InputPortSchema::optional("in", PortType::Resource))
        .with_output(
            OutputPortSchema::new("out", PortType::Resource)
                .with_lifetime(lifetime)
                .with_size(size_bytes),
        )
}

/// Invocation count published by a [`counter_type`] node.
pub fn count_of(graph: &RenderGraph, node: NodeHandle) -> i64 {
    graph
        .node(node)
        .and_then(|n| n.output(0))
        .and_then(PortValue::as_int)
        .unwrap_or(0)
}
