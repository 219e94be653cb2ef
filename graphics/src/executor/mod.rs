//! Per-frame execution of a compiled plan.
//!
//! # Frame sequence
//!
//! | Step | What happens |
//! |------|--------------|
//! | 1 | Frame delta from [`FrameContext::delta_override`] or the graph's timer |
//! | 2 | Frame index advances, [`LoopManager::update_loops`] runs |
//! | 3 | Loop subscriptions propagate along loop edges |
//! | 4 | Main pass: the plan is walked once, gated-off nodes are skipped |
//! | 5 | Catch-up passes while [`LoopManager::take_catchup_step`] succeeds, then [`LoopManager::end_catchup`] |
//! | 6 | Per-loop node time is recorded into the loop references |
//!
//! # Gating
//!
//! Combinational nodes run on every pass. Other nodes run when their gate is
//! open: a connected gate input decides on its own, otherwise a node without
//! loop subscriptions always runs and a subscribed node runs when any of its
//! loops triggered.
//!
//! Catch-up passes rerun combinational nodes, transfers, gated nodes whose gate
//! is open and nodes subscribed to a loop that stepped. Unsubscribed ungated
//! nodes run once per frame.

mod context;

pub use context::{ExecuteContext, FnBehavior, NodeBehavior, StepInfo, from_fn};

use std::collections::BTreeMap;
use std::time::Instant;

use tempograph_core::profiling::{profile_function, profile_message, profile_scope};

use crate::compiler::{ExecutionPlan, PlanStep, ValueSource};
use crate::error::{ExecuteError, NodeError};
use crate::graph::{ConnectionKind, NodeHandle, NodeTypeId, PortValue, RenderGraph};
use crate::loops::LoopId;
use crate::nodes::bridge::LOOP_PARAM;

/// Per-frame input to [`RenderGraph::execute`].
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FrameContext {
    /// Frame time in seconds. `None` reads the graph's timer.
    pub delta_override: Option<f64>,
}

impl FrameContext {
    pub fn with_delta(seconds: f64) -> Self {
        Self {
            delta_override: Some(seconds),
        }
    }
}

/// What happened during one frame.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameReport {
    /// Index of the frame, starting at 1.
    pub frame: u64,
    /// Frame delta before loop normalization.
    pub delta_time: f64,
    /// Nodes that ran in the main pass, in plan order.
    pub executed: Vec<NodeHandle>,
    /// Nodes skipped in the main pass (gated off, or after a failure).
    pub skipped: Vec<NodeHandle>,
    /// Invocations per node across all passes.
    pub invocations: BTreeMap<NodeHandle, u32>,
    pub catchup_passes: u32,
    /// Transfer steps performed across all passes.
    pub transfers: u32,
}

impl FrameReport {
    fn new(frame: u64, delta_time: f64) -> Self {
        Self {
            frame,
            delta_time,
            ..Self::default()
        }
    }

    pub fn invocations_of(&self, node: NodeHandle) -> u32 {
        self.invocations.get(&node).copied().unwrap_or(0)
    }

    pub fn total_invocations(&self) -> u32 {
        self.invocations.values().sum()
    }

    pub fn was_executed(&self, node: NodeHandle) -> bool {
        self.executed.contains(&node)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pass {
    Main,
    Catchup,
}

struct FrameRun {
    report: FrameReport,
    /// Milliseconds spent in nodes driven by each loop, `None` if none ran.
    loop_ms: Vec<Option<f64>>,
}

struct StepFailure {
    node: NodeHandle,
    source: NodeError,
}

// ----------------------------------------------------------------------------
// Frame
// ----------------------------------------------------------------------------

pub(crate) fn execute_frame(
    graph: &mut RenderGraph,
    context: &FrameContext,
) -> Result<FrameReport, ExecuteError> {
    let Some(plan) = graph.plan.take() else {
        return Err(ExecuteError::NotCompiled);
    };
    let result = run_frame(graph, &plan, context);
    graph.plan = Some(plan);
    result
}

fn run_frame(
    graph: &mut RenderGraph,
    plan: &ExecutionPlan,
    context: &FrameContext,
) -> Result<FrameReport, ExecuteError> {
    profile_function!();

    let delta = match context.delta_override {
        Some(delta) => delta,
        None => graph.timer.delta_time(),
    };
    graph.frame_index += 1;
    let frame = graph.frame_index;
    graph.loops.set_current_frame(frame);
    graph.loops.update_loops(delta);
    propagate_loops(graph);

    let mut run = FrameRun {
        report: FrameReport::new(frame, delta),
        loop_ms: vec![None; graph.loops.loop_count()],
    };

    let mut outcome = walk(graph, plan, Pass::Main, &mut run);
    if outcome.is_ok() && graph.loops.has_pending_catchup() {
        profile_message!("catch-up");
    }
    while outcome.is_ok() && graph.loops.take_catchup_step() {
        profile_scope!("catchup_pass");
        run.report.catchup_passes += 1;
        outcome = walk(graph, plan, Pass::Catchup, &mut run);
    }
    graph.loops.end_catchup();

    for (index, ms) in run.loop_ms.iter().enumerate() {
        if let Some(ms) = *ms {
            graph.loops.record_execution_time(LoopId::new(index as u32), ms);
        }
    }

    match outcome {
        Ok(()) => {
            log::trace!(
                "Frame {} done: {} executed, {} skipped, {} catch-up passes",
                frame,
                run.report.executed.len(),
                run.report.skipped.len(),
                run.report.catchup_passes
            );
            Ok(run.report)
        }
        Err(failure) => {
            let node = graph.node_name(failure.node);
            log::warn!("Node '{}' failed on frame {}: {}", node, frame, failure.source);
            Err(ExecuteError::NodeFailed {
                node,
                source: failure.source,
                report: Box::new(run.report),
            })
        }
    }
}

fn walk(
    graph: &mut RenderGraph,
    plan: &ExecutionPlan,
    pass: Pass,
    run: &mut FrameRun,
) -> Result<(), StepFailure> {
    for (position, &step) in plan.order().iter().enumerate() {
        let handle = match step {
            PlanStep::Transfer(id) => {
                let value = plan.transfer(id).map_or(PortValue::Empty, |transfer| {
                    read_value(graph, ValueSource::Output {
                        node: transfer.source,
                        output: transfer.output,
                    })
                });
                if let Some(slot) = graph.transfer_values.get_mut(id.index()) {
                    *slot = value;
                }
                run.report.transfers += 1;
                continue;
            }
            PlanStep::Node(handle) => handle,
        };

        if !should_run(graph, plan, handle, pass) {
            if pass == Pass::Main {
                log::trace!(
                    "Skipping '{}' on frame {}",
                    graph.node_name(handle),
                    graph.frame_index
                );
                run.report.skipped.push(handle);
            }
            continue;
        }

        let started = Instant::now();
        let driving = invoke(graph, plan, handle, pass, run.report.delta_time).map_err(|source| {
            if pass == Pass::Main {
                run.report.skipped.extend(remaining_nodes(plan, position));
            }
            StepFailure {
                node: handle,
                source,
            }
        })?;
        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;

        if pass == Pass::Main {
            run.report.executed.push(handle);
        }
        *run.report.invocations.entry(handle).or_insert(0) += 1;
        if let Some(slot) = driving.and_then(|id| run.loop_ms.get_mut(id.index())) {
            *slot = Some(slot.unwrap_or(0.0) + elapsed_ms);
        }
    }
    Ok(())
}

fn remaining_nodes(plan: &ExecutionPlan, position: usize) -> impl Iterator<Item = NodeHandle> + '_ {
    plan.order()[position + 1..].iter().filter_map(|step| match step {
        PlanStep::Node(handle) => Some(*handle),
        PlanStep::Transfer(_) => None,
    })
}

fn should_run(graph: &RenderGraph, plan: &ExecutionPlan, handle: NodeHandle, pass: Pass) -> bool {
    if graph
        .node_type_of(handle)
        .is_some_and(|node_type| node_type.is_combinational())
    {
        return true;
    }
    match (pass, plan.gate_source(handle)) {
        (Pass::Main, _) => gate_value(graph, Some(plan), handle),
        (Pass::Catchup, Some(source)) => read_bool(graph, source),
        (Pass::Catchup, None) => graph.node(handle).is_some_and(|node| {
            node.connected_loops()
                .iter()
                .any(|&id| graph.loops.is_triggered(id))
        }),
    }
}

/// Run the behavior of `handle`. Returns the loop that drove the invocation.
fn invoke(
    graph: &mut RenderGraph,
    plan: &ExecutionPlan,
    handle: NodeHandle,
    pass: Pass,
    frame_delta: f64,
) -> Result<Option<LoopId>, NodeError> {
    let Some(node) = graph.node(handle) else {
        return Ok(None);
    };
    let driving = node
        .connected_loops()
        .iter()
        .copied()
        .find(|&id| graph.loops.is_triggered(id));
    let catchup = pass == Pass::Catchup;
    let step = match driving.and_then(|id| graph.loops.loop_reference(id)) {
        Some(reference) => StepInfo {
            loop_id: Some(reference.loop_id),
            delta_time: reference.delta_time,
            step_count: reference.step_count,
            catchup,
        },
        None => StepInfo {
            loop_id: None,
            delta_time: frame_delta,
            step_count: graph.frame_index,
            catchup,
        },
    };
    let input_count = graph
        .node_type_of(handle)
        .map_or(0, |node_type| node_type.inputs().len());
    let inputs: Vec<PortValue> = (0..input_count)
        .map(|input| {
            plan.input_source(handle, input)
                .map_or(PortValue::Empty, |source| read_value(graph, source))
        })
        .collect();

    let Some(node) = graph.node_mut(handle) else {
        return Ok(driving);
    };
    let Some(mut behavior) = node.behavior.take() else {
        return Ok(driving);
    };
    let mut outputs = std::mem::take(&mut node.outputs);

    let result = match (graph.node(handle), graph.node_type_of(handle)) {
        (Some(node), Some(node_type)) => {
            let mut ctx = ExecuteContext {
                node: handle,
                name: node.name(),
                device: plan.device_of(handle).unwrap_or_default(),
                frame: graph.frame_index,
                step,
                params: node.params(),
                inputs: &inputs,
                outputs: &mut outputs,
                output_schema: node_type.outputs(),
                loops: node_type.needs_loop_access().then_some(&graph.loops),
            };
            behavior.execute(&mut ctx)
        }
        _ => Ok(()),
    };

    if let Some(node) = graph.node_mut(handle) {
        node.behavior = Some(behavior);
        node.outputs = outputs;
    }
    result.map(|()| driving)
}

fn read_value(graph: &RenderGraph, source: ValueSource) -> PortValue {
    match source {
        ValueSource::Output { node, output } => graph
            .node(node)
            .and_then(|node| node.output(output))
            .cloned()
            .unwrap_or_default(),
        ValueSource::Transfer(id) => graph
            .transfer_values
            .get(id.index())
            .cloned()
            .unwrap_or_default(),
    }
}

/// A gate reading anything but `true` is closed.
fn read_bool(graph: &RenderGraph, source: ValueSource) -> bool {
    read_value(graph, source).as_bool().unwrap_or(false)
}

fn gate_value(graph: &RenderGraph, plan: Option<&ExecutionPlan>, handle: NodeHandle) -> bool {
    if let Some(source) = plan.and_then(|plan| plan.gate_source(handle)) {
        return read_bool(graph, source);
    }
    graph.node(handle).is_some_and(|node| {
        let loops = node.connected_loops();
        loops.is_empty() || loops.iter().any(|&id| graph.loops.is_triggered(id))
    })
}

pub(crate) fn evaluate_gate(graph: &RenderGraph, handle: NodeHandle) -> bool {
    gate_value(graph, graph.plan.as_ref(), handle)
}

// ----------------------------------------------------------------------------
// Loop propagation
// ----------------------------------------------------------------------------

/// Recompute every instance's loop subscriptions from the loop edges.
///
/// A bridge publishes its own loop; any other instance forwards the loops it
/// is subscribed to. Runs until no subscription changes, so chains of loop
/// edges forward transitively and loop-edge cycles terminate.
pub(crate) fn propagate_loops(graph: &mut RenderGraph) {
    for node in graph.nodes.iter_mut().flatten() {
        node.connected_loops.clear();
    }
    let edges: Vec<(NodeHandle, NodeHandle)> = graph
        .connections
        .iter()
        .filter(|c| c.kind() == Some(ConnectionKind::Loop))
        .map(|c| (c.from, c.to))
        .collect();
    if edges.is_empty() {
        return;
    }

    loop {
        let mut changed = false;
        for &(from, to) in &edges {
            let published = published_loops(graph, from);
            if let Some(node) = graph.node_mut(to) {
                for id in published {
                    changed |= node.subscribe(id);
                }
            }
        }
        if !changed {
            break;
        }
    }
}

fn published_loops(graph: &RenderGraph, handle: NodeHandle) -> Vec<LoopId> {
    let Some(node) = graph.node(handle) else {
        return Vec::new();
    };
    if node.type_id() == NodeTypeId::LOOP_BRIDGE {
        node.param(LOOP_PARAM)
            .and_then(PortValue::as_loop)
            .into_iter()
            .collect()
    } else {
        node.connected_loops().to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{InputPortSchema, NodeType, OutputPortSchema, Port, PortType};
    use crate::loops::{CatchupMode, LoopConfig};
    use crate::nodes::BoolOperation;

    fn work_type() -> NodeType {
        NodeType::new("Work")
            .with_input(InputPortSchema::optional("in", PortType::Int))
            .with_output(OutputPortSchema::new("count", PortType::Int))
            .with_behavior(|| {
                let mut count = 0i64;
                Box::new(from_fn(move |ctx| {
                    count += 1;
                    ctx.set_output(0, count)
                }))
            })
    }

    fn setup() -> (RenderGraph, NodeTypeId) {
        let mut graph = RenderGraph::new();
        let work = graph.register_node_type(work_type()).unwrap();
        (graph, work)
    }

    #[test]
    fn test_frames_start_at_one() {
        let (mut graph, work) = setup();
        graph.create_node(work, "w").unwrap();
        graph.compile().unwrap();

        let report = graph.execute(FrameContext::with_delta(0.016)).unwrap();
        assert_eq!(report.frame, 1);
        assert_eq!(graph.frame_index(), 1);
        assert_eq!(graph.loops().current_frame(), 1);
    }

    #[test]
    fn test_unsubscribed_node_runs_every_frame() {
        let (mut graph, work) = setup();
        let w = graph.create_node(work, "w").unwrap();
        graph.compile().unwrap();

        for _ in 0..3 {
            let report = graph.execute(FrameContext::with_delta(0.016)).unwrap();
            assert!(report.was_executed(w));
        }
        assert_eq!(graph.node(w).unwrap().output(0), Some(&PortValue::Int(3)));
    }

    #[test]
    fn test_outputs_flow_to_inputs() {
        let mut graph = RenderGraph::new();
        let source = graph
            .register_node_type(
                NodeType::new("Source")
                    .with_output(OutputPortSchema::new("n", PortType::Int))
                    .with_behavior(|| Box::new(from_fn(|ctx| ctx.set_output(0, 41i64)))),
            )
            .unwrap();
        let sink = graph
            .register_node_type(
                NodeType::new("Sink")
                    .with_input(InputPortSchema::new("n", PortType::Int))
                    .with_output(OutputPortSchema::new("n", PortType::Int))
                    .with_behavior(|| {
                        Box::new(from_fn(|ctx| {
                            let n = ctx.require_input(0)?.as_int().unwrap_or(0);
                            ctx.set_output(0, n + 1)
                        }))
                    }),
            )
            .unwrap();
        let a = graph.create_node(source, "a").unwrap();
        let b = graph.create_node(sink, "b").unwrap();
        graph.connect(a, Port::Data(0), b, Port::Data(0)).unwrap();
        graph.compile().unwrap();

        graph.execute(FrameContext::with_delta(0.016)).unwrap();
        assert_eq!(graph.node(b).unwrap().output(0), Some(&PortValue::Int(42)));
    }

    #[test]
    fn test_loop_gating() {
        let (mut graph, work) = setup();
        let slow = graph.register_loop(LoopConfig::fixed("slow", 0.1)).unwrap();
        let bridge = graph.add_loop_bridge("slow_bridge", slow).unwrap();
        let w = graph.create_node(work, "w").unwrap();
        graph.connect(bridge, Port::LOOP_OUT, w, Port::LOOP_IN).unwrap();
        graph.compile().unwrap();

        let report = graph.execute(FrameContext::with_delta(0.06)).unwrap();
        assert!(report.skipped.contains(&w));
        assert!(!graph.should_execute_this_frame(w));

        let report = graph.execute(FrameContext::with_delta(0.06)).unwrap();
        assert!(report.was_executed(w));
        assert_eq!(graph.node(w).unwrap().connected_loops(), &[slow]);
    }

    #[test]
    fn test_any_triggered_loop_opens_gate() {
        let (mut graph, work) = setup();
        let fast = graph.register_loop(LoopConfig::variable("fast")).unwrap();
        let slow = graph.register_loop(LoopConfig::fixed("slow", 10.0)).unwrap();
        let fb = graph.add_loop_bridge("fast_bridge", fast).unwrap();
        let sb = graph.add_loop_bridge("slow_bridge", slow).unwrap();
        let w = graph.create_node(work, "w").unwrap();
        graph.connect(sb, Port::LOOP_OUT, w, Port::LOOP_IN).unwrap();
        graph.connect(fb, Port::LOOP_OUT, w, Port::LOOP_IN).unwrap();
        graph.compile().unwrap();

        let report = graph.execute(FrameContext::with_delta(0.016)).unwrap();
        assert!(report.was_executed(w));
        // Arrival order follows the loop edges
        assert_eq!(graph.node(w).unwrap().connected_loops(), &[slow, fast]);
    }

    #[test]
    fn test_loops_propagate_transitively() {
        let (mut graph, work) = setup();
        let physics = graph.register_loop(LoopConfig::fixed("physics", 0.1)).unwrap();
        let bridge = graph.add_loop_bridge("bridge", physics).unwrap();
        let a = graph.create_node(work, "a").unwrap();
        let b = graph.create_node(work, "b").unwrap();
        graph.connect(a, Port::LOOP_OUT, b, Port::LOOP_IN).unwrap();
        graph.connect(bridge, Port::LOOP_OUT, a, Port::LOOP_IN).unwrap();

        graph.propagate_loops();
        assert_eq!(graph.node(b).unwrap().connected_loops(), &[physics]);

        graph.disconnect(bridge, Port::LOOP_OUT, a, Port::LOOP_IN);
        graph.propagate_loops();
        assert!(graph.node(b).unwrap().connected_loops().is_empty());
    }

    #[test]
    fn test_gate_overrides_loop_policy() {
        let (mut graph, work) = setup();
        let render = graph.register_loop(LoopConfig::variable("render")).unwrap();
        let bridge = graph.add_loop_bridge("render_bridge", render).unwrap();
        let off = graph.add_constant("off", false).unwrap();
        let w = graph.create_node(work, "w").unwrap();
        graph.connect(bridge, Port::LOOP_OUT, w, Port::LOOP_IN).unwrap();
        graph.connect(off, Port::Data(0), w, Port::Gate).unwrap();
        graph.compile().unwrap();

        let report = graph.execute(FrameContext::with_delta(0.016)).unwrap();
        assert!(report.skipped.contains(&w));
        assert!(report.was_executed(off));
    }

    #[test]
    fn test_and_gate_of_two_loops() {
        let (mut graph, work) = setup();
        let physics = graph.register_loop(LoopConfig::fixed("physics", 0.05)).unwrap();
        let network = graph.register_loop(LoopConfig::fixed("network", 0.1)).unwrap();
        let pb = graph.add_loop_bridge("pb", physics).unwrap();
        let nb = graph.add_loop_bridge("nb", network).unwrap();
        let and = graph.add_bool_op("and", BoolOperation::And).unwrap();
        let w = graph.create_node(work, "w").unwrap();
        graph.connect(pb, Port::Data(0), and, Port::Data(0)).unwrap();
        graph.connect(nb, Port::Data(0), and, Port::Data(1)).unwrap();
        graph.connect(and, Port::Data(0), w, Port::Gate).unwrap();
        graph.compile().unwrap();

        // 0.05: physics only
        let report = graph.execute(FrameContext::with_delta(0.05)).unwrap();
        assert!(!report.was_executed(w));
        // 0.10: both
        let report = graph.execute(FrameContext::with_delta(0.05)).unwrap();
        assert!(report.was_executed(w));
    }

    #[test]
    fn test_multiple_steps_reruns_driven_nodes() {
        let (mut graph, work) = setup();
        let physics = graph.register_loop(LoopConfig::fixed("physics", 0.125)).unwrap();
        let bridge = graph.add_loop_bridge("bridge", physics).unwrap();
        let driven = graph.create_node(work, "driven").unwrap();
        let free = graph.create_node(work, "free").unwrap();
        graph.connect(bridge, Port::LOOP_OUT, driven, Port::LOOP_IN).unwrap();
        graph.compile().unwrap();

        let report = graph.execute(FrameContext::with_delta(0.25)).unwrap();
        assert_eq!(report.catchup_passes, 1);
        assert_eq!(report.invocations_of(driven), 2);
        assert_eq!(report.invocations_of(free), 1);
        assert_eq!(graph.loop_reference(physics).unwrap().step_count, 2);
    }

    #[test]
    fn test_variable_loop_still_triggered_after_catchup() {
        let (mut graph, work) = setup();
        let physics = graph.register_loop(LoopConfig::fixed("physics", 0.1)).unwrap();
        let render = graph.register_loop(LoopConfig::variable("render")).unwrap();
        let bridge = graph.add_loop_bridge("render_bridge", render).unwrap();
        let draw = graph.create_node(work, "draw").unwrap();
        graph.connect(bridge, Port::LOOP_OUT, draw, Port::LOOP_IN).unwrap();
        graph.compile().unwrap();

        let report = graph.execute(FrameContext::with_delta(0.25)).unwrap();
        assert_eq!(report.catchup_passes, 1);
        assert_eq!(report.invocations_of(draw), 1);
        assert_eq!(graph.loop_reference(physics).unwrap().step_count, 2);

        let reference = graph.loop_reference(render).unwrap();
        assert!(reference.should_execute_this_frame);
        assert_eq!(reference.delta_time, 0.25);
        assert!(graph.should_execute_this_frame(draw));
    }

    #[test]
    fn test_catchup_steps_see_fixed_delta() {
        let mut graph = RenderGraph::new();
        let probe = graph
            .register_node_type(NodeType::new("Probe").with_output(OutputPortSchema::new(
                "steps",
                PortType::Text,
            )))
            .unwrap();
        let physics = graph.register_loop(LoopConfig::fixed("physics", 0.125)).unwrap();
        let bridge = graph.add_loop_bridge("bridge", physics).unwrap();
        let p = graph.create_node(probe, "probe").unwrap();
        graph.connect(bridge, Port::LOOP_OUT, p, Port::LOOP_IN).unwrap();
        let mut seen = String::new();
        graph
            .set_behavior(
                p,
                from_fn(move |ctx| {
                    seen.push_str(&format!(
                        "{}:{}:{};",
                        ctx.step_count(),
                        ctx.delta_time(),
                        ctx.is_catchup()
                    ));
                    ctx.set_output(0, seen.clone())
                }),
            )
            .unwrap();
        graph.compile().unwrap();

        graph.execute(FrameContext::with_delta(0.25)).unwrap();
        assert_eq!(
            graph.node(p).unwrap().output(0),
            Some(&PortValue::from("1:0.125:false;2:0.125:true;"))
        );
    }

    #[test]
    fn test_single_corrective_step_runs_once() {
        let (mut graph, work) = setup();
        let physics = graph
            .register_loop(
                LoopConfig::fixed("physics", 0.125)
                    .with_catchup_mode(CatchupMode::SingleCorrectiveStep),
            )
            .unwrap();
        let bridge = graph.add_loop_bridge("bridge", physics).unwrap();
        let driven = graph.create_node(work, "driven").unwrap();
        graph.connect(bridge, Port::LOOP_OUT, driven, Port::LOOP_IN).unwrap();
        graph.compile().unwrap();

        let report = graph.execute(FrameContext::with_delta(0.25)).unwrap();
        assert_eq!(report.catchup_passes, 0);
        assert_eq!(report.invocations_of(driven), 1);
    }

    #[test]
    fn test_node_failure_skips_rest_of_frame() {
        let mut graph = RenderGraph::new();
        let failing = graph
            .register_node_type(
                NodeType::new("Failing")
                    .with_output(OutputPortSchema::new("out", PortType::Int))
                    .with_behavior(|| Box::new(from_fn(|_| Err(NodeError::Failed("boom".into()))))),
            )
            .unwrap();
        let work = graph.register_node_type(work_type()).unwrap();
        let before = graph.create_node(work, "before").unwrap();
        let bad = graph.create_node(failing, "bad").unwrap();
        let after = graph.create_node(work, "after").unwrap();
        graph.connect(bad, Port::Data(0), after, Port::Data(0)).unwrap();
        graph.compile().unwrap();

        let Err(ExecuteError::NodeFailed { node, source, report }) =
            graph.execute(FrameContext::with_delta(0.016))
        else {
            panic!("expected a node failure");
        };
        assert_eq!(node, "bad");
        assert_eq!(source, NodeError::Failed("boom".into()));
        assert_eq!(report.executed, vec![before]);
        assert_eq!(report.skipped, vec![after]);

        // The graph stays usable
        assert!(graph.is_compiled());
        assert!(graph.node(bad).unwrap().has_behavior());
    }

    #[test]
    fn test_execution_time_recorded_for_driving_loop() {
        let (mut graph, work) = setup();
        let render = graph.register_loop(LoopConfig::variable("render")).unwrap();
        let idle = graph.register_loop(LoopConfig::fixed("idle", 100.0)).unwrap();
        let bridge = graph.add_loop_bridge("bridge", render).unwrap();
        let w = graph.create_node(work, "w").unwrap();
        graph.connect(bridge, Port::LOOP_OUT, w, Port::LOOP_IN).unwrap();
        graph.compile().unwrap();

        graph.execute(FrameContext::with_delta(0.016)).unwrap();
        assert!(graph.loop_reference(render).unwrap().last_execution_time_ms >= 0.0);
        assert_eq!(graph.loop_reference(idle).unwrap().last_execution_time_ms, 0.0);
    }
}
