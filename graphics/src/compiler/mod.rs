//! Render graph compilation.
//!
//! [`compile`] turns a [`RenderGraph`] into an [`ExecutionPlan`]. It reads the
//! graph and never mutates it, and it either produces a complete plan or an
//! error; there are no partial plans.
//!
//! # Passes
//!
//! 1. **Resolution** - Every data and gate connection is checked against the
//!    port schemas of both endpoints. Loop connections are skipped: they carry
//!    subscriptions, not data, and never order nodes.
//! 2. **Topological sort** - Kahn's algorithm over data and gate edges, wave by
//!    wave, ties broken by declaration order. A cycle is reported by name.
//! 3. **Device affinity** - Explicit devices win, the rest inherit from their
//!    producers or fall back to [`CompilerConfig::default_device`].
//! 4. **Transfer insertion** - Cross-device data edges are rerouted through
//!    synthetic transfer steps, then the schedule is sorted again.
//! 5. **Resource allocation** - Resource outputs get storage; transients whose
//!    lifetimes do not overlap share a slot (see [`ResourceTable`]).
//! 6. **Pipeline grouping** - Structurally identical instances share a group.
//!
//! # Example
//!
//! ```ignore
//! let mut graph = RenderGraph::new();
//! let gbuffer = graph.create_node(gbuffer_type, "gbuffer")?;
//! let lighting = graph.create_node(lighting_type, "lighting")?;
//! graph.connect(gbuffer, Port::Data(0), lighting, Port::Data(0))?;
//!
//! let plan = compile(&graph, &CompilerConfig::default())?;
//! assert_eq!(plan.order(), &[PlanStep::Node(gbuffer), PlanStep::Node(lighting)]);
//! ```

mod affinity;
mod groups;
mod order;
mod resources;
mod transfer;

pub use groups::{GroupId, PipelineGroup};
pub use resources::{
    PhysicalStorage, ResourceAllocation, ResourceId, ResourceTable, StorageBinding, StorageId,
};

use std::collections::{BTreeMap, HashMap, HashSet};

use tempograph_core::profiling::{profile_function, profile_scope};

use crate::device::DeviceHandle;
use crate::error::CompileError;
use crate::graph::{
    ConnectionKind, NodeHandle, NodeInstance, NodeType, Port, PortType, RenderGraph,
    ResourceLifetime,
};

use resources::{AliasPolicy, ResourceRequest};
use transfer::DataEdge;

/// Compiler settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompilerConfig {
    /// Let non-overlapping transients share storage.
    pub enable_aliasing: bool,
    /// Device for instances with neither an explicit device nor producers.
    pub default_device: DeviceHandle,
    /// Transients smaller than this many bytes get dedicated storage.
    pub min_alias_size: u64,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            enable_aliasing: true,
            default_device: DeviceHandle::PRIMARY,
            min_alias_size: 0,
        }
    }
}

impl CompilerConfig {
    pub fn with_aliasing(mut self, enabled: bool) -> Self {
        self.enable_aliasing = enabled;
        self
    }

    pub fn with_default_device(mut self, device: DeviceHandle) -> Self {
        self.default_device = device;
        self
    }

    pub fn with_min_alias_size(mut self, bytes: u64) -> Self {
        self.min_alias_size = bytes;
        self
    }
}

/// Identifier of a synthetic transfer step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransferId(u32);

impl TransferId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// One entry of the execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PlanStep {
    Node(NodeHandle),
    Transfer(TransferId),
}

/// Copy of one output from its producer's device to another device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transfer {
    pub id: TransferId,
    pub source: NodeHandle,
    pub output: usize,
    pub from_device: DeviceHandle,
    pub to_device: DeviceHandle,
    pub ty: PortType,
    pub size_bytes: u64,
    label: String,
}

impl Transfer {
    /// `"<source>.<output>-><device>"`.
    pub fn label(&self) -> &str {
        &self.label
    }
}

/// Where an input or gate reads its value from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueSource {
    Output { node: NodeHandle, output: usize },
    Transfer(TransferId),
}

/// Compiled schedule of a [`RenderGraph`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecutionPlan {
    order: Vec<PlanStep>,
    waves: Vec<Vec<PlanStep>>,
    devices: BTreeMap<NodeHandle, DeviceHandle>,
    transfers: Vec<Transfer>,
    input_sources: BTreeMap<(NodeHandle, usize), ValueSource>,
    gate_sources: BTreeMap<NodeHandle, ValueSource>,
    resources: ResourceTable,
    groups: Vec<PipelineGroup>,
    group_of: BTreeMap<NodeHandle, GroupId>,
}

impl ExecutionPlan {
    /// Steps in execution order.
    pub fn order(&self) -> &[PlanStep] {
        &self.order
    }

    /// Steps grouped into waves whose members do not depend on each other.
    pub fn waves(&self) -> &[Vec<PlanStep>] {
        &self.waves
    }

    pub fn device_of(&self, node: NodeHandle) -> Option<DeviceHandle> {
        self.devices.get(&node).copied()
    }

    pub fn transfers(&self) -> &[Transfer] {
        &self.transfers
    }

    pub fn transfer(&self, id: TransferId) -> Option<&Transfer> {
        self.transfers.get(id.index())
    }

    /// Producer of data input `input` of `node`, `None` if unconnected.
    pub fn input_source(&self, node: NodeHandle, input: usize) -> Option<ValueSource> {
        self.input_sources.get(&(node, input)).copied()
    }

    /// Producer of the gate of `node`, `None` if ungated.
    pub fn gate_source(&self, node: NodeHandle) -> Option<ValueSource> {
        self.gate_sources.get(&node).copied()
    }

    pub fn resources(&self) -> &ResourceTable {
        &self.resources
    }

    pub fn pipeline_groups(&self) -> &[PipelineGroup] {
        &self.groups
    }

    pub fn group_of(&self, node: NodeHandle) -> Option<GroupId> {
        self.group_of.get(&node).copied()
    }

    /// Number of steps, transfers included.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

static_assertions::assert_impl_all!(ExecutionPlan: Send, Sync);

// ----------------------------------------------------------------------------
// Compilation
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
struct GateEdge {
    from: usize,
    output: usize,
    to: usize,
}

#[derive(Debug, Default)]
struct ResolvedEdges {
    data: Vec<DataEdge>,
    gates: Vec<GateEdge>,
}

/// Compile `graph` into an execution plan.
///
/// Fails without side effects on the first problem found.
pub fn compile(graph: &RenderGraph, config: &CompilerConfig) -> Result<ExecutionPlan, CompileError> {
    profile_function!();

    let nodes: Vec<&NodeInstance> = graph.nodes().collect();
    let types = nodes
        .iter()
        .map(|node| {
            graph
                .registry()
                .get(node.type_id())
                .ok_or_else(|| CompileError::UnknownNodeType {
                    node: node.name().to_owned(),
                })
        })
        .collect::<Result<Vec<&NodeType>, _>>()?;
    let dense: HashMap<NodeHandle, usize> = nodes
        .iter()
        .enumerate()
        .map(|(index, node)| (node.handle(), index))
        .collect();

    let edges = resolve_connections(graph, &types, &dense)?;
    check_required_inputs(&nodes, &types, &edges.data)?;

    let dependencies: Vec<(usize, usize)> = edges
        .data
        .iter()
        .map(|e| (e.from, e.to))
        .chain(edges.gates.iter().map(|g| (g.from, g.to)))
        .collect();
    let layering = {
        profile_scope!("topological_sort");
        order::layered_sort(nodes.len(), &dependencies).map_err(|cycle| cycle_error(&nodes, &cycle))?
    };

    let mut producers = vec![Vec::new(); nodes.len()];
    for edge in &edges.data {
        producers[edge.to].push(edge.from);
    }
    let explicit: Vec<Option<DeviceHandle>> = nodes.iter().map(|node| node.device()).collect();
    let devices =
        affinity::assign_devices(&layering.order, &producers, &explicit, config.default_device)
            .map_err(|conflict| CompileError::DeviceAffinityConflict {
                node: nodes[conflict.node].name().to_owned(),
                devices: conflict.devices,
            })?;

    // Transfers are appended after the nodes in the step index space.
    let n = nodes.len();
    let routing = transfer::route(&edges.data, &devices);
    let mut step_edges = Vec::with_capacity(dependencies.len() + routing.transfers.len());
    for (edge, via) in edges.data.iter().zip(&routing.via) {
        match via {
            None => step_edges.push((edge.from, edge.to)),
            Some(t) => {
                step_edges.push((edge.from, n + t));
                step_edges.push((n + t, edge.to));
            }
        }
    }
    step_edges.extend(edges.gates.iter().map(|g| (g.from, g.to)));
    let steps = order::layered_sort(n + routing.transfers.len(), &step_edges)
        .map_err(|cycle| cycle_error(&nodes, &cycle))?;

    let step_of = |index: usize| {
        if index < n {
            PlanStep::Node(nodes[index].handle())
        } else {
            PlanStep::Transfer(TransferId((index - n) as u32))
        }
    };
    let mut position = vec![0; steps.order.len()];
    for (pos, &index) in steps.order.iter().enumerate() {
        position[index] = pos;
    }

    let transfers: Vec<Transfer> = routing
        .transfers
        .iter()
        .enumerate()
        .map(|(t, pending)| {
            let schema = &types[pending.source].outputs()[pending.output];
            Transfer {
                id: TransferId(t as u32),
                source: nodes[pending.source].handle(),
                output: pending.output,
                from_device: pending.from_device,
                to_device: pending.to_device,
                ty: schema.ty,
                size_bytes: schema.size_bytes,
                label: format!(
                    "{}.{}->{}",
                    nodes[pending.source].name(),
                    schema.name,
                    pending.to_device
                ),
            }
        })
        .collect();

    let mut input_sources = BTreeMap::new();
    for (edge, via) in edges.data.iter().zip(&routing.via) {
        let source = match via {
            None => ValueSource::Output {
                node: nodes[edge.from].handle(),
                output: edge.output,
            },
            Some(t) => ValueSource::Transfer(TransferId(*t as u32)),
        };
        input_sources.insert((nodes[edge.to].handle(), edge.input), source);
    }
    let gate_sources = edges
        .gates
        .iter()
        .map(|g| {
            let source = ValueSource::Output {
                node: nodes[g.from].handle(),
                output: g.output,
            };
            (nodes[g.to].handle(), source)
        })
        .collect();

    let resources = {
        profile_scope!("resource_allocation");
        // Last plan position at which each (step, output) is read.
        let mut last_use: HashMap<(usize, usize), usize> = HashMap::new();
        let mut mark = |key: (usize, usize), pos: usize| {
            let entry = last_use.entry(key).or_insert(pos);
            *entry = (*entry).max(pos);
        };
        for (edge, via) in edges.data.iter().zip(&routing.via) {
            match via {
                None => mark((edge.from, edge.output), position[edge.to]),
                Some(t) => {
                    mark((edge.from, edge.output), position[n + t]);
                    mark((n + t, 0), position[edge.to]);
                }
            }
        }
        for gate in &edges.gates {
            mark((gate.from, gate.output), position[gate.to]);
        }

        let mut requests = Vec::new();
        for (pos, &index) in steps.order.iter().enumerate() {
            let mut request = |output: usize,
                               lifetime: ResourceLifetime,
                               device: DeviceHandle,
                               size_bytes: u64| {
                requests.push(ResourceRequest {
                    resource: ResourceId {
                        producer: step_of(index),
                        output,
                    },
                    lifetime,
                    device,
                    size_bytes,
                    first_use: pos,
                    last_use: last_use.get(&(index, output)).copied().unwrap_or(pos),
                });
            };
            if index < n {
                for (output, schema) in types[index].outputs().iter().enumerate() {
                    if schema.ty == PortType::Resource {
                        request(output, schema.lifetime, devices[index], schema.size_bytes);
                    }
                }
            } else {
                let pending = &routing.transfers[index - n];
                let schema = &types[pending.source].outputs()[pending.output];
                if schema.ty == PortType::Resource {
                    let lifetime = match schema.lifetime {
                        ResourceLifetime::Transient => ResourceLifetime::Transient,
                        _ => ResourceLifetime::Product,
                    };
                    request(0, lifetime, pending.to_device, schema.size_bytes);
                }
            }
        }
        resources::allocate(
            &requests,
            AliasPolicy {
                enabled: config.enable_aliasing,
                min_size: config.min_alias_size,
            },
        )
    };

    let (groups, assignment) = {
        profile_scope!("pipeline_grouping");
        groups::build_groups(
            steps
                .order
                .iter()
                .filter(|&&index| index < n)
                .map(|&index| (types[index], nodes[index])),
        )
    };

    let plan = ExecutionPlan {
        order: steps.order.iter().map(|&index| step_of(index)).collect(),
        waves: steps
            .waves
            .iter()
            .map(|wave| wave.iter().map(|&index| step_of(index)).collect())
            .collect(),
        devices: nodes
            .iter()
            .zip(&devices)
            .map(|(node, &device)| (node.handle(), device))
            .collect(),
        transfers,
        input_sources,
        gate_sources,
        resources,
        groups,
        group_of: assignment.into_iter().collect(),
    };

    log::debug!(
        "Compiled render graph: {} nodes, {} transfers, {} waves, {} pipeline groups, {} storage slots ({} aliased transients)",
        n,
        plan.transfers.len(),
        plan.waves.len(),
        plan.groups.len(),
        plan.resources.storage().len(),
        plan.resources.aliased_count()
    );
    Ok(plan)
}

fn endpoint(graph: &RenderGraph, handle: NodeHandle, port: Port) -> String {
    match graph.node(handle) {
        Some(node) => format!("{}.{}", node.name(), port),
        None => format!("{:?}.{}", handle, port),
    }
}

fn resolve_connections(
    graph: &RenderGraph,
    types: &[&NodeType],
    dense: &HashMap<NodeHandle, usize>,
) -> Result<ResolvedEdges, CompileError> {
    let mut resolved = ResolvedEdges::default();
    let mut fed: HashSet<(usize, Port)> = HashSet::new();

    for connection in graph.connections() {
        let from_name = || endpoint(graph, connection.from, connection.from_port);
        let to_name = || endpoint(graph, connection.to, connection.to_port);
        let unresolved = |reason: &str| CompileError::UnresolvedConnection {
            from: from_name(),
            to: to_name(),
            reason: reason.to_owned(),
        };

        let (Some(&from), Some(&to)) = (dense.get(&connection.from), dense.get(&connection.to))
        else {
            return Err(unresolved("endpoint does not exist"));
        };
        let Some(kind) = connection.kind() else {
            return Err(unresolved("ports cannot be connected"));
        };
        let (output, expected) = match kind {
            ConnectionKind::Loop => continue,
            ConnectionKind::Data { output, input } => match types[to].inputs().get(input) {
                Some(schema) => (output, schema.ty),
                None => return Err(unresolved("input port does not exist")),
            },
            ConnectionKind::Gate { output } => (output, PortType::Bool),
        };
        let Some(source) = types[from].outputs().get(output) else {
            return Err(unresolved("output port does not exist"));
        };
        if source.ty != expected {
            return Err(CompileError::PortTypeMismatch {
                from: from_name(),
                to: to_name(),
                expected,
                found: source.ty,
            });
        }
        if !fed.insert((to, connection.to_port)) {
            return Err(unresolved("input has more than one producer"));
        }

        match kind {
            ConnectionKind::Data { output, input } => resolved.data.push(DataEdge {
                from,
                output,
                to,
                input,
            }),
            ConnectionKind::Gate { output } => resolved.gates.push(GateEdge { from, output, to }),
            ConnectionKind::Loop => {}
        }
    }
    Ok(resolved)
}

fn check_required_inputs(
    nodes: &[&NodeInstance],
    types: &[&NodeType],
    data: &[DataEdge],
) -> Result<(), CompileError> {
    for (index, node_type) in types.iter().enumerate() {
        for (input, port) in node_type.inputs().iter().enumerate() {
            let connected = data.iter().any(|e| e.to == index && e.input == input);
            if !port.optional && !connected {
                return Err(CompileError::MissingRequiredInput {
                    node: nodes[index].name().to_owned(),
                    port: port.name.clone(),
                });
            }
        }
    }
    Ok(())
}

fn cycle_error(nodes: &[&NodeInstance], cycle: &[usize]) -> CompileError {
    let mut names: Vec<String> = cycle
        .iter()
        .map(|&index| {
            nodes
                .get(index)
                .map_or_else(|| "<transfer>".to_owned(), |node| node.name().to_owned())
        })
        .collect();
    if let Some(first) = names.first().cloned() {
        names.push(first);
    }
    CompileError::CyclicGraph { cycle: names }
}
