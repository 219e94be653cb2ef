//! Multi-rate frame loop demo.
//!
//! Builds a small frame graph driven by four loops and runs it against a
//! simulated clock:
//!
//! | Loop | Rate | Drives |
//! |------|------|--------|
//! | physics | `--physics-hz` | `simulate` |
//! | network | `--network-hz` | `replicate`, gated on physics AND network |
//! | ai | `--ai-hz` | `think` |
//! | render | every frame | `gbuffer -> lighting -> post` |
//!
//! ```bash
//! cargo run -p tempograph-demos --bin multirate_demo -- --frames 120 --hitch-every 30
//! RUST_LOG=debug cargo run -p tempograph-demos --bin multirate_demo -- --catchup fire-and-forget
//! ```

use std::error::Error;

use clap::Parser;

use tempograph_core::frame_mark;
use tempograph_core::time::{Clock, ManualClock, Timer};
use tempograph_graphics::{
    BoolOperation, CatchupMode, DeviceHandle, FrameContext, InputPortSchema, LoopConfig, LoopId,
    NodeHandle, NodeType, OutputPortSchema, Port, PortType, PortValue, RenderGraph,
    ResourceLifetime, from_fn,
};

/// Catch-up policy for the fixed-rate loops.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
enum CliCatchup {
    /// Run once with the whole accumulated time.
    FireAndForget,
    /// Run one fixed step, carry the rest.
    SingleCorrective,
    /// Run as many fixed steps as the accumulated time allows.
    #[default]
    MultipleSteps,
}

impl From<CliCatchup> for CatchupMode {
    fn from(cli: CliCatchup) -> Self {
        match cli {
            CliCatchup::FireAndForget => CatchupMode::FireAndForget,
            CliCatchup::SingleCorrective => CatchupMode::SingleCorrectiveStep,
            CliCatchup::MultipleSteps => CatchupMode::MultipleSteps,
        }
    }
}

#[derive(Parser, Debug)]
#[command(
    name = "multirate_demo",
    about = "Run a render graph with physics, network, AI and render loops"
)]
struct Args {
    /// Number of frames to simulate.
    #[arg(long, default_value_t = 240)]
    frames: u64,

    /// Simulated frame time in seconds.
    #[arg(long, default_value_t = 1.0 / 60.0)]
    frame_time: f64,

    #[arg(long, default_value_t = 60.0)]
    physics_hz: f64,

    #[arg(long, default_value_t = 20.0)]
    network_hz: f64,

    #[arg(long, default_value_t = 5.0)]
    ai_hz: f64,

    /// Catch-up policy for the fixed-rate loops.
    #[arg(long, value_enum, default_value_t = CliCatchup::default())]
    catchup: CliCatchup,

    /// Make every Nth frame a hitch.
    #[arg(long)]
    hitch_every: Option<u64>,

    /// Duration of a hitch frame in seconds.
    #[arg(long, default_value_t = 0.5)]
    hitch_time: f64,

    /// Run post-processing on a second device.
    #[arg(long)]
    secondary_device: bool,
}

struct Demo {
    graph: RenderGraph,
    clock: ManualClock,
    loops: Vec<(&'static str, LoopId)>,
    workers: Vec<NodeHandle>,
}

fn counter_type(name: &str) -> NodeType {
    NodeType::new(name)
        .with_output(OutputPortSchema::new("steps", PortType::Int))
        .with_behavior(|| {
            let mut steps = 0i64;
            Box::new(from_fn(move |ctx| {
                steps += 1;
                log::trace!(
                    "{} step {} (dt {:.4}s{})",
                    ctx.name(),
                    ctx.step_count(),
                    ctx.delta_time(),
                    if ctx.is_catchup() { ", catch-up" } else { "" }
                );
                ctx.set_output(0, steps)
            }))
        })
}

fn pass_type(name: &str, lifetime: ResourceLifetime, size_bytes: u64) -> NodeType {
    NodeType::new(name)
        .with_input(InputPortSchema::optional("in", PortType::Resource))
        .with_output(
            OutputPortSchema::new("out", PortType::Resource)
                .with_lifetime(lifetime)
                .with_size(size_bytes),
        )
}

fn fixed_loop(name: &str, hz: f64, mode: CatchupMode) -> LoopConfig {
    LoopConfig::fixed(name, 1.0 / hz).with_catchup_mode(mode)
}

fn build(args: &Args) -> Result<Demo, Box<dyn Error>> {
    let clock = ManualClock::new();
    let mut graph = RenderGraph::with_timer(Timer::with_clock(clock.clone()));
    let mode = CatchupMode::from(args.catchup);

    let physics = graph.register_loop(fixed_loop("physics", args.physics_hz, mode))?;
    let network = graph.register_loop(fixed_loop("network", args.network_hz, mode))?;
    let ai = graph.register_loop(fixed_loop("ai", args.ai_hz, mode))?;
    let render = graph.register_loop(LoopConfig::variable("render"))?;

    let simulate_type = graph.register_node_type(counter_type("Simulate"))?;
    let replicate_type = graph.register_node_type(counter_type("Replicate"))?;
    let think_type = graph.register_node_type(counter_type("Think"))?;
    let gbuffer_type =
        graph.register_node_type(pass_type("GBuffer", ResourceLifetime::Transient, 32 << 20))?;
    let lighting_type =
        graph.register_node_type(pass_type("Lighting", ResourceLifetime::Transient, 16 << 20))?;
    let post_type = graph.register_node_type(pass_type("Post", ResourceLifetime::Variable, 0))?;

    let physics_bridge = graph.add_loop_bridge("physics_bridge", physics)?;
    let network_bridge = graph.add_loop_bridge("network_bridge", network)?;
    let ai_bridge = graph.add_loop_bridge("ai_bridge", ai)?;
    let render_bridge = graph.add_loop_bridge("render_bridge", render)?;

    let simulate = graph.create_node(simulate_type, "simulate")?;
    graph.connect(physics_bridge, Port::LOOP_OUT, simulate, Port::LOOP_IN)?;

    let both = graph.add_bool_op("physics_and_network", BoolOperation::And)?;
    let replicate = graph.create_node(replicate_type, "replicate")?;
    graph.connect(physics_bridge, Port::Data(0), both, Port::Data(0))?;
    graph.connect(network_bridge, Port::Data(0), both, Port::Data(1))?;
    graph.connect(both, Port::Data(0), replicate, Port::Gate)?;

    let think = graph.create_node(think_type, "think")?;
    graph.connect(ai_bridge, Port::LOOP_OUT, think, Port::LOOP_IN)?;

    let gbuffer = graph.create_node(gbuffer_type, "gbuffer")?;
    let lighting = graph.create_node(lighting_type, "lighting")?;
    let post = graph.create_node(post_type, "post")?;
    graph.connect(gbuffer, Port::Data(0), lighting, Port::Data(0))?;
    graph.connect(lighting, Port::Data(0), post, Port::Data(0))?;
    for pass in [gbuffer, lighting, post] {
        graph.connect(render_bridge, Port::LOOP_OUT, pass, Port::LOOP_IN)?;
    }
    if args.secondary_device {
        graph.set_device(post, Some(DeviceHandle::new(1)))?;
    }

    graph.compile()?;
    if let Some(plan) = graph.plan() {
        log::info!(
            "Compiled {} steps in {} waves: {} transfers, {} storage slots, {} pipeline groups",
            plan.len(),
            plan.waves().len(),
            plan.transfers().len(),
            plan.resources().storage().len(),
            plan.pipeline_groups().len()
        );
    }
    log::info!("Execution order: {}", graph.execution_order().join(", "));

    Ok(Demo {
        graph,
        clock,
        loops: vec![
            ("physics", physics),
            ("network", network),
            ("ai", ai),
            ("render", render),
        ],
        workers: vec![simulate, replicate, think],
    })
}

fn report_loops(demo: &Demo) {
    for &(name, id) in &demo.loops {
        if let Some(reference) = demo.graph.loop_reference(id) {
            log::info!(
                "  {:<8} steps {:>5}  dt {:.4}s  last {:.3}ms",
                name,
                reference.step_count,
                reference.delta_time,
                reference.last_execution_time_ms
            );
        }
    }
    for &worker in &demo.workers {
        if let Some(node) = demo.graph.node(worker) {
            let steps = node.output(0).and_then(PortValue::as_int).unwrap_or(0);
            log::info!("  {:<10} ran {} times", node.name(), steps);
        }
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    let _profiler = tempograph_core::profiling::start_client();

    tempograph_core::init();
    tempograph_graphics::init();

    let mut demo = build(&args)?;
    let mut catchup_passes = 0u64;

    for frame in 1..=args.frames {
        let hitch = args.hitch_every.is_some_and(|n| n > 0 && frame % n == 0);
        let frame_time = if hitch { args.hitch_time } else { args.frame_time };
        demo.clock.advance_secs(frame_time);

        let report = demo.graph.execute(FrameContext::default())?;
        catchup_passes += u64::from(report.catchup_passes);
        if hitch {
            log::info!(
                "Frame {}: hitch of {:.3}s, {} catch-up passes, {} invocations",
                report.frame,
                frame_time,
                report.catchup_passes,
                report.total_invocations()
            );
        }
        frame_mark!();
    }

    log::info!(
        "Simulated {} frames ({:.2}s), {} catch-up passes",
        args.frames,
        demo.clock.now().as_secs_f64(),
        catchup_passes
    );
    report_loops(&demo);
    Ok(())
}
