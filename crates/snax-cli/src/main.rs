// SPDX-License-Identifier: AGPL-3.0-only

//! `snax`: command-line interface for the SNAX offload pipeline.
//!
//! ```text
//! USAGE:
//!   snax run [--len N] [--tile T] [--depth D] [--kernel K]   Tiled run on the software cluster
//!   snax untiled [--len N] [--kernel K]                      Single non-pipelined pass
//!   snax layout [--len N] [--tile T] [--depth D]             Scratchpad slot placement
//!   snax schedule --tiles N                                  Stage timeline
//!   snax roles                                               Unit → role table
//!   snax peek --resource PATH --offset X                     Read a mapped register
//!   snax poke --resource PATH --offset X --value V           Write a mapped register
//! ```

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use snax_chip::cluster::ClusterShape;
use snax_chip::tcdm;
use snax_driver::prelude::*;
use snax_driver::scheduler::{stages_at, BackingBuffers, PIPELINE_DEPTH};
use snax_driver::MmioBus;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "snax", about = "SNAX cluster accelerator-offload pipeline", version)]
struct Cli {
    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Run the tiled pipeline on the software cluster and verify the output.
    Run {
        #[command(flatten)]
        data: DataArgs,
        /// Elements per tile.
        #[arg(long, default_value_t = 4)]
        tile: usize,
        /// Scratchpad slots per operand.
        #[arg(long, value_enum, default_value_t = DepthArg::Double)]
        depth: DepthArg,
        #[command(flatten)]
        sim: SimArgs,
    },
    /// Run a single non-pipelined pass (load all, compute once, store).
    Untiled {
        #[command(flatten)]
        data: DataArgs,
        #[command(flatten)]
        sim: SimArgs,
    },
    /// Print the scratchpad layout of a tile plan.
    Layout {
        /// Dataset length in elements.
        #[arg(long, default_value_t = 20)]
        len: usize,
        /// Elements per tile.
        #[arg(long, default_value_t = 4)]
        tile: usize,
        /// Scratchpad slots per operand.
        #[arg(long, value_enum, default_value_t = DepthArg::Double)]
        depth: DepthArg,
    },
    /// Print which tile each stage handles in every iteration.
    Schedule {
        /// Number of tiles.
        #[arg(long, default_value_t = 5)]
        tiles: usize,
    },
    /// Print the role of every unit of the cluster.
    Roles {
        #[command(flatten)]
        topology: TopologyArgs,
    },
    /// Read one 32-bit word of a mapped register window.
    Peek {
        /// Window to map (/dev/mem, /dev/uioN, sysfs resource file).
        #[arg(long)]
        resource: PathBuf,
        /// Byte offset inside the window (hex with 0x prefix).
        #[arg(long, value_parser = parse_u64)]
        offset: u64,
        /// Page-aligned offset of the window inside the file.
        #[arg(long, value_parser = parse_u64, default_value = "0")]
        base: u64,
        /// Window size in bytes (0 maps the rest of the file).
        #[arg(long, default_value_t = 0)]
        size: usize,
    },
    /// Write one 32-bit word of a mapped register window.
    Poke {
        /// Window to map (/dev/mem, /dev/uioN, sysfs resource file).
        #[arg(long)]
        resource: PathBuf,
        /// Byte offset inside the window (hex with 0x prefix).
        #[arg(long, value_parser = parse_u64)]
        offset: u64,
        /// Value to write (hex with 0x prefix).
        #[arg(long, value_parser = parse_u64)]
        value: u64,
        /// Page-aligned offset of the window inside the file.
        #[arg(long, value_parser = parse_u64, default_value = "0")]
        base: u64,
        /// Window size in bytes (0 maps the rest of the file).
        #[arg(long, default_value_t = 0)]
        size: usize,
    },
}

#[derive(Args)]
struct DataArgs {
    /// Dataset length in elements.
    #[arg(long, default_value_t = 20)]
    len: usize,
    /// Kernel offloaded to the accelerator.
    #[arg(long, value_enum, default_value_t = KernelArg::Mac)]
    kernel: KernelArg,
    /// Random dataset seed. Without it a 20-element run uses the reference vectors.
    #[arg(long)]
    seed: Option<u64>,
}

#[derive(Args)]
struct SimArgs {
    /// Busy polls the simulated accelerator reports per launch.
    #[arg(long, default_value_t = 4)]
    latency: u32,
    /// Give up waiting for completion after this many polls.
    #[arg(long)]
    max_polls: Option<u64>,
    /// Give up waiting for completion after this many milliseconds.
    #[arg(long)]
    timeout_ms: Option<u64>,
    /// Simulate an accelerator that never completes.
    #[arg(long)]
    stuck: bool,
    #[command(flatten)]
    topology: TopologyArgs,
}

#[derive(Args)]
struct TopologyArgs {
    /// Units in the cluster.
    #[arg(long, default_value_t = 9)]
    units: u32,
    /// Data-mover unit.
    #[arg(long, default_value_t = 8)]
    mover: u32,
    /// Unit driving the accelerator.
    #[arg(long, default_value_t = 0)]
    compute: u32,
}

#[derive(Clone, Copy, ValueEnum)]
enum DepthArg {
    Single,
    Double,
    Resident,
}

impl From<DepthArg> for BufferDepth {
    fn from(d: DepthArg) -> Self {
        match d {
            DepthArg::Single => Self::Single,
            DepthArg::Double => Self::Double,
            DepthArg::Resident => Self::Resident,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum KernelArg {
    Mac,
    AluAdd,
    AluSub,
    AluMul,
    AluXor,
}

fn parse_u64(s: &str) -> Result<u64, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(&hex.replace('_', ""), 16),
        None => s.replace('_', "").parse(),
    };
    parsed.map_err(|e| format!("invalid number {s:?}: {e}"))
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Cmd::Run { data, tile, depth, sim } => {
            let config = PipelineConfig::new(tile)
                .with_depth(depth.into())
                .with_wait(wait_policy(&sim));
            cmd_run(&data, &sim, &config)?;
        }
        Cmd::Untiled { data, sim } => {
            let config = PipelineConfig::untiled(data.len).with_wait(wait_policy(&sim));
            cmd_run(&data, &sim, &config)?;
        }
        Cmd::Layout { len, tile, depth } => cmd_layout(len, tile, depth.into())?,
        Cmd::Schedule { tiles } => cmd_schedule(tiles),
        Cmd::Roles { topology } => cmd_roles(&topology)?,
        Cmd::Peek { resource, offset, base, size } => cmd_peek(&resource, base, size, offset)?,
        Cmd::Poke { resource, offset, value, base, size } => {
            cmd_poke(&resource, base, size, offset, value)?;
        }
    }

    Ok(())
}

fn wait_policy(sim: &SimArgs) -> WaitPolicy {
    let mut policy = WaitPolicy::default();
    if let Some(polls) = sim.max_polls {
        policy = policy.with_max_polls(polls);
    }
    if let Some(ms) = sim.timeout_ms {
        policy = policy.with_deadline(Duration::from_millis(ms));
    }
    policy
}

fn topology(args: &TopologyArgs) -> Result<ClusterTopology> {
    ClusterTopology::new(args.units, args.mover, args.compute).context("invalid cluster topology")
}

fn load_dataset<K: Offload>(data: &DataArgs, kernel: &K) -> Dataset {
    let reference = Dataset::snax_mac_reference();
    let base = match data.seed {
        None if data.len == reference.len() => reference,
        seed => Dataset::random(data.len, seed.unwrap_or(1)),
    };
    base.with_golden_for(kernel)
}

fn cmd_run(data: &DataArgs, sim: &SimArgs, config: &PipelineConfig) -> Result<()> {
    let cluster = SoftwareCluster::new(topology(&sim.topology)?, ScratchpadAllocator::snax_tcdm())
        .with_latency_polls(sim.latency)
        .with_stuck_device(sim.stuck);

    match data.kernel {
        KernelArg::Mac => run_kernel(&cluster, data, MacMultiply, config),
        KernelArg::AluAdd => run_kernel(&cluster, data, AluOffload::new(AluMode::Add), config),
        KernelArg::AluSub => run_kernel(&cluster, data, AluOffload::new(AluMode::Sub), config),
        KernelArg::AluMul => run_kernel(&cluster, data, AluOffload::new(AluMode::Mul), config),
        KernelArg::AluXor => run_kernel(&cluster, data, AluOffload::new(AluMode::Xor), config),
    }
}

fn run_kernel<K: Offload>(
    cluster: &SoftwareCluster,
    data: &DataArgs,
    kernel: K,
    config: &PipelineConfig,
) -> Result<()> {
    let dataset = load_dataset(data, &kernel);
    tracing::debug!("running {} over {} elements", kernel.name(), dataset.len());
    let report = cluster
        .run(&dataset, kernel, config)
        .context("pipeline run failed")?;

    println!("Kernel      {}", report.kernel);
    println!(
        "Tiles       {} x {} elements ({} buffering)",
        report.tiles,
        dataset.len() / report.tiles,
        report.depth
    );
    println!("Iterations  {}", report.iterations);
    println!("Launches    {}   polls {}", report.launches, report.polls());
    println!("Transfers   {}", report.transfers);
    println!(
        "Mismatches  device {}  host {}  of {}",
        report.verification.device_mismatches,
        report.verification.host_mismatches,
        report.verification.checked
    );

    if !report.verification.passed() {
        bail!("{} mismatches", report.verification.total());
    }
    println!("PASS");
    Ok(())
}

fn cmd_layout(len: usize, tile: usize, depth: BufferDepth) -> Result<()> {
    let (backing, _) = SoftwareCluster::backing_for(len)?;
    let plan = TilePlan::new(
        len,
        &PipelineConfig::new(tile).with_depth(depth),
        &ScratchpadAllocator::snax_tcdm(),
        backing,
    )?;

    println!(
        "{} tiles of {} elements, {} buffering, {} slots per operand",
        plan.tiles(),
        plan.tile_len(),
        plan.depth(),
        plan.slots()
    );
    println!(
        "TCDM {:#010x}: {} of {} bytes used",
        tcdm::TCDM_BASE,
        plan.layout().used_bytes(),
        plan.layout().capacity()
    );
    for (name, region) in plan.layout().regions() {
        println!(
            "  {name}  {:#010x}..{:#010x}  {:>6} bytes",
            region.addr(),
            region.addr() as usize + region.len(),
            region.len()
        );
    }

    let BackingBuffers { a, b, o } = plan.backing();
    println!("Backing  a={a:#010x}  b={b:#010x}  o={o:#010x}");
    println!();
    println!("tile  slot  a           b           o");
    for t in 0..plan.tiles() {
        let r = plan.tile_regions(t)?;
        println!(
            "{t:>4}  {:>4}  {:#010x}  {:#010x}  {:#010x}",
            t % plan.slots(),
            r.a,
            r.b,
            r.o
        );
    }
    Ok(())
}

fn cmd_schedule(tiles: usize) {
    let fmt = |t: Option<usize>| t.map_or_else(|| "-".to_string(), |t| format!("t{t}"));
    println!("iteration  load  compute  store");
    for i in 0..tiles + PIPELINE_DEPTH - 1 {
        let s = stages_at(i, tiles);
        println!(
            "{i:>9}  {:>4}  {:>7}  {:>5}",
            fmt(s.load),
            fmt(s.compute),
            fmt(s.store)
        );
    }
}

fn cmd_roles(args: &TopologyArgs) -> Result<()> {
    let topology = topology(args)?;
    let dispatcher = snax_driver::RoleDispatcher::new(topology);
    if topology == ClusterTopology::snax() {
        let shape = ClusterShape::SNAX;
        println!("SNAX cluster: {} compute cores + 1 data mover", shape.compute_cores());
    }
    for unit in topology.units() {
        println!("unit {unit:>2}  {}", dispatcher.role_of(unit));
    }
    Ok(())
}

fn cmd_peek(resource: &Path, base: u64, size: usize, offset: u64) -> Result<()> {
    let bus = MmioBus::open(resource, base, size)
        .with_context(|| format!("cannot map {}", resource.display()))?;
    let value = bus.read_u32(usize::try_from(offset)?)?;
    println!("{offset:#010x}: {value:#010x}");
    Ok(())
}

fn cmd_poke(resource: &Path, base: u64, size: usize, offset: u64, value: u64) -> Result<()> {
    let value = u32::try_from(value).context("value does not fit in 32 bits")?;
    let mut bus = MmioBus::open(resource, base, size)
        .with_context(|| format!("cannot map {}", resource.display()))?;
    bus.write_u32(usize::try_from(offset)?, value)?;
    println!("{offset:#010x} <- {value:#010x}");
    Ok(())
}
