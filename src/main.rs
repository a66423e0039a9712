//! vm-sim: run a workload under one or all page replacement strategies
//!
//! Usage: vm-sim [OPTIONS] <WORKLOAD>
//!
//! The workload file holds one process per line: its size in bytes followed
//! by every process-relative address it references.

use std::path::PathBuf;
use std::process;

use clap::Parser;
use log::LevelFilter;

use vm_sim::constants::*;
use vm_sim::io::read_workload;
use vm_sim::{MemoryManager, ProcessSpec, RunSummary, SimulationConfig, StrategyKind, VmError};

#[derive(Debug, Parser)]
#[command(name = "vm-sim")]
#[command(about = "Demand-paged virtual memory simulator comparing page replacement strategies")]
#[command(version)]
struct Cli {
    /// Workload file (one process per line: size then addresses)
    workload: PathBuf,

    /// Replacement strategy: best, lru, mru, nur or all
    #[arg(short, long, default_value = "all", value_parser = parse_strategies)]
    strategy: Strategies,

    /// Number of physical frames
    #[arg(short, long, default_value_t = DEFAULT_FRAME_COUNT)]
    frames: usize,

    /// Offset bits per page (page size = 2^bits bytes)
    #[arg(long, default_value_t = DEFAULT_PAGE_SIZE_BITS)]
    page_bits: u32,

    /// Virtual address width in bits
    #[arg(long, default_value_t = DEFAULT_ADDRESS_BITS)]
    address_bits: u32,

    /// Maximum concurrently active processes
    #[arg(long, default_value_t = DEFAULT_MAX_ACTIVE)]
    max_active: usize,

    /// Ticks between NUR reference flag resets
    #[arg(long, default_value_t = DEFAULT_NUR_RESET_INTERVAL)]
    nur_reset: u64,

    /// Stop after this many ticks
    #[arg(long)]
    max_ticks: Option<u64>,

    /// Log faults and evictions (-v) or every reference (-vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(e) = run(&cli) {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn init_logging(verbose: u8) {
    let mut builder = env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or("warn"),
    );
    match verbose {
        0 => {}
        1 => {
            builder.filter_level(LevelFilter::Debug);
        }
        _ => {
            builder.filter_level(LevelFilter::Trace);
        }
    }
    builder.init();
}

/// Strategies selected on the command line, in run order
#[derive(Debug, Clone, PartialEq, Eq)]
struct Strategies(Vec<StrategyKind>);

fn parse_strategies(arg: &str) -> Result<Strategies, VmError> {
    if arg.eq_ignore_ascii_case("all") {
        return Ok(Strategies(StrategyKind::ALL.to_vec()));
    }
    Ok(Strategies(vec![arg.parse()?]))
}

fn run(cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    let base = SimulationConfig {
        page_size_bits: cli.page_bits,
        address_bits: cli.address_bits,
        frame_count: cli.frames,
        max_active_processes: cli.max_active,
        strategy: StrategyKind::Best,
        nur_reset_interval: cli.nur_reset,
    };
    let layout = base.validate()?;
    let specs = read_workload(&cli.workload)?;

    println!("Workload:     {}", cli.workload.display());
    println!("Processes:    {}", specs.len());
    println!(
        "References:   {}",
        specs.iter().map(|s| s.trace.len()).sum::<usize>()
    );
    println!(
        "Memory:       {} frames of {} bytes, {}-bit addresses",
        cli.frames,
        layout.page_size(),
        layout.address_bits()
    );
    println!();

    let mut summaries = Vec::new();
    for &strategy in &cli.strategy.0 {
        let config = SimulationConfig { strategy, ..base };
        summaries.push(simulate(config, &specs, cli.max_ticks)?);
    }

    print_table(&summaries);
    Ok(())
}

fn simulate(
    config: SimulationConfig,
    specs: &[ProcessSpec],
    max_ticks: Option<u64>,
) -> Result<RunSummary, Box<dyn std::error::Error>> {
    let mut manager = MemoryManager::new(config)?;
    manager.submit_all(specs.iter().cloned())?;
    Ok(manager.run(max_ticks)?)
}

fn print_table(summaries: &[RunSummary]) {
    println!(
        "{:<10} {:>8} {:>10} {:>8} {:>11} {:>7}",
        "Strategy", "Faults", "Evictions", "Hits", "Fault rate", "Ticks"
    );
    for s in summaries {
        println!(
            "{:<10} {:>8} {:>10} {:>8} {:>10.2}% {:>7}",
            s.strategy.as_str().to_uppercase(),
            s.faults,
            s.evictions,
            s.hits,
            s.fault_rate() * 100.0,
            s.ticks
        );
    }
}
