//! Fairshare CLI
//!
//! Runs a JSON scenario (or a built-in demo) through the kernel and prints
//! every completion.
//!
//! # Example
//!
//! ```bash
//! # Run the built-in demo
//! fairshare
//!
//! # Run a scenario in full-scan mode, with a JSON snapshot at the end
//! fairshare platform.json --config full.json --json
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use fairshare::{
    KernelConfig, KernelError, KernelResult, ParallelTask, PlatformBuilder, ResourceClass,
    ResourceId, Scenario, Simulation, SimulationApi,
};

/// Fair-share resource contention kernel.
///
/// Starts every action of the scenario at time zero, then steps from one
/// completion or resource change to the next.
#[derive(Parser, Debug)]
#[command(name = "fairshare")]
#[command(version, about, long_about = None)]
struct Args {
    /// Scenario file (JSON). The built-in demo runs when omitted.
    scenario: Option<PathBuf>,

    /// Kernel configuration file (JSON), replacing the scenario's own.
    #[arg(short = 'c', long)]
    config: Option<PathBuf>,

    /// Stop after this many steps.
    #[arg(long)]
    max_steps: Option<u64>,

    /// Stop when the clock reaches this date.
    #[arg(long)]
    until: Option<f64>,

    /// Print a JSON snapshot of the final state.
    #[arg(long)]
    json: bool,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("warn,fairshare=info")),
        )
        .init();

    let args = Args::parse();
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "run failed");
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> KernelResult<()> {
    println!("═══════════════════════════════════════════════════════");
    println!("  Fairshare — Fair-Share Resource Contention Kernel");
    println!("═══════════════════════════════════════════════════════");
    println!();

    let config = args
        .config
        .as_ref()
        .map(KernelConfig::from_file)
        .transpose()?;

    let mut api = match &args.scenario {
        Some(path) => {
            let mut scenario = Scenario::from_file(path)?;
            if let Some(config) = config {
                scenario.config = config;
            }
            info!(path = %path.display(), "scenario loaded");
            SimulationApi::from_scenario(scenario.build()?)
        }
        None => demo(config.unwrap_or_default())?,
    };

    let mut steps = 0u64;
    while args.max_steps.map_or(true, |max| steps < max) {
        let result = match args.until {
            Some(date) if api.current_time() >= date => break,
            Some(date) => api.step_until(date),
            None => api.step(),
        };
        let Some(result) = result else {
            break;
        };
        steps += 1;
        for action in &result.finished {
            println!(
                "  [T={:>10.4}] {:<8} {:<9} ({})",
                result.time, action.name, action.state, action.id
            );
        }
    }

    println!();
    println!(
        "  {} steps, clock at T={}, {}",
        api.simulation().steps(),
        api.current_time(),
        if api.is_finished() { "finished" } else { "stopped" }
    );

    if args.json {
        println!("{}", api.snapshot_json()?);
    }
    Ok(())
}

// ── Demo ──────────────────────────────────────────────────────────────

/// A small platform: two hosts, one link, one disk, and a host failure.
fn demo(config: KernelConfig) -> KernelResult<SimulationApi> {
    let mut sim = PlatformBuilder::new()
        .config(config)
        .cpu("alpha", 10.0)
        .multicore("beta", 5.0, 2)
        .link("wire", 100.0, 0.5)
        .storage("disk", 20.0, 150.0)
        .turn_off(ResourceClass::Cpu, "alpha", 12.0)
        .build()?;

    let alpha = resource(&sim, ResourceClass::Cpu, "alpha")?;
    let beta = resource(&sim, ResourceClass::Cpu, "beta")?;
    let wire = resource(&sim, ResourceClass::Network, "wire")?;
    let disk = resource(&sim, ResourceClass::Storage, "disk")?;

    let work = [
        ("compute", sim.execute(alpha, 100.0)?),
        ("doomed", sim.execute(alpha, 200.0)?),
        ("core-0", sim.execute(beta, 25.0)?),
        ("core-1", sim.execute(beta, 50.0)?),
        ("nap", sim.sleep(beta, Some(3.0))?),
        ("upload", sim.communicate(&[wire], 400.0, None)?),
        ("backup", sim.communicate(&[wire], 400.0, Some(40.0))?),
        ("save", sim.write(disk, 200.0)?),
        ("load", sim.read(disk, 100.0)?),
        (
            "stage",
            sim.execute_parallel(
                &ParallelTask::new()
                    .compute(alpha, 20.0)
                    .compute(beta, 20.0)
                    .transfer(vec![wire], 100.0),
            )?,
        ),
    ];

    let mut api = SimulationApi::new(sim);
    for (name, handle) in work {
        api.track(name, handle);
    }
    Ok(api)
}

fn resource(sim: &Simulation, class: ResourceClass, name: &str) -> KernelResult<ResourceId> {
    sim.resource_id(class, name)
        .ok_or_else(|| KernelError::InvalidScenario(format!("unknown {} resource '{}'", class, name)))
}
