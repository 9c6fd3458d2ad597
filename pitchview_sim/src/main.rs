//! PitchView Stadium Simulator CLI
//!
//! Run the multi-camera pipeline against simulated match scenarios.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use pitchview_core::PitchViewConfig;
use pitchview_sim::{ScenarioId, ScenarioResult, ScenarioRunner, SimError, SimExport};
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

/// PitchView deterministic stadium simulation CLI
#[derive(Parser, Debug)]
#[command(name = "pitchview-sim")]
#[command(about = "Run deterministic stadium simulations for PitchView", long_about = None)]
struct Args {
    /// Master seed for determinism (0 = random from time)
    #[arg(short, long, default_value = "42")]
    seed: u64,

    /// Scenario to run (rolling, lob, dribble, crossing, all)
    #[arg(short = 'S', long, default_value = "all")]
    scenario: String,

    /// Number of consecutive seeds to test (for CI mode)
    #[arg(long, default_value = "1")]
    seeds: usize,

    /// Frames per camera
    #[arg(short, long, default_value = "100")]
    frames: u64,

    /// Number of broadcast cameras (1-4)
    #[arg(long, default_value = "4")]
    views: usize,

    /// Pipeline configuration as JSON (missing keys take defaults)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// JSON output for CI parsing
    #[arg(long)]
    json: bool,

    /// Export per-frame data of a single scenario to a JSON file
    #[arg(long)]
    export: Option<PathBuf>,
}

fn load_config(path: Option<&PathBuf>) -> Result<PitchViewConfig, SimError> {
    match path {
        Some(path) => Ok(PitchViewConfig::from_json(&std::fs::read_to_string(path)?)?),
        None => Ok(PitchViewConfig::default()),
    }
}

fn run_with_export(runner: &ScenarioRunner, scenario: ScenarioId, path: &PathBuf) -> Result<ScenarioResult, SimError> {
    let run = runner.execute(scenario)?;
    let export = SimExport::from_run(&run);
    export.write_to_file(path)?;
    info!("Exported {} frames to {}", export.frames.len(), path.display());
    Ok(run.result)
}

fn main() -> ExitCode {
    let args = Args::parse();

    // Initialize logging
    let level = if args.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return ExitCode::FAILURE;
    }

    if !args.json {
        info!("PitchView Stadium Simulator v0.1.0");
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    }

    // Parse scenarios
    let scenarios: Vec<ScenarioId> = if args.scenario == "all" {
        ScenarioId::all()
    } else {
        match args.scenario.parse() {
            Ok(id) => vec![id],
            Err(e) => {
                eprintln!("Error: {}", e);
                eprintln!("Available scenarios: rolling, lob, dribble, crossing, all");
                return ExitCode::FAILURE;
            }
        }
    };

    let config = match load_config(args.config.as_ref()) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };

    // Determine base seed
    let base_seed = if args.seed == 0 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(42)
    } else {
        args.seed
    };

    let runner_for = |seed: u64| {
        ScenarioRunner::new(seed, args.frames)
            .with_views(args.views)
            .with_config(config.clone())
    };

    // Handle --export mode
    if let Some(path) = &args.export {
        if scenarios.len() > 1 {
            eprintln!("Error: --export only supports a single scenario, not 'all'");
            return ExitCode::FAILURE;
        }
        return match run_with_export(&runner_for(base_seed), scenarios[0], path) {
            Ok(result) if result.passed => {
                info!("✓ {} (seed={}) PASSED - exported to {}", scenarios[0].name(), base_seed, path.display());
                ExitCode::SUCCESS
            }
            Ok(result) => {
                error!(
                    "✗ {} FAILED: {}",
                    scenarios[0].name(),
                    result.failure_reason.as_deref().unwrap_or("unknown")
                );
                ExitCode::FAILURE
            }
            Err(e) => {
                error!("✗ {} aborted: {}", scenarios[0].name(), e);
                ExitCode::FAILURE
            }
        };
    }

    // Track results
    let mut all_results: Vec<ScenarioResult> = Vec::new();
    let mut failed_count = 0;

    for seed_offset in 0..args.seeds {
        let seed = base_seed.wrapping_add(seed_offset as u64);
        let runner = runner_for(seed);

        for scenario in &scenarios {
            let result = match runner.run(*scenario) {
                Ok(result) => result,
                Err(e) => {
                    error!("✗ {} (seed={}) aborted: {}", scenario.name(), seed, e);
                    return ExitCode::FAILURE;
                }
            };

            if !args.json {
                if result.passed {
                    info!(
                        "✓ {} (seed={}) PASSED | fused={} RMS={:.2}m",
                        scenario.name(),
                        seed,
                        result.metrics.fused_frames,
                        result.metrics.rms_error_3d
                    );
                } else {
                    error!(
                        "✗ {} (seed={}) FAILED: {}",
                        scenario.name(),
                        seed,
                        result.failure_reason.as_deref().unwrap_or("unknown")
                    );
                }
            }

            if !result.passed {
                failed_count += 1;
            }

            all_results.push(result);
        }
    }

    // Summary
    let total = all_results.len();
    let passed = total - failed_count;

    if args.json {
        let summary = serde_json::json!({
            "total": total,
            "passed": passed,
            "failed": failed_count,
            "results": all_results.iter().map(|r| {
                serde_json::json!({
                    "scenario": r.scenario.name(),
                    "seed": r.seed,
                    "passed": r.passed,
                    "frames": r.total_frames,
                    "time_secs": r.final_time_secs,
                    "failure_reason": r.failure_reason,
                    "metrics": r.metrics,
                })
            }).collect::<Vec<_>>(),
        });
        match serde_json::to_string_pretty(&summary) {
            Ok(text) => println!("{}", text),
            Err(e) => {
                eprintln!("Failed to encode summary: {}", e);
                return ExitCode::FAILURE;
            }
        }
    } else {
        info!("");
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

        if failed_count == 0 {
            info!("✅ All {} scenario runs passed!", total);
        } else {
            error!("❌ {}/{} scenario runs failed!", failed_count, total);
            for result in all_results.iter().filter(|r| !r.passed) {
                error!(
                    "  - {} seed={}: {}",
                    result.scenario.name(),
                    result.seed,
                    result.failure_reason.as_deref().unwrap_or("unknown")
                );
            }
        }
    }

    if failed_count == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
