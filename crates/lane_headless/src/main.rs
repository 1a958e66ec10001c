//! Headless lane battle runner.
//!
//! Runs battles without any presentation layer. Designed for CI testing,
//! replay verification and balance batches.
//!
//! # Usage
//!
//! ```bash
//! # Run the built-in skirmish and print its metrics
//! cargo run -p lane_headless -- run
//!
//! # Run a scenario file, keep every frame and record a replay
//! cargo run -p lane_headless -- run --scenario scenarios/skirmish.ron \
//!     --output frames.jsonl --record run.replay
//!
//! # Run a balance batch
//! cargo run -p lane_headless -- batch --scenario scenarios/skirmish.ron --count 200
//!
//! # Survey the pathfinder on random obstacle fields
//! cargo run -p lane_headless -- survey --seed 7 --density 0.2
//! ```
//!
//! Logs go to stderr; reports go to stdout or files.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use lane_core::config::GameBalance;
use lane_core::registry::UnitRegistry;
use lane_core::replay::{Replay, ReplayPlayer};
use lane_core::setup::InitialSetup;
use lane_core::survey::{run_survey, SurveySettings};
use lane_core::waves::WaveSchedule;
use lane_headless::batch::{run_batch, BatchConfig};
use lane_headless::runner::{run_scenario, verify_determinism, RunOptions};
use lane_headless::scenario::Scenario;

#[derive(Parser)]
#[command(name = "lane_headless")]
#[command(about = "Headless lane battle runner for CI and balance testing")]
#[command(version)]
struct Cli {
    /// Debug-level logs (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a single battle
    Run {
        /// Scenario file (built-in skirmish if omitted)
        #[arg(short, long)]
        scenario: Option<PathBuf>,

        /// Override the scenario's frame cap
        #[arg(short, long)]
        frames: Option<u32>,

        /// Write every frame as a JSON line to this file
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Record a replay to this file
        #[arg(long)]
        record: Option<PathBuf>,
    },

    /// Verify determinism by running the same scenario several times
    Verify {
        /// Scenario file (built-in skirmish if omitted)
        #[arg(short, long)]
        scenario: Option<PathBuf>,

        /// Number of runs to compare
        #[arg(short, long, default_value = "5")]
        runs: u32,

        /// Override the scenario's frame cap
        #[arg(short, long)]
        frames: Option<u32>,
    },

    /// Play back a recorded replay
    Replay {
        /// Replay file path
        #[arg(short, long)]
        file: PathBuf,

        /// Only check that the final state hash matches
        #[arg(long)]
        verify: bool,
    },

    /// Run a batch of seed-varied battles
    Batch {
        /// Scenario file (built-in skirmish if omitted)
        #[arg(short, long)]
        scenario: Option<PathBuf>,

        /// Games to play
        #[arg(short, long, default_value_t = 100)]
        count: u32,

        /// Worker threads (0 = one per core)
        #[arg(short, long, default_value_t = 0)]
        parallel: u32,

        /// Directory for batch_results.json
        #[arg(short, long, default_value = "batch")]
        output: PathBuf,

        /// Starting seed
        #[arg(long, default_value = "1")]
        seed: u64,

        /// Frame cap per game (0 = the scenario's own)
        #[arg(short, long, default_value = "0")]
        frames: u32,
    },

    /// Survey the pathfinder on random obstacle fields
    Survey {
        /// Random seed
        #[arg(long, default_value = "0")]
        seed: u64,

        /// Share of cells to block, 0..=1
        #[arg(short, long, default_value = "0.15")]
        density: f64,

        /// Start/end pairs to try
        #[arg(short = 'n', long, default_value = "25")]
        scenarios: u32,

        /// Write the JSON report here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Parse and validate a data file
    Validate {
        /// File to check
        path: PathBuf,

        /// What the file contains
        #[arg(short, long, value_enum, default_value = "scenario")]
        kind: DataKind,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum DataKind {
    /// A full scenario
    Scenario,
    /// Balance tunables
    Balance,
    /// Towers, initial units and clock
    Setup,
    /// A list of unit definitions
    Units,
    /// A list of waves
    Waves,
}

fn main() {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    match cli.command {
        Commands::Run {
            scenario,
            frames,
            output,
            record,
        } => cmd_run(scenario.as_deref(), frames, output, record),
        Commands::Verify {
            scenario,
            runs,
            frames,
        } => cmd_verify(scenario.as_deref(), runs, frames),
        Commands::Replay { file, verify } => cmd_replay(&file, verify),
        Commands::Batch {
            scenario,
            count,
            parallel,
            output,
            seed,
            frames,
        } => cmd_batch(scenario.as_deref(), count, parallel, output, seed, frames),
        Commands::Survey {
            seed,
            density,
            scenarios,
            output,
        } => cmd_survey(seed, density, scenarios, output),
        Commands::Validate { path, kind } => cmd_validate(&path, kind),
    }
}

/// Logs go to stderr so stdout stays clean for JSON. `RUST_LOG` wins over
/// `--verbose`.
fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr).with_target(false))
        .init();
}

fn fail(message: impl std::fmt::Display) -> ! {
    eprintln!("{message}");
    std::process::exit(1);
}

fn load_scenario(path: Option<&Path>) -> Scenario {
    match path {
        Some(path) => {
            tracing::info!("Loading scenario: {}", path.display());
            Scenario::load(path).unwrap_or_else(|e| fail(format!("Failed to load scenario: {e}")))
        }
        None => Scenario::skirmish(),
    }
}

/// Run a single battle
fn cmd_run(
    scenario: Option<&Path>,
    frames: Option<u32>,
    output: Option<PathBuf>,
    record: Option<PathBuf>,
) {
    let scenario = load_scenario(scenario);
    let options = RunOptions {
        max_frames: frames,
        frames_output: output,
        record_replay: record,
        seed: 0,
    };
    let metrics = run_scenario(&scenario, &options).unwrap_or_else(|e| fail(format!("Run failed: {e}")));

    match serde_json::to_string_pretty(&metrics) {
        Ok(json) => println!("{json}"),
        Err(e) => fail(format!("Failed to serialize metrics: {e}")),
    }
    eprintln!(
        "Result: {:?} after {} frames (crowns {} - {})",
        metrics.result, metrics.frames, metrics.friendly.crowns, metrics.enemy.crowns
    );
}

/// Verify determinism
fn cmd_verify(scenario: Option<&Path>, runs: u32, frames: Option<u32>) {
    let mut scenario = load_scenario(scenario);
    if let Some(frames) = frames {
        scenario.balance.max_frames = frames;
    }
    tracing::info!("Verifying determinism: {} ({} runs)", scenario.name, runs);

    let report = verify_determinism(&scenario, runs)
        .unwrap_or_else(|e| fail(format!("Verification failed: {e}")));

    if report.is_deterministic() {
        eprintln!(
            "PASS: All {} runs produced identical frames ({} frames, hash {:016x})",
            report.runs, report.frames, report.final_hash
        );
    } else {
        eprintln!("FAIL: Non-determinism detected!");
        if let Some(divergence) = report.divergence {
            match divergence.frame {
                Some(frame) => eprintln!("  Run {} diverged at frame {}", divergence.run, frame),
                None => eprintln!("  Run {} ended with a different hash", divergence.run),
            }
        }
        std::process::exit(1);
    }
}

/// Replay a recorded battle
fn cmd_replay(file: &Path, verify: bool) {
    let replay = Replay::load(file).unwrap_or_else(|e| fail(format!("Failed to load replay: {e}")));
    tracing::info!(
        file = %file.display(),
        scenario = %replay.scenario_id,
        commands = replay.command_count(),
        frames = replay.duration(),
        verify,
        "Replay loaded"
    );
    let expected = replay.final_hash;
    let mut player = ReplayPlayer::new(replay).unwrap_or_else(|e| fail(format!("Cannot restore replay: {e}")));

    if verify {
        match player.verify() {
            Ok(true) => eprintln!("PASS: {} frames reproduce hash {expected:016x}", player.current_frame()),
            Ok(false) => {
                let actual = player.simulation().state_hash().map_or_else(|e| e.to_string(), |h| format!("{h:016x}"));
                fail(format!("FAIL: replay ended on {actual}, recorded {expected:016x}"));
            }
            Err(e) => fail(format!("FAIL: {e}")),
        }
        return;
    }

    let mut next_report = 10;
    while player.advance() {
        if player.progress_percent() >= f64::from(next_report) {
            tracing::info!(frame = player.current_frame(), "{next_report}% played");
            next_report += 10;
        }
    }

    match player.last_frame() {
        Some(frame) => eprintln!(
            "Frame {}: {:?}, crowns {} - {}, {} friendly and {} enemy units alive",
            frame.frame_number,
            frame.game_result,
            frame.friendly_crowns,
            frame.enemy_crowns,
            frame.living_friendly_count,
            frame.living_enemy_count
        ),
        None => eprintln!("Replay is empty"),
    }
}

/// Run a batch of seed-varied battles
fn cmd_batch(scenario: Option<&Path>, count: u32, parallel: u32, output: PathBuf, seed: u64, frames: u32) {
    let base = load_scenario(scenario);
    let config = BatchConfig {
        parallel_games: parallel,
        ..BatchConfig::new(base.name.clone(), count)
            .seeded_from(seed)
            .capped_at(frames)
            .writing_to(output)
    };
    let report_path = config.output_dir.join("batch_results.json");
    let results = run_batch(&base, config);
    if let Err(e) = results.save(&report_path) {
        fail(format!("Cannot write {}: {e}", report_path.display()));
    }

    let summary = &results.summary;
    eprintln!(
        "{} games in {:.1}s, report at {}",
        results.games.len(),
        results.duration_seconds,
        report_path.display()
    );
    for (side, rate) in &summary.win_rates {
        eprintln!("  {side:<9} {:>5.1}%", rate * 100.0);
    }
    eprintln!("  draws {}, undecided {}", summary.draws, summary.undecided);

    if !results.failures.is_empty() {
        eprintln!("{} games failed:", results.failures.len());
        for failure in results.failures.iter().take(10) {
            eprintln!("  #{} seed {}: {}", failure.index, failure.seed, failure.message);
        }
        std::process::exit(1);
    }
}

/// Survey the pathfinder
fn cmd_survey(seed: u64, density: f64, scenarios: u32, output: Option<PathBuf>) {
    let settings = SurveySettings {
        obstacle_density: density,
        scenario_count: scenarios,
        ..SurveySettings::with_seed(seed)
    };
    let report = run_survey(&settings).unwrap_or_else(|e| fail(format!("Survey failed: {e}")));
    let json = report
        .to_json()
        .unwrap_or_else(|e| fail(format!("Failed to serialize report: {e}")));

    match output {
        Some(path) => {
            if let Err(e) = std::fs::write(&path, json) {
                fail(format!("Failed to write report: {e}"));
            }
            eprintln!("Survey report saved to: {}", path.display());
        }
        None => println!("{json}"),
    }

    let summary = &report.summary;
    eprintln!(
        "Paths found: {}/{} ({:.1}%), average length {:.1}",
        summary.successful_paths,
        summary.total_scenarios,
        summary.success_rate * 100.0,
        summary.average_path_length
    );
}

/// Validate a data file
fn cmd_validate(path: &Path, kind: DataKind) {
    let outcome = match kind {
        DataKind::Scenario => Scenario::load(path)
            .and_then(|s| s.validate().map(|()| s))
            .map(|s| format!("scenario '{}': {} waves, {} commands", s.name, s.waves.len(), s.commands.len()))
            .map_err(|e| e.to_string()),
        DataKind::Balance => GameBalance::load(path)
            .map(|b| format!("balance v{} ({} max frames)", b.version, b.max_frames))
            .map_err(|e| e.to_string()),
        DataKind::Setup => InitialSetup::load(path)
            .map(|s| format!("setup: {} towers, {} unit groups", s.towers.len(), s.initial_units.len()))
            .map_err(|e| e.to_string()),
        DataKind::Units => UnitRegistry::load(path)
            .map(|r| format!("{} unit definitions", r.len()))
            .map_err(|e| e.to_string()),
        DataKind::Waves => WaveSchedule::load(path)
            .map(|w| format!("{} waves", w.waves.len()))
            .map_err(|e| e.to_string()),
    };

    match outcome {
        Ok(description) => eprintln!("OK: {} ({description})", path.display()),
        Err(e) => fail(format!("INVALID: {}: {e}", path.display())),
    }
}
