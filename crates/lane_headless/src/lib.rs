//! Headless battle runner for CI verification and balance testing.
//!
//! This crate drives the deterministic core without any presentation layer:
//!
//! - **Scenario runs**: load a RON scenario, run it, write every frame as a
//!   JSON line and optionally record a replay
//! - **Determinism checks**: run a scenario several times in parallel and
//!   compare every frame
//! - **Replay verification**: check that a replay reproduces its final hash
//! - **Batch runs**: many seed-varied games in parallel, with aggregate
//!   win rates
//!
//! Logs go to stderr; JSON output goes to files or stdout.
//!
//! # Example
//!
//! ```bash
//! # Run a scenario and keep its frames
//! cargo run -p lane_headless -- run --scenario scenarios/skirmish.ron --output frames.jsonl
//!
//! # Verify determinism
//! cargo run -p lane_headless -- verify --scenario scenarios/skirmish.ron --runs 5
//!
//! # Verify a replay
//! cargo run -p lane_headless -- replay --file run.replay --verify
//! ```

pub mod batch;
pub mod metrics;
pub mod runner;
pub mod scenario;
pub mod spawn_generator;

pub use batch::{run_batch, BatchConfig, BatchResults};
pub use metrics::{BatchSummary, GameMetrics, MetricsCollector};
pub use runner::{run_scenario, verify_determinism, RunError, RunOptions, VerifyReport};
pub use scenario::{Scenario, ScenarioError};
pub use spawn_generator::{generate_dynamic_scenario, SpawnConfig};
