//! Batch battle runner for balance testing.
//!
//! Runs one scenario many times in parallel using rayon, each game with its
//! own seed-varied command script, and aggregates the metrics.

use std::fs::File;
use std::io::{self, BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Instant;

use lane_core::session::GameResult;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::metrics::{BatchSummary, GameMetrics};
use crate::runner::{run_scenario, RunOptions};
use crate::scenario::Scenario;
use crate::spawn_generator::{generate_dynamic_scenario, SpawnConfig};

/// Games between progress log lines.
const LOG_EVERY: u32 = 100;

/// How a batch is played.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Label copied into the report
    pub scenario: String,
    /// Games to play
    pub game_count: u32,
    /// Worker threads; 0 lets rayon decide
    pub parallel_games: u32,
    /// Where the CLI writes `batch_results.json`
    pub output_dir: PathBuf,
    /// Game `i` is seeded with `seed_start + i`
    pub seed_start: u64,
    /// Per-game frame cap; 0 keeps the scenario's
    pub max_frames: u32,
    /// Extra random deployments per side
    pub deployments_per_side: u32,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            scenario: "skirmish".to_string(),
            game_count: 100,
            parallel_games: 0,
            output_dir: PathBuf::from("batch"),
            seed_start: 1,
            max_frames: 0,
            deployments_per_side: SpawnConfig::default().deployments_per_side,
        }
    }
}

impl BatchConfig {
    /// `game_count` games of the scenario labelled `scenario`.
    pub fn new(scenario: impl Into<String>, game_count: u32) -> Self {
        Self {
            scenario: scenario.into(),
            game_count,
            ..Self::default()
        }
    }

    /// First seed of the batch.
    #[must_use]
    pub fn seeded_from(mut self, seed: u64) -> Self {
        self.seed_start = seed;
        self
    }

    /// Cap every game at `max_frames`.
    #[must_use]
    pub fn capped_at(mut self, max_frames: u32) -> Self {
        self.max_frames = max_frames;
        self
    }

    /// Directory for the report.
    #[must_use]
    pub fn writing_to(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    fn seed_for(&self, index: u32) -> u64 {
        self.seed_start.wrapping_add(u64::from(index))
    }
}

/// A game that could not be played.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameFailure {
    /// Position in the batch
    pub index: u32,
    /// Seed the game was generated from
    pub seed: u64,
    /// Rendered error
    pub message: String,
}

/// Everything a batch produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchResults {
    /// The batch as configured
    pub config: BatchConfig,
    /// Finished games, in seed order
    pub games: Vec<GameMetrics>,
    /// Aggregates over `games`
    pub summary: BatchSummary,
    /// Wall-clock time of the whole batch
    pub duration_seconds: f64,
    /// Games that errored out
    pub failures: Vec<GameFailure>,
}

impl BatchResults {
    /// Write as pretty JSON, creating parent directories.
    pub fn save(&self, path: &Path) -> io::Result<()> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(writer, self).map_err(io::Error::from)
    }

    /// Read a file written by [`BatchResults::save`].
    pub fn load(path: &Path) -> io::Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        serde_json::from_reader(reader).map_err(io::Error::from)
    }
}

/// Running outcome counts, shared by the worker threads.
#[derive(Debug)]
pub struct BatchTally {
    total: u32,
    finished: AtomicU32,
    friendly_wins: AtomicU32,
    enemy_wins: AtomicU32,
    draws: AtomicU32,
    started: Instant,
}

impl BatchTally {
    /// Tally for a batch of `total` games.
    pub fn new(total: u32) -> Self {
        Self {
            total,
            finished: AtomicU32::new(0),
            friendly_wins: AtomicU32::new(0),
            enemy_wins: AtomicU32::new(0),
            draws: AtomicU32::new(0),
            started: Instant::now(),
        }
    }

    /// Count one finished game; returns how many are done.
    pub fn record(&self, result: GameResult) -> u32 {
        let counter = match result {
            GameResult::FriendlyWin => Some(&self.friendly_wins),
            GameResult::EnemyWin => Some(&self.enemy_wins),
            GameResult::Draw => Some(&self.draws),
            GameResult::InProgress => None,
        };
        if let Some(counter) = counter {
            counter.fetch_add(1, Ordering::Relaxed);
        }
        self.finished.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Games finished so far.
    pub fn finished(&self) -> u32 {
        self.finished.load(Ordering::Relaxed)
    }

    /// Finished fraction in `0.0..=1.0`.
    pub fn fraction_done(&self) -> f64 {
        f64::from(self.finished()) / f64::from(self.total.max(1))
    }

    /// Share of finished games won by each side.
    pub fn win_shares(&self) -> (f64, f64) {
        let finished = f64::from(self.finished().max(1));
        (
            f64::from(self.friendly_wins.load(Ordering::Relaxed)) / finished,
            f64::from(self.enemy_wins.load(Ordering::Relaxed)) / finished,
        )
    }

    /// Seconds left at the current pace.
    pub fn seconds_remaining(&self) -> f64 {
        let finished = self.finished();
        if finished == 0 {
            return 0.0;
        }
        let pace = self.started.elapsed().as_secs_f64() / f64::from(finished);
        pace * f64::from(self.total.saturating_sub(finished))
    }

    fn log(&self) {
        let (friendly, enemy) = self.win_shares();
        info!(
            finished = self.finished(),
            total = self.total,
            percent = format!("{:.1}", self.fraction_done() * 100.0),
            eta_secs = format!("{:.0}", self.seconds_remaining()),
            friendly_win_rate = format!("{:.1}%", friendly * 100.0),
            enemy_win_rate = format!("{:.1}%", enemy * 100.0),
            draws = self.draws.load(Ordering::Relaxed),
            "Batch progress"
        );
    }
}

/// Generate and play the game seeded with `seed`.
fn play_one(base: &Scenario, seed: u64, config: &BatchConfig, spawns: &SpawnConfig) -> Result<GameMetrics, String> {
    let scenario = generate_dynamic_scenario(seed, base, spawns);
    let options = RunOptions {
        max_frames: (config.max_frames > 0).then_some(config.max_frames),
        seed,
        ..RunOptions::default()
    };
    let mut metrics = run_scenario(&scenario, &options).map_err(|e| e.to_string())?;
    metrics.game_id = format!("game_{seed}");
    metrics.scenario = base.name.clone();
    Ok(metrics)
}

/// Play every game of the batch and aggregate the results.
pub fn run_batch(base: &Scenario, config: BatchConfig) -> BatchResults {
    let started = Instant::now();
    let tally = BatchTally::new(config.game_count);
    let spawns = SpawnConfig {
        deployments_per_side: config.deployments_per_side,
        ..SpawnConfig::default()
    };

    info!(
        games = config.game_count,
        scenario = %config.scenario,
        seed_start = config.seed_start,
        "Batch started"
    );

    let play = || -> Vec<Result<GameMetrics, GameFailure>> {
        (0..config.game_count)
            .into_par_iter()
            .map(|index| -> Result<GameMetrics, GameFailure> {
                let seed = config.seed_for(index);
                let metrics = play_one(base, seed, &config, &spawns).map_err(|message| {
                    warn!(index, seed, %message, "Game failed");
                    GameFailure { index, seed, message }
                })?;
                let finished = tally.record(metrics.result);
                debug!(seed, finished, result = ?metrics.result, "Game finished");
                if finished % LOG_EVERY == 0 {
                    tally.log();
                }
                Ok(metrics)
            })
            .collect()
    };

    let outcomes = match rayon::ThreadPoolBuilder::new()
        .num_threads(config.parallel_games as usize)
        .build()
    {
        Ok(pool) => pool.install(play),
        Err(e) => {
            warn!(error = %e, "Could not build a dedicated pool; using the global one");
            play()
        }
    };

    let mut games = Vec::with_capacity(outcomes.len());
    let mut failures = Vec::new();
    for outcome in outcomes {
        match outcome {
            Ok(metrics) => games.push(metrics),
            Err(failure) => failures.push(failure),
        }
    }

    let summary = BatchSummary::from_games(&games);
    let duration_seconds = started.elapsed().as_secs_f64();
    info!(
        played = games.len(),
        failed = failures.len(),
        secs = format!("{duration_seconds:.1}"),
        games_per_sec = format!("{:.1}", games.len() as f64 / duration_seconds.max(0.001)),
        "Batch finished"
    );

    BatchResults {
        config,
        games,
        summary,
        duration_seconds,
        failures,
    }
}
