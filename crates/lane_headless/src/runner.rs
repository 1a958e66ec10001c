//! Scenario runs, frame output and determinism checks.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use lane_core::callbacks::{CompletionReason, NullSink, SimulatorCallbacks, UnitEvent};
use lane_core::error::GameError;
use lane_core::frame::FrameData;
use lane_core::replay::Replay;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::metrics::{GameMetrics, MetricsCollector};
use crate::scenario::{Scenario, ScenarioError};

/// Error type for headless runs.
#[derive(Error, Debug)]
pub enum RunError {
    /// Scenario could not be loaded or built.
    #[error(transparent)]
    Scenario(#[from] ScenarioError),
    /// Simulator failure (checkpoint, hash, replay file).
    #[error(transparent)]
    Game(#[from] GameError),
    /// Output file failure.
    #[error("Output error: {0}")]
    Io(#[from] io::Error),
}

/// Options for [`run_scenario`].
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Override of the scenario's `max_frames`.
    pub max_frames: Option<u32>,
    /// Write every frame as a JSON line here.
    pub frames_output: Option<PathBuf>,
    /// Record a replay file here.
    pub record_replay: Option<PathBuf>,
    /// Seed stamped on the metrics.
    pub seed: u64,
}

/// Writes each frame as one JSON line and forwards everything to `inner`.
pub struct JsonLinesSink<'a, W: Write> {
    writer: W,
    inner: &'a mut dyn SimulatorCallbacks,
    frames_written: u32,
    error: Option<io::Error>,
}

impl<'a, W: Write> JsonLinesSink<'a, W> {
    /// Sink over `writer`.
    pub fn new(writer: W, inner: &'a mut dyn SimulatorCallbacks) -> Self {
        Self {
            writer,
            inner,
            frames_written: 0,
            error: None,
        }
    }

    /// Frames written so far.
    #[must_use]
    pub const fn frames_written(&self) -> u32 {
        self.frames_written
    }

    /// Flush, surfacing the first write error if any.
    pub fn finish(mut self) -> io::Result<u32> {
        if let Some(e) = self.error.take() {
            return Err(e);
        }
        self.writer.flush()?;
        Ok(self.frames_written)
    }

    fn write_frame(&mut self, frame: &FrameData) -> io::Result<()> {
        let line = frame
            .to_json_line()
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))?;
        writeln!(self.writer, "{line}")
    }
}

impl<W: Write> SimulatorCallbacks for JsonLinesSink<'_, W> {
    fn on_frame(&mut self, frame: &FrameData) {
        if self.error.is_none() {
            match self.write_frame(frame) {
                Ok(()) => self.frames_written += 1,
                Err(e) => {
                    warn!(frame = frame.frame_number, error = %e, "Frame output failed");
                    self.error = Some(e);
                }
            }
        }
        self.inner.on_frame(frame);
    }

    fn on_unit_event(&mut self, event: &UnitEvent) {
        self.inner.on_unit_event(event);
    }

    fn on_wave_started(&mut self, wave: u32) {
        self.inner.on_wave_started(wave);
    }

    fn on_simulation_complete(&mut self, frame: u32, reason: CompletionReason) {
        self.inner.on_simulation_complete(frame, reason);
    }

    fn on_state_changed(&mut self, description: &str) {
        self.inner.on_state_changed(description);
    }
}

/// Run `scenario` to completion and collect its metrics.
pub fn run_scenario(scenario: &Scenario, options: &RunOptions) -> Result<GameMetrics, RunError> {
    let mut scenario = scenario.clone();
    if let Some(max_frames) = options.max_frames {
        scenario.balance.max_frames = max_frames;
    }
    let mut sim = scenario.build()?;
    let mut replay = match &options.record_replay {
        Some(_) => Some(Replay::new(scenario.name.clone(), &sim)?),
        None => None,
    };
    sim.enqueue_all(scenario.commands.iter().cloned());

    let mut collector = MetricsCollector::new(&scenario.name, &scenario.name, options.seed);
    let reason = match &options.frames_output {
        Some(path) => {
            let writer = BufWriter::new(File::create(path)?);
            let mut sink = JsonLinesSink::new(writer, &mut collector);
            let reason = sim.run(&mut sink);
            let written = sink.finish()?;
            debug!(path = %path.display(), frames = written, "Frames written");
            reason
        }
        None => sim.run(&mut collector),
    };
    let hash = sim.state_hash()?;

    if let (Some(replay), Some(path)) = (replay.as_mut(), &options.record_replay) {
        replay.commands = scenario.commands.clone();
        replay.finalize(sim.frame(), hash);
        replay.save(path)?;
        info!(path = %path.display(), frames = replay.final_frame, "Replay recorded");
    }

    info!(
        scenario = %scenario.name,
        frames = sim.frame(),
        ?reason,
        result = ?sim.session().result,
        "Scenario finished"
    );
    Ok(collector.finalize(hash))
}

/// Frame-by-frame JSON and final hash of one run.
fn json_run(scenario: &Scenario) -> Result<(Vec<String>, u64), RunError> {
    let mut sim = scenario.build_with_commands()?;
    let mut lines = Vec::new();
    for _ in 0..scenario.balance.max_frames {
        let frame = sim.step(&mut NullSink);
        lines.push(frame.to_json_line()?);
        if sim.is_game_over() {
            break;
        }
    }
    Ok((lines, sim.state_hash()?))
}

/// First place two runs disagreed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Divergence {
    /// Run index (the reference run is 0).
    pub run: u32,
    /// First differing frame; `None` if only the final hash differs.
    pub frame: Option<u32>,
}

/// Outcome of [`verify_determinism`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyReport {
    /// Runs compared.
    pub runs: u32,
    /// Frames per run.
    pub frames: u32,
    /// Final hash of the reference run.
    pub final_hash: u64,
    /// First disagreement, if any.
    pub divergence: Option<Divergence>,
}

impl VerifyReport {
    /// Whether every run matched the reference run.
    #[must_use]
    pub const fn is_deterministic(&self) -> bool {
        self.divergence.is_none()
    }
}

/// Run `scenario` `runs` times in parallel and compare every frame's JSON
/// and the final state hash against the first run.
pub fn verify_determinism(scenario: &Scenario, runs: u32) -> Result<VerifyReport, RunError> {
    let runs = runs.max(1);
    let results: Vec<(Vec<String>, u64)> = (0..runs)
        .into_par_iter()
        .map(|_| json_run(scenario))
        .collect::<Result<_, _>>()?;

    let (reference, reference_hash) = &results[0];
    let mut divergence = None;
    for (run, (lines, hash)) in results.iter().enumerate().skip(1) {
        let frame = reference
            .iter()
            .zip(lines)
            .position(|(a, b)| a != b)
            .or_else(|| (reference.len() != lines.len()).then(|| reference.len().min(lines.len())));
        if frame.is_some() || hash != reference_hash {
            divergence = Some(Divergence {
                run: u32::try_from(run).unwrap_or(u32::MAX),
                frame: frame.and_then(|f| u32::try_from(f).ok()),
            });
            break;
        }
    }

    Ok(VerifyReport {
        runs,
        frames: u32::try_from(reference.len()).unwrap_or(u32::MAX),
        final_hash: *reference_hash,
        divergence,
    })
}

/// Read a frames file written by [`run_scenario`].
pub fn read_frames(path: &Path) -> Result<Vec<FrameData>, RunError> {
    let contents = std::fs::read_to_string(path)?;
    contents
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| FrameData::from_json(line).map_err(RunError::from))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use lane_core::replay::ReplayPlayer;
    use lane_core::session::GameResult;

    fn short_skirmish() -> Scenario {
        let mut scenario = Scenario::skirmish();
        scenario.balance.max_frames = 240;
        scenario
    }

    #[test]
    fn test_run_collects_metrics() {
        let metrics = run_scenario(&short_skirmish(), &RunOptions::default()).unwrap();
        assert_eq!(metrics.frames, 240);
        assert_eq!(metrics.completion, Some(CompletionReason::MaxFramesReached));
        assert_eq!(metrics.result, GameResult::InProgress);
        assert!(metrics.waves_reached >= 1);
        assert_eq!(metrics.friendly.total_spawned(), 3);
    }

    #[test]
    fn test_frames_written_as_json_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frames.jsonl");
        let options = RunOptions {
            max_frames: Some(50),
            frames_output: Some(path.clone()),
            ..RunOptions::default()
        };
        run_scenario(&Scenario::skirmish(), &options).unwrap();

        let frames = read_frames(&path).unwrap();
        assert_eq!(frames.len(), 50);
        assert_eq!(frames[0].frame_number, 0);
        assert_eq!(frames[49].frame_number, 49);
    }

    #[test]
    fn test_recorded_replay_verifies() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.replay");
        let options = RunOptions {
            max_frames: Some(120),
            record_replay: Some(path.clone()),
            ..RunOptions::default()
        };
        let metrics = run_scenario(&Scenario::skirmish(), &options).unwrap();

        let replay = Replay::load(&path).unwrap();
        assert_eq!(replay.final_frame, 120);
        assert_eq!(replay.final_hash, metrics.final_state_hash);
        assert_eq!(replay.command_count(), 3);
        let mut player = ReplayPlayer::new(replay).unwrap();
        assert!(player.verify().unwrap());
    }

    #[test]
    fn test_verify_determinism_passes() {
        let mut scenario = short_skirmish();
        scenario.balance.max_frames = 150;
        let report = verify_determinism(&scenario, 3).unwrap();
        assert!(report.is_deterministic());
        assert_eq!(report.runs, 3);
        assert_eq!(report.frames, 150);
    }

    #[test]
    fn test_missing_frames_file() {
        let err = read_frames(Path::new("/definitely/not/here.jsonl")).unwrap_err();
        assert!(matches!(err, RunError::Io(_)));
    }
}
