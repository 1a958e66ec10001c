//! Recorded battles.
//!
//! A [`Replay`] is a bincode checkpoint of the simulator taken before the
//! first frame plus every command that was queued. Stepping a restored
//! checkpoint through the same commands recreates each frame exactly, so a
//! replay file never stores frames.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::callbacks::NullSink;
use crate::command::SimCommand;
use crate::error::{GameError, Result};
use crate::frame::FrameData;
use crate::simulator::SimulatorCore;

/// Bumped whenever the on-disk layout or the simulation rules change.
pub const REPLAY_VERSION: u32 = 1;

/// Upper bound for [`ReplayPlayer::set_frames_per_advance`].
pub const MAX_FRAMES_PER_ADVANCE: u32 = 16;

/// A recorded battle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Replay {
    /// Layout version, checked on load.
    pub version: u32,
    /// Free-form label, usually the scenario name.
    pub scenario_id: String,
    /// [`SimulatorCore::checkpoint`] bytes from before the first frame.
    pub initial_state: Vec<u8>,
    /// Every command, in queue order.
    pub commands: Vec<SimCommand>,
    /// Frames the recorded run stepped.
    pub final_frame: u32,
    /// [`SimulatorCore::state_hash`] after `final_frame` frames.
    pub final_hash: u64,
}

impl Replay {
    /// Start a recording from `sim` as it is now.
    pub fn new(scenario_id: impl Into<String>, sim: &SimulatorCore) -> Result<Self> {
        Ok(Self {
            version: REPLAY_VERSION,
            scenario_id: scenario_id.into(),
            initial_state: sim.checkpoint()?,
            commands: Vec::new(),
            final_frame: 0,
            final_hash: 0,
        })
    }

    /// Append a command.
    pub fn record_command(&mut self, command: SimCommand) {
        self.commands.push(command);
    }

    /// Stamp the end of the recording.
    pub fn finalize(&mut self, final_frame: u32, final_hash: u64) {
        self.final_frame = final_frame;
        self.final_hash = final_hash;
    }

    /// Checkpoint `sim`, queue `commands`, run it until [`SimulatorCore::run`]
    /// stops and stamp the end state.
    pub fn record_run(scenario_id: impl Into<String>, sim: &mut SimulatorCore, commands: Vec<SimCommand>) -> Result<Self> {
        let mut replay = Self::new(scenario_id, sim)?;
        let first_frame = sim.frame();
        sim.enqueue_all(commands.iter().cloned());
        replay.commands = commands;
        sim.run(&mut NullSink);
        replay.finalize(sim.frame() - first_frame, sim.state_hash()?);
        Ok(replay)
    }

    /// Write the replay as bincode.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let bytes =
            bincode::serialize(self).map_err(|e| GameError::InvalidState(format!("Replay encoding failed: {e}")))?;
        std::fs::write(path, bytes)
            .map_err(|e| GameError::InvalidState(format!("Cannot write replay {}: {e}", path.display())))
    }

    /// Read a replay written by [`Replay::save`].
    ///
    /// # Errors
    ///
    /// Unreadable files and bad bytes are [`GameError::DataParseError`]; a
    /// replay from another [`REPLAY_VERSION`] is [`GameError::InvalidState`].
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let parse_error = |message: String| GameError::DataParseError {
            path: path.display().to_string(),
            message,
        };
        let bytes = std::fs::read(path).map_err(|e| parse_error(e.to_string()))?;
        let replay: Self = bincode::deserialize(&bytes).map_err(|e| parse_error(e.to_string()))?;
        if replay.version != REPLAY_VERSION {
            return Err(GameError::InvalidState(format!(
                "{} was recorded with replay version {}, this build reads {REPLAY_VERSION}",
                path.display(),
                replay.version
            )));
        }
        Ok(replay)
    }

    /// Fresh simulator from the stored checkpoint, commands not yet queued.
    pub fn restore_initial_state(&self) -> Result<SimulatorCore> {
        SimulatorCore::restore(&self.initial_state)
    }

    /// Commands stamped with `frame`.
    #[must_use]
    pub fn commands_at_frame(&self, frame: u32) -> Vec<&SimCommand> {
        self.commands.iter().filter(|cmd| cmd.frame == frame).collect()
    }

    /// Recorded length in frames.
    #[must_use]
    pub const fn duration(&self) -> u32 {
        self.final_frame
    }

    /// Number of recorded commands.
    #[must_use]
    pub fn command_count(&self) -> usize {
        self.commands.len()
    }
}

/// Steps a replay forward, backward (by re-running) and to its end.
///
/// The simulator is private; callers read it through [`ReplayPlayer::simulation`].
#[derive(Debug)]
pub struct ReplayPlayer {
    replay: Replay,
    simulation: SimulatorCore,
    played: u32,
    last_frame: Option<FrameData>,
    frames_per_advance: u32,
    paused: bool,
}

impl ReplayPlayer {
    /// Player positioned before the first frame.
    pub fn new(replay: Replay) -> Result<Self> {
        let simulation = Self::rewind(&replay)?;
        Ok(Self {
            replay,
            simulation,
            played: 0,
            last_frame: None,
            frames_per_advance: 1,
            paused: false,
        })
    }

    fn rewind(replay: &Replay) -> Result<SimulatorCore> {
        let mut simulation = replay.restore_initial_state()?;
        simulation.enqueue_all(replay.commands.iter().cloned());
        Ok(simulation)
    }

    fn play_frame(&mut self) {
        self.last_frame = Some(self.simulation.step(&mut NullSink));
        self.played += 1;
    }

    /// Play up to [`ReplayPlayer::frames_per_advance`] frames unless paused.
    /// Returns whether frames remain.
    pub fn advance(&mut self) -> bool {
        if !self.paused {
            for _ in 0..self.frames_per_advance {
                if self.is_finished() {
                    break;
                }
                self.play_frame();
            }
        }
        !self.is_finished()
    }

    /// Restart from the checkpoint and play to `target_frame`, clamped to
    /// the recorded length.
    pub fn seek(&mut self, target_frame: u32) -> Result<()> {
        self.simulation = Self::rewind(&self.replay)?;
        self.played = 0;
        self.last_frame = None;
        let target = target_frame.min(self.replay.final_frame);
        while self.played < target {
            self.play_frame();
        }
        Ok(())
    }

    /// Play to the end and compare the state hash with the recorded one.
    pub fn verify(&mut self) -> Result<bool> {
        self.seek(self.replay.final_frame)?;
        Ok(self.simulation.state_hash()? == self.replay.final_hash)
    }

    /// Frames played so far.
    #[must_use]
    pub const fn current_frame(&self) -> u32 {
        self.played
    }

    /// The simulator at the current position.
    #[must_use]
    pub const fn simulation(&self) -> &SimulatorCore {
        &self.simulation
    }

    /// Snapshot of the last frame played.
    #[must_use]
    pub const fn last_frame(&self) -> Option<&FrameData> {
        self.last_frame.as_ref()
    }

    /// The recording being played.
    #[must_use]
    pub const fn replay(&self) -> &Replay {
        &self.replay
    }

    /// Whether every recorded frame has been played.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.played >= self.replay.final_frame
    }

    /// Whether [`ReplayPlayer::advance`] is currently a no-op.
    #[must_use]
    pub const fn is_paused(&self) -> bool {
        self.paused
    }

    /// Pause or resume.
    pub fn toggle_pause(&mut self) {
        self.paused = !self.paused;
    }

    /// Frames played per [`ReplayPlayer::advance`].
    #[must_use]
    pub const fn frames_per_advance(&self) -> u32 {
        self.frames_per_advance
    }

    /// Clamped to `1..=MAX_FRAMES_PER_ADVANCE`.
    pub fn set_frames_per_advance(&mut self, frames: u32) {
        self.frames_per_advance = frames.clamp(1, MAX_FRAMES_PER_ADVANCE);
    }

    /// Played share of the recording, 0 to 100. An empty recording is complete.
    #[must_use]
    pub fn progress_percent(&self) -> f64 {
        if self.replay.final_frame == 0 {
            return 100.0;
        }
        f64::from(self.played) * 100.0 / f64::from(self.replay.final_frame)
    }
}
