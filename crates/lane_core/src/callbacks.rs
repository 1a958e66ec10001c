//! Injected event sink.
//!
//! The simulator reports frames, unit events, wave starts and completion
//! through [`SimulatorCallbacks`]. Every method has a no-op default so a
//! sink only implements what it cares about.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::frame::FrameData;
use crate::math::{vec2_decimal, Vec2Fixed};
use crate::unit::{Faction, UnitId};

/// Kind of [`UnitEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnitEventKind {
    /// Unit entered the arena.
    Spawned,
    /// Unit died.
    Died,
    /// Unit lost HP or shield.
    Damaged,
    /// Unit attacked.
    Attack,
    /// Unit picked a new target.
    TargetAcquired,
    /// Unit was sent somewhere by a command.
    Moved,
}

/// Something that happened to one unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitEvent {
    /// What happened.
    pub kind: UnitEventKind,
    /// Unit.
    pub unit_id: UnitId,
    /// Its side.
    pub faction: Faction,
    /// Frame.
    pub frame: u32,
    /// Other unit involved.
    pub target_id: Option<UnitId>,
    /// Amount (damage, HP).
    pub value: Option<i32>,
    /// Where it happened.
    #[serde(with = "vec2_decimal")]
    pub position: Vec2Fixed,
}

impl UnitEvent {
    /// Event without target or value.
    #[must_use]
    pub const fn new(
        kind: UnitEventKind,
        unit_id: UnitId,
        faction: Faction,
        frame: u32,
        position: Vec2Fixed,
    ) -> Self {
        Self {
            kind,
            unit_id,
            faction,
            frame,
            target_id: None,
            value: None,
            position,
        }
    }

    /// Attach the other unit.
    #[must_use]
    pub const fn with_target(mut self, target: UnitId) -> Self {
        self.target_id = Some(target);
        self
    }

    /// Attach an amount.
    #[must_use]
    pub const fn with_value(mut self, value: i32) -> Self {
        self.value = Some(value);
        self
    }
}

/// Why a [`run`](crate::simulator::SimulatorCore::run) stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CompletionReason {
    /// Every wave spawned and died.
    AllWavesCleared,
    /// Frame cap hit.
    MaxFramesReached,
    /// The match was decided.
    GameOver,
}

/// Receiver of simulation notifications.
pub trait SimulatorCallbacks {
    /// A frame finished.
    fn on_frame(&mut self, _frame: &FrameData) {}

    /// A unit event occurred.
    fn on_unit_event(&mut self, _event: &UnitEvent) {}

    /// A wave started.
    fn on_wave_started(&mut self, _wave: u32) {}

    /// A run ended.
    fn on_simulation_complete(&mut self, _frame: u32, _reason: CompletionReason) {}

    /// State was changed from outside the frame loop (reload, restore).
    fn on_state_changed(&mut self, _description: &str) {}
}

/// Ignores everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl SimulatorCallbacks for NullSink {}

/// Forwards notifications to `tracing`.
#[derive(Debug, Clone, Copy)]
pub struct TracingSink {
    /// Log every n-th frame at info level.
    pub frame_log_interval: u32,
}

impl Default for TracingSink {
    fn default() -> Self {
        Self {
            frame_log_interval: 100,
        }
    }
}

impl SimulatorCallbacks for TracingSink {
    fn on_frame(&mut self, frame: &FrameData) {
        if self.frame_log_interval > 0 && frame.frame_number % self.frame_log_interval == 0 {
            info!(
                frame = frame.frame_number,
                wave = frame.current_wave,
                friendlies = frame.living_friendly_count,
                enemies = frame.living_enemy_count,
                "Frame"
            );
        }
    }

    fn on_unit_event(&mut self, event: &UnitEvent) {
        debug!(
            frame = event.frame,
            unit = event.unit_id,
            faction = ?event.faction,
            kind = ?event.kind,
            target = ?event.target_id,
            value = ?event.value,
            "Unit event"
        );
    }

    fn on_wave_started(&mut self, wave: u32) {
        info!(wave, "Wave started");
    }

    fn on_simulation_complete(&mut self, frame: u32, reason: CompletionReason) {
        info!(frame, ?reason, "Simulation complete");
    }

    fn on_state_changed(&mut self, description: &str) {
        info!(description, "State changed");
    }
}

/// Buffers everything, for tests and tools.
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    /// Frames, in order.
    pub frames: Vec<FrameData>,
    /// Unit events, in order.
    pub unit_events: Vec<UnitEvent>,
    /// Waves started.
    pub waves_started: Vec<u32>,
    /// Completion, if reached.
    pub completion: Option<(u32, CompletionReason)>,
    /// State change descriptions.
    pub state_changes: Vec<String>,
    /// Keep full frames (off keeps only events).
    pub keep_frames: bool,
}

impl RecordingSink {
    /// Recorder that keeps frames too.
    #[must_use]
    pub fn with_frames() -> Self {
        Self {
            keep_frames: true,
            ..Self::default()
        }
    }

    /// Events of one kind.
    pub fn events_of(&self, kind: UnitEventKind) -> impl Iterator<Item = &UnitEvent> {
        self.unit_events.iter().filter(move |e| e.kind == kind)
    }
}

impl SimulatorCallbacks for RecordingSink {
    fn on_frame(&mut self, frame: &FrameData) {
        if self.keep_frames {
            self.frames.push(frame.clone());
        }
    }

    fn on_unit_event(&mut self, event: &UnitEvent) {
        self.unit_events.push(event.clone());
    }

    fn on_wave_started(&mut self, wave: u32) {
        self.waves_started.push(wave);
    }

    fn on_simulation_complete(&mut self, frame: u32, reason: CompletionReason) {
        self.completion = Some((frame, reason));
    }

    fn on_state_changed(&mut self, description: &str) {
        self.state_changes.push(description.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_sink() {
        let mut sink = RecordingSink::default();
        let event = UnitEvent::new(UnitEventKind::Died, 3, Faction::Enemy, 12, Vec2Fixed::ZERO)
            .with_target(1)
            .with_value(40);
        sink.on_unit_event(&event);
        sink.on_unit_event(&UnitEvent::new(
            UnitEventKind::Spawned,
            4,
            Faction::Enemy,
            12,
            Vec2Fixed::ZERO,
        ));
        sink.on_wave_started(2);
        sink.on_simulation_complete(99, CompletionReason::GameOver);
        sink.on_state_changed("restored");

        assert_eq!(sink.events_of(UnitEventKind::Died).count(), 1);
        assert_eq!(sink.unit_events[0].target_id, Some(1));
        assert_eq!(sink.unit_events[0].value, Some(40));
        assert_eq!(sink.waves_started, vec![2]);
        assert_eq!(sink.completion, Some((99, CompletionReason::GameOver)));
        assert_eq!(sink.state_changes, vec!["restored".to_string()]);
    }

    #[test]
    fn test_default_methods_are_no_ops() {
        let mut sink = NullSink;
        sink.on_wave_started(1);
        sink.on_state_changed("x");
        let mut tracing_sink = TracingSink::default();
        tracing_sink.on_wave_started(1);
    }
}
