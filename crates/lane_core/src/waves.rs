//! Wave schedule.
//!
//! A wave is a list of spawn groups timed relative to the frame the wave
//! starts. Wave 1 starts after its own delay; every later wave starts once
//! the previous one has finished spawning and no enemy is left alive, after
//! its delay.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{GameError, Result};
use crate::math::{option_vec2_decimal, Vec2Fixed};
use crate::unit::Faction;

fn default_count() -> u32 {
    1
}

fn default_faction() -> Faction {
    Faction::Enemy
}

fn default_interval() -> u32 {
    30
}

/// A group of identical units spawned one after another.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaveSpawnGroup {
    /// Registry id.
    pub unit_id: String,
    /// Units in the group.
    #[serde(default = "default_count")]
    pub count: u32,
    /// Side.
    #[serde(default = "default_faction")]
    pub faction: Faction,
    /// First spawn, in frames after the wave starts.
    #[serde(default)]
    pub spawn_frame: u32,
    /// Frames between consecutive spawns of the group.
    #[serde(default = "default_interval")]
    pub spawn_interval: u32,
    /// Spawn point; `None` uses the faction spawn point of the map.
    #[serde(default, with = "option_vec2_decimal")]
    pub spawn_position: Option<Vec2Fixed>,
}

impl WaveSpawnGroup {
    /// Group of `count` `unit_id` enemies at the default spawn point.
    #[must_use]
    pub fn enemies(unit_id: &str, count: u32) -> Self {
        Self {
            unit_id: unit_id.to_string(),
            count,
            faction: Faction::Enemy,
            spawn_frame: 0,
            spawn_interval: default_interval(),
            spawn_position: None,
        }
    }

    /// Frame (relative to the wave start) of the group's last spawn.
    #[must_use]
    pub fn last_spawn_frame(&self) -> Option<u32> {
        let last = self.count.checked_sub(1)?;
        Some(self.spawn_frame.saturating_add(last.saturating_mul(self.spawn_interval)))
    }

    /// How many units the group spawns at `relative_frame`.
    #[must_use]
    pub fn spawns_at(&self, relative_frame: u32) -> u32 {
        let Some(since) = relative_frame.checked_sub(self.spawn_frame) else {
            return 0;
        };
        if self.spawn_interval == 0 {
            return if since == 0 { self.count } else { 0 };
        }
        let due = since % self.spawn_interval == 0 && since / self.spawn_interval < self.count;
        u32::from(due)
    }
}

/// One wave.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaveDefinition {
    /// 1-based index.
    pub wave_number: u32,
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// Frames to wait before the wave starts.
    #[serde(default)]
    pub delay_frames: u32,
    /// Spawn groups.
    #[serde(default)]
    pub spawn_groups: Vec<WaveSpawnGroup>,
}

impl WaveDefinition {
    /// Frame (relative to the wave start) of the wave's last spawn.
    #[must_use]
    pub fn last_spawn_frame(&self) -> Option<u32> {
        self.spawn_groups
            .iter()
            .filter_map(WaveSpawnGroup::last_spawn_frame)
            .max()
    }
}

/// A unit the schedule wants spawned this frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaveSpawn {
    /// Registry id.
    pub unit_id: String,
    /// Side.
    pub faction: Faction,
    /// Explicit position, if the group has one.
    pub position: Option<Vec2Fixed>,
}

/// Result of one schedule update.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WaveUpdate {
    /// Wave number that started this frame.
    pub started: Option<u32>,
    /// Spawns due this frame.
    pub spawns: Vec<WaveSpawn>,
}

/// Authored waves plus progress through them.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct WaveSchedule {
    /// Waves in order.
    pub waves: Vec<WaveDefinition>,
    /// Current 1-based wave; 0 before the first starts.
    #[serde(default)]
    current_wave: u32,
    /// Frame the current wave started.
    #[serde(default)]
    wave_start_frame: Option<u32>,
    /// Frame the next wave is due.
    #[serde(default)]
    next_wave_frame: Option<u32>,
    /// Current wave counts as fully spawned regardless of timing.
    #[serde(default)]
    spawning_done: bool,
}

impl WaveSchedule {
    /// Schedule over `waves`; wave 1 is due after its delay.
    #[must_use]
    pub fn new(waves: Vec<WaveDefinition>) -> Self {
        let next_wave_frame = waves.first().map(|w| w.delay_frames);
        Self {
            waves,
            current_wave: 0,
            wave_start_frame: None,
            next_wave_frame,
            spawning_done: false,
        }
    }

    /// Three escalating enemy waves of built-in units.
    #[must_use]
    pub fn standard() -> Self {
        Self::new(vec![
            WaveDefinition {
                wave_number: 1,
                name: "Skeleton rush".to_string(),
                delay_frames: 30,
                spawn_groups: vec![WaveSpawnGroup::enemies("skeleton", 6)],
            },
            WaveDefinition {
                wave_number: 2,
                name: "Guards and minions".to_string(),
                delay_frames: 60,
                spawn_groups: vec![
                    WaveSpawnGroup::enemies("guard", 4),
                    WaveSpawnGroup {
                        spawn_frame: 15,
                        ..WaveSpawnGroup::enemies("minion", 3)
                    },
                ],
            },
            WaveDefinition {
                wave_number: 3,
                name: "Golemites".to_string(),
                delay_frames: 60,
                spawn_groups: vec![
                    WaveSpawnGroup::enemies("golemite", 2),
                    WaveSpawnGroup::enemies("elixir_golemite", 2),
                ],
            },
        ])
    }

    /// Restart from before wave 1.
    pub fn reset(&mut self) {
        *self = Self::new(std::mem::take(&mut self.waves));
    }

    /// Continue from a snapshot taken during `wave`.
    ///
    /// The snapshot does not say how far the wave had spawned, so the wave is
    /// treated as fully spawned; the next one follows once the field is
    /// clear. `wave == 0` keeps the schedule at its start.
    pub fn resume_after(&mut self, wave: u32) {
        let wave = wave.min(u32::try_from(self.waves.len()).unwrap_or(u32::MAX));
        if wave == 0 {
            self.reset();
            return;
        }
        self.current_wave = wave;
        self.wave_start_frame = Some(0);
        self.next_wave_frame = None;
        self.spawning_done = true;
    }

    /// Current 1-based wave (0 before the first).
    #[must_use]
    pub const fn current_wave(&self) -> u32 {
        self.current_wave
    }

    /// Whether a wave after the current one exists.
    #[must_use]
    pub fn has_more_waves(&self) -> bool {
        (self.current_wave as usize) < self.waves.len()
    }

    fn current(&self) -> Option<&WaveDefinition> {
        let index = (self.current_wave as usize).checked_sub(1)?;
        self.waves.get(index)
    }

    /// Whether the current wave has spawned everything, as of `frame`.
    #[must_use]
    pub fn current_wave_spawned(&self, frame: u32) -> bool {
        let (Some(wave), Some(start)) = (self.current(), self.wave_start_frame) else {
            return false;
        };
        if self.spawning_done {
            return true;
        }
        let relative = frame.saturating_sub(start);
        wave.last_spawn_frame().map_or(true, |last| relative > last)
    }

    /// Every wave started, finished spawning, and no enemy lives.
    #[must_use]
    pub fn all_waves_cleared(&self, frame: u32, living_enemies: usize) -> bool {
        !self.waves.is_empty()
            && !self.has_more_waves()
            && self.current_wave_spawned(frame)
            && living_enemies == 0
    }

    /// Advance to `frame`: schedule and start waves, and list due spawns.
    ///
    /// `living_enemies` is the count before this frame's spawns.
    pub fn update(&mut self, frame: u32, living_enemies: usize) -> WaveUpdate {
        let mut update = WaveUpdate::default();

        if self.next_wave_frame.is_none()
            && self.has_more_waves()
            && self.current_wave_spawned(frame)
            && living_enemies == 0
        {
            let delay = self
                .waves
                .get(self.current_wave as usize)
                .map_or(0, |w| w.delay_frames);
            self.next_wave_frame = Some(frame.saturating_add(delay));
        }

        if self.next_wave_frame.is_some_and(|due| frame >= due) {
            self.next_wave_frame = None;
            self.current_wave += 1;
            self.wave_start_frame = Some(frame);
            self.spawning_done = false;
            if let Some(wave) = self.current() {
                info!(frame, wave = wave.wave_number, name = %wave.name, "Wave started");
            }
            update.started = Some(self.current_wave);
        }

        if self.spawning_done {
            return update;
        }
        let (Some(wave), Some(start)) = (self.current(), self.wave_start_frame) else {
            return update;
        };
        let relative = frame.saturating_sub(start);
        for group in &wave.spawn_groups {
            for _ in 0..group.spawns_at(relative) {
                update.spawns.push(WaveSpawn {
                    unit_id: group.unit_id.clone(),
                    faction: group.faction,
                    position: group.spawn_position,
                });
            }
        }
        update
    }

    /// Reject malformed waves.
    pub fn validate(&self) -> Result<()> {
        for wave in &self.waves {
            for group in &wave.spawn_groups {
                if group.unit_id.is_empty() {
                    return Err(GameError::InvalidConfig(format!(
                        "wave {} has a spawn group without a unit id",
                        wave.wave_number
                    )));
                }
                if group.count > 1 && group.spawn_interval == 0 {
                    tracing::debug!(
                        wave = wave.wave_number,
                        unit_id = %group.unit_id,
                        "Spawn group with zero interval spawns all at once"
                    );
                }
            }
        }
        Ok(())
    }

    /// Parse a RON list of waves into a fresh schedule.
    pub fn from_ron_str(source: &str) -> Result<Self> {
        Self::parse(source, "<inline>")
    }

    /// Load a RON list of waves.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|e| GameError::DataParseError {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Self::parse(&source, &path.display().to_string())
    }

    fn parse(source: &str, path: &str) -> Result<Self> {
        let waves: Vec<WaveDefinition> =
            ron::from_str(source).map_err(|e| GameError::DataParseError {
                path: path.to_string(),
                message: e.to_string(),
            })?;
        let schedule = Self::new(waves);
        schedule.validate()?;
        Ok(schedule)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schedule() -> WaveSchedule {
        WaveSchedule::new(vec![
            WaveDefinition {
                wave_number: 1,
                name: "one".to_string(),
                delay_frames: 2,
                spawn_groups: vec![WaveSpawnGroup {
                    spawn_interval: 3,
                    ..WaveSpawnGroup::enemies("skeleton", 2)
                }],
            },
            WaveDefinition {
                wave_number: 2,
                name: "two".to_string(),
                delay_frames: 5,
                spawn_groups: vec![WaveSpawnGroup::enemies("guard", 1)],
            },
        ])
    }

    #[test]
    fn test_group_timing() {
        let group = WaveSpawnGroup {
            spawn_frame: 10,
            spawn_interval: 5,
            ..WaveSpawnGroup::enemies("bat", 3)
        };
        let frames: Vec<u32> = (0..40).filter(|&f| group.spawns_at(f) > 0).collect();
        assert_eq!(frames, vec![10, 15, 20]);
        assert_eq!(group.last_spawn_frame(), Some(20));

        let burst = WaveSpawnGroup {
            spawn_interval: 0,
            ..WaveSpawnGroup::enemies("bat", 4)
        };
        assert_eq!(burst.spawns_at(0), 4);
        assert_eq!(burst.spawns_at(1), 0);
    }

    #[test]
    fn test_first_wave_waits_for_delay() {
        let mut s = schedule();
        assert!(s.update(0, 0).spawns.is_empty());
        assert!(s.update(1, 0).spawns.is_empty());
        let update = s.update(2, 0);
        assert_eq!(update.started, Some(1));
        assert_eq!(update.spawns.len(), 1);
        assert_eq!(update.spawns[0].unit_id, "skeleton");
        assert_eq!(s.current_wave(), 1);

        assert!(s.update(3, 1).spawns.is_empty());
        assert_eq!(s.update(5, 1).spawns.len(), 1);
    }

    #[test]
    fn test_next_wave_needs_clear_field() {
        let mut s = schedule();
        for frame in 0..=5 {
            s.update(frame, 0);
        }
        // Spawning done but enemies alive: no wave 2.
        for frame in 6..20 {
            assert_eq!(s.update(frame, 2).started, None);
        }
        // Field cleared at 20: wave 2 due at 25.
        assert_eq!(s.update(20, 0).started, None);
        for frame in 21..25 {
            assert_eq!(s.update(frame, 0).started, None);
        }
        let update = s.update(25, 0);
        assert_eq!(update.started, Some(2));
        assert_eq!(update.spawns[0].unit_id, "guard");
        assert!(!s.has_more_waves());
        assert!(!s.all_waves_cleared(25, 0));
        assert!(s.all_waves_cleared(26, 0));
        assert!(!s.all_waves_cleared(26, 1));
    }

    #[test]
    fn test_reset_and_empty_schedule() {
        let mut s = schedule();
        for frame in 0..5 {
            s.update(frame, 0);
        }
        s.reset();
        assert_eq!(s, schedule());

        let mut empty = WaveSchedule::default();
        assert_eq!(empty.update(0, 0), WaveUpdate::default());
        assert!(!empty.all_waves_cleared(10, 0));
    }

    #[test]
    fn test_resume_after_snapshot() {
        let mut s = schedule();
        s.resume_after(1);
        assert_eq!(s.current_wave(), 1);
        assert!(s.update(3, 1).spawns.is_empty());
        // Field clear: wave 2 after its delay.
        s.update(10, 0);
        assert_eq!(s.update(15, 0).started, Some(2));

        let mut fresh = schedule();
        fresh.resume_after(0);
        assert_eq!(fresh, schedule());
    }

    #[test]
    fn test_ron_waves() {
        let source = r#"[
            (wave_number: 1, name: "air", spawn_groups: [
                (unit_id: "minion", count: 2, spawn_position: Some((1600.0, 3500.0))),
            ]),
        ]"#;
        let s = WaveSchedule::from_ron_str(source).unwrap();
        assert_eq!(s.waves[0].spawn_groups[0].faction, Faction::Enemy);
        assert_eq!(s.waves[0].spawn_groups[0].spawn_interval, 30);
        assert!(WaveSchedule::from_ron_str("[(wave_number: 1, spawn_groups: [(unit_id: \"\")])]").is_err());
        assert!(WaveSchedule::standard().validate().is_ok());
    }
}
