//! Test fixtures and helpers.
//!
//! Pre-built simulators, grids and command scripts for consistent testing.

use fixed::types::I32F32;
use lane_core::command::{CommandKind, SimCommand};
use lane_core::config::GameBalance;
use lane_core::grid::PathfindingGrid;
use lane_core::math::Vec2Fixed;
use lane_core::registry::UnitRegistry;
use lane_core::setup::InitialSetup;
use lane_core::simulator::SimulatorCore;
use lane_core::unit::{Faction, UnitId, UnitRole};
use lane_core::waves::WaveSchedule;

/// Create a fixed-point number from an integer.
#[must_use]
pub fn fixed(n: i32) -> I32F32 {
    I32F32::from_num(n)
}

/// Create a fixed-point number from a float (for tests only).
///
/// Note: In real simulation code, never use floats.
/// This is only for convenient test setup.
#[must_use]
pub fn fixed_f(n: f64) -> I32F32 {
    I32F32::from_num(n)
}

/// Integer world position.
#[must_use]
pub fn pos(x: i32, y: i32) -> Vec2Fixed {
    Vec2Fixed::from_ints(x, y)
}

/// Default balance with a frame cap.
#[must_use]
pub fn balance_with_frames(max_frames: u32) -> GameBalance {
    GameBalance {
        max_frames,
        ..GameBalance::default()
    }
}

/// Six towers, default registry, no units, no waves.
///
/// # Panics
///
/// Panics if the default data fails validation.
#[must_use]
pub fn standard_sim() -> SimulatorCore {
    SimulatorCore::new(
        GameBalance::default(),
        UnitRegistry::with_defaults(),
        InitialSetup::standard(),
    )
    .expect("default data is valid")
}

/// Standard simulator driven by the built-in three-wave schedule.
///
/// # Panics
///
/// Panics if the default data fails validation.
#[must_use]
pub fn wave_sim(max_frames: u32) -> SimulatorCore {
    SimulatorCore::with_waves(
        balance_with_frames(max_frames),
        UnitRegistry::with_defaults(),
        InitialSetup::standard(),
        WaveSchedule::standard(),
    )
    .expect("default data is valid")
}

/// Spawn a registry unit.
#[must_use]
pub fn spawn_cmd(frame: u32, unit_id: &str, faction: Faction, x: i32, y: i32) -> SimCommand {
    SimCommand::new(
        frame,
        CommandKind::SpawnDefinition {
            unit_id: unit_id.to_string(),
            faction,
            position: pos(x, y),
            hp: None,
        },
    )
}

/// Spawn a role-default unit.
#[must_use]
pub fn spawn_role_cmd(frame: u32, role: UnitRole, faction: Faction, x: i32, y: i32) -> SimCommand {
    SimCommand::new(
        frame,
        CommandKind::SpawnUnit {
            role,
            faction,
            position: pos(x, y),
            hp: None,
        },
    )
}

/// Kill a unit.
#[must_use]
pub fn kill_cmd(frame: u32, unit: UnitId) -> SimCommand {
    SimCommand::new(frame, CommandKind::KillUnit { unit })
}

/// A small mixed skirmish across the river: friendly golemite, minion and
/// ranged squad against enemy skeletons, a guard and an elixir golemite.
#[must_use]
pub fn skirmish_commands() -> Vec<SimCommand> {
    vec![
        spawn_cmd(0, "golemite", Faction::Friendly, 1600, 1600),
        spawn_cmd(0, "minion", Faction::Friendly, 1500, 1500),
        spawn_role_cmd(0, UnitRole::Ranged, Faction::Friendly, 1700, 1500),
        spawn_cmd(0, "skeleton", Faction::Enemy, 600, 3000),
        spawn_cmd(0, "skeleton", Faction::Enemy, 650, 3000),
        spawn_cmd(10, "guard", Faction::Enemy, 2600, 3200),
        spawn_cmd(20, "elixir_golemite", Faction::Enemy, 1600, 3400),
        spawn_cmd(40, "bat", Faction::Enemy, 1600, 3600),
    ]
}

/// Standard simulator with [`skirmish_commands`] queued.
#[must_use]
pub fn skirmish_sim() -> SimulatorCore {
    let mut sim = standard_sim();
    sim.enqueue_all(skirmish_commands());
    sim
}

/// Open grid of `width × height` cells of size 10.
#[must_use]
pub fn open_grid(width: i32, height: i32) -> PathfindingGrid {
    PathfindingGrid::new(fixed(width * 10), fixed(height * 10), fixed(10))
}

/// Open grid with a vertical wall at column `x` spanning rows `0..height`
/// except `gap_row`, if any.
#[must_use]
pub fn walled_grid(width: i32, height: i32, x: i32, gap_row: Option<i32>) -> PathfindingGrid {
    let mut grid = open_grid(width, height);
    for y in 0..height {
        if Some(y) != gap_row {
            grid.set_walkable(x, y, false);
        }
    }
    grid
}

/// World position of a cell centre on a size-10 grid.
#[must_use]
pub fn cell_center(x: i32, y: i32) -> Vec2Fixed {
    Vec2Fixed::new(fixed(x * 10) + fixed(5), fixed(y * 10) + fixed(5))
}
