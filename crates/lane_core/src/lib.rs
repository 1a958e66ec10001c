//! # Lane Core
//!
//! Deterministic two-faction lane battle simulation.
//!
//! This crate contains **only** deterministic logic:
//! - No rendering
//! - No IO in the frame loop (loading data and replays is explicit)
//! - No randomness in the simulation (the pathfinder survey is seeded)
//! - No floating-point math (uses fixed-point)
//!
//! This separation enables:
//! - Headless batch runs
//! - Replay and seek
//! - Determinism testing
//!
//! ## Crate Structure
//!
//! - [`simulator`] - Frame scheduler and external commands
//! - [`unit`], [`tower`], [`abilities`] - Battle entities
//! - [`squad`], [`enemy`], [`tower_behavior`], [`targeting`] - Behaviour
//! - [`movement`], [`avoidance`], [`combat`] - Per-unit mechanics
//! - [`grid`], [`pathfinding`], [`smoothing`], [`obstacles`], [`progress`] - Navigation
//! - [`config`], [`map`], [`setup`], [`registry`], [`waves`] - Data
//! - [`frame`], [`callbacks`], [`replay`] - Output
//! - [`math`] - Fixed-point math utilities

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]

pub mod abilities;
pub mod avoidance;
pub mod callbacks;
pub mod combat;
pub mod command;
pub mod config;
pub mod enemy;
pub mod error;
pub mod events;
pub mod frame;
pub mod grid;
pub mod map;
pub mod math;
pub mod movement;
pub mod obstacles;
pub mod pathfinding;
pub mod progress;
pub mod registry;
pub mod replay;
pub mod session;
pub mod setup;
pub mod simulator;
pub mod smoothing;
pub mod squad;
pub mod survey;
pub mod targeting;
pub mod tower;
pub mod tower_behavior;
pub mod unit;
pub mod waves;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::abilities::{AbilityData, AbilityType};
    pub use crate::callbacks::{
        CompletionReason, NullSink, RecordingSink, SimulatorCallbacks, TracingSink, UnitEvent,
        UnitEventKind,
    };
    pub use crate::command::{CommandKind, SimCommand};
    pub use crate::config::GameBalance;
    pub use crate::error::{GameError, Result};
    pub use crate::frame::{FrameData, TowerStateData, UnitStateData};
    pub use crate::map::MapLayout;
    pub use crate::math::{Fixed, Vec2Fixed};
    pub use crate::registry::{UnitDefinition, UnitRegistry};
    pub use crate::replay::{Replay, ReplayPlayer};
    pub use crate::session::{GameResult, GameSession, WinCondition};
    pub use crate::setup::{InitialSetup, TowerSetup, UnitSpawnSetup};
    pub use crate::simulator::SimulatorCore;
    pub use crate::tower::{Tower, TowerId, TowerType};
    pub use crate::unit::{Faction, MovementLayer, Unit, UnitArena, UnitId, UnitRole};
    pub use crate::waves::{WaveDefinition, WaveSchedule, WaveSpawnGroup};
}
