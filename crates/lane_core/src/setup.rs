//! Initial match setup: tower layout, starting units and game time.
//!
//! Authored in RON. Positions and times are decimals; a tower without a
//! position takes its faction's default slot from the map layout.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{GameError, Result};
use crate::map::MapLayout;
use crate::math::{fixed_decimal, option_vec2_decimal, vec2_decimal, Fixed, Vec2Fixed, TAU};
use crate::tower::TowerType;
use crate::unit::Faction;

/// One tower to place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TowerSetup {
    /// Kind.
    pub tower_type: TowerType,
    /// Side.
    pub faction: Faction,
    /// Explicit position; `None` uses the map default for the type.
    #[serde(default, with = "option_vec2_decimal")]
    pub position: Option<Vec2Fixed>,
    /// Starting HP instead of max HP.
    #[serde(default)]
    pub initial_hp: Option<i32>,
    /// Activation override.
    #[serde(default)]
    pub is_activated: Option<bool>,
}

impl TowerSetup {
    /// Tower with no overrides.
    #[must_use]
    pub fn new(tower_type: TowerType, faction: Faction) -> Self {
        Self {
            tower_type,
            faction,
            position: None,
            initial_hp: None,
            is_activated: None,
        }
    }

    /// Place the tower explicitly.
    #[must_use]
    pub fn at(mut self, position: Vec2Fixed) -> Self {
        self.position = Some(position);
        self
    }

    /// Resolved position on `map`. Princesses default to the left slot.
    #[must_use]
    pub fn resolve_position(&self, map: &MapLayout) -> Vec2Fixed {
        self.position.unwrap_or_else(|| match self.tower_type {
            TowerType::King => map.king_position(self.faction),
            TowerType::Princess => map.princess_left_position(self.faction),
        })
    }
}

fn default_count() -> u32 {
    1
}

fn default_spawn_radius() -> Fixed {
    Fixed::from_num(30)
}

/// A group of identical starting units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitSpawnSetup {
    /// Registry id.
    pub unit_id: String,
    /// Side.
    pub faction: Faction,
    /// Centre of the group.
    #[serde(with = "vec2_decimal")]
    pub position: Vec2Fixed,
    /// HP override; only positive values apply.
    #[serde(default)]
    pub hp: Option<i32>,
    /// How many to spawn.
    #[serde(default = "default_count")]
    pub count: u32,
    /// Ring radius when `count > 1`.
    #[serde(default = "default_spawn_radius", with = "fixed_decimal")]
    pub spawn_radius: Fixed,
}

impl UnitSpawnSetup {
    /// Positions of every unit in the group, evenly spread on a ring.
    #[must_use]
    pub fn positions(&self) -> Vec<Vec2Fixed> {
        if self.count <= 1 {
            return vec![self.position; self.count as usize];
        }
        let total = Fixed::from_num(self.count);
        (0..self.count)
            .map(|i| {
                let angle = TAU * Fixed::from_num(i) / total;
                self.position + Vec2Fixed::from_angle(angle) * self.spawn_radius
            })
            .collect()
    }
}

/// Match clock, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameTimeSetup {
    /// End of regular time.
    #[serde(with = "fixed_decimal")]
    pub regular_time: Fixed,
    /// Hard end including overtime.
    #[serde(with = "fixed_decimal")]
    pub max_game_time: Fixed,
}

impl Default for GameTimeSetup {
    fn default() -> Self {
        Self {
            regular_time: Fixed::from_num(180),
            max_game_time: Fixed::from_num(300),
        }
    }
}

/// Everything placed before frame zero. Defaults to [`InitialSetup::standard`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InitialSetup {
    /// Towers in id order (ids are assigned from 1).
    pub towers: Vec<TowerSetup>,
    /// Starting units.
    pub initial_units: Vec<UnitSpawnSetup>,
    /// Match clock.
    pub game_time: GameTimeSetup,
}

impl Default for InitialSetup {
    fn default() -> Self {
        Self::standard()
    }
}

impl InitialSetup {
    /// Six-tower layout on the default map.
    #[must_use]
    pub fn standard() -> Self {
        Self::standard_for(&MapLayout::default())
    }

    /// Six-tower layout on `map`: per faction a King and two Princesses.
    #[must_use]
    pub fn standard_for(map: &MapLayout) -> Self {
        let mut towers = Vec::with_capacity(6);
        for faction in [Faction::Friendly, Faction::Enemy] {
            towers.push(TowerSetup::new(TowerType::King, faction));
            towers.push(
                TowerSetup::new(TowerType::Princess, faction)
                    .at(map.princess_left_position(faction)),
            );
            towers.push(
                TowerSetup::new(TowerType::Princess, faction)
                    .at(map.princess_right_position(faction)),
            );
        }
        Self {
            towers,
            initial_units: Vec::new(),
            game_time: GameTimeSetup::default(),
        }
    }

    /// Add a group of starting units.
    #[must_use]
    pub fn with_units(mut self, group: UnitSpawnSetup) -> Self {
        self.initial_units.push(group);
        self
    }

    /// Check clock and overrides.
    pub fn validate(&self) -> Result<()> {
        let time = &self.game_time;
        if time.regular_time <= Fixed::ZERO {
            return Err(GameError::InvalidSetup("regular_time must be positive".to_string()));
        }
        if time.max_game_time < time.regular_time {
            return Err(GameError::InvalidSetup(format!(
                "max_game_time ({}) is shorter than regular_time ({})",
                time.max_game_time, time.regular_time
            )));
        }
        if let Some(tower) = self.towers.iter().find(|t| t.initial_hp.is_some_and(|hp| hp < 0)) {
            return Err(GameError::InvalidSetup(format!(
                "{:?} {:?} tower has negative initial HP",
                tower.faction, tower.tower_type
            )));
        }
        if let Some(group) = self.initial_units.iter().find(|g| g.spawn_radius < Fixed::ZERO) {
            return Err(GameError::InvalidSetup(format!(
                "initial unit group '{}' has a negative spawn radius",
                group.unit_id
            )));
        }
        Ok(())
    }

    /// Parse and validate a setup from RON.
    pub fn from_ron_str(source: &str) -> Result<Self> {
        let setup: Self = ron::from_str(source).map_err(|e| GameError::DataParseError {
            path: "<inline>".to_string(),
            message: e.to_string(),
        })?;
        setup.validate()?;
        Ok(setup)
    }

    /// Load and validate a setup file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|e| GameError::DataParseError {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        let setup: Self = ron::from_str(&source).map_err(|e| GameError::DataParseError {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        setup.validate()?;
        Ok(setup)
    }
}
