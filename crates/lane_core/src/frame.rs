//! Per-frame snapshots for viewers, logs and state reload.
//!
//! `FrameData` is the public face of the simulation: it is what callbacks
//! receive, what the headless runner writes as JSON lines, and what
//! [`SimulatorCore::load_frame`](crate::simulator::SimulatorCore::load_frame)
//! rebuilds units from. JSON uses camelCase keys and decimal numbers; points
//! are `{"x": .., "y": ..}` objects.

use serde::{Deserialize, Serialize};

use crate::abilities::AbilityType;
use crate::error::{GameError, Result};
use crate::math::{fixed_decimal, Fixed, Vec2Fixed};
use crate::session::{GameResult, GameSession, WinCondition};
use crate::tower::{Tower, TowerId, TowerType};
use crate::unit::{Faction, MovementLayer, Unit, UnitArena, UnitId, UnitRole};

/// `{"x", "y"}` decimal points.
mod point {
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    use crate::math::{Fixed, Vec2Fixed};

    #[derive(Serialize, Deserialize)]
    struct Point {
        x: f64,
        y: f64,
    }

    impl From<Vec2Fixed> for Point {
        fn from(v: Vec2Fixed) -> Self {
            Self {
                x: v.x.to_num(),
                y: v.y.to_num(),
            }
        }
    }

    fn to_vec<E: Error>(p: &Point) -> Result<Vec2Fixed, E> {
        match (Fixed::checked_from_num(p.x), Fixed::checked_from_num(p.y)) {
            (Some(x), Some(y)) => Ok(Vec2Fixed::new(x, y)),
            _ => Err(E::custom(format!("point ({}, {}) out of range", p.x, p.y))),
        }
    }

    pub fn serialize<S: Serializer>(value: &Vec2Fixed, serializer: S) -> Result<S::Ok, S::Error> {
        Point::from(*value).serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec2Fixed, D::Error> {
        to_vec(&Point::deserialize(deserializer)?)
    }

    pub mod option {
        use super::{to_vec, Point};
        use serde::{Deserialize, Deserializer, Serialize, Serializer};

        use crate::math::Vec2Fixed;

        pub fn serialize<S: Serializer>(
            value: &Option<Vec2Fixed>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            value.map(Point::from).serialize(serializer)
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<Vec2Fixed>, D::Error> {
            Option::<Point>::deserialize(deserializer)?
                .as_ref()
                .map(to_vec)
                .transpose()
        }
    }
}

/// One unit in a frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnitStateData {
    /// Arena id.
    pub id: UnitId,
    /// Display label (`F3`).
    pub label: String,
    /// Registry id (empty for role-spawned units).
    pub unit_id: String,
    /// Side.
    pub faction: Faction,
    /// Role.
    pub role: UnitRole,
    /// Layer.
    pub layer: MovementLayer,
    /// Dead this frame.
    pub is_dead: bool,
    /// HP.
    pub hp: i32,
    /// Max HP.
    pub max_hp: i32,
    /// Shield HP.
    pub shield_hp: i32,
    /// Body radius.
    #[serde(with = "fixed_decimal")]
    pub radius: Fixed,
    /// Speed per frame.
    #[serde(with = "fixed_decimal")]
    pub speed: Fixed,
    /// Attack range.
    #[serde(with = "fixed_decimal")]
    pub attack_range: Fixed,
    /// Frames until the next attack.
    #[serde(with = "fixed_decimal")]
    pub attack_cooldown: Fixed,
    /// Position.
    #[serde(with = "point")]
    pub position: Vec2Fixed,
    /// Velocity.
    #[serde(with = "point")]
    pub velocity: Vec2Fixed,
    /// Facing.
    #[serde(with = "point")]
    pub forward: Vec2Fixed,
    /// Where the unit is heading.
    #[serde(with = "point::option")]
    pub destination: Option<Vec2Fixed>,
    /// Unit target.
    pub target_id: Option<UnitId>,
    /// Tower target.
    pub target_tower_id: Option<TowerId>,
    /// Attack slot held on the target.
    pub taken_slot_index: Option<usize>,
    /// Current detour waypoint.
    #[serde(with = "point::option")]
    pub avoidance_target: Option<Vec2Fixed>,
    /// Has non-zero velocity.
    pub is_moving: bool,
    /// Its unit target is within reach.
    pub in_attack_range: bool,
    /// Running up a charge.
    pub is_charging: bool,
    /// Charge ready.
    pub is_charged: bool,
    /// Ability kinds.
    pub abilities: Vec<AbilityType>,
}

impl UnitStateData {
    /// Capture `unit`; `target` is its unit target if still present.
    #[must_use]
    pub fn from_unit(unit: &Unit, target: Option<&Unit>) -> Self {
        let in_attack_range = target.is_some_and(|t| !t.is_dead() && unit.in_attack_range(t));
        Self {
            id: unit.id,
            label: unit.label(),
            unit_id: unit.unit_id.clone(),
            faction: unit.faction,
            role: unit.role,
            layer: unit.layer,
            is_dead: unit.is_dead(),
            hp: unit.hp,
            max_hp: unit.max_hp,
            shield_hp: unit.shield_hp,
            radius: unit.radius,
            speed: unit.speed,
            attack_range: unit.attack_range,
            attack_cooldown: unit.attack_cooldown,
            position: unit.position,
            velocity: unit.velocity,
            forward: unit.forward,
            destination: unit.destination,
            target_id: unit.target,
            target_tower_id: unit.target_tower,
            taken_slot_index: unit.taken_slot,
            avoidance_target: unit.avoidance_target,
            is_moving: unit.velocity != Vec2Fixed::ZERO,
            in_attack_range,
            is_charging: unit.charge.is_charging,
            is_charged: unit.charge.is_charged,
            abilities: unit.abilities.iter().map(|a| a.ability_type()).collect(),
        }
    }
}

/// One tower in a frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TowerStateData {
    /// Tower id.
    pub id: TowerId,
    /// Kind.
    pub tower_type: TowerType,
    /// Side.
    pub faction: Faction,
    /// Position.
    #[serde(with = "point")]
    pub position: Vec2Fixed,
    /// Radius.
    #[serde(with = "fixed_decimal")]
    pub radius: Fixed,
    /// Range.
    #[serde(with = "fixed_decimal")]
    pub attack_range: Fixed,
    /// Max HP.
    pub max_hp: i32,
    /// HP.
    pub current_hp: i32,
    /// Allowed to attack.
    pub is_activated: bool,
    /// Seconds until the next shot.
    #[serde(with = "fixed_decimal")]
    pub attack_cooldown: Fixed,
    /// Unit target.
    pub target_id: Option<UnitId>,
}

impl From<&Tower> for TowerStateData {
    fn from(tower: &Tower) -> Self {
        Self {
            id: tower.id,
            tower_type: tower.tower_type,
            faction: tower.faction,
            position: tower.position,
            radius: tower.radius,
            attack_range: tower.attack_range,
            max_hp: tower.max_hp,
            current_hp: tower.current_hp,
            is_activated: tower.is_activated,
            attack_cooldown: tower.attack_cooldown,
            target_id: tower.target,
        }
    }
}

/// Complete observable state after one frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameData {
    /// Frame number.
    pub frame_number: u32,
    /// Current wave (0 before the first).
    pub current_wave: u32,
    /// Living friendly units.
    pub living_friendly_count: usize,
    /// Living enemy units.
    pub living_enemy_count: usize,
    /// Friendly squad's final destination.
    #[serde(with = "point")]
    pub main_target: Vec2Fixed,
    /// Friendly units, ascending id.
    pub friendly_units: Vec<UnitStateData>,
    /// Enemy units, ascending id.
    pub enemy_units: Vec<UnitStateData>,
    /// Friendly towers.
    pub friendly_towers: Vec<TowerStateData>,
    /// Enemy towers.
    pub enemy_towers: Vec<TowerStateData>,
    /// Match clock in seconds.
    #[serde(with = "fixed_decimal")]
    pub elapsed_time: Fixed,
    /// Friendly crowns.
    pub friendly_crowns: u32,
    /// Enemy crowns.
    pub enemy_crowns: u32,
    /// Result so far.
    pub game_result: GameResult,
    /// How the game was decided.
    pub win_condition: Option<WinCondition>,
    /// In overtime.
    pub is_overtime: bool,
}

impl FrameData {
    /// Capture units and session state.
    #[must_use]
    pub fn capture(
        frame_number: u32,
        current_wave: u32,
        main_target: Vec2Fixed,
        units: &UnitArena,
        session: &GameSession,
    ) -> Self {
        let mut friendly_units = Vec::new();
        let mut enemy_units = Vec::new();
        for unit in units.iter() {
            let target = unit.target.and_then(|id| units.get(id));
            let data = UnitStateData::from_unit(unit, target);
            match unit.faction {
                Faction::Friendly => friendly_units.push(data),
                Faction::Enemy => enemy_units.push(data),
            }
        }

        Self {
            frame_number,
            current_wave,
            living_friendly_count: friendly_units.iter().filter(|u| !u.is_dead).count(),
            living_enemy_count: enemy_units.iter().filter(|u| !u.is_dead).count(),
            main_target,
            friendly_units,
            enemy_units,
            friendly_towers: session.friendly_towers.iter().map(TowerStateData::from).collect(),
            enemy_towers: session.enemy_towers.iter().map(TowerStateData::from).collect(),
            elapsed_time: session.elapsed_time,
            friendly_crowns: session.friendly_crowns,
            enemy_crowns: session.enemy_crowns,
            game_result: session.result,
            win_condition: session.win_condition,
            is_overtime: session.is_overtime,
        }
    }

    /// Every unit, friendly first.
    pub fn all_units(&self) -> impl Iterator<Item = &UnitStateData> {
        self.friendly_units.iter().chain(self.enemy_units.iter())
    }

    /// Pretty JSON.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| GameError::InvalidState(format!("Failed to serialize frame: {}", e)))
    }

    /// Single-line JSON, for `.jsonl` logs.
    pub fn to_json_line(&self) -> Result<String> {
        serde_json::to_string(self)
            .map_err(|e| GameError::InvalidState(format!("Failed to serialize frame: {}", e)))
    }

    /// Parse a frame.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| GameError::DataParseError {
            path: "<frame>".to_string(),
            message: e.to_string(),
        })
    }
}
