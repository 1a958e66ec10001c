//! Unit definitions and the registry that builds units from them.
//!
//! Death spawns, wave groups and spawn commands name units by definition id.
//! The registry resolves those ids; an unknown id falls back to the plain
//! faction default unit with a warning, so authored data with a typo still
//! runs.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::abilities::{AbilityData, DeathDamage, DeathSpawn, Shield};
use crate::config::{ratio, GameBalance};
use crate::error::{GameError, Result};
use crate::math::{fixed_decimal, Fixed, Vec2Fixed};
use crate::unit::{
    Faction, MovementLayer, TargetPriority, TargetType, Unit, UnitId, UnitRole, UnitSpec,
};

/// Base stats of a unit type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitDefinition {
    /// Definition id (`"skeleton"`).
    pub unit_id: String,
    /// Human-readable name.
    #[serde(default)]
    pub display_name: String,
    /// Starting HP.
    pub max_hp: i32,
    /// Damage per attack.
    pub damage: i32,
    /// Minimum attack range; the role-derived range applies when larger.
    #[serde(with = "fixed_decimal")]
    pub attack_range: Fixed,
    /// World units per frame.
    #[serde(with = "fixed_decimal")]
    pub move_speed: Fixed,
    /// Radians per frame.
    #[serde(with = "fixed_decimal")]
    pub turn_speed: Fixed,
    /// Body radius.
    #[serde(with = "fixed_decimal")]
    pub radius: Fixed,
    /// Combat role.
    #[serde(default)]
    pub role: UnitRole,
    /// Movement layer.
    #[serde(default)]
    pub layer: MovementLayer,
    /// Attack mask.
    #[serde(default = "default_can_target")]
    pub can_target: TargetType,
    /// Targeting priority.
    #[serde(default)]
    pub target_priority: TargetPriority,
    /// Abilities.
    #[serde(default)]
    pub abilities: Vec<AbilityData>,
}

fn default_can_target() -> TargetType {
    TargetType::GROUND
}

impl UnitDefinition {
    fn melee(unit_id: &str, display_name: &str, max_hp: i32, damage: i32) -> Self {
        Self {
            unit_id: unit_id.to_string(),
            display_name: display_name.to_string(),
            max_hp,
            damage,
            attack_range: Fixed::from_num(30),
            move_speed: Fixed::from_num(4),
            turn_speed: ratio(1, 10),
            radius: Fixed::from_num(20),
            role: UnitRole::Melee,
            layer: MovementLayer::Ground,
            can_target: TargetType::GROUND,
            target_priority: TargetPriority::Nearest,
            abilities: Vec::new(),
        }
    }

    /// Reject unusable stats.
    pub fn validate(&self) -> Result<()> {
        if self.unit_id.is_empty() {
            return Err(GameError::InvalidConfig("unit definition without an id".to_string()));
        }
        if self.max_hp <= 0 {
            return Err(GameError::InvalidConfig(format!(
                "unit '{}' must have positive max_hp",
                self.unit_id
            )));
        }
        if self.radius <= Fixed::ZERO || self.move_speed < Fixed::ZERO {
            return Err(GameError::InvalidConfig(format!(
                "unit '{}' needs a positive radius and non-negative speed",
                self.unit_id
            )));
        }
        Ok(())
    }

    /// Construction parameters for this definition.
    #[must_use]
    pub fn to_spec(&self, balance: &GameBalance) -> UnitSpec {
        let role_range = role_attack_range(self.role, self.radius, balance);
        UnitSpec {
            unit_id: self.unit_id.clone(),
            role: self.role,
            layer: self.layer,
            can_target: self.can_target,
            target_priority: self.target_priority,
            max_hp: self.max_hp,
            damage: self.damage,
            attack_range: self.attack_range.max(role_range),
            speed: self.move_speed,
            turn_speed: self.turn_speed,
            radius: self.radius,
            abilities: self.abilities.clone(),
        }
    }
}

/// Attack range a role gets from its body radius.
#[must_use]
pub fn role_attack_range(role: UnitRole, radius: Fixed, balance: &GameBalance) -> Fixed {
    let multiplier = match role {
        UnitRole::Melee => balance.melee_range_multiplier,
        _ => balance.ranged_range_multiplier,
    };
    radius * Fixed::from_num(multiplier)
}

/// Default unit of `faction` with `role`, as spawned by role commands and
/// unknown definition ids.
#[must_use]
pub fn role_spec(role: UnitRole, faction: Faction, balance: &GameBalance) -> UnitSpec {
    let (max_hp, damage, speed, turn_speed) = match faction {
        Faction::Friendly => (
            balance.friendly_hp,
            balance.friendly_attack_damage,
            balance.friendly_speed,
            balance.friendly_turn_speed,
        ),
        Faction::Enemy => (
            balance.enemy_hp,
            balance.enemy_attack_damage,
            balance.enemy_speed,
            balance.enemy_turn_speed,
        ),
    };
    UnitSpec {
        unit_id: String::new(),
        role,
        layer: MovementLayer::Ground,
        can_target: TargetType::ALL,
        target_priority: TargetPriority::Nearest,
        max_hp,
        damage,
        attack_range: role_attack_range(role, balance.unit_radius, balance),
        speed,
        turn_speed,
        radius: balance.unit_radius,
        abilities: Vec::new(),
    }
}

/// Definitions by id, iterated in id order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UnitRegistry {
    definitions: BTreeMap<String, UnitDefinition>,
}

impl UnitRegistry {
    /// Empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in definitions.
    #[must_use]
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        for definition in default_definitions() {
            registry.insert(definition);
        }
        registry
    }

    /// Add or replace a definition.
    pub fn insert(&mut self, definition: UnitDefinition) {
        self.definitions.insert(definition.unit_id.clone(), definition);
    }

    /// Look up a definition.
    #[must_use]
    pub fn get(&self, unit_id: &str) -> Option<&UnitDefinition> {
        self.definitions.get(unit_id)
    }

    /// Whether `unit_id` is registered.
    #[must_use]
    pub fn contains(&self, unit_id: &str) -> bool {
        self.definitions.contains_key(unit_id)
    }

    /// Registered ids in order.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.definitions.keys().map(String::as_str)
    }

    /// Number of definitions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    /// Whether no definitions are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    /// Validate every definition and every death-spawn reference.
    pub fn validate(&self) -> Result<()> {
        for definition in self.definitions.values() {
            definition.validate()?;
            for ability in &definition.abilities {
                if let AbilityData::DeathSpawn(spawn) = ability {
                    if !self.contains(&spawn.spawn_unit_id) {
                        return Err(GameError::UnknownUnitType(format!(
                            "{} (death spawn of '{}')",
                            spawn.spawn_unit_id, definition.unit_id
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    /// Parse a list of definitions from RON into a registry.
    pub fn from_ron_str(source: &str) -> Result<Self> {
        Self::parse(source, "<inline>")
    }

    /// Load a RON list of definitions.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|e| GameError::DataParseError {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Self::parse(&source, &path.display().to_string())
    }

    fn parse(source: &str, path: &str) -> Result<Self> {
        let definitions: Vec<UnitDefinition> =
            ron::from_str(source).map_err(|e| GameError::DataParseError {
                path: path.to_string(),
                message: e.to_string(),
            })?;
        let mut registry = Self::new();
        for definition in definitions {
            registry.insert(definition);
        }
        registry.validate()?;
        Ok(registry)
    }

    /// Add every definition of `other`, replacing same-id entries.
    pub fn extend(&mut self, other: Self) {
        self.definitions.extend(other.definitions);
    }

    /// Build a unit from a definition.
    ///
    /// `hp` overrides the definition's HP when positive.
    #[must_use]
    pub fn create_unit(
        definition: &UnitDefinition,
        id: UnitId,
        faction: Faction,
        position: Vec2Fixed,
        hp: Option<i32>,
        balance: &GameBalance,
    ) -> Unit {
        let mut spec = definition.to_spec(balance);
        if let Some(hp) = hp.filter(|&hp| hp > 0) {
            spec.max_hp = hp;
        }
        Unit::new(id, faction, position, spec)
    }

    /// Build a unit by id, falling back to the faction default for unknown
    /// ids.
    #[must_use]
    pub fn spawn(
        &self,
        unit_id: &str,
        id: UnitId,
        faction: Faction,
        position: Vec2Fixed,
        hp: Option<i32>,
        balance: &GameBalance,
    ) -> Unit {
        if let Some(definition) = self.get(unit_id) {
            return Self::create_unit(definition, id, faction, position, hp, balance);
        }

        warn!(unit_id, ?faction, "Unknown unit definition; using faction default");
        let mut spec = role_spec(UnitRole::Melee, faction, balance);
        spec.unit_id = unit_id.to_string();
        if let Some(hp) = hp.filter(|&hp| hp > 0) {
            spec.max_hp = hp;
        }
        Unit::new(id, faction, position, spec)
    }
}

fn default_definitions() -> Vec<UnitDefinition> {
    let golemite = UnitDefinition {
        move_speed: Fixed::from_num(3),
        radius: Fixed::from_num(25),
        abilities: vec![AbilityData::DeathDamage(DeathDamage {
            damage: 100,
            radius: Fixed::from_num(40),
            knockback_distance: Fixed::ZERO,
        })],
        ..UnitDefinition::melee("golemite", "Golemite", 900, 50)
    };

    let skeleton = UnitDefinition {
        attack_range: Fixed::from_num(25),
        move_speed: Fixed::from_num(5),
        turn_speed: ratio(3, 25),
        radius: Fixed::from_num(15),
        ..UnitDefinition::melee("skeleton", "Skeleton", 81, 81)
    };

    let lava_pup = UnitDefinition {
        attack_range: Fixed::from_num(60),
        move_speed: ratio(9, 2),
        radius: Fixed::from_num(15),
        role: UnitRole::Ranged,
        layer: MovementLayer::Air,
        can_target: TargetType::GROUND_AND_AIR,
        ..UnitDefinition::melee("lava_pup", "Lava Pup", 209, 55)
    };

    let minion = UnitDefinition {
        attack_range: Fixed::from_num(60),
        move_speed: Fixed::from_num(5),
        radius: Fixed::from_num(18),
        role: UnitRole::Ranged,
        layer: MovementLayer::Air,
        can_target: TargetType::GROUND_AND_AIR,
        ..UnitDefinition::melee("minion", "Minion", 252, 84)
    };

    let bat = UnitDefinition {
        attack_range: Fixed::from_num(25),
        move_speed: ratio(11, 2),
        turn_speed: ratio(3, 20),
        radius: Fixed::from_num(12),
        layer: MovementLayer::Air,
        can_target: TargetType::GROUND_AND_AIR,
        ..UnitDefinition::melee("bat", "Bat", 81, 81)
    };

    let elixir_golemite = UnitDefinition {
        move_speed: ratio(7, 2),
        radius: Fixed::from_num(22),
        abilities: vec![AbilityData::DeathSpawn(DeathSpawn {
            spawn_unit_id: "elixir_blob".to_string(),
            spawn_count: 2,
            spawn_radius: Fixed::from_num(20),
            spawn_unit_hp: 0,
        })],
        ..UnitDefinition::melee("elixir_golemite", "Elixir Golemite", 560, 42)
    };

    let elixir_blob = UnitDefinition {
        attack_range: Fixed::from_num(25),
        move_speed: ratio(7, 2),
        radius: Fixed::from_num(18),
        ..UnitDefinition::melee("elixir_blob", "Elixir Blob", 280, 21)
    };

    let guard = UnitDefinition {
        move_speed: ratio(9, 2),
        radius: Fixed::from_num(18),
        abilities: vec![AbilityData::Shield(Shield {
            max_shield_hp: 199,
            ..Shield::default()
        })],
        ..UnitDefinition::melee("guard", "Guard", 90, 90)
    };

    vec![
        golemite,
        skeleton,
        lava_pup,
        minion,
        bat,
        elixir_golemite,
        elixir_blob,
        guard,
    ]
}
