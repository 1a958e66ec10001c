//! Unit ability data.
//!
//! Abilities are immutable per-definition configuration carried by a unit.
//! Systems ask a unit whether it *has* a capability and get the typed payload
//! back (see [`Unit::splash`](crate::unit::Unit::splash) and friends); there
//! is no base type to downcast through.

use serde::{Deserialize, Serialize};

use crate::math::{fixed_decimal, fixed_serde, Fixed, Vec2Fixed};
use crate::unit::{flag_names, TargetType};

/// Discriminant of [`AbilityData`], used in snapshots and lookups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AbilityType {
    /// Area damage around the primary target.
    SplashDamage,
    /// Bonus damage after a run-up.
    ChargeAttack,
    /// Extra HP pool drained before HP.
    Shield,
    /// Spawns units on death.
    DeathSpawn,
    /// Explodes on death.
    DeathDamage,
    /// Applies status effects.
    StatusEffect,
}

/// Ability configuration (sum type).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AbilityData {
    /// Area damage around the primary target.
    SplashDamage(SplashDamage),
    /// Bonus damage after a run-up.
    ChargeAttack(ChargeAttack),
    /// Extra HP pool drained before HP.
    Shield(Shield),
    /// Spawns units on death.
    DeathSpawn(DeathSpawn),
    /// Explodes on death.
    DeathDamage(DeathDamage),
    /// Applies status effects.
    StatusEffect(StatusEffect),
}

impl AbilityData {
    /// The variant tag.
    #[must_use]
    pub const fn ability_type(&self) -> AbilityType {
        match self {
            Self::SplashDamage(_) => AbilityType::SplashDamage,
            Self::ChargeAttack(_) => AbilityType::ChargeAttack,
            Self::Shield(_) => AbilityType::Shield,
            Self::DeathSpawn(_) => AbilityType::DeathSpawn,
            Self::DeathDamage(_) => AbilityType::DeathDamage,
            Self::StatusEffect(_) => AbilityType::StatusEffect,
        }
    }
}

/// Splash damage around the primary target's position.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SplashDamage {
    /// Splash radius.
    #[serde(with = "fixed_decimal")]
    pub radius: Fixed,
    /// 0 = full damage across the radius, 1 = linear falloff to zero at the edge.
    #[serde(with = "fixed_decimal")]
    pub damage_falloff: Fixed,
}

impl Default for SplashDamage {
    fn default() -> Self {
        Self {
            radius: Fixed::from_num(60),
            damage_falloff: Fixed::ZERO,
        }
    }
}

/// Charge attack: after travelling far enough toward a target the next hit
/// is multiplied.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChargeAttack {
    /// Charging starts when the target is at least this far away.
    #[serde(with = "fixed_decimal")]
    pub trigger_distance: Fixed,
    /// Travel needed before the charge is complete.
    #[serde(with = "fixed_decimal")]
    pub required_charge_distance: Fixed,
    /// Damage multiplier of a charged hit.
    #[serde(with = "fixed_decimal")]
    pub damage_multiplier: Fixed,
    /// Speed multiplier while charging.
    #[serde(with = "fixed_decimal")]
    pub speed_multiplier: Fixed,
}

impl Default for ChargeAttack {
    fn default() -> Self {
        Self {
            trigger_distance: Fixed::from_num(150),
            required_charge_distance: Fixed::from_num(100),
            damage_multiplier: Fixed::from_num(2),
            speed_multiplier: Fixed::from_num(2),
        }
    }
}

/// Shield pool absorbed before HP.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Shield {
    /// Shield HP at spawn.
    pub max_shield_hp: i32,
    /// Whether an active shield blocks stuns.
    pub blocks_stun: bool,
    /// Whether an active shield blocks knockback.
    pub blocks_knockback: bool,
}

impl Default for Shield {
    fn default() -> Self {
        Self {
            max_shield_hp: 200,
            blocks_stun: false,
            blocks_knockback: false,
        }
    }
}

/// Units spawned around the death position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeathSpawn {
    /// Definition id of the spawned unit.
    pub spawn_unit_id: String,
    /// Number of units.
    pub spawn_count: u32,
    /// Ring radius around the death position.
    #[serde(with = "fixed_decimal")]
    pub spawn_radius: Fixed,
    /// HP override for spawned units (0 = definition default).
    pub spawn_unit_hp: i32,
}

impl Default for DeathSpawn {
    fn default() -> Self {
        Self {
            spawn_unit_id: String::new(),
            spawn_count: 2,
            spawn_radius: Fixed::from_num(30),
            spawn_unit_hp: 0,
        }
    }
}

/// Explosion on death.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DeathDamage {
    /// Damage to every opposing unit in range.
    pub damage: i32,
    /// Explosion radius.
    #[serde(with = "fixed_decimal")]
    pub radius: Fixed,
    /// Push survivors away by this much (0 = none).
    #[serde(with = "fixed_decimal")]
    pub knockback_distance: Fixed,
}

impl Default for DeathDamage {
    fn default() -> Self {
        Self {
            damage: 100,
            radius: Fixed::from_num(60),
            knockback_distance: Fixed::ZERO,
        }
    }
}

/// Status effect flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct StatusEffectFlags(pub u32);

impl StatusEffectFlags {
    /// No effect.
    pub const NONE: Self = Self(0);
    /// Cannot act.
    pub const STUNNED: Self = Self(1);
    /// Cannot act or move.
    pub const FROZEN: Self = Self(1 << 1);
    /// Reduced speed.
    pub const SLOWED: Self = Self(1 << 2);
    /// Cannot move.
    pub const ROOTED: Self = Self(1 << 3);
    /// Damage over time.
    pub const POISONED: Self = Self(1 << 4);
    /// Damage over time.
    pub const BURNING: Self = Self(1 << 5);
    /// Increased speed.
    pub const RAGED: Self = Self(1 << 6);
    /// Heal over time.
    pub const HEALING: Self = Self(1 << 7);
    /// Damage reduction.
    pub const SHIELDED: Self = Self(1 << 8);
    /// Untargetable.
    pub const INVISIBLE: Self = Self(1 << 9);

    const NAMES: &'static [(&'static str, u32)] = &[
        ("Stunned", 1),
        ("Frozen", 1 << 1),
        ("Slowed", 1 << 2),
        ("Rooted", 1 << 3),
        ("Poisoned", 1 << 4),
        ("Burning", 1 << 5),
        ("Raged", 1 << 6),
        ("Healing", 1 << 7),
        ("Shielded", 1 << 8),
        ("Invisible", 1 << 9),
    ];

    /// Whether every flag of `other` is set.
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Union of two flag sets.
    #[must_use]
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }
}

impl Serialize for StatusEffectFlags {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&flag_names::to_string(self.0, Self::NAMES))
    }
}

impl<'de> Deserialize<'de> for StatusEffectFlags {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        flag_names::parse(&text, Self::NAMES)
            .map(Self)
            .map_err(serde::de::Error::custom)
    }
}

/// Status effect configuration. Carried as data; effects are not ticked by
/// the core.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StatusEffect {
    /// Effects applied.
    pub applied_effect: StatusEffectFlags,
    /// Duration in seconds.
    #[serde(with = "fixed_decimal")]
    pub effect_duration: Fixed,
    /// Slow ratio, damage multiplier, etc.
    #[serde(with = "fixed_decimal")]
    pub effect_magnitude: Fixed,
    /// 0 = target only.
    #[serde(with = "fixed_decimal")]
    pub effect_range: Fixed,
    /// Which layers are affected.
    pub affected_targets: TargetType,
}

impl Default for StatusEffect {
    fn default() -> Self {
        Self {
            applied_effect: StatusEffectFlags::NONE,
            effect_duration: Fixed::ZERO,
            effect_magnitude: Fixed::ONE,
            effect_range: Fixed::ZERO,
            affected_targets: TargetType::GROUND,
        }
    }
}

/// Runtime charge progress of a unit with [`ChargeAttack`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ChargeState {
    /// Currently running up.
    pub is_charging: bool,
    /// Run-up complete; next hit is multiplied.
    pub is_charged: bool,
    /// Where the run-up started.
    pub charge_start: Vec2Fixed,
    /// Distance covered since the start.
    #[serde(with = "fixed_serde")]
    pub charged_distance: Fixed,
    /// Distance needed to complete the charge.
    #[serde(with = "fixed_serde")]
    pub required_distance: Fixed,
}

impl ChargeState {
    /// Drop all progress.
    pub fn reset(&mut self) {
        self.is_charging = false;
        self.is_charged = false;
        self.charge_start = Vec2Fixed::ZERO;
        self.charged_distance = Fixed::ZERO;
    }

    /// Begin a run-up from `position`.
    pub fn start(&mut self, position: Vec2Fixed, required_distance: Fixed) {
        self.is_charging = true;
        self.is_charged = false;
        self.charge_start = position;
        self.charged_distance = Fixed::ZERO;
        self.required_distance = required_distance;
    }

    /// Update the covered distance from the current position.
    pub fn update_distance(&mut self, position: Vec2Fixed) {
        if !self.is_charging {
            return;
        }
        self.charged_distance = self.charge_start.distance(position);
        if self.charged_distance >= self.required_distance {
            self.is_charged = true;
        }
    }

    /// Spend the charge after an attack.
    pub fn consume(&mut self) {
        self.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ability_type_tags() {
        let splash = AbilityData::SplashDamage(SplashDamage::default());
        assert_eq!(splash.ability_type(), AbilityType::SplashDamage);
        let spawn = AbilityData::DeathSpawn(DeathSpawn::default());
        assert_eq!(spawn.ability_type(), AbilityType::DeathSpawn);
    }

    #[test]
    fn test_charge_state_lifecycle() {
        let mut state = ChargeState::default();
        state.update_distance(Vec2Fixed::from_ints(500, 0));
        assert!(!state.is_charged, "not charging yet");

        state.start(Vec2Fixed::ZERO, Fixed::from_num(100));
        state.update_distance(Vec2Fixed::from_ints(60, 80));
        assert!(state.is_charging);
        assert!(state.is_charged, "100 units covered");

        state.consume();
        assert!(!state.is_charging);
        assert!(!state.is_charged);
    }

    #[test]
    fn test_status_flags_ron() {
        let effect: StatusEffect = ron::from_str(
            "(applied_effect: \"Slowed|Poisoned\", effect_duration: 2.5, effect_magnitude: 0.35, \
             effect_range: 0.0, affected_targets: \"Ground|Air\")",
        )
        .unwrap();
        assert!(effect.applied_effect.contains(StatusEffectFlags::SLOWED));
        assert!(effect.applied_effect.contains(StatusEffectFlags::POISONED));
        assert!(!effect.applied_effect.contains(StatusEffectFlags::STUNNED));
        assert_eq!(effect.affected_targets, TargetType::GROUND_AND_AIR);
    }
}
