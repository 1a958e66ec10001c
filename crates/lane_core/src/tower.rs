//! Towers: Princess and King.

use serde::{Deserialize, Serialize};

use crate::config::ratio;
use crate::error::{GameError, Result};
use crate::math::{fixed_decimal, fixed_serde, Fixed, Vec2Fixed};
use crate::unit::{Faction, Unit, UnitId, TargetType};

/// Tower id, unique across both factions.
pub type TowerId = u32;

/// Tower kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TowerType {
    /// Side tower, active from the start.
    Princess,
    /// Central tower, wakes up when hit or when a Princess falls.
    King,
}

/// Per-type tower statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TowerStats {
    /// Starting HP.
    pub max_hp: i32,
    /// Damage per shot.
    pub damage: i32,
    /// Shots per second.
    #[serde(with = "fixed_decimal")]
    pub attack_speed: Fixed,
    /// Attack range.
    #[serde(with = "fixed_decimal")]
    pub attack_range: Fixed,
    /// Body radius.
    #[serde(with = "fixed_decimal")]
    pub radius: Fixed,
    /// What the tower can shoot.
    pub can_target: TargetType,
    /// Whether the tower starts active.
    pub starts_active: bool,
}

impl TowerStats {
    /// Default Princess tower.
    #[must_use]
    pub fn princess() -> Self {
        Self {
            max_hp: 3052,
            damage: 109,
            attack_speed: ratio(5, 4),
            attack_range: Fixed::from_num(350),
            radius: Fixed::from_num(100),
            can_target: TargetType::GROUND_AND_AIR,
            starts_active: true,
        }
    }

    /// Default King tower.
    #[must_use]
    pub fn king() -> Self {
        Self {
            max_hp: 4824,
            damage: 109,
            attack_speed: Fixed::ONE,
            attack_range: Fixed::from_num(350),
            radius: Fixed::from_num(150),
            can_target: TargetType::GROUND_AND_AIR,
            starts_active: false,
        }
    }

    /// Reject non-positive stats.
    pub fn validate(&self, name: &str) -> Result<()> {
        if self.max_hp <= 0 || self.damage < 0 {
            return Err(GameError::InvalidConfig(format!(
                "{name}: max_hp must be positive and damage non-negative"
            )));
        }
        if self.attack_speed <= Fixed::ZERO
            || self.attack_range <= Fixed::ZERO
            || self.radius <= Fixed::ZERO
        {
            return Err(GameError::InvalidConfig(format!(
                "{name}: attack_speed, attack_range and radius must be positive"
            )));
        }
        Ok(())
    }
}

/// A tower in play.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tower {
    /// Id.
    pub id: TowerId,
    /// Kind.
    pub tower_type: TowerType,
    /// Side.
    pub faction: Faction,
    /// Centre.
    pub position: Vec2Fixed,
    /// Body radius.
    #[serde(with = "fixed_serde")]
    pub radius: Fixed,
    /// Attack range.
    #[serde(with = "fixed_serde")]
    pub attack_range: Fixed,
    /// Starting HP.
    pub max_hp: i32,
    /// Current HP, never negative.
    pub current_hp: i32,
    /// Damage per shot.
    pub damage: i32,
    /// Shots per second.
    #[serde(with = "fixed_serde")]
    pub attack_speed: Fixed,
    /// What the tower can shoot.
    pub can_target: TargetType,
    /// Whether the tower may attack.
    pub is_activated: bool,
    /// Seconds until the next shot.
    #[serde(with = "fixed_serde")]
    pub attack_cooldown: Fixed,
    /// Current target.
    pub target: Option<UnitId>,
}

impl Tower {
    /// Build a tower at full HP.
    #[must_use]
    pub fn new(
        id: TowerId,
        tower_type: TowerType,
        faction: Faction,
        position: Vec2Fixed,
        stats: &TowerStats,
    ) -> Self {
        Self {
            id,
            tower_type,
            faction,
            position,
            radius: stats.radius,
            attack_range: stats.attack_range,
            max_hp: stats.max_hp,
            current_hp: stats.max_hp,
            damage: stats.damage,
            attack_speed: stats.attack_speed,
            can_target: stats.can_target,
            is_activated: stats.starts_active,
            attack_cooldown: Fixed::ZERO,
            target: None,
        }
    }

    /// Whether HP reached zero.
    #[must_use]
    pub const fn is_destroyed(&self) -> bool {
        self.current_hp <= 0
    }

    /// Whether this is a King tower.
    #[must_use]
    pub fn is_king(&self) -> bool {
        self.tower_type == TowerType::King
    }

    /// Whether the tower may act this frame.
    #[must_use]
    pub fn can_act(&self) -> bool {
        !self.is_destroyed() && self.is_activated
    }

    /// Apply damage (clamped at zero); an inactive King wakes up.
    pub fn take_damage(&mut self, amount: i32) {
        if self.is_destroyed() || amount <= 0 {
            return;
        }
        self.current_hp = (self.current_hp - amount).max(0);
        if self.is_king() && !self.is_activated {
            self.is_activated = true;
        }
    }

    /// Whether `unit` is alive, on a layer this tower covers and in range.
    #[must_use]
    pub fn can_attack_unit(&self, unit: &Unit) -> bool {
        if unit.is_dead() || !self.can_act() || !self.can_target.includes_layer(unit.layer) {
            return false;
        }
        self.position.distance_squared(unit.position) <= self.attack_range * self.attack_range
    }

    /// HP as a fraction of max HP.
    #[must_use]
    pub fn hp_ratio(&self) -> Fixed {
        if self.max_hp <= 0 {
            return Fixed::ZERO;
        }
        Fixed::from_num(self.current_hp) / Fixed::from_num(self.max_hp)
    }

    /// Tick the cooldown by `dt` seconds.
    pub fn update_cooldown(&mut self, dt: Fixed) {
        if self.attack_cooldown > Fixed::ZERO {
            self.attack_cooldown -= dt;
        }
    }

    /// Whether the cooldown has elapsed.
    #[must_use]
    pub fn is_ready_to_attack(&self) -> bool {
        self.attack_cooldown <= Fixed::ZERO
    }

    /// Restart the cooldown after a shot.
    pub fn on_attack_performed(&mut self) {
        self.attack_cooldown = Fixed::ONE / self.attack_speed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_stats() {
        let princess = TowerStats::princess();
        assert_eq!(princess.max_hp, 3052);
        assert_eq!(princess.attack_speed, Fixed::from_num(1.25));
        assert!(princess.starts_active);
        let king = TowerStats::king();
        assert_eq!(king.radius, Fixed::from_num(150));
        assert!(!king.starts_active);
        assert!(king.validate("king").is_ok());
    }

    #[test]
    fn test_king_activates_when_damaged() {
        let mut king = Tower::new(
            1,
            TowerType::King,
            Faction::Enemy,
            Vec2Fixed::ZERO,
            &TowerStats::king(),
        );
        assert!(!king.can_act());
        king.take_damage(10_000);
        assert_eq!(king.current_hp, 0);
        assert!(king.is_destroyed());
        assert!(king.is_activated);
    }

    #[test]
    fn test_cooldown_cycle() {
        let mut tower = Tower::new(
            1,
            TowerType::Princess,
            Faction::Friendly,
            Vec2Fixed::ZERO,
            &TowerStats::princess(),
        );
        assert!(tower.is_ready_to_attack());
        tower.on_attack_performed();
        assert_eq!(tower.attack_cooldown, Fixed::ONE / Fixed::from_num(1.25));
        tower.update_cooldown(Fixed::from_num(0.5));
        assert!(!tower.is_ready_to_attack());
        tower.update_cooldown(Fixed::from_num(0.5));
        assert!(tower.is_ready_to_attack());
    }

    #[test]
    fn test_invalid_stats_rejected() {
        let mut stats = TowerStats::princess();
        stats.attack_speed = Fixed::ZERO;
        assert!(matches!(stats.validate("p"), Err(GameError::InvalidConfig(_))));
    }
}
