//! Per-frame staged events.
//!
//! Behaviours run in a collect phase that only *stages* damage and spawns
//! here; the simulator applies everything afterwards in a fixed order. The
//! buffer is owned by the simulator and cleared at the start of each frame.

use serde::{Deserialize, Serialize};

use crate::math::Vec2Fixed;
use crate::tower::TowerId;
use crate::unit::{Faction, UnitId};

/// Origin of a unit damage event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DamageKind {
    /// Direct hit on the primary target.
    Normal,
    /// Splash around the primary target.
    Splash,
    /// Death explosion.
    DeathDamage,
}

/// Unit-to-unit damage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DamageEvent {
    /// Attacker, if a unit.
    pub source: Option<UnitId>,
    /// Victim.
    pub target: UnitId,
    /// Damage amount.
    pub amount: i32,
    /// Origin.
    pub kind: DamageKind,
}

/// Tower-to-unit damage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TowerDamageEvent {
    /// Attacking tower.
    pub tower: TowerId,
    /// Victim.
    pub target: UnitId,
    /// Damage amount.
    pub amount: i32,
}

/// Unit-to-tower damage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DamageToTowerEvent {
    /// Attacker.
    pub source: UnitId,
    /// Tower hit.
    pub tower: TowerId,
    /// Damage amount.
    pub amount: i32,
}

/// Request to create a unit at the end of the frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitSpawnRequest {
    /// Definition id.
    pub unit_id: String,
    /// Spawn position.
    pub position: Vec2Fixed,
    /// Side.
    pub faction: Faction,
    /// HP override; 0 uses the definition's HP.
    pub hp: i32,
}

/// Everything staged during one frame.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameEvents {
    /// Unit damage.
    pub damages: Vec<DamageEvent>,
    /// Spawn requests.
    pub spawns: Vec<UnitSpawnRequest>,
    /// Tower attacks on units.
    pub tower_damages: Vec<TowerDamageEvent>,
    /// Unit attacks on towers.
    pub damage_to_towers: Vec<DamageToTowerEvent>,
}

impl FrameEvents {
    /// Empty buffer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage unit damage.
    pub fn add_damage(
        &mut self,
        source: Option<UnitId>,
        target: UnitId,
        amount: i32,
        kind: DamageKind,
    ) {
        self.damages.push(DamageEvent {
            source,
            target,
            amount,
            kind,
        });
    }

    /// Stage a spawn.
    pub fn add_spawn(&mut self, request: UnitSpawnRequest) {
        self.spawns.push(request);
    }

    /// Stage a tower attack.
    pub fn add_tower_damage(&mut self, tower: TowerId, target: UnitId, amount: i32) {
        self.tower_damages.push(TowerDamageEvent {
            tower,
            target,
            amount,
        });
    }

    /// Stage an attack on a tower.
    pub fn add_damage_to_tower(&mut self, source: UnitId, tower: TowerId, amount: i32) {
        self.damage_to_towers.push(DamageToTowerEvent {
            source,
            tower,
            amount,
        });
    }

    /// Number of staged unit damage events.
    #[must_use]
    pub fn damage_count(&self) -> usize {
        self.damages.len()
    }

    /// Number of staged spawns.
    #[must_use]
    pub fn spawn_count(&self) -> usize {
        self.spawns.len()
    }

    /// Number of staged tower attacks.
    #[must_use]
    pub fn tower_damage_count(&self) -> usize {
        self.tower_damages.len()
    }

    /// Number of staged attacks on towers.
    #[must_use]
    pub fn damage_to_tower_count(&self) -> usize {
        self.damage_to_towers.len()
    }

    /// Drop everything.
    pub fn clear(&mut self) {
        self.damages.clear();
        self.spawns.clear();
        self.tower_damages.clear();
        self.damage_to_towers.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_and_clear() {
        let mut events = FrameEvents::new();
        events.add_damage(Some(1), 2, 10, DamageKind::Normal);
        events.add_damage(Some(1), 3, 5, DamageKind::Splash);
        events.add_tower_damage(1, 2, 109);
        events.add_damage_to_tower(4, 6, 3);
        events.add_spawn(UnitSpawnRequest {
            unit_id: "skeleton".to_string(),
            position: Vec2Fixed::ZERO,
            faction: Faction::Enemy,
            hp: 0,
        });

        assert_eq!(events.damage_count(), 2);
        assert_eq!(events.spawn_count(), 1);
        assert_eq!(events.tower_damage_count(), 1);
        assert_eq!(events.damage_to_tower_count(), 1);
        assert_eq!(events.damages[1].kind, DamageKind::Splash);

        events.clear();
        assert_eq!(events, FrameEvents::default());
    }
}
