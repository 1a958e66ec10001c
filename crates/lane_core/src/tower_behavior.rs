//! Tower targeting and attacks.

use tracing::trace;

use crate::events::FrameEvents;
use crate::math::Fixed;
use crate::tower::Tower;
use crate::unit::{UnitArena, UnitId};

/// Run one frame of a tower against the units of the other faction.
///
/// Destroyed towers and sleeping Kings do nothing and hold no target.
pub fn update_tower(tower: &mut Tower, units: &UnitArena, events: &mut FrameEvents, dt: Fixed) {
    if !tower.can_act() {
        tower.target = None;
        return;
    }

    tower.update_cooldown(dt);

    if let Some(id) = tower.target {
        let still_valid = units
            .get(id)
            .is_some_and(|u| u.faction != tower.faction && tower.can_attack_unit(u));
        if !still_valid {
            tower.target = None;
        }
    }

    if tower.target.is_none() {
        tower.target = nearest_in_range(tower, units);
        if let Some(target) = tower.target {
            trace!(tower = tower.id, unit = target, "Tower acquired target");
        }
    }

    if tower.is_ready_to_attack() {
        if let Some(target) = tower.target {
            events.add_tower_damage(tower.id, target, tower.damage);
            tower.on_attack_performed();
        }
    }
}

fn nearest_in_range(tower: &Tower, units: &UnitArena) -> Option<UnitId> {
    let mut best: Option<(UnitId, Fixed)> = None;
    for unit in units.living(tower.faction.opposite()) {
        if !tower.can_attack_unit(unit) {
            continue;
        }
        let dist_sq = tower.position.distance_squared(unit.position);
        if best.map_or(true, |(_, d)| dist_sq < d) {
            best = Some((unit.id, dist_sq));
        }
    }
    best.map(|(id, _)| id)
}

/// Friendly towers first, then enemy towers.
pub fn update_all_towers(
    friendly: &mut [Tower],
    enemy: &mut [Tower],
    units: &UnitArena,
    events: &mut FrameEvents,
    dt: Fixed,
) {
    for tower in friendly.iter_mut().chain(enemy.iter_mut()) {
        update_tower(tower, units, events, dt);
    }
}
