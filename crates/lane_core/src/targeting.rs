//! Target selection rules shared by both factions.

use crate::math::Fixed;
use crate::tower::{Tower, TowerId};
use crate::unit::{TargetPriority, Unit, UnitId};

/// What a unit decided to attack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    /// An opposing unit.
    Unit(UnitId),
    /// An opposing tower.
    Tower(TowerId),
}

/// Nearest standing tower, if `unit` may attack buildings.
#[must_use]
pub fn nearest_tower(unit: &Unit, towers: &[Tower]) -> Option<TowerId> {
    if !unit.can_target_buildings() {
        return None;
    }
    let mut best: Option<(TowerId, Fixed)> = None;
    for tower in towers.iter().filter(|t| !t.is_destroyed()) {
        let dist_sq = unit.position.distance_squared(tower.position);
        if best.map_or(true, |(_, d)| dist_sq < d) {
            best = Some((tower.id, dist_sq));
        }
    }
    best.map(|(id, _)| id)
}

/// Nearest opposing unit `unit` can attack; ties go to the lower id.
#[must_use]
pub fn nearest_unit(unit: &Unit, opposing: &[&Unit]) -> Option<UnitId> {
    let mut best: Option<(UnitId, Fixed)> = None;
    for candidate in opposing {
        if candidate.faction == unit.faction || !unit.can_attack_unit(candidate) {
            continue;
        }
        let dist_sq = unit.position.distance_squared(candidate.position);
        if best.map_or(true, |(_, d)| dist_sq < d) {
            best = Some((candidate.id, dist_sq));
        }
    }
    best.map(|(id, _)| id)
}

/// Pick a target by the unit's priority.
///
/// `Buildings` prefers the nearest tower and falls back to units. `Nearest`
/// goes for units while any opposing unit lives, and towers after that.
#[must_use]
pub fn select_target(unit: &Unit, opposing: &[&Unit], towers: &[Tower]) -> Option<Target> {
    match unit.target_priority {
        TargetPriority::Buildings => nearest_tower(unit, towers)
            .map(Target::Tower)
            .or_else(|| nearest_unit(unit, opposing).map(Target::Unit)),
        TargetPriority::Nearest => {
            let any_alive = opposing
                .iter()
                .any(|u| u.faction != unit.faction && !u.is_dead());
            if any_alive {
                nearest_unit(unit, opposing).map(Target::Unit)
            } else {
                nearest_tower(unit, towers).map(Target::Tower)
            }
        }
    }
}

/// Crowd-penalised score of `candidate` for `attacker`; lower is better.
///
/// Slots held by other attackers each add `crowd_penalty`.
#[must_use]
pub fn target_score(attacker: &Unit, candidate: &Unit, crowd_penalty: Fixed) -> Fixed {
    let crowd = candidate
        .attack_slots
        .iter()
        .filter(|slot| slot.is_some_and(|id| id != attacker.id))
        .count();
    attacker.position.distance(candidate.position) + Fixed::from_num(crowd as i32) * crowd_penalty
}

/// Best-scored attackable opposing unit and its score.
#[must_use]
pub fn best_scored_target(
    attacker: &Unit,
    opposing: &[&Unit],
    crowd_penalty: Fixed,
) -> Option<(UnitId, Fixed)> {
    let mut best: Option<(UnitId, Fixed)> = None;
    for candidate in opposing {
        if candidate.faction == attacker.faction || !attacker.can_attack_unit(candidate) {
            continue;
        }
        let score = target_score(attacker, candidate, crowd_penalty);
        if best.map_or(true, |(_, s)| score < s) {
            best = Some((candidate.id, score));
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::Vec2Fixed;
    use crate::tower::{TowerStats, TowerType};
    use crate::unit::tests::spec;
    use crate::unit::{Faction, MovementLayer, TargetType};

    fn unit(id: UnitId, faction: Faction, x: i32, y: i32) -> Unit {
        Unit::new(id, faction, Vec2Fixed::from_ints(x, y), spec(10))
    }

    fn tower(id: TowerId, x: i32, y: i32) -> Tower {
        Tower::new(
            id,
            TowerType::Princess,
            Faction::Enemy,
            Vec2Fixed::from_ints(x, y),
            &TowerStats::princess(),
        )
    }

    #[test]
    fn test_nearest_prefers_units_while_any_live() {
        let mut me = unit(1, Faction::Friendly, 0, 0);
        me.can_target = TargetType::ALL;
        let far = unit(2, Faction::Enemy, 500, 0);
        let towers = vec![tower(1, 50, 0)];
        assert_eq!(select_target(&me, &[&far], &towers), Some(Target::Unit(2)));

        let mut dead = far.clone();
        dead.set_hp(0);
        assert_eq!(select_target(&me, &[&dead], &towers), Some(Target::Tower(1)));
    }

    #[test]
    fn test_buildings_priority_prefers_towers() {
        let mut me = unit(1, Faction::Friendly, 0, 0);
        me.can_target = TargetType::ALL;
        me.target_priority = TargetPriority::Buildings;
        let close = unit(2, Faction::Enemy, 10, 0);
        let mut towers = vec![tower(1, 900, 0), tower(2, 400, 0)];
        assert_eq!(select_target(&me, &[&close], &towers), Some(Target::Tower(2)));

        for t in &mut towers {
            t.current_hp = 0;
        }
        assert_eq!(select_target(&me, &[&close], &towers), Some(Target::Unit(2)));
    }

    #[test]
    fn test_mask_without_buildings_never_picks_towers() {
        let me = unit(1, Faction::Friendly, 0, 0);
        assert_eq!(select_target(&me, &[], &[tower(1, 10, 0)]), None);
    }

    #[test]
    fn test_nearest_unit_respects_layer_and_ties() {
        let mut me = unit(1, Faction::Friendly, 0, 0);
        me.can_target = TargetType::GROUND;
        let mut flyer = unit(2, Faction::Enemy, 5, 0);
        flyer.layer = MovementLayer::Air;
        let left = unit(3, Faction::Enemy, -20, 0);
        let right = unit(4, Faction::Enemy, 20, 0);
        assert_eq!(nearest_unit(&me, &[&flyer, &left, &right]), Some(3));
    }

    #[test]
    fn test_crowd_penalty_shifts_choice() {
        let me = unit(1, Faction::Enemy, 0, 0);
        let mut crowded = unit(2, Faction::Friendly, 50, 0);
        crowded.attack_slots[0] = Some(7);
        crowded.attack_slots[1] = Some(8);
        let open = unit(3, Faction::Friendly, 80, 0);

        let penalty = Fixed::from_num(25);
        assert_eq!(target_score(&me, &crowded, penalty), Fixed::from_num(100));
        assert_eq!(best_scored_target(&me, &[&crowded, &open], penalty), Some((3, Fixed::from_num(80))));

        // The attacker's own slot does not count against it.
        crowded.attack_slots[1] = Some(1);
        assert_eq!(target_score(&me, &crowded, penalty), Fixed::from_num(75));
    }
}
