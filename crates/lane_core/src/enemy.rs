//! Enemy behaviour.
//!
//! Enemies act individually. Each one scores the friendly units, sticks to
//! its pick unless a clearly better one shows up or the re-evaluation
//! interval runs out, and attacks from an attack slot around the target.

use tracing::trace;

use crate::combat::{collect_attack_events, update_charge_state};
use crate::events::FrameEvents;
use crate::math::{Fixed, Vec2Fixed};
use crate::movement::{integrate, MovementContext};
use crate::squad::{release_target_slot, tower_combat};
use crate::targeting::{best_scored_target, select_target, target_score, Target};
use crate::tower::Tower;
use crate::unit::{ArenaSplit, Faction, Unit, UnitArena, UnitId};

/// Lateral offset used to circle a target when no slot is free.
const FLANK_DISTANCE: i32 = 200;

/// Run one frame for every living enemy unit against `friendly_towers`.
pub fn update_enemies(
    units: &mut UnitArena,
    friendly_towers: &[Tower],
    events: &mut FrameEvents,
    ctx: &mut MovementContext<'_>,
) {
    let ids = units.living_ids(Faction::Enemy);
    let has_friendly_units = units.living_count(Faction::Friendly) > 0;
    let has_friendly_towers = friendly_towers.iter().any(|t| !t.is_destroyed());

    if !has_friendly_units && !has_friendly_towers {
        for &id in &ids {
            if let Some(unit) = units.get_mut(id) {
                unit.velocity = Vec2Fixed::ZERO;
                unit.clear_movement_path();
            }
        }
        return;
    }

    for id in ids {
        let Some((unit, mut rest)) = units.split_mut(id) else {
            continue;
        };
        unit.attack_cooldown = (unit.attack_cooldown - Fixed::ONE).max(Fixed::ZERO);
        update_enemy_target(unit, &mut rest, friendly_towers, ctx);
        update_enemy_movement(unit, &mut rest, friendly_towers, events, ctx);
        integrate(unit, &ctx.balance.map);
    }
}

fn update_enemy_target(
    unit: &mut Unit,
    rest: &mut ArenaSplit<'_>,
    towers: &[Tower],
    ctx: &MovementContext<'_>,
) {
    let balance = ctx.balance;
    unit.frames_since_target_evaluation += 1;
    if unit
        .target_tower
        .is_some_and(|id| towers.iter().find(|t| t.id == id).map_or(true, Tower::is_destroyed))
    {
        unit.target_tower = None;
    }

    let opposing: Vec<&Unit> = rest
        .iter()
        .filter(|u| u.faction != unit.faction && !u.is_dead())
        .collect();

    if let Some(Target::Tower(tower)) = select_target(unit, &opposing, towers) {
        release_target_slot(unit, rest);
        unit.target = None;
        unit.target_tower = Some(tower);
        unit.frames_since_target_evaluation = 0;
        return;
    }
    unit.target_tower = None;

    let penalty = balance.target_crowd_penalty_per_attacker;
    let previous = unit.target;
    let current = previous
        .and_then(|id| opposing.iter().find(|u| u.id == id))
        .filter(|t| unit.can_attack_unit(t))
        .copied();
    let best = best_scored_target(unit, &opposing, penalty);

    let next = match current {
        None => {
            unit.frames_since_target_evaluation = 0;
            best.map(|(id, _)| id)
        }
        Some(current) => {
            let interval_elapsed =
                unit.frames_since_target_evaluation >= balance.target_reevaluate_interval_frames;
            let current_score = target_score(unit, current, penalty);
            let switch_to = best.filter(|&(id, score)| {
                id != current.id
                    && (interval_elapsed || score + balance.target_switch_margin < current_score)
            });
            if interval_elapsed {
                unit.frames_since_target_evaluation = 0;
            }
            switch_to.map_or(Some(current.id), |(id, _)| Some(id))
        }
    };

    if next != previous {
        trace!(unit = unit.id, from = ?previous, to = ?next, "Enemy switched target");
        release_target_slot(unit, rest);
        unit.target = next;
        unit.frames_since_slot_evaluation = 0;
        if let Some(target) = next.and_then(|id| rest.get_mut(id)) {
            unit.taken_slot = target.claim_best_slot(unit.id, unit.position, unit.radius, None);
        }
    }
}

fn update_enemy_movement(
    unit: &mut Unit,
    rest: &mut ArenaSplit<'_>,
    towers: &[Tower],
    events: &mut FrameEvents,
    ctx: &mut MovementContext<'_>,
) {
    let separation = ctx.balance.separation_radius;
    if unit.target_tower.is_some() {
        tower_combat(unit, rest, towers, events, ctx, separation);
        return;
    }

    let Some(target_id) = unit.target.filter(|&id| rest.get(id).is_some()) else {
        unit.velocity = Vec2Fixed::ZERO;
        unit.clear_movement_path();
        unit.charge.reset();
        return;
    };

    refresh_slot(unit, rest, target_id, ctx);

    let Some(target) = rest.get(target_id) else {
        return;
    };
    let target_position = target.position;
    update_charge_state(unit, Some(target_position));

    let move_to = unit.taken_slot.map_or_else(
        || {
            let to_target = target_position - unit.position;
            target_position + to_target.perp().safe_normalize() * Fixed::from_num(FLANK_DISTANCE)
        },
        |slot| target.slot_position(slot, unit.radius),
    );

    if unit.in_attack_range(target) {
        unit.stop();
        if unit.attack_cooldown <= Fixed::ZERO {
            collect_attack_events(unit, target, rest.iter(), events);
            unit.attack_cooldown = ctx.balance.attack_cooldown;
        }
    } else {
        ctx.move_unit(unit, move_to, rest, separation);
    }
}

/// Re-pick the attack slot when none is held, the unit drifted away from
/// it, or the interval ran out.
fn refresh_slot(
    unit: &mut Unit,
    rest: &mut ArenaSplit<'_>,
    target_id: UnitId,
    ctx: &MovementContext<'_>,
) {
    let balance = ctx.balance;
    unit.frames_since_slot_evaluation += 1;
    let Some(target) = rest.get_mut(target_id) else {
        return;
    };

    let drifted = unit.taken_slot.map_or(true, |slot| {
        let limit = balance.slot_reevaluate_distance;
        target
            .slot_position(slot, unit.radius)
            .distance_squared(unit.position)
            > limit * limit
    });
    let interval_elapsed =
        unit.frames_since_slot_evaluation >= balance.slot_reevaluate_interval_frames;

    if drifted || interval_elapsed {
        unit.taken_slot =
            target.claim_best_slot(unit.id, unit.position, unit.radius, unit.taken_slot);
        unit.frames_since_slot_evaluation = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GameBalance;
    use crate::grid::PathfindingGrid;
    use crate::tower::{TowerStats, TowerType};
    use crate::unit::tests::spec;
    use crate::unit::TargetType;

    fn setup() -> (GameBalance, PathfindingGrid) {
        let balance = GameBalance::default();
        let grid = PathfindingGrid::new(balance.map.width, balance.map.height, balance.unit_radius);
        (balance, grid)
    }

    fn add(arena: &mut UnitArena, faction: Faction, x: i32, y: i32) -> UnitId {
        arena.insert(Unit::new(0, faction, Vec2Fixed::from_ints(x, y), spec(100)))
    }

    fn friendly_tower() -> Tower {
        Tower::new(
            1,
            TowerType::Princess,
            Faction::Friendly,
            Vec2Fixed::from_ints(600, 1200),
            &TowerStats::princess(),
        )
    }

    #[test]
    fn test_enemy_stops_when_nothing_left() {
        let (balance, mut grid) = setup();
        let mut arena = UnitArena::new();
        let id = add(&mut arena, Faction::Enemy, 1000, 3000);
        arena.get_mut(id).unwrap().velocity = Vec2Fixed::from_ints(3, 0);

        let mut events = FrameEvents::new();
        let mut ctx = MovementContext::new(&balance, &mut grid, 0);
        update_enemies(&mut arena, &[], &mut events, &mut ctx);

        let unit = arena.get(id).unwrap();
        assert_eq!(unit.velocity, Vec2Fixed::ZERO);
        assert_eq!(unit.position, Vec2Fixed::from_ints(1000, 3000));
    }

    #[test]
    fn test_enemy_picks_target_and_claims_slot() {
        let (balance, mut grid) = setup();
        let mut arena = UnitArena::new();
        let friend = add(&mut arena, Faction::Friendly, 1000, 2000);
        let enemy = add(&mut arena, Faction::Enemy, 1000, 2200);

        let mut events = FrameEvents::new();
        let mut ctx = MovementContext::new(&balance, &mut grid, 0);
        update_enemies(&mut arena, &[friendly_tower()], &mut events, &mut ctx);

        let unit = arena.get(enemy).unwrap();
        assert_eq!(unit.target, Some(friend));
        assert!(unit.taken_slot.is_some());
        assert_eq!(arena.get(friend).unwrap().occupied_slot_count(), 1);
        // Out of range: moving toward the target.
        assert!(unit.position.y < Fixed::from_num(2200));
    }

    #[test]
    fn test_enemy_attacks_in_range_then_cools_down() {
        let (balance, mut grid) = setup();
        let mut arena = UnitArena::new();
        let friend = add(&mut arena, Faction::Friendly, 1000, 2000);
        add(&mut arena, Faction::Enemy, 1000, 2050);

        let mut events = FrameEvents::new();
        let mut ctx = MovementContext::new(&balance, &mut grid, 0);
        update_enemies(&mut arena, &[], &mut events, &mut ctx);
        assert_eq!(events.damage_count(), 1);
        assert_eq!(events.damages[0].target, friend);

        events.clear();
        update_enemies(&mut arena, &[], &mut events, &mut ctx);
        assert_eq!(events.damage_count(), 0);
    }

    #[test]
    fn test_enemy_keeps_target_within_margin() {
        let (balance, mut grid) = setup();
        let mut arena = UnitArena::new();
        let first = add(&mut arena, Faction::Friendly, 1000, 2000);
        let enemy = add(&mut arena, Faction::Enemy, 1000, 2300);
        {
            let mut events = FrameEvents::new();
            let mut ctx = MovementContext::new(&balance, &mut grid, 0);
            update_enemies(&mut arena, &[], &mut events, &mut ctx);
        }
        assert_eq!(arena.get(enemy).unwrap().target, Some(first));

        // A marginally closer unit appears: not enough to switch.
        let enemy_pos = arena.get(enemy).unwrap().position;
        let closer = arena.insert(Unit::new(
            0,
            Faction::Friendly,
            enemy_pos - Vec2Fixed::from_ints(0, 290),
            spec(100),
        ));
        let mut events = FrameEvents::new();
        let mut ctx = MovementContext::new(&balance, &mut grid, 1);
        update_enemies(&mut arena, &[], &mut events, &mut ctx);
        assert_eq!(arena.get(enemy).unwrap().target, Some(first));

        // A much closer unit wins.
        arena.get_mut(closer).unwrap().position = enemy_pos - Vec2Fixed::from_ints(0, 100);
        update_enemies(&mut arena, &[], &mut events, &mut ctx);
        assert_eq!(arena.get(enemy).unwrap().target, Some(closer));
        assert_eq!(arena.get(first).unwrap().occupied_slot_count(), 0);
    }

    #[test]
    fn test_building_enemy_goes_for_tower() {
        let (balance, mut grid) = setup();
        let mut arena = UnitArena::new();
        add(&mut arena, Faction::Friendly, 1000, 2000);
        let mut s = spec(100);
        s.can_target = TargetType::ALL;
        s.target_priority = crate::unit::TargetPriority::Buildings;
        let enemy = arena.insert(Unit::new(0, Faction::Enemy, Vec2Fixed::from_ints(1000, 2100), s));

        let mut events = FrameEvents::new();
        let mut ctx = MovementContext::new(&balance, &mut grid, 0);
        update_enemies(&mut arena, &[friendly_tower()], &mut events, &mut ctx);

        let unit = arena.get(enemy).unwrap();
        assert_eq!(unit.target_tower, Some(1));
        assert_eq!(unit.target, None);
        assert_eq!(unit.frames_since_target_evaluation, 0);
    }
}
