//! Friendly squad behaviour.
//!
//! The friendly side moves as one squad led by its lowest-id living unit.
//! While enemies live, the squad picks a target, gathers at a rally point
//! short of it, and every unit close enough to a fight breaks formation to
//! engage. With only enemy towers left the squad assaults them; with nothing
//! left it marches on the main target.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::combat::{collect_attack_events, update_charge_state};
use crate::events::FrameEvents;
use crate::math::{Fixed, Vec2Fixed};
use crate::movement::{integrate, MovementContext};
use crate::targeting::{nearest_unit, select_target, Target};
use crate::tower::Tower;
use crate::unit::{ArenaSplit, Faction, Unit, UnitArena, UnitId};

/// Formation slots relative to the leader, `x` along its heading.
pub const FORMATION_OFFSETS: [(i32, i32); 4] = [(0, 0), (0, 90), (-80, -45), (-80, 135)];

/// Squad-wide state carried between frames.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SquadBehavior {
    /// Enemy the squad is converging on.
    pub target: Option<UnitId>,
    /// Where the leader gathers the squad.
    pub rally_point: Option<Vec2Fixed>,
}

impl SquadBehavior {
    /// Squad with no target.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Run one frame for every living friendly unit, moving each one.
    pub fn update(
        &mut self,
        units: &mut UnitArena,
        enemy_towers: &[Tower],
        events: &mut FrameEvents,
        ctx: &mut MovementContext<'_>,
    ) {
        let ids = units.living_ids(Faction::Friendly);
        let Some(&leader) = ids.first() else {
            return;
        };

        if units.living_count(Faction::Enemy) > 0 {
            self.update_target_and_rally(units, leader, ctx);
            let rally = self.rally_point;
            for (index, &id) in ids.iter().enumerate() {
                let Some((unit, mut rest)) = units.split_mut(id) else {
                    continue;
                };
                if is_engaged(unit, &rest, enemy_towers, ctx) {
                    update_unit_target(unit, &mut rest, enemy_towers);
                    update_combat(unit, &mut rest, enemy_towers, events, ctx);
                } else {
                    let goal = rally.unwrap_or(unit.position);
                    move_in_formation(unit, &rest, index, leader, goal, ctx);
                }
                integrate(unit, &ctx.balance.map);
            }
        } else if enemy_towers.iter().any(|t| !t.is_destroyed()) {
            self.target = None;
            self.rally_point = None;
            let separation = ctx.balance.friendly_separation_radius;
            for &id in &ids {
                let Some((unit, mut rest)) = units.split_mut(id) else {
                    continue;
                };
                update_unit_target(unit, &mut rest, enemy_towers);
                tower_combat(unit, &rest, enemy_towers, events, ctx, separation);
                integrate(unit, &ctx.balance.map);
            }
        } else {
            if self.target.is_some() || self.rally_point.is_some() {
                debug!(frame = ctx.frame, "Squad reset; marching on main target");
                self.reset(units);
            }
            let goal = ctx.balance.map.main_target();
            for (index, &id) in ids.iter().enumerate() {
                let Some((unit, rest)) = units.split_mut(id) else {
                    continue;
                };
                move_in_formation(unit, &rest, index, leader, goal, ctx);
                integrate(unit, &ctx.balance.map);
            }
        }
    }

    fn update_target_and_rally(
        &mut self,
        units: &UnitArena,
        leader_id: UnitId,
        ctx: &MovementContext<'_>,
    ) {
        let Some(leader) = units.get(leader_id) else {
            return;
        };

        let keep = self
            .target
            .and_then(|id| units.get(id))
            .is_some_and(|t| !t.is_dead() && leader.can_attack_unit(t));
        if !keep {
            let enemies: Vec<&Unit> = units.living(Faction::Enemy).collect();
            let picked = nearest_unit(leader, &enemies);
            if picked != self.target {
                debug!(frame = ctx.frame, target = ?picked, "Squad target changed");
            }
            self.target = picked;
        }

        self.rally_point = self.target.and_then(|id| units.get(id)).map(|target| {
            let direction = (target.position - leader.position).safe_normalize();
            target.position - direction * ctx.balance.rally_distance
        });
    }

    /// Forget the squad target and stop every friendly unit where it stands.
    pub fn reset(&mut self, units: &mut UnitArena) {
        self.target = None;
        self.rally_point = None;
        for unit in units.iter_mut().filter(|u| u.faction == Faction::Friendly) {
            unit.target = None;
            unit.target_tower = None;
            unit.taken_slot = None;
            unit.stop();
        }
    }
}

fn is_engaged(unit: &Unit, rest: &ArenaSplit<'_>, towers: &[Tower], ctx: &MovementContext<'_>) -> bool {
    let has_target = unit
        .target
        .and_then(|id| rest.get(id))
        .is_some_and(|t| unit.can_attack_unit(t));
    let has_tower = unit
        .target_tower
        .and_then(|id| towers.iter().find(|t| t.id == id))
        .is_some_and(|t| !t.is_destroyed());
    if has_target || has_tower {
        return true;
    }

    let trigger = unit.attack_range * ctx.balance.engagement_trigger_distance_multiplier;
    let trigger_sq = trigger * trigger;
    rest.iter().any(|other| {
        other.faction != unit.faction
            && unit.can_attack_unit(other)
            && unit.position.distance_squared(other.position) <= trigger_sq
    })
}

/// Release the slot `unit` holds on its current unit target.
pub(crate) fn release_target_slot(unit: &mut Unit, rest: &mut ArenaSplit<'_>) {
    if let (Some(target), Some(slot)) = (unit.target, unit.taken_slot) {
        if let Some(target) = rest.get_mut(target) {
            target.release_slot(unit.id, slot);
        }
    }
    unit.taken_slot = None;
}

/// Refresh a friendly unit's target and tick its cooldown.
pub(crate) fn update_unit_target(unit: &mut Unit, rest: &mut ArenaSplit<'_>, towers: &[Tower]) {
    let target_gone = unit
        .target
        .is_some_and(|id| rest.get(id).map_or(true, |t| !unit.can_attack_unit(t)));
    if target_gone {
        release_target_slot(unit, rest);
        unit.target = None;
    }
    if unit
        .target_tower
        .is_some_and(|id| towers.iter().find(|t| t.id == id).map_or(true, Tower::is_destroyed))
    {
        unit.target_tower = None;
    }

    unit.attack_cooldown = (unit.attack_cooldown - Fixed::ONE).max(Fixed::ZERO);

    let opposing: Vec<&Unit> = rest
        .iter()
        .filter(|u| u.faction != unit.faction && !u.is_dead())
        .collect();
    match select_target(unit, &opposing, towers) {
        Some(Target::Unit(id)) => {
            if unit.target != Some(id) {
                release_target_slot(unit, rest);
                unit.target = Some(id);
            }
            unit.target_tower = None;
            if let Some(target) = rest.get_mut(id) {
                unit.taken_slot =
                    target.claim_best_slot(unit.id, unit.position, unit.radius, unit.taken_slot);
            }
        }
        Some(Target::Tower(id)) => {
            release_target_slot(unit, rest);
            unit.target = None;
            unit.target_tower = Some(id);
        }
        None => {
            release_target_slot(unit, rest);
            unit.target = None;
            unit.target_tower = None;
        }
    }
}

fn update_combat(
    unit: &mut Unit,
    rest: &mut ArenaSplit<'_>,
    towers: &[Tower],
    events: &mut FrameEvents,
    ctx: &mut MovementContext<'_>,
) {
    let separation = ctx.balance.friendly_separation_radius;
    if unit.target_tower.is_some() {
        tower_combat(unit, rest, towers, events, ctx, separation);
        return;
    }

    let Some(target) = unit.target.and_then(|id| rest.get(id)) else {
        unit.stop();
        unit.charge.reset();
        return;
    };

    let target_position = target.position;
    update_charge_state(unit, Some(target_position));
    let attack_position = unit
        .taken_slot
        .map_or(target_position, |slot| target.slot_position(slot, unit.radius));

    if unit.in_attack_range(target) {
        unit.stop();
        if unit.attack_cooldown <= Fixed::ZERO {
            collect_attack_events(unit, target, rest.iter(), events);
            unit.attack_cooldown = ctx.balance.attack_cooldown;
        }
    } else {
        ctx.move_unit(unit, attack_position, rest, separation);
    }
}

/// Walk to and hit the unit's tower target.
///
/// Towers are reached at `attack_range + tower.radius`; the unit heads for
/// the edge of the tower's blocked footprint nearest to it.
pub(crate) fn tower_combat(
    unit: &mut Unit,
    rest: &ArenaSplit<'_>,
    towers: &[Tower],
    events: &mut FrameEvents,
    ctx: &mut MovementContext<'_>,
    separation_radius: Fixed,
) {
    let Some(tower) = unit
        .target_tower
        .and_then(|id| towers.iter().find(|t| t.id == id))
        .filter(|t| !t.is_destroyed())
    else {
        unit.target_tower = None;
        unit.stop();
        return;
    };

    if unit.position.distance(tower.position) <= unit.attack_range + tower.radius {
        unit.stop();
        if unit.attack_cooldown <= Fixed::ZERO {
            events.add_damage_to_tower(unit.id, tower.id, unit.effective_damage());
            unit.on_attack_performed();
            unit.attack_cooldown = ctx.balance.attack_cooldown;
        }
        return;
    }

    let outward = (unit.position - tower.position).safe_normalize();
    let standoff = tower.radius + ctx.balance.tower_collision_padding + unit.radius;
    let approach = tower.position + outward * standoff;
    ctx.move_unit(unit, approach, rest, separation_radius);
}

fn move_in_formation(
    unit: &mut Unit,
    rest: &ArenaSplit<'_>,
    index: usize,
    leader_id: UnitId,
    goal: Vec2Fixed,
    ctx: &mut MovementContext<'_>,
) {
    let separation = ctx.balance.friendly_separation_radius;
    if unit.id == leader_id {
        ctx.move_unit(unit, goal, rest, separation);
        return;
    }
    let Some(leader) = rest.get(leader_id) else {
        ctx.move_unit(unit, goal, rest, separation);
        return;
    };

    let (x, y) = FORMATION_OFFSETS[index.min(FORMATION_OFFSETS.len() - 1)];
    let slot = leader.position + Vec2Fixed::from_ints(x, y).rotate_by(leader.forward);
    let threshold = ctx.balance.formation_threshold;
    if unit.position.distance_squared(slot) <= threshold * threshold {
        unit.velocity = Vec2Fixed::ZERO;
        return;
    }
    ctx.move_unit(unit, slot, rest, separation);
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
        let mut s = spec(100);
        s.can_target = TargetType::ALL;
        arena.insert(Unit::new(0, faction, Vec2Fixed::from_ints(x, y), s))
    }

    #[test]
    fn test_squad_targets_nearest_enemy_and_sets_rally() {
        let (balance, mut grid) = setup();
        let mut arena = UnitArena::new();
        add(&mut arena, Faction::Friendly, 1000, 1000);
        add(&mut arena, Faction::Friendly, 1100, 1000);
        let near = add(&mut arena, Faction::Enemy, 1000, 2000);
        add(&mut arena, Faction::Enemy, 3000, 3000);

        let mut squad = SquadBehavior::new();
        let mut events = FrameEvents::new();
        let mut ctx = MovementContext::new(&balance, &mut grid, 0);
        squad.update(&mut arena, &[], &mut events, &mut ctx);

        assert_eq!(squad.target, Some(near));
        assert_eq!(squad.rally_point, Some(Vec2Fixed::from_ints(1000, 1700)));
        // Leader marched toward the rally point.
        assert!(arena.get(1).unwrap().position.y > Fixed::from_num(1000));
    }

    #[test]
    fn test_engaged_unit_attacks_in_range() {
        let (balance, mut grid) = setup();
        let mut arena = UnitArena::new();
        let friend = add(&mut arena, Faction::Friendly, 1000, 1000);
        let enemy = add(&mut arena, Faction::Enemy, 1000, 1050);

        let mut squad = SquadBehavior::new();
        let mut events = FrameEvents::new();
        let mut ctx = MovementContext::new(&balance, &mut grid, 0);
        squad.update(&mut arena, &[], &mut events, &mut ctx);

        assert_eq!(events.damage_count(), 1);
        assert_eq!(events.damages[0].target, enemy);
        let unit = arena.get(friend).unwrap();
        assert_eq!(unit.target, Some(enemy));
        assert_eq!(unit.attack_cooldown, balance.attack_cooldown);
        assert!(unit.taken_slot.is_some());
        assert_eq!(arena.get(enemy).unwrap().occupied_slot_count(), 1);

        // Next frame: cooling down, no new damage.
        events.clear();
        squad.update(&mut arena, &[], &mut events, &mut ctx);
        assert_eq!(events.damage_count(), 0);
    }

    #[test]
    fn test_tower_assault_when_no_enemies() {
        let (balance, mut grid) = setup();
        let mut arena = UnitArena::new();
        let friend = add(&mut arena, Faction::Friendly, 1000, 4000);
        let towers = vec![Tower::new(
            7,
            TowerType::Princess,
            Faction::Enemy,
            Vec2Fixed::from_ints(1000, 4150),
            &TowerStats::princess(),
        )];

        let mut squad = SquadBehavior::new();
        let mut events = FrameEvents::new();
        let mut ctx = MovementContext::new(&balance, &mut grid, 0);
        squad.update(&mut arena, &towers, &mut events, &mut ctx);

        assert_eq!(arena.get(friend).unwrap().target_tower, Some(7));
        assert_eq!(events.damage_to_towers.len(), 1);
        assert_eq!(events.damage_to_towers[0].tower, 7);
    }

    #[test]
    fn test_march_on_main_target_resets_squad() {
        let (balance, mut grid) = setup();
        let mut arena = UnitArena::new();
        add(&mut arena, Faction::Friendly, 1000, 1000);
        let mut squad = SquadBehavior {
            target: Some(99),
            rally_point: Some(Vec2Fixed::from_ints(5, 5)),
        };
        let mut events = FrameEvents::new();
        let mut ctx = MovementContext::new(&balance, &mut grid, 0);
        squad.update(&mut arena, &[], &mut events, &mut ctx);

        assert_eq!(squad, SquadBehavior::default());
        let leader = arena.get(1).unwrap();
        let main = balance.map.main_target();
        assert!(leader.position.distance(main) < Vec2Fixed::from_ints(1000, 1000).distance(main));
    }

    #[test]
    fn test_follower_holds_in_formation_slot() {
        let (balance, mut grid) = setup();
        let mut arena = UnitArena::new();
        add(&mut arena, Faction::Friendly, 1000, 1000);
        // Leader faces +Y, so offset (0, 90) lands at (910, 1000).
        let follower = add(&mut arena, Faction::Friendly, 910, 1000);

        let mut squad = SquadBehavior::new();
        let mut events = FrameEvents::new();
        let mut ctx = MovementContext::new(&balance, &mut grid, 0);
        // Freeze the leader so the slot stays put.
        arena.get_mut(1).unwrap().speed = Fixed::ZERO;
        squad.update(&mut arena, &[], &mut events, &mut ctx);

        let unit = arena.get(follower).unwrap();
        assert_eq!(unit.velocity, Vec2Fixed::ZERO);
        assert_eq!(unit.position, Vec2Fixed::from_ints(910, 1000));
    }
}
