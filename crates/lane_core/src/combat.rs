//! Attacks, splash, and death abilities.
//!
//! Two entry points exist. Behaviours use [`collect_attack_events`], which
//! only stages damage in [`FrameEvents`] for the simulator to apply later.
//! [`perform_attack`] resolves an attack immediately, including every death
//! it causes, for callers that hold the arena outside a frame.
//!
//! Deaths are always processed through one FIFO queue: each dead unit emits
//! its spawn requests and death damage, and units killed by that damage are
//! appended to the same queue.

use std::collections::{BTreeSet, VecDeque};

use tracing::debug;

use crate::abilities::SplashDamage;
use crate::events::{DamageKind, FrameEvents, UnitSpawnRequest};
use crate::math::{Fixed, Vec2Fixed, SMALL_NUMBER, TAU};
use crate::unit::{Unit, UnitArena, UnitId};

/// Outcome of an immediately resolved attack.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttackResult {
    /// Every unit killed, in kill order, without duplicates.
    pub killed_units: Vec<UnitId>,
    /// Spawns requested by the deaths.
    pub spawn_requests: Vec<UnitSpawnRequest>,
}

/// Splash damage at `distance` from the primary target.
///
/// `trunc(base * max(0, 1 - distance / radius * falloff))`; without falloff
/// the full damage applies across the radius.
#[must_use]
pub fn splash_damage(base: i32, distance: Fixed, splash: &SplashDamage) -> i32 {
    if splash.damage_falloff <= Fixed::ZERO || splash.radius <= Fixed::ZERO {
        return base;
    }
    let factor = (Fixed::ONE - distance / splash.radius * splash.damage_falloff).max(Fixed::ZERO);
    (Fixed::from_num(base) * factor).to_num::<i32>()
}

/// Attack `target_id` with `attacker_id` and resolve the consequences now.
///
/// Nothing happens when either unit is missing or the target is already
/// dead.
pub fn perform_attack(units: &mut UnitArena, attacker_id: UnitId, target_id: UnitId) -> AttackResult {
    let Some((attacker, mut rest)) = units.split_mut(attacker_id) else {
        return AttackResult::default();
    };
    let Some(target) = rest.get_mut(target_id) else {
        return AttackResult::default();
    };
    if target.is_dead() {
        return AttackResult::default();
    }

    let damage = attacker.effective_damage();
    let center = target.position;
    let mut initial = Vec::new();

    target.take_damage(damage);
    if target.is_dead() {
        initial.push(target_id);
    }

    if let Some(splash) = attacker.splash().copied() {
        for other in rest.iter_mut() {
            if other.id == target_id
                || other.faction == attacker.faction
                || !attacker.can_attack_unit(other)
            {
                continue;
            }
            let distance = center.distance(other.position);
            if distance > splash.radius {
                continue;
            }
            let amount = splash_damage(damage, distance, &splash);
            if amount > 0 {
                other.take_damage(amount);
                if other.is_dead() {
                    initial.push(other.id);
                }
            }
        }
    }

    attacker.on_attack_performed();

    let (killed_units, spawn_requests) = resolve_deaths(units, initial);
    AttackResult {
        killed_units,
        spawn_requests,
    }
}

/// Stage an attack: normal damage on the target, splash around it, then
/// spend the attacker's charge.
pub fn collect_attack_events<'a>(
    attacker: &mut Unit,
    target: &Unit,
    opposing: impl IntoIterator<Item = &'a Unit>,
    events: &mut FrameEvents,
) {
    if target.is_dead() {
        return;
    }

    let damage = attacker.effective_damage();
    events.add_damage(Some(attacker.id), target.id, damage, DamageKind::Normal);

    if let Some(splash) = attacker.splash().copied() {
        for other in opposing {
            if other.id == target.id
                || other.faction == attacker.faction
                || !attacker.can_attack_unit(other)
            {
                continue;
            }
            let distance = target.position.distance(other.position);
            if distance > splash.radius {
                continue;
            }
            let amount = splash_damage(damage, distance, &splash);
            if amount > 0 {
                events.add_damage(Some(attacker.id), other.id, amount, DamageKind::Splash);
            }
        }
    }

    attacker.on_attack_performed();
}

/// Spawn requests for a unit with a death spawn, evenly spaced on a ring.
#[must_use]
pub fn create_death_spawn_requests(dead: &Unit) -> Vec<UnitSpawnRequest> {
    let Some(spawn) = dead.death_spawn() else {
        return Vec::new();
    };
    if spawn.spawn_count == 0 {
        return Vec::new();
    }

    let count = Fixed::from_num(spawn.spawn_count);
    (0..spawn.spawn_count)
        .map(|i| {
            let angle = TAU * Fixed::from_num(i) / count;
            UnitSpawnRequest {
                unit_id: spawn.spawn_unit_id.clone(),
                position: dead.position + Vec2Fixed::from_angle(angle) * spawn.spawn_radius,
                faction: dead.faction,
                hp: spawn.spawn_unit_hp,
            }
        })
        .collect()
}

/// Damage every living opposing unit around `dead` and knock survivors back.
///
/// Returns the units this killed, in id order.
pub fn apply_death_damage(dead: &Unit, units: &mut UnitArena) -> Vec<UnitId> {
    let Some(blast) = dead.death_damage().copied() else {
        return Vec::new();
    };
    if blast.damage <= 0 {
        return Vec::new();
    }

    let mut newly_dead = Vec::new();
    for victim in units.iter_mut() {
        if victim.is_dead() || victim.faction == dead.faction || victim.id == dead.id {
            continue;
        }
        if dead.position.distance(victim.position) > blast.radius {
            continue;
        }

        victim.take_damage(blast.damage);
        if victim.is_dead() {
            newly_dead.push(victim.id);
            continue;
        }

        let shielded = victim
            .shield()
            .is_some_and(|s| s.blocks_knockback && victim.shield_hp > 0);
        if blast.knockback_distance > Fixed::ZERO && !shielded {
            let away = victim.position - dead.position;
            let length = away.length();
            if length > SMALL_NUMBER {
                victim.position += away / length * blast.knockback_distance;
            }
        }
    }
    newly_dead
}

/// Run the death queue seeded with `initial`.
///
/// Returns every processed death in order and the spawns they requested.
pub fn resolve_deaths(
    units: &mut UnitArena,
    initial: Vec<UnitId>,
) -> (Vec<UnitId>, Vec<UnitSpawnRequest>) {
    let mut queue: VecDeque<UnitId> = initial.into();
    let mut seen = BTreeSet::new();
    let mut killed = Vec::new();
    let mut spawns = Vec::new();

    while let Some(id) = queue.pop_front() {
        if !seen.insert(id) {
            continue;
        }
        let Some(dead) = units.get(id).cloned() else {
            continue;
        };
        killed.push(id);

        let requested = create_death_spawn_requests(&dead);
        if !requested.is_empty() {
            debug!(unit = id, count = requested.len(), "Death spawn");
        }
        spawns.extend(requested);

        let chained = apply_death_damage(&dead, units);
        if !chained.is_empty() {
            debug!(unit = id, killed = ?chained, "Death damage chain");
        }
        queue.extend(chained);
    }

    (killed, spawns)
}

/// Advance the charge run-up toward `target_position` (`None` = no target).
pub fn update_charge_state(unit: &mut Unit, target_position: Option<Vec2Fixed>) {
    let Some(charge) = unit.charge_attack().copied() else {
        return;
    };
    let Some(target_position) = target_position else {
        unit.charge.reset();
        return;
    };

    if !unit.charge.is_charging && unit.position.distance(target_position) >= charge.trigger_distance
    {
        unit.charge.start(unit.position, charge.required_charge_distance);
    }
    if unit.charge.is_charging {
        unit.charge.update_distance(unit.position);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abilities::{AbilityData, ChargeAttack, DeathDamage, DeathSpawn, Shield};
    use crate::unit::tests::spec;
    use crate::unit::{Faction, MovementLayer, UnitSpec};

    fn add(arena: &mut UnitArena, faction: Faction, x: i32, y: i32, s: UnitSpec) -> UnitId {
        arena.insert(Unit::new(0, faction, Vec2Fixed::from_ints(x, y), s))
    }

    fn splash_spec(falloff: Fixed) -> UnitSpec {
        let mut s = spec(100);
        s.abilities.push(AbilityData::SplashDamage(SplashDamage {
            radius: Fixed::from_num(50),
            damage_falloff: falloff,
        }));
        s
    }

    #[test]
    fn test_splash_damage_formula() {
        let full = SplashDamage {
            radius: Fixed::from_num(50),
            damage_falloff: Fixed::ZERO,
        };
        assert_eq!(splash_damage(10, Fixed::from_num(49), &full), 10);

        let linear = SplashDamage {
            radius: Fixed::from_num(50),
            damage_falloff: Fixed::ONE,
        };
        assert_eq!(splash_damage(10, Fixed::ZERO, &linear), 10);
        assert_eq!(splash_damage(10, Fixed::from_num(25), &linear), 5);
        assert_eq!(splash_damage(10, Fixed::from_num(50), &linear), 0);
    }

    #[test]
    fn test_perform_attack_on_dead_target_is_noop() {
        let mut arena = UnitArena::new();
        let attacker = add(&mut arena, Faction::Friendly, 0, 0, spec(10));
        let target = add(&mut arena, Faction::Enemy, 10, 0, spec(10));
        arena.get_mut(target).unwrap().set_hp(0);
        assert_eq!(perform_attack(&mut arena, attacker, target), AttackResult::default());
    }

    #[test]
    fn test_splash_respects_layer_mask_and_faction() {
        let mut arena = UnitArena::new();
        let mut attacker_spec = splash_spec(Fixed::ZERO);
        attacker_spec.can_target = crate::unit::TargetType::GROUND;
        let attacker = add(&mut arena, Faction::Friendly, 0, 0, attacker_spec);
        let target = add(&mut arena, Faction::Enemy, 100, 100, spec(50));
        let mut air = spec(50);
        air.layer = MovementLayer::Air;
        let flyer = add(&mut arena, Faction::Enemy, 110, 100, air);
        let ally = add(&mut arena, Faction::Friendly, 100, 110, spec(50));
        let bystander = add(&mut arena, Faction::Enemy, 120, 100, spec(50));

        perform_attack(&mut arena, attacker, target);
        assert_eq!(arena.get(target).unwrap().hp, 40);
        assert_eq!(arena.get(flyer).unwrap().hp, 50);
        assert_eq!(arena.get(ally).unwrap().hp, 50);
        assert_eq!(arena.get(bystander).unwrap().hp, 40);
    }

    #[test]
    fn test_collect_attack_events_stages_only() {
        let mut arena = UnitArena::new();
        let attacker = add(&mut arena, Faction::Friendly, 0, 0, splash_spec(Fixed::ONE));
        let target = add(&mut arena, Faction::Enemy, 100, 100, spec(50));
        let near = add(&mut arena, Faction::Enemy, 125, 100, spec(50));
        let far = add(&mut arena, Faction::Enemy, 300, 100, spec(50));

        let mut events = FrameEvents::new();
        {
            let (unit, rest) = arena.split_mut(attacker).unwrap();
            let victim = rest.get(target).unwrap();
            collect_attack_events(unit, victim, rest.iter(), &mut events);
        }

        assert_eq!(events.damage_count(), 2);
        assert_eq!(events.damages[0].kind, DamageKind::Normal);
        assert_eq!(events.damages[1].target, near);
        assert_eq!(events.damages[1].amount, 5);
        assert!(events.damages.iter().all(|d| d.target != far));
        assert_eq!(arena.get(target).unwrap().hp, 50);
    }

    #[test]
    fn test_death_spawn_ring() {
        let mut s = spec(10);
        s.abilities.push(AbilityData::DeathSpawn(DeathSpawn {
            spawn_unit_id: "skeleton".to_string(),
            spawn_count: 4,
            spawn_radius: Fixed::from_num(30),
            spawn_unit_hp: 7,
        }));
        let dead = Unit::new(5, Faction::Enemy, Vec2Fixed::from_ints(100, 100), s);
        let requests = create_death_spawn_requests(&dead);
        assert_eq!(requests.len(), 4);
        assert!(requests.iter().all(|r| r.faction == Faction::Enemy && r.hp == 7));
        let tolerance = Fixed::from_num(0.01);
        assert!((requests[0].position.x - Fixed::from_num(130)).abs() < tolerance);
        assert!((requests[0].position.y - Fixed::from_num(100)).abs() < tolerance);
        assert!((requests[1].position.y - Fixed::from_num(130)).abs() < tolerance);
        assert!((requests[2].position.x - Fixed::from_num(70)).abs() < tolerance);
    }

    #[test]
    fn test_death_damage_knockback_and_shield() {
        let mut arena = UnitArena::new();
        let mut bomber = spec(10);
        bomber.abilities.push(AbilityData::DeathDamage(DeathDamage {
            damage: 3,
            radius: Fixed::from_num(50),
            knockback_distance: Fixed::from_num(20),
        }));
        let dead_id = add(&mut arena, Faction::Enemy, 100, 100, bomber);
        let plain = add(&mut arena, Faction::Friendly, 130, 100, spec(10));
        let mut shielded_spec = spec(10);
        shielded_spec.abilities.push(AbilityData::Shield(Shield {
            max_shield_hp: 10,
            blocks_stun: false,
            blocks_knockback: true,
        }));
        let shielded = add(&mut arena, Faction::Friendly, 100, 130, shielded_spec);
        let weak = add(&mut arena, Faction::Friendly, 70, 100, spec(2));

        let dead = arena.get(dead_id).unwrap().clone();
        let killed = apply_death_damage(&dead, &mut arena);
        assert_eq!(killed, vec![weak]);

        let plain = arena.get(plain).unwrap();
        assert_eq!(plain.hp, 7);
        assert_eq!(plain.position, Vec2Fixed::from_ints(150, 100));

        let shielded = arena.get(shielded).unwrap();
        assert_eq!(shielded.shield_hp, 7);
        assert_eq!(shielded.position, Vec2Fixed::from_ints(100, 130));
    }

    #[test]
    fn test_zero_death_damage_skipped() {
        let mut arena = UnitArena::new();
        let mut s = spec(10);
        s.abilities.push(AbilityData::DeathDamage(DeathDamage {
            damage: 0,
            ..DeathDamage::default()
        }));
        let dead_id = add(&mut arena, Faction::Enemy, 100, 100, s);
        let near = add(&mut arena, Faction::Friendly, 110, 100, spec(1));
        let dead = arena.get(dead_id).unwrap().clone();
        assert!(apply_death_damage(&dead, &mut arena).is_empty());
        assert_eq!(arena.get(near).unwrap().hp, 1);
    }

    #[test]
    fn test_death_chain_is_fifo() {
        let mut arena = UnitArena::new();
        let blast = |damage| {
            let mut s = spec(1);
            s.abilities.push(AbilityData::DeathDamage(DeathDamage {
                damage,
                radius: Fixed::from_num(40),
                knockback_distance: Fixed::ZERO,
            }));
            s
        };
        let first = add(&mut arena, Faction::Enemy, 100, 100, blast(5));
        let second = add(&mut arena, Faction::Friendly, 130, 100, blast(5));
        let third = add(&mut arena, Faction::Enemy, 160, 100, blast(5));
        arena.get_mut(first).unwrap().set_hp(0);

        let (killed, spawns) = resolve_deaths(&mut arena, vec![first]);
        assert_eq!(killed, vec![first, second, third]);
        assert!(spawns.is_empty());
    }

    fn charged_splasher(arena: &mut UnitArena, splash_radius: i32) -> UnitId {
        let mut s = spec(100);
        s.abilities.push(AbilityData::SplashDamage(SplashDamage {
            radius: Fixed::from_num(splash_radius),
            damage_falloff: Fixed::ZERO,
        }));
        s.abilities.push(AbilityData::ChargeAttack(ChargeAttack::default()));
        let id = add(arena, Faction::Friendly, 0, 0, s);
        arena.get_mut(id).unwrap().charge.is_charged = true;
        id
    }

    #[test]
    fn test_charged_kill_runs_death_spawn_and_death_damage() {
        let mut arena = UnitArena::new();
        let attacker = charged_splasher(&mut arena, 20);
        let mut bomber = spec(10);
        bomber.abilities.push(AbilityData::DeathSpawn(DeathSpawn {
            spawn_unit_id: "skeleton".to_string(),
            spawn_count: 2,
            spawn_radius: Fixed::from_num(20),
            spawn_unit_hp: 0,
        }));
        bomber.abilities.push(AbilityData::DeathDamage(DeathDamage {
            damage: 3,
            radius: Fixed::from_num(30),
            knockback_distance: Fixed::ZERO,
        }));
        let target = add(&mut arena, Faction::Enemy, 100, 100, bomber);
        // Outside the splash, inside the death blast.
        let neighbour = add(&mut arena, Faction::Friendly, 125, 100, spec(3));

        let result = perform_attack(&mut arena, attacker, target);
        assert_eq!(result.killed_units, vec![target, neighbour]);
        assert_eq!(result.spawn_requests.len(), 2);
        assert!(result
            .spawn_requests
            .iter()
            .all(|r| r.unit_id == "skeleton" && r.faction == Faction::Enemy));
        assert_eq!(arena.get(attacker).unwrap().hp, 100);
    }

    #[test]
    fn test_charged_hit_overflows_shield() {
        let mut arena = UnitArena::new();
        let attacker = charged_splasher(&mut arena, 50);
        let mut shielded = spec(10);
        shielded.abilities.push(AbilityData::Shield(Shield {
            max_shield_hp: 5,
            ..Shield::default()
        }));
        let target = add(&mut arena, Faction::Enemy, 100, 100, shielded);
        let neighbour = add(&mut arena, Faction::Enemy, 110, 100, spec(10));
        assert_eq!(arena.get(attacker).unwrap().effective_damage(), 20);

        let result = perform_attack(&mut arena, attacker, target);
        let target_unit = arena.get(target).unwrap();
        assert_eq!(target_unit.shield_hp, 0);
        assert!(target_unit.is_dead());
        assert!(arena.get(neighbour).unwrap().is_dead());
        assert_eq!(result.killed_units, vec![target, neighbour]);
        assert!(!arena.get(attacker).unwrap().charge.is_charged);
    }

    #[test]
    fn test_charge_state_progression() {
        let mut s = spec(10);
        s.abilities.push(AbilityData::ChargeAttack(ChargeAttack {
            trigger_distance: Fixed::from_num(100),
            required_charge_distance: Fixed::from_num(50),
            damage_multiplier: Fixed::from_num(2),
            speed_multiplier: Fixed::from_num(2),
        }));
        let mut unit = Unit::new(1, Faction::Friendly, Vec2Fixed::ZERO, s);
        let target = Vec2Fixed::from_ints(0, 200);

        update_charge_state(&mut unit, Some(target));
        assert!(unit.charge.is_charging);
        assert_eq!(unit.effective_speed(), Fixed::from_num(8));

        unit.position = Vec2Fixed::from_ints(0, 60);
        update_charge_state(&mut unit, Some(target));
        assert!(unit.charge.is_charged);
        assert_eq!(unit.effective_damage(), 20);

        update_charge_state(&mut unit, None);
        assert!(!unit.charge.is_charging);
        assert!(!unit.charge.is_charged);
    }

    #[test]
    fn test_charge_not_started_close_to_target() {
        let mut s = spec(10);
        s.abilities.push(AbilityData::ChargeAttack(ChargeAttack::default()));
        let mut unit = Unit::new(1, Faction::Friendly, Vec2Fixed::ZERO, s);
        update_charge_state(&mut unit, Some(Vec2Fixed::from_ints(0, 50)));
        assert!(!unit.charge.is_charging);
    }
}
