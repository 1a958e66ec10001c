//! Units and the unit arena.
//!
//! Every combat entity lives in one [`UnitArena`], a `Vec` kept sorted by
//! [`UnitId`]. Systems refer to each other by id; when a system needs to
//! mutate one unit while reading the rest it splits the arena with
//! [`UnitArena::split_mut`].

use serde::{Deserialize, Serialize};

use crate::abilities::{
    AbilityData, ChargeAttack, ChargeState, DeathDamage, DeathSpawn, Shield, SplashDamage,
};
use crate::config::ATTACK_SLOT_COUNT;
use crate::math::{fixed_cos, fixed_serde, Fixed, Vec2Fixed, TAU};
use crate::tower::TowerId;

/// Unique identifier of a unit within one simulation.
pub type UnitId = u32;

/// Side a unit or tower fights for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Faction {
    /// Player side, bottom of the map.
    Friendly,
    /// Opponent side, top of the map.
    Enemy,
}

impl Faction {
    /// The other faction.
    #[must_use]
    pub const fn opposite(self) -> Self {
        match self {
            Self::Friendly => Self::Enemy,
            Self::Enemy => Self::Friendly,
        }
    }

    /// Prefix used in unit labels (`F3`, `E12`).
    #[must_use]
    pub const fn label_prefix(self) -> &'static str {
        match self {
            Self::Friendly => "F",
            Self::Enemy => "E",
        }
    }
}

/// Combat role of a unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum UnitRole {
    /// Close-range fighter.
    #[default]
    Melee,
    /// Long-range attacker.
    Ranged,
    /// High HP, slow.
    Tank,
    /// Mid-sized tank.
    MiniTank,
    /// High damage, low HP.
    GlassCannon,
    /// Many weak units.
    Swarm,
    /// Spawns other units.
    Spawner,
    /// Buffs or heals.
    Support,
    /// Attacks buildings.
    Siege,
}

/// Movement layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum MovementLayer {
    /// Walks; bound by the river and bridges.
    #[default]
    Ground,
    /// Flies over terrain.
    Air,
}

/// What a unit may attack (bit flags).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct TargetType(pub u8);

impl TargetType {
    /// Nothing.
    pub const NONE: Self = Self(0);
    /// Ground units.
    pub const GROUND: Self = Self(1);
    /// Air units.
    pub const AIR: Self = Self(1 << 1);
    /// Towers.
    pub const BUILDING: Self = Self(1 << 2);
    /// Ground and air units.
    pub const GROUND_AND_AIR: Self = Self(1 | 1 << 1);
    /// Everything.
    pub const ALL: Self = Self(1 | 1 << 1 | 1 << 2);

    const NAMES: &'static [(&'static str, u32)] =
        &[("Ground", 1), ("Air", 1 << 1), ("Building", 1 << 2)];

    /// Whether every flag of `other` is set.
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Whether units on `layer` are covered by this mask.
    #[must_use]
    pub const fn includes_layer(self, layer: MovementLayer) -> bool {
        match layer {
            MovementLayer::Ground => self.contains(Self::GROUND),
            MovementLayer::Air => self.contains(Self::AIR),
        }
    }
}

impl Serialize for TargetType {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&flag_names::to_string(u32::from(self.0), Self::NAMES))
    }
}

impl<'de> Deserialize<'de> for TargetType {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        let bits = flag_names::parse(&text, Self::NAMES).map_err(serde::de::Error::custom)?;
        u8::try_from(bits)
            .map(Self)
            .map_err(|_| serde::de::Error::custom("target flags out of range"))
    }
}

/// `"Ground|Air"`-style text form of bit flags.
pub(crate) mod flag_names {
    /// Join the names of all set flags with `|` (`"None"` when empty).
    pub fn to_string(bits: u32, names: &[(&str, u32)]) -> String {
        let parts: Vec<&str> = names
            .iter()
            .filter(|(_, flag)| bits & flag != 0)
            .map(|(name, _)| *name)
            .collect();
        if parts.is_empty() {
            "None".to_string()
        } else {
            parts.join("|")
        }
    }

    /// Parse `|`-separated flag names.
    pub fn parse(text: &str, names: &[(&str, u32)]) -> Result<u32, String> {
        let mut bits = 0;
        for part in text.split('|').map(str::trim) {
            if part.is_empty() || part == "None" {
                continue;
            }
            let flag = names
                .iter()
                .find(|(name, _)| *name == part)
                .map(|(_, flag)| *flag)
                .ok_or_else(|| format!("unknown flag '{part}'"))?;
            bits |= flag;
        }
        Ok(bits)
    }
}

/// How a unit picks its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TargetPriority {
    /// Closest attackable thing.
    #[default]
    Nearest,
    /// Towers first.
    Buildings,
}

/// Construction parameters for a [`Unit`].
#[derive(Debug, Clone, PartialEq)]
pub struct UnitSpec {
    /// Definition id (`"skeleton"`); empty for command-spawned role units.
    pub unit_id: String,
    /// Combat role.
    pub role: UnitRole,
    /// Movement layer.
    pub layer: MovementLayer,
    /// Attack mask.
    pub can_target: TargetType,
    /// Targeting priority.
    pub target_priority: TargetPriority,
    /// Starting and maximum HP.
    pub max_hp: i32,
    /// Damage per attack.
    pub damage: i32,
    /// Attack range.
    pub attack_range: Fixed,
    /// Speed in world units per frame.
    pub speed: Fixed,
    /// Turn speed in radians per frame.
    pub turn_speed: Fixed,
    /// Body radius.
    pub radius: Fixed,
    /// Abilities.
    pub abilities: Vec<AbilityData>,
}

/// A mutable combat entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Unit {
    /// Arena id.
    pub id: UnitId,
    /// Definition id.
    pub unit_id: String,
    /// Side.
    pub faction: Faction,
    /// Combat role.
    pub role: UnitRole,
    /// Movement layer.
    pub layer: MovementLayer,
    /// Attack mask.
    pub can_target: TargetType,
    /// Targeting priority.
    pub target_priority: TargetPriority,

    /// World position.
    pub position: Vec2Fixed,
    /// Velocity this frame.
    pub velocity: Vec2Fixed,
    /// Facing (unit vector).
    pub forward: Vec2Fixed,
    /// Body radius.
    #[serde(with = "fixed_serde")]
    pub radius: Fixed,
    /// Base speed.
    #[serde(with = "fixed_serde")]
    pub speed: Fixed,
    /// Radians per frame.
    #[serde(with = "fixed_serde")]
    pub turn_speed: Fixed,

    /// Current HP, never negative.
    pub hp: i32,
    /// Maximum HP.
    pub max_hp: i32,
    /// Remaining shield.
    pub shield_hp: i32,
    /// Shield at spawn.
    pub max_shield_hp: i32,
    /// Damage per attack.
    pub damage: i32,
    /// Attack range.
    #[serde(with = "fixed_serde")]
    pub attack_range: Fixed,
    /// Frames until the next attack.
    #[serde(with = "fixed_serde")]
    pub attack_cooldown: Fixed,
    dead: bool,

    /// Current unit target.
    pub target: Option<UnitId>,
    /// Current tower target.
    pub target_tower: Option<TowerId>,
    /// Abilities (immutable after spawn).
    pub abilities: Vec<AbilityData>,
    /// Charge attack progress.
    pub charge: ChargeState,

    /// A* waypoints.
    pub movement_path: Vec<Vec2Fixed>,
    /// Next waypoint index in `movement_path`.
    pub movement_path_index: usize,
    /// Detour waypoints.
    pub avoidance_path: Vec<Vec2Fixed>,
    /// Next waypoint index in `avoidance_path`.
    pub avoidance_path_index: usize,
    /// Point the last avoidance steered toward.
    pub avoidance_target: Option<Vec2Fixed>,
    /// Unit being avoided.
    pub avoidance_threat: Option<UnitId>,
    /// Destination the current path was planned for.
    pub destination: Option<Vec2Fixed>,

    /// Frames without getting closer to the current waypoint.
    pub frames_since_waypoint_progress: u32,
    /// Frames of continuous avoidance.
    pub frames_since_avoidance_start: u32,
    /// Frame of the last replan.
    pub last_replan_frame: u32,
    /// Position at the previous progress check.
    pub previous_position: Vec2Fixed,

    /// Occupants of the slots around this unit.
    pub attack_slots: [Option<UnitId>; ATTACK_SLOT_COUNT],
    /// Slot this unit holds on its own target.
    pub taken_slot: Option<usize>,
    /// Frames since the last target evaluation.
    pub frames_since_target_evaluation: u32,
    /// Frames since the last slot evaluation.
    pub frames_since_slot_evaluation: u32,
}

impl Unit {
    /// Create a living unit at `position`.
    #[must_use]
    pub fn new(id: UnitId, faction: Faction, position: Vec2Fixed, spec: UnitSpec) -> Self {
        let max_shield_hp = spec
            .abilities
            .iter()
            .find_map(|a| match a {
                AbilityData::Shield(shield) => Some(shield.max_shield_hp),
                _ => None,
            })
            .unwrap_or(0);
        let forward = match faction {
            Faction::Friendly => Vec2Fixed::new(Fixed::ZERO, Fixed::ONE),
            Faction::Enemy => Vec2Fixed::new(Fixed::ZERO, -Fixed::ONE),
        };

        Self {
            id,
            unit_id: spec.unit_id,
            faction,
            role: spec.role,
            layer: spec.layer,
            can_target: spec.can_target,
            target_priority: spec.target_priority,
            position,
            velocity: Vec2Fixed::ZERO,
            forward,
            radius: spec.radius,
            speed: spec.speed,
            turn_speed: spec.turn_speed,
            hp: spec.max_hp.max(0),
            max_hp: spec.max_hp,
            shield_hp: max_shield_hp,
            max_shield_hp,
            damage: spec.damage,
            attack_range: spec.attack_range,
            attack_cooldown: Fixed::ZERO,
            dead: spec.max_hp <= 0,
            target: None,
            target_tower: None,
            abilities: spec.abilities,
            charge: ChargeState::default(),
            movement_path: Vec::new(),
            movement_path_index: 0,
            avoidance_path: Vec::new(),
            avoidance_path_index: 0,
            avoidance_target: None,
            avoidance_threat: None,
            destination: None,
            frames_since_waypoint_progress: 0,
            frames_since_avoidance_start: 0,
            last_replan_frame: 0,
            previous_position: position,
            attack_slots: [None; ATTACK_SLOT_COUNT],
            taken_slot: None,
            frames_since_target_evaluation: 0,
            frames_since_slot_evaluation: 0,
        }
    }

    /// Display label (`F3`, `E12`).
    #[must_use]
    pub fn label(&self) -> String {
        format!("{}{}", self.faction.label_prefix(), self.id)
    }

    /// Whether the unit has died.
    #[must_use]
    pub const fn is_dead(&self) -> bool {
        self.dead
    }

    /// Overwrite HP; zero kills, positive revives.
    pub fn set_hp(&mut self, hp: i32) {
        self.hp = hp.max(0);
        self.dead = self.hp == 0;
        if self.dead {
            self.velocity = Vec2Fixed::ZERO;
        }
    }

    // ------------------------------------------------------------ abilities

    /// Splash payload, if any.
    #[must_use]
    pub fn splash(&self) -> Option<&SplashDamage> {
        self.abilities.iter().find_map(|a| match a {
            AbilityData::SplashDamage(data) => Some(data),
            _ => None,
        })
    }

    /// Charge payload, if any.
    #[must_use]
    pub fn charge_attack(&self) -> Option<&ChargeAttack> {
        self.abilities.iter().find_map(|a| match a {
            AbilityData::ChargeAttack(data) => Some(data),
            _ => None,
        })
    }

    /// Shield payload, if any.
    #[must_use]
    pub fn shield(&self) -> Option<&Shield> {
        self.abilities.iter().find_map(|a| match a {
            AbilityData::Shield(data) => Some(data),
            _ => None,
        })
    }

    /// Death spawn payload, if any.
    #[must_use]
    pub fn death_spawn(&self) -> Option<&DeathSpawn> {
        self.abilities.iter().find_map(|a| match a {
            AbilityData::DeathSpawn(data) => Some(data),
            _ => None,
        })
    }

    /// Death damage payload, if any.
    #[must_use]
    pub fn death_damage(&self) -> Option<&DeathDamage> {
        self.abilities.iter().find_map(|a| match a {
            AbilityData::DeathDamage(data) => Some(data),
            _ => None,
        })
    }

    // --------------------------------------------------------------- combat

    /// Whether this unit may attack `target`.
    #[must_use]
    pub fn can_attack_unit(&self, target: &Unit) -> bool {
        !target.is_dead() && self.can_target.includes_layer(target.layer)
    }

    /// Whether `target` is within reach; range is measured to its edge.
    #[must_use]
    pub fn in_attack_range(&self, target: &Unit) -> bool {
        let reach = self.attack_range + target.radius;
        self.position.distance_squared(target.position) <= reach * reach
    }

    /// Whether this unit may attack towers.
    #[must_use]
    pub const fn can_target_buildings(&self) -> bool {
        self.can_target.contains(TargetType::BUILDING)
    }

    /// Apply damage: shield first, then HP (clamped at zero).
    ///
    /// Returns the HP actually removed.
    pub fn take_damage(&mut self, amount: i32) -> i32 {
        if amount <= 0 {
            return 0;
        }

        let mut remaining = amount;
        if self.shield_hp > 0 {
            let absorbed = self.shield_hp.min(remaining);
            self.shield_hp -= absorbed;
            remaining -= absorbed;
        }
        if remaining <= 0 {
            return 0;
        }

        let before = self.hp;
        self.hp = (self.hp - remaining).max(0);
        if self.hp == 0 {
            self.dead = true;
            self.velocity = Vec2Fixed::ZERO;
        }
        before - self.hp
    }

    /// Speed including the charge bonus.
    #[must_use]
    pub fn effective_speed(&self) -> Fixed {
        match self.charge_attack() {
            Some(charge) if self.charge.is_charging => self.speed * charge.speed_multiplier,
            _ => self.speed,
        }
    }

    /// Damage including the charge bonus (truncated).
    #[must_use]
    pub fn effective_damage(&self) -> i32 {
        match self.charge_attack() {
            Some(charge) if self.charge.is_charged => {
                (Fixed::from_num(self.damage) * charge.damage_multiplier).to_num::<i32>()
            }
            _ => self.damage,
        }
    }

    /// Spend the charge after an attack.
    pub fn on_attack_performed(&mut self) {
        if self.charge_attack().is_some() {
            self.charge.consume();
        }
    }

    // --------------------------------------------------------- attack slots

    /// World position of slot `index` for an attacker of `attacker_radius`.
    #[must_use]
    pub fn slot_position(&self, index: usize, attacker_radius: Fixed) -> Vec2Fixed {
        let slots = Fixed::from_num(ATTACK_SLOT_COUNT as i32);
        let angle = TAU * Fixed::from_num(index as i32) / slots;
        let distance = self.radius + attacker_radius + Fixed::from_num(10);
        self.position + Vec2Fixed::from_angle(angle) * distance
    }

    /// Claim the nearest slot that is free or already held by `attacker`.
    ///
    /// `previous` is the slot the attacker held before; it is released when
    /// a different slot wins. Returns the claimed slot.
    pub fn claim_best_slot(
        &mut self,
        attacker: UnitId,
        attacker_position: Vec2Fixed,
        attacker_radius: Fixed,
        previous: Option<usize>,
    ) -> Option<usize> {
        let mut best: Option<(usize, Fixed)> = None;
        for (index, occupant) in self.attack_slots.iter().enumerate() {
            if occupant.is_some_and(|id| id != attacker) {
                continue;
            }
            let dist_sq = self
                .slot_position(index, attacker_radius)
                .distance_squared(attacker_position);
            if best.map_or(true, |(_, d)| dist_sq < d) {
                best = Some((index, dist_sq));
            }
        }

        let (index, _) = best?;
        if let Some(prev) = previous {
            if prev != index {
                self.release_slot(attacker, prev);
            }
        }
        self.attack_slots[index] = Some(attacker);
        Some(index)
    }

    /// Free `slot` if `attacker` holds it.
    pub fn release_slot(&mut self, attacker: UnitId, slot: usize) {
        if let Some(occupant) = self.attack_slots.get_mut(slot) {
            if *occupant == Some(attacker) {
                *occupant = None;
            }
        }
    }

    /// Free every slot `attacker` holds.
    pub fn release_all_slots_of(&mut self, attacker: UnitId) {
        for occupant in &mut self.attack_slots {
            if *occupant == Some(attacker) {
                *occupant = None;
            }
        }
    }

    /// Number of occupied slots.
    #[must_use]
    pub fn occupied_slot_count(&self) -> usize {
        self.attack_slots.iter().filter(|s| s.is_some()).count()
    }

    // ---------------------------------------------------------------- paths

    /// Replace the movement path.
    pub fn set_movement_path(&mut self, path: Vec<Vec2Fixed>) {
        self.movement_path = path;
        self.movement_path_index = 0;
    }

    /// Drop the movement path.
    pub fn clear_movement_path(&mut self) {
        self.movement_path.clear();
        self.movement_path_index = 0;
    }

    /// Next path waypoint not yet within `threshold`, advancing past reached
    /// ones.
    pub fn next_movement_waypoint(&mut self, threshold: Fixed) -> Option<Vec2Fixed> {
        let threshold_sq = threshold * threshold;
        while let Some(&waypoint) = self.movement_path.get(self.movement_path_index) {
            let is_last = self.movement_path_index + 1 == self.movement_path.len();
            if is_last || self.position.distance_squared(waypoint) > threshold_sq {
                return Some(waypoint);
            }
            self.movement_path_index += 1;
        }
        None
    }

    /// Replace the detour path.
    pub fn set_avoidance_path(&mut self, path: Vec<Vec2Fixed>) {
        self.avoidance_path = path;
        self.avoidance_path_index = 0;
    }

    /// Drop the detour path and its bookkeeping.
    pub fn clear_avoidance_path(&mut self) {
        self.avoidance_path.clear();
        self.avoidance_path_index = 0;
        self.avoidance_target = None;
        self.avoidance_threat = None;
    }

    /// Next detour waypoint not yet within `threshold`.
    pub fn next_avoidance_waypoint(&mut self, threshold: Fixed) -> Option<Vec2Fixed> {
        let threshold_sq = threshold * threshold;
        while let Some(&waypoint) = self.avoidance_path.get(self.avoidance_path_index) {
            if self.position.distance_squared(waypoint) > threshold_sq {
                return Some(waypoint);
            }
            self.avoidance_path_index += 1;
        }
        None
    }

    /// Stop in place: zero velocity, no paths, destination here.
    pub fn stop(&mut self) {
        self.velocity = Vec2Fixed::ZERO;
        self.clear_movement_path();
        self.clear_avoidance_path();
        self.destination = Some(self.position);
    }

    /// Turn `forward` toward the velocity by at most `turn_speed`.
    pub fn update_rotation(&mut self) {
        if self.velocity.length_squared() < Fixed::from_bits(1 << 22) {
            return;
        }
        let desired = self.velocity.normalize();
        if self.turn_speed <= Fixed::ZERO || self.forward.dot(desired) >= fixed_cos(self.turn_speed)
        {
            self.forward = desired;
            return;
        }

        let step = if self.forward.cross(desired) >= Fixed::ZERO {
            self.turn_speed
        } else {
            -self.turn_speed
        };
        self.forward = self.forward.rotate(step).normalize();
    }
}

/// Units sorted by id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UnitArena {
    units: Vec<Unit>,
    next_id: UnitId,
}

impl UnitArena {
    /// Empty arena; the first id handed out is 1.
    #[must_use]
    pub fn new() -> Self {
        Self {
            units: Vec::new(),
            next_id: 1,
        }
    }

    /// Id the next [`insert`](Self::insert) will assign.
    #[must_use]
    pub const fn peek_next_id(&self) -> UnitId {
        self.next_id
    }

    /// Add a unit under a freshly assigned id.
    pub fn insert(&mut self, mut unit: Unit) -> UnitId {
        let id = self.next_id.max(1);
        self.next_id = id + 1;
        unit.id = id;
        self.units.push(unit);
        id
    }

    /// Add a unit keeping its own id (snapshots). Replaces an existing unit
    /// with the same id.
    pub fn insert_with_id(&mut self, unit: Unit) {
        self.next_id = self.next_id.max(unit.id + 1);
        match self.index_of(unit.id) {
            Some(index) => self.units[index] = unit,
            None => {
                let at = self.units.partition_point(|u| u.id < unit.id);
                self.units.insert(at, unit);
            }
        }
    }

    fn index_of(&self, id: UnitId) -> Option<usize> {
        self.units.binary_search_by_key(&id, |u| u.id).ok()
    }

    /// Look up a unit.
    #[must_use]
    pub fn get(&self, id: UnitId) -> Option<&Unit> {
        self.index_of(id).map(|i| &self.units[i])
    }

    /// Look up a unit mutably.
    pub fn get_mut(&mut self, id: UnitId) -> Option<&mut Unit> {
        self.index_of(id).map(move |i| &mut self.units[i])
    }

    /// Remove a unit.
    pub fn remove(&mut self, id: UnitId) -> Option<Unit> {
        self.index_of(id).map(|i| self.units.remove(i))
    }

    /// Remove every dead unit, returning them in id order.
    pub fn remove_dead(&mut self) -> Vec<Unit> {
        let (dead, alive): (Vec<Unit>, Vec<Unit>) =
            std::mem::take(&mut self.units).into_iter().partition(Unit::is_dead);
        self.units = alive;
        dead
    }

    /// Drop every unit; ids keep counting.
    pub fn clear(&mut self) {
        self.units.clear();
    }

    /// Units in id order.
    pub fn iter(&self) -> impl Iterator<Item = &Unit> {
        self.units.iter()
    }

    /// Units in id order, mutably.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Unit> {
        self.units.iter_mut()
    }

    /// Living units of one faction.
    pub fn living(&self, faction: Faction) -> impl Iterator<Item = &Unit> {
        self.units
            .iter()
            .filter(move |u| u.faction == faction && !u.is_dead())
    }

    /// Ids of the living units of one faction, ascending.
    #[must_use]
    pub fn living_ids(&self, faction: Faction) -> Vec<UnitId> {
        self.living(faction).map(|u| u.id).collect()
    }

    /// Number of living units of one faction.
    #[must_use]
    pub fn living_count(&self, faction: Faction) -> usize {
        self.living(faction).count()
    }

    /// Total number of units (dead ones included until removal).
    #[must_use]
    pub fn len(&self) -> usize {
        self.units.len()
    }

    /// Whether the arena is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// Borrow one unit mutably and the rest alongside it.
    pub fn split_mut(&mut self, id: UnitId) -> Option<(&mut Unit, ArenaSplit<'_>)> {
        let index = self.index_of(id)?;
        let (before, rest) = self.units.split_at_mut(index);
        let (unit, after) = rest.split_first_mut()?;
        Some((unit, ArenaSplit { before, after }))
    }
}

/// The rest of an arena while one unit is borrowed out of it.
pub struct ArenaSplit<'a> {
    before: &'a mut [Unit],
    after: &'a mut [Unit],
}

impl<'a> ArenaSplit<'a> {
    /// Other units in id order.
    pub fn iter(&self) -> impl Iterator<Item = &Unit> {
        self.before.iter().chain(self.after.iter())
    }

    /// Other units in id order, mutably.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Unit> {
        self.before.iter_mut().chain(self.after.iter_mut())
    }

    /// Look up another unit.
    #[must_use]
    pub fn get(&self, id: UnitId) -> Option<&Unit> {
        let slice: &[Unit] = if self.after.first().is_some_and(|u| id >= u.id) {
            &*self.after
        } else {
            &*self.before
        };
        slice
            .binary_search_by_key(&id, |u| u.id)
            .ok()
            .map(|i| &slice[i])
    }

    /// Look up another unit mutably.
    pub fn get_mut(&mut self, id: UnitId) -> Option<&mut Unit> {
        let slice: &mut [Unit] = if self.after.first().is_some_and(|u| id >= u.id) {
            &mut *self.after
        } else {
            &mut *self.before
        };
        match slice.binary_search_by_key(&id, |u| u.id) {
            Ok(i) => Some(&mut slice[i]),
            Err(_) => None,
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::abilities::ChargeAttack;

    pub(crate) fn spec(hp: i32) -> UnitSpec {
        UnitSpec {
            unit_id: "test".to_string(),
            role: UnitRole::Melee,
            layer: MovementLayer::Ground,
            can_target: TargetType::GROUND_AND_AIR,
            target_priority: TargetPriority::Nearest,
            max_hp: hp,
            damage: 10,
            attack_range: Fixed::from_num(60),
            speed: Fixed::from_num(4),
            turn_speed: Fixed::from_num(1) / Fixed::from_num(10),
            radius: Fixed::from_num(20),
            abilities: Vec::new(),
        }
    }

    #[test]
    fn test_take_damage_drains_shield_first() {
        let mut s = spec(10);
        s.abilities.push(AbilityData::Shield(Shield {
            max_shield_hp: 5,
            ..Shield::default()
        }));
        let mut unit = Unit::new(1, Faction::Enemy, Vec2Fixed::ZERO, s);
        assert_eq!(unit.shield_hp, 5);

        assert_eq!(unit.take_damage(3), 0);
        assert_eq!(unit.shield_hp, 2);
        assert_eq!(unit.hp, 10);

        assert_eq!(unit.take_damage(20), 10);
        assert_eq!(unit.shield_hp, 0);
        assert_eq!(unit.hp, 0);
        assert!(unit.is_dead());
    }

    #[test]
    fn test_effective_damage_when_charged() {
        let mut s = spec(10);
        s.abilities.push(AbilityData::ChargeAttack(ChargeAttack::default()));
        let mut unit = Unit::new(1, Faction::Friendly, Vec2Fixed::ZERO, s);
        assert_eq!(unit.effective_damage(), 10);

        unit.charge.start(Vec2Fixed::ZERO, Fixed::from_num(100));
        assert_eq!(unit.effective_speed(), Fixed::from_num(8));
        unit.charge.update_distance(Vec2Fixed::from_ints(100, 0));
        assert_eq!(unit.effective_damage(), 20);

        unit.on_attack_performed();
        assert_eq!(unit.effective_damage(), 10);
        assert_eq!(unit.effective_speed(), Fixed::from_num(4));
    }

    #[test]
    fn test_can_attack_respects_layers() {
        let mut ground_only = spec(10);
        ground_only.can_target = TargetType::GROUND;
        let attacker = Unit::new(1, Faction::Friendly, Vec2Fixed::ZERO, ground_only);

        let mut air = spec(10);
        air.layer = MovementLayer::Air;
        let flyer = Unit::new(2, Faction::Enemy, Vec2Fixed::ZERO, air);
        let walker = Unit::new(3, Faction::Enemy, Vec2Fixed::ZERO, spec(10));

        assert!(!attacker.can_attack_unit(&flyer));
        assert!(attacker.can_attack_unit(&walker));
    }

    #[test]
    fn test_attack_range_reaches_target_edge() {
        let attacker = Unit::new(1, Faction::Friendly, Vec2Fixed::ZERO, spec(10));
        let edge = Unit::new(2, Faction::Enemy, Vec2Fixed::from_ints(80, 0), spec(10));
        let beyond = Unit::new(3, Faction::Enemy, Vec2Fixed::from_ints(81, 0), spec(10));
        assert!(attacker.in_attack_range(&edge));
        assert!(!attacker.in_attack_range(&beyond));
    }

    #[test]
    fn test_claim_best_slot_picks_nearest_free() {
        let mut target = Unit::new(1, Faction::Enemy, Vec2Fixed::ZERO, spec(10));
        let radius = Fixed::from_num(20);

        // Slot 0 sits on +X at distance 50.
        let first = target.claim_best_slot(2, Vec2Fixed::from_ints(100, 0), radius, None);
        assert_eq!(first, Some(0));

        // Slot 0 is taken, so the second attacker gets a neighbour.
        let second = target.claim_best_slot(3, Vec2Fixed::from_ints(100, 0), radius, None);
        assert!(matches!(second, Some(1) | Some(7)));

        // Re-claiming from the other side moves the attacker and frees slot 0.
        let moved = target.claim_best_slot(2, Vec2Fixed::from_ints(-100, 0), radius, first);
        assert_eq!(moved, Some(4));
        assert_eq!(target.attack_slots[0], None);
        assert_eq!(target.occupied_slot_count(), 2);
    }

    #[test]
    fn test_rotation_is_rate_limited() {
        let mut unit = Unit::new(1, Faction::Friendly, Vec2Fixed::ZERO, spec(10));
        unit.forward = Vec2Fixed::UNIT_X;
        unit.velocity = Vec2Fixed::from_ints(0, 4);
        unit.update_rotation();
        // One step of 0.1 rad, counter-clockwise toward +Y.
        assert!(unit.forward.y > Fixed::ZERO);
        assert!(unit.forward.x > Fixed::from_num(0.99));

        // Within one step of the heading: snap.
        unit.forward = Vec2Fixed::from_angle(Fixed::from_num(0.05)).normalize();
        unit.velocity = Vec2Fixed::from_ints(4, 0);
        unit.update_rotation();
        assert_eq!(unit.forward, Vec2Fixed::UNIT_X);
    }

    #[test]
    fn test_arena_ids_and_split() {
        let mut arena = UnitArena::new();
        let a = arena.insert(Unit::new(0, Faction::Friendly, Vec2Fixed::ZERO, spec(10)));
        let b = arena.insert(Unit::new(0, Faction::Enemy, Vec2Fixed::ZERO, spec(10)));
        let c = arena.insert(Unit::new(0, Faction::Enemy, Vec2Fixed::ZERO, spec(10)));
        assert_eq!((a, b, c), (1, 2, 3));

        let (unit, mut others) = arena.split_mut(b).unwrap();
        unit.hp = 1;
        others.get_mut(a).unwrap().hp = 2;
        others.get_mut(c).unwrap().hp = 3;
        assert!(others.get(b).is_none());
        assert_eq!(others.iter().count(), 2);

        assert_eq!(arena.get(a).unwrap().hp, 2);
        assert_eq!(arena.get(b).unwrap().hp, 1);
        assert_eq!(arena.living_ids(Faction::Enemy), vec![b, c]);

        arena.get_mut(b).unwrap().set_hp(0);
        let removed = arena.remove_dead();
        assert_eq!(removed.len(), 1);
        assert_eq!(arena.len(), 2);
    }

    #[test]
    fn test_target_type_names() {
        assert_eq!(
            flag_names::to_string(u32::from(TargetType::ALL.0), TargetType::NAMES),
            "Ground|Air|Building"
        );
        let parsed: TargetType = ron::from_str("\"Ground | Building\"").unwrap();
        assert!(parsed.contains(TargetType::BUILDING));
        assert!(!parsed.includes_layer(MovementLayer::Air));
    }
}
