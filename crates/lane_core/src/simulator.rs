//! Frame scheduler.
//!
//! [`SimulatorCore`] owns every piece of battle state and advances it one
//! frame at a time in a fixed order. Behaviours only stage damage; HP changes,
//! deaths and spawns are applied afterwards, so the order units are updated in
//! never decides who survives a trade.
//!
//! # Determinism
//!
//! - No floating-point math (fixed-point via [`Fixed`](crate::math::Fixed))
//! - No randomness
//! - Units are visited in ascending id order; towers in id order
//! - Commands apply in the order they were queued
//!
//! Two simulators built from the same balance, registry, setup and waves and
//! fed the same commands produce identical [`FrameData`] every frame.
//!
//! # Example
//!
//! ```
//! use lane_core::prelude::*;
//!
//! let mut sim = SimulatorCore::new(
//!     GameBalance::default(),
//!     UnitRegistry::with_defaults(),
//!     InitialSetup::standard(),
//! )
//! .unwrap();
//! sim.enqueue(SimCommand::new(
//!     0,
//!     CommandKind::SpawnDefinition {
//!         unit_id: "skeleton".to_string(),
//!         faction: Faction::Friendly,
//!         position: Vec2Fixed::from_ints(1600, 1000),
//!         hp: None,
//!     },
//! ));
//! let frame = sim.step(&mut NullSink);
//! assert_eq!(frame.frame_number, 0);
//! assert_eq!(frame.living_friendly_count, 1);
//! ```

use std::collections::hash_map::DefaultHasher;
use std::collections::VecDeque;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::callbacks::{CompletionReason, SimulatorCallbacks, UnitEvent, UnitEventKind};
use crate::combat::resolve_deaths;
use crate::command::{CommandKind, SimCommand};
use crate::config::GameBalance;
use crate::enemy::update_enemies;
use crate::error::{GameError, Result};
use crate::events::{DamageKind, FrameEvents, UnitSpawnRequest};
use crate::frame::{FrameData, UnitStateData};
use crate::grid::PathfindingGrid;
use crate::movement::{resolve_collisions, MovementContext};
use crate::obstacles::{DynamicObstacleSystem, TerrainObstacleProvider, TowerObstacleProvider};
use crate::registry::{role_spec, UnitRegistry};
use crate::session::{GameSession, WinConditionEvaluator};
use crate::setup::InitialSetup;
use crate::squad::SquadBehavior;
use crate::tower_behavior::update_all_towers;
use crate::unit::{Faction, Unit, UnitArena, UnitId};
use crate::waves::WaveSchedule;

/// The deterministic battle simulation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulatorCore {
    balance: GameBalance,
    registry: UnitRegistry,
    setup: InitialSetup,
    waves: WaveSchedule,
    /// Next frame to simulate.
    frame: u32,
    units: UnitArena,
    session: GameSession,
    squad: SquadBehavior,
    grid: PathfindingGrid,
    obstacles: DynamicObstacleSystem,
    events: FrameEvents,
    commands: VecDeque<SimCommand>,
}

impl SimulatorCore {
    /// Build a simulator with no waves.
    ///
    /// Validates every input, builds the grid with terrain and tower
    /// obstacles, places the towers and spawns the initial units.
    pub fn new(balance: GameBalance, registry: UnitRegistry, setup: InitialSetup) -> Result<Self> {
        Self::with_waves(balance, registry, setup, WaveSchedule::default())
    }

    /// Build a simulator driven by `waves`.
    pub fn with_waves(
        balance: GameBalance,
        registry: UnitRegistry,
        setup: InitialSetup,
        waves: WaveSchedule,
    ) -> Result<Self> {
        balance.validate()?;
        registry.validate()?;
        setup.validate()?;
        waves.validate()?;
        if waves.waves.len() > balance.max_waves as usize {
            return Err(GameError::InvalidConfig(format!(
                "wave schedule has {} waves, max_waves is {}",
                waves.waves.len(),
                balance.max_waves
            )));
        }

        let map = &balance.map;
        let grid = PathfindingGrid::new(map.width, map.height, balance.unit_radius);
        let mut sim = Self {
            obstacles: DynamicObstacleSystem::new(balance.dynamic_obstacle_density_threshold),
            balance,
            registry,
            setup,
            waves,
            frame: 0,
            units: UnitArena::new(),
            session: GameSession::new(),
            squad: SquadBehavior::new(),
            grid,
            events: FrameEvents::new(),
            commands: VecDeque::new(),
        };
        sim.initialize();
        Ok(sim)
    }

    fn initialize(&mut self) {
        self.session.initialize_towers(&self.setup, &self.balance);
        self.rebuild_navigation();

        let balance = &self.balance;
        for group in &self.setup.initial_units {
            for position in group.positions() {
                let id = self.units.peek_next_id();
                let unit = self
                    .registry
                    .spawn(&group.unit_id, id, group.faction, position, group.hp, balance);
                self.units.insert(unit);
            }
        }

        info!(
            towers = self.session.all_towers().count(),
            units = self.units.len(),
            waves = self.waves.waves.len(),
            "Simulator initialized"
        );
    }

    /// Fresh grid with terrain and tower blocks only, and a congestion
    /// tracker with no history.
    fn rebuild_navigation(&mut self) {
        let balance = &self.balance;
        let map = &balance.map;
        self.grid = PathfindingGrid::new(map.width, map.height, balance.unit_radius);
        self.obstacles = DynamicObstacleSystem::new(balance.dynamic_obstacle_density_threshold);
        self.grid
            .apply_obstacles(&TerrainObstacleProvider::new(map, balance.river_obstacle_margin));
        for towers in [&self.session.friendly_towers, &self.session.enemy_towers] {
            self.grid
                .apply_obstacles(&TowerObstacleProvider::new(towers, balance.tower_collision_padding));
        }
    }

    // ------------------------------------------------------------- accessors

    /// Next frame to be simulated.
    #[must_use]
    pub const fn frame(&self) -> u32 {
        self.frame
    }

    /// Tunables.
    #[must_use]
    pub const fn balance(&self) -> &GameBalance {
        &self.balance
    }

    /// Unit definitions.
    #[must_use]
    pub const fn registry(&self) -> &UnitRegistry {
        &self.registry
    }

    /// Units.
    #[must_use]
    pub const fn units(&self) -> &UnitArena {
        &self.units
    }

    /// Towers, clock and score.
    #[must_use]
    pub const fn session(&self) -> &GameSession {
        &self.session
    }

    /// Wave progress.
    #[must_use]
    pub const fn waves(&self) -> &WaveSchedule {
        &self.waves
    }

    /// Pathfinding grid.
    #[must_use]
    pub const fn grid(&self) -> &PathfindingGrid {
        &self.grid
    }

    /// Commands not yet applied.
    #[must_use]
    pub fn pending_commands(&self) -> usize {
        self.commands.len()
    }

    /// Whether the match has been decided.
    #[must_use]
    pub fn is_game_over(&self) -> bool {
        self.session.is_game_over()
    }

    // -------------------------------------------------------------- commands

    /// Queue a command.
    pub fn enqueue(&mut self, command: SimCommand) {
        self.commands.push_back(command);
    }

    /// Queue several commands, in order.
    pub fn enqueue_all(&mut self, commands: impl IntoIterator<Item = SimCommand>) {
        self.commands.extend(commands);
    }

    // ------------------------------------------------------------- main loop

    /// Simulate one frame.
    pub fn step(&mut self, callbacks: &mut dyn SimulatorCallbacks) -> FrameData {
        let frame = self.frame;

        // 1. Commands due this frame
        self.process_commands(callbacks);

        // 2. Congestion obstacles
        if frame % self.balance.dynamic_obstacle_update_interval.max(1) == 0 {
            self.obstacles.update(&mut self.grid, &self.units);
        }

        // 3. Collect: waves, enemies, friendly squad, towers
        self.events.clear();
        self.collect_wave_spawns(callbacks);
        let targets_before: Vec<(UnitId, Option<UnitId>)> =
            self.units.iter().map(|u| (u.id, u.target)).collect();
        {
            let mut ctx = MovementContext::new(&self.balance, &mut self.grid, frame);
            update_enemies(
                &mut self.units,
                &self.session.friendly_towers,
                &mut self.events,
                &mut ctx,
            );
            self.squad.update(
                &mut self.units,
                &self.session.enemy_towers,
                &mut self.events,
                &mut ctx,
            );
        }
        update_all_towers(
            &mut self.session.friendly_towers,
            &mut self.session.enemy_towers,
            &self.units,
            &mut self.events,
            self.balance.frame_time_seconds,
        );
        self.report_new_targets(&targets_before, callbacks);

        // 4. Collisions
        resolve_collisions(&mut self.units, &self.balance);

        // 5. Apply staged damage
        self.apply_damage(callbacks);

        // 6. Deaths (chains included), then removal
        self.process_deaths(callbacks);

        // 7. Spawns
        self.apply_spawns(callbacks);

        // 8. Clock, kings, crowns, result
        self.session.elapsed_time += self.balance.frame_time_seconds;
        self.session.update_king_activation();
        self.session.update_crowns();
        WinConditionEvaluator.evaluate(&mut self.session);

        // 9. Report
        self.frame += 1;
        let data = self.frame_data();
        callbacks.on_frame(&data);
        data
    }

    /// Step until all waves are cleared, the game is decided, or
    /// `max_frames` is reached.
    pub fn run(&mut self, callbacks: &mut dyn SimulatorCallbacks) -> CompletionReason {
        let reason = loop {
            if self.frame >= self.balance.max_frames {
                break CompletionReason::MaxFramesReached;
            }
            let data = self.step(callbacks);
            if self.waves.all_waves_cleared(data.frame_number, data.living_enemy_count) {
                break CompletionReason::AllWavesCleared;
            }
            if self.session.is_game_over() {
                break CompletionReason::GameOver;
            }
        };
        let last = self.frame.saturating_sub(1);
        info!(frame = last, ?reason, result = ?self.session.result, "Run complete");
        callbacks.on_simulation_complete(last, reason);
        reason
    }

    /// Snapshot of the current state (as of the last completed frame).
    #[must_use]
    pub fn frame_data(&self) -> FrameData {
        FrameData::capture(
            self.frame.saturating_sub(1),
            self.waves.current_wave(),
            self.balance.map.main_target(),
            &self.units,
            &self.session,
        )
    }

    // ------------------------------------------------------------ frame parts

    fn process_commands(&mut self, callbacks: &mut dyn SimulatorCallbacks) {
        let frame = self.frame;
        let (due, later): (VecDeque<SimCommand>, VecDeque<SimCommand>) =
            std::mem::take(&mut self.commands)
                .into_iter()
                .partition(|c| c.frame <= frame);
        self.commands = later;
        for command in due {
            self.apply_command(command, callbacks);
        }
    }

    fn apply_command(&mut self, command: SimCommand, callbacks: &mut dyn SimulatorCallbacks) {
        let frame = self.frame;
        match command.kind {
            CommandKind::SpawnUnit {
                role,
                faction,
                position,
                hp,
            } => {
                let mut spec = role_spec(role, faction, &self.balance);
                if let Some(hp) = hp.filter(|&hp| hp > 0) {
                    spec.max_hp = hp;
                }
                let position = self.balance.map.clamp_to_bounds(position);
                let unit = Unit::new(self.units.peek_next_id(), faction, position, spec);
                self.add_unit(unit, callbacks);
            }
            CommandKind::SpawnDefinition {
                unit_id,
                faction,
                position,
                hp,
            } => {
                let position = self.balance.map.clamp_to_bounds(position);
                let unit = self.registry.spawn(
                    &unit_id,
                    self.units.peek_next_id(),
                    faction,
                    position,
                    hp,
                    &self.balance,
                );
                self.add_unit(unit, callbacks);
            }
            CommandKind::MoveUnit { unit, destination } => {
                if let Some(u) = self.living_unit_mut(unit, "MoveUnit") {
                    u.destination = Some(destination);
                    u.clear_movement_path();
                    let event = UnitEvent::new(UnitEventKind::Moved, u.id, u.faction, frame, u.position);
                    callbacks.on_unit_event(&event);
                }
            }
            CommandKind::DamageUnit { unit, amount } => {
                if let Some(u) = self.living_unit_mut(unit, "DamageUnit") {
                    let dealt = absorbed_damage(u, amount);
                    let event = UnitEvent::new(UnitEventKind::Damaged, u.id, u.faction, frame, u.position)
                        .with_value(dealt);
                    callbacks.on_unit_event(&event);
                }
            }
            CommandKind::KillUnit { unit } => {
                if let Some(u) = self.living_unit_mut(unit, "KillUnit") {
                    u.set_hp(0);
                }
            }
            CommandKind::RemoveUnit { unit } => {
                if self.units.remove(unit).is_some() {
                    for other in self.units.iter_mut() {
                        other.release_all_slots_of(unit);
                    }
                    callbacks.on_state_changed(&format!("Unit {unit} removed at frame {frame}"));
                } else {
                    warn!(frame, unit, "RemoveUnit: unit not found");
                }
            }
            CommandKind::ReviveUnit { unit, hp } => match self.units.get_mut(unit) {
                Some(u) if u.is_dead() => {
                    u.set_hp(hp.min(u.max_hp));
                    callbacks.on_state_changed(&format!("Unit {} revived at frame {frame}", u.label()));
                }
                Some(_) => debug!(frame, unit, "ReviveUnit: unit is alive"),
                None => warn!(frame, unit, "ReviveUnit: unit not found"),
            },
            CommandKind::SetHealth { unit, hp } => match self.units.get_mut(unit) {
                Some(u) => {
                    u.set_hp(hp.min(u.max_hp));
                    callbacks.on_state_changed(&format!("Unit {} HP set to {} at frame {frame}", u.label(), u.hp));
                }
                None => warn!(frame, unit, "SetHealth: unit not found"),
            },
        }
    }

    fn living_unit_mut(&mut self, id: UnitId, command: &str) -> Option<&mut Unit> {
        let frame = self.frame;
        match self.units.get_mut(id) {
            Some(unit) if !unit.is_dead() => Some(unit),
            Some(_) => {
                debug!(frame, unit = id, command, "Command ignored: unit is dead");
                None
            }
            None => {
                warn!(frame, unit = id, command, "Command ignored: unit not found");
                None
            }
        }
    }

    fn add_unit(&mut self, unit: Unit, callbacks: &mut dyn SimulatorCallbacks) -> UnitId {
        let (faction, position) = (unit.faction, unit.position);
        let id = self.units.insert(unit);
        debug!(frame = self.frame, unit = id, ?faction, "Unit spawned");
        callbacks.on_unit_event(&UnitEvent::new(
            UnitEventKind::Spawned,
            id,
            faction,
            self.frame,
            position,
        ));
        id
    }

    fn collect_wave_spawns(&mut self, callbacks: &mut dyn SimulatorCallbacks) {
        let living_enemies = self.units.living_count(Faction::Enemy);
        let update = self.waves.update(self.frame, living_enemies);
        if let Some(wave) = update.started {
            callbacks.on_wave_started(wave);
        }
        for spawn in update.spawns {
            let position = spawn
                .position
                .unwrap_or_else(|| self.balance.map.spawn_position(spawn.faction));
            self.events.add_spawn(UnitSpawnRequest {
                unit_id: spawn.unit_id,
                position,
                faction: spawn.faction,
                hp: 0,
            });
        }
    }

    fn report_new_targets(
        &self,
        before: &[(UnitId, Option<UnitId>)],
        callbacks: &mut dyn SimulatorCallbacks,
    ) {
        for unit in self.units.iter() {
            let Some(target) = unit.target else {
                continue;
            };
            let previous = before
                .binary_search_by_key(&unit.id, |&(id, _)| id)
                .ok()
                .and_then(|i| before[i].1);
            if previous != Some(target) {
                let event = UnitEvent::new(
                    UnitEventKind::TargetAcquired,
                    unit.id,
                    unit.faction,
                    self.frame,
                    unit.position,
                )
                .with_target(target);
                callbacks.on_unit_event(&event);
            }
        }
    }

    fn apply_damage(&mut self, callbacks: &mut dyn SimulatorCallbacks) {
        let frame = self.frame;
        let events = std::mem::take(&mut self.events.damages);
        for damage in &events {
            let Some(target) = self.units.get_mut(damage.target) else {
                continue;
            };
            if target.is_dead() {
                continue;
            }
            let dealt = absorbed_damage(target, damage.amount);
            let (faction, position) = (target.faction, target.position);

            if let (Some(source), DamageKind::Normal) = (damage.source, damage.kind) {
                if let Some(attacker) = self.units.get(source) {
                    let event = UnitEvent::new(
                        UnitEventKind::Attack,
                        source,
                        attacker.faction,
                        frame,
                        attacker.position,
                    )
                    .with_target(damage.target)
                    .with_value(damage.amount);
                    callbacks.on_unit_event(&event);
                }
            }
            let mut event = UnitEvent::new(UnitEventKind::Damaged, damage.target, faction, frame, position)
                .with_value(dealt);
            if let Some(source) = damage.source {
                event = event.with_target(source);
            }
            callbacks.on_unit_event(&event);
        }
        self.events.damages = events;

        for hit in &self.events.tower_damages {
            let Some(target) = self.units.get_mut(hit.target) else {
                continue;
            };
            if target.is_dead() {
                continue;
            }
            let dealt = absorbed_damage(target, hit.amount);
            let event = UnitEvent::new(
                UnitEventKind::Damaged,
                target.id,
                target.faction,
                frame,
                target.position,
            )
            .with_value(dealt);
            callbacks.on_unit_event(&event);
        }

        for hit in &self.events.damage_to_towers {
            let Some(tower) = self.session.tower_mut(hit.tower) else {
                continue;
            };
            if tower.is_destroyed() {
                continue;
            }
            tower.take_damage(hit.amount);
            if tower.is_destroyed() {
                info!(
                    frame,
                    tower = tower.id,
                    faction = ?tower.faction,
                    kind = ?tower.tower_type,
                    source = hit.source,
                    "Tower destroyed"
                );
            }
        }
    }

    fn process_deaths(&mut self, callbacks: &mut dyn SimulatorCallbacks) {
        let initial: Vec<UnitId> = self.units.iter().filter(|u| u.is_dead()).map(|u| u.id).collect();
        if initial.is_empty() {
            return;
        }

        let (killed, spawns) = resolve_deaths(&mut self.units, initial);
        for &id in &killed {
            for other in self.units.iter_mut() {
                other.release_all_slots_of(id);
            }
            if let Some(dead) = self.units.get(id) {
                debug!(frame = self.frame, unit = id, label = %dead.label(), "Unit died");
                callbacks.on_unit_event(&UnitEvent::new(
                    UnitEventKind::Died,
                    id,
                    dead.faction,
                    self.frame,
                    dead.position,
                ));
            }
        }
        for request in spawns {
            self.events.add_spawn(request);
        }
        self.units.remove_dead();
    }

    fn apply_spawns(&mut self, callbacks: &mut dyn SimulatorCallbacks) {
        let requests = std::mem::take(&mut self.events.spawns);
        for request in &requests {
            let position = self.balance.map.clamp_to_bounds(request.position);
            let hp = (request.hp > 0).then_some(request.hp);
            let unit = self.registry.spawn(
                &request.unit_id,
                self.units.peek_next_id(),
                request.faction,
                position,
                hp,
                &self.balance,
            );
            self.add_unit(unit, callbacks);
        }
        self.events.spawns = requests;
    }

    // ---------------------------------------------------------- state access

    /// Hash of the full simulation state.
    pub fn state_hash(&self) -> Result<u64> {
        let bytes = self.checkpoint()?;
        let mut hasher = DefaultHasher::new();
        bytes.hash(&mut hasher);
        Ok(hasher.finish())
    }

    /// Serialize the full state.
    pub fn checkpoint(&self) -> Result<Vec<u8>> {
        bincode::serialize(self)
            .map_err(|e| GameError::InvalidState(format!("Failed to serialize simulation: {}", e)))
    }

    /// Rebuild a simulator from a [`checkpoint`](Self::checkpoint).
    pub fn restore(data: &[u8]) -> Result<Self> {
        bincode::deserialize(data).map_err(|e| {
            GameError::InvalidState(format!("Failed to deserialize simulation: {}", e))
        })
    }

    /// Go back to frame 0 with the original setup and waves.
    ///
    /// Queued commands are dropped.
    pub fn reset(&mut self, callbacks: &mut dyn SimulatorCallbacks) {
        self.units = UnitArena::new();
        self.session = GameSession::new();
        self.squad = SquadBehavior::new();
        self.events.clear();
        self.commands.clear();
        self.waves.reset();
        self.frame = 0;
        self.initialize();
        callbacks.on_state_changed("Simulation reset");
    }

    /// Replace units, towers and score with a [`FrameData`] snapshot.
    ///
    /// Units are rebuilt from their definitions (or role defaults) and then
    /// overwritten with the snapshot values. Towers start from the setup and
    /// take HP, activation and cooldown from the snapshot by id. The grid is
    /// rebuilt from terrain and towers with no congestion history, so two
    /// simulators loading the same frame continue identically. Simulation
    /// continues with the frame after the snapshot.
    pub fn load_frame(&mut self, data: &FrameData, callbacks: &mut dyn SimulatorCallbacks) {
        self.units = UnitArena::new();
        for state in data.all_units().filter(|s| !s.is_dead) {
            let unit = self.rebuild_unit(state);
            self.units.insert_with_id(unit);
        }
        let holders: Vec<(UnitId, UnitId, usize)> = self
            .units
            .iter()
            .filter_map(|u| Some((u.id, u.target?, u.taken_slot?)))
            .collect();
        for (holder, target, slot) in holders {
            let claimed = self
                .units
                .get_mut(target)
                .and_then(|t| t.attack_slots.get_mut(slot))
                .map(|s| *s = Some(holder));
            if claimed.is_none() {
                if let Some(u) = self.units.get_mut(holder) {
                    u.taken_slot = None;
                }
            }
        }

        self.session.initialize_towers(&self.setup, &self.balance);
        for saved in data.friendly_towers.iter().chain(data.enemy_towers.iter()) {
            if let Some(tower) = self.session.tower_mut(saved.id) {
                tower.current_hp = saved.current_hp;
                tower.is_activated = saved.is_activated;
                tower.attack_cooldown = saved.attack_cooldown;
                tower.target = saved.target_id;
            }
        }
        self.rebuild_navigation();
        self.session.elapsed_time = data.elapsed_time;
        self.session.friendly_crowns = data.friendly_crowns;
        self.session.enemy_crowns = data.enemy_crowns;
        self.session.result = data.game_result;
        self.session.win_condition = data.win_condition;
        self.session.is_overtime = data.is_overtime;

        self.squad = SquadBehavior::new();
        self.waves.resume_after(data.current_wave);
        self.events.clear();
        self.frame = data.frame_number + 1;

        let description = format!("State loaded from frame {}", data.frame_number);
        info!(frame = data.frame_number, units = self.units.len(), "State loaded");
        callbacks.on_state_changed(&description);
    }

    fn rebuild_unit(&self, state: &UnitStateData) -> Unit {
        let mut unit = match self.registry.get(&state.unit_id) {
            Some(definition) => UnitRegistry::create_unit(
                definition,
                state.id,
                state.faction,
                state.position,
                None,
                &self.balance,
            ),
            None => {
                let mut spec = role_spec(state.role, state.faction, &self.balance);
                spec.unit_id = state.unit_id.clone();
                Unit::new(state.id, state.faction, state.position, spec)
            }
        };
        unit.id = state.id;
        unit.max_hp = state.max_hp;
        unit.set_hp(state.hp);
        unit.shield_hp = state.shield_hp.min(unit.max_shield_hp);
        unit.radius = state.radius;
        unit.speed = state.speed;
        unit.attack_range = state.attack_range;
        unit.attack_cooldown = state.attack_cooldown;
        unit.velocity = state.velocity;
        unit.forward = state.forward;
        unit.previous_position = state.position;
        unit.destination = state.destination;
        unit.target = state.target_id;
        unit.target_tower = state.target_tower_id;
        unit.taken_slot = state.taken_slot_index;
        unit.avoidance_target = state.avoidance_target;
        unit.charge.is_charging = state.is_charging;
        unit.charge.is_charged = state.is_charged;
        if let Some(charge) = unit.charge_attack().copied() {
            unit.charge.required_distance = charge.required_charge_distance;
            unit.charge.charge_start = state.position;
        }
        unit
    }
}

/// Apply `amount` to shield then HP; returns everything absorbed.
fn absorbed_damage(unit: &mut Unit, amount: i32) -> i32 {
    let shield_before = unit.shield_hp;
    let dealt = unit.take_damage(amount);
    dealt + (shield_before - unit.shield_hp)
}
