//! Battle metrics collection.
//!
//! [`MetricsCollector`] is a [`SimulatorCallbacks`] sink: hand it to
//! `step`/`run` and it tallies spawns, deaths, damage and attacks per side,
//! then folds the final frame into a [`GameMetrics`] record.

use std::collections::BTreeMap;

use lane_core::callbacks::{CompletionReason, SimulatorCallbacks, UnitEvent, UnitEventKind};
use lane_core::frame::FrameData;
use lane_core::session::{GameResult, WinCondition};
use lane_core::unit::{Faction, UnitId};
use serde::{Deserialize, Serialize};

/// Per-side tallies.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FactionMetrics {
    /// Units that entered the arena, by definition id.
    pub units_spawned: BTreeMap<String, u32>,
    /// Units of this side that died.
    pub units_lost: u32,
    /// Attacks made by this side's units.
    pub attacks: u32,
    /// HP plus shield taken by this side's units.
    pub damage_taken: i64,
    /// Crowns won.
    pub crowns: u32,
    /// Remaining tower HP, summed.
    pub tower_hp: i64,
}

impl FactionMetrics {
    /// Total units spawned.
    #[must_use]
    pub fn total_spawned(&self) -> u32 {
        self.units_spawned.values().sum()
    }
}

/// One finished battle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameMetrics {
    /// Game identifier.
    pub game_id: String,
    /// Scenario name.
    pub scenario: String,
    /// Seed of the command variation (0 for the unmodified script).
    pub seed: u64,
    /// Frames simulated.
    pub frames: u32,
    /// Why the run stopped.
    pub completion: Option<CompletionReason>,
    /// Final result.
    pub result: GameResult,
    /// How the result was decided.
    pub win_condition: Option<WinCondition>,
    /// Highest wave reached.
    pub waves_reached: u32,
    /// Friendly tallies.
    pub friendly: FactionMetrics,
    /// Enemy tallies.
    pub enemy: FactionMetrics,
    /// State hash after the last frame.
    pub final_state_hash: u64,
}

impl GameMetrics {
    /// Empty record.
    pub fn new(game_id: impl Into<String>, scenario: impl Into<String>, seed: u64) -> Self {
        Self {
            game_id: game_id.into(),
            scenario: scenario.into(),
            seed,
            frames: 0,
            completion: None,
            result: GameResult::InProgress,
            win_condition: None,
            waves_reached: 0,
            friendly: FactionMetrics::default(),
            enemy: FactionMetrics::default(),
            final_state_hash: 0,
        }
    }

    /// Tallies of one side.
    pub fn faction_mut(&mut self, faction: Faction) -> &mut FactionMetrics {
        match faction {
            Faction::Friendly => &mut self.friendly,
            Faction::Enemy => &mut self.enemy,
        }
    }

    /// Winner label, `None` for draws and undecided runs.
    #[must_use]
    pub const fn winner(&self) -> Option<&'static str> {
        match self.result {
            GameResult::FriendlyWin => Some("friendly"),
            GameResult::EnemyWin => Some("enemy"),
            GameResult::Draw | GameResult::InProgress => None,
        }
    }
}

/// Collects [`GameMetrics`] from simulator notifications.
#[derive(Debug, Clone)]
pub struct MetricsCollector {
    metrics: GameMetrics,
    /// Spawned this frame; resolved to definition ids when the frame lands.
    pending_spawns: Vec<(Faction, UnitId)>,
}

impl MetricsCollector {
    /// Collector for one game.
    pub fn new(game_id: &str, scenario: &str, seed: u64) -> Self {
        Self {
            metrics: GameMetrics::new(game_id, scenario, seed),
            pending_spawns: Vec::new(),
        }
    }

    /// Metrics so far.
    #[must_use]
    pub const fn current(&self) -> &GameMetrics {
        &self.metrics
    }

    /// Stamp the final hash and hand the record over.
    #[must_use]
    pub fn finalize(mut self, final_state_hash: u64) -> GameMetrics {
        self.metrics.final_state_hash = final_state_hash;
        self.metrics
    }
}

impl SimulatorCallbacks for MetricsCollector {
    fn on_frame(&mut self, frame: &FrameData) {
        for (faction, id) in std::mem::take(&mut self.pending_spawns) {
            let unit_id = frame
                .all_units()
                .find(|u| u.id == id)
                .map_or_else(|| "unknown".to_string(), |u| u.unit_id.clone());
            *self
                .metrics
                .faction_mut(faction)
                .units_spawned
                .entry(unit_id)
                .or_insert(0) += 1;
        }
        let m = &mut self.metrics;
        m.frames = frame.frame_number + 1;
        m.result = frame.game_result;
        m.win_condition = frame.win_condition;
        m.waves_reached = m.waves_reached.max(frame.current_wave);
        m.friendly.crowns = frame.friendly_crowns;
        m.enemy.crowns = frame.enemy_crowns;
        m.friendly.tower_hp = frame
            .friendly_towers
            .iter()
            .map(|t| i64::from(t.current_hp.max(0)))
            .sum();
        m.enemy.tower_hp = frame
            .enemy_towers
            .iter()
            .map(|t| i64::from(t.current_hp.max(0)))
            .sum();
    }

    fn on_unit_event(&mut self, event: &UnitEvent) {
        if event.kind == UnitEventKind::Spawned {
            self.pending_spawns.push((event.faction, event.unit_id));
            return;
        }
        let side = self.metrics.faction_mut(event.faction);
        match event.kind {
            UnitEventKind::Died => side.units_lost += 1,
            UnitEventKind::Attack => side.attacks += 1,
            UnitEventKind::Damaged => side.damage_taken += i64::from(event.value.unwrap_or(0)),
            UnitEventKind::Spawned | UnitEventKind::TargetAcquired | UnitEventKind::Moved => {}
        }
    }

    fn on_simulation_complete(&mut self, _frame: u32, reason: CompletionReason) {
        self.metrics.completion = Some(reason);
    }
}

/// Aggregate over a batch of games.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchSummary {
    /// Games included.
    pub total_games: u32,
    /// Wins per side label (`"friendly"`, `"enemy"`).
    pub win_rates: BTreeMap<String, f64>,
    /// Games ending in a draw.
    pub draws: u32,
    /// Games stopped before a decision.
    pub undecided: u32,
    /// How decided games were decided.
    pub win_conditions: BTreeMap<String, u32>,
    /// Mean frames per game.
    pub average_frames: f64,
    /// Mean crowns per side label.
    pub average_crowns: BTreeMap<String, f64>,
}

impl BatchSummary {
    /// Summarize `games`.
    #[must_use]
    pub fn from_games(games: &[GameMetrics]) -> Self {
        let mut summary = Self {
            total_games: u32::try_from(games.len()).unwrap_or(u32::MAX),
            ..Self::default()
        };
        if games.is_empty() {
            return summary;
        }
        let n = games.len() as f64;

        let mut wins: BTreeMap<String, u32> = BTreeMap::new();
        for game in games {
            match game.result {
                GameResult::Draw => summary.draws += 1,
                GameResult::InProgress => summary.undecided += 1,
                GameResult::FriendlyWin | GameResult::EnemyWin => {}
            }
            if let Some(winner) = game.winner() {
                *wins.entry(winner.to_string()).or_insert(0) += 1;
            }
            if let Some(condition) = game.win_condition {
                *summary
                    .win_conditions
                    .entry(format!("{condition:?}"))
                    .or_insert(0) += 1;
            }
        }
        for side in ["friendly", "enemy"] {
            let count = wins.get(side).copied().unwrap_or(0);
            summary.win_rates.insert(side.to_string(), f64::from(count) / n);
        }

        summary.average_frames = games.iter().map(|g| f64::from(g.frames)).sum::<f64>() / n;
        summary.average_crowns.insert(
            "friendly".to_string(),
            games.iter().map(|g| f64::from(g.friendly.crowns)).sum::<f64>() / n,
        );
        summary.average_crowns.insert(
            "enemy".to_string(),
            games.iter().map(|g| f64::from(g.enemy.crowns)).sum::<f64>() / n,
        );
        summary
    }

    /// Whether neither side wins more than `threshold` above an even split.
    #[must_use]
    pub fn is_balanced(&self, threshold: f64) -> bool {
        let friendly = self.win_rates.get("friendly").copied().unwrap_or(0.0);
        let enemy = self.win_rates.get("enemy").copied().unwrap_or(0.0);
        (friendly - enemy).abs() <= threshold * 2.0
    }
}
