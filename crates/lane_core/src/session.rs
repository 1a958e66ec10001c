//! Match state: towers, clock, crowns and the result.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::GameBalance;
use crate::math::{fixed_serde, Fixed, SMALL_NUMBER};
use crate::setup::InitialSetup;
use crate::tower::{Tower, TowerId, TowerType};
use crate::unit::Faction;

/// Outcome of a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum GameResult {
    /// Still being played.
    #[default]
    InProgress,
    /// Friendly side won.
    FriendlyWin,
    /// Enemy side won.
    EnemyWin,
    /// Nobody won.
    Draw,
}

/// How a finished match was decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WinCondition {
    /// A King tower fell.
    KingDestroyed,
    /// More crowns at the end of regular time.
    MoreCrownCount,
    /// Higher remaining tower HP ratio at the end of overtime.
    MoreTowerDamage,
    /// First crown taken in overtime.
    TieBreaker,
}

/// Towers, clock and score of one match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameSession {
    /// Friendly towers in id order.
    pub friendly_towers: Vec<Tower>,
    /// Enemy towers in id order.
    pub enemy_towers: Vec<Tower>,
    /// Seconds played.
    #[serde(with = "fixed_serde")]
    pub elapsed_time: Fixed,
    /// End of regular time, seconds.
    #[serde(with = "fixed_serde")]
    pub regular_time: Fixed,
    /// Hard end of the match, seconds.
    #[serde(with = "fixed_serde")]
    pub max_game_time: Fixed,
    /// Crowns taken by the friendly side.
    pub friendly_crowns: u32,
    /// Crowns taken by the enemy side.
    pub enemy_crowns: u32,
    /// Current result.
    pub result: GameResult,
    /// Set once the match is decided.
    pub win_condition: Option<WinCondition>,
    /// Regular time ran out with crowns tied.
    pub is_overtime: bool,
}

impl Default for GameSession {
    fn default() -> Self {
        Self {
            friendly_towers: Vec::new(),
            enemy_towers: Vec::new(),
            elapsed_time: Fixed::ZERO,
            regular_time: Fixed::from_num(180),
            max_game_time: Fixed::from_num(300),
            friendly_crowns: 0,
            enemy_crowns: 0,
            result: GameResult::InProgress,
            win_condition: None,
            is_overtime: false,
        }
    }
}

impl GameSession {
    /// Empty session with the default clock.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Place the setup's towers and reset the clock and score.
    ///
    /// Ids are assigned from 1 in setup order across both factions.
    pub fn initialize_towers(&mut self, setup: &InitialSetup, balance: &GameBalance) {
        self.friendly_towers.clear();
        self.enemy_towers.clear();

        for (index, tower_setup) in setup.towers.iter().enumerate() {
            let id = TowerId::try_from(index + 1).unwrap_or(TowerId::MAX);
            let stats = match tower_setup.tower_type {
                TowerType::King => &balance.king_tower,
                TowerType::Princess => &balance.princess_tower,
            };
            let position = tower_setup.resolve_position(&balance.map);
            let mut tower = Tower::new(id, tower_setup.tower_type, tower_setup.faction, position, stats);
            if let Some(hp) = tower_setup.initial_hp {
                tower.current_hp = hp;
            }
            if let Some(active) = tower_setup.is_activated {
                tower.is_activated = active;
            }
            self.towers_mut(tower_setup.faction).push(tower);
        }

        self.elapsed_time = Fixed::ZERO;
        self.regular_time = setup.game_time.regular_time;
        self.max_game_time = setup.game_time.max_game_time;
        self.friendly_crowns = 0;
        self.enemy_crowns = 0;
        self.result = GameResult::InProgress;
        self.win_condition = None;
        self.is_overtime = false;
    }

    /// Towers of `faction`.
    #[must_use]
    pub fn towers(&self, faction: Faction) -> &[Tower] {
        match faction {
            Faction::Friendly => &self.friendly_towers,
            Faction::Enemy => &self.enemy_towers,
        }
    }

    /// Towers of `faction`, mutably.
    pub fn towers_mut(&mut self, faction: Faction) -> &mut Vec<Tower> {
        match faction {
            Faction::Friendly => &mut self.friendly_towers,
            Faction::Enemy => &mut self.enemy_towers,
        }
    }

    /// Every tower, friendly first.
    pub fn all_towers(&self) -> impl Iterator<Item = &Tower> {
        self.friendly_towers.iter().chain(self.enemy_towers.iter())
    }

    /// Look up a tower of either faction.
    #[must_use]
    pub fn tower(&self, id: TowerId) -> Option<&Tower> {
        self.all_towers().find(|t| t.id == id)
    }

    /// Look up a tower of either faction mutably.
    pub fn tower_mut(&mut self, id: TowerId) -> Option<&mut Tower> {
        self.friendly_towers
            .iter_mut()
            .chain(self.enemy_towers.iter_mut())
            .find(|t| t.id == id)
    }

    /// King tower of `faction`.
    #[must_use]
    pub fn king_tower(&self, faction: Faction) -> Option<&Tower> {
        self.towers(faction).iter().find(|t| t.is_king())
    }

    /// Standing towers of `faction`.
    pub fn living_towers(&self, faction: Faction) -> impl Iterator<Item = &Tower> {
        self.towers(faction).iter().filter(|t| !t.is_destroyed())
    }

    /// Wake each King whose side has lost a Princess.
    pub fn update_king_activation(&mut self) {
        for faction in [Faction::Friendly, Faction::Enemy] {
            let towers = self.towers_mut(faction);
            let princess_down = towers
                .iter()
                .any(|t| t.tower_type == TowerType::Princess && t.is_destroyed());
            if !princess_down {
                continue;
            }
            if let Some(king) = towers.iter_mut().find(|t| t.is_king() && !t.is_activated) {
                king.is_activated = true;
                info!(tower = king.id, ?faction, "King tower activated");
            }
        }
    }

    /// Recount crowns: a fallen King is worth three, a Princess one, capped
    /// at three.
    pub fn update_crowns(&mut self) {
        self.friendly_crowns = crowns_from(&self.enemy_towers);
        self.enemy_crowns = crowns_from(&self.friendly_towers);
    }

    /// Remaining HP over max HP across `faction`'s towers; zero without
    /// towers.
    #[must_use]
    pub fn total_tower_hp_ratio(&self, faction: Faction) -> Fixed {
        let towers = self.towers(faction);
        let current: i64 = towers.iter().map(|t| i64::from(t.current_hp)).sum();
        let max: i64 = towers.iter().map(|t| i64::from(t.max_hp)).sum();
        if max <= 0 {
            return Fixed::ZERO;
        }
        Fixed::from_num(current) / Fixed::from_num(max)
    }

    /// Whether the match is decided.
    #[must_use]
    pub fn is_game_over(&self) -> bool {
        self.result != GameResult::InProgress
    }
}

fn crowns_from(destroyed_side: &[Tower]) -> u32 {
    let crowns: u32 = destroyed_side
        .iter()
        .filter(|t| t.is_destroyed())
        .map(|t| if t.is_king() { 3 } else { 1 })
        .sum();
    crowns.min(3)
}

/// Decides the match from the session state.
#[derive(Debug, Clone, Copy, Default)]
pub struct WinConditionEvaluator;

impl WinConditionEvaluator {
    /// Update `session.result` and `session.win_condition`; no-op once the
    /// match is decided.
    pub fn evaluate(self, session: &mut GameSession) {
        if session.is_game_over() {
            return;
        }

        let friendly_king_down = session
            .king_tower(Faction::Friendly)
            .is_some_and(Tower::is_destroyed);
        let enemy_king_down = session.king_tower(Faction::Enemy).is_some_and(Tower::is_destroyed);
        if friendly_king_down || enemy_king_down {
            session.result = match (friendly_king_down, enemy_king_down) {
                (true, true) => GameResult::Draw,
                (false, true) => GameResult::FriendlyWin,
                _ => GameResult::EnemyWin,
            };
            session.win_condition = Some(WinCondition::KingDestroyed);
            return;
        }

        if session.elapsed_time < session.regular_time {
            return;
        }

        if !session.is_overtime {
            if session.friendly_crowns != session.enemy_crowns {
                Self::set_winner_by_crowns(session, WinCondition::MoreCrownCount);
            } else {
                session.is_overtime = true;
                info!(elapsed = %session.elapsed_time, "Overtime");
            }
            return;
        }

        if session.friendly_crowns != session.enemy_crowns {
            Self::set_winner_by_crowns(session, WinCondition::TieBreaker);
            return;
        }

        if session.elapsed_time < session.max_game_time {
            return;
        }

        let friendly = session.total_tower_hp_ratio(Faction::Friendly);
        let enemy = session.total_tower_hp_ratio(Faction::Enemy);
        session.result = if (friendly - enemy).abs() < SMALL_NUMBER {
            GameResult::Draw
        } else if friendly > enemy {
            GameResult::FriendlyWin
        } else {
            GameResult::EnemyWin
        };
        session.win_condition = Some(WinCondition::MoreTowerDamage);
    }

    fn set_winner_by_crowns(session: &mut GameSession, condition: WinCondition) {
        session.result = if session.friendly_crowns > session.enemy_crowns {
            GameResult::FriendlyWin
        } else {
            GameResult::EnemyWin
        };
        session.win_condition = Some(condition);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::setup::TowerSetup;

    fn session() -> GameSession {
        let mut session = GameSession::new();
        session.initialize_towers(&InitialSetup::standard(), &GameBalance::default());
        session
    }

    fn destroy(session: &mut GameSession, id: TowerId) {
        if let Some(tower) = session.tower_mut(id) {
            tower.current_hp = 0;
        }
    }

    #[test]
    fn test_initialize_assigns_ids_in_order() {
        let s = session();
        assert_eq!(s.friendly_towers.iter().map(|t| t.id).collect::<Vec<_>>(), vec![1, 2, 3]);
        assert_eq!(s.enemy_towers.iter().map(|t| t.id).collect::<Vec<_>>(), vec![4, 5, 6]);
        assert_eq!(s.king_tower(Faction::Enemy).map(|t| t.id), Some(4));
        assert!(!s.king_tower(Faction::Friendly).unwrap().is_activated);
        assert_eq!(s.tower(5).unwrap().tower_type, TowerType::Princess);
        assert!(s.tower(7).is_none());
    }

    #[test]
    fn test_setup_overrides_apply() {
        let mut setup = InitialSetup::standard();
        setup.towers[0] = TowerSetup {
            initial_hp: Some(10),
            is_activated: Some(true),
            ..TowerSetup::new(TowerType::King, Faction::Friendly)
        };
        let mut s = GameSession::new();
        s.initialize_towers(&setup, &GameBalance::default());
        let king = s.king_tower(Faction::Friendly).unwrap();
        assert_eq!(king.current_hp, 10);
        assert!(king.is_activated);
    }

    #[test]
    fn test_princess_loss_wakes_king() {
        let mut s = session();
        destroy(&mut s, 5);
        s.update_king_activation();
        assert!(s.king_tower(Faction::Enemy).unwrap().is_activated);
        assert!(!s.king_tower(Faction::Friendly).unwrap().is_activated);
    }

    #[test]
    fn test_crowns_capped_at_three() {
        let mut s = session();
        destroy(&mut s, 5);
        s.update_crowns();
        assert_eq!((s.friendly_crowns, s.enemy_crowns), (1, 0));

        destroy(&mut s, 4);
        destroy(&mut s, 6);
        s.update_crowns();
        assert_eq!(s.friendly_crowns, 3);
    }

    #[test]
    fn test_hp_ratio() {
        let mut s = session();
        assert_eq!(s.total_tower_hp_ratio(Faction::Friendly), Fixed::ONE);
        for tower in &mut s.friendly_towers {
            tower.current_hp = tower.max_hp / 2;
        }
        assert_eq!(s.total_tower_hp_ratio(Faction::Friendly), Fixed::from_num(0.5));
        assert_eq!(GameSession::new().total_tower_hp_ratio(Faction::Enemy), Fixed::ZERO);
    }

    #[test]
    fn test_king_destroyed_ends_match() {
        let mut s = session();
        destroy(&mut s, 4);
        WinConditionEvaluator.evaluate(&mut s);
        assert_eq!(s.result, GameResult::FriendlyWin);
        assert_eq!(s.win_condition, Some(WinCondition::KingDestroyed));

        let mut both = session();
        destroy(&mut both, 1);
        destroy(&mut both, 4);
        WinConditionEvaluator.evaluate(&mut both);
        assert_eq!(both.result, GameResult::Draw);
    }

    #[test]
    fn test_regular_time_crowns_then_overtime() {
        let mut s = session();
        s.elapsed_time = Fixed::from_num(100);
        WinConditionEvaluator.evaluate(&mut s);
        assert_eq!(s.result, GameResult::InProgress);

        s.elapsed_time = Fixed::from_num(180);
        WinConditionEvaluator.evaluate(&mut s);
        assert!(s.is_overtime);
        assert_eq!(s.result, GameResult::InProgress);

        s.enemy_crowns = 1;
        WinConditionEvaluator.evaluate(&mut s);
        assert_eq!(s.result, GameResult::EnemyWin);
        assert_eq!(s.win_condition, Some(WinCondition::TieBreaker));
    }

    #[test]
    fn test_more_crowns_at_regular_time() {
        let mut s = session();
        s.friendly_crowns = 2;
        s.elapsed_time = Fixed::from_num(180);
        WinConditionEvaluator.evaluate(&mut s);
        assert_eq!(s.result, GameResult::FriendlyWin);
        assert_eq!(s.win_condition, Some(WinCondition::MoreCrownCount));
    }

    #[test]
    fn test_tower_damage_decides_at_max_time() {
        let mut s = session();
        s.is_overtime = true;
        s.elapsed_time = Fixed::from_num(300);
        WinConditionEvaluator.evaluate(&mut s);
        assert_eq!(s.result, GameResult::Draw);
        assert_eq!(s.win_condition, Some(WinCondition::MoreTowerDamage));

        let mut s = session();
        s.is_overtime = true;
        s.elapsed_time = Fixed::from_num(300);
        s.friendly_towers[1].current_hp -= 500;
        WinConditionEvaluator.evaluate(&mut s);
        assert_eq!(s.result, GameResult::EnemyWin);
    }
}
