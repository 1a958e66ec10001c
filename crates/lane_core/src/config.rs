//! Injected balance configuration.
//!
//! [`GameBalance`] carries every tunable of the simulation. It is built once
//! (defaults or a RON file), validated eagerly, and handed to
//! [`SimulatorCore`](crate::simulator::SimulatorCore) by value. Nothing in
//! the core reads process-wide constants, so independent simulations can run
//! side by side with different tunables.
//!
//! Numbers are authored as decimals (`frame_time_seconds: 0.0333`) and
//! converted to [`Fixed`] on load.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{GameError, Result};
use crate::map::MapLayout;
use crate::math::{fixed_decimal, Fixed, PI};
use crate::tower::TowerStats;

/// Current balance file format version.
pub const BALANCE_VERSION: u32 = 1;

/// Number of attack slots around every unit.
pub const ATTACK_SLOT_COUNT: usize = 8;

/// `n / d` as a fixed-point constant.
pub(crate) fn ratio(n: i32, d: i32) -> Fixed {
    Fixed::from_num(n) / Fixed::from_num(d)
}

/// Immutable tunable constants for one simulation session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GameBalance {
    /// Balance format version.
    pub version: u32,

    // ---------------------------------------------------------------- world
    /// Arena geometry (bounds, river, bridges, tower anchors).
    pub map: MapLayout,
    /// Hard frame cap for [`SimulatorCore::run`](crate::simulator::SimulatorCore::run).
    pub max_frames: u32,
    /// Seconds per frame (tower cooldowns and match clock).
    #[serde(with = "fixed_decimal")]
    pub frame_time_seconds: Fixed,
    /// Default unit radius; also the pathfinding cell size.
    #[serde(with = "fixed_decimal")]
    pub unit_radius: Fixed,
    /// Fraction of the radius used for collision and avoidance.
    #[serde(with = "fixed_decimal")]
    pub collision_radius_scale: Fixed,

    // --------------------------------------------------------- attack slots
    /// Enemy re-picks its slot once the slot drifted this far away.
    #[serde(with = "fixed_decimal")]
    pub slot_reevaluate_distance: Fixed,
    /// Enemy re-picks its slot at least this often.
    pub slot_reevaluate_interval_frames: u32,

    // ---------------------------------------------------------------- units
    /// HP of command-spawned friendly units.
    pub friendly_hp: i32,
    /// HP of command-spawned enemy units.
    pub enemy_hp: i32,
    /// Speed of command-spawned friendly units (world units per frame).
    #[serde(with = "fixed_decimal")]
    pub friendly_speed: Fixed,
    /// Speed of command-spawned enemy units.
    #[serde(with = "fixed_decimal")]
    pub enemy_speed: Fixed,
    /// Turn speed of command-spawned friendly units (radians per frame).
    #[serde(with = "fixed_decimal")]
    pub friendly_turn_speed: Fixed,
    /// Turn speed of command-spawned enemy units.
    #[serde(with = "fixed_decimal")]
    pub enemy_turn_speed: Fixed,
    /// Frames between unit attacks.
    #[serde(with = "fixed_decimal")]
    pub attack_cooldown: Fixed,
    /// Damage of command-spawned friendly units.
    pub friendly_attack_damage: i32,
    /// Damage of command-spawned enemy units.
    pub enemy_attack_damage: i32,
    /// Melee attack range in unit radii.
    pub melee_range_multiplier: i32,
    /// Ranged attack range in unit radii.
    pub ranged_range_multiplier: i32,

    // ---------------------------------------------------------------- squad
    /// Engage when an enemy is within `attack_range * multiplier`.
    #[serde(with = "fixed_decimal")]
    pub engagement_trigger_distance_multiplier: Fixed,
    /// Rally point distance short of the squad target.
    #[serde(with = "fixed_decimal")]
    pub rally_distance: Fixed,
    /// Followers closer than this to their formation slot hold position.
    #[serde(with = "fixed_decimal")]
    pub formation_threshold: Fixed,
    /// Separation radius among enemy units.
    #[serde(with = "fixed_decimal")]
    pub separation_radius: Fixed,
    /// Separation radius among friendly units.
    #[serde(with = "fixed_decimal")]
    pub friendly_separation_radius: Fixed,
    /// Replan when the destination moved further than this.
    #[serde(with = "fixed_decimal")]
    pub destination_threshold: Fixed,
    /// Maximum number of waves a schedule may contain.
    pub max_waves: u32,

    // ------------------------------------------------------------ targeting
    /// Enemy target re-evaluation interval.
    pub target_reevaluate_interval_frames: u32,
    /// A new target must be this much closer (score) to steal focus early.
    #[serde(with = "fixed_decimal")]
    pub target_switch_margin: Fixed,
    /// Score penalty per attacker already holding a slot on the target.
    #[serde(with = "fixed_decimal")]
    pub target_crowd_penalty_per_attacker: Fixed,

    // ------------------------------------------------------------ avoidance
    /// Angular step when sweeping for a clear direction (radians).
    #[serde(with = "fixed_decimal")]
    pub avoidance_angle_step: Fixed,
    /// Sweep iterations per side.
    pub max_avoidance_iterations: u32,
    /// Lookahead horizon in frames.
    #[serde(with = "fixed_decimal")]
    pub avoidance_max_lookahead: Fixed,
    /// Detour segments after the start point.
    pub avoidance_segment_count: u32,
    /// Distance ahead where a detour starts.
    #[serde(with = "fixed_decimal")]
    pub avoidance_segment_start_distance: Fixed,
    /// Extra sidestep beyond the combined radius.
    #[serde(with = "fixed_decimal")]
    pub avoidance_lateral_padding: Fixed,
    /// Parallel detour leg length as a multiple of the threat distance.
    #[serde(with = "fixed_decimal")]
    pub avoidance_parallel_distance_multiplier: Fixed,
    /// Waypoints closer than this count as reached.
    #[serde(with = "fixed_decimal")]
    pub avoidance_waypoint_threshold: Fixed,

    // ------------------------------------------------------------ obstacles
    /// Extra radius blocked around towers on the grid.
    #[serde(with = "fixed_decimal")]
    pub tower_collision_padding: Fixed,
    /// River rectangles are shrunk by this margin.
    #[serde(with = "fixed_decimal")]
    pub river_obstacle_margin: Fixed,

    // --------------------------------------------------------------- replan
    /// Frames without waypoint progress before a replan.
    pub replan_stall_threshold: u32,
    /// Frames of continuous avoidance before a replan.
    pub replan_avoidance_threshold: u32,
    /// Periodic replan interval.
    pub replan_periodic_interval: u32,
    /// Minimum per-frame movement (times two) counted as progress.
    #[serde(with = "fixed_decimal")]
    pub waypoint_progress_threshold: Fixed,
    /// Minimum frames between replans.
    pub replan_cooldown_frames: u32,

    // ---------------------------------------------------- dynamic obstacles
    /// Ground units per cell that turn the cell into a dynamic obstacle.
    pub dynamic_obstacle_density_threshold: u32,
    /// Frames between dynamic obstacle refreshes.
    pub dynamic_obstacle_update_interval: u32,

    // ------------------------------------------------------------ smoothing
    /// Toggle for line-of-sight path smoothing.
    pub path_smoothing_enabled: bool,
    /// Furthest waypoint the smoother tries to reach in one hop.
    pub path_smoothing_max_skip: u32,

    // ------------------------------------------------------------ collision
    /// Pairwise push-out passes per frame.
    pub collision_resolution_iterations: u32,
    /// Fraction of the overlap resolved per pass.
    #[serde(with = "fixed_decimal")]
    pub collision_push_strength: Fixed,

    // --------------------------------------------------------------- towers
    /// Princess tower stats.
    pub princess_tower: TowerStats,
    /// King tower stats.
    pub king_tower: TowerStats,
}

impl Default for GameBalance {
    fn default() -> Self {
        Self {
            version: BALANCE_VERSION,
            map: MapLayout::default(),
            max_frames: 3000,
            frame_time_seconds: ratio(1, 30),
            unit_radius: Fixed::from_num(20),
            collision_radius_scale: ratio(2, 3),
            slot_reevaluate_distance: Fixed::from_num(40),
            slot_reevaluate_interval_frames: 60,
            friendly_hp: 100,
            enemy_hp: 10,
            friendly_speed: ratio(9, 2),
            enemy_speed: Fixed::from_num(4),
            friendly_turn_speed: ratio(2, 25),
            enemy_turn_speed: ratio(1, 10),
            attack_cooldown: Fixed::from_num(30),
            friendly_attack_damage: 1,
            enemy_attack_damage: 1,
            melee_range_multiplier: 3,
            ranged_range_multiplier: 6,
            engagement_trigger_distance_multiplier: ratio(3, 2),
            rally_distance: Fixed::from_num(300),
            formation_threshold: Fixed::from_num(20),
            separation_radius: Fixed::from_num(120),
            friendly_separation_radius: Fixed::from_num(80),
            destination_threshold: Fixed::from_num(10),
            max_waves: 3,
            target_reevaluate_interval_frames: 45,
            target_switch_margin: Fixed::from_num(15),
            target_crowd_penalty_per_attacker: Fixed::from_num(25),
            avoidance_angle_step: PI / Fixed::from_num(8),
            max_avoidance_iterations: 8,
            avoidance_max_lookahead: ratio(7, 2),
            avoidance_segment_count: 3,
            avoidance_segment_start_distance: Fixed::from_num(20),
            avoidance_lateral_padding: Fixed::from_num(25),
            avoidance_parallel_distance_multiplier: ratio(3, 2),
            avoidance_waypoint_threshold: Fixed::from_num(12),
            tower_collision_padding: Fixed::from_num(10),
            river_obstacle_margin: Fixed::from_num(5),
            replan_stall_threshold: 30,
            replan_avoidance_threshold: 60,
            replan_periodic_interval: 300,
            waypoint_progress_threshold: Fixed::from_num(5),
            replan_cooldown_frames: 15,
            dynamic_obstacle_density_threshold: 3,
            dynamic_obstacle_update_interval: 15,
            path_smoothing_enabled: true,
            path_smoothing_max_skip: 10,
            collision_resolution_iterations: 3,
            collision_push_strength: ratio(4, 5),
            princess_tower: TowerStats::princess(),
            king_tower: TowerStats::king(),
        }
    }
}

impl GameBalance {
    /// Parse a balance file from a RON string and validate it.
    pub fn from_ron_str(source: &str) -> Result<Self> {
        let balance: Self = ron::from_str(source).map_err(|e| GameError::DataParseError {
            path: "<inline>".to_string(),
            message: e.to_string(),
        })?;
        balance.validate()?;
        Ok(balance)
    }

    /// Load and validate a balance file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|e| GameError::DataParseError {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        let balance: Self = ron::from_str(&source).map_err(|e| GameError::DataParseError {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        balance.validate()?;
        Ok(balance)
    }

    /// Reject values that would silently break the simulation.
    ///
    /// Nothing is clamped: a caller relying on a bad value gets an error at
    /// setup instead of subtly wrong behaviour later.
    pub fn validate(&self) -> Result<()> {
        if self.version != BALANCE_VERSION {
            return Err(invalid(format!(
                "balance version {} is not supported (expected {BALANCE_VERSION})",
                self.version
            )));
        }
        self.map.validate()?;
        require_positive("frame_time_seconds", self.frame_time_seconds)?;
        require_positive("unit_radius", self.unit_radius)?;
        require_unit_interval("collision_radius_scale", self.collision_radius_scale)?;
        require_unit_interval("collision_push_strength", self.collision_push_strength)?;
        require_positive("attack_cooldown", self.attack_cooldown)?;
        require_positive("avoidance_max_lookahead", self.avoidance_max_lookahead)?;
        require_positive("avoidance_angle_step", self.avoidance_angle_step)?;
        require_positive("waypoint_progress_threshold", self.waypoint_progress_threshold)?;
        if self.friendly_hp <= 0 || self.enemy_hp <= 0 {
            return Err(invalid("default unit HP must be positive".to_string()));
        }
        if self.melee_range_multiplier <= 0 || self.ranged_range_multiplier <= 0 {
            return Err(invalid("range multipliers must be positive".to_string()));
        }
        if self.dynamic_obstacle_density_threshold == 0 {
            return Err(invalid(
                "dynamic_obstacle_density_threshold must be at least 1".to_string(),
            ));
        }
        if self.dynamic_obstacle_update_interval == 0 {
            return Err(invalid(
                "dynamic_obstacle_update_interval must be at least 1".to_string(),
            ));
        }
        if self.path_smoothing_max_skip < 2 {
            return Err(invalid("path_smoothing_max_skip must be at least 2".to_string()));
        }
        if self.max_frames == 0 {
            return Err(invalid("max_frames must be at least 1".to_string()));
        }
        self.princess_tower.validate("princess_tower")?;
        self.king_tower.validate("king_tower")?;
        Ok(())
    }

    /// Collision radius for a unit of the given radius.
    #[must_use]
    pub fn collision_radius(&self, radius: Fixed) -> Fixed {
        radius * self.collision_radius_scale
    }
}

fn invalid(message: String) -> GameError {
    GameError::InvalidConfig(message)
}

fn require_positive(name: &str, value: Fixed) -> Result<()> {
    if value <= Fixed::ZERO {
        return Err(invalid(format!("{name} must be positive, got {value}")));
    }
    Ok(())
}

fn require_unit_interval(name: &str, value: Fixed) -> Result<()> {
    if value < Fixed::ZERO || value > Fixed::ONE {
        return Err(invalid(format!("{name} must be within [0, 1], got {value}")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_balance_is_valid() {
        let balance = GameBalance::default();
        assert!(balance.validate().is_ok());
        assert_eq!(balance.unit_radius, Fixed::from_num(20));
        assert_eq!(balance.max_frames, 3000);
    }

    #[test]
    fn test_partial_ron_uses_defaults() {
        let balance = GameBalance::from_ron_str(
            "(max_frames: 600, collision_push_strength: 0.5, path_smoothing_enabled: false)",
        )
        .unwrap();
        assert_eq!(balance.max_frames, 600);
        assert_eq!(balance.collision_push_strength, Fixed::from_num(0.5));
        assert!(!balance.path_smoothing_enabled);
        assert_eq!(balance.replan_stall_threshold, 30);
    }

    #[test]
    fn test_out_of_range_values_rejected() {
        let mut balance = GameBalance::default();
        balance.collision_push_strength = Fixed::from_num(2);
        assert!(matches!(balance.validate(), Err(GameError::InvalidConfig(_))));

        let mut balance = GameBalance::default();
        balance.dynamic_obstacle_update_interval = 0;
        assert!(matches!(balance.validate(), Err(GameError::InvalidConfig(_))));

        let mut balance = GameBalance::default();
        balance.frame_time_seconds = Fixed::ZERO;
        assert!(matches!(balance.validate(), Err(GameError::InvalidConfig(_))));
    }

    #[test]
    fn test_malformed_ron_is_parse_error() {
        let result = GameBalance::from_ron_str("(max_frames: \"lots\")");
        assert!(matches!(result, Err(GameError::DataParseError { .. })));
    }

    #[test]
    fn test_balance_ron_roundtrip() {
        let balance = GameBalance::default();
        let text = ron::ser::to_string(&balance).unwrap();
        let parsed = GameBalance::from_ron_str(&text).unwrap();
        assert_eq!(parsed.max_frames, balance.max_frames);
        assert_eq!(parsed.unit_radius, balance.unit_radius);
        assert_eq!(parsed.map, balance.map);
    }
}
