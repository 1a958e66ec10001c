//! Path progress monitoring and replan triggers.

use crate::config::GameBalance;
use crate::math::{Fixed, Vec2Fixed};
use crate::unit::Unit;

/// Decides when a unit should throw away its path and plan a new one.
#[derive(Debug, Clone, Copy)]
pub struct ProgressMonitor<'a> {
    balance: &'a GameBalance,
}

impl<'a> ProgressMonitor<'a> {
    /// Monitor using the balance thresholds.
    #[must_use]
    pub const fn new(balance: &'a GameBalance) -> Self {
        Self { balance }
    }

    /// Whether `unit` should replan at `frame`.
    ///
    /// Never within the replan cooldown; otherwise on a progress stall, on
    /// prolonged avoidance, or periodically.
    #[must_use]
    pub fn should_replan(&self, unit: &Unit, frame: u32) -> bool {
        let since = frame.saturating_sub(unit.last_replan_frame);
        if since < self.balance.replan_cooldown_frames {
            return false;
        }
        unit.frames_since_waypoint_progress >= self.balance.replan_stall_threshold
            || unit.frames_since_avoidance_start >= self.balance.replan_avoidance_threshold
            || since >= self.balance.replan_periodic_interval
    }

    /// Record a replan.
    pub fn on_replan(unit: &mut Unit, frame: u32) {
        unit.last_replan_frame = frame;
        unit.frames_since_waypoint_progress = 0;
        unit.frames_since_avoidance_start = 0;
    }

    /// Update the stall and avoidance counters and remember the position.
    pub fn update_progress(unit: &mut Unit, is_avoiding: bool, made_progress: bool) {
        if made_progress {
            unit.frames_since_waypoint_progress = 0;
        } else {
            unit.frames_since_waypoint_progress =
                unit.frames_since_waypoint_progress.saturating_add(1);
        }

        if is_avoiding {
            unit.frames_since_avoidance_start = unit.frames_since_avoidance_start.saturating_add(1);
        } else {
            unit.frames_since_avoidance_start = 0;
        }

        unit.previous_position = unit.position;
    }

    /// Whether the unit moved far enough since the previous check and got
    /// strictly closer to `waypoint`.
    #[must_use]
    pub fn check_progress(&self, unit: &Unit, waypoint: Vec2Fixed) -> bool {
        let half = self.balance.waypoint_progress_threshold / Fixed::from_num(2);
        let moved_sq = unit.previous_position.distance_squared(unit.position);
        moved_sq >= half * half
            && unit.position.distance_squared(waypoint)
                < unit.previous_position.distance_squared(waypoint)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::unit::tests::spec;
    use crate::unit::Faction;

    fn unit() -> Unit {
        Unit::new(1, Faction::Friendly, Vec2Fixed::ZERO, spec(10))
    }

    #[test]
    fn test_cooldown_blocks_replan() {
        let balance = GameBalance::default();
        let monitor = ProgressMonitor::new(&balance);
        let mut unit = unit();
        ProgressMonitor::on_replan(&mut unit, 100);
        unit.frames_since_waypoint_progress = 1000;
        assert!(!monitor.should_replan(&unit, 114));
        assert!(monitor.should_replan(&unit, 115));
    }

    #[test]
    fn test_triggers() {
        let balance = GameBalance::default();
        let monitor = ProgressMonitor::new(&balance);
        let mut unit = unit();
        ProgressMonitor::on_replan(&mut unit, 0);
        assert!(!monitor.should_replan(&unit, 100));

        unit.frames_since_waypoint_progress = 30;
        assert!(monitor.should_replan(&unit, 100));

        unit.frames_since_waypoint_progress = 0;
        unit.frames_since_avoidance_start = 60;
        assert!(monitor.should_replan(&unit, 100));

        unit.frames_since_avoidance_start = 0;
        assert!(monitor.should_replan(&unit, 300));
    }

    #[test]
    fn test_update_progress_counters() {
        let mut unit = unit();
        ProgressMonitor::update_progress(&mut unit, true, false);
        ProgressMonitor::update_progress(&mut unit, true, false);
        assert_eq!(unit.frames_since_waypoint_progress, 2);
        assert_eq!(unit.frames_since_avoidance_start, 2);

        unit.position = Vec2Fixed::from_ints(7, 0);
        ProgressMonitor::update_progress(&mut unit, false, true);
        assert_eq!(unit.frames_since_waypoint_progress, 0);
        assert_eq!(unit.frames_since_avoidance_start, 0);
        assert_eq!(unit.previous_position, unit.position);
    }

    #[test]
    fn test_check_progress_needs_movement_and_approach() {
        let balance = GameBalance::default();
        let monitor = ProgressMonitor::new(&balance);
        let mut unit = unit();
        let waypoint = Vec2Fixed::from_ints(100, 0);

        unit.position = Vec2Fixed::from_ints(3, 0);
        assert!(monitor.check_progress(&unit, waypoint));

        unit.position = Vec2Fixed::from_ints(2, 0);
        assert!(!monitor.check_progress(&unit, waypoint), "moved less than 2.5");

        unit.position = Vec2Fixed::from_ints(-3, 0);
        assert!(!monitor.check_progress(&unit, waypoint), "moved away");
    }
}
