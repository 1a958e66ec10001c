//! Path following, integration and collision resolution.

use tracing::trace;

use crate::avoidance::{predictive_avoidance, separation};
use crate::config::GameBalance;
use crate::grid::PathfindingGrid;
use crate::map::MapLayout;
use crate::math::{Fixed, Vec2Fixed, SMALL_NUMBER, TAU};
use crate::pathfinding::find_path;
use crate::progress::ProgressMonitor;
use crate::smoothing::PathSmoother;
use crate::unit::{ArenaSplit, MovementLayer, Unit, UnitArena};

/// Distance at which a path waypoint counts as reached.
pub const WAYPOINT_THRESHOLD: i32 = 12;

/// Everything a unit needs to plan and steer during one frame.
pub struct MovementContext<'a> {
    /// Tunables.
    pub balance: &'a GameBalance,
    /// Shared pathfinding grid (A* scratch state lives in it).
    pub grid: &'a mut PathfindingGrid,
    /// Path smoother.
    pub smoother: PathSmoother,
    /// Current frame.
    pub frame: u32,
}

impl<'a> MovementContext<'a> {
    /// Context for `frame`.
    pub fn new(balance: &'a GameBalance, grid: &'a mut PathfindingGrid, frame: u32) -> Self {
        Self {
            balance,
            grid,
            smoother: PathSmoother::from_balance(balance),
            frame,
        }
    }

    /// Arena layout.
    #[must_use]
    pub fn map(&self) -> &MapLayout {
        &self.balance.map
    }

    /// Set `unit.velocity` to head for `destination`.
    ///
    /// Replans when there is no path yet, the (bridge-adjusted) destination
    /// moved or the progress monitor asks for it. Then steers toward the
    /// current detour or path waypoint with separation and avoidance mixed
    /// in. Does not move the
    /// unit; see [`integrate`].
    pub fn move_unit(
        &mut self,
        unit: &mut Unit,
        destination: Vec2Fixed,
        others: &ArenaSplit<'_>,
        separation_radius: Fixed,
    ) {
        let balance = self.balance;
        let monitor = ProgressMonitor::new(balance);
        let adjusted = balance
            .map
            .adjusted_destination(unit.layer, unit.position, destination);

        // An empty path with a destination set comes from a command or a
        // loaded frame; it has to be planned before the unit can move.
        let moved = unit.movement_path.is_empty()
            || unit.destination.map_or(true, |current| {
                current.distance_squared(adjusted)
                    > balance.destination_threshold * balance.destination_threshold
            });
        if moved || monitor.should_replan(unit, self.frame) {
            self.replan(unit, adjusted);
        }

        let threshold = Fixed::from_num(WAYPOINT_THRESHOLD);
        let Some(waypoint) = unit.next_movement_waypoint(threshold) else {
            unit.velocity = Vec2Fixed::ZERO;
            ProgressMonitor::update_progress(unit, false, true);
            return;
        };

        let desired = (waypoint - unit.position).safe_normalize();
        let push = separation(unit, others.iter(), separation_radius);
        let avoidance = predictive_avoidance(balance, unit, others.iter(), desired);

        let detour_waypoint = unit.next_avoidance_waypoint(balance.avoidance_waypoint_threshold);
        let steering_target = detour_waypoint.unwrap_or(waypoint);
        let has_detour = detour_waypoint.is_some() || avoidance.is_detouring;
        if has_detour {
            unit.avoidance_target = avoidance.avoidance_target;
            unit.avoidance_threat = avoidance.threat;
        } else {
            unit.clear_avoidance_path();
        }

        let to_target = steering_target - unit.position;
        let direction = (to_target.safe_normalize() + push + avoidance.steering).safe_normalize();
        let mut speed = unit.effective_speed();
        let on_last_leg = unit.movement_path_index + 1 >= unit.movement_path.len();
        if !has_detour && on_last_leg {
            speed = speed.min(to_target.length());
        }
        unit.velocity = direction * speed;

        let made_progress = monitor.check_progress(unit, waypoint);
        ProgressMonitor::update_progress(unit, has_detour, made_progress);
    }

    fn replan(&mut self, unit: &mut Unit, destination: Vec2Fixed) {
        let planned = match unit.layer {
            MovementLayer::Air => Some(vec![destination]),
            MovementLayer::Ground => find_path(self.grid, unit.position, destination).map(|path| {
                let mut path = self.smoother.smooth(self.grid, path);
                // The start cell centre is behind or beside the unit.
                if path.len() > 1 {
                    path.remove(0);
                }
                let same_cell = self.grid.cell_coords(destination);
                if let Some(last) = path.last_mut() {
                    if self.grid.cell_coords(*last) == same_cell {
                        *last = destination;
                    }
                }
                path
            }),
        };

        match planned {
            Some(path) => {
                trace!(frame = self.frame, unit = unit.id, waypoints = path.len(), "Path planned");
                unit.set_movement_path(path);
            }
            None if unit.movement_path.is_empty() => {
                trace!(frame = self.frame, unit = unit.id, "No path; heading straight");
                unit.set_movement_path(vec![destination]);
            }
            None => {
                trace!(frame = self.frame, unit = unit.id, "No path; keeping previous");
            }
        }

        unit.destination = Some(destination);
        ProgressMonitor::on_replan(unit, self.frame);
    }
}

/// Apply one frame of velocity and turn toward it.
///
/// Ground units never enter open water; they slide along the blocked axis
/// or stay put.
pub fn integrate(unit: &mut Unit, map: &MapLayout) {
    if unit.is_dead() {
        return;
    }

    let next = map.clamp_to_bounds(unit.position + unit.velocity);
    unit.position = match unit.layer {
        MovementLayer::Air => next,
        MovementLayer::Ground => constrain_ground(map, unit.position, next),
    };
    unit.update_rotation();
}

fn constrain_ground(map: &MapLayout, from: Vec2Fixed, to: Vec2Fixed) -> Vec2Fixed {
    // Knocked into the water: let the unit walk out.
    if !map.can_ground_unit_move_to(from) {
        return to;
    }
    [to, Vec2Fixed::new(to.x, from.y), Vec2Fixed::new(from.x, to.y)]
        .into_iter()
        .find(|&candidate| map.can_ground_unit_move_to(candidate))
        .unwrap_or(from)
}

#[derive(Debug, Clone, Copy)]
struct Body {
    id: u32,
    layer: MovementLayer,
    position: Vec2Fixed,
    radius: Fixed,
}

/// Push overlapping living units on the same layer apart.
///
/// Pairs are visited in ascending id order and every push is visible to the
/// pairs after it. Returns the number of passes that resolved something.
pub fn resolve_collisions(units: &mut UnitArena, balance: &GameBalance) -> u32 {
    let mut bodies: Vec<Body> = units
        .iter()
        .filter(|u| !u.is_dead())
        .map(|u| Body {
            id: u.id,
            layer: u.layer,
            position: u.position,
            radius: balance.collision_radius(u.radius),
        })
        .collect();

    let half_push = balance.collision_push_strength / Fixed::from_num(2);
    let mut passes = 0;

    for _ in 0..balance.collision_resolution_iterations {
        let mut resolved = 0u32;
        for i in 0..bodies.len() {
            for j in (i + 1)..bodies.len() {
                let (a, b) = (bodies[i], bodies[j]);
                if a.layer != b.layer {
                    continue;
                }
                let combined = a.radius + b.radius;
                let delta = b.position - a.position;
                let dist_sq = delta.length_squared();
                if dist_sq >= combined * combined {
                    continue;
                }

                let distance = delta.length();
                let direction = if distance > SMALL_NUMBER {
                    delta / distance
                } else {
                    coincident_direction(a.id, b.id)
                };
                let push = direction * ((combined - distance) * half_push);

                bodies[i].position = nudge(&balance.map, a.layer, a.position, a.position - push);
                bodies[j].position = nudge(&balance.map, b.layer, b.position, b.position + push);
                resolved += 1;
            }
        }
        if resolved == 0 {
            break;
        }
        passes += 1;
    }

    for body in &bodies {
        if let Some(unit) = units.get_mut(body.id) {
            unit.position = body.position;
        }
    }
    passes
}

/// Fixed direction for two units standing on exactly the same spot.
fn coincident_direction(a: u32, b: u32) -> Vec2Fixed {
    let sector = (a.wrapping_mul(7).wrapping_add(b.wrapping_mul(13))) % 16;
    Vec2Fixed::from_angle(TAU * Fixed::from_num(sector) / Fixed::from_num(16))
}

fn nudge(map: &MapLayout, layer: MovementLayer, from: Vec2Fixed, to: Vec2Fixed) -> Vec2Fixed {
    let to = map.clamp_to_bounds(to);
    match layer {
        MovementLayer::Ground if !map.can_ground_unit_move_to(to) => from,
        _ => to,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::unit::tests::spec;
    use crate::unit::Faction;

    fn balance() -> GameBalance {
        GameBalance::default()
    }

    fn grid(balance: &GameBalance) -> PathfindingGrid {
        PathfindingGrid::new(balance.map.width, balance.map.height, balance.unit_radius)
    }

    fn arena_with(positions: &[(i32, i32)]) -> UnitArena {
        let mut arena = UnitArena::new();
        for &(x, y) in positions {
            arena.insert(Unit::new(0, Faction::Friendly, Vec2Fixed::from_ints(x, y), spec(10)));
        }
        arena
    }

    #[test]
    fn test_move_unit_plans_and_steers() {
        let balance = balance();
        let mut grid = grid(&balance);
        let mut arena = arena_with(&[(1000, 1000)]);
        let (unit, others) = arena.split_mut(1).unwrap();

        let mut ctx = MovementContext::new(&balance, &mut grid, 0);
        ctx.move_unit(unit, Vec2Fixed::from_ints(1000, 1400), &others, balance.separation_radius);

        assert_eq!(unit.destination, Some(Vec2Fixed::from_ints(1000, 1400)));
        assert_eq!(unit.movement_path.last(), Some(&Vec2Fixed::from_ints(1000, 1400)));
        assert!(unit.velocity.y > Fixed::ZERO);
        assert!(unit.velocity.length() <= unit.speed + Fixed::from_num(0.001));
        // Position only changes on integrate.
        assert_eq!(unit.position, Vec2Fixed::from_ints(1000, 1000));
    }

    #[test]
    fn test_destination_without_path_is_planned() {
        let balance = balance();
        let mut grid = grid(&balance);
        let mut arena = arena_with(&[(1000, 1000)]);
        let (unit, others) = arena.split_mut(1).unwrap();
        let goal = Vec2Fixed::from_ints(1000, 1400);
        // As left by MoveUnit or a loaded frame.
        unit.destination = Some(goal);
        assert!(unit.movement_path.is_empty());

        let mut ctx = MovementContext::new(&balance, &mut grid, 0);
        ctx.move_unit(unit, goal, &others, balance.separation_radius);

        assert_eq!(unit.movement_path.last(), Some(&goal));
        assert!(unit.velocity.y > Fixed::ZERO);
    }

    #[test]
    fn test_crossing_routes_to_bridge() {
        let balance = balance();
        let mut grid = grid(&balance);
        let mut arena = arena_with(&[(2000, 1500)]);
        let (unit, others) = arena.split_mut(1).unwrap();

        let mut ctx = MovementContext::new(&balance, &mut grid, 0);
        ctx.move_unit(unit, Vec2Fixed::from_ints(2000, 3600), &others, balance.separation_radius);
        assert_eq!(unit.destination, Some(Vec2Fixed::from_ints(2600, 2550)));
    }

    #[test]
    fn test_small_destination_shift_keeps_path() {
        let balance = balance();
        let mut grid = grid(&balance);
        let mut arena = arena_with(&[(1000, 1000)]);
        let (unit, others) = arena.split_mut(1).unwrap();

        let mut ctx = MovementContext::new(&balance, &mut grid, 0);
        ctx.move_unit(unit, Vec2Fixed::from_ints(1000, 1400), &others, balance.separation_radius);
        let planned = unit.movement_path.clone();

        ctx.frame = 1;
        ctx.move_unit(unit, Vec2Fixed::from_ints(1005, 1400), &others, balance.separation_radius);
        assert_eq!(unit.movement_path, planned);
        assert_eq!(unit.last_replan_frame, 0);
    }

    #[test]
    fn test_blocked_goal_without_path_heads_straight() {
        let balance = balance();
        let mut grid = grid(&balance);
        grid.set_walkable_world(Vec2Fixed::from_ints(1000, 1400), false);
        let mut arena = arena_with(&[(1000, 1000)]);
        let (unit, others) = arena.split_mut(1).unwrap();

        let mut ctx = MovementContext::new(&balance, &mut grid, 0);
        ctx.move_unit(unit, Vec2Fixed::from_ints(1000, 1400), &others, balance.separation_radius);
        assert_eq!(unit.movement_path, vec![Vec2Fixed::from_ints(1000, 1400)]);
    }

    #[test]
    fn test_arrival_does_not_overshoot() {
        let balance = balance();
        let mut grid = grid(&balance);
        let mut arena = arena_with(&[(1000, 1000)]);
        let target = Vec2Fixed::from_ints(1000, 1002);
        {
            let (unit, others) = arena.split_mut(1).unwrap();
            let mut ctx = MovementContext::new(&balance, &mut grid, 0);
            ctx.move_unit(unit, target, &others, balance.separation_radius);
        }
        let unit = arena.get_mut(1).unwrap();
        integrate(unit, &balance.map);
        assert_eq!(unit.position, target);
    }

    #[test]
    fn test_integrate_keeps_ground_units_out_of_water() {
        let balance = balance();
        let map = &balance.map;
        let mut unit = Unit::new(1, Faction::Friendly, Vec2Fixed::from_ints(1600, 2398), spec(10));
        unit.velocity = Vec2Fixed::from_ints(3, 4);
        integrate(&mut unit, map);
        assert_eq!(unit.position, Vec2Fixed::from_ints(1603, 2398));

        let mut flyer = Unit::new(2, Faction::Friendly, Vec2Fixed::from_ints(1600, 2398), spec(10));
        flyer.layer = MovementLayer::Air;
        flyer.velocity = Vec2Fixed::from_ints(0, 4);
        integrate(&mut flyer, map);
        assert_eq!(flyer.position, Vec2Fixed::from_ints(1600, 2402));
    }

    #[test]
    fn test_integrate_turns_toward_velocity() {
        let balance = balance();
        let mut unit = Unit::new(1, Faction::Friendly, Vec2Fixed::from_ints(100, 100), spec(10));
        unit.velocity = Vec2Fixed::from_ints(4, 0);
        let before = unit.forward;
        integrate(&mut unit, &balance.map);
        assert_ne!(unit.forward, before);
        assert!(unit.forward.x > Fixed::ZERO);
    }

    #[test]
    fn test_collisions_pushed_apart() {
        let balance = balance();
        let mut arena = arena_with(&[(1000, 1000), (1010, 1000)]);
        let passes = resolve_collisions(&mut arena, &balance);
        assert!(passes >= 1);

        let a = arena.get(1).unwrap().position;
        let b = arena.get(2).unwrap().position;
        assert!(a.x < Fixed::from_num(1000));
        assert!(b.x > Fixed::from_num(1010));
        assert_eq!(a.y, b.y);
    }

    #[test]
    fn test_coincident_units_separate_deterministically() {
        let balance = balance();
        let mut first = arena_with(&[(1000, 1000), (1000, 1000)]);
        let mut second = first.clone();
        resolve_collisions(&mut first, &balance);
        resolve_collisions(&mut second, &balance);
        assert_eq!(first, second);
        assert_ne!(first.get(1).unwrap().position, first.get(2).unwrap().position);
    }

    #[test]
    fn test_no_overlap_no_passes() {
        let balance = balance();
        let mut arena = arena_with(&[(1000, 1000), (1200, 1000)]);
        assert_eq!(resolve_collisions(&mut arena, &balance), 0);
    }
}
