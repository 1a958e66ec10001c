//! Local steering: predictive avoidance and separation.
//!
//! Avoidance looks a few frames ahead for allies on the same layer that the
//! mover is about to run into. When it finds one it lays a short segmented
//! detour (out to the side, along, back in) and steers toward the first
//! unreached detour waypoint. If no detour can be laid, it sweeps rotated
//! headings for a clear one, and as a last resort steers straight away from
//! the closest risk.

use crate::config::GameBalance;
use crate::math::{fixed_sqrt, Fixed, Vec2Fixed, SMALL_NUMBER};
use crate::unit::{Unit, UnitId};

/// Lower bound on speeds and radii used as divisors.
const MIN_DIVISOR: Fixed = Fixed::from_bits(4_294_967);

/// Result of one avoidance query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AvoidanceOutcome {
    /// Weighted steering contribution (zero when nothing is in the way).
    pub steering: Vec2Fixed,
    /// Point the avoidance is steering toward.
    pub avoidance_target: Option<Vec2Fixed>,
    /// Whether the mover is deviating from its desired heading.
    pub is_detouring: bool,
    /// Ally being avoided.
    pub threat: Option<UnitId>,
}

#[derive(Debug, Clone, Copy)]
struct CollisionRisk {
    threat: UnitId,
    relative_position: Vec2Fixed,
    distance: Fixed,
    combined_radius: Fixed,
}

/// First time two moving circles touch.
///
/// Radii are scaled by `scale`. Returns `(time, distance_at_time)` when the
/// circles overlap now (nearly equal velocities) or will touch at some
/// `time >= 0`.
#[must_use]
pub fn first_collision(
    mover_position: Vec2Fixed,
    mover_velocity: Vec2Fixed,
    mover_radius: Fixed,
    other_position: Vec2Fixed,
    other_velocity: Vec2Fixed,
    other_radius: Fixed,
    scale: Fixed,
) -> Option<(Fixed, Fixed)> {
    let combined = (mover_radius + other_radius) * scale;
    let relative_position = other_position - mover_position;
    let relative_velocity = other_velocity - mover_velocity;
    let relative_speed_sq = relative_velocity.length_squared();

    if relative_speed_sq < SMALL_NUMBER {
        let distance = relative_position.length();
        return (distance < combined).then_some((Fixed::ZERO, distance));
    }

    let a = relative_speed_sq;
    let b = Fixed::from_num(2) * relative_position.dot(relative_velocity);
    let c = relative_position.length_squared() - combined * combined;
    let discriminant = b * b - Fixed::from_num(4) * a * c;
    if discriminant < Fixed::ZERO {
        return None;
    }

    let root = fixed_sqrt(discriminant);
    let two_a = Fixed::from_num(2) * a;
    let t1 = (-b - root) / two_a;
    let t2 = (-b + root) / two_a;
    let t = if t1 >= Fixed::ZERO { t1 } else { t2 };
    if t < Fixed::ZERO {
        return None;
    }

    let distance = (relative_position + relative_velocity * t).length();
    Some((t, distance))
}

/// Separation push away from nearby living allies.
///
/// Sums `delta / dist²` over allies closer than `radius`; allies at the
/// exact same position are skipped.
pub fn separation<'a>(
    unit: &Unit,
    others: impl IntoIterator<Item = &'a Unit>,
    radius: Fixed,
) -> Vec2Fixed {
    let radius_sq = radius * radius;
    let small_sq = SMALL_NUMBER * SMALL_NUMBER;
    let mut push = Vec2Fixed::ZERO;

    for other in others {
        if other.id == unit.id || other.is_dead() || other.faction != unit.faction {
            continue;
        }
        let delta = unit.position - other.position;
        let dist_sq = delta.length_squared();
        if dist_sq <= small_sq || dist_sq >= radius_sq {
            continue;
        }
        push += delta / dist_sq;
    }

    push
}

/// Steering that keeps `mover` clear of allies on its layer.
///
/// `desired` is the heading the mover wants (need not be normalized). The
/// mover's detour path is rebuilt when it ran out or the primary threat
/// changed, and cleared when nothing is in the way.
pub fn predictive_avoidance<'a>(
    balance: &GameBalance,
    mover: &mut Unit,
    others: impl IntoIterator<Item = &'a Unit>,
    desired: Vec2Fixed,
) -> AvoidanceOutcome {
    let scale = balance.collision_radius_scale;
    let mover_radius = mover.radius * scale;
    let speed = mover.effective_speed();
    let min_speed = speed.max(MIN_DIVISOR);
    let lookahead = balance.avoidance_max_lookahead;

    let base_direction = if desired.length_squared() > SMALL_NUMBER {
        desired.normalize()
    } else if mover.velocity.length_squared() > SMALL_NUMBER {
        mover.velocity.normalize()
    } else {
        mover.forward
    };

    let risks = collect_risks(mover, others, base_direction, scale, min_speed, speed, lookahead);

    let Some(primary) = risks
        .iter()
        .copied()
        .reduce(|best, risk| if risk.distance < best.distance { risk } else { best })
    else {
        mover.clear_avoidance_path();
        return AvoidanceOutcome::default();
    };

    let weight = (primary.distance / (mover_radius + MIN_DIVISOR))
        .clamp(Fixed::ONE, Fixed::from_num(3));

    // Segmented detour.
    let exhausted = mover.avoidance_path_index >= mover.avoidance_path.len();
    if exhausted || mover.avoidance_threat != Some(primary.threat) {
        let path = build_detour(balance, mover, base_direction, &primary);
        mover.set_avoidance_path(path);
        mover.avoidance_threat = Some(primary.threat);
    }
    if let Some(waypoint) = mover.next_avoidance_waypoint(balance.avoidance_waypoint_threshold) {
        return AvoidanceOutcome {
            steering: (waypoint - mover.position).safe_normalize() * weight,
            avoidance_target: Some(waypoint),
            is_detouring: true,
            threat: Some(primary.threat),
        };
    }

    // Sweep rotated headings for a clear one.
    let step = balance.avoidance_angle_step;
    for i in 0..=balance.max_avoidance_iterations {
        let offset = step * Fixed::from_num(i);
        let angles = [offset, -offset];
        let tried = if i == 0 { 1 } else { 2 };
        for &angle in &angles[..tried] {
            let candidate = base_direction.rotate(angle);
            if !is_direction_clear(candidate, &risks) {
                continue;
            }
            let is_detouring = angle.abs() > MIN_DIVISOR;
            let reach = primary.distance.max(Fixed::from_num(2) * mover_radius);
            return AvoidanceOutcome {
                steering: candidate * weight,
                avoidance_target: is_detouring.then(|| mover.position + candidate * reach),
                is_detouring,
                threat: is_detouring.then_some(primary.threat),
            };
        }
    }

    // Nothing clear: back away from the closest risk.
    let away = (-primary.relative_position).safe_normalize();
    let reach = primary.distance.max(Fixed::from_num(2) * mover_radius);
    AvoidanceOutcome {
        steering: away * weight,
        avoidance_target: Some(mover.position + away * reach),
        is_detouring: true,
        threat: Some(primary.threat),
    }
}

fn collect_risks<'a>(
    mover: &Unit,
    others: impl IntoIterator<Item = &'a Unit>,
    base_direction: Vec2Fixed,
    scale: Fixed,
    min_speed: Fixed,
    speed: Fixed,
    lookahead: Fixed,
) -> Vec<CollisionRisk> {
    let mover_radius = mover.radius * scale;
    let mut risks = Vec::new();

    for other in others {
        if other.id == mover.id
            || other.is_dead()
            || other.faction != mover.faction
            || other.layer != mover.layer
        {
            continue;
        }

        let combined = mover_radius + other.radius * scale;
        let relative_position = other.position - mover.position;
        let relative_velocity = other.velocity - mover.velocity;

        // Out of reach within the lookahead; also keeps the quadratic small.
        let reach = (relative_velocity.length() + speed) * lookahead
            + Fixed::from_num(2) * combined;
        if relative_position.length_squared() > reach * reach {
            continue;
        }

        let window = (Fixed::from_num(2) * combined / min_speed).min(lookahead);

        if let Some((t, _)) = first_collision(
            mover.position,
            mover.velocity,
            mover.radius,
            other.position,
            other.velocity,
            other.radius,
            scale,
        ) {
            if t <= window {
                let at_collision = (other.position + other.velocity * t)
                    - (mover.position + mover.velocity * t);
                let distance = at_collision.length();
                if distance > SMALL_NUMBER {
                    risks.push(CollisionRisk {
                        threat: other.id,
                        relative_position: at_collision,
                        distance,
                        combined_radius: combined,
                    });
                    continue;
                }
            }
        }

        let relative_speed_sq = relative_velocity.length_squared();
        let t_closest = if relative_speed_sq < SMALL_NUMBER {
            Fixed::ZERO
        } else {
            (-relative_position.dot(relative_velocity) / relative_speed_sq).max(Fixed::ZERO)
        };
        let future_distance = (relative_position + relative_velocity * t_closest).length();
        if future_distance < combined && t_closest <= window && future_distance > SMALL_NUMBER {
            risks.push(CollisionRisk {
                threat: other.id,
                relative_position,
                distance: relative_position.length(),
                combined_radius: combined,
            });
            continue;
        }

        let projection = relative_position.dot(base_direction);
        if projection > Fixed::ZERO && projection <= speed * lookahead + combined {
            let lateral = (relative_position - base_direction * projection).length();
            if lateral < combined {
                risks.push(CollisionRisk {
                    threat: other.id,
                    relative_position,
                    distance: projection,
                    combined_radius: combined,
                });
            }
        }
    }

    risks
}

/// Start point ahead, then lateral / parallel / back legs. The lateral side
/// is the one away from the threat.
fn build_detour(
    balance: &GameBalance,
    mover: &Unit,
    forward: Vec2Fixed,
    primary: &CollisionRisk,
) -> Vec<Vec2Fixed> {
    let perpendicular = forward.perp();
    let side = if perpendicular.dot(primary.relative_position) > Fixed::ZERO {
        -Fixed::ONE
    } else {
        Fixed::ONE
    };
    let lateral = perpendicular * side;

    let start = mover.position + forward * balance.avoidance_segment_start_distance.max(mover.radius);
    let lateral_distance = primary.combined_radius + balance.avoidance_lateral_padding;
    let parallel_distance = primary.distance.max(Fixed::from_num(2) * mover.radius)
        * balance.avoidance_parallel_distance_multiplier;

    let mut path = Vec::with_capacity(balance.avoidance_segment_count as usize + 1);
    path.push(start);
    let mut current = start;
    for i in 0..balance.avoidance_segment_count {
        match i % 3 {
            0 => current += lateral * lateral_distance,
            1 => current += forward * parallel_distance,
            _ => current -= lateral * lateral_distance,
        }
        path.push(balance.map.clamp_to_bounds(current));
    }
    path
}

fn is_direction_clear(direction: Vec2Fixed, risks: &[CollisionRisk]) -> bool {
    risks.iter().all(|risk| {
        let projection = risk.relative_position.dot(direction);
        if projection < Fixed::ZERO || projection > risk.distance {
            return true;
        }
        let lateral = (risk.relative_position - direction * projection).length();
        lateral >= risk.combined_radius
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::unit::tests::spec;
    use crate::unit::Faction;

    fn unit(id: UnitId, x: i32, y: i32) -> Unit {
        Unit::new(id, Faction::Friendly, Vec2Fixed::from_ints(x, y), spec(10))
    }

    #[test]
    fn test_first_collision_head_on() {
        let scale = Fixed::ONE;
        let hit = first_collision(
            Vec2Fixed::ZERO,
            Vec2Fixed::from_ints(1, 0),
            Fixed::from_num(5),
            Vec2Fixed::from_ints(30, 0),
            Vec2Fixed::from_ints(-1, 0),
            Fixed::from_num(5),
            scale,
        );
        let (t, distance) = hit.unwrap();
        assert_eq!(t, Fixed::from_num(10));
        assert!((distance - Fixed::from_num(10)).abs() < Fixed::from_num(0.001));
    }

    #[test]
    fn test_first_collision_static_pairs() {
        let scale = Fixed::ONE;
        let overlapping = first_collision(
            Vec2Fixed::ZERO,
            Vec2Fixed::ZERO,
            Fixed::from_num(5),
            Vec2Fixed::from_ints(8, 0),
            Vec2Fixed::ZERO,
            Fixed::from_num(5),
            scale,
        );
        assert_eq!(overlapping.map(|(t, _)| t), Some(Fixed::ZERO));

        let apart = first_collision(
            Vec2Fixed::ZERO,
            Vec2Fixed::ZERO,
            Fixed::from_num(5),
            Vec2Fixed::from_ints(20, 0),
            Vec2Fixed::ZERO,
            Fixed::from_num(5),
            scale,
        );
        assert!(apart.is_none());
    }

    #[test]
    fn test_first_collision_diverging_misses() {
        let hit = first_collision(
            Vec2Fixed::ZERO,
            Vec2Fixed::from_ints(-1, 0),
            Fixed::from_num(5),
            Vec2Fixed::from_ints(30, 0),
            Vec2Fixed::from_ints(1, 0),
            Fixed::from_num(5),
            Fixed::ONE,
        );
        assert!(hit.is_none());
    }

    #[test]
    fn test_separation_pushes_away_and_skips_overlap() {
        let me = unit(1, 100, 100);
        let left = unit(2, 90, 100);
        let same_spot = unit(3, 100, 100);
        let far = unit(4, 500, 100);
        let push = separation(&me, [&left, &same_spot, &far], Fixed::from_num(80));
        assert!(push.x > Fixed::ZERO);
        assert_eq!(push.y, Fixed::ZERO);
        assert_eq!(push.x, Fixed::ONE / Fixed::from_num(10));
    }

    #[test]
    fn test_separation_ignores_enemies_and_self() {
        let me = unit(1, 100, 100);
        let mut enemy = unit(2, 90, 100);
        enemy.faction = Faction::Enemy;
        assert_eq!(separation(&me, [&me, &enemy], Fixed::from_num(80)), Vec2Fixed::ZERO);
    }

    #[test]
    fn test_no_risk_clears_detour() {
        let balance = GameBalance::default();
        let mut mover = unit(1, 100, 100);
        mover.set_avoidance_path(vec![Vec2Fixed::from_ints(200, 200)]);
        let far = unit(2, 1000, 1000);
        let outcome = predictive_avoidance(&balance, &mut mover, [&far], Vec2Fixed::from_ints(0, 1));
        assert_eq!(outcome, AvoidanceOutcome::default());
        assert!(mover.avoidance_path.is_empty());
    }

    #[test]
    fn test_blocked_heading_builds_detour_away_from_threat() {
        let balance = GameBalance::default();
        let mut mover = unit(1, 1000, 1000);
        mover.velocity = Vec2Fixed::from_ints(0, 4);
        // Stationary ally straight ahead, slightly to the right.
        let blocker = unit(2, 1005, 1030);

        let outcome =
            predictive_avoidance(&balance, &mut mover, [&blocker], Vec2Fixed::from_ints(0, 1));
        assert!(outcome.is_detouring);
        assert_eq!(outcome.threat, Some(2));
        assert_eq!(mover.avoidance_path.len(), 4);
        // First lateral leg goes left, away from the blocker.
        assert!(mover.avoidance_path[1].x < mover.avoidance_path[0].x);
        assert!(outcome.steering.length() >= Fixed::ONE - Fixed::from_num(0.01));
    }

    #[test]
    fn test_detour_kept_while_threat_unchanged() {
        let balance = GameBalance::default();
        let mut mover = unit(1, 1000, 1000);
        mover.velocity = Vec2Fixed::from_ints(0, 4);
        let blocker = unit(2, 1005, 1030);

        predictive_avoidance(&balance, &mut mover, [&blocker], Vec2Fixed::from_ints(0, 1));
        let first = mover.avoidance_path.clone();
        mover.position += Vec2Fixed::from_ints(0, 2);
        predictive_avoidance(&balance, &mut mover, [&blocker], Vec2Fixed::from_ints(0, 1));
        assert_eq!(mover.avoidance_path, first);
    }

    #[test]
    fn test_other_layers_and_dead_units_ignored() {
        let balance = GameBalance::default();
        let mut mover = unit(1, 1000, 1000);
        mover.velocity = Vec2Fixed::from_ints(0, 4);
        let mut flyer = unit(2, 1000, 1030);
        flyer.layer = crate::unit::MovementLayer::Air;
        let mut corpse = unit(3, 1000, 1020);
        corpse.set_hp(0);

        let outcome = predictive_avoidance(
            &balance,
            &mut mover,
            [&flyer, &corpse],
            Vec2Fixed::from_ints(0, 1),
        );
        assert!(!outcome.is_detouring);
        assert_eq!(outcome.steering, Vec2Fixed::ZERO);
    }

    #[test]
    fn test_direction_clear_check() {
        let risk = CollisionRisk {
            threat: 2,
            relative_position: Vec2Fixed::from_ints(0, 30),
            distance: Fixed::from_num(30),
            combined_radius: Fixed::from_num(20),
        };
        assert!(!is_direction_clear(Vec2Fixed::from_ints(0, 1), &[risk]));
        assert!(is_direction_clear(Vec2Fixed::from_ints(1, 0), &[risk]));
        assert!(is_direction_clear(Vec2Fixed::from_ints(0, -1), &[risk]));
    }
}
