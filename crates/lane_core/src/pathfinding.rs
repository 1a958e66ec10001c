//! Grid-based pathfinding using the A* algorithm.
//!
//! All costs are integers (10 per orthogonal step, 14 per diagonal step)
//! and the open set is ordered by `(f, h, y, x)`, so the chosen path only
//! depends on the grid contents and never on insertion history.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use crate::grid::PathfindingGrid;
use crate::math::Vec2Fixed;

/// Orthogonal step cost.
pub const ORTHOGONAL_COST: u32 = 10;

/// Diagonal step cost (√2 scaled by 10).
pub const DIAGONAL_COST: u32 = 14;

/// Direction offsets for 8-directional movement.
const DIRECTIONS: [(i32, i32); 8] = [
    (1, 0),   // East
    (1, 1),   // Northeast
    (0, 1),   // North
    (-1, 1),  // Northwest
    (-1, 0),  // West
    (-1, -1), // Southwest
    (0, -1),  // South
    (1, -1),  // Southeast
];

/// Counters from one search.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SearchStats {
    /// Nodes popped from the open set and expanded.
    pub nodes_expanded: u32,
}

/// Octile distance heuristic in step-cost units.
#[inline]
fn octile_heuristic(x1: i32, y1: i32, x2: i32, y2: i32) -> u32 {
    let dx = x1.abs_diff(x2);
    let dy = y1.abs_diff(y2);
    DIAGONAL_COST * dx.min(dy) + ORTHOGONAL_COST * (dx.max(dy) - dx.min(dy))
}

/// A diagonal step is only allowed when both orthogonal cells it passes
/// between are walkable.
#[inline]
fn is_diagonal_valid(grid: &PathfindingGrid, x: i32, y: i32, dx: i32, dy: i32) -> bool {
    if dx != 0 && dy != 0 {
        grid.is_walkable(x + dx, y) && grid.is_walkable(x, y + dy)
    } else {
        true
    }
}

/// Find a path between two world positions.
///
/// Returns cell-centre waypoints from the start cell to the goal cell
/// inclusive, or `None` when either endpoint is outside the grid or
/// blocked, or the goal is unreachable.
pub fn find_path(
    grid: &mut PathfindingGrid,
    start: Vec2Fixed,
    goal: Vec2Fixed,
) -> Option<Vec<Vec2Fixed>> {
    find_path_with_stats(grid, start, goal).0
}

/// [`find_path`] that also reports search counters.
pub fn find_path_with_stats(
    grid: &mut PathfindingGrid,
    start: Vec2Fixed,
    goal: Vec2Fixed,
) -> (Option<Vec<Vec2Fixed>>, SearchStats) {
    let mut stats = SearchStats::default();

    let (Some((start_x, start_y)), Some((goal_x, goal_y))) =
        (grid.cell_coords(start), grid.cell_coords(goal))
    else {
        return (None, stats);
    };
    if !grid.is_walkable(start_x, start_y) || !grid.is_walkable(goal_x, goal_y) {
        return (None, stats);
    }

    if (start_x, start_y) == (goal_x, goal_y) {
        let waypoint = grid.node(start_x, start_y).map(|n| n.world_position);
        return (waypoint.map(|w| vec![w]), stats);
    }

    grid.reset_search_state();
    let width = grid.width() as usize;
    let mut closed = vec![false; width * grid.height() as usize];
    let mut open: BinaryHeap<Reverse<(u32, u32, i32, i32)>> = BinaryHeap::new();

    let start_h = octile_heuristic(start_x, start_y, goal_x, goal_y);
    if let Some(node) = grid.node_mut(start_x, start_y) {
        node.g_cost = 0;
        node.h_cost = start_h;
    }
    open.push(Reverse((start_h, start_h, start_y, start_x)));

    while let Some(Reverse((_, _, y, x))) = open.pop() {
        let index = (y as usize) * width + (x as usize);
        if closed[index] {
            continue;
        }
        closed[index] = true;
        stats.nodes_expanded += 1;

        if (x, y) == (goal_x, goal_y) {
            return (Some(reconstruct_path(grid, goal_x, goal_y)), stats);
        }

        let current_g = grid.node(x, y).map_or(u32::MAX, |n| n.g_cost);

        for &(dx, dy) in &DIRECTIONS {
            let nx = x + dx;
            let ny = y + dy;
            if !grid.is_walkable(nx, ny) {
                continue;
            }
            if closed[(ny as usize) * width + (nx as usize)] {
                continue;
            }
            if !is_diagonal_valid(grid, x, y, dx, dy) {
                continue;
            }

            let step = if dx != 0 && dy != 0 {
                DIAGONAL_COST
            } else {
                ORTHOGONAL_COST
            };
            let tentative_g = current_g.saturating_add(step);
            let h = octile_heuristic(nx, ny, goal_x, goal_y);

            let Some(neighbor) = grid.node_mut(nx, ny) else {
                continue;
            };
            if tentative_g < neighbor.g_cost {
                neighbor.g_cost = tentative_g;
                neighbor.h_cost = h;
                neighbor.parent = Some((x, y));
                open.push(Reverse((tentative_g + h, h, ny, nx)));
            }
        }
    }

    (None, stats)
}

/// Walk parent links back from the goal.
fn reconstruct_path(grid: &PathfindingGrid, goal_x: i32, goal_y: i32) -> Vec<Vec2Fixed> {
    let mut path = Vec::new();
    let mut current = Some((goal_x, goal_y));

    while let Some((x, y)) = current {
        let Some(node) = grid.node(x, y) else {
            break;
        };
        path.push(node.world_position);
        current = node.parent;
    }

    path.reverse();
    path
}
