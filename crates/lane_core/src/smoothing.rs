//! Line-of-sight path smoothing.

use crate::config::GameBalance;
use crate::grid::PathfindingGrid;
use crate::math::Vec2Fixed;

/// Removes waypoints that can be skipped in a straight line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PathSmoother {
    /// When false, [`smooth`](Self::smooth) returns the input unchanged.
    pub enabled: bool,
    /// Furthest waypoint (relative index) tried in one hop.
    pub max_skip: usize,
}

impl PathSmoother {
    /// Smoother configured from the balance.
    #[must_use]
    pub fn from_balance(balance: &GameBalance) -> Self {
        Self {
            enabled: balance.path_smoothing_enabled,
            max_skip: balance.path_smoothing_max_skip as usize,
        }
    }

    /// Smooth `path` against `grid`.
    ///
    /// The result never has more waypoints than the input, keeps both
    /// endpoints, and every consecutive pair has line of sight.
    #[must_use]
    pub fn smooth(&self, grid: &PathfindingGrid, path: Vec<Vec2Fixed>) -> Vec<Vec2Fixed> {
        if !self.enabled || path.len() <= 2 {
            return path;
        }

        let last = path.len() - 1;
        let mut smoothed = Vec::with_capacity(path.len());
        smoothed.push(path[0]);

        let mut current = 0;
        while current < last {
            let furthest = (current + self.max_skip).min(last);
            let next = (current + 2..=furthest)
                .rev()
                .find(|&i| has_line_of_sight(grid, path[current], path[i]))
                .unwrap_or(current + 1);

            smoothed.push(path[next]);
            current = next;
        }

        smoothed
    }
}

/// Check if there's a clear line of sight between two world positions.
///
/// Uses Bresenham stepping through grid cells. Every visited cell must be
/// walkable, and a diagonal step additionally needs both orthogonal cells it
/// passes between.
#[must_use]
pub fn has_line_of_sight(grid: &PathfindingGrid, start: Vec2Fixed, end: Vec2Fixed) -> bool {
    let Some((x0, y0)) = grid.cell_coords(start) else {
        return false;
    };
    let Some((x1, y1)) = grid.cell_coords(end) else {
        return false;
    };

    let dx = (x1 - x0).abs();
    let dy = (y1 - y0).abs();
    let sx = if x0 < x1 { 1 } else { -1 };
    let sy = if y0 < y1 { 1 } else { -1 };
    let mut err = dx - dy;

    let mut x = x0;
    let mut y = y0;

    loop {
        if !grid.is_walkable(x, y) {
            return false;
        }

        if x == x1 && y == y1 {
            break;
        }

        let e2 = 2 * err;

        // Diagonal step: no squeezing between two blocked corners.
        if e2 > -dy && e2 < dx && (!grid.is_walkable(x + sx, y) || !grid.is_walkable(x, y + sy)) {
            return false;
        }

        if e2 > -dy {
            err -= dy;
            x += sx;
        }
        if e2 < dx {
            err += dx;
            y += sy;
        }
    }

    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::Fixed;
    use crate::pathfinding::find_path;

    fn vec2(x: i32, y: i32) -> Vec2Fixed {
        Vec2Fixed::from_ints(x, y)
    }

    fn grid() -> PathfindingGrid {
        PathfindingGrid::new(Fixed::from_num(100), Fixed::from_num(100), Fixed::from_num(10))
    }

    fn smoother() -> PathSmoother {
        PathSmoother {
            enabled: true,
            max_skip: 10,
        }
    }

    #[test]
    fn test_open_grid_collapses_to_endpoints() {
        let mut grid = grid();
        let path = find_path(&mut grid, vec2(5, 5), vec2(95, 35)).unwrap();
        let smoothed = smoother().smooth(&grid, path.clone());
        assert_eq!(smoothed.len(), 2);
        assert_eq!(smoothed[0], path[0]);
        assert_eq!(smoothed[1], *path.last().unwrap());
    }

    #[test]
    fn test_disabled_or_short_paths_unchanged() {
        let grid = grid();
        let path = vec![vec2(5, 5), vec2(15, 5), vec2(25, 5)];
        let off = PathSmoother {
            enabled: false,
            max_skip: 10,
        };
        assert_eq!(off.smooth(&grid, path.clone()), path);
        let short = vec![vec2(5, 5), vec2(95, 95)];
        assert_eq!(smoother().smooth(&grid, short.clone()), short);
    }

    #[test]
    fn test_max_skip_limits_hops() {
        let grid = grid();
        let path: Vec<Vec2Fixed> = (0..10).map(|x| vec2(x * 10 + 5, 5)).collect();
        let limited = PathSmoother {
            enabled: true,
            max_skip: 3,
        };
        let smoothed = limited.smooth(&grid, path);
        assert_eq!(smoothed, vec![vec2(5, 5), vec2(35, 5), vec2(65, 5), vec2(95, 5)]);
    }

    #[test]
    fn test_smoothed_segments_keep_line_of_sight() {
        let mut grid = grid();
        for y in 0..8 {
            grid.set_walkable(4, y, false);
        }
        let path = find_path(&mut grid, vec2(5, 5), vec2(95, 5)).unwrap();
        let smoothed = smoother().smooth(&grid, path.clone());
        assert!(smoothed.len() <= path.len());
        assert_eq!(smoothed.first(), path.first());
        assert_eq!(smoothed.last(), path.last());
        for pair in smoothed.windows(2) {
            assert!(has_line_of_sight(&grid, pair[0], pair[1]));
        }
    }

    #[test]
    fn test_line_of_sight_rejects_corner_squeeze() {
        let mut grid = grid();
        grid.set_walkable(1, 0, false);
        assert!(!has_line_of_sight(&grid, vec2(5, 5), vec2(15, 15)));
        assert!(has_line_of_sight(&grid, vec2(5, 15), vec2(95, 15)));
        assert!(!has_line_of_sight(&grid, vec2(5, 5), vec2(-5, 5)));
    }
}
