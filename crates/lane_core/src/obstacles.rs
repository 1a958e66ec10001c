//! Static obstacle providers and the dynamic congestion tracker.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::grid::{ObstacleCircle, ObstacleProvider, ObstacleRect, PathfindingGrid};
use crate::map::MapLayout;
use crate::math::{Fixed, Vec2Fixed};
use crate::tower::Tower;
use crate::unit::{MovementLayer, UnitArena};

/// Towers block a circle of `radius + padding`. Destroyed towers stay as
/// rubble.
pub struct TowerObstacleProvider<'a> {
    towers: &'a [Tower],
    padding: Fixed,
}

impl<'a> TowerObstacleProvider<'a> {
    /// Provider over `towers`.
    #[must_use]
    pub fn new(towers: &'a [Tower], padding: Fixed) -> Self {
        Self { towers, padding }
    }
}

impl ObstacleProvider for TowerObstacleProvider<'_> {
    fn unwalkable_circles(&self) -> Vec<ObstacleCircle> {
        self.towers
            .iter()
            .map(|t| ObstacleCircle {
                center: t.position,
                radius: t.radius + self.padding,
            })
            .collect()
    }
}

/// The open river on either side of and between the bridges.
pub struct TerrainObstacleProvider<'a> {
    map: &'a MapLayout,
    margin: Fixed,
}

impl<'a> TerrainObstacleProvider<'a> {
    /// Provider for `map`, with rectangles shrunk by `margin`.
    #[must_use]
    pub fn new(map: &'a MapLayout, margin: Fixed) -> Self {
        Self { map, margin }
    }
}

impl ObstacleProvider for TerrainObstacleProvider<'_> {
    fn unwalkable_rects(&self) -> Vec<ObstacleRect> {
        let map = self.map;
        let y_min = map.river_y_min + self.margin;
        let y_max = map.river_y_max - self.margin;
        vec![
            ObstacleRect {
                min: Vec2Fixed::new(Fixed::ZERO, y_min),
                max: Vec2Fixed::new(map.left_bridge_x_min - self.margin, y_max),
            },
            ObstacleRect {
                min: Vec2Fixed::new(map.left_bridge_x_max + self.margin, y_min),
                max: Vec2Fixed::new(map.right_bridge_x_min - self.margin, y_max),
            },
            ObstacleRect {
                min: Vec2Fixed::new(map.right_bridge_x_max + self.margin, y_min),
                max: Vec2Fixed::new(map.width, y_max),
            },
        ]
    }
}

/// Marks cells crowded by ground units as temporarily blocked.
///
/// The first update snapshots every blocked cell as static; static cells are
/// never unblocked. Each update undoes the previous dynamic blocks and
/// recomputes them from scratch, so calling it twice with the same units
/// leaves the grid unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DynamicObstacleSystem {
    density_threshold: u32,
    static_recorded: bool,
    static_blocked: BTreeSet<(i32, i32)>,
    dynamic_blocked: BTreeSet<(i32, i32)>,
}

impl DynamicObstacleSystem {
    /// Tracker blocking cells with at least `density_threshold` ground units.
    #[must_use]
    pub fn new(density_threshold: u32) -> Self {
        Self {
            density_threshold: density_threshold.max(1),
            ..Self::default()
        }
    }

    /// Cells currently blocked by congestion.
    #[must_use]
    pub fn dynamic_cells(&self) -> &BTreeSet<(i32, i32)> {
        &self.dynamic_blocked
    }

    /// Cells recorded as statically blocked.
    #[must_use]
    pub fn static_cells(&self) -> &BTreeSet<(i32, i32)> {
        &self.static_blocked
    }

    /// Recompute congestion blocks from the living ground units.
    pub fn update(&mut self, grid: &mut PathfindingGrid, units: &UnitArena) {
        if !self.static_recorded {
            self.static_blocked = grid.blocked_cells().into_iter().collect();
            self.static_recorded = true;
        }

        self.clear_dynamic_blocks(grid);

        let mut counts: BTreeMap<(i32, i32), u32> = BTreeMap::new();
        for unit in units.iter() {
            if unit.is_dead() || unit.layer != MovementLayer::Ground {
                continue;
            }
            if let Some(cell) = grid.cell_coords(unit.position) {
                *counts.entry(cell).or_insert(0) += 1;
            }
        }

        for (cell, count) in counts {
            if count >= self.density_threshold && !self.static_blocked.contains(&cell) {
                grid.set_walkable(cell.0, cell.1, false);
                self.dynamic_blocked.insert(cell);
            }
        }
    }

    fn clear_dynamic_blocks(&mut self, grid: &mut PathfindingGrid) {
        for &(x, y) in &self.dynamic_blocked {
            if !self.static_blocked.contains(&(x, y)) {
                grid.set_walkable(x, y, true);
            }
        }
        self.dynamic_blocked.clear();
    }
}
