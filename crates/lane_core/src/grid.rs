//! Uniform pathfinding grid over the arena.
//!
//! The grid owns its [`PathNode`]s, including the per-search A* bookkeeping
//! (`g_cost`, `h_cost`, `parent`), which is reset at the start of every
//! search. Out-of-range queries return `None` or `false`; nothing here
//! fails.

use serde::{Deserialize, Serialize};

use crate::math::{fixed_serde, Fixed, Vec2Fixed};

/// One grid cell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathNode {
    /// Column.
    pub x: i32,
    /// Row.
    pub y: i32,
    /// Centre of the cell in world units.
    pub world_position: Vec2Fixed,
    /// Whether units may stand here.
    pub walkable: bool,
    /// Cost from the search start (`u32::MAX` when unvisited).
    pub g_cost: u32,
    /// Heuristic cost to the goal.
    pub h_cost: u32,
    /// Predecessor on the best known path.
    pub parent: Option<(i32, i32)>,
}

impl PathNode {
    fn new(x: i32, y: i32, world_position: Vec2Fixed) -> Self {
        Self {
            x,
            y,
            world_position,
            walkable: true,
            g_cost: u32::MAX,
            h_cost: 0,
            parent: None,
        }
    }

    /// `g + h`.
    #[must_use]
    pub fn f_cost(&self) -> u32 {
        self.g_cost.saturating_add(self.h_cost)
    }

    /// Forget search state.
    pub fn reset_costs(&mut self) {
        self.g_cost = u32::MAX;
        self.h_cost = 0;
        self.parent = None;
    }
}

/// Axis-aligned blocked rectangle in world units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObstacleRect {
    /// Lower corner.
    pub min: Vec2Fixed,
    /// Upper corner.
    pub max: Vec2Fixed,
}

/// Blocked circle in world units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObstacleCircle {
    /// Centre.
    pub center: Vec2Fixed,
    /// Radius.
    pub radius: Fixed,
}

/// Source of static obstacles applied to the grid.
pub trait ObstacleProvider {
    /// Blocked rectangles.
    fn unwalkable_rects(&self) -> Vec<ObstacleRect> {
        Vec::new()
    }

    /// Blocked circles.
    fn unwalkable_circles(&self) -> Vec<ObstacleCircle> {
        Vec::new()
    }
}

/// Walkability grid with A* scratch state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathfindingGrid {
    width: i32,
    height: i32,
    #[serde(with = "fixed_serde")]
    cell_size: Fixed,
    nodes: Vec<PathNode>,
}

impl PathfindingGrid {
    /// Grid covering `map_width × map_height` with square cells of
    /// `cell_size`; partial cells at the far edges are dropped.
    #[must_use]
    pub fn new(map_width: Fixed, map_height: Fixed, cell_size: Fixed) -> Self {
        let (width, height) = if cell_size > Fixed::ZERO {
            (
                (map_width / cell_size).to_num::<i32>().max(0),
                (map_height / cell_size).to_num::<i32>().max(0),
            )
        } else {
            (0, 0)
        };

        let half = cell_size / Fixed::from_num(2);
        let mut nodes = Vec::with_capacity((width as usize) * (height as usize));
        for y in 0..height {
            for x in 0..width {
                let world = Vec2Fixed::new(
                    Fixed::from_num(x) * cell_size + half,
                    Fixed::from_num(y) * cell_size + half,
                );
                nodes.push(PathNode::new(x, y, world));
            }
        }

        Self {
            width,
            height,
            cell_size,
            nodes,
        }
    }

    /// Columns.
    #[must_use]
    pub const fn width(&self) -> i32 {
        self.width
    }

    /// Rows.
    #[must_use]
    pub const fn height(&self) -> i32 {
        self.height
    }

    /// Cell edge length in world units.
    #[must_use]
    pub const fn cell_size(&self) -> Fixed {
        self.cell_size
    }

    #[inline]
    fn index(&self, x: i32, y: i32) -> Option<usize> {
        if x >= 0 && x < self.width && y >= 0 && y < self.height {
            Some((y as usize) * (self.width as usize) + (x as usize))
        } else {
            None
        }
    }

    /// Cell coordinates of a world position.
    #[must_use]
    pub fn cell_coords(&self, pos: Vec2Fixed) -> Option<(i32, i32)> {
        if pos.x < Fixed::ZERO || pos.y < Fixed::ZERO || self.cell_size <= Fixed::ZERO {
            return None;
        }
        let x = (pos.x / self.cell_size).to_num::<i64>();
        let y = (pos.y / self.cell_size).to_num::<i64>();
        if x < i64::from(self.width) && y < i64::from(self.height) {
            Some((x as i32, y as i32))
        } else {
            None
        }
    }

    /// Cell containing a world position.
    #[must_use]
    pub fn cell_at(&self, pos: Vec2Fixed) -> Option<&PathNode> {
        let (x, y) = self.cell_coords(pos)?;
        self.node(x, y)
    }

    /// Cell by coordinates.
    #[must_use]
    pub fn node(&self, x: i32, y: i32) -> Option<&PathNode> {
        self.index(x, y).map(|i| &self.nodes[i])
    }

    /// Cell by coordinates, mutably.
    pub fn node_mut(&mut self, x: i32, y: i32) -> Option<&mut PathNode> {
        self.index(x, y).map(move |i| &mut self.nodes[i])
    }

    /// Whether a cell exists and is walkable.
    #[must_use]
    pub fn is_walkable(&self, x: i32, y: i32) -> bool {
        self.node(x, y).is_some_and(|n| n.walkable)
    }

    /// Set one cell; `false` when out of bounds.
    pub fn set_walkable(&mut self, x: i32, y: i32, walkable: bool) -> bool {
        match self.node_mut(x, y) {
            Some(node) => {
                node.walkable = walkable;
                true
            }
            None => false,
        }
    }

    /// Set the cell under a world position; `false` when out of bounds.
    pub fn set_walkable_world(&mut self, pos: Vec2Fixed, walkable: bool) -> bool {
        match self.cell_coords(pos) {
            Some((x, y)) => self.set_walkable(x, y, walkable),
            None => false,
        }
    }

    fn clamped_cell(&self, pos: Vec2Fixed) -> (i32, i32) {
        let to_cell = |v: Fixed, max: i32| -> i32 {
            let cell = (v / self.cell_size).to_num::<i64>();
            cell.clamp(0, i64::from((max - 1).max(0))) as i32
        };
        (to_cell(pos.x, self.width), to_cell(pos.y, self.height))
    }

    /// Set every cell overlapped by a world rectangle (clamped, inclusive).
    pub fn set_walkable_rect(&mut self, min: Vec2Fixed, max: Vec2Fixed, walkable: bool) {
        if self.nodes.is_empty() {
            return;
        }
        let (min_x, min_y) = self.clamped_cell(min);
        let (max_x, max_y) = self.clamped_cell(max);
        for y in min_y..=max_y {
            for x in min_x..=max_x {
                self.set_walkable(x, y, walkable);
            }
        }
    }

    /// Set every cell whose centre lies within `radius` of `center`.
    pub fn set_walkable_circle(&mut self, center: Vec2Fixed, radius: Fixed, walkable: bool) {
        if self.nodes.is_empty() {
            return;
        }
        let offset = Vec2Fixed::new(radius, radius);
        let (min_x, min_y) = self.clamped_cell(center - offset);
        let (max_x, max_y) = self.clamped_cell(center + offset);
        let radius_sq = radius * radius;
        for y in min_y..=max_y {
            for x in min_x..=max_x {
                if let Some(node) = self.node_mut(x, y) {
                    if node.world_position.distance_squared(center) <= radius_sq {
                        node.walkable = walkable;
                    }
                }
            }
        }
    }

    /// Block everything a provider reports: rectangles, then circles.
    pub fn apply_obstacles(&mut self, provider: &dyn ObstacleProvider) {
        for rect in provider.unwalkable_rects() {
            self.set_walkable_rect(rect.min, rect.max, false);
        }
        for circle in provider.unwalkable_circles() {
            self.set_walkable_circle(circle.center, circle.radius, false);
        }
    }

    /// Clear A* state on every node.
    pub fn reset_search_state(&mut self) {
        for node in &mut self.nodes {
            node.reset_costs();
        }
    }

    /// Coordinates of every blocked cell in row-major order.
    #[must_use]
    pub fn blocked_cells(&self) -> Vec<(i32, i32)> {
        self.nodes
            .iter()
            .filter(|n| !n.walkable)
            .map(|n| (n.x, n.y))
            .collect()
    }
}
