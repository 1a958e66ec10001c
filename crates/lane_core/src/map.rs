//! Arena layout and terrain rules.
//!
//! The arena is a vertical lane map: friendly side at the bottom, enemy side
//! at the top, a river band across the middle that ground units may only
//! cross on one of two bridges.

use serde::{Deserialize, Serialize};

use crate::error::{GameError, Result};
use crate::math::{fixed_decimal, vec2_decimal, Fixed, Vec2Fixed};
use crate::unit::{Faction, MovementLayer};

/// Arena geometry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MapLayout {
    /// Arena width in world units.
    #[serde(with = "fixed_decimal")]
    pub width: Fixed,
    /// Arena height in world units.
    #[serde(with = "fixed_decimal")]
    pub height: Fixed,
    /// Lower edge of the river band.
    #[serde(with = "fixed_decimal")]
    pub river_y_min: Fixed,
    /// Upper edge of the river band.
    #[serde(with = "fixed_decimal")]
    pub river_y_max: Fixed,
    /// Left bridge span.
    #[serde(with = "fixed_decimal")]
    pub left_bridge_x_min: Fixed,
    /// Left bridge span.
    #[serde(with = "fixed_decimal")]
    pub left_bridge_x_max: Fixed,
    /// Right bridge span.
    #[serde(with = "fixed_decimal")]
    pub right_bridge_x_min: Fixed,
    /// Right bridge span.
    #[serde(with = "fixed_decimal")]
    pub right_bridge_x_max: Fixed,
    /// Friendly King tower anchor.
    #[serde(with = "vec2_decimal")]
    pub friendly_king: Vec2Fixed,
    /// Friendly left Princess tower anchor.
    #[serde(with = "vec2_decimal")]
    pub friendly_princess_left: Vec2Fixed,
    /// Friendly right Princess tower anchor.
    #[serde(with = "vec2_decimal")]
    pub friendly_princess_right: Vec2Fixed,
    /// Enemy King tower anchor.
    #[serde(with = "vec2_decimal")]
    pub enemy_king: Vec2Fixed,
    /// Enemy left Princess tower anchor.
    #[serde(with = "vec2_decimal")]
    pub enemy_princess_left: Vec2Fixed,
    /// Enemy right Princess tower anchor.
    #[serde(with = "vec2_decimal")]
    pub enemy_princess_right: Vec2Fixed,
    /// Default friendly spawn point.
    #[serde(with = "vec2_decimal")]
    pub friendly_spawn: Vec2Fixed,
    /// Default enemy spawn point.
    #[serde(with = "vec2_decimal")]
    pub enemy_spawn: Vec2Fixed,
}

impl Default for MapLayout {
    fn default() -> Self {
        Self {
            width: Fixed::from_num(3200),
            height: Fixed::from_num(5100),
            river_y_min: Fixed::from_num(2400),
            river_y_max: Fixed::from_num(2700),
            left_bridge_x_min: Fixed::from_num(400),
            left_bridge_x_max: Fixed::from_num(800),
            right_bridge_x_min: Fixed::from_num(2400),
            right_bridge_x_max: Fixed::from_num(2800),
            friendly_king: Vec2Fixed::from_ints(1600, 700),
            friendly_princess_left: Vec2Fixed::from_ints(600, 1200),
            friendly_princess_right: Vec2Fixed::from_ints(2600, 1200),
            enemy_king: Vec2Fixed::from_ints(1600, 4400),
            enemy_princess_left: Vec2Fixed::from_ints(600, 3900),
            enemy_princess_right: Vec2Fixed::from_ints(2600, 3900),
            friendly_spawn: Vec2Fixed::from_ints(1600, 1500),
            enemy_spawn: Vec2Fixed::from_ints(1600, 3600),
        }
    }
}

impl MapLayout {
    /// Check that the geometry is self-consistent.
    pub fn validate(&self) -> Result<()> {
        if self.width <= Fixed::ZERO || self.height <= Fixed::ZERO {
            return Err(GameError::InvalidConfig(format!(
                "map dimensions must be positive, got {}x{}",
                self.width, self.height
            )));
        }
        if self.river_y_min >= self.river_y_max || self.river_y_max > self.height {
            return Err(GameError::InvalidConfig(
                "river band must lie inside the map with min < max".to_string(),
            ));
        }
        if self.left_bridge_x_min >= self.left_bridge_x_max
            || self.left_bridge_x_max > self.right_bridge_x_min
            || self.right_bridge_x_min >= self.right_bridge_x_max
            || self.right_bridge_x_max > self.width
        {
            return Err(GameError::InvalidConfig(
                "bridges must be ordered left to right inside the map".to_string(),
            ));
        }
        Ok(())
    }

    /// Lower-left corner of the arena.
    #[must_use]
    pub fn min_corner(&self) -> Vec2Fixed {
        Vec2Fixed::ZERO
    }

    /// Upper-right corner of the arena.
    #[must_use]
    pub fn max_corner(&self) -> Vec2Fixed {
        Vec2Fixed::new(self.width, self.height)
    }

    /// Whether `pos` lies inside the arena.
    #[must_use]
    pub fn is_within_bounds(&self, pos: Vec2Fixed) -> bool {
        pos.x >= Fixed::ZERO && pos.x <= self.width && pos.y >= Fixed::ZERO && pos.y <= self.height
    }

    /// Clamp a position into the arena.
    #[must_use]
    pub fn clamp_to_bounds(&self, pos: Vec2Fixed) -> Vec2Fixed {
        pos.clamp(self.min_corner(), self.max_corner())
    }

    /// Whether `pos` lies in the river band (bridges included).
    #[must_use]
    pub fn is_in_river(&self, pos: Vec2Fixed) -> bool {
        pos.y >= self.river_y_min && pos.y <= self.river_y_max
    }

    /// Whether `pos` is on one of the bridges.
    #[must_use]
    pub fn is_on_bridge(&self, pos: Vec2Fixed) -> bool {
        self.is_in_river(pos)
            && ((pos.x >= self.left_bridge_x_min && pos.x <= self.left_bridge_x_max)
                || (pos.x >= self.right_bridge_x_min && pos.x <= self.right_bridge_x_max))
    }

    /// Ground units may stand anywhere in bounds except open water.
    #[must_use]
    pub fn can_ground_unit_move_to(&self, pos: Vec2Fixed) -> bool {
        self.is_within_bounds(pos) && (!self.is_in_river(pos) || self.is_on_bridge(pos))
    }

    /// Centre of the left bridge.
    #[must_use]
    pub fn left_bridge_center(&self) -> Vec2Fixed {
        self.bridge_center(self.left_bridge_x_min, self.left_bridge_x_max)
    }

    /// Centre of the right bridge.
    #[must_use]
    pub fn right_bridge_center(&self) -> Vec2Fixed {
        self.bridge_center(self.right_bridge_x_min, self.right_bridge_x_max)
    }

    fn bridge_center(&self, min_x: Fixed, max_x: Fixed) -> Vec2Fixed {
        let two = Fixed::from_num(2);
        Vec2Fixed::new((min_x + max_x) / two, (self.river_y_min + self.river_y_max) / two)
    }

    /// Bridge centre closest to `pos` (left wins ties).
    #[must_use]
    pub fn nearest_bridge_center(&self, pos: Vec2Fixed) -> Vec2Fixed {
        let left = self.left_bridge_center();
        let right = self.right_bridge_center();
        if pos.distance_squared(right) < pos.distance_squared(left) {
            right
        } else {
            left
        }
    }

    /// Where a unit should actually head when asked to go to `destination`.
    ///
    /// Air units and ground units that stay on one side go straight to the
    /// (clamped) destination. A ground unit that has to cross the river is
    /// routed to the nearest bridge first, unless it or the destination is
    /// already on a bridge.
    #[must_use]
    pub fn adjusted_destination(
        &self,
        layer: MovementLayer,
        position: Vec2Fixed,
        destination: Vec2Fixed,
    ) -> Vec2Fixed {
        let clamped = self.clamp_to_bounds(destination);
        if layer == MovementLayer::Air {
            return clamped;
        }

        let crosses = (position.y < self.river_y_min && destination.y > self.river_y_max)
            || (position.y > self.river_y_max && destination.y < self.river_y_min);
        if !crosses {
            return clamped;
        }

        if self.is_on_bridge(position) || self.is_on_bridge(destination) {
            return clamped;
        }

        self.nearest_bridge_center(position)
    }

    /// King tower anchor for a faction.
    #[must_use]
    pub fn king_position(&self, faction: Faction) -> Vec2Fixed {
        match faction {
            Faction::Friendly => self.friendly_king,
            Faction::Enemy => self.enemy_king,
        }
    }

    /// Left Princess tower anchor for a faction.
    #[must_use]
    pub fn princess_left_position(&self, faction: Faction) -> Vec2Fixed {
        match faction {
            Faction::Friendly => self.friendly_princess_left,
            Faction::Enemy => self.enemy_princess_left,
        }
    }

    /// Right Princess tower anchor for a faction.
    #[must_use]
    pub fn princess_right_position(&self, faction: Faction) -> Vec2Fixed {
        match faction {
            Faction::Friendly => self.friendly_princess_right,
            Faction::Enemy => self.enemy_princess_right,
        }
    }

    /// Default spawn point for a faction.
    #[must_use]
    pub fn spawn_position(&self, faction: Faction) -> Vec2Fixed {
        match faction {
            Faction::Friendly => self.friendly_spawn,
            Faction::Enemy => self.enemy_spawn,
        }
    }

    /// Point the friendly squad marches to when nothing else is left.
    #[must_use]
    pub fn main_target(&self) -> Vec2Fixed {
        Vec2Fixed::new(self.width - Fixed::from_num(100), self.height / Fixed::from_num(2))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_river_and_bridges() {
        let map = MapLayout::default();
        assert!(map.is_in_river(Vec2Fixed::from_ints(1600, 2550)));
        assert!(!map.is_on_bridge(Vec2Fixed::from_ints(1600, 2550)));
        assert!(map.is_on_bridge(Vec2Fixed::from_ints(600, 2550)));
        assert!(map.is_on_bridge(Vec2Fixed::from_ints(2700, 2450)));
        assert!(!map.can_ground_unit_move_to(Vec2Fixed::from_ints(1600, 2550)));
        assert!(map.can_ground_unit_move_to(Vec2Fixed::from_ints(1600, 1000)));
        assert!(!map.can_ground_unit_move_to(Vec2Fixed::from_ints(-1, 1000)));
    }

    #[test]
    fn test_bridge_centers() {
        let map = MapLayout::default();
        assert_eq!(map.left_bridge_center(), Vec2Fixed::from_ints(600, 2550));
        assert_eq!(map.right_bridge_center(), Vec2Fixed::from_ints(2600, 2550));
    }

    #[test]
    fn test_crossing_ground_unit_routes_to_nearest_bridge() {
        let map = MapLayout::default();
        let from = Vec2Fixed::from_ints(2000, 1500);
        let to = Vec2Fixed::from_ints(2000, 3600);
        assert_eq!(
            map.adjusted_destination(MovementLayer::Ground, from, to),
            Vec2Fixed::from_ints(2600, 2550)
        );
        // Air units fly straight over.
        assert_eq!(map.adjusted_destination(MovementLayer::Air, from, to), to);
    }

    #[test]
    fn test_same_side_or_bridge_destinations_are_clamped_only() {
        let map = MapLayout::default();
        let from = Vec2Fixed::from_ints(600, 2550);
        let to = Vec2Fixed::from_ints(600, 3600);
        assert_eq!(map.adjusted_destination(MovementLayer::Ground, from, to), to);

        let out = Vec2Fixed::from_ints(4000, 1000);
        assert_eq!(
            map.adjusted_destination(MovementLayer::Ground, Vec2Fixed::from_ints(100, 100), out),
            Vec2Fixed::from_ints(3200, 1000)
        );
    }

    #[test]
    fn test_invalid_layout_rejected() {
        let mut map = MapLayout::default();
        map.river_y_min = map.river_y_max;
        assert!(map.validate().is_err());
    }
}
