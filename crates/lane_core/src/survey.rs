//! Pathfinder survey over random obstacle fields.
//!
//! Fills an empty grid with random rectangles until a target share of cells
//! is blocked, then runs A* between random walkable endpoints and reports
//! how often and how well it succeeds. Runs are reproducible from the seed.

use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{GameError, Result};
use crate::grid::PathfindingGrid;
use crate::math::{fixed_decimal, vec2_decimal, Fixed, Vec2Fixed};
use crate::pathfinding::find_path_with_stats;

/// Survey parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SurveySettings {
    /// RNG seed.
    pub seed: u64,
    /// Grid width in world units.
    #[serde(with = "fixed_decimal")]
    pub map_width: Fixed,
    /// Grid height in world units.
    #[serde(with = "fixed_decimal")]
    pub map_height: Fixed,
    /// Cell edge length.
    #[serde(with = "fixed_decimal")]
    pub cell_size: Fixed,
    /// Share of cells to block, in `[0, 1]`.
    pub obstacle_density: f64,
    /// Smallest obstacle edge, in cells.
    pub min_obstacle_size_cells: u32,
    /// Largest obstacle edge, in cells.
    pub max_obstacle_size_cells: u32,
    /// Number of start/end pairs.
    pub scenario_count: u32,
    /// Draws allowed per endpoint pair.
    pub max_endpoint_attempts: u32,
}

impl Default for SurveySettings {
    fn default() -> Self {
        Self {
            seed: 0,
            map_width: Fixed::from_num(3200),
            map_height: Fixed::from_num(5100),
            cell_size: Fixed::from_num(20),
            obstacle_density: 0.15,
            min_obstacle_size_cells: 2,
            max_obstacle_size_cells: 6,
            scenario_count: 25,
            max_endpoint_attempts: 200,
        }
    }
}

impl SurveySettings {
    /// Default settings with `seed`.
    #[must_use]
    pub fn with_seed(seed: u64) -> Self {
        Self {
            seed,
            ..Self::default()
        }
    }

    /// Reject settings the survey cannot run with.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.obstacle_density) {
            return Err(GameError::InvalidConfig(format!(
                "obstacle density must be between 0 and 1, got {}",
                self.obstacle_density
            )));
        }
        if self.map_width <= Fixed::ZERO || self.map_height <= Fixed::ZERO {
            return Err(GameError::InvalidConfig("survey map size must be positive".to_string()));
        }
        if self.cell_size <= Fixed::ZERO
            || self.cell_size > self.map_width
            || self.cell_size > self.map_height
        {
            return Err(GameError::InvalidConfig(
                "survey cell size must be positive and fit the map".to_string(),
            ));
        }
        if self.min_obstacle_size_cells == 0
            || self.min_obstacle_size_cells > self.max_obstacle_size_cells
        {
            return Err(GameError::InvalidConfig(format!(
                "obstacle size range {}..={} is invalid",
                self.min_obstacle_size_cells, self.max_obstacle_size_cells
            )));
        }
        if self.max_endpoint_attempts == 0 {
            return Err(GameError::InvalidConfig(
                "max_endpoint_attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Blocked rectangle, inclusive cell bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SurveyObstacle {
    /// Left column.
    pub min_x: i32,
    /// Bottom row.
    pub min_y: i32,
    /// Right column.
    pub max_x: i32,
    /// Top row.
    pub max_y: i32,
}

/// One start/end pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SurveyResult {
    /// Pair index.
    pub scenario_index: u32,
    /// Start cell centre.
    #[serde(with = "vec2_decimal")]
    pub start: Vec2Fixed,
    /// End cell centre.
    #[serde(with = "vec2_decimal")]
    pub end: Vec2Fixed,
    /// A* found a path.
    pub path_found: bool,
    /// Waypoints in the path.
    pub node_count: usize,
    /// Polyline length from the start.
    #[serde(with = "fixed_decimal")]
    pub path_length: Fixed,
    /// Nodes A* expanded.
    pub nodes_expanded: u32,
    /// Draws needed to pick the endpoints.
    pub endpoint_attempts: u32,
}

/// Aggregates over all results.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SurveySummary {
    /// Pairs run.
    pub total_scenarios: usize,
    /// Pairs with a path.
    pub successful_paths: usize,
    /// Pairs without one.
    pub failed_paths: usize,
    /// `successful / total`.
    pub success_rate: f64,
    /// Mean length of found paths.
    pub average_path_length: f64,
    /// Mean waypoint count of found paths.
    pub average_node_count: f64,
}

impl SurveySummary {
    /// Summarize `results`.
    #[must_use]
    pub fn from_results(results: &[SurveyResult]) -> Self {
        let total = results.len();
        let found: Vec<&SurveyResult> = results.iter().filter(|r| r.path_found).collect();
        let success = found.len();
        let mean = |values: Vec<f64>| {
            if values.is_empty() {
                0.0
            } else {
                values.iter().sum::<f64>() / values.len() as f64
            }
        };
        Self {
            total_scenarios: total,
            successful_paths: success,
            failed_paths: total - success,
            success_rate: if total == 0 { 0.0 } else { success as f64 / total as f64 },
            average_path_length: mean(found.iter().map(|r| r.path_length.to_num::<f64>()).collect()),
            average_node_count: mean(found.iter().map(|r| r.node_count as f64).collect()),
        }
    }
}

/// Full survey output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SurveyReport {
    /// Settings the survey ran with.
    pub settings: SurveySettings,
    /// Cells blocked.
    pub blocked_cells: usize,
    /// Obstacles placed.
    pub obstacles: Vec<SurveyObstacle>,
    /// Per-pair results.
    pub results: Vec<SurveyResult>,
    /// Aggregates.
    pub summary: SurveySummary,
}

impl SurveyReport {
    /// Pretty JSON.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| GameError::InvalidState(format!("Failed to serialize survey: {}", e)))
    }
}

/// Run the survey.
///
/// # Errors
/// [`GameError::InvalidConfig`] for bad settings; [`GameError::InvalidState`]
/// when no distinct walkable endpoints can be drawn.
pub fn run_survey(settings: &SurveySettings) -> Result<SurveyReport> {
    settings.validate()?;

    let mut rng = ChaCha8Rng::seed_from_u64(settings.seed);
    let mut grid = PathfindingGrid::new(settings.map_width, settings.map_height, settings.cell_size);
    let (obstacles, blocked_cells) = generate_obstacles(&mut grid, settings, &mut rng);
    debug!(obstacles = obstacles.len(), blocked_cells, "Obstacle field generated");

    let mut results = Vec::with_capacity(settings.scenario_count as usize);
    for scenario_index in 0..settings.scenario_count {
        let (start, end, endpoint_attempts) =
            pick_endpoints(&grid, &mut rng, settings.max_endpoint_attempts)?;
        let (path, stats) = find_path_with_stats(&mut grid, start, end);
        let (path_found, node_count, path_length) = match &path {
            Some(points) => (true, points.len(), polyline_length(start, points)),
            None => (false, 0, Fixed::ZERO),
        };
        results.push(SurveyResult {
            scenario_index,
            start,
            end,
            path_found,
            node_count,
            path_length,
            nodes_expanded: stats.nodes_expanded,
            endpoint_attempts,
        });
    }

    let summary = SurveySummary::from_results(&results);
    info!(
        seed = settings.seed,
        scenarios = summary.total_scenarios,
        success_rate = summary.success_rate,
        "Survey complete"
    );
    Ok(SurveyReport {
        settings: settings.clone(),
        blocked_cells,
        obstacles,
        results,
        summary,
    })
}

fn generate_obstacles(
    grid: &mut PathfindingGrid,
    settings: &SurveySettings,
    rng: &mut ChaCha8Rng,
) -> (Vec<SurveyObstacle>, usize) {
    let (width, height) = (grid.width(), grid.height());
    let total = usize::try_from(width).unwrap_or(0) * usize::try_from(height).unwrap_or(0);
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
    let target = (total as f64 * settings.obstacle_density) as usize;
    let min_size = i32::try_from(settings.min_obstacle_size_cells).unwrap_or(i32::MAX);
    let max_size = i32::try_from(settings.max_obstacle_size_cells).unwrap_or(i32::MAX);

    let max_draws = total.saturating_mul(16).max(64);

    let mut obstacles = Vec::new();
    let mut blocked = 0;
    let mut draws = 0;
    while blocked < target && draws < max_draws {
        draws += 1;
        let size_x = rng.gen_range(min_size..=max_size);
        let size_y = rng.gen_range(min_size..=max_size);
        let min_x = rng.gen_range(0..=(width - size_x).max(0));
        let min_y = rng.gen_range(0..=(height - size_y).max(0));
        let max_x = (min_x + size_x - 1).min(width - 1);
        let max_y = (min_y + size_y - 1).min(height - 1);

        let mut newly_blocked = 0;
        for x in min_x..=max_x {
            for y in min_y..=max_y {
                if grid.is_walkable(x, y) && grid.set_walkable(x, y, false) {
                    newly_blocked += 1;
                }
            }
        }
        if newly_blocked > 0 {
            obstacles.push(SurveyObstacle {
                min_x,
                min_y,
                max_x,
                max_y,
            });
            blocked += newly_blocked;
        }
    }
    (obstacles, blocked)
}

fn pick_walkable(grid: &PathfindingGrid, rng: &mut ChaCha8Rng) -> Option<(i32, i32)> {
    let x = rng.gen_range(0..grid.width());
    let y = rng.gen_range(0..grid.height());
    grid.is_walkable(x, y).then_some((x, y))
}

fn pick_endpoints(
    grid: &PathfindingGrid,
    rng: &mut ChaCha8Rng,
    max_attempts: u32,
) -> Result<(Vec2Fixed, Vec2Fixed, u32)> {
    let mut start = None;
    let mut end = None;
    for attempt in 1..=max_attempts {
        if start.is_none() {
            start = pick_walkable(grid, rng);
        }
        if end.is_none() {
            end = pick_walkable(grid, rng);
        }
        if let (Some(s), Some(e)) = (start, end) {
            if s != e {
                let centre = |(x, y): (i32, i32)| grid.node(x, y).map(|n| n.world_position);
                if let (Some(a), Some(b)) = (centre(s), centre(e)) {
                    return Ok((a, b, attempt));
                }
            }
            end = None;
        }
    }
    Err(GameError::InvalidState(format!(
        "no distinct walkable endpoints after {max_attempts} attempts"
    )))
}

fn polyline_length(start: Vec2Fixed, points: &[Vec2Fixed]) -> Fixed {
    let mut length = Fixed::ZERO;
    let mut previous = start;
    for &point in points {
        length += previous.distance(point);
        previous = point;
    }
    length
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small(seed: u64, density: f64) -> SurveySettings {
        SurveySettings {
            seed,
            map_width: Fixed::from_num(400),
            map_height: Fixed::from_num(400),
            cell_size: Fixed::from_num(20),
            obstacle_density: density,
            scenario_count: 10,
            ..SurveySettings::default()
        }
    }

    #[test]
    fn test_density_out_of_range_rejected() {
        for density in [-0.1, 1.5, f64::NAN] {
            assert!(matches!(
                run_survey(&small(1, density)),
                Err(GameError::InvalidConfig(_))
            ));
        }
    }

    #[test]
    fn test_bad_size_range_rejected() {
        let mut settings = small(1, 0.1);
        settings.min_obstacle_size_cells = 7;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_same_seed_same_report() {
        let a = run_survey(&small(42, 0.2)).unwrap();
        let b = run_survey(&small(42, 0.2)).unwrap();
        assert_eq!(a, b);
        let c = run_survey(&small(43, 0.2)).unwrap();
        assert_ne!(a.obstacles, c.obstacles);
    }

    #[test]
    fn test_empty_field_always_succeeds() {
        let report = run_survey(&small(7, 0.0)).unwrap();
        assert!(report.obstacles.is_empty());
        assert_eq!(report.summary.successful_paths, 10);
        assert!((report.summary.success_rate - 1.0).abs() < f64::EPSILON);
        assert!(report.results.iter().all(|r| r.path_length > Fixed::ZERO));
    }

    #[test]
    fn test_blocks_at_least_target_share() {
        let report = run_survey(&small(3, 0.25)).unwrap();
        // 20 x 20 cells
        assert!(report.blocked_cells >= 100);
        assert_eq!(report.summary.total_scenarios, 10);
        assert_eq!(
            report.summary.successful_paths + report.summary.failed_paths,
            report.summary.total_scenarios
        );
    }

    #[test]
    fn test_fully_blocked_field_errors() {
        let mut settings = small(3, 1.0);
        settings.map_width = Fixed::from_num(100);
        settings.map_height = Fixed::from_num(100);
        assert!(matches!(
            run_survey(&settings),
            Err(GameError::InvalidState(_))
        ));
    }

    #[test]
    fn test_report_json() {
        let json = run_survey(&small(5, 0.1)).unwrap().to_json().unwrap();
        assert!(json.contains("\"successRate\""));
        assert!(json.contains("\"pathFound\""));
    }
}
