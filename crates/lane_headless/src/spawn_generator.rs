//! Seeded command-script variation.
//!
//! Batch runs play the same scenario many times. Each game gets the
//! scenario's scripted commands plus a handful of extra deployments drawn
//! from a seeded ChaCha8 stream, so every seed is a different but exactly
//! reproducible battle.

use lane_core::command::{CommandKind, SimCommand};
use lane_core::map::MapLayout;
use lane_core::math::Vec2Fixed;
use lane_core::unit::Faction;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::scenario::Scenario;

/// Variation options.
#[derive(Debug, Clone)]
pub struct SpawnConfig {
    /// Extra deployments per side.
    pub deployments_per_side: u32,
    /// Deployments land in `0..last_frame`.
    pub last_frame: u32,
    /// Distance kept from the map edge.
    pub edge_padding: i32,
    /// Distance kept from the river band.
    pub river_padding: i32,
    /// Definition ids friendly deployments draw from.
    pub friendly_pool: Vec<String>,
    /// Definition ids enemy deployments draw from.
    pub enemy_pool: Vec<String>,
}

impl Default for SpawnConfig {
    fn default() -> Self {
        let pool: Vec<String> = ["golemite", "skeleton", "minion", "bat", "guard", "lava_pup"]
            .iter()
            .map(|s| (*s).to_string())
            .collect();
        Self {
            deployments_per_side: 4,
            last_frame: 600,
            edge_padding: 150,
            river_padding: 200,
            friendly_pool: pool.clone(),
            enemy_pool: pool,
        }
    }
}

/// Random point in a faction's half, away from edges and the river.
fn deploy_position(
    rng: &mut ChaCha8Rng,
    map: &MapLayout,
    faction: Faction,
    config: &SpawnConfig,
) -> Vec2Fixed {
    let width: i32 = map.width.to_num();
    let height: i32 = map.height.to_num();
    let river_min: i32 = map.river_y_min.to_num();
    let river_max: i32 = map.river_y_max.to_num();

    let x_lo = config.edge_padding;
    let x_hi = (width - config.edge_padding).max(x_lo + 1);
    let (y_lo, y_hi) = match faction {
        Faction::Friendly => (config.edge_padding, river_min - config.river_padding),
        Faction::Enemy => (river_max + config.river_padding, height - config.edge_padding),
    };
    let y_hi = y_hi.max(y_lo + 1);

    Vec2Fixed::from_ints(rng.gen_range(x_lo..x_hi), rng.gen_range(y_lo..y_hi))
}

/// Extra deployments for `seed`, sorted by frame.
#[must_use]
pub fn generate_commands(seed: u64, map: &MapLayout, config: &SpawnConfig) -> Vec<SimCommand> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut commands = Vec::new();
    for (faction, pool) in [
        (Faction::Friendly, &config.friendly_pool),
        (Faction::Enemy, &config.enemy_pool),
    ] {
        for _ in 0..config.deployments_per_side {
            let Some(unit_id) = pool.choose(&mut rng) else {
                break;
            };
            let frame = rng.gen_range(0..config.last_frame.max(1));
            let position = deploy_position(&mut rng, map, faction, config);
            commands.push(SimCommand::new(
                frame,
                CommandKind::SpawnDefinition {
                    unit_id: unit_id.clone(),
                    faction,
                    position,
                    hp: None,
                },
            ));
        }
    }
    commands.sort_by_key(|c| c.frame);
    commands
}

/// The scenario's scripted commands followed by the seed's deployments.
///
/// Seed 0 keeps the script untouched.
#[must_use]
pub fn generate_dynamic_scenario(seed: u64, base: &Scenario, config: &SpawnConfig) -> Scenario {
    let mut scenario = base.clone();
    if seed != 0 {
        scenario
            .commands
            .extend(generate_commands(seed, &base.balance.map, config));
        scenario.name = format!("{} (seed {})", base.name, seed);
    }
    scenario
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_seed_same_commands() {
        let map = MapLayout::default();
        let config = SpawnConfig::default();
        assert_eq!(
            generate_commands(42, &map, &config),
            generate_commands(42, &map, &config)
        );
        assert_ne!(
            generate_commands(42, &map, &config),
            generate_commands(43, &map, &config)
        );
    }

    #[test]
    fn test_deployments_stay_on_own_side() {
        let map = MapLayout::default();
        let config = SpawnConfig::default();
        for seed in 1..20 {
            let commands = generate_commands(seed, &map, &config);
            assert_eq!(commands.len(), 8);
            assert!(commands.windows(2).all(|w| w[0].frame <= w[1].frame));
            for command in &commands {
                let CommandKind::SpawnDefinition { faction, position, .. } = &command.kind else {
                    panic!("unexpected command {command:?}");
                };
                assert!(map.is_within_bounds(*position));
                assert!(!map.is_in_river(*position));
                match faction {
                    Faction::Friendly => assert!(position.y < map.river_y_min),
                    Faction::Enemy => assert!(position.y > map.river_y_max),
                }
            }
        }
    }

    #[test]
    fn test_seed_zero_keeps_script() {
        let base = Scenario::skirmish();
        let scenario = generate_dynamic_scenario(0, &base, &SpawnConfig::default());
        assert_eq!(scenario, base);

        let varied = generate_dynamic_scenario(5, &base, &SpawnConfig::default());
        assert_eq!(varied.commands.len(), base.commands.len() + 8);
        assert!(varied.build_with_commands().is_ok());
    }

    #[test]
    fn test_empty_pool() {
        let config = SpawnConfig {
            enemy_pool: Vec::new(),
            ..SpawnConfig::default()
        };
        let commands = generate_commands(1, &MapLayout::default(), &config);
        assert_eq!(commands.len(), 4);
    }
}
