//! Checks for the scenario files shipped with the headless runner.

use std::path::PathBuf;

use lane_headless::runner::{run_scenario, RunOptions};
use lane_headless::scenario::Scenario;
use lane_test_utils::determinism::find_first_divergence;

fn scenarios_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("scenarios")
}

fn bundled(name: &str) -> Scenario {
    Scenario::load(scenarios_dir().join(name)).unwrap()
}

#[test]
fn test_bundled_scenarios_validate() {
    let mut checked = 0;
    for entry in std::fs::read_dir(scenarios_dir()).unwrap() {
        let path = entry.unwrap().path();
        if path.extension().and_then(|e| e.to_str()) != Some("ron") {
            continue;
        }
        let scenario = Scenario::load(&path)
            .unwrap_or_else(|e| panic!("{} failed to load: {e}", path.display()));
        scenario
            .validate()
            .unwrap_or_else(|e| panic!("{} is invalid: {e}", path.display()));
        checked += 1;
    }
    assert!(checked >= 2, "expected the bundled scenarios, found {checked}");
}

#[test]
fn test_skirmish_file_matches_builtin() {
    assert_eq!(bundled("skirmish.ron"), Scenario::skirmish());
}

#[test]
fn test_tower_rush_is_deterministic() {
    let scenario = bundled("tower_rush.ron");
    let divergence = find_first_divergence(|| scenario.build_with_commands().unwrap(), 300);
    assert_eq!(divergence, None);
}

#[test]
fn test_tower_rush_spawns_custom_units() {
    let options = RunOptions {
        max_frames: Some(200),
        ..RunOptions::default()
    };
    let metrics = run_scenario(&bundled("tower_rush.ron"), &options).unwrap();

    assert_eq!(metrics.frames, 200);
    assert_eq!(metrics.enemy.units_spawned.get("siege_ram"), Some(&3));
    assert!(metrics.enemy.units_spawned.get("skeleton").copied().unwrap_or(0) >= 4);
    assert_eq!(metrics.friendly.units_spawned.get("guard"), Some(&2));
}
