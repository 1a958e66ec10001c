//! Scenario loading and configuration.
//!
//! A scenario bundles everything needed to start a battle from scratch:
//! balance tunables, the tower/unit setup, the wave schedule, extra unit
//! definitions layered over the built-in registry, and a scripted command
//! stream.

use std::path::Path;

use lane_core::command::{CommandKind, SimCommand};
use lane_core::config::GameBalance;
use lane_core::error::GameError;
use lane_core::math::Vec2Fixed;
use lane_core::registry::{UnitDefinition, UnitRegistry};
use lane_core::setup::InitialSetup;
use lane_core::simulator::SimulatorCore;
use lane_core::unit::{Faction, UnitRole};
use lane_core::waves::{WaveDefinition, WaveSchedule};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for scenario operations.
#[derive(Error, Debug)]
pub enum ScenarioError {
    /// File not found.
    #[error("Scenario file not found: {0}")]
    FileNotFound(String),
    /// Failed to read file.
    #[error("Failed to read scenario file: {0}")]
    ReadError(#[from] std::io::Error),
    /// Failed to parse RON.
    #[error("Failed to parse scenario: {0}")]
    ParseError(#[from] ron::error::SpannedError),
    /// Parsed, but the simulator rejected it.
    #[error("Invalid scenario: {0}")]
    Invalid(#[from] GameError),
}

/// A complete battle scenario.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Scenario {
    /// Scenario name.
    pub name: String,
    /// Human-readable description.
    pub description: String,
    /// Balance tunables.
    pub balance: GameBalance,
    /// Towers, initial units and clock.
    pub setup: InitialSetup,
    /// Wave schedule, in order.
    pub waves: Vec<WaveDefinition>,
    /// Definitions added to (or replacing entries of) the built-in registry.
    pub units: Vec<UnitDefinition>,
    /// Scripted commands.
    pub commands: Vec<SimCommand>,
}

impl Default for Scenario {
    fn default() -> Self {
        Self {
            name: "Empty Arena".to_string(),
            description: "Six towers, no units, no waves".to_string(),
            balance: GameBalance::default(),
            setup: InitialSetup::standard(),
            waves: Vec::new(),
            units: Vec::new(),
            commands: Vec::new(),
        }
    }
}

impl Scenario {
    /// Load a scenario from a RON file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ScenarioError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ScenarioError::FileNotFound(path.display().to_string()));
        }
        let contents = std::fs::read_to_string(path)?;
        Self::from_ron_str(&contents)
    }

    /// Load from a RON string (useful for embedded scenarios).
    pub fn from_ron_str(ron: &str) -> Result<Self, ScenarioError> {
        let scenario: Scenario = ron::from_str(ron)?;
        Ok(scenario)
    }

    /// Serialize back to pretty RON.
    pub fn to_ron(&self) -> Result<String, ScenarioError> {
        ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
            .map_err(|e| ScenarioError::Invalid(GameError::InvalidState(e.to_string())))
    }

    /// A built-in skirmish: the standard waves against a small friendly
    /// squad, with a ranged reinforcement halfway through the first wave.
    #[must_use]
    pub fn skirmish() -> Self {
        Self {
            name: "Standard Skirmish".to_string(),
            description: "Three enemy waves against a golemite-led squad".to_string(),
            waves: WaveSchedule::standard().waves,
            commands: vec![
                SimCommand::new(
                    0,
                    CommandKind::SpawnDefinition {
                        unit_id: "golemite".to_string(),
                        faction: Faction::Friendly,
                        position: Vec2Fixed::from_ints(1600, 1500),
                        hp: None,
                    },
                ),
                SimCommand::new(
                    0,
                    CommandKind::SpawnDefinition {
                        unit_id: "minion".to_string(),
                        faction: Faction::Friendly,
                        position: Vec2Fixed::from_ints(1450, 1400),
                        hp: None,
                    },
                ),
                SimCommand::new(
                    45,
                    CommandKind::SpawnUnit {
                        role: UnitRole::Ranged,
                        faction: Faction::Friendly,
                        position: Vec2Fixed::from_ints(1750, 1400),
                        hp: None,
                    },
                ),
            ],
            ..Self::default()
        }
    }

    /// Built-in registry with this scenario's definitions layered on top.
    pub fn registry(&self) -> Result<UnitRegistry, ScenarioError> {
        let mut registry = UnitRegistry::with_defaults();
        for definition in &self.units {
            definition.validate()?;
            registry.insert(definition.clone());
        }
        Ok(registry)
    }

    /// Wave schedule over the scenario's waves.
    #[must_use]
    pub fn wave_schedule(&self) -> WaveSchedule {
        WaveSchedule::new(self.waves.clone())
    }

    /// Check everything the simulator would check, without building one.
    pub fn validate(&self) -> Result<(), ScenarioError> {
        self.balance.validate()?;
        self.setup.validate()?;
        self.registry()?.validate()?;
        self.wave_schedule().validate()?;
        if self.waves.len() > self.balance.max_waves as usize {
            return Err(GameError::InvalidConfig(format!(
                "scenario has {} waves, balance allows {}",
                self.waves.len(),
                self.balance.max_waves
            ))
            .into());
        }
        Ok(())
    }

    /// Fresh simulator at frame 0. Scripted commands are not queued.
    pub fn build(&self) -> Result<SimulatorCore, ScenarioError> {
        let sim = SimulatorCore::with_waves(
            self.balance.clone(),
            self.registry()?,
            self.setup.clone(),
            self.wave_schedule(),
        )?;
        Ok(sim)
    }

    /// Fresh simulator with the scripted commands queued.
    pub fn build_with_commands(&self) -> Result<SimulatorCore, ScenarioError> {
        let mut sim = self.build()?;
        sim.enqueue_all(self.commands.iter().cloned());
        Ok(sim)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_scenario() {
        let scenario = Scenario::default();
        assert!(scenario.waves.is_empty());
        assert_eq!(scenario.setup.towers.len(), 6);
        assert!(scenario.validate().is_ok());
    }

    #[test]
    fn test_skirmish_scenario() {
        let scenario = Scenario::skirmish();
        assert_eq!(scenario.waves.len(), 3);
        assert_eq!(scenario.commands.len(), 3);
        let sim = scenario.build_with_commands().unwrap();
        assert_eq!(sim.pending_commands(), 3);
    }

    #[test]
    fn test_parse_from_ron() {
        let ron = r#"
            Scenario(
                name: "Test",
                description: "Test scenario",
                waves: [
                    (
                        wave_number: 1,
                        name: "pair",
                        delay_frames: 10,
                        spawn_groups: [(unit_id: "brute", count: 2)],
                    ),
                ],
                units: [
                    (
                        unit_id: "brute",
                        max_hp: 500,
                        damage: 40,
                        attack_range: 30.0,
                        move_speed: 3.5,
                        turn_speed: 0.1,
                        radius: 22.0,
                        role: Tank,
                        can_target: "Ground|Air",
                    ),
                ],
                commands: [
                    (frame: 5, kind: SpawnDefinition(
                        unit_id: "brute",
                        faction: Friendly,
                        position: (1600.0, 1500.0),
                    )),
                    (frame: 20, kind: KillUnit(unit: 1)),
                ],
            )
        "#;
        let scenario = Scenario::from_ron_str(ron).unwrap();
        assert_eq!(scenario.name, "Test");
        assert_eq!(scenario.balance, GameBalance::default());
        assert_eq!(scenario.commands[1].kind, CommandKind::KillUnit { unit: 1 });
        let registry = scenario.registry().unwrap();
        assert!(registry.contains("brute"));
        assert!(registry.contains("golemite"));
        assert!(scenario.validate().is_ok());
    }

    #[test]
    fn test_too_many_waves_invalid() {
        let mut scenario = Scenario::skirmish();
        scenario.balance.max_waves = 2;
        assert!(matches!(
            scenario.validate(),
            Err(ScenarioError::Invalid(GameError::InvalidConfig(_)))
        ));
    }

    #[test]
    fn test_bad_definition_invalid() {
        let mut scenario = Scenario::default();
        let mut definition = UnitRegistry::with_defaults().get("skeleton").cloned().unwrap();
        definition.max_hp = 0;
        scenario.units.push(definition);
        assert!(matches!(scenario.build(), Err(ScenarioError::Invalid(_))));
    }

    #[test]
    fn test_missing_file() {
        let err = Scenario::load("/definitely/not/here.ron").unwrap_err();
        assert!(matches!(err, ScenarioError::FileNotFound(_)));
    }

    #[test]
    fn test_ron_round_trip_through_file() {
        let scenario = Scenario::skirmish();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("skirmish.ron");
        std::fs::write(&path, scenario.to_ron().unwrap()).unwrap();
        let loaded = Scenario::load(&path).unwrap();
        assert_eq!(loaded.name, scenario.name);
        assert_eq!(loaded.waves, scenario.waves);
        assert_eq!(loaded.commands, scenario.commands);
        assert!(loaded.validate().is_ok());
    }
}
