//! Frame-stamped external commands.
//!
//! Commands are queued on the simulator and applied at the start of the
//! first frame whose number is at least their stamp, in the order they were
//! queued. A command whose unit no longer exists is logged and ignored.
//!
//! The same types go into JSON command scripts and bincode replays, so the
//! payload is an externally tagged enum:
//! `{"frame": 10, "kind": {"KillUnit": {"unit": 3}}}`.

use serde::{Deserialize, Serialize};

use crate::error::{GameError, Result};
use crate::math::{vec2_decimal, Vec2Fixed};
use crate::unit::{Faction, UnitId, UnitRole};

/// What a command does.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommandKind {
    /// Spawn a generic unit of `role` with the faction's default stats.
    SpawnUnit {
        /// Role.
        role: UnitRole,
        /// Side.
        faction: Faction,
        /// Spawn point.
        #[serde(with = "vec2_decimal")]
        position: Vec2Fixed,
        /// HP override.
        #[serde(default)]
        hp: Option<i32>,
    },
    /// Spawn a registry unit.
    SpawnDefinition {
        /// Registry id.
        unit_id: String,
        /// Side.
        faction: Faction,
        /// Spawn point.
        #[serde(with = "vec2_decimal")]
        position: Vec2Fixed,
        /// HP override.
        #[serde(default)]
        hp: Option<i32>,
    },
    /// Send a unit somewhere.
    MoveUnit {
        /// Unit.
        unit: UnitId,
        /// Destination.
        #[serde(with = "vec2_decimal")]
        destination: Vec2Fixed,
    },
    /// Deal damage through shield and HP; a kill resolves in the frame's death pass.
    DamageUnit {
        /// Unit.
        unit: UnitId,
        /// Damage.
        amount: i32,
    },
    /// Kill a unit; death abilities trigger.
    KillUnit {
        /// Unit.
        unit: UnitId,
    },
    /// Take a unit out without triggering anything.
    RemoveUnit {
        /// Unit.
        unit: UnitId,
    },
    /// Bring a dead (not yet removed) unit back.
    ReviveUnit {
        /// Unit.
        unit: UnitId,
        /// HP after revival.
        hp: i32,
    },
    /// Overwrite a unit's HP.
    SetHealth {
        /// Unit.
        unit: UnitId,
        /// New HP, clamped to `0..=max_hp`.
        hp: i32,
    },
}

/// A command stamped with the frame it applies at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimCommand {
    /// Frame the command applies at.
    pub frame: u32,
    /// Payload.
    pub kind: CommandKind,
}

impl SimCommand {
    /// Stamp `kind` with `frame`.
    #[must_use]
    pub const fn new(frame: u32, kind: CommandKind) -> Self {
        Self { frame, kind }
    }

    /// Unit the command addresses, if any.
    #[must_use]
    pub const fn target_unit(&self) -> Option<UnitId> {
        match &self.kind {
            CommandKind::SpawnUnit { .. } | CommandKind::SpawnDefinition { .. } => None,
            CommandKind::MoveUnit { unit, .. }
            | CommandKind::DamageUnit { unit, .. }
            | CommandKind::KillUnit { unit }
            | CommandKind::RemoveUnit { unit }
            | CommandKind::ReviveUnit { unit, .. }
            | CommandKind::SetHealth { unit, .. } => Some(*unit),
        }
    }
}

/// Parse a JSON array of commands.
pub fn commands_from_json(json: &str) -> Result<Vec<SimCommand>> {
    serde_json::from_str(json).map_err(|e| GameError::DataParseError {
        path: "<commands>".to_string(),
        message: e.to_string(),
    })
}

/// Serialize commands as a JSON array.
pub fn commands_to_json(commands: &[SimCommand]) -> Result<String> {
    serde_json::to_string(commands)
        .map_err(|e| GameError::InvalidState(format!("Failed to serialize commands: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_shape() {
        let commands = vec![
            SimCommand::new(
                3,
                CommandKind::SpawnDefinition {
                    unit_id: "golemite".to_string(),
                    faction: Faction::Enemy,
                    position: Vec2Fixed::from_ints(1600, 3000),
                    hp: None,
                },
            ),
            SimCommand::new(4, CommandKind::KillUnit { unit: 7 }),
        ];
        let json = commands_to_json(&commands).unwrap();
        assert!(json.contains("\"kind\":{\"SpawnDefinition\""));
        assert!(json.contains("\"frame\":3"));
        assert_eq!(commands_from_json(&json).unwrap(), commands);
    }

    #[test]
    fn test_handwritten_json() {
        let json = r#"[
            {"frame": 0, "kind": {"SpawnUnit": {"role": "Ranged", "faction": "Friendly", "position": [100.5, 200.0]}}},
            {"frame": 10, "kind": {"MoveUnit": {"unit": 1, "destination": [300.0, 400.0]}}}
        ]"#;
        let commands = commands_from_json(json).unwrap();
        assert_eq!(commands.len(), 2);
        assert_eq!(commands[0].target_unit(), None);
        assert_eq!(commands[1].target_unit(), Some(1));
        match &commands[0].kind {
            CommandKind::SpawnUnit { position, hp, .. } => {
                assert_eq!(position.x, crate::math::Fixed::from_num(100.5));
                assert_eq!(*hp, None);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_bincode_round_trip() {
        let commands = vec![SimCommand::new(
            2,
            CommandKind::MoveUnit {
                unit: 4,
                destination: Vec2Fixed::from_ints(10, 20),
            },
        )];
        let bytes = bincode::serialize(&commands).unwrap();
        let back: Vec<SimCommand> = bincode::deserialize(&bytes).unwrap();
        assert_eq!(back, commands);
    }

    #[test]
    fn test_bad_json_is_parse_error() {
        assert!(matches!(
            commands_from_json(r#"[{"frame": 1, "kind": {"Teleport": {"unit": 1}}}]"#),
            Err(GameError::DataParseError { .. })
        ));
    }
}
