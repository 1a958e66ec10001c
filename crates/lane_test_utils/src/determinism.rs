//! Reproducibility harness for [`SimulatorCore`].
//!
//! Replays, seeking and `load_frame` all assume that the same setup and the
//! same command stream give the same frames. The helpers here check that
//! from several angles:
//!
//! - repeated runs must end on one state hash ([`repeat_runs`]);
//! - runs on separate threads must agree ([`run_parallel_simulations_scoped`]);
//! - the JSON frame stream must match line for line ([`find_first_divergence`]);
//! - a checkpoint must restore into an identical simulator
//!   ([`verify_serialization_determinism`]).
//!
//! Units live in an id-ordered arena, registries are `BTreeMap`s and all
//! arithmetic is `I32F32`, so none of these should ever fail.

use std::thread;

use lane_core::callbacks::NullSink;
use lane_core::simulator::SimulatorCore;

/// Final hashes of several runs of the same battle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashRuns {
    /// One hash per run, in run order.
    pub hashes: Vec<u64>,
    /// Frames stepped per run.
    pub frames: u32,
}

impl HashRuns {
    /// Every run ended on the same hash.
    #[must_use]
    pub fn agree(&self) -> bool {
        self.hashes.windows(2).all(|w| w[0] == w[1])
    }

    /// Distinct hashes, sorted.
    #[must_use]
    pub fn distinct(&self) -> Vec<u64> {
        let mut distinct = self.hashes.clone();
        distinct.sort_unstable();
        distinct.dedup();
        distinct
    }

    /// # Panics
    ///
    /// Panics listing the hashes when the runs disagree.
    pub fn assert_agree(&self) {
        assert!(
            self.agree(),
            "{} runs of {} frames ended on {} different hashes: {:?}",
            self.hashes.len(),
            self.frames,
            self.distinct().len(),
            self.hashes
        );
    }
}

/// Build `runs` fresh states with `setup`, advance each `frames` times with
/// `step` and hash the result.
///
/// ```
/// use lane_test_utils::determinism::repeat_runs;
///
/// let runs = repeat_runs(3, 10, || 0u64, |n| *n += 2, |n| *n);
/// assert_eq!(runs.hashes, vec![20, 20, 20]);
/// ```
pub fn repeat_runs<S>(
    runs: usize,
    frames: u32,
    setup: impl Fn() -> S,
    step: impl Fn(&mut S),
    hash: impl Fn(&S) -> u64,
) -> HashRuns {
    let hashes = (0..runs)
        .map(|_| {
            let mut state = setup();
            (0..frames).for_each(|_| step(&mut state));
            hash(&state)
        })
        .collect();
    HashRuns { hashes, frames }
}

/// Full-state hash of a simulator.
///
/// # Panics
///
/// Panics if the simulator cannot be serialized.
#[must_use]
pub fn sim_hash(sim: &SimulatorCore) -> u64 {
    sim.state_hash().expect("simulator state serializes")
}

/// Step once, discarding notifications.
pub fn step_sim(sim: &mut SimulatorCore) {
    sim.step(&mut NullSink);
}

/// Two runs of `setup_fn` end on the same hash after `num_frames`.
pub fn verify_simulation_determinism<F>(setup_fn: F, num_frames: u32) -> bool
where
    F: Fn() -> SimulatorCore,
{
    repeat_runs(2, num_frames, &setup_fn, step_sim, sim_hash).agree()
}

/// Play `num_sims` copies of the battle on scoped threads.
///
/// # Panics
///
/// Panics if a simulation thread panics.
pub fn run_parallel_simulations_scoped<F>(setup_fn: F, num_sims: usize, num_frames: u32) -> HashRuns
where
    F: Fn() -> SimulatorCore + Sync,
{
    let setup_fn = &setup_fn;
    let hashes = thread::scope(|scope| {
        let workers: Vec<_> = (0..num_sims)
            .map(|_| {
                scope.spawn(move || {
                    let mut sim = setup_fn();
                    (0..num_frames).for_each(|_| step_sim(&mut sim));
                    sim_hash(&sim)
                })
            })
            .collect();
        workers
            .into_iter()
            .map(|worker| worker.join().expect("simulation thread panicked"))
            .collect()
    });
    HashRuns {
        hashes,
        frames: num_frames,
    }
}

/// Step two copies side by side and report the first frame whose JSON line
/// or state hash differs.
///
/// Returns `Some(0)` when the fresh copies already differ.
pub fn find_first_divergence<F>(setup_fn: F, num_frames: u32) -> Option<u32>
where
    F: Fn() -> SimulatorCore,
{
    let mut left = setup_fn();
    let mut right = setup_fn();
    if sim_hash(&left) != sim_hash(&right) {
        return Some(0);
    }

    (0..num_frames).find_map(|_| {
        let a = left.step(&mut NullSink);
        let b = right.step(&mut NullSink);
        let same = a.to_json_line().ok() == b.to_json_line().ok() && sim_hash(&left) == sim_hash(&right);
        (!same).then_some(a.frame_number)
    })
}

/// JSON line of every frame of one run.
///
/// # Panics
///
/// Panics if a frame cannot be serialized.
pub fn json_frames<F>(setup_fn: F, num_frames: u32) -> Vec<String>
where
    F: FnOnce() -> SimulatorCore,
{
    let mut sim = setup_fn();
    (0..num_frames)
        .map(|_| sim.step(&mut NullSink).to_json_line().expect("frame serializes"))
        .collect()
}

/// Step `num_frames`, checkpoint, restore, and check the copy hashes the
/// same and keeps emitting the same frames.
pub fn verify_serialization_determinism<F>(setup_fn: F, num_frames: u32) -> bool
where
    F: Fn() -> SimulatorCore,
{
    let mut sim = setup_fn();
    (0..num_frames).for_each(|_| step_sim(&mut sim));

    let Some(mut restored) = sim.checkpoint().ok().and_then(|bytes| SimulatorCore::restore(&bytes).ok()) else {
        return false;
    };
    if restored.state_hash().ok() != sim.state_hash().ok() {
        return false;
    }
    (0..num_frames.max(1)).all(|_| sim.step(&mut NullSink) == restored.step(&mut NullSink))
}

/// Proptest inputs: positions on the default map, registry ids and whole
/// command scripts.
pub mod strategies {
    use lane_core::command::{CommandKind, SimCommand};
    use lane_core::math::{Fixed, Vec2Fixed};
    use lane_core::unit::{Faction, UnitId, UnitRole};
    use proptest::prelude::*;

    /// Ids present in the default registry.
    pub const DEFAULT_UNIT_IDS: [&str; 8] = [
        "golemite",
        "skeleton",
        "lava_pup",
        "minion",
        "bat",
        "elixir_golemite",
        "elixir_blob",
        "guard",
    ];

    /// Generate an x coordinate on the default map.
    ///
    /// Range: 0 to 3200
    pub fn arb_map_x() -> impl Strategy<Value = Fixed> {
        (0i32..3200i32).prop_map(Fixed::from_num)
    }

    /// Generate a y coordinate on the default map.
    ///
    /// Range: 0 to 5100
    pub fn arb_map_y() -> impl Strategy<Value = Fixed> {
        (0i32..5100i32).prop_map(Fixed::from_num)
    }

    /// Generate a position on the default map.
    pub fn arb_vec2_position() -> impl Strategy<Value = Vec2Fixed> {
        (arb_map_x(), arb_map_y()).prop_map(|(x, y)| Vec2Fixed::new(x, y))
    }

    /// Generate a faction.
    pub fn arb_faction() -> impl Strategy<Value = Faction> {
        prop_oneof![Just(Faction::Friendly), Just(Faction::Enemy)]
    }

    /// Generate a role.
    pub fn arb_role() -> impl Strategy<Value = UnitRole> {
        proptest::sample::select(vec![
            UnitRole::Melee,
            UnitRole::Ranged,
            UnitRole::Tank,
            UnitRole::MiniTank,
            UnitRole::GlassCannon,
            UnitRole::Swarm,
            UnitRole::Spawner,
            UnitRole::Support,
            UnitRole::Siege,
        ])
    }

    /// Generate a default registry id.
    pub fn arb_unit_id() -> impl Strategy<Value = String> {
        proptest::sample::select(DEFAULT_UNIT_IDS.to_vec()).prop_map(str::to_string)
    }

    /// Generate an arena id among the first few spawned units.
    pub fn arb_unit_ref() -> impl Strategy<Value = UnitId> {
        1u32..24u32
    }

    /// Generate health values (1-1000).
    pub fn arb_health() -> impl Strategy<Value = i32> {
        1i32..1000i32
    }

    /// Generate damage values (1-300).
    pub fn arb_damage() -> impl Strategy<Value = i32> {
        1i32..300i32
    }

    /// Generate a spawn of a registry unit.
    pub fn arb_spawn_kind() -> impl Strategy<Value = CommandKind> {
        (arb_unit_id(), arb_faction(), arb_vec2_position()).prop_map(|(unit_id, faction, position)| {
            CommandKind::SpawnDefinition {
                unit_id,
                faction,
                position,
                hp: None,
            }
        })
    }

    /// Generate any command payload.
    pub fn arb_command_kind() -> impl Strategy<Value = CommandKind> {
        prop_oneof![
            4 => arb_spawn_kind(),
            1 => (arb_role(), arb_faction(), arb_vec2_position(), proptest::option::of(arb_health()))
                .prop_map(|(role, faction, position, hp)| CommandKind::SpawnUnit { role, faction, position, hp }),
            1 => (arb_unit_ref(), arb_vec2_position())
                .prop_map(|(unit, destination)| CommandKind::MoveUnit { unit, destination }),
            1 => (arb_unit_ref(), arb_damage())
                .prop_map(|(unit, amount)| CommandKind::DamageUnit { unit, amount }),
            1 => arb_unit_ref().prop_map(|unit| CommandKind::KillUnit { unit }),
            1 => arb_unit_ref().prop_map(|unit| CommandKind::RemoveUnit { unit }),
            1 => (arb_unit_ref(), arb_health())
                .prop_map(|(unit, hp)| CommandKind::SetHealth { unit, hp }),
        ]
    }

    /// Generate a command stamped within `0..max_frame`.
    pub fn arb_command(max_frame: u32) -> impl Strategy<Value = SimCommand> {
        (0..max_frame.max(1), arb_command_kind()).prop_map(|(frame, kind)| SimCommand::new(frame, kind))
    }

    /// Generate a command script.
    pub fn arb_command_sequence(max_len: usize, max_frame: u32) -> impl Strategy<Value = Vec<SimCommand>> {
        proptest::collection::vec(arb_command(max_frame), 0..max_len)
    }
}
