//! Determinism testing utilities.
//!
//! A lockstep action game must produce identical results given
//! identical inputs on every run and every platform. Sources of
//! non-determinism this harness exists to catch:
//!
//! - **Floating-point math**: different CPUs can produce different
//!   results. The core uses fixed-point arithmetic throughout.
//! - **HashMap iteration order**: Rust's default hasher is randomized.
//!   The core iterates ordered collections or sorted ids.
//! - **System randomness**: all "random" behavior must use seeded PRNGs
//!   on the host side; the core takes none.
//!
//! # Test Levels
//!
//! 1. **Unit tests**: individual subsystem determinism
//! 2. **Property tests**: random inputs must still produce
//!    deterministic outputs
//! 3. **Integration tests**: full session scenarios are reproducible

use arena_core::session::Session;

/// Result of a determinism test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeterminismResult {
    /// Whether all runs produced identical results.
    pub is_deterministic: bool,
    /// Hashes from each run.
    pub hashes: Vec<u64>,
    /// Number of ticks simulated.
    pub ticks: u64,
}

impl DeterminismResult {
    /// Get all unique hashes (should be 1 for a deterministic run).
    #[must_use]
    pub fn unique_hashes(&self) -> Vec<u64> {
        let mut unique: Vec<u64> = self.hashes.clone();
        unique.sort_unstable();
        unique.dedup();
        unique
    }

    /// Assert determinism with a detailed error message.
    ///
    /// # Panics
    ///
    /// Panics if runs produced different hashes.
    pub fn assert_deterministic(&self) {
        if !self.is_deterministic {
            let unique = self.unique_hashes();
            panic!(
                "Simulation is non-deterministic!\n\
                 Runs: {}\n\
                 Ticks: {}\n\
                 Unique hashes: {} (expected 1)\n\
                 All hashes: {:?}",
                self.hashes.len(),
                self.ticks,
                unique.len(),
                self.hashes
            );
        }
    }
}

/// Run a scenario multiple times and verify all runs hash identically.
///
/// # Arguments
///
/// * `runs` - Number of times to run the scenario
/// * `ticks` - Number of ticks to simulate per run
/// * `setup` - Function creating the initial state
/// * `step` - Function advancing the state by one tick
/// * `hash` - Function computing the state hash
pub fn verify_determinism<S, Setup, Step, HashFn>(
    runs: usize,
    ticks: u64,
    setup: Setup,
    step: Step,
    hash: HashFn,
) -> DeterminismResult
where
    Setup: Fn() -> S,
    Step: Fn(&mut S),
    HashFn: Fn(&S) -> u64,
{
    let mut hashes = Vec::with_capacity(runs);

    for _ in 0..runs {
        let mut state = setup();

        for _ in 0..ticks {
            step(&mut state);
        }

        hashes.push(hash(&state));
    }

    let is_deterministic = hashes.windows(2).all(|w| w[0] == w[1]);

    DeterminismResult {
        is_deterministic,
        hashes,
        ticks,
    }
}

/// Run a session scenario twice and verify the final hashes match.
///
/// The setup closure builds and seeds the session (spawns, queued
/// casts); the harness steps it `num_ticks` times per run.
pub fn verify_session_determinism<F>(setup_fn: F, num_ticks: u64) -> bool
where
    F: Fn() -> Session,
{
    let result = verify_determinism(
        2,
        num_ticks,
        &setup_fn,
        |session| {
            session.step().expect("clock overflow in test");
        },
        Session::state_hash,
    );
    result.is_deterministic
}

/// Run two sessions tick-by-tick and report the first divergence.
///
/// `None` means the scenario is deterministic over the window.
pub fn find_first_divergence<F>(setup_fn: F, num_ticks: u64) -> Option<u64>
where
    F: Fn() -> Session,
{
    let mut first = setup_fn();
    let mut second = setup_fn();

    if first.state_hash() != second.state_hash() {
        return Some(0);
    }

    for tick in 1..=num_ticks {
        first.step().expect("clock overflow in test");
        second.step().expect("clock overflow in test");

        if first.state_hash() != second.state_hash() {
            return Some(tick);
        }
    }

    None
}

/// Verify that a snapshot round-trip preserves the world exactly.
pub fn verify_snapshot_determinism<F>(setup_fn: F, num_ticks: u64) -> bool
where
    F: Fn() -> Session,
{
    let mut session = setup_fn();

    for _ in 0..num_ticks {
        session.step().expect("clock overflow in test");
    }

    let hash_before = session.state_hash();

    let snapshot = session.create_snapshot();
    let bytes = match snapshot.to_bytes() {
        Ok(b) => b,
        Err(_) => return false,
    };
    let decoded = match arena_core::world::WorldSnapshot::from_bytes(&bytes) {
        Ok(s) => s,
        Err(_) => return false,
    };

    let mut restored = setup_fn();
    restored.apply_snapshot(&decoded);

    restored.state_hash() == hash_before
}

/// Proptest strategies for determinism testing.
///
/// These generate random but reproducible inputs for property-based
/// tests over session scenarios.
pub mod strategies {
    use arena_core::math::{Fixed, Vec2Fixed};
    use proptest::prelude::*;

    use crate::fixtures::demo;
    use arena_core::data::SkillId;

    /// A fixed-point coordinate in a typical arena range.
    pub fn arb_fixed_position() -> impl Strategy<Value = Fixed> {
        (-1000i32..1000i32).prop_map(Fixed::from_num)
    }

    /// A fixed-point 2D position.
    pub fn arb_vec2_position() -> impl Strategy<Value = Vec2Fixed> {
        (arb_fixed_position(), arb_fixed_position()).prop_map(|(x, y)| Vec2Fixed::new(x, y))
    }

    /// Any skill id from the demo book.
    pub fn arb_demo_skill() -> impl Strategy<Value = SkillId> {
        prop_oneof![
            Just(demo::STRIKE),
            Just(demo::BOLT),
            Just(demo::FOCUS),
            Just(demo::LUNGE),
            Just(demo::BLINK),
            Just(demo::NOVA),
        ]
    }

    /// A cast schedule: (tick gap before the cast, skill, aim at target).
    pub fn arb_cast_schedule(max_len: usize) -> impl Strategy<Value = Vec<(u8, SkillId, bool)>> {
        proptest::collection::vec((0u8..5u8, arb_demo_skill(), any::<bool>()), 0..max_len)
    }
}
