//! Replay recording and playback.
//!
//! A replay stores an initial world snapshot and the stream of cast
//! requests with the tick each was enqueued on. Because the simulation
//! is deterministic, re-enqueueing the same commands at the same ticks
//! against the same definition books reproduces the session exactly;
//! the recorded final hash verifies it.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::clock::Tick;
use crate::command::SkillCommand;
use crate::error::{GameError, Result};
use crate::session::Session;
use crate::world::{World, WorldSnapshot};

/// Replay file format version for compatibility.
pub const REPLAY_VERSION: u32 = 1;

/// One recorded cast request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplayCommand {
    /// Tick the request was enqueued on.
    pub tick: Tick,
    /// The request itself.
    pub command: SkillCommand,
}

/// Complete replay data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Replay {
    /// Replay format version.
    pub version: u32,
    /// Scenario identifier or name.
    pub scenario_id: String,
    /// Seed the host used for any seeded randomness.
    pub seed: u64,
    /// Serialized initial world snapshot.
    pub initial_snapshot: Vec<u8>,
    /// Command stream in tick order.
    pub commands: Vec<ReplayCommand>,
    /// Final tick when the session ended.
    pub final_tick: Tick,
    /// Final world hash for verification.
    pub final_hash: u64,
}

impl Replay {
    /// Start a replay from a world's current state.
    pub fn new(scenario_id: impl Into<String>, seed: u64, initial: &World) -> Result<Self> {
        Ok(Self {
            version: REPLAY_VERSION,
            scenario_id: scenario_id.into(),
            seed,
            initial_snapshot: initial.create_snapshot().to_bytes()?,
            commands: Vec::new(),
            final_tick: 0,
            final_hash: 0,
        })
    }

    /// Record one cast request.
    pub fn record_command(&mut self, tick: Tick, command: SkillCommand) {
        self.commands.push(ReplayCommand { tick, command });
    }

    /// Stamp the end-of-session tick and hash.
    pub fn finalize(&mut self, final_tick: Tick, final_hash: u64) {
        self.final_tick = final_tick;
        self.final_hash = final_hash;
    }

    /// Save to a file.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let bytes =
            bincode::serialize(self).map_err(|e| GameError::SnapshotError(e.to_string()))?;
        std::fs::write(path.as_ref(), bytes)
            .map_err(|e| GameError::SnapshotError(e.to_string()))?;
        Ok(())
    }

    /// Load from a file, checking the format version.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let bytes =
            std::fs::read(path.as_ref()).map_err(|e| GameError::SnapshotError(e.to_string()))?;
        let replay: Self =
            bincode::deserialize(&bytes).map_err(|e| GameError::SnapshotError(e.to_string()))?;

        if replay.version != REPLAY_VERSION {
            return Err(GameError::InvalidState(format!(
                "replay version mismatch: expected {REPLAY_VERSION}, got {}",
                replay.version
            )));
        }

        Ok(replay)
    }

    /// Decode the initial world snapshot.
    pub fn initial_snapshot(&self) -> Result<WorldSnapshot> {
        WorldSnapshot::from_bytes(&self.initial_snapshot)
    }

    /// Total ticks recorded.
    #[must_use]
    pub const fn duration(&self) -> Tick {
        self.final_tick
    }

    /// Number of recorded commands.
    #[must_use]
    pub fn command_count(&self) -> usize {
        self.commands.len()
    }
}

/// Drives a session through a recorded replay.
pub struct ReplayPlayer {
    replay: Replay,
    session: Session,
    cursor: usize,
}

impl ReplayPlayer {
    /// Take over a session, rolling it back to the replay's initial
    /// snapshot.
    ///
    /// The session must be built with the same definition books and
    /// collaborators the recording ran against; the replay only
    /// restores world state.
    pub fn new(replay: Replay, mut session: Session) -> Result<Self> {
        let snapshot = replay.initial_snapshot()?;
        session.apply_snapshot(&snapshot);
        Ok(Self {
            replay,
            session,
            cursor: 0,
        })
    }

    /// Re-enqueue the commands recorded for the current tick and step
    /// once. Returns false when the replay is finished.
    pub fn advance(&mut self) -> Result<bool> {
        if self.is_finished() {
            return Ok(false);
        }

        let now = self.session.tick();
        while let Some(entry) = self.replay.commands.get(self.cursor) {
            if entry.tick > now {
                break;
            }
            self.session.enqueue(entry.command.clone());
            self.cursor += 1;
        }

        self.session.step()?;
        Ok(!self.is_finished())
    }

    /// Whether the session has reached the recorded end.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.session.tick() >= self.replay.final_tick
    }

    /// Current playback tick.
    #[must_use]
    pub fn current_tick(&self) -> Tick {
        self.session.tick()
    }

    /// The session being driven.
    #[must_use]
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Play to the end and compare the final hash against the recording.
    pub fn verify(&mut self) -> Result<bool> {
        while self.advance()? {}
        Ok(self.session.state_hash() == self.replay.final_hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{SeekRequest, SeekResult, TargetSeeker};
    use crate::data::{
        BuffData, CcData, SkillBook, SkillId, SkillSpec, StackBook, TargetMode,
    };
    use crate::math::{Fixed, Vec2Fixed};
    use crate::mechanism::{DamageParams, Mechanism};
    use crate::motor::{Circle, SpatialHit, SpatialQuery};
    use crate::stacks::{ActionGate, StatsMutator};
    use crate::world::{EntityData, LayerMask, LAYER_ENEMY};

    struct NoSpace;
    impl SpatialQuery for NoSpace {
        fn query_overlap(&self, _shape: &Circle, _mask: LayerMask) -> Vec<SpatialHit> {
            Vec::new()
        }
        fn query_cast(
            &self,
            _shape: &Circle,
            _direction: Vec2Fixed,
            _distance: Fixed,
            _mask: LayerMask,
        ) -> Vec<SpatialHit> {
            Vec::new()
        }
    }

    struct NoSeek;
    impl TargetSeeker for NoSeek {
        fn resolve(&mut self, request: &SeekRequest) -> SeekResult {
            SeekResult {
                target: None,
                anchor: request.origin,
                found: false,
            }
        }
    }

    struct NullStats;
    impl StatsMutator for NullStats {
        fn try_apply(&mut self, _buff: &BuffData) -> bool {
            true
        }
        fn try_remove(&mut self, _buff: &BuffData) -> bool {
            true
        }
    }

    struct NullGate;
    impl ActionGate for NullGate {
        fn apply_cc(&mut self, _cc: &CcData) {}
        fn remove_cc(&mut self, _cc: &CcData) {}
    }

    fn book() -> SkillBook {
        SkillBook::from_specs(vec![SkillSpec {
            id: SkillId(1),
            name: "strike".into(),
            delay_ticks: 0,
            detect: None,
            mechanism: Mechanism::Damage(DamageParams {
                power: Fixed::ONE,
                follow_ups: Vec::new(),
            }),
        }])
        .unwrap()
    }

    fn fresh_session() -> Session {
        Session::new(
            book(),
            StackBook::default(),
            Box::new(NoSpace),
            Box::new(NoSeek),
            Box::new(NullStats),
            Box::new(NullGate),
        )
    }

    #[test]
    fn test_record_and_verify_roundtrip() {
        // Record a short session.
        let mut session = fresh_session();
        let caster = session.spawn(EntityData::default()).unwrap();
        let target = session
            .spawn(EntityData::new(Vec2Fixed::from_units(2, 0), LAYER_ENEMY))
            .unwrap();

        let mut replay = Replay::new("duel", 42, session.world()).unwrap();

        let command = crate::command::SkillCommand {
            caster,
            skill: SkillId(1),
            target_mode: TargetMode::Unit,
            cast_position: Vec2Fixed::from_units(2, 0),
            damage: crate::command::DamagePayload {
                base: 10,
                power_scale: Fixed::ONE,
            },
            variables: crate::command::VariableSnapshot::new(),
            target: Some(target),
        };
        replay.record_command(session.tick(), command.clone());
        session.enqueue(command);

        for _ in 0..10 {
            session.step().unwrap();
        }
        replay.finalize(session.tick(), session.state_hash());

        // Play it back on a fresh session with the same books.
        let mut player = ReplayPlayer::new(replay, fresh_session()).unwrap();
        assert!(player.verify().unwrap());
        assert_eq!(player.current_tick(), 10);
    }

    #[test]
    fn test_save_load_checks_version() {
        let session = fresh_session();
        let mut replay = Replay::new("empty", 7, session.world()).unwrap();
        replay.finalize(3, session.state_hash());

        let path = std::env::temp_dir().join("arena_replay_test.bin");
        replay.save(&path).unwrap();

        let loaded = Replay::load(&path).unwrap();
        assert_eq!(loaded.scenario_id, "empty");
        assert_eq!(loaded.seed, 7);
        assert_eq!(loaded.duration(), 3);
        assert_eq!(loaded.command_count(), 0);

        let _ = std::fs::remove_file(path);
    }
}
