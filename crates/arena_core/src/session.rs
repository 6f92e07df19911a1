//! Session: the composition root.
//!
//! One [`Session`] owns every simulation component for one actor group
//! and wires them together explicitly - there are no global singletons
//! and no implicit event subscription. Each [`Session::step`] advances
//! the clock by exactly one tick and dispatches the components in a
//! fixed registration order with that single tick value:
//!
//! 1. Command pipeline (swap, schedule, resolve, execute).
//! 2. Stack ledgers, in ascending actor order.
//!
//! Collaborators (spatial queries, target seeking, stats, action
//! gating) are injected at construction and never replaced mid-session.

use std::collections::BTreeMap;

use crate::clock::{Tick, TickClock};
use crate::command::{
    CommandPipeline, DamagePayload, SkillCommand, TargetSeeker, TickEvents, VariableSnapshot,
};
use crate::data::{SkillBook, SkillId, StackBook, StackDefId, TargetMode};
use crate::error::Result;
use crate::mechanism::ExecutionEnv;
use crate::motor::{Motor, SpatialQuery};
use crate::stacks::{ActionGate, StackKey, StackLedger, StatsMutator};
use crate::world::{EntityData, EntityId, World, WorldSnapshot};

/// Owns and drives one deterministic simulation instance.
///
/// Hosts that parallelize across independent actor groups create one
/// session per group; instances share nothing.
pub struct Session {
    clock: TickClock,
    world: World,
    pipeline: CommandPipeline,
    ledgers: BTreeMap<EntityId, StackLedger>,
    motors: BTreeMap<EntityId, Motor>,
    skills: SkillBook,
    stacks: StackBook,
    spatial: Box<dyn SpatialQuery>,
    seeker: Box<dyn TargetSeeker>,
    stats: Box<dyn StatsMutator>,
    gate: Box<dyn ActionGate>,
}

impl Session {
    /// Build a session from definition books and host collaborators.
    #[must_use]
    pub fn new(
        skills: SkillBook,
        stacks: StackBook,
        spatial: Box<dyn SpatialQuery>,
        seeker: Box<dyn TargetSeeker>,
        stats: Box<dyn StatsMutator>,
        gate: Box<dyn ActionGate>,
    ) -> Self {
        Self {
            clock: TickClock::new(),
            world: World::new(),
            pipeline: CommandPipeline::new(),
            ledgers: BTreeMap::new(),
            motors: BTreeMap::new(),
            skills,
            stacks,
            spatial,
            seeker,
            stats,
            gate,
        }
    }

    /// Advance the simulation by exactly one tick.
    ///
    /// The external driver calls this at its fixed cadence. Within the
    /// call: buffer swap before scheduling, scheduling before the
    /// resolution scan, pipeline before ledger sweep - every component
    /// sees the same tick value.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::GameError::TickOverflow`] when the tick
    /// counter is exhausted; the session is over and must be discarded.
    pub fn step(&mut self) -> Result<TickEvents> {
        let tick = self.clock.step()?;
        self.world.set_tick(tick);

        let mut events = TickEvents::default();
        {
            let mut env = ExecutionEnv {
                world: &mut self.world,
                ledgers: &mut self.ledgers,
                motors: &mut self.motors,
                spatial: self.spatial.as_ref(),
                stats: self.stats.as_mut(),
                gate: self.gate.as_mut(),
                stack_book: &self.stacks,
                events: &mut events,
            };
            self.pipeline
                .tick(tick, &self.skills, self.seeker.as_mut(), &mut env);
        }

        for ledger in self.ledgers.values_mut() {
            ledger.tick(&self.stacks, tick, self.stats.as_mut(), self.gate.as_mut());
        }

        tracing::debug!(tick, state_hash = self.world.state_hash(), "tick complete");

        Ok(events)
    }

    /// Current tick.
    #[must_use]
    pub fn tick(&self) -> Tick {
        self.clock.current()
    }

    /// Read access to the entity world.
    #[must_use]
    pub fn world(&self) -> &World {
        &self.world
    }

    /// Spawn an entity.
    pub fn spawn(&mut self, data: EntityData) -> Result<EntityId> {
        self.world.spawn(data)
    }

    /// Despawn an entity, revoking its queued casts and dropping its
    /// ledger and motor.
    pub fn despawn(&mut self, id: EntityId) -> Result<()> {
        self.pipeline.cease(id);
        self.ledgers.remove(&id);
        self.motors.remove(&id);
        self.world.despawn(id)
    }

    /// Queue a raw cast request. Returns false if the caster is
    /// disabled.
    pub fn enqueue(&mut self, command: SkillCommand) -> bool {
        self.pipeline.enqueue(command)
    }

    /// Queue a cast built from the caster's current state: position,
    /// default payload, and the visible variable snapshot.
    pub fn cast(&mut self, caster: EntityId, skill: SkillId, target: Option<EntityId>) -> bool {
        let cast_position = target
            .and_then(|t| self.world.position(t))
            .or_else(|| self.world.position(caster))
            .unwrap_or_default();
        let variables = self.variable_snapshot(caster);
        self.enqueue(SkillCommand {
            caster,
            skill,
            target_mode: if target.is_some() {
                TargetMode::Unit
            } else {
                TargetMode::Point
            },
            cast_position,
            damage: DamagePayload::default(),
            variables,
            target,
        })
    }

    /// Drop all pipeline state for one actor.
    pub fn cease(&mut self, caster: EntityId) {
        self.pipeline.cease(caster);
    }

    /// Drop all pipeline state for every actor.
    pub fn cease_all(&mut self) {
        self.pipeline.cease_all();
    }

    /// The caster's visible variable counters (the cast-time snapshot).
    #[must_use]
    pub fn variable_snapshot(&self, actor: EntityId) -> VariableSnapshot {
        self.ledgers
            .get(&actor)
            .map(|ledger| ledger.visible_variables(&self.stacks))
            .unwrap_or_default()
    }

    /// Apply a stack to `target`, attributed to `applier`, at the
    /// current tick.
    pub fn apply_stack(
        &mut self,
        target: EntityId,
        stack: StackDefId,
        applier: EntityId,
        amount: u16,
        duration: Tick,
    ) {
        let tick = self.clock.current();
        let ledger = self.ledgers.entry(target).or_default();
        ledger.apply_stack(
            &self.stacks,
            StackKey::new(stack, applier),
            amount,
            tick,
            duration,
            self.stats.as_mut(),
            self.gate.as_mut(),
        );
    }

    /// Forcibly remove a variable stack from `target`.
    pub fn detach_variable(&mut self, target: EntityId, stack: StackDefId, applier: EntityId) {
        let tick = self.clock.current();
        let ledger = self.ledgers.entry(target).or_default();
        ledger.detach_variable(&self.stacks, StackKey::new(stack, applier), tick);
    }

    /// Read access to an actor's stack ledger, if it has one.
    #[must_use]
    pub fn ledger(&self, actor: EntityId) -> Option<&StackLedger> {
        self.ledgers.get(&actor)
    }

    /// The stack definition book.
    #[must_use]
    pub fn stack_book(&self) -> &StackBook {
        &self.stacks
    }

    /// Mutable access to an actor's motor (created on first use), for
    /// per-actor collision policy configuration.
    pub fn motor_mut(&mut self, actor: EntityId) -> &mut Motor {
        self.motors.entry(actor).or_default()
    }

    /// Snapshot the world for rollback.
    #[must_use]
    pub fn create_snapshot(&self) -> WorldSnapshot {
        self.world.create_snapshot()
    }

    /// Roll the world (and the clock) back to a snapshot.
    pub fn apply_snapshot(&mut self, snapshot: &WorldSnapshot) {
        self.world.apply_snapshot(snapshot);
        self.clock = TickClock::starting_at(snapshot.tick);
    }

    /// Hash of the world state, for desync detection.
    #[must_use]
    pub fn state_hash(&self) -> u64 {
        self.world.state_hash()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{SeekRequest, SeekResult};
    use crate::data::{BuffData, CcData, StackKind, StackSpec};
    use crate::math::{Fixed, Vec2Fixed};
    use crate::mechanism::{DamageParams, Mechanism, StackApplyParams};
    use crate::motor::{Circle, SpatialHit};
    use crate::world::LayerMask;

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

    fn books() -> (SkillBook, StackBook) {
        let skills = SkillBook::from_specs(vec![
            SkillSpecFixture::strike(1),
            SkillSpecFixture::mark(2, 4),
        ])
        .unwrap();
        let stacks = StackBook::from_specs(vec![StackSpec {
            id: StackDefId(4),
            name: "mark".into(),
            max_stacks: 3,
            default_duration: 20,
            kind: StackKind::Variable,
            period: None,
            exclusive: Vec::new(),
        }])
        .unwrap();
        (skills, stacks)
    }

    /// Minimal local fixtures; richer builders live in the shared
    /// test-utils crate for integration tests.
    struct SkillSpecFixture;

    impl SkillSpecFixture {
        fn strike(id: u16) -> crate::data::SkillSpec {
            crate::data::SkillSpec {
                id: SkillId(id),
                name: format!("strike_{id}"),
                delay_ticks: 0,
                detect: None,
                mechanism: Mechanism::Damage(DamageParams {
                    power: Fixed::ONE,
                    follow_ups: Vec::new(),
                }),
            }
        }

        fn mark(id: u16, stack: u16) -> crate::data::SkillSpec {
            crate::data::SkillSpec {
                id: SkillId(id),
                name: format!("mark_{id}"),
                delay_ticks: 0,
                detect: None,
                mechanism: Mechanism::ApplyStack(StackApplyParams {
                    stack: StackDefId(stack),
                    amount: 1,
                    duration: 0,
                    follow_ups: Vec::new(),
                }),
            }
        }
    }

    fn session() -> Session {
        let (skills, stacks) = books();
        Session::new(
            skills,
            stacks,
            Box::new(NoSpace),
            Box::new(NoSeek),
            Box::new(NullStats),
            Box::new(NullGate),
        )
    }

    #[test]
    fn test_cast_executes_after_the_pipeline_latency() {
        let mut session = session();
        let caster = session.spawn(EntityData::default()).unwrap();
        let target = session
            .spawn(EntityData::new(Vec2Fixed::from_units(1, 0), crate::world::LAYER_ENEMY))
            .unwrap();

        assert!(session.cast(caster, SkillId(1), Some(target)));

        let events = session.step().unwrap();
        assert!(events.executed.is_empty());

        let events = session.step().unwrap();
        assert_eq!(events.executed.len(), 1);
        assert_eq!(events.damage.len(), 1);
        assert_eq!(events.damage[0].target, target);
    }

    #[test]
    fn test_stack_cast_lands_on_target_ledger() {
        let mut session = session();
        let caster = session.spawn(EntityData::default()).unwrap();
        let target = session.spawn(EntityData::default()).unwrap();

        session.cast(caster, SkillId(2), Some(target));
        session.step().unwrap();
        session.step().unwrap();

        let key = StackKey::new(StackDefId(4), caster);
        assert_eq!(session.ledger(target).unwrap().amount(key), 1);

        // Default duration 20 from the definition: gone after expiry.
        for _ in 0..20 {
            session.step().unwrap();
        }
        assert_eq!(session.ledger(target).unwrap().amount(key), 0);
    }

    #[test]
    fn test_snapshot_rolls_back_world_and_clock() {
        let mut session = session();
        let caster = session.spawn(EntityData::default()).unwrap();
        session.step().unwrap();
        session.step().unwrap();

        let snapshot = session.create_snapshot();
        let hash_at_snapshot = session.state_hash();

        let _more = session.spawn(EntityData::default()).unwrap();
        session.step().unwrap();
        assert_ne!(session.state_hash(), hash_at_snapshot);

        session.apply_snapshot(&snapshot);
        assert_eq!(session.tick(), 2);
        assert_eq!(session.state_hash(), hash_at_snapshot);
        assert!(session.world().contains(caster));
    }

    #[test]
    fn test_despawn_revokes_pending_casts() {
        let mut session = session();
        let caster = session.spawn(EntityData::default()).unwrap();
        let target = session.spawn(EntityData::default()).unwrap();

        session.cast(caster, SkillId(1), Some(target));
        session.despawn(caster).unwrap();

        let events = session.step().unwrap();
        let events2 = session.step().unwrap();
        assert!(events.executed.is_empty());
        assert!(events2.executed.is_empty());
    }
}
