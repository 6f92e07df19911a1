//! Command pipeline: from "cast this skill" to one deterministic execution.
//!
//! Requests collect in one buffer while a second buffer resolves; the
//! two swap at each tick boundary. A freshly swapped command registers
//! its declared delay with the [`DelayJudge`] and waits in a scheduled
//! set; completed entries execute exactly once. Because follow-ups
//! enqueued during execution land in the *collecting* buffer, a command
//! chain can never run twice in one tick - the one-tick latency is a
//! structural guarantee, not a convention.
//!
//! Per-tick order is fixed: swap, then schedule, then resolve. Hosts
//! pass the same tick value here and to every other subsystem that
//! frame.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::clock::Tick;
use crate::data::{SkillBook, SkillId, StackDefId, TargetMode};
use crate::delay::{DelayHandle, DelayJudge};
use crate::math::{fixed_serde, Fixed, Vec2Fixed};
use crate::mechanism::{CastContext, ExecutionEnv};
use crate::world::{EntityId, LayerMask};

/// Caster variable counters captured at cast time.
///
/// Keyed by definition; the ledger's visible view summed per
/// definition. Switch mechanisms branch on these cast-time values.
pub type VariableSnapshot = BTreeMap<StackDefId, u16>;

/// Damage numbers snapshotted into a command when it is created.
///
/// The core passes the payload through unchanged; mitigation formulas
/// belong to the host's stats layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DamagePayload {
    /// Base damage before scaling.
    pub base: u32,
    /// Caster power multiplier at cast time.
    #[serde(with = "fixed_serde")]
    pub power_scale: Fixed,
}

impl Default for DamagePayload {
    fn default() -> Self {
        Self {
            base: 0,
            power_scale: Fixed::ONE,
        }
    }
}

/// An immutable cast request.
///
/// Created by a caster-side controller, consumed exactly once by the
/// pipeline, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkillCommand {
    /// Who is casting.
    pub caster: EntityId,
    /// Which skill.
    pub skill: SkillId,
    /// How the cast selects its target.
    pub target_mode: TargetMode,
    /// Position the cast was aimed at.
    pub cast_position: Vec2Fixed,
    /// Damage payload snapshot.
    pub damage: DamagePayload,
    /// Caster variable snapshot.
    pub variables: VariableSnapshot,
    /// Explicit target; `None` lets the skill's detection run.
    pub target: Option<EntityId>,
}

/// A cast that executed this tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutedCast {
    /// The caster.
    pub caster: EntityId,
    /// The skill that ran.
    pub skill: SkillId,
    /// Target it resolved against, if any.
    pub target: Option<EntityId>,
}

/// Damage dealt by a mechanism.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DamageEvent {
    /// Damage source.
    pub source: EntityId,
    /// Damage recipient.
    pub target: EntityId,
    /// Final rolled amount.
    pub amount: u32,
}

/// An actor was moved by a mechanism.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MotionEvent {
    /// Who moved.
    pub actor: EntityId,
    /// Position before.
    pub from: Vec2Fixed,
    /// Position after.
    pub to: Vec2Fixed,
    /// A wall limited the motion.
    pub hit_wall: bool,
    /// An enemy body limited the motion.
    pub hit_enemy: bool,
    /// First blocker contacted.
    pub blocked_by: Option<EntityId>,
}

/// Everything that happened during one tick, for the host layer
/// (effects, sounds, animation triggers).
#[derive(Debug, Clone, Default)]
pub struct TickEvents {
    /// Casts that executed.
    pub executed: Vec<ExecutedCast>,
    /// Damage dealt.
    pub damage: Vec<DamageEvent>,
    /// Motion applied.
    pub motion: Vec<MotionEvent>,
}

/// Target acquisition request passed to the host seeker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeekRequest {
    /// Who is looking.
    pub caster: EntityId,
    /// Where the search starts.
    pub origin: Vec2Fixed,
    /// Minimum acquisition range.
    pub min_range: Fixed,
    /// Maximum acquisition range.
    pub max_range: Fixed,
    /// Seek mode.
    pub mode: TargetMode,
    /// Eligible target layers.
    pub mask: LayerMask,
}

/// Answer from the host seeker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeekResult {
    /// Acquired target, if the mode produces one.
    pub target: Option<EntityId>,
    /// Anchor position for the cast.
    pub anchor: Vec2Fixed,
    /// Whether acquisition succeeded at all.
    pub found: bool,
}

/// Target-seeking collaborator provided by the host.
pub trait TargetSeeker {
    /// Resolve a seek request. A `found = false` answer silently drops
    /// the command - an expected, frequent outcome, not a fault.
    fn resolve(&mut self, request: &SeekRequest) -> SeekResult;
}

/// Double-buffered, delay-judged skill command queue.
#[derive(Debug, Default)]
pub struct CommandPipeline {
    collecting: Vec<SkillCommand>,
    resolving: Vec<SkillCommand>,
    scheduled: BTreeMap<DelayHandle, SkillCommand>,
    judge: DelayJudge,
    disabled: BTreeSet<EntityId>,
}

impl CommandPipeline {
    /// Create an empty pipeline.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a cast request for a later tick.
    ///
    /// Returns false when the caster has been disabled by an earlier
    /// configuration error; the request is dropped in that case.
    pub fn enqueue(&mut self, command: SkillCommand) -> bool {
        if self.disabled.contains(&command.caster) {
            tracing::trace!(caster = ?command.caster, "enqueue from disabled caster ignored");
            return false;
        }
        self.collecting.push(command);
        true
    }

    /// Whether a caster was disabled by a configuration error.
    #[must_use]
    pub fn is_disabled(&self, caster: EntityId) -> bool {
        self.disabled.contains(&caster)
    }

    /// Commands waiting anywhere in the pipeline.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.collecting.len() + self.resolving.len() + self.scheduled.len()
    }

    /// Drop every queued and scheduled command for one actor and revoke
    /// their delay handles. Nothing of the actor's executes after this
    /// call returns.
    pub fn cease(&mut self, caster: EntityId) {
        self.collecting.retain(|cmd| cmd.caster != caster);
        self.resolving.retain(|cmd| cmd.caster != caster);

        let revoked: Vec<DelayHandle> = self
            .scheduled
            .iter()
            .filter(|(_, cmd)| cmd.caster == caster)
            .map(|(handle, _)| *handle)
            .collect();
        for handle in revoked {
            self.judge.remove(handle);
            self.scheduled.remove(&handle);
        }
    }

    /// Drop everything for every actor.
    pub fn cease_all(&mut self) {
        self.collecting.clear();
        self.resolving.clear();
        let handles: Vec<DelayHandle> = self.scheduled.keys().copied().collect();
        for handle in handles {
            self.judge.remove(handle);
        }
        self.scheduled.clear();
    }

    /// Run the per-tick state machine: swap, schedule, resolve.
    ///
    /// Execution happens inside this call; mechanisms receive `env` and
    /// their follow-ups are re-enqueued into the collecting buffer, so
    /// nothing a mechanism does can run before the next tick.
    pub fn tick(
        &mut self,
        tick: Tick,
        book: &SkillBook,
        seeker: &mut dyn TargetSeeker,
        env: &mut ExecutionEnv<'_>,
    ) {
        // Swap: what was collected last tick becomes this tick's work.
        std::mem::swap(&mut self.collecting, &mut self.resolving);

        // Schedule: register declared delays and move commands into the
        // scheduled set keyed by their delay handle.
        let incoming: Vec<SkillCommand> = self.resolving.drain(..).collect();
        for command in incoming {
            if self.disabled.contains(&command.caster) {
                continue;
            }
            let Some(spec) = book.get(command.skill) else {
                tracing::warn!(
                    caster = ?command.caster,
                    skill = command.skill.0,
                    "unknown skill in command; disabling caster"
                );
                self.disabled.insert(command.caster);
                continue;
            };
            let handle = self.judge.start(tick, spec.delay_ticks);
            self.scheduled.insert(handle, command);
        }

        // Resolve: execute every scheduled command whose delay has
        // completed, in handle order for determinism.
        let ready: Vec<DelayHandle> = self
            .scheduled
            .keys()
            .copied()
            .filter(|handle| self.judge.is_completed(*handle, tick))
            .collect();

        for handle in ready {
            self.judge.remove(handle);
            let Some(command) = self.scheduled.remove(&handle) else {
                continue;
            };
            self.execute(tick, command, book, seeker, env);
        }
    }

    fn execute(
        &mut self,
        tick: Tick,
        command: SkillCommand,
        book: &SkillBook,
        seeker: &mut dyn TargetSeeker,
        env: &mut ExecutionEnv<'_>,
    ) {
        let Some(spec) = book.get(command.skill) else {
            return;
        };

        let mut target = command.target;
        let mut anchor = command.cast_position;

        if let Some(known) = target {
            if let Some(position) = env.world.position(known) {
                anchor = position;
            }
        } else if let Some(detect) = &spec.detect {
            let origin = env
                .world
                .position(command.caster)
                .unwrap_or(command.cast_position);
            let request = SeekRequest {
                caster: command.caster,
                origin,
                min_range: detect.min_range,
                max_range: detect.max_range,
                mode: detect.mode,
                mask: detect.mask,
            };
            let answer = seeker.resolve(&request);
            if !answer.found {
                // By design: no error, no retry. The cast just fizzles.
                tracing::trace!(
                    caster = ?command.caster,
                    skill = command.skill.0,
                    "target seek failed; command dropped"
                );
                return;
            }
            target = answer.target;
            anchor = answer.anchor;
        }

        let context = CastContext {
            caster: command.caster,
            target,
            target_mode: command.target_mode,
            cast_position: command.cast_position,
            anchor,
            damage: &command.damage,
            variables: &command.variables,
            tick,
        };

        let follow_ups = spec.mechanism.execute(&context, env);

        env.events.executed.push(ExecutedCast {
            caster: command.caster,
            skill: command.skill,
            target,
        });

        // Follow-ups land in the collecting buffer: they wait at least
        // one further tick, which closes the same-tick recursion hole.
        for reference in follow_ups {
            let chained = SkillCommand {
                caster: command.caster,
                skill: reference.skill,
                target_mode: command.target_mode,
                cast_position: anchor,
                damage: command.damage,
                variables: command.variables.clone(),
                target: if reference.require_retarget {
                    None
                } else {
                    target
                },
            };
            self.enqueue(chained);
        }
    }
}
