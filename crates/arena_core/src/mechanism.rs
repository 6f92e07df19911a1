//! Skill mechanisms: the behaviors a cast can invoke.
//!
//! A mechanism is one unit of skill behavior - deal damage, dash,
//! teleport, apply a stack - executed with a cast context once its
//! command resolves. Mechanisms are a closed tagged enum with a
//! parallel parameter record per variant, all data-defined: a skill
//! book entry pairs a [`Mechanism`] with delay and detection data, and
//! follow-up references chain mechanisms into multi-stage skills.
//!
//! Execution never enqueues into the pipeline directly; it returns the
//! follow-up references and the pipeline defers them to a later tick.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::clock::Tick;
use crate::command::{DamageEvent, DamagePayload, MotionEvent, TickEvents, VariableSnapshot};
use crate::data::{MechanismRef, StackBook, StackDefId, TargetMode};
use crate::math::{fixed_serde, Fixed, Vec2Fixed};
use crate::motor::{Circle, CollisionPolicy, Motor, SpatialQuery};
use crate::stacks::{ActionGate, StackKey, StackLedger, StatsMutator};
use crate::world::{EntityId, LayerMask, World};

/// Everything a mechanism may read about the cast it is executing.
#[derive(Debug)]
pub struct CastContext<'a> {
    /// Who cast the skill.
    pub caster: EntityId,
    /// Resolved target, if any.
    pub target: Option<EntityId>,
    /// How the cast selected its target.
    pub target_mode: TargetMode,
    /// Position the cast was aimed at.
    pub cast_position: Vec2Fixed,
    /// Anchor resolved by target seeking (falls back to the cast
    /// position when no seek ran).
    pub anchor: Vec2Fixed,
    /// Damage payload snapshotted at cast time.
    pub damage: &'a DamagePayload,
    /// Caster's visible variable counters at cast time.
    pub variables: &'a VariableSnapshot,
    /// Tick the mechanism executes on.
    pub tick: Tick,
}

/// Mutable simulation state a mechanism executes against.
///
/// Borrowed field-by-field from the session for the duration of one
/// pipeline tick; mechanisms reach collaborators only through here.
pub struct ExecutionEnv<'a> {
    /// Entity table.
    pub world: &'a mut World,
    /// Per-actor stack ledgers, keyed by the owning entity.
    pub ledgers: &'a mut BTreeMap<EntityId, StackLedger>,
    /// Per-actor motors.
    pub motors: &'a mut BTreeMap<EntityId, Motor>,
    /// Spatial query provider.
    pub spatial: &'a dyn SpatialQuery,
    /// Host stats mutator (buff side effects).
    pub stats: &'a mut dyn StatsMutator,
    /// Host action gate (crowd-control side effects).
    pub gate: &'a mut dyn ActionGate,
    /// Stack definitions.
    pub stack_book: &'a StackBook,
    /// Event sink for this tick.
    pub events: &'a mut TickEvents,
}

impl ExecutionEnv<'_> {
    /// Apply a stack to `target`, attributed to `applier`.
    pub fn apply_stack_to(
        &mut self,
        target: EntityId,
        stack: StackDefId,
        applier: EntityId,
        amount: u16,
        tick: Tick,
        duration: Tick,
    ) {
        let ledger = self.ledgers.entry(target).or_default();
        ledger.apply_stack(
            self.stack_book,
            StackKey::new(stack, applier),
            amount,
            tick,
            duration,
            self.stats,
            self.gate,
        );
    }

    /// Detach a variable stack from `target`.
    pub fn detach_from(
        &mut self,
        target: EntityId,
        stack: StackDefId,
        applier: EntityId,
        tick: Tick,
    ) {
        let ledger = self.ledgers.entry(target).or_default();
        ledger.detach_variable(self.stack_book, StackKey::new(stack, applier), tick);
    }
}

/// Parameters for [`Mechanism::Damage`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DamageParams {
    /// Multiplier on the command's damage payload.
    #[serde(with = "fixed_serde")]
    pub power: Fixed,
    /// Mechanisms to chain after this one.
    #[serde(default)]
    pub follow_ups: Vec<MechanismRef>,
}

/// Parameters for [`Mechanism::Dash`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashParams {
    /// Dash length toward the anchor.
    #[serde(with = "fixed_serde")]
    pub distance: Fixed,
    /// Mechanisms to chain after this one.
    #[serde(default)]
    pub follow_ups: Vec<MechanismRef>,
}

/// Parameters for [`Mechanism::Teleport`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeleportParams {
    /// Maximum jump range; longer requests clamp to this.
    #[serde(with = "fixed_serde")]
    pub max_distance: Fixed,
    /// Mechanisms to chain after this one.
    #[serde(default)]
    pub follow_ups: Vec<MechanismRef>,
}

/// Parameters for [`Mechanism::Projectile`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectileParams {
    /// Flight range.
    #[serde(with = "fixed_serde")]
    pub max_distance: Fixed,
    /// Projectile body radius.
    #[serde(with = "fixed_serde")]
    pub radius: Fixed,
    /// Layers the projectile can hit.
    pub hit_mask: LayerMask,
    /// Mechanisms chained on a hit; a clean miss drops them.
    #[serde(default)]
    pub follow_ups: Vec<MechanismRef>,
}

/// Stack application fanned out per target by an area mechanism.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackApplication {
    /// Stack definition to apply.
    pub stack: StackDefId,
    /// Stacks per hit.
    pub amount: u16,
    /// Duration override; 0 defers to the definition default.
    pub duration: Tick,
}

/// Parameters for [`Mechanism::Area`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AreaParams {
    /// Effect radius around the anchor.
    #[serde(with = "fixed_serde")]
    pub radius: Fixed,
    /// Layers affected.
    pub mask: LayerMask,
    /// Optional per-target stack application.
    #[serde(default)]
    pub apply: Option<StackApplication>,
    /// Mechanisms to chain after this one.
    #[serde(default)]
    pub follow_ups: Vec<MechanismRef>,
}

/// Parameters for [`Mechanism::ApplyStack`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackApplyParams {
    /// Stack definition to apply.
    pub stack: StackDefId,
    /// Stacks to add.
    pub amount: u16,
    /// Duration override; 0 defers to the definition default.
    pub duration: Tick,
    /// Mechanisms to chain after this one.
    #[serde(default)]
    pub follow_ups: Vec<MechanismRef>,
}

/// Parameters for [`Mechanism::DetachStack`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackDetachParams {
    /// Stack definition to detach.
    pub stack: StackDefId,
    /// Mechanisms to chain after this one.
    #[serde(default)]
    pub follow_ups: Vec<MechanismRef>,
}

/// One branch of a [`Mechanism::Switch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwitchBranch {
    /// Variable count this branch matches.
    pub count: u16,
    /// Mechanism invoked when it matches.
    pub then: MechanismRef,
}

/// Parameters for [`Mechanism::Switch`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwitchParams {
    /// Variable counter to branch on (read from the cast-time snapshot).
    pub variable: StackDefId,
    /// Branches checked in order.
    pub branches: Vec<SwitchBranch>,
    /// Fallback when no branch matches.
    #[serde(default)]
    pub default: Option<MechanismRef>,
}

/// A polymorphic unit of skill behavior.
///
/// Closed variant: every behavior the data can reference is a case
/// here, matched against its own parameter record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Mechanism {
    /// Deal the command's damage payload to the resolved target.
    Damage(DamageParams),
    /// Sweep the caster toward the anchor.
    Dash(DashParams),
    /// Jump the caster toward the anchor, then depenetrate.
    Teleport(TeleportParams),
    /// Swept shot along the aim direction; hits the first blocker.
    Projectile(ProjectileParams),
    /// Affect everything in a radius around the anchor.
    Area(AreaParams),
    /// Apply a stack to the resolved target (or the caster).
    ApplyStack(StackApplyParams),
    /// Forcibly remove a variable stack from the resolved target.
    DetachStack(StackDetachParams),
    /// Branch on a cast-time variable counter and chain one follow-up.
    Switch(SwitchParams),
}

/// Scale a damage payload into a final amount.
fn roll_damage(payload: &DamagePayload, power: Fixed) -> u32 {
    let scaled = Fixed::from_num(payload.base) * payload.power_scale * power;
    scaled.saturating_to_num::<u32>()
}

impl Mechanism {
    /// Execute against the environment; returns the follow-up
    /// references the pipeline should defer.
    ///
    /// Resolution misses (no target, nothing hit) are silent: the cast
    /// simply produces nothing, which is the designed outcome for an
    /// action game - not an error.
    pub fn execute(&self, ctx: &CastContext<'_>, env: &mut ExecutionEnv<'_>) -> Vec<MechanismRef> {
        match self {
            Mechanism::Damage(params) => {
                let Some(target) = ctx.target else {
                    tracing::trace!(caster = ?ctx.caster, "damage cast without target dropped");
                    return Vec::new();
                };
                env.events.damage.push(DamageEvent {
                    source: ctx.caster,
                    target,
                    amount: roll_damage(ctx.damage, params.power),
                });
                params.follow_ups.clone()
            }

            Mechanism::Dash(params) => {
                let Some(from) = env.world.position(ctx.caster) else {
                    return Vec::new();
                };
                let direction = (ctx.anchor - from).normalize();
                if direction.is_zero() {
                    return Vec::new();
                }
                let motor = env.motors.entry(ctx.caster).or_default();
                let result = motor.sweep(from, direction * params.distance, env.spatial);
                env.world.set_position(ctx.caster, from + result.applied);
                env.events.motion.push(MotionEvent {
                    actor: ctx.caster,
                    from,
                    to: from + result.applied,
                    hit_wall: result.hit_wall,
                    hit_enemy: result.hit_enemy,
                    blocked_by: result.first_hit,
                });
                params.follow_ups.clone()
            }

            Mechanism::Teleport(params) => {
                let Some(from) = env.world.position(ctx.caster) else {
                    return Vec::new();
                };
                let mut jump = ctx.anchor - from;
                if jump.length() > params.max_distance {
                    jump = jump.normalize() * params.max_distance;
                }
                let landing = from + jump;

                // Enemies never block a blink; walls still push out.
                let motor = env.motors.entry(ctx.caster).or_default();
                let base = *motor.policy();
                let scope = motor.push_policy(CollisionPolicy {
                    enemy_treated_as_blocker: false,
                    ..base
                });
                let result = scope.depenetrate(landing, env.spatial);
                drop(scope);

                let settled = landing + result.correction;
                env.world.set_position(ctx.caster, settled);
                env.events.motion.push(MotionEvent {
                    actor: ctx.caster,
                    from,
                    to: settled,
                    hit_wall: result.hit_wall,
                    hit_enemy: result.hit_enemy,
                    blocked_by: result.first_hit,
                });
                params.follow_ups.clone()
            }

            Mechanism::Projectile(params) => {
                let Some(from) = env.world.position(ctx.caster) else {
                    return Vec::new();
                };
                let direction = (ctx.anchor - from).normalize();
                if direction.is_zero() {
                    return Vec::new();
                }
                let shape = Circle {
                    center: from,
                    radius: params.radius,
                };
                let hits =
                    env.spatial
                        .query_cast(&shape, direction, params.max_distance, params.hit_mask);

                // Deterministic first hit: nearest along the flight line.
                let first = hits
                    .into_iter()
                    .filter(|hit| hit.owner != ctx.caster)
                    .min_by_key(|hit| ((hit.point - from).dot(direction), hit.owner));

                match first {
                    Some(hit) => {
                        env.events.damage.push(DamageEvent {
                            source: ctx.caster,
                            target: hit.owner,
                            amount: roll_damage(ctx.damage, Fixed::ONE),
                        });
                        params.follow_ups.clone()
                    }
                    None => {
                        tracing::trace!(caster = ?ctx.caster, "projectile flew clean, no hit");
                        Vec::new()
                    }
                }
            }

            Mechanism::Area(params) => {
                let shape = Circle {
                    center: ctx.anchor,
                    radius: params.radius,
                };
                let mut hits = env.spatial.query_overlap(&shape, params.mask);
                hits.sort_by_key(|hit| hit.owner);
                hits.dedup_by_key(|hit| hit.owner);

                for hit in &hits {
                    if hit.owner == ctx.caster {
                        continue;
                    }
                    env.events.damage.push(DamageEvent {
                        source: ctx.caster,
                        target: hit.owner,
                        amount: roll_damage(ctx.damage, Fixed::ONE),
                    });
                    if let Some(application) = &params.apply {
                        env.apply_stack_to(
                            hit.owner,
                            application.stack,
                            ctx.caster,
                            application.amount,
                            ctx.tick,
                            application.duration,
                        );
                    }
                }
                params.follow_ups.clone()
            }

            Mechanism::ApplyStack(params) => {
                let target = ctx.target.unwrap_or(ctx.caster);
                env.apply_stack_to(
                    target,
                    params.stack,
                    ctx.caster,
                    params.amount,
                    ctx.tick,
                    params.duration,
                );
                params.follow_ups.clone()
            }

            Mechanism::DetachStack(params) => {
                let target = ctx.target.unwrap_or(ctx.caster);
                env.detach_from(target, params.stack, ctx.caster, ctx.tick);
                params.follow_ups.clone()
            }

            Mechanism::Switch(params) => {
                let count = ctx.variables.get(&params.variable).copied().unwrap_or(0);
                let chosen = params
                    .branches
                    .iter()
                    .find(|branch| branch.count == count)
                    .map(|branch| branch.then)
                    .or(params.default);
                match chosen {
                    Some(reference) => vec![reference],
                    None => Vec::new(),
                }
            }
        }
    }
}
