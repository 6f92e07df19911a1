//! Deterministic movement resolution.
//!
//! The motor turns a desired displacement into an applied one by
//! consulting an injected [`SpatialQuery`] provider - it never owns the
//! collision world itself. Two independent operations:
//!
//! - [`Motor::sweep`]: iterative slide-and-project along blocking
//!   contacts, for ordinary movement and dashes.
//! - [`Motor::depenetrate`]: minimum-translation-vector push-out for a
//!   body that is already overlapping geometry (teleports, spawns,
//!   moving platforms).
//!
//! Callers branch on the aggregated result flags instead of re-querying
//! the world. All arithmetic is fixed-point; given the same provider
//! answers, the applied delta is bit-identical on every platform.

use serde::{Deserialize, Serialize};

use crate::math::{fixed_serde, Fixed, Vec2Fixed};
use crate::world::{EntityId, LayerMask, LAYER_ENEMY, LAYER_WALL};

/// Maximum slide passes per sweep.
const MAX_SLIDE_PASSES: usize = 4;

/// Maximum push-out iterations per depenetration call.
const MAX_DEPENETRATE_ITERATIONS: usize = 4;

/// Default body radius: 0.5 units (raw bits of the 2^32 scale).
const DEFAULT_RADIUS: Fixed = Fixed::from_bits(1 << 31);

/// Default skin margin: 0.03125 units.
const DEFAULT_SKIN: Fixed = Fixed::from_bits(1 << 27);

/// Ceiling on the total correction applied by one depenetration call:
/// 0.5 units. Keeps deeply stacked overlaps from popping out explosively.
const MAX_TOTAL_CORRECTION: Fixed = Fixed::from_bits(1 << 31);

/// Below this remaining magnitude (1/1024 units) an operation stops.
const MOTION_EPSILON: Fixed = Fixed::from_bits(1 << 22);

/// A circle shape used for overlap and cast queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Circle {
    /// Center position.
    pub center: Vec2Fixed,
    /// Radius.
    pub radius: Fixed,
}

/// One contact reported by the spatial provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpatialHit {
    /// Owner of the blocking collider.
    pub owner: EntityId,
    /// Contact point.
    pub point: Vec2Fixed,
    /// Contact normal, pointing out of the blocker toward the body.
    pub normal: Vec2Fixed,
    /// Penetration depth along the normal.
    pub depth: Fixed,
}

/// Spatial queries the motor needs from its host.
///
/// The provider decides how shapes are stored and intersected; the
/// motor only requires that identical calls return identical hits in
/// identical order.
pub trait SpatialQuery {
    /// All blockers currently overlapping `shape` on `mask` layers.
    fn query_overlap(&self, shape: &Circle, mask: LayerMask) -> Vec<SpatialHit>;

    /// All blockers contacted when casting `shape` along `direction`
    /// for `distance` on `mask` layers.
    fn query_cast(
        &self,
        shape: &Circle,
        direction: Vec2Fixed,
        distance: Fixed,
        mask: LayerMask,
    ) -> Vec<SpatialHit>;
}

/// How a sweep or depenetration call treats the world.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollisionPolicy {
    /// Layers treated as walls.
    pub wall_mask: LayerMask,
    /// Layers treated as enemy bodies.
    pub enemy_mask: LayerMask,
    /// Whether enemy bodies block movement at all.
    pub enemy_treated_as_blocker: bool,
    /// Body radius for queries.
    #[serde(with = "fixed_serde")]
    pub unit_radius: Fixed,
    /// Skin margin added when pushing out of geometry.
    #[serde(with = "fixed_serde")]
    pub unit_skin: Fixed,
    /// Slide along walls instead of hard-stopping on contact.
    pub allow_wall_slide: bool,
}

impl Default for CollisionPolicy {
    fn default() -> Self {
        Self {
            wall_mask: LAYER_WALL,
            enemy_mask: LAYER_ENEMY,
            enemy_treated_as_blocker: true,
            unit_radius: DEFAULT_RADIUS,
            unit_skin: DEFAULT_SKIN,
            allow_wall_slide: true,
        }
    }
}

/// Aggregated result of a sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SweepResult {
    /// Delta actually applied after sliding.
    pub applied: Vec2Fixed,
    /// A wall contact opposed the movement.
    pub hit_wall: bool,
    /// An enemy body opposed the movement.
    pub hit_enemy: bool,
    /// Owner of the first opposing contact.
    pub first_hit: Option<EntityId>,
}

/// Aggregated result of a depenetration call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DepenetrateResult {
    /// Total correction applied.
    pub correction: Vec2Fixed,
    /// A wall overlap contributed to the correction.
    pub hit_wall: bool,
    /// An enemy overlap contributed to the correction.
    pub hit_enemy: bool,
    /// Owner of the first overlapping blocker.
    pub first_hit: Option<EntityId>,
}

/// Per-actor movement resolver.
///
/// Owns only its [`CollisionPolicy`] (and the stack of overridden
/// policies); positions live in the world. Each actor owns an
/// independent instance.
#[derive(Debug, Default)]
pub struct Motor {
    policy: CollisionPolicy,
    saved: Vec<CollisionPolicy>,
}

/// Scoped policy override.
///
/// Returned by [`Motor::push_policy`]; restores the previous policy
/// when dropped, on every exit path including unwinding.
#[derive(Debug)]
pub struct PolicyScope<'a> {
    motor: &'a mut Motor,
}

impl Drop for PolicyScope<'_> {
    fn drop(&mut self) {
        if let Some(previous) = self.motor.saved.pop() {
            self.motor.policy = previous;
        }
    }
}

impl std::ops::Deref for PolicyScope<'_> {
    type Target = Motor;

    fn deref(&self) -> &Motor {
        self.motor
    }
}

impl std::ops::DerefMut for PolicyScope<'_> {
    fn deref_mut(&mut self) -> &mut Motor {
        self.motor
    }
}

impl Motor {
    /// Create a motor with the default policy.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a motor with an explicit policy.
    #[must_use]
    pub fn with_policy(policy: CollisionPolicy) -> Self {
        Self {
            policy,
            saved: Vec::new(),
        }
    }

    /// The active policy.
    #[must_use]
    pub fn policy(&self) -> &CollisionPolicy {
        &self.policy
    }

    /// Temporarily replace the policy.
    ///
    /// The previous policy comes back when the returned scope drops.
    pub fn push_policy(&mut self, policy: CollisionPolicy) -> PolicyScope<'_> {
        self.saved.push(self.policy);
        self.policy = policy;
        PolicyScope { motor: self }
    }

    /// Resolve a desired displacement against blocking shapes.
    ///
    /// Up to four passes. Each pass queries contacts along the
    /// remaining delta, removes the normal component of every opposing
    /// contact (or zeroes the delta entirely on wall contact when the
    /// policy forbids sliding), then applies the shortened delta
    /// discretely. A pass that makes no progress toward the original
    /// target ends the sweep early, which bounds degenerate geometry.
    pub fn sweep(
        &self,
        from: Vec2Fixed,
        desired: Vec2Fixed,
        world: &dyn SpatialQuery,
    ) -> SweepResult {
        let mut result = SweepResult::default();
        let target = from + desired;
        let mut position = from;

        for _pass in 0..MAX_SLIDE_PASSES {
            let mut remaining = target - position;
            if remaining.length() < MOTION_EPSILON {
                break;
            }

            let direction = remaining.normalize();
            let distance = remaining.length();
            let shape = Circle {
                center: position,
                radius: self.policy.unit_radius,
            };

            let mut contacts: Vec<(SpatialHit, bool)> = world
                .query_cast(&shape, direction, distance, self.policy.wall_mask)
                .into_iter()
                .map(|hit| (hit, true))
                .collect();
            if self.policy.enemy_treated_as_blocker {
                contacts.extend(
                    world
                        .query_cast(&shape, direction, distance, self.policy.enemy_mask)
                        .into_iter()
                        .map(|hit| (hit, false)),
                );
            }

            for (hit, is_wall) in &contacts {
                let normal = hit.normal.normalize();
                let into_surface = remaining.dot(normal);
                if into_surface >= Fixed::ZERO {
                    // Contact does not oppose the remaining movement.
                    continue;
                }

                if *is_wall {
                    result.hit_wall = true;
                } else {
                    result.hit_enemy = true;
                }
                if result.first_hit.is_none() {
                    result.first_hit = Some(hit.owner);
                }

                if *is_wall && !self.policy.allow_wall_slide {
                    remaining = Vec2Fixed::ZERO;
                    break;
                }

                // Slide: drop the component pointing into the surface.
                remaining = remaining - normal * into_surface;
            }

            if remaining.length() < MOTION_EPSILON {
                break;
            }

            let gap_before = (target - position).length();
            position = position + remaining;
            let gap_after = (target - position).length();

            if gap_after >= gap_before {
                break;
            }
        }

        result.applied = position - from;
        result
    }

    /// Push an already-overlapping body out of geometry.
    ///
    /// Each iteration sums `normal * depth` over every overlapping
    /// blocker into a combined minimum-translation vector, adds the
    /// skin margin along its direction, and applies it; the cumulative
    /// correction is capped so stacked overlaps cannot pop the body a
    /// long way in one call.
    pub fn depenetrate(&self, at: Vec2Fixed, world: &dyn SpatialQuery) -> DepenetrateResult {
        let mut result = DepenetrateResult::default();
        let mut position = at;
        let mut total = Fixed::ZERO;

        for _iteration in 0..MAX_DEPENETRATE_ITERATIONS {
            if total >= MAX_TOTAL_CORRECTION {
                break;
            }

            let shape = Circle {
                center: position,
                radius: self.policy.unit_radius,
            };

            let mut overlaps: Vec<(SpatialHit, bool)> = world
                .query_overlap(&shape, self.policy.wall_mask)
                .into_iter()
                .map(|hit| (hit, true))
                .collect();
            if self.policy.enemy_treated_as_blocker {
                overlaps.extend(
                    world
                        .query_overlap(&shape, self.policy.enemy_mask)
                        .into_iter()
                        .map(|hit| (hit, false)),
                );
            }

            if overlaps.is_empty() {
                break;
            }

            let mut mtv = Vec2Fixed::ZERO;
            for (hit, is_wall) in &overlaps {
                if *is_wall {
                    result.hit_wall = true;
                } else {
                    result.hit_enemy = true;
                }
                if result.first_hit.is_none() {
                    result.first_hit = Some(hit.owner);
                }
                mtv = mtv + hit.normal.normalize() * hit.depth;
            }

            if mtv.length() < MOTION_EPSILON {
                break;
            }

            let direction = mtv.normalize();
            let mut correction = mtv + direction * self.policy.unit_skin;

            let budget = MAX_TOTAL_CORRECTION - total;
            if correction.length() > budget {
                correction = direction * budget;
            }

            position = position + correction;
            total += correction.length();
        }

        result.correction = position - at;
        result
    }
}
