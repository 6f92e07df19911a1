//! Test fixtures and helpers.
//!
//! Collaborator stubs, a small demo skill/stack book, and pre-wired
//! sessions for consistent testing across crates.

use arena_core::clock::TICK_NEVER;
use arena_core::command::{SeekRequest, SeekResult, TargetSeeker};
use arena_core::data::{
    BuffData, CcData, DetectSpec, MechanismRef, SkillBook, SkillId, SkillSpec, StackBook,
    StackDefId, StackKind, StackSpec, StatId, TargetMode,
};
use arena_core::math::{Fixed, Vec2Fixed};
use arena_core::mechanism::{
    AreaParams, DamageParams, DashParams, Mechanism, StackApplyParams, TeleportParams,
};
use arena_core::motor::{Circle, SpatialHit, SpatialQuery};
use arena_core::session::Session;
use arena_core::stacks::{ActionGate, StatsMutator};
use arena_core::world::{EntityData, EntityId, LayerMask, LAYER_ENEMY, LAYER_WALL};
use fixed::types::I32F32;

/// Create a fixed-point number from an integer.
#[must_use]
pub fn fixed(n: i32) -> I32F32 {
    I32F32::from_num(n)
}

/// Create a fixed-point number from a float (for tests only).
///
/// Note: In real simulation code, never use floats.
/// This is only for convenient test setup.
#[must_use]
pub fn fixed_f(n: f64) -> I32F32 {
    I32F32::from_num(n)
}

/// Spatial provider with no geometry at all.
#[derive(Debug, Default)]
pub struct OpenField;

impl SpatialQuery for OpenField {
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

/// Spatial provider backed by half-plane walls.
///
/// A plane `(normal, offset)` blocks everything past
/// `dot(point, normal) < offset`. Deterministic and easy to reason
/// about in scenario tests.
#[derive(Debug, Default)]
pub struct HalfPlaneField {
    planes: Vec<(EntityId, LayerMask, Vec2Fixed, Fixed)>,
}

impl HalfPlaneField {
    /// Empty field.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a blocking half-plane.
    #[must_use]
    pub fn with_plane(
        mut self,
        owner: EntityId,
        layer: LayerMask,
        normal: Vec2Fixed,
        offset: Fixed,
    ) -> Self {
        self.planes.push((owner, layer, normal, offset));
        self
    }

    /// A single wall on the wall layer at `x = offset`, facing -x.
    #[must_use]
    pub fn wall_at_x(offset: Fixed) -> Self {
        Self::new().with_plane(
            EntityId::from_raw(u16::MAX),
            LAYER_WALL,
            Vec2Fixed::new(Fixed::from_num(-1), Fixed::ZERO),
            -offset,
        )
    }

    fn hit_for(
        center: Vec2Fixed,
        radius: Fixed,
        owner: EntityId,
        normal: Vec2Fixed,
        offset: Fixed,
    ) -> Option<SpatialHit> {
        let clearance = center.dot(normal) - offset - radius;
        if clearance < Fixed::ZERO {
            Some(SpatialHit {
                owner,
                point: center - normal * (center.dot(normal) - offset),
                normal,
                depth: -clearance,
            })
        } else {
            None
        }
    }
}

impl SpatialQuery for HalfPlaneField {
    fn query_overlap(&self, shape: &Circle, mask: LayerMask) -> Vec<SpatialHit> {
        self.planes
            .iter()
            .filter(|(_, layer, _, _)| layer & mask != 0)
            .filter_map(|(owner, _, normal, offset)| {
                Self::hit_for(shape.center, shape.radius, *owner, *normal, *offset)
            })
            .collect()
    }

    fn query_cast(
        &self,
        shape: &Circle,
        direction: Vec2Fixed,
        distance: Fixed,
        mask: LayerMask,
    ) -> Vec<SpatialHit> {
        let end = shape.center + direction * distance;
        self.planes
            .iter()
            .filter(|(_, layer, _, _)| layer & mask != 0)
            .filter_map(|(owner, _, normal, offset)| {
                Self::hit_for(end, shape.radius, *owner, *normal, *offset)
            })
            .collect()
    }
}

/// Seeker that never finds anything.
#[derive(Debug, Default)]
pub struct NoSeek;

impl TargetSeeker for NoSeek {
    fn resolve(&mut self, request: &SeekRequest) -> SeekResult {
        SeekResult {
            target: None,
            anchor: request.origin,
            found: false,
        }
    }
}

/// Seeker over a fixed candidate list: nearest candidate within the
/// requested range band wins.
#[derive(Debug, Default)]
pub struct NearestSeeker {
    candidates: Vec<(EntityId, Vec2Fixed)>,
}

impl NearestSeeker {
    /// Empty seeker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a candidate target.
    #[must_use]
    pub fn with_candidate(mut self, id: EntityId, position: Vec2Fixed) -> Self {
        self.candidates.push((id, position));
        self
    }
}

impl TargetSeeker for NearestSeeker {
    fn resolve(&mut self, request: &SeekRequest) -> SeekResult {
        let min_sq = request.min_range * request.min_range;
        let max_sq = request.max_range * request.max_range;

        let best = self
            .candidates
            .iter()
            .filter(|(id, position)| {
                let d = request.origin.distance_squared(*position);
                *id != request.caster && d >= min_sq && d <= max_sq
            })
            .min_by_key(|(id, position)| (request.origin.distance_squared(*position), *id));

        match best {
            Some((id, position)) => SeekResult {
                target: Some(*id),
                anchor: *position,
                found: true,
            },
            None => SeekResult {
                target: None,
                anchor: request.origin,
                found: false,
            },
        }
    }
}

/// Stats mutator that records every call and always accepts.
#[derive(Debug, Default)]
pub struct RecordingStats {
    /// Buff contributions applied, in order.
    pub applied: Vec<BuffData>,
    /// Buff contributions removed, in order.
    pub removed: Vec<BuffData>,
}

impl StatsMutator for RecordingStats {
    fn try_apply(&mut self, buff: &BuffData) -> bool {
        self.applied.push(*buff);
        true
    }

    fn try_remove(&mut self, buff: &BuffData) -> bool {
        self.removed.push(*buff);
        true
    }
}

/// Action gate backed by a plain block counter.
#[derive(Debug, Default)]
pub struct CountingGate {
    /// Net number of active blocks.
    pub blocked: i32,
}

impl ActionGate for CountingGate {
    fn apply_cc(&mut self, _cc: &CcData) {
        self.blocked += 1;
    }

    fn remove_cc(&mut self, _cc: &CcData) {
        self.blocked -= 1;
    }
}

/// Skill ids used by the demo book.
pub mod demo {
    use super::SkillId;
    use super::StackDefId;

    /// Instant single-target damage.
    pub const STRIKE: SkillId = SkillId(1);
    /// Delayed bolt with a follow-up strike on the same target.
    pub const BOLT: SkillId = SkillId(2);
    /// Apply one focus counter to the caster.
    pub const FOCUS: SkillId = SkillId(3);
    /// Dash toward the aim point.
    pub const LUNGE: SkillId = SkillId(4);
    /// Blink toward the aim point.
    pub const BLINK: SkillId = SkillId(5);
    /// Damage everything around the anchor, marking each target.
    pub const NOVA: SkillId = SkillId(6);
    /// Auto-acquired strike (runs the target seeker).
    pub const SEEKING_STRIKE: SkillId = SkillId(7);

    /// Focus counter stack.
    pub const FOCUS_STACK: StackDefId = StackDefId(1);
    /// Mark applied by nova hits.
    pub const MARK_STACK: StackDefId = StackDefId(2);
    /// Armor buff stack.
    pub const WARD_STACK: StackDefId = StackDefId(3);
}

/// A small, fully wired skill book exercising every mechanism family.
#[must_use]
pub fn demo_skill_book() -> SkillBook {
    SkillBook::from_specs(vec![
        SkillSpec {
            id: demo::STRIKE,
            name: "strike".into(),
            delay_ticks: 0,
            detect: None,
            mechanism: Mechanism::Damage(DamageParams {
                power: Fixed::ONE,
                follow_ups: Vec::new(),
            }),
        },
        SkillSpec {
            id: demo::BOLT,
            name: "bolt".into(),
            delay_ticks: 6,
            detect: None,
            mechanism: Mechanism::Damage(DamageParams {
                power: fixed(2),
                follow_ups: vec![MechanismRef {
                    skill: demo::STRIKE,
                    require_retarget: false,
                }],
            }),
        },
        SkillSpec {
            id: demo::FOCUS,
            name: "focus".into(),
            delay_ticks: 0,
            detect: None,
            mechanism: Mechanism::ApplyStack(StackApplyParams {
                stack: demo::FOCUS_STACK,
                amount: 1,
                duration: 0,
                follow_ups: Vec::new(),
            }),
        },
        SkillSpec {
            id: demo::LUNGE,
            name: "lunge".into(),
            delay_ticks: 0,
            detect: None,
            mechanism: Mechanism::Dash(DashParams {
                distance: fixed(5),
                follow_ups: Vec::new(),
            }),
        },
        SkillSpec {
            id: demo::BLINK,
            name: "blink".into(),
            delay_ticks: 0,
            detect: None,
            mechanism: Mechanism::Teleport(TeleportParams {
                max_distance: fixed(8),
                follow_ups: Vec::new(),
            }),
        },
        SkillSpec {
            id: demo::NOVA,
            name: "nova".into(),
            delay_ticks: 2,
            detect: None,
            mechanism: Mechanism::Area(AreaParams {
                radius: fixed(3),
                mask: LAYER_ENEMY,
                apply: Some(arena_core::mechanism::StackApplication {
                    stack: demo::MARK_STACK,
                    amount: 1,
                    duration: 0,
                }),
                follow_ups: Vec::new(),
            }),
        },
        SkillSpec {
            id: demo::SEEKING_STRIKE,
            name: "seeking_strike".into(),
            delay_ticks: 0,
            detect: Some(DetectSpec {
                mode: TargetMode::Unit,
                min_range: Fixed::ZERO,
                max_range: fixed(12),
                mask: LAYER_ENEMY,
            }),
            mechanism: Mechanism::Damage(DamageParams {
                power: Fixed::ONE,
                follow_ups: Vec::new(),
            }),
        },
    ])
    .expect("demo skill book is well-formed")
}

/// Stack definitions matching [`demo_skill_book`].
#[must_use]
pub fn demo_stack_book() -> StackBook {
    StackBook::from_specs(vec![
        StackSpec {
            id: demo::FOCUS_STACK,
            name: "focus".into(),
            max_stacks: 3,
            default_duration: TICK_NEVER,
            kind: StackKind::Variable,
            period: None,
            exclusive: Vec::new(),
        },
        StackSpec {
            id: demo::MARK_STACK,
            name: "mark".into(),
            max_stacks: 5,
            default_duration: 90,
            kind: StackKind::Variable,
            period: None,
            exclusive: Vec::new(),
        },
        StackSpec {
            id: demo::WARD_STACK,
            name: "ward".into(),
            max_stacks: 4,
            default_duration: 120,
            kind: StackKind::Buff(BuffData {
                stat: StatId(1),
                value: fixed(10),
            }),
            period: None,
            exclusive: Vec::new(),
        },
    ])
    .expect("demo stack book is well-formed")
}

/// Session over an open field with the demo books and null hosts.
#[must_use]
pub fn open_field_session() -> Session {
    Session::new(
        demo_skill_book(),
        demo_stack_book(),
        Box::new(OpenField),
        Box::new(NoSeek),
        Box::new(RecordingStats::default()),
        Box::new(CountingGate::default()),
    )
}

/// Session plus a caster at the origin and a target two units away.
#[must_use]
pub fn duel_session() -> (Session, EntityId, EntityId) {
    let mut session = open_field_session();
    let caster = session
        .spawn(EntityData::new(Vec2Fixed::ZERO, LAYER_ENEMY))
        .expect("spawn caster");
    let target = session
        .spawn(EntityData::new(Vec2Fixed::from_units(2, 0), LAYER_ENEMY))
        .expect("spawn target");
    (session, caster, target)
}
