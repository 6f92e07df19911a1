//! Simulation benchmarks for arena_core.
//!
//! Run with: `cargo bench -p arena_core`

// Benchmark binaries don't need docs on macro-generated functions
#![allow(missing_docs)]

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use arena_core::data::{SkillBook, SkillId, SkillSpec, StackBook};
use arena_core::math::{Fixed, Vec2Fixed};
use arena_core::mechanism::{DamageParams, Mechanism};
use arena_core::session::Session;
use arena_core::world::{EntityData, LAYER_ENEMY};

use arena_core::command::{SeekRequest, SeekResult, TargetSeeker};
use arena_core::data::{BuffData, CcData};
use arena_core::motor::{Circle, SpatialHit, SpatialQuery};
use arena_core::stacks::{ActionGate, StatsMutator};
use arena_core::world::LayerMask;

struct OpenField;
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

fn bench_session() -> Session {
    let skills = SkillBook::from_specs(vec![SkillSpec {
        id: SkillId(1),
        name: "strike".into(),
        delay_ticks: 1,
        detect: None,
        mechanism: Mechanism::Damage(DamageParams {
            power: Fixed::ONE,
            follow_ups: Vec::new(),
        }),
    }])
    .expect("bench skill book");

    Session::new(
        skills,
        StackBook::default(),
        Box::new(OpenField),
        Box::new(NoSeek),
        Box::new(NullStats),
        Box::new(NullGate),
    )
}

pub fn pipeline_benchmark(c: &mut Criterion) {
    c.bench_function("100_ticks_16_casters", |b| {
        b.iter(|| {
            let mut session = bench_session();
            let mut actors = Vec::new();
            for i in 0..16 {
                let id = session
                    .spawn(EntityData::new(
                        Vec2Fixed::from_units(i, 0),
                        LAYER_ENEMY,
                    ))
                    .unwrap();
                actors.push(id);
            }

            for tick in 0..100u32 {
                let caster = actors[(tick as usize) % actors.len()];
                let target = actors[(tick as usize + 1) % actors.len()];
                session.cast(caster, SkillId(1), Some(target));
                session.step().unwrap();
            }

            black_box(session.state_hash())
        })
    });
}

criterion_group!(benches, pipeline_benchmark);
criterion_main!(benches);
