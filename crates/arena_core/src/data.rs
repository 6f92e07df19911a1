//! Definition data for skills and stacks.
//!
//! This module contains pure data structures describing what skills and
//! stacks *are*: delays, detection requirements, mechanism parameters,
//! stack caps, durations, periodicity, and exclusivity groups. All
//! structs are designed to be deserialized from RON, authored outside
//! the simulation, loaded once and read-only at runtime.
//!
//! **Note:** This module contains no IO - it only defines data types
//! and in-memory registries. Reading definition files is the host's job.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::clock::Tick;
use crate::error::{GameError, Result};
use crate::math::{fixed_serde, Fixed};
use crate::mechanism::Mechanism;
use crate::world::LayerMask;

/// Identifier of a skill definition in a [`SkillBook`].
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct SkillId(pub u16);

/// Identifier of a stack definition in a [`StackBook`].
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct StackDefId(pub u16);

/// Identifier of an exclusivity group.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct GroupId(pub u16);

/// Host-defined stat identifier carried by buff data.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct StatId(pub u16);

/// How a cast selects its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum TargetMode {
    /// The caster itself.
    #[default]
    SelfCast,
    /// A specific unit.
    Unit,
    /// A ground point.
    Point,
    /// An aim direction from the caster.
    Direction,
}

/// Target-detection requirement declared by a skill.
///
/// When a command arrives without an explicit target, the pipeline runs
/// the injected target seeker with these parameters. A failed seek
/// drops the command silently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectSpec {
    /// Seek mode.
    pub mode: TargetMode,
    /// Minimum acquisition range.
    #[serde(with = "fixed_serde")]
    pub min_range: Fixed,
    /// Maximum acquisition range.
    #[serde(with = "fixed_serde")]
    pub max_range: Fixed,
    /// Layers eligible as targets.
    pub mask: LayerMask,
}

/// Data-defined pointer from one mechanism's follow-up list to the next
/// skill to invoke.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MechanismRef {
    /// Skill to invoke next.
    pub skill: SkillId,
    /// Force target re-acquisition instead of inheriting the current
    /// target.
    #[serde(default)]
    pub require_retarget: bool,
}

/// A complete skill definition.
///
/// # Example RON
///
/// ```ron
/// SkillSpec(
///     id: 3,
///     name: "piercing_bolt",
///     delay_ticks: 12,
///     detect: Some(DetectSpec(
///         mode: Unit,
///         min_range: 0,             // raw fixed-point bits
///         max_range: 51539607552,   // 12.0
///         mask: 2,                  // enemies
///     )),
///     mechanism: Damage(DamageParams(
///         power: 4294967296,        // 1.0
///         follow_ups: [],
///     )),
/// )
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkillSpec {
    /// Unique skill identifier.
    pub id: SkillId,
    /// Author-facing name, used only for logs.
    pub name: String,
    /// Cast delay in ticks; zero still resolves one tick late.
    #[serde(default)]
    pub delay_ticks: Tick,
    /// Target detection requirement, if the skill needs a target.
    #[serde(default)]
    pub detect: Option<DetectSpec>,
    /// The behavior this skill invokes when it executes.
    pub mechanism: Mechanism,
}

/// Immutable registry of skill definitions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SkillBook {
    skills: HashMap<SkillId, SkillSpec>,
}

impl SkillBook {
    /// Build a book from a list of specs.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::DuplicateDefinition`] on colliding ids.
    pub fn from_specs(specs: Vec<SkillSpec>) -> Result<Self> {
        let mut skills = HashMap::with_capacity(specs.len());
        for spec in specs {
            let id = spec.id;
            if skills.insert(id, spec).is_some() {
                return Err(GameError::DuplicateDefinition {
                    id: id.0,
                    book: "skills",
                });
            }
        }
        Ok(Self { skills })
    }

    /// Parse a book from RON text (a list of [`SkillSpec`]).
    pub fn from_ron(source: &str) -> Result<Self> {
        let specs: Vec<SkillSpec> =
            ron::from_str(source).map_err(|e| GameError::DataParseError {
                path: "skill book".into(),
                message: e.to_string(),
            })?;
        Self::from_specs(specs)
    }

    /// Look up a skill definition.
    #[must_use]
    pub fn get(&self, id: SkillId) -> Option<&SkillSpec> {
        self.skills.get(&id)
    }

    /// Number of definitions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.skills.len()
    }

    /// True when the book holds no definitions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.skills.is_empty()
    }
}

/// Payload handed to the host stats mutator for buff stacks.
///
/// `value` is already scaled by the current stack amount when the
/// ledger calls out.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BuffData {
    /// Which host stat the buff modifies.
    pub stat: StatId,
    /// Modifier value per stack.
    #[serde(with = "fixed_serde")]
    pub value: Fixed,
}

/// Crowd-control classification handed to the host action gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CcClass {
    /// Blocks everything.
    Stun,
    /// Blocks movement.
    Root,
    /// Blocks casting.
    Silence,
    /// Blocks basic attacks.
    Disarm,
}

/// Payload handed to the host action gate for crowd-control stacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CcData {
    /// Which action class is gated.
    pub class: CcClass,
}

/// Behavior family of a stack definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StackKind {
    /// Raw counter with no external side effect; consumed by gameplay
    /// logic such as switch-mechanism branching.
    Variable,
    /// Calls the stats mutator with `value * amount` on apply/remove.
    Buff(BuffData),
    /// Increments/decrements the host's action block counter.
    CrowdControl(CcData),
}

/// Membership of a variable stack in an exclusivity group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExclusiveMembership {
    /// The group.
    pub group: GroupId,
    /// Tie-break priority; higher wins.
    pub priority: u16,
}

/// A complete stack definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StackSpec {
    /// Unique stack identifier.
    pub id: StackDefId,
    /// Author-facing name, used only for logs.
    pub name: String,
    /// Amount cap; applications past it clamp silently.
    pub max_stacks: u16,
    /// Duration in ticks used when an application passes duration 0.
    /// [`crate::clock::TICK_NEVER`] encodes "never expires".
    pub default_duration: Tick,
    /// Behavior family.
    pub kind: StackKind,
    /// Reapplication period for periodic variables.
    #[serde(default)]
    pub period: Option<Tick>,
    /// Exclusivity groups this definition belongs to.
    #[serde(default)]
    pub exclusive: Vec<ExclusiveMembership>,
}

impl StackSpec {
    /// True when this definition reapplies itself on a period.
    #[must_use]
    pub fn is_periodic(&self) -> bool {
        self.period.is_some()
    }
}

/// Immutable registry of stack definitions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StackBook {
    stacks: HashMap<StackDefId, StackSpec>,
}

impl StackBook {
    /// Build a book from a list of specs.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::DuplicateDefinition`] on colliding ids.
    pub fn from_specs(specs: Vec<StackSpec>) -> Result<Self> {
        let mut stacks = HashMap::with_capacity(specs.len());
        for spec in specs {
            let id = spec.id;
            if stacks.insert(id, spec).is_some() {
                return Err(GameError::DuplicateDefinition {
                    id: id.0,
                    book: "stacks",
                });
            }
        }
        Ok(Self { stacks })
    }

    /// Parse a book from RON text (a list of [`StackSpec`]).
    pub fn from_ron(source: &str) -> Result<Self> {
        let specs: Vec<StackSpec> =
            ron::from_str(source).map_err(|e| GameError::DataParseError {
                path: "stack book".into(),
                message: e.to_string(),
            })?;
        Self::from_specs(specs)
    }

    /// Look up a stack definition.
    #[must_use]
    pub fn get(&self, id: StackDefId) -> Option<&StackSpec> {
        self.stacks.get(&id)
    }

    /// Number of definitions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.stacks.len()
    }

    /// True when the book holds no definitions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stacks.is_empty()
    }
}
