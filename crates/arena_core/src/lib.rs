//! # Arena Core
//!
//! Deterministic simulation core for a real-time, skill-based action
//! game.
//!
//! This crate contains **only** deterministic logic:
//! - No rendering
//! - No IO
//! - No system randomness
//! - No floating-point math (uses fixed-point)
//!
//! This separation enables:
//! - Lockstep multiplayer (identical simulation across clients)
//! - Headless server builds
//! - Replay systems
//! - Determinism testing
//!
//! ## Crate Structure
//!
//! - [`math`] - Fixed-point vector math
//! - [`clock`] - Tick counting
//! - [`delay`] - Deadline checks for cast delays and cooldowns
//! - [`command`] - Double-buffered skill command pipeline
//! - [`mechanism`] - Skill behaviors and their parameters
//! - [`stacks`] - Stack/buff ledger
//! - [`motor`] - Sweep-and-slide movement and depenetration
//! - [`world`] - Entity table and snapshots
//! - [`session`] - Composition root driving everything once per tick
//! - [`data`] - RON-loadable skill and stack definitions
//! - [`replay`] - Command recording and deterministic playback

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]

pub mod clock;
pub mod command;
pub mod data;
pub mod delay;
pub mod error;
pub mod math;
pub mod mechanism;
pub mod motor;
pub mod replay;
pub mod session;
pub mod stacks;
pub mod world;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::clock::{Tick, TickClock, TICK_NEVER, TICK_RATE};
    pub use crate::command::{
        CommandPipeline, DamagePayload, SkillCommand, TargetSeeker, TickEvents,
    };
    pub use crate::data::{
        SkillBook, SkillId, SkillSpec, StackBook, StackDefId, StackKind, StackSpec, TargetMode,
    };
    pub use crate::delay::{DelayHandle, DelayJudge};
    pub use crate::error::{GameError, Result};
    pub use crate::math::{Fixed, Vec2Fixed};
    pub use crate::mechanism::Mechanism;
    pub use crate::motor::{CollisionPolicy, Motor, SpatialQuery};
    pub use crate::session::Session;
    pub use crate::stacks::{ActionGate, StackKey, StackLedger, StatsMutator};
    pub use crate::world::{EntityData, EntityId, World, WorldSnapshot};
}
