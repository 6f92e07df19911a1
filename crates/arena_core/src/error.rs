//! Error types for the simulation core.
//!
//! Only conditions the host must react to surface as errors. Expected
//! in-game misses (no target found, out of range) are not errors and
//! never cross the tick boundary; capacity exhaustion is fatal because
//! continuing would silently corrupt determinism.

use thiserror::Error;

use crate::clock::Tick;
use crate::world::EntityId;

/// Result type alias using [`GameError`].
pub type Result<T> = std::result::Result<T, GameError>;

/// Top-level error type for all simulation errors.
#[derive(Debug, Error)]
pub enum GameError {
    /// The tick counter would pass its maximum value. Terminal for the
    /// session: the host must tear the session down, not retry.
    #[error("tick counter exhausted at {tick}; session must end")]
    TickOverflow {
        /// The last tick that was successfully reached.
        tick: Tick,
    },

    /// The entity table has no free slots left. Fatal for the session.
    #[error("entity table full: all {capacity} identifiers in use")]
    EntityTableFull {
        /// Total identifier capacity.
        capacity: usize,
    },

    /// Invalid entity reference.
    #[error("entity not found: {0:?}")]
    EntityNotFound(EntityId),

    /// Definition data failed to parse.
    #[error("failed to parse definition data '{path}': {message}")]
    DataParseError {
        /// Name or path of the offending source.
        path: String,
        /// Error message.
        message: String,
    },

    /// Duplicate identifier in a definition book.
    #[error("duplicate definition id {id} in {book}")]
    DuplicateDefinition {
        /// The colliding identifier.
        id: u16,
        /// Which book the collision occurred in.
        book: &'static str,
    },

    /// Snapshot or replay bytes could not be encoded/decoded.
    #[error("snapshot error: {0}")]
    SnapshotError(String),

    /// Invalid state (version mismatch, inconsistent replay, ...).
    #[error("invalid state: {0}")]
    InvalidState(String),
}
