//! Tick counting.
//!
//! The clock owns the monotonic tick counter. An external driver (not
//! part of this crate) calls [`crate::session::Session::step`] at a
//! fixed wall-clock cadence; the core itself has no notion of wall-clock
//! time. Subscribers are dispatched by the session in a fixed
//! registration order, once per tick, with the single tick value
//! returned by [`TickClock::step`].

use crate::error::{GameError, Result};

/// One discrete simulation step of the fixed-rate clock.
///
/// 16 bits wide on purpose: the stack ledger's expiry buckets and the
/// delay judge both index by tick, and the sentinel value
/// [`TICK_NEVER`] must stay representable.
pub type Tick = u16;

/// Sentinel tick meaning "never". Reserved: the clock refuses to reach
/// it, and the stack ledger uses it to encode stacks that do not expire.
pub const TICK_NEVER: Tick = Tick::MAX;

/// Nominal ticks per second expected from the external driver.
pub const TICK_RATE: u32 = 60;

/// Duration of one tick in milliseconds at the nominal rate.
pub const TICK_DURATION_MS: u32 = 1000 / TICK_RATE;

/// Monotonic tick counter.
///
/// `step` advances by exactly one and never wraps: passing the maximum
/// is a terminal session condition, not a reset. Re-entrant stepping is
/// impossible from safe code because `step` takes `&mut self`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickClock {
    tick: Tick,
}

impl TickClock {
    /// Create a clock at tick 0.
    #[must_use]
    pub const fn new() -> Self {
        Self { tick: 0 }
    }

    /// Create a clock resuming from a previously saved tick.
    ///
    /// Used when restoring a snapshot or replay.
    #[must_use]
    pub const fn starting_at(tick: Tick) -> Self {
        Self { tick }
    }

    /// The current tick value.
    #[must_use]
    pub const fn current(&self) -> Tick {
        self.tick
    }

    /// Advance the counter by exactly one tick and return the new value.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::TickOverflow`] if advancing would reach the
    /// reserved [`TICK_NEVER`] value. The session is over at that point;
    /// callers must not retry.
    pub fn step(&mut self) -> Result<Tick> {
        if self.tick >= TICK_NEVER - 1 {
            return Err(GameError::TickOverflow { tick: self.tick });
        }
        self.tick += 1;
        Ok(self.tick)
    }
}

impl Default for TickClock {
    fn default() -> Self {
        Self::new()
    }
}
