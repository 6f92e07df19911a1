//! Stack ledger: timed, periodic, and mutually-exclusive numeric effects.
//!
//! A "stack" is a keyed, timed counter on the owning actor: buffs,
//! crowd-control, or plain gameplay variables. The ledger tracks
//! amounts, expiry (bucketed by tick), periodic reapplication, and
//! exclusivity-group visibility. Side effects go through the host's
//! [`StatsMutator`] and [`ActionGate`] collaborators; the ledger itself
//! holds no host state.
//!
//! One ledger instance belongs to one actor. Hosts that parallelize
//! across actors give each actor its own instance; there is never a
//! concurrent writer.

use std::collections::BTreeMap;

use crate::clock::{Tick, TICK_NEVER};
use crate::data::{BuffData, CcData, ExclusiveMembership, GroupId, StackBook, StackDefId, StackKind};
use crate::math::Fixed;
use crate::world::EntityId;

/// Mutates host stats in response to buff stacks.
///
/// The ledger passes buff data whose `value` is already scaled by the
/// current stack amount.
pub trait StatsMutator {
    /// Apply a buff contribution. Returns false if the host rejected it.
    fn try_apply(&mut self, buff: &BuffData) -> bool;
    /// Remove a previously applied contribution.
    fn try_remove(&mut self, buff: &BuffData) -> bool;
}

/// Gates host actions in response to crowd-control stacks.
///
/// Implementations typically keep a block counter per action class;
/// the ledger guarantees balanced apply/remove calls.
pub trait ActionGate {
    /// An action class became blocked by a new crowd-control stack.
    fn apply_cc(&mut self, cc: &CcData);
    /// A crowd-control stack ended.
    fn remove_cc(&mut self, cc: &CcData);
}

/// Identity of one tracked stack: the same definition applied by two
/// different sources is tracked independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StackKey {
    /// The stack definition.
    pub definition: StackDefId,
    /// Who applied it.
    pub applier: EntityId,
}

impl StackKey {
    /// Create a key.
    #[must_use]
    pub const fn new(definition: StackDefId, applier: EntityId) -> Self {
        Self {
            definition,
            applier,
        }
    }
}

/// Live state of one stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StackStatus {
    /// Current amount, clamped to `[0, max_stacks]`.
    pub amount: u16,
    /// Tick of the most recent application.
    pub applied_at: Tick,
    /// Expiry tick; [`TICK_NEVER`] means never expires.
    pub expire_at: Tick,
}

/// Pending periodic reapplication. At most one per key.
#[derive(Debug, Clone, Copy)]
struct ReapplySchedule {
    key: StackKey,
    reapply_at: Tick,
    /// Elastic adjustment of the observed tick, like the delay judge's
    /// delta: positive accelerates the next reapplication.
    cooldown_delta: i32,
}

/// Keyed store of timed stacks with expiration bucketing, periodic
/// reapplication, and exclusivity-group resolution.
#[derive(Debug, Default)]
pub struct StackLedger {
    statuses: BTreeMap<StackKey, StackStatus>,
    expirations: BTreeMap<Tick, Vec<StackKey>>,
    reapply: Vec<ReapplySchedule>,
    winners: BTreeMap<GroupId, StackKey>,
    last_tick: Tick,
}

/// Advance a tick by `delta`, skipping the reserved sentinel so it can
/// never become a real deadline.
fn wrapping_deadline(tick: Tick, delta: Tick) -> Tick {
    let deadline = tick.wrapping_add(delta);
    if deadline == TICK_NEVER {
        0
    } else {
        deadline
    }
}

fn scaled(buff: &BuffData, amount: u16) -> BuffData {
    BuffData {
        stat: buff.stat,
        value: buff.value * Fixed::from_num(amount),
    }
}

impl StackLedger {
    /// Create an empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply `amount` stacks of `key.definition` from `key.applier`.
    ///
    /// `duration = 0` defers to the definition's default duration;
    /// [`TICK_NEVER`] encodes "never expires". The resulting amount is
    /// the old amount plus `amount`, clamped to the definition's cap -
    /// over-cap applications clamp silently, they are never rejected.
    /// Unknown definitions log and do nothing.
    pub fn apply_stack(
        &mut self,
        book: &StackBook,
        key: StackKey,
        amount: u16,
        tick: Tick,
        duration: Tick,
        stats: &mut dyn StatsMutator,
        gate: &mut dyn ActionGate,
    ) {
        let Some(spec) = book.get(key.definition) else {
            tracing::warn!(definition = key.definition.0, "apply of unknown stack definition");
            return;
        };

        let requested = if duration == 0 {
            spec.default_duration
        } else {
            duration
        };
        let expire_at = if requested == TICK_NEVER {
            TICK_NEVER
        } else {
            wrapping_deadline(tick, requested)
        };

        let old_amount = match self.statuses.get(&key).copied() {
            Some(status) => {
                self.unindex_expiry(key, status.expire_at);
                status.amount
            }
            None => 0,
        };

        let new_amount = old_amount.saturating_add(amount).min(spec.max_stacks);

        if expire_at != TICK_NEVER {
            self.expirations.entry(expire_at).or_default().push(key);
        }

        match &spec.kind {
            StackKind::Variable => {
                if let Some(period) = spec.period {
                    if new_amount < spec.max_stacks {
                        self.schedule_reapply(key, tick, period);
                    }
                }
            }
            StackKind::Buff(buff) => {
                if old_amount > 0 {
                    stats.try_remove(&scaled(buff, old_amount));
                }
                if new_amount > 0 {
                    stats.try_apply(&scaled(buff, new_amount));
                }
            }
            StackKind::CrowdControl(cc) => {
                // The gate keeps a balanced block counter: only the
                // inactive-to-active transition increments it.
                if old_amount == 0 && new_amount > 0 {
                    gate.apply_cc(cc);
                }
            }
        }

        self.statuses.insert(
            key,
            StackStatus {
                amount: new_amount,
                applied_at: tick,
                expire_at,
            },
        );

        self.recompute_groups(book, &spec.exclusive);
    }

    /// Forcibly remove a variable stack.
    ///
    /// Unknown keys and non-variable kinds are no-ops. A periodic
    /// definition is immediately rescheduled, so the counter starts
    /// rebuilding on its own.
    pub fn detach_variable(&mut self, book: &StackBook, key: StackKey, tick: Tick) {
        let Some(spec) = book.get(key.definition) else {
            return;
        };
        if !matches!(spec.kind, StackKind::Variable) {
            tracing::trace!(definition = key.definition.0, "detach of non-variable stack ignored");
            return;
        }
        let Some(status) = self.statuses.get_mut(&key) else {
            return;
        };
        if status.amount == 0 {
            return;
        }

        let stale_expiry = status.expire_at;
        status.amount = 0;
        self.unindex_expiry(key, stale_expiry);

        if let Some(period) = spec.period {
            self.schedule_reapply(key, tick, period);
        }

        self.recompute_groups(book, &spec.exclusive);
    }

    /// Shift the observed tick of a pending reapplication.
    ///
    /// Positive `delta` makes the next reapplication fire sooner.
    pub fn accelerate_reapply(&mut self, key: StackKey, delta: i32) {
        for schedule in &mut self.reapply {
            if schedule.key == key {
                schedule.cooldown_delta = schedule.cooldown_delta.saturating_add(delta);
            }
        }
    }

    /// Per-tick sweep.
    ///
    /// Processes every tick strictly between the last-processed tick
    /// and `tick`, in order - multi-tick gaps are caught up, and the
    /// 16-bit counter is followed through its maximum value and on from
    /// zero. For each swept tick: first that tick's expiration bucket,
    /// then any periodic reapplication whose observed tick has reached
    /// its deadline.
    pub fn tick(
        &mut self,
        book: &StackBook,
        tick: Tick,
        stats: &mut dyn StatsMutator,
        gate: &mut dyn ActionGate,
    ) {
        let mut t = self.last_tick;
        while t != tick {
            t = t.wrapping_add(1);
            self.sweep_one(book, t, stats, gate);
        }
        self.last_tick = tick;
    }

    fn sweep_one(
        &mut self,
        book: &StackBook,
        t: Tick,
        stats: &mut dyn StatsMutator,
        gate: &mut dyn ActionGate,
    ) {
        if let Some(keys) = self.expirations.remove(&t) {
            for key in keys {
                self.expire(book, key, t, stats, gate);
            }
        }

        // Fire due reapplications. apply_stack pushes fresh schedules
        // while we hold the drained list, so take the list first.
        let schedules = std::mem::take(&mut self.reapply);
        let (due, keep): (Vec<_>, Vec<_>) = schedules.into_iter().partition(|s| {
            i64::from(t) + i64::from(s.cooldown_delta) >= i64::from(s.reapply_at)
        });
        self.reapply = keep;
        for schedule in due {
            self.apply_stack(book, schedule.key, 1, t, 0, stats, gate);
        }
    }

    fn expire(
        &mut self,
        book: &StackBook,
        key: StackKey,
        t: Tick,
        stats: &mut dyn StatsMutator,
        gate: &mut dyn ActionGate,
    ) {
        let Some(spec) = book.get(key.definition) else {
            return;
        };
        let Some(status) = self.statuses.get_mut(&key) else {
            return;
        };
        // A re-application may have moved the deadline after this
        // bucket entry was written; only the current deadline counts.
        if status.expire_at != t || status.amount == 0 {
            return;
        }

        let old_amount = status.amount;
        status.amount = 0;

        match &spec.kind {
            StackKind::Variable => {}
            StackKind::Buff(buff) => {
                stats.try_remove(&scaled(buff, old_amount));
            }
            StackKind::CrowdControl(cc) => {
                gate.remove_cc(cc);
            }
        }

        self.recompute_groups(book, &spec.exclusive);
    }

    fn unindex_expiry(&mut self, key: StackKey, expire_at: Tick) {
        if expire_at == TICK_NEVER {
            return;
        }
        if let Some(bucket) = self.expirations.get_mut(&expire_at) {
            bucket.retain(|k| *k != key);
            if bucket.is_empty() {
                self.expirations.remove(&expire_at);
            }
        }
    }

    fn schedule_reapply(&mut self, key: StackKey, tick: Tick, period: Tick) {
        // Last-write-wins: at most one live schedule per key.
        self.reapply.retain(|s| s.key != key);
        self.reapply.push(ReapplySchedule {
            key,
            reapply_at: wrapping_deadline(tick, period),
            cooldown_delta: 0,
        });
    }

    fn recompute_groups(&mut self, book: &StackBook, memberships: &[ExclusiveMembership]) {
        for membership in memberships {
            self.recompute_group(book, membership.group);
        }
    }

    /// Pick the single visible member of a group: highest application
    /// tick wins, ties break on declared priority, then on key order
    /// for full determinism.
    fn recompute_group(&mut self, book: &StackBook, group: GroupId) {
        let winner = self
            .statuses
            .iter()
            .filter(|(_, status)| status.amount > 0)
            .filter_map(|(key, status)| {
                let spec = book.get(key.definition)?;
                let membership = spec.exclusive.iter().find(|m| m.group == group)?;
                Some((status.applied_at, membership.priority, std::cmp::Reverse(*key)))
            })
            .max()
            .map(|(_, _, std::cmp::Reverse(key))| key);

        match winner {
            Some(key) => {
                self.winners.insert(group, key);
            }
            None => {
                self.winners.remove(&group);
            }
        }
    }

    /// Raw amount of a stack, exclusivity ignored. Zero for unknown keys.
    #[must_use]
    pub fn amount(&self, key: StackKey) -> u16 {
        self.statuses.get(&key).map_or(0, |s| s.amount)
    }

    /// Full status of a stack, if tracked.
    #[must_use]
    pub fn status(&self, key: StackKey) -> Option<StackStatus> {
        self.statuses.get(&key).copied()
    }

    /// Whether a stack is exposed through the public view.
    ///
    /// Non-exclusive stacks are visible whenever their amount is
    /// positive; exclusive stacks must additionally be the winner of
    /// every group they belong to.
    #[must_use]
    pub fn is_visible(&self, book: &StackBook, key: StackKey) -> bool {
        if self.amount(key) == 0 {
            return false;
        }
        let Some(spec) = book.get(key.definition) else {
            return false;
        };
        spec.exclusive
            .iter()
            .all(|m| self.winners.get(&m.group) == Some(&key))
    }

    /// Publicly visible amount: the raw amount, or zero when the stack
    /// is suppressed by an exclusivity group.
    #[must_use]
    pub fn visible_amount(&self, book: &StackBook, key: StackKey) -> u16 {
        if self.is_visible(book, key) {
            self.amount(key)
        } else {
            0
        }
    }

    /// Visible variable counters summed per definition.
    ///
    /// This is the cast-time view snapshotted into skill commands.
    #[must_use]
    pub fn visible_variables(&self, book: &StackBook) -> BTreeMap<StackDefId, u16> {
        let mut out = BTreeMap::new();
        for (key, status) in &self.statuses {
            if status.amount == 0 {
                continue;
            }
            let Some(spec) = book.get(key.definition) else {
                continue;
            };
            if !matches!(spec.kind, StackKind::Variable) {
                continue;
            }
            if !self.is_visible(book, *key) {
                continue;
            }
            *out.entry(key.definition).or_insert(0) += status.amount;
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{CcClass, StackSpec, StatId};

    /// Stats mutator that records every call.
    #[derive(Default)]
    struct RecordingStats {
        applied: Vec<BuffData>,
        removed: Vec<BuffData>,
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
    #[derive(Default)]
    struct CountingGate {
        blocked: i32,
    }

    impl ActionGate for CountingGate {
        fn apply_cc(&mut self, _cc: &CcData) {
            self.blocked += 1;
        }
        fn remove_cc(&mut self, _cc: &CcData) {
            self.blocked -= 1;
        }
    }

    fn variable_spec(id: u16, max: u16) -> StackSpec {
        StackSpec {
            id: StackDefId(id),
            name: format!("var_{id}"),
            max_stacks: max,
            default_duration: TICK_NEVER,
            kind: StackKind::Variable,
            period: None,
            exclusive: Vec::new(),
        }
    }

    fn book_with(specs: Vec<StackSpec>) -> StackBook {
        StackBook::from_specs(specs).unwrap()
    }

    fn key(def: u16, applier: u16) -> StackKey {
        StackKey::new(StackDefId(def), EntityId::from_raw(applier))
    }

    #[test]
    fn test_amount_clamps_to_max() {
        let book = book_with(vec![variable_spec(1, 3)]);
        let mut ledger = StackLedger::new();
        let (mut stats, mut gate) = (RecordingStats::default(), CountingGate::default());

        ledger.apply_stack(&book, key(1, 1), 10, 5, 0, &mut stats, &mut gate);
        assert_eq!(ledger.amount(key(1, 1)), 3);

        ledger.apply_stack(&book, key(1, 1), 1, 6, 0, &mut stats, &mut gate);
        assert_eq!(ledger.amount(key(1, 1)), 3);
    }

    #[test]
    fn test_appliers_are_tracked_independently() {
        let book = book_with(vec![variable_spec(1, 5)]);
        let mut ledger = StackLedger::new();
        let (mut stats, mut gate) = (RecordingStats::default(), CountingGate::default());

        ledger.apply_stack(&book, key(1, 1), 2, 0, 0, &mut stats, &mut gate);
        ledger.apply_stack(&book, key(1, 2), 3, 0, 0, &mut stats, &mut gate);

        assert_eq!(ledger.amount(key(1, 1)), 2);
        assert_eq!(ledger.amount(key(1, 2)), 3);
    }

    #[test]
    fn test_expiry_zeroes_amount() {
        let mut spec = variable_spec(1, 5);
        spec.default_duration = 10;
        let book = book_with(vec![spec]);
        let mut ledger = StackLedger::new();
        let (mut stats, mut gate) = (RecordingStats::default(), CountingGate::default());

        ledger.apply_stack(&book, key(1, 1), 2, 0, 0, &mut stats, &mut gate);
        ledger.tick(&book, 9, &mut stats, &mut gate);
        assert_eq!(ledger.amount(key(1, 1)), 2);

        ledger.tick(&book, 10, &mut stats, &mut gate);
        assert_eq!(ledger.amount(key(1, 1)), 0);
    }

    #[test]
    fn test_reapplication_moves_the_deadline() {
        let mut spec = variable_spec(1, 5);
        spec.default_duration = 10;
        let book = book_with(vec![spec]);
        let mut ledger = StackLedger::new();
        let (mut stats, mut gate) = (RecordingStats::default(), CountingGate::default());

        ledger.apply_stack(&book, key(1, 1), 1, 0, 0, &mut stats, &mut gate);
        // Refresh at tick 5: the old tick-10 bucket entry must go stale.
        ledger.tick(&book, 5, &mut stats, &mut gate);
        ledger.apply_stack(&book, key(1, 1), 1, 5, 0, &mut stats, &mut gate);

        ledger.tick(&book, 10, &mut stats, &mut gate);
        assert_eq!(ledger.amount(key(1, 1)), 2, "refresh must outlive old deadline");

        ledger.tick(&book, 15, &mut stats, &mut gate);
        assert_eq!(ledger.amount(key(1, 1)), 0);
    }

    #[test]
    fn test_buff_calls_stats_with_scaled_value() {
        let spec = StackSpec {
            id: StackDefId(2),
            name: "might".into(),
            max_stacks: 5,
            default_duration: TICK_NEVER,
            kind: StackKind::Buff(BuffData {
                stat: StatId(7),
                value: Fixed::from_num(4),
            }),
            period: None,
            exclusive: Vec::new(),
        };
        let book = book_with(vec![spec]);
        let mut ledger = StackLedger::new();
        let (mut stats, mut gate) = (RecordingStats::default(), CountingGate::default());

        ledger.apply_stack(&book, key(2, 1), 2, 0, 0, &mut stats, &mut gate);
        assert_eq!(stats.applied.last().unwrap().value, Fixed::from_num(8));

        ledger.apply_stack(&book, key(2, 1), 1, 1, 0, &mut stats, &mut gate);
        // Old contribution retracted, new total applied.
        assert_eq!(stats.removed.last().unwrap().value, Fixed::from_num(8));
        assert_eq!(stats.applied.last().unwrap().value, Fixed::from_num(12));
    }

    #[test]
    fn test_cc_gate_stays_balanced() {
        let spec = StackSpec {
            id: StackDefId(3),
            name: "stun".into(),
            max_stacks: 1,
            default_duration: 4,
            kind: StackKind::CrowdControl(CcData {
                class: CcClass::Stun,
            }),
            period: None,
            exclusive: Vec::new(),
        };
        let book = book_with(vec![spec]);
        let mut ledger = StackLedger::new();
        let (mut stats, mut gate) = (RecordingStats::default(), CountingGate::default());

        ledger.apply_stack(&book, key(3, 1), 1, 0, 0, &mut stats, &mut gate);
        assert_eq!(gate.blocked, 1);

        // Refresh while active must not double-count.
        ledger.tick(&book, 2, &mut stats, &mut gate);
        ledger.apply_stack(&book, key(3, 1), 1, 2, 0, &mut stats, &mut gate);
        assert_eq!(gate.blocked, 1);

        ledger.tick(&book, 6, &mut stats, &mut gate);
        assert_eq!(gate.blocked, 0);
    }

    #[test]
    fn test_periodic_variable_reaches_cap_over_periods() {
        let mut spec = variable_spec(4, 3);
        spec.period = Some(30);
        let book = book_with(vec![spec]);
        let mut ledger = StackLedger::new();
        let (mut stats, mut gate) = (RecordingStats::default(), CountingGate::default());

        ledger.apply_stack(&book, key(4, 1), 1, 0, 0, &mut stats, &mut gate);
        assert_eq!(ledger.amount(key(4, 1)), 1);

        ledger.tick(&book, 29, &mut stats, &mut gate);
        assert_eq!(ledger.amount(key(4, 1)), 1);

        ledger.tick(&book, 30, &mut stats, &mut gate);
        assert_eq!(ledger.amount(key(4, 1)), 2);

        ledger.tick(&book, 60, &mut stats, &mut gate);
        assert_eq!(ledger.amount(key(4, 1)), 3);

        // At cap: no further schedule is issued.
        ledger.tick(&book, 120, &mut stats, &mut gate);
        assert_eq!(ledger.amount(key(4, 1)), 3);
    }

    #[test]
    fn test_detach_periodic_variable_reschedules() {
        let mut spec = variable_spec(4, 3);
        spec.period = Some(10);
        let book = book_with(vec![spec]);
        let mut ledger = StackLedger::new();
        let (mut stats, mut gate) = (RecordingStats::default(), CountingGate::default());

        ledger.apply_stack(&book, key(4, 1), 3, 0, 0, &mut stats, &mut gate);
        assert_eq!(ledger.amount(key(4, 1)), 3);

        ledger.tick(&book, 5, &mut stats, &mut gate);
        ledger.detach_variable(&book, key(4, 1), 5);
        assert_eq!(ledger.amount(key(4, 1)), 0);

        // Rebuilds on its own starting one period after the detach.
        ledger.tick(&book, 15, &mut stats, &mut gate);
        assert_eq!(ledger.amount(key(4, 1)), 1);
    }

    #[test]
    fn test_detach_unknown_key_is_noop() {
        let book = book_with(vec![variable_spec(1, 3)]);
        let mut ledger = StackLedger::new();
        ledger.detach_variable(&book, key(1, 9), 0);
        assert_eq!(ledger.amount(key(1, 9)), 0);
    }

    #[test]
    fn test_exclusive_group_exposes_most_recent() {
        let mut stance_a = variable_spec(10, 1);
        stance_a.exclusive = vec![ExclusiveMembership {
            group: GroupId(1),
            priority: 9,
        }];
        let mut stance_b = variable_spec(11, 1);
        stance_b.exclusive = vec![ExclusiveMembership {
            group: GroupId(1),
            priority: 1,
        }];
        let book = book_with(vec![stance_a, stance_b]);
        let mut ledger = StackLedger::new();
        let (mut stats, mut gate) = (RecordingStats::default(), CountingGate::default());

        ledger.apply_stack(&book, key(10, 1), 1, 1, 0, &mut stats, &mut gate);
        assert_eq!(ledger.visible_amount(&book, key(10, 1)), 1);

        // Later application wins even with lower priority.
        ledger.apply_stack(&book, key(11, 1), 1, 2, 0, &mut stats, &mut gate);
        assert_eq!(ledger.visible_amount(&book, key(10, 1)), 0);
        assert_eq!(ledger.visible_amount(&book, key(11, 1)), 1);

        // Raw amounts are untouched by visibility.
        assert_eq!(ledger.amount(key(10, 1)), 1);
    }

    #[test]
    fn test_exclusive_tie_breaks_on_priority() {
        let mut stance_a = variable_spec(10, 1);
        stance_a.exclusive = vec![ExclusiveMembership {
            group: GroupId(1),
            priority: 9,
        }];
        let mut stance_b = variable_spec(11, 1);
        stance_b.exclusive = vec![ExclusiveMembership {
            group: GroupId(1),
            priority: 1,
        }];
        let book = book_with(vec![stance_a, stance_b]);
        let mut ledger = StackLedger::new();
        let (mut stats, mut gate) = (RecordingStats::default(), CountingGate::default());

        // Same tick: declared priority decides.
        ledger.apply_stack(&book, key(11, 1), 1, 3, 0, &mut stats, &mut gate);
        ledger.apply_stack(&book, key(10, 1), 1, 3, 0, &mut stats, &mut gate);

        assert_eq!(ledger.visible_amount(&book, key(10, 1)), 1);
        assert_eq!(ledger.visible_amount(&book, key(11, 1)), 0);
    }

    #[test]
    fn test_visible_variables_skips_suppressed_members() {
        let mut stance_a = variable_spec(10, 1);
        stance_a.exclusive = vec![ExclusiveMembership {
            group: GroupId(1),
            priority: 9,
        }];
        let mut stance_b = variable_spec(11, 1);
        stance_b.exclusive = vec![ExclusiveMembership {
            group: GroupId(1),
            priority: 1,
        }];
        let plain = variable_spec(12, 8);
        let book = book_with(vec![stance_a, stance_b, plain]);
        let mut ledger = StackLedger::new();
        let (mut stats, mut gate) = (RecordingStats::default(), CountingGate::default());

        ledger.apply_stack(&book, key(10, 1), 1, 1, 0, &mut stats, &mut gate);
        ledger.apply_stack(&book, key(11, 1), 1, 2, 0, &mut stats, &mut gate);
        ledger.apply_stack(&book, key(12, 1), 4, 2, 0, &mut stats, &mut gate);

        let visible = ledger.visible_variables(&book);
        assert_eq!(visible.get(&StackDefId(10)), None);
        assert_eq!(visible.get(&StackDefId(11)), Some(&1));
        assert_eq!(visible.get(&StackDefId(12)), Some(&4));
    }

    #[test]
    fn test_sweep_follows_16_bit_wraparound() {
        let mut spec = variable_spec(1, 5);
        spec.default_duration = 10;
        let book = book_with(vec![spec]);
        let mut ledger = StackLedger::new();
        let (mut stats, mut gate) = (RecordingStats::default(), CountingGate::default());

        // Walk the ledger near the top of the counter, then apply a
        // stack whose deadline lands past the wrap point.
        ledger.tick(&book, 65530, &mut stats, &mut gate);
        ledger.apply_stack(&book, key(1, 1), 1, 65530, 0, &mut stats, &mut gate);

        ledger.tick(&book, 3, &mut stats, &mut gate);
        assert_eq!(ledger.amount(key(1, 1)), 1, "deadline 65540 wraps to tick 4");

        ledger.tick(&book, 4, &mut stats, &mut gate);
        assert_eq!(ledger.amount(key(1, 1)), 0);
    }
}
