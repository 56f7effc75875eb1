//! Lifetime timers for RDNSS-learned entries.
//!
//! Every timed entry owns exactly one pending timer. The first fires at
//! [`RESOLVER_LIFETIME_REFRESH_THRESHOLD`] of the lifetime and asks for a
//! Router Solicitation; the second fires once the rest of the lifetime has
//! passed and expires the entry.
//!
//! The queue does not run callbacks itself. The host event loop sleeps for
//! [`Resolver::next_timeout`](crate::Resolver::next_timeout) and then calls
//! [`Resolver::run_timers`](crate::Resolver::run_timers).

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::time::{Duration, Instant};

use slotmap::{SlotMap, new_key_type};

use crate::entry::EntryId;

/// Fraction of an RDNSS lifetime after which a refresh is requested.
pub const RESOLVER_LIFETIME_REFRESH_THRESHOLD: f64 = 0.8;

new_key_type! {
    /// Cancellation token of a pending lifetime timer.
    pub struct TimerToken;
}

/// Source of the current time.
pub trait Clock {
    fn now(&self) -> Instant;
}

/// Wall clock backed by [`Instant::now`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// What a timer does when it fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifetimePhase {
    /// Threshold reached: solicit a fresh advertisement.
    Refresh,
    /// Lifetime over: drop the entry.
    Expire,
}

/// Delay from arming to the refresh request.
#[must_use]
pub fn refresh_interval(lifetime: u32) -> Duration {
    Duration::from_secs(u64::from(lifetime) * threshold_percent() / 100)
}

/// Delay from the refresh request to expiry, rounded up by one second so the
/// entry never expires before its advertised lifetime.
#[must_use]
pub fn remaining_interval(lifetime: u32) -> Duration {
    Duration::from_secs(u64::from(lifetime) * (100 - threshold_percent()) / 100 + 1)
}

// Whole percent, so 10 s * (1 - 0.8) is 2 s rather than 1.999.. s.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn threshold_percent() -> u64 {
    (RESOLVER_LIFETIME_REFRESH_THRESHOLD * 100.0).round() as u64
}

#[derive(Debug)]
struct PendingTimer {
    entry: EntryId,
    phase: LifetimePhase,
    deadline: Instant,
}

/// A timer popped from the queue.
#[derive(Debug, Clone, Copy)]
pub struct FiredTimer {
    pub token: TimerToken,
    pub entry: EntryId,
    pub phase: LifetimePhase,
    /// When the timer was due, which may be earlier than when it was run.
    pub deadline: Instant,
}

#[derive(Debug, Clone, Copy)]
struct QueueEntry {
    token: TimerToken,
    deadline: Instant,
    seq: u64,
}

impl PartialEq for QueueEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for QueueEntry {}

impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueueEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed for a min-heap; ties fire in arming order.
        other
            .deadline
            .cmp(&self.deadline)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Pending lifetime timers, ordered by deadline.
#[derive(Debug, Default)]
pub struct LifetimeTimers {
    pending: SlotMap<TimerToken, PendingTimer>,
    queue: BinaryHeap<QueueEntry>,
    seq: u64,
}

impl LifetimeTimers {
    /// An empty timer set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Arms a timer for `entry` due at `deadline`.
    pub fn arm(&mut self, entry: EntryId, phase: LifetimePhase, deadline: Instant) -> TimerToken {
        let token = self.pending.insert(PendingTimer {
            entry,
            phase,
            deadline,
        });
        self.seq += 1;
        self.queue.push(QueueEntry {
            token,
            deadline,
            seq: self.seq,
        });
        token
    }

    /// Cancels a pending timer. Returns `false` if it already fired or was
    /// cancelled.
    pub fn cancel(&mut self, token: TimerToken) -> bool {
        self.pending.remove(token).is_some()
    }

    /// Whether `token` is still pending.
    #[must_use]
    pub fn is_pending(&self, token: TimerToken) -> bool {
        self.pending.contains_key(token)
    }

    /// Earliest pending deadline.
    pub fn next_deadline(&mut self) -> Option<Instant> {
        self.discard_cancelled();
        self.queue.peek().map(|q| q.deadline)
    }

    /// Pops the earliest timer due at or before `now`. The token is consumed:
    /// cancelling it afterwards is a no-op.
    pub fn pop_due(&mut self, now: Instant) -> Option<FiredTimer> {
        self.discard_cancelled();
        let head = *self.queue.peek()?;
        if head.deadline > now {
            return None;
        }
        self.queue.pop();
        let timer = self.pending.remove(head.token)?;
        Some(FiredTimer {
            token: head.token,
            entry: timer.entry,
            phase: timer.phase,
            deadline: timer.deadline,
        })
    }

    /// Number of pending timers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Whether no timer is pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Cancels everything.
    pub fn clear(&mut self) {
        self.pending.clear();
        self.queue.clear();
    }

    fn discard_cancelled(&mut self) {
        while let Some(head) = self.queue.peek() {
            if self.pending.contains_key(head.token) {
                break;
            }
            self.queue.pop();
        }
    }
}
