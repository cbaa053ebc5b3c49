//! Decides *when* a backend round trip happens.
//!
//! Rather than nested callback timers, the scheduler is a deadline
//! state machine over an injected clock: `request` records at most one
//! pending deadline, the host polls `next_deadline`/`begin_dispatch`,
//! and `complete` closes the bookkeeping for a round trip. Two urgency
//! tiers exist: quick requests dispatch immediately (displacing any
//! pending normal timer), normal requests are coalesced and rate-
//! floored to one dispatch per `normal_interval` during bursts.
//!
//! Single-flight: at most one round trip is outstanding. A dispatch
//! that comes due while one is in flight is never dropped; it is
//! deferred and reissued as a quick request the moment the in-flight
//! round trip completes.

use crate::time::SharedTimeSource;
use std::time::{Duration, Instant};
use tracing::trace;

/// Default floor on the interval between normal dispatches.
pub const DEFAULT_NORMAL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy)]
struct PendingDispatch {
    deadline: Instant,
    quick: bool,
}

/// Outcome of polling the scheduler for a due dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchDecision {
    /// Nothing due yet.
    Idle,
    /// The caller should send a request now; the scheduler has marked
    /// it in flight.
    Send,
    /// A dispatch was due but one is already in flight; it will be
    /// reissued on completion.
    Deferred,
}

#[derive(Debug)]
pub struct UpdateScheduler {
    time: SharedTimeSource,
    normal_interval: Duration,
    pending: Option<PendingDispatch>,
    last_dispatch: Option<Instant>,
    in_flight: bool,
    redispatch_after_in_flight: bool,
}

impl UpdateScheduler {
    pub fn new(time: SharedTimeSource) -> Self {
        Self::with_interval(time, DEFAULT_NORMAL_INTERVAL)
    }

    pub fn with_interval(time: SharedTimeSource, normal_interval: Duration) -> Self {
        Self {
            time,
            normal_interval,
            pending: None,
            last_dispatch: None,
            in_flight: false,
            redispatch_after_in_flight: false,
        }
    }

    /// Signal that an update is needed. Quick requests schedule an
    /// immediate dispatch, cancelling a pending normal timer; normal
    /// requests coalesce into the pending timer and respect the
    /// burst floor.
    pub fn request(&mut self, quick: bool, min_delay: Duration) {
        let now = self.time.now();
        if quick {
            match self.pending {
                Some(PendingDispatch { quick: true, .. }) => {}
                _ => {
                    self.pending = Some(PendingDispatch {
                        deadline: now,
                        quick: true,
                    });
                }
            }
            return;
        }
        if self.pending.is_some() {
            return;
        }
        let elapsed = self
            .last_dispatch
            .map(|at| self.time.elapsed_since(at))
            .unwrap_or(self.normal_interval);
        let delay = if elapsed >= self.normal_interval {
            min_delay
        } else {
            min_delay.max(self.normal_interval - elapsed)
        };
        trace!(?delay, "scheduling normal update");
        self.pending = Some(PendingDispatch {
            deadline: now + delay,
            quick: false,
        });
    }

    /// Deadline of the pending dispatch, if any, for the host to arm a
    /// timer against.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending.map(|p| p.deadline)
    }

    /// Consume a due dispatch, if any. `Send` hands the round trip to
    /// the caller and marks it in flight.
    pub fn begin_dispatch(&mut self) -> DispatchDecision {
        let now = self.time.now();
        match self.pending {
            Some(PendingDispatch { deadline, .. }) if deadline <= now => {}
            _ => return DispatchDecision::Idle,
        }
        self.pending = None;
        if self.in_flight {
            self.redispatch_after_in_flight = true;
            return DispatchDecision::Deferred;
        }
        self.in_flight = true;
        DispatchDecision::Send
    }

    /// Round-trip finished (success or failure). Reissues a quick
    /// request if a dispatch was deferred while in flight.
    pub fn complete(&mut self) {
        self.in_flight = false;
        self.last_dispatch = Some(self.time.now());
        if self.redispatch_after_in_flight {
            self.redispatch_after_in_flight = false;
            self.request(true, Duration::ZERO);
        }
    }

    pub fn in_flight(&self) -> bool {
        self.in_flight
    }

    /// Drop any pending dispatch. Used once a session is disposed.
    pub fn cancel_all(&mut self) {
        self.pending = None;
        self.redispatch_after_in_flight = false;
    }
}
