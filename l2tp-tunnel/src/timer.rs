//! Retransmit and delayed-ack timer management.
//!
//! The control channel runs two one-shot timers per tunnel:
//! - the **retransmit** timer, armed while any sent control message is
//!   unacknowledged, and
//! - the **delayed-ack** timer, armed while a received Ns has been accepted
//!   but not yet acknowledged back to the peer.
//!
//! Scheduling itself is delegated to the [`Link`] the tunnel runs on.  A
//! [`Timer`] only remembers whether it is armed and under which
//! [`TimerToken`]; every re-arm or cancel bumps the token's generation, so a
//! callback that was already queued when the timer got cancelled arrives
//! with an outdated token and is recognised as stale by [`Timer::fire`].

use std::time::Duration;

use crate::link::Link;

/// One protocol tick (the retransmit time base).
pub const TICK: Duration = Duration::from_secs(1);

/// First retransmit interval after new data goes out or an ack arrives.
pub const RETRANSMIT_BASE: Duration = TICK;

/// How long an accepted Ns may wait for a piggy-back before a ZLB goes out.
pub const DELAYED_ACK: Duration = Duration::from_millis(50);

/// Backoff exponent ceiling: `2^12` ticks.
const MAX_BACKOFF_SHIFT: u16 = 12;

/// Which of the two per-tunnel timers a token belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKind {
    Retransmit,
    DelayedAck,
}

/// Identifies one particular arming of a timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerToken {
    pub kind: TimerKind,
    pub generation: u64,
}

/// A cancellable one-shot timer slot.
#[derive(Debug)]
pub struct Timer {
    kind: TimerKind,
    generation: u64,
    armed: bool,
}

impl Timer {
    pub fn new(kind: TimerKind) -> Self {
        Self {
            kind,
            generation: 0,
            armed: false,
        }
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    /// Token of the current (or most recent) arming.
    pub fn token(&self) -> TimerToken {
        TimerToken {
            kind: self.kind,
            generation: self.generation,
        }
    }

    /// Arm the timer to fire after `delay`, replacing any pending arming.
    pub fn arm<L: Link + ?Sized>(&mut self, link: &mut L, delay: Duration) {
        if self.armed {
            link.cancel_timer(self.token());
        }
        self.generation = self.generation.wrapping_add(1);
        self.armed = true;
        link.schedule_timer(self.token(), delay);
    }

    /// Cancel a pending arming.  Cancelling an idle timer is a no-op.
    pub fn cancel<L: Link + ?Sized>(&mut self, link: &mut L) {
        if !self.armed {
            return;
        }
        link.cancel_timer(self.token());
        self.armed = false;
        self.generation = self.generation.wrapping_add(1);
    }

    /// Accept a fired `token`.
    ///
    /// Returns `true` and disarms the timer when `token` is the live arming;
    /// returns `false` for a stale callback, leaving state untouched.
    pub fn fire(&mut self, token: TimerToken) -> bool {
        if self.armed && token == self.token() {
            self.armed = false;
            true
        } else {
            false
        }
    }
}

/// Retransmit interval after `rexmits` consecutive timeouts:
/// `min(2^min(rexmits, 12), max_timeout_secs)` ticks, never below one tick.
pub fn retransmit_backoff(rexmits: u16, max_timeout_secs: u16) -> Duration {
    let shift = rexmits.min(MAX_BACKOFF_SHIFT);
    let ticks = (1u32 << shift).min(u32::from(max_timeout_secs)).max(1);
    TICK * ticks
}
