//! A recording [`Link`] for deterministic testing.
//!
//! Real transports lose, delay and duplicate datagrams, and real timers
//! fire on their own schedule.  To exercise the sequencing engine without
//! either, [`CaptureLink`] simply records everything the tunnel emits:
//!
//! | Record            | Source                                    |
//! |-------------------|-------------------------------------------|
//! | `sent`            | [`Link::send_down`]                       |
//! | `control`         | [`Link::deliver_control`]                 |
//! | `data`            | [`Link::deliver_data`]                    |
//! | `failures`        | [`Link::notify_sequence_failure`]         |
//! | `scheduled`       | [`Link::schedule_timer`] (full history)   |
//! | `cancelled`       | [`Link::cancel_timer`] (full history)     |
//!
//! The test drives time by handing [`CaptureLink::pending`] tokens back to
//! [`crate::tunnel::Tunnel::on_timer`].

use std::collections::HashMap;
use std::time::Duration;

use crate::link::Link;
use crate::timer::{TimerKind, TimerToken};

#[derive(Debug, Default)]
pub struct CaptureLink {
    pub sent: Vec<Vec<u8>>,
    pub control: Vec<Vec<u8>>,
    pub data: Vec<(u16, Vec<u8>)>,
    pub failures: usize,
    pub scheduled: Vec<(TimerToken, Duration)>,
    pub cancelled: Vec<TimerToken>,
    pending: HashMap<TimerKind, (TimerToken, Duration)>,
}

impl CaptureLink {
    /// The live arming of timer `kind`, if any, with its requested delay.
    pub fn pending(&self, kind: TimerKind) -> Option<(TimerToken, Duration)> {
        self.pending.get(&kind).copied()
    }

    /// Remove the live arming of `kind` as if its deadline had passed; the
    /// caller delivers the returned token to the tunnel.
    pub fn expire(&mut self, kind: TimerKind) -> Option<TimerToken> {
        self.pending.remove(&kind).map(|(token, _)| token)
    }

    /// Drain the frames sent so far.
    pub fn take_sent(&mut self) -> Vec<Vec<u8>> {
        std::mem::take(&mut self.sent)
    }
}

impl Link for CaptureLink {
    fn send_down(&mut self, frame: Vec<u8>) {
        self.sent.push(frame);
    }

    fn deliver_control(&mut self, payload: Vec<u8>) {
        self.control.push(payload);
    }

    fn deliver_data(&mut self, session_id: u16, payload: Vec<u8>) {
        self.data.push((session_id, payload));
    }

    fn notify_sequence_failure(&mut self) {
        self.failures += 1;
    }

    fn schedule_timer(&mut self, token: TimerToken, delay: Duration) {
        self.scheduled.push((token, delay));
        self.pending.insert(token.kind, (token, delay));
    }

    fn cancel_timer(&mut self, token: TimerToken) {
        self.cancelled.push(token);
        if self.pending.get(&token.kind).map(|(t, _)| *t) == Some(token) {
            self.pending.remove(&token.kind);
        }
    }
}
