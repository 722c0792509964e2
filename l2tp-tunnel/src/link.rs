//! The collaborators a [`crate::tunnel::Tunnel`] talks to.
//!
//! The tunnel itself never performs I/O and never sleeps.  Everything that
//! leaves it, downward frames, upward deliveries, failure upcalls and timer
//! requests, goes through one [`Link`] implementation owned by the tunnel.
//! [`crate::node`] provides the tokio/UDP implementation and
//! [`crate::capture`] a recording one for tests.

use std::time::Duration;

use crate::timer::TimerToken;

pub trait Link {
    /// Put an encoded frame on the lower (datagram) transport.
    fn send_down(&mut self, frame: Vec<u8>);

    /// Hand an accepted control message upward.  The first two bytes are
    /// the session ID the message concerns (network order).
    fn deliver_control(&mut self, payload: Vec<u8>);

    /// Hand a data payload upward on the output of `session_id`.
    fn deliver_data(&mut self, session_id: u16, payload: Vec<u8>);

    /// The retransmit budget has been exhausted.  Retransmission continues.
    fn notify_sequence_failure(&mut self);

    /// Call [`crate::tunnel::Tunnel::on_timer`] with `token` once `delay`
    /// has elapsed.
    fn schedule_timer(&mut self, token: TimerToken, delay: Duration);

    /// Forget a previously scheduled `token`.  Delivering it anyway is
    /// harmless; the tunnel discards stale tokens.
    fn cancel_timer(&mut self, token: TimerToken);
}
