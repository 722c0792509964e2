//! Control-channel sequencing: Ns/Nr bookkeeping, acknowledgement
//! processing and the two timeouts.
//!
//! # State
//!
//! ```text
//!          rack                 ns
//!  ─────────┼───────────────────┼─────────▶ our Ns space
//!           │ <── unacked ────▶ │
//!
//!          xack                 nr
//!  ─────────┼───────────────────┼─────────▶ peer's Ns space
//!           │ <── owed acks ──▶ │
//! ```
//!
//! The retransmit timer runs exactly while `unacked > 0`; the delayed-ack
//! timer runs exactly while `nr != xack`.  [`SequenceState::verify`] checks
//! these and the window invariants; debug builds run it after every
//! sequencing step.
//!
//! All arithmetic is modulo 2^16; [`seq_diff`] gives the signed distance.

use crate::link::Link;
use crate::timer::{
    retransmit_backoff, Timer, TimerKind, TimerToken, DELAYED_ACK, RETRANSMIT_BASE,
};
use crate::tunnel::Tunnel;
use crate::window::{TransmitWindow, MAX_XWIN};

/// Signed distance from `y` to `x` in 16-bit sequence space.
#[inline]
pub fn seq_diff(x: u16, y: u16) -> i16 {
    x.wrapping_sub(y) as i16
}

/// Reliable-delivery state of one tunnel's control channel.
#[derive(Debug)]
pub struct SequenceState {
    /// Next Ns we send.
    pub ns: u16,
    /// Next Ns we expect from the peer.
    pub nr: u16,
    /// Last Nr received from the peer.
    pub rack: u16,
    /// Last Nr we sent.
    pub xack: u16,
    /// Consecutive retransmits of the head of the queue.
    pub rexmits: u16,
    failure_notified: bool,
    pub(crate) window: TransmitWindow,
    pub(crate) rack_timer: Timer,
    pub(crate) xack_timer: Timer,
}

impl SequenceState {
    pub fn new(wmax: u16) -> Self {
        Self {
            ns: 0,
            nr: 0,
            rack: 0,
            xack: 0,
            rexmits: 0,
            failure_notified: false,
            window: TransmitWindow::new(wmax),
            rack_timer: Timer::new(TimerKind::Retransmit),
            xack_timer: Timer::new(TimerKind::DelayedAck),
        }
    }

    pub fn window(&self) -> &TransmitWindow {
        &self.window
    }

    /// Messages sent but not yet acknowledged.
    pub fn unacked(&self) -> u16 {
        self.ns.wrapping_sub(self.rack)
    }

    pub fn retransmit_pending(&self) -> bool {
        self.rack_timer.is_armed()
    }

    pub fn ack_pending(&self) -> bool {
        self.xack_timer.is_armed()
    }

    /// Check every structural invariant, naming the first one violated.
    pub fn verify(&self) -> Result<(), &'static str> {
        let w = &self.window;
        let self_unack = seq_diff(self.nr, self.xack);
        let peer_unack = seq_diff(self.ns, self.rack);

        if w.wmax() > MAX_XWIN {
            return Err("wmax above maximum window");
        }
        if w.cwnd() < 1 || w.cwnd() > w.wmax() {
            return Err("cwnd outside 1..=wmax");
        }
        if w.ssth() < 1 || w.ssth() > w.wmax() {
            return Err("ssth outside 1..=wmax");
        }
        if w.cwnd() < w.ssth() {
            if w.acks() != 0 {
                return Err("ack credit during slow start");
            }
        } else if w.acks() > w.cwnd() {
            return Err("ack credit above cwnd");
        }
        if self_unack < 0 || peer_unack < 0 {
            return Err("acknowledgement ahead of sequence number");
        }
        let peer_unack = peer_unack as u16;
        if peer_unack > w.wmax() {
            return Err("more unacked messages than the peer window");
        }
        if (self_unack != 0) != self.xack_timer.is_armed() {
            return Err("delayed-ack timer out of step with owed acks");
        }
        if (peer_unack != 0) != self.rack_timer.is_armed() {
            return Err("retransmit timer out of step with unacked messages");
        }
        let peer_unack = usize::from(peer_unack);
        let cwnd = usize::from(w.cwnd());
        if w.queued() < peer_unack {
            return Err("unacked message missing from the window");
        }
        if peer_unack < cwnd && w.queued() > peer_unack {
            return Err("queued message held back while the window is open");
        }
        Ok(())
    }

    pub(crate) fn sanity(&self) {
        debug_assert_eq!(self.verify(), Ok(()), "sequence state: {self:?}");
    }

    /// Fresh window for a tunnel being enabled.  Sequence numbers are kept.
    pub(crate) fn start(&mut self, wmax: u16) {
        self.window = TransmitWindow::new(wmax);
        self.rexmits = 0;
        self.failure_notified = false;
    }

    /// Back to the disabled state.  Timers must already be cancelled; the
    /// slots themselves are kept so their generations keep counting up.
    pub(crate) fn reset(&mut self) {
        debug_assert!(!self.rack_timer.is_armed() && !self.xack_timer.is_armed());
        self.ns = 0;
        self.nr = 0;
        self.rack = 0;
        self.xack = 0;
        self.rexmits = 0;
        self.failure_notified = false;
        self.window = TransmitWindow::new(MAX_XWIN);
    }
}

impl<L: Link> Tunnel<L> {
    /// Deliver an expired timer.  Tokens from cancelled or superseded
    /// armings are ignored.
    pub fn on_timer(&mut self, token: TimerToken) {
        match token.kind {
            TimerKind::Retransmit => {
                if self.seq.rack_timer.fire(token) {
                    self.rack_timeout();
                }
            }
            TimerKind::DelayedAck => {
                if self.seq.xack_timer.fire(token) {
                    self.xack_timeout();
                }
            }
        }
    }

    /// Process the peer's Nr: free acknowledged messages, open the window
    /// and push out whatever the window now admits.
    pub(crate) fn recv_nr(&mut self, nr: u16) {
        let nack = seq_diff(nr, self.seq.rack);
        if nack <= 0 {
            return;
        }
        if seq_diff(nr, self.seq.ns) > 0 {
            self.stats.recv_bad_acks += 1;
            log::debug!(
                "[l2tp] ← bad ack nr={} (ns={} rack={})",
                nr,
                self.seq.ns,
                self.seq.rack
            );
            return;
        }
        let nack = nack as u16;

        self.seq.rack = nr;
        self.seq.rexmits = 0;
        self.seq.failure_notified = false;
        self.seq.window.slide(usize::from(nack));
        self.seq.window.open(nack);
        log::debug!(
            "[l2tp] ← ack nr={} (acked {}, cwnd={})",
            nr,
            nack,
            self.seq.window.cwnd()
        );

        self.seq.rack_timer.cancel(&mut self.link);
        if self.seq.window.is_empty() {
            return;
        }
        self.seq.rack_timer.arm(&mut self.link, RETRANSMIT_BASE);

        loop {
            let i = usize::from(self.seq.ns.wrapping_sub(self.seq.rack));
            if i >= usize::from(self.seq.window.cwnd()) {
                break;
            }
            let Some(payload) = self.seq.window.slot(i).map(<[u8]>::to_vec) else {
                break;
            };
            let ns = self.seq.ns;
            self.xmit_ctrl(Some(&payload), ns);
            self.seq.ns = ns.wrapping_add(1);
        }
    }

    /// Process the peer's Ns of a non-empty control message.  Returns
    /// `false` when the message must be dropped; an immediate ZLB has then
    /// already been sent so the peer learns where we are.
    pub(crate) fn recv_ns(&mut self, ns: u16) -> bool {
        if ns != self.seq.nr {
            if seq_diff(ns, self.seq.nr) < 0 {
                self.stats.recv_duplicates += 1;
                log::debug!("[l2tp] ← duplicate ns={} (nr={})", ns, self.seq.nr);
            } else {
                self.stats.recv_out_of_order += 1;
                log::debug!("[l2tp] ← out-of-order ns={} (nr={})", ns, self.seq.nr);
            }
            let our_ns = self.seq.ns;
            self.xmit_ctrl(None, our_ns);
            return false;
        }

        self.seq.nr = self.seq.nr.wrapping_add(1);
        if !self.seq.xack_timer.is_armed() {
            self.seq.xack_timer.arm(&mut self.link, DELAYED_ACK);
            log::trace!("[l2tp] delayed ack armed (nr={})", self.seq.nr);
        }
        true
    }

    /// Nothing piggy-backed our pending ack in time; send a ZLB.
    fn xack_timeout(&mut self) {
        log::trace!("[l2tp] delayed ack expired → ZLB nr={}", self.seq.nr);
        let ns = self.seq.ns;
        self.xmit_ctrl(None, ns);
        self.seq.sanity();
    }

    /// The peer did not acknowledge the head of the queue in time.
    fn rack_timeout(&mut self) {
        self.stats.xmit_retransmits += 1;

        let exhausted = self.seq.rexmits >= self.conf.rexmit_max;
        self.seq.rexmits = self.seq.rexmits.saturating_add(1);
        if exhausted && !self.seq.failure_notified {
            self.seq.failure_notified = true;
            log::warn!(
                "[l2tp] tunnel {}: no ack after {} retransmits",
                self.conf.tunnel_id,
                self.seq.rexmits - 1
            );
            self.link.notify_sequence_failure();
        }

        let delay = retransmit_backoff(self.seq.rexmits, self.conf.rexmit_max_to);
        self.seq.rack_timer.arm(&mut self.link, delay);
        self.seq.window.collapse();

        let rack = self.seq.rack;
        match self.seq.window.slot(0).map(<[u8]>::to_vec) {
            Some(payload) => {
                log::debug!(
                    "[l2tp] timeout: retransmitting ns={} (next in {:?})",
                    rack,
                    delay
                );
                self.xmit_ctrl(Some(&payload), rack);
            }
            None => self.stats.memory_failures += 1,
        }
        self.seq.sanity();
    }
}
