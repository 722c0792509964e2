//! Control-channel transmit window.
//!
//! [`TransmitWindow`] owns every outbound control payload that has not been
//! acknowledged yet, oldest first, together with the congestion state that
//! decides how many of them may be on the wire at once.
//!
//! # Slot layout
//!
//! ```text
//!   slot 0                 ns - rack                    queued()
//!     │                        │                           │
//!     ├── sent, not acked ────▶├── queued, not yet sent ──▶│
//! ```
//!
//! The window never holds more than [`MAX_XWIN`] payloads.  Occupied slots are
//! always contiguous from slot 0, so "first empty slot" is simply
//! [`TransmitWindow::queued`].
//!
//! Window growth follows RFC 2661 Appendix A: slow start up to `ssth`, then
//! congestion avoidance, capped at the peer's advertised window `wmax`.
//!
//! This module only manages state; sequence numbers and all I/O belong to
//! the caller.

use std::collections::VecDeque;

/// Our maximum transmit window, and so the cap on any peer window.
pub const MAX_XWIN: u16 = 16;

#[derive(Debug)]
pub struct TransmitWindow {
    /// Payloads in send order (front = oldest unacknowledged).
    slots: VecDeque<Vec<u8>>,
    /// Peer's maximum receive window.
    wmax: u16,
    /// Current congestion window.
    cwnd: u16,
    /// Slow start threshold.
    ssth: u16,
    /// Ack credit accumulated during congestion avoidance.
    acks: u16,
}

impl TransmitWindow {
    /// Fresh window state for a peer advertising `wmax` (1..=16).
    pub fn new(wmax: u16) -> Self {
        debug_assert!((1..=MAX_XWIN).contains(&wmax), "wmax out of range: {wmax}");
        Self {
            slots: VecDeque::with_capacity(usize::from(MAX_XWIN)),
            wmax,
            cwnd: 1,
            ssth: wmax,
            acks: 0,
        }
    }

    pub fn wmax(&self) -> u16 {
        self.wmax
    }

    pub fn cwnd(&self) -> u16 {
        self.cwnd
    }

    pub fn ssth(&self) -> u16 {
        self.ssth
    }

    pub fn acks(&self) -> u16 {
        self.acks
    }

    /// Raise the peer's window in place.  Shrinking is not supported; the
    /// caller refuses it before getting here.
    pub fn grow_wmax(&mut self, wmax: u16) {
        debug_assert!(wmax >= self.wmax && wmax <= MAX_XWIN);
        self.wmax = wmax;
    }

    /// Number of occupied slots (sent and unsent).
    pub fn queued(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.slots.len() >= usize::from(MAX_XWIN)
    }

    /// Payload held in slot `index`.
    pub fn slot(&self, index: usize) -> Option<&[u8]> {
        self.slots.get(index).map(Vec::as_slice)
    }

    /// Store `payload` in the first empty slot and return that slot's index.
    ///
    /// Hands the payload back when all [`MAX_XWIN`] slots are occupied.
    pub fn push(&mut self, payload: Vec<u8>) -> Result<usize, Vec<u8>> {
        if self.is_full() {
            return Err(payload);
        }
        self.slots.push_back(payload);
        Ok(self.slots.len() - 1)
    }

    /// Free the `nack` oldest slots; later slots move down by `nack`.
    pub fn slide(&mut self, nack: usize) {
        debug_assert!(nack <= self.slots.len(), "acked {nack} of {}", self.slots.len());
        let nack = nack.min(self.slots.len());
        self.slots.drain(..nack);
    }

    /// Open the congestion window for `nack` newly acknowledged messages,
    /// treating a multiple ack as `nack` single acks.
    pub fn open(&mut self, nack: u16) {
        if self.cwnd >= self.wmax {
            return;
        }
        let mut credit = nack;

        // Slow start.
        if self.cwnd < self.ssth {
            self.cwnd = self.cwnd.saturating_add(credit);
            credit = 0;
            if self.cwnd > self.ssth {
                credit = self.cwnd - self.ssth;
                self.cwnd = self.ssth;
            }
        }

        // Congestion avoidance.
        if self.cwnd >= self.ssth {
            self.acks = self.acks.saturating_add(credit);
            while self.acks >= self.cwnd {
                self.acks -= self.cwnd;
                if self.cwnd < self.wmax {
                    self.cwnd += 1;
                }
            }
        }
    }

    /// Retransmit timeout: halve the threshold and restart slow start.
    pub fn collapse(&mut self) {
        self.ssth = (self.cwnd + 1) / 2;
        self.cwnd = 1;
        self.acks = 0;
    }

    /// Drop every queued payload.
    pub fn clear(&mut self) {
        self.slots.clear();
    }
}
