//! Outbound frames: control messages into the reliable window, data frames
//! straight down.

use crate::link::Link;
use crate::packet::{Header, Sequence, CTRL_HEADER_LEN, SESSION_TAG_LEN};
use crate::timer::RETRANSMIT_BASE;
use crate::tunnel::{Tunnel, TunnelError};

/// Control payloads (tag included) must stay below this so the framed
/// message fits the 16-bit length field.
const MAX_CTRL_PAYLOAD: usize = 0x10000 - 14;

/// Data payloads must stay below this for the same reason.
const MAX_DATA_PAYLOAD: usize = 0x10000 - 12;

impl<L: Link> Tunnel<L> {
    /// Submit a control message for reliable delivery.
    ///
    /// `payload` starts with the 2-byte session ID the message concerns
    /// (network order), followed by a non-empty message body.  The message
    /// goes out immediately if the congestion window has room, otherwise it
    /// waits in the window until acknowledgements open it.
    pub fn send_ctrl(&mut self, payload: Vec<u8>) -> Result<(), TunnelError> {
        self.ensure_enabled()?;

        // A bare tag would frame as a ZLB, which the peer never sequences.
        if payload.len() <= SESSION_TAG_LEN {
            self.stats.xmit_invalid += 1;
            return Err(TunnelError::MissingSessionTag);
        }
        if payload.len() >= MAX_CTRL_PAYLOAD {
            self.stats.xmit_too_big += 1;
            return Err(TunnelError::TooBig(payload.len()));
        }

        let slot = match self.seq.window.push(payload) {
            Ok(slot) => slot,
            Err(_) => {
                self.stats.xmit_drops += 1;
                log::warn!("[l2tp] control queue full, message dropped");
                return Err(TunnelError::QueueFull);
            }
        };

        if slot >= usize::from(self.seq.window.cwnd()) {
            log::debug!(
                "[l2tp] control message queued in slot {} (cwnd={})",
                slot,
                self.seq.window.cwnd()
            );
            self.seq.sanity();
            return Ok(());
        }

        if !self.seq.rack_timer.is_armed() {
            self.seq.rack_timer.arm(&mut self.link, RETRANSMIT_BASE);
        }
        let copy = self.seq.window.slot(slot).map(<[u8]>::to_vec);
        let ns = self.seq.ns;
        if let Some(copy) = copy {
            self.xmit_ctrl(Some(&copy), ns);
        }
        self.seq.ns = ns.wrapping_add(1);
        self.seq.sanity();
        Ok(())
    }

    /// Send one data frame on `session_id`.  Data frames are not
    /// retransmitted; they only carry sequence numbers when the session has
    /// data sequencing enabled.
    pub fn send_data(&mut self, session_id: u16, payload: &[u8]) -> Result<(), TunnelError> {
        self.ensure_enabled()?;

        if payload.len() >= MAX_DATA_PAYLOAD {
            self.stats.xmit_data_too_big += 1;
            return Err(TunnelError::TooBig(payload.len()));
        }

        let peer_tunnel = self.conf.peer_id;
        let entry = self
            .sessions
            .get_mut(session_id)
            .ok_or(TunnelError::UnknownSession(session_id))?;

        let sequence = entry.config.enable_dseq.then(|| {
            let seq = Sequence {
                ns: entry.ns,
                nr: entry.nr,
            };
            entry.ns = entry.ns.wrapping_add(1);
            seq
        });
        let header = Header::data(
            peer_tunnel,
            entry.config.peer_id,
            entry.config.include_length,
            sequence,
        );
        let frame = match header.encode(payload) {
            Ok(frame) => frame,
            Err(e) => {
                self.stats.memory_failures += 1;
                return Err(e.into());
            }
        };

        let len = frame.len() as u64;
        entry.stats.xmit_packets += 1;
        entry.stats.xmit_octets += len;
        self.stats.xmit_packets += 1;
        self.stats.xmit_octets += len;
        log::trace!("[l2tp] → data sid={:#06x} len={}", session_id, len);
        self.link.send_down(frame);
        Ok(())
    }

    /// Frame and send one control message, or a ZLB when `payload` is
    /// `None`, carrying `ns` and our current Nr.  Whatever we send
    /// acknowledges everything received so far, so the delayed ack is
    /// cancelled.  `ns` itself is not advanced here.
    pub(crate) fn xmit_ctrl(&mut self, payload: Option<&[u8]>, ns: u16) {
        self.seq.xack_timer.cancel(&mut self.link);
        self.seq.xack = self.seq.nr;
        let nr = self.seq.nr;

        let (session_id, body) = match payload {
            None => {
                self.stats.xmit_zlbs += 1;
                (0, &[][..])
            }
            Some(tagged) if tagged.len() >= SESSION_TAG_LEN => {
                let (tag, body) = tagged.split_at(SESSION_TAG_LEN);
                (u16::from_be_bytes([tag[0], tag[1]]), body)
            }
            Some(_) => {
                self.stats.memory_failures += 1;
                return;
            }
        };

        let frame = match Header::control(self.conf.peer_id, session_id, ns, nr).encode(body) {
            Ok(frame) => frame,
            Err(e) => {
                self.stats.memory_failures += 1;
                log::warn!("[l2tp] cannot frame control message: {e}");
                return;
            }
        };
        debug_assert!(frame.len() >= CTRL_HEADER_LEN);

        self.stats.xmit_packets += 1;
        self.stats.xmit_octets += frame.len() as u64;
        if body.is_empty() {
            log::debug!("[l2tp] → ZLB ns={} nr={}", ns, nr);
        } else {
            log::debug!(
                "[l2tp] → ctrl sid={:#06x} ns={} nr={} len={}",
                session_id,
                ns,
                nr,
                frame.len()
            );
        }
        self.link.send_down(frame);
    }
}
