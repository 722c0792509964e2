//! Inbound frames from the lower layer.
//!
//! Every datagram is counted, decoded and addressed before it is split into
//! the control path (acks, Ns check, upward delivery with the session tag
//! restored) or the data path (per-session sequence check, upward delivery).
//! Malformed and misaddressed frames come back as errors; frames dropped for
//! ordering reasons are `Ok`.

use crate::link::Link;
use crate::packet::{Frame, PacketError};
use crate::sequencer::seq_diff;
use crate::tunnel::{Tunnel, TunnelError};

impl<L: Link> Tunnel<L> {
    /// Process one datagram received from the peer.
    pub fn recv_lower(&mut self, buf: &[u8]) -> Result<(), TunnelError> {
        self.ensure_enabled()?;

        self.stats.recv_packets += 1;
        self.stats.recv_octets += buf.len() as u64;

        // Addressing is checked before the offset padding, so a
        // misaddressed frame counts as such even if its padding is bad.
        let head = Frame::decode_head(buf).map_err(|e| self.malformed(e))?;
        let hdr = head.header;

        if hdr.tunnel_id != self.conf.tunnel_id && (self.conf.match_id || hdr.tunnel_id != 0) {
            self.stats.recv_wrong_tunnel += 1;
            log::debug!("[l2tp] ← frame for tunnel {} dropped", hdr.tunnel_id);
            return Err(TunnelError::WrongTunnel(hdr.tunnel_id));
        }

        let result = if hdr.is_control() {
            self.recv_control(head)
        } else {
            self.recv_data(head, buf.len())
        };
        self.seq.sanity();
        result
    }

    fn recv_control(&mut self, head: Frame<'_>) -> Result<(), TunnelError> {
        let Frame { header: hdr, payload } = head.strip_offset().map_err(|e| self.malformed(e))?;
        // Control frames always carry Ns/Nr; decode enforces the flag.
        let Some(seq) = hdr.sequence else {
            return Err(self.malformed(PacketError::BadFlags(hdr.flags)));
        };

        self.recv_nr(seq.nr);

        if payload.is_empty() {
            self.stats.recv_zlbs += 1;
            log::trace!("[l2tp] ← ZLB ns={} nr={}", seq.ns, seq.nr);
            return Ok(());
        }

        let mut tagged = Vec::with_capacity(2 + payload.len());
        tagged.extend_from_slice(&hdr.session_id.to_be_bytes());
        tagged.extend_from_slice(payload);

        if !self.recv_ns(seq.ns) {
            return Ok(());
        }
        log::debug!(
            "[l2tp] ← ctrl sid={:#06x} ns={} nr={} len={}",
            hdr.session_id,
            seq.ns,
            seq.nr,
            payload.len()
        );
        self.link.deliver_control(tagged);
        Ok(())
    }

    fn recv_data(&mut self, head: Frame<'_>, frame_len: usize) -> Result<(), TunnelError> {
        let sid = head.header.session_id;
        let Some(entry) = self.sessions.get_mut(sid) else {
            self.stats.recv_unknown_sid += 1;
            log::debug!("[l2tp] ← data for unknown session {:#06x}", sid);
            return Err(TunnelError::UnknownSession(sid));
        };
        let Frame { header: hdr, payload } = match head.strip_offset() {
            Ok(frame) => frame,
            Err(e) => return Err(self.malformed(e)),
        };

        entry.stats.recv_packets += 1;
        entry.stats.recv_octets += frame_len as u64;

        // Without authority over sequencing, follow whatever the peer does.
        if !entry.config.control_dseq {
            entry.config.enable_dseq = hdr.has_sequence();
        }

        if let Some(seq) = hdr.sequence {
            if entry.config.enable_dseq && seq_diff(seq.ns, entry.nr) < 0 {
                self.stats.recv_data_drops += 1;
                log::debug!(
                    "[l2tp] ← stale data sid={:#06x} ns={} (expected {})",
                    hdr.session_id,
                    seq.ns,
                    entry.nr
                );
                return Ok(());
            }
            entry.nr = seq.ns.wrapping_add(1);
        }

        if payload.is_empty() {
            return Ok(());
        }
        self.link.deliver_data(hdr.session_id, payload.to_vec());
        Ok(())
    }

    /// Count a decode failure and turn it into the caller's error.
    fn malformed(&mut self, err: PacketError) -> TunnelError {
        if err.is_runt() {
            self.stats.recv_runts += 1;
        } else {
            self.stats.recv_invalid += 1;
        }
        log::warn!("[l2tp] ← dropping malformed frame: {err}");
        TunnelError::Malformed(err)
    }
}

#[cfg(test)]
mod tests {
    use crate::capture::CaptureLink;
    use crate::config::{SessionConfig, TunnelConfig};
    use crate::packet::{Header, PacketError, Sequence};
    use crate::tunnel::{Tunnel, TunnelError};

    fn tunnel() -> Tunnel<CaptureLink> {
        let conf = TunnelConfig {
            enabled: true,
            tunnel_id: 7,
            peer_id: 9,
            peer_win: 4,
            ..TunnelConfig::default()
        };
        Tunnel::with_config(CaptureLink::default(), conf).unwrap()
    }

    fn ctrl(tunnel_id: u16, session_id: u16, ns: u16, nr: u16, body: &[u8]) -> Vec<u8> {
        Header::control(tunnel_id, session_id, ns, nr).encode(body).unwrap()
    }

    #[test]
    fn control_message_delivered_with_session_tag() {
        let mut t = tunnel();
        t.recv_lower(&ctrl(7, 0x0102, 0, 0, b"SCCRQ")).unwrap();
        assert_eq!(t.link().control, vec![b"\x01\x02SCCRQ".to_vec()]);
        assert_eq!(t.sequence().nr, 1);
        assert_eq!(t.stats().recv_packets, 1);
    }

    #[test]
    fn zlb_is_counted_not_delivered() {
        let mut t = tunnel();
        t.recv_lower(&ctrl(7, 0, 0, 0, &[])).unwrap();
        assert_eq!(t.stats().recv_zlbs, 1);
        assert!(t.link().control.is_empty());
        assert_eq!(t.sequence().nr, 0);
    }

    #[test]
    fn runt_and_invalid_are_counted_apart() {
        let mut t = tunnel();
        assert_eq!(
            t.recv_lower(&[0xc8, 0x02, 0x00]),
            Err(TunnelError::Malformed(PacketError::Runt(3)))
        );
        assert!(matches!(
            t.recv_lower(&[0xff, 0xff, 0, 0, 0, 0, 0, 0]),
            Err(TunnelError::Malformed(PacketError::BadFlags(0xffff)))
        ));
        assert_eq!(t.stats().recv_runts, 1);
        assert_eq!(t.stats().recv_invalid, 1);
        assert_eq!(t.stats().recv_packets, 2);
    }

    #[test]
    fn tunnel_id_zero_is_wildcard_unless_matching() {
        let mut t = tunnel();
        assert!(t.recv_lower(&ctrl(0, 0, 0, 0, b"x")).is_ok());
        assert_eq!(
            t.recv_lower(&ctrl(8, 0, 1, 0, b"x")),
            Err(TunnelError::WrongTunnel(8))
        );

        let mut conf = *t.config();
        conf.match_id = true;
        t.set_config(conf).unwrap();
        assert_eq!(
            t.recv_lower(&ctrl(0, 0, 1, 0, b"x")),
            Err(TunnelError::WrongTunnel(0))
        );
        assert_eq!(t.stats().recv_wrong_tunnel, 2);
    }

    #[test]
    fn data_for_unknown_session() {
        let mut t = tunnel();
        let frame = Header::data(7, 3, false, None).encode(b"pkt").unwrap();
        assert_eq!(t.recv_lower(&frame), Err(TunnelError::UnknownSession(3)));
        assert_eq!(t.stats().recv_unknown_sid, 1);
    }

    #[test]
    fn stale_data_dropped_when_sequencing() {
        let mut t = tunnel();
        t.attach_session(3).unwrap();
        let at = |ns| {
            Header::data(7, 3, false, Some(Sequence { ns, nr: 0 }))
                .encode(b"pkt")
                .unwrap()
        };
        t.recv_lower(&at(4)).unwrap();
        t.recv_lower(&at(2)).unwrap();
        t.recv_lower(&at(5)).unwrap();
        assert_eq!(t.link().data.len(), 2);
        assert_eq!(t.stats().recv_data_drops, 1);
        assert_eq!(t.session(3).unwrap().nr, 6);
        assert_eq!(t.session_stats(3).unwrap().recv_packets, 3);
    }

    #[test]
    fn follower_session_tracks_peer_sequencing() {
        let mut t = tunnel();
        let mut conf = SessionConfig::new(3);
        conf.control_dseq = false;
        conf.enable_dseq = false;
        t.attach_session_with(conf).unwrap();

        let with_seq = Header::data(7, 3, false, Some(Sequence { ns: 0, nr: 0 }))
            .encode(b"a")
            .unwrap();
        t.recv_lower(&with_seq).unwrap();
        assert!(t.session_config(3).unwrap().enable_dseq);

        let without = Header::data(7, 3, false, None).encode(b"b").unwrap();
        t.recv_lower(&without).unwrap();
        assert!(!t.session_config(3).unwrap().enable_dseq);
        assert_eq!(t.link().data.len(), 2);
    }

    #[test]
    fn empty_data_payload_is_not_delivered() {
        let mut t = tunnel();
        t.attach_session(3).unwrap();
        let frame = Header::data(7, 3, false, None).encode(&[]).unwrap();
        t.recv_lower(&frame).unwrap();
        assert!(t.link().data.is_empty());
        assert_eq!(t.session_stats(3).unwrap().recv_packets, 1);
    }
}
