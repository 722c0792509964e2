//! Wire-format definitions for L2TP (RFC 2661) frames.
//!
//! Every datagram exchanged with the peer starts with a 16-bit header word
//! whose flag bits say which optional fields follow.  This module is
//! responsible for:
//! - Defining the header flag bits and the per-kind required-bit masks.
//! - Parsing a raw datagram into a [`Frame`] (header fields + payload slice),
//!   returning a [`PacketError`] for anything malformed or truncated.
//! - Serialising a [`Header`] and payload back into bytes.
//!
//! No I/O happens here.
//!
//! # Wire format
//!
//! All multi-byte integers are **big-endian**.
//!
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |T|L|x|x|S|x|O|P|x|x|x|x|  Ver  |          Length (opt)         |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |           Tunnel ID           |           Session ID          |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |             Ns (opt)          |             Nr (opt)          |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |      Offset Size (opt)        |    Offset pad... (opt)        |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```
//!
//! The length field, when present, holds the total frame length including
//! the header word.

use thiserror::Error;

/// Bit-flag constants for the header word.
pub mod flags {
    /// Control message (otherwise a data message).
    pub const CTRL: u16 = 0x8000;
    /// Length field present.
    pub const LEN: u16 = 0x4000;
    /// Ns and Nr fields present.
    pub const SEQ: u16 = 0x0800;
    /// Offset size field present.
    pub const OFF: u16 = 0x0200;
    /// Priority delivery requested (data messages only).
    pub const PRIO: u16 = 0x0100;
    /// Mask of the protocol version nibble.
    pub const VERSION_MASK: u16 = 0x000f;
    /// The only version this node speaks.
    pub const VERSION: u16 = 0x0002;
}

// Required-bit masks: bits that must be clear / set for each frame kind.
const CTRL_0BITS: u16 = 0x030d;
const CTRL_1BITS: u16 = 0xc802;
const DATA_0BITS: u16 = 0x800d;
const DATA_1BITS: u16 = 0x0002;

/// Fixed header word of every outbound control frame.
pub const CTRL_HDR: u16 = flags::CTRL | flags::LEN | flags::SEQ | flags::VERSION;

/// Fixed header word of every outbound data frame; length and sequence bits
/// are added per session.
pub const DATA_HDR: u16 = flags::VERSION;

/// Smallest datagram that can possibly be valid: header word + ID pair.
pub const MIN_FRAME_LEN: usize = 6;

/// Length of the header on an outbound control frame (and of a ZLB).
pub const CTRL_HEADER_LEN: usize = 12;

/// Length of the session-ID tag carried in front of control payloads that
/// cross the upper boundary of the tunnel.
pub const SESSION_TAG_LEN: usize = 2;

/// The Ns/Nr pair carried when [`flags::SEQ`] is set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sequence {
    /// Sender's sequence number for this frame.
    pub ns: u16,
    /// Next sequence number the sender expects from us.
    pub nr: u16,
}

/// Decoded (or to-be-encoded) L2TP header.
///
/// `flags` is authoritative for which optional fields are on the wire;
/// the optional fields are `Some` exactly when their flag is set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Raw header word.
    pub flags: u16,
    /// Declared total length (decode only; recomputed on encode).
    pub length: Option<u16>,
    pub tunnel_id: u16,
    pub session_id: u16,
    pub sequence: Option<Sequence>,
    /// Offset padding size (decode only unless set explicitly).
    pub offset: Option<u16>,
}

impl Header {
    /// Header for an outbound control frame.
    pub fn control(tunnel_id: u16, session_id: u16, ns: u16, nr: u16) -> Self {
        Self {
            flags: CTRL_HDR,
            length: None,
            tunnel_id,
            session_id,
            sequence: Some(Sequence { ns, nr }),
            offset: None,
        }
    }

    /// Header for an outbound data frame.
    pub fn data(
        tunnel_id: u16,
        session_id: u16,
        include_length: bool,
        sequence: Option<Sequence>,
    ) -> Self {
        let mut hdr = DATA_HDR;
        if include_length {
            hdr |= flags::LEN;
        }
        if sequence.is_some() {
            hdr |= flags::SEQ;
        }
        Self {
            flags: hdr,
            length: None,
            tunnel_id,
            session_id,
            sequence,
            offset: None,
        }
    }

    pub fn is_control(&self) -> bool {
        self.flags & flags::CTRL != 0
    }

    pub fn has_length(&self) -> bool {
        self.flags & flags::LEN != 0
    }

    pub fn has_sequence(&self) -> bool {
        self.flags & flags::SEQ != 0
    }

    pub fn has_offset(&self) -> bool {
        self.flags & flags::OFF != 0
    }

    pub fn version(&self) -> u16 {
        self.flags & flags::VERSION_MASK
    }

    /// Number of header bytes this header occupies on the wire.
    pub fn wire_len(&self) -> usize {
        2 + 4
            + 2 * usize::from(self.has_length())
            + 4 * usize::from(self.has_sequence())
            + self
                .offset
                .filter(|_| self.has_offset())
                .map_or(0, |off| 2 + usize::from(off))
    }

    /// Serialise this header followed by `payload` into a new buffer.
    ///
    /// The length field (when flagged) is computed from the actual frame
    /// size; any value stored in `self.length` is ignored.
    pub fn encode(&self, payload: &[u8]) -> Result<Vec<u8>, PacketError> {
        let total = self.wire_len() + payload.len();
        if total > usize::from(u16::MAX) {
            return Err(PacketError::TooBig(total));
        }
        let mut buf = Vec::with_capacity(total);

        buf.extend_from_slice(&self.flags.to_be_bytes());
        if self.has_length() {
            buf.extend_from_slice(&(total as u16).to_be_bytes());
        }
        buf.extend_from_slice(&self.tunnel_id.to_be_bytes());
        buf.extend_from_slice(&self.session_id.to_be_bytes());
        if self.has_sequence() {
            let seq = self.sequence.unwrap_or(Sequence { ns: 0, nr: 0 });
            buf.extend_from_slice(&seq.ns.to_be_bytes());
            buf.extend_from_slice(&seq.nr.to_be_bytes());
        }
        if self.has_offset() {
            let off = self.offset.unwrap_or(0);
            buf.extend_from_slice(&off.to_be_bytes());
            buf.resize(buf.len() + usize::from(off), 0);
        }
        buf.extend_from_slice(payload);

        Ok(buf)
    }
}

/// A parsed inbound datagram: header plus the payload left after the
/// header, length trimming and offset padding have been stripped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame<'a> {
    pub header: Header,
    pub payload: &'a [u8],
}

impl<'a> Frame<'a> {
    /// Parse a [`Frame`] from a raw datagram: [`Frame::decode_head`]
    /// followed by [`Frame::strip_offset`].
    pub fn decode(buf: &'a [u8]) -> Result<Self, PacketError> {
        Self::decode_head(buf)?.strip_offset()
    }

    /// Parse everything up to the offset field: header word, length, IDs
    /// and Ns/Nr.  When [`flags::OFF`] is set the returned payload still
    /// starts with the offset field, so the frame can be addressed before
    /// its padding is checked.
    ///
    /// Returns [`Err`] if:
    /// - `buf` is shorter than [`MIN_FRAME_LEN`] or than the flagged fixed
    ///   fields require ([`PacketError::Runt`]),
    /// - the required-bit masks for the frame kind are violated, or
    /// - the length field is smaller than the fixed part or exceeds the
    ///   buffer.
    pub fn decode_head(buf: &'a [u8]) -> Result<Self, PacketError> {
        if buf.len() < MIN_FRAME_LEN {
            return Err(PacketError::Runt(buf.len()));
        }

        let hdr = read_u16(buf, 0);
        let (must_clear, must_set) = if hdr & flags::CTRL != 0 {
            (CTRL_0BITS, CTRL_1BITS)
        } else {
            (DATA_0BITS, DATA_1BITS)
        };
        if hdr & must_clear != 0 || !hdr & must_set != 0 {
            return Err(PacketError::BadFlags(hdr));
        }

        let mut header = Header {
            flags: hdr,
            length: None,
            tunnel_id: 0,
            session_id: 0,
            sequence: None,
            offset: None,
        };
        let mut rest = &buf[2..];
        if rest.len() < fixed_len(&header) {
            return Err(PacketError::Runt(buf.len()));
        }

        if header.has_length() {
            let declared = read_u16(rest, 0);
            rest = &rest[2..];
            let len = i32::from(declared) - 4;
            if len < 0 || len as usize > rest.len() {
                return Err(PacketError::BadLength {
                    declared,
                    available: buf.len(),
                });
            }
            rest = &rest[..len as usize];
            // The trimmed frame must still hold the remaining fixed fields.
            if rest.len() < fixed_len(&header) - 2 {
                return Err(PacketError::BadLength {
                    declared,
                    available: buf.len(),
                });
            }
            header.length = Some(declared);
        }

        header.tunnel_id = read_u16(rest, 0);
        header.session_id = read_u16(rest, 2);
        rest = &rest[4..];

        if header.has_sequence() {
            header.sequence = Some(Sequence {
                ns: read_u16(rest, 0),
                nr: read_u16(rest, 2),
            });
            rest = &rest[4..];
        }

        Ok(Frame {
            header,
            payload: rest,
        })
    }

    /// Strip the offset field and its padding from a frame returned by
    /// [`Frame::decode_head`].  A no-op when [`flags::OFF`] is clear or the
    /// offset has already been stripped.
    pub fn strip_offset(self) -> Result<Self, PacketError> {
        let Frame {
            mut header,
            payload,
        } = self;
        if !header.has_offset() || header.offset.is_some() {
            return Ok(Frame { header, payload });
        }
        if payload.len() < 2 {
            return Err(PacketError::BadOffset {
                offset: 0,
                available: payload.len(),
            });
        }

        let off = read_u16(payload, 0);
        let skip = 2 + usize::from(off);
        if skip > payload.len() {
            return Err(PacketError::BadOffset {
                offset: off,
                available: payload.len(),
            });
        }
        header.offset = Some(off);
        Ok(Frame {
            header,
            payload: &payload[skip..],
        })
    }
}

/// Errors that can arise when parsing or building a datagram.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PacketError {
    /// Buffer shorter than the fixed part of the header.
    #[error("runt frame ({0} bytes)")]
    Runt(usize),
    /// Required-bit mask violated for the frame kind.
    #[error("illegal header word {0:#06x}")]
    BadFlags(u16),
    /// Length field is too small or exceeds the datagram.
    #[error("length field {declared} does not fit a {available}-byte datagram")]
    BadLength { declared: u16, available: usize },
    /// Offset padding runs past the end of the datagram.
    #[error("offset {offset} overruns the {available} remaining bytes")]
    BadOffset { offset: u16, available: usize },
    /// Frame would exceed what the 16-bit length field can describe.
    #[error("frame of {0} bytes is too big")]
    TooBig(usize),
}

impl PacketError {
    /// `true` for truncation, which is metriced separately from other
    /// malformed input.
    pub fn is_runt(&self) -> bool {
        matches!(self, PacketError::Runt(_))
    }
}

/// Bytes the flagged fields occupy after the header word, offset padding
/// excluded.
fn fixed_len(header: &Header) -> usize {
    4 + 2 * usize::from(header.has_length())
        + 4 * usize::from(header.has_sequence())
        + 2 * usize::from(header.has_offset())
}

#[inline]
fn read_u16(buf: &[u8], at: usize) -> u16 {
    u16::from_be_bytes([buf[at], buf[at + 1]])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn control_roundtrip() {
        let hdr = Header::control(0x1234, 7, 3, 9);
        let bytes = hdr.encode(b"avp-bytes").unwrap();
        let frame = Frame::decode(&bytes).unwrap();

        assert!(frame.header.is_control());
        assert_eq!(frame.header.version(), flags::VERSION);
        assert_eq!(frame.header.length, Some(bytes.len() as u16));
        assert_eq!(frame.header.tunnel_id, 0x1234);
        assert_eq!(frame.header.session_id, 7);
        assert_eq!(frame.header.sequence, Some(Sequence { ns: 3, nr: 9 }));
        assert_eq!(frame.payload, b"avp-bytes");
    }

    #[test]
    fn data_roundtrip_with_all_options() {
        let hdr = Header::data(1, 2, true, Some(Sequence { ns: 40, nr: 41 }));
        let bytes = hdr.encode(b"ppp").unwrap();
        let frame = Frame::decode(&bytes).unwrap();

        assert!(!frame.header.is_control());
        assert!(frame.header.has_length());
        assert_eq!(frame.header.sequence, Some(Sequence { ns: 40, nr: 41 }));
        assert_eq!(frame.payload, b"ppp");
    }

    #[test]
    fn bare_data_frame_has_six_byte_header() {
        let bytes = Header::data(1, 2, false, None).encode(b"x").unwrap();
        assert_eq!(bytes, vec![0x00, 0x02, 0x00, 0x01, 0x00, 0x02, b'x']);
        let frame = Frame::decode(&bytes).unwrap();
        assert_eq!(frame.header.sequence, None);
        assert_eq!(frame.payload, b"x");
    }

    #[test]
    fn zlb_is_exactly_the_control_header() {
        let bytes = Header::control(5, 0, 1, 2).encode(&[]).unwrap();
        assert_eq!(bytes.len(), CTRL_HEADER_LEN);
        assert_eq!(&bytes[..4], &[0xc8, 0x02, 0x00, 0x0c]);
        assert!(Frame::decode(&bytes).unwrap().payload.is_empty());
    }

    #[test]
    fn fields_are_big_endian_on_wire() {
        let bytes = Header::control(0x0102, 0x0304, 0x0506, 0x0708)
            .encode(&[])
            .unwrap();
        assert_eq!(
            &bytes[4..],
            &[0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08]
        );
    }

    #[test]
    fn short_buffer_is_runt() {
        assert_eq!(Frame::decode(&[0xc8, 0x02, 0, 0, 0]), Err(PacketError::Runt(5)));
    }

    #[test]
    fn control_without_sequence_bit_is_rejected() {
        // T=1 L=1 S=0
        let bytes = [0xc0, 0x02, 0x00, 0x08, 0, 1, 0, 0];
        assert_eq!(Frame::decode(&bytes), Err(PacketError::BadFlags(0xc002)));
    }

    #[test]
    fn wrong_version_is_rejected() {
        let bytes = [0x00, 0x03, 0, 1, 0, 2];
        assert_eq!(Frame::decode(&bytes), Err(PacketError::BadFlags(0x0003)));
    }

    #[test]
    fn data_with_priority_bit_is_legal() {
        let bytes = [0x01, 0x02, 0, 1, 0, 2, 0xaa];
        let frame = Frame::decode(&bytes).unwrap();
        assert_eq!(frame.payload, &[0xaa]);
    }

    #[test]
    fn control_with_priority_bit_is_rejected() {
        let mut bytes = Header::control(1, 0, 0, 0).encode(&[]).unwrap();
        bytes[0] |= 0x01;
        assert!(matches!(Frame::decode(&bytes), Err(PacketError::BadFlags(_))));
    }

    #[test]
    fn flagged_fields_missing_is_runt() {
        // Control header claims length + seq but only the IDs follow.
        let bytes = [0xc8, 0x02, 0x00, 0x0c, 0, 1, 0, 0];
        assert_eq!(Frame::decode(&bytes), Err(PacketError::Runt(8)));
    }

    #[test]
    fn declared_length_beyond_buffer_is_rejected() {
        let mut bytes = Header::control(1, 0, 0, 0).encode(b"abcd").unwrap();
        bytes[3] += 1;
        assert!(matches!(
            Frame::decode(&bytes),
            Err(PacketError::BadLength { declared: 17, .. })
        ));
    }

    #[test]
    fn declared_length_below_fixed_part_is_rejected() {
        let mut bytes = Header::control(1, 0, 0, 0).encode(&[]).unwrap();
        bytes[3] = 2;
        assert!(matches!(Frame::decode(&bytes), Err(PacketError::BadLength { .. })));
    }

    #[test]
    fn trailing_bytes_beyond_length_are_trimmed() {
        let mut bytes = Header::control(1, 0, 0, 0).encode(b"keep").unwrap();
        bytes.extend_from_slice(b"junk");
        assert_eq!(Frame::decode(&bytes).unwrap().payload, b"keep");
    }

    #[test]
    fn offset_padding_is_stripped() {
        let mut hdr = Header::data(1, 2, false, None);
        hdr.flags |= flags::OFF;
        hdr.offset = Some(3);
        let bytes = hdr.encode(b"body").unwrap();
        assert_eq!(bytes.len(), 6 + 2 + 3 + 4);

        let frame = Frame::decode(&bytes).unwrap();
        assert_eq!(frame.header.offset, Some(3));
        assert_eq!(frame.payload, b"body");
    }

    #[test]
    fn head_leaves_offset_for_later() {
        let bytes = [0x02, 0x02, 0, 1, 0, 2, 0x00, 0x01, 0xee, b'x'];
        let head = Frame::decode_head(&bytes).unwrap();
        assert_eq!(head.header.tunnel_id, 1);
        assert_eq!(head.header.offset, None);
        assert_eq!(head.payload, &[0x00, 0x01, 0xee, b'x']);

        let frame = head.strip_offset().unwrap();
        assert_eq!(frame.header.offset, Some(1));
        assert_eq!(frame.payload, b"x");
        // Stripping twice changes nothing.
        assert_eq!(frame.clone().strip_offset(), Ok(frame));
    }

    #[test]
    fn offset_overrun_is_rejected() {
        // data, OFF set, ids, offset=10, only 2 bytes of padding follow
        let bytes = [0x02, 0x02, 0, 1, 0, 2, 0x00, 0x0a, 0, 0];
        assert_eq!(
            Frame::decode(&bytes),
            Err(PacketError::BadOffset {
                offset: 10,
                available: 4
            })
        );
    }

    #[test]
    fn oversized_frame_is_refused_by_encoder() {
        let payload = vec![0u8; usize::from(u16::MAX)];
        assert!(matches!(
            Header::control(1, 0, 0, 0).encode(&payload),
            Err(PacketError::TooBig(_))
        ));
    }
}
