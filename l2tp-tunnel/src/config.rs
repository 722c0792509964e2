//! Tunnel and session configuration.
//!
//! These are the knobs the management layer sets; they carry no runtime
//! state.  Validation against the running tunnel happens in
//! [`crate::tunnel::Tunnel::set_config`] and friends.

use crate::window::MAX_XWIN;

/// Default maximum number of retransmits before the owner is notified.
pub const DEFAULT_REXMIT_MAX: u16 = 5;

/// Default ceiling for the retransmit backoff, in seconds.
pub const DEFAULT_REXMIT_MAX_TO: u16 = 30;

/// Per-tunnel configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TunnelConfig {
    /// Frames are only processed while enabled.
    pub enabled: bool,
    /// Require inbound tunnel IDs to match exactly; otherwise 0 is accepted
    /// as a wildcard.
    pub match_id: bool,
    /// Our tunnel ID (what the peer puts in frames it sends us).
    pub tunnel_id: u16,
    /// The peer's tunnel ID (what we put in frames we send).
    pub peer_id: u16,
    /// Peer's advertised receive window; clamped to [`MAX_XWIN`].
    pub peer_win: u16,
    /// Retransmits of one message before the owner is notified.
    pub rexmit_max: u16,
    /// Retransmit backoff ceiling in seconds.
    pub rexmit_max_to: u16,
}

impl Default for TunnelConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            match_id: false,
            tunnel_id: 0,
            peer_id: 0,
            peer_win: 1,
            rexmit_max: DEFAULT_REXMIT_MAX,
            rexmit_max_to: DEFAULT_REXMIT_MAX_TO,
        }
    }
}

impl TunnelConfig {
    /// The transmit window this config asks for, or `None` for a zero
    /// window.
    pub fn effective_window(&self) -> Option<u16> {
        match self.peer_win {
            0 => None,
            w => Some(w.min(MAX_XWIN)),
        }
    }
}

/// Per-session configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    /// Our session ID (what the peer puts in data frames).
    pub session_id: u16,
    /// The peer's session ID (what we put in data frames).
    pub peer_id: u16,
    /// We decide whether data frames carry sequence numbers; when `false`
    /// the session follows whatever the peer does.
    pub control_dseq: bool,
    /// Data frames carry and check sequence numbers.
    pub enable_dseq: bool,
    /// Outbound data frames carry the length field.
    pub include_length: bool,
}

impl SessionConfig {
    pub fn new(session_id: u16) -> Self {
        Self {
            session_id,
            peer_id: 0,
            control_dseq: true,
            enable_dseq: true,
            include_length: false,
        }
    }
}

/// Administrative override of the control sequence numbers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeqConfig {
    pub ns: u16,
    pub nr: u16,
    pub rack: u16,
    pub xack: u16,
}

impl SeqConfig {
    /// Nothing in flight in either direction: everything received has been
    /// acked and everything sent has been acked.
    pub fn is_quiescent(&self) -> bool {
        self.xack == self.nr && self.ns == self.rack
    }
}
