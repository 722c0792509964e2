//! One L2TP tunnel: configuration, lifecycle and the object every pipeline
//! operates on.
//!
//! A [`Tunnel`] owns its configuration, counters, control-channel
//! [`SequenceState`], the table of attached data sessions and the [`Link`]
//! it talks through.  The frame paths live in sibling modules as further
//! `impl` blocks:
//! - [`crate::receive`]: inbound frames from the lower layer
//! - [`crate::transmit`]: outbound control and data frames
//! - [`crate::sequencer`]: Ns/Nr processing and the two timeouts
//!
//! A tunnel is single-writer: every call, including timer callbacks, must be
//! serialised by the owner (see [`crate::node`]).

use thiserror::Error;

use crate::config::{SeqConfig, SessionConfig, TunnelConfig};
use crate::link::Link;
use crate::packet::PacketError;
use crate::sequencer::SequenceState;
use crate::session::{SessionEntry, SessionTable};
use crate::stats::{SessionStats, TunnelStats};

/// Errors returned by tunnel operations.
///
/// Inbound frames that are dropped for protocol-ordering reasons
/// (duplicates, out-of-order Ns, ZLBs) are not errors; they return `Ok`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TunnelError {
    #[error("tunnel is not enabled")]
    Disabled,
    #[error("malformed frame: {0}")]
    Malformed(#[from] PacketError),
    #[error("control message needs a session tag and a non-empty body")]
    MissingSessionTag,
    #[error("frame addressed to tunnel {0}")]
    WrongTunnel(u16),
    #[error("no session with id {0}")]
    UnknownSession(u16),
    #[error("session {0} is already attached")]
    SessionExists(u16),
    #[error("payload of {0} bytes is too big")]
    TooBig(usize),
    #[error("transmit queue is full")]
    QueueFull,
    #[error("tunnel is busy")]
    Busy,
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),
}

pub struct Tunnel<L: Link> {
    pub(crate) conf: TunnelConfig,
    pub(crate) stats: TunnelStats,
    pub(crate) seq: SequenceState,
    pub(crate) sessions: SessionTable,
    pub(crate) link: L,
}

impl<L: Link> Tunnel<L> {
    /// A disabled tunnel with the default configuration.
    pub fn new(link: L) -> Self {
        let conf = TunnelConfig::default();
        let wmax = conf.effective_window().unwrap_or(1);
        Self {
            conf,
            stats: TunnelStats::default(),
            seq: SequenceState::new(wmax),
            sessions: SessionTable::new(),
            link,
        }
    }

    /// Create a tunnel and apply `conf` to it.
    pub fn with_config(link: L, conf: TunnelConfig) -> Result<Self, TunnelError> {
        let mut tunnel = Self::new(link);
        tunnel.set_config(conf)?;
        Ok(tunnel)
    }

    pub fn link(&self) -> &L {
        &self.link
    }

    pub fn link_mut(&mut self) -> &mut L {
        &mut self.link
    }

    pub fn is_enabled(&self) -> bool {
        self.conf.enabled
    }

    pub fn config(&self) -> &TunnelConfig {
        &self.conf
    }

    /// Control-channel sequencing state, read-only.
    pub fn sequence(&self) -> &SequenceState {
        &self.seq
    }

    /// Apply a new tunnel configuration.
    ///
    /// - Tunnel IDs that are already set may not change while enabled.
    /// - Disabling resets all sequencing state.
    /// - Enabling a disabled tunnel starts the window fresh.
    /// - While enabled the peer window may grow but never shrink.
    pub fn set_config(&mut self, conf: TunnelConfig) -> Result<(), TunnelError> {
        let old = self.conf;
        if old.enabled
            && ((old.tunnel_id != 0 && conf.tunnel_id != old.tunnel_id)
                || (old.peer_id != 0 && conf.peer_id != old.peer_id))
        {
            return Err(TunnelError::Busy);
        }

        if !conf.enabled {
            if old.enabled {
                log::info!("[l2tp] tunnel {} disabled", old.tunnel_id);
            }
            self.reset_sequencing();
            self.conf = conf;
            return Ok(());
        }

        let wmax = conf
            .effective_window()
            .ok_or(TunnelError::InvalidConfig("peer window must be at least 1"))?;
        if old.enabled {
            if wmax < self.seq.window.wmax() {
                return Err(TunnelError::Busy);
            }
            self.seq.window.grow_wmax(wmax);
        } else {
            self.seq.start(wmax);
            log::info!(
                "[l2tp] tunnel {} enabled (peer {}, window {})",
                conf.tunnel_id, conf.peer_id, wmax
            );
        }

        self.conf = conf;
        self.seq.sanity();
        Ok(())
    }

    /// Install control sequence numbers, e.g. when taking over a tunnel
    /// whose handshake was done elsewhere.
    ///
    /// Only allowed while disabled, and only with nothing in flight.
    pub fn set_seq(&mut self, conf: SeqConfig) -> Result<(), TunnelError> {
        if self.conf.enabled {
            return Err(TunnelError::Busy);
        }
        if !conf.is_quiescent() {
            return Err(TunnelError::InvalidConfig(
                "sequence numbers must have nothing in flight",
            ));
        }
        self.seq.ns = conf.ns;
        self.seq.nr = conf.nr;
        self.seq.rack = conf.rack;
        self.seq.xack = conf.xack;
        log::debug!("[l2tp] sequence numbers set: ns={} nr={}", conf.ns, conf.nr);
        Ok(())
    }

    pub fn stats(&self) -> &TunnelStats {
        &self.stats
    }

    pub fn clear_stats(&mut self) {
        self.stats = TunnelStats::default();
    }

    /// Return the counters and reset them.
    pub fn take_stats(&mut self) -> TunnelStats {
        std::mem::take(&mut self.stats)
    }

    /// Attach a data session with default settings.
    pub fn attach_session(&mut self, session_id: u16) -> Result<(), TunnelError> {
        self.attach_session_with(SessionConfig::new(session_id))
    }

    /// Attach a data session with an explicit configuration.
    pub fn attach_session_with(&mut self, conf: SessionConfig) -> Result<(), TunnelError> {
        if !self.sessions.insert(SessionEntry::new(conf)) {
            return Err(TunnelError::SessionExists(conf.session_id));
        }
        log::debug!(
            "[l2tp] session {:#06x} attached (peer {:#06x})",
            conf.session_id, conf.peer_id
        );
        Ok(())
    }

    /// Detach a session; its state is discarded.
    pub fn detach_session(&mut self, session_id: u16) -> Result<SessionEntry, TunnelError> {
        let entry = self
            .sessions
            .remove(session_id)
            .ok_or(TunnelError::UnknownSession(session_id))?;
        log::debug!("[l2tp] session {:#06x} detached", session_id);
        Ok(entry)
    }

    pub fn session(&self, session_id: u16) -> Option<&SessionEntry> {
        self.sessions.get(session_id)
    }

    pub fn sessions(&self) -> &SessionTable {
        &self.sessions
    }

    pub fn session_config(&self, session_id: u16) -> Result<SessionConfig, TunnelError> {
        self.sessions
            .get(session_id)
            .map(|e| e.config)
            .ok_or(TunnelError::UnknownSession(session_id))
    }

    /// Replace the configuration of the session named by `conf.session_id`.
    pub fn set_session_config(&mut self, conf: SessionConfig) -> Result<(), TunnelError> {
        let entry = self
            .sessions
            .get_mut(conf.session_id)
            .ok_or(TunnelError::UnknownSession(conf.session_id))?;
        entry.config = conf;
        Ok(())
    }

    pub fn session_stats(&self, session_id: u16) -> Result<SessionStats, TunnelError> {
        self.sessions
            .get(session_id)
            .map(|e| e.stats.clone())
            .ok_or(TunnelError::UnknownSession(session_id))
    }

    pub fn clear_session_stats(&mut self, session_id: u16) -> Result<(), TunnelError> {
        self.take_session_stats(session_id).map(drop)
    }

    pub fn take_session_stats(&mut self, session_id: u16) -> Result<SessionStats, TunnelError> {
        self.sessions
            .get_mut(session_id)
            .map(|e| std::mem::take(&mut e.stats))
            .ok_or(TunnelError::UnknownSession(session_id))
    }

    /// Tear the tunnel down: timers cancelled, transmit queue dropped.
    /// Returns the link so the owner can flush what is left in it.
    pub fn shutdown(mut self) -> L {
        self.reset_sequencing();
        self.conf.enabled = false;
        log::info!("[l2tp] tunnel {} shut down", self.conf.tunnel_id);
        self.link
    }

    pub(crate) fn ensure_enabled(&self) -> Result<(), TunnelError> {
        if self.conf.enabled {
            Ok(())
        } else {
            Err(TunnelError::Disabled)
        }
    }

    /// Cancel both timers, free the transmit queue, forget every session's
    /// data sequencing and zero the control sequence state.
    fn reset_sequencing(&mut self) {
        self.seq.rack_timer.cancel(&mut self.link);
        self.seq.xack_timer.cancel(&mut self.link);
        self.sessions.reset_sequencing();
        self.seq.reset();
        self.seq.sanity();
    }
}
