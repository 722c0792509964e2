//! Data sessions riding a tunnel.
//!
//! Each attached session has its own configuration, counters and data
//! sequence numbers.  Data sequence numbers are unrelated to the control
//! channel's Ns/Nr and are never retransmitted; they only let the receiver
//! drop duplicates and stale frames.

use std::collections::HashMap;

use crate::config::SessionConfig;
use crate::stats::SessionStats;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionEntry {
    pub config: SessionConfig,
    pub stats: SessionStats,
    /// Next data Ns we send.
    pub ns: u16,
    /// Next data Ns we expect.
    pub nr: u16,
}

impl SessionEntry {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            stats: SessionStats::default(),
            ns: 0,
            nr: 0,
        }
    }

    pub fn session_id(&self) -> u16 {
        self.config.session_id
    }

    /// Forget negotiated sequencing: counters back to zero, and the session
    /// follows the peer's lead again.
    pub fn reset_sequencing(&mut self) {
        self.config.control_dseq = false;
        self.config.enable_dseq = false;
        self.ns = 0;
        self.nr = 0;
    }
}

/// Sessions of one tunnel, keyed by our session ID.
#[derive(Debug, Default)]
pub struct SessionTable {
    entries: HashMap<u16, SessionEntry>,
}

impl SessionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a session.  Returns `false`, leaving the table untouched, if
    /// the ID is taken.
    pub fn insert(&mut self, entry: SessionEntry) -> bool {
        let id = entry.session_id();
        if self.entries.contains_key(&id) {
            return false;
        }
        self.entries.insert(id, entry);
        true
    }

    pub fn remove(&mut self, session_id: u16) -> Option<SessionEntry> {
        self.entries.remove(&session_id)
    }

    pub fn get(&self, session_id: u16) -> Option<&SessionEntry> {
        self.entries.get(&session_id)
    }

    pub fn get_mut(&mut self, session_id: u16) -> Option<&mut SessionEntry> {
        self.entries.get_mut(&session_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SessionEntry> {
        self.entries.values()
    }

    pub fn reset_sequencing(&mut self) {
        self.entries
            .values_mut()
            .for_each(SessionEntry::reset_sequencing);
    }
}
