//! Tunnel and session counters.

/// Per-tunnel statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TunnelStats {
    pub xmit_packets: u64,
    pub xmit_octets: u64,
    /// ZLB acks sent.
    pub xmit_zlbs: u64,
    pub xmit_retransmits: u64,
    /// Control messages dropped because the transmit queue was full.
    pub xmit_drops: u64,
    pub xmit_too_big: u64,
    pub xmit_data_too_big: u64,
    /// Control messages submitted without their session tag.
    pub xmit_invalid: u64,

    /// Every inbound frame, before validation.
    pub recv_packets: u64,
    pub recv_octets: u64,
    pub recv_runts: u64,
    pub recv_invalid: u64,
    pub recv_wrong_tunnel: u64,
    pub recv_unknown_sid: u64,
    /// Acks for control messages we never sent.
    pub recv_bad_acks: u64,
    pub recv_out_of_order: u64,
    pub recv_duplicates: u64,
    /// Data frames dropped by per-session sequence checking.
    pub recv_data_drops: u64,
    pub recv_zlbs: u64,

    /// Outbound frames that could not be built.
    pub memory_failures: u64,
}

/// Per-session statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub xmit_packets: u64,
    pub xmit_octets: u64,
    pub recv_packets: u64,
    pub recv_octets: u64,
}
