//! `l2tp-tunnel`: the reliable control channel of an L2TP (RFC 2661)
//! tunnel, plus the framing of its data sessions.
//!
//! # Architecture
//!
//! ```text
//!   management layer                 session layer
//!        │  send_ctrl   ▲ deliver_control   │ send_data   ▲ deliver_data
//!  ┌─────▼──────────────┴───────────────────▼─────────────┴─────┐
//!  │                         Tunnel<L>                          │
//!  │   transmit ── TransmitWindow ── sequencer ── receive       │
//!  │                   (Ns/Nr, slow start, timers)              │
//!  └─────┬───────────────────────────────────────▲──────────────┘
//!        │ send_down                 recv_lower  │
//!  ┌─────▼───────────────────────────────────────┴──────┐
//!  │   Link  (node: tokio UDP socket │ capture: tests)  │
//!  └────────────────────────────────────────────────────┘
//! ```
//!
//! Each module has a single responsibility:
//! - [`packet`]: wire format (decode / encode)
//! - [`window`]: transmit window and congestion control
//! - [`timer`]: retransmit and delayed-ack timers
//! - [`sequencer`]: Ns/Nr processing and timeouts
//! - [`session`]: data sessions riding the tunnel
//! - [`config`]: tunnel and session configuration
//! - [`stats`]: counters
//! - [`link`]: the tunnel's view of the outside world
//! - [`tunnel`]: the tunnel object and its lifecycle
//! - [`receive`]: inbound frame pipeline
//! - [`transmit`]: outbound frame pipeline
//! - [`capture`]: recording link for deterministic tests
//! - [`socket`]: async UDP socket abstraction
//! - [`node`]: tokio event loop running one tunnel over UDP

pub mod capture;
pub mod config;
pub mod link;
pub mod node;
pub mod packet;
pub mod receive;
pub mod sequencer;
pub mod session;
pub mod socket;
pub mod stats;
pub mod timer;
pub mod transmit;
pub mod tunnel;
pub mod window;

pub use config::{SeqConfig, SessionConfig, TunnelConfig};
pub use link::Link;
pub use tunnel::{Tunnel, TunnelError};
