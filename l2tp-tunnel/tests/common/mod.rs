//! Helpers shared by the integration tests.

#![allow(dead_code)]

use l2tp_tunnel::capture::CaptureLink;
use l2tp_tunnel::packet::{Frame, Header};
use l2tp_tunnel::timer::TimerKind;
use l2tp_tunnel::{Tunnel, TunnelConfig};

/// Our tunnel ID in single-tunnel tests.
pub const LOCAL_ID: u16 = 1;
/// The peer's tunnel ID in single-tunnel tests.
pub const PEER_ID: u16 = 2;

pub fn enabled(tunnel_id: u16, peer_id: u16, peer_win: u16) -> TunnelConfig {
    TunnelConfig {
        enabled: true,
        tunnel_id,
        peer_id,
        peer_win,
        ..TunnelConfig::default()
    }
}

/// An enabled tunnel on a recording link.
pub fn tunnel(peer_win: u16) -> Tunnel<CaptureLink> {
    Tunnel::with_config(CaptureLink::default(), enabled(LOCAL_ID, PEER_ID, peer_win))
        .expect("valid config")
}

/// A control frame as the peer would send it to us.
pub fn ctrl(session_id: u16, ns: u16, nr: u16, body: &[u8]) -> Vec<u8> {
    Header::control(LOCAL_ID, session_id, ns, nr)
        .encode(body)
        .expect("encodable")
}

/// A ZLB from the peer acknowledging everything below `nr`.
pub fn ack(ns: u16, nr: u16) -> Vec<u8> {
    ctrl(0, ns, nr, &[])
}

/// Control payload tagged for session 0.
pub fn msg(body: &[u8]) -> Vec<u8> {
    let mut m = vec![0, 0];
    m.extend_from_slice(body);
    m
}

/// `(ns, nr)` of an encoded control frame.
pub fn seq_of(frame: &[u8]) -> (u16, u16) {
    let seq = Frame::decode(frame)
        .expect("decodable")
        .header
        .sequence
        .expect("control frames carry Ns/Nr");
    (seq.ns, seq.nr)
}

/// Body (after the header) of an encoded frame.
pub fn body_of(frame: &[u8]) -> Vec<u8> {
    Frame::decode(frame).expect("decodable").payload.to_vec()
}

/// Let the pending `kind` timer expire.  Returns `false` if none was armed.
pub fn fire(t: &mut Tunnel<CaptureLink>, kind: TimerKind) -> bool {
    match t.link_mut().expire(kind) {
        Some(token) => {
            t.on_timer(token);
            true
        }
        None => false,
    }
}
