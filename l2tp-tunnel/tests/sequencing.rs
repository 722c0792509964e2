//! Integration tests for control-channel sequencing: the transmit window,
//! acknowledgements, delayed acks and retransmission.
//!
//! Every test drives a single tunnel over a recording link and plays the
//! peer by hand, so timing is fully deterministic.

mod common;

use common::*;
use l2tp_tunnel::capture::CaptureLink;
use l2tp_tunnel::timer::{retransmit_backoff, TimerKind, DELAYED_ACK, TICK};
use l2tp_tunnel::{SeqConfig, Tunnel, TunnelConfig, TunnelError};

// ---------------------------------------------------------------------------
// Transmit window
// ---------------------------------------------------------------------------

/// Six messages into a window of four: slow start releases them as acks
/// arrive, in order, each with the next Ns.
#[test]
fn window_releases_queued_messages_as_acks_arrive() {
    let mut t = tunnel(4);
    for i in 0..6u8 {
        t.send_ctrl(msg(&[i])).unwrap();
    }

    // cwnd starts at 1.
    let sent = t.link_mut().take_sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(seq_of(&sent[0]), (0, 0));
    assert_eq!(t.sequence().window().queued(), 6);

    // One ack: cwnd 2, two more go out.
    t.recv_lower(&ack(0, 1)).unwrap();
    let sent = t.link_mut().take_sent();
    let ns: Vec<u16> = sent.iter().map(|f| seq_of(f).0).collect();
    assert_eq!(ns, vec![1, 2]);
    assert_eq!(t.sequence().window().cwnd(), 2);

    // Two acks: cwnd 4, the last three go out.
    t.recv_lower(&ack(0, 3)).unwrap();
    let sent = t.link_mut().take_sent();
    let ns: Vec<u16> = sent.iter().map(|f| seq_of(f).0).collect();
    assert_eq!(ns, vec![3, 4, 5]);
    assert_eq!(body_of(&sent[2]), vec![5]);
    assert_eq!(t.sequence().window().cwnd(), 4);

    // Everything acked: queue empty, retransmit timer stopped.
    t.recv_lower(&ack(0, 6)).unwrap();
    assert!(t.sequence().window().is_empty());
    assert!(!t.sequence().retransmit_pending());
    assert_eq!(t.link().pending(TimerKind::Retransmit), None);
    assert_eq!(t.sequence().verify(), Ok(()));
}

/// Messages keep their submission order across the queue.
#[test]
fn queued_payloads_go_out_in_submission_order() {
    let mut t = tunnel(16);
    for i in 0..4u8 {
        t.send_ctrl(msg(&[b'a' + i])).unwrap();
    }
    t.recv_lower(&ack(0, 1)).unwrap();
    t.recv_lower(&ack(0, 3)).unwrap();
    let bodies: Vec<Vec<u8>> = t.link().sent.iter().map(|f| body_of(f)).collect();
    assert_eq!(bodies, vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec(), b"d".to_vec()]);
}

/// A message that is only its session tag would look like a ZLB on the
/// wire and never be acknowledged; it is refused without using an Ns.
#[test]
fn tag_only_message_is_refused_and_channel_keeps_flowing() {
    let mut t = tunnel(4);
    assert_eq!(t.send_ctrl(msg(b"")), Err(TunnelError::MissingSessionTag));
    assert_eq!(t.stats().xmit_invalid, 1);
    assert!(t.link().sent.is_empty());

    t.send_ctrl(msg(b"real")).unwrap();
    let sent = t.link_mut().take_sent();
    assert_eq!(seq_of(&sent[0]), (0, 0));
    assert_eq!(body_of(&sent[0]), b"real".to_vec());

    t.recv_lower(&ack(0, 1)).unwrap();
    assert!(t.sequence().window().is_empty());
    assert_eq!(t.stats().recv_bad_acks, 0);
}

// ---------------------------------------------------------------------------
// Receiving and acknowledging
// ---------------------------------------------------------------------------

/// A message in sequence is accepted and acknowledged by a ZLB once the
/// delayed-ack timer expires.
#[test]
fn delayed_ack_flushes_with_zlb() {
    let mut t = tunnel(4);
    t.recv_lower(&ctrl(0, 0, 0, b"hello")).unwrap();
    assert_eq!(t.link().control, vec![msg(b"hello")]);

    let (_, delay) = t.link().pending(TimerKind::DelayedAck).unwrap();
    assert_eq!(delay, DELAYED_ACK);
    assert!(t.link().sent.is_empty());

    assert!(fire(&mut t, TimerKind::DelayedAck));
    let sent = t.link_mut().take_sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].len(), 12);
    assert_eq!(seq_of(&sent[0]), (0, 1));
    assert_eq!(t.sequence().xack, 1);
    assert_eq!(t.stats().xmit_zlbs, 1);
}

/// Our next control message carries the pending ack, so no ZLB follows.
#[test]
fn outgoing_message_piggybacks_pending_ack() {
    let mut t = tunnel(4);
    t.recv_lower(&ctrl(0, 0, 0, b"SCCRQ")).unwrap();
    t.send_ctrl(msg(b"SCCRP")).unwrap();

    let sent = t.link_mut().take_sent();
    assert_eq!(seq_of(&sent[0]), (0, 1));
    assert!(!t.sequence().ack_pending());
    assert!(!fire(&mut t, TimerKind::DelayedAck));
    assert_eq!(t.stats().xmit_zlbs, 0);
}

/// In-order Ns is accepted; a repeat is rejected and answered at once.
#[test]
fn duplicate_ns_rejected_with_immediate_ack() {
    let mut t = tunnel(4);
    t.recv_lower(&ctrl(0, 0, 0, b"one")).unwrap();
    t.recv_lower(&ctrl(0, 1, 0, b"two")).unwrap();
    assert_eq!(t.sequence().nr, 2);

    t.recv_lower(&ctrl(0, 1, 0, b"two")).unwrap();
    assert_eq!(t.link().control.len(), 2);
    assert_eq!(t.stats().recv_duplicates, 1);
    let sent = t.link_mut().take_sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(seq_of(&sent[0]), (0, 2));
}

/// A gap is not reordered: the early message is dropped and acked.
#[test]
fn out_of_order_ns_dropped() {
    let mut t = tunnel(4);
    t.recv_lower(&ctrl(0, 2, 0, b"early")).unwrap();
    assert!(t.link().control.is_empty());
    assert_eq!(t.stats().recv_out_of_order, 1);
    assert_eq!(t.sequence().nr, 0);
    assert_eq!(t.stats().xmit_zlbs, 1);
}

/// The Nr of a rejected message still acknowledges our traffic.
#[test]
fn ack_processed_even_when_message_is_rejected() {
    let mut t = tunnel(4);
    t.send_ctrl(msg(b"out")).unwrap();
    t.recv_lower(&ctrl(0, 0, 0, b"in")).unwrap();

    // Peer retransmits its message, now also acking ours.
    t.recv_lower(&ctrl(0, 0, 1, b"in")).unwrap();
    assert_eq!(t.stats().recv_duplicates, 1);
    assert!(t.sequence().window().is_empty());
    assert_eq!(t.sequence().rack, 1);
}

// ---------------------------------------------------------------------------
// Retransmission
// ---------------------------------------------------------------------------

/// Three timeouts with `rexmit_max = 2`: one failure notification, on the
/// third, and retransmission carries on with growing backoff.
#[test]
fn retransmit_budget_exhaustion_notifies_once() {
    let conf = TunnelConfig {
        rexmit_max: 2,
        ..enabled(LOCAL_ID, PEER_ID, 4)
    };
    let mut t = Tunnel::with_config(CaptureLink::default(), conf).unwrap();
    t.send_ctrl(msg(b"hello")).unwrap();
    t.link_mut().take_sent();

    let mut delays = Vec::new();
    for _ in 0..3 {
        assert!(fire(&mut t, TimerKind::Retransmit));
        delays.push(t.link().pending(TimerKind::Retransmit).unwrap().1);
    }
    assert_eq!(t.link().failures, 1);
    assert_eq!(delays, vec![TICK * 2, TICK * 4, TICK * 8]);

    let sent = t.link_mut().take_sent();
    assert_eq!(sent.len(), 3);
    assert!(sent.iter().all(|f| seq_of(f) == (0, 0)));
    assert_eq!(t.stats().xmit_retransmits, 3);

    // Still retrying, still silent.
    assert!(fire(&mut t, TimerKind::Retransmit));
    assert_eq!(t.link().failures, 1);
}

/// Backoff is capped by `rexmit_max_to`.
#[test]
fn backoff_capped_by_max_timeout() {
    let conf = TunnelConfig {
        rexmit_max_to: 5,
        ..enabled(LOCAL_ID, PEER_ID, 4)
    };
    let mut t = Tunnel::with_config(CaptureLink::default(), conf).unwrap();
    t.send_ctrl(msg(b"x")).unwrap();
    for _ in 0..6 {
        fire(&mut t, TimerKind::Retransmit);
    }
    let (_, delay) = t.link().pending(TimerKind::Retransmit).unwrap();
    assert_eq!(delay, TICK * 5);
    assert_eq!(delay, retransmit_backoff(6, 5));
}

/// An ack restarts the retransmit timer at the base interval for the
/// remaining messages.
#[test]
fn partial_ack_rearms_base_interval() {
    let mut t = tunnel(4);
    t.send_ctrl(msg(b"a")).unwrap();
    t.send_ctrl(msg(b"b")).unwrap();
    fire(&mut t, TimerKind::Retransmit);
    assert_eq!(t.sequence().rexmits, 1);

    t.recv_lower(&ack(0, 1)).unwrap();
    assert_eq!(t.sequence().rexmits, 0);
    let (_, delay) = t.link().pending(TimerKind::Retransmit).unwrap();
    assert_eq!(delay, TICK);
    // "b" went out with the next Ns.
    assert_eq!(seq_of(t.link().sent.last().unwrap()).0, 1);
}

// ---------------------------------------------------------------------------
// Sequence number wrap-around
// ---------------------------------------------------------------------------

#[test]
fn sequence_numbers_wrap() {
    let mut t = Tunnel::new(CaptureLink::default());
    t.set_seq(SeqConfig {
        ns: 0xfffe,
        rack: 0xfffe,
        nr: 0xffff,
        xack: 0xffff,
    })
    .unwrap();
    t.set_config(enabled(LOCAL_ID, PEER_ID, 4)).unwrap();

    for i in 0..3u8 {
        t.send_ctrl(msg(&[i])).unwrap();
    }
    t.recv_lower(&ctrl(0, 0xffff, 0xffff, b"late")).unwrap();
    assert_eq!(t.sequence().nr, 0);

    let ns: Vec<u16> = t.link().sent.iter().map(|f| seq_of(f).0).collect();
    assert_eq!(ns, vec![0xfffe, 0xffff, 0x0000]);

    t.recv_lower(&ack(0, 1)).unwrap();
    assert!(t.sequence().window().is_empty());
    assert_eq!(t.sequence().rack, 1);
    assert_eq!(t.stats().recv_bad_acks, 0);
}
