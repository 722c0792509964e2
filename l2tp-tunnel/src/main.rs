//! Entry point for `l2tp-node`.
//!
//! Runs one L2TP tunnel endpoint over UDP towards a fixed peer.  Each line
//! read from stdin is submitted as a control message for session 0; every
//! control message, data payload and sequencing failure the tunnel hands up
//! is logged.  `main.rs` owns only process setup (logging, signal handling,
//! argument parsing); the protocol lives in the library.

use std::net::SocketAddr;

use anyhow::{bail, Context, Result};
use clap::Parser;
use l2tp_tunnel::config::{
    SessionConfig, TunnelConfig, DEFAULT_REXMIT_MAX, DEFAULT_REXMIT_MAX_TO,
};
use l2tp_tunnel::node::{Node, NodeEvent};
use l2tp_tunnel::socket::Socket;
use tokio::io::{AsyncBufReadExt, BufReader};

/// L2TP control-channel endpoint over UDP.
#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    /// Local address to bind (e.g. 0.0.0.0:1701).
    #[arg(short, long, default_value = "0.0.0.0:1701")]
    bind: SocketAddr,

    /// Remote peer address (e.g. 192.0.2.1:1701).
    #[arg(short, long)]
    peer: SocketAddr,

    /// Our tunnel ID.
    #[arg(long)]
    tunnel_id: u16,

    /// The peer's tunnel ID.
    #[arg(long)]
    peer_tunnel_id: u16,

    /// Peer's receive window (clamped to 16).
    #[arg(long, default_value_t = 4)]
    peer_win: u16,

    /// Retransmits before a sequencing failure is reported.
    #[arg(long, default_value_t = DEFAULT_REXMIT_MAX)]
    rexmit_max: u16,

    /// Retransmit backoff ceiling in seconds.
    #[arg(long, default_value_t = DEFAULT_REXMIT_MAX_TO)]
    rexmit_max_to: u16,

    /// Only accept frames carrying exactly our tunnel ID.
    #[arg(long)]
    match_id: bool,

    /// Attach a data session, as LOCAL:PEER session IDs.  Repeatable.
    #[arg(long = "session", value_parser = parse_session)]
    sessions: Vec<SessionConfig>,
}

fn parse_session(s: &str) -> Result<SessionConfig> {
    let Some((local, peer)) = s.split_once(':') else {
        bail!("expected LOCAL:PEER, got {s:?}");
    };
    let mut conf = SessionConfig::new(local.parse().context("local session ID")?);
    conf.peer_id = peer.parse().context("peer session ID")?;
    Ok(conf)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialise env_logger; set RUST_LOG to control verbosity.
    env_logger::init();

    let cli = Cli::parse();

    let conf = TunnelConfig {
        enabled: true,
        match_id: cli.match_id,
        tunnel_id: cli.tunnel_id,
        peer_id: cli.peer_tunnel_id,
        peer_win: cli.peer_win,
        rexmit_max: cli.rexmit_max,
        rexmit_max_to: cli.rexmit_max_to,
    };

    let socket = Socket::bind(cli.bind)
        .await
        .with_context(|| format!("binding {}", cli.bind))?;
    let mut node = Node::new(socket, cli.peer, conf).context("configuring tunnel")?;
    for session in cli.sessions {
        node.attach_session(session)
            .with_context(|| format!("attaching session {}", session.session_id))?;
    }
    log::info!(
        "Tunnel {} on {} → peer tunnel {} at {}",
        cli.tunnel_id,
        node.local_addr(),
        cli.peer_tunnel_id,
        cli.peer
    );

    let mut handle = node.spawn();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                match line.context("reading stdin")? {
                    // The tunnel refuses a control message with no body.
                    Some(line) if line.is_empty() => {}
                    Some(line) => {
                        let mut msg = vec![0, 0];
                        msg.extend_from_slice(line.as_bytes());
                        if let Err(e) = handle.send_control(msg).await {
                            log::warn!("control message not sent: {e}");
                        }
                    }
                    None => {
                        log::info!("stdin closed");
                        break;
                    }
                }
            }

            event = handle.next_event() => {
                match event {
                    Some(NodeEvent::Control(msg)) => {
                        let (sid, body) = msg.split_at(msg.len().min(2));
                        log::info!(
                            "control sid={:02x?}: {}",
                            sid,
                            String::from_utf8_lossy(body)
                        );
                    }
                    Some(NodeEvent::Data { session_id, payload }) => {
                        log::info!("data sid={:#06x}: {} bytes", session_id, payload.len());
                    }
                    Some(NodeEvent::SequenceFailure) => {
                        log::warn!("peer is not acknowledging control messages");
                    }
                    None => break,
                }
            }

            _ = tokio::signal::ctrl_c() => {
                log::info!("interrupted");
                break;
            }
        }
    }

    handle.shutdown().await;
    Ok(())
}
