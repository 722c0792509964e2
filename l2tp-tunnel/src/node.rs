//! One tunnel over UDP, driven by a tokio event loop.
//!
//! # Architecture
//!
//! ```text
//!  Application
//!      │  NodeHandle::send_control / send_data / configure / ...
//!      │                               ┌──────────────────────┐
//!      │  ─── Command (mpsc) ───────▶  │                      │
//!      │                               │  event_loop task     │
//!      │  ◀── NodeEvent (mpsc) ──────  │    Tunnel<NodeLink>  │
//!      ▼                               │    Socket            │
//!  NodeHandle                          └──────────┬───────────┘
//!                                                 │ UDP datagrams
//!                                                 ▼
//!                                               peer
//! ```
//!
//! The tunnel never does I/O itself.  [`NodeLink`] collects whatever the
//! tunnel emits during one step (frames, upcalls, timer requests); the loop
//! then flushes frames to the socket and events to the application, and
//! sleeps until the next datagram, command or timer deadline.
//!
//! ```ignore
//! let socket = Socket::bind("127.0.0.1:1701".parse()?).await?;
//! let mut node = Node::new(socket, peer, conf)?.spawn();
//! node.send_control(vec![0, 0, /* message */]).await?;
//! while let Some(event) = node.next_event().await { /* ... */ }
//! ```

use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::config::{SessionConfig, TunnelConfig};
use crate::link::Link;
use crate::socket::{Socket, SocketError};
use crate::stats::TunnelStats;
use crate::timer::{TimerKind, TimerToken};
use crate::tunnel::{Tunnel, TunnelError};

/// Pending commands the application may queue before it has to wait.
const COMMAND_QUEUE: usize = 64;

/// What the tunnel hands up to the application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeEvent {
    /// An accepted control message, led by its 2-byte session ID.
    Control(Vec<u8>),
    /// A data payload for an attached session.
    Data { session_id: u16, payload: Vec<u8> },
    /// The peer has stopped acknowledging; retransmission continues.
    SequenceFailure,
}

#[derive(Debug, Error)]
pub enum NodeError {
    #[error(transparent)]
    Tunnel(#[from] TunnelError),
    #[error(transparent)]
    Socket(#[from] SocketError),
    #[error("node event loop has stopped")]
    Stopped,
}

/// [`Link`] that buffers one step's output for the event loop.
#[derive(Debug, Default)]
pub struct NodeLink {
    outbox: Vec<Vec<u8>>,
    events: Vec<NodeEvent>,
    timers: HashMap<TimerKind, (TimerToken, Instant)>,
}

impl NodeLink {
    /// Earliest pending timer deadline.
    fn next_deadline(&self) -> Option<Instant> {
        self.timers.values().map(|(_, at)| *at).min()
    }

    /// Remove and return every timer due at `now`.
    fn take_expired(&mut self, now: Instant) -> Vec<TimerToken> {
        let due: Vec<TimerToken> = self
            .timers
            .values()
            .filter(|(_, at)| *at <= now)
            .map(|(token, _)| *token)
            .collect();
        for token in &due {
            self.timers.remove(&token.kind);
        }
        due
    }
}

impl Link for NodeLink {
    fn send_down(&mut self, frame: Vec<u8>) {
        self.outbox.push(frame);
    }

    fn deliver_control(&mut self, payload: Vec<u8>) {
        self.events.push(NodeEvent::Control(payload));
    }

    fn deliver_data(&mut self, session_id: u16, payload: Vec<u8>) {
        self.events.push(NodeEvent::Data {
            session_id,
            payload,
        });
    }

    fn notify_sequence_failure(&mut self) {
        self.events.push(NodeEvent::SequenceFailure);
    }

    fn schedule_timer(&mut self, token: TimerToken, delay: Duration) {
        self.timers.insert(token.kind, (token, Instant::now() + delay));
    }

    fn cancel_timer(&mut self, token: TimerToken) {
        if self.timers.get(&token.kind).map(|(t, _)| *t) == Some(token) {
            self.timers.remove(&token.kind);
        }
    }
}

/// A tunnel bound to a socket and a fixed peer, not yet running.
pub struct Node {
    socket: Socket,
    peer: SocketAddr,
    tunnel: Tunnel<NodeLink>,
}

impl Node {
    pub fn new(socket: Socket, peer: SocketAddr, conf: TunnelConfig) -> Result<Self, NodeError> {
        let tunnel = Tunnel::with_config(NodeLink::default(), conf)?;
        Ok(Self {
            socket,
            peer,
            tunnel,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.socket.local_addr
    }

    pub fn tunnel(&self) -> &Tunnel<NodeLink> {
        &self.tunnel
    }

    /// Attach a session before the node starts running.
    pub fn attach_session(&mut self, conf: SessionConfig) -> Result<(), NodeError> {
        Ok(self.tunnel.attach_session_with(conf)?)
    }

    /// Start the event loop in a background task.
    pub fn spawn(self) -> NodeHandle {
        let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_QUEUE);
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let local_addr = self.local_addr();
        let handle = tokio::spawn(event_loop(self, cmd_rx, event_tx));
        NodeHandle {
            cmd_tx,
            events: event_rx,
            local_addr,
            handle,
        }
    }
}

type Reply<T> = oneshot::Sender<Result<T, TunnelError>>;

enum Command {
    SendControl(Vec<u8>, Reply<()>),
    SendData(u16, Vec<u8>, Reply<()>),
    AttachSession(SessionConfig, Reply<()>),
    DetachSession(u16, Reply<()>),
    Configure(TunnelConfig, Reply<()>),
    Stats(oneshot::Sender<TunnelStats>),
    Shutdown,
}

/// Application side of a running [`Node`].
pub struct NodeHandle {
    cmd_tx: mpsc::Sender<Command>,
    events: mpsc::UnboundedReceiver<NodeEvent>,
    local_addr: SocketAddr,
    handle: JoinHandle<()>,
}

impl NodeHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Submit a control message (leading 2-byte session ID included).
    pub async fn send_control(&self, payload: Vec<u8>) -> Result<(), NodeError> {
        self.request(|reply| Command::SendControl(payload, reply)).await
    }

    pub async fn send_data(&self, session_id: u16, payload: Vec<u8>) -> Result<(), NodeError> {
        self.request(|reply| Command::SendData(session_id, payload, reply))
            .await
    }

    pub async fn attach_session(&self, conf: SessionConfig) -> Result<(), NodeError> {
        self.request(|reply| Command::AttachSession(conf, reply)).await
    }

    pub async fn detach_session(&self, session_id: u16) -> Result<(), NodeError> {
        self.request(|reply| Command::DetachSession(session_id, reply))
            .await
    }

    /// Apply a new tunnel configuration.
    pub async fn configure(&self, conf: TunnelConfig) -> Result<(), NodeError> {
        self.request(|reply| Command::Configure(conf, reply)).await
    }

    pub async fn stats(&self) -> Result<TunnelStats, NodeError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Stats(tx))
            .await
            .map_err(|_| NodeError::Stopped)?;
        rx.await.map_err(|_| NodeError::Stopped)
    }

    /// Next upward event; `None` once the event loop has stopped.
    pub async fn next_event(&mut self) -> Option<NodeEvent> {
        self.events.recv().await
    }

    /// Stop the event loop, tearing the tunnel down, and wait for it.
    pub async fn shutdown(self) {
        let _ = self.cmd_tx.send(Command::Shutdown).await;
        let _ = self.handle.await;
    }

    async fn request(&self, make: impl FnOnce(Reply<()>) -> Command) -> Result<(), NodeError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(make(tx))
            .await
            .map_err(|_| NodeError::Stopped)?;
        Ok(rx.await.map_err(|_| NodeError::Stopped)??)
    }
}

async fn event_loop(
    node: Node,
    mut cmd_rx: mpsc::Receiver<Command>,
    event_tx: mpsc::UnboundedSender<NodeEvent>,
) {
    let Node {
        socket,
        peer,
        mut tunnel,
    } = node;

    // A "disarmed" deadline lies very far in the future.
    let far_future = Duration::from_secs(365 * 24 * 3600);
    log::info!("[l2tp:node] {} ⇄ {} running", socket.local_addr, peer);

    loop {
        flush(&socket, peer, tunnel.link_mut(), &event_tx).await;
        let deadline = tunnel
            .link()
            .next_deadline()
            .unwrap_or_else(|| Instant::now() + far_future);

        tokio::select! {
            // ── Branch 1: application command ────────────────────────────
            cmd = cmd_rx.recv() => {
                match cmd {
                    None | Some(Command::Shutdown) => break,
                    Some(cmd) => handle_command(&mut tunnel, cmd),
                }
            }

            // ── Branch 2: incoming UDP datagram ──────────────────────────
            result = socket.recv_from() => {
                let (buf, addr) = match result {
                    Ok(v) => v,
                    // e.g. ICMP port unreachable surfacing as ECONNREFUSED
                    Err(e) => {
                        log::warn!("[l2tp:node] receive failed: {e}");
                        continue;
                    }
                };
                if addr != peer {
                    log::debug!("[l2tp:node] ignoring datagram from {}", addr);
                    continue;
                }
                if let Err(e) = tunnel.recv_lower(&buf) {
                    log::debug!("[l2tp:node] ← dropped {} bytes: {}", buf.len(), e);
                }
            }

            // ── Branch 3: timer deadline ─────────────────────────────────
            _ = tokio::time::sleep_until(deadline) => {
                for token in tunnel.link_mut().take_expired(Instant::now()) {
                    tunnel.on_timer(token);
                }
            }
        }
    }

    let mut link = tunnel.shutdown();
    flush(&socket, peer, &mut link, &event_tx).await;
    log::info!("[l2tp:node] {} stopped", socket.local_addr);
}

fn handle_command(tunnel: &mut Tunnel<NodeLink>, cmd: Command) {
    match cmd {
        Command::SendControl(payload, reply) => {
            let _ = reply.send(tunnel.send_ctrl(payload));
        }
        Command::SendData(session_id, payload, reply) => {
            let _ = reply.send(tunnel.send_data(session_id, &payload));
        }
        Command::AttachSession(conf, reply) => {
            let _ = reply.send(tunnel.attach_session_with(conf));
        }
        Command::DetachSession(session_id, reply) => {
            let _ = reply.send(tunnel.detach_session(session_id).map(drop));
        }
        Command::Configure(conf, reply) => {
            let _ = reply.send(tunnel.set_config(conf));
        }
        Command::Stats(reply) => {
            let _ = reply.send(tunnel.stats().clone());
        }
        Command::Shutdown => {}
    }
}

/// Put queued frames on the wire and queued upcalls on the event channel.
async fn flush(
    socket: &Socket,
    peer: SocketAddr,
    link: &mut NodeLink,
    event_tx: &mpsc::UnboundedSender<NodeEvent>,
) {
    for frame in link.outbox.drain(..) {
        if let Err(e) = socket.send_to(&frame, peer).await {
            // Lost like any other datagram; retransmission covers control.
            log::warn!("[l2tp:node] send to {} failed: {}", peer, e);
        }
    }
    for event in link.events.drain(..) {
        // Nobody listening is not an error for the tunnel.
        let _ = event_tx.send(event);
    }
}
