//! # Parley Relay Server
//!
//! Single-threaded chat relay with bounded replay history.
//!
//! ## Features
//!
//! - One readiness-driven loop multiplexing every connection
//! - Monotonic client identities, stamped into every relayed frame
//! - Byte-bounded history replayed to late joiners
//! - UDP discovery responder
//! - Frames are relayed as opaque bytes; the server never holds a key
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │                     RelayServer                      │
//! ├──────────────────────────────────────────────────────┤
//! │  select! { shutdown | accept | probe | readable | tick }
//! │      │          │        │         │                 │
//! │      ▼          ▼        ▼         ▼                 │
//! │   close all   admit   discovery  service clients     │
//! │               (id +   reply      ├─ stamp sender id  │
//! │               history)           ├─ relay to all     │
//! │                                  └─ append history   │
//! └──────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod errors;
pub mod history;
pub mod listener;
pub mod registry;

pub use config::*;
pub use errors::*;
pub use history::*;
pub use listener::*;
pub use registry::*;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::config::*;
    pub use crate::errors::*;
    pub use crate::history::*;
    pub use crate::listener::*;
    pub use crate::registry::*;
    pub use crate::{RelayServer, ServerStats, ShutdownHandle};
}

use futures::future::join_all;
use parley_protocol::{
    send_all, send_all_counted, send_identity, try_recv_frame, ClientId, RawFrame, RecvOutcome,
};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Notify;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

/// Stops a running server from outside its loop
#[derive(Clone, Debug)]
pub struct ShutdownHandle {
    running: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl ShutdownHandle {
    fn new() -> Self {
        Self {
            running: Arc::new(AtomicBool::new(true)),
            notify: Arc::new(Notify::new()),
        }
    }

    /// Ask the server to stop
    pub fn shutdown(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.notify.notify_one();
    }

    /// Whether shutdown has not been requested
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    async fn wait(&self) {
        self.notify.notified().await
    }
}

/// What woke the loop
enum LoopEvent {
    Shutdown,
    Accepted(std::io::Result<(TcpStream, SocketAddr)>),
    Probe(Result<(usize, SocketAddr), ServerError>),
    Readable,
    Tick,
}

/// Largest discovery datagram we bother reading
const PROBE_BUFFER_SIZE: usize = 64;

/// The relay server
pub struct RelayServer {
    /// Server configuration
    config: ServerConfig,
    /// Relay listener
    listener: TcpListener,
    /// Discovery socket, when enabled
    discovery: Option<DiscoveryResponder>,
    /// Live connections
    registry: ConnectionRegistry,
    /// Replay history
    history: HistoryLog,
    /// Shutdown signal
    shutdown: ShutdownHandle,
    /// Start time
    started_at: Instant,
    /// Frames relayed since start
    frames_relayed: u64,
    /// Connections dropped for falling behind on relay sends
    stalled_dropped: u64,
    /// Per-peer deliveries skipped because the peer was not writable
    frames_skipped: u64,
}

impl RelayServer {
    /// Bind listeners for `config`
    pub async fn bind(config: ServerConfig) -> ServerResult<Self> {
        config.validate()?;
        let addr = config.socket_addr()?;

        let listener = bind_relay_listener(addr)?;
        // Discovery shares the relay's port, including an OS-picked one
        let relay_addr = listener.local_addr()?;
        let discovery = if config.enable_discovery {
            Some(DiscoveryResponder::bind(SocketAddr::new(addr.ip(), relay_addr.port()))?)
        } else {
            None
        };

        info!("Relay listening on {}", listener.local_addr()?);
        if let Some(d) = &discovery {
            info!("Discovery listening on {}", d.local_addr());
        }

        Ok(Self {
            history: HistoryLog::new(config.history_capacity),
            config,
            listener,
            discovery,
            registry: ConnectionRegistry::new(),
            shutdown: ShutdownHandle::new(),
            started_at: Instant::now(),
            frames_relayed: 0,
            stalled_dropped: 0,
            frames_skipped: 0,
        })
    }

    /// Get server configuration
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Address clients connect to
    pub fn local_addr(&self) -> ServerResult<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Address discovery probes are answered on
    pub fn discovery_addr(&self) -> Option<SocketAddr> {
        self.discovery.as_ref().map(DiscoveryResponder::local_addr)
    }

    /// Handle for stopping the server
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    /// Get server statistics
    pub fn stats(&self) -> ServerStats {
        ServerStats {
            uptime_secs: self.started_at.elapsed().as_secs(),
            connected_clients: self.registry.len(),
            identities_issued: self.registry.total_issued(),
            frames_relayed: self.frames_relayed,
            history_frames: self.history.len(),
            history_bytes: self.history.size(),
            stalled_dropped: self.stalled_dropped,
            frames_skipped: self.frames_skipped,
        }
    }

    /// Run until shutdown is requested
    pub async fn run(mut self) -> ServerResult<ServerStats> {
        info!("Server ready for connections");
        let mut probe_buf = [0u8; PROBE_BUFFER_SIZE];

        while self.shutdown.is_running() {
            let event = tokio::select! {
                _ = self.shutdown.wait() => LoopEvent::Shutdown,
                accepted = self.listener.accept() => LoopEvent::Accepted(accepted),
                probe = recv_probe(self.discovery.as_ref(), &mut probe_buf) => LoopEvent::Probe(probe),
                _ = self.registry.wait_readable() => LoopEvent::Readable,
                _ = sleep(self.config.poll_interval()) => LoopEvent::Tick,
            };

            match event {
                LoopEvent::Shutdown => break,
                LoopEvent::Accepted(Ok((stream, peer))) => self.admit(stream, peer).await,
                LoopEvent::Accepted(Err(e)) => warn!("Accept failed: {}", e),
                LoopEvent::Probe(Ok((len, from))) => {
                    if let Some(discovery) = &self.discovery {
                        if let Err(e) = discovery.respond(&probe_buf[..len], from).await {
                            debug!(peer = %from, "Discovery reply failed: {}", e);
                        }
                    }
                }
                LoopEvent::Probe(Err(e)) => debug!("Discovery receive failed: {}", e),
                LoopEvent::Readable => self.service_clients().await,
                LoopEvent::Tick => debug!("{}", self.stats()),
            }
        }

        let stats = self.stats();
        info!("Shutting down, closing {} connection(s)", self.registry.len());
        self.registry.clear();
        info!("{}", stats);
        Ok(stats)
    }

    /// Issue an identity, send it and the history, then register
    async fn admit(&mut self, stream: TcpStream, peer: SocketAddr) {
        let Some(id) = self.registry.allocate_id() else {
            warn!("{}", ServerError::IdentitiesExhausted(peer));
            return;
        };
        stream.set_nodelay(true).ok();

        let history = self.history.snapshot();
        let handshake = async {
            send_identity(&stream, id).await?;
            send_all(&stream, &history).await
        };

        match timeout(self.config.handshake_timeout(), handshake).await {
            Ok(Ok(())) => {
                match self.registry.insert(id, Connection::new(stream, peer)) {
                    Ok(()) => {
                        info!(client = %id, peer = %peer, replayed = self.history.len(), "Client connected");
                    }
                    Err(_) => warn!(client = %id, peer = %peer, "Identity already live, closing newcomer"),
                }
            }
            Ok(Err(e)) => warn!(client = %id, peer = %peer, "Handshake failed: {}", e),
            Err(_) => warn!(client = %id, "{}", ServerError::HandshakeTimeout(peer)),
        }
    }

    /// Read at most one frame from every connection
    async fn service_clients(&mut self) {
        for id in self.registry.ids() {
            let outcome = match self.registry.get(id) {
                Some(connection) => {
                    try_recv_frame(
                        &connection.stream,
                        self.config.max_frame_size,
                        self.config.read_timeout(),
                    )
                    .await
                }
                None => continue,
            };

            match outcome {
                Ok(RecvOutcome::Frame(frame)) => self.relay(id, frame).await,
                Ok(RecvOutcome::NotReady) => {}
                Ok(RecvOutcome::Closed) => self.disconnect(id, "closed by peer"),
                Err(e) => self.disconnect(id, &e.to_string()),
            }
        }
    }

    /// Stamp, fan out to every connection, then archive
    ///
    /// Each peer gets `send_timeout` to take the frame. A peer that took
    /// none of it simply misses the frame and stays connected; a peer left
    /// holding part of a frame is out of sync and is disconnected. Send
    /// errors are left for the peer's own next read to surface.
    async fn relay(&mut self, id: ClientId, mut frame: RawFrame) {
        frame.set_sender(id);
        self.registry.record_received(id, frame.len());

        let bytes = frame.as_bytes();
        let send_timeout = self.config.send_timeout();
        let sends = self.registry.iter().map(|(peer, connection)| async move {
            let mut written = 0;
            let result = timeout(
                send_timeout,
                send_all_counted(&connection.stream, bytes, &mut written),
            )
            .await;
            (peer, result, written)
        });
        let results = join_all(sends).await;

        let mut stalled = Vec::new();
        for (peer, result, written) in results {
            match result {
                Ok(Ok(())) => self.registry.record_sent(peer, bytes.len()),
                Ok(Err(e)) => debug!(client = %peer, "Relay send failed: {}", e),
                Err(_) if written == 0 => {
                    self.frames_skipped += 1;
                    debug!(client = %peer, "Peer not writable, frame skipped");
                }
                Err(_) => stalled.push(peer),
            }
        }
        for peer in stalled {
            self.stalled_dropped += 1;
            self.disconnect(peer, "relay send timed out mid-frame");
        }

        self.frames_relayed += 1;
        debug!(client = %id, len = frame.len(), "Frame relayed");
        self.history.push(frame.into_bytes());
    }

    fn disconnect(&mut self, id: ClientId, reason: &str) {
        if let Some(connection) = self.registry.remove(id) {
            info!(
                client = %id,
                peer = %connection.info.peer_addr,
                frames = connection.info.frames_received,
                "Client disconnected: {}",
                reason
            );
        }
    }
}

async fn recv_probe(
    discovery: Option<&DiscoveryResponder>,
    buf: &mut [u8],
) -> Result<(usize, SocketAddr), ServerError> {
    match discovery {
        Some(d) => d.recv_from(buf).await,
        None => std::future::pending().await,
    }
}

/// Server statistics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerStats {
    /// Server uptime in seconds
    pub uptime_secs: u64,
    /// Live connections
    pub connected_clients: usize,
    /// Identities issued since start
    pub identities_issued: u64,
    /// Frames relayed since start
    pub frames_relayed: u64,
    /// Frames currently in history
    pub history_frames: usize,
    /// Bytes currently in history
    pub history_bytes: usize,
    /// Connections dropped for stalling a relay
    pub stalled_dropped: u64,
    /// Per-peer deliveries skipped for unwritable peers
    pub frames_skipped: u64,
}

impl std::fmt::Display for ServerStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "up {}s, {} client(s), {} id(s) issued, {} frame(s) relayed, history {} frame(s)/{} bytes",
            self.uptime_secs,
            self.connected_clients,
            self.identities_issued,
            self.frames_relayed,
            self.history_frames,
            self.history_bytes
        )
    }
}
