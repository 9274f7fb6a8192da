//! Connection Registry
//!
//! Tracks every live client connection by its [`ClientId`] and hands out
//! new identities. Identities increase monotonically from 1 and are never
//! reused, even for connections whose handshake failed. Once the last
//! identity is issued, no further connections are admitted.

use futures::future::select_all;
use parley_protocol::ClientId;
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tokio::net::TcpStream;

/// Connection info for a client
#[derive(Debug, Clone)]
pub struct ConnectionInfo {
    /// Remote address
    pub peer_addr: SocketAddr,
    /// Connection time
    pub connected_at: Instant,
    /// Last frame time
    pub last_frame: Instant,
    /// Frames received from this client
    pub frames_received: u64,
    /// Frames delivered to this client
    pub frames_sent: u64,
    /// Bytes received
    pub bytes_received: u64,
    /// Bytes sent
    pub bytes_sent: u64,
}

impl ConnectionInfo {
    /// Create new connection info
    pub fn new(peer_addr: SocketAddr) -> Self {
        let now = Instant::now();
        Self {
            peer_addr,
            connected_at: now,
            last_frame: now,
            frames_received: 0,
            frames_sent: 0,
            bytes_received: 0,
            bytes_sent: 0,
        }
    }

    /// Record received frame
    pub fn record_received(&mut self, bytes: usize) {
        self.frames_received += 1;
        self.bytes_received += bytes as u64;
        self.last_frame = Instant::now();
    }

    /// Record sent frame
    pub fn record_sent(&mut self, bytes: usize) {
        self.frames_sent += 1;
        self.bytes_sent += bytes as u64;
    }

    /// Get connection duration
    pub fn duration(&self) -> Duration {
        self.connected_at.elapsed()
    }
}

/// A registered client connection
#[derive(Debug)]
pub struct Connection {
    /// Socket
    pub stream: TcpStream,
    /// Metadata and counters
    pub info: ConnectionInfo,
}

impl Connection {
    pub fn new(stream: TcpStream, peer_addr: SocketAddr) -> Self {
        Self {
            stream,
            info: ConnectionInfo::new(peer_addr),
        }
    }
}

/// All live connections, ordered by identity
pub struct ConnectionRegistry {
    connections: BTreeMap<ClientId, Connection>,
    last_issued: ClientId,
    total_issued: u64,
}

impl ConnectionRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            connections: BTreeMap::new(),
            last_issued: ClientId::UNASSIGNED,
            total_issued: 0,
        }
    }

    /// Registry whose next identity follows `last`
    #[cfg(test)]
    pub(crate) fn resuming_after(last: ClientId) -> Self {
        Self {
            last_issued: last,
            ..Self::new()
        }
    }

    /// Issue the next identity; `None` once every identity has been issued
    pub fn allocate_id(&mut self) -> Option<ClientId> {
        let id = self.last_issued.checked_next()?;
        self.last_issued = id;
        self.total_issued += 1;
        Some(id)
    }

    /// Register a connection under an issued identity
    ///
    /// A live connection is never replaced; the newcomer is handed back.
    pub fn insert(&mut self, id: ClientId, connection: Connection) -> Result<(), Connection> {
        match self.connections.entry(id) {
            Entry::Vacant(slot) => {
                slot.insert(connection);
                Ok(())
            }
            Entry::Occupied(_) => Err(connection),
        }
    }

    /// Deregister a connection, returning it
    pub fn remove(&mut self, id: ClientId) -> Option<Connection> {
        self.connections.remove(&id)
    }

    /// Get a connection
    pub fn get(&self, id: ClientId) -> Option<&Connection> {
        self.connections.get(&id)
    }

    /// Identities of all live connections, ascending
    pub fn ids(&self) -> Vec<ClientId> {
        self.connections.keys().copied().collect()
    }

    /// Iterate connections in identity order
    pub fn iter(&self) -> impl Iterator<Item = (ClientId, &Connection)> {
        self.connections.iter().map(|(id, c)| (*id, c))
    }

    /// Record a frame received from `id`
    pub fn record_received(&mut self, id: ClientId, bytes: usize) {
        if let Some(connection) = self.connections.get_mut(&id) {
            connection.info.record_received(bytes);
        }
    }

    /// Record a frame delivered to `id`
    pub fn record_sent(&mut self, id: ClientId, bytes: usize) {
        if let Some(connection) = self.connections.get_mut(&id) {
            connection.info.record_sent(bytes);
        }
    }

    /// Resolve once any connection is readable; never resolves when empty
    pub async fn wait_readable(&self) {
        if self.connections.is_empty() {
            return std::future::pending().await;
        }

        let waits = self
            .connections
            .values()
            .map(|c| Box::pin(c.stream.readable()));
        // Errors surface on the following read attempt
        let _ = select_all(waits).await;
    }

    /// Number of live connections
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Identities issued over the registry's lifetime
    pub fn total_issued(&self) -> u64 {
        self.total_issued
    }

    /// Drop every connection
    pub fn clear(&mut self) {
        self.connections.clear();
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
