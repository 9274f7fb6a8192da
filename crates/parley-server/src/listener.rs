//! Listeners
//!
//! The TCP relay listener and the UDP discovery responder, both created
//! through socket2 so socket options are set before binding.

use crate::errors::ServerError;
use parley_protocol::{DISCOVERY_PROBE, DISCOVERY_REPLY};
use socket2::{Domain, Protocol, Socket, Type};
use std::net::SocketAddr;
use tokio::net::{TcpListener, UdpSocket};
use tracing::{debug, trace};

/// Pending-connection queue length
pub const LISTEN_BACKLOG: i32 = 64;

fn bind_failed(addr: SocketAddr) -> impl Fn(std::io::Error) -> ServerError {
    move |e| ServerError::BindFailed {
        address: addr.to_string(),
        reason: e.to_string(),
    }
}

/// Bind the relay's TCP listener
pub fn bind_relay_listener(addr: SocketAddr) -> Result<TcpListener, ServerError> {
    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))
        .map_err(bind_failed(addr))?;

    socket.set_reuse_address(true).ok();
    socket.set_nonblocking(true).map_err(bind_failed(addr))?;
    socket.bind(&addr.into()).map_err(bind_failed(addr))?;
    socket.listen(LISTEN_BACKLOG).map_err(bind_failed(addr))?;

    let std_listener: std::net::TcpListener = socket.into();
    Ok(TcpListener::from_std(std_listener)?)
}

/// Answers discovery probes; keeps no per-client state
pub struct DiscoveryResponder {
    /// The underlying UDP socket
    socket: UdpSocket,
    /// Local address
    local_addr: SocketAddr,
}

impl DiscoveryResponder {
    /// Bind the discovery socket
    pub fn bind(addr: SocketAddr) -> Result<Self, ServerError> {
        let socket = Socket::new(Domain::for_address(addr), Type::DGRAM, Some(Protocol::UDP))
            .map_err(bind_failed(addr))?;

        socket.set_reuse_address(true).ok();
        socket.set_broadcast(true).ok();
        socket.set_nonblocking(true).map_err(bind_failed(addr))?;
        socket.bind(&addr.into()).map_err(bind_failed(addr))?;

        let std_socket: std::net::UdpSocket = socket.into();
        let socket = UdpSocket::from_std(std_socket)?;
        let local_addr = socket.local_addr()?;

        Ok(Self { socket, local_addr })
    }

    /// Receive one datagram
    pub async fn recv_from(&self, buf: &mut [u8]) -> Result<(usize, SocketAddr), ServerError> {
        Ok(self.socket.recv_from(buf).await?)
    }

    /// Reply to a datagram if it is a probe; returns whether a reply was sent
    pub async fn respond(&self, datagram: &[u8], from: SocketAddr) -> Result<bool, ServerError> {
        if datagram != DISCOVERY_PROBE {
            trace!(peer = %from, len = datagram.len(), "Ignoring non-probe datagram");
            return Ok(false);
        }

        self.socket.send_to(DISCOVERY_REPLY, from).await?;
        debug!(peer = %from, "Answered discovery probe");
        Ok(true)
    }

    /// Get local address
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}
