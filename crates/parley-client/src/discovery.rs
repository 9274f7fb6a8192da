//! Server Discovery
//!
//! Broadcasts the discovery probe on the service port and takes the first
//! correct reply's source address as the server. Falls back to the
//! configured host when every attempt goes unanswered.

use crate::config::ClientConfig;
use crate::errors::{ClientError, ClientResult};
use parley_protocol::{DISCOVERY_PROBE, DISCOVERY_REPLY};
use socket2::{Domain, Protocol, Socket, Type};
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, info};

/// Open a broadcast-capable UDP socket on an ephemeral port
fn broadcast_socket() -> ClientResult<UdpSocket> {
    let discovery_err = |e: std::io::Error| ClientError::Discovery(e.to_string());

    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP)).map_err(discovery_err)?;
    socket.set_broadcast(true).map_err(discovery_err)?;
    socket.set_nonblocking(true).map_err(discovery_err)?;
    let any = SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0));
    socket.bind(&any.into()).map_err(discovery_err)?;

    let std_socket: std::net::UdpSocket = socket.into();
    Ok(UdpSocket::from_std(std_socket)?)
}

/// Probe `target` up to `attempts` times, waiting `wait` for each reply
///
/// Returns the address that answered, or `None` if nobody did.
pub async fn discover(target: SocketAddr, attempts: u32, wait: Duration) -> ClientResult<Option<SocketAddr>> {
    let socket = broadcast_socket()?;
    let mut buf = [0u8; 16];

    for attempt in 1..=attempts {
        debug!(attempt, %target, "Sending discovery probe");
        socket.send_to(DISCOVERY_PROBE, target).await?;

        let deadline = Instant::now() + wait;
        while let Ok(received) = timeout_at(deadline, socket.recv_from(&mut buf)).await {
            let (len, from) = received?;
            if &buf[..len] == DISCOVERY_REPLY {
                info!(server = %from, "Discovered server");
                return Ok(Some(from));
            }
            debug!(peer = %from, "Ignoring unexpected discovery datagram");
        }
    }

    Ok(None)
}

/// Work out which server to connect to
pub async fn locate_server(config: &ClientConfig) -> ClientResult<SocketAddr> {
    if config.enable_discovery {
        let broadcast = SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::BROADCAST, config.port));
        match discover(broadcast, config.discovery_attempts, config.discovery_timeout()).await {
            Ok(Some(found)) => return Ok(SocketAddr::new(found.ip(), config.port)),
            Ok(None) => info!(
                "No discovery reply after {} attempt(s), using {}",
                config.discovery_attempts, config.server_host
            ),
            Err(e) => info!("Discovery unavailable ({}), using {}", e, config.server_host),
        }
    }

    config.resolve_server_address()
}
