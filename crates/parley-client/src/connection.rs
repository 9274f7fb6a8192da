//! Connection Management
//!
//! Connects to the relay, performs the identity handshake and tracks
//! traffic counters.

use crate::errors::{ClientError, ClientResult};
use parley_protocol::{
    recv_identity, send_frame, try_recv_frame, ClientId, ProtocolError, RawFrame, RecvOutcome,
};
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

/// Connection information
#[derive(Debug, Clone)]
pub struct ConnectionInfo {
    /// Server address
    pub server_addr: SocketAddr,
    /// Connection time
    pub connected_at: Instant,
    /// Last activity time
    pub last_activity: Instant,
    /// Bytes sent
    pub bytes_sent: u64,
    /// Bytes received
    pub bytes_received: u64,
    /// Frames sent
    pub frames_sent: u64,
    /// Frames received
    pub frames_received: u64,
}

impl ConnectionInfo {
    /// Create new connection info
    pub fn new(server_addr: SocketAddr) -> Self {
        let now = Instant::now();
        Self {
            server_addr,
            connected_at: now,
            last_activity: now,
            bytes_sent: 0,
            bytes_received: 0,
            frames_sent: 0,
            frames_received: 0,
        }
    }

    /// Record sent data
    pub fn record_sent(&mut self, bytes: usize) {
        self.bytes_sent += bytes as u64;
        self.frames_sent += 1;
        self.last_activity = Instant::now();
    }

    /// Record received data
    pub fn record_received(&mut self, bytes: usize) {
        self.bytes_received += bytes as u64;
        self.frames_received += 1;
        self.last_activity = Instant::now();
    }

    /// Get connection duration
    pub fn duration(&self) -> Duration {
        self.connected_at.elapsed()
    }
}

/// An established relay connection
#[derive(Debug)]
pub struct Connection {
    stream: TcpStream,
    id: ClientId,
    info: ConnectionInfo,
    max_frame_size: usize,
    read_timeout: Duration,
}

impl Connection {
    /// Connect and receive the identity
    ///
    /// The identity must arrive in full within `read_timeout`; there is
    /// no retry.
    pub async fn connect(
        addr: SocketAddr,
        connect_timeout: Duration,
        read_timeout: Duration,
        max_frame_size: usize,
    ) -> ClientResult<Self> {
        let stream = timeout(connect_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| ClientError::ConnectionFailed(format!("{} timed out", addr)))?
            .map_err(|e| ClientError::ConnectionFailed(format!("{}: {}", addr, e)))?;
        stream.set_nodelay(true).ok();

        let id = recv_identity(&stream, read_timeout).await.map_err(|e| match e {
            ProtocolError::ShortRead { got, .. } => {
                ClientError::Handshake(format!("identity cut short after {} byte(s)", got))
            }
            other => ClientError::Handshake(other.to_string()),
        })?;
        debug!(client = %id, server = %addr, "Identity received");

        Ok(Self {
            stream,
            id,
            info: ConnectionInfo::new(addr),
            max_frame_size,
            read_timeout,
        })
    }

    /// Identity assigned by the server
    pub fn id(&self) -> ClientId {
        self.id
    }

    /// Traffic counters
    pub fn info(&self) -> &ConnectionInfo {
        &self.info
    }

    /// Send one frame
    pub async fn send(&mut self, frame: &RawFrame) -> ClientResult<()> {
        send_frame(&self.stream, frame).await?;
        self.info.record_sent(frame.len());
        Ok(())
    }

    /// Wait until the server has sent something
    pub async fn readable(&self) -> ClientResult<()> {
        Ok(self.stream.readable().await?)
    }

    /// Read one frame if one has started arriving
    pub async fn try_recv(&mut self) -> ClientResult<RecvOutcome> {
        let outcome = try_recv_frame(&self.stream, self.max_frame_size, self.read_timeout).await?;
        if let RecvOutcome::Frame(frame) = &outcome {
            self.info.record_received(frame.len());
        }
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_protocol::{send_identity, DEFAULT_MAX_FRAME_SIZE};
    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpListener;

    const T: Duration = Duration::from_secs(2);

    #[tokio::test]
    async fn test_connect_reads_identity() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = async {
            let (stream, _) = listener.accept().await.unwrap();
            send_identity(&stream, ClientId(12)).await.unwrap();
            stream
        };
        let (connection, _stream) = tokio::join!(Connection::connect(addr, T, T, DEFAULT_MAX_FRAME_SIZE), server);
        let connection = connection.unwrap();
        assert_eq!(connection.id(), ClientId(12));
        assert_eq!(connection.info().server_addr, addr);
    }

    #[tokio::test]
    async fn test_short_identity_is_fatal() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = async {
            let (mut stream, _) = listener.accept().await.unwrap();
            stream.write_all(&[1, 0]).await.unwrap();
        };
        let (result, _) = tokio::join!(Connection::connect(addr, T, T, DEFAULT_MAX_FRAME_SIZE), server);
        assert!(matches!(result, Err(ClientError::Handshake(_))));
    }

    #[tokio::test]
    async fn test_connect_refused() {
        let addr = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap()
        };
        let result = Connection::connect(addr, T, T, DEFAULT_MAX_FRAME_SIZE).await;
        assert!(matches!(result, Err(ClientError::ConnectionFailed(_))));
    }
}
