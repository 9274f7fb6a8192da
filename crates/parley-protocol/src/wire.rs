//! Stream I/O
//!
//! Readiness-based helpers over a non-blocking [`TcpStream`]. They take the
//! stream by shared reference so one task can multiplex many connections
//! without splitting them.
//!
//! A frame read distinguishes three situations before any byte of the frame
//! has arrived: nothing available yet, orderly close, or data. Once the first
//! byte is in, the rest must follow within the read timeout or the read
//! fails with [`ProtocolError::ShortRead`].

use std::io;
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::trace;

use crate::constants::*;
use crate::errors::{ProtocolError, ProtocolResult};
use crate::frame::{ClientId, RawFrame};

/// Result of a non-blocking frame read
#[derive(Debug)]
pub enum RecvOutcome {
    /// A complete frame
    Frame(RawFrame),
    /// No bytes were available
    NotReady,
    /// Peer closed the connection cleanly between frames
    Closed,
}

/// Write all of `bytes`, waiting for writability as needed
pub async fn send_all(stream: &TcpStream, bytes: &[u8]) -> io::Result<()> {
    let mut written = 0;
    send_all_counted(stream, bytes, &mut written).await
}

/// Like [`send_all`], keeping `written` current as bytes go out
///
/// If the future is dropped early, `written` tells how much of `bytes`
/// already reached the socket.
pub async fn send_all_counted(
    stream: &TcpStream,
    bytes: &[u8],
    written: &mut usize,
) -> io::Result<()> {
    while *written < bytes.len() {
        stream.writable().await?;
        match stream.try_write(&bytes[*written..]) {
            Ok(0) => return Err(io::ErrorKind::WriteZero.into()),
            Ok(n) => *written += n,
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

/// Fill `buf` completely, waiting for readability as needed
///
/// Returns [`ProtocolError::ShortRead`] if the peer closes first.
pub async fn recv_exact(stream: &TcpStream, buf: &mut [u8]) -> ProtocolResult<()> {
    let mut filled = 0;
    while filled < buf.len() {
        stream.readable().await?;
        match stream.try_read(&mut buf[filled..]) {
            Ok(0) => {
                return Err(ProtocolError::ShortRead {
                    expected: buf.len(),
                    got: filled,
                })
            }
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}

/// [`recv_exact`] bounded by `limit`
async fn recv_exact_within(stream: &TcpStream, buf: &mut [u8], limit: Duration) -> ProtocolResult<()> {
    let expected = buf.len();
    match timeout(limit, recv_exact(stream, buf)).await {
        Ok(result) => result,
        Err(_) => Err(ProtocolError::ShortRead { expected, got: 0 }),
    }
}

/// Try to read one frame without waiting for its first byte
pub async fn try_recv_frame(
    stream: &TcpStream,
    max_frame_size: usize,
    read_timeout: Duration,
) -> ProtocolResult<RecvOutcome> {
    let mut len_buf = [0u8; LENGTH_FIELD_SIZE];
    let got = match stream.try_read(&mut len_buf) {
        Ok(0) => return Ok(RecvOutcome::Closed),
        Ok(n) => n,
        Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(RecvOutcome::NotReady),
        Err(e) => return Err(e.into()),
    };
    recv_exact_within(stream, &mut len_buf[got..], read_timeout).await?;

    let n = u32::from_le_bytes(len_buf) as usize;
    if n < CLIENT_ID_SIZE {
        return Err(ProtocolError::FrameTooSmall {
            got: n,
            min: CLIENT_ID_SIZE,
        });
    }
    if n > max_frame_size {
        return Err(ProtocolError::FrameTooLarge {
            got: n,
            max: max_frame_size,
        });
    }

    let mut bytes = vec![0u8; LENGTH_FIELD_SIZE + n];
    bytes[..LENGTH_FIELD_SIZE].copy_from_slice(&len_buf);
    recv_exact_within(stream, &mut bytes[LENGTH_FIELD_SIZE..], read_timeout).await?;

    trace!(len = bytes.len(), "Frame received");
    Ok(RecvOutcome::Frame(RawFrame::from_bytes(bytes)?))
}

/// Wait for and read one frame; `None` on clean close
pub async fn recv_frame(
    stream: &TcpStream,
    max_frame_size: usize,
    read_timeout: Duration,
) -> ProtocolResult<Option<RawFrame>> {
    loop {
        stream.readable().await?;
        match try_recv_frame(stream, max_frame_size, read_timeout).await? {
            RecvOutcome::Frame(frame) => return Ok(Some(frame)),
            RecvOutcome::Closed => return Ok(None),
            RecvOutcome::NotReady => continue,
        }
    }
}

/// Send a frame
pub async fn send_frame(stream: &TcpStream, frame: &RawFrame) -> io::Result<()> {
    send_all(stream, frame.as_bytes()).await
}

/// Send the bare identity that opens every session
pub async fn send_identity(stream: &TcpStream, id: ClientId) -> io::Result<()> {
    send_all(stream, &id.to_bytes()).await
}

/// Receive the session identity
///
/// Any shortfall is fatal; there is no retry.
pub async fn recv_identity(stream: &TcpStream, limit: Duration) -> ProtocolResult<ClientId> {
    let mut buf = [0u8; CLIENT_ID_SIZE];
    recv_exact_within(stream, &mut buf, limit).await?;
    Ok(ClientId::from_bytes(buf))
}
