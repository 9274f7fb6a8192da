//! Protocol Constants
//!
//! Ports, sizes, delimiters and timing defaults shared by server and client.

use std::time::Duration;

/// Default service port (TCP relay and UDP discovery)
pub const DEFAULT_PORT: u16 = 24242;

/// Default server host when discovery is off or fails
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Default conversation group
pub const DEFAULT_GROUP: &str = "default";

/// Size of the little-endian length prefix
pub const LENGTH_FIELD_SIZE: usize = 4;

/// Size of a client identity on the wire
pub const CLIENT_ID_SIZE: usize = 4;

/// Smallest valid frame: length prefix plus sender id
pub const MIN_FRAME_SIZE: usize = LENGTH_FIELD_SIZE + CLIENT_ID_SIZE;

/// Default limit on the length field `N`
pub const DEFAULT_MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Marks an encrypted body
pub const ENCRYPTION_MARKER: u8 = b'~';

/// Plaintext prefix checked after decryption
pub const CANARY: &[u8; 4] = b":KEY";

/// Separates the name from the group
pub const GROUP_DELIMITER: u8 = b'@';

/// Separates the header from a tag
pub const TAG_DELIMITER: u8 = b'|';

/// Ends the header
pub const HEADER_TERMINATOR: u8 = 0;

/// Bytes that may never appear in a name or group
pub const RESERVED_NAME_BYTES: [u8; 4] = [
    GROUP_DELIMITER,
    TAG_DELIMITER,
    HEADER_TERMINATOR,
    ENCRYPTION_MARKER,
];

/// Longest name or group in bytes
pub const MAX_NAME_SIZE: usize = 64;

/// Discovery probe broadcast by clients
pub const DISCOVERY_PROBE: &[u8; 2] = b"HI";

/// Discovery reply sent by the server
pub const DISCOVERY_REPLY: &[u8; 2] = b"OK";

/// Discovery broadcast attempts before falling back
pub const DISCOVERY_ATTEMPTS: u32 = 10;

/// Wait for a discovery reply per attempt
pub const DISCOVERY_TIMEOUT: Duration = Duration::from_secs(2);

/// Default server history capacity (1 MiB)
pub const DEFAULT_HISTORY_CAPACITY: usize = 1024 * 1024;

/// Server readiness tick
pub const SERVER_POLL_INTERVAL: Duration = Duration::from_millis(1000);

/// Client readiness tick
pub const CLIENT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Time allowed to finish a frame once its first byte has arrived
pub const READ_TIMEOUT: Duration = Duration::from_secs(2);

/// Largest image side sent by clients
pub const MAX_IMAGE_DIMENSION: u32 = 1024;

/// Frame tags following the `|` delimiter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameTag {
    /// Sender is typing
    Typing,
    /// Sender joined
    Enter,
    /// Sender left
    Exit,
    /// Payload is an RGB image
    Image,
}

impl FrameTag {
    /// Wire spelling of the tag
    pub fn as_bytes(self) -> &'static [u8; 3] {
        match self {
            FrameTag::Typing => b"TYP",
            FrameTag::Enter => b"ENT",
            FrameTag::Exit => b"EXT",
            FrameTag::Image => b"IMG",
        }
    }

    /// Parse a tag
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        match bytes {
            b"TYP" => Some(FrameTag::Typing),
            b"ENT" => Some(FrameTag::Enter),
            b"EXT" => Some(FrameTag::Exit),
            b"IMG" => Some(FrameTag::Image),
            _ => None,
        }
    }

    /// Whether a payload follows the header
    pub fn has_payload(self) -> bool {
        matches!(self, FrameTag::Image)
    }
}
