//! Chat Frames
//!
//! [`MessageFrame`] is the decoded, typed view of a chat message.
//! [`RawFrame`] is the exact byte string that travels on the wire and is
//! what the relay server forwards and archives without ever decoding.
//!
//! ## Wire Layout
//!
//! ```text
//! +-----------+-----------+--------------------------------------------+
//! | N (u32LE) | sender id | body (N - 4 bytes)                         |
//! +-----------+-----------+--------------------------------------------+
//!
//! plain body:     name[@group][|TAG] \0 [payload]
//! encrypted body: ~ indicator(64) E(":KEY" name[@group][|TAG] \0 [payload])
//! ```

use parley_crypto::{RandomGenerator, INDICATOR_SIZE};

use crate::constants::*;
use crate::errors::{ProtocolError, ProtocolResult};

/// Relay-assigned identity of a connection
///
/// Issued from 1 upward and never reused; 0 is reserved for "unassigned".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct ClientId(pub u32);

impl ClientId {
    /// Reserved identity
    pub const UNASSIGNED: ClientId = ClientId(0);

    /// First identity a server hands out
    pub const FIRST: ClientId = ClientId(1);

    /// Wire bytes
    pub fn to_bytes(self) -> [u8; CLIENT_ID_SIZE] {
        self.0.to_le_bytes()
    }

    /// Parse wire bytes
    pub fn from_bytes(bytes: [u8; CLIENT_ID_SIZE]) -> Self {
        ClientId(u32::from_le_bytes(bytes))
    }

    /// Whether this is the reserved identity
    pub fn is_unassigned(self) -> bool {
        self == Self::UNASSIGNED
    }

    /// The identity after this one, or `None` once the space is used up
    pub fn checked_next(self) -> Option<Self> {
        self.0.checked_add(1).map(ClientId)
    }
}

impl std::fmt::Display for ClientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Per-message nonce sent in clear ahead of the encrypted region
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Indicator(pub [u8; INDICATOR_SIZE]);

impl Indicator {
    /// Draw a fresh indicator
    pub fn generate(rng: &mut RandomGenerator) -> Self {
        Self(rng.draw_array())
    }

    /// Get indicator bytes
    pub fn as_bytes(&self) -> &[u8; INDICATOR_SIZE] {
        &self.0
    }
}

impl std::fmt::Debug for Indicator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Indicator({}..)", hex::encode(&self.0[..8]))
    }
}

/// RGB image carried by an IMAGE frame
///
/// Payload layout: `width u32LE | height u32LE | width*height RGB triples`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageData {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl ImageData {
    /// Bytes per pixel
    pub const CHANNELS: usize = 3;

    /// Size of the dimension prefix
    pub const HEADER_SIZE: usize = 8;

    /// Create an image, checking that pixel data matches the dimensions
    pub fn new(width: u32, height: u32, pixels: Vec<u8>) -> ProtocolResult<Self> {
        let expected = (width as usize)
            .checked_mul(height as usize)
            .and_then(|n| n.checked_mul(Self::CHANNELS))
            .ok_or_else(|| ProtocolError::InvalidImage(format!("{}x{} overflows", width, height)))?;

        if pixels.len() != expected {
            return Err(ProtocolError::InvalidImage(format!(
                "{}x{} needs {} bytes, got {}",
                width,
                height,
                expected,
                pixels.len()
            )));
        }

        Ok(Self {
            width,
            height,
            pixels,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Row-major RGB bytes
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// RGB triple at (x, y)
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 3]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let at = (y as usize * self.width as usize + x as usize) * Self::CHANNELS;
        Some([self.pixels[at], self.pixels[at + 1], self.pixels[at + 2]])
    }

    /// Serialize to payload bytes
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(Self::HEADER_SIZE + self.pixels.len());
        buf.extend_from_slice(&self.width.to_le_bytes());
        buf.extend_from_slice(&self.height.to_le_bytes());
        buf.extend_from_slice(&self.pixels);
        buf
    }

    /// Parse payload bytes
    pub fn from_bytes(data: &[u8]) -> ProtocolResult<Self> {
        if data.len() < Self::HEADER_SIZE {
            return Err(ProtocolError::InvalidImage(format!(
                "payload of {} bytes has no dimensions",
                data.len()
            )));
        }
        let width = u32::from_le_bytes([data[0], data[1], data[2], data[3]]);
        let height = u32::from_le_bytes([data[4], data[5], data[6], data[7]]);
        Self::new(width, height, data[Self::HEADER_SIZE..].to_vec())
    }
}

/// What a frame carries
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameKind {
    /// Ordinary message bytes
    Plain(Vec<u8>),
    /// Sender is typing
    Typing,
    /// Sender joined the conversation
    Enter,
    /// Sender left the conversation
    Exit,
    /// RGB image
    Image(ImageData),
}

impl FrameKind {
    /// Tag written after the header, if any
    pub fn tag(&self) -> Option<FrameTag> {
        match self {
            FrameKind::Plain(_) => None,
            FrameKind::Typing => Some(FrameTag::Typing),
            FrameKind::Enter => Some(FrameTag::Enter),
            FrameKind::Exit => Some(FrameTag::Exit),
            FrameKind::Image(_) => Some(FrameTag::Image),
        }
    }

    /// Status notifications carry no payload
    pub fn is_status(&self) -> bool {
        matches!(self, FrameKind::Typing | FrameKind::Enter | FrameKind::Exit)
    }

    /// Get kind name for logging
    pub fn name(&self) -> &'static str {
        match self {
            FrameKind::Plain(_) => "Plain",
            FrameKind::Typing => "Typing",
            FrameKind::Enter => "Enter",
            FrameKind::Exit => "Exit",
            FrameKind::Image(_) => "Image",
        }
    }
}

/// A decoded chat message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageFrame {
    /// Originating connection, stamped by the relay
    pub sender: ClientId,
    /// Display name
    pub name: String,
    /// Conversation group
    pub group: Option<String>,
    /// Payload shape
    pub kind: FrameKind,
    /// Present when the frame was (or is to be) encrypted
    pub indicator: Option<Indicator>,
}

impl MessageFrame {
    /// Create a frame of any kind
    pub fn new(name: impl Into<String>, kind: FrameKind) -> Self {
        Self {
            sender: ClientId::UNASSIGNED,
            name: name.into(),
            group: None,
            kind,
            indicator: None,
        }
    }

    /// Text message
    pub fn text(name: impl Into<String>, text: impl AsRef<[u8]>) -> Self {
        Self::new(name, FrameKind::Plain(text.as_ref().to_vec()))
    }

    /// Typing notification
    pub fn typing(name: impl Into<String>) -> Self {
        Self::new(name, FrameKind::Typing)
    }

    /// Join announcement
    pub fn enter(name: impl Into<String>) -> Self {
        Self::new(name, FrameKind::Enter)
    }

    /// Leave announcement
    pub fn exit(name: impl Into<String>) -> Self {
        Self::new(name, FrameKind::Exit)
    }

    /// Image message
    pub fn image(name: impl Into<String>, image: ImageData) -> Self {
        Self::new(name, FrameKind::Image(image))
    }

    /// Set the group
    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    /// Set the sender
    pub fn with_sender(mut self, sender: ClientId) -> Self {
        self.sender = sender;
        self
    }

    /// Pin the indicator used when encrypting
    pub fn with_indicator(mut self, indicator: Indicator) -> Self {
        self.indicator = Some(indicator);
        self
    }

    /// Whether the frame travelled encrypted
    pub fn is_encrypted(&self) -> bool {
        self.indicator.is_some()
    }

    /// Message text, for plain frames
    pub fn text_payload(&self) -> Option<&[u8]> {
        match &self.kind {
            FrameKind::Plain(bytes) => Some(bytes),
            _ => None,
        }
    }
}

/// Check a name or group before it goes on the wire
pub fn validate_name(field: &str, value: &str) -> ProtocolResult<()> {
    if value.is_empty() {
        return Err(ProtocolError::InvalidName(format!("{} is empty", field)));
    }
    if value.len() > MAX_NAME_SIZE {
        return Err(ProtocolError::InvalidName(format!(
            "{} is {} bytes, max is {}",
            field,
            value.len(),
            MAX_NAME_SIZE
        )));
    }
    if let Some(bad) = value.bytes().find(|b| RESERVED_NAME_BYTES.contains(b)) {
        return Err(ProtocolError::InvalidName(format!(
            "{} contains reserved byte {:?}",
            field, bad as char
        )));
    }
    Ok(())
}

/// A complete frame exactly as sent on the wire
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFrame {
    bytes: Vec<u8>,
}

impl RawFrame {
    /// Wrap wire bytes, checking the length prefix
    pub fn from_bytes(bytes: Vec<u8>) -> ProtocolResult<Self> {
        if bytes.len() < MIN_FRAME_SIZE {
            return Err(ProtocolError::FrameTooSmall {
                got: bytes.len(),
                min: MIN_FRAME_SIZE,
            });
        }
        let declared = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize;
        if declared != bytes.len() - LENGTH_FIELD_SIZE {
            return Err(ProtocolError::MalformedHeader(format!(
                "length field says {}, frame carries {}",
                declared,
                bytes.len() - LENGTH_FIELD_SIZE
            )));
        }
        Ok(Self { bytes })
    }

    /// Sender identity
    pub fn sender(&self) -> ClientId {
        ClientId::from_bytes([self.bytes[4], self.bytes[5], self.bytes[6], self.bytes[7]])
    }

    /// Overwrite the sender identity
    pub fn set_sender(&mut self, id: ClientId) {
        self.bytes[LENGTH_FIELD_SIZE..MIN_FRAME_SIZE].copy_from_slice(&id.to_bytes());
    }

    /// Everything after the sender id
    pub fn body(&self) -> &[u8] {
        &self.bytes[MIN_FRAME_SIZE..]
    }

    /// Whether the body is encrypted
    pub fn is_encrypted(&self) -> bool {
        self.body().first() == Some(&ENCRYPTION_MARKER)
    }

    /// Total size on the wire
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

impl AsRef<[u8]> for RawFrame {
    fn as_ref(&self) -> &[u8] {
        &self.bytes
    }
}
