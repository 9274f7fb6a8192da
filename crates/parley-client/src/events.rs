//! Chat Events
//!
//! What the session reports to its front end.

use crate::render::RenderFlags;
use parley_protocol::{ClientId, MessageFrame};
use std::net::SocketAddr;

/// Status notifications carried by tagged frames
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresenceStatus {
    Typing,
    Entered,
    Left,
}

impl PresenceStatus {
    pub fn text(self) -> &'static str {
        match self {
            PresenceStatus::Typing => "is typing...",
            PresenceStatus::Entered => "entered the chat...",
            PresenceStatus::Left => "left the chat...",
        }
    }
}

/// Chat session events
#[derive(Debug, Clone)]
pub enum ChatEvent {
    /// Identity received
    Connected {
        id: ClientId,
        server: SocketAddr,
    },

    /// Displayable message
    Message {
        frame: MessageFrame,
        flags: RenderFlags,
    },

    /// Another participant's status
    Status {
        name: String,
        /// Only set when groups are displayed
        group: Option<String>,
        status: PresenceStatus,
    },

    /// Frame that could not be decoded and was discarded
    Dropped {
        sender: ClientId,
        reason: String,
    },

    /// Server closed the connection
    Disconnected,
}

impl ChatEvent {
    /// Get event name for logging
    pub fn name(&self) -> &'static str {
        match self {
            ChatEvent::Connected { .. } => "Connected",
            ChatEvent::Message { .. } => "Message",
            ChatEvent::Status { .. } => "Status",
            ChatEvent::Dropped { .. } => "Dropped",
            ChatEvent::Disconnected => "Disconnected",
        }
    }
}

impl std::fmt::Display for ChatEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChatEvent::Connected { id, server } => write!(f, "Connected to {} as {}", server, id),
            ChatEvent::Message { frame, .. } => {
                write!(f, "{} from {} ({})", frame.kind.name(), frame.name, frame.sender)
            }
            ChatEvent::Status { name, group, status } => match group {
                Some(group) => write!(f, "{}@{} {}", name, group, status.text()),
                None => write!(f, "{} {}", name, status.text()),
            },
            ChatEvent::Dropped { sender, reason } => {
                write!(f, "Dropped frame from {}: {}", sender, reason)
            }
            ChatEvent::Disconnected => write!(f, "Disconnected from server"),
        }
    }
}
