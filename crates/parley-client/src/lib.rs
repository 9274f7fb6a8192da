//! # Parley Client
//!
//! Terminal chat client for the Parley relay.
//!
//! ## Features
//!
//! - Optional server discovery over UDP broadcast
//! - Passphrase encryption of every frame
//! - Conversation groups, typing and presence notices
//! - Image attachments
//!
//! ## Quick Start
//!
//! ```ignore
//! use parley_client::{ChatSession, ClientConfig, ClientError};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), ClientError> {
//!     let config = ClientConfig::builder()
//!         .server_host("chat.example.com")
//!         .name("alice")
//!         .passphrase("correct horse")
//!         .build()?;
//!
//!     let mut session = ChatSession::connect(config).await?;
//!     session.send_text(b"Hello, room!").await?;
//!
//!     loop {
//!         println!("{}", session.next_event().await?);
//!     }
//! }
//! ```

pub mod attachment;
pub mod config;
pub mod connection;
pub mod discovery;
pub mod editor;
pub mod errors;
pub mod events;
pub mod input;
pub mod render;
pub mod session;

pub use config::*;
pub use connection::*;
pub use discovery::*;
pub use editor::*;
pub use errors::*;
pub use events::*;
pub use input::*;
pub use render::*;
pub use session::*;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::attachment::*;
    pub use crate::config::*;
    pub use crate::connection::*;
    pub use crate::discovery::*;
    pub use crate::editor::*;
    pub use crate::errors::*;
    pub use crate::events::*;
    pub use crate::input::*;
    pub use crate::render::*;
    pub use crate::session::*;
}
