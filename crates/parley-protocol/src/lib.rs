//! # Parley Protocol
//!
//! The chat wire protocol shared by the relay server and its clients.
//!
//! ## Protocol Overview
//!
//! ```text
//! Client                                 Server
//!   |                                      |
//!   |-------- "HI" (UDP broadcast) ------->|   optional discovery
//!   |<------- "OK" ------------------------|
//!   |                                      |
//!   |========== TCP connect ==============>|
//!   |<------- client id (u32 LE) ----------|
//!   |<------- history frames --------------|
//!   |                                      |
//!   |-------- frame ---------------------->|   relayed to everyone,
//!   |<------- frame (sender id stamped) ---|   sender included
//! ```
//!
//! The relay never decodes frames; only clients run the [`FrameCodec`].

pub mod codec;
pub mod constants;
pub mod errors;
pub mod frame;
pub mod wire;

pub use codec::*;
pub use constants::*;
pub use errors::*;
pub use frame::*;
pub use wire::*;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::codec::*;
    pub use crate::constants::*;
    pub use crate::errors::*;
    pub use crate::frame::*;
    pub use crate::wire::*;
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_crypto::prelude::*;

    #[test]
    fn test_relay_stamp_preserves_encrypted_body() {
        let key = SecretKey::from_passphrase("room key");
        let codec = FrameCodec::new(Some(&key));
        let mut rng = RandomGenerator::from_seed(b"stamp");

        let mut raw = codec
            .encode(&MessageFrame::text("alice", "hi all").with_group("default"), &mut rng)
            .unwrap();

        // What the relay does: overwrite the sender, forward the rest untouched
        raw.set_sender(ClientId(5));

        let decoded = codec.decode(&raw).unwrap();
        assert_eq!(decoded.sender, ClientId(5));
        assert_eq!(decoded.text_payload(), Some(&b"hi all"[..]));
    }
}
