//! Message Codec
//!
//! Turns [`MessageFrame`]s into wire bytes and back. When the codec holds a
//! key every outgoing frame is encrypted; incoming frames are decrypted when
//! they carry the `~` marker and taken as-is otherwise.

use parley_crypto::{constant_time_eq, RandomGenerator, SecretKey, ShaHash, StreamCipher, INDICATOR_SIZE};

use crate::constants::*;
use crate::errors::{ProtocolError, ProtocolResult};
use crate::frame::{validate_name, ClientId, FrameKind, ImageData, Indicator, MessageFrame, RawFrame};

/// Encoder/decoder for chat frames
#[derive(Debug, Clone)]
pub struct FrameCodec {
    cipher: Option<StreamCipher>,
    max_frame_size: usize,
}

impl FrameCodec {
    /// Create a codec, encrypting when a key is given
    pub fn new(key: Option<&SecretKey>) -> Self {
        Self {
            cipher: key.map(StreamCipher::new),
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }

    /// Codec without encryption
    pub fn plain() -> Self {
        Self::new(None)
    }

    /// Override the frame size limit
    pub fn with_max_frame_size(mut self, max: usize) -> Self {
        self.max_frame_size = max;
        self
    }

    /// Whether outgoing frames are encrypted
    pub fn is_encrypting(&self) -> bool {
        self.cipher.is_some()
    }

    /// Encode a frame
    ///
    /// The sender id written is whatever the frame holds; the relay
    /// overwrites it anyway.
    pub fn encode(&self, frame: &MessageFrame, rng: &mut RandomGenerator) -> ProtocolResult<RawFrame> {
        validate_name("name", &frame.name)?;
        if let Some(group) = &frame.group {
            validate_name("group", group)?;
        }

        let mut buf = Vec::with_capacity(MIN_FRAME_SIZE + 1 + INDICATOR_SIZE + 128);
        buf.extend_from_slice(&[0u8; LENGTH_FIELD_SIZE]);
        buf.extend_from_slice(&frame.sender.to_bytes());

        let sealed = match &self.cipher {
            Some(cipher) => {
                let indicator = frame.indicator.unwrap_or_else(|| Indicator::generate(rng));
                buf.push(ENCRYPTION_MARKER);
                buf.extend_from_slice(indicator.as_bytes());
                let start = buf.len();
                buf.extend_from_slice(CANARY);
                Some((cipher, indicator, start))
            }
            None => None,
        };

        buf.extend_from_slice(frame.name.as_bytes());
        if let Some(group) = &frame.group {
            buf.push(GROUP_DELIMITER);
            buf.extend_from_slice(group.as_bytes());
        }
        if let Some(tag) = frame.kind.tag() {
            buf.push(TAG_DELIMITER);
            buf.extend_from_slice(tag.as_bytes());
        }
        buf.push(HEADER_TERMINATOR);

        match &frame.kind {
            FrameKind::Plain(payload) => buf.extend_from_slice(payload),
            FrameKind::Image(image) => buf.extend_from_slice(&image.to_bytes()),
            FrameKind::Typing | FrameKind::Enter | FrameKind::Exit => {}
        }

        if let Some((cipher, indicator, start)) = sealed {
            let stream_indicator = ShaHash::hash_wide(indicator.as_bytes());
            cipher.encrypt_tail(&stream_indicator, &mut buf, start, rng);
        }

        let n = buf.len() - LENGTH_FIELD_SIZE;
        if n > self.max_frame_size {
            return Err(ProtocolError::FrameTooLarge {
                got: n,
                max: self.max_frame_size,
            });
        }
        let n = u32::try_from(n).map_err(|_| ProtocolError::FrameTooLarge {
            got: n,
            max: u32::MAX as usize,
        })?;
        buf[..LENGTH_FIELD_SIZE].copy_from_slice(&n.to_le_bytes());

        RawFrame::from_bytes(buf)
    }

    /// Decode a complete wire frame
    pub fn decode(&self, raw: &RawFrame) -> ProtocolResult<MessageFrame> {
        let sender = raw.sender();
        let body = raw.body();

        let (content, indicator) = if body.first() == Some(&ENCRYPTION_MARKER) {
            let (indicator, plaintext) = self.open(body)?;
            (plaintext, Some(indicator))
        } else {
            (body.to_vec(), None)
        };

        let mut frame = parse_content(sender, &content)?;
        frame.indicator = indicator;
        Ok(frame)
    }

    /// Decode raw wire bytes
    pub fn decode_bytes(&self, bytes: &[u8]) -> ProtocolResult<MessageFrame> {
        self.decode(&RawFrame::from_bytes(bytes.to_vec())?)
    }

    fn open(&self, body: &[u8]) -> ProtocolResult<(Indicator, Vec<u8>)> {
        let sealed_start = 1 + INDICATOR_SIZE;
        if body.len() < sealed_start {
            return Err(ProtocolError::MalformedHeader(format!(
                "encrypted body of {} bytes has no indicator",
                body.len()
            )));
        }

        let mut indicator = [0u8; INDICATOR_SIZE];
        indicator.copy_from_slice(&body[1..sealed_start]);
        let indicator = Indicator(indicator);

        // Without a key, or with the wrong one, the result is the same
        let cipher = self.cipher.as_ref().ok_or(ProtocolError::CanaryMismatch)?;
        let stream_indicator = ShaHash::hash_wide(indicator.as_bytes());
        let plaintext = cipher
            .decrypt(&stream_indicator, &body[sealed_start..])
            .map_err(|_| ProtocolError::CanaryMismatch)?;

        if plaintext.len() < CANARY.len() || !constant_time_eq(&plaintext[..CANARY.len()], CANARY) {
            return Err(ProtocolError::CanaryMismatch);
        }

        Ok((indicator, plaintext[CANARY.len()..].to_vec()))
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::plain()
    }
}

/// Parse `name[@group][|TAG]\0[payload]`
fn parse_content(sender: ClientId, content: &[u8]) -> ProtocolResult<MessageFrame> {
    let end = content
        .iter()
        .position(|&b| b == HEADER_TERMINATOR)
        .ok_or_else(|| ProtocolError::MalformedHeader("missing header terminator".into()))?;
    let header = &content[..end];
    let payload = &content[end + 1..];

    let (head, tag) = match header.iter().position(|&b| b == TAG_DELIMITER) {
        Some(at) => (&header[..at], Some(&header[at + 1..])),
        None => (header, None),
    };
    let (name, group) = match head.iter().position(|&b| b == GROUP_DELIMITER) {
        Some(at) => (&head[..at], Some(&head[at + 1..])),
        None => (head, None),
    };

    let name = header_field("name", name)?;
    let group = group.map(|g| header_field("group", g)).transpose()?;

    let kind = match tag {
        None => FrameKind::Plain(payload.to_vec()),
        Some(tag) => match FrameTag::from_bytes(tag) {
            Some(FrameTag::Typing) => FrameKind::Typing,
            Some(FrameTag::Enter) => FrameKind::Enter,
            Some(FrameTag::Exit) => FrameKind::Exit,
            Some(FrameTag::Image) => FrameKind::Image(ImageData::from_bytes(payload)?),
            None => {
                return Err(ProtocolError::MalformedHeader(format!(
                    "unknown tag {:?}",
                    String::from_utf8_lossy(tag)
                )))
            }
        },
    };

    Ok(MessageFrame {
        sender,
        name,
        group,
        kind,
        indicator: None,
    })
}

fn header_field(field: &str, bytes: &[u8]) -> ProtocolResult<String> {
    if bytes.len() > MAX_NAME_SIZE {
        return Err(ProtocolError::MalformedHeader(format!(
            "{} is {} bytes, max is {}",
            field,
            bytes.len(),
            MAX_NAME_SIZE
        )));
    }
    String::from_utf8(bytes.to_vec())
        .map_err(|_| ProtocolError::MalformedHeader(format!("{} is not UTF-8", field)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rng() -> RandomGenerator {
        RandomGenerator::from_seed(b"codec tests")
    }

    fn sample_frames() -> Vec<MessageFrame> {
        let image = ImageData::new(2, 2, (0..12).collect()).unwrap();
        vec![
            MessageFrame::text("alice", "hello world"),
            MessageFrame::text("bob", "").with_group("ops"),
            MessageFrame::text("carol", vec![0u8, 1, 2, 255]).with_group("default"),
            MessageFrame::typing("alice").with_group("default"),
            MessageFrame::enter("dave"),
            MessageFrame::exit("erin").with_group("x"),
            MessageFrame::image("frank", image).with_group("pics"),
            MessageFrame::text("gina", "x".repeat(5000)).with_sender(ClientId(9)),
        ]
    }

    #[test]
    fn test_plain_layout() {
        let codec = FrameCodec::plain();
        let frame = MessageFrame::text("alice", "hi")
            .with_group("g")
            .with_sender(ClientId(3));
        let raw = codec.encode(&frame, &mut rng()).unwrap();

        let mut expected = vec![];
        expected.extend_from_slice(&14u32.to_le_bytes());
        expected.extend_from_slice(&3u32.to_le_bytes());
        expected.extend_from_slice(b"alice@g\0hi");
        assert_eq!(raw.as_bytes(), expected.as_slice());
    }

    #[test]
    fn test_tag_layout() {
        let codec = FrameCodec::plain();
        let raw = codec.encode(&MessageFrame::typing("al"), &mut rng()).unwrap();
        assert_eq!(raw.body(), b"al|TYP\0");
    }

    #[test]
    fn test_plain_roundtrip() {
        let codec = FrameCodec::plain();
        let mut rng = rng();
        for frame in sample_frames() {
            let raw = codec.encode(&frame, &mut rng).unwrap();
            assert!(!raw.is_encrypted());
            let decoded = codec.decode(&raw).unwrap();
            assert_eq!(decoded, frame);
        }
    }

    #[test]
    fn test_encrypted_roundtrip() {
        let key = SecretKey::from_passphrase("shared secret");
        let codec = FrameCodec::new(Some(&key));
        let mut rng = rng();

        for frame in sample_frames() {
            let raw = codec.encode(&frame, &mut rng).unwrap();
            assert!(raw.is_encrypted());

            let decoded = codec.decode(&raw).unwrap();
            assert!(decoded.is_encrypted());
            assert_eq!(decoded.sender, frame.sender);
            assert_eq!(decoded.name, frame.name);
            assert_eq!(decoded.group, frame.group);
            assert_eq!(decoded.kind, frame.kind);
        }
    }

    #[test]
    fn test_encrypted_hides_header() {
        let key = SecretKey::from_passphrase("k");
        let codec = FrameCodec::new(Some(&key));
        let raw = codec
            .encode(&MessageFrame::text("alice", "top secret"), &mut rng())
            .unwrap();

        let body = raw.body();
        assert_eq!(body[0], ENCRYPTION_MARKER);
        assert!(!body.windows(5).any(|w| w == b"alice"));
        assert!(!body.windows(4).any(|w| w == CANARY));
    }

    #[test]
    fn test_pinned_indicator_is_sent() {
        let key = SecretKey::from_passphrase("k");
        let codec = FrameCodec::new(Some(&key));
        let indicator = Indicator([0x11; INDICATOR_SIZE]);
        let frame = MessageFrame::text("a", "b").with_indicator(indicator);

        let raw = codec.encode(&frame, &mut rng()).unwrap();
        assert_eq!(&raw.body()[1..1 + INDICATOR_SIZE], &indicator.0[..]);
        assert_eq!(codec.decode(&raw).unwrap().indicator, Some(indicator));
    }

    #[test]
    fn test_wrong_key_is_canary_mismatch() {
        let sender = FrameCodec::new(Some(&SecretKey::from_passphrase("right")));
        let receiver = FrameCodec::new(Some(&SecretKey::from_passphrase("wrong")));
        let mut rng = rng();

        for _ in 0..20 {
            let raw = sender.encode(&MessageFrame::text("a", "hello"), &mut rng).unwrap();
            let err = receiver.decode(&raw).unwrap_err();
            assert!(matches!(err, ProtocolError::CanaryMismatch), "{:?}", err);
            assert!(err.is_frame_drop());
        }
    }

    #[test]
    fn test_encrypted_without_key_is_canary_mismatch() {
        let sender = FrameCodec::new(Some(&SecretKey::from_passphrase("k")));
        let raw = sender.encode(&MessageFrame::text("a", "b"), &mut rng()).unwrap();
        assert!(matches!(
            FrameCodec::plain().decode(&raw),
            Err(ProtocolError::CanaryMismatch)
        ));
    }

    #[test]
    fn test_keyed_codec_reads_plain_frames() {
        let raw = FrameCodec::plain()
            .encode(&MessageFrame::text("a", "b"), &mut rng())
            .unwrap();
        let keyed = FrameCodec::new(Some(&SecretKey::from_passphrase("k")));
        let decoded = keyed.decode(&raw).unwrap();
        assert!(!decoded.is_encrypted());
        assert_eq!(decoded.text_payload(), Some(&b"b"[..]));
    }

    #[test]
    fn test_encode_rejects_bad_names() {
        let codec = FrameCodec::plain();
        let mut rng = rng();
        for frame in [
            MessageFrame::text("a@b", "x"),
            MessageFrame::text("a|b", "x"),
            MessageFrame::text("", "x"),
            MessageFrame::text("a", "x").with_group(""),
            MessageFrame::text("a", "x").with_group("g|h"),
            MessageFrame::text("n".repeat(65), "x"),
        ] {
            assert!(matches!(
                codec.encode(&frame, &mut rng),
                Err(ProtocolError::InvalidName(_))
            ));
        }
    }

    fn raw_body(body: &[u8]) -> RawFrame {
        let mut bytes = ((body.len() + 4) as u32).to_le_bytes().to_vec();
        bytes.extend_from_slice(&1u32.to_le_bytes());
        bytes.extend_from_slice(body);
        RawFrame::from_bytes(bytes).unwrap()
    }

    #[test]
    fn test_decode_malformed() {
        let codec = FrameCodec::plain();
        for body in [
            &b"alice no terminator"[..],
            &b"alice|NOP\0"[..],
            &b"alice|IMG\0\x01\x00"[..],
            &[0xff, 0xfe, 0][..],
        ] {
            let err = codec.decode(&raw_body(body)).unwrap_err();
            assert!(err.is_frame_drop(), "{:?}", err);
        }

        let long = [vec![b'n'; MAX_NAME_SIZE + 1], vec![0]].concat();
        assert!(matches!(
            codec.decode(&raw_body(&long)),
            Err(ProtocolError::MalformedHeader(_))
        ));
    }

    #[test]
    fn test_decode_splits_on_first_delimiters() {
        let codec = FrameCodec::plain();
        let frame = codec.decode(&raw_body(b"al@grp|EXT\0ignored")).unwrap();
        assert_eq!(frame.name, "al");
        assert_eq!(frame.group.as_deref(), Some("grp"));
        assert_eq!(frame.kind, FrameKind::Exit);

        let frame = codec.decode(&raw_body(b"al\0pay\0load")).unwrap();
        assert_eq!(frame.text_payload(), Some(&b"pay\0load"[..]));
    }

    #[test]
    fn test_encode_respects_frame_limit() {
        let codec = FrameCodec::plain().with_max_frame_size(32);
        let mut rng = rng();
        assert!(codec.encode(&MessageFrame::text("a", "short"), &mut rng).is_ok());
        assert!(matches!(
            codec.encode(&MessageFrame::text("a", "x".repeat(64)), &mut rng),
            Err(ProtocolError::FrameTooLarge { .. })
        ));
    }
}
