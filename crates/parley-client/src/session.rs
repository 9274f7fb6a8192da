//! Chat Session
//!
//! Ties together the connection, the frame codec and the line editor.
//! One task drives everything: it waits for either server data, a key
//! action or the poll tick, handles what arrived, and redraws.

use crate::attachment::load_image;
use crate::config::ClientConfig;
use crate::connection::{Connection, ConnectionInfo};
use crate::discovery::locate_server;
use crate::editor::LineEditor;
use crate::errors::ClientResult;
use crate::events::{ChatEvent, PresenceStatus};
use crate::input::InputAction;
use crate::render::{RenderFlags, Renderer};
use parley_crypto::RandomGenerator;
use parley_protocol::{
    ClientId, FrameCodec, FrameKind, ImageData, MessageFrame, RawFrame, RecvOutcome,
    MAX_IMAGE_DIMENSION,
};
use std::net::SocketAddr;
use std::path::Path;
use tokio::sync::mpsc;
use tokio::time::sleep;
use tracing::{debug, info, trace, warn};

/// What woke the session loop
enum LoopEvent {
    Readable(ClientResult<()>),
    Input(Option<InputAction>),
    Tick,
}

/// A connected chat participant
pub struct ChatSession {
    config: ClientConfig,
    connection: Connection,
    codec: FrameCodec,
    rng: RandomGenerator,
    editor: LineEditor,
    /// Sender of the last displayed message
    last_sender: Option<ClientId>,
}

impl ChatSession {
    /// Find the server and join
    pub async fn connect(config: ClientConfig) -> ClientResult<Self> {
        config.validate()?;
        let addr = locate_server(&config).await?;
        Self::connect_to(config, addr).await
    }

    /// Join the server at `addr`
    pub async fn connect_to(config: ClientConfig, addr: SocketAddr) -> ClientResult<Self> {
        let connection = Connection::connect(
            addr,
            config.connect_timeout(),
            config.read_timeout(),
            config.max_frame_size,
        )
        .await?;

        let key = config.secret_key();
        let codec = FrameCodec::new(key.as_ref()).with_max_frame_size(config.max_frame_size);
        info!(
            client = %connection.id(),
            server = %addr,
            encrypted = codec.is_encrypting(),
            "Joined chat as {}",
            config.name
        );

        let mut session = Self {
            editor: LineEditor::new(config.utf8),
            config,
            connection,
            codec,
            rng: RandomGenerator::from_entropy(),
            last_sender: None,
        };

        if session.config.send_presence {
            session.send(FrameKind::Enter).await?;
        }
        Ok(session)
    }

    /// Identity assigned by the server
    pub fn id(&self) -> ClientId {
        self.connection.id()
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn editor(&self) -> &LineEditor {
        &self.editor
    }

    /// Traffic counters
    pub fn info(&self) -> &ConnectionInfo {
        self.connection.info()
    }

    async fn send(&mut self, kind: FrameKind) -> ClientResult<()> {
        let mut frame = MessageFrame::new(self.config.name.as_str(), kind);
        if let Some(group) = self.config.frame_group() {
            frame = frame.with_group(group);
        }
        let raw = self.codec.encode(&frame, &mut self.rng)?;
        trace!(kind = frame.kind.name(), len = raw.len(), "Sending frame");
        self.connection.send(&raw).await
    }

    /// Send a text message; empty lines are not sent
    pub async fn send_text(&mut self, text: &[u8]) -> ClientResult<bool> {
        if text.is_empty() {
            return Ok(false);
        }
        self.send(FrameKind::Plain(text.to_vec())).await?;
        Ok(true)
    }

    /// Announce a keystroke, if typing notifications are on
    pub async fn send_typing(&mut self) -> ClientResult<()> {
        if self.config.send_typing {
            self.send(FrameKind::Typing).await?;
        }
        Ok(())
    }

    pub async fn send_image(&mut self, image: ImageData) -> ClientResult<()> {
        debug!(width = image.width(), height = image.height(), "Sending image");
        self.send(FrameKind::Image(image)).await
    }

    /// Load, scale and send an image file
    pub async fn attach_image(&mut self, path: &Path) -> ClientResult<()> {
        let image = load_image(path, MAX_IMAGE_DIMENSION)?;
        self.send_image(image).await
    }

    /// Turn a received frame into an event, or nothing if it is filtered out
    pub fn handle_frame(&mut self, raw: &RawFrame) -> Option<ChatEvent> {
        let frame = match self.codec.decode(raw) {
            Ok(frame) => frame,
            Err(e) => {
                debug!(sender = %raw.sender(), "Dropping frame: {}", e);
                return Some(ChatEvent::Dropped {
                    sender: raw.sender(),
                    reason: e.to_string(),
                });
            }
        };

        if self.config.use_group && frame.group.as_deref() != Some(self.config.group.as_str()) {
            trace!(sender = %frame.sender, group = ?frame.group, "Frame for another group");
            return None;
        }

        let own = frame.sender == self.id();
        let status = match frame.kind {
            FrameKind::Typing => Some(PresenceStatus::Typing),
            FrameKind::Enter => Some(PresenceStatus::Entered),
            FrameKind::Exit => Some(PresenceStatus::Left),
            FrameKind::Plain(_) | FrameKind::Image(_) => None,
        };

        if let Some(status) = status {
            if own {
                return None;
            }
            let group = if self.config.use_group { None } else { frame.group };
            return Some(ChatEvent::Status {
                name: frame.name,
                group,
                status,
            });
        }

        let flags = RenderFlags {
            own,
            print_name: self.last_sender != Some(frame.sender),
            show_group: !self.config.use_group,
            utf8: self.config.utf8,
            ignore_break: self.config.ignore_break,
        };
        self.last_sender = Some(frame.sender);
        Some(ChatEvent::Message { frame, flags })
    }

    /// Drain every frame that is already waiting
    pub async fn poll_incoming(&mut self) -> ClientResult<Vec<ChatEvent>> {
        let mut events = Vec::new();
        loop {
            match self.connection.try_recv().await? {
                RecvOutcome::Frame(raw) => events.extend(self.handle_frame(&raw)),
                RecvOutcome::NotReady => break,
                RecvOutcome::Closed => {
                    events.push(ChatEvent::Disconnected);
                    break;
                }
            }
        }
        Ok(events)
    }

    /// Wait for the next event from the server
    pub async fn next_event(&mut self) -> ClientResult<ChatEvent> {
        loop {
            self.connection.readable().await?;
            match self.connection.try_recv().await? {
                RecvOutcome::Frame(raw) => {
                    if let Some(event) = self.handle_frame(&raw) {
                        return Ok(event);
                    }
                }
                RecvOutcome::NotReady => {}
                RecvOutcome::Closed => return Ok(ChatEvent::Disconnected),
            }
        }
    }

    /// Apply one key action; false means the user asked to quit
    pub async fn handle_action<R: Renderer>(
        &mut self,
        action: InputAction,
        renderer: &mut R,
    ) -> ClientResult<bool> {
        match action {
            InputAction::Quit => return Ok(false),
            InputAction::Insert(c) => {
                self.editor.insert_char(c);
                self.send_typing().await?;
            }
            InputAction::Backspace => {
                self.editor.backspace();
            }
            InputAction::Left => self.editor.left(),
            InputAction::Right => self.editor.right(),
            InputAction::Home => self.editor.home(),
            InputAction::End => self.editor.end(),
            InputAction::Submit => {
                let line = self.editor.take_line();
                self.send_text(&line).await?;
            }
            InputAction::AttachImage => {
                let path = String::from_utf8_lossy(self.editor.as_bytes()).trim().to_string();
                match self.attach_image(Path::new(&path)).await {
                    Ok(()) => self.editor.clear(),
                    Err(e) if e.is_recoverable() => {
                        warn!("{}", e);
                        renderer.render_status(&e.to_string())?;
                    }
                    Err(e) => return Err(e),
                }
            }
        }
        renderer.render_prompt(&self.editor)?;
        Ok(true)
    }

    /// Run until the user quits, input ends or the server goes away
    pub async fn run<R: Renderer>(
        &mut self,
        input: &mut mpsc::UnboundedReceiver<InputAction>,
        renderer: &mut R,
    ) -> ClientResult<()> {
        renderer.render_event(&ChatEvent::Connected {
            id: self.id(),
            server: self.info().server_addr,
        })?;
        renderer.render_prompt(&self.editor)?;

        loop {
            let event = tokio::select! {
                ready = self.connection.readable() => LoopEvent::Readable(ready),
                action = input.recv() => LoopEvent::Input(action),
                _ = sleep(self.config.poll_interval()) => LoopEvent::Tick,
            };

            match event {
                LoopEvent::Readable(ready) => {
                    ready?;
                    for event in self.poll_incoming().await? {
                        renderer.render_event(&event)?;
                        if matches!(event, ChatEvent::Disconnected) {
                            return Ok(());
                        }
                    }
                    renderer.render_prompt(&self.editor)?;
                }
                LoopEvent::Input(Some(action)) => {
                    if !self.handle_action(action, renderer).await? {
                        return Ok(());
                    }
                }
                LoopEvent::Input(None) => return Ok(()),
                LoopEvent::Tick => {}
            }
        }
    }

    /// Announce leaving and close the connection
    pub async fn close(mut self) {
        if self.config.send_presence {
            if let Err(e) = self.send(FrameKind::Exit).await {
                debug!("Exit announcement failed: {}", e);
            }
        }
        info!(
            frames_sent = self.info().frames_sent,
            frames_received = self.info().frames_received,
            "Left chat after {:?}",
            self.info().duration()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::PlainRenderer;
    use parley_server::{RelayServer, ServerConfig, ShutdownHandle};
    use std::time::Duration;
    use tokio::time::timeout;

    const WAIT: Duration = Duration::from_secs(5);

    async fn start_server() -> (SocketAddr, ShutdownHandle) {
        let config = ServerConfig::builder()
            .bind_address("127.0.0.1")
            .port(0)
            .discovery(false)
            .build()
            .unwrap();
        let server = RelayServer::bind(config).await.unwrap();
        let addr = server.local_addr().unwrap();
        let handle = server.shutdown_handle();
        tokio::spawn(server.run());
        (addr, handle)
    }

    fn quiet(name: &str, addr: SocketAddr) -> crate::config::ClientConfigBuilder {
        ClientConfig::builder()
            .name(name)
            .port(addr.port())
            .send_presence(false)
    }

    async fn join(builder: crate::config::ClientConfigBuilder) -> ChatSession {
        ChatSession::connect(builder.build().unwrap()).await.unwrap()
    }

    async fn next(session: &mut ChatSession) -> ChatEvent {
        timeout(WAIT, session.next_event()).await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn test_text_reaches_everyone() {
        let (addr, handle) = start_server().await;
        let mut alice = join(quiet("alice", addr)).await;
        let mut bob = join(quiet("bob", addr)).await;
        assert_ne!(alice.id(), bob.id());

        assert!(alice.send_text(b"hello").await.unwrap());

        match next(&mut bob).await {
            ChatEvent::Message { frame, flags } => {
                assert_eq!(frame.name, "alice");
                assert_eq!(frame.sender, alice.id());
                assert_eq!(frame.text_payload(), Some(&b"hello"[..]));
                assert!(!flags.own);
                assert!(flags.print_name);
                assert!(!flags.show_group);
            }
            other => panic!("unexpected {:?}", other),
        }

        match next(&mut alice).await {
            ChatEvent::Message { flags, .. } => assert!(flags.own),
            other => panic!("unexpected {:?}", other),
        }
        handle.shutdown();
    }

    #[tokio::test]
    async fn test_name_printed_once_per_run() {
        let (addr, handle) = start_server().await;
        let mut alice = join(quiet("alice", addr)).await;
        let mut bob = join(quiet("bob", addr)).await;

        alice.send_text(b"one").await.unwrap();
        alice.send_text(b"two").await.unwrap();

        let first = next(&mut bob).await;
        let second = next(&mut bob).await;
        assert!(matches!(first, ChatEvent::Message { flags, .. } if flags.print_name));
        assert!(matches!(second, ChatEvent::Message { flags, .. } if !flags.print_name));
        handle.shutdown();
    }

    #[tokio::test]
    async fn test_empty_line_not_sent() {
        let (addr, handle) = start_server().await;
        let mut alice = join(quiet("alice", addr)).await;
        assert!(!alice.send_text(b"").await.unwrap());
        assert_eq!(alice.info().frames_sent, 0);
        handle.shutdown();
    }

    #[tokio::test]
    async fn test_other_groups_filtered() {
        let (addr, handle) = start_server().await;
        let mut alice = join(quiet("alice", addr)).await;
        let mut carol = join(quiet("carol", addr).group("ops")).await;

        alice.send_text(b"default only").await.unwrap();
        next(&mut alice).await;
        carol.send_text(b"ops only").await.unwrap();

        match next(&mut carol).await {
            ChatEvent::Message { frame, .. } => {
                assert_eq!(frame.text_payload(), Some(&b"ops only"[..]));
                assert_eq!(frame.group.as_deref(), Some("ops"));
            }
            other => panic!("unexpected {:?}", other),
        }
        handle.shutdown();
    }

    #[tokio::test]
    async fn test_no_group_shows_sender_group() {
        let (addr, handle) = start_server().await;
        let mut watcher = join(quiet("watcher", addr).use_group(false)).await;
        let mut alice = join(quiet("alice", addr).group("ops").send_presence(true)).await;

        match next(&mut watcher).await {
            ChatEvent::Status { name, group, status } => {
                assert_eq!(name, "alice");
                assert_eq!(group.as_deref(), Some("ops"));
                assert_eq!(status, PresenceStatus::Entered);
            }
            other => panic!("unexpected {:?}", other),
        }

        alice.send_text(b"hi").await.unwrap();
        match next(&mut watcher).await {
            ChatEvent::Message { flags, .. } => assert!(flags.show_group),
            other => panic!("unexpected {:?}", other),
        }
        handle.shutdown();
    }

    #[tokio::test]
    async fn test_presence_and_typing() {
        let (addr, handle) = start_server().await;
        let mut bob = join(quiet("bob", addr)).await;
        let mut alice = join(quiet("alice", addr).send_presence(true).send_typing(true)).await;

        match next(&mut bob).await {
            ChatEvent::Status { name, group, status } => {
                assert_eq!(name, "alice");
                assert_eq!(group, None);
                assert_eq!(status, PresenceStatus::Entered);
            }
            other => panic!("unexpected {:?}", other),
        }

        alice.send_typing().await.unwrap();
        assert!(matches!(
            next(&mut bob).await,
            ChatEvent::Status { status: PresenceStatus::Typing, .. }
        ));

        // Own status frames are not reported; the first event is the text
        alice.send_text(b"done").await.unwrap();
        assert!(matches!(next(&mut alice).await, ChatEvent::Message { .. }));

        alice.close().await;
        assert!(matches!(next(&mut bob).await, ChatEvent::Message { .. }));
        assert!(matches!(
            next(&mut bob).await,
            ChatEvent::Status { status: PresenceStatus::Left, .. }
        ));
        handle.shutdown();
    }

    #[tokio::test]
    async fn test_typing_off_sends_nothing() {
        let (addr, handle) = start_server().await;
        let mut alice = join(quiet("alice", addr)).await;
        alice.send_typing().await.unwrap();
        assert_eq!(alice.info().frames_sent, 0);
        handle.shutdown();
    }

    #[tokio::test]
    async fn test_encrypted_chat() {
        let (addr, handle) = start_server().await;
        let mut alice = join(quiet("alice", addr).passphrase("shared")).await;
        let mut bob = join(quiet("bob", addr).passphrase("shared")).await;
        let mut eve = join(quiet("eve", addr).passphrase("guess")).await;
        let mut plain = join(quiet("plain", addr)).await;

        alice.send_text(b"secret").await.unwrap();

        match next(&mut bob).await {
            ChatEvent::Message { frame, .. } => {
                assert!(frame.is_encrypted());
                assert_eq!(frame.text_payload(), Some(&b"secret"[..]));
            }
            other => panic!("unexpected {:?}", other),
        }
        match next(&mut eve).await {
            ChatEvent::Dropped { sender, .. } => assert_eq!(sender, alice.id()),
            other => panic!("unexpected {:?}", other),
        }
        assert!(matches!(next(&mut plain).await, ChatEvent::Dropped { .. }));

        // Still connected after the drop
        eve.send_text(b"still here").await.unwrap();
        assert!(matches!(next(&mut eve).await, ChatEvent::Message { .. }));
        handle.shutdown();
    }

    #[tokio::test]
    async fn test_image_attachment() {
        let (addr, handle) = start_server().await;
        let mut alice = join(quiet("alice", addr)).await;
        let mut bob = join(quiet("bob", addr)).await;

        let path = std::env::temp_dir().join(format!("parley-attach-{}.png", std::process::id()));
        image::RgbImage::from_pixel(4, 2, image::Rgb([9, 8, 7]))
            .save(&path)
            .unwrap();
        alice.attach_image(&path).await.unwrap();
        std::fs::remove_file(&path).ok();

        match next(&mut bob).await {
            ChatEvent::Message { frame, .. } => match frame.kind {
                FrameKind::Image(image) => {
                    assert_eq!((image.width(), image.height()), (4, 2));
                    assert_eq!(image.pixel(3, 1), Some([9, 8, 7]));
                }
                other => panic!("unexpected kind {:?}", other),
            },
            other => panic!("unexpected {:?}", other),
        }
        handle.shutdown();
    }

    #[tokio::test]
    async fn test_key_actions_compose_and_send() {
        let (addr, handle) = start_server().await;
        let mut alice = join(quiet("alice", addr)).await;
        let mut renderer = PlainRenderer::new(Vec::new(), 80);

        for action in [
            InputAction::Insert('h'),
            InputAction::Insert('x'),
            InputAction::Backspace,
            InputAction::Insert('\t'),
            InputAction::Home,
            InputAction::Insert('o'),
        ] {
            assert!(alice.handle_action(action, &mut renderer).await.unwrap());
        }
        assert_eq!(alice.editor().as_bytes(), b"oh ");

        alice.handle_action(InputAction::Submit, &mut renderer).await.unwrap();
        assert!(alice.editor().is_empty());
        match next(&mut alice).await {
            ChatEvent::Message { frame, .. } => assert_eq!(frame.text_payload(), Some(&b"oh "[..])),
            other => panic!("unexpected {:?}", other),
        }

        assert!(!alice.handle_action(InputAction::Quit, &mut renderer).await.unwrap());
        handle.shutdown();
    }

    #[tokio::test]
    async fn test_bad_attachment_keeps_session() {
        let (addr, handle) = start_server().await;
        let mut alice = join(quiet("alice", addr)).await;
        let mut renderer = PlainRenderer::new(Vec::new(), 80);

        for c in "/no/such/file.png".chars() {
            alice.handle_action(InputAction::Insert(c), &mut renderer).await.unwrap();
        }
        assert!(alice
            .handle_action(InputAction::AttachImage, &mut renderer)
            .await
            .unwrap());
        assert_eq!(alice.editor().as_bytes(), b"/no/such/file.png");
        let out = String::from_utf8_lossy(renderer.get_ref()).to_string();
        assert!(out.contains("Image error"));
        handle.shutdown();
    }

    #[tokio::test]
    async fn test_run_stops_on_quit_and_closed_input() {
        let (addr, handle) = start_server().await;
        let mut alice = join(quiet("alice", addr)).await;
        let mut renderer = PlainRenderer::new(Vec::new(), 80);

        let (tx, mut rx) = mpsc::unbounded_channel();
        tx.send(InputAction::Quit).unwrap();
        timeout(WAIT, alice.run(&mut rx, &mut renderer)).await.unwrap().unwrap();

        drop(tx);
        timeout(WAIT, alice.run(&mut rx, &mut renderer)).await.unwrap().unwrap();

        let out = String::from_utf8_lossy(renderer.get_ref()).to_string();
        assert!(out.contains("Connected to"));
        handle.shutdown();
    }

    #[tokio::test]
    async fn test_run_ends_when_server_stops() {
        let (addr, handle) = start_server().await;
        let mut alice = join(quiet("alice", addr)).await;
        let mut renderer = PlainRenderer::new(Vec::new(), 80);
        let (_tx, mut rx) = mpsc::unbounded_channel();

        handle.shutdown();
        timeout(WAIT, alice.run(&mut rx, &mut renderer)).await.unwrap().unwrap();
        let out = String::from_utf8_lossy(renderer.get_ref()).to_string();
        assert!(out.contains("Disconnected from server"));
    }
}
