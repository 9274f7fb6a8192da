//! End-to-end relay scenarios over loopback sockets.

use parley_crypto::{RandomGenerator, SecretKey};
use parley_protocol::{
    recv_frame, recv_identity, send_frame, ClientId, FrameCodec, MessageFrame, ProtocolError,
    RawFrame, DISCOVERY_PROBE, DISCOVERY_REPLY,
};
use parley_server::{RelayServer, ServerConfig, ShutdownHandle};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpStream, UdpSocket};
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(5);
const MAX_FRAME: usize = 16 * 1024 * 1024;

fn config() -> parley_server::ServerConfigBuilder {
    ServerConfig::builder()
        .bind_address("127.0.0.1")
        .port(0)
        .discovery(false)
        .poll_interval(Duration::from_millis(50))
}

async fn start(config: ServerConfig) -> (SocketAddr, Option<SocketAddr>, ShutdownHandle) {
    let server = RelayServer::bind(config).await.unwrap();
    let addr = server.local_addr().unwrap();
    let discovery = server.discovery_addr();
    let handle = server.shutdown_handle();
    tokio::spawn(server.run());
    (addr, discovery, handle)
}

async fn join(addr: SocketAddr) -> (TcpStream, ClientId) {
    let stream = TcpStream::connect(addr).await.unwrap();
    let id = recv_identity(&stream, WAIT).await.unwrap();
    (stream, id)
}

async fn next_frame(stream: &TcpStream) -> RawFrame {
    timeout(WAIT, recv_frame(stream, MAX_FRAME, WAIT))
        .await
        .expect("timed out waiting for frame")
        .unwrap()
        .expect("connection closed")
}

fn text(codec: &FrameCodec, rng: &mut RandomGenerator, name: &str, body: &str) -> RawFrame {
    codec.encode(&MessageFrame::text(name, body), rng).unwrap()
}

#[tokio::test]
async fn test_identities_are_monotonic() {
    let (addr, _, handle) = start(config().build().unwrap()).await;

    let (_a, id_a) = join(addr).await;
    let (b, id_b) = join(addr).await;
    let (_c, id_c) = join(addr).await;
    drop(b);
    let (_d, id_d) = join(addr).await;

    assert_eq!(
        vec![id_a, id_b, id_c, id_d],
        vec![ClientId(1), ClientId(2), ClientId(3), ClientId(4)]
    );
    handle.shutdown();
}

#[tokio::test]
async fn test_relay_stamps_sender_and_echoes() {
    let (addr, _, handle) = start(config().build().unwrap()).await;
    let codec = FrameCodec::plain();
    let mut rng = RandomGenerator::from_seed(b"echo");

    let (alice, alice_id) = join(addr).await;
    let (bob, _) = join(addr).await;

    // The sender id on the way in is ignored
    let outgoing = codec
        .encode(&MessageFrame::text("alice", "hi").with_sender(ClientId(999)), &mut rng)
        .unwrap();
    send_frame(&alice, &outgoing).await.unwrap();

    for stream in [&alice, &bob] {
        let frame = codec.decode(&next_frame(stream).await).unwrap();
        assert_eq!(frame.sender, alice_id);
        assert_eq!(frame.text_payload(), Some(&b"hi"[..]));
    }
    handle.shutdown();
}

#[tokio::test]
async fn test_late_join_replays_history_in_order() {
    let (addr, _, handle) = start(config().build().unwrap()).await;
    let codec = FrameCodec::plain();
    let mut rng = RandomGenerator::from_seed(b"late join");

    let (alice, alice_id) = join(addr).await;
    let (bob, bob_id) = join(addr).await;

    send_frame(&alice, &text(&codec, &mut rng, "alice", "A")).await.unwrap();
    next_frame(&alice).await;
    next_frame(&bob).await;
    send_frame(&bob, &text(&codec, &mut rng, "bob", "B")).await.unwrap();
    next_frame(&alice).await;
    next_frame(&bob).await;

    let (carol, carol_id) = join(addr).await;
    assert_eq!(carol_id, ClientId(3));

    send_frame(&alice, &text(&codec, &mut rng, "alice", "C")).await.unwrap();

    let mut seen = Vec::new();
    for _ in 0..3 {
        let frame = codec.decode(&next_frame(&carol).await).unwrap();
        let body = String::from_utf8(frame.text_payload().unwrap().to_vec()).unwrap();
        seen.push((frame.sender, body));
    }
    assert_eq!(
        seen,
        vec![
            (alice_id, "A".to_string()),
            (bob_id, "B".to_string()),
            (alice_id, "C".to_string()),
        ]
    );
    handle.shutdown();
}

#[tokio::test]
async fn test_history_is_bounded_for_late_joiners() {
    let (addr, _, handle) = start(config().history_capacity(100).build().unwrap()).await;
    let codec = FrameCodec::plain();
    let mut rng = RandomGenerator::from_seed(b"bounded");

    let (alice, _) = join(addr).await;
    for i in 0..10 {
        let frame = text(&codec, &mut rng, "al", &format!("message {:02}", i));
        send_frame(&alice, &frame).await.unwrap();
        next_frame(&alice).await;
    }

    // Each frame is 8 + "al\0message NN" = 21 bytes, so 4 fit in 100
    let (bob, _) = join(addr).await;
    send_frame(&alice, &text(&codec, &mut rng, "al", "live")).await.unwrap();

    let mut seen = Vec::new();
    loop {
        let frame = codec.decode(&next_frame(&bob).await).unwrap();
        let body = String::from_utf8(frame.text_payload().unwrap().to_vec()).unwrap();
        let done = body == "live";
        seen.push(body);
        if done {
            break;
        }
    }
    assert_eq!(
        seen,
        vec!["message 06", "message 07", "message 08", "message 09", "live"]
    );
    handle.shutdown();
}

#[tokio::test]
async fn test_stalled_peer_does_not_block_others() {
    let config = config()
        .send_timeout(Duration::from_millis(200))
        .history_capacity(0)
        .build()
        .unwrap();
    let (addr, _, handle) = start(config).await;
    let codec = FrameCodec::plain();
    let mut rng = RandomGenerator::from_seed(b"stalled");

    let (active, _) = join(addr).await;
    let (stalled, _) = join(addr).await;

    const FRAMES: usize = 64;
    let payload = "x".repeat(256 * 1024);
    let frames: Vec<RawFrame> = (0..FRAMES)
        .map(|_| text(&codec, &mut rng, "active", &payload))
        .collect();

    let writer = async {
        for frame in &frames {
            send_frame(&active, frame).await.unwrap();
        }
    };
    let reader = async {
        let mut received = 0;
        while received < FRAMES {
            next_frame(&active).await;
            received += 1;
        }
        received
    };

    let (_, received) = timeout(Duration::from_secs(30), async { tokio::join!(writer, reader) })
        .await
        .expect("active client starved by stalled peer");
    assert_eq!(received, FRAMES);

    // Whatever reached the slow client is whole frames; a cut frame ends its connection
    loop {
        match timeout(Duration::from_millis(500), recv_frame(&stalled, MAX_FRAME, WAIT)).await {
            Ok(Ok(Some(raw))) => assert!(codec.decode(&raw).is_ok()),
            Ok(Ok(None)) | Ok(Err(_)) | Err(_) => break,
        }
    }
    handle.shutdown();
}

#[tokio::test]
async fn test_wrong_key_frame_dropped_session_continues() {
    let (addr, _, handle) = start(config().build().unwrap()).await;
    let mut rng = RandomGenerator::from_seed(b"bad key");

    let alice_codec = FrameCodec::new(Some(&SecretKey::from_passphrase("right")));
    let bob_codec = FrameCodec::new(Some(&SecretKey::from_passphrase("wrong")));
    let plain = FrameCodec::plain();

    let (alice, _) = join(addr).await;
    let (bob, _) = join(addr).await;

    send_frame(&alice, &text(&alice_codec, &mut rng, "alice", "secret")).await.unwrap();
    send_frame(&alice, &text(&plain, &mut rng, "alice", "in the clear")).await.unwrap();

    let first = bob_codec.decode(&next_frame(&bob).await);
    assert!(matches!(first, Err(ProtocolError::CanaryMismatch)));

    let second = bob_codec.decode(&next_frame(&bob).await).unwrap();
    assert_eq!(second.text_payload(), Some(&b"in the clear"[..]));
    handle.shutdown();
}

#[tokio::test]
async fn test_bad_client_is_isolated() {
    let config = config().max_frame_size(1024).build().unwrap();
    let (addr, _, handle) = start(config).await;
    let codec = FrameCodec::plain();
    let mut rng = RandomGenerator::from_seed(b"isolated");

    let (mut rogue, _) = join(addr).await;
    let (alice, _) = join(addr).await;
    let (bob, _) = join(addr).await;

    // Declares a frame far over the limit
    rogue.write_all(&u32::MAX.to_le_bytes()).await.unwrap();
    let closed = timeout(WAIT, recv_frame(&rogue, MAX_FRAME, WAIT)).await.unwrap();
    assert!(matches!(closed, Ok(None) | Err(_)));

    send_frame(&alice, &text(&codec, &mut rng, "alice", "still here")).await.unwrap();
    let frame = codec.decode(&next_frame(&bob).await).unwrap();
    assert_eq!(frame.text_payload(), Some(&b"still here"[..]));
    handle.shutdown();
}

#[tokio::test]
async fn test_discovery_probe_answered() {
    let (_, discovery, handle) = start(config().discovery(true).build().unwrap()).await;
    let discovery = discovery.expect("discovery enabled");

    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    socket.send_to(DISCOVERY_PROBE, discovery).await.unwrap();

    let mut buf = [0u8; 16];
    let (n, from) = timeout(WAIT, socket.recv_from(&mut buf)).await.unwrap().unwrap();
    assert_eq!(&buf[..n], DISCOVERY_REPLY);
    assert_eq!(from, discovery);
    handle.shutdown();
}
