//! Integration tests — full session lifecycle, frame filtering, and
//! teardown semantics over real WebSocket connections on localhost.

use std::time::Duration;

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;

use phonedesk_core::{
    SessionConfig, SessionStatus, SinkOptions, StreamSession, StreamTransport, TransportEvent,
    no_token,
};

// ── Helpers ──────────────────────────────────────────────────────

/// Bind a listener on an OS-assigned port and return it with the API
/// base the client should dial.
async fn ephemeral_listener() -> (TcpListener, String) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    (listener, format!("http://127.0.0.1:{port}"))
}

fn spool_config(api_base: &str, dir: &std::path::Path) -> SessionConfig {
    SessionConfig::new(api_base).with_sink_options(SinkOptions {
        player_command: None,
        spool_dir: dir.to_path_buf(),
    })
}

/// Drive the session until its event stream ends, bounded by a
/// timeout so a wedged test fails instead of hanging.
async fn drive_to_end(session: &mut StreamSession) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while session.drive().await {}
    })
    .await
    .expect("session did not finish in time");
}

// ── Frame filtering and delivery ─────────────────────────────────

#[tokio::test]
async fn session_streams_video_and_filters_control_frames() {
    let (listener, api_base) = ephemeral_listener().await;
    let dir = tempfile::tempdir().unwrap();

    // Server: one handshake frame, one device message, one video
    // frame behind a 12-byte metadata prefix, then close.
    let mut video_frame = vec![0xFF; 12];
    video_frame.extend_from_slice(&[0x00, 0x00, 0x01, 0x65]);
    video_frame.extend_from_slice(&[0xAB; 20]);
    let expected_payload = video_frame[12..].to_vec();

    let frames = video_frame.clone();
    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(stream).await.unwrap();

        ws.send(Message::Binary(b"scrcpy_initial stuff".to_vec()))
            .await
            .unwrap();
        ws.send(Message::Binary(b"scrcpy_message".to_vec()))
            .await
            .unwrap();
        ws.send(Message::Binary(frames)).await.unwrap();
        ws.close(None).await.unwrap();

        // Drain until the socket is gone.
        while ws.next().await.is_some() {}
    });

    let mut session = StreamSession::new(spool_config(&api_base, dir.path()));
    session.select_device("emu-5554").unwrap();
    drive_to_end(&mut session).await;
    server.await.unwrap();

    let counters = session.counters();
    assert_eq!(counters.frames, 3);
    assert_eq!(counters.handshake_frames, 1);
    assert_eq!(counters.device_messages, 1);
    assert_eq!(counters.video_units, 1);
    assert_eq!(counters.video_bytes, expected_payload.len() as u64);

    // The spool sink received exactly the normalized payload.
    let spooled = std::fs::read(dir.path().join("emu-5554.h264")).unwrap();
    assert_eq!(spooled, expected_payload);

    // Server-initiated close tears the session down completely.
    assert!(session.phase().is_idle());
    assert_eq!(session.status(), SessionStatus::Closed);
    assert!(session.surface().is_empty());
}

#[tokio::test]
async fn settings_handshake_is_first_outbound_message() {
    let (listener, api_base) = ephemeral_listener().await;
    let dir = tempfile::tempdir().unwrap();

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(stream).await.unwrap();

        let first = loop {
            match ws.next().await {
                Some(Ok(Message::Binary(data))) => break data,
                Some(Ok(_)) => continue,
                other => panic!("socket ended before first message: {other:?}"),
            }
        };
        let _ = ws.close(None).await;
        first
    });

    let mut session = StreamSession::new(spool_config(&api_base, dir.path()));
    session.select_device("emu-5554").unwrap();
    drive_to_end(&mut session).await;

    let first = tokio::time::timeout(Duration::from_secs(5), server)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(first.len(), 28);
    assert_eq!(first[0], 101); // video-settings type id
}

// ── Reselection ──────────────────────────────────────────────────

#[tokio::test]
async fn reselect_closes_previous_connection() {
    let (listener, api_base) = ephemeral_listener().await;
    let dir = tempfile::tempdir().unwrap();
    let (observed_tx, mut observed_rx) = mpsc::unbounded_channel::<&'static str>();

    let server = tokio::spawn(async move {
        // First connection: read until the client closes it.
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(stream).await.unwrap();
        observed_tx.send("conn1-open").unwrap();
        while let Some(msg) = ws.next().await {
            if matches!(msg, Ok(Message::Close(_)) | Err(_)) {
                break;
            }
        }
        observed_tx.send("conn1-closed").unwrap();

        // Second connection: just accept and hold.
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(stream).await.unwrap();
        observed_tx.send("conn2-open").unwrap();
        while ws.next().await.is_some() {}
    });

    let mut session = StreamSession::new(spool_config(&api_base, dir.path()));

    session.select_device("device-a").unwrap();
    // Drive to Active so the first connection is fully established.
    tokio::time::timeout(Duration::from_secs(5), async {
        while session.status() != SessionStatus::Connected {
            assert!(session.drive().await);
        }
    })
    .await
    .unwrap();
    assert_eq!(session.device_id(), Some("device-a"));

    session.select_device("device-b").unwrap();
    assert_eq!(session.device_id(), Some("device-b"));

    tokio::time::timeout(Duration::from_secs(5), async {
        while session.status() != SessionStatus::Connected {
            assert!(session.drive().await);
        }
    })
    .await
    .unwrap();

    // The sequential server accepted conn2 only after observing
    // conn1's close, so observing all three proves the ordering.
    let mut observed = Vec::new();
    for _ in 0..3 {
        let event = tokio::time::timeout(Duration::from_secs(5), observed_rx.recv())
            .await
            .unwrap()
            .unwrap();
        observed.push(event);
    }
    assert_eq!(observed, vec!["conn1-open", "conn1-closed", "conn2-open"]);

    session.deselect();
    drop(session);
    server.abort();
}

// ── Transport semantics ──────────────────────────────────────────

#[tokio::test]
async fn send_after_close_is_silent_noop() {
    let (listener, api_base) = ephemeral_listener().await;

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(stream).await.unwrap();

        let mut binaries: Vec<Vec<u8>> = Vec::new();
        while let Some(Ok(msg)) = ws.next().await {
            match msg {
                Message::Binary(data) => binaries.push(data),
                Message::Close(_) => break,
                _ => {}
            }
        }
        binaries
    });

    let token = no_token();
    let (transport, mut events) = StreamTransport::connect(&api_base, "emu-5554", &token);

    let opened = tokio::time::timeout(Duration::from_secs(5), events.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(opened, TransportEvent::Opened);
    assert!(transport.is_open());

    transport.close();
    transport.send(Bytes::from_static(b"too late"));
    transport.close(); // idempotent

    let binaries = tokio::time::timeout(Duration::from_secs(5), server)
        .await
        .unwrap()
        .unwrap();
    assert!(binaries.is_empty());

    // The final event on the channel is Closed.
    let mut last = None;
    while let Ok(Some(event)) = tokio::time::timeout(Duration::from_secs(5), events.recv()).await {
        last = Some(event);
    }
    assert_eq!(last, Some(TransportEvent::Closed));
}

#[tokio::test]
async fn connect_failure_emits_error_then_closed() {
    // Nothing listens on the discard port.
    let token = no_token();
    let (_transport, mut events) = StreamTransport::connect("http://127.0.0.1:9", "emu-5554", &token);

    let first = tokio::time::timeout(Duration::from_secs(5), events.recv())
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(first, TransportEvent::Error(_)));

    let second = tokio::time::timeout(Duration::from_secs(5), events.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(second, TransportEvent::Closed);
}

#[tokio::test]
async fn open_failure_drives_session_to_error() {
    let dir = tempfile::tempdir().unwrap();
    let mut session = StreamSession::new(spool_config("http://127.0.0.1:9", dir.path()));

    session.select_device("emu-5554").unwrap();
    drive_to_end(&mut session).await;

    assert!(session.phase().is_idle());
    assert!(matches!(session.status(), SessionStatus::Error(_)));
    assert!(session.surface().is_empty());
}
