//! Binary WebSocket transport for one mirroring session.
//!
//! The transport dials
//! `ws(s)://{host}/ws/scrcpy?udid={deviceId}&token={authToken}` and
//! bridges the socket to the session through a pair of spawned tasks:
//! a reader that forwards every inbound binary frame into one ordered
//! event channel, and a writer that drains outbound sends. The session
//! never touches the socket directly — connect, send and close are all
//! fire-and-forget, and completion is observed only through
//! [`TransportEvent`]s.
//!
//! `send` is a silent no-op unless the socket is currently open, which
//! makes sends racing a teardown harmless. `close` is idempotent.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::debug;

use crate::error::StreamError;

// ── Token accessor ───────────────────────────────────────────────

/// Zero-argument accessor returning the current bearer token.
/// Sampled exactly once per `connect`.
pub type TokenProvider = Arc<dyn Fn() -> String + Send + Sync>;

/// A token provider that always yields an empty token.
pub fn no_token() -> TokenProvider {
    Arc::new(String::new)
}

// ── Events ───────────────────────────────────────────────────────

/// Socket lifecycle and data events, delivered in order through one
/// channel per transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// The socket is open; sends will now reach the server.
    Opened,
    /// One inbound binary frame.
    Frame(Bytes),
    /// The dial failed or the open socket errored.
    Error(String),
    /// The socket is gone. Always the final event.
    Closed,
}

/// Ordered event stream owned by the session that created the
/// transport. Dropping it makes late messages unreachable.
pub type TransportEvents = mpsc::UnboundedReceiver<TransportEvent>;

// ── Sender handle ────────────────────────────────────────────────

enum WriterCommand {
    Send(Bytes),
    Close,
}

/// Cheap cloneable write handle, detached from the transport's
/// lifecycle management. Used by the interaction forwarder.
#[derive(Clone)]
pub struct TransportSender {
    tx: mpsc::UnboundedSender<WriterCommand>,
    open: Arc<AtomicBool>,
}

impl TransportSender {
    /// Write `data` if and only if the socket is currently open;
    /// otherwise do nothing. Never errors.
    pub fn send(&self, data: Bytes) {
        if self.open.load(Ordering::SeqCst) {
            let _ = self.tx.send(WriterCommand::Send(data));
        }
    }

    /// Whether the socket is currently open.
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    #[cfg(test)]
    pub(crate) fn detached() -> (Self, mpsc::UnboundedReceiver<Bytes>) {
        let (tx, mut cmd_rx) = mpsc::unbounded_channel();
        let (data_tx, data_rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            while let Some(cmd) = cmd_rx.recv().await {
                if let WriterCommand::Send(bytes) = cmd {
                    let _ = data_tx.send(bytes);
                }
            }
        });
        (
            Self {
                tx,
                open: Arc::new(AtomicBool::new(true)),
            },
            data_rx,
        )
    }
}

// ── StreamTransport ──────────────────────────────────────────────

/// One binary streaming socket bound to one device session.
pub struct StreamTransport {
    sender: TransportSender,
    closed: Arc<AtomicBool>,
}

impl StreamTransport {
    /// Open the streaming socket for `udid`.
    ///
    /// The token accessor is sampled once, the dial happens on a
    /// spawned task, and the outcome arrives as [`TransportEvent`]s on
    /// the returned channel: `Opened` on success, `Error` then
    /// `Closed` on failure. Never blocks and never retries.
    pub fn connect(
        api_base: &str,
        udid: &str,
        token_provider: &TokenProvider,
    ) -> (Self, TransportEvents) {
        let url = Self::build_endpoint(api_base, udid, &token_provider());
        let open = Arc::new(AtomicBool::new(false));
        let closed = Arc::new(AtomicBool::new(false));
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        debug!(%udid, "opening stream socket");
        tokio::spawn(Self::run_socket(
            url,
            Arc::clone(&open),
            Arc::clone(&closed),
            cmd_rx,
            event_tx,
        ));

        let transport = Self {
            sender: TransportSender { tx: cmd_tx, open },
            closed,
        };
        (transport, event_rx)
    }

    /// Build the streaming endpoint URL from the API base, the device
    /// id, and a token snapshot. `http` maps to `ws`, `https` to
    /// `wss`; an empty token omits the query parameter.
    pub fn build_endpoint(api_base: &str, udid: &str, token: &str) -> String {
        let base = api_base.trim_end_matches('/');
        let ws_base = if let Some(rest) = base.strip_prefix("https") {
            format!("wss{rest}")
        } else if let Some(rest) = base.strip_prefix("http") {
            format!("ws{rest}")
        } else {
            base.to_string()
        };

        let mut url = format!("{ws_base}/ws/scrcpy?udid={}", urlencoding::encode(udid));
        if !token.is_empty() {
            url.push_str("&token=");
            url.push_str(&urlencoding::encode(token));
        }
        url
    }

    /// Write `data` if and only if the socket is currently open;
    /// otherwise silently do nothing.
    pub fn send(&self, data: Bytes) {
        self.sender.send(data);
    }

    /// A cloneable write handle for collaborators that must not own
    /// the transport.
    pub fn sender(&self) -> TransportSender {
        self.sender.clone()
    }

    /// Whether the socket is currently open.
    pub fn is_open(&self) -> bool {
        self.sender.is_open()
    }

    /// Close the socket. Idempotent; closing an already-closed or
    /// never-opened socket is a no-op.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.sender.open.store(false, Ordering::SeqCst);
            let _ = self.sender.tx.send(WriterCommand::Close);
        }
    }

    /// Dial the socket, then pump it until it dies.
    async fn run_socket(
        url: String,
        open: Arc<AtomicBool>,
        closed: Arc<AtomicBool>,
        mut cmd_rx: mpsc::UnboundedReceiver<WriterCommand>,
        event_tx: mpsc::UnboundedSender<TransportEvent>,
    ) {
        let ws = match connect_async(url.as_str()).await {
            Ok((ws, _response)) => ws,
            Err(e) => {
                let failure = StreamError::TransportOpen(e.to_string());
                let _ = event_tx.send(TransportEvent::Error(failure.to_string()));
                let _ = event_tx.send(TransportEvent::Closed);
                return;
            }
        };

        // close() raced the dial — shut the socket straight back down.
        if closed.load(Ordering::SeqCst) {
            let mut ws = ws;
            let _ = ws.close(None).await;
            let _ = event_tx.send(TransportEvent::Closed);
            return;
        }

        open.store(true, Ordering::SeqCst);
        let _ = event_tx.send(TransportEvent::Opened);

        let (mut ws_tx, mut ws_rx) = ws.split();

        // Writer task: session → socket.
        tokio::spawn(async move {
            while let Some(cmd) = cmd_rx.recv().await {
                match cmd {
                    WriterCommand::Send(bytes) => {
                        if ws_tx.send(Message::Binary(bytes.to_vec())).await.is_err() {
                            break;
                        }
                    }
                    WriterCommand::Close => {
                        let _ = ws_tx.send(Message::Close(None)).await;
                        break;
                    }
                }
            }
        });

        // Reader loop: socket → session.
        while let Some(msg) = ws_rx.next().await {
            match msg {
                Ok(Message::Binary(data)) => {
                    let _ = event_tx.send(TransportEvent::Frame(Bytes::from(data)));
                }
                Ok(Message::Close(_)) => break,
                Ok(_) => {} // text/ping/pong — not part of the protocol
                Err(e) => {
                    open.store(false, Ordering::SeqCst);
                    let failure = StreamError::Transport(e.to_string());
                    let _ = event_tx.send(TransportEvent::Error(failure.to_string()));
                    break;
                }
            }
        }

        open.store(false, Ordering::SeqCst);
        let _ = event_tx.send(TransportEvent::Closed);
    }
}

// ── Tests ────────────────────────────────────────────────────────
