//! Per-slot mirroring session: state machine and orchestration.
//!
//! One [`StreamSession`] owns one rendering slot. It wires the
//! transport, the demuxer, a probed decode sink, and the interaction
//! forwarder into a single lifecycle:
//!
//! ```text
//!  NoDevice ──► Opening ──► Active
//!      ▲           │           │
//!      │           ▼           ▼
//!      └────── TearingDown ◄───┘
//! ```
//!
//! Inputs are only "device selected", "device deselected", and socket
//! events — no UI lifecycle is involved. Selecting a new device while
//! a session is opening or active first drives the old session fully
//! through `TearingDown`, so no two sessions ever write into the same
//! rendering surface. Grid layouts run one independent session per
//! cell; cells share nothing but the API base and the token accessor.

use bytes::Bytes;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::error::StreamError;
use crate::stream::control::ControlMessage;
use crate::stream::demux::{DemuxedFrame, FrameDemuxer};
use crate::stream::input::{InteractionForwarder, KeyPress, PointerEvent};
use crate::stream::sink::{DecodeSink, RenderSurface, SinkOptions, VideoSink};
use crate::stream::transport::{
    StreamTransport, TokenProvider, TransportEvent, TransportEvents, no_token,
};

// ── SessionPhase ─────────────────────────────────────────────────

/// The lifecycle phase of one rendering slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionPhase {
    /// No device selected. Initial / terminal state.
    #[default]
    NoDevice,

    /// Transport constructed, socket dialing.
    Opening,

    /// Socket open, video settings sent, frames flowing.
    Active,

    /// Teardown sequence in progress.
    TearingDown,
}

impl std::fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoDevice => write!(f, "NoDevice"),
            Self::Opening => write!(f, "Opening"),
            Self::Active => write!(f, "Active"),
            Self::TearingDown => write!(f, "TearingDown"),
        }
    }
}

impl SessionPhase {
    /// Whether no device is selected.
    pub fn is_idle(&self) -> bool {
        matches!(self, Self::NoDevice)
    }

    /// Whether the session is opening or active.
    pub fn is_live(&self) -> bool {
        matches!(self, Self::Opening | Self::Active)
    }

    // ── Transitions ──────────────────────────────────────────────

    /// Transition to `Opening`. Valid from: `NoDevice`.
    pub fn begin_open(&mut self) -> Result<(), StreamError> {
        match self {
            Self::NoDevice => {
                *self = Self::Opening;
                Ok(())
            }
            _ => Err(StreamError::InvalidTransition(
                "cannot open: a session already occupies this slot",
            )),
        }
    }

    /// Transition to `Active`. Valid from: `Opening`.
    pub fn complete_open(&mut self) -> Result<(), StreamError> {
        match self {
            Self::Opening => {
                *self = Self::Active;
                Ok(())
            }
            _ => Err(StreamError::InvalidTransition(
                "cannot activate: not in Opening state",
            )),
        }
    }

    /// Transition to `TearingDown`. Valid from: `Opening`, `Active`.
    pub fn begin_teardown(&mut self) -> Result<(), StreamError> {
        match self {
            Self::Opening | Self::Active => {
                *self = Self::TearingDown;
                Ok(())
            }
            _ => Err(StreamError::InvalidTransition(
                "cannot tear down: no live session",
            )),
        }
    }

    /// Force-reset to `NoDevice` regardless of current state.
    pub fn force_idle(&mut self) {
        *self = Self::NoDevice;
    }
}

// ── Status and counters ──────────────────────────────────────────

/// Externally visible session status, published through a watch
/// channel.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SessionStatus {
    #[default]
    Idle,
    Connecting,
    Connected,
    Error(String),
    Closed,
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Connecting => write!(f, "connecting"),
            Self::Connected => write!(f, "connected"),
            Self::Error(e) => write!(f, "error: {e}"),
            Self::Closed => write!(f, "closed"),
        }
    }
}

/// Debug counters for one session's inbound traffic.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionCounters {
    /// Inbound frames of any kind.
    pub frames: u64,
    /// Handshake frames swallowed.
    pub handshake_frames: u64,
    /// Device-message frames swallowed.
    pub device_messages: u64,
    /// Video units pushed to the decode sink.
    pub video_units: u64,
    /// Video payload bytes pushed to the decode sink.
    pub video_bytes: u64,
}

// ── SessionConfig ────────────────────────────────────────────────

/// Everything sessions share across a page: the API base, the token
/// accessor, and sink probing inputs. Cloned per slot.
#[derive(Clone)]
pub struct SessionConfig {
    /// HTTP(S) API base, converted to ws(s) for the stream endpoint.
    pub api_base: String,
    /// Bearer-token accessor, sampled once per connect.
    pub token_provider: TokenProvider,
    /// Decode-sink probe inputs.
    pub sink_options: SinkOptions,
    /// Enable first-frame hex dump and NAL-type statistics.
    pub debug_stats: bool,
}

impl SessionConfig {
    /// Config with an empty token and default sink probing.
    pub fn new(api_base: impl Into<String>) -> Self {
        Self {
            api_base: api_base.into(),
            token_provider: no_token(),
            sink_options: SinkOptions::default(),
            debug_stats: false,
        }
    }

    /// Set the token accessor.
    pub fn with_token_provider(mut self, provider: TokenProvider) -> Self {
        self.token_provider = provider;
        self
    }

    /// Set the sink probe inputs.
    pub fn with_sink_options(mut self, options: SinkOptions) -> Self {
        self.sink_options = options;
        self
    }

    /// Toggle debug statistics.
    pub fn with_debug_stats(mut self, enabled: bool) -> Self {
        self.debug_stats = enabled;
        self
    }
}

// ── StreamSession ────────────────────────────────────────────────

/// One rendering slot's mirroring session.
///
/// Owns its transport, demuxer, decode sink and rendering surface
/// exclusively. All state changes run on the task driving the
/// session; socket I/O tasks only feed the event channel.
pub struct StreamSession {
    config: SessionConfig,
    phase: SessionPhase,
    device_id: Option<String>,
    transport: Option<StreamTransport>,
    events: Option<TransportEvents>,
    sink: Option<VideoSink>,
    forwarder: Option<InteractionForwarder>,
    demux: FrameDemuxer,
    surface: RenderSurface,
    counters: SessionCounters,
    status_tx: watch::Sender<SessionStatus>,
    status_rx: watch::Receiver<SessionStatus>,
}

impl StreamSession {
    /// An idle session for one slot.
    pub fn new(config: SessionConfig) -> Self {
        let (status_tx, status_rx) = watch::channel(SessionStatus::Idle);
        Self {
            config,
            phase: SessionPhase::NoDevice,
            device_id: None,
            transport: None,
            events: None,
            sink: None,
            forwarder: None,
            demux: FrameDemuxer::new(false),
            surface: RenderSurface::new(),
            counters: SessionCounters::default(),
            status_tx,
            status_rx,
        }
    }

    /// Current lifecycle phase.
    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    /// Current status snapshot.
    pub fn status(&self) -> SessionStatus {
        self.status_rx.borrow().clone()
    }

    /// A receiver that observes every status change.
    pub fn status_receiver(&self) -> watch::Receiver<SessionStatus> {
        self.status_rx.clone()
    }

    /// The selected device, if any.
    pub fn device_id(&self) -> Option<&str> {
        self.device_id.as_deref()
    }

    /// Inbound traffic counters for the current selection.
    pub fn counters(&self) -> SessionCounters {
        self.counters
    }

    /// The slot's rendering surface.
    pub fn surface(&self) -> &RenderSurface {
        &self.surface
    }

    /// Select `udid` for this slot.
    ///
    /// A live session is first driven fully through teardown. The
    /// decode sink is probed before any socket is opened; an
    /// unsupported environment short-circuits without side effects.
    pub fn select_device(&mut self, udid: &str) -> Result<(), StreamError> {
        if self.phase.is_live() {
            self.teardown(SessionStatus::Closed);
        }

        let mut sink = match VideoSink::probe(udid, &self.config.sink_options) {
            Ok(sink) => sink,
            Err(e) => {
                self.set_status(SessionStatus::Error(e.to_string()));
                return Err(e);
            }
        };

        self.phase.begin_open()?;
        self.counters = SessionCounters::default();
        self.device_id = Some(udid.to_string());
        self.demux =
            FrameDemuxer::new(sink.wants_split_units()).with_debug_stats(self.config.debug_stats);

        sink.attach(&mut self.surface);
        if let Err(e) = sink.play() {
            self.sink = Some(sink);
            self.teardown(SessionStatus::Error(e.to_string()));
            return Err(e);
        }

        debug!(%udid, sink = sink.kind(), "session opening");
        let (transport, events) =
            StreamTransport::connect(&self.config.api_base, udid, &self.config.token_provider);

        self.sink = Some(sink);
        self.transport = Some(transport);
        self.events = Some(events);
        self.set_status(SessionStatus::Connecting);
        Ok(())
    }

    /// Deselect the slot's device, tearing the session down. No-op
    /// when idle.
    pub fn deselect(&mut self) {
        if self.phase.is_live() {
            self.teardown(SessionStatus::Closed);
        }
    }

    /// Wait for and handle the next socket event.
    ///
    /// Returns `false` once the session has no live transport (idle
    /// or torn down), at which point the caller stops driving it.
    pub async fn drive(&mut self) -> bool {
        let Some(events) = self.events.as_mut() else {
            return false;
        };
        match events.recv().await {
            Some(event) => {
                self.handle_event(event);
                true
            }
            None => false,
        }
    }

    /// Handle one socket event.
    ///
    /// Events for a torn-down session (late deliveries) are ignored.
    pub fn handle_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Opened => self.on_opened(),
            TransportEvent::Frame(data) => self.on_frame(data),
            TransportEvent::Error(message) => {
                if self.phase.is_live() {
                    warn!(device = ?self.device_id, "transport error: {message}");
                    self.teardown(SessionStatus::Error(message));
                }
            }
            TransportEvent::Closed => {
                if self.phase.is_live() {
                    self.teardown(SessionStatus::Closed);
                }
            }
        }
    }

    /// Forward a pointer event to the device. Dropped unless active.
    pub fn forward_pointer(&mut self, event: PointerEvent) {
        if let Some(forwarder) = self.forwarder.as_mut() {
            forwarder.forward_pointer(event);
        }
    }

    /// Forward a key event to the device. Dropped unless active.
    pub fn forward_key(&mut self, event: KeyPress) {
        if let Some(forwarder) = self.forwarder.as_mut() {
            forwarder.forward_key(event);
        }
    }

    fn on_opened(&mut self) {
        // The transition doubles as the late-event guard.
        if self.phase.complete_open().is_err() {
            return;
        }
        let (Some(transport), Some(sink)) = (self.transport.as_ref(), self.sink.as_mut()) else {
            return;
        };

        // The settings handshake goes out before any input event can.
        let settings = sink.preferred_settings();
        sink.apply_settings(&settings);
        transport.send(ControlMessage::SetVideoSettings(settings.clone()).encode());

        self.forwarder = Some(InteractionForwarder::attach(
            transport.sender(),
            settings.bounds_width.max(0) as u16,
            settings.bounds_height.max(0) as u16,
        ));

        debug!(device = ?self.device_id, "session active");
        self.set_status(SessionStatus::Connected);
    }

    fn on_frame(&mut self, data: Bytes) {
        if !self.phase.is_live() {
            return;
        }
        self.counters.frames += 1;

        match self.demux.demux(data) {
            DemuxedFrame::Handshake => self.counters.handshake_frames += 1,
            DemuxedFrame::DeviceMessage => self.counters.device_messages += 1,
            DemuxedFrame::Video(units) => {
                let Some(sink) = self.sink.as_mut() else {
                    return;
                };
                for unit in units {
                    self.counters.video_units += 1;
                    self.counters.video_bytes += unit.len() as u64;
                    sink.push_frame(unit.data);
                }
            }
        }
    }

    /// The unconditional teardown sequence: release the forwarder,
    /// close the transport, stop the sink, clear the surface.
    fn teardown(&mut self, final_status: SessionStatus) {
        if self.phase.begin_teardown().is_err() {
            return;
        }

        if let Some(mut forwarder) = self.forwarder.take() {
            forwarder.release();
        }
        if let Some(transport) = self.transport.take() {
            transport.close();
        }
        if let Some(mut sink) = self.sink.take() {
            sink.stop();
        }
        self.surface.clear();

        // Dropping the receiver makes any late socket message
        // unreachable; a new selection gets a fresh channel.
        self.events = None;
        self.device_id = None;

        self.phase.force_idle();
        self.set_status(final_status);
    }

    fn set_status(&mut self, status: SessionStatus) {
        let _ = self.status_tx.send(status);
    }
}

// ── Tests ────────────────────────────────────────────────────────
