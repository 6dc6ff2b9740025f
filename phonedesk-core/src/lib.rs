//! # phonedesk-core
//!
//! Client-side core of the phonedesk admin console's device-mirroring
//! feature.
//!
//! This crate contains:
//! - **Transport**: `StreamTransport` — one binary WebSocket per
//!   device session, with fire-and-forget connect/send/close
//! - **Demuxing**: `FrameDemuxer` — classifies inbound frames and
//!   slices video payloads into ordered NAL units
//! - **Control**: `ControlMessage` / `VideoSettings` — outbound
//!   instruction encoding for the device
//! - **Sinks**: `VideoSink` — probed decode/render backends behind
//!   the `DecodeSink` contract
//! - **Input**: `InteractionForwarder` — pointer/key pass-through
//! - **Session**: `StreamSession` — the per-slot lifecycle state
//!   machine tying it all together
//! - **Error**: `StreamError` — typed, `thiserror`-based hierarchy
//!
//! Login, device CRUD, permissions and REST calls live elsewhere in
//! the console; this crate only speaks the streaming protocol.

pub mod error;
pub mod stream;

// ── Re-exports for ergonomic usage ───────────────────────────────

pub use error::StreamError;
pub use stream::control::{ControlMessage, KeyMessage, TouchMessage, VideoSettings};
pub use stream::demux::{DemuxedFrame, FrameDemuxer, FrameKind, NalStats, NalType, NalUnit};
pub use stream::input::{InteractionForwarder, KeyAction, KeyPress, PointerAction, PointerEvent};
pub use stream::session::{
    SessionConfig, SessionCounters, SessionPhase, SessionStatus, StreamSession,
};
pub use stream::sink::{DecodeSink, PlayerSink, RenderSurface, SinkOptions, SpoolSink, VideoSink};
pub use stream::transport::{
    StreamTransport, TokenProvider, TransportEvent, TransportEvents, TransportSender, no_token,
};
