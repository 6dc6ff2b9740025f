//! # Device mirroring stream pipeline
//!
//! Client-side plumbing for one live screen-mirroring session:
//!
//! ```text
//! ADMIN CONSOLE (this crate)                         DEVICE (server side)
//! ┌──────────────────────────────┐
//! │ StreamSession                │      WebSocket    ┌─────────────────┐
//! │   ├── StreamTransport ◄──────┼───────────────────┤ scrcpy endpoint │
//! │   ├── FrameDemuxer           │                   └─────────────────┘
//! │   │     ↓ NAL units          │
//! │   ├── VideoSink (probed)     │
//! │   └── InteractionForwarder ──┼───► ControlMessage wire format
//! └──────────────────────────────┘
//! ```
//!
//! ## Sub-modules
//!
//! | Module      | Purpose                                             |
//! |-------------|-----------------------------------------------------|
//! | `transport` | Binary WebSocket with ordered event delivery        |
//! | `demux`     | Frame classification and NAL-unit splitting         |
//! | `control`   | Outbound control-message encoding                   |
//! | `sink`      | Decode-sink contract, probing, rendering surface    |
//! | `input`     | Pointer/key capture forwarding                      |
//! | `session`   | Per-slot session state machine and orchestration    |

pub mod control;
pub mod demux;
pub mod input;
pub mod session;
pub mod sink;
pub mod transport;

// ── Re-exports ───────────────────────────────────────────────────

pub use control::{ControlMessage, KeyMessage, TouchMessage, VideoSettings};
pub use demux::{DemuxedFrame, FrameDemuxer, FrameKind, NalStats, NalType, NalUnit};
pub use input::{InteractionForwarder, KeyAction, KeyPress, PointerAction, PointerEvent};
pub use session::{SessionConfig, SessionCounters, SessionPhase, SessionStatus, StreamSession};
pub use sink::{DecodeSink, PlayerSink, RenderSurface, SinkOptions, SpoolSink, VideoSink};
pub use transport::{
    StreamTransport, TokenProvider, TransportEvent, TransportEvents, TransportSender, no_token,
};
