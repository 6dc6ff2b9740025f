//! Outbound control-message encoding.
//!
//! The wire layout is a fixed contract with the mirroring server and
//! is not interpreted by this crate beyond serialization. All fields
//! are big-endian.
//!
//! ## Wire format
//!
//! **Video settings** (28 bytes):
//! ```text
//! type:            u8   (1)  = 101
//! bitrate:         i32  (4)
//! max_fps:         i32  (4)
//! i_frame_interval:i8   (1)
//! bounds_width:    i16  (2)
//! bounds_height:   i16  (2)
//! crop l/t/r/b:    i16  (8)
//! send_frame_meta: u8   (1)
//! locked_orientation: i8 (1)
//! display_id:      i32  (4)
//! ```
//!
//! **Touch** (28 bytes):
//! ```text
//! type:          u8   (1)  = 2
//! action:        u8   (1)
//! pointer_id:    u64  (8)
//! x:             u32  (4)
//! y:             u32  (4)
//! screen_width:  u16  (2)
//! screen_height: u16  (2)
//! pressure:      u16  (2)
//! buttons:       u32  (4)
//! ```
//!
//! **Key** (14 bytes):
//! ```text
//! type:       u8   (1)  = 0
//! action:     u8   (1)
//! keycode:    u32  (4)
//! repeat:     u32  (4)
//! meta_state: u32  (4)
//! ```

use bytes::{BufMut, Bytes, BytesMut};

// ── Message type ids ─────────────────────────────────────────────

/// Type id of a key-event message.
pub const TYPE_KEYCODE: u8 = 0;

/// Type id of a touch-event message.
pub const TYPE_TOUCH: u8 = 2;

/// Type id of the video-settings message.
pub const TYPE_SET_VIDEO_SETTINGS: u8 = 101;

/// Encoded size of a video-settings message.
pub const SET_VIDEO_SETTINGS_LEN: usize = 28;

/// Encoded size of a touch message.
pub const TOUCH_LEN: usize = 28;

/// Encoded size of a key message.
pub const KEY_LEN: usize = 14;

// ── VideoSettings ────────────────────────────────────────────────

/// Encoder parameters negotiated by the decode sink.
///
/// The core transports these to the device; it never interprets the
/// individual fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoSettings {
    /// Target bitrate in bits per second.
    pub bitrate: i32,
    /// Maximum frames per second (0 = unlimited).
    pub max_fps: i32,
    /// Key-frame interval in seconds.
    pub i_frame_interval: i8,
    /// Target bounds width in pixels (0 = device native).
    pub bounds_width: i16,
    /// Target bounds height in pixels (0 = device native).
    pub bounds_height: i16,
    /// Crop rectangle, all zero when uncropped.
    pub crop_left: i16,
    pub crop_top: i16,
    pub crop_right: i16,
    pub crop_bottom: i16,
    /// Whether the device prepends per-frame metadata.
    pub send_frame_meta: bool,
    /// Locked video orientation (-1 = unlocked).
    pub locked_orientation: i8,
    /// Display to mirror (0 = default display).
    pub display_id: i32,
}

impl Default for VideoSettings {
    fn default() -> Self {
        Self {
            bitrate: 4_000_000,
            max_fps: 30,
            i_frame_interval: 10,
            bounds_width: 720,
            bounds_height: 1280,
            crop_left: 0,
            crop_top: 0,
            crop_right: 0,
            crop_bottom: 0,
            send_frame_meta: false,
            locked_orientation: -1,
            display_id: 0,
        }
    }
}

impl VideoSettings {
    /// Create settings with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the target bitrate.
    pub fn with_bitrate(mut self, bitrate: i32) -> Self {
        self.bitrate = bitrate;
        self
    }

    /// Set the frame-rate cap.
    pub fn with_max_fps(mut self, max_fps: i32) -> Self {
        self.max_fps = max_fps;
        self
    }

    /// Set the key-frame interval.
    pub fn with_i_frame_interval(mut self, interval: i8) -> Self {
        self.i_frame_interval = interval;
        self
    }

    /// Set the target bounds.
    pub fn with_bounds(mut self, width: i16, height: i16) -> Self {
        self.bounds_width = width;
        self.bounds_height = height;
        self
    }
}

// ── Input payloads ───────────────────────────────────────────────

/// A touch-event message, pass-through payload built by the
/// interaction forwarder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TouchMessage {
    pub action: u8,
    pub pointer_id: u64,
    pub x: u32,
    pub y: u32,
    pub screen_width: u16,
    pub screen_height: u16,
    pub pressure: u16,
    pub buttons: u32,
}

/// A key-event message, pass-through payload built by the interaction
/// forwarder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyMessage {
    pub action: u8,
    pub keycode: u32,
    pub repeat: u32,
    pub meta_state: u32,
}

// ── ControlMessage ───────────────────────────────────────────────

/// One outbound instruction for the device.
///
/// One `encode` call maps to exactly one transport send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlMessage {
    /// The video-settings handshake. Must be the first control
    /// message sent on a session.
    SetVideoSettings(VideoSettings),
    /// Touch event pass-through.
    Touch(TouchMessage),
    /// Key event pass-through.
    Key(KeyMessage),
}

impl ControlMessage {
    /// Serialize to the server's wire layout.
    pub fn encode(&self) -> Bytes {
        match self {
            Self::SetVideoSettings(s) => {
                let mut buf = BytesMut::with_capacity(SET_VIDEO_SETTINGS_LEN);
                buf.put_u8(TYPE_SET_VIDEO_SETTINGS);
                buf.put_i32(s.bitrate);
                buf.put_i32(s.max_fps);
                buf.put_i8(s.i_frame_interval);
                buf.put_i16(s.bounds_width);
                buf.put_i16(s.bounds_height);
                buf.put_i16(s.crop_left);
                buf.put_i16(s.crop_top);
                buf.put_i16(s.crop_right);
                buf.put_i16(s.crop_bottom);
                buf.put_u8(s.send_frame_meta as u8);
                buf.put_i8(s.locked_orientation);
                buf.put_i32(s.display_id);
                buf.freeze()
            }
            Self::Touch(t) => {
                let mut buf = BytesMut::with_capacity(TOUCH_LEN);
                buf.put_u8(TYPE_TOUCH);
                buf.put_u8(t.action);
                buf.put_u64(t.pointer_id);
                buf.put_u32(t.x);
                buf.put_u32(t.y);
                buf.put_u16(t.screen_width);
                buf.put_u16(t.screen_height);
                buf.put_u16(t.pressure);
                buf.put_u32(t.buttons);
                buf.freeze()
            }
            Self::Key(k) => {
                let mut buf = BytesMut::with_capacity(KEY_LEN);
                buf.put_u8(TYPE_KEYCODE);
                buf.put_u8(k.action);
                buf.put_u32(k.keycode);
                buf.put_u32(k.repeat);
                buf.put_u32(k.meta_state);
                buf.freeze()
            }
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────
