//! Pointer/key capture forwarding.
//!
//! Captured interaction events for a session's surface are translated
//! into the wire messages of `control` and written through the
//! transport's sender handle. The forwarder is created when a session
//! becomes active and released as the first step of teardown; a
//! released forwarder drops events silently, and the transport's
//! no-op-on-closed send makes even a misordered late event harmless.

use crate::stream::control::{ControlMessage, KeyMessage, TouchMessage};
use crate::stream::transport::TransportSender;

// ── Event vocabulary ─────────────────────────────────────────────

/// Pointer action, mapped to the device's motion-event actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerAction {
    Down,
    Up,
    Move,
}

impl PointerAction {
    fn to_wire(self) -> u8 {
        match self {
            Self::Down => 0,
            Self::Up => 1,
            Self::Move => 2,
        }
    }
}

/// Key action, mapped to the device's key-event actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAction {
    Down,
    Up,
}

impl KeyAction {
    fn to_wire(self) -> u8 {
        match self {
            Self::Down => 0,
            Self::Up => 1,
        }
    }
}

/// One captured pointer event, in surface coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PointerEvent {
    pub action: PointerAction,
    pub pointer_id: u64,
    pub x: u32,
    pub y: u32,
    /// Pressure in `0..=0xFFFF`; full pressure while touching.
    pub pressure: u16,
    /// Button bitmask (primary = 1).
    pub buttons: u32,
}

impl PointerEvent {
    /// A primary-button press at `(x, y)`.
    pub fn down(x: u32, y: u32) -> Self {
        Self {
            action: PointerAction::Down,
            pointer_id: 0,
            x,
            y,
            pressure: u16::MAX,
            buttons: 1,
        }
    }

    /// A primary-button release at `(x, y)`.
    pub fn up(x: u32, y: u32) -> Self {
        Self {
            action: PointerAction::Up,
            pointer_id: 0,
            x,
            y,
            pressure: 0,
            buttons: 1,
        }
    }

    /// A drag to `(x, y)`.
    pub fn moved(x: u32, y: u32) -> Self {
        Self {
            action: PointerAction::Move,
            pointer_id: 0,
            x,
            y,
            pressure: u16::MAX,
            buttons: 1,
        }
    }
}

/// One captured key event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyPress {
    pub action: KeyAction,
    pub keycode: u32,
    pub repeat: u32,
    pub meta_state: u32,
}

// ── InteractionForwarder ─────────────────────────────────────────

/// Forwards captured interaction events to the device.
///
/// Stamps each touch event with the mirrored screen size so the
/// device can map surface coordinates back to its own.
pub struct InteractionForwarder {
    sender: TransportSender,
    screen_width: u16,
    screen_height: u16,
    released: bool,
    forwarded: u64,
}

impl InteractionForwarder {
    /// Attach capture for a surface mirroring a `width`×`height`
    /// screen.
    pub fn attach(sender: TransportSender, width: u16, height: u16) -> Self {
        Self {
            sender,
            screen_width: width,
            screen_height: height,
            released: false,
            forwarded: 0,
        }
    }

    /// Forward one pointer event.
    pub fn forward_pointer(&mut self, event: PointerEvent) {
        if self.released {
            return;
        }
        let message = ControlMessage::Touch(TouchMessage {
            action: event.action.to_wire(),
            pointer_id: event.pointer_id,
            x: event.x,
            y: event.y,
            screen_width: self.screen_width,
            screen_height: self.screen_height,
            pressure: event.pressure,
            buttons: event.buttons,
        });
        self.sender.send(message.encode());
        self.forwarded += 1;
    }

    /// Forward one key event.
    pub fn forward_key(&mut self, event: KeyPress) {
        if self.released {
            return;
        }
        let message = ControlMessage::Key(KeyMessage {
            action: event.action.to_wire(),
            keycode: event.keycode,
            repeat: event.repeat,
            meta_state: event.meta_state,
        });
        self.sender.send(message.encode());
        self.forwarded += 1;
    }

    /// Detach capture. Called before the transport closes during
    /// teardown; all later events are dropped.
    pub fn release(&mut self) {
        self.released = true;
    }

    /// Whether the forwarder has been released.
    pub fn is_released(&self) -> bool {
        self.released
    }

    /// Number of events forwarded since attach.
    pub fn forwarded(&self) -> u64 {
        self.forwarded
    }
}

// ── Tests ────────────────────────────────────────────────────────
