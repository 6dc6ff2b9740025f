//! Inbound frame classification and NAL-unit demuxing.
//!
//! The mirroring server multiplexes three kinds of binary frames onto
//! one socket and tags the non-video ones with a fixed magic prefix:
//!
//! ```text
//! "scrcpy_initial" …   handshake      → consumed here, nothing emitted
//! "scrcpy_message" …   device message → consumed here, nothing emitted
//! anything else        video payload  → normalized, optionally split
//! ```
//!
//! Video payloads are Annex-B H.264. Some producers prepend a
//! fixed-size frame-metadata header, so normalization looks for the
//! first start code (`00 00 01` / `00 00 00 01`) at offset 0, then at
//! offset 12, then anywhere in the first 64 bytes. A buffer with no
//! locatable start code is forwarded unchanged — decode artifacts are
//! preferable to silently dropped frames.

use bytes::Bytes;
use tracing::debug;

// ── Protocol constants ───────────────────────────────────────────

/// Magic prefix of the initial handshake frame.
pub const HANDSHAKE_MAGIC: &[u8] = b"scrcpy_initial";

/// Magic prefix of device-message frames.
pub const DEVICE_MESSAGE_MAGIC: &[u8] = b"scrcpy_message";

/// Length of the optional frame-metadata prefix some producers prepend.
const FRAME_META_LEN: usize = 12;

/// How far into a buffer the fallback start-code scan looks.
const SCAN_WINDOW: usize = 64;

/// Number of NAL units sampled for the debug statistics tally.
const STATS_UNIT_LIMIT: u32 = 60;

// ── Classification ───────────────────────────────────────────────

/// The protocol-level kind of one inbound frame.
///
/// Classification is total and mutually exclusive: every buffer gets
/// exactly one tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    /// Initial handshake control frame. Carries no video.
    Handshake,
    /// Device-originated message frame. Payload is ignored.
    DeviceMessage,
    /// H.264 video payload.
    Video,
}

/// The result of demuxing one inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DemuxedFrame {
    /// Handshake frame — swallowed, no video emitted.
    Handshake,
    /// Device message — swallowed, payload deliberately unparsed.
    DeviceMessage,
    /// Video payload, split into one or more NAL units.
    Video(Vec<NalUnit>),
}

// ── NAL units ────────────────────────────────────────────────────

/// H.264 NAL-unit type, from the low 5 bits of the byte after the
/// start code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NalType {
    /// Sequence parameter set (type 7).
    Sps,
    /// Picture parameter set (type 8).
    Pps,
    /// IDR slice (type 5).
    Idr,
    /// Any other NAL-unit type.
    Other(u8),
}

impl NalType {
    fn from_raw(value: u8) -> Self {
        match value {
            7 => Self::Sps,
            8 => Self::Pps,
            5 => Self::Idr,
            other => Self::Other(other),
        }
    }
}

/// A zero-copy view of one NAL unit within a normalized video buffer,
/// including its leading start code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NalUnit {
    /// The unit's bytes, shared with the parent buffer.
    pub data: Bytes,
}

impl NalUnit {
    /// The unit's NAL type, if the unit begins with a start code and
    /// is long enough to carry a type byte.
    pub fn nal_type(&self) -> Option<NalType> {
        let d = &self.data;
        if d.len() < 5 || !start_code_at(d, 0) {
            return None;
        }
        let header = if d[2] == 0x01 { d[3] } else { d[4] };
        Some(NalType::from_raw(header & 0x1f))
    }

    /// Length of the unit in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the unit is empty.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Returns `true` when an Annex-B start code begins at `index`.
///
/// Never reads past the end of `data`.
fn start_code_at(data: &[u8], index: usize) -> bool {
    if index + 3 >= data.len() {
        return false;
    }
    if data[index] != 0x00 || data[index + 1] != 0x00 {
        return false;
    }
    data[index + 2] == 0x01 || (data[index + 2] == 0x00 && data[index + 3] == 0x01)
}

// ── Debug statistics ─────────────────────────────────────────────

/// Tally of NAL types over the first [`STATS_UNIT_LIMIT`] units.
/// Observational only — not part of the demuxing contract.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NalStats {
    pub sps: u32,
    pub pps: u32,
    pub idr: u32,
    pub other: u32,
}

// ── FrameDemuxer ─────────────────────────────────────────────────

/// Classifies inbound frames and slices video payloads into NAL units.
///
/// One demuxer instance belongs to one session and is replaced on
/// every device selection. Units are produced synchronously in
/// arrival order; nothing is buffered across frames.
#[derive(Debug)]
pub struct FrameDemuxer {
    split_units: bool,
    debug_stats: bool,
    logged_first_frame: bool,
    stats: NalStats,
    stat_units: u32,
}

impl FrameDemuxer {
    /// Create a demuxer. `split_units` controls whether video buffers
    /// are split at start-code boundaries or emitted whole.
    pub fn new(split_units: bool) -> Self {
        Self {
            split_units,
            debug_stats: false,
            logged_first_frame: false,
            stats: NalStats::default(),
            stat_units: 0,
        }
    }

    /// Enable the first-frame hex dump and NAL-type tally.
    pub fn with_debug_stats(mut self, enabled: bool) -> Self {
        self.debug_stats = enabled;
        self
    }

    /// Whether video buffers are split into individual NAL units.
    pub fn splits_units(&self) -> bool {
        self.split_units
    }

    /// The NAL-type tally gathered so far (all zero unless debug
    /// statistics are enabled).
    pub fn stats(&self) -> NalStats {
        self.stats
    }

    /// Classify one inbound buffer without consuming it.
    pub fn classify(data: &[u8]) -> FrameKind {
        if data.len() >= HANDSHAKE_MAGIC.len() && &data[..HANDSHAKE_MAGIC.len()] == HANDSHAKE_MAGIC
        {
            return FrameKind::Handshake;
        }
        if data.len() >= DEVICE_MESSAGE_MAGIC.len()
            && &data[..DEVICE_MESSAGE_MAGIC.len()] == DEVICE_MESSAGE_MAGIC
        {
            return FrameKind::DeviceMessage;
        }
        FrameKind::Video
    }

    /// Locate the start of the Annex-B data in a video buffer.
    ///
    /// Checks offset 0, then offset 12 (optional frame-metadata
    /// prefix), then scans offsets `1..min(len-3, 64)`. Falls back to
    /// the unmodified buffer when nothing matches.
    pub fn normalize(data: Bytes) -> Bytes {
        if start_code_at(&data, 0) {
            return data;
        }
        if data.len() > FRAME_META_LEN && start_code_at(&data, FRAME_META_LEN) {
            return data.slice(FRAME_META_LEN..);
        }
        let limit = data.len().saturating_sub(3).min(SCAN_WINDOW);
        for i in 1..limit {
            if start_code_at(&data, i) {
                return data.slice(i..);
            }
        }
        data
    }

    /// Split a normalized buffer at start-code boundaries.
    ///
    /// Zero or one start code yields the whole buffer as a single
    /// unit. Otherwise each unit spans from its start code to the next
    /// one (the last unit runs to end-of-buffer), and concatenating
    /// all units reconstructs the input exactly.
    pub fn split(data: &Bytes) -> Vec<NalUnit> {
        let mut starts: Vec<usize> = Vec::new();
        let mut i = 0;
        while i + 3 < data.len() {
            if start_code_at(data, i) {
                starts.push(i);
                i += if data[i + 2] == 0x01 { 3 } else { 4 };
            } else {
                i += 1;
            }
        }

        if starts.len() <= 1 {
            return vec![NalUnit { data: data.clone() }];
        }

        // A normalized buffer starts at a start code, but the
        // best-effort fallback can hand us one that does not; anchor
        // the first unit at 0 so no leading bytes are lost.
        if starts[0] != 0 {
            starts.insert(0, 0);
        }

        let mut units = Vec::with_capacity(starts.len());
        for (idx, &start) in starts.iter().enumerate() {
            let end = starts.get(idx + 1).copied().unwrap_or(data.len());
            units.push(NalUnit {
                data: data.slice(start..end),
            });
        }
        units
    }

    /// Classify and demux one inbound buffer.
    ///
    /// Control frames are swallowed; video frames come back as an
    /// ordered list of NAL units (a single whole-buffer unit when
    /// splitting is disabled).
    pub fn demux(&mut self, raw: Bytes) -> DemuxedFrame {
        match Self::classify(&raw) {
            FrameKind::Handshake => DemuxedFrame::Handshake,
            FrameKind::DeviceMessage => DemuxedFrame::DeviceMessage,
            FrameKind::Video => {
                let normalized = Self::normalize(raw.clone());

                if self.debug_stats && !self.logged_first_frame {
                    self.logged_first_frame = true;
                    debug!(
                        raw = %hex_prefix(&raw),
                        normalized = %hex_prefix(&normalized),
                        "first video frame"
                    );
                }

                let units = if self.split_units {
                    Self::split(&normalized)
                } else {
                    vec![NalUnit { data: normalized }]
                };

                if self.debug_stats {
                    self.tally(&units);
                }

                DemuxedFrame::Video(units)
            }
        }
    }

    fn tally(&mut self, units: &[NalUnit]) {
        for unit in units {
            if self.stat_units >= STATS_UNIT_LIMIT {
                return;
            }
            let Some(nal_type) = unit.nal_type() else {
                continue;
            };
            match nal_type {
                NalType::Sps => self.stats.sps += 1,
                NalType::Pps => self.stats.pps += 1,
                NalType::Idr => self.stats.idr += 1,
                NalType::Other(_) => self.stats.other += 1,
            }
            self.stat_units += 1;
            if self.stat_units == STATS_UNIT_LIMIT {
                debug!(stats = ?self.stats, "first {} NAL units", STATS_UNIT_LIMIT);
            }
        }
    }
}

/// Hex dump of the first 16 bytes of a buffer.
fn hex_prefix(data: &[u8]) -> String {
    data.iter()
        .take(16)
        .map(|b| format!("{b:02x}"))
        .collect::<Vec<_>>()
        .join(" ")
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn video_buffer(segments: &[&[u8]]) -> Bytes {
        let mut out = Vec::new();
        for s in segments {
            out.extend_from_slice(s);
        }
        Bytes::from(out)
    }

    #[test]
    fn handshake_magic_classifies_handshake() {
        let mut demux = FrameDemuxer::new(true);
        let mut frame = HANDSHAKE_MAGIC.to_vec();
        frame.extend_from_slice(&[0x01, 0x02, 0x03]);
        assert_eq!(demux.demux(Bytes::from(frame)), DemuxedFrame::Handshake);
    }

    #[test]
    fn exact_device_message_magic_emits_no_units() {
        let mut demux = FrameDemuxer::new(true);
        let frame = Bytes::from_static(DEVICE_MESSAGE_MAGIC);
        assert_eq!(demux.demux(frame), DemuxedFrame::DeviceMessage);
    }

    #[test]
    fn short_buffer_classifies_video() {
        // Too short to carry either magic prefix.
        assert_eq!(FrameKind::Video, FrameDemuxer::classify(b"scrcpy"));
    }

    #[test]
    fn start_code_at_offset_zero_passes_through() {
        let buf = video_buffer(&[&[0x00, 0x00, 0x00, 0x01, 0x67], &[0xAA; 20]]);
        assert_eq!(FrameDemuxer::normalize(buf.clone()), buf);
    }

    #[test]
    fn frame_meta_prefix_stripped_at_offset_12() {
        // 12 bytes of metadata (no start code), then Annex-B data.
        let buf = video_buffer(&[&[0xFF; 12], &[0x00, 0x00, 0x01, 0x65], &[0xBB; 30]]);
        let normalized = FrameDemuxer::normalize(buf.clone());
        assert_eq!(normalized, buf.slice(12..));
    }

    #[test]
    fn scan_window_finds_interior_start_code() {
        let buf = video_buffer(&[&[0xFF; 5], &[0x00, 0x00, 0x00, 0x01, 0x41], &[0xCC; 10]]);
        let normalized = FrameDemuxer::normalize(buf.clone());
        assert_eq!(normalized, buf.slice(5..));
    }

    #[test]
    fn no_start_code_passes_through_unchanged() {
        // 80 bytes of 0xFF — nothing to find in the 64-byte window.
        let buf = Bytes::from(vec![0xFF; 80]);
        assert_eq!(FrameDemuxer::normalize(buf.clone()), buf);
    }

    #[test]
    fn single_start_code_yields_single_unit() {
        let buf = video_buffer(&[&[0x00, 0x00, 0x00, 0x01, 0x65], &[0xDD; 40]]);
        let units = FrameDemuxer::split(&buf);
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].data, buf);
    }

    #[test]
    fn three_start_codes_split_at_expected_offsets() {
        // 200-byte buffer with start codes at 0, 50 and 120.
        let mut raw = vec![0xEE; 200];
        for offset in [0usize, 50, 120] {
            raw[offset..offset + 4].copy_from_slice(&[0x00, 0x00, 0x00, 0x01]);
        }
        let buf = Bytes::from(raw);
        let units = FrameDemuxer::split(&buf);
        assert_eq!(units.len(), 3);
        assert_eq!(units[0].data, buf.slice(0..50));
        assert_eq!(units[1].data, buf.slice(50..120));
        assert_eq!(units[2].data, buf.slice(120..200));
    }

    #[test]
    fn concatenated_units_reconstruct_buffer() {
        let buf = video_buffer(&[
            &[0x00, 0x00, 0x00, 0x01, 0x67],
            &[0x11; 9],
            &[0x00, 0x00, 0x01, 0x68],
            &[0x22; 5],
            &[0x00, 0x00, 0x00, 0x01, 0x65],
            &[0x33; 60],
        ]);
        let units = FrameDemuxer::split(&buf);
        assert_eq!(units.len(), 3);

        let mut rebuilt = Vec::new();
        for unit in &units {
            rebuilt.extend_from_slice(&unit.data);
        }
        assert_eq!(Bytes::from(rebuilt), buf);
    }

    #[test]
    fn nal_types_follow_start_codes() {
        // 00 00 00 01 67 …  00 00 01 68 …  → SPS then PPS.
        let buf = video_buffer(&[
            &[0x00, 0x00, 0x00, 0x01, 0x67],
            &[0x44; 6],
            &[0x00, 0x00, 0x01, 0x68],
            &[0x55; 6],
        ]);
        let units = FrameDemuxer::split(&buf);
        assert_eq!(units.len(), 2);
        assert_eq!(units[0].nal_type(), Some(NalType::Sps));
        assert_eq!(units[1].nal_type(), Some(NalType::Pps));
    }

    #[test]
    fn split_disabled_emits_whole_buffer() {
        let mut demux = FrameDemuxer::new(false);
        let buf = video_buffer(&[
            &[0x00, 0x00, 0x00, 0x01, 0x67],
            &[0x66; 4],
            &[0x00, 0x00, 0x01, 0x65],
            &[0x77; 4],
        ]);
        match demux.demux(buf.clone()) {
            DemuxedFrame::Video(units) => {
                assert_eq!(units.len(), 1);
                assert_eq!(units[0].data, buf);
            }
            other => panic!("expected video, got {other:?}"),
        }
    }

    #[test]
    fn fallback_buffer_without_start_code_survives_demux() {
        let mut demux = FrameDemuxer::new(true);
        let buf = Bytes::from(vec![0x99; 70]);
        match demux.demux(buf.clone()) {
            DemuxedFrame::Video(units) => {
                assert_eq!(units.len(), 1);
                assert_eq!(units[0].data, buf);
                assert_eq!(units[0].nal_type(), None);
            }
            other => panic!("expected video, got {other:?}"),
        }
    }

    #[test]
    fn debug_stats_tally_nal_types() {
        let mut demux = FrameDemuxer::new(true).with_debug_stats(true);
        let buf = video_buffer(&[
            &[0x00, 0x00, 0x00, 0x01, 0x67],
            &[0x01; 4],
            &[0x00, 0x00, 0x01, 0x68],
            &[0x02; 4],
            &[0x00, 0x00, 0x01, 0x65],
            &[0x03; 4],
            &[0x00, 0x00, 0x01, 0x41],
            &[0x04; 4],
        ]);
        demux.demux(buf);
        let stats = demux.stats();
        assert_eq!(stats.sps, 1);
        assert_eq!(stats.pps, 1);
        assert_eq!(stats.idr, 1);
        assert_eq!(stats.other, 1);
    }

    #[test]
    fn stats_disabled_by_default() {
        let mut demux = FrameDemuxer::new(true);
        let buf = video_buffer(&[&[0x00, 0x00, 0x00, 0x01, 0x67], &[0x08; 4]]);
        demux.demux(buf);
        assert_eq!(demux.stats(), NalStats::default());
    }
}
