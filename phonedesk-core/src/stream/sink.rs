//! Decode/render sinks and the rendering surface they bind to.
//!
//! Decoding H.264 is delegated to an external backend; this module
//! owns only the contract ([`DecodeSink`]) and a closed set of two
//! backends chosen once per session by static capability probes:
//!
//! 1. [`PlayerSink`] — pipes the elementary stream into an external
//!    player process (`ffplay` by default). Probe: the player binary
//!    is on `PATH`. Consumes discrete NAL units.
//! 2. [`SpoolSink`] — spools the raw Annex-B stream to a file for
//!    external playback. Probe: the spool directory is writable.
//!    Consumes the stream unsplit.
//!
//! Neither probe opens a socket; an unsupported environment is
//! detected before any connection exists.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use bytes::Bytes;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::error::StreamError;
use crate::stream::control::VideoSettings;

// ── RenderSurface ────────────────────────────────────────────────

/// The mount point of one rendering slot.
///
/// Exclusively owned by the slot's session while it is active, and
/// left empty after teardown.
#[derive(Debug, Default)]
pub struct RenderSurface {
    attached: Option<String>,
}

impl RenderSurface {
    /// An empty surface.
    pub fn new() -> Self {
        Self::default()
    }

    /// Mount a sink, described by a human-readable label.
    pub fn attach(&mut self, description: impl Into<String>) {
        self.attached = Some(description.into());
    }

    /// Unmount whatever is attached.
    pub fn clear(&mut self) {
        self.attached = None;
    }

    /// Whether nothing is attached.
    pub fn is_empty(&self) -> bool {
        self.attached.is_none()
    }

    /// The label of the attached sink, if any.
    pub fn attached(&self) -> Option<&str> {
        self.attached.as_deref()
    }
}

// ── DecodeSink contract ──────────────────────────────────────────

/// Contract between the session orchestrator and a decode/render
/// backend. The orchestrator only ever talks to this interface.
pub trait DecodeSink {
    /// Bind the sink to the slot's rendering surface.
    fn attach(&mut self, surface: &mut RenderSurface);

    /// Start the backend. Called once, before any frame is pushed.
    fn play(&mut self) -> Result<(), StreamError>;

    /// Feed one video unit (or one whole frame when the backend does
    /// not want split units).
    fn push_frame(&mut self, data: Bytes);

    /// The settings this backend wants the device to encode with.
    fn preferred_settings(&self) -> VideoSettings;

    /// Record the settings actually in effect.
    fn apply_settings(&mut self, settings: &VideoSettings);

    /// Stop the backend and release its resources. Idempotent.
    fn stop(&mut self);

    /// Whether the backend consumes discrete NAL units rather than
    /// the contiguous stream.
    fn wants_split_units(&self) -> bool;
}

// ── PlayerSink ───────────────────────────────────────────────────

/// Primary backend: feeds the stream to an external player process
/// over stdin.
#[derive(Debug)]
pub struct PlayerSink {
    device_id: String,
    command: String,
    frame_tx: Option<mpsc::UnboundedSender<Bytes>>,
    child: Option<tokio::process::Child>,
    settings: VideoSettings,
}

impl PlayerSink {
    /// Whether `command` resolves to an executable on `PATH` (or is
    /// an explicit existing path).
    pub fn is_supported(command: &str) -> bool {
        if command.contains(std::path::MAIN_SEPARATOR) {
            return Path::new(command).is_file();
        }
        let Some(path) = std::env::var_os("PATH") else {
            return false;
        };
        std::env::split_paths(&path).any(|dir| dir.join(command).is_file())
    }

    /// Create a sink for `device_id` driving `command`.
    pub fn new(device_id: &str, command: &str) -> Self {
        Self {
            device_id: device_id.to_string(),
            command: command.to_string(),
            frame_tx: None,
            child: None,
            settings: VideoSettings::new()
                .with_bitrate(8_000_000)
                .with_max_fps(60)
                .with_bounds(1080, 1920),
        }
    }
}

impl DecodeSink for PlayerSink {
    fn attach(&mut self, surface: &mut RenderSurface) {
        surface.attach(format!("player:{}:{}", self.command, self.device_id));
    }

    fn play(&mut self) -> Result<(), StreamError> {
        let mut child = tokio::process::Command::new(&self.command)
            .args(["-hide_banner", "-loglevel", "error"])
            .args(["-window_title", self.device_id.as_str()])
            .args(["-i", "-"])
            .stdin(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| StreamError::Other("player process has no stdin".into()))?;

        let (frame_tx, mut frame_rx) = mpsc::unbounded_channel::<Bytes>();
        tokio::spawn(async move {
            while let Some(unit) = frame_rx.recv().await {
                if stdin.write_all(&unit).await.is_err() {
                    break;
                }
            }
            let _ = stdin.shutdown().await;
        });

        debug!(command = %self.command, "player sink started");
        self.frame_tx = Some(frame_tx);
        self.child = Some(child);
        Ok(())
    }

    fn push_frame(&mut self, data: Bytes) {
        if let Some(tx) = &self.frame_tx {
            let _ = tx.send(data);
        }
    }

    fn preferred_settings(&self) -> VideoSettings {
        self.settings.clone()
    }

    fn apply_settings(&mut self, settings: &VideoSettings) {
        self.settings = settings.clone();
    }

    fn stop(&mut self) {
        // Dropping the sender ends the feeder task, which closes the
        // player's stdin.
        self.frame_tx = None;
        if let Some(mut child) = self.child.take() {
            let _ = child.start_kill();
        }
    }

    fn wants_split_units(&self) -> bool {
        true
    }
}

// ── SpoolSink ────────────────────────────────────────────────────

/// Fallback backend: appends the raw Annex-B stream to a spool file.
#[derive(Debug)]
pub struct SpoolSink {
    path: PathBuf,
    file: Option<std::fs::File>,
    bytes_written: u64,
    write_failed: bool,
    settings: VideoSettings,
}

impl SpoolSink {
    /// Whether the spool directory exists or can be created.
    pub fn is_supported(dir: &Path) -> bool {
        std::fs::create_dir_all(dir).is_ok()
    }

    /// Create a sink spooling to `dir/{device_id}.h264`.
    pub fn new(device_id: &str, dir: &Path) -> Self {
        let file_stem: String = device_id
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
            .collect();
        Self {
            path: dir.join(format!("{file_stem}.h264")),
            file: None,
            bytes_written: 0,
            write_failed: false,
            settings: VideoSettings::new(),
        }
    }

    /// Where the stream is spooled.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Total payload bytes written so far.
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }
}

impl DecodeSink for SpoolSink {
    fn attach(&mut self, surface: &mut RenderSurface) {
        surface.attach(format!("spool:{}", self.path.display()));
    }

    fn play(&mut self) -> Result<(), StreamError> {
        let file = std::fs::File::create(&self.path)?;
        debug!(path = %self.path.display(), "spool sink started");
        self.file = Some(file);
        Ok(())
    }

    fn push_frame(&mut self, data: Bytes) {
        let Some(file) = self.file.as_mut() else {
            return;
        };
        match file.write_all(&data) {
            Ok(()) => self.bytes_written += data.len() as u64,
            Err(e) => {
                if !self.write_failed {
                    self.write_failed = true;
                    warn!(path = %self.path.display(), "spool write failed: {e}");
                }
            }
        }
    }

    fn preferred_settings(&self) -> VideoSettings {
        self.settings.clone()
    }

    fn apply_settings(&mut self, settings: &VideoSettings) {
        self.settings = settings.clone();
    }

    fn stop(&mut self) {
        self.file = None;
    }

    fn wants_split_units(&self) -> bool {
        false
    }
}

// ── Probing ──────────────────────────────────────────────────────

/// Probe inputs for sink selection.
#[derive(Debug, Clone)]
pub struct SinkOptions {
    /// External player command for the primary backend; `None`
    /// disables it.
    pub player_command: Option<String>,
    /// Spool directory for the fallback backend.
    pub spool_dir: PathBuf,
}

impl Default for SinkOptions {
    fn default() -> Self {
        Self {
            player_command: Some("ffplay".into()),
            spool_dir: std::env::temp_dir().join("phonedesk"),
        }
    }
}

/// The closed set of decode backends, chosen once per session.
#[derive(Debug)]
pub enum VideoSink {
    Player(PlayerSink),
    Spool(SpoolSink),
}

impl VideoSink {
    /// Probe backends in order (player, then spool) and construct the
    /// first supported one. No side effects beyond the probes
    /// themselves; in particular no socket is opened.
    pub fn probe(device_id: &str, options: &SinkOptions) -> Result<Self, StreamError> {
        if let Some(command) = &options.player_command {
            if PlayerSink::is_supported(command) {
                return Ok(Self::Player(PlayerSink::new(device_id, command)));
            }
        }
        if SpoolSink::is_supported(&options.spool_dir) {
            return Ok(Self::Spool(SpoolSink::new(device_id, &options.spool_dir)));
        }
        Err(StreamError::UnsupportedDecodeSink(
            "no external player on PATH and spool directory unavailable",
        ))
    }

    /// Short name of the selected backend.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Player(_) => "player",
            Self::Spool(_) => "spool",
        }
    }
}

impl DecodeSink for VideoSink {
    fn attach(&mut self, surface: &mut RenderSurface) {
        match self {
            Self::Player(s) => s.attach(surface),
            Self::Spool(s) => s.attach(surface),
        }
    }

    fn play(&mut self) -> Result<(), StreamError> {
        match self {
            Self::Player(s) => s.play(),
            Self::Spool(s) => s.play(),
        }
    }

    fn push_frame(&mut self, data: Bytes) {
        match self {
            Self::Player(s) => s.push_frame(data),
            Self::Spool(s) => s.push_frame(data),
        }
    }

    fn preferred_settings(&self) -> VideoSettings {
        match self {
            Self::Player(s) => s.preferred_settings(),
            Self::Spool(s) => s.preferred_settings(),
        }
    }

    fn apply_settings(&mut self, settings: &VideoSettings) {
        match self {
            Self::Player(s) => s.apply_settings(settings),
            Self::Spool(s) => s.apply_settings(settings),
        }
    }

    fn stop(&mut self) {
        match self {
            Self::Player(s) => s.stop(),
            Self::Spool(s) => s.stop(),
        }
    }

    fn wants_split_units(&self) -> bool {
        match self {
            Self::Player(s) => s.wants_split_units(),
            Self::Spool(s) => s.wants_split_units(),
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────
