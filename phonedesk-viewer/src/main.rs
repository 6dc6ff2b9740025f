//! phonedesk mirroring viewer — entry point.
//!
//! ```text
//! phonedesk-viewer <udid>                    Mirror a device with defaults
//! phonedesk-viewer <udid> --api-base <url>  Override the console API base
//! phonedesk-viewer --gen-config              Dump default config and exit
//! ```
//!
//! The viewer is one rendering slot of the admin console as a CLI:
//! it opens a single mirroring session against a device and drives it
//! until the server closes the stream or the operator hits Ctrl-C.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use phonedesk_core::{SessionConfig, SinkOptions, StreamSession, TokenProvider};

use phonedesk_viewer::config::ViewerConfig;

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "phonedesk-viewer", about = "phonedesk device mirroring viewer")]
struct Cli {
    /// Device udid to mirror.
    udid: Option<String>,

    /// Path to configuration TOML file.
    #[arg(short, long, default_value = "phonedesk-viewer.toml")]
    config: PathBuf,

    /// API base URL (overrides config). Example: http://desk.local:8080
    #[arg(short, long)]
    api_base: Option<String>,

    /// Bearer token (overrides config).
    #[arg(short, long)]
    token: Option<String>,

    /// External player command (overrides config; "none" disables).
    #[arg(long)]
    player: Option<String>,

    /// Spool directory for the fallback sink (overrides config).
    #[arg(long)]
    spool_dir: Option<PathBuf>,

    /// Log first-frame bytes and NAL-type statistics.
    #[arg(long)]
    debug_stats: bool,

    /// Print the default configuration to stdout and exit.
    #[arg(long)]
    gen_config: bool,
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if cli.gen_config {
        let text = toml::to_string_pretty(&ViewerConfig::default())?;
        println!("{text}");
        return Ok(());
    }

    let mut config = ViewerConfig::load(&cli.config);
    if let Some(base) = cli.api_base {
        config.api.base_url = base;
    }
    if let Some(token) = cli.token {
        config.api.token = token;
    }
    if let Some(player) = cli.player {
        config.sink.player = if player == "none" { String::new() } else { player };
    }
    if cli.debug_stats {
        config.stream.debug_stats = true;
    }

    // Init tracing.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("phonedesk-viewer v{}", env!("CARGO_PKG_VERSION"));

    let Some(udid) = cli.udid else {
        error!("no device udid given (see --help)");
        std::process::exit(2);
    };

    // ── 1. Build the session config ─────────────────────────────

    let token = config.api.token.clone();
    let token_provider: TokenProvider = Arc::new(move || token.clone());

    let spool_dir = cli
        .spool_dir
        .unwrap_or_else(|| config.spool_dir());
    let player_command = if config.sink.player.is_empty() {
        None
    } else {
        Some(config.sink.player.clone())
    };

    let session_config = SessionConfig::new(config.api.base_url.as_str())
        .with_token_provider(token_provider)
        .with_sink_options(SinkOptions {
            player_command,
            spool_dir,
        })
        .with_debug_stats(config.stream.debug_stats);

    // ── 2. Open the session ─────────────────────────────────────

    let mut session = StreamSession::new(session_config);
    if let Err(e) = session.select_device(&udid) {
        error!("cannot open session for {udid}: {e}");
        std::process::exit(1);
    }
    info!("mirroring {udid} via {}", config.api.base_url);

    // ── 3. Drive until the stream ends or Ctrl-C ────────────────

    let mut last_status = session.status();
    loop {
        tokio::select! {
            alive = session.drive() => {
                let status = session.status();
                if status != last_status {
                    info!("session status: {status}");
                    last_status = status;
                }
                if !alive {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted; closing session");
                session.deselect();
                break;
            }
        }
    }

    // ── 4. Report ───────────────────────────────────────────────

    let counters = session.counters();
    info!(
        "stream ended: {} frames in, {} video units ({} bytes) out to sink",
        counters.frames, counters.video_units, counters.video_bytes
    );

    Ok(())
}
