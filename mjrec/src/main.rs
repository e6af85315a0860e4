//! mjrec: entry point.
//!
//! ```text
//! mjrec                          Record with mjrec.toml or defaults
//! mjrec --config <path>          Load a custom config TOML
//! mjrec --gen-config             Write default config to stdout
//! mjrec --init-config            Write default config to the --config path
//! mjrec --duration-secs 30       Override the recording length
//! mjrec --output <dir>           Override the output directory
//! mjrec --pause-after-secs 5     Pause part-way through, then resume
//! ```

use std::path::PathBuf;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use mjrec::config::MjrecConfig;
use mjrec::session::RecordingSession;

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "mjrec", about = "Bitrate-bounded still-image recorder")]
struct Cli {
    /// Path to configuration TOML file.
    #[arg(short, long, default_value = "mjrec.toml")]
    config: PathBuf,

    /// Print the default configuration to stdout and exit.
    #[arg(long)]
    gen_config: bool,

    /// Write the default configuration to the --config path and exit.
    #[arg(long, conflicts_with = "gen_config")]
    init_config: bool,

    /// Recording length in seconds (0 = until Ctrl-C).
    #[arg(long)]
    duration_secs: Option<u64>,

    /// Directory receiving frames and the manifest.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Pause this many seconds after starting.
    #[arg(long)]
    pause_after_secs: Option<u64>,
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // --gen-config: dump defaults and exit.
    if cli.gen_config {
        println!("{}", MjrecConfig::default_toml()?);
        return Ok(());
    }
    if cli.init_config {
        MjrecConfig::write_default(&cli.config)?;
        println!("wrote {}", cli.config.display());
        return Ok(());
    }

    // Load config, then apply command-line overrides.
    let mut config = MjrecConfig::load(&cli.config);
    if let Some(secs) = cli.duration_secs {
        config.output.duration_secs = secs;
    }
    if let Some(dir) = cli.output {
        config.output.directory = dir;
    }
    if let Some(secs) = cli.pause_after_secs {
        config.output.pause_after_secs = secs;
    }

    // Init tracing.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("mjrec v{}", env!("CARGO_PKG_VERSION"));
    info!("output: {}", config.output.directory.display());
    info!("format: {}", config.recorder.mime_type);
    info!("target: {} bit/s", config.recorder.bits_per_second);
    info!(
        "source: {}x{} @ {} fps",
        config.source.width, config.source.height, config.source.fps
    );

    let session = RecordingSession::new(config);
    let stop = session.stop_handle();

    // Ctrl-C handler.
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Ctrl-C received, stopping");
        stop.store(false, std::sync::atomic::Ordering::SeqCst);
    });

    let summary = session.run().await?;
    info!(
        "{} frames, {} bytes written ({} suppressed)",
        summary.frames, summary.bytes, summary.suppressed
    );

    Ok(())
}
