use ascii_reel::{open_source, Cli, FrameTiming, PlaybackScheduler};

use anyhow::{Context, Result};
use clap::Parser;
use log::{debug, error, info, warn};
use std::io;
use tokio::sync::watch;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // Parse command line arguments
    let cli = Cli::parse();

    // Initialize logging; RUST_LOG still takes precedence
    let default_filter = if cli.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter)).init();

    // Validate CLI arguments
    if let Err(e) = cli.validate() {
        error!("Invalid arguments: {}", e);
        std::process::exit(1);
    }

    let config = cli.playback_config().context("Invalid playback settings")?;
    debug!("Playback config: {:?}", config);

    info!("Starting ASCII Reel v{}", ascii_reel::VERSION);
    info!("Playing: {}", cli.file_path.display());

    // If info-only mode, open the source, print what we know and exit
    if cli.info {
        let source = open_source(&cli.file_path)?;
        let (width, height) = source.dimensions();
        let timing = FrameTiming::new(source.native_delay(), config.fps_cap);

        println!("Source Information:");
        println!("  File: {}", cli.file_path.display());
        println!("  Kind: {}", source.describe());
        println!("  Dimensions: {}x{}", width, height);
        println!("  Native delay: {:.1} ms", timing.native_delay().as_secs_f64() * 1000.0);
        println!("  Effective delay: {:.1} ms", timing.effective_delay().as_secs_f64() * 1000.0);
        if height > 0 {
            println!("  Aspect Ratio: {:.2}", width as f64 / height as f64);
        }
        return Ok(());
    }

    if !atty::is(atty::Stream::Stdout) {
        warn!("Standard output is not a terminal; frames will be written as raw text");
    }

    let mut scheduler = PlaybackScheduler::new(config, io::stdout())?;
    scheduler.open(&cli.file_path)?;
    scheduler.renderer_mut().init()?;

    let (cancel_tx, cancel_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Ctrl+C pressed, stopping playback");
            let _ = cancel_tx.send(true);
        }
    });

    let outcome = scheduler.run(cancel_rx).await;

    // Cleanup
    info!("Cleaning up and exiting");
    scheduler.renderer_mut().cleanup()?;

    let summary = outcome?;
    info!(
        "Playback finished. Frames: {}, skipped: {}, loops: {}",
        summary.frames_rendered, summary.frames_skipped, summary.loops
    );
    Ok(())
}
