//! framecast stream client — entry point.
//!
//! ```text
//! framecast-client                   Run with framecast-client.toml (or defaults)
//! framecast-client --config <path>   Load a custom config TOML
//! framecast-client --frames <n>      Stop after n frames (0 = run until Ctrl-C)
//! framecast-client --gen-config      Write default config to stdout
//! ```
//!
//! Headless driver for the split-rendering session: per frame it samples
//! the scripted pose, asks the controller for the tile layout, runs the
//! start / await / stop cycle against the frame budget, and reports what
//! landed. A real display layer would replace [`LogSink`] with a texture
//! upload.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use clap::Parser;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use framecast_core::config::{frame_budget, ALL_STREAM_BITMASK, NUM_STREAMS};
use framecast_core::{
    client::present::window_title, FpsWindow, FrameView, PresentationSink, Session, SessionConfig,
    ThroughputEstimator, TileController,
};
use framecast_client::config::ClientConfig;
use framecast_client::pose::PoseSource;

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "framecast-client", about = "framecast stream client")]
struct Cli {
    /// Path to configuration TOML file.
    #[arg(short, long, default_value = "framecast-client.toml")]
    config: PathBuf,

    /// Stop after this many frames (0 = run until Ctrl-C).
    #[arg(long, default_value_t = 0)]
    frames: u64,

    /// Print the default configuration to stdout and exit.
    #[arg(long)]
    gen_config: bool,
}

// ── LogSink ──────────────────────────────────────────────────────

/// Presentation sink that narrates frames instead of drawing them.
struct LogSink {
    name: String,
}

impl PresentationSink for LogSink {
    fn present(&mut self, frame: &FrameView<'_>) {
        if frame.active_mask != ALL_STREAM_BITMASK {
            warn!(
                active = format!("{:0width$b}", frame.active_mask, width = NUM_STREAMS),
                "degraded frame: stale tiles on screen"
            );
        }
        debug!(
            title = window_title(&self.name, frame.fps),
            slice_masks = ?frame.slice_masks,
            "presented"
        );
    }
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if cli.gen_config {
        let text = toml::to_string_pretty(&ClientConfig::default())?;
        println!("{text}");
        return Ok(());
    }

    let config = ClientConfig::load(&cli.config);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("framecast-client v{}", env!("CARGO_PKG_VERSION"));
    let servers = config.server_table().map_err(std::io::Error::other)?;
    for (i, addr) in servers.iter().enumerate() {
        info!("stream {i}: {addr}");
    }

    let session = Session::new(SessionConfig::new(servers)).await?;

    let running = Arc::new(AtomicBool::new(true));
    let running_ctrlc = Arc::clone(&running);
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Ctrl-C received — shutting down");
        running_ctrlc.store(false, Ordering::SeqCst);
    });

    let mut controller = TileController::new();
    let mut pose_source = PoseSource::new();
    let mut fps = FpsWindow::new();
    let mut throughput = ThroughputEstimator::new();
    let mut sink = LogSink {
        name: config.display.name.clone(),
    };
    let budget = frame_budget();
    let mut frame_count: u64 = 0;

    while running.load(Ordering::SeqCst) {
        if cli.frames > 0 && frame_count >= cli.frames {
            break;
        }

        let frame_start = Instant::now();
        let deadline = frame_start + budget;

        let pose = pose_source.next();
        let (cmds, layout) = controller.commands(pose);

        session.start(&cmds).await;
        session.wait_until(deadline).await;
        let result = session.stop();
        controller.observe(result.stream_bitmask);

        let frame_time = frame_start.elapsed();
        fps.record(frame_time);

        let frame_bytes: u64 = result.stats.iter().map(|s| u64::from(s.num_enc_bytes)).sum();
        throughput.record(frame_bytes);

        // One line per frame, red-flagged when over budget.
        let slowest = result
            .stats
            .iter()
            .enumerate()
            .filter(|(i, _)| result.stream_active(*i))
            .max_by_key(|(_, s)| s.rtt_ns)
            .map(|(_, s)| *s)
            .unwrap_or_default();
        if slowest.rtt_ns > 0 {
            throughput.record_rtt(slowest.rtt_ns);
        }
        let line = format!(
            "frame {:4.1} ms | rtt {:5.1} ms | render {:5.1} ms | stream {:5.1} ms | {:5.0} kB/s | mask {:0width$b}",
            frame_time.as_secs_f64() * 1e3,
            throughput.smoothed_rtt().as_secs_f64() * 1e3,
            slowest.render_us as f64 * 1e-3,
            slowest.stream_us as f64 * 1e-3,
            throughput.estimate_bps() as f64 * 1e-3,
            result.stream_bitmask,
            width = NUM_STREAMS,
        );
        if frame_time <= budget {
            info!("{line}");
        } else {
            warn!("{line}");
        }

        let mut slice_masks = [0u32; NUM_STREAMS];
        for (i, stats) in result.stats.iter().enumerate() {
            slice_masks[i] = stats.slice_bitmask;
        }
        session.with_screen(|screen| {
            sink.present(&FrameView {
                screen,
                active_mask: result.stream_bitmask,
                slice_masks,
                layout,
                fps: fps.average_fps(),
            });
        });

        tokio::time::sleep_until(deadline).await;
        frame_count += 1;
    }

    session.shutdown().await;
    info!("stream client stopped after {frame_count} frames");

    Ok(())
}
