//! arcapture CLI
//!
//! Usage:
//!   arcapture simulate --record          # Record a synthetic session to ~/.arcapture/recordings
//!   arcapture simulate --stream          # Serve the live pose feed from a synthetic session
//!   arcapture inspect <log>              # Replay a log and print a summary
//!   arcapture listen -d <host:port>      # Discover a device and print its pose feed

use anyhow::Context;
use argh::FromArgs;
use std::io::BufReader;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use arcapture::{
    decode_log, CaptureConfig, CaptureController, SceneReplay, StreamingSink, SyntheticSensor,
};

/// arcapture - per-frame spatial capture to log files and a live pose feed
#[derive(FromArgs)]
struct Args {
    /// show version information
    #[argh(switch, short = 'V')]
    version: bool,

    #[argh(subcommand)]
    command: Option<Command>,
}

#[derive(FromArgs)]
#[argh(subcommand)]
enum Command {
    Simulate(SimulateArgs),
    Inspect(InspectArgs),
    Listen(ListenArgs),
}

/// Drive a capture session from a synthetic sensor
#[derive(FromArgs)]
#[argh(subcommand, name = "simulate")]
struct SimulateArgs {
    /// path to the YAML configuration (default: ~/.arcapture/config.yaml)
    #[argh(option, short = 'c')]
    config: Option<PathBuf>,

    /// write a recording to the configured output directory
    #[argh(switch, short = 'r')]
    record: bool,

    /// serve the live pose feed
    #[argh(switch, short = 's')]
    stream: bool,

    /// frames per second (default: 30)
    #[argh(option, default = "30")]
    fps: u32,

    /// stop after this many seconds (default: run until Ctrl+C)
    #[argh(option, short = 'd')]
    duration: Option<f64>,
}

/// Replay a capture log and print a summary
#[derive(FromArgs)]
#[argh(subcommand, name = "inspect")]
struct InspectArgs {
    /// log file to read
    #[argh(positional)]
    log: PathBuf,

    /// output format: text, json (default: text)
    #[argh(option, short = 'f', default = "String::from(\"text\")")]
    format: String,

    /// ignore points below this confidence (default: 0.5)
    #[argh(option, default = "SceneReplay::DEFAULT_MIN_CONFIDENCE")]
    min_confidence: f32,
}

/// Act as the remote peer of a live pose feed
#[derive(FromArgs)]
#[argh(subcommand, name = "listen")]
struct ListenArgs {
    /// discovery address of the device (default: 127.0.0.1:7299)
    #[argh(option, short = 'd', default = "SocketAddr::from(([127, 0, 0, 1], 7299))")]
    device: SocketAddr,

    /// local address to receive poses on (default: 0.0.0.0:0)
    #[argh(option, short = 'b', default = "SocketAddr::from(([0, 0, 0, 0], 0))")]
    bind: SocketAddr,

    /// exit after this many poses (default: run until Ctrl+C)
    #[argh(option, short = 'n')]
    count: Option<u64>,
}

fn default_config_path() -> PathBuf {
    dirs::home_dir()
        .map(|home| home.join(".arcapture").join("config.yaml"))
        .unwrap_or_else(|| PathBuf::from("config.yaml"))
}

fn shutdown_channel() -> anyhow::Result<tokio::sync::watch::Receiver<bool>> {
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    ctrlc::set_handler(move || {
        log::info!("Received Ctrl+C, shutting down gracefully...");
        if let Err(e) = shutdown_tx.send(true) {
            log::warn!(
                "Failed to send shutdown signal: {}. Receiver may have been dropped.",
                e
            );
        }
    })?;
    Ok(shutdown_rx)
}

async fn simulate(args: SimulateArgs) -> anyhow::Result<()> {
    let config_path = args.config.unwrap_or_else(default_config_path);
    let config = CaptureConfig::load_or_default(&config_path)?;

    if !args.record && !args.stream {
        anyhow::bail!("nothing to do: pass --record, --stream or both");
    }

    let mut controller = CaptureController::new(config.clone());
    if args.stream {
        let sink = StreamingSink::bind(&config.stream)
            .await
            .context("failed to bind streaming sockets")?;
        controller = controller.with_streaming(sink);
        controller.start_streaming();
    }

    let fps = args.fps.max(1);
    let mut sensor = SyntheticSensor::new(fps, controller.tracker(), controller.cloud_signal());

    if args.record {
        let path = controller.start_recording(&sensor)?;
        log::info!("Recording to {}", path.display());
    }

    let mut shutdown_rx = shutdown_channel()?;
    let mut interval = tokio::time::interval(Duration::from_secs_f64(1.0 / f64::from(fps)));
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => break,
            _ = interval.tick() => {
                let frame = sensor.advance();
                if args.duration.is_some_and(|limit| frame.time > limit) {
                    log::info!("Duration reached after {} frames", frame.index);
                    break;
                }
                controller.tick(frame.time, frame.pose, &sensor)?;
            }
        }
    }

    if let Some(info) = controller.stop_all()? {
        println!("{}", info.path.display());
    }
    Ok(())
}

fn inspect(args: InspectArgs) -> anyhow::Result<()> {
    let file = std::fs::File::open(&args.log)
        .with_context(|| format!("failed to open {}", args.log.display()))?;
    let log = decode_log(BufReader::new(file))?;

    let summary = SceneReplay::replay_log(&log, args.min_confidence).summary();

    match args.format.as_str() {
        "json" => println!("{}", serde_json::to_string_pretty(&summary)?),
        "text" => {
            println!("Log:        {}", args.log.display());
            if let Some(meta) = summary.metadata {
                println!(
                    "Camera:     {}x{} @ {} deg fov",
                    meta.width, meta.height, meta.fov
                );
            }
            println!("Frames:     {}", summary.frames);
            println!("Duration:   {:.3} s", summary.duration);
            println!("Path:       {:.3} m", summary.path_length);
            println!(
                "Points:     {} ({} below confidence {})",
                summary.points, summary.points_rejected, args.min_confidence
            );
            println!("Anchors:    {}", summary.anchors);
            println!(
                "Planes:     {} active, {} removed",
                summary.planes.len(),
                summary.planes_removed
            );
            for plane in &summary.planes {
                println!(
                    "  {}  [{:.2}, {:.2}, {:.2}]  {} vertices",
                    plane.id, plane.position[0], plane.position[1], plane.position[2], plane.vertices
                );
            }
        }
        other => anyhow::bail!("unknown format {other:?}, expected text or json"),
    }
    Ok(())
}

async fn listen(args: ListenArgs) -> anyhow::Result<()> {
    let socket = tokio::net::UdpSocket::bind(args.bind)
        .await
        .with_context(|| format!("failed to bind {}", args.bind))?;
    socket.send_to(b"hello", args.device).await?;
    log::info!(
        "Discovery sent to {} from {}",
        args.device,
        socket.local_addr()?
    );

    let mut shutdown_rx = shutdown_channel()?;
    let mut buf = [0u8; 1500];
    let mut received = 0u64;

    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => break,
            result = socket.recv_from(&mut buf) => {
                let (len, from) = result?;
                println!("{}", String::from_utf8_lossy(&buf[..len]));
                log::debug!("Pose from {}", from);
                received += 1;
                if args.count.is_some_and(|count| received >= count) {
                    break;
                }
            }
        }
    }

    log::info!("Received {} poses", received);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Args = argh::from_env();

    if args.version {
        println!("arcapture {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    match args.command {
        None => {
            eprintln!("arcapture - per-frame spatial capture\n");
            eprintln!("Usage: arcapture <command>\n");
            eprintln!("Commands:");
            eprintln!("  simulate  Drive a capture session from a synthetic sensor:");
            eprintln!("              -r, --record: write a recording");
            eprintln!("              -s, --stream: serve the live pose feed");
            eprintln!("  inspect   Replay a capture log and print a summary");
            eprintln!("              -f, --format <fmt>: text|json (default: text)");
            eprintln!("  listen    Act as the remote peer of a live pose feed");
            eprintln!("\nRun 'arcapture <command> --help' for more information.");
        }
        Some(Command::Simulate(args)) => simulate(args).await?,
        Some(Command::Inspect(args)) => inspect(args)?,
        Some(Command::Listen(args)) => listen(args).await?,
    }

    Ok(())
}
