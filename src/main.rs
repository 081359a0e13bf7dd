use anyhow::{Context, Result};
use camrec::media::TrackRole;
use camrec::{AudioSource, Config, ContainerReader, Orientation, Recorder, RecordingOutput};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "camrec", version, about = "Camera recorder: encode and mux video with microphone audio")]
struct Cli {
    /// Configuration file (extension optional)
    #[arg(short, long, default_value = "config/camrec")]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Record a synthetic camera feed with microphone audio
    Record {
        /// Recording length in seconds
        #[arg(short, long, default_value_t = 5.0)]
        duration: f64,

        /// Display rotation in degrees (0, 90, 180, 270)
        #[arg(long, default_value_t = 0)]
        orientation: i32,

        /// Microphone: "tone" or a 16-bit PCM WAV file
        #[arg(long)]
        audio: Option<String>,

        /// Output directory
        #[arg(short, long)]
        output_dir: Option<PathBuf>,
    },
    /// Print a container's header and track summary
    Inspect {
        path: PathBuf,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Record {
            duration,
            orientation,
            audio,
            output_dir,
        } => {
            let cfg = match Config::load(&cli.config) {
                Ok(cfg) => cfg,
                Err(e) => {
                    warn!("Using default configuration ({:#})", e);
                    Config::default()
                }
            };

            let mut settings = cfg.settings();
            if let Some(audio) = audio {
                settings.audio_source = AudioSource::parse(&audio);
            }
            if let Some(dir) = output_dir {
                settings.output_dir = dir;
            }

            info!("camrec v{}", env!("CARGO_PKG_VERSION"));
            let output = record(settings, recording_length(duration)?, orientation)?;
            match output {
                Some(output) => println!("{}", serde_json::to_string_pretty(&output)?),
                None => println!("No recording was produced"),
            }
        }
        Command::Inspect { path } => inspect(&path)?,
    }

    Ok(())
}

/// Drive a recorder with NV12 test pattern frames at the configured frame rate
fn record(
    settings: camrec::RecorderSettings,
    duration: Duration,
    orientation: i32,
) -> Result<Option<RecordingOutput>> {
    let width = settings.video.width as usize;
    let height = settings.video.height as usize;
    let frame_rate = settings.video.frame_rate.max(1);
    let frame_period = Duration::from_secs(1) / frame_rate;

    let recorder = Recorder::new(settings).context("Failed to create recorder")?;
    if !recorder.start(Orientation::from_degrees(orientation)) {
        anyhow::bail!("Recorder refused to start");
    }

    let started = Instant::now();
    let mut frame_index: u64 = 0;
    while started.elapsed() < duration {
        // Simulated capture jitter of up to +/-2ms around the nominal frame time
        let jitter_ns = ((frame_index * 7919) % 5) as i64 * 1_000_000 - 2_000_000;
        let nominal_ns = (frame_index as u128 * frame_period.as_nanos()) as i64;
        let timestamp_ns = 1_000_000_000 + nominal_ns + jitter_ns;

        recorder.on_frame_available(test_pattern(width, height, frame_index), timestamp_ns);
        frame_index += 1;

        let due = started + frame_period * frame_index as u32;
        let now = Instant::now();
        if due > now {
            std::thread::sleep(due - now);
        }
    }

    info!("Submitted {} frames, stopping", frame_index);
    Ok(recorder.stop().wait())
}

/// Negative, NaN and infinite lengths are rejected
fn recording_length(secs: f64) -> Result<Duration> {
    Duration::try_from_secs_f64(secs).with_context(|| format!("Invalid --duration {}", secs))
}

/// Diagonal luma gradient scrolling one pixel per frame over neutral chroma
fn test_pattern(width: usize, height: usize, frame_index: u64) -> Vec<u8> {
    let luma = width * height;
    let mut frame = vec![128u8; luma + luma / 2];
    for (y, row) in frame[..luma].chunks_exact_mut(width.max(1)).enumerate() {
        for (x, pixel) in row.iter_mut().enumerate() {
            *pixel = ((x + y) as u64 + frame_index) as u8;
        }
    }
    frame
}

fn inspect(path: &Path) -> Result<()> {
    let container = ContainerReader::open(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    println!("File:        {}", path.display());
    println!("Created:     {}", container.header.created_at);
    println!("Orientation: {} degrees", container.header.orientation_degrees);
    println!("Finalized:   {}", container.finalized);

    for (index, track) in container.tracks.iter().enumerate() {
        let role = track.format.role();
        println!(
            "Track {} ({}): {} samples, {} bytes, {:.3}s",
            index,
            role,
            track.samples,
            track.payload_bytes,
            track.duration_us() as f64 / 1_000_000.0
        );
        println!("  {}", serde_json::to_string(&track.format)?);
    }

    if container.track(TrackRole::Video).is_none() {
        warn!("Container has no video track");
    }
    Ok(())
}
