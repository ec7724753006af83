//! Command-line player around the medley pipeline.

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing::info;

use medley::{is_camera_uri, AudioFrame, EventSink, Player, PlayerConfig, VideoFrame};

#[derive(Parser, Debug)]
#[command(name = "medley", about = "Play and record media streams")]
struct Args {
    /// Media URI: a file path or an rtsp:// / http(s):// stream
    uri: String,

    /// Run without a window; frames are only delivered to listeners
    #[arg(long)]
    headless: bool,

    /// Suppress playback entirely and only route packets to the recorder
    #[arg(long)]
    hidden: bool,

    /// Record from startup under this base filename (extension is chosen
    /// from the audio codec)
    #[arg(long)]
    record: Option<String>,

    /// Pre-roll cache span in seconds
    #[arg(long, default_value_t = 1)]
    buffer_seconds: i64,

    /// Hardware decoder device type (e.g. cuda, vaapi, videotoolbox)
    #[arg(long, default_value = "")]
    hw_device: String,

    /// Video filter-graph description (e.g. "scale=1280:720")
    #[arg(long, default_value = "")]
    video_filter: String,

    /// Audio filter-graph description
    #[arg(long, default_value = "")]
    audio_filter: String,

    /// Start playback at this fraction of the duration (files only)
    #[arg(long, default_value_t = -1.0)]
    start_from: f32,

    /// Initial volume, 0..=100
    #[arg(long, default_value_t = 100)]
    volume: i32,

    /// Start muted
    #[arg(long)]
    mute: bool,

    /// Print stream information and codec backend versions, then exit
    #[arg(long)]
    probe_only: bool,
}

/// Listener that narrates playback into the log.
struct LogEvents;

impl EventSink for LogEvents {
    fn progress(&self, pct: f32, uri: &str) {
        tracing::trace!("{uri}: {:.1}%", pct * 100.0);
    }

    fn render(&self, frame: &VideoFrame, _uri: &str) {
        tracing::trace!("video frame {}x{}", frame.width, frame.height);
    }

    fn audio_frame(&self, frame: &AudioFrame, _uri: &str) {
        tracing::trace!("audio frame, {} samples", frame.samples);
    }

    fn info(&self, msg: &str, uri: &str) {
        info!("{uri}: {msg}");
    }

    fn error(&self, msg: &str, uri: &str, request_reconnect: bool) {
        tracing::error!("{uri}: {msg} (reconnect requested: {request_reconnect})");
    }

    fn media_playing_started(&self, uri: &str) {
        info!("{uri}: playing");
    }

    fn media_playing_stopped(&self, uri: &str) {
        info!("{uri}: stopped");
    }

    fn packet_drop(&self, uri: &str) {
        tracing::warn!("{uri}: video packet dropped");
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let live_stream = is_camera_uri(&args.uri);

    let config = PlayerConfig {
        live_stream,
        headless: args.headless,
        hidden: args.hidden,
        hw_device_type: args.hw_device,
        video_filter: args.video_filter,
        audio_filter: args.audio_filter,
        buffer_size_in_seconds: args.buffer_seconds,
        file_start_from_seek: args.start_from,
        volume: args.volume,
        mute: args.mute,
        ..PlayerConfig::default()
    };

    let player = Arc::new(Player::new(args.uri.clone(), config, Arc::new(LogEvents)));

    if args.probe_only {
        println!("{}", Player::ffmpeg_versions());
        println!("audio drivers: {}", Player::audio_drivers().join(", "));
        println!(
            "hardware decoders: {}",
            Player::hardware_decoders().join(", ")
        );
        return Ok(());
    }

    if let Some(base) = &args.record {
        if live_stream {
            // Arm recording once playback is up.
            let player = Arc::clone(&player);
            let base = base.clone();
            std::thread::spawn(move || {
                std::thread::sleep(std::time::Duration::from_millis(500));
                player.toggle_recording(&base);
            });
        } else {
            tracing::warn!("--record only applies to live streams; ignoring");
        }
    }

    player.play();

    if player.crashed() {
        anyhow::bail!("playback failed for {}", args.uri);
    }
    Ok(())
}
