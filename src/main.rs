//! chunkmix CLI: play a raw sample chunk through the mixer.
//!
//! Usage:
//!   chunkmix kick.raw --freq 11025
//!   chunkmix pad.raw --loop-start 1000 --loop-len 2000 --seconds 4 --wav pad.wav
//!   chunkmix hat.raw --retrigger-ms 125

use clap::Parser;
use cm_master::{Controller, MixerConfig, NUM_CHANNELS};
use std::path::{Path, PathBuf};
use std::time::Duration;
use std::{fs, process};
use tracing::{error, info};

/// Play a raw signed 8-bit mono chunk through the chunkmix mixer.
#[derive(Parser, Debug)]
#[command(name = "chunkmix", version, about)]
struct Args {
    /// Raw signed 8-bit mono sample file
    input: PathBuf,

    /// Playback frequency in Hz
    #[arg(long, default_value_t = 11025)]
    freq: u16,

    /// Channel volume (0-255)
    #[arg(long, default_value_t = 255)]
    volume: u8,

    /// Channel to play on
    #[arg(long, default_value_t = 0)]
    channel: u8,

    /// First sample of the loop region
    #[arg(long, requires = "loop_len")]
    loop_start: Option<u16>,

    /// Loop region length in samples
    #[arg(long, requires = "loop_start")]
    loop_len: Option<u16>,

    /// Re-trigger the chunk every N milliseconds
    #[arg(long)]
    retrigger_ms: Option<u32>,

    /// Seconds to play or render
    #[arg(long, default_value_t = 5)]
    seconds: u32,

    /// Render to this WAV file instead of the sound card
    #[arg(long)]
    wav: Option<PathBuf>,

    /// Mixer output rate in Hz
    #[arg(long, default_value_t = cm_master::DEFAULT_SAMPLE_RATE)]
    rate: u32,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    if args.channel as usize >= NUM_CHANNELS {
        error!(channel = args.channel, "channel must be below {}", NUM_CHANNELS);
        process::exit(2);
    }

    let data = fs::read(&args.input).unwrap_or_else(|e| {
        error!(path = %args.input.display(), "failed to read chunk: {}", e);
        process::exit(1);
    });

    let mut ctrl = Controller::new(MixerConfig::default().with_sample_rate(args.rate));
    let name = args
        .input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let key = ctrl.load_chunk(&name, data);
    let mut source = ctrl.source(key).unwrap_or_else(|e| {
        error!("{}", e);
        process::exit(1);
    });
    if let (Some(start), Some(len)) = (args.loop_start, args.loop_len) {
        source = source.with_loop(start, len);
    }
    info!(
        samples = source.len,
        loop_start = source.loop_start,
        loop_len = source.loop_len,
        "chunk ready"
    );

    ctrl.play(args.channel, &source, args.freq, args.volume);

    if let Some(period) = args.retrigger_ms {
        let table = ctrl.table().clone();
        let (channel, freq, volume) = (args.channel, args.freq, args.volume);
        ctrl.add_timer(
            period,
            Box::new(move |delay| {
                table.play(channel, &source, freq, volume);
                delay
            }),
        );
    }

    match args.wav {
        Some(path) => render_to_wav(&mut ctrl, &path, args.seconds),
        None => play_audio(&mut ctrl, args.seconds),
    }
}

fn play_audio(ctrl: &mut Controller, seconds: u32) {
    if let Err(e) = ctrl.start_audio() {
        error!("failed to start audio: {}", e);
        process::exit(1);
    }
    println!("Playing for {}s...", seconds);
    std::thread::sleep(Duration::from_secs(seconds as u64));
    ctrl.stop_all();
    ctrl.stop_audio();
    println!("Done.");
}

fn render_to_wav(ctrl: &mut Controller, path: &Path, seconds: u32) {
    println!(
        "Rendering {}s to {} at {} Hz...",
        seconds,
        path.display(),
        ctrl.sample_rate()
    );

    let wav = ctrl.render_to_wav(seconds).unwrap_or_else(|e| {
        error!("render failed: {}", e);
        process::exit(1);
    });
    println!("Rendered {} bytes", wav.len());

    fs::write(path, &wav).unwrap_or_else(|e| {
        error!(path = %path.display(), "failed to write WAV: {}", e);
        process::exit(1);
    });

    println!("Done.");
}
