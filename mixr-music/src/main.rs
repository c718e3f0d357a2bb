//! mixr-render: decode a music file through a backend and write it as WAV
//!
//! Opens the input with the named backend, or with the first registered
//! backend that can load it, plays it the requested number of times through a
//! session and writes the pulled target-format audio to a WAV file.

use anyhow::{bail, Context, Result};
use clap::Parser;
use mixr_music::audio::spec::{AudioSpec, SampleFormat};
use mixr_music::backends::{self, synth::SynthOptions};
use mixr_music::config::TomlConfig;
use mixr_music::music::{
    BackendRegistry, Capability, MetaTag, MusicSession, MusicSource, PlayCount, PullStatus,
    SessionOptions,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Frames pulled per get_audio call
const PULL_FRAMES: usize = 4096;

/// Consecutive empty pulls tolerated before giving up
const MAX_EMPTY_PULLS: usize = 8;

/// Command-line arguments for mixr-render
#[derive(Parser, Debug)]
#[command(name = "mixr-render")]
#[command(about = "Render a music file to WAV through a mixr backend")]
#[command(version)]
struct Args {
    /// Music file to render
    input: PathBuf,

    /// Output WAV file
    #[arg(short, long, default_value = "out.wav")]
    output: PathBuf,

    /// Backend name (synth, symphonia); every backend is tried in turn if omitted
    #[arg(short, long)]
    backend: Option<String>,

    /// Number of play-throughs
    #[arg(short, long, value_parser = clap::value_parser!(u32).range(1..))]
    loops: Option<u32>,

    /// Session volume, 0-128
    #[arg(long, value_parser = clap::value_parser!(i32).range(0..=128))]
    volume: Option<i32>,

    /// Start position in seconds
    #[arg(long)]
    seek: Option<f64>,

    /// Target sample rate
    #[arg(long)]
    frequency: Option<u32>,

    /// Target sample format (u8, s8, s16, s32, f32)
    #[arg(long)]
    format: Option<SampleFormat>,

    /// Target channel count
    #[arg(long)]
    channels: Option<u16>,

    /// TOML configuration file [default: $MIXR_CONFIG, then the user config dir]
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Instrument bank for the synth backend
    #[arg(long)]
    synth_config: Option<PathBuf>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let config = TomlConfig::load(args.config.as_deref()).context("Failed to load configuration")?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("mixr_music={}", config.logging.level).into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let target = AudioSpec::new(
        args.frequency.unwrap_or(config.output.frequency),
        args.format.unwrap_or(config.output.format),
        args.channels.unwrap_or(config.output.channels),
    );
    let count = match args.loops {
        Some(n) => PlayCount::times(n),
        None => config.playback.play_count(),
    };
    if count == PlayCount::Forever {
        bail!("Cannot render an endless loop; set --loops");
    }

    info!("Rendering {} to {} as {}", args.input.display(), args.output.display(), target);

    let registry = BackendRegistry::new(target).context("Invalid target spec")?;
    let synth = backends::register_builtin(&registry, SynthOptions::default())?;
    synth.set_config_override(args.synth_config.clone().or(config.synth.config.clone()));

    let options = config.playback.session_options();
    let mut session = match args.backend.as_deref() {
        Some(name) => open_with(&registry, name, &args.input, options)?,
        None => probe(&registry, &args.input, options)?,
    };

    report(&session);

    session.set_volume(args.volume.unwrap_or(config.playback.volume))?;
    session.play(count)?;
    if let Some(position) = args.seek {
        session.seek(position).context("Seek failed")?;
    }

    let written = render(&mut session, &args.output, target)?;
    info!(
        "Wrote {:.2}s of audio to {}",
        target.seconds_for_bytes(written),
        args.output.display()
    );

    session.delete();
    Ok(())
}

/// Load `input` through the named backend
fn open_with(
    registry: &Arc<BackendRegistry>,
    backend: &str,
    input: &Path,
    options: SessionOptions,
) -> Result<MusicSession> {
    let lease = registry
        .acquire(backend)
        .with_context(|| format!("Failed to open backend '{}'", backend))?;
    let source = MusicSource::from_file(input)
        .with_context(|| format!("Failed to open {}", input.display()))?;
    MusicSession::create(&lease, source, options)
        .with_context(|| format!("Failed to load {} with '{}'", input.display(), backend))
}

/// Load `input` with the first backend, in registration order, that accepts it
fn probe(registry: &Arc<BackendRegistry>, input: &Path, options: SessionOptions) -> Result<MusicSession> {
    let session = MusicSession::probe(registry, || Ok(MusicSource::from_file(input)?), options)
        .with_context(|| format!("Failed to load {}", input.display()))?;
    Ok(session)
}

/// Pull the whole session into a WAV file; returns bytes written
fn render(session: &mut MusicSession, output: &Path, target: AudioSpec) -> Result<usize> {
    let (bits, sample_format) = match target.format {
        SampleFormat::F32 => (32, hound::SampleFormat::Float),
        other => (other.bits(), hound::SampleFormat::Int),
    };
    let wav_spec = hound::WavSpec {
        channels: target.channels,
        sample_rate: target.frequency,
        bits_per_sample: bits,
        sample_format,
    };
    let mut writer = hound::WavWriter::create(output, wav_spec)
        .with_context(|| format!("Failed to create {}", output.display()))?;

    let mut buf = vec![0u8; target.bytes_for_frames(PULL_FRAMES)];
    let mut total = 0;
    let mut empty_pulls = 0;

    loop {
        let pull = session.get_audio(&mut buf)?;
        write_samples(&mut writer, target.format, &buf[..pull.written])?;
        total += pull.written;

        match pull.status {
            PullStatus::Streaming if pull.written == 0 => {
                empty_pulls += 1;
                if empty_pulls >= MAX_EMPTY_PULLS {
                    warn!("Decoder stalled after {} bytes", total);
                    break;
                }
            }
            PullStatus::Streaming => empty_pulls = 0,
            PullStatus::Finished | PullStatus::Stopped => break,
        }
    }

    if session.supports(Capability::Tell) {
        if let Ok(position) = session.tell() {
            debug!("Final position: {:.3}s", position);
        }
    }

    writer.finalize().context("Failed to finalize WAV file")?;
    Ok(total)
}

fn write_samples<W>(writer: &mut hound::WavWriter<W>, format: SampleFormat, bytes: &[u8]) -> Result<()>
where
    W: std::io::Write + std::io::Seek,
{
    match format {
        SampleFormat::U8 => {
            for &b in bytes {
                writer.write_sample((b as i16 - 128) as i8)?;
            }
        }
        SampleFormat::S8 => {
            for &b in bytes {
                writer.write_sample(b as i8)?;
            }
        }
        SampleFormat::S16 => {
            for c in bytes.chunks_exact(2) {
                writer.write_sample(i16::from_le_bytes([c[0], c[1]]))?;
            }
        }
        SampleFormat::S32 => {
            for c in bytes.chunks_exact(4) {
                writer.write_sample(i32::from_le_bytes([c[0], c[1], c[2], c[3]]))?;
            }
        }
        SampleFormat::F32 => {
            for c in bytes.chunks_exact(4) {
                writer.write_sample(f32::from_le_bytes([c[0], c[1], c[2], c[3]]))?;
            }
        }
    }
    Ok(())
}
