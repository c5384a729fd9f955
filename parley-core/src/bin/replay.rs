//! Offline replay: feed a WAV file through a `Session` with the stub
//! collaborators and print every outbound event as a JSON line.
//!
//! ```text
//! cargo run -p parley-core --bin parley-replay -- --wav speech.wav [--chunk-ms 20] [--full] [--realtime]
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context};
use parley_core::{
    audio::f32_to_pcm16, playback::Outbound, services::Collaborators, OutboundTracker, ReplyMode,
    ServerEvent, Session, SessionConfig,
};
use serde::Serialize;
use tokio::sync::mpsc::UnboundedReceiver;

#[derive(Debug)]
struct Args {
    wav: PathBuf,
    chunk_ms: u32,
    reply_mode: ReplyMode,
    realtime: bool,
    trailing_silence_ms: u32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Summary {
    wav: String,
    sample_rate: u32,
    duration_ms: u64,
    chunks: usize,
    playback_frames_delivered: usize,
    diagnostics: parley_core::DiagnosticsSnapshot,
}

fn parse_args() -> anyhow::Result<Args> {
    let mut wav: Option<PathBuf> = None;
    let mut chunk_ms: u32 = 20;
    let mut reply_mode = ReplyMode::Streamed;
    let mut realtime = false;
    let mut trailing_silence_ms: u32 = 1_500;

    let mut it = std::env::args().skip(1);
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--wav" => {
                let Some(v) = it.next() else {
                    bail!("missing value for --wav");
                };
                wav = Some(PathBuf::from(v));
            }
            "--chunk-ms" => {
                let Some(v) = it.next() else {
                    bail!("missing value for --chunk-ms");
                };
                chunk_ms = v
                    .parse::<u32>()
                    .context("invalid value for --chunk-ms")?
                    .clamp(1, 1_000);
            }
            "--trailing-silence-ms" => {
                let Some(v) = it.next() else {
                    bail!("missing value for --trailing-silence-ms");
                };
                trailing_silence_ms = v
                    .parse::<u32>()
                    .context("invalid value for --trailing-silence-ms")?;
            }
            "--streamed" => reply_mode = ReplyMode::Streamed,
            "--full" => reply_mode = ReplyMode::Full,
            "--realtime" => realtime = true,
            "--help" | "-h" => {
                println!(
                    "Usage: parley-replay --wav <file.wav> [--chunk-ms <n>] [--streamed|--full] \\
  [--realtime] [--trailing-silence-ms <n>]"
                );
                std::process::exit(0);
            }
            other => bail!("unknown argument: {other}"),
        }
    }

    let Some(wav) = wav else {
        bail!("--wav <file> is required");
    };
    Ok(Args {
        wav,
        chunk_ms,
        reply_mode,
        realtime,
        trailing_silence_ms,
    })
}

/// Mono PCM16 bytes and the file's sample rate. Multi-channel input is averaged.
fn load_wav(path: &Path) -> anyhow::Result<(Vec<u8>, u32)> {
    let mut reader =
        hound::WavReader::open(path).with_context(|| format!("opening {}", path.display()))?;
    let spec = reader.spec();
    let channels = usize::from(spec.channels.max(1));

    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader.samples::<f32>().collect::<Result<Vec<_>, _>>()?,
        hound::SampleFormat::Int if spec.bits_per_sample <= 16 => reader
            .samples::<i16>()
            .map(|s| s.map(|v| v as f32 / i16::MAX as f32))
            .collect::<Result<Vec<_>, _>>()?,
        hound::SampleFormat::Int => {
            let max = ((1_i64 << (spec.bits_per_sample - 1)) - 1) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / max))
                .collect::<Result<Vec<_>, _>>()?
        }
    };

    let mono: Vec<f32> = interleaved
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
        .collect();
    Ok((f32_to_pcm16(&mono), spec.sample_rate))
}

fn print_event(event: &ServerEvent) {
    match event.to_json() {
        Ok(line) => println!("{line}"),
        Err(e) => eprintln!("unserializable event: {e}"),
    }
}

/// Print pending events and deliver queued playback. Returns frames delivered.
fn pump(
    session: &Session,
    events: &mut UnboundedReceiver<ServerEvent>,
    tracker: &mut OutboundTracker,
) -> usize {
    while let Ok(event) = events.try_recv() {
        print_event(&event);
    }
    let playback = session.playback();
    let mut frames = 0;
    while let Some(item) = playback.try_next() {
        for out in tracker.on_item(item) {
            match out {
                Outbound::Event(event) => print_event(&event),
                Outbound::Audio { .. } => frames += 1,
            }
        }
    }
    frames
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = parse_args()?;
    let (pcm, sample_rate) = load_wav(&args.wav)?;

    let config = SessionConfig {
        input_sample_rate: sample_rate,
        reply_mode: args.reply_mode,
        pacing: false,
        ..SessionConfig::default()
    };
    let (mut session, mut events) = Session::with_energy_vad(1, config, Collaborators::stub())?;
    let mut tracker = OutboundTracker::new(false);

    let chunk_bytes = (sample_rate as usize * args.chunk_ms as usize / 1000).max(1) * 2;
    let silence = vec![0u8; sample_rate as usize * args.trailing_silence_ms as usize / 1000 * 2];
    let mut chunks = 0usize;
    let mut delivered = 0usize;

    for chunk in pcm.chunks(chunk_bytes).chain(silence.chunks(chunk_bytes)) {
        session.handle_audio(chunk);
        chunks += 1;
        if args.realtime {
            tokio::time::sleep(Duration::from_millis(args.chunk_ms as u64)).await;
        } else {
            tokio::task::yield_now().await;
        }
        delivered += pump(&session, &mut events, &mut tracker);
    }

    session.drain_turns().await;
    delivered += pump(&session, &mut events, &mut tracker);

    let diagnostics = session.shutdown().await;
    while let Ok(event) = events.try_recv() {
        print_event(&event);
    }

    let summary = Summary {
        wav: args.wav.display().to_string(),
        sample_rate,
        duration_ms: (pcm.len() / 2) as u64 * 1000 / sample_rate.max(1) as u64,
        chunks,
        playback_frames_delivered: delivered,
        diagnostics,
    };
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
