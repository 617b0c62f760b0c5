//! Offline rendering of a note sequence through a preset.

use anyhow::Context;
use clap::Args;
use dawg_core::LogicalClock;
use dawg_synth::{EngineConfig, SynthEngine, SynthPreset, factory_preset};
use hound::{SampleFormat, WavSpec, WavWriter};
use std::path::PathBuf;

const BLOCK_SIZE: usize = 512;

#[derive(Args)]
pub struct RenderArgs {
    /// Output WAV file
    #[arg(value_name = "OUTPUT")]
    output: PathBuf,

    /// Factory preset name
    #[arg(short, long, default_value = "init", conflicts_with = "preset_file")]
    preset: String,

    /// Preset JSON file
    #[arg(long, value_name = "FILE")]
    preset_file: Option<PathBuf>,

    /// Comma-separated MIDI notes, e.g. "60,64,67"
    #[arg(short, long, default_value = "60,64,67")]
    notes: String,

    /// Note velocity (1-127)
    #[arg(long, default_value = "100")]
    velocity: u8,

    /// Total length in seconds
    #[arg(short, long, default_value = "2.0")]
    duration: f64,

    /// How long each note is held, in seconds
    #[arg(long, default_value = "1.0")]
    hold: f64,

    /// Delay between successive note starts, in seconds
    #[arg(long, default_value = "0.0")]
    stagger: f64,

    /// Tempo for synced LFOs
    #[arg(long, default_value = "120")]
    bpm: f32,

    /// Mod wheel position (0-127)
    #[arg(long, default_value = "0")]
    mod_wheel: u8,

    /// Sample rate in Hz
    #[arg(long, default_value = "48000")]
    sample_rate: u32,

    /// Maximum simultaneous voices
    #[arg(long, default_value = "16")]
    voices: usize,
}

fn parse_notes(notes: &str) -> anyhow::Result<Vec<u8>> {
    let parsed: Vec<u8> = notes
        .split(',')
        .filter_map(|s| s.trim().parse::<u8>().ok())
        .filter(|&n| n <= 127)
        .collect();

    if parsed.is_empty() {
        anyhow::bail!("No valid MIDI notes provided. Use format: --notes \"60,64,67\"");
    }
    Ok(parsed)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EventKind {
    On,
    Off,
}

#[derive(Debug, Clone, Copy)]
struct ScheduledNote {
    time: f64,
    note: u8,
    kind: EventKind,
}

/// Note starts every `stagger` seconds, each held for `hold`, in time order.
/// Offs sort before ons at the same instant so a repeated note restarts.
fn note_events(notes: &[u8], hold: f64, stagger: f64) -> Vec<ScheduledNote> {
    let mut events: Vec<ScheduledNote> = notes
        .iter()
        .enumerate()
        .flat_map(|(i, &note)| {
            let start = stagger * i as f64;
            [
                ScheduledNote {
                    time: start,
                    note,
                    kind: EventKind::On,
                },
                ScheduledNote {
                    time: start + hold,
                    note,
                    kind: EventKind::Off,
                },
            ]
        })
        .collect();
    events.sort_by(|a, b| {
        a.time
            .total_cmp(&b.time)
            .then_with(|| (a.kind == EventKind::On).cmp(&(b.kind == EventKind::On)))
    });
    events
}

fn load_preset(args: &RenderArgs) -> anyhow::Result<SynthPreset> {
    if let Some(path) = &args.preset_file {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        return SynthPreset::from_json(&json)
            .with_context(|| format!("invalid preset file {}", path.display()));
    }
    factory_preset(&args.preset).with_context(|| {
        format!(
            "Unknown preset '{}'. Run `dawg presets` to list them.",
            args.preset
        )
    })
}

pub fn run(args: RenderArgs) -> anyhow::Result<()> {
    if !(args.duration.is_finite() && args.duration > 0.0) {
        anyhow::bail!("--duration must be positive");
    }
    if args.sample_rate == 0 {
        anyhow::bail!("--sample-rate must be positive");
    }
    let notes = parse_notes(&args.notes)?;
    let preset = load_preset(&args)?;

    let clock = LogicalClock::new();
    let config = EngineConfig {
        sample_rate: args.sample_rate as f32,
        max_voices: args.voices,
        ..EngineConfig::default()
    };
    let mut engine = SynthEngine::new(config, clock.clone());
    engine.load_preset(&preset);
    engine.update_bpm(args.bpm);
    engine.set_mod_wheel(args.mod_wheel);

    let velocity = args.velocity.clamp(1, 127);
    let mut events = note_events(&notes, args.hold.max(0.0), args.stagger.max(0.0));
    events.reverse();

    println!("Rendering '{}'...", engine.preset_name());
    println!("  Notes: {:?}", notes);
    println!("  Duration: {:.2}s at {} Hz", args.duration, args.sample_rate);

    let spec = WavSpec {
        channels: 2,
        sample_rate: args.sample_rate,
        bits_per_sample: 32,
        sample_format: SampleFormat::Float,
    };
    let mut writer = WavWriter::create(&args.output, spec)
        .with_context(|| format!("failed to create {}", args.output.display()))?;

    let sample_rate = f64::from(args.sample_rate);
    let total = (args.duration * sample_rate).round() as usize;
    let mut left = vec![0.0f32; BLOCK_SIZE];
    let mut right = vec![0.0f32; BLOCK_SIZE];
    let mut written = 0;
    let mut peak = 0.0f32;

    while written < total {
        let now = written as f64 / sample_rate;
        clock.set(now);
        while let Some(event) = events.last().copied().filter(|e| e.time <= now) {
            match event.kind {
                EventKind::On => engine.note_on(event.note, velocity, Some(event.time)),
                EventKind::Off => engine.note_off(Some(event.note), Some(event.time)),
            }
            events.pop();
        }

        // Split the block at the next event so it lands on its own frame.
        let mut len = BLOCK_SIZE.min(total - written);
        if let Some(next) = events.last() {
            let frames = ((next.time - now) * sample_rate).ceil().max(1.0) as usize;
            len = len.min(frames);
        }

        engine.render(now, &mut left[..len], &mut right[..len]);
        for (&l, &r) in left[..len].iter().zip(&right[..len]) {
            writer.write_sample(l)?;
            writer.write_sample(r)?;
            peak = peak.max(l.abs()).max(r.abs());
        }
        written += len;
    }
    writer.finalize().context("failed to finalise WAV file")?;

    tracing::debug!(frames = total, peak, "render complete");
    println!("  Peak: {:.3}", peak);
    println!("Saved to {}", args.output.display());

    Ok(())
}
