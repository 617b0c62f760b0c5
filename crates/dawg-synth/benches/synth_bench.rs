//! Criterion benchmarks for dawg-synth components
//!
//! Run with: cargo bench -p dawg-synth

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use dawg_core::{AutomationParam, LogicalClock, NoiseBuffer};
use dawg_synth::{
    Destination, EngineConfig, Envelope, EnvelopeParams, ModSource, ModulationEngine,
    ModulationSlot, NoteEvent, SubtractiveVoice, SynthEngine, SynthPatch, Voice,
};

const SAMPLE_RATE: f32 = 48000.0;
const BLOCK_SIZES: &[usize] = &[64, 256, 1024];

// ============================================================================
// Envelope benchmarks
// ============================================================================

fn bench_envelope_follower(c: &mut Criterion) {
    let mut group = c.benchmark_group("Envelope");

    let mut env = Envelope::new(EnvelopeParams::default());
    let mut target = AutomationParam::new(0.0, 0.0, 1.0);
    env.trigger(&mut target, 0.0, 1.0, 100);

    group.bench_function("value_at_1024", |b| {
        b.iter(|| {
            let mut sum = 0.0f32;
            for i in 0..1024 {
                sum += env.value_at(f64::from(i) / 2048.0);
            }
            black_box(sum)
        })
    });

    group.bench_function("trigger_release", |b| {
        let mut time = 0.0;
        b.iter(|| {
            env.trigger(&mut target, time, 1.0, 100);
            let end = env.release(&mut target, time + 0.5, None);
            target.compact(end);
            time = end;
            black_box(end)
        })
    });

    group.finish();
}

// ============================================================================
// Modulation matrix benchmarks
// ============================================================================

fn bench_matrix_evaluate(c: &mut Criterion) {
    let mut group = c.benchmark_group("ModulationEngine");

    let mut matrix = ModulationEngine::default();
    let sources = [
        ModSource::Lfo(0),
        ModSource::Lfo(1),
        ModSource::Velocity,
        ModSource::FilterEnvelope,
    ];
    for (i, source) in sources.iter().cycle().take(16).enumerate() {
        let destination = if i % 2 == 0 {
            Destination::FilterCutoff
        } else {
            Destination::Pan
        };
        let _ = matrix.set_slot(i, ModulationSlot::route(*source, destination, 0.5));
    }

    group.bench_function("16_slots", |b| {
        b.iter(|| black_box(matrix.evaluate(&|_: ModSource| -> f32 { 0.25 })))
    });

    group.finish();
}

// ============================================================================
// Voice benchmarks
// ============================================================================

fn bench_voice_render(c: &mut Criterion) {
    let mut group = c.benchmark_group("SubtractiveVoice");

    let mut supersaw = SynthPatch::default();
    supersaw.oscillators[0].waveform = dawg_synth::OscillatorWaveform::Supersaw;

    let patches = [("Saw", SynthPatch::default()), ("Supersaw", supersaw)];

    for (name, patch) in &patches {
        for &block_size in BLOCK_SIZES {
            let mut voice = SubtractiveVoice::new(SAMPLE_RATE, NoiseBuffer::new(4096, 1));
            voice.trigger(patch, &NoteEvent::new(60, 100), 0.0);
            let mut time = 0.0;
            let step = 1.0 / f64::from(SAMPLE_RATE);

            group.bench_with_input(
                BenchmarkId::new(*name, block_size),
                &block_size,
                |b, &size| {
                    b.iter(|| {
                        let mut sum = 0.0f32;
                        for _ in 0..size {
                            let (l, r) = voice.render(time);
                            sum += l + r;
                            time += step;
                        }
                        black_box(sum)
                    })
                },
            );
        }
    }

    group.finish();
}

// ============================================================================
// Engine benchmarks
// ============================================================================

fn bench_engine_voices(c: &mut Criterion) {
    let mut group = c.benchmark_group("SynthEngine");

    for voices in [1u8, 4, 8, 16] {
        let clock = LogicalClock::new();
        let mut engine = SynthEngine::new(EngineConfig::default(), clock);
        engine.load_factory_preset("warm-pad");
        for i in 0..voices {
            engine.note_on(48 + i * 3, 100, Some(0.0));
        }
        let mut left = vec![0.0f32; 256];
        let mut right = vec![0.0f32; 256];
        let mut time = 0.0;
        let block = 256.0 / f64::from(SAMPLE_RATE);

        group.bench_with_input(BenchmarkId::new("voices", voices), &voices, |b, _| {
            b.iter(|| {
                engine.render(time, &mut left, &mut right);
                time += block;
                black_box(left[0] + right[0])
            })
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_envelope_follower,
    bench_matrix_evaluate,
    bench_voice_render,
    bench_engine_voices,
);

criterion_main!(benches);
