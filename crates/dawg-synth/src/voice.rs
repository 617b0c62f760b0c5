//! Voices: one note's worth of sound generation.
//!
//! [`Voice`] is the seam between the allocator and whatever produces sound.
//! [`SubtractiveVoice`] is the concrete implementation: an oscillator bank
//! feeding an optional drive stage, a resonant filter swept by its own
//! envelope, an amplitude stage driven by a second envelope, a trim stage
//! and a panner.
//!
//! ```text
//! osc1 ─┐                                      filter env
//! osc2 ─┼─ level ─┬─ drive ─┬─ filter ─ amp ─ trim ─ pan ─▶ out
//! osc3 ─┘         └─────────┘     ▲      ▲
//!                                 LFOs   amp env
//! ```
//!
//! Filter, gain and shaper nodes live as long as the voice. Oscillator and
//! noise generators are built fresh on every trigger and dropped on reset.

use dawg_core::filter::{MAX_CUTOFF, MAX_Q, MIN_CUTOFF, MIN_Q};
use dawg_core::oscillator::DETUNE_RANGE;
use dawg_core::{
    AutomationParam, FilterNode, GainNode, NoiseBuffer, NoiseSource, OscillatorNode, PannerNode,
    WaveShaperNode, Waveform, flush_denormal, midi_to_bipolar, midi_to_freq,
    soft_saturation_curve,
};
use tracing::debug;

use crate::envelope::{Envelope, EnvelopeParams};
use crate::lfo::{Lfo, LfoSettings, LfoTarget};
use crate::modulation::{Destination, DestinationOffsets, ModSource, ModTarget, ModTargetRegistry};
use crate::patch::{
    FilterSpec, LFO_COUNT, OSCILLATOR_COUNT, OscillatorSpec, OscillatorWaveform, SynthPatch,
    amplitude_envelope_params, filter_envelope_params,
};

/// Time oscillators keep running after the amplitude release completes.
pub const RELEASE_MARGIN: f64 = 0.05;

/// Glide time applied to each modulation offset update.
pub const MODULATION_SMOOTHING: f64 = 0.005;

/// Note frequency at which key tracking leaves the cutoff unchanged (middle C).
pub const KEY_TRACKING_REFERENCE_HZ: f32 = 261.63;

const DRIVE_CURVE_LEN: usize = 1025;

/// Continuous controller values captured with a note, each 0.0–1.0.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct NoteParams {
    /// Mod wheel position. Raises the base cutoff by up to 100 %.
    pub mod_wheel: f32,
    /// Channel pressure. Raises the base cutoff by up to 50 %.
    pub aftertouch: f32,
}

/// A note as handed to a voice.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NoteEvent {
    /// MIDI note number.
    pub note: u8,
    /// MIDI velocity.
    pub velocity: u8,
    /// Fundamental in Hz.
    pub frequency: f32,
    /// Controller values.
    pub params: NoteParams,
}

impl NoteEvent {
    /// Equal-tempered note with default controllers.
    pub fn new(note: u8, velocity: u8) -> Self {
        let note = note.min(127);
        Self {
            note,
            velocity: velocity.min(127),
            frequency: midi_to_freq(note),
            params: NoteParams::default(),
        }
    }

    /// Same note with the given controller values.
    pub fn with_params(mut self, params: NoteParams) -> Self {
        self.params = params;
        self
    }
}

/// A sound generator the allocator can assign notes to.
pub trait Voice {
    /// Settings a trigger is played with.
    type Patch;

    /// Start `event` at `time`, replacing whatever the voice was doing.
    fn trigger(&mut self, patch: &Self::Patch, event: &NoteEvent, time: f64);

    /// Begin the release at `time`. Returns seconds until the voice is silent
    /// and its generators have stopped.
    fn release(&mut self, time: f64) -> f64;

    /// Silence immediately and make the voice ready for reuse.
    fn reset(&mut self, time: f64);

    /// Tear down permanently. Safe to call more than once.
    fn dispose(&mut self);

    /// Amplitude envelope value at `time`.
    fn current_amplitude(&self, time: f64) -> f32;

    /// Slide the sounding pitch to `event`'s frequency over `duration`.
    fn glide_to(&mut self, event: &NoteEvent, time: f64, duration: f64);

    /// Restart both envelopes for `event` without rebuilding generators.
    fn retrigger(&mut self, event: &NoteEvent, time: f64);

    /// Note the voice is playing.
    fn note(&self) -> Option<u8>;

    /// Whether the voice holds a note (triggered and not reset).
    fn is_active(&self) -> bool;

    /// Whether a release has been issued for the current note.
    fn is_releasing(&self) -> bool;

    /// Whether the voice is idle or its release has completed by `time`.
    fn is_finished(&self, time: f64) -> bool;

    /// Render one stereo frame at `time`.
    fn render(&mut self, time: f64) -> (f32, f32);
}

#[derive(Debug, Clone)]
enum Source {
    Tone(OscillatorNode),
    Noise(NoiseSource),
}

/// One running generator belonging to an oscillator slot.
#[derive(Debug, Clone)]
struct Generator {
    slot: usize,
    source: Source,
    gain: f32,
    panner: Option<PannerNode>,
}

impl Generator {
    fn tone(
        slot: usize,
        sample_rate: f32,
        waveform: Waveform,
        frequency: f32,
        detune: f32,
        phase: f32,
        time: f64,
    ) -> Self {
        let mut node = OscillatorNode::new(sample_rate, waveform).with_phase(phase);
        node.frequency.set_immediate(frequency, time);
        node.detune.set_immediate(detune, time);
        node.start(time);
        Self {
            slot,
            source: Source::Tone(node),
            gain: 1.0,
            panner: None,
        }
    }

    fn noise(slot: usize, buffer: NoiseBuffer, time: f64) -> Self {
        let mut source = NoiseSource::new(buffer);
        source.start(time);
        Self {
            slot,
            source: Source::Noise(source),
            gain: 1.0,
            panner: None,
        }
    }

    fn with_gain(mut self, gain: f32) -> Self {
        self.gain = gain;
        self
    }

    fn with_pan(mut self, pan: f32) -> Self {
        if pan != 0.0 {
            self.panner = Some(PannerNode::fixed(pan));
        }
        self
    }

    fn frequency_mut(&mut self) -> Option<&mut AutomationParam> {
        match &mut self.source {
            Source::Tone(node) => Some(&mut node.frequency),
            Source::Noise(_) => None,
        }
    }

    fn frequency(&self) -> Option<&AutomationParam> {
        match &self.source {
            Source::Tone(node) => Some(&node.frequency),
            Source::Noise(_) => None,
        }
    }

    fn stop(&mut self, time: f64) {
        match &mut self.source {
            Source::Tone(node) => node.stop(time),
            Source::Noise(source) => source.stop(time),
        }
    }

    fn stop_time(&self) -> Option<f64> {
        match &self.source {
            Source::Tone(node) => node.lifecycle().stop_time(),
            Source::Noise(source) => source.lifecycle().stop_time(),
        }
    }

    fn cancel_stop(&mut self) {
        match &mut self.source {
            Source::Tone(node) => node.cancel_stop(),
            Source::Noise(source) => source.cancel_stop(),
        }
    }

    fn dispose(&mut self) {
        match &mut self.source {
            Source::Tone(node) => node.dispose(),
            Source::Noise(source) => source.dispose(),
        }
    }

    #[inline]
    fn render(&mut self, time: f64, frequency_offset: f32, detune_offset: f32) -> (f32, f32) {
        let s = match &mut self.source {
            Source::Tone(node) => node.render(time, frequency_offset, detune_offset),
            Source::Noise(source) => source.render(time),
        } * self.gain;
        match &self.panner {
            Some(panner) => panner.process_stereo(time, s, s, 0.0),
            None => (s, s),
        }
    }
}

fn node_waveform(waveform: OscillatorWaveform) -> Waveform {
    match waveform {
        OscillatorWaveform::Sine => Waveform::Sine,
        OscillatorWaveform::Triangle => Waveform::Triangle,
        OscillatorWaveform::Square => Waveform::Square,
        OscillatorWaveform::Sawtooth
        | OscillatorWaveform::Supersaw
        | OscillatorWaveform::Noise => Waveform::Sawtooth,
    }
}

fn offset_param() -> AutomationParam {
    AutomationParam::new(0.0, f32::MIN, f32::MAX)
}

/// Smoothed modulation offsets, one timeline per destination.
#[derive(Debug, Clone)]
struct ModOffsets {
    cutoff: AutomationParam,
    resonance: AutomationParam,
    amp_gain: AutomationParam,
    pan: AutomationParam,
    level: [AutomationParam; OSCILLATOR_COUNT],
    detune: [AutomationParam; OSCILLATOR_COUNT],
    pitch: [AutomationParam; OSCILLATOR_COUNT],
}

impl ModOffsets {
    fn new() -> Self {
        Self {
            cutoff: offset_param(),
            resonance: offset_param(),
            amp_gain: offset_param(),
            pan: offset_param(),
            level: core::array::from_fn(|_| offset_param()),
            detune: core::array::from_fn(|_| offset_param()),
            pitch: core::array::from_fn(|_| offset_param()),
        }
    }

    fn get(&self, destination: Destination) -> Option<&AutomationParam> {
        match destination {
            Destination::FilterCutoff => Some(&self.cutoff),
            Destination::FilterResonance => Some(&self.resonance),
            Destination::AmpGain => Some(&self.amp_gain),
            Destination::Pan => Some(&self.pan),
            Destination::OscLevel(i) => self.level.get(i),
            Destination::OscDetune(i) => self.detune.get(i),
            Destination::OscPitch(i) => self.pitch.get(i),
        }
    }

    fn get_mut(&mut self, destination: Destination) -> Option<&mut AutomationParam> {
        match destination {
            Destination::FilterCutoff => Some(&mut self.cutoff),
            Destination::FilterResonance => Some(&mut self.resonance),
            Destination::AmpGain => Some(&mut self.amp_gain),
            Destination::Pan => Some(&mut self.pan),
            Destination::OscLevel(i) => self.level.get_mut(i),
            Destination::OscDetune(i) => self.detune.get_mut(i),
            Destination::OscPitch(i) => self.pitch.get_mut(i),
        }
    }

    fn clear(&mut self) {
        for param in [
            &mut self.cutoff,
            &mut self.resonance,
            &mut self.amp_gain,
            &mut self.pan,
        ] {
            param.clear();
        }
        for param in self
            .level
            .iter_mut()
            .chain(self.detune.iter_mut())
            .chain(self.pitch.iter_mut())
        {
            param.clear();
        }
    }
}

/// Oscillator bank, drive, filter and envelopes for one note at a time.
///
/// # Example
///
/// ```rust
/// use dawg_core::NoiseBuffer;
/// use dawg_synth::{NoteEvent, SubtractiveVoice, SynthPatch, Voice};
///
/// let mut voice = SubtractiveVoice::new(48000.0, NoiseBuffer::new(4096, 1));
/// voice.trigger(&SynthPatch::default(), &NoteEvent::new(60, 100), 0.0);
///
/// let f = voice.oscillator_frequency(0, 0.0).unwrap();
/// assert!((f - 261.63).abs() < 0.01);
///
/// let remaining = voice.release(1.0);
/// assert!(remaining > 0.0);
/// ```
#[derive(Debug, Clone)]
pub struct SubtractiveVoice {
    sample_rate: f32,
    noise: NoiseBuffer,
    patch: SynthPatch,
    generators: Vec<Generator>,
    levels: [GainNode; OSCILLATOR_COUNT],
    shaper: WaveShaperNode,
    drive: f32,
    filter: FilterNode,
    amp: GainNode,
    trim: GainNode,
    panner: PannerNode,
    filter_env: Envelope,
    amp_env: Envelope,
    lfos: [Lfo; LFO_COUNT],
    targets: ModTargetRegistry,
    offsets: ModOffsets,
    pitch_bend: AutomationParam,
    bpm: f32,
    note: Option<u8>,
    velocity: u8,
    frequency: f32,
    params: NoteParams,
    base_cutoff: f32,
    start_time: f64,
    stop_time: Option<f64>,
    active: bool,
    disposed: bool,
}

impl SubtractiveVoice {
    /// Create an idle voice. `noise` is shared by every noise oscillator.
    pub fn new(sample_rate: f32, noise: NoiseBuffer) -> Self {
        let mut amp = GainNode::new(1.0);
        amp.gain.set_immediate(0.0, 0.0);
        Self {
            sample_rate,
            noise,
            patch: SynthPatch::default(),
            generators: Vec::new(),
            levels: core::array::from_fn(|_| GainNode::new(1.0)),
            shaper: WaveShaperNode::default(),
            drive: 0.0,
            filter: FilterNode::new(sample_rate, dawg_core::FilterKind::Lowpass),
            amp,
            trim: GainNode::new(2.0),
            panner: PannerNode::new(),
            filter_env: Envelope::default(),
            amp_env: Envelope::default(),
            lfos: core::array::from_fn(|_| Lfo::default()),
            targets: ModTargetRegistry::default(),
            offsets: ModOffsets::new(),
            pitch_bend: AutomationParam::new(0.0, -DETUNE_RANGE, DETUNE_RANGE),
            bpm: 120.0,
            note: None,
            velocity: 0,
            frequency: 0.0,
            params: NoteParams::default(),
            base_cutoff: 0.0,
            start_time: 0.0,
            stop_time: None,
            active: false,
            disposed: false,
        }
    }

    /// Velocity of the current note.
    pub fn velocity(&self) -> u8 {
        self.velocity
    }

    /// Fundamental of the current note in Hz.
    pub fn frequency(&self) -> f32 {
        self.frequency
    }

    /// Time of the last trigger.
    pub fn start_time(&self) -> f64 {
        self.start_time
    }

    /// Scheduled generator stop time, once released.
    pub fn stop_time(&self) -> Option<f64> {
        self.stop_time
    }

    /// Cutoff after key tracking and controllers, before envelope and LFOs.
    pub fn base_cutoff(&self) -> f32 {
        self.base_cutoff
    }

    /// Number of running generators.
    pub fn generator_count(&self) -> usize {
        self.generators.len()
    }

    /// Amplitude envelope.
    pub fn amp_envelope(&self) -> &Envelope {
        &self.amp_env
    }

    /// Filter envelope.
    pub fn filter_envelope(&self) -> &Envelope {
        &self.filter_env
    }

    /// Filter node.
    pub fn filter(&self) -> &FilterNode {
        &self.filter
    }

    /// Output gain timeline driven by the amplitude envelope.
    pub fn amp_gain(&self) -> &AutomationParam {
        &self.amp.gain
    }

    /// Per-voice LFO.
    pub fn lfo(&self, index: usize) -> Option<&Lfo> {
        self.lfos.get(index)
    }

    /// Frequency timeline of the first tonal generator in oscillator `slot`.
    pub fn oscillator_frequency_param(&self, slot: usize) -> Option<&AutomationParam> {
        self.generators
            .iter()
            .filter(|g| g.slot == slot)
            .find_map(Generator::frequency)
    }

    /// Scheduled frequency of oscillator `slot` at `time`, before detune.
    pub fn oscillator_frequency(&self, slot: usize, time: f64) -> Option<f32> {
        self.oscillator_frequency_param(slot)
            .map(|p| p.value_at(time))
    }

    /// Latest stop time scheduled on any generator.
    pub fn generator_stop_time(&self) -> Option<f64> {
        self.generators
            .iter()
            .filter_map(Generator::stop_time)
            .reduce(f64::max)
    }

    /// Modulation destinations this voice currently exposes.
    pub fn mod_targets(&self) -> &ModTargetRegistry {
        &self.targets
    }

    /// Value of per-voice modulation sources. `None` for engine-level ones.
    pub fn source_value(&self, source: ModSource, time: f64) -> Option<f32> {
        match source {
            ModSource::FilterEnvelope => Some(self.filter_env.normalized_at(time)),
            ModSource::AmpEnvelope => Some(self.amp_env.normalized_at(time)),
            ModSource::Velocity => Some(midi_to_bipolar(self.velocity)),
            ModSource::Lfo(_) | ModSource::Aftertouch | ModSource::ModWheel => None,
        }
    }

    /// Glide every registered destination toward its new modulated value.
    pub fn apply_modulation(&mut self, offsets: &DestinationOffsets, time: f64) {
        for (destination, target) in self.targets.iter() {
            let value = target.offset(offsets.sum(destination));
            let Some(param) = self.offsets.get_mut(destination) else {
                continue;
            };
            let settled = param.last_event_time().is_none_or(|t| t <= time);
            if settled && param.value_at(time) == value {
                continue;
            }
            param.compact(time);
            param.cancel_and_hold(time);
            param.ramp_linear(value, time + MODULATION_SMOOTHING);
        }
    }

    /// Base plus smoothed modulation offset of `destination` at `time`.
    pub fn modulated_value(&self, destination: Destination, time: f64) -> Option<f32> {
        let target = self.targets.get(destination)?;
        let offset = self.offsets.get(destination).map_or(0.0, |p| p.value_at(time));
        Some((target.base + offset).clamp(target.min, target.max))
    }

    /// Pitch bend in cents, applied to every oscillator.
    pub fn set_pitch_bend(&mut self, cents: f32, time: f64) {
        self.pitch_bend.compact(time);
        self.pitch_bend.cancel_and_hold(time);
        self.pitch_bend.set_immediate(cents, time);
    }

    /// Tempo for synced LFOs.
    pub fn set_bpm(&mut self, bpm: f32, time: f64) {
        if bpm > 0.0 && bpm.is_finite() {
            self.bpm = bpm;
            for lfo in &mut self.lfos {
                lfo.set_bpm(bpm, time);
            }
        }
    }

    /// Apply new filter settings to the sounding note.
    ///
    /// Type, resonance and drive change at `time`. The cutoff and envelope
    /// amount apply from the next trigger.
    pub fn update_filter(&mut self, spec: &FilterSpec, time: f64) {
        let spec = spec.sanitized();
        self.patch.filter = spec;
        self.filter.set_kind(spec.kind);
        self.filter.q.compact(time);
        self.filter.q.cancel_and_hold(time);
        self.filter.q.set_immediate(spec.resonance, time);
        self.targets
            .set_base(Destination::FilterResonance, spec.resonance);
        self.set_drive(spec.drive);
    }

    /// Apply new oscillator settings to the sounding note.
    ///
    /// Level and detune change at `time`; waveform and unison apply from the
    /// next trigger.
    pub fn update_oscillator(&mut self, slot: usize, spec: &OscillatorSpec, time: f64) {
        let Some(level) = self.levels.get_mut(slot) else {
            return;
        };
        let spec = spec.sanitized();
        let level_value = if spec.enabled { spec.level } else { 0.0 };
        level.gain.compact(time);
        level.gain.cancel_and_hold(time);
        level.gain.ramp_linear(level_value, time + MODULATION_SMOOTHING);
        self.patch.oscillators[slot] = spec;
        self.targets.set_base(Destination::OscLevel(slot), spec.level);
        self.targets.set_base(Destination::OscDetune(slot), spec.detune);
    }

    /// Replace envelope settings. They apply from the next trigger or release.
    pub fn update_envelopes(&mut self, filter: &EnvelopeParams, amplitude: &EnvelopeParams) {
        self.patch.filter_envelope = filter_envelope_params(filter);
        self.patch.amplitude_envelope = amplitude_envelope_params(amplitude);
        self.filter_env.set_params(EnvelopeParams {
            velocity_sensitivity: self.patch.filter.velocity_sensitivity,
            ..self.patch.filter_envelope
        });
        self.amp_env.set_params(self.patch.amplitude_envelope);
    }

    /// Apply new settings to per-voice LFO `index`, keeping its phase.
    pub fn update_lfo(&mut self, index: usize, settings: &LfoSettings, time: f64) {
        let Some(lfo) = self.lfos.get_mut(index) else {
            return;
        };
        self.patch.lfos[index] = *settings;
        if lfo.is_running() {
            lfo.configure(settings, time);
        }
    }

    fn set_drive(&mut self, drive: f32) {
        let drive = drive.clamp(0.0, 1.0);
        if drive > 0.0 && (drive - self.drive).abs() > f32::EPSILON {
            self.shaper
                .set_curve(soft_saturation_curve(drive, DRIVE_CURVE_LEN));
        }
        self.drive = drive;
    }

    fn compute_base_cutoff(&self, spec: &FilterSpec, event: &NoteEvent) -> f32 {
        let mut cutoff = spec.cutoff;
        let ratio = event.frequency / KEY_TRACKING_REFERENCE_HZ;
        cutoff += (ratio - 1.0) * spec.key_tracking * cutoff * 0.5;
        cutoff = cutoff.clamp(MIN_CUTOFF, MAX_CUTOFF);
        let base = cutoff;
        cutoff += event.params.mod_wheel.clamp(0.0, 1.0) * base;
        cutoff += event.params.aftertouch.clamp(0.0, 1.0) * base * 0.5;
        cutoff.clamp(MIN_CUTOFF, MAX_CUTOFF)
    }

    fn build_generators(&mut self, event: &NoteEvent, time: f64) {
        for generator in &mut self.generators {
            generator.dispose();
        }
        self.generators.clear();

        for (slot, spec) in self.patch.oscillators.iter().enumerate() {
            if !spec.enabled {
                continue;
            }
            let frequency = event.frequency * spec.octave_ratio();
            let waveform = node_waveform(spec.waveform);
            if spec.waveform == OscillatorWaveform::Noise {
                self.generators
                    .push(Generator::noise(slot, self.noise.clone(), time));
            } else if let Some(stack) = spec.unison_stack() {
                let count = usize::from(stack.voices);
                for k in 0..count {
                    let (detune, pan) = stack.placement(k);
                    // Spread start phases so the stack does not sum coherently.
                    let phase = (k as f32 * 0.618_034).fract();
                    self.generators.push(
                        Generator::tone(
                            slot,
                            self.sample_rate,
                            waveform,
                            frequency,
                            spec.detune + detune,
                            phase,
                            time,
                        )
                        .with_gain(stack.gain())
                        .with_pan(pan),
                    );
                }
            } else if let Some(width) = spec.pulse() {
                // Difference of two saws offset by the duty cycle.
                for (phase, gain) in [(0.0, 1.0), (width, -1.0)] {
                    self.generators.push(
                        Generator::tone(
                            slot,
                            self.sample_rate,
                            Waveform::Sawtooth,
                            frequency,
                            spec.detune,
                            phase,
                            time,
                        )
                        .with_gain(gain),
                    );
                }
            } else {
                self.generators.push(Generator::tone(
                    slot,
                    self.sample_rate,
                    waveform,
                    frequency,
                    spec.detune,
                    0.0,
                    time,
                ));
            }
        }
    }

    fn trigger_envelopes(&mut self, event: &NoteEvent, time: f64) {
        let filter = self.patch.filter;
        self.base_cutoff = self.compute_base_cutoff(&filter, event);
        let peak = (self.base_cutoff + filter.envelope_amount).clamp(MIN_CUTOFF, MAX_CUTOFF);

        self.filter_env.set_params(EnvelopeParams {
            velocity_sensitivity: filter.velocity_sensitivity,
            ..filter_envelope_params(&self.patch.filter_envelope)
        });
        self.filter.frequency.compact(time);
        self.filter_env.trigger_from(
            &mut self.filter.frequency,
            time,
            self.base_cutoff,
            peak,
            event.velocity,
        );

        self.amp_env
            .set_params(amplitude_envelope_params(&self.patch.amplitude_envelope));
        self.amp.gain.compact(time);
        self.amp_env
            .trigger(&mut self.amp.gain, time, 1.0, event.velocity);

        self.targets
            .set_base(Destination::FilterCutoff, self.base_cutoff);
    }

    fn start_lfos(&mut self, event: &NoteEvent, time: f64) {
        let resonance = self.patch.filter.resonance;
        for (lfo, settings) in self.lfos.iter_mut().zip(self.patch.lfos.iter()) {
            lfo.halt();
            lfo.configure(settings, time);
            lfo.set_bpm(self.bpm, time);
            let Some(target) = settings.target else {
                continue;
            };
            if lfo.depth() <= 0.0 || lfo.effective_frequency() <= 0.0 {
                continue;
            }
            let amount = match target {
                LfoTarget::FilterCutoff => self.base_cutoff * 0.5,
                LfoTarget::FilterResonance => resonance * 0.5,
                LfoTarget::OscillatorLevel => 1.0,
                LfoTarget::Detune => 100.0,
                LfoTarget::Pitch => event.frequency * 0.06,
            };
            lfo.connect(target, amount);
            lfo.start(time);
        }
    }

    fn register_targets(&mut self) {
        self.targets.clear();
        self.targets.register(
            Destination::FilterCutoff,
            ModTarget {
                base: self.base_cutoff,
                range: MAX_CUTOFF - MIN_CUTOFF,
                min: MIN_CUTOFF,
                max: MAX_CUTOFF,
            },
        );
        self.targets.register(
            Destination::FilterResonance,
            ModTarget {
                base: self.patch.filter.resonance,
                range: MAX_Q - MIN_Q,
                min: MIN_Q,
                max: MAX_Q,
            },
        );
        for (slot, spec) in self.patch.oscillators.iter().enumerate() {
            if !spec.enabled {
                continue;
            }
            self.targets.register(
                Destination::OscLevel(slot),
                ModTarget {
                    base: spec.level,
                    range: 1.0,
                    min: 0.0,
                    max: 1.0,
                },
            );
            self.targets.register(
                Destination::OscDetune(slot),
                ModTarget {
                    base: spec.detune,
                    range: 200.0,
                    min: -DETUNE_RANGE,
                    max: DETUNE_RANGE,
                },
            );
            self.targets.register(
                Destination::OscPitch(slot),
                ModTarget {
                    base: 0.0,
                    range: 24.0,
                    min: -24.0,
                    max: 24.0,
                },
            );
        }
        self.targets.register(
            Destination::AmpGain,
            ModTarget {
                base: 1.0,
                range: 2.0,
                min: 0.0,
                max: 2.0,
            },
        );
        self.targets.register(
            Destination::Pan,
            ModTarget {
                base: 0.0,
                range: 2.0,
                min: -1.0,
                max: 1.0,
            },
        );
    }

    #[inline]
    fn lfo_sum(&self, target: LfoTarget, time: f64) -> f32 {
        self.lfos
            .iter()
            .map(|lfo| lfo.modulation_for(target, time))
            .sum()
    }
}

impl Voice for SubtractiveVoice {
    type Patch = SynthPatch;

    fn trigger(&mut self, patch: &SynthPatch, event: &NoteEvent, time: f64) {
        if self.disposed {
            return;
        }
        self.patch = SynthPatch {
            oscillators: patch.oscillators.map(|o| o.sanitized()),
            filter: patch.filter.sanitized(),
            ..patch.clone()
        };
        self.note = Some(event.note);
        self.velocity = event.velocity;
        self.frequency = event.frequency;
        self.params = event.params;
        self.start_time = time;
        self.stop_time = None;
        self.active = true;

        self.build_generators(event, time);
        for (level, spec) in self.levels.iter_mut().zip(self.patch.oscillators.iter()) {
            level.gain.clear();
            level.gain.set_immediate(spec.level, time);
        }

        let filter = self.patch.filter;
        self.filter.set_kind(filter.kind);
        self.filter.q.clear();
        self.filter.q.set_immediate(filter.resonance, time);
        self.set_drive(filter.drive);

        self.offsets.clear();
        self.trigger_envelopes(event, time);
        self.register_targets();
        self.start_lfos(event, time);

        debug!(
            note = event.note,
            velocity = event.velocity,
            generators = self.generators.len(),
            cutoff = self.base_cutoff,
            "voice triggered"
        );
    }

    fn release(&mut self, time: f64) -> f64 {
        if !self.active || self.amp_env.is_releasing() {
            return self.stop_time.map_or(0.0, |stop| (stop - time).max(0.0));
        }
        let amp_end = self.amp_env.release(&mut self.amp.gain, time, None);
        self.filter_env
            .release(&mut self.filter.frequency, time, None);

        let stop = amp_end + RELEASE_MARGIN;
        for generator in &mut self.generators {
            generator.stop(stop);
        }
        for lfo in &mut self.lfos {
            lfo.stop(stop);
        }
        self.stop_time = Some(stop);
        stop - time
    }

    fn reset(&mut self, time: f64) {
        self.amp.gain.cancel_and_hold(time);
        self.amp.gain.set_immediate(0.0, time);
        self.amp.gain.compact(time);
        for generator in &mut self.generators {
            generator.dispose();
        }
        self.generators.clear();
        for lfo in &mut self.lfos {
            lfo.halt();
        }
        self.amp_env.reset();
        self.filter_env.reset();
        self.filter.reset();
        self.offsets.clear();
        self.targets.clear();
        self.note = None;
        self.stop_time = None;
        self.active = false;
    }

    fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        for generator in &mut self.generators {
            generator.dispose();
        }
        self.generators.clear();
        for lfo in &mut self.lfos {
            lfo.halt();
        }
        self.amp.gain.clear();
        self.filter.frequency.clear();
        self.filter.q.clear();
        self.targets.clear();
        self.note = None;
        self.active = false;
        self.disposed = true;
    }

    fn current_amplitude(&self, time: f64) -> f32 {
        if self.active {
            self.amp_env.value_at(time)
        } else {
            0.0
        }
    }

    fn glide_to(&mut self, event: &NoteEvent, time: f64, duration: f64) {
        if !self.active {
            return;
        }
        let from = self.frequency;
        self.note = Some(event.note);
        self.frequency = event.frequency;
        let oscillators = self.patch.oscillators;
        for generator in &mut self.generators {
            let ratio = oscillators[generator.slot].octave_ratio();
            let Some(param) = generator.frequency_mut() else {
                continue;
            };
            param.compact(time);
            param.cancel_and_hold(time);
            let target = event.frequency * ratio;
            if duration > 0.0 {
                param.ramp_exponential(target, time + duration);
            } else {
                param.set_immediate(target, time);
            }
        }
        debug!(from, to = event.frequency, duration, "glide");
    }

    fn retrigger(&mut self, event: &NoteEvent, time: f64) {
        if !self.active {
            return;
        }
        self.velocity = event.velocity;
        self.params = event.params;
        self.stop_time = None;
        for generator in &mut self.generators {
            generator.cancel_stop();
        }
        for lfo in &mut self.lfos {
            lfo.cancel_stop();
        }
        self.trigger_envelopes(event, time);
    }

    fn note(&self) -> Option<u8> {
        self.note
    }

    fn is_active(&self) -> bool {
        self.active
    }

    fn is_releasing(&self) -> bool {
        self.active && self.amp_env.is_releasing()
    }

    fn is_finished(&self, time: f64) -> bool {
        !self.active || self.amp_env.is_finished(time)
    }

    #[inline]
    fn render(&mut self, time: f64) -> (f32, f32) {
        for lfo in &mut self.lfos {
            lfo.poll(time);
        }
        if !self.active || self.stop_time.is_some_and(|stop| time >= stop) {
            return (0.0, 0.0);
        }

        let pitch_lfo = self.lfo_sum(LfoTarget::Pitch, time);
        let detune_lfo = self.lfo_sum(LfoTarget::Detune, time);
        let level_lfo = self.lfo_sum(LfoTarget::OscillatorLevel, time);
        let bend = self.pitch_bend.value_at(time);

        let mut level = [0.0f32; OSCILLATOR_COUNT];
        let mut detune = [0.0f32; OSCILLATOR_COUNT];
        for slot in 0..OSCILLATOR_COUNT {
            let base_level = self.patch.oscillators[slot].level;
            level[slot] = self.levels[slot].gain_at(
                time,
                self.offsets.level[slot].value_at(time) + level_lfo * base_level,
            );
            detune[slot] = self.offsets.detune[slot].value_at(time)
                + self.offsets.pitch[slot].value_at(time) * 100.0
                + detune_lfo
                + bend;
        }

        let (mut left, mut right) = (0.0f32, 0.0f32);
        for generator in &mut self.generators {
            let slot = generator.slot;
            let (l, r) = generator.render(time, pitch_lfo, detune[slot]);
            left += l * level[slot];
            right += r * level[slot];
        }

        if self.drive > 0.0 {
            let d = self.drive;
            left = left * (1.0 - d) + self.shaper.process(left) * d;
            right = right * (1.0 - d) + self.shaper.process(right) * d;
        }

        let cutoff_offset =
            self.offsets.cutoff.value_at(time) + self.lfo_sum(LfoTarget::FilterCutoff, time);
        let q_offset =
            self.offsets.resonance.value_at(time) + self.lfo_sum(LfoTarget::FilterResonance, time);
        let (l, r) = self
            .filter
            .process_stereo(time, left, right, cutoff_offset, q_offset);
        let (l, r) = self.amp.process_stereo(time, l, r, 0.0);
        let (l, r) = self
            .trim
            .process_stereo(time, l, r, self.offsets.amp_gain.value_at(time));
        let (l, r) = self
            .panner
            .process_stereo(time, l, r, self.offsets.pan.value_at(time));
        (flush_denormal(l), flush_denormal(r))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::{EnvelopeCurve, EnvelopeStage};
    use crate::lfo::LfoWaveform;
    use crate::patch::UnisonSpec;

    const SR: f32 = 48000.0;

    fn voice() -> SubtractiveVoice {
        SubtractiveVoice::new(SR, NoiseBuffer::new(4096, 3))
    }

    fn patch_with(osc: OscillatorSpec) -> SynthPatch {
        let mut patch = SynthPatch::default();
        patch.oscillators[0] = osc;
        patch
    }

    #[test]
    fn test_trigger_sets_note_frequency() {
        let mut v = voice();
        v.trigger(&SynthPatch::default(), &NoteEvent::new(60, 100), 0.5);
        let f = v.oscillator_frequency(0, 0.5).unwrap();
        assert!((f - 261.63).abs() < 0.01, "got {f}");
        assert_eq!(v.note(), Some(60));
        assert!(v.is_active());
        assert_eq!(v.generator_count(), 1);
    }

    #[test]
    fn test_octave_shift() {
        let mut v = voice();
        let osc = OscillatorSpec {
            octave: -1,
            ..OscillatorSpec::default()
        };
        v.trigger(&patch_with(osc), &NoteEvent::new(69, 100), 0.0);
        assert!((v.oscillator_frequency(0, 0.0).unwrap() - 220.0).abs() < 1e-3);
    }

    #[test]
    fn test_supersaw_builds_power_compensated_stack() {
        let mut v = voice();
        let osc = OscillatorSpec::new(OscillatorWaveform::Supersaw, 1.0);
        v.trigger(&patch_with(osc), &NoteEvent::new(60, 100), 0.0);
        assert_eq!(v.generator_count(), 7);
        let gain = (1.0f32 / 7.0).sqrt();
        assert!(v.generators.iter().all(|g| (g.gain - gain).abs() < 1e-6));
        // Outer copies are panned, the centre copy is not.
        assert!(v.generators[0].panner.is_some());
        assert!(v.generators[3].panner.is_none());
    }

    #[test]
    fn test_unison_on_plain_waveform() {
        let mut v = voice();
        let osc = OscillatorSpec {
            unison: Some(UnisonSpec {
                voices: 3,
                detune: 10.0,
                spread: 0.0,
            }),
            ..OscillatorSpec::new(OscillatorWaveform::Triangle, 1.0)
        };
        v.trigger(&patch_with(osc), &NoteEvent::new(60, 100), 0.0);
        assert_eq!(v.generator_count(), 3);
    }

    #[test]
    fn test_pulse_width_uses_two_saws_without_dc() {
        let mut v = voice();
        let osc = OscillatorSpec {
            pulse_width: Some(0.25),
            ..OscillatorSpec::new(OscillatorWaveform::Square, 1.0)
        };
        v.trigger(&patch_with(osc), &NoteEvent::new(69, 100), 0.0);
        assert_eq!(v.generator_count(), 2);

        // 440 Hz does not divide 48 kHz evenly; average over many cycles.
        let n = 48000;
        let mut sum = 0.0f64;
        for i in 0..n {
            let t = f64::from(i) / f64::from(SR);
            let (a, _) = v.generators[0].render(t, 0.0, 0.0);
            let (b, _) = v.generators[1].render(t, 0.0, 0.0);
            sum += f64::from(a + b);
        }
        let mean = sum / f64::from(n);
        assert!(mean.abs() < 0.01, "DC offset {mean}");
    }

    #[test]
    fn test_noise_shares_injected_buffer() {
        let buffer = NoiseBuffer::new(1024, 9);
        let mut v = SubtractiveVoice::new(SR, buffer.clone());
        let osc = OscillatorSpec::new(OscillatorWaveform::Noise, 1.0);
        v.trigger(&patch_with(osc), &NoteEvent::new(60, 100), 0.0);
        // Caller, voice, and the running source.
        assert_eq!(buffer.handle_count(), 3);
        assert!(v.oscillator_frequency(0, 0.0).is_none());
        v.reset(0.1);
        assert_eq!(buffer.handle_count(), 2);
    }

    #[test]
    fn test_key_tracking_raises_cutoff_for_high_notes() {
        let mut patch = SynthPatch::default();
        patch.filter.cutoff = 1000.0;
        patch.filter.key_tracking = 1.0;
        let mut v = voice();
        v.trigger(&patch, &NoteEvent::new(72, 100), 0.0);
        // One octave above the reference: 1000 + 1.0 * 1000 * 0.5.
        assert!((v.base_cutoff() - 1500.0).abs() < 1.0, "{}", v.base_cutoff());

        v.trigger(&patch, &NoteEvent::new(48, 100), 1.0);
        assert!((v.base_cutoff() - 750.0).abs() < 1.0, "{}", v.base_cutoff());
    }

    #[test]
    fn test_controllers_raise_cutoff() {
        let mut patch = SynthPatch::default();
        patch.filter.cutoff = 1000.0;
        let mut v = voice();
        let event = NoteEvent::new(60, 100).with_params(NoteParams {
            mod_wheel: 1.0,
            aftertouch: 1.0,
        });
        v.trigger(&patch, &event, 0.0);
        assert!((v.base_cutoff() - 2500.0).abs() < 1e-3);

        patch.filter.cutoff = 15000.0;
        v.trigger(&patch, &event, 1.0);
        assert_eq!(v.base_cutoff(), MAX_CUTOFF);
    }

    #[test]
    fn test_filter_envelope_sweeps_from_base() {
        let mut patch = SynthPatch::default();
        patch.filter.cutoff = 500.0;
        patch.filter.envelope_amount = 3000.0;
        patch.filter.velocity_sensitivity = 0.0;
        patch.filter_envelope.attack = 0.1;
        let mut v = voice();
        v.trigger(&patch, &NoteEvent::new(60, 100), 0.0);
        assert!((v.filter().frequency.value_at(0.0) - 500.0).abs() < 1e-3);
        assert!((v.filter().frequency.value_at(0.1) - 3500.0).abs() < 0.5);
    }

    fn ramp_counts(events: &[dawg_core::AutomationEvent]) -> (usize, usize) {
        use dawg_core::AutomationEvent;
        let linear = events
            .iter()
            .filter(|e| matches!(e, AutomationEvent::LinearRamp { .. }))
            .count();
        let exponential = events
            .iter()
            .filter(|e| matches!(e, AutomationEvent::ExponentialRamp { .. }))
            .count();
        (linear, exponential)
    }

    #[test]
    fn test_envelope_ramp_kind_fixed_by_role() {
        let mut patch = SynthPatch::default();
        patch.filter_envelope.curve = EnvelopeCurve::Linear;
        patch.amplitude_envelope.curve = EnvelopeCurve::Exponential;
        let mut v = voice();
        v.trigger(&patch, &NoteEvent::new(60, 100), 0.0);
        v.release(1.0);

        let (linear, exponential) = ramp_counts(v.filter().frequency.events());
        assert_eq!(linear, 0);
        assert!(exponential >= 2);
        let (linear, exponential) = ramp_counts(v.amp_gain().events());
        assert!(linear >= 3);
        assert_eq!(exponential, 0);
    }

    #[test]
    fn test_live_envelope_update_keeps_ramp_kind() {
        let mut v = voice();
        let filter = EnvelopeParams {
            attack: 0.1,
            ..EnvelopeParams::default()
        };
        let amplitude = EnvelopeParams {
            curve: EnvelopeCurve::Exponential,
            ..EnvelopeParams::default()
        };
        v.update_envelopes(&filter, &amplitude);
        assert_eq!(v.patch.filter_envelope.curve, EnvelopeCurve::Exponential);
        assert_eq!(v.patch.amplitude_envelope.curve, EnvelopeCurve::Linear);

        let patch = v.patch.clone();
        v.trigger(&patch, &NoteEvent::new(60, 100), 0.0);

        assert_eq!(ramp_counts(v.filter().frequency.events()).0, 0);
        assert_eq!(ramp_counts(v.amp_gain().events()).1, 0);
    }

    #[test]
    fn test_release_schedules_stop_after_envelope() {
        let mut patch = SynthPatch::default();
        patch.amplitude_envelope.release = 0.5;
        let mut v = voice();
        v.trigger(&patch, &NoteEvent::new(60, 100), 0.0);
        let remaining = v.release(1.0);
        assert!((remaining - (0.5 + RELEASE_MARGIN)).abs() < 1e-9);
        assert!(v.amp_gain().value_at(1.5).abs() < 1e-6);
        assert!(v.generator_stop_time().unwrap() >= 1.5);
        assert!(v.is_releasing());
        assert!(v.is_finished(1.5));

        // A second release is a no-op.
        let again = v.release(1.2);
        assert!((again - (1.5 + RELEASE_MARGIN - 1.2)).abs() < 1e-9);
    }

    #[test]
    fn test_render_is_silent_after_stop() {
        let mut v = voice();
        v.trigger(&SynthPatch::default(), &NoteEvent::new(60, 127), 0.0);
        let mut peak = 0.0f32;
        for i in 0..4800 {
            let (l, _) = v.render(f64::from(i) / f64::from(SR));
            peak = peak.max(l.abs());
        }
        assert!(peak > 0.01, "voice produced no output");
        let stop = 0.1 + v.release(0.1);
        assert_eq!(v.render(stop + 0.001), (0.0, 0.0));
    }

    #[test]
    fn test_reset_silences_and_frees() {
        let mut v = voice();
        v.trigger(&SynthPatch::default(), &NoteEvent::new(60, 100), 0.0);
        v.reset(0.2);
        assert!(!v.is_active());
        assert_eq!(v.note(), None);
        assert_eq!(v.generator_count(), 0);
        assert_eq!(v.amp_gain().value_at(0.2), 0.0);
        assert_eq!(v.current_amplitude(0.3), 0.0);
        assert_eq!(v.render(0.3), (0.0, 0.0));
    }

    #[test]
    fn test_dispose_is_idempotent() {
        let mut v = voice();
        v.trigger(&SynthPatch::default(), &NoteEvent::new(60, 100), 0.0);
        v.dispose();
        v.dispose();
        v.trigger(&SynthPatch::default(), &NoteEvent::new(60, 100), 1.0);
        assert!(!v.is_active());
    }

    #[test]
    fn test_glide_ramps_exponentially() {
        let mut v = voice();
        v.trigger(&SynthPatch::default(), &NoteEvent::new(60, 100), 0.0);
        v.glide_to(&NoteEvent::new(67, 100), 1.0, 0.05);
        let param = v.oscillator_frequency_param(0).unwrap();
        let last = *param.events().last().unwrap();
        assert!(matches!(
            last,
            dawg_core::AutomationEvent::ExponentialRamp { .. }
        ));
        assert!((last.time() - 1.05).abs() < 1e-12);
        assert!((param.value_at(1.0) - midi_to_freq(60)).abs() < 1e-3);
        assert!((param.value_at(1.05) - midi_to_freq(67)).abs() < 1e-3);
        assert_eq!(v.note(), Some(67));
    }

    #[test]
    fn test_retrigger_cancels_pending_stop() {
        let mut v = voice();
        v.trigger(&SynthPatch::default(), &NoteEvent::new(60, 100), 0.0);
        v.release(0.5);
        v.retrigger(&NoteEvent::new(60, 100), 0.6);
        assert!(!v.is_releasing());
        assert_eq!(v.stop_time(), None);
        assert_eq!(v.generator_stop_time(), None);
        assert_eq!(v.amp_envelope().stage_at(0.6), EnvelopeStage::Attack);
    }

    #[test]
    fn test_voice_lfo_connects_to_cutoff() {
        let mut patch = SynthPatch::default();
        patch.lfos[0] = LfoSettings {
            frequency: 1.0,
            depth: 1.0,
            waveform: LfoWaveform::Sine,
            target: Some(LfoTarget::FilterCutoff),
            ..LfoSettings::default()
        };
        let mut v = voice();
        v.trigger(&patch, &NoteEvent::new(60, 100), 0.0);
        let lfo = v.lfo(0).unwrap();
        assert!(lfo.is_running());
        // Half the base cutoff at the sine peak.
        let m = lfo.modulation_for(LfoTarget::FilterCutoff, 0.25);
        assert!((m - 1000.0).abs() < 0.1, "{m}");
        assert!(!v.lfo(1).unwrap().is_running());
    }

    #[test]
    fn test_modulation_applies_with_smoothing() {
        let mut v = voice();
        v.trigger(&SynthPatch::default(), &NoteEvent::new(60, 100), 0.0);
        let mut offsets = DestinationOffsets::default();
        offsets.add(Destination::FilterCutoff, 0.5);
        v.apply_modulation(&offsets, 1.0);

        assert_eq!(v.modulated_value(Destination::FilterCutoff, 1.0), Some(2000.0));
        let settled = v
            .modulated_value(Destination::FilterCutoff, 1.0 + MODULATION_SMOOTHING)
            .unwrap();
        assert!((settled - 6995.0).abs() < 0.01, "{settled}");

        // Routes that disappear glide back to base.
        v.apply_modulation(&DestinationOffsets::default(), 2.0);
        let back = v
            .modulated_value(Destination::FilterCutoff, 2.0 + MODULATION_SMOOTHING)
            .unwrap();
        assert!((back - 2000.0).abs() < 0.01);
    }

    #[test]
    fn test_registry_rebuilt_per_trigger() {
        let mut patch = SynthPatch::default();
        let mut v = voice();
        v.trigger(&patch, &NoteEvent::new(60, 100), 0.0);
        assert!(v.mod_targets().get(Destination::OscLevel(1)).is_none());

        patch.oscillators[1] = OscillatorSpec::new(OscillatorWaveform::Sine, 0.4);
        v.trigger(&patch, &NoteEvent::new(60, 100), 1.0);
        let level = v.mod_targets().get(Destination::OscLevel(1)).unwrap();
        assert_eq!(level.base, 0.4);
    }

    #[test]
    fn test_envelope_sources() {
        let mut v = voice();
        v.trigger(&SynthPatch::default(), &NoteEvent::new(60, 127), 0.0);
        assert_eq!(v.source_value(ModSource::Velocity, 0.0), Some(1.0));
        let amp = v.source_value(ModSource::AmpEnvelope, 0.01).unwrap();
        assert!((amp - 1.0).abs() < 1e-4);
        assert_eq!(v.source_value(ModSource::ModWheel, 0.0), None);
    }

    #[test]
    fn test_drive_keeps_output_finite() {
        let mut patch = SynthPatch::default();
        patch.filter.drive = 1.0;
        patch.filter.resonance = 20.0;
        let mut v = voice();
        v.trigger(&patch, &NoteEvent::new(40, 127), 0.0);
        for i in 0..9600 {
            let (l, r) = v.render(f64::from(i) / f64::from(SR));
            assert!(l.is_finite() && r.is_finite());
        }
    }
}
