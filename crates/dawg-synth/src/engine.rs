//! Note-level synthesizer facade.
//!
//! [`SynthEngine`] ties the pieces together: it owns the current
//! [`SynthPatch`], a [`VoiceAllocator`] of [`SubtractiveVoice`]s, the
//! modulation matrix with its two shared LFOs, MIDI controller state and
//! the master output stage. Every call is scheduled against the engine's
//! [`Clock`]; methods taking an `Option<f64>` time use "now" when given
//! `None`.
//!
//! Deferred work (modulation ticks, freeing released voices) happens in
//! [`SynthEngine::poll`], which [`SynthEngine::render`] calls for every
//! sample, so offline rendering through a [`LogicalClock`] sees the same
//! timeline as live playback.
//!
//! # Example
//!
//! ```rust
//! use dawg_core::{Clock, LogicalClock};
//! use dawg_synth::{EngineConfig, SynthEngine};
//!
//! let clock = LogicalClock::new();
//! let mut engine = SynthEngine::new(EngineConfig::default(), clock.clone());
//! assert!(engine.load_factory_preset("pluck"));
//!
//! engine.note_on(60, 100, None);
//! let mut left = vec![0.0; 256];
//! let mut right = vec![0.0; 256];
//! engine.render(clock.now(), &mut left, &mut right);
//!
//! assert!(left.iter().any(|s| *s != 0.0));
//! ```
//!
//! [`LogicalClock`]: dawg_core::LogicalClock

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use dawg_core::{Clock, GainNode, NoiseBuffer, clamp_finite, midi_to_bipolar};

use crate::allocator::{VoiceAllocator, VoiceMode};
use crate::envelope::EnvelopeParams;
use crate::error::SynthError;
use crate::lfo::{Lfo, LfoSettings};
use crate::modulation::{
    MAX_SLOTS, ModSource, ModulationEngine, ModulationSlot, SourceActivation,
};
use crate::patch::{
    FilterSpec, LFO_COUNT, OSCILLATOR_COUNT, OscillatorSpec, SynthPatch, amplitude_envelope_params,
    filter_envelope_params,
};
use crate::preset::{ModulationSlotConfig, SynthPreset, factory_preset};
use crate::voice::{NoteEvent, NoteParams, SubtractiveVoice, Voice};

/// Ramp time for master volume changes.
pub const MASTER_RAMP_SECONDS: f64 = 0.02;

/// Length of the shared noise table.
const NOISE_SECONDS: f32 = 2.0;

const NOISE_SEED: u32 = 0x5EED_D0A6;

/// Engine-wide settings fixed at construction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineConfig {
    /// Output sample rate in Hz.
    pub sample_rate: f32,
    /// Voice pool capacity in poly mode.
    pub max_voices: usize,
    /// Modulation matrix polling rate in Hz.
    pub tick_rate_hz: f64,
    /// Pitch bend range in semitones either way.
    pub pitch_bend_range: f32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48000.0,
            max_voices: 16,
            tick_rate_hz: 60.0,
            pitch_bend_range: 2.0,
        }
    }
}

impl EngineConfig {
    /// Copy with unusable values replaced by defaults.
    pub fn sanitized(&self) -> Self {
        let defaults = Self::default();
        Self {
            sample_rate: if self.sample_rate.is_finite() && self.sample_rate > 0.0 {
                self.sample_rate
            } else {
                defaults.sample_rate
            },
            max_voices: self.max_voices.max(1),
            tick_rate_hz: if self.tick_rate_hz.is_finite() && self.tick_rate_hz > 0.0 {
                self.tick_rate_hz
            } else {
                defaults.tick_rate_hz
            },
            pitch_bend_range: clamp_finite(self.pitch_bend_range, 0.0, 24.0),
        }
    }
}

/// Feature flags for UI gating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Capabilities {
    /// More than one note at a time.
    pub supports_polyphony: bool,
    /// Responds to pitch bend.
    pub supports_pitch_bend: bool,
    /// Has a modulation matrix.
    pub supports_modulation_matrix: bool,
    /// Voice pool capacity.
    pub max_voices: usize,
    /// Number of modulation slots.
    pub max_modulation_slots: usize,
    /// Oscillators per voice.
    pub oscillator_count: usize,
    /// LFOs per voice.
    pub lfo_count: usize,
}

/// Polyphonic subtractive synthesizer.
pub struct SynthEngine {
    clock: Box<dyn Clock>,
    config: EngineConfig,
    name: String,
    description: Option<String>,
    patch: SynthPatch,
    allocator: VoiceAllocator<SubtractiveVoice>,
    matrix: ModulationEngine,
    mod_lfos: [Lfo; LFO_COUNT],
    mod_wheel: u8,
    aftertouch: u8,
    pitch_bend: f32,
    master: GainNode,
    master_volume: f32,
    bpm: f32,
}

impl SynthEngine {
    /// Create an engine with the init patch, scheduling against `clock`.
    pub fn new(config: EngineConfig, clock: impl Clock + 'static) -> Self {
        let config = config.sanitized();
        let noise = NoiseBuffer::new((config.sample_rate * NOISE_SECONDS) as usize, NOISE_SEED);
        let sample_rate = config.sample_rate;
        let allocator = VoiceAllocator::new(config.max_voices, VoiceMode::Poly, move || {
            SubtractiveVoice::new(sample_rate, noise.clone())
        });
        let defaults = SynthPreset::default();
        let mut master = GainNode::new(1.0);
        let now = clock.now();
        master.gain.set_immediate(defaults.master_volume, now);
        let patch = defaults.patch();

        Self {
            clock: Box::new(clock),
            config,
            name: defaults.name,
            description: None,
            mod_lfos: core::array::from_fn(|i| Lfo::new(patch.lfos[i])),
            patch,
            allocator,
            matrix: ModulationEngine::new(config.tick_rate_hz),
            mod_wheel: 0,
            aftertouch: 0,
            pitch_bend: 0.0,
            master,
            master_volume: defaults.master_volume,
            bpm: 120.0,
        }
    }

    /// Current time on the engine clock.
    pub fn now(&self) -> f64 {
        self.clock.now()
    }

    /// Engine settings.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Current voice settings.
    pub fn patch(&self) -> &SynthPatch {
        &self.patch
    }

    /// Name of the loaded preset.
    pub fn preset_name(&self) -> &str {
        &self.name
    }

    /// Voice pool.
    pub fn allocator(&self) -> &VoiceAllocator<SubtractiveVoice> {
        &self.allocator
    }

    /// Modulation matrix.
    pub fn modulation(&self) -> &ModulationEngine {
        &self.matrix
    }

    /// Shared matrix LFO `index`.
    pub fn mod_lfo(&self, index: usize) -> Option<&Lfo> {
        self.mod_lfos.get(index)
    }

    /// Master volume target.
    pub fn master_volume(&self) -> f32 {
        self.master_volume
    }

    /// Transport tempo.
    pub fn bpm(&self) -> f32 {
        self.bpm
    }

    /// Voices currently holding a note.
    pub fn active_voice_count(&self) -> usize {
        self.allocator.active_count()
    }

    /// Feature flags.
    pub fn capabilities(&self) -> Capabilities {
        Capabilities {
            supports_polyphony: self.allocator.mode() == VoiceMode::Poly,
            supports_pitch_bend: true,
            supports_modulation_matrix: true,
            max_voices: self.config.max_voices,
            max_modulation_slots: MAX_SLOTS,
            oscillator_count: OSCILLATOR_COUNT,
            lfo_count: LFO_COUNT,
        }
    }

    // --- notes ---

    /// Start `note`. Velocity 0 is a note-off.
    pub fn note_on(&mut self, note: u8, velocity: u8, time: Option<f64>) {
        let params = NoteParams {
            mod_wheel: f32::from(self.mod_wheel) / 127.0,
            aftertouch: f32::from(self.aftertouch) / 127.0,
        };
        self.note_on_with(note, velocity, time, params);
    }

    /// Start `note` with explicit controller values.
    pub fn note_on_with(&mut self, note: u8, velocity: u8, time: Option<f64>, params: NoteParams) {
        let time = self.resolve(time);
        if velocity == 0 {
            self.note_off(Some(note), Some(time));
            return;
        }
        let event = NoteEvent::new(note, velocity).with_params(params);
        let before = self.allocator.voices().len();
        self.allocator.note_on(&self.patch, &event, time);
        self.prepare_new_voices(before, time);
        debug!(note, velocity, time, "note on");
    }

    /// Release `note`, or every note when `None`.
    pub fn note_off(&mut self, note: Option<u8>, time: Option<f64>) {
        let time = self.resolve(time);
        match note {
            Some(note) => self.allocator.note_off(note, time),
            None => self.allocator.release_all(time),
        }
    }

    /// Release every note through its envelope.
    pub fn all_notes_off(&mut self, time: Option<f64>) {
        let time = self.resolve(time);
        self.allocator.release_all(time);
    }

    /// Silence every voice immediately.
    pub fn stop_all(&mut self) {
        let now = self.now();
        self.allocator.stop_all(now);
    }

    // --- live parameters ---

    /// Replace oscillator `index`.
    pub fn set_oscillator(&mut self, index: usize, spec: OscillatorSpec) -> Result<(), SynthError> {
        if index >= OSCILLATOR_COUNT {
            return Err(SynthError::oscillator_index(index, OSCILLATOR_COUNT));
        }
        let spec = spec.sanitized();
        self.patch.oscillators[index] = spec;
        let now = self.now();
        for voice in self.allocator.voices_mut() {
            voice.update_oscillator(index, &spec, now);
        }
        Ok(())
    }

    /// Replace the filter settings.
    pub fn set_filter(&mut self, spec: FilterSpec) {
        let spec = spec.sanitized();
        self.patch.filter = spec;
        let now = self.now();
        for voice in self.allocator.voices_mut() {
            voice.update_filter(&spec, now);
        }
    }

    /// Replace the filter envelope.
    pub fn set_filter_envelope(&mut self, params: EnvelopeParams) {
        self.patch.filter_envelope = filter_envelope_params(&params);
        self.push_envelopes();
    }

    /// Replace the amplitude envelope.
    pub fn set_amplitude_envelope(&mut self, params: EnvelopeParams) {
        self.patch.amplitude_envelope = amplitude_envelope_params(&params);
        self.push_envelopes();
    }

    /// Replace LFO `index`, on every voice and in the matrix.
    pub fn set_lfo(&mut self, index: usize, settings: LfoSettings) -> Result<(), SynthError> {
        if index >= LFO_COUNT {
            return Err(SynthError::lfo_index(index, LFO_COUNT));
        }
        self.patch.lfos[index] = settings;
        let now = self.now();
        for voice in self.allocator.voices_mut() {
            voice.update_lfo(index, &settings, now);
        }
        let shared = &mut self.mod_lfos[index];
        if shared.is_running() {
            shared.configure(&settings, now);
        }
        Ok(())
    }

    /// Replace modulation slot `index`, starting or stopping shared LFOs
    /// as their references change.
    pub fn set_modulation_slot(
        &mut self,
        index: usize,
        slot: ModulationSlot,
    ) -> Result<(), SynthError> {
        let change = self.matrix.set_slot(index, slot)?;
        let now = self.now();
        self.apply_activation(&change, now);
        Ok(())
    }

    /// Reset modulation slot `index`.
    pub fn clear_modulation_slot(&mut self, index: usize) -> Result<(), SynthError> {
        self.set_modulation_slot(index, ModulationSlot::default())
    }

    /// Output level, clamped to 0.0–1.0 and reached after a short ramp.
    pub fn set_master_volume(&mut self, volume: f32) {
        let volume = clamp_finite(volume, 0.0, 1.0);
        let now = self.now();
        self.master.gain.compact(now);
        self.master.gain.cancel_and_hold(now);
        self.master.gain.ramp_linear(volume, now + MASTER_RAMP_SECONDS);
        self.master_volume = volume;
    }

    /// Transport tempo for synced LFOs. Non-positive values are ignored.
    pub fn update_bpm(&mut self, bpm: f32) {
        if !(bpm.is_finite() && bpm > 0.0) {
            return;
        }
        self.bpm = bpm;
        let now = self.now();
        for voice in self.allocator.voices_mut() {
            voice.set_bpm(bpm, now);
        }
        for lfo in &mut self.mod_lfos {
            lfo.set_bpm(bpm, now);
        }
        debug!(bpm, "tempo updated");
    }

    /// Switch between poly and mono. Sounding voices are silenced.
    pub fn set_voice_mode(&mut self, mode: VoiceMode) {
        let now = self.now();
        self.allocator.set_mode(mode, now);
    }

    /// Current voice mode.
    pub fn voice_mode(&self) -> VoiceMode {
        self.allocator.mode()
    }

    /// Mono glide time in seconds.
    pub fn set_portamento(&mut self, seconds: f32) {
        self.allocator.set_portamento(f64::from(seconds));
    }

    /// Mono legato.
    pub fn set_legato(&mut self, legato: bool) {
        self.allocator.set_legato(legato);
    }

    /// Mod wheel position (0–127). Applies to notes started afterwards and
    /// to the `mod_wheel` matrix source immediately.
    pub fn set_mod_wheel(&mut self, value: u8) {
        self.mod_wheel = value.min(127);
    }

    /// Channel aftertouch (0–127).
    pub fn set_aftertouch(&mut self, value: u8) {
        self.aftertouch = value.min(127);
    }

    /// Pitch bend, -1.0 to 1.0 of the configured range.
    pub fn set_pitch_bend(&mut self, amount: f32) {
        self.pitch_bend = if amount.is_finite() {
            amount.clamp(-1.0, 1.0)
        } else {
            0.0
        };
        let cents = self.pitch_bend_cents();
        let now = self.now();
        for voice in self.allocator.voices_mut() {
            voice.set_pitch_bend(cents, now);
        }
    }

    /// Mod wheel position.
    pub fn mod_wheel(&self) -> u8 {
        self.mod_wheel
    }

    /// Aftertouch value.
    pub fn aftertouch(&self) -> u8 {
        self.aftertouch
    }

    /// Pitch bend position.
    pub fn pitch_bend(&self) -> f32 {
        self.pitch_bend
    }

    // --- presets ---

    /// Apply `preset`, silencing whatever is sounding.
    pub fn load_preset(&mut self, preset: &SynthPreset) {
        let now = self.now();
        self.allocator.stop_all(now);
        self.allocator.set_mode(preset.voice_mode, now);
        self.allocator.set_portamento(f64::from(preset.portamento));
        self.allocator.set_legato(preset.legato);

        self.patch = preset.patch();
        let change = self.matrix.clear_all();
        self.apply_activation(&change, now);
        for lfo in &mut self.mod_lfos {
            lfo.halt();
        }
        for (i, lfo) in self.mod_lfos.iter_mut().enumerate() {
            lfo.configure(&self.patch.lfos[i], now);
        }
        for slot in preset.modulation_slots() {
            if let Ok(change) = self.matrix.set_slot(slot.id, slot) {
                self.apply_activation(&change, now);
            }
        }
        self.set_master_volume(preset.master_volume);
        self.name.clone_from(&preset.name);
        self.description.clone_from(&preset.description);
        info!(name = %preset.name, "preset loaded");
    }

    /// Current state as a preset.
    pub fn export_preset(&self) -> SynthPreset {
        SynthPreset {
            name: self.name.clone(),
            description: self.description.clone(),
            oscillators: self.patch.oscillators.to_vec(),
            filter: self.patch.filter,
            filter_envelope: self.patch.filter_envelope,
            amplitude_envelope: self.patch.amplitude_envelope,
            lfos: self.patch.lfos.to_vec(),
            modulation: self
                .matrix
                .slots()
                .iter()
                .filter_map(ModulationSlotConfig::from_slot)
                .collect(),
            voice_mode: self.allocator.mode(),
            portamento: self.allocator.portamento() as f32,
            legato: self.allocator.legato(),
            master_volume: self.master_volume,
        }
    }

    /// Parse and apply preset JSON.
    pub fn load_preset_json(&mut self, json: &str) -> Result<(), SynthError> {
        let preset = SynthPreset::from_json(json)?;
        self.load_preset(&preset);
        Ok(())
    }

    /// Current state as preset JSON.
    pub fn export_preset_json(&self) -> Result<String, SynthError> {
        self.export_preset().to_json()
    }

    /// Apply the factory preset `name`. Returns `false` if there is none.
    pub fn load_factory_preset(&mut self, name: &str) -> bool {
        match factory_preset(name) {
            Some(preset) => {
                self.load_preset(&preset);
                true
            }
            None => false,
        }
    }

    // --- timeline ---

    /// Run modulation ticks and voice cleanups due by `now`.
    pub fn poll(&mut self, now: f64) {
        for lfo in &mut self.mod_lfos {
            lfo.poll(now);
        }
        while let Some(tick) = self.matrix.take_due_tick(now) {
            self.run_tick(tick);
        }
        self.allocator.poll(now);
    }

    /// Render a stereo block whose first frame is at `start_time`.
    ///
    /// Frame `i` plays at `start_time + i / sample_rate`. Renders
    /// `min(left.len(), right.len())` frames.
    pub fn render(&mut self, start_time: f64, left: &mut [f32], right: &mut [f32]) {
        let step = 1.0 / f64::from(self.config.sample_rate);
        for (i, (l, r)) in left.iter_mut().zip(right.iter_mut()).enumerate() {
            let time = start_time + i as f64 * step;
            self.poll(time);
            let (dry_l, dry_r) = self.allocator.render(time);
            let (out_l, out_r) = self.master.process_stereo(time, dry_l, dry_r, 0.0);
            *l = out_l;
            *r = out_r;
        }
    }

    fn run_tick(&mut self, time: f64) {
        let lfo_values: [f32; LFO_COUNT] =
            core::array::from_fn(|i| self.mod_lfos[i].output_at(time));
        let mod_wheel = midi_to_bipolar(self.mod_wheel);
        let aftertouch = midi_to_bipolar(self.aftertouch);
        let matrix = &self.matrix;

        for voice in self.allocator.voices_mut() {
            if !voice.is_active() {
                continue;
            }
            let offsets = {
                let provider = |source: ModSource| -> f32 {
                    voice.source_value(source, time).unwrap_or(match source {
                        ModSource::Lfo(i) => lfo_values.get(i).copied().unwrap_or(0.0),
                        ModSource::ModWheel => mod_wheel,
                        ModSource::Aftertouch => aftertouch,
                        _ => 0.0,
                    })
                };
                matrix.evaluate(&provider)
            };
            voice.apply_modulation(&offsets, time);
        }
    }

    fn apply_activation(&mut self, change: &SourceActivation, time: f64) {
        for source in &change.activated {
            if let ModSource::Lfo(i) = *source {
                if let Some(lfo) = self.mod_lfos.get_mut(i) {
                    lfo.configure(&self.patch.lfos[i], time);
                    lfo.set_bpm(self.bpm, time);
                    lfo.start(time);
                }
            }
            debug!(%source, "modulation source activated");
        }
        for source in &change.deactivated {
            if let ModSource::Lfo(i) = *source {
                if let Some(lfo) = self.mod_lfos.get_mut(i) {
                    lfo.stop(time);
                }
            }
            debug!(%source, "modulation source deactivated");
        }
    }

    fn push_envelopes(&mut self) {
        let filter = self.patch.filter_envelope;
        let amplitude = self.patch.amplitude_envelope;
        for voice in self.allocator.voices_mut() {
            voice.update_envelopes(&filter, &amplitude);
        }
    }

    /// Bring voices built since `from` in line with the engine's tempo and bend.
    fn prepare_new_voices(&mut self, from: usize, time: f64) {
        let cents = self.pitch_bend_cents();
        let bpm = self.bpm;
        for voice in self.allocator.voices_mut().iter_mut().skip(from) {
            voice.set_bpm(bpm, time);
            if cents != 0.0 {
                voice.set_pitch_bend(cents, time);
            }
        }
    }

    fn pitch_bend_cents(&self) -> f32 {
        self.pitch_bend * self.config.pitch_bend_range * 100.0
    }

    fn resolve(&self, time: Option<f64>) -> f64 {
        match time {
            Some(t) if t.is_finite() => t.max(0.0),
            _ => self.clock.now(),
        }
    }
}

impl std::fmt::Debug for SynthEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SynthEngine")
            .field("config", &self.config)
            .field("name", &self.name)
            .field("mode", &self.allocator.mode())
            .field("active_voices", &self.allocator.active_count())
            .field("master_volume", &self.master_volume)
            .field("bpm", &self.bpm)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modulation::Destination;
    use crate::patch::OscillatorWaveform;
    use dawg_core::LogicalClock;

    fn engine() -> (SynthEngine, LogicalClock) {
        let clock = LogicalClock::new();
        (SynthEngine::new(EngineConfig::default(), clock.clone()), clock)
    }

    #[test]
    fn test_config_sanitized() {
        let config = EngineConfig {
            sample_rate: -1.0,
            max_voices: 0,
            tick_rate_hz: f64::NAN,
            pitch_bend_range: 99.0,
        }
        .sanitized();
        assert_eq!(config.sample_rate, 48000.0);
        assert_eq!(config.max_voices, 1);
        assert_eq!(config.tick_rate_hz, 60.0);
        assert_eq!(config.pitch_bend_range, 24.0);
    }

    #[test]
    fn test_capabilities_serialize_camel_case() {
        let (engine, _) = engine();
        let json = serde_json::to_string(&engine.capabilities()).unwrap();
        assert!(json.contains("\"supportsPolyphony\":true"));
        assert!(json.contains("\"supportsPitchBend\":true"));
        assert!(json.contains("\"maxVoices\":16"));
        assert!(json.contains("\"maxModulationSlots\":16"));
    }

    #[test]
    fn test_capabilities_follow_voice_mode() {
        let (mut engine, _) = engine();
        assert!(engine.capabilities().supports_polyphony);
        engine.set_voice_mode(VoiceMode::Mono);
        assert!(!engine.capabilities().supports_polyphony);
        assert!(engine.load_factory_preset("warm-pad"));
        assert!(engine.capabilities().supports_polyphony);
    }

    #[test]
    fn test_zero_velocity_is_note_off() {
        let (mut engine, _) = engine();
        engine.note_on(60, 100, Some(0.0));
        engine.note_on(60, 0, Some(0.1));
        let voice = engine.allocator().voice_for_note(60).unwrap();
        assert!(voice.is_releasing());
    }

    #[test]
    fn test_index_errors() {
        let (mut engine, _) = engine();
        assert!(matches!(
            engine.set_oscillator(3, OscillatorSpec::default()),
            Err(SynthError::OscillatorIndex { index: 3, count: 3 })
        ));
        assert!(matches!(
            engine.set_lfo(2, LfoSettings::default()),
            Err(SynthError::LfoIndex { index: 2, .. })
        ));
        assert!(matches!(
            engine.set_modulation_slot(16, ModulationSlot::default()),
            Err(SynthError::SlotIndex { index: 16, .. })
        ));
    }

    #[test]
    fn test_shared_lfo_follows_references() {
        let (mut engine, _) = engine();
        let route = ModulationSlot::route(ModSource::Lfo(1), Destination::Pan, 0.5);
        assert!(!engine.mod_lfo(1).unwrap().is_running());

        engine.set_modulation_slot(0, route).unwrap();
        engine.set_modulation_slot(1, route).unwrap();
        assert!(engine.mod_lfo(1).unwrap().is_running());

        engine.clear_modulation_slot(0).unwrap();
        assert!(engine.mod_lfo(1).unwrap().is_running_at(0.0));

        engine.clear_modulation_slot(1).unwrap();
        assert!(!engine.mod_lfo(1).unwrap().is_running_at(0.0));
    }

    #[test]
    fn test_master_volume_clamped_and_ramped() {
        let (mut engine, clock) = engine();
        engine.set_master_volume(3.0);
        assert_eq!(engine.master_volume(), 1.0);
        clock.advance(1.0);
        engine.set_master_volume(0.25);
        assert!((engine.master.gain.value_at(1.0) - 1.0).abs() < 1e-6);
        assert!((engine.master.gain.value_at(1.0 + MASTER_RAMP_SECONDS) - 0.25).abs() < 1e-6);
    }

    #[test]
    fn test_pitch_bend_reaches_voices() {
        let (mut engine, _) = engine();
        engine.note_on(69, 100, Some(0.0));
        engine.set_pitch_bend(1.0);
        engine.set_pitch_bend(0.5);
        assert_eq!(engine.pitch_bend(), 0.5);
        engine.set_pitch_bend(-3.0);
        assert_eq!(engine.pitch_bend(), -1.0);
    }

    #[test]
    fn test_non_finite_pitch_bend_is_neutral() {
        let (mut engine, _) = engine();
        engine.set_pitch_bend(0.75);
        engine.set_pitch_bend(f32::NAN);
        assert_eq!(engine.pitch_bend(), 0.0);
        engine.set_pitch_bend(-0.5);
        engine.set_pitch_bend(f32::NEG_INFINITY);
        assert_eq!(engine.pitch_bend(), 0.0);
    }

    #[test]
    fn test_bpm_ignores_nonsense() {
        let (mut engine, _) = engine();
        engine.update_bpm(140.0);
        engine.update_bpm(0.0);
        engine.update_bpm(f32::INFINITY);
        assert_eq!(engine.bpm(), 140.0);
    }

    #[test]
    fn test_live_oscillator_update_stored() {
        let (mut engine, _) = engine();
        engine
            .set_oscillator(1, OscillatorSpec::new(OscillatorWaveform::Square, 2.0))
            .unwrap();
        let osc = engine.patch().oscillators[1];
        assert!(osc.enabled);
        assert_eq!(osc.waveform, OscillatorWaveform::Square);
        assert_eq!(osc.level, 1.0);
    }

    #[test]
    fn test_unknown_factory_preset_keeps_state() {
        let (mut engine, _) = engine();
        assert!(engine.load_factory_preset("warm-pad"));
        assert!(!engine.load_factory_preset("kazoo"));
        assert_eq!(engine.preset_name(), "warm-pad");
    }

    #[test]
    fn test_stop_all_silences_immediately() {
        let (mut engine, _) = engine();
        engine.note_on(60, 100, Some(0.0));
        engine.note_on(64, 100, Some(0.0));
        assert_eq!(engine.active_voice_count(), 2);
        engine.stop_all();
        assert_eq!(engine.active_voice_count(), 0);
        assert_eq!(engine.allocator().allocated_count(), 0);
    }
}
