//! Preset format and factory presets.
//!
//! A [`SynthPreset`] is the JSON document the engine imports and exports:
//!
//! ```json
//! {
//!   "name": "pluck",
//!   "oscillators": [{ "waveform": "square", "pulseWidth": 0.3, "level": 0.7 }],
//!   "filter": { "type": "lowpass", "cutoff": 800, "envelopeAmount": 5000 },
//!   "filterEnvelope": { "attack": 0.001, "decay": 0.18, "sustain": 0 },
//!   "amplitudeEnvelope": { "decay": 0.4, "sustain": 0 },
//!   "lfos": [],
//!   "modulation": [{ "source": "velocity", "destination": "amp.gain", "amount": 0.2 }],
//!   "voiceMode": "poly",
//!   "portamento": 0,
//!   "legato": false,
//!   "masterVolume": 0.8
//! }
//! ```
//!
//! Every field is optional. Missing oscillator and LFO slots are filled
//! with disabled defaults; malformed modulation entries are dropped with a
//! warning when the preset is applied.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::allocator::VoiceMode;
use crate::envelope::EnvelopeParams;
use crate::error::SynthError;
use crate::lfo::LfoSettings;
use crate::modulation::{MAX_SLOTS, ModCurve, ModulationSlot};
use crate::patch::{
    FilterSpec, LFO_COUNT, OSCILLATOR_COUNT, OscillatorSpec, SynthPatch, amplitude_envelope_params,
    default_filter_envelope, filter_envelope_params,
};

/// One modulation routing as written in preset JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ModulationSlotConfig {
    /// Matrix position. Routings without one take the lowest free slot.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slot: Option<usize>,
    /// Source name, e.g. `"lfo_1"`.
    pub source: Option<String>,
    /// Destination key, e.g. `"filter.cutoff"`.
    pub destination: Option<String>,
    /// Bipolar depth, -1.0 to 1.0.
    pub amount: f32,
    /// Response curve.
    pub curve: ModCurve,
    /// Whether the routing is evaluated.
    pub enabled: bool,
}

impl Default for ModulationSlotConfig {
    fn default() -> Self {
        Self {
            slot: None,
            source: None,
            destination: None,
            amount: 0.0,
            curve: ModCurve::Linear,
            enabled: true,
        }
    }
}

impl ModulationSlotConfig {
    /// Parse into a matrix slot.
    pub fn to_slot(&self) -> Result<ModulationSlot, SynthError> {
        let source = self
            .source
            .as_deref()
            .ok_or_else(|| SynthError::UnknownSource(String::new()))?
            .parse()?;
        let destination = self
            .destination
            .as_deref()
            .ok_or_else(|| SynthError::UnknownDestination(String::new()))?
            .parse()?;
        Ok(ModulationSlot {
            id: self.slot.unwrap_or(0),
            enabled: self.enabled,
            source: Some(source),
            destination: Some(destination),
            amount: self.amount,
            curve: self.curve,
        })
    }

    /// Config for a routed slot, keeping its position. Unrouted slots have
    /// no config.
    pub fn from_slot(slot: &ModulationSlot) -> Option<Self> {
        let (source, destination) = slot.source.zip(slot.destination)?;
        Some(Self {
            slot: Some(slot.id),
            source: Some(source.to_string()),
            destination: Some(destination.to_string()),
            amount: slot.amount,
            curve: slot.curve,
            enabled: slot.enabled,
        })
    }
}

/// Complete engine state as stored in preset files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SynthPreset {
    /// Preset name.
    pub name: String,
    /// Optional description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Oscillator slots, at most three are used.
    pub oscillators: Vec<OscillatorSpec>,
    /// Filter.
    pub filter: FilterSpec,
    /// Filter envelope.
    pub filter_envelope: EnvelopeParams,
    /// Amplitude envelope.
    pub amplitude_envelope: EnvelopeParams,
    /// LFO slots, at most two are used.
    pub lfos: Vec<LfoSettings>,
    /// Modulation routings in slot order.
    pub modulation: Vec<ModulationSlotConfig>,
    /// Polyphony policy.
    pub voice_mode: VoiceMode,
    /// Mono glide time in seconds.
    pub portamento: f32,
    /// Skip envelope retrigger on overlapping mono notes.
    pub legato: bool,
    /// Output level (0.0–1.0).
    pub master_volume: f32,
}

impl Default for SynthPreset {
    fn default() -> Self {
        let patch = SynthPatch::default();
        Self {
            name: "init".to_string(),
            description: None,
            oscillators: patch.oscillators.to_vec(),
            filter: patch.filter,
            filter_envelope: default_filter_envelope(),
            amplitude_envelope: patch.amplitude_envelope,
            lfos: patch.lfos.to_vec(),
            modulation: Vec::new(),
            voice_mode: VoiceMode::Poly,
            portamento: 0.0,
            legato: false,
            master_volume: 0.8,
        }
    }
}

impl SynthPreset {
    /// Parse preset JSON.
    pub fn from_json(json: &str) -> Result<Self, SynthError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Serialise as pretty-printed JSON.
    pub fn to_json(&self) -> Result<String, SynthError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Voice settings, with missing slots filled in.
    pub fn patch(&self) -> SynthPatch {
        if self.oscillators.len() > OSCILLATOR_COUNT {
            warn!(
                count = self.oscillators.len(),
                "preset has more oscillators than slots; extras ignored"
            );
        }
        if self.lfos.len() > LFO_COUNT {
            warn!(count = self.lfos.len(), "preset has more LFOs than slots; extras ignored");
        }
        SynthPatch {
            oscillators: core::array::from_fn(|i| {
                self.oscillators
                    .get(i)
                    .map_or_else(OscillatorSpec::off, OscillatorSpec::sanitized)
            }),
            filter: self.filter.sanitized(),
            filter_envelope: filter_envelope_params(&self.filter_envelope),
            amplitude_envelope: amplitude_envelope_params(&self.amplitude_envelope),
            lfos: core::array::from_fn(|i| self.lfos.get(i).copied().unwrap_or_default()),
        }
    }

    /// Well-formed modulation slots in matrix order, each with its `id` set
    /// to the position it belongs in.
    ///
    /// Routings naming a slot go there (a later duplicate replaces an
    /// earlier one). The rest fill the lowest free positions in list order.
    /// Entries with a missing or unknown source or destination, an
    /// out-of-range slot, or no room left are skipped.
    pub fn modulation_slots(&self) -> Vec<ModulationSlot> {
        let mut placed: [Option<ModulationSlot>; MAX_SLOTS] = [None; MAX_SLOTS];
        let mut floating = Vec::new();

        for (index, config) in self.modulation.iter().enumerate() {
            let slot = match config.to_slot() {
                Ok(slot) => slot,
                Err(err) => {
                    warn!(index, %err, "malformed modulation routing dropped");
                    continue;
                }
            };
            match config.slot {
                Some(position) if position < MAX_SLOTS => {
                    if placed[position].is_some() {
                        warn!(index, position, "duplicate modulation slot; earlier routing replaced");
                    }
                    placed[position] = Some(slot);
                }
                Some(position) => {
                    warn!(index, position, "modulation slot out of range; routing dropped");
                }
                None => floating.push((index, slot)),
            }
        }

        for (index, slot) in floating {
            match placed.iter().position(Option::is_none) {
                Some(free) => placed[free] = Some(slot),
                None => warn!(index, "modulation matrix full; routing dropped"),
            }
        }

        placed
            .into_iter()
            .enumerate()
            .filter_map(|(position, slot)| {
                slot.map(|mut slot| {
                    slot.id = position;
                    slot
                })
            })
            .collect()
    }
}

/// Factory preset names.
pub static FACTORY_PRESET_NAMES: &[&str] = &["init", "mono-bass", "supersaw-lead", "warm-pad", "pluck"];

static FACTORY_PRESETS_JSON: &[(&str, &str)] = &[
    ("init", INIT_PRESET),
    ("mono-bass", MONO_BASS_PRESET),
    ("supersaw-lead", SUPERSAW_LEAD_PRESET),
    ("warm-pad", WARM_PAD_PRESET),
    ("pluck", PLUCK_PRESET),
];

/// Single sawtooth through an open lowpass.
const INIT_PRESET: &str = r#"{
  "name": "init",
  "description": "Single sawtooth, open lowpass, default envelopes"
}"#;

/// Mono bass with glide.
const MONO_BASS_PRESET: &str = r#"{
  "name": "mono-bass",
  "description": "Gliding mono bass with a sub square and driven filter",
  "oscillators": [
    { "waveform": "sawtooth", "level": 0.8 },
    { "waveform": "square", "octave": -1, "level": 0.6 },
    { "enabled": false }
  ],
  "filter": {
    "type": "lowpass",
    "cutoff": 400,
    "resonance": 4,
    "envelopeAmount": 2500,
    "velocitySensitivity": 0.6,
    "keyTracking": 0.3,
    "drive": 0.3
  },
  "filterEnvelope": { "attack": 0.001, "decay": 0.25, "sustain": 0.2, "release": 0.15 },
  "amplitudeEnvelope": { "attack": 0.002, "decay": 0.3, "sustain": 0.8, "release": 0.1 },
  "voiceMode": "mono",
  "portamento": 0.05,
  "legato": true,
  "masterVolume": 0.7
}"#;

/// Bright unison lead with vibrato.
const SUPERSAW_LEAD_PRESET: &str = r#"{
  "name": "supersaw-lead",
  "description": "Seven-voice supersaw with an octave saw and delayed vibrato",
  "oscillators": [
    { "waveform": "supersaw", "level": 0.7, "unison": { "voices": 7, "detune": 30, "spread": 0.9 } },
    { "waveform": "sawtooth", "octave": 1, "level": 0.3 },
    { "enabled": false }
  ],
  "filter": { "type": "lowpass", "cutoff": 3000, "resonance": 1.5, "envelopeAmount": 4000, "keyTracking": 0.5 },
  "filterEnvelope": { "attack": 0.005, "decay": 0.4, "sustain": 0.4, "release": 0.3 },
  "amplitudeEnvelope": { "attack": 0.01, "decay": 0.2, "sustain": 0.85, "release": 0.35 },
  "lfos": [
    { "frequency": 5.5, "depth": 0.15, "waveform": "sine", "target": "pitch" }
  ],
  "modulation": [
    { "source": "velocity", "destination": "filter.cutoff", "amount": 0.3, "curve": "linear" }
  ],
  "masterVolume": 0.6
}"#;

/// Slow evolving pad.
const WARM_PAD_PRESET: &str = r#"{
  "name": "warm-pad",
  "description": "Detuned saws and a sub triangle with slow filter and stereo motion",
  "oscillators": [
    { "waveform": "sawtooth", "detune": -7, "level": 0.5 },
    { "waveform": "sawtooth", "detune": 7, "level": 0.5 },
    { "waveform": "triangle", "octave": -1, "level": 0.3 }
  ],
  "filter": { "type": "lowpass", "cutoff": 1200, "resonance": 0.9, "envelopeAmount": 800, "velocitySensitivity": 0.2 },
  "filterEnvelope": { "attack": 1.2, "decay": 1.5, "sustain": 0.6, "release": 2.0 },
  "amplitudeEnvelope": { "attack": 0.8, "hold": 0.1, "decay": 0.5, "sustain": 0.85, "release": 2.5, "velocitySensitivity": 0.3 },
  "lfos": [
    { "frequency": 0.2, "depth": 0.4, "waveform": "triangle" },
    { "depth": 0.3, "waveform": "sine", "tempoSync": true, "division": "1/2", "target": "filterCutoff" }
  ],
  "modulation": [
    { "source": "lfo_1", "destination": "filter.cutoff", "amount": 0.15, "curve": "s-curve" },
    { "source": "lfo_1", "destination": "pan", "amount": 0.3 },
    { "source": "mod_wheel", "destination": "osc3.level", "amount": 0.5 }
  ],
  "masterVolume": 0.6
}"#;

/// Short percussive pluck.
const PLUCK_PRESET: &str = r#"{
  "name": "pluck",
  "description": "Narrow pulse with a breath of noise and a snappy filter",
  "oscillators": [
    { "waveform": "square", "pulseWidth": 0.3, "level": 0.7 },
    { "waveform": "noise", "level": 0.1 },
    { "enabled": false }
  ],
  "filter": { "type": "lowpass", "cutoff": 800, "resonance": 2, "envelopeAmount": 5000, "velocitySensitivity": 0.8 },
  "filterEnvelope": { "attack": 0.001, "decay": 0.18, "sustain": 0, "release": 0.15 },
  "amplitudeEnvelope": { "attack": 0.001, "decay": 0.4, "sustain": 0, "release": 0.2, "velocitySensitivity": 0.7 },
  "modulation": [
    { "source": "velocity", "destination": "amp.gain", "amount": 0.2, "curve": "exponential" }
  ],
  "masterVolume": 0.8
}"#;

/// Look up a factory preset by name (case-insensitive).
///
/// Returns `None`, and logs, when no preset has that name.
///
/// # Example
///
/// ```rust
/// use dawg_synth::{VoiceMode, factory_preset};
///
/// let bass = factory_preset("mono-bass").unwrap();
/// assert_eq!(bass.voice_mode, VoiceMode::Mono);
/// assert!(factory_preset("kazoo").is_none());
/// ```
pub fn factory_preset(name: &str) -> Option<SynthPreset> {
    let Some((_, json)) = FACTORY_PRESETS_JSON
        .iter()
        .find(|(preset, _)| preset.eq_ignore_ascii_case(name))
    else {
        warn!(name, "no factory preset with this name");
        return None;
    };
    match SynthPreset::from_json(json) {
        Ok(preset) => Some(preset),
        Err(err) => {
            warn!(name, %err, "factory preset failed to parse");
            None
        }
    }
}

/// Every factory preset, in listing order.
pub fn factory_presets() -> Vec<SynthPreset> {
    FACTORY_PRESETS_JSON
        .iter()
        .filter_map(|(_, json)| SynthPreset::from_json(json).ok())
        .collect()
}

/// Factory preset names, in listing order.
pub fn factory_preset_names() -> Vec<&'static str> {
    FACTORY_PRESET_NAMES.to_vec()
}

/// Whether `name` is a factory preset (case-insensitive).
pub fn is_factory_preset(name: &str) -> bool {
    FACTORY_PRESET_NAMES
        .iter()
        .any(|preset| preset.eq_ignore_ascii_case(name))
}
