//! Sound-design settings a voice is triggered with.
//!
//! A [`SynthPatch`] is the per-note snapshot the engine hands to each voice:
//! the oscillator bank, the filter, both envelopes and the per-voice LFOs.
//! Every struct here serialises in camelCase and fills missing fields from
//! its defaults, so partial preset JSON loads.

use serde::{Deserialize, Serialize};

use dawg_core::FilterKind;
use dawg_core::filter::{MAX_CUTOFF, MAX_Q, MIN_CUTOFF, MIN_Q};
use dawg_core::oscillator::DETUNE_RANGE;

use crate::envelope::{EnvelopeCurve, EnvelopeParams};
use crate::lfo::LfoSettings;

/// Oscillator slots per voice.
pub const OSCILLATOR_COUNT: usize = 3;

/// LFO slots per voice and per engine.
pub const LFO_COUNT: usize = 2;

/// Most stacked copies a unison oscillator may use.
pub const MAX_UNISON: usize = 16;

/// Octave shift range, each way.
pub const MAX_OCTAVE_SHIFT: i8 = 4;

/// Oscillator source type.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OscillatorWaveform {
    /// Pure tone.
    Sine,
    /// Odd harmonics, soft.
    Triangle,
    /// All harmonics.
    #[default]
    Sawtooth,
    /// Square or, with a pulse width other than 0.5, a pulse.
    Square,
    /// Stack of detuned, panned sawtooths.
    Supersaw,
    /// Looped white noise.
    Noise,
}

/// Stacked detuned copies of one oscillator.
///
/// Copy `i` of `N` sits at `detune * (2i / (N-1) - 1)` cents and is panned
/// by `spread` along the same line, so the stack is symmetric around the
/// centre pitch.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UnisonSpec {
    /// Number of copies (1–16).
    pub voices: u8,
    /// Detune of the outermost copies in cents.
    pub detune: f32,
    /// Stereo width (0.0–1.0).
    pub spread: f32,
}

impl Default for UnisonSpec {
    fn default() -> Self {
        Self {
            voices: 7,
            detune: 25.0,
            spread: 0.8,
        }
    }
}

impl UnisonSpec {
    /// Copy clamped into range.
    pub fn sanitized(&self) -> Self {
        Self {
            voices: self.voices.clamp(1, MAX_UNISON as u8),
            detune: if self.detune.is_finite() {
                self.detune.clamp(0.0, 100.0)
            } else {
                0.0
            },
            spread: self.spread.clamp(0.0, 1.0),
        }
    }

    /// Detune in cents and pan of copy `index`.
    pub fn placement(&self, index: usize) -> (f32, f32) {
        let n = usize::from(self.voices.max(1));
        if n == 1 {
            return (0.0, 0.0);
        }
        let pos = 2.0 * index as f32 / (n - 1) as f32 - 1.0;
        (self.detune * pos, self.spread * pos)
    }

    /// Per-copy gain keeping the summed power constant.
    pub fn gain(&self) -> f32 {
        (1.0 / f32::from(self.voices.max(1))).sqrt()
    }
}

/// One oscillator slot.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OscillatorSpec {
    /// Whether the slot sounds.
    pub enabled: bool,
    /// Source type.
    pub waveform: OscillatorWaveform,
    /// Fine tuning in cents.
    pub detune: f32,
    /// Octave shift (-4 to 4).
    pub octave: i8,
    /// Output level (0.0–1.0).
    pub level: f32,
    /// Duty cycle for square waves (0.05–0.95). `None` means 0.5.
    pub pulse_width: Option<f32>,
    /// Unison stack. Supersaw uses a default stack when `None`.
    pub unison: Option<UnisonSpec>,
}

impl Default for OscillatorSpec {
    fn default() -> Self {
        Self {
            enabled: true,
            waveform: OscillatorWaveform::Sawtooth,
            detune: 0.0,
            octave: 0,
            level: 0.8,
            pulse_width: None,
            unison: None,
        }
    }
}

impl OscillatorSpec {
    /// Disabled slot.
    pub fn off() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    /// Enabled slot with the given waveform and level.
    pub fn new(waveform: OscillatorWaveform, level: f32) -> Self {
        Self {
            waveform,
            level,
            ..Self::default()
        }
    }

    /// Copy clamped into range.
    pub fn sanitized(&self) -> Self {
        Self {
            enabled: self.enabled,
            waveform: self.waveform,
            detune: if self.detune.is_finite() {
                self.detune.clamp(-DETUNE_RANGE, DETUNE_RANGE)
            } else {
                0.0
            },
            octave: self.octave.clamp(-MAX_OCTAVE_SHIFT, MAX_OCTAVE_SHIFT),
            level: self.level.clamp(0.0, 1.0),
            pulse_width: self.pulse_width.map(|pw| pw.clamp(0.05, 0.95)),
            unison: self.unison.map(|u| u.sanitized()),
        }
    }

    /// Frequency multiplier from the octave shift.
    pub fn octave_ratio(&self) -> f32 {
        libm::exp2f(f32::from(self.octave.clamp(-MAX_OCTAVE_SHIFT, MAX_OCTAVE_SHIFT)))
    }

    /// Unison stack this slot renders with, if any.
    pub fn unison_stack(&self) -> Option<UnisonSpec> {
        match (self.waveform, self.unison) {
            (OscillatorWaveform::Noise, _) => None,
            (OscillatorWaveform::Supersaw, u) => Some(u.unwrap_or_default().sanitized()),
            (_, Some(u)) if u.voices > 1 => Some(u.sanitized()),
            _ => None,
        }
    }

    /// Pulse width when it differs from a plain square.
    pub fn pulse(&self) -> Option<f32> {
        if self.waveform != OscillatorWaveform::Square {
            return None;
        }
        self.pulse_width
            .map(|pw| pw.clamp(0.05, 0.95))
            .filter(|pw| (pw - 0.5).abs() > 1e-3)
    }
}

/// Voice filter settings.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FilterSpec {
    /// Response type.
    #[serde(rename = "type")]
    pub kind: FilterKind,
    /// Base cutoff in Hz.
    pub cutoff: f32,
    /// Resonance as Q.
    pub resonance: f32,
    /// Filter envelope excursion above base, in Hz.
    pub envelope_amount: f32,
    /// How strongly velocity scales the envelope excursion (0.0–1.0).
    pub velocity_sensitivity: f32,
    /// Key tracking amount (0.0–1.0).
    pub key_tracking: f32,
    /// Pre-filter saturation mix (0.0–1.0).
    pub drive: f32,
}

impl Default for FilterSpec {
    fn default() -> Self {
        Self {
            kind: FilterKind::Lowpass,
            cutoff: 2000.0,
            resonance: 1.0,
            envelope_amount: 2000.0,
            velocity_sensitivity: 0.5,
            key_tracking: 0.0,
            drive: 0.0,
        }
    }
}

impl FilterSpec {
    /// Copy clamped into range.
    pub fn sanitized(&self) -> Self {
        let finite = |x: f32, fallback: f32| if x.is_finite() { x } else { fallback };
        Self {
            kind: self.kind,
            cutoff: finite(self.cutoff, 2000.0).clamp(MIN_CUTOFF, MAX_CUTOFF),
            resonance: finite(self.resonance, 1.0).clamp(MIN_Q, MAX_Q),
            envelope_amount: finite(self.envelope_amount, 0.0).clamp(-MAX_CUTOFF, MAX_CUTOFF),
            velocity_sensitivity: self.velocity_sensitivity.clamp(0.0, 1.0),
            key_tracking: self.key_tracking.clamp(0.0, 1.0),
            drive: self.drive.clamp(0.0, 1.0),
        }
    }
}

/// Cutoff sweeps always ramp exponentially.
pub const FILTER_ENVELOPE_CURVE: EnvelopeCurve = EnvelopeCurve::Exponential;

/// The amplitude envelope always ramps linearly.
pub const AMPLITUDE_ENVELOPE_CURVE: EnvelopeCurve = EnvelopeCurve::Linear;

/// `params` sanitized, with the curve fixed to [`FILTER_ENVELOPE_CURVE`].
pub fn filter_envelope_params(params: &EnvelopeParams) -> EnvelopeParams {
    EnvelopeParams {
        curve: FILTER_ENVELOPE_CURVE,
        ..params.sanitized()
    }
}

/// `params` sanitized, with the curve fixed to [`AMPLITUDE_ENVELOPE_CURVE`].
pub fn amplitude_envelope_params(params: &EnvelopeParams) -> EnvelopeParams {
    EnvelopeParams {
        curve: AMPLITUDE_ENVELOPE_CURVE,
        ..params.sanitized()
    }
}

/// Default filter envelope: exponential ramps over the cutoff.
pub fn default_filter_envelope() -> EnvelopeParams {
    EnvelopeParams {
        attack: 0.01,
        decay: 0.3,
        sustain: 0.3,
        release: 0.3,
        curve: FILTER_ENVELOPE_CURVE,
        ..EnvelopeParams::default()
    }
}

/// Everything a voice needs to play a note.
#[derive(Clone, Debug, PartialEq)]
pub struct SynthPatch {
    /// Oscillator bank.
    pub oscillators: [OscillatorSpec; OSCILLATOR_COUNT],
    /// Filter.
    pub filter: FilterSpec,
    /// Envelope over the filter cutoff.
    pub filter_envelope: EnvelopeParams,
    /// Envelope over the output gain.
    pub amplitude_envelope: EnvelopeParams,
    /// Per-voice LFOs.
    pub lfos: [LfoSettings; LFO_COUNT],
}

impl Default for SynthPatch {
    fn default() -> Self {
        Self {
            oscillators: [
                OscillatorSpec::default(),
                OscillatorSpec::off(),
                OscillatorSpec::off(),
            ],
            filter: FilterSpec::default(),
            filter_envelope: default_filter_envelope(),
            amplitude_envelope: EnvelopeParams::default(),
            lfos: [LfoSettings::default(); LFO_COUNT],
        }
    }
}
