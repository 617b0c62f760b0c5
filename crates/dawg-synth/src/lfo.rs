//! Low-frequency oscillator for modulation.
//!
//! The LFO is evaluated analytically from its start time, so any consumer can
//! ask for its value at any instant without stepping it per sample. Changing
//! frequency while running re-anchors the phase so the waveform continues
//! from where it was instead of jumping.
//!
//! Each [`connect`](Lfo::connect) call adds an independent depth-scaled
//! output, so one LFO can drive several destinations by different amounts.

use core::f64::consts::PI;

use serde::{Deserialize, Serialize};

use dawg_core::NoteDivision;

/// Lowest LFO rate in Hz.
pub const MIN_FREQUENCY: f32 = 0.01;
/// Highest LFO rate in Hz.
pub const MAX_FREQUENCY: f32 = 20.0;

/// LFO waveform.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LfoWaveform {
    /// Smooth periodic modulation.
    #[default]
    Sine,
    /// Alternates between +1 and -1.
    Square,
    /// Rising ramp with an abrupt reset.
    Sawtooth,
    /// Linear up and down ramps.
    Triangle,
}

impl LfoWaveform {
    /// Waveform value at `phase` (0.0–1.0), in [-1, 1].
    #[inline]
    pub fn value(&self, phase: f64) -> f32 {
        let v = match self {
            LfoWaveform::Sine => (2.0 * PI * phase).sin(),
            LfoWaveform::Square => {
                if phase < 0.5 {
                    1.0
                } else {
                    -1.0
                }
            }
            LfoWaveform::Sawtooth => 2.0 * phase - 1.0,
            LfoWaveform::Triangle => {
                if phase < 0.5 {
                    4.0 * phase - 1.0
                } else {
                    3.0 - 4.0 * phase
                }
            }
        };
        v as f32
    }
}

/// Voice parameter a per-voice LFO can be routed to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LfoTarget {
    /// Filter cutoff (Hz).
    FilterCutoff,
    /// Filter resonance (Q).
    FilterResonance,
    /// Oscillator levels.
    OscillatorLevel,
    /// Oscillator detune (cents).
    Detune,
    /// Oscillator frequency (Hz).
    Pitch,
}

/// LFO configuration as stored in presets.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LfoSettings {
    /// Free-running rate in Hz (0.01–20).
    pub frequency: f32,
    /// Output depth (0.0–1.0).
    pub depth: f32,
    /// Waveform.
    pub waveform: LfoWaveform,
    /// Derive the rate from tempo instead of `frequency`.
    pub tempo_sync: bool,
    /// Division used when tempo-synced.
    pub division: NoteDivision,
    /// Starting phase (0.0–1.0).
    pub phase: f32,
    /// Per-voice destination. `None` leaves the LFO to the modulation matrix.
    pub target: Option<LfoTarget>,
}

impl Default for LfoSettings {
    fn default() -> Self {
        Self {
            frequency: 1.0,
            depth: 0.0,
            waveform: LfoWaveform::Sine,
            tempo_sync: false,
            division: NoteDivision::Quarter,
            phase: 0.0,
            target: None,
        }
    }
}

/// One depth-scaled output of an [`Lfo`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LfoConnection {
    /// Where the output goes.
    pub target: LfoTarget,
    /// Scale applied to the LFO output, in the target's units.
    pub amount: f32,
}

/// Free-running or tempo-synced LFO.
///
/// ## Parameters
///
/// - `frequency`: 0.01 to 20 Hz, clamped on every setter
/// - `depth`: 0.0 to 1.0, clamped on every setter
///
/// # Example
///
/// ```rust
/// use dawg_synth::{Lfo, LfoSettings, LfoTarget, LfoWaveform};
///
/// let mut lfo = Lfo::new(LfoSettings {
///     frequency: 1.0,
///     depth: 0.5,
///     waveform: LfoWaveform::Sine,
///     ..LfoSettings::default()
/// });
/// lfo.start(0.0);
/// lfo.connect(LfoTarget::FilterCutoff, 1000.0);
///
/// // Quarter of a cycle in: sine peak, scaled by depth then amount.
/// assert!((lfo.output_at(0.25) - 0.5).abs() < 1e-6);
/// assert!((lfo.modulation_for(LfoTarget::FilterCutoff, 0.25) - 500.0).abs() < 1e-3);
/// ```
#[derive(Debug, Clone)]
pub struct Lfo {
    frequency: f32,
    depth: f32,
    waveform: LfoWaveform,
    tempo_sync: bool,
    division: NoteDivision,
    bpm: f32,
    phase_offset: f32,
    running: bool,
    start_time: f64,
    stop_time: Option<f64>,
    anchor_time: f64,
    anchor_phase: f64,
    connections: Vec<LfoConnection>,
}

impl Default for Lfo {
    fn default() -> Self {
        Self::new(LfoSettings::default())
    }
}

impl Lfo {
    /// Create a stopped LFO.
    pub fn new(settings: LfoSettings) -> Self {
        let mut lfo = Self {
            frequency: 1.0,
            depth: 0.0,
            waveform: settings.waveform,
            tempo_sync: settings.tempo_sync,
            division: settings.division,
            bpm: 120.0,
            phase_offset: 0.0,
            running: false,
            start_time: 0.0,
            stop_time: None,
            anchor_time: 0.0,
            anchor_phase: 0.0,
            connections: Vec::new(),
        };
        lfo.frequency = settings.frequency.clamp(MIN_FREQUENCY, MAX_FREQUENCY);
        lfo.depth = settings.depth.clamp(0.0, 1.0);
        lfo.phase_offset = settings.phase.clamp(0.0, 1.0);
        lfo
    }

    /// Apply preset settings, keeping phase continuity if running.
    pub fn configure(&mut self, settings: &LfoSettings, time: f64) {
        self.rebase(time);
        self.frequency = settings.frequency.clamp(MIN_FREQUENCY, MAX_FREQUENCY);
        self.depth = settings.depth.clamp(0.0, 1.0);
        self.waveform = settings.waveform;
        self.tempo_sync = settings.tempo_sync;
        self.division = settings.division;
        self.phase_offset = settings.phase.clamp(0.0, 1.0);
    }

    /// Start running at `time`.
    ///
    /// The waveform is already `phase` of a cycle in at `time`.
    pub fn start(&mut self, time: f64) {
        self.running = true;
        self.start_time = time;
        self.stop_time = None;
        self.anchor_time = time;
        self.anchor_phase = f64::from(self.phase_offset);
    }

    /// Stop producing output from `time` on.
    ///
    /// Outputs stay connected until [`poll`](Self::poll) reaches `time`,
    /// then the LFO halts and every connection is dropped.
    pub fn stop(&mut self, time: f64) {
        if self.running {
            self.stop_time = Some(time);
        }
    }

    /// Carry out a stop that is due by `now`.
    pub fn poll(&mut self, now: f64) {
        if self.stop_time.is_some_and(|stop| now >= stop) {
            self.halt();
        }
    }

    /// Drop a pending stop so the LFO keeps running.
    pub fn cancel_stop(&mut self) {
        self.stop_time = None;
    }

    /// Stop immediately and drop every connection.
    pub fn halt(&mut self) {
        self.running = false;
        self.stop_time = None;
        self.connections.clear();
    }

    /// Add a depth-scaled output to `target`.
    pub fn connect(&mut self, target: LfoTarget, amount: f32) {
        self.connections.push(LfoConnection { target, amount });
    }

    /// Remove every output.
    pub fn disconnect(&mut self) {
        self.connections.clear();
    }

    /// Current outputs.
    pub fn connections(&self) -> &[LfoConnection] {
        &self.connections
    }

    /// Whether the LFO has been started and not halted.
    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Whether the LFO produces output at `time`.
    pub fn is_running_at(&self, time: f64) -> bool {
        self.running && time >= self.start_time && self.stop_time.is_none_or(|stop| time < stop)
    }

    /// Set the free-running rate. Clamped to 0.01–20 Hz.
    pub fn set_frequency(&mut self, hz: f32, time: f64) {
        self.rebase(time);
        self.frequency = hz.clamp(MIN_FREQUENCY, MAX_FREQUENCY);
    }

    /// Set the output depth. Clamped to 0.0–1.0.
    pub fn set_depth(&mut self, depth: f32) {
        self.depth = depth.clamp(0.0, 1.0);
    }

    /// Set the waveform.
    pub fn set_waveform(&mut self, waveform: LfoWaveform) {
        self.waveform = waveform;
    }

    /// Enable or disable tempo sync.
    pub fn set_tempo_sync(&mut self, enabled: bool, division: NoteDivision, time: f64) {
        self.rebase(time);
        self.tempo_sync = enabled;
        self.division = division;
    }

    /// Update the tempo used for synced rates.
    pub fn set_bpm(&mut self, bpm: f32, time: f64) {
        if bpm > 0.0 && bpm.is_finite() {
            self.rebase(time);
            self.bpm = bpm;
        }
    }

    /// Configured free-running rate in Hz.
    pub fn frequency(&self) -> f32 {
        self.frequency
    }

    /// Output depth.
    pub fn depth(&self) -> f32 {
        self.depth
    }

    /// Waveform.
    pub fn waveform(&self) -> LfoWaveform {
        self.waveform
    }

    /// Rate actually used, taking tempo sync into account.
    pub fn effective_frequency(&self) -> f32 {
        if self.tempo_sync {
            self.division
                .to_hz(self.bpm)
                .clamp(MIN_FREQUENCY, MAX_FREQUENCY)
        } else {
            self.frequency
        }
    }

    /// Phase (0.0–1.0) at `time`.
    pub fn phase_at(&self, time: f64) -> f64 {
        let elapsed = (time - self.anchor_time).max(0.0);
        (self.anchor_phase + elapsed * f64::from(self.effective_frequency())).rem_euclid(1.0)
    }

    /// Raw waveform in [-1, 1] at `time`; zero when not running.
    pub fn value_at(&self, time: f64) -> f32 {
        if !self.is_running_at(time) {
            return 0.0;
        }
        self.waveform.value(self.phase_at(time))
    }

    /// Raw waveform scaled by depth.
    pub fn output_at(&self, time: f64) -> f32 {
        self.value_at(time) * self.depth
    }

    /// Sum of every connection to `target` at `time`.
    pub fn modulation_for(&self, target: LfoTarget, time: f64) -> f32 {
        let out = self.output_at(time);
        if out == 0.0 {
            return 0.0;
        }
        self.connections
            .iter()
            .filter(|c| c.target == target)
            .map(|c| out * c.amount)
            .sum()
    }

    fn rebase(&mut self, time: f64) {
        if self.running {
            self.anchor_phase = self.phase_at(time);
            self.anchor_time = time.max(self.anchor_time);
        }
    }
}
