//! Dawg Synth - polyphonic subtractive synthesis for the dawg engine
//!
//! This crate turns note events into scheduled parameter curves on the
//! [`dawg_core`] primitives. Everything runs against an absolute clock:
//! envelopes and glides are automation ramps, and deferred bookkeeping is
//! queued on the same timeline, so offline and live rendering agree.
//!
//! # Core Components
//!
//! ## Contours
//!
//! - [`Envelope`] - Delay/attack/hold/decay/sustain/release contour with an
//!   analytic follower for polling consumers
//! - [`Lfo`] - Free-running or tempo-synced modulator with per-target depth
//!
//! ```rust
//! use dawg_core::AutomationParam;
//! use dawg_synth::{Envelope, EnvelopeParams};
//!
//! let mut env = Envelope::new(EnvelopeParams {
//!     attack: 0.1,
//!     decay: 0.2,
//!     sustain: 0.5,
//!     velocity_sensitivity: 0.0,
//!     ..EnvelopeParams::default()
//! });
//! let mut gain = AutomationParam::new(0.0, 0.0, 1.0);
//! env.trigger(&mut gain, 0.0, 1.0, 127);
//!
//! assert!((env.value_at(0.1) - 1.0).abs() < 1e-4);
//! assert!((gain.value_at(0.3) - 0.5).abs() < 1e-4);
//! ```
//!
//! ## Modulation
//!
//! - [`ModulationEngine`] - Fixed-size matrix of [`ModulationSlot`]s polled at
//!   a control rate, with reference-counted source activation
//! - [`ModSource`] / [`Destination`] / [`ModCurve`] - Closed routing vocabulary
//!
//! ## Voices
//!
//! - [`Voice`] - What the allocator needs from a sound generator
//! - [`SubtractiveVoice`] - Oscillator bank, drive, filter, amp, pan
//! - [`VoiceAllocator`] - Poly stealing and mono portamento/legato over a
//!   bounded pool
//! - [`EventQueue`] - Logical-clock queue for deferred voice cleanup
//!
//! ## Engine
//!
//! - [`SynthEngine`] - Note API, live parameters, presets, rendering
//! - [`SynthPreset`] - JSON preset format, plus factory presets
//!
//! # Example
//!
//! ```rust
//! use dawg_core::{Clock, LogicalClock};
//! use dawg_synth::{EngineConfig, SynthEngine, VoiceMode};
//!
//! let clock = LogicalClock::new();
//! let mut engine = SynthEngine::new(EngineConfig::default(), clock.clone());
//! engine.load_factory_preset("mono-bass");
//! assert_eq!(engine.voice_mode(), VoiceMode::Mono);
//!
//! engine.note_on(36, 110, Some(0.0));
//! engine.note_on(43, 110, Some(0.25));
//! engine.note_off(Some(43), Some(0.5));
//! engine.note_off(Some(36), Some(0.5));
//!
//! let mut left = vec![0.0; 48000];
//! let mut right = vec![0.0; 48000];
//! engine.render(0.0, &mut left, &mut right);
//! clock.advance(1.0);
//! ```

pub mod allocator;
pub mod engine;
pub mod envelope;
pub mod error;
pub mod lfo;
pub mod modulation;
pub mod patch;
pub mod preset;
pub mod scheduler;
pub mod voice;

pub use allocator::{VoiceAllocator, VoiceFactory, VoiceMode};
pub use engine::{Capabilities, EngineConfig, SynthEngine};
pub use envelope::{Envelope, EnvelopeCurve, EnvelopeParams, EnvelopeStage};
pub use error::SynthError;
pub use lfo::{Lfo, LfoConnection, LfoSettings, LfoTarget, LfoWaveform};
pub use modulation::{
    Destination, DestinationOffsets, ModCurve, ModSource, ModTarget, ModTargetRegistry,
    ModulationEngine, ModulationSlot, SourceActivation, SourceProvider, SourceRefCounts,
};
pub use patch::{FilterSpec, OscillatorSpec, OscillatorWaveform, SynthPatch, UnisonSpec};
pub use preset::{
    FACTORY_PRESET_NAMES, ModulationSlotConfig, SynthPreset, factory_preset,
    factory_preset_names, factory_presets,
};
pub use scheduler::EventQueue;
pub use voice::{NoteEvent, NoteParams, SubtractiveVoice, Voice};
