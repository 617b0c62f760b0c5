//! Dawg Core - timeline and device primitives for the dawg synthesis engine
//!
//! This crate provides the pieces every synthesis voice drives: a monotonic
//! clock, scalar parameters with scheduled automation, and a small set of
//! audio nodes that render sample by sample against absolute time.
//!
//! # Core Abstractions
//!
//! ## Time
//!
//! - [`Clock`] - Anything that can report "now" in seconds
//! - [`LogicalClock`] - Shared, manually advanced clock for offline rendering and tests
//! - `SystemClock` - Wall-clock time since construction (`std` only)
//!
//! ## Parameter Automation
//!
//! - [`AutomationParam`] - Scalar timeline with set, linear and exponential ramp events
//! - [`AutomationEvent`] - One scheduled change on that timeline
//!
//! ## Nodes
//!
//! - [`OscillatorNode`] - Sine, triangle, sawtooth and square (PolyBLEP) generator
//! - [`GainNode`] - Automatable gain stage
//! - [`FilterNode`] - Resonant state-variable filter with stereo state
//! - [`PannerNode`] - Constant-power stereo panner
//! - [`WaveShaperNode`] - Curve lookup waveshaper
//! - [`NoiseBuffer`] / [`NoiseSource`] - Shared white-noise table and a looping reader
//!
//! ## Utilities
//!
//! - [`NoteDivision`] - Musical divisions for tempo sync
//! - Math functions: [`midi_to_freq`], [`cents_to_ratio`], [`semitones_to_ratio`], etc.
//!
//! # no_std Support
//!
//! The crate builds without `std` (it needs `alloc`). Disable default features:
//!
//! ```toml
//! [dependencies]
//! dawg-core = { version = "0.1", default-features = false }
//! ```
//!
//! # Example
//!
//! ```rust
//! use dawg_core::{AutomationParam, Clock, LogicalClock};
//!
//! let clock = LogicalClock::new();
//! let mut gain = AutomationParam::new(0.0, 0.0, 1.0);
//! gain.set_immediate(0.0, clock.now());
//! gain.ramp_linear(1.0, 0.5);
//!
//! clock.advance(0.25);
//! assert!((gain.value_at(clock.now()) - 0.5).abs() < 1e-6);
//! ```

#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

pub mod automation;
pub mod clock;
pub mod filter;
pub mod gain;
pub mod math;
pub mod node;
pub mod noise;
pub mod oscillator;
pub mod panner;
pub mod shaper;
pub mod tempo;

pub use automation::{AutomationEvent, AutomationParam};
#[cfg(feature = "std")]
pub use clock::SystemClock;
pub use clock::{Clock, LogicalClock};
pub use filter::{FilterKind, FilterNode};
pub use gain::GainNode;
pub use math::{
    cents_to_ratio, clamp_finite, flush_denormal, freq_to_midi, midi_to_bipolar, midi_to_freq,
    semitones_to_ratio,
};
pub use node::Lifecycle;
pub use noise::{NoiseBuffer, NoiseSource};
pub use oscillator::{OscillatorNode, Waveform};
pub use panner::PannerNode;
pub use shaper::{WaveShaperNode, soft_saturation_curve};
pub use tempo::{NoteDivision, ParseDivisionError};
