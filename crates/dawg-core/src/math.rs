//! Pitch and range helpers.
//!
//! # Pitch
//!
//! - [`midi_to_freq`] / [`freq_to_midi`] - Equal-tempered note conversion, A4 = 440 Hz
//! - [`cents_to_ratio`] / [`semitones_to_ratio`] - Interval to frequency ratio
//!
//! # Controllers
//!
//! - [`midi_to_bipolar`] - 7-bit controller value to `[-1, 1]`
//!
//! # Utilities
//!
//! - [`clamp_finite`] - Clamp that also maps NaN to the lower bound
//! - [`flush_denormal`] - Zero out values small enough to stall the FPU

use libm::{log2f, powf};

/// Convert a MIDI note number to frequency in Hz.
///
/// # Example
/// ```rust
/// use dawg_core::midi_to_freq;
///
/// assert!((midi_to_freq(69) - 440.0).abs() < 0.001);
/// assert!((midi_to_freq(60) - 261.63).abs() < 0.01);
/// ```
#[inline]
pub fn midi_to_freq(note: u8) -> f32 {
    440.0 * powf(2.0, (f32::from(note) - 69.0) / 12.0)
}

/// Convert a frequency in Hz to a (fractional) MIDI note number.
#[inline]
pub fn freq_to_midi(freq: f32) -> f32 {
    69.0 + 12.0 * log2f(freq / 440.0)
}

/// Convert cents to a frequency ratio. 100 cents = 1 semitone.
#[inline]
pub fn cents_to_ratio(cents: f32) -> f32 {
    powf(2.0, cents / 1200.0)
}

/// Convert semitones to a frequency ratio.
#[inline]
pub fn semitones_to_ratio(semitones: f32) -> f32 {
    powf(2.0, semitones / 12.0)
}

/// Map a 7-bit MIDI value (0–127) onto `[-1, 1]`.
///
/// Values above 127 are treated as 127.
#[inline]
pub fn midi_to_bipolar(value: u8) -> f32 {
    f32::from(value.min(127)) / 127.0 * 2.0 - 1.0
}

/// Clamp `x` to `[min, max]`, mapping NaN to `min`.
#[inline]
pub fn clamp_finite(x: f32, min: f32, max: f32) -> f32 {
    if x.is_nan() { min } else { x.clamp(min, max) }
}

/// Flush denormal-range values to zero.
#[inline]
pub fn flush_denormal(x: f32) -> f32 {
    if x.abs() < 1e-20 { 0.0 } else { x }
}
