//! Error types for engine configuration.
//!
//! Only configuration calls fail. Note events and rendering never return
//! errors: out-of-range values are clamped where they are used.

use thiserror::Error;

use dawg_core::ParseDivisionError;

/// Errors returned by fallible configuration calls.
#[derive(Debug, Error)]
pub enum SynthError {
    /// Preset JSON could not be parsed or produced
    #[error("failed to parse preset: {0}")]
    PresetParse(#[from] serde_json::Error),

    /// Oscillator slot outside the bank
    #[error("oscillator index {index} out of range (bank has {count})")]
    OscillatorIndex {
        /// Requested index.
        index: usize,
        /// Number of oscillator slots.
        count: usize,
    },

    /// LFO slot outside the bank
    #[error("LFO index {index} out of range (bank has {count})")]
    LfoIndex {
        /// Requested index.
        index: usize,
        /// Number of LFO slots.
        count: usize,
    },

    /// Modulation slot outside the matrix
    #[error("modulation slot {index} out of range (matrix has {count})")]
    SlotIndex {
        /// Requested slot.
        index: usize,
        /// Number of slots.
        count: usize,
    },

    /// Unrecognised modulation source name
    #[error("unknown modulation source: {0}")]
    UnknownSource(String),

    /// Unrecognised modulation destination key
    #[error("unknown modulation destination: {0}")]
    UnknownDestination(String),

    /// Unrecognised tempo-sync division
    #[error(transparent)]
    Division(#[from] ParseDivisionError),
}

impl SynthError {
    /// Create an oscillator index error.
    pub fn oscillator_index(index: usize, count: usize) -> Self {
        SynthError::OscillatorIndex { index, count }
    }

    /// Create an LFO index error.
    pub fn lfo_index(index: usize, count: usize) -> Self {
        SynthError::LfoIndex { index, count }
    }

    /// Create a modulation slot index error.
    pub fn slot_index(index: usize, count: usize) -> Self {
        SynthError::SlotIndex { index, count }
    }
}
