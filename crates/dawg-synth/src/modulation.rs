//! Modulation matrix.
//!
//! A fixed array of [`MAX_SLOTS`] routings, each taking one [`ModSource`] to
//! one [`Destination`] with a bipolar amount and a response curve. The matrix
//! is polled at a fixed control rate: every tick it reads each referenced
//! source through a [`SourceProvider`], sums the shaped contributions per
//! destination, and hands the sums to a callback as [`DestinationOffsets`].
//!
//! Sources that cost something to run (the shared LFOs) are only active
//! while an enabled slot references them. The matrix keeps that as explicit
//! reference counts: every slot change reports which sources were just
//! acquired or released so the owner can start or stop them.
//!
//! # Example
//!
//! ```rust
//! use dawg_synth::{Destination, ModCurve, ModSource, ModulationEngine, ModulationSlot};
//!
//! let mut matrix = ModulationEngine::new(60.0);
//! let change = matrix
//!     .set_slot(0, ModulationSlot::route(ModSource::Lfo(0), Destination::FilterCutoff, 1.0))
//!     .unwrap();
//! assert_eq!(change.activated, [ModSource::Lfo(0)]);
//!
//! // Source reads +0.5 -> cutoff offset sum 0.5
//! let offsets = matrix.evaluate(&|_: ModSource| 0.5_f32);
//! assert_eq!(offsets.sum(Destination::FilterCutoff), 0.5);
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::SynthError;
use crate::patch::{LFO_COUNT, OSCILLATOR_COUNT};

/// Number of routing slots.
pub const MAX_SLOTS: usize = 16;

/// Default polling rate in Hz.
pub const DEFAULT_TICK_RATE_HZ: f64 = 60.0;

/// Most ticks replayed in one poll after the clock jumps ahead.
const MAX_CATCH_UP_TICKS: u32 = 4;

/// Modulation source.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ModSource {
    /// Shared LFO by zero-based index (`"lfo_1"` is index 0).
    Lfo(usize),
    /// Filter envelope follower, 0.0–1.0.
    FilterEnvelope,
    /// Amplitude envelope follower, 0.0–1.0.
    AmpEnvelope,
    /// Note velocity mapped to [-1, 1].
    Velocity,
    /// Channel aftertouch mapped to [-1, 1].
    Aftertouch,
    /// Mod wheel mapped to [-1, 1].
    ModWheel,
}

impl fmt::Display for ModSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModSource::Lfo(i) => write!(f, "lfo_{}", i + 1),
            ModSource::FilterEnvelope => f.write_str("filter_env"),
            ModSource::AmpEnvelope => f.write_str("amp_env"),
            ModSource::Velocity => f.write_str("velocity"),
            ModSource::Aftertouch => f.write_str("aftertouch"),
            ModSource::ModWheel => f.write_str("mod_wheel"),
        }
    }
}

impl FromStr for ModSource {
    type Err = SynthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let unknown = || SynthError::UnknownSource(s.to_string());
        match s {
            "filter_env" => Ok(ModSource::FilterEnvelope),
            "amp_env" => Ok(ModSource::AmpEnvelope),
            "velocity" => Ok(ModSource::Velocity),
            "aftertouch" => Ok(ModSource::Aftertouch),
            "mod_wheel" => Ok(ModSource::ModWheel),
            _ => {
                let n: usize = s
                    .strip_prefix("lfo_")
                    .and_then(|n| n.parse().ok())
                    .ok_or_else(unknown)?;
                if (1..=LFO_COUNT).contains(&n) {
                    Ok(ModSource::Lfo(n - 1))
                } else {
                    Err(unknown())
                }
            }
        }
    }
}

/// Modulation destination on a voice.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Destination {
    /// `"filter.cutoff"`
    FilterCutoff,
    /// `"filter.resonance"`
    FilterResonance,
    /// `"oscN.level"` (zero-based index)
    OscLevel(usize),
    /// `"oscN.detune"` in cents
    OscDetune(usize),
    /// `"oscN.pitch"` in semitones
    OscPitch(usize),
    /// `"amp.gain"`
    AmpGain,
    /// `"pan"`
    Pan,
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Destination::FilterCutoff => f.write_str("filter.cutoff"),
            Destination::FilterResonance => f.write_str("filter.resonance"),
            Destination::OscLevel(i) => write!(f, "osc{}.level", i + 1),
            Destination::OscDetune(i) => write!(f, "osc{}.detune", i + 1),
            Destination::OscPitch(i) => write!(f, "osc{}.pitch", i + 1),
            Destination::AmpGain => f.write_str("amp.gain"),
            Destination::Pan => f.write_str("pan"),
        }
    }
}

impl FromStr for Destination {
    type Err = SynthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let unknown = || SynthError::UnknownDestination(s.to_string());
        match s {
            "filter.cutoff" => return Ok(Destination::FilterCutoff),
            "filter.resonance" => return Ok(Destination::FilterResonance),
            "amp.gain" => return Ok(Destination::AmpGain),
            "pan" => return Ok(Destination::Pan),
            _ => {}
        }
        let (osc, param) = s
            .strip_prefix("osc")
            .and_then(|rest| rest.split_once('.'))
            .ok_or_else(unknown)?;
        let n: usize = osc.parse().map_err(|_| unknown())?;
        if !(1..=OSCILLATOR_COUNT).contains(&n) {
            return Err(unknown());
        }
        match param {
            "level" => Ok(Destination::OscLevel(n - 1)),
            "detune" => Ok(Destination::OscDetune(n - 1)),
            "pitch" => Ok(Destination::OscPitch(n - 1)),
            _ => Err(unknown()),
        }
    }
}

/// Response curve applied to each slot's contribution.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ModCurve {
    /// Identity.
    #[default]
    Linear,
    /// `sign(x) * x²`
    Exponential,
    /// Smoothstep remapped to [-1, 1].
    SCurve,
}

impl ModCurve {
    /// Shape `x`, expected in [-1, 1].
    #[inline]
    pub fn apply(&self, x: f32) -> f32 {
        match self {
            ModCurve::Linear => x,
            ModCurve::Exponential => x * x.abs(),
            ModCurve::SCurve => {
                let u = ((x + 1.0) * 0.5).clamp(0.0, 1.0);
                let s = u * u * (3.0 - 2.0 * u);
                s * 2.0 - 1.0
            }
        }
    }
}

/// One routing in the matrix.
///
/// The default slot is zero-valued: disabled, unrouted, amount 0.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ModulationSlot {
    /// Slot position in the matrix.
    pub id: usize,
    /// Whether the slot is evaluated.
    pub enabled: bool,
    /// Source read each tick.
    pub source: Option<ModSource>,
    /// Destination receiving the contribution.
    pub destination: Option<Destination>,
    /// Bipolar depth, -1.0 to 1.0.
    pub amount: f32,
    /// Response curve.
    pub curve: ModCurve,
}

impl ModulationSlot {
    /// Enabled linear routing.
    pub fn route(source: ModSource, destination: Destination, amount: f32) -> Self {
        Self {
            id: 0,
            enabled: true,
            source: Some(source),
            destination: Some(destination),
            amount: amount.clamp(-1.0, 1.0),
            curve: ModCurve::Linear,
        }
    }

    /// Same routing with a different curve.
    pub fn with_curve(mut self, curve: ModCurve) -> Self {
        self.curve = curve;
        self
    }

    /// Same routing, disabled.
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Source this slot holds a reference on, if any.
    fn referenced_source(&self) -> Option<ModSource> {
        if self.enabled && self.destination.is_some() {
            self.source
        } else {
            None
        }
    }
}

/// Reads the current value of a modulation source.
pub trait SourceProvider {
    /// Value of `source` right now.
    fn source_value(&self, source: ModSource) -> f32;
}

impl<F: Fn(ModSource) -> f32> SourceProvider for F {
    fn source_value(&self, source: ModSource) -> f32 {
        self(source)
    }
}

/// Reference counts on shared modulation sources.
#[derive(Debug, Clone, Default)]
pub struct SourceRefCounts {
    counts: BTreeMap<ModSource, usize>,
}

impl SourceRefCounts {
    /// Take a reference. Returns `true` if the source just became active.
    pub fn acquire(&mut self, source: ModSource) -> bool {
        let count = self.counts.entry(source).or_insert(0);
        *count += 1;
        *count == 1
    }

    /// Drop a reference. Returns `true` if the source just became inactive.
    ///
    /// Releasing a source with no references is a no-op.
    pub fn release(&mut self, source: ModSource) -> bool {
        match self.counts.get_mut(&source) {
            Some(count) if *count > 1 => {
                *count -= 1;
                false
            }
            Some(_) => {
                self.counts.remove(&source);
                true
            }
            None => false,
        }
    }

    /// Number of references held on `source`.
    pub fn count(&self, source: ModSource) -> usize {
        self.counts.get(&source).copied().unwrap_or(0)
    }

    /// Whether `source` has at least one reference.
    pub fn is_active(&self, source: ModSource) -> bool {
        self.counts.contains_key(&source)
    }

    /// Sources with at least one reference.
    pub fn active(&self) -> impl Iterator<Item = ModSource> + '_ {
        self.counts.keys().copied()
    }
}

/// Sources whose activation changed because of a slot update.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceActivation {
    /// Sources that went from zero references to one.
    pub activated: Vec<ModSource>,
    /// Sources that went from one reference to zero.
    pub deactivated: Vec<ModSource>,
}

impl SourceActivation {
    /// Whether nothing changed.
    pub fn is_empty(&self) -> bool {
        self.activated.is_empty() && self.deactivated.is_empty()
    }

    fn merge(&mut self, other: SourceActivation) {
        for source in other.activated {
            if let Some(pos) = self.deactivated.iter().position(|s| *s == source) {
                self.deactivated.remove(pos);
            } else {
                self.activated.push(source);
            }
        }
        for source in other.deactivated {
            if let Some(pos) = self.activated.iter().position(|s| *s == source) {
                self.activated.remove(pos);
            } else {
                self.deactivated.push(source);
            }
        }
    }
}

/// Net contribution per destination for one tick.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DestinationOffsets {
    sums: Vec<(Destination, f32)>,
}

impl DestinationOffsets {
    /// Add a contribution to `destination`.
    pub fn add(&mut self, destination: Destination, value: f32) {
        match self.sums.iter_mut().find(|(d, _)| *d == destination) {
            Some((_, sum)) => *sum += value,
            None => self.sums.push((destination, value)),
        }
    }

    /// Summed contribution for `destination`, zero if nothing targets it.
    pub fn sum(&self, destination: Destination) -> f32 {
        self.sums
            .iter()
            .find(|(d, _)| *d == destination)
            .map_or(0.0, |(_, s)| *s)
    }

    /// Every destination with a contribution.
    pub fn iter(&self) -> impl Iterator<Item = (Destination, f32)> + '_ {
        self.sums.iter().copied()
    }

    /// Whether no slot contributed.
    pub fn is_empty(&self) -> bool {
        self.sums.is_empty()
    }
}

/// Range information for one modulatable voice parameter.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ModTarget {
    /// Unmodulated value.
    pub base: f32,
    /// Span covered by a full-scale (±1) sum, end to end.
    pub range: f32,
    /// Lowest allowed value.
    pub min: f32,
    /// Highest allowed value.
    pub max: f32,
}

impl ModTarget {
    /// Value for a summed modulation: `clamp(base + sum * range / 2, min, max)`.
    #[inline]
    pub fn apply(&self, sum: f32) -> f32 {
        (self.base + sum * self.range * 0.5).clamp(self.min, self.max)
    }

    /// Offset from base produced by `sum`, after clamping.
    #[inline]
    pub fn offset(&self, sum: f32) -> f32 {
        self.apply(sum) - self.base
    }
}

/// Destinations a voice currently exposes, rebuilt on every trigger.
#[derive(Debug, Clone, Default)]
pub struct ModTargetRegistry {
    entries: Vec<(Destination, ModTarget)>,
}

impl ModTargetRegistry {
    /// Register or replace a destination.
    pub fn register(&mut self, destination: Destination, target: ModTarget) {
        match self.entries.iter_mut().find(|(d, _)| *d == destination) {
            Some((_, t)) => *t = target,
            None => self.entries.push((destination, target)),
        }
    }

    /// Range information for `destination`.
    pub fn get(&self, destination: Destination) -> Option<&ModTarget> {
        self.entries
            .iter()
            .find(|(d, _)| *d == destination)
            .map(|(_, t)| t)
    }

    /// Update the base of an existing destination.
    pub fn set_base(&mut self, destination: Destination, base: f32) {
        if let Some((_, t)) = self.entries.iter_mut().find(|(d, _)| *d == destination) {
            t.base = base;
        }
    }

    /// Remove every destination.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Registered destinations.
    pub fn iter(&self) -> impl Iterator<Item = (Destination, &ModTarget)> + '_ {
        self.entries.iter().map(|(d, t)| (*d, t))
    }

    /// Number of registered destinations.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Fixed-capacity modulation matrix with a control-rate tick schedule.
#[derive(Debug, Clone)]
pub struct ModulationEngine {
    slots: [ModulationSlot; MAX_SLOTS],
    sources: SourceRefCounts,
    tick_interval: f64,
    next_tick: Option<f64>,
}

impl Default for ModulationEngine {
    fn default() -> Self {
        Self::new(DEFAULT_TICK_RATE_HZ)
    }
}

impl ModulationEngine {
    /// Create an empty matrix ticking at `tick_rate_hz`.
    pub fn new(tick_rate_hz: f64) -> Self {
        let rate = if tick_rate_hz.is_finite() && tick_rate_hz > 0.0 {
            tick_rate_hz
        } else {
            DEFAULT_TICK_RATE_HZ
        };
        let mut slots = [ModulationSlot::default(); MAX_SLOTS];
        for (i, slot) in slots.iter_mut().enumerate() {
            slot.id = i;
        }
        Self {
            slots,
            sources: SourceRefCounts::default(),
            tick_interval: 1.0 / rate,
            next_tick: None,
        }
    }

    /// Seconds between ticks.
    pub fn tick_interval(&self) -> f64 {
        self.tick_interval
    }

    /// Every slot, in order.
    pub fn slots(&self) -> &[ModulationSlot] {
        &self.slots
    }

    /// Slot at `index`.
    pub fn slot(&self, index: usize) -> Option<&ModulationSlot> {
        self.slots.get(index)
    }

    /// Replace slot `index`, returning the resulting source activation changes.
    ///
    /// The amount is clamped to [-1, 1] and the slot id is set to `index`.
    pub fn set_slot(
        &mut self,
        index: usize,
        slot: ModulationSlot,
    ) -> Result<SourceActivation, SynthError> {
        if index >= MAX_SLOTS {
            return Err(SynthError::slot_index(index, MAX_SLOTS));
        }
        let mut slot = slot;
        slot.id = index;
        slot.amount = if slot.amount.is_finite() {
            slot.amount.clamp(-1.0, 1.0)
        } else {
            0.0
        };

        let old = self.slots[index].referenced_source();
        let new = slot.referenced_source();
        self.slots[index] = slot;

        let mut change = SourceActivation::default();
        if let Some(source) = new {
            if self.sources.acquire(source) {
                change.activated.push(source);
            }
        }
        if let Some(source) = old {
            if self.sources.release(source) {
                change.deactivated.push(source);
            }
        }
        // Re-acquiring the same source is a no-op from the owner's view.
        change.activated.retain(|s| !change.deactivated.contains(s));
        Ok(change)
    }

    /// Reset slot `index` to the zero-valued default.
    pub fn clear_slot(&mut self, index: usize) -> Result<SourceActivation, SynthError> {
        self.set_slot(index, ModulationSlot::default())
    }

    /// Reset every slot.
    pub fn clear_all(&mut self) -> SourceActivation {
        let mut change = SourceActivation::default();
        for index in 0..MAX_SLOTS {
            if let Ok(c) = self.clear_slot(index) {
                change.merge(c);
            }
        }
        change
    }

    /// Whether an enabled slot references `source`.
    pub fn is_source_active(&self, source: ModSource) -> bool {
        self.sources.is_active(source)
    }

    /// Number of enabled slots referencing `source`.
    pub fn source_references(&self, source: ModSource) -> usize {
        self.sources.count(source)
    }

    /// Sources referenced by at least one enabled slot.
    pub fn active_sources(&self) -> impl Iterator<Item = ModSource> + '_ {
        self.sources.active()
    }

    /// Whether any slot would contribute.
    pub fn has_routes(&self) -> bool {
        self.slots.iter().any(|s| s.referenced_source().is_some())
    }

    /// Sum every enabled slot's shaped contribution per destination.
    pub fn evaluate<P: SourceProvider + ?Sized>(&self, provider: &P) -> DestinationOffsets {
        let mut offsets = DestinationOffsets::default();
        for slot in &self.slots {
            let (Some(source), Some(destination)) = (slot.source, slot.destination) else {
                continue;
            };
            if !slot.enabled || slot.amount == 0.0 {
                continue;
            }
            let value = provider.source_value(source).clamp(-1.0, 1.0);
            offsets.add(destination, slot.curve.apply(value * slot.amount));
        }
        offsets
    }

    /// Evaluate and pass the per-destination sums to `apply`.
    pub fn tick<P, F>(&self, provider: &P, mut apply: F)
    where
        P: SourceProvider + ?Sized,
        F: FnMut(&DestinationOffsets),
    {
        let offsets = self.evaluate(provider);
        apply(&offsets);
    }

    /// Start the tick schedule at `time`.
    pub fn start_ticking(&mut self, time: f64) {
        self.next_tick = Some(time);
    }

    /// Time of the next scheduled tick.
    pub fn next_tick(&self) -> Option<f64> {
        self.next_tick
    }

    /// Pop the next tick due at or before `now`.
    ///
    /// If the clock jumped far ahead, ticks older than a few intervals are
    /// skipped rather than replayed.
    pub fn take_due_tick(&mut self, now: f64) -> Option<f64> {
        let next = *self.next_tick.get_or_insert(now);
        if next > now {
            return None;
        }
        let backlog = self.tick_interval * f64::from(MAX_CATCH_UP_TICKS);
        let due = if now - next > backlog {
            let skipped = ((now - next) / self.tick_interval).floor();
            next + skipped * self.tick_interval
        } else {
            next
        };
        self.next_tick = Some(due + self.tick_interval);
        Some(due)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_names_round_trip() {
        for source in [
            ModSource::Lfo(0),
            ModSource::Lfo(1),
            ModSource::FilterEnvelope,
            ModSource::AmpEnvelope,
            ModSource::Velocity,
            ModSource::Aftertouch,
            ModSource::ModWheel,
        ] {
            assert_eq!(source.to_string().parse::<ModSource>().unwrap(), source);
        }
        assert_eq!("lfo_1".parse::<ModSource>().unwrap(), ModSource::Lfo(0));
        assert!("lfo_0".parse::<ModSource>().is_err());
        assert!("lfo_9".parse::<ModSource>().is_err());
        assert!("envelope".parse::<ModSource>().is_err());
    }

    #[test]
    fn test_destination_names_round_trip() {
        for destination in [
            Destination::FilterCutoff,
            Destination::FilterResonance,
            Destination::OscLevel(0),
            Destination::OscDetune(1),
            Destination::OscPitch(2),
            Destination::AmpGain,
            Destination::Pan,
        ] {
            let text = destination.to_string();
            assert_eq!(text.parse::<Destination>().unwrap(), destination, "{text}");
        }
        assert_eq!(Destination::OscLevel(0).to_string(), "osc1.level");
        assert!("osc4.level".parse::<Destination>().is_err());
        assert!("osc1.volume".parse::<Destination>().is_err());
        assert!("filter".parse::<Destination>().is_err());
    }

    #[test]
    fn test_curves() {
        assert_eq!(ModCurve::Linear.apply(0.3), 0.3);
        assert!((ModCurve::Exponential.apply(-0.5) + 0.25).abs() < 1e-6);
        assert!((ModCurve::Exponential.apply(0.5) - 0.25).abs() < 1e-6);
        assert_eq!(ModCurve::SCurve.apply(0.0), 0.0);
        assert!((ModCurve::SCurve.apply(1.0) - 1.0).abs() < 1e-6);
        assert!((ModCurve::SCurve.apply(-1.0) + 1.0).abs() < 1e-6);
        // Smoothstep steepens around the middle.
        assert!(ModCurve::SCurve.apply(0.5) > 0.5);
    }

    #[test]
    fn test_curve_serde_names() {
        let json = serde_json::to_string(&ModCurve::SCurve).unwrap();
        assert_eq!(json, "\"s-curve\"");
        let back: ModCurve = serde_json::from_str("\"exponential\"").unwrap();
        assert_eq!(back, ModCurve::Exponential);
    }

    #[test]
    fn test_ref_counts() {
        let mut refs = SourceRefCounts::default();
        assert!(refs.acquire(ModSource::Lfo(0)));
        assert!(!refs.acquire(ModSource::Lfo(0)));
        assert_eq!(refs.count(ModSource::Lfo(0)), 2);
        assert!(!refs.release(ModSource::Lfo(0)));
        assert!(refs.release(ModSource::Lfo(0)));
        assert!(!refs.release(ModSource::Lfo(0)));
        assert!(!refs.is_active(ModSource::Lfo(0)));
    }

    #[test]
    fn test_slot_changes_report_activation() {
        let mut matrix = ModulationEngine::default();
        let route = ModulationSlot::route(ModSource::Lfo(1), Destination::Pan, 0.5);

        let change = matrix.set_slot(3, route).unwrap();
        assert_eq!(change.activated, [ModSource::Lfo(1)]);

        let change = matrix.set_slot(4, route).unwrap();
        assert!(change.is_empty());
        assert_eq!(matrix.source_references(ModSource::Lfo(1)), 2);

        let change = matrix.clear_slot(3).unwrap();
        assert!(change.is_empty());

        let change = matrix.set_slot(4, route.disabled()).unwrap();
        assert_eq!(change.deactivated, [ModSource::Lfo(1)]);
        assert!(!matrix.is_source_active(ModSource::Lfo(1)));
    }

    #[test]
    fn test_replacing_slot_with_same_source_is_quiet() {
        let mut matrix = ModulationEngine::default();
        let route = ModulationSlot::route(ModSource::Lfo(0), Destination::Pan, 0.5);
        matrix.set_slot(0, route).unwrap();
        let change = matrix
            .set_slot(0, ModulationSlot::route(ModSource::Lfo(0), Destination::AmpGain, -1.0))
            .unwrap();
        assert!(change.is_empty());
        assert_eq!(matrix.source_references(ModSource::Lfo(0)), 1);
    }

    #[test]
    fn test_slot_index_out_of_range() {
        let mut matrix = ModulationEngine::default();
        let err = matrix.set_slot(MAX_SLOTS, ModulationSlot::default());
        assert!(matches!(err, Err(SynthError::SlotIndex { index: 16, .. })));
    }

    #[test]
    fn test_disabled_or_zero_slots_contribute_nothing() {
        let mut matrix = ModulationEngine::default();
        matrix
            .set_slot(0, ModulationSlot::route(ModSource::Velocity, Destination::Pan, 0.0))
            .unwrap();
        matrix
            .set_slot(
                1,
                ModulationSlot::route(ModSource::Velocity, Destination::AmpGain, 1.0).disabled(),
            )
            .unwrap();
        let offsets = matrix.evaluate(&|_: ModSource| 1.0_f32);
        assert_eq!(offsets.sum(Destination::Pan), 0.0);
        assert_eq!(offsets.sum(Destination::AmpGain), 0.0);
    }

    #[test]
    fn test_contributions_accumulate_per_destination() {
        let mut matrix = ModulationEngine::default();
        matrix
            .set_slot(0, ModulationSlot::route(ModSource::Velocity, Destination::Pan, 0.5))
            .unwrap();
        matrix
            .set_slot(
                1,
                ModulationSlot::route(ModSource::ModWheel, Destination::Pan, 1.0)
                    .with_curve(ModCurve::Exponential),
            )
            .unwrap();
        let provider = |source: ModSource| -> f32 {
            match source {
                ModSource::Velocity => 1.0,
                ModSource::ModWheel => -0.5,
                _ => 0.0,
            }
        };
        let offsets = matrix.evaluate(&provider);
        assert!((offsets.sum(Destination::Pan) - 0.25).abs() < 1e-6);

        let mut seen = None;
        matrix.tick(&provider, |o| seen = Some(o.sum(Destination::Pan)));
        assert_eq!(seen, Some(offsets.sum(Destination::Pan)));
    }

    #[test]
    fn test_target_application_clamps() {
        let cutoff = ModTarget {
            base: 2000.0,
            range: 19980.0,
            min: 20.0,
            max: 20000.0,
        };
        assert!((cutoff.apply(0.5) - (2000.0 + 0.5 * 9990.0)).abs() < 1e-2);
        assert_eq!(cutoff.apply(1.0), 11990.0);
        assert_eq!(cutoff.apply(-1.0), 20.0);
        assert_eq!(cutoff.offset(0.0), 0.0);
    }

    #[test]
    fn test_registry_replaces_entries() {
        let mut registry = ModTargetRegistry::default();
        let t = ModTarget {
            base: 0.0,
            range: 2.0,
            min: -1.0,
            max: 1.0,
        };
        registry.register(Destination::Pan, t);
        registry.register(Destination::Pan, ModTarget { base: 0.5, ..t });
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get(Destination::Pan).unwrap().base, 0.5);
        registry.set_base(Destination::Pan, -0.25);
        assert_eq!(registry.get(Destination::Pan).unwrap().base, -0.25);
        registry.clear();
        assert!(registry.is_empty());
    }

    #[test]
    fn test_tick_schedule() {
        let mut matrix = ModulationEngine::new(60.0);
        matrix.start_ticking(0.0);
        assert_eq!(matrix.take_due_tick(0.0), Some(0.0));
        assert_eq!(matrix.take_due_tick(0.0), None);
        let t = matrix.take_due_tick(0.02).unwrap();
        assert!((t - 1.0 / 60.0).abs() < 1e-12);

        // A long jump replays at most a short backlog.
        let mut count = 0;
        while matrix.take_due_tick(100.0).is_some() {
            count += 1;
        }
        assert!(count <= MAX_CATCH_UP_TICKS as usize + 2, "replayed {count}");
    }
}
