//! Voice allocation over a bounded pool.
//!
//! [`VoiceAllocator`] owns the voices and decides which one plays each note.
//!
//! ## Poly mode
//!
//! Each note-on takes a free voice. When every voice is allocated, the
//! oldest allocation is stolen: its voice is hard-reset and retriggered.
//! Note-off releases the voice mapped to that note; the mapping is dropped
//! once the release has decayed, through a cleanup event queued on the
//! logical clock.
//!
//! ## Mono mode
//!
//! One shared voice and a list of held notes, last-note priority. A new
//! note while the voice sounds glides to the new pitch over the portamento
//! time and retriggers the envelopes unless legato is on. A voice that is
//! already releasing is always retriggered. Lifting a note only releases
//! the voice once nothing is held; lifting the sounding note while others
//! are held glides back to the most recent remaining one.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::scheduler::EventQueue;
use crate::voice::{NoteEvent, Voice};

/// Polyphony policy.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoiceMode {
    /// Independent voice per note, with stealing.
    #[default]
    Poly,
    /// Single voice with portamento and legato.
    Mono,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Allocation {
    note: u8,
    voice: usize,
    released: bool,
}

/// Deferred free of a voice whose release has decayed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Cleanup {
    voice: usize,
    generation: u64,
}

/// Builds voices for the pool.
pub type VoiceFactory<V> = Box<dyn FnMut() -> V>;

/// Assigns notes to a fixed-capacity pool of voices.
///
/// # Example
///
/// ```rust
/// use dawg_core::NoiseBuffer;
/// use dawg_synth::{NoteEvent, SubtractiveVoice, SynthPatch, VoiceAllocator, VoiceMode};
///
/// let noise = NoiseBuffer::new(4096, 1);
/// let mut pool = VoiceAllocator::new(2, VoiceMode::Poly, move || {
///     SubtractiveVoice::new(48000.0, noise.clone())
/// });
/// let patch = SynthPatch::default();
///
/// pool.note_on(&patch, &NoteEvent::new(60, 100), 0.0);
/// pool.note_on(&patch, &NoteEvent::new(64, 100), 0.0);
/// pool.note_on(&patch, &NoteEvent::new(67, 100), 0.1);
///
/// assert_eq!(pool.allocated_count(), 2);
/// assert_eq!(pool.steal_count(), 1);
/// ```
pub struct VoiceAllocator<V: Voice> {
    voices: Vec<V>,
    capacity: usize,
    factory: VoiceFactory<V>,
    generations: Vec<u64>,
    allocations: Vec<Allocation>,
    mode: VoiceMode,
    held: Vec<NoteEvent>,
    portamento: f64,
    legato: bool,
    cleanup: EventQueue<Cleanup>,
    steals: u64,
}

impl<V: Voice> VoiceAllocator<V> {
    /// Create a pool of `capacity` voices (at least one).
    ///
    /// Poly mode builds every voice up front; mono mode builds its single
    /// voice on the first note.
    pub fn new(capacity: usize, mode: VoiceMode, factory: impl FnMut() -> V + 'static) -> Self {
        let mut pool = Self {
            voices: Vec::new(),
            capacity: capacity.max(1),
            factory: Box::new(factory),
            generations: Vec::new(),
            allocations: Vec::new(),
            mode,
            held: Vec::new(),
            portamento: 0.0,
            legato: false,
            cleanup: EventQueue::new(),
            steals: 0,
        };
        if mode == VoiceMode::Poly {
            pool.ensure_voices(pool.capacity);
        }
        pool
    }

    /// Current polyphony policy.
    pub fn mode(&self) -> VoiceMode {
        self.mode
    }

    /// Switch policy. Every sounding voice is silenced.
    pub fn set_mode(&mut self, mode: VoiceMode, time: f64) {
        if mode == self.mode {
            return;
        }
        self.stop_all(time);
        self.mode = mode;
        if mode == VoiceMode::Poly {
            self.ensure_voices(self.capacity);
        }
        debug!(?mode, "voice mode changed");
    }

    /// Glide time in seconds for mono mode.
    pub fn portamento(&self) -> f64 {
        self.portamento
    }

    /// Set the mono glide time. Negative values are treated as zero.
    pub fn set_portamento(&mut self, seconds: f64) {
        self.portamento = if seconds.is_finite() {
            seconds.max(0.0)
        } else {
            0.0
        };
    }

    /// Whether overlapping mono notes skip the envelope retrigger.
    pub fn legato(&self) -> bool {
        self.legato
    }

    /// Enable or disable legato.
    pub fn set_legato(&mut self, legato: bool) {
        self.legato = legato;
    }

    /// Maximum simultaneous allocations.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Voices built so far.
    pub fn voices(&self) -> &[V] {
        &self.voices
    }

    /// Mutable access to every built voice, for live parameter updates.
    pub fn voices_mut(&mut self) -> &mut [V] {
        &mut self.voices
    }

    /// Number of note-to-voice mappings (poly), or 1 while the mono voice sounds.
    pub fn allocated_count(&self) -> usize {
        match self.mode {
            VoiceMode::Poly => self.allocations.len(),
            VoiceMode::Mono => usize::from(self.voices.first().is_some_and(V::is_active)),
        }
    }

    /// Number of voices holding a note.
    pub fn active_count(&self) -> usize {
        self.voices.iter().filter(|v| v.is_active()).count()
    }

    /// Voices stolen since creation.
    pub fn steal_count(&self) -> u64 {
        self.steals
    }

    /// Notes currently held in mono mode, oldest first.
    pub fn held_notes(&self) -> impl Iterator<Item = u8> + '_ {
        self.held.iter().map(|e| e.note)
    }

    /// Voice playing `note`, if any.
    pub fn voice_for_note(&self, note: u8) -> Option<&V> {
        match self.mode {
            VoiceMode::Poly => self
                .allocations
                .iter()
                .rev()
                .find(|a| a.note == note)
                .and_then(|a| self.voices.get(a.voice)),
            VoiceMode::Mono => self.voices.first().filter(|v| v.note() == Some(note)),
        }
    }

    /// Cleanup events not yet fired.
    pub fn pending_cleanups(&self) -> usize {
        self.cleanup.len()
    }

    /// Time of the next cleanup event.
    pub fn next_cleanup(&self) -> Option<f64> {
        self.cleanup.next_time()
    }

    /// Start `event` at `time`.
    pub fn note_on(&mut self, patch: &V::Patch, event: &NoteEvent, time: f64) {
        match self.mode {
            VoiceMode::Poly => self.poly_note_on(patch, event, time),
            VoiceMode::Mono => self.mono_note_on(patch, event, time),
        }
    }

    /// Release `note` at `time`. Unknown or already released notes are ignored.
    pub fn note_off(&mut self, note: u8, time: f64) {
        match self.mode {
            VoiceMode::Poly => self.poly_note_off(note, time),
            VoiceMode::Mono => self.mono_note_off(note, time),
        }
    }

    /// Release every sounding note through its envelope.
    pub fn release_all(&mut self, time: f64) {
        match self.mode {
            VoiceMode::Poly => {
                let notes: Vec<u8> = self
                    .allocations
                    .iter()
                    .filter(|a| !a.released)
                    .map(|a| a.note)
                    .collect();
                for note in notes {
                    self.poly_note_off(note, time);
                }
            }
            VoiceMode::Mono => {
                self.held.clear();
                self.release_mono_voice(time);
            }
        }
    }

    /// Silence every voice immediately, skipping release.
    pub fn stop_all(&mut self, time: f64) {
        for (voice, generation) in self.voices.iter_mut().zip(self.generations.iter_mut()) {
            voice.reset(time);
            *generation += 1;
        }
        self.allocations.clear();
        self.held.clear();
        self.cleanup.clear();
    }

    /// Fire cleanup events due by `now`. Returns the number of voices freed.
    pub fn poll(&mut self, now: f64) -> usize {
        let mut freed = 0;
        while let Some((time, job)) = self.cleanup.pop_due(now) {
            if self.generations.get(job.voice) != Some(&job.generation) {
                continue;
            }
            self.allocations.retain(|a| a.voice != job.voice);
            if let Some(voice) = self.voices.get_mut(job.voice) {
                voice.reset(time);
            }
            freed += 1;
            debug!(voice = job.voice, time, "voice freed");
        }
        freed
    }

    /// Sum every voice's output at `time`.
    #[inline]
    pub fn render(&mut self, time: f64) -> (f32, f32) {
        let mut left = 0.0;
        let mut right = 0.0;
        for voice in &mut self.voices {
            let (l, r) = voice.render(time);
            left += l;
            right += r;
        }
        (left, right)
    }

    /// Tear down every voice. The pool is unusable afterwards.
    pub fn dispose(&mut self) {
        for voice in &mut self.voices {
            voice.dispose();
        }
        self.allocations.clear();
        self.held.clear();
        self.cleanup.clear();
    }

    fn ensure_voices(&mut self, count: usize) {
        while self.voices.len() < count {
            self.voices.push((self.factory)());
            self.generations.push(0);
        }
    }

    fn start_voice(&mut self, index: usize, patch: &V::Patch, event: &NoteEvent, time: f64) {
        self.generations[index] += 1;
        self.voices[index].trigger(patch, event, time);
    }

    fn free_voice(&self) -> Option<usize> {
        (0..self.voices.len()).find(|i| !self.allocations.iter().any(|a| a.voice == *i))
    }

    fn poly_note_on(&mut self, patch: &V::Patch, event: &NoteEvent, time: f64) {
        let index = if let Some(pos) = self.allocations.iter().position(|a| a.note == event.note) {
            let reused = self.allocations.remove(pos);
            debug!(note = event.note, voice = reused.voice, "retriggering held note");
            reused.voice
        } else if let Some(index) = self.free_voice() {
            index
        } else {
            // Pool is full: every voice is allocated, so there is an oldest.
            let oldest = self.allocations.remove(0);
            self.voices[oldest.voice].reset(time);
            self.steals += 1;
            debug!(
                stolen = oldest.note,
                note = event.note,
                voice = oldest.voice,
                "voice stolen"
            );
            oldest.voice
        };
        self.start_voice(index, patch, event, time);
        self.allocations.push(Allocation {
            note: event.note,
            voice: index,
            released: false,
        });
    }

    fn poly_note_off(&mut self, note: u8, time: f64) {
        let Some(allocation) = self
            .allocations
            .iter_mut()
            .find(|a| a.note == note && !a.released)
        else {
            return;
        };
        allocation.released = true;
        let index = allocation.voice;
        let duration = self.voices[index].release(time);
        self.cleanup.push(
            time + duration,
            Cleanup {
                voice: index,
                generation: self.generations[index],
            },
        );
    }

    fn mono_note_on(&mut self, patch: &V::Patch, event: &NoteEvent, time: f64) {
        self.held.retain(|e| e.note != event.note);
        self.held.push(*event);
        self.ensure_voices(1);

        let voice = &self.voices[0];
        if !voice.is_active() || voice.is_finished(time) {
            self.start_voice(0, patch, event, time);
            debug!(note = event.note, "mono voice triggered");
            return;
        }

        let retrigger = !self.legato || voice.is_releasing();
        let portamento = self.portamento;
        let voice = &mut self.voices[0];
        voice.glide_to(event, time, portamento);
        if retrigger {
            voice.retrigger(event, time);
            // Invalidates a cleanup queued by an earlier release.
            self.generations[0] += 1;
        }
        debug!(note = event.note, retrigger, "mono glide");
    }

    fn mono_note_off(&mut self, note: u8, time: f64) {
        let before = self.held.len();
        self.held.retain(|e| e.note != note);
        if self.held.len() == before {
            return;
        }
        let sounding = self.voices.first().and_then(V::note) == Some(note);
        match self.held.last().copied() {
            None => self.release_mono_voice(time),
            Some(last) if sounding => {
                let portamento = self.portamento;
                if let Some(voice) = self.voices.first_mut() {
                    voice.glide_to(&last, time, portamento);
                }
                debug!(note = last.note, "mono return to held note");
            }
            Some(_) => {}
        }
    }

    fn release_mono_voice(&mut self, time: f64) {
        let Some(voice) = self.voices.first_mut() else {
            return;
        };
        if !voice.is_active() || voice.is_releasing() {
            return;
        }
        let duration = voice.release(time);
        self.cleanup.push(
            time + duration,
            Cleanup {
                voice: 0,
                generation: self.generations[0],
            },
        );
    }
}

impl<V: Voice> Drop for VoiceAllocator<V> {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl<V: Voice + std::fmt::Debug> std::fmt::Debug for VoiceAllocator<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VoiceAllocator")
            .field("mode", &self.mode)
            .field("capacity", &self.capacity)
            .field("voices", &self.voices.len())
            .field("allocations", &self.allocations)
            .field("steals", &self.steals)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RELEASE: f64 = 0.5;

    /// Records what the allocator asked of it.
    #[derive(Debug, Default)]
    struct ProbeVoice {
        note: Option<u8>,
        active: bool,
        release_end: Option<f64>,
        triggers: Vec<(u8, f64)>,
        retriggers: Vec<(u8, f64)>,
        glides: Vec<(u8, f64, f64)>,
        resets: usize,
        disposed: bool,
    }

    impl Voice for ProbeVoice {
        type Patch = ();

        fn trigger(&mut self, _: &(), event: &NoteEvent, time: f64) {
            self.note = Some(event.note);
            self.active = true;
            self.release_end = None;
            self.triggers.push((event.note, time));
        }

        fn release(&mut self, time: f64) -> f64 {
            self.release_end = Some(time + RELEASE);
            RELEASE
        }

        fn reset(&mut self, _: f64) {
            self.note = None;
            self.active = false;
            self.release_end = None;
            self.resets += 1;
        }

        fn dispose(&mut self) {
            self.disposed = true;
        }

        fn current_amplitude(&self, _: f64) -> f32 {
            if self.active { 1.0 } else { 0.0 }
        }

        fn glide_to(&mut self, event: &NoteEvent, time: f64, duration: f64) {
            self.note = Some(event.note);
            self.glides.push((event.note, time, duration));
        }

        fn retrigger(&mut self, event: &NoteEvent, time: f64) {
            self.release_end = None;
            self.retriggers.push((event.note, time));
        }

        fn note(&self) -> Option<u8> {
            self.note
        }

        fn is_active(&self) -> bool {
            self.active
        }

        fn is_releasing(&self) -> bool {
            self.release_end.is_some()
        }

        fn is_finished(&self, time: f64) -> bool {
            !self.active || self.release_end.is_some_and(|end| time >= end)
        }

        fn render(&mut self, _: f64) -> (f32, f32) {
            (0.0, 0.0)
        }
    }

    fn pool(capacity: usize, mode: VoiceMode) -> VoiceAllocator<ProbeVoice> {
        VoiceAllocator::new(capacity, mode, ProbeVoice::default)
    }

    fn on(pool: &mut VoiceAllocator<ProbeVoice>, note: u8, time: f64) {
        pool.note_on(&(), &NoteEvent::new(note, 100), time);
    }

    #[test]
    fn test_poly_builds_pool_up_front() {
        let p = pool(4, VoiceMode::Poly);
        assert_eq!(p.voices().len(), 4);
        let m = pool(4, VoiceMode::Mono);
        assert!(m.voices().is_empty());
    }

    #[test]
    fn test_poly_steals_oldest() {
        let mut p = pool(3, VoiceMode::Poly);
        on(&mut p, 60, 0.0);
        on(&mut p, 62, 0.1);
        on(&mut p, 64, 0.2);
        assert_eq!(p.steal_count(), 0);

        on(&mut p, 65, 0.3);
        assert_eq!(p.steal_count(), 1);
        assert_eq!(p.allocated_count(), 3);
        assert!(p.voice_for_note(60).is_none());
        let v = p.voice_for_note(65).unwrap();
        assert_eq!(v.resets, 1);
        assert_eq!(v.triggers.last(), Some(&(65, 0.3)));
    }

    #[test]
    fn test_same_note_reuses_voice() {
        let mut p = pool(2, VoiceMode::Poly);
        on(&mut p, 60, 0.0);
        on(&mut p, 60, 0.5);
        assert_eq!(p.allocated_count(), 1);
        assert_eq!(p.voice_for_note(60).unwrap().triggers.len(), 2);
        assert_eq!(p.steal_count(), 0);
    }

    #[test]
    fn test_note_off_frees_after_release() {
        let mut p = pool(2, VoiceMode::Poly);
        on(&mut p, 60, 0.0);
        p.note_off(60, 1.0);
        assert_eq!(p.pending_cleanups(), 1);
        assert_eq!(p.poll(1.4), 0);
        assert_eq!(p.allocated_count(), 1);
        assert_eq!(p.poll(1.5), 1);
        assert_eq!(p.allocated_count(), 0);
        assert_eq!(p.active_count(), 0);
    }

    #[test]
    fn test_note_off_is_idempotent() {
        let mut p = pool(2, VoiceMode::Poly);
        on(&mut p, 60, 0.0);
        p.note_off(60, 1.0);
        p.note_off(60, 1.1);
        p.note_off(72, 1.1);
        assert_eq!(p.pending_cleanups(), 1);
    }

    #[test]
    fn test_stale_cleanup_ignored_after_steal() {
        let mut p = pool(1, VoiceMode::Poly);
        on(&mut p, 60, 0.0);
        p.note_off(60, 0.1);
        on(&mut p, 62, 0.2);
        assert_eq!(p.poll(10.0), 0);
        assert_eq!(p.voice_for_note(62).unwrap().note, Some(62));
    }

    #[test]
    fn test_stop_all_is_immediate() {
        let mut p = pool(3, VoiceMode::Poly);
        on(&mut p, 60, 0.0);
        on(&mut p, 64, 0.0);
        p.note_off(60, 0.5);
        p.stop_all(0.6);
        assert_eq!(p.allocated_count(), 0);
        assert_eq!(p.pending_cleanups(), 0);
        assert_eq!(p.active_count(), 0);
    }

    #[test]
    fn test_release_all_is_graceful() {
        let mut p = pool(3, VoiceMode::Poly);
        on(&mut p, 60, 0.0);
        on(&mut p, 64, 0.0);
        p.release_all(1.0);
        assert_eq!(p.pending_cleanups(), 2);
        assert_eq!(p.active_count(), 2);
        p.poll(1.5);
        assert_eq!(p.active_count(), 0);
    }

    #[test]
    fn test_mono_glides_and_retriggers() {
        let mut p = pool(4, VoiceMode::Mono);
        p.set_portamento(0.05);
        on(&mut p, 60, 0.0);
        on(&mut p, 67, 1.0);
        let v = &p.voices()[0];
        assert_eq!(v.triggers, [(60, 0.0)]);
        assert_eq!(v.glides, [(67, 1.0, 0.05)]);
        assert_eq!(v.retriggers, [(67, 1.0)]);
        assert_eq!(p.voices().len(), 1);
    }

    #[test]
    fn test_mono_legato_skips_retrigger_while_sustaining() {
        let mut p = pool(4, VoiceMode::Mono);
        p.set_legato(true);
        on(&mut p, 60, 0.0);
        on(&mut p, 64, 0.5);
        assert!(p.voices()[0].retriggers.is_empty());
    }

    #[test]
    fn test_mono_legato_forced_retrigger_when_releasing() {
        let mut p = pool(4, VoiceMode::Mono);
        p.set_legato(true);
        on(&mut p, 60, 0.0);
        p.note_off(60, 1.0);
        on(&mut p, 64, 1.2);
        assert_eq!(p.voices()[0].retriggers, [(64, 1.2)]);
        // The retrigger invalidated the earlier release's cleanup.
        assert_eq!(p.poll(2.0), 0);
        assert!(p.voices()[0].is_active());
    }

    #[test]
    fn test_mono_fresh_trigger_after_release() {
        let mut p = pool(4, VoiceMode::Mono);
        p.set_legato(true);
        on(&mut p, 60, 0.0);
        p.note_off(60, 1.0);
        p.poll(1.5);
        on(&mut p, 64, 2.0);
        let v = &p.voices()[0];
        assert_eq!(v.triggers, [(60, 0.0), (64, 2.0)]);
    }

    #[test]
    fn test_mono_keeps_playing_while_notes_held() {
        let mut p = pool(4, VoiceMode::Mono);
        on(&mut p, 60, 0.0);
        on(&mut p, 64, 0.1);
        on(&mut p, 67, 0.2);

        // Lifting a note that is not sounding changes nothing.
        p.note_off(64, 0.3);
        assert!(!p.voices()[0].is_releasing());
        assert_eq!(p.voices()[0].note, Some(67));

        // Lifting the sounding note returns to the last held one.
        p.note_off(67, 0.4);
        assert!(!p.voices()[0].is_releasing());
        assert_eq!(p.voices()[0].note, Some(60));
        assert_eq!(p.voices()[0].glides.last(), Some(&(60, 0.4, 0.0)));

        p.note_off(60, 0.5);
        assert!(p.voices()[0].is_releasing());
        assert_eq!(p.held_notes().count(), 0);
    }

    #[test]
    fn test_mode_switch_silences() {
        let mut p = pool(2, VoiceMode::Mono);
        on(&mut p, 60, 0.0);
        p.set_mode(VoiceMode::Poly, 0.5);
        assert_eq!(p.voices().len(), 2);
        assert_eq!(p.active_count(), 0);
        assert_eq!(p.held_notes().count(), 0);
    }

    #[test]
    fn test_dispose_reaches_every_voice() {
        let mut p = pool(3, VoiceMode::Poly);
        p.dispose();
        assert!(p.voices().iter().all(|v| v.disposed));
    }
}
