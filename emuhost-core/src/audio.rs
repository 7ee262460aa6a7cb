//! Audio output slot rotation.
//!
//! The engine produces audio in discrete fixed-size blocks while the output device consumes it
//! at a fixed real rate. [`AudioBufferRing`] absorbs the jitter between the two with a small
//! number of pre-allocated slots, and exposes it as two predicates the frame scheduler uses to
//! decide when to produce the next frame.

use crate::time::Duration;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{trace, warn};

/// Playback schedule shared between a slot and the sink playing it. This is the only state the
/// sink thread touches.
type ScheduleCell = Arc<Mutex<Option<Duration>>>;

/// An audio output device.
pub trait AudioSink {
    /// Current time of the sink's playback clock.
    fn current_time(&self) -> Duration;

    /// Schedule `slot` to start playing at `start` on the sink clock.
    ///
    /// The sink must call [`SlotCompletion::complete`] on [`AudioSlot::completion`] once it has
    /// observed that playback of the slot has finished.
    fn play(&mut self, slot: &AudioSlot, start: Duration);
}

impl<S: AudioSink + ?Sized> AudioSink for &mut S {
    fn current_time(&self) -> Duration {
        (**self).current_time()
    }

    fn play(&mut self, slot: &AudioSlot, start: Duration) {
        (**self).play(slot, start);
    }
}

impl<S: AudioSink + ?Sized> AudioSink for Box<S> {
    fn current_time(&self) -> Duration {
        (**self).current_time()
    }

    fn play(&mut self, slot: &AudioSlot, start: Duration) {
        (**self).play(slot, start);
    }
}

/// Handle a sink uses to signal that a scheduled slot finished playing.
#[derive(Debug, Clone)]
#[must_use]
pub struct SlotCompletion {
    schedule: ScheduleCell,
    start: Option<Duration>,
}

impl SlotCompletion {
    /// Mark playback as finished, freeing the slot for reuse.
    ///
    /// Only clears the schedule this handle was created for, so a late or repeated signal can't
    /// free a slot that has since been scheduled again.
    pub fn complete(&self) {
        let mut schedule = self.schedule.lock();
        if self.start.is_some() && *schedule == self.start {
            *schedule = None;
        }
    }

    /// The start time this completion refers to.
    #[must_use]
    pub const fn start(&self) -> Option<Duration> {
        self.start
    }
}

/// A fixed-capacity mono sample buffer plus its playback schedule.
#[derive(Debug)]
#[must_use]
pub struct AudioSlot {
    index: usize,
    samples: Box<[f32]>,
    sample_rate: u32,
    schedule: ScheduleCell,
}

impl AudioSlot {
    fn new(index: usize, frames: usize, sample_rate: u32) -> Self {
        Self {
            index,
            samples: vec![0.0; frames].into_boxed_slice(),
            sample_rate,
            schedule: Arc::new(Mutex::new(None)),
        }
    }

    /// Position of this slot in the rotation.
    #[must_use]
    pub const fn index(&self) -> usize {
        self.index
    }

    #[must_use]
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    #[must_use]
    pub const fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Playback length of the full buffer.
    #[must_use]
    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.samples.len() as f64 / f64::from(self.sample_rate))
    }

    /// Start time on the sink clock while queued or playing, `None` once completion was
    /// observed.
    #[must_use]
    pub fn scheduled_start(&self) -> Option<Duration> {
        *self.schedule.lock()
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.scheduled_start().is_some()
    }

    /// Completion handle for the current schedule.
    pub fn completion(&self) -> SlotCompletion {
        SlotCompletion {
            schedule: Arc::clone(&self.schedule),
            start: self.scheduled_start(),
        }
    }

    fn fill(&mut self, samples: &[f32]) {
        let len = samples.len().min(self.samples.len());
        if len != samples.len() || len != self.samples.len() {
            trace!(
                "audio block of {} samples doesn't match slot size {}",
                samples.len(),
                self.samples.len()
            );
        }
        self.samples[..len].copy_from_slice(&samples[..len]);
        self.samples[len..].fill(0.0);
    }
}

/// Result of handing an audio block to the ring.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[must_use]
pub enum Submission {
    /// The block was copied into `slot` and scheduled to start at `start`.
    Scheduled { slot: usize, start: Duration },
    /// The next slot was still playing, so the block was dropped.
    Overrun,
}

/// A fixed rotation of audio output slots scheduled back to back on an [`AudioSink`].
#[derive(Debug)]
#[must_use]
pub struct AudioBufferRing<S> {
    sink: S,
    slots: Vec<AudioSlot>,
    next_slot: usize,
    next_start: Duration,
    start_lead: Duration,
    overruns: u64,
}

impl<S: AudioSink> AudioBufferRing<S> {
    pub const DEFAULT_SIZE: usize = 3;
    pub const DEFAULT_SLOT_FRAMES: usize = 4096;
    pub const DEFAULT_SAMPLE_RATE: u32 = 44_100;
    /// Lead applied when the ring has fallen behind the sink clock, so playback is never
    /// scheduled in the past.
    pub const DEFAULT_START_LEAD: Duration = Duration::from_millis(50);

    /// Create a ring of `size` slots holding `slot_frames` samples each.
    pub fn new(
        sink: S,
        size: usize,
        slot_frames: usize,
        sample_rate: u32,
        start_lead: Duration,
    ) -> Self {
        assert!(size > 0, "audio ring must have at least one slot");
        assert!(sample_rate > 0, "audio sample rate must be non-zero");
        Self {
            sink,
            slots: (0..size)
                .map(|index| AudioSlot::new(index, slot_frames, sample_rate))
                .collect(),
            next_slot: 0,
            next_start: Duration::ZERO,
            start_lead,
            overruns: 0,
        }
    }

    /// Copy one block of samples into the next slot and schedule it directly after the
    /// previously scheduled slot.
    pub fn submit(&mut self, samples: &[f32]) -> Submission {
        if self.is_saturated() {
            self.overruns += 1;
            warn!(
                "receiving audio samples too fast, dropping block (slot {} still playing)",
                self.next_slot
            );
            return Submission::Overrun;
        }

        let now = self.sink.current_time();
        if self.next_start < now {
            self.next_start = now + self.start_lead;
        }
        let start = self.next_start;

        let index = self.next_slot;
        let slot = &mut self.slots[index];
        slot.fill(samples);
        *slot.schedule.lock() = Some(start);
        let duration = slot.duration();
        self.sink.play(slot, start);

        trace!(
            "scheduled audio slot {index} at {:.4}s (sink time: {:.4}s)",
            start.as_secs_f32(),
            now.as_secs_f32()
        );
        self.next_start += duration;
        self.next_slot = (self.next_slot + 1) % self.slots.len();

        Submission::Scheduled { slot: index, start }
    }

    /// Whether the slot due for reuse is still queued or playing.
    #[must_use]
    pub fn is_saturated(&self) -> bool {
        self.slots[self.next_slot].is_active()
    }

    /// Whether there is no buffered lead left: every scheduled slot has already started.
    #[must_use]
    pub fn is_lagging(&self) -> bool {
        let now = self.sink.current_time();
        !self
            .slots
            .iter()
            .filter_map(AudioSlot::scheduled_start)
            .any(|start| now < start)
    }

    pub fn slots(&self) -> &[AudioSlot] {
        &self.slots
    }

    /// Number of slots in the rotation.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Index of the slot the next block will be copied into.
    #[must_use]
    pub const fn next_slot(&self) -> usize {
        self.next_slot
    }

    /// Earliest sink time the next slot may start at.
    #[must_use]
    pub const fn next_start(&self) -> Duration {
        self.next_start
    }

    /// Playback length of a single slot.
    #[must_use]
    pub fn slot_duration(&self) -> Duration {
        self.slots[0].duration()
    }

    /// Number of blocks dropped because the sink could not keep up.
    #[must_use]
    pub const fn overruns(&self) -> u64 {
        self.overruns
    }

    pub const fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }
}
