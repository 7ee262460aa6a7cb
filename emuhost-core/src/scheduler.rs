//! Adaptive frame pacing.
//!
//! The host's presentation timer fires at the display's refresh rate, which is not necessarily
//! 60 Hz. On every tick the [`FrameScheduler`] decides whether the engine may advance a frame:
//! never while the audio ring is saturated, on the current tick while audio is lagging, and
//! otherwise once the nominal frame interval has elapsed. Waiting never blocks; the tick returns
//! and asks to be re-armed instead. At most one frame is advanced per display refresh.

use crate::{
    audio::{AudioBufferRing, AudioSink},
    time::{Duration, Instant},
};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use tracing::trace;

/// Shared flag that stops a periodic task from being re-armed.
#[derive(Debug, Clone, Default)]
#[must_use]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// When the presentation timer should invoke the scheduler again.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[must_use]
pub enum Schedule {
    /// On the next display refresh.
    NextRefresh,
    /// Once the given time has passed, or on the next refresh if that comes first.
    After(Duration),
}

/// The outcome of a single scheduler tick.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[must_use]
pub enum Tick {
    /// The audio ring has no free slot; production is held back.
    Deferred,
    /// The nominal frame interval hasn't elapsed yet.
    Waiting(Duration),
    /// A frame was due, but stepping is paused.
    Paused,
    /// A frame is (or was) advanced. `catch_up` is set when the interval wait was bypassed
    /// because audio is lagging.
    Advance { catch_up: bool },
    /// The loop was cancelled and must not be re-armed.
    Cancelled,
}

impl Tick {
    /// How to re-arm the timer after this tick, or `None` to stop.
    #[must_use]
    pub const fn schedule(&self) -> Option<Schedule> {
        match self {
            Self::Cancelled => None,
            Self::Waiting(remaining) => Some(Schedule::After(*remaining)),
            Self::Deferred | Self::Paused | Self::Advance { .. } => Some(Schedule::NextRefresh),
        }
    }
}

/// Frame counters, including a frames-per-second estimate.
#[derive(Debug, Copy, Clone, Default, PartialEq)]
#[must_use]
pub struct FrameStats {
    /// Frames advanced.
    pub frames: u64,
    /// Frames advanced early to replenish lagging audio.
    pub catch_up_frames: u64,
    /// Ticks skipped because the audio ring was saturated.
    pub deferred_ticks: u64,
    /// Ticks where a frame was due while paused.
    pub paused_ticks: u64,
    /// Frames per second measured over the last full window.
    pub fps: f32,
    window_start: Option<Instant>,
    window_frames: u32,
}

impl FrameStats {
    const FPS_WINDOW: u32 = 60;

    fn record_frame(&mut self, now: Instant, catch_up: bool) {
        self.frames += 1;
        if catch_up {
            self.catch_up_frames += 1;
        }
        let window_start = *self.window_start.get_or_insert(now);
        self.window_frames += 1;
        if self.window_frames >= Self::FPS_WINDOW {
            let elapsed = now.saturating_duration_since(window_start).as_secs_f32();
            if elapsed > 0.0 {
                self.fps = self.window_frames as f32 / elapsed;
            }
            self.window_start = Some(now);
            self.window_frames = 0;
        }
    }

    fn restart_window(&mut self, now: Instant) {
        self.window_start = Some(now);
        self.window_frames = 0;
    }
}

/// Decides, per presentation tick, whether to advance the engine.
#[derive(Debug)]
#[must_use]
pub struct FrameScheduler {
    frame_duration: Duration,
    last_advance: Instant,
    token: CancellationToken,
    stats: FrameStats,
}

impl FrameScheduler {
    /// 60 frames per second.
    pub const DEFAULT_FRAME_DURATION: Duration = Duration::from_nanos(1_000_000_000 / 60);

    pub fn new(frame_duration: Duration, now: Instant) -> Self {
        let mut stats = FrameStats::default();
        stats.restart_window(now);
        Self {
            frame_duration,
            last_advance: now,
            token: CancellationToken::new(),
            stats,
        }
    }

    /// Decide what to do on a tick arriving at `now`.
    ///
    /// When this returns [`Tick::Advance`], the caller must advance the engine and call
    /// [`FrameScheduler::cancel`] if that fails.
    pub fn poll<S: AudioSink>(
        &mut self,
        now: Instant,
        audio: &AudioBufferRing<S>,
        paused: bool,
    ) -> Tick {
        if self.token.is_cancelled() {
            return Tick::Cancelled;
        }

        if audio.is_saturated() {
            self.stats.deferred_ticks += 1;
            trace!("audio saturated, deferring frame");
            return Tick::Deferred;
        }

        let elapsed = now.saturating_duration_since(self.last_advance);
        let catch_up = elapsed < self.frame_duration;
        if catch_up && !audio.is_lagging() {
            return Tick::Waiting(self.frame_duration - elapsed);
        }

        if paused {
            self.stats.paused_ticks += 1;
            return Tick::Paused;
        }

        if catch_up {
            trace!("audio lagging, advancing early");
        }
        self.last_advance = now;
        self.stats.record_frame(now, catch_up);
        Tick::Advance { catch_up }
    }

    /// Stop re-arming until [`FrameScheduler::restart`].
    pub fn cancel(&mut self) {
        self.token.cancel();
    }

    /// Cancel the current loop and start a new one with pacing measured from `now`.
    pub fn restart(&mut self, now: Instant) {
        self.token.cancel();
        self.token = CancellationToken::new();
        self.last_advance = now;
        self.stats.restart_window(now);
    }

    /// Token for the current loop.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    #[must_use]
    pub const fn frame_duration(&self) -> Duration {
        self.frame_duration
    }

    pub fn set_frame_duration(&mut self, frame_duration: Duration) {
        self.frame_duration = frame_duration;
    }

    #[must_use]
    pub const fn last_advance(&self) -> Instant {
        self.last_advance
    }

    pub const fn stats(&self) -> &FrameStats {
        &self.stats
    }
}
