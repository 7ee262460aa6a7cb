//! Session lifecycle.

use crate::{
    audio::{AudioBufferRing, AudioSink},
    engine::{Engine, EngineError, FrameOutput, PresentationSink},
    error::{Error, Result},
    input::{InputTranslator, KeyBinding, Shortcut},
    scheduler::{CancellationToken, FrameScheduler, FrameStats, Tick},
    snapshot::SnapshotStore,
    time::{Duration, Instant},
};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, trace};

/// Session configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[must_use]
#[serde(default)] // Ensures new fields don't break existing configurations
pub struct Config {
    /// Number of audio output slots.
    pub ring_size: usize,
    /// Samples per audio slot.
    pub slot_frames: usize,
    /// Audio sample rate in Hz.
    pub sample_rate: u32,
    /// Lead applied when scheduling audio that fell behind the output clock.
    pub start_lead: Duration,
    /// Nominal time between frames.
    pub target_frame_duration: Duration,
    /// Keyboard to controller bindings.
    pub bindings: Vec<KeyBinding>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ring_size: 3,
            slot_frames: 4096,
            sample_rate: 44_100,
            start_lead: Duration::from_millis(50),
            target_frame_duration: FrameScheduler::DEFAULT_FRAME_DURATION,
            bindings: KeyBinding::defaults(),
        }
    }
}

impl Config {
    /// Longest accepted frame interval (1 frame per second).
    pub const MAX_FRAME_DURATION: Duration = Duration::from_secs(1);
    /// Longest accepted audio start lead.
    pub const MAX_START_LEAD: Duration = Duration::from_secs(1);

    /// # Errors
    ///
    /// Returns an error if any field would make the session unable to run.
    pub fn validate(&self) -> Result<()> {
        if self.ring_size == 0 {
            return Err(Error::invalid_config("ring_size", self.ring_size));
        }
        if self.slot_frames == 0 {
            return Err(Error::invalid_config("slot_frames", self.slot_frames));
        }
        if self.sample_rate == 0 {
            return Err(Error::invalid_config("sample_rate", self.sample_rate));
        }
        if self.target_frame_duration.is_zero()
            || self.target_frame_duration > Self::MAX_FRAME_DURATION
        {
            return Err(Error::invalid_config(
                "target_frame_duration",
                format!("{:?}", self.target_frame_duration),
            ));
        }
        if self.start_lead > Self::MAX_START_LEAD {
            return Err(Error::invalid_config(
                "start_lead",
                format!("{:?}", self.start_lead),
            ));
        }
        Ok(())
    }
}

/// Lifecycle of a session.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[must_use]
pub enum SessionState {
    /// No cartridge loaded.
    Idle,
    /// Cartridge loaded and frames are being advanced.
    Running,
    /// Cartridge loaded, the scheduler keeps ticking but frames are not advanced.
    Paused,
    /// The engine failed. Only a reset or a new cartridge recovers.
    Faulted,
}

impl AsRef<str> for SessionState {
    fn as_ref(&self) -> &str {
        match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Faulted => "faulted",
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_ref())
    }
}

/// Routes engine output to the audio ring and presentation sink.
struct SessionOutput<'a, A, P> {
    audio: &'a mut AudioBufferRing<A>,
    presentation: &'a mut P,
}

impl<A: AudioSink, P: PresentationSink> FrameOutput for SessionOutput<'_, A, P> {
    fn audio(&mut self, samples: &[f32]) {
        let _ = self.audio.submit(samples);
    }

    fn picture(&mut self, frame: &[u8]) {
        self.presentation.present(frame);
    }
}

/// Owns an engine and drives it from presentation timer ticks.
#[must_use]
pub struct EmulationSession<E: Engine, A, P> {
    engine: E,
    state: SessionState,
    cartridge_loaded: bool,
    audio: AudioBufferRing<A>,
    presentation: P,
    snapshots: SnapshotStore<E::Snapshot>,
    scheduler: FrameScheduler,
    input: InputTranslator,
    fault: Option<EngineError>,
}

impl<E: Engine, A, P> std::fmt::Debug for EmulationSession<E, A, P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmulationSession")
            .field("state", &self.state)
            .field("cartridge_loaded", &self.cartridge_loaded)
            .field("has_snapshot", &!self.snapshots.is_empty())
            .field("scheduler", &self.scheduler)
            .field("fault", &self.fault)
            .finish_non_exhaustive()
    }
}

impl<E, A, P> EmulationSession<E, A, P>
where
    E: Engine,
    A: AudioSink,
    P: PresentationSink,
{
    /// Message shown to the user when the engine faults.
    pub const FAULT_MESSAGE: &'static str =
        "An error has occurred. Please reset the emulator or reload the ROM.";

    /// Create an idle session. Nothing is scheduled until a cartridge is inserted.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn new(engine: E, audio_sink: A, presentation: P, config: &Config) -> Result<Self> {
        config.validate()?;
        let audio = AudioBufferRing::new(
            audio_sink,
            config.ring_size,
            config.slot_frames,
            config.sample_rate,
            config.start_lead,
        );
        let mut scheduler = FrameScheduler::new(config.target_frame_duration, Instant::now());
        scheduler.cancel();
        Ok(Self {
            engine,
            state: SessionState::Idle,
            cartridge_loaded: false,
            audio,
            presentation,
            snapshots: SnapshotStore::new(),
            scheduler,
            input: InputTranslator::with_bindings(config.bindings.iter().cloned()),
            fault: None,
        })
    }

    /// Load a cartridge image and reset into it.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine rejects the image. The session keeps its previous state.
    pub fn insert_cartridge(&mut self, rom: &[u8], now: Instant) -> Result<()> {
        if let Err(err) = self.engine.insert_cartridge(rom) {
            error!("failed to insert cartridge: {err}");
            return Err(Error::Cartridge(err));
        }
        info!("Inserted cartridge ({} bytes)", rom.len());
        self.cartridge_loaded = true;
        self.snapshots.clear();
        self.reset(now);
        Ok(())
    }

    /// Power cycle the engine, clear any fault and stored snapshot, and restart pacing from
    /// `now`. Does nothing without a cartridge.
    pub fn reset(&mut self, now: Instant) {
        if !self.cartridge_loaded {
            debug!("reset ignored: no cartridge inserted");
            return;
        }
        self.engine.reset();
        self.snapshots.clear();
        self.fault = None;
        self.set_state(SessionState::Running);
        self.scheduler.restart(now);
        info!("Reset");
    }

    /// Toggle between running and paused. Has no effect while idle or faulted.
    pub fn toggle_pause(&mut self) {
        match self.state {
            SessionState::Running => self.set_state(SessionState::Paused),
            SessionState::Paused => self.set_state(SessionState::Running),
            SessionState::Idle | SessionState::Faulted => {
                debug!("pause toggle ignored while {}", self.state);
            }
        }
    }

    /// Pause or resume. Has no effect while idle or faulted.
    pub fn pause(&mut self, paused: bool) {
        if paused != self.is_paused() {
            self.toggle_pause();
        }
    }

    /// Handle a physical key press. Reserved shortcut keys are handled by the session, other
    /// keys are translated and forwarded to the engine.
    pub fn key_down(&mut self, key: &str, now: Instant) {
        if let Some(shortcut) = InputTranslator::shortcut(key) {
            self.on_shortcut(shortcut, now);
        } else if let Some(button) = self.input.translate(key) {
            if self.engine_available() {
                trace!("key down: {key} -> {button}");
                self.engine.key_down(button);
            }
        }
    }

    /// Handle a physical key release.
    pub fn key_up(&mut self, key: &str) {
        if InputTranslator::shortcut(key).is_some() {
            return;
        }
        if let Some(button) = self.input.translate(key) {
            if self.engine_available() {
                trace!("key up: {key} -> {button}");
                self.engine.key_up(button);
            }
        }
    }

    /// Capture the engine state into the snapshot store. Returns whether a snapshot was taken.
    pub fn save_state(&mut self) -> bool {
        if !self.engine_available() {
            debug!("save state ignored while {}", self.state);
            return false;
        }
        let _ = self.snapshots.capture(&self.engine);
        info!("State Saved");
        true
    }

    /// Restore the stored snapshot. Returns whether a snapshot was restored.
    pub fn load_state(&mut self) -> bool {
        if !self.engine_available() {
            debug!("load state ignored while {}", self.state);
            return false;
        }
        let restored = self.snapshots.restore(&mut self.engine);
        if restored {
            info!("State Loaded");
        }
        restored
    }

    /// Presentation timer callback for a tick arriving at `now`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Engine`] if advancing the frame failed. The session is then faulted and
    /// every following tick returns [`Tick::Cancelled`] until a reset or cartridge insertion.
    pub fn tick(&mut self, now: Instant) -> Result<Tick> {
        let tick = self
            .scheduler
            .poll(now, &self.audio, self.state == SessionState::Paused);
        if let Tick::Advance { .. } = tick {
            let mut output = SessionOutput {
                audio: &mut self.audio,
                presentation: &mut self.presentation,
            };
            if let Err(err) = self.engine.advance_frame(&mut output) {
                self.on_fault(err.clone());
                return Err(Error::Engine(err));
            }
        }
        Ok(tick)
    }

    fn on_shortcut(&mut self, shortcut: Shortcut, now: Instant) {
        debug!("shortcut: {shortcut:?}");
        match shortcut {
            Shortcut::TogglePause => self.toggle_pause(),
            Shortcut::Reset => self.reset(now),
            Shortcut::SaveState => {
                let _ = self.save_state();
            }
            Shortcut::LoadState => {
                let _ = self.load_state();
            }
        }
    }

    fn on_fault(&mut self, err: EngineError) {
        error!("Emulation error: {err}");
        self.scheduler.cancel();
        self.set_state(SessionState::Faulted);
        self.fault = Some(err);
    }

    fn set_state(&mut self, state: SessionState) {
        if self.state != state {
            debug!("session state: {} -> {state}", self.state);
            self.state = state;
        }
    }

    fn engine_available(&self) -> bool {
        matches!(self.state, SessionState::Running | SessionState::Paused)
    }

    pub const fn state(&self) -> SessionState {
        self.state
    }

    /// Whether stepping is suppressed. Faulted sessions always report paused.
    #[must_use]
    pub fn is_paused(&self) -> bool {
        matches!(self.state, SessionState::Paused | SessionState::Faulted)
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.state == SessionState::Running
    }

    #[must_use]
    pub const fn cartridge_loaded(&self) -> bool {
        self.cartridge_loaded
    }

    /// The engine error that faulted the session, if any.
    #[must_use]
    pub const fn fault(&self) -> Option<&EngineError> {
        self.fault.as_ref()
    }

    #[must_use]
    pub fn has_snapshot(&self) -> bool {
        !self.snapshots.is_empty()
    }

    pub const fn engine(&self) -> &E {
        &self.engine
    }

    pub const fn audio(&self) -> &AudioBufferRing<A> {
        &self.audio
    }

    pub fn audio_sink_mut(&mut self) -> &mut A {
        self.audio.sink_mut()
    }

    pub const fn presentation(&self) -> &P {
        &self.presentation
    }

    pub fn presentation_mut(&mut self) -> &mut P {
        &mut self.presentation
    }

    pub const fn input(&self) -> &InputTranslator {
        &self.input
    }

    pub const fn stats(&self) -> &FrameStats {
        self.scheduler.stats()
    }

    /// Token for the current scheduler loop. Cancelled on fault and replaced on reset.
    pub fn token(&self) -> CancellationToken {
        self.scheduler.token()
    }

    pub fn set_frame_duration(&mut self, frame_duration: Duration) {
        self.scheduler.set_frame_duration(frame_duration);
    }
}
