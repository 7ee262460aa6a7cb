use crate::host::{
    config::Config,
    engine::{Cartridge, ToneEngine},
    input::{KeyEvent, ScriptedInput},
    timer::RefreshTimer,
    video::FrameRecorder,
};
use anyhow::Context;
use emuhost_core::{
    audio::AudioSink,
    engine::EngineError,
    error::Error as SessionError,
    scheduler::{FrameStats, Schedule},
    session::EmulationSession,
    time::{Duration, Instant},
};
use std::path::PathBuf;
use tracing::{debug, error, info, warn};

/// What a finished run did.
#[derive(Debug, Clone, PartialEq)]
#[must_use]
pub struct Summary {
    pub stats: FrameStats,
    pub presented: u64,
    pub audio_overruns: u64,
    pub faults: u32,
}

impl std::fmt::Display for Summary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "advanced {} frames ({} catch-up), presented {}, deferred {} ticks, {} audio overruns, {} faults",
            self.stats.frames,
            self.stats.catch_up_frames,
            self.presented,
            self.stats.deferred_ticks,
            self.audio_overruns,
            self.faults
        )
    }
}

/// Drives a session from the refresh timer until the frame limit is reached or the session
/// faults.
#[must_use]
pub struct Host<A: AudioSink> {
    session: EmulationSession<ToneEngine, A, FrameRecorder>,
    timer: RefreshTimer,
    script: ScriptedInput,
    run_frames: Option<u64>,
    reset_on_fault: bool,
    screenshot_path: Option<PathBuf>,
    faults: u32,
    last_report: Instant,
}

impl<A: AudioSink> std::fmt::Debug for Host<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Host")
            .field("session", &self.session)
            .field("timer", &self.timer)
            .field("run_frames", &self.run_frames)
            .field("faults", &self.faults)
            .finish_non_exhaustive()
    }
}

impl<A: AudioSink> Host<A> {
    const REPORT_INTERVAL: Duration = Duration::from_secs(1);

    /// Create a session on `audio` and insert the configured cartridge.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the ROM can't be loaded.
    pub fn new(config: &Config, audio: A) -> anyhow::Result<Self> {
        config.validate()?;
        let engine = ToneEngine::new(config.session.sample_rate, config.session.slot_frames)
            .with_fault_at(config.fault_frame);
        let presentation = FrameRecorder::new(ToneEngine::WIDTH, ToneEngine::HEIGHT);
        let mut session = EmulationSession::new(engine, audio, presentation, &config.session)?;

        let rom = match &config.rom_path {
            Some(path) => {
                info!("Loading ROM: {path:?}");
                std::fs::read(path).with_context(|| format!("failed to read ROM {path:?}"))?
            }
            None => {
                info!("No ROM given, using the built-in test cartridge");
                Cartridge::test_image()
            }
        };
        let now = Instant::now();
        let timer = RefreshTimer::new(config.refresh_rate, now)?;
        session.insert_cartridge(&rom, now)?;

        Ok(Self {
            session,
            timer,
            script: ScriptedInput::new(config.script.iter().cloned()),
            run_frames: config.run_frames,
            reset_on_fault: config.reset_on_fault,
            screenshot_path: config.screenshot_path.clone(),
            faults: 0,
            last_report: now,
        })
    }

    pub const fn session(&self) -> &EmulationSession<ToneEngine, A, FrameRecorder> {
        &self.session
    }

    /// Run until the frame limit is reached, the session stops, or an unrecovered fault.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine faults and `reset_on_fault` is disabled, or the
    /// screenshot can't be saved.
    pub fn run(&mut self) -> anyhow::Result<Summary> {
        let mut schedule = Schedule::NextRefresh;
        loop {
            if self
                .run_frames
                .is_some_and(|limit| self.session.stats().frames >= limit)
            {
                debug!("frame limit reached");
                break;
            }

            let now = self.timer.wait(schedule);
            self.apply_script(now);

            match self.session.tick(now) {
                Ok(tick) => match tick.schedule() {
                    Some(next) => schedule = next,
                    None => {
                        debug!("session loop cancelled");
                        break;
                    }
                },
                Err(SessionError::Engine(err)) => {
                    self.on_fault(err, now)?;
                    schedule = Schedule::NextRefresh;
                }
                Err(err) => return Err(err.into()),
            }

            self.report(now);
        }

        if let Some(path) = &self.screenshot_path {
            self.session.presentation().save_png(path)?;
        }
        Ok(self.summary())
    }

    fn apply_script(&mut self, now: Instant) {
        let frame = self.session.stats().frames;
        for event in self.script.due(frame) {
            match event {
                KeyEvent::Down(key) => self.session.key_down(key, now),
                KeyEvent::Up(key) => self.session.key_up(key),
            }
        }
    }

    fn on_fault(&mut self, err: EngineError, now: Instant) -> anyhow::Result<()> {
        self.faults += 1;
        let message = EmulationSession::<ToneEngine, A, FrameRecorder>::FAULT_MESSAGE;
        if self.reset_on_fault {
            warn!("{message} Resetting ({err})");
            self.session.reset(now);
            Ok(())
        } else {
            error!("{message}");
            Err(anyhow::Error::new(err).context(message))
        }
    }

    fn report(&mut self, now: Instant) {
        if now.saturating_duration_since(self.last_report) < Self::REPORT_INTERVAL {
            return;
        }
        self.last_report = now;
        let stats = self.session.stats();
        info!(
            "fps: {:.1}, frames: {}, catch-up: {}, deferred: {}, paused: {}, audio overruns: {}",
            stats.fps,
            stats.frames,
            stats.catch_up_frames,
            stats.deferred_ticks,
            stats.paused_ticks,
            self.session.audio().overruns()
        );
    }

    pub fn summary(&self) -> Summary {
        Summary {
            stats: *self.session.stats(),
            presented: self.session.presentation().presented(),
            audio_overruns: self.session.audio().overruns(),
            faults: self.faults,
        }
    }
}
