use emuhost_core::{
    prelude::*,
    time::{Duration, Instant},
};

const FRAME: Duration = FrameScheduler::DEFAULT_FRAME_DURATION;
const BLOCK: usize = 4096;
const ROM: &[u8] = b"NES\x1a\x01\x01\x00\x00";

#[derive(Debug, Clone, PartialEq)]
struct MockSnapshot {
    frame: u64,
    pressed: Vec<Button>,
}

#[derive(Debug, Default)]
struct MockEngine {
    frame: u64,
    pressed: Vec<Button>,
    cartridge: bool,
    resets: u32,
    fail_at: Option<u64>,
}

impl Engine for MockEngine {
    type Snapshot = MockSnapshot;

    fn advance_frame(
        &mut self,
        output: &mut dyn FrameOutput,
    ) -> std::result::Result<(), EngineError> {
        if !self.cartridge {
            return Err(EngineError::MissingCartridge);
        }
        if self.fail_at == Some(self.frame) {
            return Err(EngineError::InvalidOpcode {
                addr: 0xC000,
                opcode: 0x02,
            });
        }
        self.frame += 1;
        output.audio(&[0.25; BLOCK]);
        output.picture(&self.frame.to_le_bytes());
        Ok(())
    }

    fn reset(&mut self) {
        self.frame = 0;
        self.pressed.clear();
        self.resets += 1;
    }

    fn insert_cartridge(&mut self, rom: &[u8]) -> std::result::Result<(), EngineError> {
        if rom.starts_with(b"NES\x1a") {
            self.cartridge = true;
            Ok(())
        } else {
            Err(EngineError::InvalidCartridge("missing iNES header".into()))
        }
    }

    fn key_down(&mut self, button: Button) {
        if !self.pressed.contains(&button) {
            self.pressed.push(button);
        }
    }

    fn key_up(&mut self, button: Button) {
        self.pressed.retain(|pressed| *pressed != button);
    }

    fn capture_snapshot(&self) -> MockSnapshot {
        MockSnapshot {
            frame: self.frame,
            pressed: self.pressed.clone(),
        }
    }

    fn restore_snapshot(&mut self, snapshot: &MockSnapshot) {
        self.frame = snapshot.frame;
        self.pressed = snapshot.pressed.clone();
    }
}

/// Sink whose clock only moves when a test moves it.
#[derive(Debug)]
struct ManualSink {
    now: Duration,
    played: Vec<(usize, Duration, SlotCompletion)>,
}

impl Default for ManualSink {
    fn default() -> Self {
        Self {
            now: Duration::from_secs(1),
            played: Vec::new(),
        }
    }
}

impl ManualSink {
    fn complete(&mut self, slot: usize) {
        let latest = self.played.iter().rev().find(|(index, _, _)| *index == slot);
        if let Some((_, _, completion)) = latest {
            completion.complete();
        }
    }

    fn starts(&self) -> Vec<Duration> {
        self.played.iter().map(|(_, start, _)| *start).collect()
    }
}

impl AudioSink for ManualSink {
    fn current_time(&self) -> Duration {
        self.now
    }

    fn play(&mut self, slot: &AudioSlot, start: Duration) {
        self.played.push((slot.index(), start, slot.completion()));
    }
}

#[derive(Debug, Default)]
struct RecordingPresentation {
    frames: Vec<Vec<u8>>,
}

impl PresentationSink for RecordingPresentation {
    fn present(&mut self, frame: &[u8]) {
        self.frames.push(frame.to_vec());
    }
}

type Session = EmulationSession<MockEngine, ManualSink, RecordingPresentation>;

fn session_with(engine: MockEngine) -> Session {
    EmulationSession::new(
        engine,
        ManualSink::default(),
        RecordingPresentation::default(),
        &Config::default(),
    )
    .expect("valid session")
}

fn running_session(now: Instant) -> Session {
    let mut session = session_with(MockEngine::default());
    session.insert_cartridge(ROM, now).expect("cartridge accepted");
    session
}

fn slot_duration() -> Duration {
    Duration::from_secs_f64(BLOCK as f64 / 44_100.0)
}

#[test]
fn idle_session_never_advances() -> anyhow::Result<()> {
    let start = Instant::now();
    let mut session = session_with(MockEngine::default());
    assert_eq!(session.state(), SessionState::Idle);
    for i in 1..=5 {
        assert_eq!(session.tick(start + FRAME * i)?, Tick::Cancelled);
    }
    assert_eq!(session.engine().frame, 0);
    assert!(session.presentation().frames.is_empty());

    session.reset(start);
    assert_eq!(session.state(), SessionState::Idle);
    assert_eq!(session.engine().resets, 0);
    Ok(())
}

#[test]
fn insert_cartridge_starts_running() -> anyhow::Result<()> {
    let start = Instant::now();
    let mut session = running_session(start);
    assert_eq!(session.state(), SessionState::Running);
    assert!(session.cartridge_loaded());
    assert_eq!(session.engine().resets, 1);

    assert_eq!(session.tick(start + FRAME)?, Tick::Advance { catch_up: false });
    assert_eq!(session.engine().frame, 1);
    assert_eq!(session.presentation().frames, vec![1u64.to_le_bytes().to_vec()]);
    assert_eq!(session.audio().sink().played.len(), 1);
    assert_eq!(session.stats().frames, 1);
    Ok(())
}

#[test]
fn rejected_cartridge_keeps_state() {
    let start = Instant::now();
    let mut session = session_with(MockEngine::default());
    let err = session
        .insert_cartridge(b"not a rom", start)
        .expect_err("invalid cartridge");
    assert!(matches!(err, Error::Cartridge(EngineError::InvalidCartridge(_))));
    assert!(!err.is_fault());
    assert_eq!(session.state(), SessionState::Idle);
    assert!(!session.cartridge_loaded());
}

#[test]
fn three_slots_schedule_back_to_back() -> anyhow::Result<()> {
    let start = Instant::now();
    let mut session = running_session(start);
    let lead = Duration::from_millis(50);
    let first = Duration::from_secs(1) + lead;
    let slot = slot_duration();

    for i in 1..=3 {
        assert!(matches!(
            session.tick(start + FRAME * i)?,
            Tick::Advance { .. }
        ));
    }
    assert_eq!(
        session.audio().sink().starts(),
        vec![first, first + slot, first + slot + slot]
    );

    // Fourth block has nowhere to go until slot 0 finishes
    assert_eq!(session.tick(start + FRAME * 4)?, Tick::Deferred);
    assert_eq!(session.engine().frame, 3);
    assert!(session.audio().is_saturated());

    session.audio_sink_mut().now = first + slot;
    session.audio_sink_mut().complete(0);
    assert!(!session.audio().is_saturated());

    assert!(matches!(
        session.tick(start + FRAME * 5)?,
        Tick::Advance { .. }
    ));
    let starts = session.audio().sink().starts();
    assert_eq!(starts.len(), 4);
    assert_eq!(starts[3], first + slot + slot + slot);
    assert_eq!(session.audio().overruns(), 0);
    Ok(())
}

#[test]
fn saturation_defers_advance() -> anyhow::Result<()> {
    let start = Instant::now();
    let mut session = running_session(start);
    for i in 1..=3 {
        let _ = session.tick(start + FRAME * i)?;
    }
    let frames = session.engine().frame;

    let mut now = start + FRAME * 3;
    let end = now + Duration::from_millis(200);
    while now < end {
        now += Duration::from_millis(4);
        assert_eq!(session.tick(now)?, Tick::Deferred);
    }
    assert_eq!(session.engine().frame, frames);
    assert_eq!(session.presentation().frames.len() as u64, frames);
    assert!(session.stats().deferred_ticks >= 50);
    Ok(())
}

#[test]
fn lagging_audio_advances_before_interval() -> anyhow::Result<()> {
    let start = Instant::now();
    let mut session = running_session(start);
    // Nothing buffered yet, so the first tick catches up immediately
    assert_eq!(
        session.tick(start + Duration::from_millis(1))?,
        Tick::Advance { catch_up: true }
    );
    // One slot queued ahead of the sink clock: back to nominal pacing
    assert!(matches!(
        session.tick(start + Duration::from_millis(2))?,
        Tick::Waiting(_)
    ));
    assert_eq!(session.engine().frame, 1);
    Ok(())
}

#[test]
fn fault_stops_loop_until_reset() -> anyhow::Result<()> {
    let start = Instant::now();
    let mut session = session_with(MockEngine {
        fail_at: Some(2),
        ..Default::default()
    });
    session.insert_cartridge(ROM, start)?;
    let token = session.token();

    let _ = session.tick(start + FRAME)?;
    let _ = session.tick(start + FRAME * 2)?;
    let err = session
        .tick(start + FRAME * 3)
        .expect_err("engine fault propagates");
    assert!(err.is_fault());
    assert_eq!(
        err,
        Error::Engine(EngineError::InvalidOpcode {
            addr: 0xC000,
            opcode: 0x02
        })
    );
    assert_eq!(session.state(), SessionState::Faulted);
    assert!(session.is_paused());
    assert!(session.fault().is_some());
    assert!(token.is_cancelled());

    assert_eq!(session.tick(start + FRAME * 4)?, Tick::Cancelled);
    assert_eq!(session.engine().frame, 2);

    // Input, pause and snapshots have no effect while faulted
    session.key_down("KeyZ", start + FRAME * 4);
    session.key_down("KeyP", start + FRAME * 4);
    assert!(!session.save_state());
    assert!(session.engine().pressed.is_empty());
    assert_eq!(session.state(), SessionState::Faulted);

    let now = start + FRAME * 5;
    session.key_down("F2", now);
    assert_eq!(session.state(), SessionState::Running);
    assert!(session.fault().is_none());
    assert!(!session.token().is_cancelled());
    assert_eq!(session.engine().frame, 0);
    assert!(matches!(session.tick(now + FRAME)?, Tick::Advance { .. }));
    assert_eq!(session.engine().frame, 1);
    Ok(())
}

#[test]
fn inserting_cartridge_recovers_from_fault() -> anyhow::Result<()> {
    let start = Instant::now();
    let mut session = session_with(MockEngine {
        fail_at: Some(0),
        ..Default::default()
    });
    session.insert_cartridge(ROM, start)?;
    assert!(session.tick(start + FRAME).is_err());
    assert_eq!(session.state(), SessionState::Faulted);

    session.insert_cartridge(ROM, start + FRAME * 2)?;
    assert_eq!(session.state(), SessionState::Running);
    assert!(session.fault().is_none());
    Ok(())
}

#[test]
fn pause_suppresses_advance() -> anyhow::Result<()> {
    let start = Instant::now();
    let mut session = running_session(start);

    session.key_down("KeyP", start);
    assert_eq!(session.state(), SessionState::Paused);
    assert_eq!(session.tick(start + FRAME)?, Tick::Paused);
    assert_eq!(session.tick(start + FRAME * 2)?, Tick::Paused);
    assert_eq!(session.engine().frame, 0);
    assert!(!session.token().is_cancelled());

    session.key_down("KeyP", start + FRAME * 2);
    assert_eq!(session.state(), SessionState::Running);
    assert!(matches!(
        session.tick(start + FRAME * 3)?,
        Tick::Advance { .. }
    ));
    assert_eq!(session.engine().frame, 1);

    session.pause(true);
    session.pause(true);
    assert_eq!(session.state(), SessionState::Paused);
    session.pause(false);
    assert_eq!(session.state(), SessionState::Running);
    Ok(())
}

#[test]
fn keys_translate_to_buttons() {
    let start = Instant::now();
    let mut session = running_session(start);

    session.key_down("KeyZ", start);
    session.key_down("ArrowLeft", start);
    session.key_down("KeyQ", start);
    assert_eq!(session.engine().pressed, vec![Button::A, Button::Left]);

    session.key_up("KeyZ");
    session.key_up("KeyQ");
    assert_eq!(session.engine().pressed, vec![Button::Left]);

    // Shortcut keys never reach the engine
    session.key_up("KeyP");
    assert_eq!(session.state(), SessionState::Running);
    assert_eq!(session.engine().pressed, vec![Button::Left]);
}

#[test]
fn custom_bindings() {
    let start = Instant::now();
    let config = Config {
        bindings: vec![KeyBinding::new("Space", Button::Start)],
        ..Default::default()
    };
    let mut session = EmulationSession::new(
        MockEngine::default(),
        ManualSink::default(),
        RecordingPresentation::default(),
        &config,
    )
    .expect("valid session");
    session.insert_cartridge(ROM, start).expect("cartridge");
    session.key_down("Space", start);
    session.key_down("KeyG", start);
    assert_eq!(session.engine().pressed, vec![Button::Start]);
}

#[test]
fn save_and_load_state() -> anyhow::Result<()> {
    let start = Instant::now();
    let mut session = running_session(start);

    assert!(!session.load_state(), "nothing saved yet");

    let _ = session.tick(start + FRAME)?;
    let _ = session.tick(start + FRAME * 2)?;
    session.key_down("KeyX", start + FRAME * 2);
    session.key_down("F5", start + FRAME * 2);
    assert!(session.has_snapshot());

    session.key_up("KeyX");
    let _ = session.tick(start + FRAME * 3)?;
    assert_eq!(session.engine().frame, 3);

    session.key_down("F8", start + FRAME * 3);
    assert_eq!(session.engine().frame, 2);
    assert_eq!(session.engine().pressed, vec![Button::B]);

    // Loading twice restores the same state
    assert!(session.load_state());
    assert_eq!(session.engine().frame, 2);

    session.reset(start + FRAME * 4);
    assert!(!session.has_snapshot());
    assert!(!session.load_state());
    assert_eq!(session.engine().frame, 0);
    Ok(())
}

#[test]
fn inserting_cartridge_discards_snapshot() -> anyhow::Result<()> {
    let start = Instant::now();
    let mut session = running_session(start);
    let _ = session.tick(start + FRAME)?;
    let _ = session.tick(start + FRAME * 2)?;
    session.key_down("F5", start + FRAME * 2);
    assert!(session.has_snapshot());

    // A rejected image leaves the session and its snapshot alone
    assert!(session.insert_cartridge(b"junk", start + FRAME * 2).is_err());
    assert!(session.has_snapshot());

    session.insert_cartridge(ROM, start + FRAME * 3)?;
    assert!(!session.has_snapshot());
    assert_eq!(session.engine().frame, 0);

    session.key_down("F8", start + FRAME * 3);
    assert!(!session.load_state());
    assert_eq!(session.engine().frame, 0);
    Ok(())
}

#[test]
fn invalid_config_is_rejected() {
    let config = Config {
        ring_size: 0,
        ..Default::default()
    };
    let err = EmulationSession::new(
        MockEngine::default(),
        ManualSink::default(),
        RecordingPresentation::default(),
        &config,
    )
    .expect_err("empty ring");
    assert_eq!(err, Error::invalid_config("ring_size", 0));
}

#[test]
fn oversized_durations_are_rejected() {
    let config = Config {
        target_frame_duration: Duration::from_secs(u64::MAX),
        ..Default::default()
    };
    assert!(matches!(
        config.validate(),
        Err(Error::InvalidConfig {
            field: "target_frame_duration",
            ..
        })
    ));

    let config = Config {
        start_lead: Config::MAX_START_LEAD + Duration::from_nanos(1),
        ..Default::default()
    };
    assert!(matches!(
        config.validate(),
        Err(Error::InvalidConfig {
            field: "start_lead",
            ..
        })
    ));

    let config = Config {
        target_frame_duration: Config::MAX_FRAME_DURATION,
        start_lead: Config::MAX_START_LEAD,
        ..Default::default()
    };
    assert!(config.validate().is_ok());
}

#[test]
fn partial_config_uses_defaults() -> anyhow::Result<()> {
    let config: Config = serde_json::from_str(r#"{ "ring_size": 4 }"#)?;
    assert_eq!(config.ring_size, 4);
    assert_eq!(config.slot_frames, Config::default().slot_frames);
    assert_eq!(config.bindings, KeyBinding::defaults());
    config.validate()?;
    Ok(())
}
