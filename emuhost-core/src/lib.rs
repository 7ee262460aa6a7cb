//! Host runtime core for driving an emulation engine in real time.
//!
//! An [`EmulationSession`](session::EmulationSession) owns an [`Engine`](engine::Engine) and
//! advances it one frame at a time from a periodic presentation timer, while keeping a small
//! rotation of audio output slots fed without gaps or overlaps.

pub mod audio;
pub mod engine;
pub mod error;
pub mod input;
pub mod scheduler;
pub mod session;
pub mod snapshot;
pub mod time;

pub mod prelude {
    //! The prelude re-exports the common types needed to host an engine.

    pub use crate::{
        audio::{AudioBufferRing, AudioSink, AudioSlot, SlotCompletion, Submission},
        engine::{Engine, EngineError, FrameOutput, PresentationSink},
        error::{Error, Result},
        input::{Button, InputTranslator, KeyBinding, Shortcut},
        scheduler::{CancellationToken, FrameScheduler, FrameStats, Schedule, Tick},
        session::{Config, EmulationSession, SessionState},
        snapshot::SnapshotStore,
    };
}
