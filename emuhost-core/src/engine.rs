//! The boundary between the host runtime and an emulation engine.

use crate::input::Button;
use thiserror::Error;

/// Errors an engine reports when it can no longer make progress.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[must_use]
pub enum EngineError {
    #[error("no cartridge inserted")]
    MissingCartridge,
    #[error("invalid cartridge: {0}")]
    InvalidCartridge(String),
    #[error("invalid opcode at {addr:#06X}: {opcode:#04X}")]
    InvalidOpcode { addr: u16, opcode: u8 },
    #[error("{0}")]
    Custom(String),
}

impl EngineError {
    pub fn custom(error: impl Into<String>) -> Self {
        Self::Custom(error.into())
    }
}

/// Side channels an engine writes to while advancing a frame.
pub trait FrameOutput {
    /// Queue one fixed-size block of mono audio samples.
    fn audio(&mut self, samples: &[f32]);
    /// Present the completed picture for this frame.
    fn picture(&mut self, frame: &[u8]);
}

/// Accepts one picture buffer per advanced frame.
pub trait PresentationSink {
    fn present(&mut self, frame: &[u8]);
}

impl<P: PresentationSink + ?Sized> PresentationSink for &mut P {
    fn present(&mut self, frame: &[u8]) {
        (**self).present(frame);
    }
}

impl<P: PresentationSink + ?Sized> PresentationSink for Box<P> {
    fn present(&mut self, frame: &[u8]) {
        (**self).present(frame);
    }
}

/// An external emulation engine. The host never assumes it is reentrant: every call is made
/// from the session that exclusively owns it, one at a time.
pub trait Engine {
    /// Opaque, engine-defined captured state.
    type Snapshot;

    /// Execute exactly one video frame, emitting zero or more audio blocks and one picture.
    ///
    /// # Errors
    ///
    /// Fails only on an unrecoverable internal engine error.
    fn advance_frame(&mut self, output: &mut dyn FrameOutput) -> Result<(), EngineError>;

    /// Restore the power-on state for the currently loaded cartridge.
    fn reset(&mut self);

    /// Load a cartridge image.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine does not accept the image.
    fn insert_cartridge(&mut self, rom: &[u8]) -> Result<(), EngineError>;

    fn key_down(&mut self, button: Button);

    fn key_up(&mut self, button: Button);

    fn capture_snapshot(&self) -> Self::Snapshot;

    fn restore_snapshot(&mut self, snapshot: &Self::Snapshot);
}
