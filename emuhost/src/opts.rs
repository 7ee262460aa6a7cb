use crate::host::{
    config::{AudioBackend, Config},
    input::KeyPress,
};
use clap::Parser;
use std::path::PathBuf;

/// `emuhost` CLI Config Options
#[derive(Parser, Debug)]
#[command(version, author, about, long_about = None)]
#[must_use]
pub struct Opts {
    /// The iNES ROM to load. [default: built-in test cartridge]
    pub path: Option<PathBuf>,
    /// Stop after advancing this many frames. [default: run until interrupted]
    #[arg(short = 'n', long)]
    pub frames: Option<u64>,
    /// Script a key press as FRAME:KEY[:HOLD], e.g. `30:KeyG` or `120:KeyZ:10`.
    #[arg(short, long = "press")]
    pub press: Vec<KeyPress>,
    /// Audio output backend. [default: headless]
    #[arg(short, long, value_enum)]
    pub audio: Option<AudioBackend>,
    /// Presentation refresh rate in Hz. [default: 60.0]
    #[arg(short, long)]
    pub refresh_rate: Option<f32>,
    /// Save the last presented frame as PNG on exit.
    #[arg(short, long)]
    pub screenshot: Option<PathBuf>,
    /// Make the engine fail with an invalid opcode at the given frame.
    #[arg(long)]
    pub fault_at: Option<u64>,
    /// Reset and keep running after an engine fault instead of exiting.
    #[arg(long)]
    pub reset_on_fault: bool,
    /// Custom Config path.
    #[arg(short, long)]
    pub config: Option<PathBuf>,
    /// "Default Config" (skip user config)
    #[arg(long)]
    pub clean: bool,
    /// Save the resulting configuration as the new default.
    #[arg(long)]
    pub save_config: bool,
}

impl Opts {
    /// Loads a base `Config`, merging with CLI options
    ///
    /// # Errors
    ///
    /// Returns an error if the merged configuration is invalid.
    pub fn load(self) -> anyhow::Result<Config> {
        let base = if self.clean {
            Config::default()
        } else {
            Config::load(self.config)
        };
        let config = Config {
            rom_path: self.path.or(base.rom_path),
            run_frames: self.frames.or(base.run_frames),
            audio_backend: self.audio.unwrap_or(base.audio_backend),
            refresh_rate: self.refresh_rate.unwrap_or(base.refresh_rate),
            screenshot_path: self.screenshot.or(base.screenshot_path),
            script: self.press,
            fault_frame: self.fault_at,
            reset_on_fault: self.reset_on_fault,
            ..base
        };
        config.validate()?;
        Ok(config)
    }
}
