use crate::host::input::KeyPress;
use anyhow::Context;
use emuhost_core::session::Config as SessionConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{error, info};

/// Where emitted audio slots are played.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[must_use]
pub enum AudioBackend {
    /// Discard samples, following a wall-clock playback timeline.
    #[default]
    Headless,
    /// Play through the default output device.
    Device,
}

impl AudioBackend {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Headless => "headless",
            Self::Device => "device",
        }
    }
}

impl AsRef<str> for AudioBackend {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

/// Host configuration settings.
///
/// # Config JSON
///
/// Configuration is stored (by default) in `~/.config/emuhost/config.json`. Fields missing from
/// the file keep their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[must_use]
#[serde(default)] // Ensures new fields don't break existing configurations
pub struct Config {
    pub session: SessionConfig,
    /// Presentation refresh rate in Hz.
    pub refresh_rate: f32,
    pub audio_backend: AudioBackend,
    /// ROM to load. The built-in test cartridge is used when unset.
    pub rom_path: Option<PathBuf>,
    /// Stop after this many advanced frames.
    pub run_frames: Option<u64>,
    /// Save the last presented frame here on exit.
    pub screenshot_path: Option<PathBuf>,
    #[serde(skip)]
    pub script: Vec<KeyPress>,
    #[serde(skip)]
    pub fault_frame: Option<u64>,
    #[serde(skip)]
    pub reset_on_fault: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            session: SessionConfig::default(),
            refresh_rate: 60.0,
            audio_backend: AudioBackend::default(),
            rom_path: None,
            run_frames: None,
            screenshot_path: None,
            script: Vec::new(),
            fault_frame: None,
            reset_on_fault: false,
        }
    }
}

impl Config {
    pub const BASE_DIR: &'static str = "emuhost";
    pub const FILENAME: &'static str = "config.json";
    pub const MIN_REFRESH_RATE: f32 = 1.0;
    pub const MAX_REFRESH_RATE: f32 = 1000.0;

    #[must_use]
    pub fn default_config_dir() -> PathBuf {
        dirs::config_local_dir().map_or_else(
            || PathBuf::from("config"),
            |dir| dir.join(Self::BASE_DIR),
        )
    }

    #[must_use]
    pub fn default_data_dir() -> PathBuf {
        dirs::data_local_dir().map_or_else(
            || PathBuf::from("data"),
            |dir| dir.join(Self::BASE_DIR),
        )
    }

    #[must_use]
    pub fn config_path() -> PathBuf {
        Self::default_config_dir().join(Self::FILENAME)
    }

    /// # Errors
    ///
    /// Returns an error if the session settings or refresh rate are unusable.
    pub fn validate(&self) -> anyhow::Result<()> {
        self.session.validate()?;
        if !(Self::MIN_REFRESH_RATE..=Self::MAX_REFRESH_RATE).contains(&self.refresh_rate) {
            anyhow::bail!(
                "invalid refresh rate: {} (expected {}-{} Hz)",
                self.refresh_rate,
                Self::MIN_REFRESH_RATE,
                Self::MAX_REFRESH_RATE
            );
        }
        Ok(())
    }

    /// Save to the default config path.
    ///
    /// # Errors
    ///
    /// Returns an error if the config can't be serialized or written.
    pub fn save(&self) -> anyhow::Result<()> {
        self.save_to(Self::config_path())
    }

    /// # Errors
    ///
    /// Returns an error if the config can't be serialized or written.
    pub fn save_to(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let path = path.as_ref();
        let data = serde_json::to_vec_pretty(&self).context("failed to serialize config")?;
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("failed to create directory {dir:?}"))?;
        }
        std::fs::write(path, data).with_context(|| format!("failed to save config {path:?}"))?;
        info!("Saved configuration to {path:?}");
        Ok(())
    }

    /// Load from `path`, or the default config path. Missing or invalid files fall back to
    /// defaults.
    pub fn load(path: Option<PathBuf>) -> Self {
        let path = path.unwrap_or_else(Self::config_path);
        if !path.exists() {
            info!("Loading default configuration");
            return Self::default();
        }

        info!("Loading saved configuration");
        std::fs::read(&path)
            .context("failed to load config")
            .and_then(|data| Ok(serde_json::from_slice::<Self>(&data)?))
            .with_context(|| format!("failed to parse {path:?}"))
            .and_then(|config| {
                config.validate()?;
                Ok(config)
            })
            .unwrap_or_else(|err| {
                error!("Invalid config: {path:?}, reverting to defaults. Error: {err:?}");
                Self::default()
            })
    }
}
