use anyhow::{anyhow, Context};
use emuhost_core::engine::PresentationSink;
use std::path::Path;
use tracing::{info, warn};

/// Keeps the most recently presented RGBA frame.
#[derive(Debug)]
#[must_use]
pub struct FrameRecorder {
    width: u32,
    height: u32,
    frame: Vec<u8>,
    presented: u64,
}

impl FrameRecorder {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            frame: vec![0x00; (width * height * 4) as usize],
            presented: 0,
        }
    }

    #[must_use]
    pub fn frame(&self) -> &[u8] {
        &self.frame
    }

    /// Number of frames presented so far.
    #[must_use]
    pub const fn presented(&self) -> u64 {
        self.presented
    }

    /// Save the last presented frame as a PNG image.
    ///
    /// # Errors
    ///
    /// Returns an error if the image can't be encoded or written.
    pub fn save_png(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let path = path.as_ref();
        let image = image::ImageBuffer::<image::Rgba<u8>, &[u8]>::from_raw(
            self.width,
            self.height,
            self.frame.as_slice(),
        )
        .ok_or_else(|| anyhow!("failed to create image buffer"))?;
        image
            .save(path)
            .with_context(|| format!("failed to save screenshot {path:?}"))?;
        info!("Saved screenshot to {path:?}");
        Ok(())
    }
}

impl PresentationSink for FrameRecorder {
    fn present(&mut self, frame: &[u8]) {
        if frame.len() != self.frame.len() {
            warn!(
                "unexpected frame size: {} (expected {})",
                frame.len(),
                self.frame.len()
            );
            return;
        }
        self.frame.copy_from_slice(frame);
        self.presented += 1;
    }
}
