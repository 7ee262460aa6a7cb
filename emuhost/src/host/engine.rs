//! A small demonstration engine.
//!
//! [`ToneEngine`] accepts iNES cartridge images but doesn't execute them. Each frame it draws a
//! test pattern and synthesizes a square wave whose pitch follows the pressed buttons, emitting
//! audio in fixed-size blocks the way a real console APU would.

use emuhost_core::{
    engine::{Engine, EngineError, FrameOutput},
    input::Button,
};
use tracing::{debug, info};

/// Parsed iNES header.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[must_use]
pub struct Cartridge {
    pub prg_rom_banks: u8,
    pub chr_rom_banks: u8,
    pub mapper: u8,
    pub has_trainer: bool,
}

impl Cartridge {
    pub const MAGIC: &'static [u8; 4] = b"NES\x1a";
    pub const HEADER_SIZE: usize = 16;
    pub const PRG_ROM_BANK_SIZE: usize = 16 * 1024;
    pub const CHR_ROM_BANK_SIZE: usize = 8 * 1024;
    pub const TRAINER_SIZE: usize = 512;

    /// # Errors
    ///
    /// Returns an error if the header is malformed or the image is truncated.
    pub fn parse(rom: &[u8]) -> Result<Self, EngineError> {
        let header = rom
            .get(..Self::HEADER_SIZE)
            .ok_or_else(|| EngineError::InvalidCartridge("truncated iNES header".into()))?;
        if &header[..4] != Self::MAGIC {
            return Err(EngineError::InvalidCartridge(
                "iNES header signature not found".into(),
            ));
        }
        let cart = Self {
            prg_rom_banks: header[4],
            chr_rom_banks: header[5],
            mapper: (header[7] & 0xF0) | (header[6] >> 4),
            has_trainer: header[6] & 0x04 == 0x04,
        };
        if cart.prg_rom_banks == 0 {
            return Err(EngineError::InvalidCartridge("no PRG-ROM banks".into()));
        }
        let expected = cart.image_size();
        if rom.len() < expected {
            return Err(EngineError::InvalidCartridge(format!(
                "expected {expected} bytes, found {}",
                rom.len()
            )));
        }
        Ok(cart)
    }

    /// Size of header, trainer and ROM banks.
    #[must_use]
    pub const fn image_size(&self) -> usize {
        Self::HEADER_SIZE
            + if self.has_trainer {
                Self::TRAINER_SIZE
            } else {
                0
            }
            + self.prg_rom_banks as usize * Self::PRG_ROM_BANK_SIZE
            + self.chr_rom_banks as usize * Self::CHR_ROM_BANK_SIZE
    }

    /// A minimal NROM image with one PRG and one CHR bank.
    #[must_use]
    pub fn test_image() -> Vec<u8> {
        let size = Self::HEADER_SIZE + Self::PRG_ROM_BANK_SIZE + Self::CHR_ROM_BANK_SIZE;
        let mut rom = vec![0x00; size];
        rom[..4].copy_from_slice(Self::MAGIC);
        rom[4] = 1;
        rom[5] = 1;
        rom
    }
}

#[derive(Debug, Clone, PartialEq)]
#[must_use]
pub struct ToneSnapshot {
    frame: u64,
    phase: f32,
    pressed: u8,
    pending: Vec<f32>,
}

#[derive(Debug)]
#[must_use]
pub struct ToneEngine {
    cart: Option<Cartridge>,
    frame: u64,
    phase: f32,
    pressed: u8,
    pending: Vec<f32>,
    picture: Vec<u8>,
    sample_rate: u32,
    block_size: usize,
    fault_frame: Option<u64>,
}

impl ToneEngine {
    pub const WIDTH: u32 = 256;
    pub const HEIGHT: u32 = 240;
    pub const FRAME_RATE: u32 = 60;
    const BASE_FREQUENCY: f32 = 220.0;
    const IDLE_VOLUME: f32 = 0.02;
    const VOLUME: f32 = 0.15;

    pub fn new(sample_rate: u32, block_size: usize) -> Self {
        Self {
            cart: None,
            frame: 0,
            phase: 0.0,
            pressed: 0,
            pending: Vec::with_capacity(block_size * 2),
            picture: vec![0x00; (Self::WIDTH * Self::HEIGHT * 4) as usize],
            sample_rate,
            block_size,
            fault_frame: None,
        }
    }

    /// Fail with an invalid opcode when reaching `frame`.
    pub fn with_fault_at(mut self, frame: Option<u64>) -> Self {
        self.fault_frame = frame;
        self
    }

    #[must_use]
    pub const fn frame(&self) -> u64 {
        self.frame
    }

    #[must_use]
    pub const fn cartridge(&self) -> Option<&Cartridge> {
        self.cart.as_ref()
    }

    #[must_use]
    pub fn is_pressed(&self, button: Button) -> bool {
        self.pressed & Self::mask(button) != 0
    }

    /// Samples generated per frame.
    #[must_use]
    pub const fn samples_per_frame(&self) -> usize {
        (self.sample_rate / Self::FRAME_RATE) as usize
    }

    fn mask(button: Button) -> u8 {
        Button::as_slice()
            .iter()
            .position(|b| *b == button)
            .map_or(0, |index| 1 << index)
    }

    /// Each pressed button raises the pitch by its own interval.
    fn frequency(&self) -> f32 {
        let semitones = (0..8)
            .filter(|bit| self.pressed & (1 << bit) != 0)
            .map(|bit| (bit + 1) * 2)
            .sum::<u32>();
        Self::BASE_FREQUENCY * 2f32.powf(semitones as f32 / 12.0)
    }

    fn synthesize(&mut self) {
        let step = self.frequency() / self.sample_rate as f32;
        let volume = if self.pressed == 0 {
            Self::IDLE_VOLUME
        } else {
            Self::VOLUME
        };
        for _ in 0..self.samples_per_frame() {
            let sample = if self.phase < 0.5 { volume } else { -volume };
            self.pending.push(sample);
            self.phase = (self.phase + step).fract();
        }
    }

    fn draw(&mut self) {
        let scroll = self.frame as u32;
        let width = Self::WIDTH as usize;
        for (i, pixel) in self.picture.chunks_exact_mut(4).enumerate() {
            let x = (i % width) as u32;
            let y = (i / width) as u32;
            let band = ((y / 30) as usize) % Button::as_slice().len();
            let lit = self.pressed & (1 << band) != 0;
            pixel[0] = x.wrapping_add(scroll) as u8;
            pixel[1] = y.wrapping_add(scroll / 2) as u8;
            pixel[2] = if lit { 0xFF } else { 0x40 };
            pixel[3] = 0xFF;
        }
    }
}

impl Engine for ToneEngine {
    type Snapshot = ToneSnapshot;

    fn advance_frame(&mut self, output: &mut dyn FrameOutput) -> Result<(), EngineError> {
        if self.cart.is_none() {
            return Err(EngineError::MissingCartridge);
        }
        if self.fault_frame == Some(self.frame) {
            return Err(EngineError::InvalidOpcode {
                addr: 0x8000 | (self.frame & 0x7FFF) as u16,
                opcode: 0x02,
            });
        }

        self.synthesize();
        let blocks = self.pending.len() / self.block_size;
        for block in self.pending.chunks_exact(self.block_size) {
            output.audio(block);
        }
        self.pending.drain(..blocks * self.block_size);

        self.draw();
        output.picture(&self.picture);

        self.frame += 1;
        Ok(())
    }

    fn reset(&mut self) {
        debug!("tone engine reset");
        self.frame = 0;
        self.phase = 0.0;
        self.pressed = 0;
        self.pending.clear();
    }

    fn insert_cartridge(&mut self, rom: &[u8]) -> Result<(), EngineError> {
        let cart = Cartridge::parse(rom)?;
        info!(
            "loaded cartridge: mapper {}, {} PRG-ROM, {} CHR-ROM",
            cart.mapper, cart.prg_rom_banks, cart.chr_rom_banks
        );
        self.cart = Some(cart);
        Ok(())
    }

    fn key_down(&mut self, button: Button) {
        self.pressed |= Self::mask(button);
    }

    fn key_up(&mut self, button: Button) {
        self.pressed &= !Self::mask(button);
    }

    fn capture_snapshot(&self) -> ToneSnapshot {
        ToneSnapshot {
            frame: self.frame,
            phase: self.phase,
            pressed: self.pressed,
            pending: self.pending.clone(),
        }
    }

    fn restore_snapshot(&mut self, snapshot: &ToneSnapshot) {
        self.frame = snapshot.frame;
        self.phase = snapshot.phase;
        self.pressed = snapshot.pressed;
        self.pending.clone_from(&snapshot.pending);
    }
}
