//! A headless, real-time host for an emulation engine.
//!
//! The host paces an [`EmulationSession`](emuhost_core::session::EmulationSession) from a
//! presentation timer, feeds its audio slots to an output sink and keeps the latest picture.

pub mod error;
pub mod host;
pub mod logging;
pub mod opts;
