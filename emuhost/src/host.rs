//! Host runtime: everything around the session that touches the outside world.

pub mod audio;
pub mod config;
pub mod emulation;
pub mod engine;
pub mod input;
pub mod timer;
pub mod video;
