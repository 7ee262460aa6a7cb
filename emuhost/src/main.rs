//! Runs an iNES ROM (or the built-in test cartridge) on the demonstration engine.
//!
//! USAGE:
//!     emuhost [OPTIONS] [PATH]
//!
//! OPTIONS:
//!     -n, --frames <FRAMES>      Stop after advancing this many frames
//!     -p, --press <PRESS>        Script a key press: FRAME:KEY[:HOLD]
//!     -a, --audio <AUDIO>        Audio output backend [headless, device]
//!     -s, --screenshot <PATH>    Save the last presented frame as PNG
//!
//! ARGS:
//!     <PATH>    The iNES ROM to load. [default: built-in test cartridge]

use clap::Parser;
use emuhost::{
    error::Result,
    host::{audio, emulation::Host},
    logging,
    opts::Opts,
};
use tracing::{debug, info};

fn main() -> Result<()> {
    let _log = logging::init();

    let opts = Opts::parse();
    debug!("CLI Options: {opts:?}");
    let save_config = opts.save_config;
    let mut config = opts.load()?;
    if save_config {
        config.save()?;
    }

    let sink = audio::open(config.audio_backend, &mut config.session)?;
    let mut host = Host::new(&config, sink)?;
    let summary = host.run()?;
    info!("{summary}");

    Ok(())
}
