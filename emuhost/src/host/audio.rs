//! Audio output sinks.

use crate::host::config::AudioBackend;
use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use emuhost_core::{
    audio::{AudioSink, AudioSlot, SlotCompletion},
    session::Config as SessionConfig,
    time::{Duration, Instant},
};
use std::thread::JoinHandle;
use tracing::{debug, error, trace};

#[cfg(feature = "device-audio")]
pub use device::DeviceSink;

/// Open the sink for `backend`.
///
/// A device may not support `session.sample_rate`, in which case the session is switched to the
/// rate the device actually plays at.
///
/// # Errors
///
/// Returns an error if the playback thread or output device can't be started.
pub fn open(
    backend: AudioBackend,
    session: &mut SessionConfig,
) -> anyhow::Result<Box<dyn AudioSink>> {
    debug!("opening {} audio backend", backend.as_str());
    match backend {
        AudioBackend::Headless => Ok(Box::new(HeadlessSink::new()?)),
        #[cfg(feature = "device-audio")]
        AudioBackend::Device => {
            let sink = DeviceSink::new(session.sample_rate)?;
            follow_sample_rate(session, sink.sample_rate());
            Ok(Box::new(sink))
        }
        #[cfg(not(feature = "device-audio"))]
        AudioBackend::Device => {
            let _ = session;
            tracing::warn!("built without `device-audio`, falling back to headless audio");
            Ok(Box::new(HeadlessSink::new()?))
        }
    }
}

#[cfg(any(feature = "device-audio", test))]
fn follow_sample_rate(session: &mut SessionConfig, output_rate: u32) {
    if session.sample_rate != output_rate {
        tracing::warn!(
            "output sample rate {output_rate} differs from requested {}, using {output_rate}",
            session.sample_rate
        );
        session.sample_rate = output_rate;
    }
}

#[derive(Debug)]
struct Playback {
    end: Duration,
    completion: SlotCompletion,
}

/// Plays slots on a wall-clock timeline without producing sound.
///
/// A playback thread signals each slot's completion once its end time has passed.
#[derive(Debug)]
#[must_use]
pub struct HeadlessSink {
    epoch: Instant,
    tx: Option<Sender<Playback>>,
    shutdown: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl HeadlessSink {
    /// # Errors
    ///
    /// Returns an error if the playback thread fails to spawn.
    pub fn new() -> anyhow::Result<Self> {
        let epoch = Instant::now();
        let (tx, rx) = channel::unbounded();
        let (shutdown_tx, shutdown_rx) = channel::bounded(1);
        let handle = std::thread::Builder::new()
            .name("audio".into())
            .spawn(move || Self::playback(epoch, &rx, &shutdown_rx))?;
        Ok(Self {
            epoch,
            tx: Some(tx),
            shutdown: Some(shutdown_tx),
            handle: Some(handle),
        })
    }

    fn playback(epoch: Instant, rx: &Receiver<Playback>, shutdown: &Receiver<()>) {
        debug!("audio playback thread started");
        while let Ok(playback) = rx.recv() {
            let timeout = (epoch + playback.end).saturating_duration_since(Instant::now());
            match shutdown.recv_timeout(timeout) {
                Err(RecvTimeoutError::Timeout) => playback.completion.complete(),
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        debug!("audio playback thread stopped");
    }
}

impl AudioSink for HeadlessSink {
    fn current_time(&self) -> Duration {
        self.epoch.elapsed()
    }

    fn play(&mut self, slot: &AudioSlot, start: Duration) {
        trace!("queueing audio slot {} at {:.4}s", slot.index(), start.as_secs_f32());
        let playback = Playback {
            end: start + slot.duration(),
            completion: slot.completion(),
        };
        if let Some(tx) = &self.tx {
            if let Err(err) = tx.send(playback) {
                error!("audio playback thread is gone: {err:?}");
            }
        }
    }
}

impl Drop for HeadlessSink {
    fn drop(&mut self) {
        drop(self.shutdown.take());
        drop(self.tx.take());
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("audio playback thread panicked");
            }
        }
    }
}

#[cfg(feature = "device-audio")]
mod device {
    use anyhow::{anyhow, bail};
    use cpal::{
        traits::{DeviceTrait, HostTrait, StreamTrait},
        SampleFormat,
    };
    use emuhost_core::{
        audio::{AudioSink, AudioSlot, SlotCompletion},
        time::Duration,
    };
    use parking_lot::Mutex;
    use std::{collections::VecDeque, sync::Arc};
    use tracing::{debug, error, info};

    #[derive(Debug)]
    struct Queued {
        start: u64,
        samples: Vec<f32>,
        completion: SlotCompletion,
    }

    impl Queued {
        fn end(&self) -> u64 {
            self.start + self.samples.len() as u64
        }

        fn sample(&self, frame: u64) -> Option<f32> {
            let offset = usize::try_from(frame.checked_sub(self.start)?).ok()?;
            self.samples.get(offset).copied()
        }
    }

    /// Output stream state, shared with the device callback.
    #[derive(Debug, Default)]
    struct Mixer {
        played: u64,
        queue: VecDeque<Queued>,
    }

    impl Mixer {
        fn next_sample(&mut self) -> f32 {
            let frame = self.played;
            self.played += 1;
            let sample = self
                .queue
                .iter()
                .find_map(|queued| queued.sample(frame))
                .unwrap_or(0.0);
            while self
                .queue
                .front()
                .is_some_and(|queued| queued.end() <= self.played)
            {
                if let Some(queued) = self.queue.pop_front() {
                    queued.completion.complete();
                }
            }
            sample
        }
    }

    /// Plays slots through the default output device. The number of frames the device has
    /// consumed is the sink clock.
    #[must_use]
    pub struct DeviceSink {
        mixer: Arc<Mutex<Mixer>>,
        sample_rate: u32,
        _stream: cpal::Stream,
    }

    impl std::fmt::Debug for DeviceSink {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("DeviceSink")
                .field("sample_rate", &self.sample_rate)
                .finish_non_exhaustive()
        }
    }

    impl DeviceSink {
        /// # Errors
        ///
        /// Returns an error if no output device or compatible stream configuration is available.
        pub fn new(sample_rate: u32) -> anyhow::Result<Self> {
            let host = cpal::default_host();
            let device = host
                .default_output_device()
                .ok_or_else(|| anyhow!("no available audio devices found"))?;
            debug!(
                "device name: {}",
                device.name().as_deref().unwrap_or("unknown")
            );
            let (config, sample_format) = Self::choose_config(&device, sample_rate)?;

            let mixer = Arc::new(Mutex::new(Mixer::default()));
            let stream = match sample_format {
                SampleFormat::I16 => Self::make_stream::<i16>(&device, &config, &mixer),
                SampleFormat::U16 => Self::make_stream::<u16>(&device, &config, &mixer),
                SampleFormat::I32 => Self::make_stream::<i32>(&device, &config, &mixer),
                SampleFormat::F32 => Self::make_stream::<f32>(&device, &config, &mixer),
                SampleFormat::F64 => Self::make_stream::<f64>(&device, &config, &mixer),
                format => bail!("unsupported sample format: {format:?}"),
            }?;
            stream.play()?;
            info!("started audio stream with config: {config:?}");

            Ok(Self {
                mixer,
                sample_rate: config.sample_rate.0,
                _stream: stream,
            })
        }

        /// Rate the device plays at, which may differ from the requested one.
        #[must_use]
        pub const fn sample_rate(&self) -> u32 {
            self.sample_rate
        }

        fn choose_config(
            device: &cpal::Device,
            sample_rate: u32,
        ) -> anyhow::Result<(cpal::StreamConfig, SampleFormat)> {
            let desired_sample_rate = cpal::SampleRate(sample_rate);
            let chosen_config = device
                .supported_output_configs()?
                .find(|config| {
                    debug!("supported config: {config:?}");
                    config.sample_format() == SampleFormat::F32
                        && (config.min_sample_rate()..=config.max_sample_rate())
                            .contains(&desired_sample_rate)
                })
                .or_else(|| {
                    debug!("falling back to first supported output");
                    device
                        .supported_output_configs()
                        .ok()
                        .and_then(|mut configs| configs.next())
                })
                .map(|config| {
                    let rate = desired_sample_rate
                        .clamp(config.min_sample_rate(), config.max_sample_rate());
                    config.with_sample_rate(rate)
                })
                .ok_or_else(|| anyhow!("no supported audio configurations found"))?;
            let sample_format = chosen_config.sample_format();
            Ok((chosen_config.into(), sample_format))
        }

        fn make_stream<T>(
            device: &cpal::Device,
            config: &cpal::StreamConfig,
            mixer: &Arc<Mutex<Mixer>>,
        ) -> anyhow::Result<cpal::Stream>
        where
            T: cpal::SizedSample + cpal::FromSample<f32>,
        {
            let channels = usize::from(config.channels).max(1);
            let mixer = Arc::clone(mixer);
            Ok(device.build_output_stream(
                config,
                move |out: &mut [T], _info| {
                    let mut mixer = mixer.lock();
                    for frame in out.chunks_mut(channels) {
                        frame.fill(T::from_sample(mixer.next_sample()));
                    }
                },
                |err| error!("an error occurred on stream: {err}"),
                None,
            )?)
        }
    }

    impl AudioSink for DeviceSink {
        fn current_time(&self) -> Duration {
            let played = self.mixer.lock().played;
            Duration::from_secs_f64(played as f64 / f64::from(self.sample_rate))
        }

        fn play(&mut self, slot: &AudioSlot, start: Duration) {
            let start = (start.as_secs_f64() * f64::from(self.sample_rate)).round() as u64;
            self.mixer.lock().queue.push_back(Queued {
                start,
                samples: slot.samples().to_vec(),
                completion: slot.completion(),
            });
        }
    }

}
