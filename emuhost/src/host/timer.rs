use anyhow::anyhow;
use emuhost_core::{
    scheduler::Schedule,
    time::{Duration, Instant},
};
use tracing::trace;

/// A stand-in for a display's refresh callback.
///
/// Refreshes happen on a fixed grid starting at the timer's epoch. The scheduler's [`Schedule`]
/// hint picks how long to sleep before the next tick.
#[derive(Debug)]
#[must_use]
pub struct RefreshTimer {
    epoch: Instant,
    interval: Duration,
}

impl RefreshTimer {
    /// # Errors
    ///
    /// Returns an error if `refresh_rate` has no representable refresh interval.
    pub fn new(refresh_rate: f32, epoch: Instant) -> anyhow::Result<Self> {
        let interval = Duration::try_from_secs_f64(1.0 / f64::from(refresh_rate))
            .map_err(|err| anyhow!("invalid refresh rate {refresh_rate}: {err}"))?;
        if interval.is_zero() {
            anyhow::bail!("invalid refresh rate {refresh_rate}: interval is zero");
        }
        Ok(Self { epoch, interval })
    }

    #[must_use]
    pub const fn interval(&self) -> Duration {
        self.interval
    }

    /// First refresh strictly after `now`.
    #[must_use]
    pub fn next_refresh(&self, now: Instant) -> Instant {
        let elapsed = now.saturating_duration_since(self.epoch).as_nanos();
        let interval = self.interval.as_nanos().max(1);
        let refreshes = elapsed / interval + 1;
        let offset = u64::try_from(refreshes.saturating_mul(interval)).unwrap_or(u64::MAX);
        self.epoch
            .checked_add(Duration::from_nanos(offset))
            .unwrap_or(now)
    }

    /// When the next tick should arrive, given the tick at `now` asked for `schedule`.
    #[must_use]
    pub fn deadline(&self, schedule: Schedule, now: Instant) -> Instant {
        let next_refresh = self.next_refresh(now);
        match schedule {
            Schedule::NextRefresh => next_refresh,
            Schedule::After(delay) => now
                .checked_add(delay)
                .map_or(next_refresh, |after| after.min(next_refresh)),
        }
    }

    /// Sleep as requested by `schedule` and return the arrival time of the next tick.
    pub fn wait(&self, schedule: Schedule) -> Instant {
        let now = Instant::now();
        let deadline = self.deadline(schedule, now);
        let timeout = deadline.saturating_duration_since(now);
        if !timeout.is_zero() {
            trace!("sleeping for {:.4}s", timeout.as_secs_f32());
            std::thread::sleep(timeout);
        }
        Instant::now()
    }
}
