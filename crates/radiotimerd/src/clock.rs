use anyhow::{Context, Result};
use nix::time::{clock_gettime, ClockId};
use std::ops::Add;
use std::time::Duration;
use tracing::warn;

/// A point on the boot-time clock: monotonic, and keeps counting while the
/// machine is suspended. The wake alarm is programmed against the same clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BootInstant(Duration);

impl BootInstant {
    pub fn from_since_boot(since_boot: Duration) -> Self {
        Self(since_boot)
    }

    pub fn since_boot(self) -> Duration {
        self.0
    }

    /// Zero when `earlier` is later than `self`.
    pub fn saturating_duration_since(self, earlier: BootInstant) -> Duration {
        self.0.saturating_sub(earlier.0)
    }
}

impl Add<Duration> for BootInstant {
    type Output = BootInstant;

    fn add(self, rhs: Duration) -> BootInstant {
        BootInstant(self.0.saturating_add(rhs))
    }
}

pub trait Clock: Send {
    fn now(&self) -> BootInstant;
}

/// `CLOCK_BOOTTIME`.
pub struct BootClock {
    origin: BootInstant,
    started: std::time::Instant,
}

impl BootClock {
    pub fn new() -> Result<Self> {
        let origin = read_boottime().context("reading CLOCK_BOOTTIME")?;
        Ok(Self {
            origin,
            started: std::time::Instant::now(),
        })
    }
}

impl Clock for BootClock {
    fn now(&self) -> BootInstant {
        match read_boottime() {
            Ok(now) => now,
            Err(e) => {
                // Monotonic fallback; loses time spent suspended.
                warn!(error = %e, "CLOCK_BOOTTIME read failed");
                self.origin + self.started.elapsed()
            }
        }
    }
}

pub(crate) fn read_boottime() -> nix::Result<BootInstant> {
    let ts = clock_gettime(ClockId::CLOCK_BOOTTIME)?;
    Ok(BootInstant::from_since_boot(Duration::new(
        ts.tv_sec() as u64,
        ts.tv_nsec() as u32,
    )))
}
