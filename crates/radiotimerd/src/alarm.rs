use crate::clock::{self, BootInstant};
use crate::controller::{AlarmId, Command};
use anyhow::{Context, Result};
use nix::sys::time::TimeSpec;
use nix::sys::timerfd::{ClockId, Expiration, TimerFd, TimerFlags, TimerSetTimeFlags};
use std::os::fd::{AsFd, AsRawFd, RawFd};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::io::unix::AsyncFd;
use tokio::io::Interest;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// One-shot wake-up at an absolute boot-time instant.
pub trait DeferredAlarm: Send {
    /// Replace any previous schedule with one firing at `at`.
    fn schedule(&mut self, at: BootInstant, alarm: AlarmId) -> Result<()>;
    /// Idempotent and best-effort: a firing already in flight may still arrive.
    fn cancel(&mut self);
}

struct WakeTimer(TimerFd);

impl AsRawFd for WakeTimer {
    fn as_raw_fd(&self) -> RawFd {
        self.0.as_fd().as_raw_fd()
    }
}

#[derive(Debug, Clone, Copy)]
struct Armed {
    alarm: AlarmId,
    at: BootInstant,
}

/// timerfd-backed alarm. On `CLOCK_BOOTTIME_ALARM` the expiry resumes a
/// suspended host; without `CAP_WAKE_ALARM` it falls back to `CLOCK_BOOTTIME`
/// and fires on the first wake-up after the deadline.
pub struct TimerFdAlarm {
    timer: Arc<AsyncFd<WakeTimer>>,
    armed: Arc<Mutex<Option<Armed>>>,
    waiter: JoinHandle<()>,
    wakes_host: bool,
}

impl TimerFdAlarm {
    /// Must be called inside the tokio runtime.
    pub fn new(commands: mpsc::UnboundedSender<Command>) -> Result<Self> {
        let flags = TimerFlags::TFD_NONBLOCK | TimerFlags::TFD_CLOEXEC;
        let (fd, wakes_host) = match TimerFd::new(ClockId::CLOCK_BOOTTIME_ALARM, flags) {
            Ok(fd) => (fd, true),
            Err(e) => {
                warn!(error = %e, "wake alarms unavailable, deadline will be honoured after resume");
                let fd = TimerFd::new(ClockId::CLOCK_BOOTTIME, flags)
                    .context("creating CLOCK_BOOTTIME timerfd")?;
                (fd, false)
            }
        };

        // SAFETY: `WakeTimer` owns the descriptor and closes it only on drop,
        // so it stays open and unchanged for the lifetime of the `AsyncFd`.
        let timer = unsafe { AsyncFd::register_with_interest(WakeTimer(fd), Interest::READABLE) }
            .context("registering timerfd")?;
        let timer = Arc::new(timer);
        let armed = Arc::new(Mutex::new(None));
        let waiter = tokio::spawn(wait_for_expiry(
            Arc::clone(&timer),
            Arc::clone(&armed),
            commands,
        ));

        Ok(Self {
            timer,
            armed,
            waiter,
            wakes_host,
        })
    }

    pub fn wakes_host(&self) -> bool {
        self.wakes_host
    }
}

impl DeferredAlarm for TimerFdAlarm {
    fn schedule(&mut self, at: BootInstant, alarm: AlarmId) -> Result<()> {
        // An all-zero expiration disarms a timerfd.
        let expiry = at.since_boot().max(Duration::from_nanos(1));
        *lock(&self.armed) = Some(Armed { alarm, at });
        self.timer
            .get_ref()
            .0
            .set(
                Expiration::OneShot(TimeSpec::from_duration(expiry)),
                TimerSetTimeFlags::TFD_TIMER_ABSTIME,
            )
            .with_context(|| format!("programming timerfd for alarm {}", alarm.0))?;
        debug!(alarm = alarm.0, at_secs = expiry.as_secs(), "wake alarm scheduled");
        Ok(())
    }

    fn cancel(&mut self) {
        if lock(&self.armed).take().is_none() {
            return;
        }
        if let Err(e) = self.timer.get_ref().0.unset() {
            warn!(error = %e, "failed to disarm timerfd");
        }
    }
}

impl Drop for TimerFdAlarm {
    fn drop(&mut self) {
        self.waiter.abort();
    }
}

async fn wait_for_expiry(
    timer: Arc<AsyncFd<WakeTimer>>,
    armed: Arc<Mutex<Option<Armed>>>,
    commands: mpsc::UnboundedSender<Command>,
) {
    loop {
        let mut guard = match timer.readable().await {
            Ok(guard) => guard,
            Err(e) => {
                warn!(error = %e, "timerfd polling failed, alarm disabled");
                return;
            }
        };

        match guard.try_io(|fd| fd.get_ref().0.wait().map_err(std::io::Error::from)) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                warn!(error = %e, "timerfd read failed");
                continue;
            }
            Err(_would_block) => continue,
        }

        // A read racing a reschedule must not fire the new alarm early.
        let fired = {
            let mut armed = lock(&armed);
            match *armed {
                Some(entry) if clock::read_boottime().map_or(true, |now| now >= entry.at) => armed.take(),
                _ => None,
            }
        };
        let Some(entry) = fired else {
            debug!("timerfd expiry without a due alarm");
            continue;
        };

        info!(alarm = entry.alarm.0, "wake alarm fired");
        if commands.send(Command::AlarmFired { alarm: entry.alarm }).is_err() {
            return;
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
