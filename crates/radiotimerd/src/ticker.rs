use crate::controller::{Command, SessionId};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::debug;

pub const TICK_PERIOD: Duration = Duration::from_secs(1);

/// Horizons past this are capped; the alarm still owns the real deadline.
const MAX_HORIZON: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

/// Periodic "time remaining" source for the countdown title.
/// Display only: completion belongs to the alarm.
pub trait CountdownTicker: Send {
    /// Tick now with `duration`, then once per period. Replaces a running countdown.
    fn start(&mut self, session: SessionId, duration: Duration);
    /// Push the horizon of the running countdown out without restarting it.
    fn extend(&mut self, by: Duration);
    fn stop(&mut self);
}

pub struct IntervalTicker {
    commands: mpsc::UnboundedSender<Command>,
    deadline: Arc<Mutex<Instant>>,
    task: Option<JoinHandle<()>>,
}

impl IntervalTicker {
    pub fn new(commands: mpsc::UnboundedSender<Command>) -> Self {
        Self {
            commands,
            deadline: Arc::new(Mutex::new(Instant::now())),
            task: None,
        }
    }
}

impl CountdownTicker for IntervalTicker {
    fn start(&mut self, session: SessionId, duration: Duration) {
        self.stop();
        let start = Instant::now();
        // Fresh cell, so an aborted task never observes a later extend.
        self.deadline = Arc::new(Mutex::new(horizon(start, duration)));
        self.task = Some(tokio::spawn(run(
            session,
            start,
            Arc::clone(&self.deadline),
            self.commands.clone(),
        )));
    }

    fn extend(&mut self, by: Duration) {
        let mut deadline = lock(&self.deadline);
        *deadline = horizon(*deadline, by);
    }

    fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for IntervalTicker {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn run(
    session: SessionId,
    start: Instant,
    deadline: Arc<Mutex<Instant>>,
    commands: mpsc::UnboundedSender<Command>,
) {
    let mut interval = tokio::time::interval_at(start, TICK_PERIOD);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        let at = interval.tick().await;
        let remaining = lock(&deadline).saturating_duration_since(at);
        if remaining.is_zero() {
            debug!(session = session.0, "countdown reached zero");
            return;
        }
        if commands.send(Command::Tick { session, remaining }).is_err() {
            return;
        }
    }
}

fn horizon(from: Instant, by: Duration) -> Instant {
    from.checked_add(by.min(MAX_HORIZON)).unwrap_or(from)
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
