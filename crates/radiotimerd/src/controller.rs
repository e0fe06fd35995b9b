//! Deferred-enable session state machine.
//!
//! ```text
//!            Arm                      EnableNow / AlarmFired
//!  Idle ───────────► Armed ─────────────────────────────► Completed
//!   ▲                 │  ▲ Snooze                            │
//!   │                 │  └──────── Snoozed ──────────┐       │
//!   │                 │ Dismiss / radio enabled      │       │
//!   │                 └──────────────────────────────┴─► Dismissed
//!   │                                                        │
//!   └────────────── next Arm starts a new session ───────────┘
//! ```
//!
//! Every input reaches the controller as a [`Command`] through one channel, so
//! transitions are applied strictly in arrival order. Alarm firings and ticks
//! carry the id they were issued for; anything that no longer matches the
//! live session is dropped.

use crate::alarm::DeferredAlarm;
use crate::clock::{BootInstant, Clock};
use crate::notifier::ActionNotifier;
use crate::persist::SessionStore;
use crate::rfkill::RadioSwitch;
use crate::settings::ConfigSource;
use crate::ticker::CountdownTicker;
use crate::watcher::RadioSubscription;
use radiotimer_core::config::TimerConfig;
use radiotimer_core::radio::RadioState;
use radiotimer_core::timer::{self, NotificationAction, TimerState};
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(pub u64);

/// Identifies one programming of the deferred alarm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AlarmId(pub u64);

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// The radio went off. `None` uses the configured delay.
    Arm { delay: Option<Duration> },
    EnableNow,
    Dismiss,
    /// `None` uses the session's snooze interval.
    Snooze { by: Option<Duration> },
    AlarmFired { alarm: AlarmId },
    ExternalStateChanged(RadioState),
    /// `remaining` is the ticker's estimate and only used for diagnostics.
    Tick { session: SessionId, remaining: Duration },
}

impl Command {
    /// Map a notification action name to its command.
    pub fn from_action(name: &str) -> Result<Self, ControllerError> {
        match NotificationAction::from_name(name) {
            Some(NotificationAction::EnableNow) => Ok(Command::EnableNow),
            Some(NotificationAction::Snooze) => Ok(Command::Snooze { by: None }),
            None => match name {
                "enable" => Ok(Command::EnableNow),
                "dismiss" => Ok(Command::Dismiss),
                other => Err(ControllerError::InvalidCommand(other.to_string())),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ControllerError {
    #[error("invalid command '{0}'")]
    InvalidCommand(String),
}

/// Everything the controller drives. Boxed so tests can substitute fakes.
pub struct Collaborators {
    pub clock: Box<dyn Clock>,
    pub alarm: Box<dyn DeferredAlarm>,
    pub ticker: Box<dyn CountdownTicker>,
    pub notifier: Box<dyn ActionNotifier>,
    pub watcher: Box<dyn RadioSubscription>,
    pub radio: Box<dyn RadioSwitch>,
    pub settings: Box<dyn ConfigSource>,
    pub store: Box<dyn SessionStore>,
}

#[derive(Debug)]
struct Session {
    id: SessionId,
    trigger_at: BootInstant,
    alarm: AlarmId,
    config: TimerConfig,
}

#[derive(Debug)]
enum Phase {
    Idle,
    Armed(Session),
    Snoozed(Session),
    Completed,
    Dismissed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Enable,
    Dismiss,
}

#[derive(Debug, Clone, Copy)]
enum Display {
    Show,
    Update,
}

/// Point-in-time view for status queries.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub state: TimerState,
    pub remaining: Option<Duration>,
}

impl Default for Snapshot {
    fn default() -> Self {
        Self {
            state: TimerState::Idle,
            remaining: None,
        }
    }
}

pub struct TimerController {
    phase: Phase,
    deps: Collaborators,
    sessions: u64,
    alarms: u64,
}

impl TimerController {
    pub fn new(deps: Collaborators) -> Self {
        Self {
            phase: Phase::Idle,
            deps,
            sessions: 0,
            alarms: 0,
        }
    }

    pub fn state(&self) -> TimerState {
        match self.phase {
            Phase::Idle => TimerState::Idle,
            Phase::Armed(_) => TimerState::Armed,
            Phase::Snoozed(_) => TimerState::Snoozed,
            Phase::Completed => TimerState::Completed,
            Phase::Dismissed => TimerState::Dismissed,
        }
    }

    /// Deadline of the pending enable, if any.
    pub fn trigger_at(&self) -> Option<BootInstant> {
        self.pending().map(|s| s.trigger_at)
    }

    pub fn snapshot(&self) -> Snapshot {
        let now = self.deps.clock.now();
        Snapshot {
            state: self.state(),
            remaining: self
                .pending()
                .map(|s| s.trigger_at.saturating_duration_since(now)),
        }
    }

    pub fn handle(&mut self, command: Command) -> TimerState {
        match command {
            Command::Arm { delay } => self.arm(delay),
            Command::EnableNow => self.finish(Outcome::Enable, "enable requested"),
            Command::Dismiss => self.finish(Outcome::Dismiss, "dismissed"),
            Command::Snooze { by } => self.snooze(by),
            Command::AlarmFired { alarm } => self.alarm_fired(alarm),
            Command::ExternalStateChanged(state) => self.radio_changed(state),
            Command::Tick { session, remaining } => self.tick(session, remaining),
        }
        self.state()
    }

    fn arm(&mut self, delay: Option<Duration>) {
        let now = self.deps.clock.now();

        // Already counting down: same session, new deadline.
        if let Some(mut session) = self.take_pending() {
            let delay = delay.unwrap_or(session.config.initial_delay);
            session.trigger_at = now + delay;
            info!(session = session.id.0, delay_secs = delay.as_secs(), "re-armed pending session");
            self.program(&mut session, Display::Update);
            self.deps.ticker.start(session.id, delay);
            self.phase = Phase::Armed(session);
            return;
        }

        let config = self.deps.settings.snapshot();
        if !config.enabled {
            debug!("arm ignored: feature disabled");
            return;
        }

        let delay = delay.unwrap_or(config.initial_delay);
        self.sessions += 1;
        let mut session = Session {
            id: SessionId(self.sessions),
            trigger_at: now + delay,
            alarm: AlarmId(0),
            config,
        };
        info!(session = session.id.0, delay_secs = delay.as_secs(), "armed deferred enable");

        self.program(&mut session, Display::Show);
        self.deps.ticker.start(session.id, delay);
        self.deps.watcher.subscribe();
        self.phase = Phase::Armed(session);
    }

    fn snooze(&mut self, by: Option<Duration>) {
        let Some(mut session) = self.take_pending() else {
            debug!(state = %self.state(), "snooze ignored: nothing pending");
            return;
        };
        let by = by.unwrap_or(session.config.snooze);
        session.trigger_at = session.trigger_at + by;
        info!(session = session.id.0, by_secs = by.as_secs(), "snoozed");

        self.program(&mut session, Display::Update);
        self.deps.ticker.extend(by);
        self.phase = Phase::Snoozed(session);
    }

    fn alarm_fired(&mut self, alarm: AlarmId) {
        match self.pending() {
            Some(session) if session.alarm == alarm => {
                self.finish(Outcome::Enable, "alarm fired");
            }
            _ => debug!(alarm = alarm.0, state = %self.state(), "stale alarm ignored"),
        }
    }

    fn radio_changed(&mut self, state: RadioState) {
        if state.is_enabling() {
            self.finish(Outcome::Dismiss, "radio enabled externally");
        } else {
            debug!(radio = %state, "radio state ignored");
        }
    }

    /// The ticker only sets the cadence. Its clock stops during suspend, so the
    /// title is always computed against the boot clock the alarm uses.
    fn tick(&mut self, session: SessionId, estimate: Duration) {
        let now = self.deps.clock.now();
        let title = match self.pending() {
            Some(live) if live.id == session => {
                let remaining = live.trigger_at.saturating_duration_since(now);
                if remaining.max(estimate) - remaining.min(estimate) >= Duration::from_secs(2) {
                    debug!(
                        session = session.0,
                        ticker_secs = estimate.as_secs(),
                        remaining_secs = remaining.as_secs(),
                        "countdown drifted from ticker"
                    );
                }
                timer::countdown_title(&live.config.title, remaining)
            }
            _ => {
                debug!(session = session.0, "stale tick ignored");
                return;
            }
        };
        if let Err(e) = self.deps.notifier.update_title(&title) {
            warn!(error = %e, "failed to update notification");
        }
    }

    /// Re-program the alarm and refresh the displayed title as one step, so
    /// the notification never shows a deadline the alarm does not hold.
    fn program(&mut self, session: &mut Session, display: Display) {
        self.alarms += 1;
        session.alarm = AlarmId(self.alarms);

        self.deps.alarm.cancel();
        if let Err(e) = self.deps.alarm.schedule(session.trigger_at, session.alarm) {
            warn!(error = %e, "failed to program wake alarm");
        }

        let remaining = session
            .trigger_at
            .saturating_duration_since(self.deps.clock.now());
        let title = timer::countdown_title(&session.config.title, remaining);
        let shown = match display {
            Display::Show => self.deps.notifier.show(&title, &session.config.actions),
            Display::Update => self.deps.notifier.update_title(&title),
        };
        if let Err(e) = shown {
            warn!(error = %e, "failed to display notification");
        }

        if let Err(e) = self.deps.store.save(remaining) {
            warn!(error = %e, "failed to persist pending deadline");
        }
    }

    fn finish(&mut self, outcome: Outcome, reason: &'static str) {
        let Some(session) = self.take_pending() else {
            debug!(reason, state = %self.state(), "ignored: nothing pending");
            return;
        };

        self.deps.alarm.cancel();
        self.deps.ticker.stop();
        if outcome == Outcome::Enable {
            if let Err(e) = self.deps.radio.enable() {
                warn!(error = %e, "failed to enable radio");
            }
        }
        if let Err(e) = self.deps.notifier.cancel() {
            warn!(error = %e, "failed to cancel notification");
        }
        self.deps.watcher.unsubscribe();
        if let Err(e) = self.deps.store.clear() {
            warn!(error = %e, "failed to clear persisted deadline");
        }

        info!(session = session.id.0, reason, "session finished");
        self.phase = match outcome {
            Outcome::Enable => Phase::Completed,
            Outcome::Dismiss => Phase::Dismissed,
        };
    }

    fn pending(&self) -> Option<&Session> {
        match &self.phase {
            Phase::Armed(session) | Phase::Snoozed(session) => Some(session),
            _ => None,
        }
    }

    /// Move the live session out of the phase. The caller puts back the next phase.
    fn take_pending(&mut self) -> Option<Session> {
        match std::mem::replace(&mut self.phase, Phase::Idle) {
            Phase::Armed(session) | Phase::Snoozed(session) => Some(session),
            other => {
                self.phase = other;
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use radiotimer_core::config::Config;
    use std::sync::{Arc, Mutex};

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        Schedule(BootInstant, AlarmId),
        CancelAlarm,
        TickerStart(SessionId, Duration),
        TickerExtend(Duration),
        TickerStop,
        Show(String, Vec<NotificationAction>),
        Update(String),
        CancelNotification,
        Subscribe,
        Unsubscribe,
        EnableRadio,
        Save(Duration),
        Clear,
    }

    type Log = Arc<Mutex<Vec<Call>>>;

    fn record(log: &Log, call: Call) {
        log.lock().unwrap().push(call);
    }

    /// Boot-time origin for tests; "t=0" in scenarios.
    const T0: Duration = Duration::from_secs(1_000);

    fn at(secs: u64) -> BootInstant {
        BootInstant::from_since_boot(T0 + Duration::from_secs(secs))
    }

    struct FakeClock(Arc<Mutex<Duration>>);
    impl Clock for FakeClock {
        fn now(&self) -> BootInstant {
            BootInstant::from_since_boot(*self.0.lock().unwrap())
        }
    }

    struct FakeAlarm(Log);
    impl DeferredAlarm for FakeAlarm {
        fn schedule(&mut self, at: BootInstant, alarm: AlarmId) -> Result<()> {
            record(&self.0, Call::Schedule(at, alarm));
            Ok(())
        }
        fn cancel(&mut self) {
            record(&self.0, Call::CancelAlarm);
        }
    }

    struct FakeTicker(Log);
    impl CountdownTicker for FakeTicker {
        fn start(&mut self, session: SessionId, duration: Duration) {
            record(&self.0, Call::TickerStart(session, duration));
        }
        fn extend(&mut self, by: Duration) {
            record(&self.0, Call::TickerExtend(by));
        }
        fn stop(&mut self) {
            record(&self.0, Call::TickerStop);
        }
    }

    struct FakeNotifier(Log);
    impl ActionNotifier for FakeNotifier {
        fn show(&mut self, title: &str, actions: &[NotificationAction]) -> Result<()> {
            record(&self.0, Call::Show(title.into(), actions.to_vec()));
            Ok(())
        }
        fn update_title(&mut self, title: &str) -> Result<()> {
            record(&self.0, Call::Update(title.into()));
            Ok(())
        }
        fn cancel(&mut self) -> Result<()> {
            record(&self.0, Call::CancelNotification);
            Ok(())
        }
    }

    struct FakeWatcher(Log);
    impl RadioSubscription for FakeWatcher {
        fn subscribe(&mut self) {
            record(&self.0, Call::Subscribe);
        }
        fn unsubscribe(&mut self) {
            record(&self.0, Call::Unsubscribe);
        }
    }

    struct FakeRadio(Log);
    impl RadioSwitch for FakeRadio {
        fn enable(&mut self) -> Result<()> {
            record(&self.0, Call::EnableRadio);
            Ok(())
        }
    }

    struct FakeSettings(Arc<Mutex<Config>>);
    impl ConfigSource for FakeSettings {
        fn snapshot(&mut self) -> TimerConfig {
            self.0.lock().unwrap().timer_config()
        }
    }

    struct FakeStore(Log);
    impl SessionStore for FakeStore {
        fn save(&mut self, remaining: Duration) -> Result<()> {
            record(&self.0, Call::Save(remaining));
            Ok(())
        }
        fn clear(&mut self) -> Result<()> {
            record(&self.0, Call::Clear);
            Ok(())
        }
    }

    struct Harness {
        controller: TimerController,
        log: Log,
        now: Arc<Mutex<Duration>>,
        config: Arc<Mutex<Config>>,
    }

    impl Harness {
        fn new() -> Self {
            Self::with_config(|_| {})
        }

        fn with_config(edit: impl FnOnce(&mut Config)) -> Self {
            let mut config = Config::default();
            edit(&mut config);
            let config = Arc::new(Mutex::new(config));
            let log: Log = Arc::default();
            let now = Arc::new(Mutex::new(T0));
            let controller = TimerController::new(Collaborators {
                clock: Box::new(FakeClock(Arc::clone(&now))),
                alarm: Box::new(FakeAlarm(Arc::clone(&log))),
                ticker: Box::new(FakeTicker(Arc::clone(&log))),
                notifier: Box::new(FakeNotifier(Arc::clone(&log))),
                watcher: Box::new(FakeWatcher(Arc::clone(&log))),
                radio: Box::new(FakeRadio(Arc::clone(&log))),
                settings: Box::new(FakeSettings(Arc::clone(&config))),
                store: Box::new(FakeStore(Arc::clone(&log))),
            });
            Self { controller, log, now, config }
        }

        fn advance_to(&self, secs: u64) {
            *self.now.lock().unwrap() = T0 + Duration::from_secs(secs);
        }

        fn handle(&mut self, command: Command) -> TimerState {
            self.controller.handle(command)
        }

        fn arm(&mut self, secs: u64) -> TimerState {
            self.handle(Command::Arm { delay: Some(Duration::from_secs(secs)) })
        }

        fn take_calls(&self) -> Vec<Call> {
            std::mem::take(&mut *self.log.lock().unwrap())
        }

        fn count(&self, wanted: &Call) -> usize {
            self.log.lock().unwrap().iter().filter(|c| *c == wanted).count()
        }

        fn session(&self) -> SessionId {
            self.controller.pending().expect("pending session").id
        }

        fn alarm(&self) -> AlarmId {
            self.controller.pending().expect("pending session").alarm
        }

        fn tick(&mut self, remaining_secs: u64) -> TimerState {
            let session = self.session();
            self.handle(Command::Tick { session, remaining: Duration::from_secs(remaining_secs) })
        }
    }

    fn shows(calls: &[Call]) -> Vec<&Call> {
        calls.iter().filter(|c| matches!(c, Call::Show(..))).collect()
    }

    // === Arm from Idle ===

    #[test]
    fn arm_from_idle_programs_alarm_ticker_notification_and_watcher() {
        let mut h = Harness::new();
        assert_eq!(h.arm(90), TimerState::Armed);
        assert_eq!(h.controller.trigger_at(), Some(at(90)));

        let calls = h.take_calls();
        assert!(calls.contains(&Call::Schedule(at(90), AlarmId(1))));
        assert!(calls.contains(&Call::TickerStart(SessionId(1), Duration::from_secs(90))));
        assert!(calls.contains(&Call::Show("Wi-Fi on in 01:30".into(), vec![])));
        assert!(calls.contains(&Call::Subscribe));
        assert!(calls.contains(&Call::Save(Duration::from_secs(90))));
    }

    #[test]
    fn arm_without_delay_uses_configured_delay() {
        let mut h = Harness::with_config(|c| c.general.sec_until_enable = 45);
        h.handle(Command::Arm { delay: None });
        assert_eq!(h.controller.trigger_at(), Some(at(45)));
    }

    #[test]
    fn arm_with_zero_delay_is_still_armed() {
        let mut h = Harness::new();
        assert_eq!(h.arm(0), TimerState::Armed);
        assert_eq!(h.controller.trigger_at(), Some(at(0)));
    }

    #[test]
    fn notification_offers_configured_actions() {
        let mut h = Harness::with_config(|c| {
            c.notification.show_enable_now = true;
            c.notification.show_snooze = true;
        });
        h.arm(60);
        let calls = h.take_calls();
        assert!(calls.contains(&Call::Show(
            "Wi-Fi on in 01:00".into(),
            vec![NotificationAction::EnableNow, NotificationAction::Snooze],
        )));
    }

    // === Feature disabled ===

    #[test]
    fn arm_with_feature_disabled_is_a_complete_noop() {
        let mut h = Harness::with_config(|c| c.general.enabled = false);
        assert_eq!(h.arm(60), TimerState::Idle);
        assert!(h.take_calls().is_empty(), "nothing scheduled, shown or subscribed");
        assert!(h.controller.trigger_at().is_none());
    }

    // === Duplicate Arm while pending ===

    #[test]
    fn second_arm_reprograms_in_place_without_second_subscription() {
        let mut h = Harness::new();
        h.arm(60);
        let first = h.session();
        h.advance_to(20);
        assert_eq!(h.arm(60), TimerState::Armed);

        assert_eq!(h.session(), first, "same session entity");
        assert_eq!(h.controller.trigger_at(), Some(at(80)));
        assert_eq!(h.count(&Call::Subscribe), 1);
        assert_eq!(shows(&h.take_calls()).len(), 1, "title is updated, not shown twice");
    }

    #[test]
    fn second_arm_restarts_the_single_ticker() {
        let mut h = Harness::new();
        h.arm(60);
        h.take_calls();
        h.advance_to(5);
        h.arm(60);
        let calls = h.take_calls();
        assert!(calls.contains(&Call::TickerStart(SessionId(1), Duration::from_secs(60))));
        assert!(!calls.contains(&Call::TickerStop));
    }

    #[test]
    fn arm_while_snoozed_returns_to_armed() {
        let mut h = Harness::new();
        h.arm(60);
        h.handle(Command::Snooze { by: None });
        assert_eq!(h.arm(60), TimerState::Armed);
    }

    // === Countdown scenario: Arm(90) → ticks → AlarmFired ===

    #[test]
    fn full_countdown_ends_in_completed_with_no_late_ticks() {
        let mut h = Harness::new();
        h.arm(90);
        let session = h.session();
        let alarm = h.alarm();

        h.tick(90);
        assert_eq!(h.take_calls().last(), Some(&Call::Update("Wi-Fi on in 01:30".into())));

        for t in 1..90 {
            h.advance_to(t);
            h.tick(90 - t);
        }
        let updates: Vec<Call> = h.take_calls();
        assert_eq!(updates.len(), 89);
        assert_eq!(updates[0], Call::Update("Wi-Fi on in 01:29".into()));
        assert_eq!(updates[88], Call::Update("Wi-Fi on in 00:01".into()));

        h.advance_to(90);
        assert_eq!(h.handle(Command::AlarmFired { alarm }), TimerState::Completed);
        let calls = h.take_calls();
        assert!(calls.contains(&Call::EnableRadio));
        assert!(calls.contains(&Call::CancelNotification));
        assert!(calls.contains(&Call::TickerStop));

        // A tick that was already queued is absorbed.
        h.handle(Command::Tick { session, remaining: Duration::ZERO });
        assert!(h.take_calls().is_empty());
    }

    #[test]
    fn tick_after_suspend_shows_boot_clock_remaining() {
        let mut h = Harness::new();
        h.arm(90);
        h.take_calls();

        // The ticker's clock stood still while the host slept for a minute.
        h.advance_to(60);
        h.tick(89);
        assert_eq!(h.take_calls(), vec![Call::Update("Wi-Fi on in 00:30".into())]);
        assert_eq!(h.controller.snapshot().remaining, Some(Duration::from_secs(30)));
    }

    #[test]
    fn tick_past_deadline_shows_zero() {
        let mut h = Harness::new();
        h.arm(10);
        h.take_calls();
        h.advance_to(15);
        h.tick(3);
        assert_eq!(h.take_calls(), vec![Call::Update("Wi-Fi on in 00:00".into())]);
    }

    // === Snooze ===

    #[test]
    fn snooze_pushes_deadline_from_previous_deadline() {
        let mut h = Harness::new();
        h.arm(60);
        h.advance_to(10);
        h.take_calls();

        assert_eq!(h.handle(Command::Snooze { by: Some(Duration::from_secs(10)) }), TimerState::Snoozed);
        assert_eq!(h.controller.trigger_at(), Some(at(70)));

        let calls = h.take_calls();
        assert_eq!(calls.iter().filter(|c| **c == Call::CancelAlarm).count(), 1);
        let schedules: Vec<&Call> = calls.iter().filter(|c| matches!(c, Call::Schedule(..))).collect();
        assert_eq!(schedules, vec![&Call::Schedule(at(70), AlarmId(2))]);
        assert!(calls.contains(&Call::Update("Wi-Fi on in 01:00".into())));
    }

    #[test]
    fn snooze_leaves_ticker_running_and_extends_it() {
        let mut h = Harness::new();
        h.arm(60);
        h.take_calls();
        h.handle(Command::Snooze { by: Some(Duration::from_secs(30)) });

        let calls = h.take_calls();
        assert!(calls.contains(&Call::TickerExtend(Duration::from_secs(30))));
        assert!(!calls.iter().any(|c| matches!(c, Call::TickerStart(..) | Call::TickerStop)));
        assert_eq!(h.controller.trigger_at(), Some(at(90)));
    }

    #[test]
    fn original_alarm_does_not_fire_after_snooze() {
        let mut h = Harness::new();
        h.arm(60);
        let original = h.alarm();
        h.advance_to(10);
        h.handle(Command::Snooze { by: Some(Duration::from_secs(30)) });

        h.advance_to(60);
        h.take_calls();
        assert_eq!(h.handle(Command::AlarmFired { alarm: original }), TimerState::Snoozed);
        assert!(h.take_calls().is_empty(), "stale fire has no effect");

        h.advance_to(90);
        let current = h.alarm();
        assert_eq!(h.handle(Command::AlarmFired { alarm: current }), TimerState::Completed);
    }

    #[test]
    fn snooze_without_interval_uses_session_snapshot() {
        let mut h = Harness::with_config(|c| c.general.snooze_sec = 15);
        h.arm(60);
        // Edits after the session started do not apply to it.
        h.config.lock().unwrap().general.snooze_sec = 600;
        h.handle(Command::Snooze { by: None });
        assert_eq!(h.controller.trigger_at(), Some(at(75)));
    }

    #[test]
    fn repeated_snoozes_accumulate() {
        let mut h = Harness::new();
        h.arm(60);
        h.handle(Command::Snooze { by: None });
        h.handle(Command::Snooze { by: None });
        assert_eq!(h.controller.trigger_at(), Some(at(180)));
        assert_eq!(h.controller.state(), TimerState::Snoozed);
    }

    // === EnableNow ≡ AlarmFired ===

    #[test]
    fn enable_now_and_alarm_fired_have_identical_effects() {
        let mut by_user = Harness::new();
        by_user.arm(60);
        by_user.take_calls();
        let user_state = by_user.handle(Command::EnableNow);

        let mut by_alarm = Harness::new();
        by_alarm.arm(60);
        by_alarm.take_calls();
        let alarm = by_alarm.alarm();
        let alarm_state = by_alarm.handle(Command::AlarmFired { alarm });

        assert_eq!(user_state, TimerState::Completed);
        assert_eq!(alarm_state, TimerState::Completed);
        assert_eq!(by_user.take_calls(), by_alarm.take_calls());
    }

    #[test]
    fn enable_now_stops_everything_and_enables_radio() {
        let mut h = Harness::new();
        h.arm(60);
        h.take_calls();
        h.handle(Command::EnableNow);
        assert_eq!(
            h.take_calls(),
            vec![
                Call::CancelAlarm,
                Call::TickerStop,
                Call::EnableRadio,
                Call::CancelNotification,
                Call::Unsubscribe,
                Call::Clear,
            ]
        );
        assert!(h.controller.trigger_at().is_none());
    }

    #[test]
    fn enable_now_from_snoozed_completes() {
        let mut h = Harness::new();
        h.arm(60);
        h.handle(Command::Snooze { by: None });
        assert_eq!(h.handle(Command::EnableNow), TimerState::Completed);
    }

    // === Dismiss ≡ radio enabled externally ===

    #[test]
    fn dismiss_and_external_enable_have_identical_effects() {
        let mut dismissed = Harness::new();
        dismissed.arm(60);
        dismissed.take_calls();
        let a = dismissed.handle(Command::Dismiss);

        let mut external = Harness::new();
        external.arm(60);
        external.take_calls();
        let b = external.handle(Command::ExternalStateChanged(RadioState::Enabled));

        assert_eq!(a, TimerState::Dismissed);
        assert_eq!(b, TimerState::Dismissed);
        assert_eq!(dismissed.take_calls(), external.take_calls());
    }

    #[test]
    fn dismiss_does_not_enable_radio() {
        let mut h = Harness::new();
        h.arm(60);
        h.handle(Command::Dismiss);
        assert_eq!(h.count(&Call::EnableRadio), 0);
        assert_eq!(h.count(&Call::Unsubscribe), 1);
    }

    #[test]
    fn enabling_state_also_dismisses() {
        let mut h = Harness::new();
        h.arm(60);
        assert_eq!(
            h.handle(Command::ExternalStateChanged(RadioState::Enabling)),
            TimerState::Dismissed
        );
    }

    #[test]
    fn other_radio_states_are_ignored() {
        let mut h = Harness::new();
        h.arm(60);
        h.take_calls();
        for state in [RadioState::Disabled, RadioState::Disabling, RadioState::Unknown] {
            assert_eq!(h.handle(Command::ExternalStateChanged(state)), TimerState::Armed);
        }
        assert!(h.take_calls().is_empty());
    }

    // === Races and out-of-session commands ===

    #[test]
    fn late_alarm_after_dismiss_is_absorbed() {
        let mut h = Harness::new();
        h.arm(60);
        let alarm = h.alarm();
        h.handle(Command::Dismiss);
        h.take_calls();

        assert_eq!(h.handle(Command::AlarmFired { alarm }), TimerState::Dismissed);
        assert!(h.take_calls().is_empty(), "no radio enable after dismiss");
    }

    #[test]
    fn session_commands_while_idle_are_noops() {
        let mut h = Harness::new();
        for command in [
            Command::EnableNow,
            Command::Dismiss,
            Command::Snooze { by: None },
            Command::AlarmFired { alarm: AlarmId(1) },
            Command::ExternalStateChanged(RadioState::Enabled),
            Command::Tick { session: SessionId(1), remaining: Duration::from_secs(3) },
        ] {
            assert_eq!(h.handle(command), TimerState::Idle);
        }
        assert!(h.take_calls().is_empty());
    }

    #[test]
    fn session_commands_after_completion_are_noops() {
        let mut h = Harness::new();
        h.arm(60);
        h.handle(Command::EnableNow);
        h.take_calls();
        assert_eq!(h.handle(Command::Dismiss), TimerState::Completed);
        assert_eq!(h.handle(Command::Snooze { by: None }), TimerState::Completed);
        assert_eq!(h.handle(Command::EnableNow), TimerState::Completed);
        assert!(h.take_calls().is_empty());
    }

    // === New session after a terminal state ===

    #[test]
    fn arm_after_terminal_starts_a_new_session() {
        let mut h = Harness::new();
        h.arm(60);
        let old = h.session();
        h.handle(Command::Dismiss);

        h.advance_to(100);
        assert_eq!(h.arm(30), TimerState::Armed);
        assert_ne!(h.session(), old);
        assert_eq!(h.controller.trigger_at(), Some(at(130)));
        assert_eq!(h.count(&Call::Subscribe), 2);
        assert_eq!(h.count(&Call::Unsubscribe), 1);
    }

    #[test]
    fn tick_from_previous_session_is_ignored() {
        let mut h = Harness::new();
        h.arm(60);
        let old = h.session();
        h.handle(Command::Dismiss);
        h.arm(60);
        h.take_calls();

        h.handle(Command::Tick { session: old, remaining: Duration::from_secs(5) });
        assert!(h.take_calls().is_empty());
    }

    #[test]
    fn new_session_reads_config_again() {
        let mut h = Harness::new();
        h.arm(60);
        h.handle(Command::Dismiss);
        h.config.lock().unwrap().notification.show_snooze = true;
        h.take_calls();

        h.arm(60);
        assert!(h.take_calls().contains(&Call::Show(
            "Wi-Fi on in 01:00".into(),
            vec![NotificationAction::Snooze],
        )));
    }

    #[test]
    fn disabling_feature_does_not_cancel_running_session() {
        let mut h = Harness::new();
        h.arm(60);
        h.config.lock().unwrap().general.enabled = false;
        assert_eq!(h.arm(60), TimerState::Armed);
        let alarm = h.alarm();
        assert_eq!(h.handle(Command::AlarmFired { alarm }), TimerState::Completed);
    }

    // === Action dispatch ===

    #[test]
    fn dispatch_known_actions() {
        let mut h = Harness::new();
        h.arm(60);
        for (name, state) in [("snooze", TimerState::Snoozed), ("enable_now", TimerState::Completed)] {
            let command = Command::from_action(name).unwrap();
            assert_eq!(h.handle(command), state);
        }
    }

    #[test]
    fn dispatch_unknown_action_is_invalid_command() {
        let mut h = Harness::new();
        h.arm(60);
        h.take_calls();
        let err = Command::from_action("reboot").unwrap_err();
        assert_eq!(err, ControllerError::InvalidCommand("reboot".into()));
        assert_eq!(h.controller.state(), TimerState::Armed);
        assert!(h.take_calls().is_empty());
    }

    #[test]
    fn every_offered_button_dispatches() {
        for action in [NotificationAction::EnableNow, NotificationAction::Snooze] {
            assert!(Command::from_action(action.name()).is_ok(), "{}", action.name());
        }
        assert_eq!(Command::from_action("dismiss"), Ok(Command::Dismiss));
    }

    #[test]
    fn enable_is_an_alias_for_enable_now() {
        assert_eq!(Command::from_action("enable"), Ok(Command::EnableNow));
    }

    // === Snapshot ===

    #[test]
    fn snapshot_reports_remaining_time() {
        let mut h = Harness::new();
        assert_eq!(h.controller.snapshot(), Snapshot::default());
        h.arm(60);
        h.advance_to(25);
        let snap = h.controller.snapshot();
        assert_eq!(snap.state, TimerState::Armed);
        assert_eq!(snap.remaining, Some(Duration::from_secs(35)));
    }

    #[test]
    fn snapshot_after_deadline_saturates_at_zero() {
        let mut h = Harness::new();
        h.arm(10);
        h.advance_to(30);
        assert_eq!(h.controller.snapshot().remaining, Some(Duration::ZERO));
    }
}
