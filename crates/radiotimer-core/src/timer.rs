use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Phase of the deferred-enable session, as reported to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimerState {
    /// No session has started yet.
    Idle,
    /// Countdown running toward the deferred enable.
    Armed,
    /// Countdown running after at least one snooze.
    Snoozed,
    /// The radio was (re-)enabled by the user or the alarm.
    Completed,
    /// The pending enable was dropped.
    Dismissed,
}

impl TimerState {
    /// Armed or snoozed: an alarm and a countdown are live.
    pub fn is_pending(self) -> bool {
        matches!(self, TimerState::Armed | TimerState::Snoozed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TimerState::Idle => "idle",
            TimerState::Armed => "armed",
            TimerState::Snoozed => "snoozed",
            TimerState::Completed => "completed",
            TimerState::Dismissed => "dismissed",
        }
    }
}

impl fmt::Display for TimerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Buttons a notifier may offer next to the countdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationAction {
    EnableNow,
    Snooze,
}

impl NotificationAction {
    /// Action name a client sends back when the button is pressed.
    pub fn name(self) -> &'static str {
        match self {
            NotificationAction::EnableNow => "enable_now",
            NotificationAction::Snooze => "snooze",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        [NotificationAction::EnableNow, NotificationAction::Snooze]
            .into_iter()
            .find(|action| action.name() == name)
    }

    pub fn label(self) -> &'static str {
        match self {
            NotificationAction::EnableNow => "Enable now",
            NotificationAction::Snooze => "Snooze",
        }
    }
}

/// Format whole seconds as `MM:SS`. Minutes are not wrapped into hours.
pub fn format_interval(secs: u64) -> String {
    format!("{:02}:{:02}", secs / 60, secs % 60)
}

/// Notification title: the configured label followed by the remaining time.
/// Sub-second remainders are truncated, like a stopwatch.
pub fn countdown_title(label: &str, remaining: Duration) -> String {
    format!("{} {}", label, format_interval(remaining.as_secs()))
}

/// Largest minute value the `MM:SS` form accepts.
pub const MAX_INTERVAL_MINUTES: u64 = 99;

/// Longest configurable interval, `99:59`.
pub const MAX_INTERVAL_SECS: u64 = MAX_INTERVAL_MINUTES * 60 + 59;

/// Parse an `MM:SS` interval into seconds (minutes 0-99, seconds 0-59).
pub fn parse_interval(s: &str) -> Option<u64> {
    let (minutes, seconds) = s.trim().split_once(':')?;
    let minutes: u64 = minutes.parse().ok()?;
    let seconds: u64 = seconds.parse().ok()?;
    if minutes > MAX_INTERVAL_MINUTES || seconds > 59 {
        return None;
    }
    Some(minutes * 60 + seconds)
}
