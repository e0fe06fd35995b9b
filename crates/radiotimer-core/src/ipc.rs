use crate::radio::RadioState;
use crate::timer::{NotificationAction, TimerState};
use serde::{Deserialize, Serialize};

/// Messages from daemon to notifiers/clients (JSON-lines over Unix socket).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum DaemonMsg {
    /// Display (or replace) the countdown notification.
    #[serde(rename = "show_notification")]
    ShowNotification {
        title: String,
        actions: Vec<NotificationAction>,
    },
    /// Change the title of the displayed notification.
    #[serde(rename = "update_title")]
    UpdateTitle { title: String },
    /// Remove the notification.
    #[serde(rename = "cancel_notification")]
    CancelNotification,
    /// Status response.
    #[serde(rename = "status")]
    Status {
        state: TimerState,
        /// Seconds until the deferred enable, while one is pending.
        remaining_secs: Option<u64>,
        version: String,
    },
    /// Acknowledgement for commands.
    #[serde(rename = "ack")]
    Ack { ok: bool, message: String },
}

/// Messages from notifiers/clients to daemon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientMsg {
    /// Re-enable the radio right away.
    #[serde(rename = "enable_now")]
    EnableNow,
    /// Drop the pending enable.
    #[serde(rename = "dismiss")]
    Dismiss,
    /// Push the deadline out by the configured snooze interval.
    #[serde(rename = "snooze")]
    Snooze,
    /// A notification button, by action name (`enable_now`, `snooze`, `dismiss`).
    #[serde(rename = "action")]
    Action { action: String },
    /// Radio state observed by an external watcher.
    #[serde(rename = "radio_state")]
    RadioState { state: RadioState },
    /// Request current status.
    #[serde(rename = "get_status")]
    GetStatus,
    /// Notifier client announcing itself (for routing notification updates).
    #[serde(rename = "register_notifier")]
    RegisterNotifier,
}

/// Serialize a message as a JSON line (with trailing newline).
pub fn encode(msg: &impl Serialize) -> String {
    // Both message enums only hold strings, numbers and unit enums.
    let mut s = serde_json::to_string(msg).unwrap_or_else(|_| String::from("{}"));
    s.push('\n');
    s
}

/// Deserialize a JSON line. Returns None on empty/whitespace input.
pub fn decode_daemon(line: &str) -> Option<DaemonMsg> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }
    serde_json::from_str(trimmed).ok()
}

/// Like [`decode_daemon`], but keeps the reason a non-empty line was rejected.
pub fn decode_client(line: &str) -> Option<Result<ClientMsg, String>> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(serde_json::from_str(trimmed).map_err(|e| e.to_string()))
}
