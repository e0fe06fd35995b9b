use crate::radio::RadioKind;
use crate::timer::{self, NotificationAction};
use anyhow::{Context, Result};
use serde::{Deserialize, Deserializer, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub notification: NotificationConfig,
    #[serde(default)]
    pub radio: RadioConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    #[serde(default = "GeneralConfig::default_enabled")]
    pub enabled: bool,
    /// Seconds between the radio going off and the automatic re-enable.
    #[serde(
        default = "GeneralConfig::default_interval",
        deserialize_with = "deserialize_interval"
    )]
    pub sec_until_enable: u64,
    /// Seconds added to the deadline per snooze.
    #[serde(
        default = "GeneralConfig::default_interval",
        deserialize_with = "deserialize_interval"
    )]
    pub snooze_sec: u64,
}

impl GeneralConfig {
    fn default_enabled() -> bool { true }
    fn default_interval() -> u64 { 60 }
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            sec_until_enable: 60,
            snooze_sec: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationConfig {
    #[serde(default)]
    pub show_enable_now: bool,
    #[serde(default)]
    pub show_snooze: bool,
    #[serde(default = "NotificationConfig::default_title")]
    pub title: String,
}

impl NotificationConfig {
    fn default_title() -> String { "Wi-Fi on in".into() }
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            show_enable_now: false,
            show_snooze: false,
            title: Self::default_title(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RadioConfig {
    #[serde(default)]
    pub kind: RadioKind,
    #[serde(default = "RadioConfig::default_device")]
    pub device: PathBuf,
}

impl RadioConfig {
    fn default_device() -> PathBuf { PathBuf::from("/dev/rfkill") }
}

impl Default for RadioConfig {
    fn default() -> Self {
        Self {
            kind: RadioKind::default(),
            device: Self::default_device(),
        }
    }
}

/// Per-session snapshot of the settings the timer consults.
/// Taken when a session starts; later edits apply to the next session only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimerConfig {
    pub enabled: bool,
    pub initial_delay: Duration,
    pub snooze: Duration,
    pub actions: Vec<NotificationAction>,
    pub title: String,
}

impl Config {
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("/etc"))
            .join("radiotimer")
    }

    /// `RADIOTIMER_CONFIG` overrides the default location.
    pub fn config_path() -> PathBuf {
        if let Ok(path) = std::env::var("RADIOTIMER_CONFIG") {
            return PathBuf::from(path);
        }
        Self::config_dir().join("config.toml")
    }

    pub fn load() -> Result<Self> {
        let path = Self::config_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        Self::parse(&contents)
    }

    pub fn parse(contents: &str) -> Result<Self> {
        toml::from_str(contents).with_context(|| "parsing config TOML")
    }

    pub fn timer_config(&self) -> TimerConfig {
        let mut actions = Vec::new();
        if self.notification.show_enable_now {
            actions.push(NotificationAction::EnableNow);
        }
        if self.notification.show_snooze {
            actions.push(NotificationAction::Snooze);
        }
        TimerConfig {
            enabled: self.general.enabled,
            initial_delay: Duration::from_secs(self.general.sec_until_enable),
            snooze: Duration::from_secs(self.general.snooze_sec),
            actions,
            title: self.notification.title.clone(),
        }
    }
}

/// Accepts either whole seconds (`90`) or the `"MM:SS"` form (`"01:30"`).
fn deserialize_interval<'de, D>(deserializer: D) -> std::result::Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Interval {
        Seconds(u64),
        Clock(String),
    }

    match Interval::deserialize(deserializer)? {
        Interval::Seconds(secs) if secs > timer::MAX_INTERVAL_SECS => Err(serde::de::Error::custom(
            format!("interval {}s exceeds {}s (99:59)", secs, timer::MAX_INTERVAL_SECS),
        )),
        Interval::Seconds(secs) => Ok(secs),
        Interval::Clock(s) => timer::parse_interval(&s).ok_or_else(|| {
            serde::de::Error::custom(format!("invalid interval '{}', expected MM:SS", s))
        }),
    }
}

pub fn socket_path() -> PathBuf {
    // RADIOTIMER_SOCK env var overrides for testing.
    // Default: /run/radiotimer/radiotimer.sock (RuntimeDirectory=radiotimer in systemd).
    if let Ok(path) = std::env::var("RADIOTIMER_SOCK") {
        return PathBuf::from(path);
    }
    PathBuf::from("/run/radiotimer/radiotimer.sock")
}

/// Where the pending deadline is kept across daemon restarts.
pub fn state_path() -> PathBuf {
    if let Ok(path) = std::env::var("RADIOTIMER_STATE") {
        return PathBuf::from(path);
    }
    dirs::state_dir()
        .unwrap_or_else(|| PathBuf::from("/var/lib"))
        .join("radiotimer")
        .join("session.json")
}
