use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Observed state of the monitored radio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RadioState {
    Disabling,
    Disabled,
    Enabling,
    Enabled,
    Unknown,
}

impl RadioState {
    /// Whether the radio is coming (or already is) back on.
    pub fn is_enabling(self) -> bool {
        matches!(self, RadioState::Enabling | RadioState::Enabled)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RadioState::Disabling => "disabling",
            RadioState::Disabled => "disabled",
            RadioState::Enabling => "enabling",
            RadioState::Enabled => "enabled",
            RadioState::Unknown => "unknown",
        }
    }
}

impl fmt::Display for RadioState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RadioState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "disabling" => Ok(RadioState::Disabling),
            "disabled" | "off" => Ok(RadioState::Disabled),
            "enabling" => Ok(RadioState::Enabling),
            "enabled" | "on" => Ok(RadioState::Enabled),
            "unknown" => Ok(RadioState::Unknown),
            other => Err(format!("unknown radio state '{}'", other)),
        }
    }
}

/// Radio technology as numbered by the kernel rfkill subsystem.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RadioKind {
    All,
    #[default]
    Wlan,
    Bluetooth,
    Uwb,
    Wimax,
    Wwan,
    Gps,
    Fm,
    Nfc,
}

impl RadioKind {
    /// `RFKILL_TYPE_*` value from `<linux/rfkill.h>`.
    pub fn rfkill_type(self) -> u8 {
        match self {
            RadioKind::All => 0,
            RadioKind::Wlan => 1,
            RadioKind::Bluetooth => 2,
            RadioKind::Uwb => 3,
            RadioKind::Wimax => 4,
            RadioKind::Wwan => 5,
            RadioKind::Gps => 6,
            RadioKind::Fm => 7,
            RadioKind::Nfc => 8,
        }
    }

    /// Whether an rfkill device of the given type belongs to this kind.
    pub fn matches(self, rfkill_type: u8) -> bool {
        self == RadioKind::All || self.rfkill_type() == rfkill_type
    }
}
