//! `/dev/rfkill` event codec, reader and switch.
//!
//! The kernel exchanges fixed 8-byte records (`struct rfkill_event` v1):
//!
//! | offset | field | |
//! |---|---|---|
//! | 0 | idx  | u32, native endian |
//! | 4 | type | `RFKILL_TYPE_*` |
//! | 5 | op   | add / del / change / change_all |
//! | 6 | soft | soft block |
//! | 7 | hard | hard block |
//!
//! Newer kernels may append fields; readers opened without the extended
//! size negotiation still receive the v1 record.

use anyhow::{bail, Context, Result};
use radiotimer_core::radio::RadioKind;
use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use std::thread::JoinHandle;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

pub const EVENT_SIZE: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RfkillOp {
    Add,
    Del,
    Change,
    ChangeAll,
}

impl RfkillOp {
    fn from_u8(op: u8) -> Option<Self> {
        match op {
            0 => Some(Self::Add),
            1 => Some(Self::Del),
            2 => Some(Self::Change),
            3 => Some(Self::ChangeAll),
            _ => None,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            Self::Add => 0,
            Self::Del => 1,
            Self::Change => 2,
            Self::ChangeAll => 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RfkillEvent {
    pub idx: u32,
    pub kind: u8,
    pub op: RfkillOp,
    pub soft: bool,
    pub hard: bool,
}

impl RfkillEvent {
    /// None for short records and unknown operations.
    pub fn decode(buf: &[u8]) -> Option<Self> {
        if buf.len() < EVENT_SIZE {
            return None;
        }
        let idx = u32::from_ne_bytes([buf[0], buf[1], buf[2], buf[3]]);
        Some(Self {
            idx,
            kind: buf[4],
            op: RfkillOp::from_u8(buf[5])?,
            soft: buf[6] != 0,
            hard: buf[7] != 0,
        })
    }

    pub fn encode(&self) -> [u8; EVENT_SIZE] {
        let mut buf = [0u8; EVENT_SIZE];
        buf[..4].copy_from_slice(&self.idx.to_ne_bytes());
        buf[4] = self.kind;
        buf[5] = self.op.as_u8();
        buf[6] = self.soft as u8;
        buf[7] = self.hard as u8;
        buf
    }

    pub fn blocked(&self) -> bool {
        self.soft || self.hard
    }

    /// Soft-unblock every device of `kind`.
    pub fn unblock_all(kind: RadioKind) -> Self {
        Self {
            idx: 0,
            kind: kind.rfkill_type(),
            op: RfkillOp::ChangeAll,
            soft: false,
            hard: false,
        }
    }
}

/// Read rfkill records on a dedicated thread until EOF or a read error.
/// The kernel replays one `Add` per existing device right after open.
pub fn spawn_reader(path: &Path, tx: mpsc::UnboundedSender<RfkillEvent>) -> Result<JoinHandle<()>> {
    let mut file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let device = path.display().to_string();
    info!(path = %device, "watching rfkill events");

    let handle = std::thread::Builder::new()
        .name("rfkill-reader".into())
        .spawn(move || {
            let mut buf = [0u8; EVENT_SIZE];
            loop {
                match file.read_exact(&mut buf) {
                    Ok(()) => {}
                    Err(e) if e.kind() == ErrorKind::UnexpectedEof => {
                        debug!(path = %device, "rfkill stream ended");
                        return;
                    }
                    Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                    Err(e) => {
                        warn!(path = %device, error = %e, "rfkill read failed");
                        return;
                    }
                }
                let Some(event) = RfkillEvent::decode(&buf) else {
                    debug!(op = buf[5], "skipping unknown rfkill record");
                    continue;
                };
                if tx.send(event).is_err() {
                    return;
                }
            }
        })
        .context("spawning rfkill reader thread")?;
    Ok(handle)
}

pub fn write_event(path: &Path, event: &RfkillEvent) -> Result<()> {
    let mut file = OpenOptions::new()
        .write(true)
        .open(path)
        .with_context(|| format!("opening {} for writing", path.display()))?;
    let buf = event.encode();
    let written = file
        .write(&buf)
        .with_context(|| format!("writing rfkill event to {}", path.display()))?;
    if written != EVENT_SIZE {
        bail!("short rfkill write: {} of {} bytes", written, EVENT_SIZE);
    }
    Ok(())
}

/// Turns the managed radio back on.
pub trait RadioSwitch: Send {
    fn enable(&mut self) -> Result<()>;
}

pub struct RfkillSwitch {
    device: PathBuf,
    kind: RadioKind,
}

impl RfkillSwitch {
    pub fn new(device: PathBuf, kind: RadioKind) -> Self {
        Self { device, kind }
    }
}

impl RadioSwitch for RfkillSwitch {
    fn enable(&mut self) -> Result<()> {
        let event = RfkillEvent::unblock_all(self.kind);
        info!(kind = ?self.kind, "unblocking radio");

        // The controller runs on the runtime; keep the device write off it.
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let device = self.device.clone();
                handle.spawn_blocking(move || {
                    if let Err(e) = write_event(&device, &event) {
                        warn!(error = %e, "failed to unblock radio");
                    }
                });
                Ok(())
            }
            Err(_) => write_event(&self.device, &event),
        }
    }
}
