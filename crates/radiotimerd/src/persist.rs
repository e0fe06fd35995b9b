use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::mpsc as std_mpsc;
use std::thread::JoinHandle;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};

const STATE_VERSION: u32 = 1;

/// Durable record of the pending deadline, so a restart does not lose the
/// deferred re-enable.
pub trait SessionStore: Send {
    /// Record that the deferred action is due `remaining` from now.
    fn save(&mut self, remaining: Duration) -> Result<()>;
    /// Forget the pending deadline. Succeeds when nothing is stored.
    fn clear(&mut self) -> Result<()>;
}

#[derive(Debug, Serialize, Deserialize)]
struct PendingSession {
    version: u32,
    /// Wall clock, since the boot clock restarts with the machine.
    trigger_at_unix_ms: u64,
}

#[derive(Debug)]
enum Op {
    Save { trigger_at_unix_ms: u64 },
    Clear,
}

impl Op {
    fn apply(&self, path: &Path) -> Result<()> {
        match *self {
            Op::Save { trigger_at_unix_ms } => write_pending(path, trigger_at_unix_ms),
            Op::Clear => remove_pending(path),
        }
    }
}

/// Writes happen inline until [`JsonSessionStore::spawn_writer`] moves them
/// onto a dedicated thread. Queued writes are applied in order and flushed
/// when the store is dropped.
pub struct JsonSessionStore {
    path: PathBuf,
    queue: Option<std_mpsc::Sender<Op>>,
    writer: Option<JoinHandle<()>>,
}

impl JsonSessionStore {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            queue: None,
            writer: None,
        }
    }

    pub fn spawn_writer(mut self) -> Result<Self> {
        let (tx, rx) = std_mpsc::channel::<Op>();
        let path = self.path.clone();
        let writer = std::thread::Builder::new()
            .name("session-store".into())
            .spawn(move || {
                for op in rx {
                    if let Err(e) = op.apply(&path) {
                        warn!(?op, error = ?e, "session state write failed");
                    }
                }
            })
            .context("spawning session store thread")?;
        self.queue = Some(tx);
        self.writer = Some(writer);
        Ok(self)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Consume a deadline left behind by a previous run. Returns the time
    /// still to wait, zero when it has already passed.
    pub fn take_pending(&mut self) -> Result<Option<Duration>> {
        let bytes = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(e).with_context(|| format!("reading {}", self.path.display()));
            }
        };
        remove_pending(&self.path)?;

        let pending: PendingSession = serde_json::from_slice(&bytes)
            .with_context(|| format!("parsing {}", self.path.display()))?;
        if pending.version != STATE_VERSION {
            info!(version = pending.version, "ignoring session state from another version");
            return Ok(None);
        }
        let remaining = pending.trigger_at_unix_ms.saturating_sub(unix_ms(SystemTime::now()));
        Ok(Some(Duration::from_millis(remaining)))
    }

    fn submit(&mut self, op: Op) -> Result<()> {
        match &self.queue {
            Some(queue) => match queue.send(op) {
                Ok(()) => Ok(()),
                Err(std_mpsc::SendError(op)) => op.apply(&self.path),
            },
            None => op.apply(&self.path),
        }
    }
}

impl SessionStore for JsonSessionStore {
    fn save(&mut self, remaining: Duration) -> Result<()> {
        let remaining_ms = u64::try_from(remaining.as_millis()).unwrap_or(u64::MAX);
        let trigger_at_unix_ms = unix_ms(SystemTime::now()).saturating_add(remaining_ms);
        self.submit(Op::Save { trigger_at_unix_ms })
    }

    fn clear(&mut self) -> Result<()> {
        self.submit(Op::Clear)
    }
}

impl Drop for JsonSessionStore {
    fn drop(&mut self) {
        self.queue.take();
        if let Some(writer) = self.writer.take() {
            let _ = writer.join();
        }
    }
}

fn write_pending(path: &Path, trigger_at_unix_ms: u64) -> Result<()> {
    let pending = PendingSession {
        version: STATE_VERSION,
        trigger_at_unix_ms,
    };
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
    }

    let tmp = path.with_extension("json.tmp");
    let json = serde_json::to_vec_pretty(&pending).context("serializing session state")?;
    std::fs::write(&tmp, json).with_context(|| format!("writing {}", tmp.display()))?;
    std::fs::rename(&tmp, path).with_context(|| format!("replacing {}", path.display()))?;
    debug!(path = %path.display(), at_ms = trigger_at_unix_ms, "pending deadline saved");
    Ok(())
}

fn remove_pending(path: &Path) -> Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e).with_context(|| format!("removing {}", path.display())),
    }
}

fn unix_ms(at: SystemTime) -> u64 {
    at.duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}
