use radiotimer_core::config::{Config, TimerConfig};
use std::io::ErrorKind;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

pub const RELOAD_PERIOD: Duration = Duration::from_secs(2);

/// Where a new session's settings come from. Must not block.
pub trait ConfigSource: Send {
    fn snapshot(&mut self) -> TimerConfig;
}

/// Latest good config, kept current by a background reload task.
pub struct ConfigFile {
    current: watch::Receiver<Config>,
}

impl ConfigSource for ConfigFile {
    fn snapshot(&mut self) -> TimerConfig {
        self.current.borrow_and_update().timer_config()
    }
}

#[derive(Debug, PartialEq)]
enum FileState {
    Missing,
    Unreadable(ErrorKind),
    Contents(String),
}

/// Poll `path` every [`RELOAD_PERIOD`] and publish each good version.
/// A file that becomes unreadable or invalid leaves the last good config in
/// effect; a removed file means defaults.
pub fn watch_config_file(path: PathBuf, initial: Config) -> (ConfigFile, JoinHandle<()>) {
    watch_config_file_every(path, initial, RELOAD_PERIOD)
}

fn watch_config_file_every(
    path: PathBuf,
    initial: Config,
    period: Duration,
) -> (ConfigFile, JoinHandle<()>) {
    let (tx, rx) = watch::channel(initial);
    let task = tokio::spawn(reload_loop(path, tx, period));
    (ConfigFile { current: rx }, task)
}

async fn reload_loop(path: PathBuf, tx: watch::Sender<Config>, period: Duration) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut seen: Option<FileState> = None;

    loop {
        interval.tick().await;
        if tx.is_closed() {
            return;
        }

        let state = match tokio::fs::read_to_string(&path).await {
            Ok(contents) => FileState::Contents(contents),
            Err(e) if e.kind() == ErrorKind::NotFound => FileState::Missing,
            Err(e) => FileState::Unreadable(e.kind()),
        };
        if seen.as_ref() == Some(&state) {
            continue;
        }

        match &state {
            FileState::Missing => {
                debug!(path = %path.display(), "config file absent, using defaults");
                tx.send_replace(Config::default());
            }
            FileState::Unreadable(kind) => {
                warn!(path = %path.display(), error = ?kind, "config unreadable, keeping previous config");
            }
            FileState::Contents(contents) => match Config::parse(contents) {
                Ok(config) => {
                    if seen.is_some() {
                        info!(path = %path.display(), "config reloaded");
                    }
                    tx.send_replace(config);
                }
                Err(e) => {
                    warn!(path = %path.display(), error = ?e, "keeping previous config");
                }
            },
        }
        seen = Some(state);
    }
}
