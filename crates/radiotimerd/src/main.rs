mod alarm;
mod clock;
mod controller;
mod notifier;
mod persist;
mod rfkill;
mod settings;
mod ticker;
mod watcher;

use alarm::TimerFdAlarm;
use anyhow::{Context, Result};
use clock::BootClock;
use controller::{Collaborators, Command, Snapshot, TimerController};
use notifier::NotifierHub;
use persist::JsonSessionStore;
use radiotimer_core::config::{self, Config};
use radiotimer_core::ipc::{self, ClientMsg, DaemonMsg};
use rfkill::RfkillSwitch;
use std::sync::Arc;
use ticker::IntervalTicker;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::{mpsc, watch, Mutex};
use tracing::{debug, error, info, warn};
use watcher::{RadioStateWatcher, Subscription};

/// Shared state between the controller loop, the rfkill task and IPC handlers.
struct Shared {
    commands: mpsc::UnboundedSender<Command>,
    status: watch::Receiver<Snapshot>,
    notifiers: NotifierHub,
    watcher: RadioStateWatcher,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("radiotimerd=info".parse()?),
        )
        .init();

    info!("radiotimerd starting");

    let config_path = Config::config_path();
    let config = Config::load().context("loading config")?;
    info!(
        path = %config_path.display(),
        enabled = config.general.enabled,
        delay_secs = config.general.sec_until_enable,
        snooze_secs = config.general.snooze_sec,
        kind = ?config.radio.kind,
        "config loaded"
    );

    // Every input reaches the controller through this channel.
    let (command_tx, mut command_rx) = mpsc::unbounded_channel::<Command>();

    let notifiers = NotifierHub::new();
    let subscription = Subscription::new();

    let mut store = JsonSessionStore::new(config::state_path());
    let restored = match store.take_pending() {
        Ok(pending) => pending,
        Err(e) => {
            warn!(path = %store.path().display(), error = ?e, "discarding unreadable session state");
            None
        }
    };

    let store = store.spawn_writer()?;
    let (settings, _reload) = settings::watch_config_file(config_path, config.clone());

    let alarm = TimerFdAlarm::new(command_tx.clone()).context("creating wake alarm")?;
    if !alarm.wakes_host() {
        warn!("running without CAP_WAKE_ALARM, a suspended host will not be woken for the re-enable");
    }

    let mut controller = TimerController::new(Collaborators {
        clock: Box::new(BootClock::new()?),
        alarm: Box::new(alarm),
        ticker: Box::new(IntervalTicker::new(command_tx.clone())),
        notifier: Box::new(notifiers.clone()),
        watcher: Box::new(subscription.clone()),
        radio: Box::new(RfkillSwitch::new(config.radio.device.clone(), config.radio.kind)),
        settings: Box::new(settings),
        store: Box::new(store),
    });

    let (status_tx, status_rx) = watch::channel(controller.snapshot());

    let shared = Arc::new(Mutex::new(Shared {
        commands: command_tx.clone(),
        status: status_rx,
        notifiers,
        watcher: RadioStateWatcher::new(config.radio.kind, subscription),
    }));

    // rfkill events → watcher → controller
    let (rfkill_tx, mut rfkill_rx) = mpsc::unbounded_channel();
    match rfkill::spawn_reader(&config.radio.device, rfkill_tx) {
        Ok(_reader) => {
            let shared = Arc::clone(&shared);
            tokio::spawn(async move {
                while let Some(event) = rfkill_rx.recv().await {
                    let mut shared = shared.lock().await;
                    if let Some(command) = shared.watcher.on_event(&event) {
                        let _ = shared.commands.send(command);
                    }
                }
                warn!("rfkill event stream closed");
            });
        }
        Err(e) => {
            warn!(error = ?e, "rfkill unavailable, relying on radio_state messages");
        }
    }

    // Start IPC listener
    let socket_path = config::socket_path();
    // Remove stale socket
    let _ = std::fs::remove_file(&socket_path);
    if let Some(parent) = socket_path.parent() {
        std::fs::create_dir_all(parent).ok();
    }
    let listener = UnixListener::bind(&socket_path)
        .with_context(|| format!("binding socket {}", socket_path.display()))?;
    // Notifier clients run in the user's session
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&socket_path, std::fs::Permissions::from_mode(0o666)).ok();
    }
    info!(path = %socket_path.display(), "IPC socket listening");

    let shared_ipc = Arc::clone(&shared);
    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((stream, _)) => {
                    let shared = Arc::clone(&shared_ipc);
                    tokio::spawn(handle_ipc_client(stream, shared));
                }
                Err(e) => {
                    warn!(error = %e, "IPC accept error");
                }
            }
        }
    });

    if let Some(remaining) = restored {
        info!(remaining_secs = remaining.as_secs(), "resuming pending re-enable from previous run");
        let _ = command_tx.send(Command::Arm { delay: Some(remaining) });
    }

    let mut sigterm = signal(SignalKind::terminate()).context("installing SIGTERM handler")?;

    loop {
        tokio::select! {
            Some(command) = command_rx.recv() => {
                let before = controller.state();
                let after = controller.handle(command);
                if before != after {
                    debug!(%before, %after, trigger_at = ?controller.trigger_at(), "timer state changed");
                }
                status_tx.send_replace(controller.snapshot());
            }
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted");
                break;
            }
            _ = sigterm.recv() => {
                info!("terminated");
                break;
            }
            else => {
                error!("command channel closed");
                break;
            }
        }
    }

    info!("radiotimerd shutting down");
    let _ = std::fs::remove_file(&socket_path);
    Ok(())
}

fn ack(ok: bool, message: impl Into<String>) -> String {
    ipc::encode(&DaemonMsg::Ack {
        ok,
        message: message.into(),
    })
}

async fn handle_ipc_client(stream: UnixStream, shared: Arc<Mutex<Shared>>) {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    // Channel for sending messages back to this client
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();

    // Writer task
    let write_handle = tokio::spawn(async move {
        while let Some(line) = rx.recv().await {
            if writer.write_all(line.as_bytes()).await.is_err() {
                break;
            }
        }
    });

    let mut is_notifier = false;

    while let Ok(Some(line)) = lines.next_line().await {
        let msg = match ipc::decode_client(&line) {
            None => continue,
            Some(Ok(msg)) => msg,
            Some(Err(e)) => {
                debug!(error = %e, "rejected IPC line");
                let _ = tx.send(ack(false, format!("invalid command: {}", e)));
                continue;
            }
        };

        let shared = shared.lock().await;

        let command = match msg {
            ClientMsg::RegisterNotifier => {
                is_notifier = true;
                shared.notifiers.register(tx.clone());
                info!(clients = shared.notifiers.client_count(), "notifier registered");
                let _ = tx.send(ack(true, "notifier registered"));
                continue;
            }
            ClientMsg::GetStatus => {
                let snapshot = shared.status.borrow().clone();
                let status = DaemonMsg::Status {
                    state: snapshot.state,
                    remaining_secs: snapshot.remaining.map(|d| d.as_secs()),
                    version: env!("CARGO_PKG_VERSION").to_string(),
                };
                let _ = tx.send(ipc::encode(&status));
                continue;
            }
            ClientMsg::RadioState { state } => {
                info!(%state, "radio state reported via IPC");
                match shared.watcher.route(state) {
                    Some(command) => command,
                    None => {
                        let _ = tx.send(ack(true, format!("{} ignored", state)));
                        continue;
                    }
                }
            }
            ClientMsg::EnableNow => Command::EnableNow,
            ClientMsg::Dismiss => Command::Dismiss,
            ClientMsg::Snooze => Command::Snooze { by: None },
            ClientMsg::Action { action } => match Command::from_action(&action) {
                Ok(command) => command,
                Err(e) => {
                    warn!(error = %e, "rejected notification action");
                    let _ = tx.send(ack(false, e.to_string()));
                    continue;
                }
            },
        };

        debug!(?command, "queued from IPC");
        let reply = match shared.commands.send(command) {
            Ok(()) => ack(true, "queued"),
            Err(_) => ack(false, "daemon shutting down"),
        };
        let _ = tx.send(reply);
    }

    write_handle.abort();
    // The receiver has to be gone before prune can see the sender as closed.
    let _ = write_handle.await;

    if is_notifier {
        let shared = shared.lock().await;
        shared.notifiers.prune();
        debug!(clients = shared.notifiers.client_count(), "notifier disconnected");
    }
}
