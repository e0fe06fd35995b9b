use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use radiotimer_core::config;
use radiotimer_core::ipc::{self, ClientMsg, DaemonMsg};
use radiotimer_core::radio::RadioState;
use radiotimer_core::timer::{self, NotificationAction, TimerState};
use std::io::{BufRead, BufReader, Write};
use std::os::unix::net::UnixStream;

#[derive(Parser)]
#[command(name = "radiotimerctl", about = "Control the radiotimerd daemon")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show the timer state and time left
    Status,
    /// Turn the radio back on now
    EnableNow,
    /// Cancel the pending re-enable
    Dismiss,
    /// Push the re-enable out by the snooze interval
    Snooze,
    /// Press a notification action by name
    Action {
        /// enable_now, snooze or dismiss
        name: String,
    },
    /// Report a radio state observed outside rfkill
    Radio {
        /// disabled, disabling, enabling or enabled
        state: RadioState,
    },
    /// Act as a notifier and print every countdown update
    Watch,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let socket_path = config::socket_path();
    let stream = UnixStream::connect(&socket_path).with_context(|| {
        format!(
            "connecting to radiotimerd at {}\nIs the daemon running?",
            socket_path.display()
        )
    })?;

    let mut writer = stream.try_clone().context("cloning stream")?;
    let reader = BufReader::new(stream);

    let msg: ClientMsg = match cli.command {
        Command::Status => ClientMsg::GetStatus,
        Command::EnableNow => ClientMsg::EnableNow,
        Command::Dismiss => ClientMsg::Dismiss,
        Command::Snooze => ClientMsg::Snooze,
        Command::Action { name } => ClientMsg::Action { action: name },
        Command::Radio { state } => ClientMsg::RadioState { state },
        Command::Watch => ClientMsg::RegisterNotifier,
    };
    let watching = msg == ClientMsg::RegisterNotifier;

    let line = ipc::encode(&msg);
    writer
        .write_all(line.as_bytes())
        .context("sending command")?;

    if watching {
        return watch(reader);
    }

    // Read response
    for line in reader.lines() {
        let line = line.context("reading response")?;
        if let Some(resp) = ipc::decode_daemon(&line) {
            match resp {
                DaemonMsg::Status {
                    state,
                    remaining_secs,
                    version,
                } => {
                    println!("radiotimerd v{}", version);
                    print!("{}", render_status(state, remaining_secs));
                }
                DaemonMsg::Ack { ok, message } => {
                    if ok {
                        println!("{}", message);
                    } else {
                        eprintln!("error: {}", message);
                        std::process::exit(1);
                    }
                }
                _ => {}
            }
            break;
        }
    }

    Ok(())
}

/// Print notification traffic until the daemon goes away.
fn watch(reader: BufReader<UnixStream>) -> Result<()> {
    for line in reader.lines() {
        let line = line.context("reading notification")?;
        let Some(msg) = ipc::decode_daemon(&line) else {
            continue;
        };
        match msg {
            DaemonMsg::ShowNotification { title, actions } => {
                println!("{}{}", title, render_actions(&actions));
            }
            DaemonMsg::UpdateTitle { title } => println!("{}", title),
            DaemonMsg::CancelNotification => println!("(notification cleared)"),
            DaemonMsg::Ack { ok: false, message } => bail!("daemon refused: {}", message),
            _ => {}
        }
    }
    eprintln!("daemon disconnected");
    Ok(())
}

/// Remaining time is only meaningful while an enable is pending.
fn render_status(state: TimerState, remaining_secs: Option<u64>) -> String {
    let mut out = format!("  state:     {}\n", state);
    if let (true, Some(secs)) = (state.is_pending(), remaining_secs) {
        out.push_str(&format!("  remaining: {}\n", timer::format_interval(secs)));
    }
    out
}

/// Each button with the name `radiotimerctl action` accepts for it.
fn render_actions(actions: &[NotificationAction]) -> String {
    if actions.is_empty() {
        return String::new();
    }
    let labels: Vec<String> = actions
        .iter()
        .map(|a| format!("[{}: {}]", a.label(), a.name()))
        .collect();
    format!("  {}", labels.join(" "))
}
