use anyhow::Result;
use radiotimer_core::ipc::{self, DaemonMsg};
use radiotimer_core::timer::NotificationAction;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc;
use tracing::debug;

/// The single user-visible countdown notification.
pub trait ActionNotifier: Send {
    /// Display the notification, replacing one already shown.
    fn show(&mut self, title: &str, actions: &[NotificationAction]) -> Result<()>;
    fn update_title(&mut self, title: &str) -> Result<()>;
    /// No-op when nothing is shown.
    fn cancel(&mut self) -> Result<()>;
}

#[derive(Default)]
struct HubInner {
    clients: Vec<mpsc::UnboundedSender<String>>,
    current: Option<(String, Vec<NotificationAction>)>,
}

/// Fans notification messages out to every registered notifier client over IPC.
/// Clients that register mid-countdown get the current notification replayed.
#[derive(Clone, Default)]
pub struct NotifierHub {
    inner: Arc<Mutex<HubInner>>,
}

impl NotifierHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, tx: mpsc::UnboundedSender<String>) {
        let mut inner = self.lock();
        if let Some((title, actions)) = &inner.current {
            let show = DaemonMsg::ShowNotification {
                title: title.clone(),
                actions: actions.clone(),
            };
            let _ = tx.send(ipc::encode(&show));
        }
        inner.clients.push(tx);
        debug!(clients = inner.clients.len(), "notifier registered");
    }

    /// Forget clients whose connection has gone away.
    pub fn prune(&self) {
        self.lock().clients.retain(|tx| !tx.is_closed());
    }

    pub fn client_count(&self) -> usize {
        self.lock().clients.len()
    }

    fn broadcast(inner: &mut HubInner, msg: &DaemonMsg) {
        let line = ipc::encode(msg);
        inner.clients.retain(|tx| tx.send(line.clone()).is_ok());
    }

    fn lock(&self) -> MutexGuard<'_, HubInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl ActionNotifier for NotifierHub {
    fn show(&mut self, title: &str, actions: &[NotificationAction]) -> Result<()> {
        let mut inner = self.lock();
        inner.current = Some((title.to_string(), actions.to_vec()));
        let msg = DaemonMsg::ShowNotification {
            title: title.to_string(),
            actions: actions.to_vec(),
        };
        Self::broadcast(&mut inner, &msg);
        Ok(())
    }

    fn update_title(&mut self, title: &str) -> Result<()> {
        let mut inner = self.lock();
        match inner.current.as_mut() {
            Some((current, _)) => *current = title.to_string(),
            None => return Ok(()),
        }
        Self::broadcast(&mut inner, &DaemonMsg::UpdateTitle { title: title.to_string() });
        Ok(())
    }

    fn cancel(&mut self) -> Result<()> {
        let mut inner = self.lock();
        if inner.current.take().is_none() {
            return Ok(());
        }
        Self::broadcast(&mut inner, &DaemonMsg::CancelNotification);
        Ok(())
    }
}
