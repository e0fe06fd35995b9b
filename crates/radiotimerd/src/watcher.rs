use crate::controller::Command;
use crate::rfkill::{RfkillEvent, RfkillOp};
use radiotimer_core::radio::{RadioKind, RadioState};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// Registration of interest in radio state changes, held for the
/// lifetime of one countdown.
pub trait RadioSubscription: Send {
    fn subscribe(&mut self);
    fn unsubscribe(&mut self);
}

/// Shared flag between the controller (which toggles it) and the watcher
/// (which drops enabling/enabled observations while it is clear).
#[derive(Debug, Clone, Default)]
pub struct Subscription(Arc<AtomicBool>);

impl Subscription {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_active(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

impl RadioSubscription for Subscription {
    fn subscribe(&mut self) {
        self.0.store(true, Ordering::Release);
    }

    fn unsubscribe(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Turns observed radio states into controller commands.
///
/// The radio counts as enabled while any device of the watched kind is
/// unblocked. Only edges of that aggregate are reported, so the kernel
/// repeating a state does not re-arm a running countdown.
pub struct RadioStateWatcher {
    kind: RadioKind,
    subscription: Subscription,
    blocked: HashMap<u32, bool>,
}

impl RadioStateWatcher {
    pub fn new(kind: RadioKind, subscription: Subscription) -> Self {
        Self {
            kind,
            subscription,
            blocked: HashMap::new(),
        }
    }

    /// `Disabled` always arms (the controller applies the feature gate).
    /// `Enabling`/`Enabled` only matter while a countdown holds the subscription.
    pub fn route(&self, state: RadioState) -> Option<Command> {
        match state {
            RadioState::Disabled => Some(Command::Arm { delay: None }),
            RadioState::Enabling | RadioState::Enabled if self.subscription.is_active() => {
                Some(Command::ExternalStateChanged(state))
            }
            RadioState::Enabling | RadioState::Enabled => {
                debug!(%state, "radio state ignored, no countdown subscribed");
                None
            }
            RadioState::Disabling | RadioState::Unknown => None,
        }
    }

    /// Fold an rfkill record into the device table. Returns the new radio
    /// state when the aggregate flipped; `Add`/`Del` only seed the table.
    pub fn observe(&mut self, event: &RfkillEvent) -> Option<RadioState> {
        if !self.kind.matches(event.kind) {
            return None;
        }
        let before = self.radio_on();
        match event.op {
            RfkillOp::Add => {
                self.blocked.insert(event.idx, event.blocked());
                return None;
            }
            RfkillOp::Del => {
                self.blocked.remove(&event.idx);
                return None;
            }
            RfkillOp::Change => {
                self.blocked.insert(event.idx, event.blocked());
            }
            RfkillOp::ChangeAll => {
                for blocked in self.blocked.values_mut() {
                    *blocked = event.blocked();
                }
            }
        }
        let after = self.radio_on()?;
        if before == Some(after) {
            return None;
        }
        Some(if after { RadioState::Enabled } else { RadioState::Disabled })
    }

    pub fn on_event(&mut self, event: &RfkillEvent) -> Option<Command> {
        let state = self.observe(event)?;
        info!(kind = ?self.kind, %state, "radio state changed");
        self.route(state)
    }

    /// None until a device of the watched kind is known.
    fn radio_on(&self) -> Option<bool> {
        if self.blocked.is_empty() {
            return None;
        }
        Some(self.blocked.values().any(|blocked| !blocked))
    }
}
