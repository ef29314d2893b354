//! Transient user-facing notifications

use tokio::sync::broadcast;
use tracing::{error, info};

const CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    Info,
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub kind: NotificationKind,
    pub message: String,
}

/// Fan-out of notifications to every interested front end
///
/// Publishing never fails: with no subscriber the message is only logged.
#[derive(Debug, Clone)]
pub struct Notifier {
    sender: broadcast::Sender<Notification>,
}

impl Notifier {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.sender.subscribe()
    }

    pub fn info(&self, message: impl Into<String>) {
        self.publish(NotificationKind::Info, message.into());
    }

    pub fn success(&self, message: impl Into<String>) {
        self.publish(NotificationKind::Success, message.into());
    }

    pub fn error(&self, message: impl Into<String>) {
        self.publish(NotificationKind::Error, message.into());
    }

    fn publish(&self, kind: NotificationKind, message: String) {
        match kind {
            NotificationKind::Error => error!("{}", message),
            _ => info!("{}", message),
        }
        let _ = self.sender.send(Notification { kind, message });
    }
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new()
    }
}
