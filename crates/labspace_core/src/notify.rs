//! Transient notification channel.
//!
//! # Responsibility
//! - Define the toast payload produced by the reconciliation engine.
//! - Provide sinks the presentation layer can drain or subscribe to.
//!
//! # Invariants
//! - The engine is the only producer; sinks never block the producer.

use serde::Serialize;
use std::fmt::{Display, Formatter};
use std::sync::{Mutex, PoisonError};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use uuid::Uuid;

/// Notification tone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Success,
    Error,
    Warning,
    Info,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Error => "error",
            Self::Warning => "warning",
            Self::Info => "info",
        }
    }
}

/// Handle for a pending compensating action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct UndoToken(Uuid);

impl UndoToken {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn parse(value: &str) -> Option<Self> {
        Uuid::parse_str(value.trim()).ok().map(Self)
    }
}

impl Default for UndoToken {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for UndoToken {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Compensating action offered next to a notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationAction {
    pub label: String,
    pub undo: UndoToken,
}

/// One transient notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub title: String,
    pub description: String,
    pub severity: Severity,
    pub duration_ms: u64,
    pub action: Option<NotificationAction>,
}

impl Notification {
    pub fn new(
        severity: Severity,
        title: impl Into<String>,
        description: impl Into<String>,
        duration_ms: u64,
    ) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            severity,
            duration_ms,
            action: None,
        }
    }

    pub fn with_action(mut self, label: impl Into<String>, undo: UndoToken) -> Self {
        self.action = Some(NotificationAction {
            label: label.into(),
            undo,
        });
        self
    }
}

/// Consumer side of the notification channel.
pub trait NotificationSink: Send + Sync {
    fn publish(&self, notification: Notification);
}

/// Buffering sink drained by polling callers.
#[derive(Debug, Default)]
pub struct NotificationQueue {
    items: Mutex<Vec<Notification>>,
}

impl NotificationQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Removes and returns everything published so far.
    pub fn drain(&self) -> Vec<Notification> {
        std::mem::take(&mut *self.items.lock().unwrap_or_else(PoisonError::into_inner))
    }

    /// Copies the buffered notifications without removing them.
    pub fn snapshot(&self) -> Vec<Notification> {
        self.items
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl NotificationSink for NotificationQueue {
    fn publish(&self, notification: Notification) {
        self.items
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(notification);
    }
}

/// Sink forwarding into a tokio channel.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    sender: UnboundedSender<Notification>,
}

impl ChannelSink {
    /// Creates a sink and its receiving half.
    pub fn channel() -> (Self, UnboundedReceiver<Notification>) {
        let (sender, receiver) = unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl NotificationSink for ChannelSink {
    fn publish(&self, notification: Notification) {
        // Receiver gone means nobody renders toasts anymore.
        let _ = self.sender.send(notification);
    }
}
