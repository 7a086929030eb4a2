//! User-facing notification surface
//!
//! The orchestrator reports rating changes, preference errors and teleport
//! outcomes as `Notification`s. Presentation and wording belong to whoever
//! subscribes.

use crate::types::MaturityRating;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use tokio::sync::broadcast;

/// Something the user should be told about
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "type")]
pub enum Notification {
    /// The preference was raised as part of a teleport
    #[serde(rename_all = "camelCase")]
    PreferredMaturityChanged { rating: MaturityRating },

    /// The server kept a different rating than the one requested
    #[serde(rename_all = "camelCase")]
    MaturityChangeError {
        preferred: MaturityRating,
        actual: MaturityRating,
    },

    /// The preference could not be sent at all
    #[serde(rename_all = "camelCase")]
    PreferenceUnavailable { reason: String },

    #[serde(rename_all = "camelCase")]
    TeleportFailed { restartable: bool },

    #[serde(rename_all = "camelCase")]
    TeleportCanceled { user_initiated: bool },
}

/// A notification with the time it was raised
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationEvent {
    pub notification: Notification,
    pub raised_at: DateTime<Utc>,
}

impl NotificationEvent {
    pub fn now(notification: Notification) -> Self {
        Self {
            notification,
            raised_at: Utc::now(),
        }
    }
}

/// Sink for notifications
pub trait Notifier: Send + Sync {
    fn notify(&self, notification: Notification);
}

/// Fans notifications out to any number of subscribers
pub struct BroadcastNotifier {
    tx: broadcast::Sender<NotificationEvent>,
}

impl BroadcastNotifier {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Subscribe to notifications raised from now on
    pub fn subscribe(&self) -> broadcast::Receiver<NotificationEvent> {
        self.tx.subscribe()
    }
}

impl Default for BroadcastNotifier {
    fn default() -> Self {
        Self::new(64)
    }
}

impl Notifier for BroadcastNotifier {
    fn notify(&self, notification: Notification) {
        tracing::debug!(notification = ?notification, "Notification raised");
        // No subscribers is not an error
        let _ = self.tx.send(NotificationEvent::now(notification));
    }
}

/// Collects notifications in memory for tests
#[derive(Default)]
pub struct MemoryNotifier {
    events: Mutex<Vec<Notification>>,
}

impl MemoryNotifier {
    /// Notifications raised so far, oldest first
    pub fn notifications(&self) -> Vec<Notification> {
        self.events.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Drain collected notifications
    pub fn take(&self) -> Vec<Notification> {
        std::mem::take(&mut *self.events.lock().unwrap_or_else(|e| e.into_inner()))
    }
}

impl Notifier for MemoryNotifier {
    fn notify(&self, notification: Notification) {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(notification);
    }
}
