//! Notification Sink
//!
//! Fire-and-forget outbound notifications (shift reminders, ticket
//! assignment/escalation). Delivery is a separate service's problem; the
//! desk only posts a kind plus JSON payload and logs failures. A failed
//! send never rolls back the state transition that triggered it.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;

/// What happened, driving the downstream channel/template choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationKind {
    ShiftSmsReminder,
    ShiftEmailReminder,
    TicketAssigned,
    TicketEscalated,
}

impl NotificationKind {
    /// POST path on the notification service.
    pub fn path(&self) -> &'static str {
        match self {
            NotificationKind::ShiftSmsReminder => "/notify/shift-sms",
            NotificationKind::ShiftEmailReminder => "/notify/shift-email",
            NotificationKind::TicketAssigned => "/notify/ticket-assigned",
            NotificationKind::TicketEscalated => "/notify/ticket-escalated",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub kind: NotificationKind,
    pub payload: serde_json::Value,
}

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("Notification delivery failed: {0}")]
    Delivery(String),
}

#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn send(&self, notification: Notification) -> Result<(), NotifyError>;
}

/// Production sink: POST to the notification service.
pub struct HttpNotificationSink {
    client: reqwest::Client,
    base_url: String,
}

impl HttpNotificationSink {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl NotificationSink for HttpNotificationSink {
    async fn send(&self, notification: Notification) -> Result<(), NotifyError> {
        let url = format!("{}{}", self.base_url, notification.kind.path());
        let resp = self
            .client
            .post(&url)
            .json(&notification.payload)
            .send()
            .await
            .map_err(|e| NotifyError::Delivery(e.to_string()))?;
        resp.error_for_status()
            .map_err(|e| NotifyError::Delivery(e.to_string()))?;
        Ok(())
    }
}

/// Log-only sink, used when no notification service is configured.
pub struct LogSink;

#[async_trait]
impl NotificationSink for LogSink {
    async fn send(&self, notification: Notification) -> Result<(), NotifyError> {
        tracing::info!(
            kind = ?notification.kind,
            payload = %notification.payload,
            "Notification (log only)"
        );
        Ok(())
    }
}

/// Recording sink for tests and offline development.
#[derive(Default)]
pub struct MemorySink {
    sent: Mutex<Vec<Notification>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything sent so far.
    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().map(|v| v.clone()).unwrap_or_default()
    }

    pub fn sent_of_kind(&self, kind: NotificationKind) -> Vec<Notification> {
        self.sent()
            .into_iter()
            .filter(|n| n.kind == kind)
            .collect()
    }
}

#[async_trait]
impl NotificationSink for MemorySink {
    async fn send(&self, notification: Notification) -> Result<(), NotifyError> {
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(notification);
        }
        Ok(())
    }
}
