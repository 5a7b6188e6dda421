//! Notification sink port and adapters.
//!
//! Notifications are a best-effort side channel: the coordinator logs a
//! failed delivery and moves on.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use common::{BookingId, UserId};
use ledger::Booking;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationKind {
    BookingConfirmed,
    BookingCancelled,
}

/// A message for one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub user_id: UserId,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub booking_id: Option<BookingId>,
}

impl Notification {
    pub fn booking_confirmed(booking: &Booking) -> Self {
        Self {
            user_id: booking.customer_id,
            kind: NotificationKind::BookingConfirmed,
            title: "Booking Confirmed".to_string(),
            message: format!(
                "Your booking at salon {} has been confirmed",
                booking.salon_id
            ),
            booking_id: Some(booking.id),
        }
    }

    pub fn booking_cancelled(booking: &Booking) -> Self {
        Self {
            user_id: booking.customer_id,
            kind: NotificationKind::BookingCancelled,
            title: "Booking Cancelled".to_string(),
            message: format!("Your booking #{} has been cancelled", booking.id),
            booking_id: Some(booking.id),
        }
    }
}

#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("Notification delivery failed: {0}")]
    Delivery(String),

    #[error("Notification service returned status {0}")]
    Status(u16),
}

/// Delivers notifications to users.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(&self, notification: Notification) -> Result<(), NotificationError>;
}

/// Records notifications in memory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryNotificationSink {
    sent: Arc<Mutex<Vec<Notification>>>,
    fail_on_notify: Arc<AtomicBool>,
}

impl InMemoryNotificationSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes subsequent deliveries fail.
    pub fn set_fail_on_notify(&self, fail: bool) {
        self.fail_on_notify.store(fail, Ordering::SeqCst);
    }

    /// Returns every notification delivered so far.
    pub async fn sent(&self) -> Vec<Notification> {
        self.sent.lock().await.clone()
    }
}

#[async_trait]
impl NotificationSink for InMemoryNotificationSink {
    async fn notify(&self, notification: Notification) -> Result<(), NotificationError> {
        if self.fail_on_notify.load(Ordering::SeqCst) {
            return Err(NotificationError::Delivery("sink unavailable".to_string()));
        }
        self.sent.lock().await.push(notification);
        Ok(())
    }
}

/// Writes notifications to the log instead of delivering them.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotificationSink;

#[async_trait]
impl NotificationSink for LogNotificationSink {
    async fn notify(&self, notification: Notification) -> Result<(), NotificationError> {
        info!(
            user_id = %notification.user_id,
            kind = ?notification.kind,
            title = %notification.title,
            "notification"
        );
        Ok(())
    }
}

/// Posts notifications to the notification service.
#[derive(Debug, Clone)]
pub struct HttpNotificationSink {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpNotificationSink {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, NotificationError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| NotificationError::Delivery(format!("failed to build HTTP client: {e}")))?;

        let base_url = base_url.into();
        Ok(Self {
            client,
            endpoint: format!("{}/api/v1/notifications", base_url.trim_end_matches('/')),
        })
    }
}

#[async_trait]
impl NotificationSink for HttpNotificationSink {
    #[tracing::instrument(skip(self, notification), fields(user_id = %notification.user_id))]
    async fn notify(&self, notification: Notification) -> Result<(), NotificationError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&notification)
            .send()
            .await
            .map_err(|e| NotificationError::Delivery(e.to_string()))?;

        let status = response.status();
        debug!(status = %status, "notification response received");
        if !status.is_success() {
            return Err(NotificationError::Status(status.as_u16()));
        }
        Ok(())
    }
}
