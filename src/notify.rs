//! Outbound notification delivery.
//!
//! SMS and push providers live behind a webhook. Waypost posts each
//! notification as JSON and leaves fan-out to whatever sits at the other end.
//! Delivery is best effort: one attempt per notification, no retries, and
//! each attempt is bounded by a timeout so a stalled webhook cannot hold up
//! ingestion.

use std::future::Future;
use std::time::Duration;

use crate::error::WaypostError;
use crate::model::NotificationRequest;

/// Something that can deliver a notification to responders.
pub trait Notifier: Send + Sync {
    /// Deliver one notification.
    ///
    /// # Returns
    ///
    /// `Ok(true)` if it was sent, `Ok(false)` if delivery is disabled.
    fn notify(
        &self,
        notification: &NotificationRequest,
    ) -> impl Future<Output = Result<bool, WaypostError>> + Send;
}

/// Default upper bound on one webhook call, connect to response.
pub const DEFAULT_NOTIFY_TIMEOUT: Duration = Duration::from_secs(5);

/// Posts notifications to a configured webhook URL.
#[derive(Clone)]
pub struct WebhookNotifier {
    client: reqwest::Client,
    webhook_url: Option<String>,
    timeout: Duration,
}

impl Default for WebhookNotifier {
    fn default() -> Self {
        Self::disabled()
    }
}

impl WebhookNotifier {
    /// Create a notifier that posts to `webhook_url`.
    pub fn new(webhook_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            webhook_url: Some(webhook_url.to_string()),
            timeout: DEFAULT_NOTIFY_TIMEOUT,
        }
    }

    /// Create a notifier that accepts notifications and sends nothing.
    pub fn disabled() -> Self {
        Self {
            client: reqwest::Client::new(),
            webhook_url: None,
            timeout: DEFAULT_NOTIFY_TIMEOUT,
        }
    }

    /// Build from an optional URL, as read from configuration.
    pub fn from_url(webhook_url: Option<&str>) -> Self {
        webhook_url.map_or_else(Self::disabled, Self::new)
    }

    /// Bound each webhook call by `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn is_enabled(&self) -> bool {
        self.webhook_url.is_some()
    }
}

impl Notifier for WebhookNotifier {
    async fn notify(&self, notification: &NotificationRequest) -> Result<bool, WaypostError> {
        let Some(url) = &self.webhook_url else {
            return Ok(false);
        };

        let response = self
            .client
            .post(url)
            .timeout(self.timeout)
            .json(notification)
            .send()
            .await
            .map_err(|e| WaypostError::Notify(e.to_string()))?;

        if !response.status().is_success() {
            return Err(WaypostError::Notify(format!(
                "webhook returned {}",
                response.status()
            )));
        }

        Ok(true)
    }
}
