//! Overhead alert dispatch.
//!
//! Alerts always go to the log; a webhook URL adds a fire-and-forget HTTP
//! POST of `{"text": ...}` per alert.

use std::sync::Arc;

/// Receives one human-readable line per overhead alert.
pub trait Notifier: Send + Sync {
    fn notify(&self, message: &str);
}

/// Writes alerts to the log at `info`.
#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, message: &str) {
        tracing::info!(target: "overhead::alert", "{message}");
    }
}

/// Posts alerts to a webhook URL as JSON.
#[derive(Clone)]
pub struct WebhookNotifier {
    url: String,
    client: reqwest::Client,
}

impl WebhookNotifier {
    pub fn new(url: &str) -> Self {
        WebhookNotifier {
            url: url.to_string(),
            client: reqwest::Client::new(),
        }
    }

    fn payload(message: &str) -> serde_json::Value {
        serde_json::json!({ "text": message })
    }
}

impl Notifier for WebhookNotifier {
    /// Must be called from within a tokio runtime.
    fn notify(&self, message: &str) {
        let payload = Self::payload(message);
        let client = self.client.clone();
        let url = self.url.clone();

        tokio::spawn(async move {
            match client.post(&url).json(&payload).send().await {
                Ok(resp) if !resp.status().is_success() => {
                    tracing::warn!(%url, status = %resp.status(), "webhook rejected alert");
                }
                Ok(_) => {}
                Err(e) => tracing::warn!(%url, error = %e, "webhook POST failed"),
            }
        });
    }
}

/// Sends every alert to each inner notifier in turn.
#[derive(Default)]
pub struct Notifiers {
    inner: Vec<Arc<dyn Notifier>>,
}

impl Notifiers {
    /// Log notifier, plus a webhook when a URL is configured.
    pub fn from_webhook(webhook: Option<&str>) -> Self {
        let mut notifiers = Notifiers::default();
        notifiers.push(Arc::new(LogNotifier));
        if let Some(url) = webhook {
            notifiers.push(Arc::new(WebhookNotifier::new(url)));
        }
        notifiers
    }

    pub fn push(&mut self, notifier: Arc<dyn Notifier>) {
        self.inner.push(notifier);
    }
}

impl Notifier for Notifiers {
    fn notify(&self, message: &str) {
        for n in &self.inner {
            n.notify(message);
        }
    }
}
