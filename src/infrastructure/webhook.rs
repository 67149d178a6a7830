use crate::domain::models::Task;
use chrono::{DateTime, Utc};
use reqwest::Client;

// Best-effort notify: the receiver's response is never read, so delivery
// failures are indistinguishable from success at this boundary. Callers get
// no error channel on purpose.

#[derive(Debug, Clone, Default)]
pub struct WebhookDispatcher {
    client: Client,
}

#[derive(Debug, serde::Serialize)]
struct WebhookPayload<'a> {
    event: &'a str,
    task: &'a Task,
    timestamp: String,
    source: &'a str,
}

impl WebhookDispatcher {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
        }
    }

    pub async fn notify(&self, url: &str, event: &str, task: &Task, sent_at: DateTime<Utc>) {
        let url = url.trim();
        if url.is_empty() {
            return;
        }

        let payload = WebhookPayload {
            event,
            task,
            timestamp: sent_at.to_rfc3339(),
            source: "taskpilot",
        };
        let _ = self.client.post(url).json(&payload).send().await;
    }
}
