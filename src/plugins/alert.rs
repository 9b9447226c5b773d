//! Shipped alerter.
//!
//! Alerts are best-effort: a delivery failure is logged by the
//! dispatcher but never fails the task retroactively.

use async_trait::async_trait;
use serde_json::json;

use crate::domain::Stage;

use super::{AlertError, Alerter};

/// POSTs failure alerts to a webhook as JSON.
pub struct WebhookAlerter {
    url: String,
    client: reqwest::Client,
}

impl WebhookAlerter {
    pub fn new(url: String) -> Self {
        Self {
            url,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl Alerter for WebhookAlerter {
    fn name(&self) -> &str {
        "webhook"
    }

    async fn notify(&self, task_id: &str, stage: Stage, detail: &str) -> Result<(), AlertError> {
        let payload = json!({
            "task_id": task_id,
            "stage": stage.to_string(),
            "error": detail,
        });

        let response = self
            .client
            .post(&self.url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| AlertError::Delivery(e.to_string()))?;

        if !response.status().is_success() {
            return Err(AlertError::Delivery(format!(
                "webhook returned {}",
                response.status()
            )));
        }

        Ok(())
    }
}
