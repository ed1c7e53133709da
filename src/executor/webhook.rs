use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use tracing::{debug, warn};

use crate::domain::error::ExecutionError;
use crate::domain::task::ScheduledTask;

use super::TaskExecutor;

pub const SCHEDULED_DEPLOYMENT_EVENT: &str = "intent.scheduled_deployment";
pub const SECRET_HEADER: &str = "X-Webhook-Secret";

/// Body POSTed to the webhook for every due task.
#[derive(Debug, Serialize)]
pub struct WebhookEvent<'a> {
    pub event: &'static str,
    pub timestamp: String,
    pub target_id: &'a str,
    pub task: &'a ScheduledTask,
}

/// Executes a scheduled task by notifying a deployment webhook.
/// Any non-2xx response fails the task.
pub struct WebhookExecutor {
    client: reqwest::Client,
    url: String,
    secret: Option<String>,
}

impl WebhookExecutor {
    pub fn new(
        url: &str,
        secret: Option<String>,
        timeout: Duration,
    ) -> Result<Self, ExecutionError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.to_string(),
            secret,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl TaskExecutor for WebhookExecutor {
    async fn execute(&self, task: &ScheduledTask) -> Result<(), ExecutionError> {
        let event = WebhookEvent {
            event: SCHEDULED_DEPLOYMENT_EVENT,
            timestamp: Utc::now().to_rfc3339(),
            target_id: &task.target_id,
            task,
        };

        debug!(url = %self.url, task_id = %task.id, "posting scheduled deployment event");

        let mut request = self.client.post(&self.url).json(&event);
        if let Some(ref secret) = self.secret {
            request = request.header(SECRET_HEADER, secret);
        }
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            warn!(url = %self.url, status = %status, "webhook rejected scheduled deployment");
            return Err(ExecutionError::Callback(format!(
                "webhook {} returned {}",
                self.url, status
            )));
        }

        Ok(())
    }
}
