pub mod webhook;

use async_trait::async_trait;
use tracing::info;

use crate::domain::error::ExecutionError;
use crate::domain::task::ScheduledTask;

pub use webhook::WebhookExecutor;

/// The action behind a scheduled task.
///
/// Supplied by whoever knows what "executing" a target means. The scheduler
/// treats it as an opaque, possibly failing operation and records the outcome.
#[async_trait]
pub trait TaskExecutor: Send + Sync {
    async fn execute(&self, task: &ScheduledTask) -> Result<(), ExecutionError>;
}

/// Executor used when no webhook is configured: records the execution in the
/// log and succeeds.
pub struct LogExecutor;

#[async_trait]
impl TaskExecutor for LogExecutor {
    async fn execute(&self, task: &ScheduledTask) -> Result<(), ExecutionError> {
        info!(
            task_id = %task.id,
            target_id = %task.target_id,
            "no executor configured, scheduled intent recorded as executed"
        );
        Ok(())
    }
}
