//! Scheduled task: a deferred intent waiting for its execution time.
//!
//! A `ScheduledTask` is created `Pending` and only moves forward:
//! `Pending → Running → Completed | Failed`, with `Cancelled` reachable from
//! either non-terminal state. Nothing leaves a terminal state.

use async_graphql::{Enum, SimpleObject};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A deferred unit of work to execute no earlier than `scheduled_for`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, SimpleObject)]
pub struct ScheduledTask {
    pub id: String,
    /// Opaque reference to what gets executed (an intent id, a change id, ...).
    pub target_id: String,
    pub scheduled_for: DateTime<Utc>,
    pub status: TaskStatus,
    #[serde(default)]
    pub notes: Option<String>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub finished_at: Option<DateTime<Utc>>,
    /// Execution error message, set when the task failed.
    #[serde(default)]
    pub error: Option<String>,
}

/// Lifecycle state of a scheduled task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Enum)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Whether moving from `self` to `next` is a permitted transition.
    pub fn can_transition_to(self, next: TaskStatus) -> bool {
        use TaskStatus::*;
        matches!(
            (self, next),
            (Pending, Running)
                | (Running, Completed)
                | (Pending, Failed)
                | (Running, Failed)
                | (Pending, Cancelled)
                | (Running, Cancelled)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ScheduledTask {
    pub fn new(
        target_id: impl Into<String>,
        scheduled_for: DateTime<Utc>,
        notes: Option<String>,
        created_by: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            target_id: target_id.into(),
            scheduled_for,
            status: TaskStatus::Pending,
            notes,
            created_by: created_by.into(),
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
            error: None,
        }
    }

    /// Whether the polling loop should pick this task up at `now`.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status == TaskStatus::Pending && self.scheduled_for <= now
    }

    /// Apply a status transition, stamping the audit timestamps.
    ///
    /// Returns `false` and leaves the task untouched when the transition is
    /// not permitted.
    pub fn transition(&mut self, next: TaskStatus, at: DateTime<Utc>) -> bool {
        if !self.status.can_transition_to(next) {
            return false;
        }
        match next {
            TaskStatus::Running => self.started_at = Some(at),
            _ if next.is_terminal() => self.finished_at = Some(at),
            _ => {}
        }
        self.status = next;
        true
    }

    /// Transition to `Failed`, recording why.
    pub fn fail(&mut self, error: impl Into<String>, at: DateTime<Utc>) -> bool {
        if self.transition(TaskStatus::Failed, at) {
            self.error = Some(error.into());
            true
        } else {
            false
        }
    }
}

/// Parse a scheduling timestamp. Accepts RFC 3339 (`2026-01-02T03:04:05Z`,
/// with any offset) and offset-less ISO 8601 (`2026-01-02T03:04:05`), the
/// latter interpreted as UTC.
pub fn parse_timestamp(input: &str) -> Result<DateTime<Utc>, String> {
    let trimmed = input.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(naive) = chrono::NaiveDateTime::parse_from_str(trimmed, fmt) {
            return Ok(naive.and_utc());
        }
    }
    Err(format!("expected an RFC 3339 timestamp, got {:?}", input))
}
