//! Comparison records: one drift check of one device, with its lifecycle.

use async_graphql::{ComplexObject, Enum, Json, SimpleObject};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::drift::{ConfigDifference, DriftReport, Severity};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Enum)]
#[serde(rename_all = "lowercase")]
pub enum ComparisonKind {
    /// Requested on demand by an operator.
    Instant,
    /// Produced by a comparison schedule.
    Scheduled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Enum)]
#[serde(rename_all = "lowercase")]
pub enum ComparisonStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

/// Difference counts per severity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, SimpleObject)]
pub struct DriftSummary {
    pub critical: u64,
    pub warning: u64,
    pub info: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, SimpleObject)]
#[graphql(complex)]
pub struct ComparisonResult {
    pub id: String,
    pub device_id: String,
    pub device_address: String,
    pub kind: ComparisonKind,
    pub status: ComparisonStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    pub differences: Vec<ConfigDifference>,
    pub total_paths: u64,
    pub drift_percentage: f64,
    pub summary: DriftSummary,
    #[serde(default)]
    pub error: Option<String>,
    /// The source-of-truth tree that was compared.
    #[serde(default)]
    #[graphql(skip)]
    pub source_config: Option<Value>,
    /// The observed device tree that was compared.
    #[serde(default)]
    #[graphql(skip)]
    pub device_config: Option<Value>,
}

#[ComplexObject]
impl ComparisonResult {
    #[graphql(name = "sourceConfig")]
    async fn graphql_source_config(&self) -> Option<Json<Value>> {
        self.source_config.clone().map(Json)
    }

    #[graphql(name = "deviceConfig")]
    async fn graphql_device_config(&self) -> Option<Json<Value>> {
        self.device_config.clone().map(Json)
    }
}

impl ComparisonResult {
    pub fn new(device_id: &str, device_address: &str, kind: ComparisonKind) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            device_id: device_id.to_string(),
            device_address: device_address.to_string(),
            kind,
            status: ComparisonStatus::Pending,
            created_at: Utc::now(),
            completed_at: None,
            differences: Vec::new(),
            total_paths: 0,
            drift_percentage: 0.0,
            summary: DriftSummary::default(),
            error: None,
            source_config: None,
            device_config: None,
        }
    }

    /// Fill in the outcome of a finished comparison of `source` against
    /// `device`. The percentage and the summary are taken from the report,
    /// never set independently.
    pub fn complete(&mut self, source: Value, device: Value, report: DriftReport) {
        self.source_config = Some(source);
        self.device_config = Some(device);
        self.summary = DriftSummary {
            critical: report.count_by_severity(Severity::Critical) as u64,
            warning: report.count_by_severity(Severity::Warning) as u64,
            info: report.count_by_severity(Severity::Info) as u64,
        };
        self.total_paths = report.total_paths as u64;
        self.drift_percentage = report.drift_percentage;
        self.differences = report.differences;
        self.status = ComparisonStatus::Completed;
        self.completed_at = Some(Utc::now());
    }

    pub fn fail(&mut self, error: impl Into<String>) {
        self.status = ComparisonStatus::Failed;
        self.error = Some(error.into());
        self.completed_at = Some(Utc::now());
    }
}
