//! Comparison service: fetches both trees for a device, runs the drift
//! comparator and keeps a bounded, newest-first history of results.

use std::collections::VecDeque;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::sources::ConfigSource;

use super::comparison::{ComparisonKind, ComparisonResult, ComparisonStatus};
use super::drift::{self, DriftReport, SeverityRule};

pub struct ComparisonService {
    source_of_truth: Arc<dyn ConfigSource>,
    observed: Arc<dyn ConfigSource>,
    rules: Vec<SeverityRule>,
    history: RwLock<VecDeque<ComparisonResult>>,
    history_limit: usize,
}

impl ComparisonService {
    pub fn new(
        source_of_truth: Arc<dyn ConfigSource>,
        observed: Arc<dyn ConfigSource>,
        rules: Vec<SeverityRule>,
        history_limit: usize,
    ) -> Arc<Self> {
        Arc::new(Self {
            source_of_truth,
            observed,
            rules,
            history: RwLock::new(VecDeque::new()),
            history_limit: history_limit.max(1),
        })
    }

    /// Compare the source-of-truth tree of `device_id` with the tree observed
    /// at `device_address`. Fetch failures produce a `Failed` result rather
    /// than an error; either way the result is recorded in the history.
    pub async fn compare_device(
        &self,
        device_id: &str,
        device_address: &str,
        kind: ComparisonKind,
    ) -> ComparisonResult {
        let mut result = ComparisonResult::new(device_id, device_address, kind);
        result.status = ComparisonStatus::Running;

        let fetched = tokio::try_join!(
            self.source_of_truth.fetch(device_id),
            self.observed.fetch(device_address),
        );

        match fetched {
            Ok((source, device)) => {
                let report = self.compare_trees(&source, &device);
                result.complete(source, device, report);
                info!(
                    comparison_id = %result.id,
                    device_id = %device_id,
                    drift_percentage = result.drift_percentage,
                    critical = result.summary.critical,
                    "configuration comparison completed"
                );
            }
            Err(e) => {
                warn!(device_id = %device_id, error = %e, "configuration comparison failed");
                result.fail(e.to_string());
            }
        }

        self.record(result.clone()).await;
        result
    }

    /// Compare two trees directly with this service's severity rules.
    pub fn compare_trees(&self, source: &Value, device: &Value) -> DriftReport {
        drift::compare(source, device, &self.rules)
    }

    /// Most recent results first, at most `limit`.
    pub async fn history(&self, limit: usize) -> Vec<ComparisonResult> {
        self.history.read().await.iter().take(limit).cloned().collect()
    }

    pub async fn get(&self, id: &str) -> Option<ComparisonResult> {
        self.history.read().await.iter().find(|r| r.id == id).cloned()
    }

    async fn record(&self, result: ComparisonResult) {
        let mut history = self.history.write().await;
        history.push_front(result);
        history.truncate(self.history_limit);
    }
}
