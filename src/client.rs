//! Typed HTTP client for the netintent daemon REST API.

use anyhow::{bail, Context, Result};
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::api::rest::{
    CancelResponse, CompareDeviceRequest, DeleteResponse, HealthResponse, ScheduleRequest,
};
use crate::domain::comparison::ComparisonResult;
use crate::domain::comparison_schedule::{ComparisonSchedule, NewComparisonSchedule};
use crate::domain::task::ScheduledTask;

pub struct NetintentClient {
    base_url: String,
    http: Client,
}

impl NetintentClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .context("building HTTP client")?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
        })
    }

    pub async fn health(&self) -> Result<HealthResponse> {
        self.get("/health").await
    }

    pub async fn tasks(&self, all: bool) -> Result<Vec<ScheduledTask>> {
        if all {
            self.get("/api/v1/tasks?all=true").await
        } else {
            self.get("/api/v1/tasks").await
        }
    }

    pub async fn task(&self, id: &str) -> Result<ScheduledTask> {
        self.get(&format!("/api/v1/tasks/{id}")).await
    }

    pub async fn schedule(&self, req: &ScheduleRequest) -> Result<ScheduledTask> {
        self.post("/api/v1/tasks", req).await
    }

    pub async fn cancel(&self, id: &str) -> Result<CancelResponse> {
        self.post(&format!("/api/v1/tasks/{id}/cancel"), &()).await
    }

    pub async fn comparisons(&self, limit: usize) -> Result<Vec<ComparisonResult>> {
        self.get(&format!("/api/v1/comparisons?limit={limit}")).await
    }

    pub async fn comparison(&self, id: &str) -> Result<ComparisonResult> {
        self.get(&format!("/api/v1/comparisons/{id}")).await
    }

    pub async fn compare_device(
        &self,
        device_id: &str,
        device_address: &str,
    ) -> Result<ComparisonResult> {
        let req = CompareDeviceRequest {
            device_id: device_id.to_string(),
            device_address: device_address.to_string(),
        };
        self.post("/api/v1/comparisons", &req).await
    }

    pub async fn comparison_schedules(&self) -> Result<Vec<ComparisonSchedule>> {
        self.get("/api/v1/comparison-schedules").await
    }

    pub async fn create_comparison_schedule(
        &self,
        req: &NewComparisonSchedule,
    ) -> Result<ComparisonSchedule> {
        self.post("/api/v1/comparison-schedules", req).await
    }

    pub async fn delete_comparison_schedule(&self, id: &str) -> Result<DeleteResponse> {
        self.delete(&format!("/api/v1/comparison-schedules/{id}")).await
    }

    // ── Internal helpers ───────────────────────────────────

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        self.send(self.http.get(&url), "GET", &url).await
    }

    async fn post<B: Serialize, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        self.send(self.http.post(&url).json(body), "POST", &url).await
    }

    async fn delete<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        self.send(self.http.delete(&url), "DELETE", &url).await
    }

    async fn send<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        method: &str,
        url: &str,
    ) -> Result<T> {
        let resp = request
            .send()
            .await
            .with_context(|| format!("{} {}", method, url))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            if body.is_empty() {
                bail!("{} returned {}", url, status);
            }
            bail!("{} returned {}: {}", url, status, body);
        }

        resp.json()
            .await
            .with_context(|| format!("parsing response from {}", url))
    }
}
