use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::domain::comparison_schedule::DeviceTarget;
use crate::domain::drift::SeverityRule;

pub const ENV_PREFIX: &str = "NETINTENT_";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub daemon: DaemonConfig,
    pub client: ClientConfig,
    pub scheduler: SchedulerConfig,
    pub executor: ExecutorConfig,
    pub comparison: ComparisonConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    pub http_addr: String,
    pub log_level: String,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            http_addr: "127.0.0.1:9200".to_string(),
            log_level: "info".to_string(),
        }
    }
}

/// Where CLI subcommands find the daemon.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub daemon_url: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            daemon_url: "http://127.0.0.1:9200".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub task_file: PathBuf,
    pub poll_interval_secs: u64,
    /// Upper bound for one execution. `None` waits for the callback forever.
    pub execution_timeout_secs: Option<u64>,
    /// How long `stop()` waits for an in-flight execution before aborting it.
    pub shutdown_grace_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            task_file: data_dir().join("tasks.json"),
            poll_interval_secs: 60,
            execution_timeout_secs: None,
            shutdown_grace_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Deployment webhook notified for every due task. Without it, executions
    /// are only logged.
    pub webhook_url: Option<String>,
    /// Sent as `X-Webhook-Secret` so the receiver can authenticate the daemon.
    pub webhook_secret: Option<String>,
    pub timeout_secs: u64,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            webhook_secret: None,
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ComparisonConfig {
    /// Directory of source-of-truth trees, one `<device_id>.{json,yaml}` each.
    pub source_dir: Option<PathBuf>,
    /// URL template for source-of-truth trees; `{key}` is the device id.
    pub source_url: Option<String>,
    /// Directory of observed trees, one `<device_address>.{json,yaml}` each.
    pub device_dir: Option<PathBuf>,
    /// URL template for observed trees; `{key}` is the device address.
    pub device_url: Option<String>,
    pub history_limit: usize,
    /// Re-compare every device in `devices` this often. 0 disables.
    pub interval_secs: u64,
    pub devices: Vec<DeviceTarget>,
    /// Operator-managed comparison schedules.
    pub schedule_file: PathBuf,
    /// How often the schedule runner looks for due schedules.
    pub schedule_poll_secs: u64,
    /// Checked in order; the first matching rule decides the severity.
    pub severity_rules: Vec<SeverityRule>,
}

impl Default for ComparisonConfig {
    fn default() -> Self {
        Self {
            source_dir: None,
            source_url: None,
            device_dir: None,
            device_url: None,
            history_limit: 50,
            interval_secs: 0,
            devices: Vec::new(),
            schedule_file: data_dir().join("comparison-schedules.json"),
            schedule_poll_secs: 30,
            severity_rules: Vec::new(),
        }
    }
}

fn data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("netintent")
}

impl Config {
    pub fn path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir().context("could not determine config directory")?;
        Ok(config_dir.join("netintent").join("config.yaml"))
    }
}

/// Load the default config file merged with defaults and `NETINTENT_*` env vars.
pub fn load() -> Result<Config> {
    load_from(&Config::path()?)
}

/// `--config <path>` when given, the default location otherwise.
pub fn load_with(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => load_from(path),
        None => load(),
    }
}

/// Load `path` (if it exists) merged with defaults and `NETINTENT_*` env vars.
/// Nested keys use `__`: `NETINTENT_SCHEDULER__POLL_INTERVAL_SECS=5`.
pub fn load_from(path: &Path) -> Result<Config> {
    Figment::from(Serialized::defaults(Config::default()))
        .merge(Yaml::file(path))
        .merge(Env::prefixed(ENV_PREFIX).split("__"))
        .extract()
        .with_context(|| format!("loading configuration from {}", path.display()))
}
