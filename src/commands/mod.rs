pub mod compare;
pub mod comparisons;
pub mod daemon;
pub mod output;
pub mod schedule;
pub mod status;
pub mod tasks;

use std::path::Path;

use anyhow::Result;

use crate::client::NetintentClient;
use crate::config;

/// Client for the daemon named by `--daemon-url`, or by `client.daemon_url`.
fn daemon_client(config_path: Option<&Path>, daemon_url: Option<&str>) -> Result<NetintentClient> {
    match daemon_url {
        Some(url) => NetintentClient::new(url),
        None => {
            let cfg = config::load_with(config_path)?;
            NetintentClient::new(&cfg.client.daemon_url)
        }
    }
}
