use std::path::Path;

use anyhow::Result;

use crate::config;

pub fn run(
    http_addr: Option<String>,
    log_level: Option<String>,
    poll_interval_secs: Option<u64>,
    config_path: Option<&Path>,
) -> Result<()> {
    let mut cfg = config::load_with(config_path)?;

    // CLI flags override config values
    if let Some(addr) = http_addr {
        cfg.daemon.http_addr = addr;
    }
    if let Some(level) = log_level {
        cfg.daemon.log_level = level;
    }
    if let Some(secs) = poll_interval_secs {
        cfg.scheduler.poll_interval_secs = secs;
    }

    // Build tokio runtime explicitly (no #[tokio::main] on fn main)
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(crate::server::run(cfg))
}
