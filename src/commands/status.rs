//! `netintent status`: is the daemon up, and is its scheduler polling.

use std::path::Path;

use anyhow::Result;
use colored::Colorize;

use super::output;

pub fn run(format: &str, config_path: Option<&Path>, daemon_url: Option<&str>) -> Result<()> {
    let client = super::daemon_client(config_path, daemon_url)?;
    let rt = tokio::runtime::Runtime::new()?;
    let health = rt.block_on(client.health())?;

    output::print_output(format, &health, |health| {
        println!("{}", "netintent daemon".bold());
        println!("  version:   {}", health.version);
        println!("  uptime:    {}", fmt_uptime(health.uptime_secs));
        let state = |running: bool| if running { "running".green() } else { "stopped".red() };
        println!("  scheduler: {}", state(health.scheduler_running));
        println!("  schedules: {}", state(health.schedule_runner_running));
    })
}

fn fmt_uptime(secs: u64) -> String {
    let days = secs / 86400;
    let hours = (secs % 86400) / 3600;
    let mins = (secs % 3600) / 60;
    if days > 0 {
        format!("{}d {}h {}m", days, hours, mins)
    } else if hours > 0 {
        format!("{}h {}m", hours, mins)
    } else {
        format!("{}m", mins)
    }
}
