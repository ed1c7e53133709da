//! `netintent schedule`: defer an intent deployment on the daemon.

use std::path::Path;

use anyhow::{anyhow, Result};
use colored::Colorize;

use crate::api::rest::ScheduleRequest;
use crate::domain::task::parse_timestamp;

use super::output;

pub struct ScheduleArgs {
    pub target_id: String,
    pub at: String,
    pub notes: Option<String>,
    pub created_by: Option<String>,
}

pub fn run(
    args: ScheduleArgs,
    format: &str,
    config_path: Option<&Path>,
    daemon_url: Option<&str>,
) -> Result<()> {
    // Reject malformed times before contacting the daemon.
    parse_timestamp(&args.at).map_err(|reason| anyhow!("invalid time {:?}: {}", args.at, reason))?;

    let req = ScheduleRequest {
        target_id: args.target_id,
        scheduled_for: args.at,
        notes: args.notes,
        created_by: Some(args.created_by.unwrap_or_else(current_actor)),
    };

    let client = super::daemon_client(config_path, daemon_url)?;
    let rt = tokio::runtime::Runtime::new()?;
    let task = rt.block_on(client.schedule(&req))?;

    output::print_output(format, &task, |task| {
        println!("{} {}", "Scheduled".green(), task.id.bold());
        output::print_task(task);
    })
}

/// `user@host` of whoever runs the CLI.
pub(super) fn current_actor() -> String {
    let user = std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "unknown".to_string());
    match hostname::get() {
        Ok(host) => format!("{}@{}", user, host.to_string_lossy()),
        Err(_) => user,
    }
}
