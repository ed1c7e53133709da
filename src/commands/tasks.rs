//! `netintent tasks` / `netintent cancel`: inspect and cancel scheduled tasks.

use std::path::Path;

use anyhow::{Context, Result};
use colored::Colorize;

use crate::config;
use crate::domain::task::TaskStatus;
use crate::domain::task_store::{FileTaskStore, TaskStore};

use super::output;

pub fn list(
    all: bool,
    cached: bool,
    format: &str,
    config_path: Option<&Path>,
    daemon_url: Option<&str>,
) -> Result<()> {
    let rt = tokio::runtime::Runtime::new()?;
    let tasks = rt.block_on(async {
        if cached {
            // --cached: read the task file directly, no daemon needed
            let cfg = config::load_with(config_path)?;
            let store = FileTaskStore::new(&cfg.scheduler.task_file);
            let mut tasks = store
                .load_tasks()
                .await
                .with_context(|| format!("reading {}", store.path().display()))?;
            if !all {
                tasks.retain(|t| t.status != TaskStatus::Completed);
            }
            Ok::<_, anyhow::Error>(tasks)
        } else {
            let client = super::daemon_client(config_path, daemon_url)?;
            client.tasks(all).await
        }
    })?;

    output::print_output(format, &tasks, |tasks| output::print_tasks(tasks))
}

pub fn show(
    id: &str,
    format: &str,
    config_path: Option<&Path>,
    daemon_url: Option<&str>,
) -> Result<()> {
    let client = super::daemon_client(config_path, daemon_url)?;
    let rt = tokio::runtime::Runtime::new()?;
    let task = rt.block_on(client.task(id))?;
    output::print_output(format, &task, output::print_task)
}

pub fn cancel(
    id: &str,
    format: &str,
    config_path: Option<&Path>,
    daemon_url: Option<&str>,
) -> Result<()> {
    let client = super::daemon_client(config_path, daemon_url)?;
    let rt = tokio::runtime::Runtime::new()?;
    let resp = rt.block_on(client.cancel(id))?;

    output::print_output(format, &resp, |resp| {
        if resp.cancelled {
            println!("{} {}", "Cancelled".green(), resp.id.bold());
        } else {
            println!(
                "{} {} (unknown or already finished)",
                "Not cancelled".yellow(),
                resp.id.bold()
            );
        }
    })
}
