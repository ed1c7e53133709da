//! `netintent comparisons`: device comparisons and comparison schedules run
//! by the daemon.

use std::path::Path;

use anyhow::{bail, Result};
use clap::Subcommand;
use colored::Colorize;

use crate::domain::comparison_schedule::{DeviceTarget, NewComparisonSchedule};

use super::output;

#[derive(Subcommand)]
pub enum ComparisonCommands {
    /// Comparison history, newest first
    List {
        /// Maximum number of results
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Show one comparison with its differences
    Show {
        /// Comparison id
        id: String,
    },
    /// Compare a device's source-of-truth tree with its observed tree now
    Run {
        /// Device id (source-of-truth key)
        device_id: String,
        /// Device address (observed-state key)
        device_address: String,
    },
    /// Re-compare devices on an interval or a cron expression (UTC)
    Schedule {
        /// Device to compare as ID=ADDRESS; repeat for more devices
        #[arg(long = "device", value_name = "ID=ADDRESS", required = true, value_parser = parse_device)]
        devices: Vec<DeviceTarget>,
        /// Seconds between runs
        #[arg(long, conflicts_with = "cron", required_unless_present = "cron")]
        every: Option<u64>,
        /// Cron expression, e.g. "0 2 * * *" for daily at 02:00
        #[arg(long)]
        cron: Option<String>,
        /// Label shown in listings
        #[arg(long)]
        name: Option<String>,
    },
    /// List comparison schedules
    Schedules,
    /// Delete a comparison schedule
    Unschedule {
        /// Schedule id
        id: String,
    },
}

fn parse_device(arg: &str) -> Result<DeviceTarget, String> {
    match arg.split_once('=') {
        Some((id, address)) if !id.trim().is_empty() && !address.trim().is_empty() => {
            Ok(DeviceTarget {
                id: id.trim().to_string(),
                address: address.trim().to_string(),
            })
        }
        _ => Err(format!("expected ID=ADDRESS, got {arg:?}")),
    }
}

pub fn run(
    command: &ComparisonCommands,
    format: &str,
    config_path: Option<&Path>,
    daemon_url: Option<&str>,
) -> Result<()> {
    let client = super::daemon_client(config_path, daemon_url)?;
    let rt = tokio::runtime::Runtime::new()?;

    match command {
        ComparisonCommands::List { limit } => {
            let data = rt.block_on(client.comparisons(*limit))?;
            output::print_output(format, &data, |results| output::print_comparisons(results))
        }
        ComparisonCommands::Show { id } => {
            let data = rt.block_on(client.comparison(id))?;
            output::print_output(format, &data, output::print_comparison)
        }
        ComparisonCommands::Run {
            device_id,
            device_address,
        } => {
            let data = rt.block_on(client.compare_device(device_id, device_address))?;
            output::print_output(format, &data, output::print_comparison)
        }
        ComparisonCommands::Schedule {
            devices,
            every,
            cron,
            name,
        } => {
            let req = NewComparisonSchedule {
                name: name.clone(),
                devices: devices.clone(),
                interval_secs: *every,
                cron: cron.clone(),
                created_by: Some(super::schedule::current_actor()),
            };
            let schedule = rt.block_on(client.create_comparison_schedule(&req))?;
            output::print_output(format, &schedule, |schedule| {
                println!("{} {}", "Scheduled".green(), schedule.id.bold());
                output::print_schedules(std::slice::from_ref(schedule));
            })
        }
        ComparisonCommands::Schedules => {
            let data = rt.block_on(client.comparison_schedules())?;
            output::print_output(format, &data, |schedules| output::print_schedules(schedules))
        }
        ComparisonCommands::Unschedule { id } => {
            let resp = rt.block_on(client.delete_comparison_schedule(id))?;
            if !resp.deleted {
                bail!("comparison schedule {id} was not deleted");
            }
            output::print_output(format, &resp, |resp| {
                println!("{} {}", "Deleted".green(), resp.id.bold());
            })
        }
    }
}
