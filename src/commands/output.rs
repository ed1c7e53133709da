//! Table and JSON rendering shared by the CLI subcommands.

use anyhow::Result;
use colored::{ColoredString, Colorize};
use serde::Serialize;
use serde_json::Value;

use crate::domain::comparison::{ComparisonResult, ComparisonStatus};
use crate::domain::comparison_schedule::ComparisonSchedule;
use crate::domain::drift::{ConfigDifference, DriftReport, Severity};
use crate::domain::task::{ScheduledTask, TaskStatus};

/// Print `data` as pretty JSON when `format` is `json`, otherwise run `table`.
pub fn print_output<T: Serialize>(format: &str, data: &T, table: impl FnOnce(&T)) -> Result<()> {
    match format {
        "json" => {
            let json = serde_json::to_string_pretty(data)?;
            println!("{}", json);
        }
        _ => table(data),
    }
    Ok(())
}

pub fn task_status(status: TaskStatus) -> ColoredString {
    match status {
        TaskStatus::Pending => status.as_str().yellow(),
        TaskStatus::Running => status.as_str().cyan(),
        TaskStatus::Completed => status.as_str().green(),
        TaskStatus::Failed => status.as_str().red(),
        TaskStatus::Cancelled => status.as_str().dimmed(),
    }
}

pub fn severity(severity: Severity) -> ColoredString {
    match severity {
        Severity::Critical => severity.as_str().red().bold(),
        Severity::Warning => severity.as_str().yellow(),
        Severity::Info => severity.as_str().normal(),
    }
}

fn comparison_status(status: ComparisonStatus) -> ColoredString {
    match status {
        ComparisonStatus::Completed => "completed".green(),
        ComparisonStatus::Failed => "failed".red(),
        ComparisonStatus::Running => "running".cyan(),
        ComparisonStatus::Pending => "pending".yellow(),
    }
}

pub fn print_tasks(tasks: &[ScheduledTask]) {
    if tasks.is_empty() {
        println!("{}", "no scheduled tasks".dimmed());
        return;
    }
    println!(
        "{:<36}  {:<20}  {:<20}  {:<10}  {}",
        "ID".bold(),
        "TARGET".bold(),
        "SCHEDULED FOR".bold(),
        "STATUS".bold(),
        "CREATED BY".bold()
    );
    for task in tasks {
        println!(
            "{:<36}  {:<20}  {:<20}  {:<10}  {}",
            task.id,
            task.target_id,
            task.scheduled_for.format("%Y-%m-%d %H:%M:%S"),
            task_status(task.status),
            task.created_by
        );
        if let Some(ref error) = task.error {
            println!("    {} {}", "error:".red(), error);
        }
    }
}

pub fn print_task(task: &ScheduledTask) {
    println!("{}", "═══ Scheduled Task ═══".cyan().bold());
    println!("  ID:            {}", task.id.bold());
    println!("  Target:        {}", task.target_id);
    println!("  Scheduled for: {}", task.scheduled_for.to_rfc3339());
    println!("  Status:        {}", task_status(task.status));
    println!("  Created by:    {}", task.created_by);
    println!("  Created at:    {}", task.created_at.to_rfc3339());
    if let Some(ref notes) = task.notes {
        println!("  Notes:         {}", notes);
    }
    if let Some(started) = task.started_at {
        println!("  Started at:    {}", started.to_rfc3339());
    }
    if let Some(finished) = task.finished_at {
        println!("  Finished at:   {}", finished.to_rfc3339());
    }
    if let Some(ref error) = task.error {
        println!("  Error:         {}", error.red());
    }
}

pub fn print_report(report: &DriftReport) {
    print_differences(&report.differences);
    if report.is_clean() {
        return;
    }
    println!();
    println!(
        "  {} {:.1}%  {} {}  {} {}",
        "Drift:".dimmed(),
        report.drift_percentage,
        "Differences:".dimmed(),
        report.differences.len(),
        "Paths:".dimmed(),
        report.total_paths
    );
    println!(
        "  {} {}  {} {}  {} {}",
        "critical".red().bold(),
        report.count_by_severity(Severity::Critical),
        "warning".yellow(),
        report.count_by_severity(Severity::Warning),
        "info",
        report.count_by_severity(Severity::Info)
    );
}

pub fn print_comparison(result: &ComparisonResult) {
    println!("{}", "═══ Configuration Comparison ═══".cyan().bold());
    println!("  ID:       {}", result.id.bold());
    println!("  Device:   {} ({})", result.device_id, result.device_address);
    println!("  Status:   {}", comparison_status(result.status));
    println!("  Created:  {}", result.created_at.to_rfc3339());
    if let Some(ref error) = result.error {
        println!("  Error:    {}", error.red());
        return;
    }
    println!();
    print_differences(&result.differences);
    println!();
    println!(
        "  {} {:.1}%  {} {}  {} {}  {} {}",
        "Drift:".dimmed(),
        result.drift_percentage,
        "critical".red().bold(),
        result.summary.critical,
        "warning".yellow(),
        result.summary.warning,
        "info",
        result.summary.info
    );
}

pub fn print_comparisons(results: &[ComparisonResult]) {
    if results.is_empty() {
        println!("{}", "no comparisons recorded".dimmed());
        return;
    }
    println!(
        "{:<36}  {:<16}  {:<16}  {:<10}  {:>7}  {}",
        "ID".bold(),
        "DEVICE".bold(),
        "ADDRESS".bold(),
        "STATUS".bold(),
        "DRIFT".bold(),
        "CRITICAL".bold()
    );
    for r in results {
        println!(
            "{:<36}  {:<16}  {:<16}  {:<10}  {:>6.1}%  {}",
            r.id,
            r.device_id,
            r.device_address,
            comparison_status(r.status),
            r.drift_percentage,
            r.summary.critical
        );
    }
}

pub fn print_schedules(schedules: &[ComparisonSchedule]) {
    if schedules.is_empty() {
        println!("{}", "no comparison schedules".dimmed());
        return;
    }
    println!(
        "{:<36}  {:<20}  {:<14}  {:<20}  {:>4}  {}",
        "ID".bold(),
        "NAME".bold(),
        "CADENCE".bold(),
        "NEXT RUN".bold(),
        "RUNS".bold(),
        "DEVICES".bold()
    );
    for s in schedules {
        let cadence = match (&s.cron, s.interval_secs) {
            (Some(cron), _) => cron.clone(),
            (None, Some(secs)) => format!("every {secs}s"),
            (None, None) => "-".to_string(),
        };
        let devices: Vec<&str> = s.devices.iter().map(|d| d.id.as_str()).collect();
        println!(
            "{:<36}  {:<20}  {:<14}  {:<20}  {:>4}  {}",
            s.id,
            s.name.as_deref().unwrap_or("-"),
            cadence,
            s.next_run_at.format("%Y-%m-%d %H:%M:%S"),
            s.runs,
            devices.join(", ")
        );
    }
}

fn print_differences(differences: &[ConfigDifference]) {
    if differences.is_empty() {
        println!("  {}", "no drift".green());
        return;
    }
    for d in differences {
        println!(
            "  {:<8}  {:<9}  {}",
            severity(d.severity),
            d.kind.to_string(),
            d.path.bold()
        );
        println!(
            "            source: {}  device: {}",
            format_scalar(&d.source_value),
            format_scalar(&d.device_value)
        );
    }
}

fn format_scalar(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "(absent)".to_string(),
        other => other.to_string(),
    }
}
